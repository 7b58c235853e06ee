//! Google 授权与 Drive 访问
//!
//! - `model`: 凭证、令牌、Drive 资源
//! - `token_manager`: 令牌缓存的加载、刷新与授权
//! - `local_server`: 交互式授权的本地回调服务
//! - `drive`: Drive API v2 客户端

pub mod drive;
pub mod local_server;
pub mod model;
pub mod token_manager;
