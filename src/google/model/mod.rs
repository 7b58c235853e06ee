//! Google 数据模型
//!
//! - `credentials`: 客户端密钥与令牌缓存
//! - `token_refresh`: 令牌端点请求/响应
//! - `drive`: Drive API v2 文件资源

pub mod credentials;
pub mod drive;
pub mod token_refresh;
