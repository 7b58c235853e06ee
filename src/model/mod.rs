//! 应用级数据模型
//!
//! - `arg`: 命令行参数
//! - `config`: 配置文件与环境变量

pub mod arg;
pub mod config;
