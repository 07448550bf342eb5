//! 通用模块，包含配置和工具函数

pub mod config;
pub mod utils;

pub use self::config::AgentConfig;
pub use self::utils::{SessionKey, TemporaryFile, constant_time_eq};
