//! 实用工具模块
//!
//! 提供各种辅助功能和工具函数

pub mod machine;
pub mod time;

pub use machine::{get_hostname, get_machine_name};
pub use time::{format_timestamp, validate_timestamp_format};
