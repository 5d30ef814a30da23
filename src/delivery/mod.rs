//! 后台投递
//!
//! - `DeliveryManager`: 有界队列 + 后台批处理/重试任务
//! - `DeliveryFault`: 最近一次被丢弃记录的错误信息

mod batch;
pub mod manager;

pub use manager::{DeliveryFault, DeliveryManager};
