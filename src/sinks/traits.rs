//! 日志目标 trait
//!
//! 定义了统一的日志目标接口，允许通过注册表按名称创建目标。
//!
//! # 使用示例
//!
//! ```rust
//! use azure_table_log::sinks::traits::{LogTarget, TargetMetadata};
//! use azure_table_log::core::event::LogEvent;
//! use azure_table_log::diagnostics::DeliverySnapshot;
//! use azure_table_log::error::Result;
//! use async_trait::async_trait;
//!
//! #[derive(Debug)]
//! struct MyTarget;
//!
//! #[async_trait]
//! impl LogTarget for MyTarget {
//!     async fn initialize(&self) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     fn write(&self, event: LogEvent) {
//!         println!("received: {}", event.message);
//!     }
//!
//!     async fn shutdown(&self) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     fn name(&self) -> &'static str {
//!         "my_target"
//!     }
//!
//!     fn stats(&self) -> DeliverySnapshot {
//!         DeliverySnapshot::default()
//!     }
//!
//!     fn metadata(&self) -> TargetMetadata {
//!         TargetMetadata {
//!             name: "my_target".to_string(),
//!             enabled: true,
//!             description: None,
//!         }
//!     }
//! }
//! ```

use crate::core::event::LogEvent;
use crate::diagnostics::DeliverySnapshot;
use crate::error::Result;
use async_trait::async_trait;
use std::fmt::Debug;

/// 日志目标 trait
///
/// `write` 在日志调用线程上执行，必须立即返回；
/// 存储访问只允许出现在 `initialize`、`shutdown` 和目标自己的后台任务中。
#[async_trait]
pub trait LogTarget: Send + Sync + Debug {
    /// 初始化目标，失败视为致命错误
    async fn initialize(&self) -> Result<()>;

    /// 写入单条事件，从不阻塞也不返回错误
    fn write(&self, event: LogEvent);

    /// 优雅关闭，尽量写完已接收的事件
    async fn shutdown(&self) -> Result<()>;

    /// 检查目标是否健康
    async fn is_healthy(&self) -> bool {
        true
    }

    /// 获取目标的名称
    fn name(&self) -> &'static str;

    /// 获取目标的投递统计
    fn stats(&self) -> DeliverySnapshot;

    /// 获取目标的元数据
    fn metadata(&self) -> TargetMetadata;
}

/// 目标元数据
#[derive(Debug, Clone)]
pub struct TargetMetadata {
    /// 目标名称
    pub name: String,
    /// 是否启用
    pub enabled: bool,
    /// 描述信息
    pub description: Option<String>,
}
