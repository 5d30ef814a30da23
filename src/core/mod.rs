//! 核心模块
//!
//! 包含事件定义、布局渲染和 tracing 桥接层。

pub mod event;
pub mod layer;
pub mod layout;

// 重新导出核心类型
pub use event::{ErrorInfo, LogEvent, LogLevel};
pub use layer::TableStorageLayer;
pub use layout::Layout;
