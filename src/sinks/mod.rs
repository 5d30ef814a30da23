//! 日志目标模块
//!
//! - `LogTarget`: 统一的日志目标接口
//! - `TableStorageTarget`: 写入表存储的目标
//! - `TargetRegistry`: 按名称创建目标

pub mod registry;
pub mod table_storage;
pub mod traits;

// 重新导出主要类型
pub use registry::{TargetFactory, TargetRegistry};
pub use table_storage::TableStorageTarget;
pub use traits::{LogTarget, TargetMetadata};
