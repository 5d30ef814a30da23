//! azure_table_log - 写入 Azure Table Storage 的异步日志目标
//!
//! 每条 tracing 事件被转换为一条表实体：分区键和行键由模板派生，
//! 写入由后台任务批量完成，日志调用线程从不等待存储。
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use azure_table_log::{init_with_config, shutdown, TableStorageConfig};
//! use tracing::{error, info};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = TableStorageConfig::new("StorageConnection", "AppLogs")
//!         .with_partition_key("Test.${logger}")
//!         .with_connection_string("StorageConnection", "UseDevelopmentStorage=true");
//!
//!     init_with_config(config).await?;
//!
//!     info!("Application started");
//!     error!(error.order_id = 42, "Payment failed");
//!
//!     // 优雅关闭
//!     shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! # 配置文件
//!
//! ```toml
//! connection_string_key = "StorageConnection"
//! table_name = "AppLogs"
//! partition_key = "Test.${logger}"
//! row_key = "${descticks}__${guid}"
//!
//! [delivery]
//! buffer_size = 10000
//! max_retries = 3
//! ```

pub mod config;
pub mod core;
pub mod delivery;
pub mod diagnostics;
pub mod env_config;
pub mod error;
pub mod keys;
pub mod record;
pub mod sinks;
pub mod store;
pub mod utils;

// 重新导出主要类型
pub use config::{load_config_from_file, load_config_from_str, DeliveryConfig, TableStorageConfig};
pub use diagnostics::DeliverySnapshot;
pub use error::{Result, TableLogError};

// 重新导出核心功能
pub use crate::core::{ErrorInfo, LogEvent, LogLevel, TableStorageLayer};
pub use delivery::{DeliveryFault, DeliveryManager};
pub use keys::{KeyContext, KeyTemplate, TableNameValidator};
pub use record::{LogRecord, LogRecordBuilder};
pub use sinks::{LogTarget, TableStorageTarget, TargetRegistry};
pub use store::{AzureTableStore, ConnectionString, InMemoryTableStore, TableEntity, TableStore};

use once_cell::sync::Lazy;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use tracing_subscriber::layer::SubscriberExt;

/// 库版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 全局日志目标实例
static GLOBAL_TARGET: Lazy<Arc<Mutex<Option<Arc<dyn LogTarget>>>>> =
    Lazy::new(|| Arc::new(Mutex::new(None)));

/// 初始化标记，确保全局订阅器只安装一次
static IS_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// 使用指定配置初始化全局日志目标
///
/// 依次完成：创建目标、建表并启动后台投递、安装全局 tracing 订阅器。
/// 任一步失败都会返回错误，且不会留下已安装的订阅器。
pub async fn init_with_config(config: TableStorageConfig) -> Result<()> {
    let min_level = config.min_level()?;
    let target = TargetRegistry::new().create(sinks::table_storage::TARGET_NAME, &config)?;
    init_with_target(target, min_level).await
}

/// 从 TOML 配置文件初始化
pub async fn init_from_file(path: impl AsRef<std::path::Path>) -> Result<()> {
    let config = load_config_from_file(path.as_ref())?;
    init_with_config(config).await
}

/// 使用已创建的目标初始化
pub async fn init_with_target(target: Arc<dyn LogTarget>, min_level: LogLevel) -> Result<()> {
    if IS_INITIALIZED
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        return Err(TableLogError::initialization(
            "azure_table_log has already been initialized",
        ));
    }

    let result = install(target, min_level).await;
    if result.is_err() {
        // 失败时允许再次初始化
        IS_INITIALIZED.store(false, Ordering::SeqCst);
    }
    result
}

async fn install(target: Arc<dyn LogTarget>, min_level: LogLevel) -> Result<()> {
    target.initialize().await?;

    let layer = TableStorageLayer::new(target.clone()).with_min_level(min_level);
    let subscriber = tracing_subscriber::registry().with(layer);
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        let _ = target.shutdown().await;
        return Err(TableLogError::tracing(format!(
            "Failed to install global subscriber: {}",
            e
        )));
    }

    match GLOBAL_TARGET.lock() {
        Ok(mut global) => *global = Some(target),
        Err(poisoned) => *poisoned.into_inner() = Some(target),
    }
    Ok(())
}

/// 优雅关闭全局日志目标
///
/// 在配置的宽限期内写完已接收的记录，之后的事件会被丢弃。
pub async fn shutdown() -> Result<()> {
    let target = match GLOBAL_TARGET.lock() {
        Ok(mut global) => global.take(),
        Err(poisoned) => poisoned.into_inner().take(),
    };

    match target {
        Some(target) => target.shutdown().await,
        None => Ok(()),
    }
}

/// 检查全局日志目标是否已初始化
pub fn is_initialized() -> bool {
    GLOBAL_TARGET
        .lock()
        .map(|global| global.is_some())
        .unwrap_or(false)
}

/// 获取全局日志目标的投递统计
///
/// 未初始化时返回空快照。
pub fn get_diagnostics() -> DeliverySnapshot {
    GLOBAL_TARGET
        .lock()
        .ok()
        .and_then(|global| global.as_ref().map(|target| target.stats()))
        .unwrap_or_default()
}
