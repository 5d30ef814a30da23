//! 表存储日志目标
//!
//! 把宿主日志事件转换为表实体并交给投递管理器。初始化前的写入会被忽略并计数，
//! 初始化只执行一次。

use crate::config::{validate_config, TableStorageConfig};
use crate::core::event::LogEvent;
use crate::core::layout::Layout;
use crate::delivery::{DeliveryFault, DeliveryManager};
use crate::diagnostics::{DeliverySnapshot, Diagnostics};
use crate::env_config::EnvConfig;
use crate::error::{Result, TableLogError};
use crate::keys::{KeyTemplate, DEFAULT_PARTITION_KEY_TEMPLATE, DEFAULT_ROW_KEY_TEMPLATE};
use crate::record::LogRecordBuilder;
use crate::sinks::traits::{LogTarget, TargetMetadata};
use crate::store::{AzureTableStore, ConnectionString, TableStore};
use crate::utils::get_machine_name;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, info};

/// 注册表中使用的目标名称
pub const TARGET_NAME: &str = "AzureTableStorage";

/// 表存储日志目标
#[derive(Debug)]
pub struct TableStorageTarget {
    config: TableStorageConfig,
    /// 注入的存储；为空时按连接字符串创建 `AzureTableStore`
    store: Option<Arc<dyn TableStore>>,
    partition_template: KeyTemplate,
    row_template: KeyTemplate,
    layout: Layout,
    builder: LogRecordBuilder,
    manager: OnceCell<DeliveryManager>,
    diagnostics: Arc<Diagnostics>,
}

impl TableStorageTarget {
    /// 根据配置创建目标，初始化时连接远程存储
    pub fn new(config: TableStorageConfig) -> Result<Self> {
        Self::build(config, None)
    }

    /// 使用给定的存储创建目标
    pub fn with_store(config: TableStorageConfig, store: Arc<dyn TableStore>) -> Result<Self> {
        Self::build(config, Some(store))
    }

    fn build(config: TableStorageConfig, store: Option<Arc<dyn TableStore>>) -> Result<Self> {
        validate_config(&config)?;

        // 两个默认值相互独立
        let partition_template =
            KeyTemplate::or_default(config.partition_key.as_deref(), DEFAULT_PARTITION_KEY_TEMPLATE);
        let row_template =
            KeyTemplate::or_default(config.row_key.as_deref(), DEFAULT_ROW_KEY_TEMPLATE);

        let machine_name = config
            .machine_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(get_machine_name);
        let builder = LogRecordBuilder::new(machine_name)
            .with_timestamp_format(config.timestamp_format.clone());
        let layout = Layout::new(config.layout.clone(), config.timestamp_format.clone());

        Ok(Self {
            config,
            store,
            partition_template,
            row_template,
            layout,
            builder,
            manager: OnceCell::new(),
            diagnostics: Arc::new(Diagnostics::new()),
        })
    }

    pub fn config(&self) -> &TableStorageConfig {
        &self.config
    }

    pub fn partition_template(&self) -> &KeyTemplate {
        &self.partition_template
    }

    pub fn row_template(&self) -> &KeyTemplate {
        &self.row_template
    }

    pub fn is_initialized(&self) -> bool {
        self.manager.initialized()
    }

    /// 最近一次投递失败
    pub fn last_fault(&self) -> Option<DeliveryFault> {
        self.manager.get().and_then(DeliveryManager::last_fault)
    }

    /// 解析连接标识：先查配置中的连接字符串表，再查同名环境变量
    pub fn resolve_connection_string(&self) -> Result<ConnectionString> {
        let key = self.config.connection_string_key.as_str();
        let raw = match self.config.connection_strings.get(key) {
            Some(value) => value.clone(),
            None => EnvConfig::get_connection_string(key)?.ok_or_else(|| {
                TableLogError::connection_string(format!(
                    "connection string '{}' not found in configuration or environment",
                    key
                ))
            })?,
        };
        ConnectionString::parse(&raw)
    }

    fn open_store(&self) -> Result<Arc<dyn TableStore>> {
        if let Some(store) = &self.store {
            return Ok(store.clone());
        }
        let connection = self.resolve_connection_string()?;
        debug!("Using table endpoint {}", connection.table_endpoint);
        let store = AzureTableStore::new(&connection, self.config.delivery.request_timeout())?;
        Ok(Arc::new(store))
    }
}

#[async_trait]
impl LogTarget for TableStorageTarget {
    async fn initialize(&self) -> Result<()> {
        self.manager
            .get_or_try_init(|| async {
                let store = self.open_store()?;
                DeliveryManager::initialize_with_diagnostics(
                    store,
                    self.config.table_name.clone(),
                    self.config.delivery.clone(),
                    self.diagnostics.clone(),
                )
                .await
            })
            .await?;
        info!("Table storage target ready for table {}", self.config.table_name);
        Ok(())
    }

    fn write(&self, event: LogEvent) {
        let Some(manager) = self.manager.get() else {
            self.diagnostics.increment_ignored_uninitialized();
            return;
        };

        let rendered = self.layout.render(&event, self.builder.machine_name());
        match self
            .builder
            .build(&event, &rendered, &self.partition_template, &self.row_template)
        {
            Ok(record) => manager.submit(record),
            Err(e) => {
                self.diagnostics.increment_dropped_invalid();
                debug!("Skipping event from {}: {}", event.logger_name, e);
            }
        }
    }

    async fn shutdown(&self) -> Result<()> {
        match self.manager.get() {
            Some(manager) => manager.shutdown(self.config.delivery.shutdown_timeout()).await,
            None => Ok(()),
        }
    }

    async fn is_healthy(&self) -> bool {
        self.manager.get().is_some_and(DeliveryManager::is_running)
    }

    fn name(&self) -> &'static str {
        TARGET_NAME
    }

    fn stats(&self) -> DeliverySnapshot {
        self.diagnostics.snapshot()
    }

    fn metadata(&self) -> TargetMetadata {
        TargetMetadata {
            name: TARGET_NAME.to_string(),
            enabled: true,
            description: Some(format!("Azure table storage target ({})", self.config.table_name)),
        }
    }
}
