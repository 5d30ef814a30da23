//! 定义日志目标的所有配置结构体。

use crate::core::event::LogLevel;
use crate::error::{Result, TableLogError};
use crate::keys::TableNameValidator;
use crate::utils::validate_timestamp_format;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

// --- 辅助函数，用于提供配置项的默认值 ---
fn default_level() -> String {
    "INFO".to_string()
}
fn default_layout() -> String {
    "{timestamp}|{level}|{logger}|{message}".to_string()
}
fn default_timestamp_format() -> String {
    crate::record::DEFAULT_TIMESTAMP_FORMAT.to_string()
}
fn default_buffer_size() -> usize {
    10000
}
fn default_batch_size() -> usize {
    100
}
fn default_flush_interval_ms() -> u64 {
    1000
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_base_delay_ms() -> u64 {
    100
}
fn default_retry_max_delay_ms() -> u64 {
    5000
}
fn default_shutdown_timeout_ms() -> u64 {
    5000
}
fn default_request_timeout_ms() -> u64 {
    30000
}

/// 后台投递配置
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    /// 队列容量，满时丢弃最新记录
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_flush_interval_ms")]
    pub flush_interval_ms: u64,
    /// 首次尝试之后的最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
    /// 单次存储请求超时
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
            batch_size: default_batch_size(),
            flush_interval_ms: default_flush_interval_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

impl DeliveryConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_millis(self.flush_interval_ms)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    pub fn retry_max_delay(&self) -> Duration {
        Duration::from_millis(self.retry_max_delay_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// 表存储日志目标的顶层配置结构体。
#[derive(Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct TableStorageConfig {
    /// 连接标识：先在 `connection_strings` 中查找，再查同名环境变量
    pub connection_string_key: String,
    pub table_name: String,
    /// 分区键模板，缺省为 `${logger}`
    pub partition_key: Option<String>,
    /// 行键模板，缺省为 `${descticks}__${guid}`
    pub row_key: Option<String>,
    #[serde(default = "default_layout")]
    pub layout: String,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    #[serde(default = "default_level")]
    pub level: String,
    /// 覆盖自动探测的机器名
    pub machine_name: Option<String>,
    #[serde(default)]
    pub connection_strings: HashMap<String, String>,
    #[serde(default)]
    pub delivery: DeliveryConfig,
}

// 安全的Debug实现，避免泄露连接字符串中的账户密钥
impl std::fmt::Debug for TableStorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redacted: Vec<&String> = self.connection_strings.keys().collect();
        f.debug_struct("TableStorageConfig")
            .field("connection_string_key", &self.connection_string_key)
            .field("table_name", &self.table_name)
            .field("partition_key", &self.partition_key)
            .field("row_key", &self.row_key)
            .field("layout", &self.layout)
            .field("timestamp_format", &self.timestamp_format)
            .field("level", &self.level)
            .field("machine_name", &self.machine_name)
            .field("connection_strings", &redacted)
            .field("delivery", &self.delivery)
            .finish()
    }
}

impl TableStorageConfig {
    /// 使用必填项创建配置，其余字段取默认值
    pub fn new(connection_string_key: impl Into<String>, table_name: impl Into<String>) -> Self {
        Self {
            connection_string_key: connection_string_key.into(),
            table_name: table_name.into(),
            partition_key: None,
            row_key: None,
            layout: default_layout(),
            timestamp_format: default_timestamp_format(),
            level: default_level(),
            machine_name: None,
            connection_strings: HashMap::new(),
            delivery: DeliveryConfig::default(),
        }
    }

    pub fn with_partition_key(mut self, template: impl Into<String>) -> Self {
        self.partition_key = Some(template.into());
        self
    }

    pub fn with_row_key(mut self, template: impl Into<String>) -> Self {
        self.row_key = Some(template.into());
        self
    }

    pub fn with_layout(mut self, layout: impl Into<String>) -> Self {
        self.layout = layout.into();
        self
    }

    pub fn with_connection_string(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.connection_strings.insert(key.into(), value.into());
        self
    }

    pub fn with_delivery(mut self, delivery: DeliveryConfig) -> Self {
        self.delivery = delivery;
        self
    }

    /// 解析后的最低日志级别
    pub fn min_level(&self) -> Result<LogLevel> {
        self.level
            .parse()
            .map_err(|_| TableLogError::InvalidLogLevel(self.level.clone()))
    }
}

/// 用于从 TOML 文件加载 `TableStorageConfig` 的辅助函数。
pub fn load_config_from_file(path: &std::path::Path) -> Result<TableStorageConfig> {
    use std::fs;

    if !path.exists() {
        return Err(TableLogError::ConfigFileMissing(
            path.to_string_lossy().into_owned(),
        ));
    }

    let config_str = fs::read_to_string(path)?;
    load_config_from_str(&config_str)
}

/// 用于从 TOML 字符串加载 `TableStorageConfig` 的辅助函数。
pub fn load_config_from_str(config_str: &str) -> Result<TableStorageConfig> {
    let config: TableStorageConfig = toml::from_str(config_str)
        .map_err(|e| TableLogError::ConfigError(format!("TOML解析失败: {}", e)))?;

    Ok(config)
}

/// 验证配置的有效性。
pub fn validate_config(config: &TableStorageConfig) -> Result<()> {
    TableNameValidator::validate(&config.table_name)?;

    if config.connection_string_key.trim().is_empty() {
        return Err(TableLogError::config("connection_string_key 不能为空"));
    }

    config.min_level()?;
    validate_timestamp_format(&config.timestamp_format)?;

    let delivery = &config.delivery;
    if delivery.buffer_size == 0 {
        return Err(TableLogError::config("delivery.buffer_size 必须大于0"));
    }
    if delivery.batch_size == 0 {
        return Err(TableLogError::config("delivery.batch_size 必须大于0"));
    }
    if delivery.flush_interval_ms == 0 {
        return Err(TableLogError::config("delivery.flush_interval_ms 必须大于0"));
    }
    if delivery.retry_base_delay_ms > delivery.retry_max_delay_ms {
        return Err(TableLogError::config(
            "delivery.retry_base_delay_ms 不能大于 delivery.retry_max_delay_ms",
        ));
    }

    Ok(())
}
