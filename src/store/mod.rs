//! 表存储抽象
//!
//! 定义了投递管理器所依赖的通用表存储接口：分区键 + 行键 + 具名字符串字段。
//!
//! - `TableStore`: 存储接口
//! - `InMemoryTableStore`: 进程内实现，用于测试和本地调试
//! - `AzureTableStore`: 基于 REST 的 Azure Table Storage 实现

pub mod azure;
pub mod connection;
pub mod memory;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Debug;

pub use azure::AzureTableStore;
pub use connection::ConnectionString;
pub use memory::InMemoryTableStore;

/// 存储实体
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableEntity {
    #[serde(rename = "PartitionKey")]
    pub partition_key: String,
    #[serde(rename = "RowKey")]
    pub row_key: String,
    /// 其余字段，序列化时与键平铺在同一层
    #[serde(flatten)]
    pub properties: BTreeMap<String, String>,
}

impl TableEntity {
    pub fn new(partition_key: impl Into<String>, row_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            row_key: row_key.into(),
            properties: BTreeMap::new(),
        }
    }

    /// 设置字段
    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// 读取字段
    pub fn get(&self, name: &str) -> Option<&str> {
        self.properties.get(name).map(String::as_str)
    }
}

/// 表存储接口
///
/// 实现必须可在多个任务之间共享。
#[async_trait]
pub trait TableStore: Send + Sync + Debug {
    /// 创建表（如果不存在）
    ///
    /// 返回 `true` 表示本次调用新建了表；已存在时返回 `false`，不视为错误。
    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool>;

    /// 插入实体（仅插入，不更新/合并）
    async fn insert_entity(&self, table: &str, entity: &TableEntity) -> Result<()>;

    /// 查询某个分区下的全部实体，仅用于验证
    async fn query_partition(&self, table: &str, partition_key: &str) -> Result<Vec<TableEntity>>;

    /// 存储名称
    fn name(&self) -> &'static str;
}
