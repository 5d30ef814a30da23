//! 日志目标注册表
//!
//! 通过名称创建日志目标，默认注册 `AzureTableStorage`。

use crate::config::TableStorageConfig;
use crate::error::{Result, TableLogError};
use crate::sinks::table_storage::{TableStorageTarget, TARGET_NAME};
use crate::sinks::traits::LogTarget;
use std::collections::HashMap;
use std::sync::Arc;

/// 目标工厂函数
pub type TargetFactory = fn(&TableStorageConfig) -> Result<Arc<dyn LogTarget>>;

/// 日志目标注册表
#[derive(Clone)]
pub struct TargetRegistry {
    factories: HashMap<String, TargetFactory>,
}

impl std::fmt::Debug for TargetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TargetRegistry")
            .field("targets", &self.names())
            .finish()
    }
}

fn table_storage_factory(config: &TableStorageConfig) -> Result<Arc<dyn LogTarget>> {
    Ok(Arc::new(TableStorageTarget::new(config.clone())?))
}

impl Default for TargetRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(TARGET_NAME, table_storage_factory);
        registry
    }
}

impl TargetRegistry {
    /// 创建包含默认目标的注册表
    pub fn new() -> Self {
        Self::default()
    }

    /// 创建空注册表
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// 注册目标，同名时覆盖
    pub fn register(&mut self, name: impl Into<String>, factory: TargetFactory) {
        self.factories.insert(name.into(), factory);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// 已注册的目标名称（排序后）
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// 按名称创建目标
    pub fn create(&self, name: &str, config: &TableStorageConfig) -> Result<Arc<dyn LogTarget>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| TableLogError::config(format!("unknown log target '{}'", name)))?;
        factory(config)
    }
}
