//! 进程内表存储
//!
//! 语义与远程存储保持一致（重复键冲突、表不存在报错），
//! 并支持故障注入，便于测试投递管理器的重试与丢弃路径。

use super::{TableEntity, TableStore};
use crate::error::{Result, TableLogError};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

type Table = BTreeMap<(String, String), TableEntity>;

/// 进程内表存储
#[derive(Debug, Clone, Default)]
pub struct InMemoryTableStore {
    inner: Arc<InMemoryInner>,
}

#[derive(Debug, Default)]
struct InMemoryInner {
    tables: RwLock<HashMap<String, Table>>,
    /// 模拟存储不可达
    unreachable: AtomicBool,
    /// 接下来若干次插入返回瞬时错误
    failing_inserts: AtomicUsize,
    /// 插入延迟（毫秒）
    insert_delay_ms: AtomicU64,
    /// 插入调用次数（包括失败的）
    insert_attempts: AtomicU64,
}

impl InMemoryTableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 模拟网络不可达：所有操作返回 `StoreUnavailable`
    pub fn set_unreachable(&self, unreachable: bool) {
        self.inner.unreachable.store(unreachable, Ordering::SeqCst);
    }

    /// 让接下来 `count` 次插入失败
    pub fn fail_next_inserts(&self, count: usize) {
        self.inner.failing_inserts.store(count, Ordering::SeqCst);
    }

    /// 为每次插入增加延迟
    pub fn set_insert_delay(&self, delay: Duration) {
        self.inner
            .insert_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// 插入调用次数
    pub fn insert_attempts(&self) -> u64 {
        self.inner.insert_attempts.load(Ordering::SeqCst)
    }

    /// 表中实体数量，表不存在时返回 `None`
    pub async fn entity_count(&self, table: &str) -> Option<usize> {
        self.inner.tables.read().await.get(table).map(|t| t.len())
    }

    /// 列出表中所有实体
    pub async fn all_entities(&self, table: &str) -> Vec<TableEntity> {
        self.inner
            .tables
            .read()
            .await
            .get(table)
            .map(|t| t.values().cloned().collect())
            .unwrap_or_default()
    }

    /// 表是否存在
    pub async fn table_exists(&self, table: &str) -> bool {
        self.inner.tables.read().await.contains_key(table)
    }

    fn check_reachable(&self) -> Result<()> {
        if self.inner.unreachable.load(Ordering::SeqCst) {
            return Err(TableLogError::unavailable("in-memory store marked unreachable"));
        }
        Ok(())
    }

    fn take_injected_failure(&self) -> bool {
        self.inner
            .failing_inserts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl TableStore for InMemoryTableStore {
    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool> {
        self.check_reachable()?;
        let mut tables = self.inner.tables.write().await;
        if tables.contains_key(table) {
            return Ok(false);
        }
        tables.insert(table.to_string(), Table::new());
        Ok(true)
    }

    async fn insert_entity(&self, table: &str, entity: &TableEntity) -> Result<()> {
        self.inner.insert_attempts.fetch_add(1, Ordering::SeqCst);

        let delay = self.inner.insert_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.check_reachable()?;
        if self.take_injected_failure() {
            return Err(TableLogError::unavailable("injected transient failure"));
        }

        let mut tables = self.inner.tables.write().await;
        let rows = tables.get_mut(table).ok_or_else(|| TableLogError::StoreRejected {
            status: 404,
            message: format!("TableNotFound: {}", table),
        })?;

        let key = (entity.partition_key.clone(), entity.row_key.clone());
        if rows.contains_key(&key) {
            return Err(TableLogError::StoreRejected {
                status: 409,
                message: "EntityAlreadyExists".to_string(),
            });
        }
        rows.insert(key, entity.clone());
        Ok(())
    }

    async fn query_partition(&self, table: &str, partition_key: &str) -> Result<Vec<TableEntity>> {
        self.check_reachable()?;
        let tables = self.inner.tables.read().await;
        let rows = tables.get(table).ok_or_else(|| TableLogError::StoreRejected {
            status: 404,
            message: format!("TableNotFound: {}", table),
        })?;

        Ok(rows
            .values()
            .filter(|e| e.partition_key == partition_key)
            .cloned()
            .collect())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}
