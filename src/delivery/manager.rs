//! 投递管理器
//!
//! 持有有界队列和后台处理任务。写入端只做非阻塞入队，存储访问、
//! 批处理和重试全部发生在后台任务中。

use super::batch::RecordBatch;
use crate::config::DeliveryConfig;
use crate::diagnostics::{DeliverySnapshot, Diagnostics};
use crate::error::{Result, TableLogError};
use crate::keys::TableNameValidator;
use crate::record::LogRecord;
use crate::store::TableStore;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, RwLock};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// 最近一次投递失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryFault {
    pub partition_key: String,
    pub row_key: String,
    pub category: &'static str,
    pub message: String,
    pub at: DateTime<Utc>,
}

type FaultSlot = Arc<Mutex<Option<DeliveryFault>>>;

/// 投递管理器
#[derive(Debug)]
pub struct DeliveryManager {
    table: String,
    /// 关闭后为空，之后的提交全部丢弃
    sender: RwLock<Option<mpsc::Sender<LogRecord>>>,
    processor_handle: tokio::sync::Mutex<Option<JoinHandle<()>>>,
    diagnostics: Arc<Diagnostics>,
    last_fault: FaultSlot,
}

impl DeliveryManager {
    /// 建表并启动后台处理任务
    ///
    /// 存储不可达时返回错误，不会启动任何任务。
    pub async fn initialize(
        store: Arc<dyn TableStore>,
        table: impl Into<String>,
        config: DeliveryConfig,
    ) -> Result<Self> {
        Self::initialize_with_diagnostics(store, table, config, Arc::new(Diagnostics::new())).await
    }

    /// 与 [`initialize`](Self::initialize) 相同，但使用外部共享的诊断计数器
    pub async fn initialize_with_diagnostics(
        store: Arc<dyn TableStore>,
        table: impl Into<String>,
        config: DeliveryConfig,
        diagnostics: Arc<Diagnostics>,
    ) -> Result<Self> {
        let table = table.into();
        TableNameValidator::validate(&table)?;

        let created = store.create_table_if_not_exists(&table).await.map_err(|e| {
            TableLogError::initialization(format!(
                "cannot create table '{}' on {} store: {}",
                table,
                store.name(),
                e
            ))
        })?;
        if created {
            info!("Created table {} on {} store", table, store.name());
        } else {
            debug!("Table {} already exists", table);
        }

        let (sender, receiver) = mpsc::channel(config.buffer_size.max(1));
        let last_fault: FaultSlot = Arc::new(Mutex::new(None));

        let processor = DeliveryProcessor {
            store,
            table: table.clone(),
            config,
            diagnostics: diagnostics.clone(),
            last_fault: last_fault.clone(),
        };
        let handle = tokio::spawn(processor.run(receiver));

        info!("Delivery manager started for table {}", table);
        Ok(Self {
            table,
            sender: RwLock::new(Some(sender)),
            processor_handle: tokio::sync::Mutex::new(Some(handle)),
            diagnostics,
            last_fault,
        })
    }

    /// 目标表名
    pub fn table(&self) -> &str {
        &self.table
    }

    /// 提交记录，从不阻塞也不返回错误
    ///
    /// 队列已满或已关闭时丢弃该记录并计数。
    pub fn submit(&self, record: LogRecord) {
        let guard = match self.sender.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        match guard.as_ref() {
            Some(sender) => match sender.try_send(record) {
                Ok(()) => self.diagnostics.increment_submitted(),
                Err(TrySendError::Full(_)) | Err(TrySendError::Closed(_)) => {
                    self.diagnostics.increment_dropped_backpressure();
                }
            },
            None => self.diagnostics.increment_dropped_backpressure(),
        }
    }

    /// 是否仍在接收记录
    pub fn is_running(&self) -> bool {
        match self.sender.read() {
            Ok(guard) => guard.as_ref().is_some_and(|s| !s.is_closed()),
            Err(_) => false,
        }
    }

    /// 诊断快照
    pub fn stats(&self) -> DeliverySnapshot {
        self.diagnostics.snapshot()
    }

    pub fn diagnostics(&self) -> Arc<Diagnostics> {
        self.diagnostics.clone()
    }

    /// 最近一次投递失败
    pub fn last_fault(&self) -> Option<DeliveryFault> {
        match self.last_fault.lock() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// 关闭队列，在宽限期内等待后台任务写完剩余记录
    ///
    /// 超时后中止后台任务，剩余记录被丢弃，返回 `ShutdownTimeout`。
    pub async fn shutdown(&self, grace: Duration) -> Result<()> {
        let sender = match self.sender.write() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        // 关闭通道，处理任务在取完剩余记录后退出
        drop(sender);

        let handle = self.processor_handle.lock().await.take();
        let Some(mut handle) = handle else {
            return Ok(());
        };

        match tokio::time::timeout(grace, &mut handle).await {
            Ok(Ok(())) => {
                info!("Delivery manager for table {} shut down", self.table);
                Ok(())
            }
            Ok(Err(e)) => {
                error!("Delivery processor task panicked: {}", e);
                Err(TableLogError::internal(format!("delivery processor failed: {}", e)))
            }
            Err(_) => {
                handle.abort();
                warn!(
                    "Delivery processor for table {} did not drain within {:?}, remaining records discarded",
                    self.table, grace
                );
                Err(TableLogError::ShutdownTimeout)
            }
        }
    }
}

/// 后台处理任务
struct DeliveryProcessor {
    store: Arc<dyn TableStore>,
    table: String,
    config: DeliveryConfig,
    diagnostics: Arc<Diagnostics>,
    last_fault: FaultSlot,
}

impl DeliveryProcessor {
    async fn run(self, mut receiver: mpsc::Receiver<LogRecord>) {
        let mut batch = RecordBatch::new();
        let batch_size = self.config.batch_size.max(1);
        let flush_every = self.config.flush_interval().max(Duration::from_millis(1));
        let mut flush_interval = interval(flush_every);
        flush_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("Delivery processor started for table {}", self.table);

        loop {
            tokio::select! {
                record = receiver.recv() => {
                    match record {
                        Some(record) => {
                            batch.push(record);
                            if batch.is_full(batch_size) {
                                self.flush_batch(&mut batch).await;
                            }
                        }
                        None => {
                            debug!("Delivery channel closed");
                            // 刷新剩余的批次
                            if !batch.is_empty() {
                                self.flush_batch(&mut batch).await;
                            }
                            break;
                        }
                    }
                }

                // 定期刷新检查
                _ = flush_interval.tick() => {
                    if !batch.is_empty() && batch.is_expired(flush_every) {
                        self.flush_batch(&mut batch).await;
                    }
                }
            }
        }

        debug!("Delivery processor stopped for table {}", self.table);
    }

    /// 逐条写入批次中的记录
    async fn flush_batch(&self, batch: &mut RecordBatch) {
        debug!("Flushing {} records to table {}", batch.len(), self.table);
        let records = batch.take();
        self.diagnostics.increment_batches();

        for record in records {
            match self.insert_with_retry(&record).await {
                Ok(()) => self.diagnostics.increment_delivered(),
                Err(e) => {
                    self.diagnostics.increment_dropped_error();
                    warn!(
                        "Dropping record {}/{} for table {}: {}",
                        record.partition_key, record.row_key, self.table, e
                    );
                    self.record_fault(&record, &e);
                }
            }
        }
    }

    /// 带指数退避的插入
    ///
    /// 只有可恢复错误会重试；重试时遇到实体已存在，说明此前的请求已经生效。
    async fn insert_with_retry(&self, record: &LogRecord) -> Result<()> {
        let entity = record.to_entity();
        let mut delay = self.config.retry_base_delay();
        let max_retries = self.config.max_retries;
        let mut attempt = 0;

        loop {
            match self.store.insert_entity(&self.table, &entity).await {
                Ok(()) => return Ok(()),
                Err(TableLogError::StoreRejected { status: 409, .. }) if attempt > 0 => {
                    return Ok(());
                }
                Err(e) if e.is_recoverable() && attempt < max_retries => {
                    debug!("Insert into {} failed, will retry: {}", self.table, e);
                }
                Err(e) => return Err(e),
            }

            attempt += 1;
            self.diagnostics.increment_retries();
            debug!(
                "Retrying insert into {} (attempt {}/{}) after {:?}",
                self.table, attempt, max_retries, delay
            );
            tokio::time::sleep(delay).await;
            delay = std::cmp::min(delay * 2, self.config.retry_max_delay());
        }
    }

    fn record_fault(&self, record: &LogRecord, error: &TableLogError) {
        let fault = DeliveryFault {
            partition_key: record.partition_key.clone(),
            row_key: record.row_key.clone(),
            category: error.category(),
            message: error.to_string(),
            at: Utc::now(),
        };
        match self.last_fault.lock() {
            Ok(mut slot) => *slot = Some(fault),
            Err(poisoned) => *poisoned.into_inner() = Some(fault),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{LogEvent, LogLevel};
    use crate::keys::{KeyTemplate, DEFAULT_PARTITION_KEY_TEMPLATE, DEFAULT_ROW_KEY_TEMPLATE};
    use crate::record::LogRecordBuilder;
    use crate::store::InMemoryTableStore;
    use std::time::Instant;

    fn record(message: &str) -> LogRecord {
        let event = LogEvent::new(LogLevel::Info, "X", message);
        LogRecordBuilder::new("host")
            .build(
                &event,
                message,
                &KeyTemplate::new(DEFAULT_PARTITION_KEY_TEMPLATE),
                &KeyTemplate::new(DEFAULT_ROW_KEY_TEMPLATE),
            )
            .unwrap()
    }

    fn fast_config() -> DeliveryConfig {
        DeliveryConfig {
            buffer_size: 100,
            batch_size: 10,
            flush_interval_ms: 20,
            max_retries: 3,
            retry_base_delay_ms: 5,
            retry_max_delay_ms: 20,
            shutdown_timeout_ms: 2000,
            request_timeout_ms: 1000,
        }
    }

    async fn wait_until<F: Fn() -> bool>(condition: F) {
        let deadline = Instant::now() + std::time::Duration::from_secs(5);
        while !condition() && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test]
    async fn test_initialize_creates_table() {
        let store = InMemoryTableStore::new();
        let manager = DeliveryManager::initialize(Arc::new(store.clone()), "Logs", fast_config())
            .await
            .unwrap();
        assert!(store.table_exists("Logs").await);
        assert!(manager.is_running());
        manager.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_initialize_fails_when_unreachable() {
        let store = InMemoryTableStore::new();
        store.set_unreachable(true);
        let err = DeliveryManager::initialize(Arc::new(store), "Logs", fast_config())
            .await
            .unwrap_err();
        assert!(matches!(err, TableLogError::InitializationError(_)));
    }

    #[tokio::test]
    async fn test_initialize_rejects_invalid_table_name() {
        let store = InMemoryTableStore::new();
        let err = DeliveryManager::initialize(Arc::new(store.clone()), "tables", fast_config())
            .await
            .unwrap_err();
        assert!(matches!(err, TableLogError::InvalidTableName(_)));
        assert!(!store.table_exists("tables").await);
    }

    #[tokio::test]
    async fn test_submitted_records_are_delivered() {
        let store = InMemoryTableStore::new();
        let manager = DeliveryManager::initialize(Arc::new(store.clone()), "Logs", fast_config())
            .await
            .unwrap();

        for i in 0..25 {
            manager.submit(record(&format!("message {}", i)));
        }
        wait_until(|| manager.stats().delivered == 25).await;

        let stats = manager.stats();
        assert_eq!(stats.submitted, 25);
        assert_eq!(stats.delivered, 25);
        assert!(stats.batches >= 3);
        assert_eq!(store.entity_count("Logs").await, Some(25));
        manager.shutdown(Duration::from_secs(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_submit_does_not_wait_for_slow_store() {
        let store = InMemoryTableStore::new();
        store.set_insert_delay(Duration::from_millis(200));
        let manager = DeliveryManager::initialize(Arc::new(store), "Logs", fast_config())
            .await
            .unwrap();

        let started = Instant::now();
        for i in 0..50 {
            manager.submit(record(&format!("message {}", i)));
        }
        assert!(started.elapsed() < std::time::Duration::from_millis(100));
        assert_eq!(manager.stats().submitted, 50);
    }

    #[tokio::test]
    async fn test_full_queue_drops_newest() {
        let store = InMemoryTableStore::new();
        store.set_insert_delay(Duration::from_millis(500));
        let config = DeliveryConfig {
            buffer_size: 2,
            batch_size: 1,
            ..fast_config()
        };
        let manager = DeliveryManager::initialize(Arc::new(store), "Logs", config)
            .await
            .unwrap();

        for i in 0..20 {
            manager.submit(record(&format!("message {}", i)));
        }
        let stats = manager.stats();
        assert!(stats.dropped_backpressure > 0);
        assert_eq!(stats.submitted + stats.dropped_backpressure, 20);
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let store = InMemoryTableStore::new();
        let manager = DeliveryManager::initialize(Arc::new(store.clone()), "Logs", fast_config())
            .await
            .unwrap();
        store.fail_next_inserts(2);

        manager.submit(record("flaky"));
        wait_until(|| manager.stats().delivered == 1).await;

        let stats = manager.stats();
        assert_eq!(stats.delivered, 1);
        assert_eq!(stats.retries, 2);
        assert_eq!(store.insert_attempts(), 3);
        assert!(manager.last_fault().is_none());
    }

    #[tokio::test]
    async fn test_exhausted_retries_drop_record() {
        let store = InMemoryTableStore::new();
        let manager = DeliveryManager::initialize(Arc::new(store.clone()), "Logs", fast_config())
            .await
            .unwrap();
        store.fail_next_inserts(100);

        manager.submit(record("doomed"));
        wait_until(|| manager.stats().dropped_error == 1).await;

        let stats = manager.stats();
        assert_eq!(stats.dropped_error, 1);
        assert_eq!(stats.delivered, 0);
        // 首次尝试 + 3 次重试
        assert_eq!(store.insert_attempts(), 4);

        let fault = manager.last_fault().unwrap();
        assert_eq!(fault.partition_key, "X");
        assert_eq!(fault.category, "store");
    }

    #[tokio::test]
    async fn test_rejected_records_are_not_retried() {
        let store = InMemoryTableStore::new();
        let manager = DeliveryManager::initialize(Arc::new(store.clone()), "Logs", fast_config())
            .await
            .unwrap();

        let first = record("once");
        manager.submit(first.clone());
        manager.submit(first);
        wait_until(|| manager.stats().dropped_error == 1).await;

        assert_eq!(store.insert_attempts(), 2);
        assert_eq!(manager.stats().retries, 0);
        assert_eq!(manager.stats().delivered, 1);
    }

    #[tokio::test]
    async fn test_shutdown_drains_pending_records() {
        let store = InMemoryTableStore::new();
        let config = DeliveryConfig {
            batch_size: 1000,
            flush_interval_ms: 60_000,
            ..fast_config()
        };
        let manager = DeliveryManager::initialize(Arc::new(store.clone()), "Logs", config)
            .await
            .unwrap();

        for i in 0..10 {
            manager.submit(record(&format!("message {}", i)));
        }
        manager.shutdown(Duration::from_secs(2)).await.unwrap();

        assert_eq!(store.entity_count("Logs").await, Some(10));
        assert!(!manager.is_running());

        // 关闭后的提交被丢弃
        manager.submit(record("late"));
        assert_eq!(manager.stats().dropped_backpressure, 1);
    }

    #[tokio::test]
    async fn test_shutdown_is_bounded_by_grace() {
        let store = InMemoryTableStore::new();
        store.set_insert_delay(Duration::from_millis(300));
        let config = DeliveryConfig {
            batch_size: 1,
            ..fast_config()
        };
        let manager = DeliveryManager::initialize(Arc::new(store), "Logs", config)
            .await
            .unwrap();

        for i in 0..20 {
            manager.submit(record(&format!("message {}", i)));
        }

        let started = Instant::now();
        let result = manager.shutdown(Duration::from_millis(100)).await;
        assert!(matches!(result, Err(TableLogError::ShutdownTimeout)));
        assert!(started.elapsed() < std::time::Duration::from_millis(1000));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_submit_from_many_threads() {
        let store = InMemoryTableStore::new();
        let config = DeliveryConfig {
            buffer_size: 1000,
            ..fast_config()
        };
        let manager = Arc::new(
            DeliveryManager::initialize(Arc::new(store.clone()), "Logs", config)
                .await
                .unwrap(),
        );

        let threads: Vec<_> = (0..8)
            .map(|t| {
                let manager = manager.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        manager.submit(record(&format!("thread {} message {}", t, i)));
                    }
                })
            })
            .collect();
        for thread in threads {
            thread.join().unwrap();
        }

        manager.shutdown(Duration::from_secs(5)).await.unwrap();

        let stats = manager.stats();
        assert_eq!(stats.submitted + stats.dropped_backpressure, 400);
        assert_eq!(stats.delivered, stats.submitted);
        assert_eq!(store.entity_count("Logs").await, Some(stats.delivered as usize));
    }

    #[tokio::test]
    async fn test_unreachable_store_does_not_block_submit() {
        let store = InMemoryTableStore::new();
        let manager = DeliveryManager::initialize(Arc::new(store.clone()), "Logs", fast_config())
            .await
            .unwrap();
        store.set_unreachable(true);

        let started = Instant::now();
        for i in 0..5 {
            manager.submit(record(&format!("message {}", i)));
        }
        assert!(started.elapsed() < std::time::Duration::from_millis(100));
        assert_eq!(manager.stats().submitted, 5);

        wait_until(|| manager.stats().dropped_error == 5).await;

        let stats = manager.stats();
        assert_eq!(stats.dropped_error, 5);
        assert_eq!(stats.delivered, 0);
        // 每条记录：首次尝试 + 3 次重试
        assert_eq!(stats.retries, 15);

        let fault = manager.last_fault().unwrap();
        assert_eq!(fault.category, "store");
        assert!(fault.message.starts_with("Table store unavailable"));
        manager.shutdown(Duration::from_secs(1)).await.unwrap();
    }
}
