//! 待写入记录的批次

use crate::record::LogRecord;
use tokio::time::{Duration, Instant};

/// 日志记录批次
#[derive(Debug)]
pub(crate) struct RecordBatch {
    records: Vec<LogRecord>,
    /// 第一条记录进入批次的时间
    created_at: Instant,
}

impl RecordBatch {
    pub(crate) fn new() -> Self {
        Self {
            records: Vec::new(),
            created_at: Instant::now(),
        }
    }

    pub(crate) fn push(&mut self, record: LogRecord) {
        if self.records.is_empty() {
            self.created_at = Instant::now();
        }
        self.records.push(record);
    }

    /// 检查批次是否已满
    pub(crate) fn is_full(&self, max_size: usize) -> bool {
        self.records.len() >= max_size
    }

    /// 检查批次是否过期
    pub(crate) fn is_expired(&self, max_age: Duration) -> bool {
        self.created_at.elapsed() >= max_age
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    /// 取出全部记录并重置批次
    pub(crate) fn take(&mut self) -> Vec<LogRecord> {
        self.created_at = Instant::now();
        std::mem::take(&mut self.records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{LogEvent, LogLevel};
    use crate::keys::KeyTemplate;
    use crate::record::LogRecordBuilder;

    fn record(n: usize) -> LogRecord {
        let event = LogEvent::new(LogLevel::Info, "batch", format!("message {}", n));
        LogRecordBuilder::new("host")
            .build(
                &event,
                "",
                &KeyTemplate::new("p"),
                &KeyTemplate::new(format!("r{}", n)),
            )
            .unwrap()
    }

    #[test]
    fn test_full_and_take() {
        let mut batch = RecordBatch::new();
        assert!(batch.is_empty());
        batch.push(record(1));
        batch.push(record(2));
        assert!(!batch.is_full(3));
        batch.push(record(3));
        assert!(batch.is_full(3));
        assert_eq!(batch.len(), 3);

        let records = batch.take();
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].row_key, "r1");
        assert!(batch.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_expiry() {
        let mut batch = RecordBatch::new();
        batch.push(record(1));
        assert!(!batch.is_expired(Duration::from_millis(100)));
        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(batch.is_expired(Duration::from_millis(100)));
    }
}
