//! 投递诊断与指标
//!
//! 记录投递管理器和日志目标的运行状况，供外部查询。

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// 内部诊断计数器
///
/// 使用原子操作，可在写入线程和后台处理任务之间共享。
#[derive(Debug, Default)]
pub struct Diagnostics {
    /// 创建时间
    start_time: Option<Instant>,

    /// 成功进入队列的记录数
    submitted: AtomicU64,

    /// 成功写入存储的记录数
    delivered: AtomicU64,

    /// 因队列已满或已关闭而丢弃的记录数
    dropped_backpressure: AtomicU64,

    /// 重试耗尽或被存储拒绝而丢弃的记录数
    dropped_error: AtomicU64,

    /// 事件无法构建为记录（例如键不合法）而丢弃的数量
    dropped_invalid: AtomicU64,

    /// 初始化完成前被忽略的写入数
    ignored_uninitialized: AtomicU64,

    /// 重试次数
    retries: AtomicU64,

    /// 已处理批次数
    batches: AtomicU64,
}

/// 诊断数据快照
#[derive(Debug, Clone, PartialEq)]
pub struct DeliverySnapshot {
    pub uptime: Option<Duration>,
    pub submitted: u64,
    pub delivered: u64,
    pub dropped_backpressure: u64,
    pub dropped_error: u64,
    pub dropped_invalid: u64,
    pub ignored_uninitialized: u64,
    pub retries: u64,
    pub batches: u64,
    /// 总丢弃数（背压 + 错误 + 非法）
    pub total_dropped: u64,
    /// 投递成功率（百分比）
    pub success_rate_percent: f64,
}

impl Default for DeliverySnapshot {
    fn default() -> Self {
        Self {
            uptime: None,
            submitted: 0,
            delivered: 0,
            dropped_backpressure: 0,
            dropped_error: 0,
            dropped_invalid: 0,
            ignored_uninitialized: 0,
            retries: 0,
            batches: 0,
            total_dropped: 0,
            success_rate_percent: 100.0,
        }
    }
}

impl Diagnostics {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn increment_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_delivered(&self) {
        self.delivered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dropped_backpressure(&self) {
        self.dropped_backpressure.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dropped_error(&self) {
        self.dropped_error.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_dropped_invalid(&self) {
        self.dropped_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_ignored_uninitialized(&self) {
        self.ignored_uninitialized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn increment_batches(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
    }

    /// 获取快照
    pub fn snapshot(&self) -> DeliverySnapshot {
        let delivered = self.delivered.load(Ordering::Relaxed);
        let dropped_backpressure = self.dropped_backpressure.load(Ordering::Relaxed);
        let dropped_error = self.dropped_error.load(Ordering::Relaxed);
        let dropped_invalid = self.dropped_invalid.load(Ordering::Relaxed);
        let total_dropped = dropped_backpressure + dropped_error + dropped_invalid;

        let success_rate_percent = if delivered + total_dropped > 0 {
            (delivered as f64 / (delivered + total_dropped) as f64) * 100.0
        } else {
            100.0
        };

        DeliverySnapshot {
            uptime: self.start_time.map(|start| start.elapsed()),
            submitted: self.submitted.load(Ordering::Relaxed),
            delivered,
            dropped_backpressure,
            dropped_error,
            dropped_invalid,
            ignored_uninitialized: self.ignored_uninitialized.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            batches: self.batches.load(Ordering::Relaxed),
            total_dropped,
            success_rate_percent,
        }
    }
}
