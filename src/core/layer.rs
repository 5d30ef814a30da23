//! tracing 桥接层
//!
//! 把 tracing 事件转换为 [`LogEvent`] 并写入日志目标：
//!
//! - `message` 字段为原始消息
//! - 通过 `record_error` 记录的 `error` 字段成为错误信息，`error.<key>` 字段成为附加数据
//! - `stack_trace` 字段为调用栈
//! - 事件的 target 作为记录器名称

use crate::core::event::{ErrorInfo, LogEvent, LogLevel};
use crate::sinks::traits::LogTarget;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::Event;
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

const MESSAGE_FIELD: &str = "message";
const ERROR_FIELD: &str = "error";
const ERROR_DATA_PREFIX: &str = "error.";
const STACK_TRACE_FIELD: &str = "stack_trace";

/// 不转发的事件 target 前缀，避免投递过程产生的日志写回自身
const IGNORED_TARGET_PREFIXES: &[&str] = &["azure_table_log", "reqwest", "hyper", "h2", "rustls"];

/// 表存储桥接层
#[derive(Debug, Clone)]
pub struct TableStorageLayer {
    target: Arc<dyn LogTarget>,
    min_level: LogLevel,
}

impl TableStorageLayer {
    pub fn new(target: Arc<dyn LogTarget>) -> Self {
        Self {
            target,
            min_level: LogLevel::Trace,
        }
    }

    /// 低于该级别的事件不转发
    pub fn with_min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    pub fn target(&self) -> &Arc<dyn LogTarget> {
        &self.target
    }
}

/// 是否为内部事件
pub fn is_internal_target(target: &str) -> bool {
    IGNORED_TARGET_PREFIXES.iter().any(|prefix| {
        target
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
    })
}

impl<S> Layer<S> for TableStorageLayer
where
    S: tracing::Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let metadata = event.metadata();
        if is_internal_target(metadata.target()) {
            return;
        }

        let level = LogLevel::from(*metadata.level());
        if level < self.min_level {
            return;
        }

        self.target.write(convert_event(event, level));
    }
}

/// 将 tracing 事件转换为日志事件
pub fn convert_event(event: &Event<'_>, level: LogLevel) -> LogEvent {
    let mut visitor = EventVisitor::default();
    event.record(&mut visitor);

    let mut log_event = LogEvent::new(level, event.metadata().target(), visitor.message);

    if let Some(mut error) = visitor.error {
        for (key, value) in visitor.error_data {
            error = error.with_data(key, value);
        }
        log_event = log_event.with_error(error);
    } else {
        // 没有错误对象时，`error.*` 字段按普通字段保存
        for (key, value) in visitor.error_data {
            log_event = log_event.with_field(format!("{}{}", ERROR_DATA_PREFIX, key), value);
        }
    }

    if let Some(stack_trace) = visitor.stack_trace {
        log_event = log_event.with_stack_trace(stack_trace);
    }
    for (key, value) in visitor.fields {
        log_event = log_event.with_field(key, value);
    }
    log_event
}

#[derive(Default)]
struct EventVisitor {
    message: String,
    error: Option<ErrorInfo>,
    error_data: Vec<(String, String)>,
    stack_trace: Option<String>,
    fields: BTreeMap<String, String>,
}

impl EventVisitor {
    fn record_value(&mut self, field: &Field, value: String) {
        let name = field.name();
        if name == MESSAGE_FIELD {
            self.message = value;
        } else if name == STACK_TRACE_FIELD {
            self.stack_trace = Some(value);
        } else if name == ERROR_FIELD {
            // `error = %e` 之类的非错误类型值
            if self.error.is_none() {
                self.error = Some(ErrorInfo::new(value));
            }
        } else if let Some(key) = name.strip_prefix(ERROR_DATA_PREFIX) {
            self.error_data.push((key.to_string(), value));
        } else {
            self.fields.insert(name.to_string(), value);
        }
    }
}

impl Visit for EventVisitor {
    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.record_value(field, format!("{:?}", value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.record_value(field, value.to_string());
    }

    fn record_error(&mut self, field: &Field, value: &(dyn std::error::Error + 'static)) {
        if field.name() == ERROR_FIELD || self.error.is_none() {
            self.error = Some(ErrorInfo::from_error(value));
        } else {
            self.record_value(field, value.to_string());
        }
    }
}
