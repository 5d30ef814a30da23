//! 日志记录构建
//!
//! 把单条 [`LogEvent`] 转换为写入表存储的 [`LogRecord`]。构建过程不持有
//! 任何共享可变状态，可在任意线程并发调用。

use crate::core::event::LogEvent;
use crate::error::Result;
use crate::keys::{validate_key, KeyContext, KeyTemplate};
use crate::store::TableEntity;
use crate::utils::format_timestamp;
use serde::{Deserialize, Serialize};

/// 默认的展示时间格式
pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 写入存储的日志记录
///
/// 构建后不可变，只会被插入一次。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct LogRecord {
    pub partition_key: String,
    pub row_key: String,
    /// 展示用时间
    #[serde(rename = "LogTimeStamp")]
    pub timestamp: String,
    pub level: String,
    pub logger_name: String,
    pub message: String,
    pub message_with_layout: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exception: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub inner_exception: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub exception_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub stack_trace: Option<String>,
    pub machine_name: String,
}

impl LogRecord {
    /// 转换为存储实体，缺失的可选字段不会出现在实体中
    pub fn to_entity(&self) -> TableEntity {
        let mut entity = TableEntity::new(&self.partition_key, &self.row_key)
            .with_property("LogTimeStamp", &self.timestamp)
            .with_property("Level", &self.level)
            .with_property("LoggerName", &self.logger_name)
            .with_property("Message", &self.message)
            .with_property("MessageWithLayout", &self.message_with_layout)
            .with_property("MachineName", &self.machine_name);

        let optional = [
            ("Exception", &self.exception),
            ("InnerException", &self.inner_exception),
            ("ExceptionData", &self.exception_data),
            ("StackTrace", &self.stack_trace),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                entity = entity.with_property(name, value);
            }
        }
        entity
    }
}

/// 日志记录构建器
#[derive(Debug, Clone)]
pub struct LogRecordBuilder {
    machine_name: String,
    timestamp_format: String,
}

impl LogRecordBuilder {
    pub fn new(machine_name: impl Into<String>) -> Self {
        Self {
            machine_name: machine_name.into(),
            timestamp_format: DEFAULT_TIMESTAMP_FORMAT.to_string(),
        }
    }

    /// 设置展示时间格式（chrono strftime 语法）
    pub fn with_timestamp_format(mut self, format: impl Into<String>) -> Self {
        self.timestamp_format = format.into();
        self
    }

    pub fn machine_name(&self) -> &str {
        &self.machine_name
    }

    /// 构建记录
    ///
    /// 键解析后必须满足存储约束，否则返回 `InvalidKey`。
    pub fn build(
        &self,
        event: &LogEvent,
        rendered_message: &str,
        partition_template: &KeyTemplate,
        row_template: &KeyTemplate,
    ) -> Result<LogRecord> {
        let context = KeyContext::new(event.timestamp, &event.logger_name, &self.machine_name);

        let partition_key = partition_template.resolve(&context);
        validate_key("partition", &partition_key)?;
        let row_key = row_template.resolve(&context);
        validate_key("row", &row_key)?;

        let (exception, inner_exception, exception_data) = match &event.error {
            Some(error) => (
                Some(error.description.clone()),
                error.inner.as_ref().map(|inner| inner.description.clone()),
                error.data_as_string(),
            ),
            None => (None, None, None),
        };

        Ok(LogRecord {
            partition_key,
            row_key,
            timestamp: format_timestamp(&event.timestamp, &self.timestamp_format),
            level: event.level.name().to_string(),
            logger_name: event.logger_name.clone(),
            message: event.message.clone(),
            message_with_layout: rendered_message.to_string(),
            exception,
            inner_exception,
            exception_data,
            stack_trace: event.stack_trace.clone(),
            machine_name: self.machine_name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::event::{ErrorInfo, LogLevel};
    use crate::error::TableLogError;
    use crate::keys::{DEFAULT_PARTITION_KEY_TEMPLATE, DEFAULT_ROW_KEY_TEMPLATE};
    use chrono::TimeZone;

    fn defaults() -> (KeyTemplate, KeyTemplate) {
        (
            KeyTemplate::new(DEFAULT_PARTITION_KEY_TEMPLATE),
            KeyTemplate::new(DEFAULT_ROW_KEY_TEMPLATE),
        )
    }

    #[test]
    fn test_build_plain_event() {
        let (pk, rk) = defaults();
        let ts = chrono::Utc.with_ymd_and_hms(2014, 1, 1, 12, 30, 0).unwrap();
        let event = LogEvent::new(LogLevel::Info, "X", "information").with_timestamp(ts);

        let record = LogRecordBuilder::new("host-1")
            .build(&event, "rendered information", &pk, &rk)
            .unwrap();

        assert_eq!(record.partition_key, "X");
        assert_eq!(record.level, "Info");
        assert_eq!(record.logger_name, "X");
        assert_eq!(record.message, "information");
        assert_eq!(record.message_with_layout, "rendered information");
        assert_eq!(record.machine_name, "host-1");
        assert_eq!(record.timestamp, "2014-01-01 12:30:00.000");
        assert!(record.exception.is_none());
        assert!(record.inner_exception.is_none());
        assert!(record.exception_data.is_none());
        assert!(record.stack_trace.is_none());

        // descticks(19) + "__" + guid(32)
        assert_eq!(record.row_key.len(), 19 + 2 + 32);
    }

    #[test]
    fn test_exception_data_lines() {
        let (pk, rk) = defaults();
        let error = ErrorInfo::new("boom")
            .with_data("id", "42")
            .with_data("name", "ahmed");
        let event = LogEvent::new(LogLevel::Error, "X", "failed").with_error(error);

        let record = LogRecordBuilder::new("host").build(&event, "", &pk, &rk).unwrap();
        let data = record.exception_data.unwrap();
        assert!(data.contains("id=42\n"));
        assert!(data.contains("name=ahmed\n"));
        assert_eq!(record.exception.as_deref(), Some("boom"));
        assert!(record.inner_exception.is_none());
    }

    #[test]
    fn test_inner_exception() {
        let (pk, rk) = defaults();
        let inner = ErrorInfo::new("Attempted to divide by zero.");
        let error = ErrorInfo::new("Object reference not set").with_inner(inner.clone());
        let event = LogEvent::new(LogLevel::Error, "X", "failed").with_error(error.clone());

        let record = LogRecordBuilder::new("host").build(&event, "", &pk, &rk).unwrap();
        assert_eq!(record.inner_exception, Some(inner.description));
        assert_eq!(record.exception, Some(error.description));
        assert!(record.exception_data.is_none());
    }

    #[test]
    fn test_custom_templates_and_timestamp_format() {
        let ts = chrono::Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap();
        let event = LogEvent::new(LogLevel::Warn, "svc", "m").with_timestamp(ts);
        let pk = KeyTemplate::new("Test.${logger}");
        let rk = KeyTemplate::new("${date}-${machine}");

        let record = LogRecordBuilder::new("box")
            .with_timestamp_format("%d/%m/%Y")
            .build(&event, "", &pk, &rk)
            .unwrap();
        assert_eq!(record.partition_key, "Test.svc");
        assert_eq!(record.row_key, "20200506-box");
        assert_eq!(record.timestamp, "06/05/2020");
        assert_eq!(record.level, "Warn");
    }

    #[test]
    fn test_unusable_timestamp_format_does_not_panic() {
        let (pk, rk) = defaults();
        let ts = chrono::Utc.with_ymd_and_hms(2020, 5, 6, 7, 8, 9).unwrap();
        let event = LogEvent::new(LogLevel::Info, "X", "hello").with_timestamp(ts);

        let record = LogRecordBuilder::new("host")
            .with_timestamp_format("%Q")
            .build(&event, "", &pk, &rk)
            .unwrap();
        assert_eq!(record.timestamp, "2020-05-06T07:08:09.000Z");
    }

    #[test]
    fn test_invalid_resolved_key() {
        let event = LogEvent::new(LogLevel::Info, "a/b", "m");
        let (pk, rk) = defaults();
        let err = LogRecordBuilder::new("host").build(&event, "", &pk, &rk).unwrap_err();
        assert!(matches!(err, TableLogError::InvalidKey { kind: "partition", .. }));
    }

    #[test]
    fn test_entity_omits_absent_fields() {
        let (pk, rk) = defaults();
        let event = LogEvent::new(LogLevel::Info, "X", "information");
        let entity = LogRecordBuilder::new("host")
            .build(&event, "layout", &pk, &rk)
            .unwrap()
            .to_entity();

        assert_eq!(entity.get("Level"), Some("Info"));
        assert_eq!(entity.get("MessageWithLayout"), Some("layout"));
        assert!(entity.get("LogTimeStamp").is_some());
        for absent in ["Exception", "InnerException", "ExceptionData", "StackTrace"] {
            assert!(entity.get(absent).is_none(), "{} should be omitted", absent);
        }
    }

    #[test]
    fn test_record_serializes_with_store_names() {
        let (pk, rk) = defaults();
        let event = LogEvent::new(LogLevel::Info, "X", "m").with_stack_trace("at main");
        let record = LogRecordBuilder::new("host").build(&event, "", &pk, &rk).unwrap();

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["LoggerName"], "X");
        assert_eq!(json["StackTrace"], "at main");
        assert!(json.get("LogTimeStamp").is_some());
        assert!(json.get("Exception").is_none());
    }
}
