//! 日志事件定义
//!
//! 此模块定义了写入表存储之前的上游事件结构，包括级别、错误链和调用栈。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 错误链中各层描述之间的分隔符
const CAUSE_SEPARATOR: &str = " ---> ";

/// 日志级别
///
/// 名称原样写入存储（例如 `Info`、`Error`）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
}

impl LogLevel {
    /// 存储使用的级别名称
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Trace => "Trace",
            LogLevel::Debug => "Debug",
            LogLevel::Info => "Info",
            LogLevel::Warn => "Warn",
            LogLevel::Error => "Error",
            LogLevel::Fatal => "Fatal",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "TRACE" => Ok(LogLevel::Trace),
            "DEBUG" => Ok(LogLevel::Debug),
            "INFO" => Ok(LogLevel::Info),
            "WARN" | "WARNING" => Ok(LogLevel::Warn),
            "ERROR" => Ok(LogLevel::Error),
            "FATAL" => Ok(LogLevel::Fatal),
            _ => Err(format!("Invalid log level: {}", s)),
        }
    }
}

impl From<tracing::Level> for LogLevel {
    fn from(level: tracing::Level) -> Self {
        match level {
            tracing::Level::TRACE => LogLevel::Trace,
            tracing::Level::DEBUG => LogLevel::Debug,
            tracing::Level::INFO => LogLevel::Info,
            tracing::Level::WARN => LogLevel::Warn,
            tracing::Level::ERROR => LogLevel::Error,
        }
    }
}

/// 事件携带的错误对象
///
/// 保存完整描述、附加数据（键值对）以及可选的内部原因。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    /// 完整描述，包含所有嵌套原因
    pub description: String,
    /// 附加数据，按插入顺序保存
    pub data: Vec<(String, String)>,
    /// 内部原因
    pub inner: Option<Box<ErrorInfo>>,
}

impl ErrorInfo {
    /// 使用描述创建错误信息（无内部原因）
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            data: Vec::new(),
            inner: None,
        }
    }

    /// 从标准错误类型构建，沿着 `source()` 链展开
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let inner = error.source().map(|cause| Box::new(Self::from_error(cause)));
        let description = match &inner {
            Some(cause) => format!("{}{}{}", error, CAUSE_SEPARATOR, cause.description),
            None => error.to_string(),
        };

        Self {
            description,
            data: Vec::new(),
            inner,
        }
    }

    /// 设置内部原因，并把原因的描述追加到自身描述
    pub fn with_inner(mut self, inner: ErrorInfo) -> Self {
        self.description = format!("{}{}{}", self.description, CAUSE_SEPARATOR, inner.description);
        self.inner = Some(Box::new(inner));
        self
    }

    /// 添加附加数据（同名键覆盖旧值）
    pub fn with_data(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        let key = key.into();
        let value = value.to_string();
        match self.data.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = value,
            None => self.data.push((key, value)),
        }
        self
    }

    /// 附加数据序列化为 `key=value` 行，每行以换行结尾
    pub fn data_as_string(&self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        let mut out = String::new();
        for (key, value) in &self.data {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        Some(out)
    }
}

impl fmt::Display for ErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}

/// 日志事件
///
/// 宿主日志框架交给 sink 的单条事件。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// 事件时间戳（UTC）
    pub timestamp: DateTime<Utc>,
    /// 日志级别
    pub level: LogLevel,
    /// 记录器名称
    pub logger_name: String,
    /// 已格式化的原始消息
    pub message: String,
    /// 错误对象
    pub error: Option<ErrorInfo>,
    /// 捕获的调用栈
    pub stack_trace: Option<String>,
    /// 结构化字段
    pub fields: BTreeMap<String, String>,
}

impl LogEvent {
    /// 使用当前时间创建新事件
    pub fn new(level: LogLevel, logger_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            level,
            logger_name: logger_name.into(),
            message: message.into(),
            error: None,
            stack_trace: None,
            fields: BTreeMap::new(),
        }
    }

    /// 设置时间戳
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// 设置错误对象
    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    /// 设置调用栈
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }

    /// 添加结构化字段
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}
