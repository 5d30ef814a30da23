//! 消息布局渲染
//!
//! 将事件渲染为 `MessageWithLayout` 字段的展示文本。

use crate::core::event::LogEvent;
use crate::utils::format_timestamp;

/// 布局模板
///
/// 支持的占位符：`{timestamp}`、`{level}`、`{logger}`、`{message}`、
/// `{machine}`、`{exception}`、`{stacktrace}`，以及事件中任意同名字段。
/// 无法识别的占位符原样保留。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    template: String,
    timestamp_format: String,
}

impl Layout {
    pub fn new(template: impl Into<String>, timestamp_format: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            timestamp_format: timestamp_format.into(),
        }
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// 渲染单个事件
    pub fn render(&self, event: &LogEvent, machine_name: &str) -> String {
        let mut out = String::with_capacity(self.template.len() + event.message.len());
        let mut rest = self.template.as_str();

        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                out.push_str(&rest[start..]);
                return out;
            };

            let name = &after[..end];
            match self.placeholder(name, event, machine_name) {
                Some(value) => {
                    out.push_str(&value);
                    rest = &after[end + 1..];
                }
                None => {
                    out.push('{');
                    rest = after;
                }
            }
        }

        out.push_str(rest);
        out
    }

    fn placeholder(&self, name: &str, event: &LogEvent, machine_name: &str) -> Option<String> {
        let value = match name {
            "timestamp" => format_timestamp(&event.timestamp, &self.timestamp_format),
            "level" => event.level.name().to_string(),
            "logger" => event.logger_name.clone(),
            "message" => event.message.clone(),
            "machine" => machine_name.to_string(),
            "exception" => event
                .error
                .as_ref()
                .map(|e| e.description.clone())
                .unwrap_or_default(),
            "stacktrace" => event.stack_trace.clone().unwrap_or_default(),
            other => return event.fields.get(other).cloned(),
        };
        Some(value)
    }
}
