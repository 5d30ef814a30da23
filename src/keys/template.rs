//! 键模板引擎
//!
//! 将包含 `${token}` 占位符的模板解析为分区键/行键字符串。
//!
//! 所有数字字段都是定宽补零的，因此存储端按字符串比较即可得到时间顺序。
//! 解析是单遍扫描：替换进来的值不会被再次扫描，未知占位符原样保留。

use chrono::{DateTime, Utc};
use std::fmt;

/// 1970-01-01T00:00:00Z 距离 0001-01-01T00:00:00Z 的 tick 数（1 tick = 100ns）
pub const UNIX_EPOCH_TICKS: i64 = 621_355_968_000_000_000;

/// 可表示的最大 tick 值（9999-12-31T23:59:59.9999999Z）
pub const MAX_TICKS: i64 = 3_155_378_975_999_999_999;

/// 每秒的 tick 数
const TICKS_PER_SECOND: i64 = 10_000_000;

/// 默认分区键模板
pub const DEFAULT_PARTITION_KEY_TEMPLATE: &str = "${logger}";

/// 默认行键模板：降序 tick + 随机标识
pub const DEFAULT_ROW_KEY_TEMPLATE: &str = "${descticks}__${guid}";

/// 模板占位符
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Token {
    Date,
    Time,
    Ticks,
    DescTicks,
    LongDate,
    Micros,
    Guid,
    Logger,
    Machine,
}

impl Token {
    /// 按名称查找占位符（区分大小写）
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "date" => Some(Token::Date),
            "time" => Some(Token::Time),
            "ticks" => Some(Token::Ticks),
            "descticks" => Some(Token::DescTicks),
            "longdate" => Some(Token::LongDate),
            "micros" => Some(Token::Micros),
            "guid" => Some(Token::Guid),
            "logger" | "loggername" => Some(Token::Logger),
            "machine" => Some(Token::Machine),
            _ => None,
        }
    }

    fn render(&self, context: &KeyContext<'_>, out: &mut String) {
        let ts = context.timestamp;
        match self {
            Token::Date => out.push_str(&ts.format("%Y%m%d").to_string()),
            Token::Time => out.push_str(&ts.format("%H%M%S").to_string()),
            Token::Ticks => out.push_str(&format!("{:019}", ticks(ts))),
            Token::DescTicks => out.push_str(&format!("{:019}", desc_ticks(ts))),
            Token::LongDate => out.push_str(&ts.format("%Y%m%d%H%M%S%6f").to_string()),
            Token::Micros => out.push_str(&ts.format("%6f").to_string()),
            Token::Guid => out.push_str(&new_guid()),
            Token::Logger => out.push_str(context.logger_name),
            Token::Machine => out.push_str(context.machine_name),
        }
    }
}

/// 模板解析所需的事件上下文
#[derive(Debug, Clone, Copy)]
pub struct KeyContext<'a> {
    /// 事件时间戳（UTC）
    pub timestamp: DateTime<Utc>,
    /// 记录器名称
    pub logger_name: &'a str,
    /// 机器名称
    pub machine_name: &'a str,
}

impl<'a> KeyContext<'a> {
    pub fn new(timestamp: DateTime<Utc>, logger_name: &'a str, machine_name: &'a str) -> Self {
        Self {
            timestamp,
            logger_name,
            machine_name,
        }
    }
}

/// 键模板
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyTemplate {
    raw: String,
}

impl KeyTemplate {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into() }
    }

    /// 空白模板回退到给定默认值
    pub fn or_default(raw: Option<&str>, default: &str) -> Self {
        match raw {
            Some(value) if !value.trim().is_empty() => Self::new(value),
            _ => Self::new(default),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// 解析模板
    pub fn resolve(&self, context: &KeyContext<'_>) -> String {
        resolve(&self.raw, context)
    }
}

impl fmt::Display for KeyTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// 单遍解析模板
pub fn resolve(template: &str, context: &KeyContext<'_>) -> String {
    let mut out = String::with_capacity(template.len() + 48);
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after_open = &rest[start + 2..];

        let token = after_open
            .find('}')
            .and_then(|end| Token::from_name(&after_open[..end]).map(|token| (token, end)));

        match token {
            Some((token, end)) => {
                token.render(context, &mut out);
                rest = &after_open[end + 1..];
            }
            None => {
                // 未知占位符：保留 "${" 并从其后继续扫描
                out.push_str("${");
                rest = after_open;
            }
        }
    }

    out.push_str(rest);
    out
}

/// 时间戳对应的 tick 数，早于纪元的时间截断为 0
pub fn ticks(timestamp: DateTime<Utc>) -> i64 {
    let value = UNIX_EPOCH_TICKS as i128
        + timestamp.timestamp() as i128 * TICKS_PER_SECOND as i128
        + (timestamp.timestamp_subsec_nanos() / 100) as i128;
    value.clamp(0, MAX_TICKS as i128) as i64
}

/// 降序 tick 数
pub fn desc_ticks(timestamp: DateTime<Utc>) -> i64 {
    MAX_TICKS - ticks(timestamp)
}

/// 32 位十六进制的随机标识，每次调用都重新生成
pub fn new_guid() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
