//! 时间格式化

use crate::error::{Result, TableLogError};
use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt::Write;

/// 检查 strftime 格式串是否可用
pub fn validate_timestamp_format(format: &str) -> Result<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(TableLogError::config(format!(
            "timestamp_format 无效: '{}'",
            format
        )));
    }
    Ok(())
}

/// 按格式渲染时间，格式无效时退回 RFC 3339
pub fn format_timestamp(timestamp: &DateTime<Utc>, format: &str) -> String {
    let mut out = String::new();
    if write!(out, "{}", timestamp.format(format)).is_err() {
        return timestamp.to_rfc3339_opts(SecondsFormat::Millis, true);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_validate_timestamp_format() {
        assert!(validate_timestamp_format("%Y-%m-%d %H:%M:%S%.3f").is_ok());
        assert!(validate_timestamp_format("%d/%m/%Y").is_ok());

        let err = validate_timestamp_format("%Q").unwrap_err();
        assert!(matches!(err, TableLogError::ConfigError(_)));
    }

    #[test]
    fn test_invalid_format_falls_back() {
        let ts = Utc.with_ymd_and_hms(2014, 3, 4, 5, 6, 7).unwrap();
        assert_eq!(format_timestamp(&ts, "%Y/%m/%d"), "2014/03/04");
        assert_eq!(format_timestamp(&ts, "%Q"), "2014-03-04T05:06:07.000Z");
    }
}
