//! 表名与键的本地校验
//!
//! 在任何写入之前拦截存储端会拒绝的表名和键。

use crate::error::{Result, TableLogError};

/// 表名最小长度
pub const MIN_TABLE_NAME_LEN: usize = 3;
/// 表名最大长度
pub const MAX_TABLE_NAME_LEN: usize = 63;
/// 分区键/行键的最大字节数
pub const MAX_KEY_LEN: usize = 1024;

/// 存储保留的表名（不区分大小写）
const RESERVED_TABLE_NAMES: &[&str] = &["tables"];

/// 表名校验器
#[derive(Debug, Clone, Copy, Default)]
pub struct TableNameValidator;

impl TableNameValidator {
    /// 表名是否满足存储的命名规则
    pub fn is_valid(name: &str) -> bool {
        let len = name.chars().count();
        if !(MIN_TABLE_NAME_LEN..=MAX_TABLE_NAME_LEN).contains(&len) {
            return false;
        }

        let mut chars = name.chars();
        match chars.next() {
            Some(first) if first.is_ascii_alphabetic() => {}
            _ => return false,
        }
        if !chars.all(|c| c.is_ascii_alphanumeric()) {
            return false;
        }

        !RESERVED_TABLE_NAMES
            .iter()
            .any(|reserved| reserved.eq_ignore_ascii_case(name))
    }

    /// 校验表名，失败时返回致命配置错误
    pub fn validate(name: &str) -> Result<()> {
        if Self::is_valid(name) {
            Ok(())
        } else {
            Err(TableLogError::InvalidTableName(name.to_string()))
        }
    }
}

/// 校验解析后的键
///
/// `kind` 取 "partition" 或 "row"，仅用于错误信息。
pub fn validate_key(kind: &'static str, key: &str) -> Result<()> {
    let invalid = |reason: String| TableLogError::InvalidKey {
        kind,
        key: key.to_string(),
        reason,
    };

    if key.is_empty() {
        return Err(invalid("key is empty".to_string()));
    }
    if key.len() > MAX_KEY_LEN {
        return Err(invalid(format!(
            "key is {} bytes, limit is {}",
            key.len(),
            MAX_KEY_LEN
        )));
    }
    if let Some(c) = key.chars().find(|c| is_forbidden_key_char(*c)) {
        return Err(invalid(format!("contains forbidden character {:?}", c)));
    }
    Ok(())
}

fn is_forbidden_key_char(c: char) -> bool {
    matches!(c, '/' | '\\' | '#' | '?') || matches!(c as u32, 0x00..=0x1F | 0x7F..=0x9F)
}
