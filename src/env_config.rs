//! 环境变量配置模块
//!
//! 此模块提供从环境变量和文件安全读取连接字符串的功能。

use crate::error::Result;
use std::env;
use std::fs;
use std::path::Path;

/// 文件引用变量的后缀，例如 `StorageConnection_FILE=/run/secrets/storage`
const FILE_SUFFIX: &str = "_FILE";

/// 环境变量配置管理器
pub struct EnvConfig;

impl EnvConfig {
    /// 按名称读取连接字符串
    ///
    /// 先读取同名环境变量，再读取 `{name}_FILE` 指向的文件内容。
    pub fn get_connection_string(name: &str) -> Result<Option<String>> {
        if let Ok(value) = env::var(name) {
            if !value.trim().is_empty() {
                return Ok(Some(value));
            }
        }

        let Ok(path) = env::var(format!("{}{}", name, FILE_SUFFIX)) else {
            return Ok(None);
        };
        let path = Path::new(&path);
        if !path.exists() {
            tracing::warn!("Connection string file {} does not exist", path.display());
            return Ok(None);
        }

        let content = fs::read_to_string(path)?;
        let value = content.trim().to_string();
        Ok((!value.is_empty()).then_some(value))
    }

    /// 从环境变量读取机器名覆盖值
    pub fn get_machine_name() -> Option<String> {
        env::var("AZURE_TABLE_LOG_MACHINE_NAME")
            .ok()
            .filter(|s| !s.is_empty())
    }
}
