//! 机器名探测

use crate::env_config::EnvConfig;

/// 获取当前机器名
///
/// 优先使用 `AZURE_TABLE_LOG_MACHINE_NAME`，否则使用系统主机名。
pub fn get_machine_name() -> String {
    EnvConfig::get_machine_name().unwrap_or_else(get_hostname)
}

/// 获取系统主机名
pub fn get_hostname() -> String {
    hostname::get()
        .map(|name| name.to_string_lossy().into_owned())
        .ok()
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "unknown".to_string())
}
