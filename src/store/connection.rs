//! 存储连接字符串解析
//!
//! 支持 `key=value;` 形式的账户连接字符串，以及本地模拟器的简写
//! `UseDevelopmentStorage=true`。

use crate::error::{Result, TableLogError};
use std::collections::HashMap;
use std::fmt;

/// 本地模拟器账户名
pub const DEV_STORE_ACCOUNT: &str = "devstoreaccount1";
/// 本地模拟器的公开账户密钥
pub const DEV_STORE_ACCOUNT_KEY: &str =
    "Eby8vdM02xNOcqFlqUwJPLlmEtlCDXJ1OUzFT50uSRZ6IFsuFq2UVErCz4I6tq/K1SZFPTOtr/KBHBeksoGMGw==";
/// 本地模拟器的表服务地址
pub const DEV_STORE_TABLE_ENDPOINT: &str = "http://127.0.0.1:10002/devstoreaccount1";

fn default_endpoint_suffix() -> &'static str {
    "core.windows.net"
}

/// 已解析的连接字符串
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    /// 账户名
    pub account_name: String,
    /// Base64 编码的账户密钥
    pub account_key: String,
    /// 表服务地址（不带结尾斜杠）
    pub table_endpoint: String,
}

// 安全的Debug实现，避免泄露账户密钥
impl fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionString")
            .field("account_name", &self.account_name)
            .field("account_key", &"[REDACTED]")
            .field("table_endpoint", &self.table_endpoint)
            .finish()
    }
}

impl ConnectionString {
    /// 本地模拟器连接
    pub fn development() -> Self {
        Self {
            account_name: DEV_STORE_ACCOUNT.to_string(),
            account_key: DEV_STORE_ACCOUNT_KEY.to_string(),
            table_endpoint: DEV_STORE_TABLE_ENDPOINT.to_string(),
        }
    }

    /// 解析连接字符串
    pub fn parse(raw: &str) -> Result<Self> {
        let mut settings: HashMap<String, String> = HashMap::new();
        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (key, value) = part.split_once('=').ok_or_else(|| {
                TableLogError::connection_string(format!("malformed setting '{}'", part))
            })?;
            settings.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
        }

        if settings
            .get("usedevelopmentstorage")
            .is_some_and(|v| v.eq_ignore_ascii_case("true"))
        {
            return Ok(Self::development());
        }

        let account_name = settings
            .remove("accountname")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TableLogError::connection_string("missing AccountName"))?;
        let account_key = settings
            .remove("accountkey")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| TableLogError::connection_string("missing AccountKey"))?;

        let table_endpoint = match settings.remove("tableendpoint") {
            Some(endpoint) if !endpoint.is_empty() => endpoint,
            _ => {
                let protocol = settings
                    .remove("defaultendpointsprotocol")
                    .unwrap_or_else(|| "https".to_string());
                if protocol != "https" && protocol != "http" {
                    return Err(TableLogError::connection_string(format!(
                        "unsupported DefaultEndpointsProtocol '{}'",
                        protocol
                    )));
                }
                let suffix = settings
                    .remove("endpointsuffix")
                    .unwrap_or_else(|| default_endpoint_suffix().to_string());
                format!("{}://{}.table.{}", protocol, account_name, suffix)
            }
        };

        Ok(Self {
            account_name,
            account_key,
            table_endpoint: table_endpoint.trim_end_matches('/').to_string(),
        })
    }
}

impl std::str::FromStr for ConnectionString {
    type Err = TableLogError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
