//! Azure Table Storage 实现
//!
//! 通过 REST 接口访问表服务，使用 SharedKeyLite 签名认证。
//! 仅使用建表、插入和按分区查询三个操作。

use super::connection::ConnectionString;
use super::{TableEntity, TableStore};
use crate::error::{Result, TableLogError};
use async_trait::async_trait;
use base64::Engine;
use hmac::{Hmac, Mac};
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{header, Method, StatusCode, Url};
use serde::Deserialize;
use sha2::Sha256;
use std::time::Duration;
use tracing::debug;

type HmacSha256 = Hmac<Sha256>;

/// 表服务 REST 版本
const API_VERSION: &str = "2019-02-02";
const ACCEPT_NO_METADATA: &str = "application/json;odata=nometadata";
const DATA_SERVICE_VERSION: &str = "3.0;NetFx";
const CONTINUATION_PARTITION: &str = "x-ms-continuation-NextPartitionKey";
const CONTINUATION_ROW: &str = "x-ms-continuation-NextRowKey";

/// Azure Table Storage 客户端
#[derive(Clone)]
pub struct AzureTableStore {
    client: reqwest::Client,
    account_name: String,
    /// 解码后的账户密钥
    key: Vec<u8>,
    endpoint: Url,
}

impl std::fmt::Debug for AzureTableStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureTableStore")
            .field("account_name", &self.account_name)
            .field("endpoint", &self.endpoint.as_str())
            .field("key", &"[REDACTED]")
            .finish()
    }
}

#[derive(Deserialize)]
struct QueryResponse {
    value: Vec<TableEntity>,
}

impl AzureTableStore {
    /// 创建新的客户端
    pub fn new(connection: &ConnectionString, request_timeout: Duration) -> Result<Self> {
        let key = base64::engine::general_purpose::STANDARD
            .decode(connection.account_key.as_bytes())
            .map_err(|e| {
                TableLogError::connection_string(format!("AccountKey is not valid base64: {}", e))
            })?;

        // 结尾斜杠保证 Url::join 追加而不是替换最后一段路径
        let endpoint = Url::parse(&format!("{}/", connection.table_endpoint.trim_end_matches('/')))
            .map_err(|e| {
                TableLogError::connection_string(format!(
                    "invalid table endpoint '{}': {}",
                    connection.table_endpoint, e
                ))
            })?;

        let client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TableLogError::initialization(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            account_name: connection.account_name.clone(),
            key,
            endpoint,
        })
    }

    /// 从连接字符串文本创建客户端
    pub fn from_connection_string(raw: &str, request_timeout: Duration) -> Result<Self> {
        Self::new(&ConnectionString::parse(raw)?, request_timeout)
    }

    fn url(&self, resource: &str) -> Result<Url> {
        self.endpoint
            .join(resource)
            .map_err(|e| TableLogError::internal(format!("invalid resource '{}': {}", resource, e)))
    }

    /// SharedKeyLite 签名：`Base64(HMAC-SHA256(key, date + "\n" + canonical_resource))`
    pub fn sign(&self, date: &str, canonical_resource: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|e| TableLogError::internal(format!("HMAC key rejected: {}", e)))?;
        mac.update(date.as_bytes());
        mac.update(b"\n");
        mac.update(canonical_resource.as_bytes());
        Ok(base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
    }

    /// 规范化资源：`/{account}{url_path}`，不含查询串
    pub fn canonical_resource(&self, url: &Url) -> String {
        format!("/{}{}", self.account_name, url.path())
    }

    fn request(&self, method: Method, url: Url) -> Result<reqwest::RequestBuilder> {
        let date = chrono::Utc::now()
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        let signature = self.sign(&date, &self.canonical_resource(&url))?;

        Ok(self
            .client
            .request(method, url)
            .header("x-ms-date", date)
            .header("x-ms-version", API_VERSION)
            .header("DataServiceVersion", DATA_SERVICE_VERSION)
            .header("MaxDataServiceVersion", DATA_SERVICE_VERSION)
            .header(header::ACCEPT, ACCEPT_NO_METADATA)
            .header(
                header::AUTHORIZATION,
                format!("SharedKeyLite {}:{}", self.account_name, signature),
            ))
    }

    async fn send(&self, builder: reqwest::RequestBuilder) -> Result<reqwest::Response> {
        builder
            .send()
            .await
            .map_err(|e| TableLogError::unavailable(format!("request to table service failed: {}", e)))
    }
}

/// 查询参数值中保留原样的字符（RFC 3986 unreserved）
///
/// `$filter` 中的空格必须编码为 `%20`，表服务不接受 `+`。
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

fn encode_query_value(value: &str) -> String {
    utf8_percent_encode(value, QUERY_VALUE).to_string()
}

/// 将非成功响应映射为错误
///
/// 408/429/5xx 视为瞬时错误，其余 4xx 视为永久拒绝。
pub(crate) async fn error_from_response(response: reqwest::Response) -> TableLogError {
    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    classify_status(status, body)
}

pub(crate) fn classify_status(status: StatusCode, message: String) -> TableLogError {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        TableLogError::unavailable(format!("status {}: {}", status.as_u16(), message))
    } else {
        TableLogError::StoreRejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl TableStore for AzureTableStore {
    async fn create_table_if_not_exists(&self, table: &str) -> Result<bool> {
        let url = self.url("Tables")?;
        let body = serde_json::json!({ "TableName": table });
        let request = self
            .request(Method::POST, url)?
            .header(header::CONTENT_TYPE, "application/json")
            .header("Prefer", "return-no-content")
            .body(serde_json::to_vec(&body)?);

        let response = self.send(request).await?;
        match response.status() {
            StatusCode::CREATED | StatusCode::NO_CONTENT => {
                debug!("Created table {}", table);
                Ok(true)
            }
            StatusCode::CONFLICT => Ok(false),
            _ => Err(error_from_response(response).await),
        }
    }

    async fn insert_entity(&self, table: &str, entity: &TableEntity) -> Result<()> {
        let url = self.url(table)?;
        let request = self
            .request(Method::POST, url)?
            .header(header::CONTENT_TYPE, "application/json")
            .header("Prefer", "return-no-content")
            .body(serde_json::to_vec(entity)?);

        let response = self.send(request).await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(error_from_response(response).await)
        }
    }

    async fn query_partition(&self, table: &str, partition_key: &str) -> Result<Vec<TableEntity>> {
        let filter = format!("PartitionKey eq '{}'", partition_key.replace('\'', "''"));
        let mut entities = Vec::new();
        let mut continuation: Option<(String, String)> = None;

        loop {
            let mut url = self.url(&format!("{}()", table))?;
            let mut query = format!("$filter={}", encode_query_value(&filter));
            if let Some((next_pk, next_rk)) = &continuation {
                query.push_str(&format!(
                    "&NextPartitionKey={}&NextRowKey={}",
                    encode_query_value(next_pk),
                    encode_query_value(next_rk)
                ));
            }
            url.set_query(Some(&query));

            let response = self.send(self.request(Method::GET, url)?).await?;
            if !response.status().is_success() {
                return Err(error_from_response(response).await);
            }

            let header_value = |name: &str| {
                response
                    .headers()
                    .get(name)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            };
            continuation = match (header_value(CONTINUATION_PARTITION), header_value(CONTINUATION_ROW)) {
                (Some(pk), Some(rk)) => Some((pk, rk)),
                _ => None,
            };

            let page: QueryResponse = response
                .json()
                .await
                .map_err(|e| TableLogError::unavailable(format!("invalid query response: {}", e)))?;
            entities.extend(page.value);

            if continuation.is_none() {
                break;
            }
        }

        Ok(entities)
    }

    fn name(&self) -> &'static str {
        "azure_table"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    fn store_for(endpoint: &str) -> AzureTableStore {
        let connection = ConnectionString {
            account_name: "devstoreaccount1".to_string(),
            account_key: super::super::connection::DEV_STORE_ACCOUNT_KEY.to_string(),
            table_endpoint: endpoint.to_string(),
        };
        AzureTableStore::new(&connection, Duration::from_secs(5)).unwrap()
    }

    /// 最小 HTTP 应答器：依次用给定状态码应答，并回传收到的请求头
    async fn spawn_responder(
        statuses: Vec<u16>,
    ) -> (String, tokio::sync::mpsc::UnboundedReceiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        tokio::spawn(async move {
            for status in statuses {
                let (mut socket, _) = listener.accept().await.unwrap();
                let mut buf = Vec::new();
                let mut chunk = [0u8; 4096];
                loop {
                    let n = socket.read(&mut chunk).await.unwrap();
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    let text = String::from_utf8_lossy(&buf);
                    if let Some(head_end) = text.find("\r\n\r\n") {
                        let content_length = text[..head_end]
                            .lines()
                            .find_map(|l| {
                                let lower = l.to_ascii_lowercase();
                                lower
                                    .strip_prefix("content-length:")
                                    .map(|v| v.trim().parse::<usize>().unwrap_or(0))
                            })
                            .unwrap_or(0);
                        if buf.len() >= head_end + 4 + content_length {
                            break;
                        }
                    }
                }
                let _ = tx.send(String::from_utf8_lossy(&buf).into_owned());
                let response = format!(
                    "HTTP/1.1 {} Test\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
                    status
                );
                socket.write_all(response.as_bytes()).await.unwrap();
                let _ = socket.shutdown().await;
            }
        });

        (format!("http://{}/devstoreaccount1", addr), rx)
    }

    #[test]
    fn test_canonical_resource_includes_account_and_path() {
        let store = store_for("http://127.0.0.1:10002/devstoreaccount1");
        let url = store.url("Tables").unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:10002/devstoreaccount1/Tables");
        assert_eq!(
            store.canonical_resource(&url),
            "/devstoreaccount1/devstoreaccount1/Tables"
        );

        let query = store.url("Logs()").unwrap();
        assert_eq!(
            store.canonical_resource(&query),
            "/devstoreaccount1/devstoreaccount1/Logs()"
        );
    }

    #[test]
    fn test_signature_is_deterministic() {
        let store = store_for("http://127.0.0.1:10002/devstoreaccount1");
        let date = "Tue, 14 Oct 2026 10:00:00 GMT";
        let a = store.sign(date, "/devstoreaccount1/devstoreaccount1/Tables").unwrap();
        let b = store.sign(date, "/devstoreaccount1/devstoreaccount1/Tables").unwrap();
        let c = store.sign(date, "/devstoreaccount1/devstoreaccount1/Logs").unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        // 32 字节 HMAC 的 Base64 长度
        assert_eq!(a.len(), 44);
    }

    #[test]
    fn test_invalid_key_is_rejected() {
        let connection = ConnectionString {
            account_name: "acct".to_string(),
            account_key: "not base64!".to_string(),
            table_endpoint: "https://acct.table.core.windows.net".to_string(),
        };
        let err = AzureTableStore::new(&connection, Duration::from_secs(1)).unwrap_err();
        assert!(matches!(err, TableLogError::ConnectionString(_)));
    }

    #[test]
    fn test_query_value_encoding() {
        assert_eq!(
            encode_query_value("PartitionKey eq 'a/b'"),
            "PartitionKey%20eq%20%27a%2Fb%27"
        );
        assert_eq!(encode_query_value("Row-1_a.b~é"), "Row-1_a.b~%C3%A9");
    }

    #[test]
    fn test_status_classification() {
        assert!(classify_status(StatusCode::SERVICE_UNAVAILABLE, String::new()).is_recoverable());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, String::new()).is_recoverable());
        let rejected = classify_status(StatusCode::BAD_REQUEST, "InvalidInput".to_string());
        assert!(!rejected.is_recoverable());
        assert!(matches!(rejected, TableLogError::StoreRejected { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_create_table_treats_conflict_as_existing() {
        let (endpoint, mut requests) = spawn_responder(vec![201, 409]).await;
        let store = store_for(&endpoint);

        assert!(store.create_table_if_not_exists("Logs").await.unwrap());
        assert!(!store.create_table_if_not_exists("Logs").await.unwrap());

        let first = requests.recv().await.unwrap();
        assert!(first.starts_with("POST /devstoreaccount1/Tables "));
        assert!(first.to_ascii_lowercase().contains("authorization: sharedkeylite devstoreaccount1:"));
        assert!(first.contains("\"TableName\":\"Logs\""));
    }

    #[tokio::test]
    async fn test_insert_entity_maps_statuses() {
        let (endpoint, mut requests) = spawn_responder(vec![204, 503, 400]).await;
        let store = store_for(&endpoint);
        let entity = TableEntity::new("pk", "rk").with_property("Level", "Info");

        store.insert_entity("Logs", &entity).await.unwrap();
        let transient = store.insert_entity("Logs", &entity).await.unwrap_err();
        assert!(transient.is_recoverable());
        let rejected = store.insert_entity("Logs", &entity).await.unwrap_err();
        assert!(!rejected.is_recoverable());

        let first = requests.recv().await.unwrap();
        assert!(first.starts_with("POST /devstoreaccount1/Logs "));
        assert!(first.contains("\"PartitionKey\":\"pk\""));
        assert!(first.contains("\"Level\":\"Info\""));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transient() {
        // 绑定后立即释放端口，保证无人监听
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store = store_for(&format!("http://{}/devstoreaccount1", addr));
        let err = store.create_table_if_not_exists("Logs").await.unwrap_err();
        assert!(matches!(err, TableLogError::StoreUnavailable(_)));
    }
}
