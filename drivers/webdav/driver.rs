//! WebDAV 驱动实现
//!
//! 使用reqwest实现WebDAV协议，支持流式上传下载

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::io::StreamReader;

use super::propfind::{self, DavEntry, PROPFIND_BODY};
use crate::storage::meta::{self, sidecar_path};
use crate::storage::{
    range_header, resolve_range, BoxReader, FileInfo, Metadata, Result, Store, StoreError,
};

/// Read size while pumping a stream into a PUT body / 流式上传读取块大小
const STREAM_CHUNK_SIZE: usize = 1024 * 1024;
/// In-flight chunks between reader and request body / 上传通道容量
const STREAM_CHANNEL_CAPACITY: usize = 8;

/// WebDAV 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebDavConfig {
    /// WebDAV服务器地址 (如 https://dav.example.com/files)
    #[serde(alias = "address")]
    pub host: String,
    /// 用户名
    #[serde(default, alias = "username")]
    pub user: String,
    /// 密码
    #[serde(default)]
    pub password: String,
    /// 请求超时（秒）
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// 连接超时（秒）
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// 跳过TLS证书验证
    #[serde(default)]
    pub tls_insecure_skip_verify: bool,
}

fn default_timeout() -> u64 {
    60
}

fn default_connect_timeout() -> u64 {
    30
}

impl Default for WebDavConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: String::new(),
            password: String::new(),
            timeout_secs: default_timeout(),
            connect_timeout_secs: default_connect_timeout(),
            tls_insecure_skip_verify: false,
        }
    }
}

/// WebDAV 驱动
pub struct WebDavDriver {
    config: WebDavConfig,
    base: url::Url,
    client: Client,
    upload_client: Client,
}

fn dav_method(name: &str) -> Result<Method> {
    Method::from_bytes(name.as_bytes()).map_err(|e| StoreError::Config(format!("{}: {}", name, e)))
}

fn check_status(method: &str, url: &str, response: &Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(StoreError::Status {
            method: method.to_string(),
            url: url.to_string(),
            status: status.as_u16(),
        })
    }
}

fn io_error(e: reqwest::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e)
}

/// Parent directory of a store path, None at the top level / 获取父目录
fn parent_of(path: &str) -> Option<&str> {
    let trimmed = path.trim_end_matches('/');
    match trimmed.rfind('/') {
        Some(pos) if pos > 0 => Some(&trimmed[..pos]),
        _ => None,
    }
}

impl WebDavDriver {
    pub fn new(config: WebDavConfig) -> Result<Self> {
        if config.host.trim().is_empty() {
            return Err(StoreError::Config("webdav host is empty".to_string()));
        }
        let base = url::Url::parse(&config.host)
            .map_err(|e| StoreError::Config(format!("webdav host {}: {}", config.host, e)))?;

        // 普通请求客户端（较短超时）
        let client = Client::builder()
            .danger_accept_invalid_certs(config.tls_insecure_skip_verify)
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(4)
            .build()?;

        // 上传专用客户端（无整体超时，流长度未知）
        let upload_client = Client::builder()
            .danger_accept_invalid_certs(config.tls_insecure_skip_verify)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(8)
            .tcp_nodelay(true)
            .build()?;

        Ok(Self { config, base, client, upload_client })
    }

    /// 构建完整URL
    fn build_url(&self, path: &str) -> String {
        let base = self.base.as_str().trim_end_matches('/');
        let encoded: Vec<String> = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| urlencoding::encode(s).into_owned())
            .collect();

        let mut url = format!("{}/{}", base, encoded.join("/"));
        if path.ends_with('/') && !encoded.is_empty() {
            url.push('/');
        }
        url
    }

    /// 获取认证头
    fn auth_header(&self) -> String {
        use base64::Engine;
        let credentials = format!("{}:{}", self.config.user, self.config.password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials.as_bytes());
        format!("Basic {}", encoded)
    }

    async fn propfind(&self, path: &str, depth: &str) -> Result<Vec<DavEntry>> {
        let url = self.build_url(path);
        tracing::debug!("WebDAV PROPFIND: {} (depth {})", url, depth);

        let response = self
            .client
            .request(dav_method("PROPFIND")?, &url)
            .header("Authorization", self.auth_header())
            .header("Depth", depth)
            .header("Content-Type", "application/xml")
            .body(PROPFIND_BODY)
            .send()
            .await?;
        check_status("PROPFIND", &url, &response)?;

        let xml = response.text().await?;
        propfind::parse_multistatus(&xml)
    }

    async fn stat_entry(&self, path: &str) -> Result<DavEntry> {
        self.propfind(path, "0")
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| StoreError::Xml(format!("empty PROPFIND response for {}", path)))
    }

    async fn get(&self, path: &str, range: Option<String>) -> Result<(String, Response)> {
        let url = self.build_url(path);
        tracing::debug!("WebDAV GET: {} (范围: {:?})", url, range);

        let mut request = self.client.get(&url).header("Authorization", self.auth_header());
        if let Some(range) = range {
            request = request.header("Range", range);
        }
        let response = request.send().await?;
        Ok((url, response))
    }

    async fn put_bytes(&self, path: &str, data: Bytes) -> Result<StatusCode> {
        let url = self.build_url(path);
        tracing::debug!("WebDAV PUT: {} (大小: {})", url, data.len());

        let response = self
            .client
            .put(&url)
            .header("Authorization", self.auth_header())
            .header("Content-Type", "application/octet-stream")
            .body(data)
            .send()
            .await?;
        Ok(response.status())
    }

    /// PUT, creating missing parent collections on demand / 上传（父目录不存在时自动创建）
    async fn write(&self, path: &str, data: &[u8]) -> Result<()> {
        let data = Bytes::copy_from_slice(data);
        let mut status = self.put_bytes(path, data.clone()).await?;

        // missing parent collection: 409 per RFC 4918, some servers answer 404
        if status == StatusCode::CONFLICT || status == StatusCode::NOT_FOUND {
            if let Some(parent) = parent_of(path) {
                self.mkdir_all(parent).await?;
                status = self.put_bytes(path, data).await?;
            }
        }

        if status.is_success() {
            Ok(())
        } else {
            Err(StoreError::Status {
                method: "PUT".to_string(),
                url: self.build_url(path),
                status: status.as_u16(),
            })
        }
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let url = self.build_url(path);
        tracing::debug!("WebDAV DELETE: {}", url);

        let response = self
            .client
            .delete(&url)
            .header("Authorization", self.auth_header())
            .send()
            .await?;
        check_status("DELETE", &url, &response)
    }

    fn body_reader(response: Response) -> impl AsyncRead + Unpin + Send {
        let stream = response.bytes_stream().map(|result| result.map_err(io_error));
        StreamReader::new(stream)
    }
}

#[async_trait]
impl Store for WebDavDriver {
    fn name(&self) -> &str {
        "webdav"
    }

    async fn is_exist(&self, path: &str) -> bool {
        match self.stat_entry(path).await {
            Ok(entry) => entry.size > 0,
            Err(_) => false,
        }
    }

    async fn create_file(&self, path: &str, data: &[u8], meta: Option<&Metadata>) -> Result<()> {
        if let Some(meta) = meta {
            self.write(&sidecar_path(path), &meta::encode(meta)).await?;
        }
        self.write(path, data).await
    }

    async fn stream_to_file(&self, mut stream: BoxReader, path: &str) -> Result<()> {
        if let Some(parent) = parent_of(path) {
            self.mkdir_all(parent).await?;
        }

        let url = self.build_url(path);
        tracing::debug!("WebDAV PUT (stream): {}", url);

        let (tx, rx) = mpsc::channel::<std::io::Result<Bytes>>(STREAM_CHANNEL_CAPACITY);
        let body = reqwest::Body::wrap_stream(ReceiverStream::new(rx));

        let request = self
            .upload_client
            .put(&url)
            .header("Authorization", self.auth_header())
            .header("Content-Type", "application/octet-stream")
            .body(body)
            .send();

        // Feed the request body from the caller's stream; dropping tx ends the body
        let pump = async move {
            let mut buf = vec![0u8; STREAM_CHUNK_SIZE];
            let mut total: u64 = 0;
            loop {
                let n = match stream.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        let _ = tx
                            .send(Err(std::io::Error::new(e.kind(), e.to_string())))
                            .await;
                        return Err(e);
                    }
                };
                total += n as u64;
                if tx.send(Ok(Bytes::copy_from_slice(&buf[..n]))).await.is_err() {
                    // request already finished, its result carries the error
                    break;
                }
            }
            Ok(total)
        };

        let (pumped, response) = tokio::join!(pump, request);
        let total = pumped?;
        let response = response?;
        check_status("PUT", &url, &response)?;

        tracing::debug!("WebDAV stream written: {} ({} bytes)", url, total);
        Ok(())
    }

    async fn get_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        if !self.is_exist(path).await {
            return Ok(None);
        }

        let (url, response) = self.get(path, None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_status("GET", &url, &response)?;
        Ok(Some(response.bytes().await?.to_vec()))
    }

    async fn get_file_partially(&self, path: &str, offset: u64, length: i64) -> Result<Option<Vec<u8>>> {
        if !self.is_exist(path).await {
            return Ok(None);
        }
        let range = match range_header(offset, length) {
            Some(range) => range,
            None => return Ok(Some(Vec::new())),
        };

        let (url, response) = self.get(path, Some(range)).await?;
        match response.status() {
            StatusCode::PARTIAL_CONTENT => Ok(Some(response.bytes().await?.to_vec())),
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(Some(Vec::new())),
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => {
                // server ignored the Range header
                let body = response.bytes().await?;
                let (start, len) = resolve_range(offset, length, body.len() as u64);
                let (start, len) = (start as usize, len as usize);
                Ok(Some(body[start..start + len].to_vec()))
            }
            _ => {
                check_status("GET", &url, &response)?;
                Ok(Some(response.bytes().await?.to_vec()))
            }
        }
    }

    async fn file_reader(&self, path: &str, offset: u64, length: i64) -> Result<BoxReader> {
        let length = if length > 0 { length } else { -1 };
        let range = if offset == 0 && length < 0 {
            None
        } else {
            range_header(offset, length)
        };

        let (url, response) = self.get(path, range).await?;
        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(Box::new(tokio::io::empty()));
        }
        check_status("GET", &url, &response)?;

        let mut reader = Self::body_reader(response);
        if status == StatusCode::OK && offset > 0 {
            // server ignored the Range header: skip to the offset ourselves
            tokio::io::copy(&mut (&mut reader).take(offset), &mut tokio::io::sink()).await?;
        }

        if status == StatusCode::OK && length > 0 {
            Ok(Box::new(reader.take(length as u64)))
        } else {
            Ok(Box::new(reader))
        }
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        if let Err(e) = self.delete(&sidecar_path(path)).await {
            if !e.is_not_found() {
                tracing::warn!("WebDAV failed to remove metadata for {}: {}", path, e);
            }
        }
        self.delete(path).await
    }

    async fn stat(&self, path: &str) -> Result<(FileInfo, Option<Metadata>)> {
        let info = self.stat_entry(path).await?.to_file_info();

        let meta_path = sidecar_path(path);
        if !self.is_exist(&meta_path).await {
            return Ok((info, None));
        }

        let (url, response) = self.get(&meta_path, None).await?;
        check_status("GET", &url, &response)?;
        let raw = response.bytes().await?;
        Ok((info, Some(meta::decode(&raw))))
    }

    async fn clear_dir(&self, path: &str) -> Result<()> {
        let own_path = propfind::href_path(&self.build_url(path));
        let entries = self.propfind(path, "1").await?;

        for entry in entries {
            if entry.path == own_path || entry.name.is_empty() {
                continue;
            }
            let child = format!("{}/{}", path.trim_end_matches('/'), entry.name);
            self.delete(&child).await?;
        }
        Ok(())
    }

    async fn mkdir_all(&self, path: &str) -> Result<()> {
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);

            let url = format!("{}/", self.build_url(&current));
            tracing::debug!("WebDAV MKCOL: {}", url);

            let response = self
                .client
                .request(dav_method("MKCOL")?, &url)
                .header("Authorization", self.auth_header())
                .send()
                .await?;

            // 405 Method Not Allowed: the collection already exists
            if response.status() != StatusCode::METHOD_NOT_ALLOWED {
                check_status("MKCOL", &url, &response)?;
            }
        }
        Ok(())
    }
}
