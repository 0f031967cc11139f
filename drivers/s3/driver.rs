//! S3驱动核心实现
//!
//! Metadata is stored natively as `x-amz-meta-*` headers. Readers stream
//! the response body; ranged readers go through a presigned GET so the
//! `Range` request stays lazy too. Writes of unknown length go through the
//! multipart uploader.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::error::S3Error;
use s3::serde_types::Part;
use s3::Region;
use tokio::io::AsyncReadExt;
use tokio_util::io::StreamReader;

use crate::storage::{
    range_header, resolve_range, BoxReader, FileInfo, Metadata, Result, Store, StoreError,
    DEFAULT_FILE_MODE,
};
use super::config::S3Config;
use super::multipart::{self, CompletedPart, MultipartClient};

const CONTENT_TYPE: &str = "application/octet-stream";
const META_HEADER_PREFIX: &str = "x-amz-meta-";
/// 预签名URL有效期（秒）
const PRESIGN_EXPIRE_SECS: u32 = 3600;

/// S3驱动
pub struct S3Driver {
    bucket: Box<Bucket>,
    /// Client for presigned range reads / 预签名范围读取客户端
    http: Client,
    part_size: usize,
}

impl S3Driver {
    /// 创建新的S3驱动实例 (no network round trip)
    pub fn new(config: S3Config) -> Result<Self> {
        let bucket = Self::create_bucket(&config)?;
        tracing::debug!(
            "S3驱动初始化: bucket={}, endpoint={}, path_style={}",
            config.bucket,
            config.endpoint_url(),
            config.force_path_style
        );
        let http = Client::builder().build()?;
        Ok(Self { bucket, http, part_size: config.effective_part_size() })
    }

    /// 创建S3 Bucket客户端
    fn create_bucket(config: &S3Config) -> Result<Box<Bucket>> {
        if config.bucket.is_empty() {
            return Err(StoreError::Config("s3 bucket name is empty".to_string()));
        }

        let credentials = Credentials::new(
            Some(&config.access_key_id),
            Some(&config.secret_access_key),
            if config.session_token.is_empty() { None } else { Some(&config.session_token) },
            None,
            None,
        )
        .map_err(|e| StoreError::Config(format!("创建S3凭证失败: {}", e)))?;

        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: config.endpoint_url(),
        };

        let bucket = Bucket::new(&config.bucket, region, credentials)?;
        let bucket = if config.force_path_style {
            bucket.with_path_style()
        } else {
            bucket
        };

        Ok(bucket)
    }

    /// Bucket handle carrying `meta` as `x-amz-meta-*` headers / 附带元数据头的Bucket
    fn bucket_with_meta(&self, meta: &Metadata) -> Result<Box<Bucket>> {
        let mut bucket = self.bucket.clone();
        for (key, value) in meta {
            let name = format!("{}{}", META_HEADER_PREFIX, key.to_ascii_lowercase());
            if HeaderName::from_bytes(name.as_bytes()).is_err() || HeaderValue::from_str(value).is_err() {
                return Err(StoreError::InvalidMetadata(format!("{:?} is not a valid header entry", key)));
            }
            bucket.add_header(&name, value);
        }
        Ok(bucket)
    }
}

/// 获取完整的对象键（路径）
pub(crate) fn object_key(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

/// Parse the Last-Modified header (RFC 2822) / 解析修改时间
fn parse_last_modified(text: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc2822(text)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Metadata map from a HEAD response, keys without the header prefix / 提取元数据
fn metadata_from_head(raw: Option<HashMap<String, String>>) -> Option<Metadata> {
    let meta: Metadata = raw?
        .into_iter()
        .map(|(k, v)| {
            let key = k.strip_prefix(META_HEADER_PREFIX).unwrap_or(&k).to_string();
            (key, v)
        })
        .collect();
    if meta.is_empty() {
        None
    } else {
        Some(meta)
    }
}

fn is_success(code: u16) -> bool {
    (200..300).contains(&code)
}

fn io_error(e: reqwest::Error) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Other, e)
}

fn check_status(op: &'static str, key: &str, code: u16) -> Result<()> {
    if is_success(code) {
        Ok(())
    } else {
        Err(StoreError::S3Status { op, key: key.to_string(), status: code })
    }
}

/// Inclusive end offset for rust-s3 range requests / 计算Range结束位置
fn range_end(offset: u64, length: i64) -> Option<u64> {
    if length > 0 {
        Some(offset.saturating_add(length as u64 - 1))
    } else {
        None
    }
}

/// Requested slice of a whole-object body, for servers that ignore Range / 服务器忽略Range时截取
fn slice_full_body(mut data: Vec<u8>, offset: u64, length: i64) -> Vec<u8> {
    let (start, len) = resolve_range(offset, length, data.len() as u64);
    data.truncate((start + len) as usize);
    data.drain(..start as usize);
    data
}

/// rust-s3 already aborts the session when a part upload fails, so a second
/// abort meets 404 NoSuchUpload / 会话已被取消时忽略404
fn ignore_missing_upload(result: std::result::Result<(), S3Error>) -> Result<()> {
    match result {
        Err(S3Error::HttpFailWithBody(404, body)) => {
            tracing::debug!("S3分片会话已不存在: {}", body);
            Ok(())
        }
        other => Ok(other?),
    }
}

impl S3Driver {
    /// Range GET returning the status and the requested bytes / 范围读取
    async fn get_range(&self, key: &str, offset: u64, length: i64) -> Result<(u16, Vec<u8>)> {
        tracing::debug!("S3范围读取: key={}, range={:?}", key, range_header(offset, length));

        let response = self
            .bucket
            .get_object_range(key, offset, range_end(offset, length))
            .await?;
        let code = response.status_code();
        let data = response.bytes().to_vec();

        // A server ignoring the Range header answers 200 with the whole object
        if code == 200 {
            return Ok((code, slice_full_body(data, offset, length)));
        }
        Ok((code, data))
    }

    /// Whole object as a lazily consumed stream / 流式读取整个对象
    async fn object_reader(&self, key: &str) -> Result<BoxReader> {
        let response = self.bucket.get_object_stream(key).await?;
        check_status("get", key, response.status_code)?;

        let stream = response
            .bytes
            .map(|item| item.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string())));
        Ok(Box::new(StreamReader::new(stream)))
    }

    /// Range read over a presigned GET, consumed lazily / 预签名URL范围流式读取
    async fn range_reader(&self, key: &str, offset: u64, length: i64) -> Result<BoxReader> {
        let length = if length > 0 { length } else { -1 };
        let url = self.bucket.presign_get(key, PRESIGN_EXPIRE_SECS, None).await?;

        let mut request = self.http.get(&url);
        if let Some(range) = range_header(offset, length) {
            tracing::debug!("S3范围流式读取: key={}, range={}", key, range);
            request = request.header("Range", range);
        }
        let response = request.send().await?;
        let status = response.status();
        if status == StatusCode::RANGE_NOT_SATISFIABLE {
            return Ok(Box::new(tokio::io::empty()));
        }
        check_status("get_range", key, status.as_u16())?;

        let mut reader = StreamReader::new(response.bytes_stream().map(|result| result.map_err(io_error)));
        if status == StatusCode::OK {
            // server ignored the Range header: skip to the offset ourselves
            if offset > 0 {
                tokio::io::copy(&mut (&mut reader).take(offset), &mut tokio::io::sink()).await?;
            }
            if length > 0 {
                return Ok(Box::new(reader.take(length as u64)));
            }
        }
        Ok(Box::new(reader))
    }
}

#[async_trait]
impl Store for S3Driver {
    fn name(&self) -> &str {
        "S3"
    }

    async fn is_exist(&self, path: &str) -> bool {
        let key = object_key(path);
        match self.bucket.head_object(&key).await {
            Ok((head, code)) => code == 200 && head.content_length.unwrap_or(0) > 0,
            Err(e) => {
                tracing::debug!("S3 HEAD失败: key={}, error={}", key, e);
                false
            }
        }
    }

    async fn create_file(&self, path: &str, data: &[u8], meta: Option<&Metadata>) -> Result<()> {
        let key = object_key(path);
        let response = match meta {
            Some(meta) if !meta.is_empty() => self.bucket_with_meta(meta)?.put_object(&key, data).await?,
            _ => self.bucket.put_object(&key, data).await?,
        };
        check_status("put", &key, response.status_code())
    }

    async fn stream_to_file(&self, mut stream: BoxReader, path: &str) -> Result<()> {
        let key = object_key(path);
        let total = multipart::upload_stream(self.bucket.as_ref(), &key, &mut stream, self.part_size).await?;
        tracing::debug!("S3流式上传完成: key={}, size={}", key, total);
        Ok(())
    }

    async fn get_file(&self, path: &str) -> Result<Option<Vec<u8>>> {
        let key = object_key(path);
        let response = self.bucket.get_object(&key).await?;
        let code = response.status_code();
        if code == 404 {
            return Ok(None);
        }
        check_status("get", &key, code)?;

        let data = response.bytes().to_vec();
        if data.is_empty() {
            return Ok(None);
        }
        Ok(Some(data))
    }

    async fn get_file_partially(&self, path: &str, offset: u64, length: i64) -> Result<Option<Vec<u8>>> {
        if !self.is_exist(path).await {
            return Ok(None);
        }
        if length == 0 {
            return Ok(Some(Vec::new()));
        }

        let key = object_key(path);
        let (code, data) = self.get_range(&key, offset, length).await?;
        match code {
            404 => Ok(None),
            416 => Ok(Some(Vec::new())),
            code => {
                check_status("get_range", &key, code)?;
                Ok(Some(data))
            }
        }
    }

    async fn file_reader(&self, path: &str, offset: u64, length: i64) -> Result<BoxReader> {
        let key = object_key(path);
        if offset == 0 && length <= 0 {
            self.object_reader(&key).await
        } else {
            self.range_reader(&key, offset, length).await
        }
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let key = object_key(path);
        let response = self.bucket.delete_object(&key).await?;
        check_status("delete", &key, response.status_code())
    }

    async fn stat(&self, path: &str) -> Result<(FileInfo, Option<Metadata>)> {
        let key = object_key(path);
        let (head, code) = self.bucket.head_object(&key).await?;
        if code != 200 {
            return Err(StoreError::S3Status { op: "head", key, status: code });
        }

        let info = FileInfo {
            name: path.to_string(),
            size: head.content_length.unwrap_or(0).max(0) as u64,
            modified: head.last_modified.as_deref().and_then(parse_last_modified),
            is_dir: false,
            mode: DEFAULT_FILE_MODE,
        };
        Ok((info, metadata_from_head(head.metadata)))
    }

    async fn clear_dir(&self, path: &str) -> Result<()> {
        let prefix = object_key(path);
        let results = self.bucket.list(prefix.clone(), None).await?;

        let mut removed = 0usize;
        for result in results {
            for obj in result.contents {
                let response = self.bucket.delete_object(&obj.key).await?;
                check_status("delete", &obj.key, response.status_code())?;
                removed += 1;
            }
        }
        tracing::debug!("S3清空前缀: prefix={}, removed={}", prefix, removed);
        Ok(())
    }

    async fn mkdir_all(&self, path: &str) -> Result<()> {
        let key = object_key(path);
        let response = self.bucket.put_object(&key, &[]).await?;
        check_status("put", &key, response.status_code())
    }
}

#[async_trait]
impl MultipartClient for Bucket {
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()> {
        let response = Bucket::put_object(self, key, data).await?;
        check_status("put", key, response.status_code())
    }

    async fn initiate(&self, key: &str) -> Result<String> {
        let response = self.initiate_multipart_upload(key, CONTENT_TYPE).await?;
        Ok(response.upload_id)
    }

    async fn upload_part(&self, key: &str, upload_id: &str, part_number: u32, data: Vec<u8>) -> Result<String> {
        let part = self
            .put_multipart_chunk(data, key, part_number, upload_id, CONTENT_TYPE)
            .await?;
        Ok(part.etag)
    }

    async fn complete(&self, key: &str, upload_id: &str, parts: Vec<CompletedPart>) -> Result<()> {
        let parts = parts
            .into_iter()
            .map(|p| Part { part_number: p.part_number, etag: p.etag })
            .collect();
        let response = self.complete_multipart_upload(key, upload_id, parts).await?;
        check_status("complete", key, response.status_code())
    }

    async fn abort(&self, key: &str, upload_id: &str) -> Result<()> {
        ignore_missing_upload(self.abort_upload(key, upload_id).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> S3Config {
        S3Config {
            bucket: "test-bucket".to_string(),
            endpoint: "http://127.0.0.1:9000".to_string(),
            access_key_id: "ak".to_string(),
            secret_access_key: "sk".to_string(),
            force_path_style: true,
            ..Default::default()
        }
    }

    #[test]
    fn test_object_key() {
        assert_eq!(object_key("/a/b.txt"), "a/b.txt");
        assert_eq!(object_key("a/b.txt"), "a/b.txt");
        assert_eq!(object_key("dir/"), "dir/");
    }

    #[test]
    fn test_range_end() {
        assert_eq!(range_end(10, 5), Some(14));
        assert_eq!(range_end(10, 1), Some(10));
        assert_eq!(range_end(10, -1), None);
        assert_eq!(range_end(0, 0), None);
        assert_eq!(range_end(u64::MAX - 1, 10), Some(u64::MAX));
    }

    #[test]
    fn test_slice_full_body() {
        let body: Vec<u8> = (0..100u8).collect();
        assert_eq!(slice_full_body(body.clone(), 0, 5), body[..5].to_vec());
        assert_eq!(slice_full_body(body.clone(), 10, 5), body[10..15].to_vec());
        assert_eq!(slice_full_body(body.clone(), 90, -1), body[90..].to_vec());
        assert_eq!(slice_full_body(body.clone(), 0, -1), body);
        assert!(slice_full_body(body, 150, 5).is_empty());
    }

    #[test]
    fn test_ignore_missing_upload() {
        assert!(ignore_missing_upload(Ok(())).is_ok());

        let gone = S3Error::HttpFailWithBody(404, "<Error><Code>NoSuchUpload</Code></Error>".to_string());
        assert!(ignore_missing_upload(Err(gone)).is_ok());

        let denied = S3Error::HttpFailWithBody(403, "<Error><Code>AccessDenied</Code></Error>".to_string());
        assert!(matches!(
            ignore_missing_upload(Err(denied)),
            Err(StoreError::S3(S3Error::HttpFailWithBody(403, _)))
        ));
    }

    #[test]
    fn test_parse_last_modified() {
        let dt = parse_last_modified("Wed, 21 Oct 2015 07:28:00 GMT").unwrap();
        assert_eq!(dt.to_rfc3339(), "2015-10-21T07:28:00+00:00");
        assert_eq!(parse_last_modified("yesterday"), None);
    }

    #[test]
    fn test_metadata_from_head() {
        assert_eq!(metadata_from_head(None), None);
        assert_eq!(metadata_from_head(Some(HashMap::new())), None);

        let mut raw = HashMap::new();
        raw.insert("k".to_string(), "v".to_string());
        raw.insert("x-amz-meta-owner".to_string(), "me".to_string());
        let meta = metadata_from_head(Some(raw)).unwrap();
        assert_eq!(meta.get("k").map(String::as_str), Some("v"));
        assert_eq!(meta.get("owner").map(String::as_str), Some("me"));
    }

    #[test]
    fn test_check_status() {
        assert!(check_status("get", "k", 200).is_ok());
        assert!(check_status("delete", "k", 204).is_ok());
        let err = check_status("get", "k", 404).unwrap_err();
        assert!(err.is_not_found());
        assert!(!check_status("get", "k", 403).unwrap_err().is_not_found());
    }

    #[test]
    fn test_new_driver() {
        let driver = S3Driver::new(config()).unwrap();
        assert_eq!(driver.name(), "S3");
        assert_eq!(driver.part_size, multipart::MIN_PART_SIZE);
    }

    #[test]
    fn test_empty_bucket_rejected() {
        let err = S3Driver::new(S3Config { bucket: String::new(), ..config() }).err().unwrap();
        assert!(matches!(err, StoreError::Config(_)));
    }

    #[test]
    fn test_invalid_metadata_rejected() {
        let driver = S3Driver::new(config()).unwrap();
        let mut meta = Metadata::new();
        meta.insert("bad key".to_string(), "v".to_string());
        assert!(matches!(driver.bucket_with_meta(&meta), Err(StoreError::InvalidMetadata(_))));

        let mut meta = Metadata::new();
        meta.insert("k".to_string(), "line\nbreak".to_string());
        assert!(matches!(driver.bucket_with_meta(&meta), Err(StoreError::InvalidMetadata(_))));

        let mut meta = Metadata::new();
        meta.insert("good".to_string(), "v".to_string());
        assert!(driver.bucket_with_meta(&meta).is_ok());
    }
}
