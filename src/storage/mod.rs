use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::io::AsyncRead;

pub mod error;
pub mod meta;
pub mod factory;
pub mod local_factory;

pub use error::{Result, StoreError};
pub use factory::{new_store, DriverFactory, StoreConfig, StoreRegistry};
pub use local_factory::LocalDriverFactory;

/// Per-object metadata (string key to string value) / 文件元数据
pub type Metadata = HashMap<String, String>;

/// Caller-owned byte stream, released on drop / 字节流（drop时释放）
pub type BoxReader = Box<dyn AsyncRead + Unpin + Send>;

/// Default permission bits for created files and directories / 默认权限
pub const DEFAULT_PERM: u32 = 0o777;
/// Reported mode of a file when the backend has none / 默认文件模式
pub const DEFAULT_FILE_MODE: u32 = 0o664;
/// Reported mode of a directory when the backend has none / 默认目录模式
pub const DEFAULT_DIR_MODE: u32 = 0o775;

/// File attributes returned by `stat` / 文件信息
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    pub size: u64,
    /// None when the backend does not report it / 后端不提供时为None
    pub modified: Option<DateTime<Utc>>,
    pub is_dir: bool,
    pub mode: u32,
}

/// Storage backend interface / 存储后端接口
///
/// Every backend offers the same operations. Two behaviours are kept on
/// purpose even though they are easy to trip over:
///
/// * `get_file` and `get_file_partially` return `Ok(None)` for a missing
///   object, while `stat`, `remove_file` and `file_reader` report it as an
///   error. Use `is_exist` or `stat` to tell "missing" from "empty".
/// * `is_exist` is false for zero-byte objects. This looks accidental but
///   callers depend on it, so it is preserved.
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name / 后端名称
    fn name(&self) -> &str;

    /// True iff the object exists and is not empty. Never fails / 检查文件是否存在
    async fn is_exist(&self, path: &str) -> bool;

    /// Write `data` (and `meta` when given), replacing any existing object / 创建文件
    async fn create_file(&self, path: &str, data: &[u8], meta: Option<&Metadata>) -> Result<()>;

    /// Persist a stream of unknown length without holding it all in memory / 流式写入文件
    async fn stream_to_file(&self, stream: BoxReader, path: &str) -> Result<()>;

    /// Whole object, or None when it does not exist / 读取文件
    async fn get_file(&self, path: &str) -> Result<Option<Vec<u8>>>;

    /// Byte range of an object. A negative `length` reads to the end / 读取部分文件
    async fn get_file_partially(&self, path: &str, offset: u64, length: i64) -> Result<Option<Vec<u8>>>;

    /// Lazily consumed range reader. `length <= 0` reads to the end / 打开文件读取流
    async fn file_reader(&self, path: &str, offset: u64, length: i64) -> Result<BoxReader>;

    /// Delete the object and its metadata / 删除文件
    async fn remove_file(&self, path: &str) -> Result<()>;

    /// Attributes and metadata (None when there is none) / 获取文件信息和元数据
    async fn stat(&self, path: &str) -> Result<(FileInfo, Option<Metadata>)>;

    /// Remove everything directly under `path` / 清空目录
    async fn clear_dir(&self, path: &str) -> Result<()>;

    /// Create a directory and its parents / 创建目录
    async fn mkdir_all(&self, path: &str) -> Result<()>;
}

/// JSON helpers available on every store / JSON文件读写
#[async_trait]
pub trait StoreJsonExt: Store {
    async fn create_json_file<T>(&self, path: &str, data: &T, meta: Option<&Metadata>) -> Result<()>
    where
        T: Serialize + Sync + ?Sized,
    {
        let content = serde_json::to_vec_pretty(data)?;
        self.create_file(path, &content, meta).await
    }

    /// None when the file does not exist / 文件不存在时返回None
    async fn get_json_file<T>(&self, path: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        match self.get_file(path).await? {
            Some(content) => Ok(Some(serde_json::from_slice(&content)?)),
            None => Ok(None),
        }
    }
}

impl<S: Store + ?Sized> StoreJsonExt for S {}

/// Clamp a request to an object of `size` bytes, returning (start, len) / 计算实际读取范围
pub(crate) fn resolve_range(offset: u64, length: i64, size: u64) -> (u64, u64) {
    let start = offset.min(size);
    let available = size - start;
    let len = if length < 0 {
        available
    } else {
        (length as u64).min(available)
    };
    (start, len)
}

/// HTTP Range header value (RFC 9110). None for a zero-length request / 生成Range头
pub(crate) fn range_header(offset: u64, length: i64) -> Option<String> {
    if length > 0 {
        Some(format!("bytes={}-{}", offset, offset.saturating_add(length as u64 - 1)))
    } else if length < 0 {
        Some(format!("bytes={}-", offset))
    } else {
        None
    }
}
