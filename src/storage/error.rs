//! Store error type / 存储错误类型

use thiserror::Error;

/// Errors surfaced by store operations / 存储操作错误
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Unexpected status from a WebDAV server / WebDAV服务器返回异常状态
    #[error("{method} {url} returned {status}")]
    Status {
        method: String,
        url: String,
        status: u16,
    },

    #[error("s3 error: {0}")]
    S3(#[from] s3::error::S3Error),

    /// Unexpected status from the object store / 对象存储返回异常状态
    #[error("s3 {op} {key} returned {status}")]
    S3Status {
        op: &'static str,
        key: String,
        status: u16,
    },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("webdav response parse error: {0}")]
    Xml(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("unknown store type: {0}")]
    UnknownBackend(String),

    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Metadata entry the backend cannot store / 元数据无法写入后端
    #[error("invalid metadata: {0}")]
    InvalidMetadata(String),
}

impl StoreError {
    /// Whether the error means the object does not exist / 是否为对象不存在
    pub fn is_not_found(&self) -> bool {
        match self {
            StoreError::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            StoreError::Status { status, .. } => *status == 404,
            StoreError::S3Status { status, .. } => *status == 404,
            StoreError::S3(s3::error::S3Error::HttpFailWithBody(status, _)) => *status == 404,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
