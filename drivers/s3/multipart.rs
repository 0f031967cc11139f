//! S3分片上传
//!
//! Streams of unknown length cannot go through a single PUT, so they are
//! uploaded as numbered parts of a multipart session. The session is owned by
//! one upload and is either completed or aborted before the upload returns;
//! a partially uploaded object never becomes visible.

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::storage::{Result, StoreError};

/// Smallest part S3 accepts for all but the last part (5MB) / 最小分片大小
pub const MIN_PART_SIZE: usize = 5 * 1024 * 1024;

/// Part number and ETag reported by the store / 已上传分片
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

/// Object-store calls the upload needs / 分片上传所需的对象存储接口
#[async_trait]
pub trait MultipartClient: Send + Sync {
    /// Single-request upload, used for empty streams / 普通上传
    async fn put_object(&self, key: &str, data: &[u8]) -> Result<()>;

    /// Open a session, returning its upload id / 初始化分片上传
    async fn initiate(&self, key: &str) -> Result<String>;

    /// Upload one part, returning its ETag / 上传分片
    async fn upload_part(&self, key: &str, upload_id: &str, part_number: u32, data: Vec<u8>) -> Result<String>;

    /// Publish the object from the ordered parts / 完成分片上传
    async fn complete(&self, key: &str, upload_id: &str, parts: Vec<CompletedPart>) -> Result<()>;

    /// Discard the session and its parts / 取消分片上传
    async fn abort(&self, key: &str, upload_id: &str) -> Result<()>;
}

/// Open multipart session, finished exactly once by `complete` or `abort` / 分片上传会话
struct MultipartSession<'a, C: MultipartClient + ?Sized> {
    client: &'a C,
    key: &'a str,
    upload_id: String,
    parts: Vec<CompletedPart>,
}

impl<'a, C: MultipartClient + ?Sized> MultipartSession<'a, C> {
    async fn begin(client: &'a C, key: &'a str) -> Result<MultipartSession<'a, C>> {
        let upload_id = client.initiate(key).await?;
        tracing::debug!("S3分片上传开始: key={}, upload_id={}", key, upload_id);
        Ok(Self { client, key, upload_id, parts: Vec::new() })
    }

    async fn upload(&mut self, data: Vec<u8>) -> Result<()> {
        let part_number = self.parts.len() as u32 + 1;
        tracing::debug!("S3上传分片: key={}, part={}, size={}", self.key, part_number, data.len());

        let etag = self
            .client
            .upload_part(self.key, &self.upload_id, part_number, data)
            .await?;
        self.parts.push(CompletedPart { part_number, etag });
        Ok(())
    }

    async fn complete(self) -> Result<()> {
        let part_count = self.parts.len();
        if let Err(e) = self.client.complete(self.key, &self.upload_id, self.parts).await {
            if let Err(abort_err) = self.client.abort(self.key, &self.upload_id).await {
                tracing::warn!("S3分片上传取消失败: key={}, error={}", self.key, abort_err);
            }
            return Err(e);
        }
        tracing::debug!("S3分片上传完成: key={}, parts={}", self.key, part_count);
        Ok(())
    }

    /// Abort after `cause`; the abort error wins when the abort itself fails / 取消会话
    async fn abort(self, cause: StoreError) -> StoreError {
        match self.client.abort(self.key, &self.upload_id).await {
            Ok(()) => {
                tracing::warn!("S3分片上传已取消: key={}, cause={}", self.key, cause);
                cause
            }
            Err(abort_err) => {
                tracing::error!(
                    "S3分片上传取消失败，会话可能残留: key={}, upload_id={}, cause={}, error={}",
                    self.key,
                    self.upload_id,
                    cause,
                    abort_err
                );
                abort_err
            }
        }
    }
}

/// Read until `buf` holds `size` bytes or the stream ends / 读取一个完整分片
async fn fill_chunk<R>(reader: &mut R, buf: &mut Vec<u8>, size: usize) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    buf.clear();
    (&mut *reader).take(size as u64).read_to_end(buf).await
}

/// Upload `reader` to `key` in parts of `part_size` bytes, returning the byte count / 流式分片上传
///
/// An empty stream is stored with a plain zero-byte PUT since a completion
/// with no parts is rejected by S3.
pub async fn upload_stream<C, R>(client: &C, key: &str, reader: &mut R, part_size: usize) -> Result<u64>
where
    C: MultipartClient + ?Sized,
    R: AsyncRead + Unpin + Send + ?Sized,
{
    let mut chunk = Vec::with_capacity(part_size);
    fill_chunk(reader, &mut chunk, part_size).await?;
    if chunk.is_empty() {
        client.put_object(key, &[]).await?;
        return Ok(0);
    }

    let mut session = MultipartSession::begin(client, key).await?;
    let mut total: u64 = 0;

    loop {
        total += chunk.len() as u64;
        let data = std::mem::replace(&mut chunk, Vec::with_capacity(part_size));
        if let Err(e) = session.upload(data).await {
            return Err(session.abort(e).await);
        }

        match fill_chunk(reader, &mut chunk, part_size).await {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => return Err(session.abort(e.into()).await),
        }
    }

    session.complete().await?;
    Ok(total)
}
