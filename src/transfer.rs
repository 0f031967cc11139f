//! Store-to-store copy / 跨存储复制
//!
//! Built only on the `Store` operations, so any pair of backends works.
//! Content is streamed; metadata is not carried over.

use crate::storage::{Result, Store};

/// Copy the whole object / 复制整个文件
pub async fn copy_file(src: &dyn Store, src_path: &str, dst: &dyn Store, dst_path: &str) -> Result<()> {
    copy_file_from(src, src_path, 0, dst, dst_path).await
}

/// Copy the object starting at `offset` into `dst_path` / 从指定偏移复制文件
pub async fn copy_file_from(
    src: &dyn Store,
    src_path: &str,
    offset: u64,
    dst: &dyn Store,
    dst_path: &str,
) -> Result<()> {
    tracing::debug!(
        "复制文件: {}:{} -> {}:{} (offset={})",
        src.name(),
        src_path,
        dst.name(),
        dst_path,
        offset
    );

    let reader = src.file_reader(src_path, offset, -1).await?;
    dst.stream_to_file(reader, dst_path).await?;

    tracing::info!("复制完成: {}:{} -> {}:{}", src.name(), src_path, dst.name(), dst_path);
    Ok(())
}

/// Offset still to transfer, or None when `dst` already holds as many bytes / 计算待传输偏移
pub async fn pending_offset(src: &dyn Store, src_path: &str, dst: &dyn Store, dst_path: &str) -> Result<Option<u64>> {
    let (src_info, _) = src.stat(src_path).await?;

    let dst_size = match dst.stat(dst_path).await {
        Ok((info, _)) => info.size,
        Err(e) if e.is_not_found() => 0,
        Err(e) => return Err(e),
    };

    if dst_size >= src_info.size {
        Ok(None)
    } else {
        Ok(Some(dst_size))
    }
}
