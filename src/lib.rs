//! Unified file storage over local disk, WebDAV and S3-compatible object
//! stores / 统一存储抽象

pub mod storage;
pub mod transfer;

// Driver modules (point to project root drivers via path attribute) / 驱动模块
#[path = "../drivers/mod.rs"]
pub mod drivers;

pub use storage::{
    new_store, BoxReader, FileInfo, Metadata, Result, Store, StoreConfig, StoreError,
    StoreJsonExt, StoreRegistry,
};
