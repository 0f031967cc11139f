//! S3兼容对象存储驱动
//!
//! Works with AWS S3 and compatible stores (MinIO, OSS, COS). Streams of
//! unknown length are written with multipart upload, see [`multipart`].

mod config;
mod driver;
mod factory;
pub mod multipart;

pub use config::S3Config;
pub use driver::S3Driver;
pub use factory::S3DriverFactory;
