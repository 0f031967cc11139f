//! No-op driver / 空驱动
//!
//! Accepts every write and stores nothing. Reads see an empty store.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::factory::parse_config;
use crate::storage::{BoxReader, DriverFactory, FileInfo, Metadata, Result, Store};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyConfig {}

#[derive(Debug, Default)]
pub struct EmptyDriver;

impl EmptyDriver {
    pub fn new(_config: EmptyConfig) -> Self {
        Self
    }
}

#[async_trait]
impl Store for EmptyDriver {
    fn name(&self) -> &str {
        "empty"
    }

    async fn is_exist(&self, _path: &str) -> bool {
        false
    }

    async fn create_file(&self, _path: &str, _data: &[u8], _meta: Option<&Metadata>) -> Result<()> {
        Ok(())
    }

    /// Drains the stream so the producer is never left blocked / 读完并丢弃数据
    async fn stream_to_file(&self, mut stream: BoxReader, _path: &str) -> Result<()> {
        tokio::io::copy(&mut stream, &mut tokio::io::sink()).await?;
        Ok(())
    }

    async fn get_file(&self, _path: &str) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn get_file_partially(&self, _path: &str, _offset: u64, _length: i64) -> Result<Option<Vec<u8>>> {
        Ok(None)
    }

    async fn file_reader(&self, _path: &str, _offset: u64, _length: i64) -> Result<BoxReader> {
        Ok(Box::new(tokio::io::empty()))
    }

    async fn remove_file(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<(FileInfo, Option<Metadata>)> {
        let info = FileInfo {
            name: path.rsplit('/').next().unwrap_or(path).to_string(),
            ..Default::default()
        };
        Ok((info, None))
    }

    async fn clear_dir(&self, _path: &str) -> Result<()> {
        Ok(())
    }

    async fn mkdir_all(&self, _path: &str) -> Result<()> {
        Ok(())
    }
}

pub struct EmptyDriverFactory;

impl DriverFactory for EmptyDriverFactory {
    fn driver_type(&self) -> &'static str {
        "empty"
    }

    fn create_driver(&self, config: Value) -> Result<Box<dyn Store>> {
        let config: EmptyConfig = parse_config(self.driver_type(), config)?;
        Ok(Box::new(EmptyDriver::new(config)))
    }
}
