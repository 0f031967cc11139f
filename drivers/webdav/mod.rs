//! WebDAV 网络存储驱动
//!
//! Metadata has no native home on WebDAV, so it lives in a `<path>.meta`
//! sidecar next to each file.

mod driver;
pub mod propfind;

pub use driver::{WebDavConfig, WebDavDriver};

use serde_json::Value;

use crate::storage::factory::parse_config;
use crate::storage::{DriverFactory, Result, Store};

/// WebDAV 驱动工厂
pub struct WebDavDriverFactory;

impl DriverFactory for WebDavDriverFactory {
    fn driver_type(&self) -> &'static str {
        "webdav"
    }

    fn create_driver(&self, config: Value) -> Result<Box<dyn Store>> {
        let config: WebDavConfig = parse_config(self.driver_type(), config)?;
        Ok(Box::new(WebDavDriver::new(config)?))
    }
}
