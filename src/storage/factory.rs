use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{Result, Store, StoreError};
use crate::drivers::empty::{EmptyConfig, EmptyDriver};
use crate::drivers::local::{LocalConfig, LocalDriver};
use crate::drivers::s3::{S3Config, S3Driver};
use crate::drivers::webdav::{WebDavConfig, WebDavDriver};

/// Backend selection, tagged by `type` / 后端配置（按type区分）
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreConfig {
    #[serde(rename = "local")]
    Local(LocalConfig),
    #[serde(rename = "webdav")]
    WebDav(WebDavConfig),
    #[serde(rename = "s3", alias = "object-store")]
    S3(S3Config),
    #[serde(rename = "empty")]
    Empty(EmptyConfig),
}

impl StoreConfig {
    pub fn driver_type(&self) -> &'static str {
        match self {
            StoreConfig::Local(_) => "local",
            StoreConfig::WebDav(_) => "webdav",
            StoreConfig::S3(_) => "s3",
            StoreConfig::Empty(_) => "empty",
        }
    }
}

/// Build the backend described by `config` / 根据配置创建存储
///
/// Clients are constructed but no request is sent.
pub fn new_store(config: StoreConfig) -> Result<Arc<dyn Store>> {
    let driver_type = config.driver_type();
    let store: Arc<dyn Store> = match config {
        StoreConfig::Local(cfg) => Arc::new(LocalDriver::new(cfg)?),
        StoreConfig::WebDav(cfg) => Arc::new(WebDavDriver::new(cfg)?),
        StoreConfig::S3(cfg) => Arc::new(S3Driver::new(cfg)?),
        StoreConfig::Empty(cfg) => Arc::new(EmptyDriver::new(cfg)),
    };
    tracing::info!("Store created: {}", driver_type);
    Ok(store)
}

/// Driver factory trait / 驱动工厂 trait
pub trait DriverFactory: Send + Sync {
    /// Driver type name / 驱动类型名称
    fn driver_type(&self) -> &'static str;

    /// Create a store from its JSON configuration / 创建驱动实例
    fn create_driver(&self, config: Value) -> Result<Box<dyn Store>>;
}

/// Registry of driver factories keyed by type / 驱动工厂注册表
#[derive(Default)]
pub struct StoreRegistry {
    factories: HashMap<String, Box<dyn DriverFactory>>,
}

impl StoreRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the local, webdav, s3 and empty drivers / 注册所有内置驱动
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all(&mut registry);
        registry
    }

    /// Register driver factory / 注册驱动工厂
    pub fn register_factory(&mut self, factory: Box<dyn DriverFactory>) {
        let driver_type = factory.driver_type().to_string();
        tracing::debug!("Driver factory registered: {}", driver_type);
        self.factories.insert(driver_type, factory);
    }

    /// Registered type names, sorted / 已注册的驱动类型
    pub fn driver_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Create a store of `driver_type` / 创建指定类型的存储
    pub fn create(&self, driver_type: &str, config: Value) -> Result<Arc<dyn Store>> {
        // 兼容别名
        let driver_type = if driver_type == "object-store" { "s3" } else { driver_type };
        let factory = self
            .factories
            .get(driver_type)
            .ok_or_else(|| StoreError::UnknownBackend(driver_type.to_string()))?;

        match factory.create_driver(config) {
            Ok(driver) => {
                tracing::info!("Store created: {}", driver_type);
                Ok(Arc::from(driver))
            }
            Err(e) => {
                tracing::error!("Store creation failed: {} - {}", driver_type, e);
                Err(e)
            }
        }
    }

    /// Create a store from a value carrying its own `type` field / 从带type字段的配置创建
    pub fn create_from_value(&self, config: Value) -> Result<Arc<dyn Store>> {
        let driver_type = config
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| StoreError::Config("missing `type` field".to_string()))?
            .to_string();
        self.create(&driver_type, config)
    }
}

/// Deserialize a driver configuration / 解析驱动配置
pub(crate) fn parse_config<T: serde::de::DeserializeOwned>(driver_type: &str, config: Value) -> Result<T> {
    serde_json::from_value(config)
        .map_err(|e| StoreError::Config(format!("{} config: {}", driver_type, e)))
}
