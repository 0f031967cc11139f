//! S3驱动工厂

use serde_json::Value;

use crate::storage::factory::parse_config;
use crate::storage::{DriverFactory, Result, Store};
use super::config::S3Config;
use super::driver::S3Driver;

/// S3驱动工厂
pub struct S3DriverFactory;

impl DriverFactory for S3DriverFactory {
    fn driver_type(&self) -> &'static str {
        "s3"
    }

    fn create_driver(&self, config: Value) -> Result<Box<dyn Store>> {
        let config: S3Config = parse_config(self.driver_type(), config)?;
        Ok(Box::new(S3Driver::new(config)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_from_json() {
        let store = S3DriverFactory
            .create_driver(serde_json::json!({
                "bucket": "b",
                "endpoint": "http://127.0.0.1:9000",
                "access_key_id": "ak",
                "secret_access_key": "sk",
                "force_path_style": true
            }))
            .unwrap();
        assert_eq!(store.name(), "S3");
    }

    #[test]
    fn test_missing_credentials() {
        let err = S3DriverFactory
            .create_driver(serde_json::json!({ "bucket": "b" }))
            .err()
            .unwrap();
        assert!(matches!(err, crate::storage::StoreError::Config(_)));
    }
}
