use serde_json::Value;

use super::factory::parse_config;
use super::{DriverFactory, Result, Store};
use crate::drivers::local::{LocalConfig, LocalDriver};

pub struct LocalDriverFactory;

impl DriverFactory for LocalDriverFactory {
    fn driver_type(&self) -> &'static str {
        "local"
    }

    fn create_driver(&self, config: Value) -> Result<Box<dyn Store>> {
        let config: LocalConfig = parse_config(self.driver_type(), config)?;
        let driver = LocalDriver::new(config)?;

        match driver.root() {
            Some(root) => tracing::info!("Local driver initialized, root: {:?}", root),
            None => tracing::info!("Local driver initialized without root"),
        }

        Ok(Box::new(driver))
    }
}
