// Driver package / 驱动包
pub mod local;
pub mod webdav;
pub mod s3;
pub mod empty;

use crate::storage::StoreRegistry;

/// Register all drivers to the registry / 注册所有驱动
pub fn register_all(registry: &mut StoreRegistry) {
    // Register local driver (using LocalDriverFactory from storage module) / 注册本地驱动
    registry.register_factory(Box::new(crate::storage::LocalDriverFactory));
    // Register WebDAV driver / 注册WebDAV驱动
    registry.register_factory(Box::new(webdav::WebDavDriverFactory));
    // Register S3 driver / 注册S3对象存储驱动
    registry.register_factory(Box::new(s3::S3DriverFactory));
    // Register no-op driver / 注册空驱动
    registry.register_factory(Box::new(empty::EmptyDriverFactory));
}
