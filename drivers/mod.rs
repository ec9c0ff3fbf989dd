// Driver package / 驱动包
pub mod azure;
pub mod gcs;
pub mod http;
pub mod memory;
pub mod s3;

use std::sync::Arc;

use crate::storage::BackendRegistry;

/// Register all drivers to the registry / 注册所有驱动
pub fn register_all(registry: &BackendRegistry) {
    // Register in-memory driver (tests, local pipelines) / 注册内存驱动
    registry.register_factory(Arc::new(memory::MemoryDriverFactory));
    // Register HTTP(S) read-only driver / 注册HTTP驱动
    registry.register_factory(Arc::new(http::HttpDriverFactory));
    // Register S3 driver / 注册S3对象存储驱动
    registry.register_factory(Arc::new(s3::S3DriverFactory));
    // Register Google Cloud Storage driver / 注册GCS驱动
    registry.register_factory(Arc::new(gcs::GcsDriverFactory));
    // Register Azure Blob driver / 注册Azure Blob驱动
    registry.register_factory(Arc::new(azure::AzureDriverFactory));
}
