//! Azure Blob Storage 驱动

mod driver;
mod sign;
mod types;

pub use driver::AzureBackend;

use std::sync::Arc;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::storage::{BackendBox, Capability, DriverFactory};

/// Azure driver factory / Azure 驱动工厂
pub struct AzureDriverFactory;

impl DriverFactory for AzureDriverFactory {
    fn driver_type(&self) -> &'static str {
        "az"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["abfs", "azure"]
    }

    fn create_driver(&self, config: &BackendConfig) -> Result<BackendBox> {
        Ok(Arc::new(AzureBackend::new(config)?))
    }

    fn capabilities(&self) -> Capability {
        Capability {
            can_range_read: true,
            can_stat: true,
            can_list: true,
            can_multipart_upload: true,
            can_put: true,
            min_part_size: None,
        }
    }
}
