//! Google Cloud Storage 驱动

mod driver;
mod types;

pub use driver::{GcsBackend, MIN_PART_SIZE};

use std::sync::Arc;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::storage::{BackendBox, Capability, DriverFactory};

/// GCS driver factory / GCS 驱动工厂
pub struct GcsDriverFactory;

impl DriverFactory for GcsDriverFactory {
    fn driver_type(&self) -> &'static str {
        "gcs"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["gs"]
    }

    fn create_driver(&self, config: &BackendConfig) -> Result<BackendBox> {
        Ok(Arc::new(GcsBackend::new(config)?))
    }

    fn capabilities(&self) -> Capability {
        Capability {
            can_range_read: true,
            can_stat: true,
            can_list: true,
            can_multipart_upload: true,
            can_put: true,
            min_part_size: Some(MIN_PART_SIZE),
        }
    }
}
