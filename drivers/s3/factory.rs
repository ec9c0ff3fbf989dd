//! S3驱动工厂

use std::sync::Arc;

use super::config::{S3Config, MIN_PART_SIZE};
use super::driver::S3Backend;
use crate::config::BackendConfig;
use crate::error::Result;
use crate::storage::{BackendBox, Capability, DriverFactory};

/// S3驱动工厂
pub struct S3DriverFactory;

impl DriverFactory for S3DriverFactory {
    fn driver_type(&self) -> &'static str {
        "s3"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["s3a"]
    }

    fn create_driver(&self, config: &BackendConfig) -> Result<BackendBox> {
        let config = S3Config::from_backend_config(config)?;
        Ok(Arc::new(S3Backend::new(config)?))
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
