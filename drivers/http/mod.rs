//! HTTP 驱动

mod driver;

pub use driver::HttpBackend;

use std::sync::Arc;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::storage::{BackendBox, Capability, DriverFactory};

/// HTTP driver factory / HTTP 驱动工厂
pub struct HttpDriverFactory;

impl DriverFactory for HttpDriverFactory {
    fn driver_type(&self) -> &'static str {
        "http"
    }

    fn aliases(&self) -> &'static [&'static str] {
        &["https"]
    }

    fn create_driver(&self, config: &BackendConfig) -> Result<BackendBox> {
        Ok(Arc::new(HttpBackend::new(config)?))
    }

    fn capabilities(&self) -> Capability {
        Capability {
            can_range_read: true,
            can_stat: true,
            ..Capability::default()
        }
    }
}
