//! Memory driver / 内存驱动

mod driver;

pub use driver::MemoryBackend;

use std::sync::Arc;

use crate::config::BackendConfig;
use crate::error::Result;
use crate::storage::{BackendBox, Capability, DriverFactory, ObjectBackend};

/// Memory driver factory / 内存驱动工厂
pub struct MemoryDriverFactory;

impl DriverFactory for MemoryDriverFactory {
    fn driver_type(&self) -> &'static str {
        "memory"
    }

    fn create_driver(&self, config: &BackendConfig) -> Result<BackendBox> {
        let backend = match config.page_size {
            Some(size) => MemoryBackend::with_page_size(size),
            None => MemoryBackend::new(),
        };
        Ok(Arc::new(backend))
    }

    fn capabilities(&self) -> Capability {
        MemoryBackend::new().capabilities()
    }
}
