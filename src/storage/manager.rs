use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::{Capability, ObjectBackend};
use crate::config::BackendConfig;
use crate::error::{Error, Result};

pub type BackendBox = Arc<dyn ObjectBackend>;

/// Driver factory trait / 驱动工厂 trait
pub trait DriverFactory: Send + Sync {
    /// Protocol name, e.g. `s3` / 协议名称
    fn driver_type(&self) -> &'static str;

    /// Extra protocol names mapped to the same driver (`gs` for `gcs`) / 协议别名
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    /// Create a backend instance, failing with `ConfigError` on missing options / 创建后端实例
    fn create_driver(&self, config: &BackendConfig) -> Result<BackendBox>;

    /// Capabilities of the driver this factory builds / 驱动能力
    fn capabilities(&self) -> Capability;
}

/// Registry of driver factories keyed by protocol / 驱动注册表
#[derive(Clone)]
pub struct BackendRegistry {
    factories: Arc<RwLock<HashMap<String, Arc<dyn DriverFactory>>>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Register driver factory / 注册驱动工厂
    pub fn register_factory(&self, factory: Arc<dyn DriverFactory>) {
        let mut factories = self.factories.write();
        let driver_type = factory.driver_type();
        for alias in factory.aliases() {
            factories.insert(alias.to_string(), factory.clone());
        }
        factories.insert(driver_type.to_string(), factory);
        tracing::debug!("Driver factory registered: {}", driver_type);
    }

    /// Create the backend for `protocol` from an explicit configuration / 创建后端实例
    pub fn create_backend(&self, protocol: &str, config: &BackendConfig) -> Result<BackendBox> {
        config.validate()?;
        let factory = self
            .factories
            .read()
            .get(protocol)
            .cloned()
            .ok_or_else(|| Error::Config(format!("unknown protocol: {}", protocol)))?;

        match factory.create_driver(config) {
            Ok(backend) => {
                tracing::debug!("Backend created: {} ({})", protocol, backend.name());
                Ok(backend)
            }
            Err(e) => {
                tracing::error!("Backend creation failed: {} - {}", protocol, e);
                Err(e)
            }
        }
    }

    /// List all registered protocols / 列出所有协议
    pub fn list_driver_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.factories.read().keys().cloned().collect();
        types.sort();
        types
    }

    pub fn capabilities(&self, protocol: &str) -> Option<Capability> {
        self.factories.read().get(protocol).map(|f| f.capabilities())
    }
}

impl Default for BackendRegistry {
    /// Registry with every built-in driver / 包含所有内置驱动
    fn default() -> Self {
        let registry = Self::new();
        crate::drivers::register_all(&registry);
        registry
    }
}
