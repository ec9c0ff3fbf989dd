//! Metadata engine: stat and prefix listing / 元数据引擎

use std::collections::HashSet;

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::retry::RetryPolicy;
use crate::storage::{BackendBox, ObjectInfo};
use crate::utils::strip_scheme;

pub struct MetadataEngine {
    backend: BackendBox,
    retry: RetryPolicy,
}

impl MetadataEngine {
    pub fn new(backend: BackendBox, config: &BackendConfig) -> Self {
        Self {
            backend,
            retry: RetryPolicy::from_config(config),
        }
    }

    pub async fn stat(&self, resource: &str) -> Result<ObjectInfo> {
        let what = format!("stat {}", resource);
        self.retry.run(&what, || self.backend.stat(resource)).await
    }

    /// Every object under `prefix`, following continuation pages / 列出前缀下所有对象
    pub async fn find_detail(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let wanted = strip_scheme(prefix).trim_start_matches('/');
        let mut seen_tokens = HashSet::new();
        let mut token: Option<String> = None;
        let mut objects = Vec::new();

        loop {
            let what = format!("list {}", prefix);
            let page = self
                .retry
                .run(&what, || self.backend.list_page(prefix, token.clone()))
                .await?;
            tracing::debug!(
                "List page for {}: {} objects, next={:?}",
                prefix,
                page.objects.len(),
                page.next
            );
            objects.extend(page.objects.into_iter().filter(|o| o.name.starts_with(wanted)));

            match page.next {
                Some(next) => {
                    if !seen_tokens.insert(next.clone()) {
                        return Err(Error::Protocol(format!(
                            "listing {} returned continuation token {} twice",
                            prefix, next
                        )));
                    }
                    token = Some(next);
                }
                None => break,
            }
        }
        Ok(objects)
    }

    /// Identifiers under `prefix` / 列出对象标识
    pub async fn find(&self, prefix: &str) -> Result<Vec<String>> {
        Ok(self
            .find_detail(prefix)
            .await?
            .into_iter()
            .map(|o| o.name)
            .collect())
    }
}
