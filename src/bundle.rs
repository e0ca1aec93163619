//! Context bundle: the reusable script prelude executed on every call.
//!
//! The bundle is fetched once and cached for the process lifetime. Lazy
//! initialization is single-flight: concurrent first callers share one
//! in-flight load instead of fetching twice, and everyone after hits the
//! cache.

use std::sync::Arc;

use tokio::sync::OnceCell;
use url::Url;

use crate::error::{BridgeError, BridgeResult};

const LOG_TARGET: &str = "ukibashi::bundle";

/// Source of the context bundle text.
///
/// `load` may block (network, disk); the bridge runs it on the blocking
/// thread pool.
pub trait BundleLoader: Send + Sync + 'static {
    fn load(&self) -> BridgeResult<String>;
}

/// Fetches the bundle from a URL.
pub struct HttpBundleLoader {
    url: Url,
}

impl HttpBundleLoader {
    pub fn new(url: Url) -> Self {
        Self { url }
    }
}

impl BundleLoader for HttpBundleLoader {
    fn load(&self) -> BridgeResult<String> {
        let response = reqwest::blocking::get(self.url.clone()).map_err(|e| {
            BridgeError::BundleLoad {
                message: e.to_string(),
            }
        })?;

        if !response.status().is_success() {
            return Err(BridgeError::BundleLoad {
                message: format!("HTTP {} for {}", response.status(), self.url),
            });
        }

        response.text().map_err(|e| BridgeError::BundleLoad {
            message: e.to_string(),
        })
    }
}

/// Serves bundle text held in memory (embedded asset, tests).
pub struct StaticBundleLoader {
    text: String,
}

impl StaticBundleLoader {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl BundleLoader for StaticBundleLoader {
    fn load(&self) -> BridgeResult<String> {
        Ok(self.text.clone())
    }
}

/// Process-lifetime cache around a [`BundleLoader`].
pub(crate) struct ContextBundle {
    loader: Arc<dyn BundleLoader>,
    cached: OnceCell<Arc<str>>,
}

impl ContextBundle {
    pub(crate) fn new(loader: Arc<dyn BundleLoader>) -> Self {
        Self {
            loader,
            cached: OnceCell::new(),
        }
    }

    /// Bundle text, loading it on first use.
    ///
    /// `OnceCell::get_or_try_init` serializes concurrent initializers, so
    /// exactly one load runs no matter how many calls race on first use. A
    /// failed load leaves the cell empty and the next caller retries.
    pub(crate) async fn get(&self) -> BridgeResult<Arc<str>> {
        let text = self
            .cached
            .get_or_try_init(|| async {
                let loader = Arc::clone(&self.loader);
                log::debug!(target: LOG_TARGET, "loading context bundle");
                let text = tokio::task::spawn_blocking(move || loader.load())
                    .await
                    .map_err(|e| BridgeError::BundleLoad {
                        message: format!("loader task failed: {e}"),
                    })??;
                log::debug!(
                    target: LOG_TARGET,
                    "context bundle loaded ({} bytes)",
                    text.len()
                );
                Ok::<Arc<str>, BridgeError>(Arc::from(text.as_str()))
            })
            .await?;
        Ok(Arc::clone(text))
    }
}
