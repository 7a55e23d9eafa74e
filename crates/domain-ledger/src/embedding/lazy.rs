//! Once-initialized holder for expensive models.
//!
//! The loader runs on the blocking pool the first time
//! [`LazyModel::ensure_loaded`] is awaited. Concurrent first callers all
//! wait on the same initialization; the loader never runs twice for one
//! holder. A failed load leaves the holder empty so a later call can retry.

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::OnceCell;

type Loader<T> = Arc<dyn Fn() -> Result<T> + Send + Sync>;

pub struct LazyModel<T> {
    name: String,
    cell: OnceCell<Arc<T>>,
    loader: Loader<T>,
}

impl<T: Send + Sync + 'static> LazyModel<T> {
    pub fn new(name: impl Into<String>, loader: impl Fn() -> Result<T> + Send + Sync + 'static) -> Self {
        Self {
            name: name.into(),
            cell: OnceCell::new(),
            loader: Arc::new(loader),
        }
    }

    /// Load the model on first use and return a shared handle to it.
    pub async fn ensure_loaded(&self) -> Result<Arc<T>> {
        let model = self
            .cell
            .get_or_try_init(|| async {
                tracing::info!(model = %self.name, "loading model");
                let loader = Arc::clone(&self.loader);
                let model = tokio::task::spawn_blocking(move || loader())
                    .await
                    .context("model loader panicked")??;
                tracing::info!(model = %self.name, "model ready");
                Ok::<_, anyhow::Error>(Arc::new(model))
            })
            .await?;
        Ok(Arc::clone(model))
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.initialized()
    }
}
