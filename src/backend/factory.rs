use crate::backend::{HttpBackend, InMemoryBackend, SearchBackend};
use crate::config::{BackendConfig, BackendKind};
use crate::error::Result;
use std::sync::Arc;

/// Create a search backend based on configuration
pub fn create_backend(config: &BackendConfig) -> Result<Arc<dyn SearchBackend>> {
    match config.kind {
        BackendKind::Http => {
            tracing::info!(url = %config.url, "Initializing Elasticsearch HTTP backend");
            if config.password_env.is_some() && config.password().is_none() {
                tracing::warn!(
                    var = config.password_env.as_deref().unwrap_or_default(),
                    "Password environment variable is not set"
                );
            }
            let backend = HttpBackend::new(config)?;
            Ok(Arc::new(backend))
        }

        BackendKind::InMemory => {
            tracing::warn!("Using in-memory search backend; nothing will be persisted");
            Ok(Arc::new(InMemoryBackend::new()))
        }
    }
}
