//! Desired-state providers
//!
//! Supply the target analysis and mapping documents. The convergence engine
//! treats both as opaque trees.

mod analysis;
mod mapping;

pub use analysis::build_analysis;
pub use mapping::{
    keyword_field, long_field, lowercase_keyword_field, MappingBuilder, COPY_TO_SUGGEST,
    ENABLE_NORMS, MINIMAL, SPEED_UP_HIGHLIGHTING,
};

use crate::config::DesiredConfig;
use crate::drift::ConfigTree;
use crate::error::{AppError, Result};
use std::path::Path;
use std::sync::Arc;

/// Source of the target configuration documents
pub trait DesiredStateProvider: Send + Sync {
    /// Analysis settings, relative to `index.analysis`
    fn analysis_config(&self) -> ConfigTree;

    /// Mapping document (`dynamic`, `properties`, ...)
    fn mapping_config(&self) -> ConfigTree;
}

/// Provider generating the built-in documents
#[derive(Debug, Clone, Default)]
pub struct BuiltinProvider {
    mapping: MappingBuilder,
}

impl BuiltinProvider {
    pub fn new(mapping: MappingBuilder) -> Self {
        Self { mapping }
    }
}

impl DesiredStateProvider for BuiltinProvider {
    fn analysis_config(&self) -> ConfigTree {
        build_analysis()
    }

    fn mapping_config(&self) -> ConfigTree {
        self.mapping.build()
    }
}

/// Provider serving fixed documents
#[derive(Debug, Clone, Default)]
pub struct StaticProvider {
    analysis: ConfigTree,
    mapping: ConfigTree,
}

impl StaticProvider {
    pub fn new(analysis: ConfigTree, mapping: ConfigTree) -> Self {
        Self { analysis, mapping }
    }
}

impl DesiredStateProvider for StaticProvider {
    fn analysis_config(&self) -> ConfigTree {
        self.analysis.clone()
    }

    fn mapping_config(&self) -> ConfigTree {
        self.mapping.clone()
    }
}

/// Read a JSON or YAML document; `.yaml`/`.yml` select YAML
pub fn load_document(path: &Path) -> Result<ConfigTree> {
    let contents = std::fs::read_to_string(path)?;
    let is_yaml = matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("yaml") | Some("yml")
    );
    let value: serde_json::Value = if is_yaml {
        serde_yaml::from_str(&contents)?
    } else {
        serde_json::from_str(&contents)?
    };
    ConfigTree::from_json(value).ok_or_else(|| {
        AppError::Validation(format!("{} must contain an object at the top level", path.display()))
    })
}

/// Build the provider described by configuration.
///
/// Files override the corresponding built-in document.
pub fn create_provider(config: &DesiredConfig) -> Result<Arc<dyn DesiredStateProvider>> {
    let builtin = BuiltinProvider::new(
        MappingBuilder::new()
            .prefix_search_starts_with_any_word(config.prefix_search_starts_with_any_word)
            .phrase_use_text(config.phrase_use_text)
            .optimize_for_experimental_highlighter(config.optimize_for_experimental_highlighter),
    );

    if config.analysis_path.is_none() && config.mapping_path.is_none() {
        return Ok(Arc::new(builtin));
    }

    let analysis = match &config.analysis_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading analysis document");
            load_document(path)?
        }
        None => builtin.analysis_config(),
    };
    let mapping = match &config.mapping_path {
        Some(path) => {
            tracing::info!(path = %path.display(), "Loading mapping document");
            load_document(path)?
        }
        None => builtin.mapping_config(),
    };
    Ok(Arc::new(StaticProvider::new(analysis, mapping)))
}
