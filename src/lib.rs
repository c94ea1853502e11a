//! Search index manager
//!
//! Keeps a search engine index type (for example `content` or `general`)
//! in line with its desired settings, analyzers, mapping and aliases,
//! rebuilding it behind an atomic alias swap when it cannot be changed in place.

pub mod alias;
pub mod backend;
pub mod cli;
pub mod config;
pub mod convergence;
pub mod desired;
pub mod drift;
pub mod error;
pub mod metrics;
pub mod naming;
pub mod reindex;

pub use backend::{create_backend, SearchBackend};
pub use config::Config;
pub use convergence::{ConvergeOptions, ConvergenceEngine, RunReport};
pub use error::{AppError, Result};
pub use naming::{IdentifierOption, IndexNames};
