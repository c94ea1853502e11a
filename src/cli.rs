//! Command-line surface

use crate::config::IndexTypeSpec;
use crate::convergence::ConvergeOptions;
use crate::error::{AppError, Result};
use crate::naming::{parse_potential_percent, IdentifierOption};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use validator::Validate;

#[derive(Parser, Debug)]
#[command(name = "search-index-manager", version)]
#[command(about = "Converge a search index to its desired configuration", long_about = None)]
pub struct Cli {
    /// Configuration file layered over the built-in defaults
    #[arg(short, long, global = true, env = "SIM_CONFIG_PATH")]
    pub config: Option<PathBuf>,

    /// Index type to operate on; one of the configured types.
    /// Accepted before or after the subcommand, so clap cannot enforce it.
    #[arg(short = 't', long, global = true)]
    pub index_type: Option<String>,

    /// Physical index identifier: `current`, `now` or a literal
    #[arg(short = 'i', long, global = true, default_value = "current")]
    pub index_identifier: String,

    /// Write Prometheus metrics to this file when the run ends
    #[arg(long, global = true)]
    pub metrics_textfile: Option<PathBuf>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

impl Cli {
    /// Selected operation; converge when none is given
    pub fn command(&self) -> Command {
        self.command
            .clone()
            .unwrap_or_else(|| Command::Converge(ConvergeArgs::default()))
    }

    /// The `--index-type` value, which every command needs
    pub fn index_type(&self) -> Result<&str> {
        self.index_type
            .as_deref()
            .ok_or_else(|| AppError::Validation("--index-type is required".to_string()))
    }

    pub fn identifier(&self) -> IdentifierOption {
        IdentifierOption::parse(&self.index_identifier)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Validate the index and converge it to the desired state
    Converge(ConvergeArgs),

    /// Open the index and do nothing else
    ForceOpen,

    /// Reindex from the type's alias into the index, leaving aliases alone
    ForceReindex(ReindexArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ConvergeArgs {
    /// Delete and recreate the index
    #[arg(long)]
    pub rebuild: bool,

    /// Allow closing the index to apply analyzer changes
    #[arg(long)]
    pub close_ok: bool,

    /// Allow reindexing into this index and deleting the one holding the alias
    #[arg(long)]
    pub reindex_and_remove_ok: bool,

    #[command(flatten)]
    pub reindex: ReindexArgs,
}

impl ConvergeArgs {
    pub fn options(&self, identifier: IdentifierOption) -> ConvergeOptions {
        ConvergeOptions {
            rebuild: self.rebuild,
            close_ok: self.close_ok,
            reindex_and_remove_ok: self.reindex_and_remove_ok,
            identifier,
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
pub struct ReindexArgs {
    /// Parallel reindex workers
    #[arg(long)]
    pub reindex_workers: Option<u32>,

    /// Tolerated count difference, as a fraction (`0.05`) or percentage (`5%`)
    #[arg(long)]
    pub reindex_acceptable_count_deviation: Option<String>,

    /// Documents per bulk request
    #[arg(long)]
    pub reindex_chunk_size: Option<usize>,
}

impl ReindexArgs {
    /// Apply overrides to the configured index type and re-validate it
    pub fn apply(&self, spec: &IndexTypeSpec) -> Result<IndexTypeSpec> {
        let mut spec = spec.clone();
        if let Some(workers) = self.reindex_workers {
            spec.reindex_workers = workers;
        }
        if let Some(deviation) = &self.reindex_acceptable_count_deviation {
            spec.acceptable_count_deviation = parse_potential_percent(deviation)?;
        }
        if let Some(chunk_size) = self.reindex_chunk_size {
            spec.chunk_size = chunk_size;
        }
        spec.validate()?;
        Ok(spec)
    }
}
