use super::report::{Correction, Issue, Phase, RunReport, Section};
use crate::alias::{AliasSwapper, ShardWait};
use crate::backend::{CreateIndexRequest, SearchBackend};
use crate::config::{IndexTypeSpec, ReindexConfig};
use crate::desired::DesiredStateProvider;
use crate::drift::{
    analysis_verdict, inspect, mapping_verdict, scalar_verdict, ConfigTree, DriftReport,
    FlatSettings, REPLICAS_KEY, SHARDS_KEY,
};
use crate::error::{AppError, Result};
use crate::naming::{pick_identifier, IdentifierOption, IndexNames};
use crate::reindex::{ReindexJob, ReindexOutcome, Reindexer};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Operator permissions and target for one run
#[derive(Debug, Clone)]
pub struct ConvergeOptions {
    /// Delete and recreate the index
    pub rebuild: bool,
    /// Allow closing the index to correct analyzers
    pub close_ok: bool,
    /// Allow taking the specific alias over by reindexing and deleting the holder
    pub reindex_and_remove_ok: bool,
    pub identifier: IdentifierOption,
}

impl Default for ConvergeOptions {
    fn default() -> Self {
        Self {
            rebuild: false,
            close_ok: false,
            reindex_and_remove_ok: false,
            identifier: IdentifierOption::Current,
        }
    }
}

/// Mutable state of one run
struct Run {
    index: String,
    close_ok: bool,
    /// Closed by this run and not reopened yet
    closed: bool,
    /// Created with zero replicas; raise them once the alias is bound
    too_few_replicas: bool,
    report: RunReport,
}

/// Reconciles one index type with its desired state
pub struct ConvergenceEngine {
    backend: Arc<dyn SearchBackend>,
    desired: Arc<dyn DesiredStateProvider>,
    names: IndexNames,
    spec: IndexTypeSpec,
    reindex: ReindexConfig,
}

impl ConvergenceEngine {
    pub fn new(
        backend: Arc<dyn SearchBackend>,
        desired: Arc<dyn DesiredStateProvider>,
        names: IndexNames,
        spec: IndexTypeSpec,
        reindex: ReindexConfig,
    ) -> Self {
        Self {
            backend,
            desired,
            names,
            spec,
            reindex,
        }
    }

    pub fn names(&self) -> &IndexNames {
        &self.names
    }

    /// Physical index name the identifier option points at
    pub async fn resolve_index(&self, identifier: &IdentifierOption) -> Result<String> {
        let live = self.backend.list_indices().await?;
        let id = pick_identifier(identifier, &self.names, &live)?;
        Ok(self.names.physical_index(&id))
    }

    /// Per-section verdicts for `index`, without changing anything
    pub async fn inspect(&self, index: &str) -> Result<DriftReport> {
        let settings = self.backend.get_settings(index).await?;
        let mapping = self.backend.get_mapping(index).await?;
        Ok(inspect(
            &settings,
            &mapping,
            self.spec.shards,
            self.spec.replicas,
            &self.desired.analysis_config(),
            &self.desired.mapping_config(),
        ))
    }

    /// Validate every section and correct what the options allow.
    ///
    /// Drift that cannot be corrected lands in the report's issues; backend
    /// failures abort the run with an error. Either way an index closed by
    /// this run is reopened before returning.
    pub async fn converge(&self, options: &ConvergeOptions) -> Result<RunReport> {
        let index = self.resolve_index(&options.identifier).await?;
        info!(index_type = %self.names.index_type(), index = %index, "Converging index");

        let mut run = Run {
            report: RunReport::new(self.names.index_type(), &index),
            index,
            close_ok: options.close_ok,
            closed: false,
            too_few_replicas: false,
        };

        let outcome = self.run_phases(&mut run, options).await;

        if run.closed {
            info!(phase = %Phase::Reopen, index = %run.index, "Reopening index");
            match self.backend.open_index(&run.index).await {
                Ok(()) => {
                    run.closed = false;
                    run.report.correct(Correction::Reopened);
                }
                Err(e) => {
                    error!(index = %run.index, error = %e, "Failed to reopen index");
                    outcome?;
                    return Err(e.into());
                }
            }
        }

        outcome?;
        if run.report.is_converged() {
            info!(index = %run.index, corrections = run.report.corrections.len(), "Index converged");
        } else {
            warn!(index = %run.index, issues = run.report.issues.len(), "Index left with uncorrected drift");
        }
        Ok(run.report)
    }

    async fn run_phases(&self, run: &mut Run, options: &ConvergeOptions) -> Result<()> {
        info!(phase = %Phase::EnsureIndex, index = %run.index);
        self.ensure_index(run, options).await?;

        info!(phase = %Phase::ValidateSettings, index = %run.index);
        self.validate_settings(run).await?;

        info!(phase = %Phase::ValidateAnalyzers, index = %run.index);
        self.validate_analyzers(run).await?;

        info!(phase = %Phase::ValidateMapping, index = %run.index);
        self.validate_mapping(run).await?;

        info!(phase = %Phase::ValidateAlias, index = %run.index);
        self.validate_alias(run, options).await
    }

    async fn ensure_index(&self, run: &mut Run, options: &ConvergeOptions) -> Result<()> {
        let exists = self.backend.index_exists(&run.index).await?;
        if options.rebuild {
            if exists {
                info!(index = %run.index, "Rebuilding index");
                self.backend.delete_index(&run.index).await?;
            }
        } else if exists {
            info!(index = %run.index, "Index exists so validating");
            return Ok(());
        }

        let replicas = if options.rebuild || options.reindex_and_remove_ok {
            0
        } else {
            self.spec.replicas
        };
        let request = CreateIndexRequest::new(self.spec.shards, replicas, self.desired.analysis_config());
        self.backend.create_index(&run.index, &request).await?;

        // Nothing on a brand-new index is worth closing it for
        run.close_ok = false;
        run.too_few_replicas = replicas < self.spec.replicas;
        run.report.correct(Correction::Created {
            index: run.index.clone(),
            replicas,
            rebuilt: options.rebuild,
        });
        Ok(())
    }

    async fn validate_settings(&self, run: &mut Run) -> Result<()> {
        let settings = self.backend.get_settings(&run.index).await?;

        if !scalar_verdict(&settings, SHARDS_KEY, self.spec.shards).is_match() {
            run.report.drift(Section::Shards);
            run.report.report(Issue::ShardCountMismatch {
                actual: settings.get_u32(SHARDS_KEY),
                desired: self.spec.shards,
            });
        }

        if run.too_few_replicas {
            info!(index = %run.index, "Replica count deferred until the alias is in place");
            return Ok(());
        }
        self.validate_replicas(run, &settings).await
    }

    async fn validate_replicas(&self, run: &mut Run, settings: &FlatSettings) -> Result<()> {
        if scalar_verdict(settings, REPLICAS_KEY, self.spec.replicas).is_match() {
            return Ok(());
        }
        run.report.drift(Section::Replicas);
        self.backend
            .set_settings(
                &run.index,
                &ConfigTree::new().with("number_of_replicas", self.spec.replicas),
            )
            .await?;
        run.report.correct(Correction::ReplicasUpdated {
            from: settings.get_u32(REPLICAS_KEY),
            to: self.spec.replicas,
        });
        Ok(())
    }

    /// Raise replicas on an index created with none
    async fn restore_replicas(&self, run: &mut Run) -> Result<()> {
        if !run.too_few_replicas {
            return Ok(());
        }
        run.too_few_replicas = false;
        let settings = self.backend.get_settings(&run.index).await?;
        self.validate_replicas(run, &settings).await
    }

    async fn validate_analyzers(&self, run: &mut Run) -> Result<()> {
        let settings = self.backend.get_settings(&run.index).await?;
        let desired = self.desired.analysis_config();
        if analysis_verdict(&settings, &desired).is_match() {
            return Ok(());
        }

        run.report.drift(Section::Analyzers);
        if !run.close_ok {
            run.report.report(Issue::CloseDenied);
            return Ok(());
        }

        info!(index = %run.index, "Closing index to update analyzers");
        self.backend.close_index(&run.index).await?;
        run.closed = true;
        self.backend
            .set_settings(&run.index, &ConfigTree::new().with("analysis", desired))
            .await?;
        self.backend.open_index(&run.index).await?;
        run.closed = false;
        run.report.correct(Correction::AnalyzersUpdated);
        Ok(())
    }

    async fn validate_mapping(&self, run: &mut Run) -> Result<()> {
        let live = self.backend.get_mapping(&run.index).await?;
        let desired = self.desired.mapping_config();
        if mapping_verdict(&live, &desired).is_match() {
            return Ok(());
        }

        run.report.drift(Section::Mapping);
        match self.backend.set_mapping(&run.index, &desired).await {
            Ok(()) => run.report.correct(Correction::MappingUpdated),
            Err(e) if e.is_rejection() => {
                run.report.report(Issue::MappingRejected {
                    reason: e.to_string(),
                })
            }
            Err(e) => return Err(e.into()),
        }
        Ok(())
    }

    /// Specific alias first, then the global one. The global alias is only
    /// touched once the specific alias resolves to this index.
    async fn validate_alias(&self, run: &mut Run, options: &ConvergeOptions) -> Result<()> {
        let swapper = AliasSwapper::new(Arc::clone(&self.backend));
        let alias = self.names.specific_alias();
        self.clear_alias_name(&alias, options).await?;

        let holders = self.backend.indices_with_alias(&alias).await?;
        let stale = if holders.contains(&run.index) {
            Vec::new()
        } else if holders.is_empty() {
            run.report.drift(Section::SpecificAlias);
            self.backend.add_alias(&alias, &run.index, false).await?;
            run.report.correct(Correction::SpecificAliasBound {
                alias: alias.clone(),
            });
            self.restore_replicas(run).await?;
            Vec::new()
        } else if options.reindex_and_remove_ok {
            run.report.drift(Section::SpecificAlias);
            self.migrate(run, &swapper, &alias).await?
        } else {
            run.report.drift(Section::SpecificAlias);
            run.report.report(Issue::AliasHeldElsewhere { alias, holders });
            return self.restore_replicas(run).await;
        };

        let global = self.names.global_alias();
        self.clear_alias_name(global, options).await?;
        if swapper.bind_global(&self.names, &run.index, &stale).await? {
            run.report.drift(Section::GlobalAlias);
            run.report.correct(Correction::GlobalAliasBound {
                alias: global.to_string(),
            });
        }

        if !stale.is_empty() {
            let removed = swapper.remove_stale(&stale).await;
            if !removed.is_empty() {
                run.report.correct(Correction::StaleIndexesRemoved { indexes: removed });
            }
        }
        Ok(())
    }

    /// An index carrying an alias's name blocks the alias. Only `--rebuild`
    /// may delete it.
    async fn clear_alias_name(&self, alias: &str, options: &ConvergeOptions) -> Result<()> {
        if !self.backend.list_indices().await?.iter().any(|index| index == alias) {
            return Ok(());
        }
        if !options.rebuild {
            return Err(AppError::AliasNameTaken(alias.to_string()));
        }
        warn!(index = %alias, "Deleting index named like the alias");
        self.backend.delete_index(alias).await?;
        Ok(())
    }

    /// Reindex from the alias, swap it over, and bring replicas up.
    /// Returns the indexes that lost the alias.
    async fn migrate(&self, run: &mut Run, swapper: &AliasSwapper, alias: &str) -> Result<Vec<String>> {
        info!(alias, index = %run.index, "Alias is taken; reindexing");
        let outcome = self.reindex_from(alias, &run.index).await?;

        let stale = swapper.swap_specific(alias, &run.index).await?;
        run.report.correct(Correction::Migrated {
            alias: alias.to_string(),
            from: stale.clone(),
            documents: outcome.documents_written,
        });

        if run.too_few_replicas {
            swapper
                .optimize(&run.index, self.reindex.optimize_max_segments)
                .await?;
            self.restore_replicas(run).await?;
            swapper.wait_for_shards(&run.index, self.shard_wait()).await?;
        }
        Ok(stale)
    }

    fn shard_wait(&self) -> ShardWait {
        ShardWait {
            interval: self.reindex.shard_poll_interval(),
            log_every: self.reindex.shard_poll_log_every,
        }
    }

    async fn reindex_from(&self, source: &str, destination: &str) -> Result<ReindexOutcome> {
        let reindexer = Reindexer::new(Arc::clone(&self.backend), self.reindex.scroll_window());
        let job = ReindexJob {
            source: source.to_string(),
            destination: destination.to_string(),
            workers: self.spec.reindex_workers,
            chunk_size: self.spec.chunk_size,
            shards: self.spec.shards,
            acceptable_count_deviation: self.spec.acceptable_count_deviation,
        };
        Ok(reindexer.run(&job).await?)
    }

    /// Open the index and do nothing else
    pub async fn force_open(&self, identifier: &IdentifierOption) -> Result<String> {
        let index = self.resolve_index(identifier).await?;
        info!(index = %index, "Forcing index open");
        self.backend.open_index(&index).await?;
        Ok(index)
    }

    /// Copy everything behind the specific alias into the identified index.
    /// Aliases are left alone.
    pub async fn force_reindex(&self, identifier: &IdentifierOption) -> Result<ReindexOutcome> {
        let index = self.resolve_index(identifier).await?;
        if !self.backend.index_exists(&index).await? {
            return Err(AppError::Validation(format!(
                "index {} does not exist; create it before reindexing into it",
                index
            )));
        }
        let alias = self.names.specific_alias();
        info!(source = %alias, destination = %index, "Forcing reindex");
        self.reindex_from(&alias, &index).await
    }
}
