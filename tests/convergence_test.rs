//! End-to-end convergence runs against the in-memory backend

mod common;

use common::*;
use search_index_manager::backend::{InMemoryBackend, SearchBackend};
use search_index_manager::config::IndexTypeSpec;
use search_index_manager::convergence::{Correction, Issue};
use search_index_manager::reindex::ReindexError;
use search_index_manager::{AppError, ConvergeOptions, IdentifierOption};
use std::sync::Arc;

fn literal(id: &str) -> IdentifierOption {
    IdentifierOption::Literal(id.to_string())
}

async fn holders(backend: &InMemoryBackend, alias: &str) -> Vec<String> {
    backend.indices_with_alias(alias).await.unwrap()
}

#[tokio::test]
async fn test_missing_index_is_created_and_aliased() {
    let backend = Arc::new(InMemoryBackend::new());
    let engine = engine(&backend, spec(4, 1));

    let report = engine.converge(&ConvergeOptions::default()).await.unwrap();

    assert_eq!(report.index, "wiki_content_first");
    assert_eq!(report.exit_code(), 0);
    assert!(matches!(
        report.corrections.first(),
        Some(Correction::Created { replicas: 1, rebuilt: false, .. })
    ));
    assert!(report.corrections.contains(&Correction::MappingUpdated));
    assert_eq!(holders(&backend, ALIAS).await, vec!["wiki_content_first"]);
    assert_eq!(holders(&backend, BASE).await, vec!["wiki_content_first"]);
}

#[tokio::test]
async fn test_second_run_changes_nothing() {
    let backend = Arc::new(InMemoryBackend::new());
    let engine = engine(&backend, spec(4, 1));

    engine.converge(&ConvergeOptions::default()).await.unwrap();
    let mutations = backend.mutation_count();

    let report = engine.converge(&ConvergeOptions::default()).await.unwrap();
    assert!(report.corrections.is_empty());
    assert!(report.is_converged());
    assert_eq!(backend.mutation_count(), mutations);
    assert!(engine.inspect("wiki_content_first").await.unwrap().is_clean());
}

#[tokio::test]
async fn test_shard_mismatch_is_reported_and_run_continues() {
    let backend = Arc::new(InMemoryBackend::new());
    seed_converged(&backend, "wiki_content_first", 5, 0, 3);
    let engine = engine(&backend, spec(10, 1));

    let report = engine.converge(&ConvergeOptions::default()).await.unwrap();

    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        report.issues,
        vec![Issue::ShardCountMismatch { actual: Some(5), desired: 10 }]
    );
    assert!(report
        .corrections
        .contains(&Correction::ReplicasUpdated { from: Some(0), to: 1 }));
}

#[tokio::test]
async fn test_analyzer_drift_without_close_permission() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.seed_index("wiki_content_first", 4, 1, other_analysis(), mapping());
    backend.seed_alias(ALIAS, "wiki_content_first");
    backend.seed_alias(BASE, "wiki_content_first");
    let engine = engine(&backend, spec(4, 1));

    let report = engine.converge(&ConvergeOptions::default()).await.unwrap();

    assert_eq!(report.issues, vec![Issue::CloseDenied]);
    assert_eq!(report.exit_code(), 1);
    assert_eq!(backend.is_open("wiki_content_first"), Some(true));
}

#[tokio::test]
async fn test_analyzer_drift_corrected_with_close_ok() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.seed_index("wiki_content_first", 4, 1, other_analysis(), mapping());
    backend.seed_alias(ALIAS, "wiki_content_first");
    backend.seed_alias(BASE, "wiki_content_first");
    let engine = engine(&backend, spec(4, 1));

    let options = ConvergeOptions {
        close_ok: true,
        ..ConvergeOptions::default()
    };
    let report = engine.converge(&options).await.unwrap();

    assert_eq!(report.exit_code(), 0);
    assert!(report.corrections.contains(&Correction::AnalyzersUpdated));
    assert_eq!(backend.is_open("wiki_content_first"), Some(true));
    assert!(engine.inspect("wiki_content_first").await.unwrap().analyzers.is_match());
}

#[tokio::test]
async fn test_incompatible_mapping_is_reported() {
    let backend = Arc::new(InMemoryBackend::new());
    let conflicting = search_index_manager::drift::ConfigTree::from_json(serde_json::json!({
        "properties": {"title": {"type": "long"}}
    }))
    .unwrap();
    backend.seed_index("wiki_content_first", 4, 1, analysis(), conflicting);
    backend.seed_alias(ALIAS, "wiki_content_first");
    backend.seed_alias(BASE, "wiki_content_first");
    let engine = engine(&backend, spec(4, 1));

    let report = engine.converge(&ConvergeOptions::default()).await.unwrap();

    assert_eq!(report.exit_code(), 1);
    assert!(matches!(report.issues.as_slice(), [Issue::MappingRejected { .. }]));
}

#[tokio::test]
async fn test_alias_held_elsewhere_without_permission() {
    let backend = Arc::new(InMemoryBackend::new());
    seed_converged(&backend, "wiki_content_old", 4, 1, 10);
    let engine = engine(&backend, spec(4, 1));

    let options = ConvergeOptions {
        identifier: literal("new"),
        ..ConvergeOptions::default()
    };
    let report = engine.converge(&options).await.unwrap();

    assert_eq!(report.exit_code(), 1);
    assert_eq!(
        report.issues,
        vec![Issue::AliasHeldElsewhere {
            alias: ALIAS.to_string(),
            holders: vec!["wiki_content_old".to_string()],
        }]
    );
    assert_eq!(holders(&backend, ALIAS).await, vec!["wiki_content_old"]);
    assert_eq!(holders(&backend, BASE).await, vec!["wiki_content_old"]);
    assert!(backend.has_index("wiki_content_new"));
}

#[tokio::test]
async fn test_migration_swaps_alias_and_removes_old_index() {
    let backend = Arc::new(InMemoryBackend::new());
    seed_converged(&backend, "wiki_content_old", 4, 1, 25);
    backend.delay_replica_start(2);
    let engine = engine(&backend, spec(4, 1));

    let options = ConvergeOptions {
        reindex_and_remove_ok: true,
        identifier: literal("new"),
        ..ConvergeOptions::default()
    };
    let report = engine.converge(&options).await.unwrap();

    assert_eq!(report.exit_code(), 0);
    assert!(matches!(
        report.corrections.first(),
        Some(Correction::Created { replicas: 0, .. })
    ));
    assert!(report.corrections.iter().any(|c| matches!(
        c,
        Correction::Migrated { documents: 25, from, .. } if from == &vec!["wiki_content_old".to_string()]
    )));
    assert!(report.corrections.contains(&Correction::StaleIndexesRemoved {
        indexes: vec!["wiki_content_old".to_string()],
    }));

    assert!(!backend.has_index("wiki_content_old"));
    assert_eq!(holders(&backend, ALIAS).await, vec!["wiki_content_new"]);
    assert_eq!(holders(&backend, BASE).await, vec!["wiki_content_new"]);
    assert_eq!(backend.document_ids("wiki_content_new").len(), 25);
    assert_eq!(backend.optimized_to("wiki_content_new"), Some(5));

    let settings = backend.get_settings("wiki_content_new").await.unwrap();
    assert_eq!(settings.get_u32("index.number_of_replicas"), Some(1));
}

#[tokio::test]
async fn test_count_deviation_keeps_old_index_serving() {
    let backend = Arc::new(InMemoryBackend::new());
    seed_converged(&backend, "wiki_content_old", 4, 1, 25);
    backend.drop_bulk_documents(5);
    let engine = engine(&backend, spec(4, 1));

    let options = ConvergeOptions {
        reindex_and_remove_ok: true,
        identifier: literal("new"),
        ..ConvergeOptions::default()
    };
    let err = engine.converge(&options).await.unwrap_err();

    assert!(matches!(
        err,
        AppError::Reindex(ReindexError::DeviationExceeded { source_count: 25, destination_count: 20, .. })
    ));
    assert!(backend.has_index("wiki_content_old"));
    assert_eq!(holders(&backend, ALIAS).await, vec!["wiki_content_old"]);
    assert_eq!(holders(&backend, BASE).await, vec!["wiki_content_old"]);
}

async fn migrate_with_losses(tolerance: f64) -> (Arc<InMemoryBackend>, Result<i32, AppError>) {
    let backend = Arc::new(InMemoryBackend::new());
    seed_converged(&backend, "wiki_content_old", 4, 1, 1000);
    backend.drop_bulk_documents(40);
    let spec = IndexTypeSpec {
        chunk_size: 100,
        acceptable_count_deviation: tolerance,
        ..spec(4, 1)
    };
    let options = ConvergeOptions {
        reindex_and_remove_ok: true,
        identifier: literal("new"),
        ..ConvergeOptions::default()
    };
    let result = engine(&backend, spec)
        .converge(&options)
        .await
        .map(|report| report.exit_code());
    (backend, result)
}

#[tokio::test]
async fn test_loss_within_tolerance_completes_migration() {
    let (backend, result) = migrate_with_losses(0.05).await;

    assert_eq!(result.unwrap(), 0);
    assert_eq!(backend.document_ids("wiki_content_new").len(), 960);
    assert_eq!(holders(&backend, ALIAS).await, vec!["wiki_content_new"]);
    assert_eq!(holders(&backend, BASE).await, vec!["wiki_content_new"]);
    assert!(!backend.has_index("wiki_content_old"));
}

#[tokio::test]
async fn test_loss_beyond_tolerance_aborts_migration() {
    let (backend, result) = migrate_with_losses(0.03).await;

    assert!(matches!(
        result,
        Err(AppError::Reindex(ReindexError::DeviationExceeded {
            source_count: 1000,
            destination_count: 960,
            ..
        }))
    ));
    assert_eq!(holders(&backend, ALIAS).await, vec!["wiki_content_old"]);
    assert_eq!(holders(&backend, BASE).await, vec!["wiki_content_old"]);
    assert_eq!(backend.document_ids("wiki_content_old").len(), 1000);
}

#[tokio::test]
async fn test_failed_stale_delete_is_not_fatal() {
    let backend = Arc::new(InMemoryBackend::new());
    seed_converged(&backend, "wiki_content_old", 4, 1, 5);
    backend.fail_deletes_of("wiki_content_old");
    let engine = engine(&backend, spec(4, 1));

    let options = ConvergeOptions {
        reindex_and_remove_ok: true,
        identifier: literal("new"),
        ..ConvergeOptions::default()
    };
    let report = engine.converge(&options).await.unwrap();

    assert_eq!(report.exit_code(), 0);
    assert!(backend.has_index("wiki_content_old"));
    assert_eq!(holders(&backend, ALIAS).await, vec!["wiki_content_new"]);
    assert!(!report
        .corrections
        .iter()
        .any(|c| matches!(c, Correction::StaleIndexesRemoved { .. })));
}

#[tokio::test]
async fn test_rebuild_recreates_with_replicas_raised_after_alias() {
    let backend = Arc::new(InMemoryBackend::new());
    seed_converged(&backend, "wiki_content_first", 4, 1, 10);
    let engine = engine(&backend, spec(4, 1));

    let options = ConvergeOptions {
        rebuild: true,
        ..ConvergeOptions::default()
    };
    let report = engine.converge(&options).await.unwrap();

    assert_eq!(report.exit_code(), 0);
    assert!(matches!(
        report.corrections.first(),
        Some(Correction::Created { replicas: 0, rebuilt: true, .. })
    ));
    assert!(report
        .corrections
        .contains(&Correction::ReplicasUpdated { from: Some(0), to: 1 }));
    assert!(backend.document_ids("wiki_content_first").is_empty());
    assert_eq!(holders(&backend, ALIAS).await, vec!["wiki_content_first"]);
}

#[tokio::test]
async fn test_index_named_like_alias_is_fatal_without_rebuild() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.seed_index(ALIAS, 4, 1, analysis(), mapping());
    let engine = engine(&backend, spec(4, 1));

    let err = engine.converge(&ConvergeOptions::default()).await.unwrap_err();
    assert!(matches!(err, AppError::AliasNameTaken(ref name) if name == ALIAS));
    assert_eq!(err.exit_code(), 1);

    let options = ConvergeOptions {
        rebuild: true,
        ..ConvergeOptions::default()
    };
    let report = engine.converge(&options).await.unwrap();
    assert_eq!(report.exit_code(), 0);
    assert!(!backend.has_index(ALIAS));
    assert_eq!(holders(&backend, ALIAS).await, vec!["wiki_content_first"]);
}

#[tokio::test]
async fn test_index_named_like_global_alias_is_fatal_without_rebuild() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.seed_index(BASE, 4, 1, analysis(), mapping());
    let engine = engine(&backend, spec(4, 1));

    let err = engine.converge(&ConvergeOptions::default()).await.unwrap_err();
    assert!(matches!(err, AppError::AliasNameTaken(ref name) if name == BASE));
    assert!(backend.has_index(BASE));
    assert!(holders(&backend, BASE).await.is_empty());
}

#[tokio::test]
async fn test_rebuild_deletes_index_named_like_global_alias() {
    let backend = Arc::new(InMemoryBackend::new());
    backend.seed_index(BASE, 4, 1, analysis(), mapping());
    let engine = engine(&backend, spec(4, 1));

    let options = ConvergeOptions {
        rebuild: true,
        ..ConvergeOptions::default()
    };
    let report = engine.converge(&options).await.unwrap();

    assert_eq!(report.exit_code(), 0);
    assert!(!backend.has_index(BASE));
    assert_eq!(holders(&backend, ALIAS).await, vec!["wiki_content_first"]);
    assert_eq!(holders(&backend, BASE).await, vec!["wiki_content_first"]);
}

#[tokio::test]
async fn test_longer_type_name_is_left_alone() {
    let backend = Arc::new(InMemoryBackend::new());
    seed_converged(&backend, "wiki_content_1", 4, 1, 0);
    backend.seed_index("wiki_content_archive_1", 4, 1, analysis(), mapping());
    backend.seed_alias("wiki_content_archive", "wiki_content_archive_1");
    backend.seed_alias(BASE, "wiki_content_archive_1");
    let engine = engine_among(&backend, spec(4, 1), &["content", "content_archive"]);

    let report = engine.converge(&ConvergeOptions::default()).await.unwrap();

    assert_eq!(report.index, "wiki_content_1");
    assert_eq!(report.exit_code(), 0);
    assert_eq!(
        holders(&backend, BASE).await,
        vec!["wiki_content_1", "wiki_content_archive_1"]
    );
    assert!(backend.has_index("wiki_content_archive_1"));
}

#[tokio::test]
async fn test_ambiguous_current_identifier() {
    let backend = Arc::new(InMemoryBackend::new());
    seed_converged(&backend, "wiki_content_1", 4, 1, 0);
    backend.seed_index("wiki_content_2", 4, 1, analysis(), mapping());
    let engine = engine(&backend, spec(4, 1));

    let err = engine.converge(&ConvergeOptions::default()).await.unwrap_err();
    assert!(matches!(err, AppError::AmbiguousIdentifier(candidates) if candidates.len() == 2));
}

#[tokio::test]
async fn test_force_open() {
    let backend = Arc::new(InMemoryBackend::new());
    seed_converged(&backend, "wiki_content_first", 4, 1, 0);
    backend.seed_closed("wiki_content_first");
    let engine = engine(&backend, spec(4, 1));

    let index = engine.force_open(&IdentifierOption::Current).await.unwrap();
    assert_eq!(index, "wiki_content_first");
    assert_eq!(backend.is_open("wiki_content_first"), Some(true));
}

#[tokio::test]
async fn test_force_reindex_leaves_aliases_alone() {
    let backend = Arc::new(InMemoryBackend::new());
    seed_converged(&backend, "wiki_content_old", 4, 1, 12);
    let engine = engine(&backend, spec(4, 1));

    let err = engine.force_reindex(&literal("new")).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));

    backend.seed_index("wiki_content_new", 4, 1, analysis(), mapping());
    let outcome = engine.force_reindex(&literal("new")).await.unwrap();

    assert_eq!(outcome.documents_written, 12);
    assert_eq!(outcome.destination_count, 12);
    assert_eq!(holders(&backend, ALIAS).await, vec!["wiki_content_old"]);
    assert!(backend.has_index("wiki_content_old"));
}
