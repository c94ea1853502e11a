//! REST backend against a mock HTTP server

use mockito::{Matcher, Server};
use search_index_manager::backend::{
    unstarted_copies, AliasAction, BackendError, CreateIndexRequest, Document, HttpBackend, ScrollRequest,
    SearchBackend,
};
use search_index_manager::config::{BackendConfig, BackendKind};
use search_index_manager::drift::ConfigTree;
use search_index_manager::reindex::{Partition, ReindexJob, Reindexer};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn config(url: String) -> BackendConfig {
    BackendConfig {
        kind: BackendKind::Http,
        url,
        username: None,
        password_env: None,
        api_key_env: None,
        request_timeout_secs: 5,
    }
}

fn backend(server: &Server) -> HttpBackend {
    HttpBackend::new(&config(server.url())).unwrap()
}

#[tokio::test]
async fn test_missing_alias_has_no_holders() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/_alias/wiki_content")
        .with_status(404)
        .with_body(r#"{"error":"alias [wiki_content] missing","status":404}"#)
        .create_async()
        .await;

    let holders = backend(&server).indices_with_alias("wiki_content").await.unwrap();
    assert!(holders.is_empty());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_alias_holders_are_sorted() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/_alias/wiki")
        .with_status(200)
        .with_body(r#"{"wiki_general_2":{"aliases":{"wiki":{}}},"wiki_content_1":{"aliases":{"wiki":{}}}}"#)
        .create_async()
        .await;

    let holders = backend(&server).indices_with_alias("wiki").await.unwrap();
    assert_eq!(holders, vec!["wiki_content_1", "wiki_general_2"]);
}

#[tokio::test]
async fn test_settings_are_flattened_under_index() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/wiki_content_1/_settings")
        .with_status(200)
        .with_body(
            json!({
                "wiki_content_1": {
                    "settings": {
                        "index": {
                            "number_of_shards": "4",
                            "number_of_replicas": "1",
                            "analysis": {"analyzer": {"plain": {"tokenizer": "standard"}}}
                        }
                    }
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let settings = backend(&server).get_settings("wiki_content_1").await.unwrap();
    assert_eq!(settings.get_u32("index.number_of_shards"), Some(4));
    assert!(settings.get("index.analysis.analyzer.plain.tokenizer").is_some());
}

#[tokio::test]
async fn test_alias_actions_go_in_one_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/_aliases")
        .match_body(Matcher::Json(json!({
            "actions": [
                {"add": {"index": "wiki_content_2", "alias": "wiki_content"}},
                {"remove": {"index": "wiki_content_1", "alias": "wiki_content"}}
            ]
        })))
        .with_status(200)
        .with_body(r#"{"acknowledged":true}"#)
        .create_async()
        .await;

    backend(&server)
        .update_aliases(&[
            AliasAction::add("wiki_content", "wiki_content_2"),
            AliasAction::remove("wiki_content", "wiki_content_1"),
        ])
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_bulk_conflict_is_reported() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/wiki_content_2/_bulk")
        .match_header("content-type", "application/x-ndjson")
        .with_status(200)
        .with_body(
            json!({
                "took": 3,
                "errors": true,
                "items": [
                    {"create": {"_id": "1", "status": 201}},
                    {"create": {"_id": "2", "status": 409, "error": {"type": "version_conflict_engine_exception", "reason": "document already exists"}}}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let err = backend(&server)
        .bulk_create(
            "wiki_content_2",
            &[Document::new("1", json!({"title": "a"})), Document::new("2", json!({"title": "b"}))],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::DocumentConflict { ref id, .. } if id == "2"));
}

#[tokio::test]
async fn test_expired_scroll() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", "/_search/scroll")
        .with_status(404)
        .with_body(r#"{"error":{"type":"search_context_missing_exception"}}"#)
        .create_async()
        .await;

    let err = backend(&server)
        .fetch_next("abc", Duration::from_secs(60))
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::ScrollExpired(ref id) if id == "abc"));
}

#[tokio::test]
async fn test_mapping_conflict_is_a_rejection() {
    let mut server = Server::new_async().await;
    server
        .mock("PUT", "/wiki_content_1/_mapping")
        .with_status(400)
        .with_body(r#"{"error":{"type":"illegal_argument_exception"}}"#)
        .create_async()
        .await;

    let mapping = search_index_manager::drift::ConfigTree::from_json(json!({
        "properties": {"title": {"type": "long"}}
    }))
    .unwrap();
    let err = backend(&server)
        .set_mapping("wiki_content_1", &mapping)
        .await
        .unwrap_err();
    assert!(err.is_rejection());
}

#[tokio::test]
async fn test_api_key_header() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("HEAD", "/wiki_content_1")
        .match_header("authorization", "ApiKey c2VjcmV0")
        .with_status(200)
        .create_async()
        .await;

    std::env::set_var("SIM_TEST_HTTP_BACKEND_API_KEY", "c2VjcmV0");
    let config = BackendConfig {
        api_key_env: Some("SIM_TEST_HTTP_BACKEND_API_KEY".to_string()),
        ..config(server.url())
    };
    let backend = HttpBackend::new(&config).unwrap();

    assert!(backend.index_exists("wiki_content_1").await.unwrap());
    mock.assert_async().await;
}

#[tokio::test]
async fn test_create_index_body() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("PUT", "/wiki_content_first")
        .match_body(Matcher::Json(json!({
            "settings": {
                "number_of_shards": 4,
                "number_of_replicas": 0,
                "analysis": {"analyzer": {"plain": {"type": "custom", "tokenizer": "standard"}}},
                "translog": {"flush_threshold_size": "512mb"}
            }
        })))
        .with_status(200)
        .with_body(r#"{"acknowledged":true,"index":"wiki_content_first"}"#)
        .create_async()
        .await;

    let analysis = ConfigTree::from_json(json!({
        "analyzer": {"plain": {"type": "custom", "tokenizer": "standard"}}
    }))
    .unwrap();
    backend(&server)
        .create_index("wiki_content_first", &CreateIndexRequest::new(4, 0, analysis))
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_sliced_scroll_request() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/wiki_content/_search")
        .match_query(Matcher::UrlEncoded("scroll".into(), "90s".into()))
        .match_body(Matcher::PartialJson(json!({
            "size": 25,
            "sort": ["_doc"],
            "slice": {"id": 1, "max": 3}
        })))
        .with_status(200)
        .with_body(
            json!({
                "_scroll_id": "c2Nyb2xs",
                "hits": {
                    "total": {"value": 2, "relation": "eq"},
                    "hits": [
                        {"_id": "page-1", "_source": {"title": "Page 1"}},
                        {"_id": "page-7", "_source": {"title": "Page 7"}}
                    ]
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let request = ScrollRequest {
        batch_size: 25,
        window: Duration::from_secs(90),
        partition: Some(Partition::new(1, 3).unwrap()),
    };
    let page = backend(&server).open_scroll("wiki_content", &request).await.unwrap();

    mock.assert_async().await;
    assert_eq!(page.scroll_id.as_deref(), Some("c2Nyb2xs"));
    assert_eq!(page.total, 2);
    let ids: Vec<&str> = page.documents.iter().map(|doc| doc.id.as_str()).collect();
    assert_eq!(ids, vec!["page-1", "page-7"]);
}

#[tokio::test]
async fn test_shard_status_from_cat_shards() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/_cat/shards/wiki_content_2")
        .match_query(Matcher::AllOf(vec![
            Matcher::UrlEncoded("format".into(), "json".into()),
            Matcher::UrlEncoded("h".into(), "shard,prirep,state".into()),
        ]))
        .with_status(200)
        .with_body(
            json!([
                {"shard": "0", "prirep": "p", "state": "STARTED"},
                {"shard": "0", "prirep": "r", "state": "INITIALIZING"},
                {"shard": "1", "prirep": "p", "state": "STARTED"},
                {"shard": "1", "prirep": "r", "state": "STARTED"}
            ])
            .to_string(),
        )
        .create_async()
        .await;

    let status = backend(&server).shard_status("wiki_content_2").await.unwrap();
    assert_eq!(status.len(), 4);
    assert!(status[0].primary && !status[1].primary);
    assert_eq!(status[1].shard, 0);
    assert_eq!(status[3].shard, 1);
    assert_eq!(unstarted_copies(&status), 1);
}

#[tokio::test]
async fn test_count_documents() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", "/wiki_content/_count")
        .with_status(200)
        .with_body(r#"{"count":1234,"_shards":{"total":4,"successful":4,"failed":0}}"#)
        .create_async()
        .await;
    server
        .mock("GET", "/wiki_content_9/_count")
        .with_status(404)
        .with_body(r#"{"error":{"type":"index_not_found_exception"},"status":404}"#)
        .create_async()
        .await;

    let backend = backend(&server);
    assert_eq!(backend.count_documents("wiki_content").await.unwrap(), 1234);
    assert!(matches!(
        backend.count_documents("wiki_content_9").await.unwrap_err(),
        BackendError::NotFound(ref index) if index == "wiki_content_9"
    ));
}

#[tokio::test]
async fn test_optimize_forces_a_merge() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", "/wiki_content_2/_forcemerge")
        .match_query(Matcher::UrlEncoded("max_num_segments".into(), "5".into()))
        .with_status(200)
        .with_body(r#"{"_shards":{"total":8,"successful":8,"failed":0}}"#)
        .create_async()
        .await;

    backend(&server).optimize("wiki_content_2", 5).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_reindex_relaxes_then_restores_settings() {
    let mut server = Server::new_async().await;
    let relax = server
        .mock("PUT", "/wiki_content_new/_settings")
        .match_body(Matcher::Json(json!({
            "index": {"refresh_interval": "-1", "merge": {"policy": {"segments_per_tier": 20}}}
        })))
        .with_status(200)
        .with_body(r#"{"acknowledged":true}"#)
        .expect(1)
        .create_async()
        .await;
    let restore = server
        .mock("PUT", "/wiki_content_new/_settings")
        .match_body(Matcher::Json(json!({
            "index": {"refresh_interval": "1s", "merge": {"policy": {"segments_per_tier": 10}}}
        })))
        .with_status(200)
        .with_body(r#"{"acknowledged":true}"#)
        .expect(1)
        .create_async()
        .await;
    server
        .mock("POST", "/wiki_content/_search")
        .match_query(Matcher::UrlEncoded("scroll".into(), "60s".into()))
        .with_status(200)
        .with_body(
            json!({
                "_scroll_id": "s1",
                "hits": {"total": {"value": 1}, "hits": [{"_id": "page-1", "_source": {"title": "Page 1"}}]}
            })
            .to_string(),
        )
        .create_async()
        .await;
    server
        .mock("POST", "/wiki_content_new/_bulk")
        .with_status(200)
        .with_body(r#"{"took":1,"errors":false,"items":[{"create":{"_id":"page-1","status":201}}]}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/_search/scroll")
        .with_status(200)
        .with_body(r#"{"_scroll_id":"s1","hits":{"total":{"value":1},"hits":[]}}"#)
        .create_async()
        .await;
    server
        .mock("DELETE", "/_search/scroll")
        .with_status(200)
        .with_body(r#"{"succeeded":true}"#)
        .create_async()
        .await;
    server
        .mock("POST", "/wiki_content_new/_refresh")
        .with_status(200)
        .with_body("{}")
        .create_async()
        .await;
    for index in ["wiki_content", "wiki_content_new"] {
        server
            .mock("GET", format!("/{}/_count", index).as_str())
            .with_status(200)
            .with_body(r#"{"count":1}"#)
            .create_async()
            .await;
    }

    let job = ReindexJob {
        source: "wiki_content".to_string(),
        destination: "wiki_content_new".to_string(),
        workers: 1,
        chunk_size: 100,
        shards: 1,
        acceptable_count_deviation: 0.0,
    };
    let outcome = Reindexer::new(Arc::new(backend(&server)), Duration::from_secs(60))
        .run(&job)
        .await
        .unwrap();

    assert_eq!(outcome.documents_written, 1);
    assert_eq!(outcome.destination_count, 1);
    relax.assert_async().await;
    restore.assert_async().await;
}
