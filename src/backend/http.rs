//! Elasticsearch REST implementation of [`SearchBackend`]

use super::{
    AliasAction, BackendError, BackendResult, BulkSummary, CreateIndexRequest, Document,
    IndexStatus, ScrollPage, ScrollRequest, SearchBackend, ShardCopyStatus,
};
use crate::config::BackendConfig;
use crate::drift::{ConfigTree, FlatSettings};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::debug;

/// Search backend speaking the Elasticsearch REST API
pub struct HttpBackend {
    client: Client,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    api_key: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> BackendResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            password: config.password(),
            api_key: config.api_key(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}/{}", self.base_url, path.trim_start_matches('/')));
        if let Some(api_key) = &self.api_key {
            request.header("Authorization", format!("ApiKey {}", api_key))
        } else if let Some(username) = &self.username {
            request.basic_auth(username, self.password.as_ref())
        } else {
            request
        }
    }

    /// Send and turn any non-success status into an error carrying the body
    async fn send(&self, operation: &str, request: RequestBuilder) -> BackendResult<Response> {
        let response = request.send().await?;
        let status = response.status();
        debug!(operation, status = status.as_u16(), "Backend request completed");
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(BackendError::Status {
            operation: operation.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json(&self, operation: &str, request: RequestBuilder) -> BackendResult<Value> {
        let response = self.send(operation, request).await?;
        Ok(response.json().await?)
    }
}

fn not_found_as(err: BackendError, target: &str) -> BackendError {
    match err {
        BackendError::Status { status: 404, .. } => BackendError::NotFound(target.to_string()),
        other => other,
    }
}

fn scroll_keep_alive(window: Duration) -> String {
    format!("{}s", window.as_secs().max(1))
}

/// The single per-index entry of a `{index_name: {...}}` response
fn only_index_entry<'a>(body: &'a Value, key: &str) -> BackendResult<&'a Value> {
    body.as_object()
        .and_then(|indices| indices.values().next())
        .and_then(|entry| entry.get(key))
        .ok_or_else(|| BackendError::Decode(format!("response has no `{}` section", key)))
}

fn tree_of(value: &Value) -> BackendResult<ConfigTree> {
    ConfigTree::from_json(value.clone())
        .ok_or_else(|| BackendError::Decode("expected a JSON object".to_string()))
}

#[derive(Deserialize)]
struct CatIndex {
    index: String,
    #[serde(default)]
    status: Option<String>,
}

#[derive(Deserialize)]
struct CatShard {
    shard: String,
    prirep: String,
    state: String,
}

#[derive(Deserialize)]
struct CountResponse {
    count: u64,
}

#[derive(Deserialize)]
struct BulkResponse {
    #[serde(default)]
    took: u64,
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<BTreeMap<String, BulkItem>>,
}

#[derive(Deserialize)]
struct BulkItem {
    #[serde(rename = "_id", default)]
    id: String,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(rename = "_scroll_id")]
    scroll_id: Option<String>,
    hits: Hits,
}

#[derive(Deserialize)]
struct Hits {
    total: Option<Value>,
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
struct Hit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_source", default)]
    source: Value,
}

impl SearchResponse {
    fn into_page(self) -> ScrollPage {
        // `hits.total` is a number before 7.0 and `{ "value": n }` after
        let total = match &self.hits.total {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(0),
            Some(Value::Object(obj)) => obj.get("value").and_then(Value::as_u64).unwrap_or(0),
            _ => 0,
        };
        ScrollPage {
            scroll_id: self.scroll_id,
            total,
            documents: self
                .hits
                .hits
                .into_iter()
                .map(|hit| Document::new(hit.id, hit.source))
                .collect(),
        }
    }
}

fn bulk_body(documents: &[Document]) -> BackendResult<String> {
    let mut body = String::new();
    for doc in documents {
        body.push_str(&serde_json::to_string(&json!({"create": {"_id": doc.id}}))?);
        body.push('\n');
        body.push_str(&serde_json::to_string(&doc.source)?);
        body.push('\n');
    }
    Ok(body)
}

fn bulk_error_reason(error: &Option<Value>) -> String {
    match error {
        Some(Value::Object(obj)) => obj
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Value::Object(obj.clone()).to_string()),
        Some(other) => other.to_string(),
        None => "unknown error".to_string(),
    }
}

#[async_trait]
impl SearchBackend for HttpBackend {
    async fn index_exists(&self, index: &str) -> BackendResult<bool> {
        let response = self.request(Method::HEAD, index).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            status => Err(BackendError::Status {
                operation: "index exists".to_string(),
                status: status.as_u16(),
                body: String::new(),
            }),
        }
    }

    async fn index_status(&self, index: &str) -> BackendResult<IndexStatus> {
        let request = self
            .request(Method::GET, &format!("_cat/indices/{}", index))
            .query(&[("format", "json"), ("h", "index,status"), ("expand_wildcards", "all")]);
        let rows: Vec<CatIndex> = match self.send("cat indices", request).await {
            Ok(response) => response.json().await?,
            Err(BackendError::Status { status: 404, .. }) => return Ok(IndexStatus::Missing),
            Err(e) => return Err(e),
        };

        Ok(match rows.iter().find(|row| row.index == index) {
            None => IndexStatus::Missing,
            Some(row) if row.status.as_deref() == Some("close") => IndexStatus::Closed,
            Some(_) => IndexStatus::Open,
        })
    }

    async fn list_indices(&self) -> BackendResult<Vec<String>> {
        let request = self
            .request(Method::GET, "_cat/indices")
            .query(&[("format", "json"), ("h", "index,status"), ("expand_wildcards", "all")]);
        let rows: Vec<CatIndex> = self.send("cat indices", request).await?.json().await?;
        let mut names: Vec<String> = rows.into_iter().map(|row| row.index).collect();
        names.sort();
        Ok(names)
    }

    async fn create_index(&self, index: &str, request: &CreateIndexRequest) -> BackendResult<()> {
        let body = json!({ "settings": request.settings().to_json() });
        self.send("create index", self.request(Method::PUT, index).json(&body))
            .await?;
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> BackendResult<()> {
        self.send("delete index", self.request(Method::DELETE, index))
            .await
            .map_err(|e| not_found_as(e, index))?;
        Ok(())
    }

    async fn open_index(&self, index: &str) -> BackendResult<()> {
        self.send("open index", self.request(Method::POST, &format!("{}/_open", index)))
            .await
            .map_err(|e| not_found_as(e, index))?;
        Ok(())
    }

    async fn close_index(&self, index: &str) -> BackendResult<()> {
        self.send("close index", self.request(Method::POST, &format!("{}/_close", index)))
            .await
            .map_err(|e| not_found_as(e, index))?;
        Ok(())
    }

    async fn get_settings(&self, index: &str) -> BackendResult<FlatSettings> {
        let body = self
            .send_json("get settings", self.request(Method::GET, &format!("{}/_settings", index)))
            .await
            .map_err(|e| not_found_as(e, index))?;
        let settings = tree_of(only_index_entry(&body, "settings")?)?;
        Ok(FlatSettings::from_nested(&settings))
    }

    async fn set_settings(&self, index: &str, settings: &ConfigTree) -> BackendResult<()> {
        let body = json!({ "index": settings.to_json() });
        self.send(
            "update settings",
            self.request(Method::PUT, &format!("{}/_settings", index)).json(&body),
        )
        .await?;
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> BackendResult<ConfigTree> {
        let body = self
            .send_json("get mapping", self.request(Method::GET, &format!("{}/_mapping", index)))
            .await
            .map_err(|e| not_found_as(e, index))?;
        tree_of(only_index_entry(&body, "mappings")?)
    }

    async fn set_mapping(&self, index: &str, mapping: &ConfigTree) -> BackendResult<()> {
        self.send(
            "put mapping",
            self.request(Method::PUT, &format!("{}/_mapping", index))
                .json(&mapping.to_json()),
        )
        .await?;
        Ok(())
    }

    async fn indices_with_alias(&self, alias: &str) -> BackendResult<Vec<String>> {
        let request = self.request(Method::GET, &format!("_alias/{}", alias));
        let body = match self.send_json("get alias", request).await {
            Ok(body) => body,
            Err(BackendError::Status { status: 404, .. }) => return Ok(Vec::new()),
            Err(e) => return Err(e),
        };
        let mut holders: Vec<String> = body
            .as_object()
            .map(|indices| indices.keys().cloned().collect())
            .unwrap_or_default();
        holders.sort();
        Ok(holders)
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> BackendResult<()> {
        if actions.is_empty() {
            return Ok(());
        }
        let body = json!({ "actions": actions });
        self.send("update aliases", self.request(Method::POST, "_aliases").json(&body))
            .await?;
        Ok(())
    }

    async fn bulk_create(&self, index: &str, documents: &[Document]) -> BackendResult<BulkSummary> {
        if documents.is_empty() {
            return Ok(BulkSummary::default());
        }
        let request = self
            .request(Method::POST, &format!("{}/_bulk", index))
            .header("Content-Type", "application/x-ndjson")
            .body(bulk_body(documents)?);
        let response: BulkResponse = self.send("bulk", request).await?.json().await?;

        let items: Vec<BulkItem> = response
            .items
            .into_iter()
            .filter_map(|mut item| item.remove("create"))
            .collect();
        if response.errors {
            if let Some(failed) = items.iter().find(|item| item.status >= 300) {
                return Err(if failed.status == 409 {
                    BackendError::DocumentConflict {
                        index: index.to_string(),
                        id: failed.id.clone(),
                    }
                } else {
                    BackendError::BulkItem {
                        index: index.to_string(),
                        id: failed.id.clone(),
                        reason: bulk_error_reason(&failed.error),
                    }
                });
            }
        }

        Ok(BulkSummary {
            written: items.iter().filter(|item| item.status < 300).count(),
            took_ms: response.took,
        })
    }

    async fn open_scroll(&self, index: &str, request: &ScrollRequest) -> BackendResult<ScrollPage> {
        let mut body = json!({
            "size": request.batch_size,
            "sort": ["_doc"],
            "track_total_hits": true,
            "query": { "match_all": {} },
        });
        if let Some(partition) = &request.partition {
            body["slice"] = json!({ "id": partition.worker, "max": partition.workers });
        }

        let http = self
            .request(Method::POST, &format!("{}/_search", index))
            .query(&[("scroll", scroll_keep_alive(request.window))])
            .json(&body);
        let response: SearchResponse = self
            .send("open scroll", http)
            .await
            .map_err(|e| not_found_as(e, index))?
            .json()
            .await?;
        Ok(response.into_page())
    }

    async fn fetch_next(&self, scroll_id: &str, window: Duration) -> BackendResult<ScrollPage> {
        let body = json!({ "scroll": scroll_keep_alive(window), "scroll_id": scroll_id });
        let request = self.request(Method::POST, "_search/scroll").json(&body);
        let response: SearchResponse = match self.send("fetch scroll", request).await {
            Ok(response) => response.json().await?,
            Err(BackendError::Status { status: 404, .. }) => {
                return Err(BackendError::ScrollExpired(scroll_id.to_string()))
            }
            Err(e) => return Err(e),
        };
        Ok(response.into_page())
    }

    async fn clear_scroll(&self, scroll_id: &str) -> BackendResult<()> {
        let body = json!({ "scroll_id": [scroll_id] });
        match self
            .send("clear scroll", self.request(Method::DELETE, "_search/scroll").json(&body))
            .await
        {
            Ok(_) | Err(BackendError::Status { status: 404, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    async fn count_documents(&self, index: &str) -> BackendResult<u64> {
        let response: CountResponse = self
            .send("count", self.request(Method::GET, &format!("{}/_count", index)))
            .await
            .map_err(|e| not_found_as(e, index))?
            .json()
            .await?;
        Ok(response.count)
    }

    async fn refresh(&self, index: &str) -> BackendResult<()> {
        self.send("refresh", self.request(Method::POST, &format!("{}/_refresh", index)))
            .await?;
        Ok(())
    }

    async fn optimize(&self, index: &str, max_num_segments: u32) -> BackendResult<()> {
        let request = self
            .request(Method::POST, &format!("{}/_forcemerge", index))
            .query(&[("max_num_segments", max_num_segments)]);
        self.send("force merge", request).await?;
        Ok(())
    }

    async fn shard_status(&self, index: &str) -> BackendResult<Vec<ShardCopyStatus>> {
        let request = self
            .request(Method::GET, &format!("_cat/shards/{}", index))
            .query(&[("format", "json"), ("h", "shard,prirep,state")]);
        let rows: Vec<CatShard> = self
            .send("cat shards", request)
            .await
            .map_err(|e| not_found_as(e, index))?
            .json()
            .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ShardCopyStatus {
                    shard: row.shard.parse().map_err(|_| {
                        BackendError::Decode(format!("invalid shard number {:?}", row.shard))
                    })?,
                    primary: row.prirep == "p",
                    state: row.state,
                })
            })
            .collect()
    }
}
