//! Process-local search backend
//!
//! Mirrors the engine behaviours the convergence logic depends on: settings
//! come back as strings, analysis settings can only change on a closed
//! index, writes to a closed index fail, create-only writes conflict on
//! existing ids, scroll cursors expire, alias updates are all-or-nothing.
//! A handful of fault switches let tests provoke the failure paths.

use super::{
    AliasAction, BackendError, BackendResult, BulkSummary, CreateIndexRequest, Document,
    IndexStatus, ScrollPage, ScrollRequest, SearchBackend, ShardCopyStatus,
};
use crate::drift::{ConfigTree, ConfigValue, FlatSettings, Scalar};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
struct IndexState {
    open: bool,
    /// Relative to `index.`, every scalar stored as a string
    settings: ConfigTree,
    mapping: ConfigTree,
    documents: BTreeMap<String, Value>,
    optimized_to: Option<u32>,
}

impl IndexState {
    fn new(settings: &ConfigTree) -> Self {
        Self {
            open: true,
            settings: stringify(settings),
            mapping: ConfigTree::new(),
            documents: BTreeMap::new(),
            optimized_to: None,
        }
    }

    fn setting_u32(&self, key: &str) -> u32 {
        match self.settings.get(key).and_then(ConfigValue::as_scalar) {
            Some(Scalar::Str(s)) => s.parse().unwrap_or(0),
            Some(Scalar::Int(i)) => u32::try_from(*i).unwrap_or(0),
            _ => 0,
        }
    }
}

#[derive(Debug, Default)]
struct Cluster {
    indices: BTreeMap<String, IndexState>,
    /// alias → holders
    aliases: BTreeMap<String, BTreeSet<String>>,
}

impl Cluster {
    /// Physical indexes addressed by an index or alias name
    fn resolve(&self, name: &str) -> BackendResult<Vec<String>> {
        if self.indices.contains_key(name) {
            return Ok(vec![name.to_string()]);
        }
        match self.aliases.get(name) {
            Some(holders) if !holders.is_empty() => Ok(holders.iter().cloned().collect()),
            _ => Err(BackendError::NotFound(name.to_string())),
        }
    }

    fn resolve_one_mut(&mut self, name: &str) -> BackendResult<(String, &mut IndexState)> {
        let resolved = self.resolve(name)?;
        let [index] = resolved.as_slice() else {
            return Err(rejected(
                "resolve index",
                format!("alias [{}] has more than one index associated with it", name),
            ));
        };
        let index = index.clone();
        let state = self
            .indices
            .get_mut(&index)
            .ok_or_else(|| BackendError::NotFound(index.clone()))?;
        Ok((index, state))
    }

    fn index(&self, name: &str) -> BackendResult<&IndexState> {
        self.indices
            .get(name)
            .ok_or_else(|| BackendError::NotFound(name.to_string()))
    }

    fn index_mut(&mut self, name: &str) -> BackendResult<&mut IndexState> {
        self.indices
            .get_mut(name)
            .ok_or_else(|| BackendError::NotFound(name.to_string()))
    }
}

struct ScrollCursor {
    remaining: VecDeque<Document>,
    batch_size: usize,
    total: u64,
    expires_at: Instant,
}

impl ScrollCursor {
    fn next_batch(&mut self) -> Vec<Document> {
        let take = self.batch_size.min(self.remaining.len());
        self.remaining.drain(..take).collect()
    }
}

#[derive(Debug, Default)]
struct Faults {
    mapping_rejection: Option<String>,
    expire_scrolls: bool,
    drop_bulk_documents: usize,
    unstarted_replica_polls: u32,
    failing_deletes: HashSet<String>,
}

/// In-memory search cluster
pub struct InMemoryBackend {
    cluster: RwLock<Cluster>,
    scrolls: DashMap<String, ScrollCursor>,
    next_scroll: AtomicU64,
    mutations: AtomicU64,
    faults: Mutex<Faults>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            cluster: RwLock::new(Cluster::default()),
            scrolls: DashMap::new(),
            next_scroll: AtomicU64::new(1),
            mutations: AtomicU64::new(0),
            faults: Mutex::new(Faults::default()),
        }
    }

    fn mutated(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of state-changing calls served so far
    pub fn mutation_count(&self) -> u64 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Create an index directly, bypassing the mutation counter
    pub fn seed_index(
        &self,
        name: &str,
        shards: u32,
        replicas: u32,
        analysis: ConfigTree,
        mapping: ConfigTree,
    ) {
        let request = CreateIndexRequest {
            shards,
            replicas,
            analysis,
            extra_settings: ConfigTree::new(),
        };
        let mut state = IndexState::new(&request.settings());
        state.mapping = mapping;
        self.cluster.write().indices.insert(name.to_string(), state);
    }

    pub fn seed_documents(&self, index: &str, documents: impl IntoIterator<Item = Document>) {
        let mut cluster = self.cluster.write();
        if let Some(state) = cluster.indices.get_mut(index) {
            for doc in documents {
                state.documents.insert(doc.id, doc.source);
            }
        }
    }

    pub fn seed_alias(&self, alias: &str, index: &str) {
        self.cluster
            .write()
            .aliases
            .entry(alias.to_string())
            .or_default()
            .insert(index.to_string());
    }

    pub fn seed_closed(&self, index: &str) {
        if let Some(state) = self.cluster.write().indices.get_mut(index) {
            state.open = false;
        }
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.cluster.read().indices.contains_key(index)
    }

    pub fn is_open(&self, index: &str) -> Option<bool> {
        self.cluster.read().indices.get(index).map(|state| state.open)
    }

    pub fn document_ids(&self, index: &str) -> Vec<String> {
        self.cluster
            .read()
            .indices
            .get(index)
            .map(|state| state.documents.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Segment target of the last optimize call on `index`
    pub fn optimized_to(&self, index: &str) -> Option<u32> {
        self.cluster
            .read()
            .indices
            .get(index)
            .and_then(|state| state.optimized_to)
    }

    /// Refuse every mapping update with `reason`
    pub fn reject_mapping_updates(&self, reason: impl Into<String>) {
        self.faults.lock().mapping_rejection = Some(reason.into());
    }

    /// Treat every open scroll cursor as expired
    pub fn expire_scrolls(&self) {
        self.faults.lock().expire_scrolls = true;
    }

    /// Acknowledge but discard the next `count` bulk documents
    pub fn drop_bulk_documents(&self, count: usize) {
        self.faults.lock().drop_bulk_documents = count;
    }

    /// Report replica copies as initializing for the next `polls` shard status calls
    pub fn delay_replica_start(&self, polls: u32) {
        self.faults.lock().unstarted_replica_polls = polls;
    }

    /// Fail any attempt to delete `index`
    pub fn fail_deletes_of(&self, index: &str) {
        self.faults.lock().failing_deletes.insert(index.to_string());
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn rejected(operation: &str, reason: String) -> BackendError {
    BackendError::Status {
        operation: operation.to_string(),
        status: 400,
        body: reason,
    }
}

/// Settings echo back as strings, as the engine does
fn stringify(tree: &ConfigTree) -> ConfigTree {
    let mut out = ConfigTree::new();
    for (key, value) in tree.iter() {
        out.insert(key.clone(), stringify_value(value));
    }
    out
}

fn stringify_value(value: &ConfigValue) -> ConfigValue {
    match value {
        ConfigValue::Scalar(Scalar::Null) => value.clone(),
        ConfigValue::Scalar(scalar) => ConfigValue::Scalar(Scalar::Str(scalar.to_string())),
        ConfigValue::List(items) => ConfigValue::List(items.iter().map(stringify_value).collect()),
        ConfigValue::Tree(tree) => ConfigValue::Tree(stringify(tree)),
    }
}

/// First `type` change between the live and the requested mapping
fn mapping_conflict(live: &ConfigTree, requested: &ConfigTree, path: &str) -> Option<String> {
    for (key, value) in requested.iter() {
        let Some(current) = live.get(key) else {
            continue;
        };
        let here = if path.is_empty() {
            key.clone()
        } else {
            format!("{}.{}", path, key)
        };
        match (current, value) {
            (ConfigValue::Tree(a), ConfigValue::Tree(b)) => {
                if let Some(conflict) = mapping_conflict(a, b, &here) {
                    return Some(conflict);
                }
            }
            (current, value) if key == "type" && !current.loosely_eq(value) => {
                return Some(format!(
                    "mapper [{}] cannot be changed from type [{}] to [{}]",
                    path, current, value
                ));
            }
            _ => {}
        }
    }
    None
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    async fn index_exists(&self, index: &str) -> BackendResult<bool> {
        Ok(self.cluster.read().indices.contains_key(index))
    }

    async fn index_status(&self, index: &str) -> BackendResult<IndexStatus> {
        Ok(match self.cluster.read().indices.get(index) {
            None => IndexStatus::Missing,
            Some(state) if state.open => IndexStatus::Open,
            Some(_) => IndexStatus::Closed,
        })
    }

    async fn list_indices(&self) -> BackendResult<Vec<String>> {
        Ok(self.cluster.read().indices.keys().cloned().collect())
    }

    async fn create_index(&self, index: &str, request: &CreateIndexRequest) -> BackendResult<()> {
        let mut cluster = self.cluster.write();
        if cluster.indices.contains_key(index) || cluster.aliases.contains_key(index) {
            return Err(rejected(
                "create index",
                format!("resource_already_exists_exception: index [{}] already exists", index),
            ));
        }
        cluster
            .indices
            .insert(index.to_string(), IndexState::new(&request.settings()));
        self.mutated();
        Ok(())
    }

    async fn delete_index(&self, index: &str) -> BackendResult<()> {
        if self.faults.lock().failing_deletes.contains(index) {
            return Err(BackendError::Status {
                operation: "delete index".to_string(),
                status: 503,
                body: format!("cannot delete [{}] right now", index),
            });
        }
        let mut cluster = self.cluster.write();
        cluster
            .indices
            .remove(index)
            .ok_or_else(|| BackendError::NotFound(index.to_string()))?;
        for holders in cluster.aliases.values_mut() {
            holders.remove(index);
        }
        cluster.aliases.retain(|_, holders| !holders.is_empty());
        self.mutated();
        Ok(())
    }

    async fn open_index(&self, index: &str) -> BackendResult<()> {
        self.cluster.write().index_mut(index)?.open = true;
        self.mutated();
        Ok(())
    }

    async fn close_index(&self, index: &str) -> BackendResult<()> {
        self.cluster.write().index_mut(index)?.open = false;
        self.mutated();
        Ok(())
    }

    async fn get_settings(&self, index: &str) -> BackendResult<FlatSettings> {
        let mut cluster = self.cluster.write();
        let (_, state) = cluster.resolve_one_mut(index)?;
        let nested = ConfigTree::new().with("index", state.settings.clone());
        Ok(FlatSettings::from_nested(&nested))
    }

    async fn set_settings(&self, index: &str, settings: &ConfigTree) -> BackendResult<()> {
        let mut cluster = self.cluster.write();
        let (name, state) = cluster.resolve_one_mut(index)?;
        if settings.contains_key("number_of_shards") {
            return Err(rejected(
                "update settings",
                format!("final index setting [index.number_of_shards] of [{}] cannot be updated", name),
            ));
        }
        if state.open && settings.contains_key("analysis") {
            return Err(rejected(
                "update settings",
                format!("Can't update non dynamic settings [index.analysis] for open indices [{}]", name),
            ));
        }
        state.settings.merge(&stringify(settings));
        self.mutated();
        Ok(())
    }

    async fn get_mapping(&self, index: &str) -> BackendResult<ConfigTree> {
        let mut cluster = self.cluster.write();
        let (_, state) = cluster.resolve_one_mut(index)?;
        Ok(state.mapping.clone())
    }

    async fn set_mapping(&self, index: &str, mapping: &ConfigTree) -> BackendResult<()> {
        if let Some(reason) = self.faults.lock().mapping_rejection.clone() {
            return Err(rejected("put mapping", reason));
        }
        let mut cluster = self.cluster.write();
        let (_, state) = cluster.resolve_one_mut(index)?;
        if let Some(conflict) = mapping_conflict(&state.mapping, mapping, "") {
            return Err(rejected("put mapping", format!("illegal_argument_exception: {}", conflict)));
        }
        state.mapping.merge(mapping);
        self.mutated();
        Ok(())
    }

    async fn indices_with_alias(&self, alias: &str) -> BackendResult<Vec<String>> {
        Ok(self
            .cluster
            .read()
            .aliases
            .get(alias)
            .map(|holders| holders.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn update_aliases(&self, actions: &[AliasAction]) -> BackendResult<()> {
        if actions.is_empty() {
            return Ok(());
        }
        let mut cluster = self.cluster.write();

        // Validate everything before applying anything
        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    cluster.index(index)?;
                    if cluster.indices.contains_key(alias) {
                        return Err(rejected(
                            "update aliases",
                            format!("invalid_alias_name_exception: an index exists with the same name as the alias [{}]", alias),
                        ));
                    }
                }
                AliasAction::Remove { index, alias } => {
                    cluster.index(index)?;
                    let held = cluster
                        .aliases
                        .get(alias)
                        .is_some_and(|holders| holders.contains(index));
                    if !held {
                        return Err(BackendError::NotFound(format!("aliases [{}] missing on [{}]", alias, index)));
                    }
                }
            }
        }

        for action in actions {
            match action {
                AliasAction::Add { index, alias } => {
                    cluster.aliases.entry(alias.clone()).or_default().insert(index.clone());
                }
                AliasAction::Remove { index, alias } => {
                    if let Some(holders) = cluster.aliases.get_mut(alias) {
                        holders.remove(index);
                    }
                }
            }
        }
        cluster.aliases.retain(|_, holders| !holders.is_empty());
        self.mutated();
        Ok(())
    }

    async fn bulk_create(&self, index: &str, documents: &[Document]) -> BackendResult<BulkSummary> {
        let started = Instant::now();
        let mut cluster = self.cluster.write();
        let (name, state) = cluster.resolve_one_mut(index)?;
        if !state.open {
            return Err(BackendError::IndexClosed(name));
        }

        let mut to_drop = std::mem::take(&mut self.faults.lock().drop_bulk_documents);
        let mut conflict = None;
        let mut written = 0;
        for doc in documents {
            if state.documents.contains_key(&doc.id) {
                conflict.get_or_insert_with(|| doc.id.clone());
                continue;
            }
            if to_drop > 0 {
                to_drop -= 1;
            } else {
                state.documents.insert(doc.id.clone(), doc.source.clone());
            }
            written += 1;
        }
        self.faults.lock().drop_bulk_documents = to_drop;
        self.mutated();

        if let Some(id) = conflict {
            return Err(BackendError::DocumentConflict { index: name, id });
        }
        Ok(BulkSummary {
            written,
            took_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn open_scroll(&self, index: &str, request: &ScrollRequest) -> BackendResult<ScrollPage> {
        let documents: VecDeque<Document> = {
            let cluster = self.cluster.read();
            let mut documents = Vec::new();
            for name in cluster.resolve(index)? {
                let state = cluster.index(&name)?;
                if !state.open {
                    return Err(BackendError::IndexClosed(name));
                }
                documents.extend(
                    state
                        .documents
                        .iter()
                        .filter(|(id, _)| request.partition.map_or(true, |p| p.contains(id)))
                        .map(|(id, source)| Document::new(id.clone(), source.clone())),
                );
            }
            documents.into()
        };

        let scroll_id = format!("scroll-{}", self.next_scroll.fetch_add(1, Ordering::SeqCst));
        let mut cursor = ScrollCursor {
            total: documents.len() as u64,
            remaining: documents,
            batch_size: request.batch_size.max(1),
            expires_at: Instant::now() + request.window,
        };
        let first = cursor.next_batch();
        let total = cursor.total;
        self.scrolls.insert(scroll_id.clone(), cursor);

        Ok(ScrollPage {
            scroll_id: Some(scroll_id),
            total,
            documents: first,
        })
    }

    async fn fetch_next(&self, scroll_id: &str, window: Duration) -> BackendResult<ScrollPage> {
        let expired = || BackendError::ScrollExpired(scroll_id.to_string());
        if self.faults.lock().expire_scrolls {
            self.scrolls.remove(scroll_id);
            return Err(expired());
        }

        let mut cursor = self.scrolls.get_mut(scroll_id).ok_or_else(expired)?;
        let now = Instant::now();
        if now > cursor.expires_at {
            drop(cursor);
            self.scrolls.remove(scroll_id);
            return Err(expired());
        }
        cursor.expires_at = now + window;

        Ok(ScrollPage {
            scroll_id: Some(scroll_id.to_string()),
            total: cursor.total,
            documents: cursor.next_batch(),
        })
    }

    async fn clear_scroll(&self, scroll_id: &str) -> BackendResult<()> {
        self.scrolls.remove(scroll_id);
        Ok(())
    }

    async fn count_documents(&self, index: &str) -> BackendResult<u64> {
        let cluster = self.cluster.read();
        let mut count = 0;
        for name in cluster.resolve(index)? {
            let state = cluster.index(&name)?;
            if !state.open {
                return Err(BackendError::IndexClosed(name));
            }
            count += state.documents.len() as u64;
        }
        Ok(count)
    }

    async fn refresh(&self, index: &str) -> BackendResult<()> {
        self.cluster.read().resolve(index)?;
        Ok(())
    }

    async fn optimize(&self, index: &str, max_num_segments: u32) -> BackendResult<()> {
        let mut cluster = self.cluster.write();
        let (_, state) = cluster.resolve_one_mut(index)?;
        state.optimized_to = Some(max_num_segments);
        Ok(())
    }

    async fn shard_status(&self, index: &str) -> BackendResult<Vec<ShardCopyStatus>> {
        let (shards, replicas) = {
            let cluster = self.cluster.read();
            let state = cluster.index(index)?;
            (
                state.setting_u32("number_of_shards"),
                state.setting_u32("number_of_replicas"),
            )
        };

        let replica_state = {
            let mut faults = self.faults.lock();
            if faults.unstarted_replica_polls > 0 {
                faults.unstarted_replica_polls -= 1;
                "INITIALIZING"
            } else {
                "STARTED"
            }
        };

        let mut copies = Vec::new();
        for shard in 0..shards {
            copies.push(ShardCopyStatus {
                shard,
                primary: true,
                state: "STARTED".to_string(),
            });
            for _ in 0..replicas {
                copies.push(ShardCopyStatus {
                    shard,
                    primary: false,
                    state: replica_state.to_string(),
                });
            }
        }
        Ok(copies)
    }
}
