//! GraphStore: load, mutate and persist the graph document
//!
//! Every mutating operation runs load -> mutate -> truncate -> save while
//! holding the store's writer lock, so concurrent callers in one process
//! never overwrite each other's updates. Reads take no lock: documents are
//! replaced by atomic rename and a reader always sees a complete one.
//! Writers in other processes sharing the same document are not coordinated.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::sync::{Mutex, RwLock};

use crate::config::StorageConfig;
use crate::error::GraphError;
use crate::graph::{self, NodeAttrs};
use crate::models::Graph;

// ============================================================================
// GraphBackend trait
// ============================================================================

/// Blob storage holding graph documents by key.
#[async_trait]
pub trait GraphBackend: Send + Sync {
    /// Returns `None` when no document exists under `key`.
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, GraphError>;

    /// Replaces the whole document stored under `key`.
    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), GraphError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Stores each key as a file under a root directory.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, GraphError> {
        let plain = !key.is_empty()
            && key != "."
            && key != ".."
            && !key.contains(['/', '\\']);
        if !plain {
            return Err(GraphError::InvalidInput(format!(
                "storage key '{}' must be a plain file name",
                key
            )));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl GraphBackend for FileBackend {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, GraphError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(GraphError::Persistence(e)),
        }
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), GraphError> {
        let path = self.path_for(key)?;
        let tmp = self.root.join(format!(".{}.tmp", key));
        tokio::fs::create_dir_all(&self.root).await?;

        let written = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(bytes).await?;
            file.flush().await?;
            file.sync_all().await
        }
        .await;

        if let Err(e) = written {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(GraphError::Persistence(e));
        }

        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(GraphError::Persistence(e));
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "file"
    }
}

/// In-process backend; contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    docs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl GraphBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, GraphError> {
        Ok(self.docs.lock().await.get(key).cloned())
    }

    async fn write(&self, key: &str, bytes: &[u8]) -> Result<(), GraphError> {
        self.docs.lock().await.insert(key.to_string(), bytes.to_vec());
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}

// ============================================================================
// Operation results
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct AddNodeOutcome {
    pub created: bool,
    pub node_id: u64,
    pub graph: Graph,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExpandOutcome {
    pub node_id: u64,
    pub graph: Graph,
}

/// Document counts reported by health checks.
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub key: String,
    pub backend: String,
    pub nodes: usize,
    pub links: usize,
    pub max_nodes: u64,
    pub last_saved: Option<DateTime<Utc>>,
}

// ============================================================================
// GraphStore
// ============================================================================

pub struct GraphStore {
    backend: Arc<dyn GraphBackend>,
    key: String,
    max_nodes: u64,
    writer: Mutex<()>,
    last_saved: RwLock<Option<DateTime<Utc>>>,
}

impl GraphStore {
    pub fn new(backend: Arc<dyn GraphBackend>, key: impl Into<String>, max_nodes: u64) -> Self {
        Self {
            backend,
            key: key.into(),
            max_nodes,
            writer: Mutex::new(()),
            last_saved: RwLock::new(None),
        }
    }

    /// File-backed store rooted at the configured storage directory.
    pub fn from_config(config: &StorageConfig) -> Result<Self, GraphError> {
        let root = config.resolved_dir()?;
        let backend: Arc<dyn GraphBackend> = Arc::new(FileBackend::new(root));
        Ok(Self::new(backend, config.key.clone(), config.max_nodes))
    }

    /// Store over a fresh [`MemoryBackend`].
    pub fn in_memory(max_nodes: u64) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), "graph.json", max_nodes)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn max_nodes(&self) -> u64 {
        self.max_nodes
    }

    pub async fn last_saved(&self) -> Option<DateTime<Utc>> {
        *self.last_saved.read().await
    }

    /// Read and parse the stored document. `Ok(None)` when it does not exist.
    pub async fn try_load(&self) -> Result<Option<Graph>, GraphError> {
        let bytes = match self.backend.read(&self.key).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };
        let graph: Graph = serde_json::from_slice(&bytes)?;
        graph::validate(&graph)?;
        Ok(Some(graph))
    }

    /// Best-effort load: a missing or unreadable document yields the empty graph.
    pub async fn load(&self) -> Graph {
        match self.try_load().await {
            Ok(Some(graph)) => graph,
            Ok(None) => Graph::new(),
            Err(e) => {
                tracing::warn!(
                    key = %self.key,
                    error = %e,
                    "Graph document unreadable, using empty graph"
                );
                Graph::new()
            }
        }
    }

    /// Truncate, validate and atomically write `graph`. Returns what was persisted.
    pub async fn save(&self, graph: Graph) -> Result<Graph, GraphError> {
        let _guard = self.writer.lock().await;
        self.persist(graph).await
    }

    async fn persist(&self, mut graph: Graph) -> Result<Graph, GraphError> {
        let dropped = graph::truncate(&mut graph, self.max_nodes);
        if dropped > 0 {
            tracing::info!(
                dropped,
                max_nodes = self.max_nodes,
                "Truncated graph before save"
            );
        }
        graph::validate(&graph)?;

        let bytes = serde_json::to_vec_pretty(&graph)?;
        self.backend.write(&self.key, &bytes).await.map_err(|e| {
            tracing::error!(key = %self.key, backend = self.backend.name(), error = %e, "Failed to save graph");
            e
        })?;
        *self.last_saved.write().await = Some(Utc::now());

        tracing::debug!(
            key = %self.key,
            nodes = graph.nodes.len(),
            links = graph.links.len(),
            "Saved graph"
        );
        Ok(graph)
    }

    /// Run `mutate` over the current document and persist the result, all under
    /// the writer lock. A document that exists but cannot be parsed is never
    /// overwritten: the parse error is returned instead.
    pub async fn update<T, F>(&self, mutate: F) -> Result<(T, Graph), GraphError>
    where
        F: FnOnce(&mut Graph) -> Result<T, GraphError>,
    {
        let _guard = self.writer.lock().await;
        let mut graph = self.try_load().await?.unwrap_or_default();
        let value = mutate(&mut graph)?;
        let graph = self.persist(graph).await?;
        Ok((value, graph))
    }

    /// Read-only snapshot of the current document.
    pub async fn get_graph(&self) -> Graph {
        self.load().await
    }

    /// Add a topic node unless one with the same name already exists.
    pub async fn add_topic_node(&self, name: &str) -> Result<AddNodeOutcome, GraphError> {
        let attrs = NodeAttrs::topic(format!("Topic: {}", name.trim()));
        let ((node_id, created), graph) = self
            .update(|graph| graph::add_or_get_node(graph, name, attrs))
            .await?;

        tracing::info!(topic = name.trim(), node_id, created, "Add topic node");
        Ok(AddNodeOutcome {
            created,
            node_id,
            graph,
        })
    }

    /// Attach `related_titles` to the topic `name`, replacing its description.
    pub async fn expand_node<S: AsRef<str>>(
        &self,
        name: &str,
        related_titles: &[S],
        description: &str,
    ) -> Result<ExpandOutcome, GraphError> {
        let (report, graph) = self
            .update(|graph| graph::expand_topic(graph, name, related_titles, description))
            .await?;

        tracing::info!(
            topic = name.trim(),
            node_id = report.central_id,
            nodes_added = report.nodes_added,
            links_added = report.links_added,
            "Expanded topic node"
        );
        Ok(ExpandOutcome {
            node_id: report.central_id,
            graph,
        })
    }

    /// Merge a central title and its related titles, then persist.
    pub async fn merge_links<S: AsRef<str>>(
        &self,
        central_title: &str,
        related_titles: &[S],
    ) -> Result<Graph, GraphError> {
        let (report, graph) = self
            .update(|graph| graph::merge_central_and_related(graph, central_title, related_titles))
            .await?;

        tracing::info!(
            central = central_title.trim(),
            central_id = report.central_id,
            nodes_added = report.nodes_added,
            links_added = report.links_added,
            "Merged links into graph"
        );
        Ok(graph)
    }

    /// Counts for health reporting; fails when the document cannot be read.
    pub async fn stats(&self) -> Result<StoreStats, GraphError> {
        let graph = self.try_load().await?.unwrap_or_default();
        Ok(StoreStats {
            key: self.key.clone(),
            backend: self.backend.name().to_string(),
            nodes: graph.nodes.len(),
            links: graph.links.len(),
            max_nodes: self.max_nodes,
            last_saved: self.last_saved().await,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
