use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AssistantError, Result};
use crate::models::{ChunkMetadata, IndexedPassage};

/// A passage returned by a nearest-neighbor query, with its cosine score.
#[derive(Debug, Clone)]
pub struct StoreHit {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// Document store boundary: upsert and query by embedding. Implementations
/// own the passages; callers only see hits. The serving workload treats the
/// store as read-shared; ingestion is an offline single-writer batch.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert or replace passages by id.
    async fn upsert(&self, passages: Vec<IndexedPassage>) -> Result<()>;

    /// Nearest neighbors of `embedding` by cosine similarity, best first.
    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<StoreHit>>;

    async fn len(&self) -> usize;
}

/// In-memory store with JSON persistence, keyed by passage id so re-ingestion
/// overwrites rather than duplicates.
pub struct MemoryStore {
    passages: RwLock<HashMap<String, IndexedPassage>>,
    persist_path: Option<PathBuf>,
}

impl MemoryStore {
    /// Volatile store, used by tests and as a fake seam.
    pub fn new() -> Self {
        Self {
            passages: RwLock::new(HashMap::new()),
            persist_path: None,
        }
    }

    /// Store backed by a JSON file, loading any existing index.
    pub fn open_or_create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AssistantError::Retrieval(format!("create data dir: {e}")))?;
        }

        let passages = if path.exists() {
            let data = std::fs::read_to_string(path)
                .map_err(|e| AssistantError::Retrieval(format!("read index: {e}")))?;
            let list: Vec<IndexedPassage> = serde_json::from_str(&data).unwrap_or_default();
            list.into_iter().map(|p| (p.id.clone(), p)).collect()
        } else {
            HashMap::new()
        };

        Ok(Self {
            passages: RwLock::new(passages),
            persist_path: Some(path.to_path_buf()),
        })
    }

    /// Persist via temp file + rename so a crash never leaves a torn index.
    fn persist(&self) -> Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        let passages = self.passages.read();
        let list: Vec<&IndexedPassage> = passages.values().collect();
        let data = serde_json::to_string(&list)
            .map_err(|e| AssistantError::Retrieval(format!("serialize index: {e}")))?;
        let tmp_path = path.with_extension("json.tmp");
        std::fs::write(&tmp_path, &data)
            .map_err(|e| AssistantError::Retrieval(format!("write index: {e}")))?;
        std::fs::rename(&tmp_path, path)
            .map_err(|e| AssistantError::Retrieval(format!("rename index: {e}")))?;
        Ok(())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(&self, new_passages: Vec<IndexedPassage>) -> Result<()> {
        {
            let mut passages = self.passages.write();
            for p in new_passages {
                passages.insert(p.id.clone(), p);
            }
        }
        self.persist()
    }

    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<Vec<StoreHit>> {
        let passages = self.passages.read();

        let mut scored: Vec<(f32, &IndexedPassage)> = passages
            .values()
            .map(|p| (cosine_similarity(embedding, &p.embedding), p))
            .collect();

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n_results);

        Ok(scored
            .into_iter()
            .map(|(score, p)| StoreHit {
                id: p.id.clone(),
                text: p.text.clone(),
                metadata: p.metadata.clone(),
                score,
            })
            .collect())
    }

    async fn len(&self) -> usize {
        self.passages.read().len()
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;

    for i in 0..a.len() {
        dot += a[i] * b[i];
        norm_a += a[i] * a[i];
        norm_b += b[i] * b[i];
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom == 0.0 {
        0.0
    } else {
        dot / denom
    }
}
