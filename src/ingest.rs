//! Corpus ingestion: walk a directory, extract text, chunk, embed, upsert.

use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::chunker::split_text;
use crate::config::RetrievalConfig;
use crate::embed::Embedder;
use crate::error::Result;
use crate::extract::{is_supported, read_document};
use crate::models::{ChunkMetadata, IndexedPassage};
use crate::store::DocumentStore;

#[derive(Debug, Default)]
pub struct IngestSummary {
    pub files_indexed: usize,
    pub files_skipped: usize,
    pub chunks_indexed: usize,
}

/// Chunk id: first 16 hex chars of sha256(path) plus the sequence index.
/// Deterministic, so re-ingesting a file overwrites its chunks in place.
pub fn chunk_id(path: &str, index: usize) -> String {
    let digest = Sha256::digest(path.as_bytes());
    let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
    format!("{}-{index}", &hex[..16])
}

/// Ingest every supported file under `corpus_dir`.
///
/// Unreadable or malformed files are logged and skipped; embedding or store
/// failures abort the run, since continuing would leave the index partial
/// without saying so.
pub async fn ingest_corpus(
    corpus_dir: &Path,
    config: &RetrievalConfig,
    embedder: &dyn Embedder,
    store: &dyn DocumentStore,
) -> Result<IngestSummary> {
    let mut summary = IngestSummary::default();

    for entry in WalkDir::new(corpus_dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if !is_supported(path) {
            continue;
        }

        let text = match read_document(path) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file");
                summary.files_skipped += 1;
                continue;
            }
        };

        let chunks = split_text(&text, config.chunk_size, config.chunk_overlap);
        if chunks.is_empty() {
            tracing::debug!(path = %path.display(), "no text extracted, skipping");
            summary.files_skipped += 1;
            continue;
        }

        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let path_str = path.display().to_string();

        let embeddings = embedder.embed(&chunks).await?;

        let passages: Vec<IndexedPassage> = chunks
            .into_iter()
            .zip(embeddings)
            .enumerate()
            .map(|(i, (text, embedding))| IndexedPassage {
                id: chunk_id(&path_str, i),
                text,
                metadata: ChunkMetadata {
                    file: file_name.clone(),
                    path: path_str.clone(),
                    chunk: i,
                },
                embedding,
            })
            .collect();

        summary.chunks_indexed += passages.len();
        summary.files_indexed += 1;
        store.upsert(passages).await?;

        tracing::info!(path = %path_str, "indexed file");
    }

    Ok(summary)
}
