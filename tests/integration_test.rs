//! Integration tests for the ingest → retrieve → compose → generate
//! pipeline, using fakes for the embedding and generation endpoints so no
//! model service is required.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use coursemate::config::RetrievalConfig;
use coursemate::embed::Embedder;
use coursemate::error::{AssistantError, Result};
use coursemate::ingest::ingest_corpus;
use coursemate::llm::{GenerationClient, TokenStream};
use coursemate::models::{ChatMode, GenerationRequest};
use coursemate::persona;
use coursemate::retrieval::Retriever;
use coursemate::session::SessionMemory;
use coursemate::store::{DocumentStore, MemoryStore};

/// Deterministic embedder: each dimension counts occurrences of one topic
/// word, so texts about the same topic land close in cosine space.
struct KeywordEmbedder;

const TOPICS: [&str; 4] = ["photosynthesis", "chlorophyll", "mitosis", "recursion"];

#[async_trait]
impl Embedder for KeywordEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                let lower = t.to_lowercase();
                let mut v: Vec<f32> = TOPICS
                    .iter()
                    .map(|topic| lower.matches(topic).count() as f32)
                    .collect();
                // Base component keeps zero-topic texts from being the zero vector
                v.push(1.0);
                v
            })
            .collect())
    }
}

/// Generator that fails a scripted number of times before answering.
struct FlakyGenerator {
    failures_left: Mutex<u32>,
    calls: Mutex<u32>,
}

impl FlakyGenerator {
    fn new(failures: u32) -> Self {
        Self {
            failures_left: Mutex::new(failures),
            calls: Mutex::new(0),
        }
    }
}

#[async_trait]
impl GenerationClient for FlakyGenerator {
    async fn complete(&self, request: GenerationRequest) -> Result<String> {
        *self.calls.lock() += 1;
        let mut left = self.failures_left.lock();
        if *left > 0 {
            *left -= 1;
            return Err(AssistantError::GenerationConnection {
                endpoint: "http://fake:11434".to_string(),
                attempts: 1,
            });
        }
        Ok(format!(
            "Grounded answer ① (prompt was {} chars)",
            request.prompt.len()
        ))
    }

    async fn complete_stream(&self, _request: GenerationRequest) -> Result<TokenStream> {
        Ok(Box::pin(futures_util::stream::iter(vec![
            Ok("Grounded ".to_string()),
            Ok("answer ①".to_string()),
        ])))
    }
}

fn write_corpus(dir: &Path) {
    std::fs::write(
        dir.join("biology.md"),
        "Photosynthesis converts light to energy. Photosynthesis takes place in \
         the chloroplasts of plant cells.\n\n\
         Chlorophyll absorbs red and blue light, reflecting green.",
    )
    .unwrap();
    std::fs::write(
        dir.join("cs.md"),
        "Recursion is a function calling itself with a smaller input until it \
         reaches a base case.",
    )
    .unwrap();
}

async fn indexed_store(dir: &Path) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    ingest_corpus(dir, &RetrievalConfig::default(), &KeywordEmbedder, store.as_ref())
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn retrieval_finds_the_right_document() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let store = indexed_store(dir.path()).await;

    let retriever = Retriever::new(store, Arc::new(KeywordEmbedder), RetrievalConfig::default());

    let candidates = retriever
        .retrieve("How does photosynthesis work?", 8)
        .await
        .unwrap();

    assert!(!candidates.is_empty());
    assert!(candidates[0].text.to_lowercase().contains("photosynthesis"));
    assert_eq!(candidates[0].metadata.file, "biology.md");

    // Ranked best-first, no duplicate ids
    for pair in candidates.windows(2) {
        assert!(pair[0].combined_score >= pair[1].combined_score);
    }
    let mut ids: Vec<&str> = candidates.iter().map(|c| c.id.as_str()).collect();
    ids.sort_unstable();
    ids.dedup();
    assert_eq!(ids.len(), candidates.len());
}

#[tokio::test]
async fn composed_prompt_cites_retrieved_material() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let store = indexed_store(dir.path()).await;

    let retriever = Retriever::new(store, Arc::new(KeywordEmbedder), RetrievalConfig::default());
    let candidates = retriever
        .retrieve("explain photosynthesis", 8)
        .await
        .unwrap();

    let composed =
        persona::compose("explain photosynthesis", &candidates, None, ChatMode::Docs, false)
            .unwrap();

    assert!(composed.prompt.contains('①'));
    assert!(composed.prompt.contains("Photosynthesis converts light to energy"));
    assert!(composed.prompt.contains("explain photosynthesis"));
    assert!(composed.sources[0].contains("biology.md"));
    assert_eq!(composed.intent, persona::Intent::ConceptClarification);
}

#[tokio::test]
async fn transient_generation_failure_then_success() {
    let generator = FlakyGenerator::new(1);
    let request = GenerationRequest::new("prompt".to_string(), 0.3, 100).unwrap();

    let first = generator.complete(request.clone()).await;
    assert!(matches!(
        first.unwrap_err(),
        AssistantError::GenerationConnection { .. }
    ));

    let second = generator.complete(request).await.unwrap();
    assert!(second.contains("Grounded answer"));
    assert_eq!(*generator.calls.lock(), 2);
}

#[tokio::test]
async fn streaming_generator_yields_deltas_in_order() {
    use futures_util::StreamExt;

    let generator = FlakyGenerator::new(0);
    let request = GenerationRequest::new("prompt".to_string(), 0.3, 100).unwrap();

    let stream = generator.complete_stream(request).await.unwrap();
    let deltas: Vec<String> = stream.map(|r| r.unwrap()).collect().await;
    assert_eq!(deltas.join(""), "Grounded answer ①");
}

#[tokio::test]
async fn session_context_threads_into_the_prompt() {
    let dir = tempfile::tempdir().unwrap();
    write_corpus(dir.path());
    let store = indexed_store(dir.path()).await;

    let sessions = SessionMemory::new(&coursemate::config::SessionConfig {
        capacity: 10,
        idle_timeout_secs: 3600,
    });
    sessions.add_turn("s1", "user", "explain photosynthesis");
    sessions.add_turn("s1", "assistant", "It converts light to energy ①");

    let retriever = Retriever::new(store, Arc::new(KeywordEmbedder), RetrievalConfig::default());
    let candidates = retriever
        .retrieve("where does it take place?", 8)
        .await
        .unwrap();

    let context = sessions.recent_context("s1", 6).unwrap();
    let composed = persona::compose(
        "where does it take place?",
        &candidates,
        Some(&context),
        ChatMode::Docs,
        false,
    )
    .unwrap();

    assert!(composed.prompt.contains("Recent conversation:"));
    assert!(composed.prompt.contains("Student: explain photosynthesis"));
}

#[tokio::test]
async fn greeting_short_circuits_before_retrieval() {
    assert!(persona::is_greeting_or_chitchat("hi"));
    assert!(persona::is_greeting_or_chitchat("good morning!"));
    assert!(!persona::is_greeting_or_chitchat("what are the learning outcomes"));
    assert!(!persona::greeting_reply().is_empty());
}

#[tokio::test]
async fn reingesting_a_changed_file_replaces_its_chunks() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("notes.md"), "Photosynthesis, first draft.").unwrap();

    let store = Arc::new(MemoryStore::new());
    let config = RetrievalConfig::default();
    ingest_corpus(dir.path(), &config, &KeywordEmbedder, store.as_ref())
        .await
        .unwrap();
    let before = store.len().await;

    std::fs::write(dir.path().join("notes.md"), "Photosynthesis, second draft.").unwrap();
    ingest_corpus(dir.path(), &config, &KeywordEmbedder, store.as_ref())
        .await
        .unwrap();

    assert_eq!(store.len().await, before);
}
