use std::sync::Arc;

use crate::config::Config;
use crate::embed::{Embedder, HttpEmbedder};
use crate::llm::{build_client, GenerationClient};
use crate::retrieval::Retriever;
use crate::session::SessionMemory;
use crate::store::{DocumentStore, MemoryStore};

/// Shared application state. Every collaborator sits behind a trait object
/// so tests can swap in fakes without touching the routes.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub store: Arc<dyn DocumentStore>,
    pub embedder: Arc<dyn Embedder>,
    pub generator: Arc<dyn GenerationClient>,
    pub retriever: Arc<Retriever>,
    pub sessions: Arc<SessionMemory>,
    pub generation_semaphore: Arc<tokio::sync::Semaphore>,
    pub http_client: reqwest::Client,
}

impl AppState {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()?;

        let store: Arc<dyn DocumentStore> = Arc::new(MemoryStore::open_or_create(
            &config.index_path(),
        )?);
        let embedder: Arc<dyn Embedder> =
            Arc::new(HttpEmbedder::new(http_client.clone(), config.llm.clone()));
        let generator = build_client(http_client.clone(), config.llm.clone())?;

        Ok(Self::with_parts(config, store, embedder, generator, http_client))
    }

    /// Assemble state from explicit collaborators. Tests use this to inject
    /// fakes; `new` uses it with the real HTTP-backed implementations.
    pub fn with_parts(
        config: Config,
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        generator: Arc<dyn GenerationClient>,
        http_client: reqwest::Client,
    ) -> Self {
        let retriever = Arc::new(Retriever::new(
            store.clone(),
            embedder.clone(),
            config.retrieval.clone(),
        ));
        let sessions = Arc::new(SessionMemory::new(&config.session));
        let generation_semaphore = Arc::new(tokio::sync::Semaphore::new(
            config.generation_concurrency.max(1),
        ));

        Self {
            config,
            store,
            embedder,
            generator,
            retriever,
            sessions,
            generation_semaphore,
            http_client,
        }
    }
}
