//! Offline corpus ingestion. Walks the corpus directory, extracts and chunks
//! every supported document, embeds the chunks, and writes the index the
//! server loads at startup.

use tracing_subscriber::EnvFilter;

use coursemate::config::Config;
use coursemate::embed::HttpEmbedder;
use coursemate::ingest::ingest_corpus;
use coursemate::store::MemoryStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env();
    config.validate()?;

    if !config.corpus_dir.is_dir() {
        anyhow::bail!(
            "corpus directory {} does not exist (set COURSEMATE_CORPUS_DIR)",
            config.corpus_dir.display()
        );
    }

    tracing::info!("Corpus: {}", config.corpus_dir.display());
    tracing::info!("Index: {}", config.index_path().display());
    tracing::info!(
        "Embedding model: {} via {}",
        config.llm.embedding_model,
        config.llm.provider
    );

    let http_client = reqwest::Client::builder()
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;
    let embedder = HttpEmbedder::new(http_client, config.llm.clone());
    let store = MemoryStore::open_or_create(&config.index_path())?;

    let summary = ingest_corpus(&config.corpus_dir, &config.retrieval, &embedder, &store).await?;

    tracing::info!(
        "Done: {} files indexed ({} chunks), {} files skipped",
        summary.files_indexed,
        summary.chunks_indexed,
        summary.files_skipped
    );
    Ok(())
}
