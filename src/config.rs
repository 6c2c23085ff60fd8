use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Where the document index is persisted
    pub data_dir: PathBuf,
    /// Directory scanned by the ingest binary
    pub corpus_dir: PathBuf,
    /// Server bind address
    pub bind_addr: String,
    /// LLM provider configuration (chat + embeddings)
    pub llm: LlmConfig,
    /// Retrieval pipeline tuning
    pub retrieval: RetrievalConfig,
    /// Per-session conversation memory
    pub session: SessionConfig,
    /// Maximum concurrent generation calls (counting semaphore permits)
    pub generation_concurrency: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "ollama" or "openai"
    pub provider: String,
    /// Base URL for the LLM API
    pub base_url: String,
    /// Model name for chat completions
    pub chat_model: String,
    /// Model name for embeddings. Must be the same at ingest and query time;
    /// both binaries read it from this one struct.
    pub embedding_model: String,
    /// API key (only needed for hosted providers)
    pub api_key: Option<String>,
    /// Sampling temperature, 0..=2
    pub temperature: f32,
    /// Completion token cap, must be > 0
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Characters per chunk at ingest time
    pub chunk_size: usize,
    /// Overlap between hard-sliced windows; must be < chunk_size
    pub chunk_overlap: usize,
    /// How many candidates retrieve() returns
    pub top_k: usize,
    /// Neighbors requested from the store per query variant
    pub n_results: usize,
    /// Multiplier applied to the lexical re-rank score.
    /// Empirically chosen in the original system; kept configurable.
    pub lexical_weight: f32,
    /// Jaro-Winkler similarity above which two terms count as a fuzzy match
    pub fuzzy_threshold: f64,
    /// Trade retrieval breadth for latency
    pub fast_mode: bool,
    /// Context character budget enforced in fast mode (0 = no trim)
    pub max_context_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Turns retained per session (ring buffer)
    pub capacity: usize,
    /// Idle seconds before a session is purged
    pub idle_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            corpus_dir: PathBuf::from("./corpus"),
            bind_addr: "127.0.0.1:8000".to_string(),
            llm: LlmConfig::default(),
            retrieval: RetrievalConfig::default(),
            session: SessionConfig::default(),
            generation_concurrency: 1,
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            base_url: "http://localhost:11434".to_string(),
            chat_model: "mistral".to_string(),
            embedding_model: "nomic-embed-text".to_string(),
            api_key: None,
            temperature: 0.3,
            max_tokens: 800,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            chunk_size: 600,
            chunk_overlap: 120,
            top_k: 8,
            n_results: 8,
            lexical_weight: 0.6,
            fuzzy_threshold: 0.8,
            fast_mode: false,
            max_context_chars: 2400,
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            idle_timeout_secs: 3600,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(dir) = std::env::var("COURSEMATE_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(dir) = std::env::var("COURSEMATE_CORPUS_DIR") {
            config.corpus_dir = PathBuf::from(dir);
        }
        if let Ok(addr) = std::env::var("COURSEMATE_BIND_ADDR") {
            config.bind_addr = addr;
        }
        if let Ok(provider) = std::env::var("LLM_PROVIDER") {
            config.llm.provider = provider;
        }
        if let Ok(url) = std::env::var("LLM_BASE_URL") {
            config.llm.base_url = url;
        }
        if let Ok(model) = std::env::var("LLM_CHAT_MODEL") {
            config.llm.chat_model = model;
        }
        if let Ok(model) = std::env::var("LLM_EMBEDDING_MODEL") {
            config.llm.embedding_model = model;
        }
        if let Ok(key) = std::env::var("LLM_API_KEY") {
            config.llm.api_key = Some(key);
        }
        if let Ok(val) = std::env::var("LLM_TEMPERATURE") {
            if let Ok(v) = val.parse() {
                config.llm.temperature = v;
            }
        }
        if let Ok(val) = std::env::var("LLM_MAX_TOKENS") {
            if let Ok(v) = val.parse() {
                config.llm.max_tokens = v;
            }
        }
        if let Ok(val) = std::env::var("COURSEMATE_CHUNK_SIZE") {
            if let Ok(v) = val.parse() {
                config.retrieval.chunk_size = v;
            }
        }
        if let Ok(val) = std::env::var("COURSEMATE_CHUNK_OVERLAP") {
            if let Ok(v) = val.parse() {
                config.retrieval.chunk_overlap = v;
            }
        }
        if let Ok(val) = std::env::var("COURSEMATE_TOP_K") {
            if let Ok(v) = val.parse::<usize>() {
                config.retrieval.top_k = v;
                config.retrieval.n_results = v;
            }
        }
        if let Ok(val) = std::env::var("COURSEMATE_LEXICAL_WEIGHT") {
            if let Ok(v) = val.parse() {
                config.retrieval.lexical_weight = v;
            }
        }
        if let Ok(val) = std::env::var("COURSEMATE_FUZZY_THRESHOLD") {
            if let Ok(v) = val.parse() {
                config.retrieval.fuzzy_threshold = v;
            }
        }
        if let Ok(val) = std::env::var("COURSEMATE_FAST_MODE") {
            config.retrieval.fast_mode = val == "1" || val.eq_ignore_ascii_case("true");
        }
        if let Ok(val) = std::env::var("COURSEMATE_MAX_CONTEXT_CHARS") {
            if let Ok(v) = val.parse() {
                config.retrieval.max_context_chars = v;
            }
        }
        if let Ok(val) = std::env::var("COURSEMATE_SESSION_CAPACITY") {
            if let Ok(v) = val.parse() {
                config.session.capacity = v;
            }
        }
        if let Ok(val) = std::env::var("COURSEMATE_SESSION_IDLE_SECS") {
            if let Ok(v) = val.parse() {
                config.session.idle_timeout_secs = v;
            }
        }
        if let Ok(val) = std::env::var("COURSEMATE_GENERATION_CONCURRENCY") {
            if let Ok(v) = val.parse::<usize>() {
                config.generation_concurrency = v.max(1);
            }
        }

        config
    }

    pub fn index_path(&self) -> std::path::PathBuf {
        self.data_dir.join("index.json")
    }

    /// `overlap < chunk_size` is a precondition of the chunker; violating it
    /// would stall the hard-slice loop, so treat it as a configuration error.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.retrieval.chunk_overlap >= self.retrieval.chunk_size {
            anyhow::bail!(
                "COURSEMATE_CHUNK_OVERLAP ({}) must be smaller than COURSEMATE_CHUNK_SIZE ({})",
                self.retrieval.chunk_overlap,
                self.retrieval.chunk_size
            );
        }
        if self.llm.max_tokens == 0 {
            anyhow::bail!("LLM_MAX_TOKENS must be greater than zero");
        }
        if !(0.0..=2.0).contains(&self.llm.temperature) {
            anyhow::bail!("LLM_TEMPERATURE must be within 0..=2");
        }
        Ok(())
    }
}
