use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AssistantError;

/// A bounded, independently embeddable unit of document text.
///
/// The id is a deterministic hash of the source path plus the sequence index,
/// so re-ingesting the same file overwrites its chunks instead of duplicating
/// them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub source_file: String,
    pub sequence_index: usize,
}

/// Metadata stored alongside an indexed passage and echoed back on query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub file: String,
    pub path: String,
    pub chunk: usize,
}

/// A chunk plus its embedding, owned by the document store. Created at
/// ingest, replaced on re-ingest, never mutated in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedPassage {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

/// A passage returned by vector search, before or after re-ranking.
/// Ephemeral: created per query, discarded after the response.
#[derive(Debug, Clone, Serialize)]
pub struct RetrievalCandidate {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub vector_score: f32,
    pub lexical_score: f32,
    pub combined_score: f32,
}

/// A single chat turn (user or assistant).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// One turn held in session memory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionTurn {
    pub role: String,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// Assistant mode. Selection is a pure routing decision made before prompt
/// composition: `coach` and `facts` skip retrieval entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    #[default]
    Docs,
    Coach,
    Facts,
}

impl ChatMode {
    pub fn uses_retrieval(&self) -> bool {
        matches!(self, ChatMode::Docs)
    }
}

/// Parameters for one generation call. The constructor enforces the
/// invariants `max_tokens > 0` and `0 <= temperature <= 2`.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl GenerationRequest {
    pub fn new(
        prompt: String,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Self, AssistantError> {
        if max_tokens == 0 {
            return Err(AssistantError::Unknown(
                "max_tokens must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=2.0).contains(&temperature) {
            return Err(AssistantError::Unknown(format!(
                "temperature {temperature} outside 0..=2"
            )));
        }
        Ok(Self {
            prompt,
            temperature,
            max_tokens,
        })
    }
}

/// Chat request accepted by /chat and /chat_stream.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub mode: ChatMode,
    pub session_id: Option<String>,
}

/// A citation sent back with an answer, e.g. "① syllabus.pdf (chunk 3)".
pub type SourceCitation = String;

/// Non-streaming chat response.
#[derive(Debug, Clone, Serialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<SourceCitation>,
    pub intent: String,
    /// Set when generation failed but retrieval succeeded, so callers can
    /// still surface the citations (partial success).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
}
