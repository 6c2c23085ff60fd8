//! # coursemate
//!
//! A retrieval-augmented course assistant: ingest course documents into a
//! vector index, answer student questions grounded in that material, and
//! cite the passages the answer came from.
//!
//! ## Architecture
//!
//! The answer pipeline is a straight line with two short-circuits:
//!
//! ```text
//!   ┌──────────────┐
//!   │ Student msg   │
//!   └──────┬───────┘
//!          │ greeting? ──► canned reply (no retrieval, no model call)
//!          │ coach/facts mode? ──► persona prompt (no retrieval)
//!          ▼
//!   ┌──────────────────────┐
//!   │ Retrieval             │  embed query (+1 synonym variant)
//!   │  vector search        │  → nearest passages per variant
//!   │  dedup + lexical      │  → keyword/fuzzy re-rank
//!   │  re-rank, top-k       │  → optional fast-mode char budget
//!   └──────┬───────────────┘
//!          ▼
//!   ┌──────────────────────┐
//!   │ Prompt composition    │  intent-keyed instruction
//!   │  ① ② ③ markers        │  + passages + session context
//!   └──────┬───────────────┘
//!          ▼
//!   ┌──────────────────────┐
//!   │ Generation            │  Ollama / OpenAI-compatible
//!   │  3 attempts, backoff  │  full or SSE-streamed
//!   └──────┬───────────────┘
//!          ▼
//!     answer + citations
//! ```
//!
//! ## Module Overview
//!
//! - [`config`] - Environment-based configuration for server, corpus, LLM and retrieval tuning
//! - [`models`] - Shared data types: `Chunk`, `IndexedPassage`, request/response types
//! - [`error`] - The error taxonomy the route layer maps to student-facing guidance
//! - [`chunker`] - Heading-aware paragraph chunking with overlap windows
//! - [`extract`] - Plain-text extraction from txt/md/html/pdf/docx/pptx
//! - [`ingest`] - Corpus walk: extract, chunk, embed, upsert
//! - [`embed`] - Embedding boundary (Ollama or OpenAI-compatible APIs)
//! - [`store`] - Document store: in-memory index with cosine search and JSON persistence
//! - [`retrieval`] - Query expansion, dedup, and lexical/fuzzy re-ranking
//! - [`persona`] - Intent detection, greeting short-circuit, and prompt composition
//! - [`llm`] - Generation clients with retry/backoff and stream parsing
//! - [`session`] - Bounded per-session conversation memory with lazy expiry
//! - [`api`] - Axum HTTP handlers for chat, streaming chat, sessions, and health
//! - [`state`] - Shared application state wiring the trait seams together

pub mod api;
pub mod chunker;
pub mod config;
pub mod embed;
pub mod error;
pub mod extract;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod persona;
pub mod retrieval;
pub mod session;
pub mod state;
pub mod store;
