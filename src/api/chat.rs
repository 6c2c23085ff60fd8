//! Chat endpoints: /chat (JSON) and /chat_stream (SSE).
//!
//! Both run the same pipeline: sanitize input, short-circuit greetings,
//! retrieve (docs mode only), compose the grounded prompt, then generate
//! under a concurrency permit. Failures after retrieval succeed partially:
//! the citations still reach the client along with guidance text.

use std::convert::Infallible;
use std::pin::Pin;
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::Json;
use futures_util::stream::{self, Stream, StreamExt};

use crate::error::AssistantError;
use crate::models::{ChatMessage, ChatMode, ChatRequest, ChatResponse, GenerationRequest};
use crate::persona::{self, ComposedPrompt};
use crate::state::AppState;

const MAX_CHAT_MESSAGE_LEN: usize = 2000;
const MAX_HISTORY_TURNS: usize = 10;
const CONTEXT_TURNS: usize = 6;
const IDLE_TIMEOUT_SECS: u64 = 30;

type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// POST /chat — non-streaming chat.
pub async fn chat(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let (message, history) = validate_request(req.messages)?;

    if persona::is_greeting_or_chitchat(&message) {
        return Ok(Json(ChatResponse {
            answer: persona::greeting_reply(),
            sources: Vec::new(),
            intent: "greeting".to_string(),
            error_kind: None,
        }));
    }

    let context = conversation_context(&state, req.session_id.as_deref(), &history);

    let composed = match prepare_prompt(&state, &message, context.as_deref(), req.mode).await {
        Ok(composed) => composed,
        Err(e) => return Ok(Json(failure_response(&e, Vec::new()))),
    };

    let gen_req = GenerationRequest::new(
        composed.prompt.clone(),
        state.config.llm.temperature,
        state.config.llm.max_tokens,
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let _permit = state
        .generation_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Chat service at capacity".to_string(),
            )
        })?;

    match state.generator.complete(gen_req).await {
        Ok(mut answer) => {
            answer.push_str(persona::suggestion_block(composed.intent));

            if let Some(session_id) = req.session_id.as_deref() {
                state.sessions.add_turn(session_id, "user", &message);
                state.sessions.add_turn(session_id, "assistant", &answer);
            }

            Ok(Json(ChatResponse {
                answer,
                sources: composed.sources,
                intent: composed.intent.as_str().to_string(),
                error_kind: None,
            }))
        }
        Err(e) => {
            tracing::error!(error = %e, "generation failed");
            // Retrieval already succeeded: hand back the citations anyway
            Ok(Json(failure_response(&e, composed.sources)))
        }
    }
}

/// POST /chat_stream — SSE chat. Event sequence: one `context` event with
/// the citations, `delta` events with content, then `done`. Errors become a
/// terminal `error` event rather than a broken connection.
pub async fn chat_stream(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> Result<Sse<SseStream>, (StatusCode, String)> {
    let (message, history) = validate_request(req.messages)?;

    if persona::is_greeting_or_chitchat(&message) {
        return Ok(Sse::new(greeting_stream()));
    }

    let context = conversation_context(&state, req.session_id.as_deref(), &history);

    let composed = match prepare_prompt(&state, &message, context.as_deref(), req.mode).await {
        Ok(composed) => composed,
        Err(e) => {
            let (kind, guidance) = user_guidance(&e);
            return Ok(Sse::new(error_stream(kind, guidance, Vec::new())));
        }
    };

    let gen_req = GenerationRequest::new(
        composed.prompt.clone(),
        state.config.llm.temperature,
        state.config.llm.max_tokens,
    )
    .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let _permit = state
        .generation_semaphore
        .clone()
        .acquire_owned()
        .await
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                "Chat service at capacity".to_string(),
            )
        })?;

    if let Some(session_id) = req.session_id.as_deref() {
        state.sessions.add_turn(session_id, "user", &message);
    }

    let context_event = context_sse_event(&composed);

    let body: SseStream = match state.generator.complete_stream(gen_req).await {
        Ok(token_stream) => {
            let delta_stream = delta_events(token_stream);
            Box::pin(
                stream::once(async move { Ok(context_event) })
                    .chain(delta_stream)
                    .chain(stream::once(async { Ok(done_event()) })),
            )
        }
        Err(e) => {
            tracing::error!(error = %e, "streaming generation failed to start");
            let (kind, guidance) = user_guidance(&e);
            // The context event already carries the citations; chain only
            // error + done so a client keeping the latest context does not
            // lose them
            Box::pin(
                stream::once(async move { Ok(context_event) })
                    .chain(error_events(kind, guidance)),
            )
        }
    };

    // Hold the concurrency permit until the stream is dropped
    let body: SseStream = Box::pin(body.map(move |event| {
        let _permit = &_permit;
        event
    }));

    Ok(Sse::new(body))
}

// ─── Pipeline pieces ─────────────────────────────────────

/// Extract the latest user message plus sanitized prior history.
fn validate_request(
    messages: Vec<ChatMessage>,
) -> Result<(String, Vec<ChatMessage>), (StatusCode, String)> {
    let mut history = validate_and_sanitize_history(messages);

    let message = loop {
        match history.pop() {
            Some(m) if m.role == "user" && !m.content.trim().is_empty() => {
                break m.content.trim().to_string();
            }
            Some(_) => continue,
            None => {
                return Err((
                    StatusCode::BAD_REQUEST,
                    "A non-empty user message is required".to_string(),
                ))
            }
        }
    };

    Ok((message, history))
}

/// Conversation context block: session memory when a session id is given,
/// otherwise the request-supplied history.
fn conversation_context(
    state: &AppState,
    session_id: Option<&str>,
    history: &[ChatMessage],
) -> Option<String> {
    if let Some(id) = session_id {
        if let Some(context) = state.sessions.recent_context(id, CONTEXT_TURNS) {
            return Some(context);
        }
    }

    if history.is_empty() {
        return None;
    }

    let start = history.len().saturating_sub(CONTEXT_TURNS);
    let lines: Vec<String> = history[start..]
        .iter()
        .map(|m| {
            let label = if m.role == "user" { "Student" } else { "You" };
            let excerpt: String = m.content.chars().take(200).collect();
            format!("{label}: {excerpt}")
        })
        .collect();
    Some(lines.join("\n"))
}

/// Retrieve (docs mode) and compose the generation prompt.
async fn prepare_prompt(
    state: &AppState,
    message: &str,
    context: Option<&str>,
    mode: ChatMode,
) -> crate::error::Result<ComposedPrompt> {
    let candidates = if mode.uses_retrieval() {
        state
            .retriever
            .retrieve(message, state.config.retrieval.top_k)
            .await?
    } else {
        Vec::new()
    };

    persona::compose(
        message,
        &candidates,
        context,
        mode,
        state.config.retrieval.fast_mode,
    )
}

/// Map an error onto a (machine-readable kind, student-facing guidance) pair.
fn user_guidance(err: &AssistantError) -> (&'static str, String) {
    match err {
        AssistantError::NoContext => (
            "no_context",
            "I couldn't find anything about that in the course materials. Try rephrasing, \
             or check that the right documents have been ingested."
                .to_string(),
        ),
        AssistantError::Retrieval(_) => (
            "retrieval_error",
            "Something went wrong while searching the course materials. Please try again."
                .to_string(),
        ),
        AssistantError::GenerationConnection { .. } => (
            "model_connection",
            "I couldn't reach the language model service. Check that it is running, then \
             try again."
                .to_string(),
        ),
        AssistantError::GenerationTimeout { .. } => (
            "model_timeout",
            "The model took too long to respond. Try again, or ask a simpler question."
                .to_string(),
        ),
        AssistantError::GenerationEmpty { .. } => (
            "model_empty_response",
            "The model returned an empty answer. Please try again.".to_string(),
        ),
        AssistantError::GenerationMalformed { .. } => (
            "model_error",
            "The model service sent back a response I couldn't read. Please try again."
                .to_string(),
        ),
        AssistantError::Generation { .. } => (
            "model_error",
            "The model service reported an error. Please try again in a moment.".to_string(),
        ),
        AssistantError::Unknown(_) => (
            "unknown",
            "Something unexpected went wrong. Please try again.".to_string(),
        ),
    }
}

fn failure_response(err: &AssistantError, sources: Vec<String>) -> ChatResponse {
    let (kind, guidance) = user_guidance(err);
    ChatResponse {
        answer: guidance,
        sources,
        intent: "error".to_string(),
        error_kind: Some(kind.to_string()),
    }
}

// ─── SSE assembly ────────────────────────────────────────

fn context_sse_event(composed: &ComposedPrompt) -> Event {
    Event::default()
        .event("context")
        .json_data(serde_json::json!({
            "sources": composed.sources,
            "intent": composed.intent.as_str(),
        }))
        .unwrap_or_else(|_| Event::default().event("context"))
}

fn done_event() -> Event {
    Event::default()
        .event("done")
        .json_data(serde_json::json!({}))
        .unwrap_or_else(|_| Event::default().event("done"))
}

fn greeting_stream() -> SseStream {
    let context = Event::default()
        .event("context")
        .json_data(serde_json::json!({ "sources": [], "intent": "greeting" }))
        .unwrap_or_else(|_| Event::default().event("context"));
    let delta = Event::default()
        .event("delta")
        .json_data(serde_json::json!({ "content": persona::greeting_reply() }))
        .unwrap_or_else(|_| Event::default().event("delta"));

    let events: Vec<Result<Event, Infallible>> = vec![Ok(context), Ok(delta), Ok(done_event())];
    Box::pin(stream::iter(events))
}

/// Full error sequence for failures before any context was sent.
fn error_stream(kind: &'static str, guidance: String, sources: Vec<String>) -> SseStream {
    let context = Event::default()
        .event("context")
        .json_data(serde_json::json!({ "sources": sources, "intent": "error" }))
        .unwrap_or_else(|_| Event::default().event("context"));

    Box::pin(stream::once(async move { Ok(context) }).chain(error_events(kind, guidance)))
}

/// Terminal error + done pair, for appending after a context event that has
/// already been emitted.
fn error_events(kind: &'static str, guidance: String) -> SseStream {
    let error = Event::default()
        .event("error")
        .json_data(serde_json::json!({ "kind": kind, "message": guidance }))
        .unwrap_or_else(|_| Event::default().event("error"));

    let events: Vec<Result<Event, Infallible>> = vec![Ok(error), Ok(done_event())];
    Box::pin(stream::iter(events))
}

/// Forward token deltas as SSE events, stopping on the first mid-stream
/// error or when the model goes idle too long.
fn delta_events(token_stream: crate::llm::TokenStream) -> SseStream {
    let idle_timeout = Duration::from_secs(IDLE_TIMEOUT_SECS);

    Box::pin(futures_util::stream::unfold(
        (token_stream, idle_timeout),
        |(mut token_stream, timeout)| async move {
            match tokio::time::timeout(timeout, token_stream.next()).await {
                Ok(Some(Ok(content))) => {
                    let event: Result<Event, Infallible> = Ok(Event::default()
                        .event("delta")
                        .json_data(serde_json::json!({ "content": content }))
                        .unwrap_or_else(|_| Event::default().event("delta")));
                    Some((event, (token_stream, timeout)))
                }
                Ok(Some(Err(e))) => {
                    let (kind, guidance) = user_guidance(&e);
                    let event: Result<Event, Infallible> = Ok(Event::default()
                        .event("error")
                        .json_data(serde_json::json!({ "kind": kind, "message": guidance }))
                        .unwrap_or_else(|_| Event::default().event("error")));
                    // Duration::ZERO makes the next poll time out, ending the stream
                    Some((event, (token_stream, Duration::ZERO)))
                }
                Ok(None) => None,
                Err(_) => {
                    if timeout.is_zero() {
                        return None;
                    }
                    let event: Result<Event, Infallible> = Ok(Event::default()
                        .event("error")
                        .json_data(serde_json::json!({
                            "kind": "model_timeout",
                            "message": "The model stopped responding mid-answer. Please try again.",
                        }))
                        .unwrap_or_else(|_| Event::default().event("error")));
                    Some((event, (token_stream, Duration::ZERO)))
                }
            }
        },
    ))
}

fn validate_and_sanitize_history(messages: Vec<ChatMessage>) -> Vec<ChatMessage> {
    let sanitized: Vec<ChatMessage> = messages
        .into_iter()
        .filter(|m| m.role == "user" || m.role == "assistant")
        .map(|m| ChatMessage {
            role: m.role,
            content: sanitize_for_prompt(&truncate_to_char_boundary(
                &m.content,
                MAX_CHAT_MESSAGE_LEN,
            )),
        })
        .collect();

    let skip = sanitized.len().saturating_sub(MAX_HISTORY_TURNS);
    sanitized.into_iter().skip(skip).collect()
}

/// Strip chat-template control tokens so client text cannot smuggle in a
/// fake system turn.
fn sanitize_for_prompt(text: &str) -> String {
    text.replace("<|im_start|>", "").replace("<|im_end|>", "")
}

fn truncate_to_char_boundary(s: &str, max_len: usize) -> String {
    if s.len() <= max_len {
        return s.to_string();
    }
    s.char_indices()
        .take_while(|(i, _)| *i < max_len)
        .map(|(_, c)| c)
        .collect()
}
