//! Generation clients for Ollama and OpenAI-compatible endpoints.
//!
//! The provider is chosen once at construction via [`build_client`]; the rest
//! of the crate only sees the [`GenerationClient`] trait. Transient upstream
//! failures are retried with a fixed backoff schedule before surfacing as
//! typed errors.

mod ollama;
mod openai;

pub use ollama::OllamaClient;
pub use openai::OpenAiClient;

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::stream::{Stream, StreamExt};

use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use crate::models::GenerationRequest;

/// Content deltas from a streaming completion, one per upstream frame.
pub type TokenStream = Pin<Box<dyn Stream<Item = Result<String>> + Send>>;

/// Attempts per generation call, including the first.
pub const MAX_ATTEMPTS: u32 = 3;

#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Run one completion to the end and return the full text.
    async fn complete(&self, request: GenerationRequest) -> Result<String>;

    /// Open a streaming completion. The returned stream is lazy; the request
    /// is in flight by the time this resolves, so connection and status
    /// errors surface here, not mid-stream.
    async fn complete_stream(&self, request: GenerationRequest) -> Result<TokenStream>;
}

/// Construct the client matching `config.provider`.
pub fn build_client(client: reqwest::Client, config: LlmConfig) -> Result<Arc<dyn GenerationClient>> {
    match config.provider.as_str() {
        "ollama" => Ok(Arc::new(OllamaClient::new(client, config))),
        "openai" => Ok(Arc::new(OpenAiClient::new(client, config))),
        other => Err(AssistantError::Generation {
            endpoint: config.base_url,
            detail: format!("unsupported provider: {other}"),
        }),
    }
}

/// Backoff before retry number `attempt` (0-based): 2s, then 4s.
fn backoff_delay(attempt: u32) -> Duration {
    Duration::from_secs(2 + 2 * attempt as u64)
}

/// Run `op` up to [`MAX_ATTEMPTS`] times, sleeping between attempts. Only
/// errors marked retryable restart the loop; the error that escapes carries
/// the total attempt count.
pub(crate) async fn with_retry<T, F, Fut>(mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && attempt + 1 < MAX_ATTEMPTS => {
                tracing::warn!(attempt = attempt + 1, error = %err, "generation attempt failed, retrying");
                tokio::time::sleep(backoff_delay(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(stamp_attempts(err, attempt + 1)),
        }
    }
}

/// Record how many attempts were actually made on the escaping error.
fn stamp_attempts(err: AssistantError, total: u32) -> AssistantError {
    match err {
        AssistantError::GenerationTimeout { endpoint, .. } => {
            AssistantError::GenerationTimeout { endpoint, attempts: total }
        }
        AssistantError::GenerationConnection { endpoint, .. } => {
            AssistantError::GenerationConnection { endpoint, attempts: total }
        }
        AssistantError::GenerationEmpty { endpoint, .. } => {
            AssistantError::GenerationEmpty { endpoint, attempts: total }
        }
        other => other,
    }
}

/// Map a transport-level reqwest error onto the taxonomy.
pub(crate) fn classify_transport_error(err: reqwest::Error, endpoint: &str) -> AssistantError {
    if err.is_timeout() {
        AssistantError::GenerationTimeout {
            endpoint: endpoint.to_string(),
            attempts: 1,
        }
    } else if err.is_connect() {
        AssistantError::GenerationConnection {
            endpoint: endpoint.to_string(),
            attempts: 1,
        }
    } else {
        AssistantError::Generation {
            endpoint: endpoint.to_string(),
            detail: err.to_string(),
        }
    }
}

/// Convert a byte stream into a stream of complete non-empty lines, buffering
/// partial lines across network chunks.
pub(crate) fn stream_lines(
    byte_stream: impl Stream<Item = reqwest::Result<bytes::Bytes>> + Send + 'static,
    endpoint: String,
) -> impl Stream<Item = Result<String>> + Send {
    futures_util::stream::unfold(
        (Box::pin(byte_stream), String::new(), endpoint),
        |(mut stream, mut buffer, endpoint)| async move {
            loop {
                if let Some(newline_pos) = buffer.find('\n') {
                    let line = buffer[..newline_pos].to_string();
                    buffer = buffer[newline_pos + 1..].to_string();
                    if !line.trim().is_empty() {
                        return Some((Ok(line), (stream, buffer, endpoint)));
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => {
                        buffer.push_str(&String::from_utf8_lossy(&bytes));
                    }
                    Some(Err(e)) => {
                        let err = classify_transport_error(e, &endpoint);
                        return Some((Err(err), (stream, buffer, endpoint)));
                    }
                    None => {
                        // Emit any trailing line without a final newline
                        if !buffer.trim().is_empty() {
                            let remaining = std::mem::take(&mut buffer);
                            return Some((Ok(remaining), (stream, buffer, endpoint)));
                        }
                        return None;
                    }
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::time::Instant;

    #[test]
    fn test_backoff_schedule() {
        assert_eq!(backoff_delay(0), Duration::from_secs(2));
        assert_eq!(backoff_delay(1), Duration::from_secs(4));
    }

    #[test]
    fn test_unsupported_provider_rejected() {
        let config = LlmConfig {
            provider: "mystery".to_string(),
            ..LlmConfig::default()
        };
        let result = build_client(reqwest::Client::new(), config);
        assert!(matches!(result, Err(AssistantError::Generation { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhausts_three_attempts_with_backoff() {
        let calls = Mutex::new(0u32);
        let started = Instant::now();

        let result: Result<String> = with_retry(|| {
            *calls.lock() += 1;
            async {
                Err(AssistantError::GenerationConnection {
                    endpoint: "http://localhost:11434".to_string(),
                    attempts: 1,
                })
            }
        })
        .await;

        assert_eq!(*calls.lock(), 3);
        // 2s + 4s of (paused-time) backoff between the three attempts
        assert!(started.elapsed() >= Duration::from_secs(6));
        match result.unwrap_err() {
            AssistantError::GenerationConnection { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_two_failures_then_success_takes_three_attempts() {
        let calls = Mutex::new(0u32);

        let result: Result<String> = with_retry(|| {
            let n = {
                let mut guard = calls.lock();
                *guard += 1;
                *guard
            };
            async move {
                if n < 3 {
                    Err(AssistantError::GenerationEmpty {
                        endpoint: "http://localhost:11434".to_string(),
                        attempts: 1,
                    })
                } else {
                    Ok("answer".to_string())
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "answer");
        assert_eq!(*calls.lock(), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let calls = Mutex::new(0u32);

        let result: Result<String> = with_retry(|| {
            *calls.lock() += 1;
            async { Err(AssistantError::NoContext) }
        })
        .await;

        assert_eq!(*calls.lock(), 1);
        assert!(matches!(result.unwrap_err(), AssistantError::NoContext));
    }

    #[tokio::test]
    async fn test_http_status_error_fails_fast() {
        let calls = Mutex::new(0u32);

        let result: Result<String> = with_retry(|| {
            *calls.lock() += 1;
            async {
                Err(AssistantError::Generation {
                    endpoint: "http://localhost:11434".to_string(),
                    detail: "HTTP 401 Unauthorized".to_string(),
                })
            }
        })
        .await;

        // A bad status does not burn the retry budget
        assert_eq!(*calls.lock(), 1);
        assert!(matches!(
            result.unwrap_err(),
            AssistantError::Generation { .. }
        ));
    }

    #[tokio::test]
    async fn test_stream_lines_buffers_partial_lines() {
        let chunks: Vec<reqwest::Result<bytes::Bytes>> = vec![
            Ok(bytes::Bytes::from("hel")),
            Ok(bytes::Bytes::from("lo\nwor")),
            Ok(bytes::Bytes::from("ld\n")),
        ];
        let byte_stream = futures_util::stream::iter(chunks);

        let lines: Vec<String> = stream_lines(byte_stream, "e".to_string())
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(lines, vec!["hello", "world"]);
    }

    #[tokio::test]
    async fn test_stream_lines_emits_trailing_line() {
        let chunks: Vec<reqwest::Result<bytes::Bytes>> =
            vec![Ok(bytes::Bytes::from("no newline at end"))];
        let byte_stream = futures_util::stream::iter(chunks);

        let lines: Vec<String> = stream_lines(byte_stream, "e".to_string())
            .map(|r| r.unwrap())
            .collect()
            .await;

        assert_eq!(lines, vec!["no newline at end"]);
    }
}
