//! Ollama generation client: /api/generate for full completions, /api/chat
//! NDJSON for streaming.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use serde::{Deserialize, Serialize};

use super::{classify_transport_error, stream_lines, with_retry, GenerationClient, TokenStream};
use crate::config::LlmConfig;
use crate::error::{AssistantError, Result};
use crate::models::GenerationRequest;

const COMPLETE_TIMEOUT: Duration = Duration::from_secs(120);
const STREAM_TIMEOUT: Duration = Duration::from_secs(300);

pub struct OllamaClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OllamaClient {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }

    fn base_url(&self) -> &str {
        self.config.base_url.trim_end_matches('/')
    }
}

#[derive(Serialize)]
struct GenerateRequest {
    model: String,
    prompt: String,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Serialize)]
struct StreamRequest {
    model: String,
    messages: Vec<StreamMessage>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize, Deserialize)]
struct StreamMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct StreamChunk {
    message: StreamMessage,
    done: bool,
}

#[async_trait]
impl GenerationClient for OllamaClient {
    async fn complete(&self, request: GenerationRequest) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url());

        with_retry(|| {
            let client = self.client.clone();
            let url = url.clone();
            let req = GenerateRequest {
                model: self.config.chat_model.clone(),
                prompt: request.prompt.clone(),
                stream: false,
                options: GenerateOptions {
                    temperature: request.temperature,
                    num_predict: request.max_tokens,
                },
            };

            async move {
                let resp = client
                    .post(&url)
                    .timeout(COMPLETE_TIMEOUT)
                    .json(&req)
                    .send()
                    .await
                    .map_err(|e| classify_transport_error(e, &url))?;

                if !resp.status().is_success() {
                    let status = resp.status();
                    return Err(AssistantError::Generation {
                        endpoint: url,
                        detail: format!("HTTP {status}"),
                    });
                }

                let body: GenerateResponse =
                    resp.json()
                        .await
                        .map_err(|e| AssistantError::GenerationMalformed {
                            endpoint: url.clone(),
                            detail: e.to_string(),
                        })?;

                if body.response.trim().is_empty() {
                    return Err(AssistantError::GenerationEmpty {
                        endpoint: url,
                        attempts: 1,
                    });
                }

                Ok(body.response)
            }
        })
        .await
    }

    async fn complete_stream(&self, request: GenerationRequest) -> Result<TokenStream> {
        let url = format!("{}/api/chat", self.base_url());

        // Retry covers connecting and the HTTP status; once the stream is
        // open, frames flow through without re-dial.
        let resp = with_retry(|| {
            let client = self.client.clone();
            let url = url.clone();
            let req = StreamRequest {
                model: self.config.chat_model.clone(),
                messages: vec![StreamMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                }],
                stream: true,
                options: GenerateOptions {
                    temperature: request.temperature,
                    num_predict: request.max_tokens,
                },
            };

            async move {
                let resp = client
                    .post(&url)
                    .timeout(STREAM_TIMEOUT)
                    .json(&req)
                    .send()
                    .await
                    .map_err(|e| classify_transport_error(e, &url))?;

                if !resp.status().is_success() {
                    let status = resp.status();
                    return Err(AssistantError::Generation {
                        endpoint: url,
                        detail: format!("HTTP {status}"),
                    });
                }

                Ok(resp)
            }
        })
        .await?;

        let stream = stream_lines(resp.bytes_stream(), url).filter_map(|line_result| async move {
            match line_result {
                Ok(line) => parse_stream_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }
}

/// Parse one NDJSON stream line. Malformed frames are skipped with a warning
/// rather than killing the stream; a single bad frame should not lose the
/// rest of a long answer.
fn parse_stream_line(line: &str) -> Option<Result<String>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(line) {
        Ok(chunk) => {
            if chunk.done || chunk.message.content.is_empty() {
                return None;
            }
            Some(Ok(chunk.message.content))
        }
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed stream frame");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_content_delta() {
        let line = r#"{"message":{"role":"assistant","content":"The main"},"done":false}"#;
        assert_eq!(parse_stream_line(line).unwrap().unwrap(), "The main");
    }

    #[test]
    fn test_parse_done_frame_skipped() {
        let line = r#"{"message":{"role":"assistant","content":""},"done":true}"#;
        assert!(parse_stream_line(line).is_none());
    }

    #[test]
    fn test_parse_empty_content_skipped() {
        let line = r#"{"message":{"role":"assistant","content":""},"done":false}"#;
        assert!(parse_stream_line(line).is_none());
    }

    #[test]
    fn test_malformed_frame_skipped_not_fatal() {
        assert!(parse_stream_line("{not json at all").is_none());
        assert!(parse_stream_line("").is_none());
    }
}
