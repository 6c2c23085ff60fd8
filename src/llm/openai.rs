//! OpenAI-compatible generation client: /v1/chat/completions for both full
//! and SSE streaming completions.

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

pub struct OpenAiClient {
    client: reqwest::Client,
    config: LlmConfig,
}

impl OpenAiClient {
    pub fn new(client: reqwest::Client, config: LlmConfig) -> Self {
        Self { client, config }
    }

    fn url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.config.base_url.trim_end_matches('/')
        )
    }

    fn api_key(&self) -> &str {
        self.config.api_key.as_deref().unwrap_or_default()
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ApiMessage>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize, Deserialize)]
struct ApiMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ApiMessage,
}

#[derive(Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

#[async_trait]
impl GenerationClient for OpenAiClient {
    async fn complete(&self, request: GenerationRequest) -> Result<String> {
        let url = self.url();

        with_retry(|| {
            let client = self.client.clone();
            let url = url.clone();
            let auth = format!("Bearer {}", self.api_key());
            let req = ChatCompletionRequest {
                model: self.config.chat_model.clone(),
                messages: vec![ApiMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                }],
                temperature: request.temperature,
                max_tokens: request.max_tokens,
                stream: false,
            };

            async move {
                let resp = client
                    .post(&url)
                    .timeout(COMPLETE_TIMEOUT)
                    .header("Authorization", auth)
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

                let body: ChatCompletionResponse =
                    resp.json()
                        .await
                        .map_err(|e| AssistantError::GenerationMalformed {
                            endpoint: url.clone(),
                            detail: e.to_string(),
                        })?;

                let text = body
                    .choices
                    .into_iter()
                    .next()
                    .map(|c| c.message.content)
                    .unwrap_or_default();

                if text.trim().is_empty() {
                    return Err(AssistantError::GenerationEmpty {
                        endpoint: url,
                        attempts: 1,
                    });
                }

                Ok(text)
            }
        })
        .await
    }

    async fn complete_stream(&self, request: GenerationRequest) -> Result<TokenStream> {
        let url = self.url();

        let resp = with_retry(|| {
            let client = self.client.clone();
            let url = url.clone();
            let auth = format!("Bearer {}", self.api_key());
            let req = ChatCompletionRequest {
                model: self.config.chat_model.clone(),
                messages: vec![ApiMessage {
                    role: "user".to_string(),
                    content: request.prompt.clone(),
                }],
                temperature: request.temperature,
                max_tokens: request.max_tokens,
                stream: true,
            };

            async move {
                let resp = client
                    .post(&url)
                    .timeout(STREAM_TIMEOUT)
                    .header("Authorization", auth)
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
                Ok(line) => parse_sse_line(&line),
                Err(e) => Some(Err(e)),
            }
        });

        Ok(Box::pin(stream))
    }
}

/// Parse one SSE line. Non-data lines, [DONE], role-only chunks and
/// malformed frames are all skipped.
fn parse_sse_line(line: &str) -> Option<Result<String>> {
    let line = line.trim();
    let data = line.strip_prefix("data: ")?.trim();

    if data == "[DONE]" {
        return None;
    }

    match serde_json::from_str::<StreamChunk>(data) {
        Ok(chunk) => {
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|c| c.delta.content)
                .unwrap_or_default();
            if content.is_empty() {
                return None;
            }
            Some(Ok(content))
        }
        Err(e) => {
            tracing::warn!(error = %e, "skipping malformed stream frame");
            None
        }
    }
}
