//! HTTP client for OpenAI-compatible chat completion endpoints.
//!
//! Speaks `/v1/chat/completions` only: a non-streaming variant used by the
//! summarizer and an SSE streaming variant used by the step loop. Reasoning
//! models that emit `reasoning_content` fragments are handled transparently.

use std::pin::Pin;

use anyhow::{Context, Result};
use futures_util::Stream;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde_json::Value;

use crate::config::RetryPolicy;
use crate::models::{ChatRequest, ChatResponse, StreamDelta, Usage};

/// Boxed stream of incremental completion deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta>> + Send>>;

// === Types ===

/// Client for an OpenAI-compatible chat completions API.
#[derive(Clone)]
pub struct ChatClient {
    http_client: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl ChatClient {
    /// Create a client with bearer authentication against `base_url`.
    pub fn new(base_url: impl Into<String>, api_key: &str, retry: RetryPolicy) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {api_key}"))
                .context("API key contains invalid header characters")?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;

        Ok(Self {
            http_client,
            base_url: base_url.into(),
            retry,
        })
    }

    fn completions_url(&self) -> String {
        format!(
            "{}/v1/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }

    /// Send a non-streaming completion request and return the final message.
    pub async fn complete(&self, request: &ChatRequest) -> Result<ChatResponse> {
        let mut request = request.clone();
        request.stream = None;

        let url = self.completions_url();
        let response =
            send_with_retry(&self.retry, || self.http_client.post(&url).json(&request)).await?;

        let status = response.status();
        let response_text = response.text().await.unwrap_or_default();
        if !status.is_success() {
            anyhow::bail!("chat completion failed: HTTP {status}: {response_text}");
        }

        let value: Value =
            serde_json::from_str(&response_text).context("failed to parse completion JSON")?;
        parse_chat_response(&value)
    }

    /// Send a streaming completion request.
    ///
    /// Yields one [`StreamDelta`] per SSE chunk that carries content or
    /// reasoning; the stream ends at `[DONE]` or when the connection closes.
    pub async fn stream(&self, request: &ChatRequest) -> Result<DeltaStream> {
        let mut request = request.clone();
        request.stream = Some(true);

        let url = self.completions_url();
        let response =
            send_with_retry(&self.retry, || self.http_client.post(&url).json(&request)).await?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("SSE stream request failed: HTTP {status}: {error_text}");
        }

        let byte_stream = response.bytes_stream();

        let stream = async_stream::stream! {
            use futures_util::StreamExt;

            let mut byte_buf: Vec<u8> = Vec::new();
            let mut data_buf = String::new();
            let mut done = false;

            let mut byte_stream = std::pin::pin!(byte_stream);

            while let Some(chunk_result) = byte_stream.next().await {
                let chunk = match chunk_result {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        yield Err(anyhow::anyhow!("stream read error: {e}"));
                        break;
                    }
                };

                byte_buf.extend_from_slice(&chunk);

                // Process complete SSE lines from the buffer
                loop {
                    let buf_str = String::from_utf8_lossy(&byte_buf);
                    let Some(newline_pos) = buf_str.find('\n') else { break };
                    let line: String = buf_str[..newline_pos].trim_end_matches('\r').to_string();
                    let consumed = newline_pos + 1;
                    byte_buf = byte_buf[consumed..].to_vec();

                    if line.is_empty() {
                        // Empty line = event boundary, process accumulated data
                        if !data_buf.is_empty() {
                            let data = std::mem::take(&mut data_buf);
                            if data.trim() == "[DONE]" {
                                done = true;
                            } else if let Ok(chunk_json) = serde_json::from_str::<Value>(&data) {
                                let delta = parse_sse_chunk(&chunk_json);
                                if !delta.is_empty() {
                                    yield Ok(delta);
                                }
                            }
                        }
                        continue;
                    }

                    if let Some(data) = line.strip_prefix("data: ") {
                        data_buf.push_str(data);
                    }
                    // Ignore other SSE fields (event:, id:, retry:)
                }

                if done {
                    break;
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

// === Response Parsing ===

fn parse_chat_response(payload: &Value) -> Result<ChatResponse> {
    let choices = payload
        .get("choices")
        .and_then(Value::as_array)
        .context("completion response missing choices")?;
    let choice = choices
        .first()
        .context("completion response missing first choice")?;
    let message = choice
        .get("message")
        .context("completion response missing message")?;

    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let reasoning = message
        .get("reasoning_content")
        .and_then(Value::as_str)
        .filter(|text| !text.trim().is_empty())
        .map(str::to_string);

    let usage: Usage = payload
        .get("usage")
        .and_then(|u| serde_json::from_value(u.clone()).ok())
        .unwrap_or_default();

    Ok(ChatResponse {
        content,
        reasoning,
        usage,
    })
}

/// Extract content/reasoning fragments from one streamed chunk.
fn parse_sse_chunk(chunk: &Value) -> StreamDelta {
    let mut out = StreamDelta::default();

    let Some(choices) = chunk.get("choices").and_then(Value::as_array) else {
        return out;
    };

    for choice in choices {
        let Some(delta) = choice.get("delta") else {
            continue;
        };
        if let Some(reasoning) = delta.get("reasoning_content").and_then(Value::as_str)
            && !reasoning.is_empty()
        {
            out.reasoning.get_or_insert_default().push_str(reasoning);
        }
        if let Some(content) = delta.get("content").and_then(Value::as_str)
            && !content.is_empty()
        {
            out.content.get_or_insert_default().push_str(content);
        }
    }

    out
}

// === Retry Helpers ===

async fn send_with_retry<F>(policy: &RetryPolicy, mut build: F) -> Result<reqwest::Response>
where
    F: FnMut() -> reqwest::RequestBuilder,
{
    let mut attempt: u32 = 0;

    loop {
        let result = build().send().await;

        match result {
            Ok(response) => {
                let status = response.status();

                if status.is_success() {
                    return Ok(response);
                }

                // Non-retryable statuses go back to the caller as-is
                let retryable = status.as_u16() == 429 || status.is_server_error();
                if !retryable {
                    return Ok(response);
                }

                if !policy.enabled || attempt >= policy.max_retries {
                    return Ok(response);
                }

                tracing::warn!(
                    status = status.as_u16(),
                    attempt = attempt + 1,
                    max = policy.max_retries + 1,
                    "retryable HTTP status"
                );
            }
            Err(err) => {
                if !policy.enabled || attempt >= policy.max_retries {
                    return Err(err.into());
                }
                tracing::warn!(
                    error = %err,
                    attempt = attempt + 1,
                    max = policy.max_retries + 1,
                    "request error"
                );
            }
        }

        let delay = policy.delay_for_attempt(attempt);
        attempt += 1;
        tracing::info!("retrying after {:.2}s", delay.as_secs_f64());
        tokio::time::sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sse_chunk_extracts_content_delta() {
        let chunk = json!({
            "choices": [{"delta": {"content": "hello"}}]
        });
        let delta = parse_sse_chunk(&chunk);
        assert_eq!(delta.content.as_deref(), Some("hello"));
        assert!(delta.reasoning.is_none());
    }

    #[test]
    fn sse_chunk_extracts_reasoning_delta() {
        let chunk = json!({
            "choices": [{"delta": {"reasoning_content": "let me think"}}]
        });
        let delta = parse_sse_chunk(&chunk);
        assert_eq!(delta.reasoning.as_deref(), Some("let me think"));
        assert!(delta.content.is_none());
    }

    #[test]
    fn sse_chunk_without_choices_is_empty() {
        let chunk = json!({"usage": {"prompt_tokens": 5}});
        assert!(parse_sse_chunk(&chunk).is_empty());
    }

    #[test]
    fn chat_response_parses_content_and_usage() {
        let payload = json!({
            "choices": [{"message": {"content": "Short title"}}],
            "usage": {"prompt_tokens": 40, "completion_tokens": 3}
        });
        let response = parse_chat_response(&payload).unwrap();
        assert_eq!(response.content, "Short title");
        assert_eq!(response.usage.input_tokens, 40);
    }

    #[test]
    fn chat_response_requires_choices() {
        let payload = json!({"error": "nope"});
        assert!(parse_chat_response(&payload).is_err());
    }
}
