//! Client for the chat-completion proxy.

use serde_json::{json, Value};
use tracing::warn;

use stoa_core::{CompletionRequest, LlmClient, StoaResult};

use crate::{http_agent, map_http_error};

/// Blocking client for the proxy endpoint. The proxy accepts
/// `{messages, temperature, max_tokens, model}` and replies either with a
/// simplified `{content}` body or with the upstream chat-completion shape;
/// both are accepted here.
pub struct HttpGateway {
    agent: ureq::Agent,
    endpoint: String,
    model: String,
}

impl HttpGateway {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            agent: http_agent(),
            endpoint: endpoint.into(),
            model: model.into(),
        }
    }
}

impl LlmClient for HttpGateway {
    fn complete(&self, request: &CompletionRequest) -> StoaResult<String> {
        let body = json!({
            "messages": request.messages,
            "temperature": request.temperature,
            "max_tokens": request.max_tokens,
            "model": self.model,
        });

        let response = self
            .agent
            .post(&self.endpoint)
            .send_json(body)
            .map_err(map_http_error)?;

        let value: Value = response
            .into_json()
            .map_err(|e| stoa_core::StoaError::Transport(e.to_string()))?;
        Ok(reply_content(&value))
    }
}

/// Pull the reply text out of either accepted response shape. An
/// unrecognized body yields an empty string rather than an error, the same
/// lenient contract the callers were built against.
fn reply_content(value: &Value) -> String {
    if let Some(text) = value.as_str() {
        return text.to_string();
    }
    if let Some(content) = value.get("content").and_then(Value::as_str) {
        return content.to_string();
    }
    if let Some(content) = value
        .pointer("/choices/0/message/content")
        .and_then(Value::as_str)
    {
        return content.to_string();
    }
    warn!("unrecognized gateway response shape");
    String::new()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_reply_content_simplified_shape() {
        assert_eq!(reply_content(&json!({"content": "hello"})), "hello");
    }

    #[test]
    fn test_reply_content_chat_completion_shape() {
        let body = json!({
            "choices": [{"message": {"role": "assistant", "content": "hi there"}}]
        });
        assert_eq!(reply_content(&body), "hi there");
    }

    #[test]
    fn test_reply_content_plain_string() {
        assert_eq!(reply_content(&json!("raw text")), "raw text");
    }

    #[test]
    fn test_reply_content_unknown_shape_is_empty() {
        assert_eq!(reply_content(&json!({"unexpected": true})), "");
    }
}
