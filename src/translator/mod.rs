//! Jaskier Shared Pattern — translator
//! Bidirectional conversion between OpenAI-chat, OpenAI-responses, and
//! Anthropic-messages request/response shapes (spec.md §4.7, C7), including
//! the internal `Event` sum type used to relay SSE streams.

pub mod anthropic;
pub mod openai;
pub mod sse;

use serde_json::Value;

use crate::config::ApiStyle;
use crate::error::{GatewayError, GatewayResult};

/// The wire shape the client used, determined by request path prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientShape {
    OpenAiChat,
    OpenAiResponses,
    AnthropicMessages,
}

impl ClientShape {
    pub fn from_path(path: &str) -> Option<Self> {
        if path.ends_with("/v1/responses") {
            Some(Self::OpenAiResponses)
        } else if path.ends_with("/v1/messages") {
            Some(Self::AnthropicMessages)
        } else if path.ends_with("/v1/chat/completions") {
            Some(Self::OpenAiChat)
        } else {
            None
        }
    }
}

/// One decoded SSE frame, protocol-agnostic. Upstream events are decoded
/// into this shape, accumulated for usage tracking, then re-encoded for
/// whichever shape the client asked for.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Delta(String),
    ToolUseStart { id: String, name: String },
    ToolUseDelta { id: String, partial_json: String },
    ToolUseStop { id: String },
    UsageUpdate { input_tokens: u64, output_tokens: u64 },
    Done,
    Error(String),
}

/// Translate a client request body into the shape `upstream_style` expects,
/// rewriting `model` to `target_model` in the process.
pub fn translate_request(
    client_shape: ClientShape,
    upstream_style: ApiStyle,
    body: &Value,
    target_model: &str,
) -> GatewayResult<Value> {
    // Same-protocol pass-through (mirrors the openai-chat→openai row):
    // going through the openai-chat intermediate would silently drop
    // Anthropic-only fields (content-block system arrays, image/document/
    // thinking blocks) that have no openai-chat representation.
    if client_shape == ClientShape::AnthropicMessages && upstream_style == ApiStyle::Anthropic {
        return Ok(anthropic::with_model(body.clone(), target_model));
    }

    let openai_chat_body = match client_shape {
        ClientShape::OpenAiChat => body.clone(),
        ClientShape::AnthropicMessages => anthropic::to_openai_chat(body)?,
        ClientShape::OpenAiResponses => openai::responses_to_chat(body)?,
    };

    match upstream_style {
        ApiStyle::OpenAi => Ok(openai::with_model(openai_chat_body, target_model)),
        ApiStyle::Anthropic => {
            let anthropic_body = openai::to_anthropic_messages(&openai_chat_body)?;
            Ok(anthropic::with_model(anthropic_body, target_model))
        }
    }
}

/// Translate a non-streaming upstream response body back into the shape the
/// client expects.
pub fn translate_response(
    client_shape: ClientShape,
    upstream_style: ApiStyle,
    body: &Value,
    response_model: &str,
) -> GatewayResult<Value> {
    if client_shape == ClientShape::AnthropicMessages && upstream_style == ApiStyle::Anthropic {
        return Ok(openai::with_response_model(body.clone(), response_model));
    }

    let openai_chat_body = match upstream_style {
        ApiStyle::OpenAi => body.clone(),
        ApiStyle::Anthropic => anthropic::to_openai_chat_response(body)?,
    };

    let result = match client_shape {
        ClientShape::OpenAiChat => openai_chat_body,
        ClientShape::OpenAiResponses => openai::chat_to_responses(&openai_chat_body)?,
        ClientShape::AnthropicMessages => openai::to_anthropic_messages_response(&openai_chat_body)?,
    };
    Ok(openai::with_response_model(result, response_model))
}

/// Extract `model` from a parsed request body, regardless of shape.
pub fn extract_model(body: &Value) -> GatewayResult<String> {
    body.get("model")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GatewayError::InvalidRequest("missing `model` field".to_string()))
}

/// `true` if the request carries at least one message/input entry.
pub fn has_content(client_shape: ClientShape, body: &Value) -> bool {
    let key = match client_shape {
        ClientShape::OpenAiResponses => "input",
        _ => "messages",
    };
    body.get(key).and_then(Value::as_array).is_some_and(|a| !a.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_shape_from_path() {
        assert_eq!(ClientShape::from_path("/v1/chat/completions"), Some(ClientShape::OpenAiChat));
        assert_eq!(ClientShape::from_path("/openai/v1/chat/completions"), Some(ClientShape::OpenAiChat));
        assert_eq!(ClientShape::from_path("/v1/messages"), Some(ClientShape::AnthropicMessages));
        assert_eq!(ClientShape::from_path("/anthropic/v1/messages"), Some(ClientShape::AnthropicMessages));
        assert_eq!(ClientShape::from_path("/v1/responses"), Some(ClientShape::OpenAiResponses));
        assert_eq!(ClientShape::from_path("/v1/unknown"), None);
    }

    #[test]
    fn extract_model_requires_field() {
        assert!(extract_model(&json!({"messages": []})).is_err());
        assert_eq!(extract_model(&json!({"model": "gpt-4"})).unwrap(), "gpt-4");
    }

    #[test]
    fn has_content_checks_the_right_key() {
        assert!(!has_content(ClientShape::OpenAiChat, &json!({"messages": []})));
        assert!(has_content(ClientShape::OpenAiChat, &json!({"messages": [{"role": "user"}]})));
        assert!(has_content(ClientShape::OpenAiResponses, &json!({"input": [{"role": "user"}]})));
    }

    #[test]
    fn anthropic_to_anthropic_request_passes_through_system_blocks_unchanged() {
        let body = json!({
            "model": "claude-3-haiku",
            "system": [{"type": "text", "text": "be terse", "cache_control": {"type": "ephemeral"}}],
            "messages": [{"role": "user", "content": [{"type": "image", "source": {"type": "base64", "data": "abc"}}]}],
        });
        let translated = translate_request(ClientShape::AnthropicMessages, ApiStyle::Anthropic, &body, "claude-3-opus").unwrap();
        assert_eq!(translated["system"], body["system"]);
        assert_eq!(translated["messages"], body["messages"]);
        assert_eq!(translated["model"], json!("claude-3-opus"));
    }

    #[test]
    fn anthropic_to_anthropic_response_passes_through_unchanged() {
        let body = json!({
            "id": "msg_1",
            "content": [{"type": "text", "text": "hi"}],
            "model": "claude-3-haiku",
            "usage": {"input_tokens": 10, "output_tokens": 5},
        });
        let translated = translate_response(ClientShape::AnthropicMessages, ApiStyle::Anthropic, &body, "claude-3-opus").unwrap();
        assert_eq!(translated["content"], body["content"]);
        assert_eq!(translated["model"], json!("claude-3-opus"));
    }
}
