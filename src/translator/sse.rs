//! SSE decode/encode. Upstream frames become [`Event`]s; events are then
//! re-encoded in whichever shape the client asked for (spec.md §4.7).

use serde_json::{json, Value};

use super::{ClientShape, Event};
use crate::config::ApiStyle;

/// Decode one upstream SSE `data:` payload (already stripped of the
/// `data: ` prefix) into zero or more internal events. OpenAI's `[DONE]`
/// sentinel and Anthropic's named events are both handled here.
pub fn decode_upstream_frame(upstream_style: ApiStyle, data: &str) -> Vec<Event> {
    if data == "[DONE]" {
        return vec![Event::Done];
    }

    let Ok(value) = serde_json::from_str::<Value>(data) else {
        return vec![Event::Error(format!("malformed upstream SSE payload: {data}"))];
    };

    match upstream_style {
        ApiStyle::OpenAi => decode_openai_frame(&value),
        ApiStyle::Anthropic => decode_anthropic_frame(&value),
    }
}

fn decode_openai_frame(value: &Value) -> Vec<Event> {
    let mut events = Vec::new();
    let Some(choice) = value.get("choices").and_then(Value::as_array).and_then(|c| c.first()) else {
        if let Some(usage) = value.get("usage") {
            events.push(usage_event(usage));
        }
        return events;
    };

    let delta = choice.get("delta");
    if let Some(text) = delta.and_then(|d| d.get("content")).and_then(Value::as_str) {
        if !text.is_empty() {
            events.push(Event::Delta(text.to_string()));
        }
    }

    if let Some(tool_calls) = delta.and_then(|d| d.get("tool_calls")).and_then(Value::as_array) {
        for call in tool_calls {
            let id = call.get("id").and_then(Value::as_str);
            let function = call.get("function");
            let name = function.and_then(|f| f.get("name")).and_then(Value::as_str);
            if let (Some(id), Some(name)) = (id, name) {
                events.push(Event::ToolUseStart { id: id.to_string(), name: name.to_string() });
            }
            if let Some(args) = function.and_then(|f| f.get("arguments")).and_then(Value::as_str) {
                events.push(Event::ToolUseDelta {
                    id: id.unwrap_or_default().to_string(),
                    partial_json: args.to_string(),
                });
            }
        }
    }

    if choice.get("finish_reason").and_then(Value::as_str).is_some() {
        if let Some(usage) = value.get("usage") {
            events.push(usage_event(usage));
        }
    }

    events
}

fn decode_anthropic_frame(value: &Value) -> Vec<Event> {
    let event_type = value.get("type").and_then(Value::as_str).unwrap_or_default();
    match event_type {
        "message_start" => {
            // `input_tokens` only ever appears here; `message_delta.usage`
            // carries just the cumulative `output_tokens`.
            match value.get("message").and_then(|m| m.get("usage")) {
                Some(usage) => vec![usage_event(usage)],
                None => vec![],
            }
        }
        "content_block_start" => {
            let block = value.get("content_block");
            if block.and_then(|b| b.get("type")).and_then(Value::as_str) == Some("tool_use") {
                let id = block.and_then(|b| b.get("id")).and_then(Value::as_str).unwrap_or_default();
                let name = block.and_then(|b| b.get("name")).and_then(Value::as_str).unwrap_or_default();
                return vec![Event::ToolUseStart { id: id.to_string(), name: name.to_string() }];
            }
            vec![]
        }
        "content_block_delta" => {
            let delta = value.get("delta");
            match delta.and_then(|d| d.get("type")).and_then(Value::as_str) {
                Some("text_delta") => {
                    let text = delta.and_then(|d| d.get("text")).and_then(Value::as_str).unwrap_or_default();
                    vec![Event::Delta(text.to_string())]
                }
                Some("input_json_delta") => {
                    let partial = delta.and_then(|d| d.get("partial_json")).and_then(Value::as_str).unwrap_or_default();
                    vec![Event::ToolUseDelta { id: String::new(), partial_json: partial.to_string() }]
                }
                _ => vec![],
            }
        }
        "content_block_stop" => vec![Event::ToolUseStop { id: String::new() }],
        "message_delta" => {
            if let Some(usage) = value.get("usage") {
                vec![usage_event(usage)]
            } else {
                vec![]
            }
        }
        "message_stop" => vec![Event::Done],
        "error" => {
            let message = value
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .unwrap_or("upstream error");
            vec![Event::Error(message.to_string())]
        }
        _ => vec![],
    }
}

/// Rough token-count estimate for a chunk of delta text, used when an
/// upstream streams without ever emitting a `usage` object (e.g. OpenAI
/// without `stream_options.include_usage`). ~4 characters per token,
/// matching the common approximation for English text.
pub fn estimate_tokens(text: &str) -> u64 {
    if text.is_empty() {
        0
    } else {
        (text.chars().count() as u64).div_ceil(4).max(1)
    }
}

fn usage_event(usage: &Value) -> Event {
    let input = usage
        .get("prompt_tokens")
        .or_else(|| usage.get("input_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    let output = usage
        .get("completion_tokens")
        .or_else(|| usage.get("output_tokens"))
        .and_then(Value::as_u64)
        .unwrap_or(0);
    Event::UsageUpdate { input_tokens: input, output_tokens: output }
}

/// Encode a single internal event into one or more raw SSE frames (each
/// already including the trailing `\n\n`) for the client's chosen shape.
pub fn encode_client_frame(client_shape: ClientShape, event: &Event, model: &str) -> String {
    match client_shape {
        ClientShape::OpenAiChat | ClientShape::OpenAiResponses => encode_openai_frame(event, model),
        ClientShape::AnthropicMessages => encode_anthropic_frame(event),
    }
}

fn sse_frame(payload: &Value) -> String {
    format!("data: {}\n\n", payload)
}

fn encode_openai_frame(event: &Event, model: &str) -> String {
    match event {
        Event::Delta(text) => sse_frame(&json!({
            "object": "chat.completion.chunk",
            "model": model,
            "choices": [{ "index": 0, "delta": { "content": text }, "finish_reason": Value::Null }],
        })),
        Event::ToolUseStart { id, name } => sse_frame(&json!({
            "object": "chat.completion.chunk",
            "model": model,
            "choices": [{
                "index": 0,
                "delta": { "tool_calls": [{ "id": id, "type": "function", "function": { "name": name, "arguments": "" } }] },
                "finish_reason": Value::Null,
            }],
        })),
        Event::ToolUseDelta { id, partial_json } => sse_frame(&json!({
            "object": "chat.completion.chunk",
            "model": model,
            "choices": [{
                "index": 0,
                "delta": { "tool_calls": [{ "id": id, "function": { "arguments": partial_json } }] },
                "finish_reason": Value::Null,
            }],
        })),
        Event::ToolUseStop { .. } => sse_frame(&json!({
            "object": "chat.completion.chunk",
            "model": model,
            "choices": [{ "index": 0, "delta": {}, "finish_reason": "tool_calls" }],
        })),
        Event::UsageUpdate { input_tokens, output_tokens } => sse_frame(&json!({
            "object": "chat.completion.chunk",
            "model": model,
            "choices": [],
            "usage": {
                "prompt_tokens": input_tokens,
                "completion_tokens": output_tokens,
                "total_tokens": input_tokens + output_tokens,
            },
        })),
        Event::Done => "data: [DONE]\n\n".to_string(),
        Event::Error(message) => sse_frame(&json!({ "error": { "message": message, "type": "upstream_error" } })),
    }
}

fn encode_anthropic_frame(event: &Event) -> String {
    match event {
        Event::Delta(text) => format!(
            "event: content_block_delta\ndata: {}\n\n",
            json!({ "type": "content_block_delta", "delta": { "type": "text_delta", "text": text } })
        ),
        Event::ToolUseStart { id, name } => format!(
            "event: content_block_start\ndata: {}\n\n",
            json!({ "type": "content_block_start", "content_block": { "type": "tool_use", "id": id, "name": name } })
        ),
        Event::ToolUseDelta { partial_json, .. } => format!(
            "event: content_block_delta\ndata: {}\n\n",
            json!({ "type": "content_block_delta", "delta": { "type": "input_json_delta", "partial_json": partial_json } })
        ),
        Event::ToolUseStop { .. } => format!(
            "event: content_block_stop\ndata: {}\n\n",
            json!({ "type": "content_block_stop" })
        ),
        Event::UsageUpdate { input_tokens, output_tokens } => format!(
            "event: message_delta\ndata: {}\n\n",
            json!({
                "type": "message_delta",
                "usage": { "input_tokens": input_tokens, "output_tokens": output_tokens },
            })
        ),
        Event::Done => format!("event: message_stop\ndata: {}\n\n", json!({ "type": "message_stop" })),
        Event::Error(message) => format!(
            "event: error\ndata: {}\n\n",
            json!({ "type": "error", "error": { "message": message } })
        ),
    }
}
