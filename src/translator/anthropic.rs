//! anthropic-messages shape, and the anthropic → openai half of the
//! translation matrix (spec.md §4.7).

use serde_json::{json, Value};

use crate::error::{GatewayError, GatewayResult};

pub fn with_model(mut body: Value, model: &str) -> Value {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("model".to_string(), json!(model));
    }
    body
}

/// `anthropic-messages → openai-chat`: fold `system` back into `messages`,
/// map `tool_use`/`tool_result` blocks to `tool_calls`/`tool` messages.
pub fn to_openai_chat(body: &Value) -> GatewayResult<Value> {
    let messages = body
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::InvalidRequest("anthropic-messages request missing `messages`".to_string()))?;

    let mut chat_messages = Vec::new();

    if let Some(system) = body.get("system").and_then(Value::as_str) {
        chat_messages.push(json!({ "role": "system", "content": system }));
    }

    for message in messages {
        let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
        let content = message.get("content");

        match content {
            Some(Value::String(text)) => {
                chat_messages.push(json!({ "role": role, "content": text }));
            }
            Some(Value::Array(blocks)) => {
                let mut text_parts = Vec::new();
                let mut tool_calls = Vec::new();

                for block in blocks {
                    match block.get("type").and_then(Value::as_str) {
                        Some("text") => {
                            if let Some(t) = block.get("text").and_then(Value::as_str) {
                                text_parts.push(t.to_string());
                            }
                        }
                        Some("tool_use") => {
                            tool_calls.push(json!({
                                "id": block.get("id").cloned().unwrap_or(Value::Null),
                                "type": "function",
                                "function": {
                                    "name": block.get("name").cloned().unwrap_or(Value::Null),
                                    "arguments": serde_json::to_string(block.get("input").unwrap_or(&Value::Null)).unwrap_or_default(),
                                }
                            }));
                        }
                        Some("tool_result") => {
                            let tool_use_id = block.get("tool_use_id").and_then(Value::as_str).unwrap_or_default();
                            let result_text = extract_tool_result_text(block);
                            chat_messages.push(json!({
                                "role": "tool",
                                "tool_call_id": tool_use_id,
                                "content": result_text,
                            }));
                        }
                        _ => {}
                    }
                }

                if !tool_calls.is_empty() {
                    chat_messages.push(json!({
                        "role": "assistant",
                        "content": if text_parts.is_empty() { Value::Null } else { json!(text_parts.join("")) },
                        "tool_calls": tool_calls,
                    }));
                } else if !text_parts.is_empty() {
                    chat_messages.push(json!({ "role": role, "content": text_parts.join("") }));
                }
            }
            _ => {}
        }
    }

    let mut result = json!({ "messages": chat_messages });
    let obj = result.as_object_mut().expect("constructed as object");

    if let Some(max_tokens) = body.get("max_tokens") {
        obj.insert("max_tokens".to_string(), max_tokens.clone());
    }
    if let Some(tools) = body.get("tools") {
        obj.insert("tools".to_string(), translate_tools_to_openai(tools));
    }
    if let Some(stream) = body.get("stream") {
        obj.insert("stream".to_string(), stream.clone());
    }
    if let Some(temperature) = body.get("temperature") {
        obj.insert("temperature".to_string(), temperature.clone());
    }

    Ok(result)
}

fn extract_tool_result_text(block: &Value) -> String {
    match block.get("content") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .join(""),
        _ => String::new(),
    }
}

fn translate_tools_to_openai(tools: &Value) -> Value {
    let Some(tools) = tools.as_array() else { return Value::Array(vec![]) };
    let translated: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "type": "function",
                "function": {
                    "name": tool.get("name").cloned().unwrap_or(Value::Null),
                    "description": tool.get("description").cloned().unwrap_or(Value::Null),
                    "parameters": tool.get("input_schema").cloned().unwrap_or(json!({"type": "object"})),
                }
            })
        })
        .collect();
    json!(translated)
}

/// `anthropic-messages response → openai-chat response`, used when the
/// upstream spoke Anthropic but the client wants the OpenAI shape.
pub fn to_openai_chat_response(body: &Value) -> GatewayResult<Value> {
    let content = body.get("content").and_then(Value::as_array);
    let mut text_parts = Vec::new();
    let mut tool_calls = Vec::new();

    if let Some(blocks) = content {
        for block in blocks {
            match block.get("type").and_then(Value::as_str) {
                Some("text") => {
                    if let Some(t) = block.get("text").and_then(Value::as_str) {
                        text_parts.push(t.to_string());
                    }
                }
                Some("tool_use") => {
                    tool_calls.push(json!({
                        "id": block.get("id").cloned().unwrap_or(Value::Null),
                        "type": "function",
                        "function": {
                            "name": block.get("name").cloned().unwrap_or(Value::Null),
                            "arguments": serde_json::to_string(block.get("input").unwrap_or(&Value::Null)).unwrap_or_default(),
                        }
                    }));
                }
                _ => {}
            }
        }
    }

    let stop_reason = body.get("stop_reason").and_then(Value::as_str).unwrap_or("end_turn");
    let mut message = json!({
        "role": "assistant",
        "content": if text_parts.is_empty() { Value::Null } else { json!(text_parts.join("")) },
    });
    if !tool_calls.is_empty() {
        message.as_object_mut().unwrap().insert("tool_calls".to_string(), json!(tool_calls));
    }

    let usage = body.get("usage");
    Ok(json!({
        "id": body.get("id").cloned().unwrap_or(Value::Null),
        "object": "chat.completion",
        "model": body.get("model").cloned().unwrap_or(Value::Null),
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": map_anthropic_stop_reason(stop_reason),
        }],
        "usage": {
            "prompt_tokens": usage.and_then(|u| u.get("input_tokens")).and_then(Value::as_u64).unwrap_or(0),
            "completion_tokens": usage.and_then(|u| u.get("output_tokens")).and_then(Value::as_u64).unwrap_or(0),
            "total_tokens": usage.and_then(|u| u.get("input_tokens")).and_then(Value::as_u64).unwrap_or(0)
                + usage.and_then(|u| u.get("output_tokens")).and_then(Value::as_u64).unwrap_or(0),
        }
    }))
}

pub fn map_anthropic_stop_reason(reason: &str) -> &'static str {
    match reason {
        "end_turn" | "stop_sequence" => "stop",
        "max_tokens" => "length",
        "tool_use" => "tool_calls",
        _ => "stop",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn folds_system_into_messages() {
        let body = json!({
            "system": "be terse",
            "messages": [{"role": "user", "content": "hi"}],
        });
        let chat = to_openai_chat(&body).unwrap();
        let messages = chat["messages"].as_array().unwrap();
        assert_eq!(messages[0]["role"], json!("system"));
        assert_eq!(messages[1]["role"], json!("user"));
    }

    #[test]
    fn maps_tool_use_block_to_tool_calls() {
        let body = json!({
            "messages": [{
                "role": "assistant",
                "content": [{"type": "tool_use", "id": "t1", "name": "lookup", "input": {"q": "x"}}]
            }]
        });
        let chat = to_openai_chat(&body).unwrap();
        let message = &chat["messages"][0];
        assert!(message["tool_calls"].is_array());
        assert_eq!(message["tool_calls"][0]["function"]["name"], json!("lookup"));
    }

    #[test]
    fn maps_tool_result_block_to_tool_message() {
        let body = json!({
            "messages": [{
                "role": "user",
                "content": [{"type": "tool_result", "tool_use_id": "t1", "content": "42"}]
            }]
        });
        let chat = to_openai_chat(&body).unwrap();
        let message = &chat["messages"][0];
        assert_eq!(message["role"], json!("tool"));
        assert_eq!(message["tool_call_id"], json!("t1"));
    }

    #[test]
    fn response_maps_stop_reason_and_usage() {
        let body = json!({
            "content": [{"type": "text", "text": "hello"}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": 10, "output_tokens": 5},
        });
        let chat = to_openai_chat_response(&body).unwrap();
        assert_eq!(chat["choices"][0]["finish_reason"], json!("stop"));
        assert_eq!(chat["usage"]["total_tokens"], json!(15));
    }

    #[test]
    fn missing_messages_is_invalid_request() {
        assert!(to_openai_chat(&json!({})).is_err());
    }
}
