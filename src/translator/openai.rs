//! openai-chat / openai-responses shapes, and the openai → anthropic half
//! of the translation matrix (spec.md §4.7).

use serde_json::{json, Value};

use crate::error::{GatewayError, GatewayResult};

pub fn with_model(mut body: Value, model: &str) -> Value {
    if let Some(obj) = body.as_object_mut() {
        obj.insert("model".to_string(), json!(model));
    }
    body
}

pub fn with_response_model(mut body: Value, response_model: &str) -> Value {
    if let Some(obj) = body.as_object_mut() {
        if obj.contains_key("model") {
            obj.insert("model".to_string(), json!(response_model));
        }
    }
    body
}

/// Flatten an `openai-responses` `input` list into `openai-chat` `messages`,
/// mapping `tools`/`tool_choice` through unchanged (shared shape).
pub fn responses_to_chat(body: &Value) -> GatewayResult<Value> {
    let input = body
        .get("input")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::InvalidRequest("openai-responses request missing `input`".to_string()))?;

    let messages: Vec<Value> = input
        .iter()
        .map(|item| {
            let role = item.get("role").and_then(Value::as_str).unwrap_or("user");
            let content = item.get("content").cloned().unwrap_or(Value::Null);
            json!({ "role": role, "content": content })
        })
        .collect();

    let mut chat = json!({ "messages": messages });
    let obj = chat.as_object_mut().expect("constructed as object");

    if let Some(model) = body.get("model") {
        obj.insert("model".to_string(), model.clone());
    }
    if let Some(tools) = body.get("tools") {
        obj.insert("tools".to_string(), tools.clone());
    }
    if let Some(tool_choice) = body.get("tool_choice") {
        obj.insert("tool_choice".to_string(), tool_choice.clone());
    }
    if let Some(stream) = body.get("stream") {
        obj.insert("stream".to_string(), stream.clone());
    }
    // `previous_response_id` is only meaningful to stateful providers; the
    // chat-completions upstream shape has no slot for it, so it's dropped.

    Ok(chat)
}

/// Inverse of [`responses_to_chat`]: wrap a chat-shaped response as a
/// responses-shaped one.
pub fn chat_to_responses(body: &Value) -> GatewayResult<Value> {
    let choices = body.get("choices").and_then(Value::as_array);
    let text = choices
        .and_then(|c| c.first())
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(json!({
        "id": body.get("id").cloned().unwrap_or(Value::Null),
        "object": "response",
        "model": body.get("model").cloned().unwrap_or(Value::Null),
        "output": [{
            "type": "message",
            "role": "assistant",
            "content": [{ "type": "output_text", "text": text }],
        }],
        "usage": body.get("usage").cloned().unwrap_or(Value::Null),
    }))
}

/// `openai-chat → anthropic-messages`: split `system` out of `messages`,
/// map `tool_calls` to `tool_use` blocks.
pub fn to_anthropic_messages(body: &Value) -> GatewayResult<Value> {
    let messages = body
        .get("messages")
        .and_then(Value::as_array)
        .ok_or_else(|| GatewayError::InvalidRequest("openai-chat request missing `messages`".to_string()))?;

    let mut system_parts = Vec::new();
    let mut anthropic_messages = Vec::new();

    for message in messages {
        let role = message.get("role").and_then(Value::as_str).unwrap_or("user");
        if role == "system" {
            if let Some(text) = message.get("content").and_then(Value::as_str) {
                system_parts.push(text.to_string());
            }
            continue;
        }

        if role == "tool" {
            let tool_call_id = message.get("tool_call_id").and_then(Value::as_str).unwrap_or_default();
            let content = message.get("content").and_then(Value::as_str).unwrap_or_default();
            anthropic_messages.push(json!({
                "role": "user",
                "content": [{
                    "type": "tool_result",
                    "tool_use_id": tool_call_id,
                    "content": content,
                }]
            }));
            continue;
        }

        if let Some(tool_calls) = message.get("tool_calls").and_then(Value::as_array) {
            let blocks: Vec<Value> = tool_calls
                .iter()
                .map(|call| {
                    let function = call.get("function").cloned().unwrap_or(Value::Null);
                    let args_str = function.get("arguments").and_then(Value::as_str).unwrap_or("{}");
                    let input: Value = serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
                    json!({
                        "type": "tool_use",
                        "id": call.get("id").cloned().unwrap_or(Value::Null),
                        "name": function.get("name").cloned().unwrap_or(Value::Null),
                        "input": input,
                    })
                })
                .collect();
            anthropic_messages.push(json!({ "role": "assistant", "content": blocks }));
            continue;
        }

        anthropic_messages.push(json!({
            "role": role,
            "content": message.get("content").cloned().unwrap_or(Value::Null),
        }));
    }

    let mut result = json!({
        "messages": anthropic_messages,
        "max_tokens": body.get("max_tokens").cloned().unwrap_or(json!(4096)),
    });
    let obj = result.as_object_mut().expect("constructed as object");

    if !system_parts.is_empty() {
        obj.insert("system".to_string(), json!(system_parts.join("\n\n")));
    }
    if let Some(tools) = body.get("tools") {
        obj.insert("tools".to_string(), translate_tools_to_anthropic(tools));
    }
    if let Some(stream) = body.get("stream") {
        obj.insert("stream".to_string(), stream.clone());
    }
    if let Some(temperature) = body.get("temperature") {
        obj.insert("temperature".to_string(), temperature.clone());
    }

    Ok(result)
}

fn translate_tools_to_anthropic(tools: &Value) -> Value {
    let Some(tools) = tools.as_array() else { return Value::Array(vec![]) };
    let translated: Vec<Value> = tools
        .iter()
        .map(|tool| {
            let function = tool.get("function").cloned().unwrap_or(Value::Null);
            json!({
                "name": function.get("name").cloned().unwrap_or(Value::Null),
                "description": function.get("description").cloned().unwrap_or(Value::Null),
                "input_schema": function.get("parameters").cloned().unwrap_or(json!({"type": "object"})),
            })
        })
        .collect();
    json!(translated)
}

/// `openai-chat response → anthropic-messages response`, used when the
/// client asked for the Anthropic shape but the upstream spoke OpenAI.
pub fn to_anthropic_messages_response(body: &Value) -> GatewayResult<Value> {
    let choice = body.get("choices").and_then(Value::as_array).and_then(|c| c.first());
    let message = choice.and_then(|c| c.get("message"));
    let text = message.and_then(|m| m.get("content")).and_then(Value::as_str).unwrap_or_default();
    let finish_reason = choice.and_then(|c| c.get("finish_reason")).and_then(Value::as_str).unwrap_or("stop");

    let mut content = vec![json!({ "type": "text", "text": text })];
    if let Some(tool_calls) = message.and_then(|m| m.get("tool_calls")).and_then(Value::as_array) {
        for call in tool_calls {
            let function = call.get("function").cloned().unwrap_or(Value::Null);
            let args_str = function.get("arguments").and_then(Value::as_str).unwrap_or("{}");
            let input: Value = serde_json::from_str(args_str).unwrap_or(Value::Object(Default::default()));
            content.push(json!({
                "type": "tool_use",
                "id": call.get("id").cloned().unwrap_or(Value::Null),
                "name": function.get("name").cloned().unwrap_or(Value::Null),
                "input": input,
            }));
        }
    }

    let usage = body.get("usage");
    Ok(json!({
        "id": body.get("id").cloned().unwrap_or(Value::Null),
        "type": "message",
        "role": "assistant",
        "model": body.get("model").cloned().unwrap_or(Value::Null),
        "content": content,
        "stop_reason": map_openai_finish_reason(finish_reason),
        "usage": {
            "input_tokens": usage.and_then(|u| u.get("prompt_tokens")).and_then(Value::as_u64).unwrap_or(0),
            "output_tokens": usage.and_then(|u| u.get("completion_tokens")).and_then(Value::as_u64).unwrap_or(0),
        }
    }))
}

pub fn map_openai_finish_reason(reason: &str) -> &'static str {
    match reason {
        "stop" => "end_turn",
        "length" => "max_tokens",
        "tool_calls" => "tool_use",
        "content_filter" => "stop_sequence",
        _ => "end_turn",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn splits_system_message_out_of_messages() {
        let body = json!({
            "messages": [
                {"role": "system", "content": "be terse"},
                {"role": "user", "content": "hi"},
            ]
        });
        let anthropic = to_anthropic_messages(&body).unwrap();
        assert_eq!(anthropic["system"], json!("be terse"));
        assert_eq!(anthropic["messages"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn maps_tool_calls_to_tool_use_blocks() {
        let body = json!({
            "messages": [{
                "role": "assistant",
                "tool_calls": [{
                    "id": "call_1",
                    "function": {"name": "get_weather", "arguments": "{\"city\":\"nyc\"}"}
                }]
            }]
        });
        let anthropic = to_anthropic_messages(&body).unwrap();
        let block = &anthropic["messages"][0]["content"][0];
        assert_eq!(block["type"], json!("tool_use"));
        assert_eq!(block["name"], json!("get_weather"));
        assert_eq!(block["input"]["city"], json!("nyc"));
    }

    #[test]
    fn maps_tool_role_to_tool_result() {
        let body = json!({
            "messages": [{"role": "tool", "tool_call_id": "call_1", "content": "72F"}]
        });
        let anthropic = to_anthropic_messages(&body).unwrap();
        let block = &anthropic["messages"][0]["content"][0];
        assert_eq!(block["type"], json!("tool_result"));
        assert_eq!(block["tool_use_id"], json!("call_1"));
    }

    #[test]
    fn responses_flattens_input_to_messages() {
        let body = json!({"input": [{"role": "user", "content": "hi"}], "model": "gpt-4"});
        let chat = responses_to_chat(&body).unwrap();
        assert_eq!(chat["messages"][0]["role"], json!("user"));
    }

    #[test]
    fn missing_messages_is_invalid_request() {
        let body = json!({});
        assert!(to_anthropic_messages(&body).is_err());
        assert!(responses_to_chat(&json!({})).is_err());
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(map_openai_finish_reason("tool_calls"), "tool_use");
        assert_eq!(map_openai_finish_reason("length"), "max_tokens");
        assert_eq!(map_openai_finish_reason("anything_else"), "end_turn");
    }
}
