//! OpenAI 兼容 Chat Completions 后端
//!
//! 通过 reqwest 调用任意 OpenAI 兼容端点（默认 OpenRouter）；把对话映射为
//! user / assistant(tool_calls) / tool(tool_call_id) 消息，并把注册表中的工具作为 function tools 发送。

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::conversation::{Arguments, ProposedAction, Turn};
use crate::llm::{LlmError, Reasoner, ReasonerReply, ReplyContent};
use crate::tools::ToolSpec;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireFunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireToolCall {
    #[serde(default)]
    id: String,
    #[serde(rename = "type", default = "function_type")]
    call_type: String,
    function: WireFunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<WireToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl WireMessage {
    fn plain(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: Some(Value::String(content.into())),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Serialize)]
struct WireTool<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: &'a ToolSpec,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool<'a>>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

/// OpenAI 兼容后端：持有 HTTP 客户端、模型名、system prompt 与工具描述
pub struct OpenAiReasoner {
    http: Client,
    base_url: String,
    api_key: String,
    model: String,
    system_prompt: String,
    tools: Vec<ToolSpec>,
}

impl OpenAiReasoner {
    pub fn new(
        base_url: &str,
        model: &str,
        api_key: &str,
        system_prompt: &str,
        tools: Vec<ToolSpec>,
        timeout_secs: u64,
    ) -> Result<Self, LlmError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| LlmError::Http(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            system_prompt: system_prompt.to_string(),
            tools,
        })
    }

    fn to_wire_messages(&self, conversation: &[Turn]) -> Vec<WireMessage> {
        let mut messages = Vec::with_capacity(conversation.len() + 1);
        if !self.system_prompt.is_empty() {
            messages.push(WireMessage::plain("system", self.system_prompt.clone()));
        }
        messages.extend(conversation.iter().map(turn_to_wire));
        messages
    }
}

fn turn_to_wire(turn: &Turn) -> WireMessage {
    match turn {
        Turn::Human { text } => WireMessage::plain("user", text.clone()),
        Turn::Assistant(p) => {
            let tool_calls: Vec<WireToolCall> = p
                .actions
                .iter()
                .map(|a| WireToolCall {
                    id: a.id.clone(),
                    call_type: function_type(),
                    function: WireFunctionCall {
                        name: a.name.clone(),
                        arguments: Value::Object(a.arguments.clone()).to_string(),
                    },
                })
                .collect();
            WireMessage {
                role: "assistant".to_string(),
                content: p.text.clone().map(Value::String),
                tool_calls: if tool_calls.is_empty() {
                    None
                } else {
                    Some(tool_calls)
                },
                tool_call_id: None,
            }
        }
        Turn::Tool(r) => WireMessage {
            role: "tool".to_string(),
            content: Some(Value::String(r.to_observation_text())),
            tool_calls: None,
            tool_call_id: Some(r.action_id.clone()),
        },
    }
}

/// 解析 function.arguments；不是 JSON 对象时保留原文到 `_raw`，让工具侧报参数错误
fn parse_arguments(raw: &str) -> Arguments {
    if raw.trim().is_empty() {
        return Arguments::new();
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => map,
        _ => {
            let mut map = Arguments::new();
            map.insert("_raw".to_string(), Value::String(raw.to_string()));
            map
        }
    }
}

fn reply_from_wire(message: WireMessage) -> ReasonerReply {
    let content = match message.content {
        Some(Value::String(s)) => Some(ReplyContent::Text(s)),
        Some(Value::Array(blocks)) => Some(ReplyContent::Blocks(blocks)),
        Some(Value::Null) | None => None,
        Some(other) => Some(ReplyContent::Blocks(vec![other])),
    };
    let actions = message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|tc| {
            ProposedAction::new(tc.function.name, parse_arguments(&tc.function.arguments))
                .with_id(tc.id)
        })
        .collect();
    ReasonerReply { content, actions }
}

#[async_trait]
impl Reasoner for OpenAiReasoner {
    async fn next(&self, conversation: &[Turn]) -> Result<ReasonerReply, LlmError> {
        let request = ChatRequest {
            model: &self.model,
            messages: self.to_wire_messages(conversation),
            tools: self
                .tools
                .iter()
                .map(|t| WireTool {
                    tool_type: "function",
                    function: t,
                })
                .collect(),
        };

        let url = format!("{}/chat/completions", self.base_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    LlmError::Timeout
                } else {
                    LlmError::Http(e.to_string())
                }
            })?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| LlmError::Http(format!("read body: {e}")))?;
        if !status.is_success() {
            return Err(LlmError::Api {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Decode(e.to_string()))?;
        let message = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message)
            .ok_or_else(|| LlmError::Decode("response has no choices".to_string()))?;
        Ok(reply_from_wire(message))
    }

    fn name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::{AssistantProposal, ToolResult};
    use serde_json::json;

    #[test]
    fn test_tool_call_round_trip_through_wire() {
        let msg: WireMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_1",
                "type": "function",
                "function": {"name": "update_request_block_plugin", "arguments": "{\"configurations\":{\"blocked_code\":403}}"}
            }]
        }))
        .unwrap();
        let reply = reply_from_wire(msg);
        assert!(reply.content.is_none());
        assert_eq!(reply.actions.len(), 1);
        assert_eq!(reply.actions[0].id, "call_1");
        assert_eq!(reply.actions[0].arguments["configurations"]["blocked_code"], 403);
    }

    #[test]
    fn test_tool_call_without_id_still_parses() {
        let msg: WireMessage = serde_json::from_value(json!({
            "role": "assistant",
            "tool_calls": [{"function": {"name": "list_routes", "arguments": "{}"}}]
        }))
        .unwrap();
        let reply = reply_from_wire(msg);
        assert_eq!(reply.actions.len(), 1);
        assert!(reply.actions[0].id.is_empty());
    }

    #[test]
    fn test_bad_arguments_preserved_raw() {
        let args = parse_arguments("{not json");
        assert_eq!(args["_raw"], "{not json");
        assert!(parse_arguments("").is_empty());
    }

    #[test]
    fn test_conversation_to_wire() {
        let action = ProposedAction::new("list_routes", Arguments::new()).with_id("c1");
        let turns = vec![
            Turn::human("show routes"),
            Turn::Assistant(AssistantProposal::with_actions(None, vec![action])),
            Turn::Tool(ToolResult::ok("c1", json!({"data": []}))),
        ];
        let wire: Vec<WireMessage> = turns.iter().map(turn_to_wire).collect();
        assert_eq!(wire[0].role, "user");
        assert_eq!(wire[1].tool_calls.as_ref().unwrap()[0].function.arguments, "{}");
        assert_eq!(wire[2].role, "tool");
        assert_eq!(wire[2].tool_call_id.as_deref(), Some("c1"));
    }

    #[test]
    fn test_array_content_becomes_blocks() {
        let msg: WireMessage = serde_json::from_value(json!({
            "role": "assistant",
            "content": [{"type": "text"}]
        }))
        .unwrap();
        let reply = reply_from_wire(msg);
        assert!(matches!(reply.content, Some(ReplyContent::Blocks(_))));
    }
}
