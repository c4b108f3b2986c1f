//! 对话状态：只追加的 Turn 序列
//!
//! Human / Assistant / Tool 三种 Turn，追加后不可变。每个 ToolResult 必须指向之前某个
//! 尚未解决的 ProposedAction，push_tool_result 负责检查这一点。

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::core::GraphError;

/// 工具参数：字符串键到任意 JSON 值
pub type Arguments = Map<String, Value>;

/// 新的动作 id
pub fn new_action_id() -> String {
    format!("call_{}", uuid::Uuid::new_v4().simple())
}

/// 模型提出的一次工具调用
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProposedAction {
    /// 对话内唯一
    pub id: String,
    pub name: String,
    pub arguments: Arguments,
}

impl ProposedAction {
    pub fn new(name: impl Into<String>, arguments: Arguments) -> Self {
        Self {
            id: new_action_id(),
            name: name.into(),
            arguments,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// 工具失败信息
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
}

/// 工具结果：成功载荷或错误信息，二选一
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolOutcome {
    Payload(Value),
    Error(ErrorInfo),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    pub action_id: String,
    pub outcome: ToolOutcome,
}

impl ToolResult {
    pub fn ok(action_id: impl Into<String>, payload: Value) -> Self {
        Self {
            action_id: action_id.into(),
            outcome: ToolOutcome::Payload(payload),
        }
    }

    pub fn error(action_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            action_id: action_id.into(),
            outcome: ToolOutcome::Error(ErrorInfo {
                message: message.into(),
            }),
        }
    }

    /// 人工拒绝：作为载荷（而非错误）注入，让模型看到拒绝理由后重新规划
    pub fn rejected(action_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ok(
            action_id,
            serde_json::json!({ "rejected": true, "reason": reason.into() }),
        )
    }

    pub fn payload(&self) -> Option<&Value> {
        match &self.outcome {
            ToolOutcome::Payload(v) => Some(v),
            ToolOutcome::Error(_) => None,
        }
    }

    pub fn error_info(&self) -> Option<&ErrorInfo> {
        match &self.outcome {
            ToolOutcome::Error(e) => Some(e),
            ToolOutcome::Payload(_) => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Error(_))
    }

    pub fn is_rejection(&self) -> bool {
        self.payload()
            .and_then(|p| p.get("rejected"))
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// 发给模型的文本形式；错误附带修正提示
    pub fn to_observation_text(&self) -> String {
        match &self.outcome {
            ToolOutcome::Payload(Value::String(s)) => s.clone(),
            ToolOutcome::Payload(v) => v.to_string(),
            ToolOutcome::Error(e) => format!("Error: {}\nPlease correct your error.", e.message),
        }
    }
}

/// 模型的一次输出：可选文本 + 有序的工具调用列表；无调用即最终回复
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantProposal {
    pub text: Option<String>,
    pub actions: Vec<ProposedAction>,
}

impl AssistantProposal {
    pub fn with_actions(text: Option<String>, actions: Vec<ProposedAction>) -> Self {
        Self { text, actions }
    }

    pub fn is_final(&self) -> bool {
        self.actions.is_empty()
    }
}

/// 对话中的一轮
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum Turn {
    Human { text: String },
    Assistant(AssistantProposal),
    Tool(ToolResult),
}

impl Turn {
    pub fn human(text: impl Into<String>) -> Self {
        Turn::Human { text: text.into() }
    }
}

/// 只追加的对话；会话之间传递的唯一事实来源
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    turns: Vec<Turn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn push_human(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::human(text));
    }

    /// 追加模型提议；动作 id 在整段对话内必须唯一
    pub fn push_proposal(&mut self, proposal: AssistantProposal) -> Result<(), GraphError> {
        for (i, action) in proposal.actions.iter().enumerate() {
            let dup_in_proposal = proposal.actions[..i].iter().any(|a| a.id == action.id);
            if dup_in_proposal || self.find_action(&action.id).is_some() {
                return Err(GraphError::Conversation(format!(
                    "duplicate action id '{}'",
                    action.id
                )));
            }
        }
        self.turns.push(Turn::Assistant(proposal));
        Ok(())
    }

    /// 追加工具结果；action_id 必须指向尚未解决的动作
    pub fn push_tool_result(&mut self, result: ToolResult) -> Result<(), GraphError> {
        if self.find_action(&result.action_id).is_none() {
            return Err(GraphError::Conversation(format!(
                "tool result for unknown action '{}'",
                result.action_id
            )));
        }
        if self.is_resolved(&result.action_id) {
            return Err(GraphError::Conversation(format!(
                "action '{}' already resolved",
                result.action_id
            )));
        }
        self.turns.push(Turn::Tool(result));
        Ok(())
    }

    pub fn find_action(&self, action_id: &str) -> Option<&ProposedAction> {
        self.turns.iter().find_map(|t| match t {
            Turn::Assistant(p) => p.actions.iter().find(|a| a.id == action_id),
            _ => None,
        })
    }

    pub fn is_resolved(&self, action_id: &str) -> bool {
        self.turns
            .iter()
            .any(|t| matches!(t, Turn::Tool(r) if r.action_id == action_id))
    }

    /// 尚未得到 ToolResult 的动作，按提出顺序
    pub fn unresolved_actions(&self) -> Vec<&ProposedAction> {
        self.turns
            .iter()
            .filter_map(|t| match t {
                Turn::Assistant(p) => Some(p.actions.iter()),
                _ => None,
            })
            .flatten()
            .filter(|a| !self.is_resolved(&a.id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn args(v: Value) -> Arguments {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_tool_result_must_reference_proposed_action() {
        let mut conv = Conversation::new();
        conv.push_human("list routes");
        let err = conv
            .push_tool_result(ToolResult::ok("call_missing", json!([])))
            .unwrap_err();
        assert!(matches!(err, GraphError::Conversation(_)));
        assert_eq!(conv.len(), 1);
    }

    #[test]
    fn test_action_resolved_only_once() {
        let mut conv = Conversation::new();
        let action = ProposedAction::new("list_routes", Arguments::new()).with_id("a1");
        conv.push_proposal(AssistantProposal::with_actions(None, vec![action]))
            .unwrap();
        assert_eq!(conv.unresolved_actions().len(), 1);

        conv.push_tool_result(ToolResult::ok("a1", json!({"data": []})))
            .unwrap();
        assert!(conv.unresolved_actions().is_empty());

        let again = conv.push_tool_result(ToolResult::rejected("a1", "no"));
        assert!(again.is_err());
    }

    #[test]
    fn test_duplicate_action_ids_rejected() {
        let mut conv = Conversation::new();
        let a = ProposedAction::new("get_route", args(json!({"name": "r1"}))).with_id("dup");
        conv.push_proposal(AssistantProposal::with_actions(None, vec![a.clone()]))
            .unwrap();
        assert!(conv
            .push_proposal(AssistantProposal::with_actions(None, vec![a]))
            .is_err());
    }

    #[test]
    fn test_rejection_payload_shape() {
        let r = ToolResult::rejected("a1", "wrong code, use 401");
        assert!(r.is_rejection());
        assert!(!r.is_error());
        assert_eq!(
            r.payload(),
            Some(&json!({"rejected": true, "reason": "wrong code, use 401"}))
        );
    }

    #[test]
    fn test_error_observation_text() {
        let r = ToolResult::error("a1", "Resource not found: /v1/routes/x");
        assert!(r.to_observation_text().starts_with("Error: Resource not found"));
        assert_eq!(
            r.error_info().map(|e| e.message.as_str()),
            Some("Resource not found: /v1/routes/x")
        );
    }

    #[test]
    fn test_turn_serde_tagging() {
        let turn = Turn::human("hi");
        let v = serde_json::to_value(&turn).unwrap();
        assert_eq!(v, json!({"role": "human", "text": "hi"}));
        let back: Turn = serde_json::from_value(v).unwrap();
        assert_eq!(back, turn);
    }
}
