//! Planner：包装推理后端，校验输出并在无效时追加提示重试
//!
//! 无效输出 = 没有工具调用，且文本为空或格式不对（如内容块缺少 text 字段）。
//! 提示只追加在对话的本地副本上，真实对话中只会出现最终的有效提议。重试有上限。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::conversation::{new_action_id, AssistantProposal, Conversation, Turn};
use crate::core::GraphError;
use crate::llm::{Reasoner, ReasonerReply};
use crate::react::events::{send_event, GraphEvent};

/// 无效输出后追加的提示
pub const NUDGE_PROMPT: &str =
    "Please provide a concrete response: call one of the available tools or answer in plain text.";

/// 默认重试上限（首次调用之外）
pub const DEFAULT_MAX_NUDGE_RETRIES: usize = 3;

/// 校验原始回复；有效则转为 AssistantProposal
pub fn validate_reply(reply: ReasonerReply) -> Option<AssistantProposal> {
    let text = reply.content.as_ref().and_then(|c| c.usable_text());
    if reply.actions.is_empty() && text.is_none() {
        return None;
    }
    Some(AssistantProposal::with_actions(text, reply.actions))
}

/// 动作 id 为空或与对话中已有动作重复时换成新的 id
///
/// 部分 OpenAI 兼容后端每次都返回相同的 tool_call id（如 `call_0`）或空 id。
/// 发回后端的也是改写后的 id。
pub fn assign_unique_ids(proposal: &mut AssistantProposal, conversation: &Conversation) {
    for i in 0..proposal.actions.len() {
        let (earlier, rest) = proposal.actions.split_at_mut(i);
        let action = &mut rest[0];
        let taken = action.id.trim().is_empty()
            || conversation.find_action(&action.id).is_some()
            || earlier.iter().any(|a| a.id == action.id);
        if taken {
            let fresh = new_action_id();
            tracing::debug!(from = %action.id, to = %fresh, "reassigned action id");
            action.id = fresh;
        }
    }
}

pub struct Planner {
    reasoner: Arc<dyn Reasoner>,
    max_nudge_retries: usize,
}

impl Planner {
    pub fn new(reasoner: Arc<dyn Reasoner>) -> Self {
        Self {
            reasoner,
            max_nudge_retries: DEFAULT_MAX_NUDGE_RETRIES,
        }
    }

    pub fn with_max_nudge_retries(mut self, retries: usize) -> Self {
        self.max_nudge_retries = retries;
        self
    }

    pub async fn propose(&self, conversation: &Conversation) -> Result<AssistantProposal, GraphError> {
        self.propose_with_events(conversation, &None).await
    }

    /// 调用推理后端直到得到有效提议；不修改传入的对话
    ///
    /// 返回的提议中动作 id 在对话内唯一。
    /// 传输层错误立即返回 ReasonerTransport；超过重试上限返回 InvalidProposal。
    pub async fn propose_with_events(
        &self,
        conversation: &Conversation,
        event_tx: &Option<UnboundedSender<GraphEvent>>,
    ) -> Result<AssistantProposal, GraphError> {
        // 第一次无效时才复制对话
        let mut local: Option<Vec<Turn>> = None;
        let attempts = self.max_nudge_retries + 1;

        for attempt in 1..=attempts {
            let turns: &[Turn] = local.as_deref().unwrap_or(conversation.turns());
            let reply = self.reasoner.next(turns).await.map_err(|e| {
                tracing::warn!(reasoner = %self.reasoner.name(), error = %e, "reasoner call failed");
                GraphError::from(e)
            })?;

            if let Some(mut proposal) = validate_reply(reply) {
                assign_unique_ids(&mut proposal, conversation);
                return Ok(proposal);
            }

            tracing::debug!(attempt, "invalid proposal, nudging");
            if attempt < attempts {
                send_event(event_tx, GraphEvent::Nudge { attempt });
                local
                    .get_or_insert_with(|| conversation.turns().to_vec())
                    .push(Turn::human(NUDGE_PROMPT));
            }
        }

        tracing::warn!(attempts, "reasoner never produced a usable proposal");
        Err(GraphError::InvalidProposal { attempts })
    }
}
