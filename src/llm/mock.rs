//! Mock 推理后端（用于测试与本地演示，无需 API）
//!
//! - MockReasoner：回显最后一条用户消息 / 工具结果，作为最终回复
//! - ScriptedReasoner：按顺序返回预置回复，并记录每次调用看到的对话

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::conversation::Turn;
use crate::llm::{LlmError, Reasoner, ReasonerReply};

/// Mock 后端：不调用工具，直接回显
#[derive(Debug, Default)]
pub struct MockReasoner;

#[async_trait]
impl Reasoner for MockReasoner {
    async fn next(&self, conversation: &[Turn]) -> Result<ReasonerReply, LlmError> {
        let reply = match conversation.last() {
            Some(Turn::Tool(result)) => format!("Observation: {}", result.to_observation_text()),
            Some(Turn::Human { text }) => format!("Echo from Mock: {}", text),
            _ => "(no input)".to_string(),
        };
        Ok(ReasonerReply::text(reply))
    }

    fn name(&self) -> &str {
        "mock"
    }
}

/// 脚本后端：依次弹出预置回复；用尽后返回固定的最终回复
#[derive(Debug, Default)]
pub struct ScriptedReasoner {
    script: Mutex<VecDeque<Result<ReasonerReply, LlmError>>>,
    seen: Mutex<Vec<Vec<Turn>>>,
}

impl ScriptedReasoner {
    pub fn new(replies: Vec<ReasonerReply>) -> Self {
        Self::with_results(replies.into_iter().map(Ok).collect())
    }

    pub fn with_results(results: Vec<Result<ReasonerReply, LlmError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// 追加回复（测试中途补脚本）
    pub fn push(&self, reply: Result<ReasonerReply, LlmError>) {
        if let Ok(mut s) = self.script.lock() {
            s.push_back(reply);
        }
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().map(|s| s.len()).unwrap_or(0)
    }

    /// 每次调用时传入的对话快照
    pub fn seen(&self) -> Vec<Vec<Turn>> {
        self.seen.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn next(&self, conversation: &[Turn]) -> Result<ReasonerReply, LlmError> {
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(conversation.to_vec());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        next.unwrap_or_else(|| Ok(ReasonerReply::text("(script exhausted)")))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
