//! 推理后端抽象
//!
//! 所有后端（OpenAI 兼容 / Mock / 测试脚本）实现 Reasoner：输入完整对话，输出下一步提议。
//! 传输层失败返回 LlmError；内容为空或格式不对不是错误，由 Planner 判定并重试。

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::conversation::{ProposedAction, Turn};

/// 推理后端传输层错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LlmError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("API error {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Request timeout")]
    Timeout,
}

/// 模型原始输出的文本部分：纯文本，或结构化内容块（每块应含 "text" 字段）
#[derive(Clone, Debug, PartialEq)]
pub enum ReplyContent {
    Text(String),
    Blocks(Vec<Value>),
}

impl ReplyContent {
    /// 提取可用文本；空白或缺少 text 字段的内容块返回 None
    pub fn usable_text(&self) -> Option<String> {
        let text = match self {
            ReplyContent::Text(s) => s.trim().to_string(),
            ReplyContent::Blocks(blocks) => blocks
                .iter()
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join("\n"),
        };
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// 后端返回的一次原始回复（未校验）
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ReasonerReply {
    pub content: Option<ReplyContent>,
    pub actions: Vec<ProposedAction>,
}

impl ReasonerReply {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: Some(ReplyContent::Text(text.into())),
            actions: Vec::new(),
        }
    }

    pub fn blocks(blocks: Vec<Value>) -> Self {
        Self {
            content: Some(ReplyContent::Blocks(blocks)),
            actions: Vec::new(),
        }
    }

    pub fn action(action: ProposedAction) -> Self {
        Self {
            content: None,
            actions: vec![action],
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with_actions(mut self, actions: Vec<ProposedAction>) -> Self {
        self.actions = actions;
        self
    }
}

/// 推理后端 trait
#[async_trait]
pub trait Reasoner: Send + Sync {
    /// 根据对话给出下一步：工具调用或最终回复
    async fn next(&self, conversation: &[Turn]) -> Result<ReasonerReply, LlmError>;

    /// 后端名称（日志用）
    fn name(&self) -> &str {
        "reasoner"
    }
}
