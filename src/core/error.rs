//! 执行图错误类型
//!
//! 工具失败在执行器内部转为 Observation，不会出现在这里；这里只有需要交给调用方的错误。

use thiserror::Error;

use crate::llm::LlmError;

/// 执行图对调用方暴露的错误（一次请求内致命，进程不会因此退出）
#[derive(Error, Debug)]
pub enum GraphError {
    /// 推理后端不可达或返回错误；本轮中止，对话保持调用前的状态
    #[error("Reasoner transport failure: {0}")]
    ReasonerTransport(String),

    /// 连续输出无效内容超过重试上限（与 ReasonerTransport 同级别，向上抛出）
    #[error("Reasoner produced no usable proposal after {attempts} attempts")]
    InvalidProposal { attempts: usize },

    #[error("Unknown session: {0}")]
    UnknownSession(String),

    /// 会话存在但没有待审批动作（如重复 resume）
    #[error("No pending action for session: {0}")]
    NoPendingAction(String),

    #[error("Malformed decision: {0}")]
    MalformedDecision(String),

    /// 待审批动作已超过 TTL，已按拒绝处理
    #[error("Approval expired for action: {0}")]
    ApprovalExpired(String),

    /// 会话仍在等待审批，不能接收新的用户消息
    #[error("Session is awaiting a decision on action: {0}")]
    AwaitingDecision(String),

    #[error("Step limit exceeded: {0}")]
    StepLimitExceeded(usize),

    /// 追加的 Turn 违反对话不变式（引用了不存在或已解决的动作）
    #[error("Conversation invariant violated: {0}")]
    Conversation(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl GraphError {
    /// HTTP 前端使用的状态码
    pub fn status_code(&self) -> u16 {
        match self {
            GraphError::MalformedDecision(_) => 400,
            GraphError::UnknownSession(_) => 404,
            GraphError::NoPendingAction(_) | GraphError::AwaitingDecision(_) => 409,
            GraphError::ApprovalExpired(_) => 410,
            GraphError::ReasonerTransport(_) | GraphError::InvalidProposal { .. } => 502,
            GraphError::StepLimitExceeded(_) | GraphError::Conversation(_) | GraphError::Config(_) => 500,
        }
    }
}

impl From<LlmError> for GraphError {
    fn from(err: LlmError) -> Self {
        GraphError::ReasonerTransport(err.to_string())
    }
}

/// 工具调用失败（网络、远端校验、资源不存在等），由 ToolExecutor 转为 ToolResult.error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ToolError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Request failed: {0}")]
    Remote(String),

    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// 请求可能已发出，远端是否生效未知
    #[error("Tool timeout: {0}")]
    Timeout(String),
}
