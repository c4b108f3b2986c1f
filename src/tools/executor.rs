//! 工具执行器
//!
//! 持有 ToolInvoker 与单次调用超时。execute(action) 永远返回 ToolResult：调用失败、超时都转为
//! ToolResult.error，让模型看到错误后自行调整，而不是中断整个会话。每次调用输出一条 JSON 审计日志。
//! 执行器本身不重试。超时的请求可能已在远端生效，错误信息中注明结果未知。

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::conversation::{ProposedAction, ToolResult};
use crate::core::ToolError;
use crate::tools::ToolInvoker;

/// 超时错误附带的说明
pub const TIMEOUT_OUTCOME_UNKNOWN: &str =
    "the request may already have been applied, outcome unknown; read the current state before retrying";

pub struct ToolExecutor {
    invoker: Arc<dyn ToolInvoker>,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(invoker: Arc<dyn ToolInvoker>, timeout_secs: u64) -> Self {
        Self {
            invoker,
            timeout: Duration::from_secs(timeout_secs),
        }
    }

    /// 执行一次动作；参数按原样传给 invoker
    pub async fn execute(&self, action: &ProposedAction) -> ToolResult {
        let start = Instant::now();
        let args_preview = args_preview(&action.arguments);
        let result = match timeout(
            self.timeout,
            self.invoker.call(&action.name, action.arguments.clone()),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(ToolError::Timeout(action.name.clone())),
        };

        let outcome = match &result {
            Ok(_) => "ok",
            Err(ToolError::Timeout(_)) => "timeout",
            Err(_) => "error",
        };
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": action.name,
            "action_id": action.id,
            "ok": result.is_ok(),
            "outcome": outcome,
            "duration_ms": start.elapsed().as_millis() as u64,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit, "tool");

        match result {
            Ok(payload) => ToolResult::ok(&action.id, payload),
            Err(e @ ToolError::Timeout(_)) => {
                tracing::warn!(tool = %action.name, error = %e, "tool call timed out");
                ToolResult::error(&action.id, format!("{e} ({TIMEOUT_OUTCOME_UNKNOWN})"))
            }
            Err(e) => {
                tracing::warn!(tool = %action.name, error = %e, "tool call failed");
                ToolResult::error(&action.id, e.to_string())
            }
        }
    }
}

fn args_preview(args: &crate::conversation::Arguments) -> String {
    let s = serde_json::Value::Object(args.clone()).to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
