//! 执行图过程事件：供 CLI / Web 展示思考、工具调用、挂起与审批结果

use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc::UnboundedSender;

use crate::react::Classification;

/// 单步过程事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GraphEvent {
    /// 正在调用推理后端
    Thinking { step: usize },
    /// 输出无效，追加提示后重试
    Nudge { attempt: usize },
    /// 模型提出动作（只路由第一个）
    ActionProposed {
        action_id: String,
        name: String,
        arguments: Value,
        classification: Classification,
    },
    /// 工具返回（预览）
    ToolResult {
        action_id: String,
        name: String,
        is_error: bool,
        preview: String,
    },
    /// 挂起等待人工审批
    Suspended { action_id: String, name: String },
    /// 人工批准
    Approved { action_id: String },
    /// 人工拒绝（或审批过期）
    Rejected { action_id: String, reason: String },
    /// 最终回复
    Final { text: String },
    Error { text: String },
}

pub(crate) fn send_event(tx: &Option<UnboundedSender<GraphEvent>>, ev: GraphEvent) {
    if let Some(t) = tx {
        let _ = t.send(ev);
    }
}
