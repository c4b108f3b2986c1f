//! 执行图装配
//!
//! 从 AppConfig 构建 ApprovalGraph：推理后端（OpenAI 兼容 / Mock）、Higress 工具表、
//! 敏感动作分类器、工具执行器与内存会话存储。CLI 与 HTTP 前端共用。

use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;

use crate::config::AppConfig;
use crate::core::GraphError;
use crate::higress::{register_higress_tools, HigressClient};
use crate::llm::{MockReasoner, OpenAiReasoner, Reasoner};
use crate::react::{ActionClassifier, ApprovalGraph, GraphEvent, Planner};
use crate::session::{MemorySessionStore, SessionStore};
use crate::tools::{ToolExecutor, ToolInvoker, ToolRegistry};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are an operations assistant for the Higress API gateway. \
Use the available tools to inspect and change routes, service sources and plugins. \
Inspect before you modify, make one change at a time, and answer in plain text once the task is done. \
If a tool result says an action was rejected, read the reason and adjust your plan instead of retrying blindly.";

/// 构建 Higress 工具表
pub fn build_tool_registry(cfg: &AppConfig) -> Result<ToolRegistry, GraphError> {
    let client = HigressClient::new(
        &cfg.higress.resolved_base_url(),
        cfg.higress.resolved_username(),
        cfg.higress.resolved_password(),
        cfg.tools.tool_timeout_secs,
    )
    .map_err(|e| GraphError::Config(e.to_string()))?;
    if cfg.higress.resolved_username().is_none() {
        tracing::warn!("HIGRESS_USERNAME not set, requests are sent without logging in");
    }

    let mut registry = ToolRegistry::new();
    register_higress_tools(&mut registry, Arc::new(client));
    Ok(registry)
}

/// 根据 [llm].provider 创建推理后端
pub fn create_reasoner(cfg: &AppConfig, registry: &ToolRegistry) -> Result<Arc<dyn Reasoner>, GraphError> {
    match cfg.llm.provider.to_lowercase().as_str() {
        "mock" => {
            tracing::info!("using mock reasoner");
            Ok(Arc::new(MockReasoner))
        }
        "openai" | "openrouter" => {
            let api_key = cfg.llm.resolved_api_key().ok_or_else(|| {
                GraphError::Config("no API key: set llm.api_key, OPENROUTER_API_KEY or OPENAI_API_KEY".to_string())
            })?;
            let system_prompt = cfg
                .llm
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());
            tracing::info!(model = %cfg.llm.model, base_url = %cfg.llm.base_url, "using OpenAI-compatible reasoner");
            let reasoner = OpenAiReasoner::new(
                &cfg.llm.base_url,
                &cfg.llm.model,
                &api_key,
                &system_prompt,
                registry.specs(),
                cfg.llm.request_timeout_secs,
            )
            .map_err(|e| GraphError::Config(e.to_string()))?;
            Ok(Arc::new(reasoner))
        }
        other => Err(GraphError::Config(format!("unknown llm provider: {other}"))),
    }
}

/// 用给定的推理后端与工具调用方装配执行图（测试与嵌入场景）
pub fn assemble_graph(
    cfg: &AppConfig,
    reasoner: Arc<dyn Reasoner>,
    invoker: Arc<dyn ToolInvoker>,
    store: Arc<dyn SessionStore>,
) -> ApprovalGraph {
    let planner = Planner::new(reasoner).with_max_nudge_retries(cfg.graph.max_nudge_retries);
    let classifier = ActionClassifier::new(cfg.graph.sensitive_actions.iter().cloned());
    let executor = ToolExecutor::new(invoker, cfg.tools.tool_timeout_secs);
    ApprovalGraph::new(planner, classifier, executor, store)
        .with_max_steps(cfg.graph.max_steps_per_turn)
        .with_pending_ttl(cfg.session.pending_ttl())
}

/// 按配置构建完整执行图；event_tx 可选，用于前端展示过程
pub fn build_graph(
    cfg: &AppConfig,
    event_tx: Option<UnboundedSender<GraphEvent>>,
) -> Result<ApprovalGraph, GraphError> {
    let registry = build_tool_registry(cfg)?;
    let reasoner = create_reasoner(cfg, &registry)?;
    tracing::info!(
        tools = registry.len(),
        sensitive = ?cfg.graph.sensitive_actions,
        "approval graph ready"
    );
    let store: Arc<dyn SessionStore> = Arc::new(MemorySessionStore::new());
    let graph = assemble_graph(cfg, reasoner, Arc::new(registry), store);
    Ok(match event_tx {
        Some(tx) => graph.with_event_tx(tx),
        None => graph,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::react::Classification;

    fn mock_config() -> AppConfig {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "mock".into();
        cfg
    }

    #[tokio::test]
    async fn test_build_mock_graph() {
        let graph = build_graph(&mock_config(), None).unwrap();
        assert_eq!(graph.classifier().classify("list_routes"), Classification::Safe);
        assert_eq!(graph.classifier().classify("update_route"), Classification::Sensitive);

        let reply = graph.start_or_continue(None, "hello").await.unwrap();
        assert_eq!(reply.outcome.final_text(), Some("Echo from Mock: hello"));
    }

    #[test]
    fn test_unknown_provider() {
        let mut cfg = AppConfig::default();
        cfg.llm.provider = "carrier-pigeon".into();
        let registry = ToolRegistry::new();
        assert!(matches!(create_reasoner(&cfg, &registry), Err(GraphError::Config(_))));
    }

    #[test]
    fn test_registry_has_higress_tools() {
        let registry = build_tool_registry(&mock_config()).unwrap();
        assert_eq!(registry.len(), 10);
        assert!(registry.get("update_request_block_plugin").is_some());
    }
}
