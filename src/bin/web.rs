//! Gateguard HTTP 审批接口
//!
//! 启动: cargo run --bin gateguard-web --features web
//!
//! - POST /api/chat                       {session_id?, message}
//! - POST /api/sessions/:id/decision      {decision: "approve"|"reject", reason?, action_id?}
//! - GET  /api/sessions/:id               会话快照（对话 + 待审批动作）
//! - GET  /api/health

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;

use gateguard::agent::build_graph;
use gateguard::config::load_config;
use gateguard::core::GraphError;
use gateguard::react::{ApprovalGraph, Decision, TurnReply};
use gateguard::session::{Session, SessionStore};

struct AppState {
    graph: ApprovalGraph,
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    message: String,
    #[serde(default)]
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DecisionRequest {
    decision: String,
    #[serde(default)]
    reason: Option<String>,
    /// 可选：要求当前挂起的正是该动作
    #[serde(default)]
    action_id: Option<String>,
}

impl DecisionRequest {
    fn to_decision(&self) -> Result<Decision, GraphError> {
        match self.decision.trim().to_lowercase().as_str() {
            "approve" => Ok(Decision::Approve),
            "reject" => Ok(Decision::reject(self.reason.clone().unwrap_or_default())),
            other => Err(GraphError::MalformedDecision(format!(
                "decision must be approve or reject, got {other:?}"
            ))),
        }
    }
}

type ApiError = (StatusCode, String);

fn api_error(err: GraphError) -> ApiError {
    let status = StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    if status.is_server_error() {
        tracing::error!(error = %err, "request failed");
    }
    (status, err.to_string())
}

async fn api_chat(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ChatRequest>,
) -> Result<Json<TurnReply>, ApiError> {
    let message = req.message.trim();
    if message.is_empty() {
        return Err((StatusCode::BAD_REQUEST, "message is required".to_string()));
    }
    state
        .graph
        .start_or_continue(req.session_id.as_deref(), message)
        .await
        .map(Json)
        .map_err(api_error)
}

async fn api_decision(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(req): Json<DecisionRequest>,
) -> Result<Json<TurnReply>, ApiError> {
    let decision = req.to_decision().map_err(api_error)?;
    let result = match req.action_id.as_deref() {
        Some(action_id) => state.graph.resume_action(&session_id, action_id, decision).await,
        None => state.graph.resume(&session_id, decision).await,
    };
    result.map(Json).map_err(api_error)
}

async fn api_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state
        .graph
        .session(&session_id)
        .await
        .map(Json)
        .ok_or_else(|| api_error(GraphError::UnknownSession(session_id)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    gateguard::observability::init();

    let cfg = load_config(None)?;
    let graph = build_graph(&cfg, None)?;
    let state = Arc::new(AppState { graph });

    // 定期清理审批超时或长时间空闲的会话
    let reap_state = Arc::clone(&state);
    let reap_every = cfg.session.reap_interval();
    let idle_ttl = cfg.session.idle_ttl();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(reap_every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let pending_ttl = reap_state.graph.pending_ttl();
            reap_state
                .graph
                .store()
                .reap_expired(pending_ttl, idle_ttl)
                .await;
        }
    });

    let app = Router::new()
        .route("/api/chat", post(api_chat))
        .route("/api/sessions/:id", get(api_session))
        .route("/api/sessions/:id/decision", post(api_decision))
        .route("/api/health", get(|| async { "OK" }))
        .with_state(Arc::clone(&state));

    let port = std::env::var("GATEGUARD_WEB_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(cfg.web.port);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Gateguard API: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
