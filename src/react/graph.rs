//! 可中断执行图：Reasoning → Routing → (ExecutingSafe | AwaitingApproval) → …
//!
//! 两个入口：
//! - start_or_continue：追加用户消息，从 Reasoning 开始，直到 Terminal 或 AwaitingApproval
//! - resume：对挂起的敏感动作给出 Approve / Reject，执行或注入拒绝后继续同一循环
//!
//! 挂起点只有一个：进入 AwaitingApproval。挂起时把 pending 写入 Session 并返回调用方。
//! 每次调用：取会话锁 → 从 SessionStore 读最新检查点 → 驱动状态机 → 写回（失败时写回已完成的部分）。
//! start_or_continue 在第一步推理就失败时不写入本次用户消息；新建的会话也不会保存。

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::UnboundedSender;

use crate::conversation::{ProposedAction, ToolResult};
use crate::core::GraphError;
use crate::react::events::{send_event, GraphEvent};
use crate::react::{ActionClassifier, Classification, Planner};
use crate::session::{generate_session_id, Session, SessionId, SessionLocks, SessionStore};
use crate::tools::ToolExecutor;

/// 单次外部调用内最大 Reasoning 步数，防止死循环
pub const DEFAULT_MAX_STEPS_PER_TURN: usize = 25;
/// 待审批动作默认有效期
pub const DEFAULT_PENDING_TTL: Duration = Duration::from_secs(3600);

/// 非首个动作的统一处理结果
const SKIPPED_ACTION_MESSAGE: &str =
    "skipped: only one action is executed per turn, propose it again if still needed";
const EXPIRED_REASON: &str = "approval expired";

/// 人工审批结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum Decision {
    Approve,
    Reject { reason: String },
}

impl Decision {
    pub fn reject(reason: impl Into<String>) -> Self {
        Decision::Reject {
            reason: reason.into(),
        }
    }

    /// 解析操作员输入：y/yes/approve 批准；n/no 拒绝；其他非空文本作为拒绝理由
    pub fn parse(input: &str) -> Result<Decision, GraphError> {
        let trimmed = input.trim();
        match trimmed.to_lowercase().as_str() {
            "" => Err(GraphError::MalformedDecision("empty decision".to_string())),
            "y" | "yes" | "approve" | "approved" => Ok(Decision::Approve),
            "n" | "no" | "reject" => Ok(Decision::reject("rejected by operator")),
            _ => Ok(Decision::reject(trimmed)),
        }
    }

    fn validate(&self) -> Result<(), GraphError> {
        match self {
            Decision::Reject { reason } if reason.trim().is_empty() => Err(
                GraphError::MalformedDecision("reject requires a reason".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

/// 一次外部调用的结果：最终回复，或挂起待审批
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum TurnOutcome {
    Final { text: String },
    Suspended { proposed_action: ProposedAction },
}

impl TurnOutcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self, TurnOutcome::Suspended { .. })
    }

    pub fn final_text(&self) -> Option<&str> {
        match self {
            TurnOutcome::Final { text } => Some(text),
            TurnOutcome::Suspended { .. } => None,
        }
    }

    pub fn proposed_action(&self) -> Option<&ProposedAction> {
        match self {
            TurnOutcome::Suspended { proposed_action } => Some(proposed_action),
            TurnOutcome::Final { .. } => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnReply {
    pub session_id: SessionId,
    #[serde(flatten)]
    pub outcome: TurnOutcome,
}

/// 状态机状态；携带动作的状态把动作按值带到下一步
#[derive(Debug)]
enum GraphState {
    Reasoning,
    RoutingAction(ProposedAction),
    ExecutingSafe(ProposedAction),
    AwaitingApproval(ProposedAction),
    ExecutingApproved(ProposedAction),
    InjectingRejection(ProposedAction, String),
    Terminal(String),
}

pub struct ApprovalGraph {
    planner: Planner,
    classifier: ActionClassifier,
    executor: ToolExecutor,
    store: Arc<dyn SessionStore>,
    locks: SessionLocks,
    max_steps_per_turn: usize,
    pending_ttl: Duration,
    event_tx: Option<UnboundedSender<GraphEvent>>,
}

impl ApprovalGraph {
    pub fn new(
        planner: Planner,
        classifier: ActionClassifier,
        executor: ToolExecutor,
        store: Arc<dyn SessionStore>,
    ) -> Self {
        Self {
            planner,
            classifier,
            executor,
            store,
            locks: SessionLocks::new(),
            max_steps_per_turn: DEFAULT_MAX_STEPS_PER_TURN,
            pending_ttl: DEFAULT_PENDING_TTL,
            event_tx: None,
        }
    }

    pub fn with_max_steps(mut self, steps: usize) -> Self {
        self.max_steps_per_turn = steps.max(1);
        self
    }

    pub fn with_pending_ttl(mut self, ttl: Duration) -> Self {
        self.pending_ttl = ttl;
        self
    }

    pub fn with_event_tx(mut self, tx: UnboundedSender<GraphEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn classifier(&self) -> &ActionClassifier {
        &self.classifier
    }

    pub fn pending_ttl(&self) -> Duration {
        self.pending_ttl
    }

    /// 当前会话快照（只读）
    pub async fn session(&self, session_id: &str) -> Option<Session> {
        self.store.load(session_id).await
    }

    /// 追加用户消息并驱动状态机；session_id 为空时生成新会话
    pub async fn start_or_continue(
        &self,
        session_id: Option<&str>,
        human_text: &str,
    ) -> Result<TurnReply, GraphError> {
        let session_id = match session_id {
            Some(id) if !id.trim().is_empty() => id.to_string(),
            _ => generate_session_id(),
        };
        let _guard = self.locks.acquire(&session_id).await;

        let mut session = match self.store.load(&session_id).await {
            Some(s) => s,
            None => {
                tracing::info!(session = %session_id, "creating session");
                Session::new(session_id.clone())
            }
        };
        if let Some(pending) = session.pending_action() {
            return Err(GraphError::AwaitingDecision(pending.id.clone()));
        }

        session.conversation.push_human(human_text);
        session.touch();
        let appended = session.conversation.len();

        let result = self.drive(&mut session, GraphState::Reasoning).await;
        if result.is_err() && session.conversation.len() == appended {
            // 第一步推理就失败：不写回，存储中仍是调用前的检查点
            tracing::debug!(session = %session_id, "turn failed before any step, nothing saved");
        } else {
            self.store.save(session).await;
        }
        result.map(|outcome| TurnReply {
            session_id,
            outcome,
        })
    }

    /// 对挂起的动作给出审批结果并继续
    pub async fn resume(&self, session_id: &str, decision: Decision) -> Result<TurnReply, GraphError> {
        self.resume_inner(session_id, None, decision).await
    }

    /// 同 resume，但要求当前挂起的正是 action_id，防止过期的审批落到新的挂起动作上
    pub async fn resume_action(
        &self,
        session_id: &str,
        action_id: &str,
        decision: Decision,
    ) -> Result<TurnReply, GraphError> {
        self.resume_inner(session_id, Some(action_id), decision).await
    }

    async fn resume_inner(
        &self,
        session_id: &str,
        expected_action: Option<&str>,
        decision: Decision,
    ) -> Result<TurnReply, GraphError> {
        decision.validate()?;
        let _guard = self.locks.acquire(session_id).await;

        let mut session = self
            .store
            .load(session_id)
            .await
            .ok_or_else(|| GraphError::UnknownSession(session_id.to_string()))?;

        let pending_id = match session.pending_action() {
            Some(a) => a.id.clone(),
            None => return Err(GraphError::NoPendingAction(session_id.to_string())),
        };
        if let Some(expected) = expected_action {
            if expected != pending_id {
                return Err(GraphError::NoPendingAction(format!(
                    "{session_id} (action {expected} is not pending)"
                )));
            }
        }

        if session.pending_expired(self.pending_ttl, Utc::now()) {
            if let Some(action) = session.take_pending() {
                tracing::info!(session = %session_id, action = %action.id, "approval expired");
                send_event(
                    &self.event_tx,
                    GraphEvent::Rejected {
                        action_id: action.id.clone(),
                        reason: EXPIRED_REASON.to_string(),
                    },
                );
                session
                    .conversation
                    .push_tool_result(ToolResult::rejected(&action.id, EXPIRED_REASON))?;
            }
            self.store.save(session).await;
            return Err(GraphError::ApprovalExpired(pending_id));
        }

        let action = match session.pending_action() {
            Some(a) => a.clone(),
            None => return Err(GraphError::NoPendingAction(session_id.to_string())),
        };
        let next = match decision {
            Decision::Approve => {
                tracing::info!(session = %session_id, action = %action.id, tool = %action.name, "action approved");
                send_event(
                    &self.event_tx,
                    GraphEvent::Approved {
                        action_id: action.id.clone(),
                    },
                );
                GraphState::ExecutingApproved(action)
            }
            Decision::Reject { reason } => {
                tracing::info!(session = %session_id, action = %action.id, %reason, "action rejected");
                send_event(
                    &self.event_tx,
                    GraphEvent::Rejected {
                        action_id: action.id.clone(),
                        reason: reason.clone(),
                    },
                );
                GraphState::InjectingRejection(action, reason)
            }
        };

        let result = self.drive(&mut session, next).await;
        self.store.save(session).await;
        result.map(|outcome| TurnReply {
            session_id: session_id.to_string(),
            outcome,
        })
    }

    /// 平铺循环驱动状态机，直到 Terminal 或 AwaitingApproval
    ///
    /// 出错时会话停在最后一个一致点：失败的推理调用不会留下任何 Turn。
    async fn drive(&self, session: &mut Session, start: GraphState) -> Result<TurnOutcome, GraphError> {
        let mut state = start;
        let mut steps = 0usize;

        loop {
            tracing::debug!(session = %session.id, state = %state_name(&state), "transition");
            state = match state {
                GraphState::Reasoning => {
                    if steps >= self.max_steps_per_turn {
                        send_event(
                            &self.event_tx,
                            GraphEvent::Error {
                                text: format!("step limit {} reached", self.max_steps_per_turn),
                            },
                        );
                        return Err(GraphError::StepLimitExceeded(self.max_steps_per_turn));
                    }
                    steps += 1;
                    send_event(&self.event_tx, GraphEvent::Thinking { step: steps });

                    let proposal = match self
                        .planner
                        .propose_with_events(&session.conversation, &self.event_tx)
                        .await
                    {
                        Ok(p) => p,
                        Err(e) => {
                            send_event(&self.event_tx, GraphEvent::Error { text: e.to_string() });
                            return Err(e);
                        }
                    };

                    if proposal.is_final() {
                        let text = proposal.text.clone().unwrap_or_default();
                        session.conversation.push_proposal(proposal)?;
                        GraphState::Terminal(text)
                    } else {
                        let mut actions = proposal.actions.clone().into_iter();
                        session.conversation.push_proposal(proposal)?;
                        let first = match actions.next() {
                            Some(a) => a,
                            None => return Err(GraphError::Conversation("proposal lost its actions".into())),
                        };
                        for extra in actions {
                            tracing::debug!(action = %extra.id, tool = %extra.name, "skipping non-first action");
                            session
                                .conversation
                                .push_tool_result(ToolResult::error(&extra.id, SKIPPED_ACTION_MESSAGE))?;
                        }
                        GraphState::RoutingAction(first)
                    }
                }

                GraphState::RoutingAction(action) => {
                    let classification = self.classifier.classify(&action.name);
                    send_event(
                        &self.event_tx,
                        GraphEvent::ActionProposed {
                            action_id: action.id.clone(),
                            name: action.name.clone(),
                            arguments: serde_json::Value::Object(action.arguments.clone()),
                            classification,
                        },
                    );
                    match classification {
                        Classification::Safe => GraphState::ExecutingSafe(action),
                        Classification::Sensitive => GraphState::AwaitingApproval(action),
                    }
                }

                GraphState::ExecutingSafe(action) => {
                    self.execute_and_record(session, &action).await?;
                    GraphState::Reasoning
                }

                GraphState::AwaitingApproval(action) => {
                    tracing::info!(session = %session.id, action = %action.id, tool = %action.name, "suspended for approval");
                    send_event(
                        &self.event_tx,
                        GraphEvent::Suspended {
                            action_id: action.id.clone(),
                            name: action.name.clone(),
                        },
                    );
                    session.suspend(action.clone());
                    return Ok(TurnOutcome::Suspended {
                        proposed_action: action,
                    });
                }

                GraphState::ExecutingApproved(action) => {
                    self.execute_and_record(session, &action).await?;
                    session.take_pending();
                    GraphState::Reasoning
                }

                GraphState::InjectingRejection(action, reason) => {
                    session
                        .conversation
                        .push_tool_result(ToolResult::rejected(&action.id, reason))?;
                    session.take_pending();
                    GraphState::Reasoning
                }

                GraphState::Terminal(text) => {
                    send_event(&self.event_tx, GraphEvent::Final { text: text.clone() });
                    return Ok(TurnOutcome::Final { text });
                }
            };
        }
    }

    async fn execute_and_record(&self, session: &mut Session, action: &ProposedAction) -> Result<(), GraphError> {
        let result = self.executor.execute(action).await;
        send_event(
            &self.event_tx,
            GraphEvent::ToolResult {
                action_id: action.id.clone(),
                name: action.name.clone(),
                is_error: result.is_error(),
                preview: preview(&result.to_observation_text()),
            },
        );
        session.conversation.push_tool_result(result)
    }
}

fn state_name(state: &GraphState) -> &'static str {
    match state {
        GraphState::Reasoning => "reasoning",
        GraphState::RoutingAction(_) => "routing_action",
        GraphState::ExecutingSafe(_) => "executing_safe",
        GraphState::AwaitingApproval(_) => "awaiting_approval",
        GraphState::ExecutingApproved(_) => "executing_approved",
        GraphState::InjectingRejection(..) => "injecting_rejection",
        GraphState::Terminal(_) => "terminal",
    }
}

/// Observation 预览最大字符数
const PREVIEW_CHARS: usize = 200;

fn preview(text: &str) -> String {
    if text.chars().count() > PREVIEW_CHARS {
        format!("{}...", text.chars().take(PREVIEW_CHARS).collect::<String>())
    } else {
        text.to_string()
    }
}
