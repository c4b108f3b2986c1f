//! 会话存储抽象层
//!
//! 按会话 ID 存取 Session 检查点，使执行图可以在人工审批期间挂起任意长时间后恢复。
//! 内存实现只在单次进程运行内有效。

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use super::Session;

/// 会话存储接口
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// 读取最新检查点
    async fn load(&self, session_id: &str) -> Option<Session>;

    /// 写入检查点（覆盖）
    async fn save(&self, session: Session);

    async fn remove(&self, session_id: &str) -> bool;

    /// 清理待审批动作已过期的会话，以及超过 idle_ttl 未活动的会话，返回清理数量
    async fn reap_expired(&self, pending_ttl: Duration, idle_ttl: Duration) -> usize;

    /// 当前会话数
    async fn active_count(&self) -> usize;
}

/// 内存会话存储
#[derive(Default)]
pub struct MemorySessionStore {
    sessions: RwLock<HashMap<String, Session>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self, session_id: &str) -> Option<Session> {
        self.sessions.read().await.get(session_id).cloned()
    }

    async fn save(&self, session: Session) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    async fn remove(&self, session_id: &str) -> bool {
        self.sessions.write().await.remove(session_id).is_some()
    }

    async fn reap_expired(&self, pending_ttl: Duration, idle_ttl: Duration) -> usize {
        let now = Utc::now();
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|_, s| !s.pending_expired(pending_ttl, now) && !s.idle_expired(idle_ttl, now));
        let reaped = before - sessions.len();
        if reaped > 0 {
            tracing::info!(reaped, remaining = sessions.len(), "reaped expired sessions");
        }
        reaped
    }

    async fn active_count(&self) -> usize {
        self.sessions.read().await.len()
    }
}
