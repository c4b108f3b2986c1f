//! 会话：对话历史 + 待审批动作
//!
//! Session 由 SessionStore 独占生命周期；执行图每次调用按 id 取出、处理、写回，不跨挂起点持有。

pub mod lock;
pub mod store;

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::conversation::{Conversation, ProposedAction};

pub use lock::SessionLocks;
pub use store::{MemorySessionStore, SessionStore};

/// 会话 ID（调用方指定或自动生成）
pub type SessionId = String;

pub fn generate_session_id() -> SessionId {
    format!("session_{}", uuid::Uuid::new_v4())
}

/// 挂起时记录的动作
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingAction {
    pub action: ProposedAction,
    pub suspended_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub conversation: Conversation,
    /// 仅在挂起等待审批时存在
    pub pending: Option<PendingAction>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn new(id: impl Into<SessionId>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            conversation: Conversation::new(),
            pending: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn pending_action(&self) -> Option<&ProposedAction> {
        self.pending.as_ref().map(|p| &p.action)
    }

    pub fn is_suspended(&self) -> bool {
        self.pending.is_some()
    }

    pub fn suspend(&mut self, action: ProposedAction) {
        let now = Utc::now();
        self.pending = Some(PendingAction {
            action,
            suspended_at: now,
        });
        self.updated_at = now;
    }

    /// 取出并清空待审批动作
    pub fn take_pending(&mut self) -> Option<ProposedAction> {
        self.updated_at = Utc::now();
        self.pending.take().map(|p| p.action)
    }

    /// 待审批动作是否已超过 ttl
    pub fn pending_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        match &self.pending {
            Some(p) => match chrono::Duration::from_std(ttl) {
                Ok(ttl) => now.signed_duration_since(p.suspended_at) > ttl,
                Err(_) => false,
            },
            None => false,
        }
    }

    /// 未挂起且超过 ttl 没有更新；挂起中的会话只按待审批有效期判断
    pub fn idle_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        if self.pending.is_some() {
            return false;
        }
        match chrono::Duration::from_std(ttl) {
            Ok(ttl) => now.signed_duration_since(self.updated_at) > ttl,
            Err(_) => false,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::Arguments;

    #[test]
    fn test_suspend_and_take() {
        let mut s = Session::new("s1");
        assert!(!s.is_suspended());
        s.suspend(ProposedAction::new("update_route", Arguments::new()).with_id("a1"));
        assert_eq!(s.pending_action().map(|a| a.id.as_str()), Some("a1"));
        assert_eq!(s.take_pending().map(|a| a.id), Some("a1".to_string()));
        assert!(s.take_pending().is_none());
    }

    #[test]
    fn test_pending_expiry() {
        let mut s = Session::new("s1");
        s.suspend(ProposedAction::new("update_route", Arguments::new()));
        let now = Utc::now();
        assert!(!s.pending_expired(Duration::from_secs(60), now));
        let later = now + chrono::Duration::seconds(120);
        assert!(s.pending_expired(Duration::from_secs(60), later));
    }

    #[test]
    fn test_idle_expiry_skips_suspended() {
        let mut s = Session::new("s1");
        let later = Utc::now() + chrono::Duration::hours(2);
        assert!(s.idle_expired(Duration::from_secs(3600), later));

        s.suspend(ProposedAction::new("update_route", Arguments::new()));
        assert!(!s.idle_expired(Duration::from_secs(60), later));
    }

    #[test]
    fn test_generated_ids_are_unique() {
        assert_ne!(generate_session_id(), generate_session_id());
    }
}
