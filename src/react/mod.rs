//! 认知层：动作分类、Planner（推理适配 + 重试）、可中断执行图、过程事件

pub mod classifier;
pub mod events;
pub mod graph;
pub mod planner;

pub use classifier::{classify, ActionClassifier, Classification};
pub use events::GraphEvent;
pub use graph::{ApprovalGraph, Decision, TurnOutcome, TurnReply};
pub use planner::{assign_unique_ids, validate_reply, Planner, NUDGE_PROMPT};
