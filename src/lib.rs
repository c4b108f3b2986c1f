//! Gateguard - Higress 运维智能体
//!
//! 可中断的 ReAct 执行图：模型提出的工具调用中，只读操作直接执行，
//! 会修改网关配置的敏感操作挂起等待人工审批，批准后执行、拒绝后把理由交还模型继续推理。
//!
//! 模块划分：
//! - **agent**: 按配置装配执行图
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **conversation**: 对话 Turn、动作提议、工具结果
//! - **core**: 错误类型
//! - **higress**: Higress 控制台客户端与运维工具
//! - **llm**: 推理后端抽象与实现（OpenAI 兼容 / Mock / 脚本）
//! - **react**: 动作分类、Planner、审批执行图、过程事件
//! - **session**: 会话、会话存储与每会话锁
//! - **tools**: 工具注册表与执行器

pub mod agent;
pub mod config;
pub mod conversation;
pub mod core;
pub mod higress;
pub mod llm;
pub mod observability;
pub mod react;
pub mod session;
pub mod tools;

pub use crate::core::{GraphError, ToolError};
pub use react::{ApprovalGraph, Decision, TurnOutcome, TurnReply};
