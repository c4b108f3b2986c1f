//! LLM 层：推理后端抽象与实现（OpenAI 兼容 / Mock / 脚本）

pub mod mock;
pub mod openai;
pub mod traits;

pub use mock::{MockReasoner, ScriptedReasoner};
pub use openai::OpenAiReasoner;
pub use traits::{LlmError, Reasoner, ReasonerReply, ReplyContent};
