//! 工具层：注册表、执行器、参数 Schema

pub mod executor;
pub mod registry;
pub mod schema;

pub use executor::ToolExecutor;
pub use registry::{Tool, ToolInvoker, ToolRegistry, ToolSpec};
pub use schema::parameters_schema_for;
