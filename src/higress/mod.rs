//! Higress 控制台接入：HTTP 客户端与运维工具

pub mod client;
pub mod tools;

pub use client::{plugin_path, ApiPath, HigressClient, HigressTransport, HttpTransport, PluginScope};
pub use tools::{register_higress_tools, REQUEST_BLOCK_PLUGIN};
