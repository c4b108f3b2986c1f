//! Higress 运维工具：路由、服务来源、插件
//!
//! 每个工具持有共享的 HigressClient，参数用带 JsonSchema 的结构体反序列化，
//! 参数不合法时返回 InvalidArguments，交给模型自行修正。

use std::sync::Arc;

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::client::{HigressClient, PluginScope};
use crate::conversation::Arguments;
use crate::core::ToolError;
use crate::tools::{parameters_schema_for, Tool, ToolRegistry};

/// request-block 插件名
pub const REQUEST_BLOCK_PLUGIN: &str = "request-block";

fn parse_args<T: DeserializeOwned>(args: Arguments) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(args)).map_err(|e| ToolError::InvalidArguments(e.to_string()))
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct NameArgs {
    /// 资源名称
    pub name: String,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct AddArgs {
    /// 完整的资源配置对象
    pub configurations: Arguments,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct UpdateArgs {
    /// 资源名称
    pub name: String,
    /// 只需给出要修改的字段，其余字段保持不变
    pub configurations: Arguments,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct GetPluginArgs {
    /// 插件名称，如 request-block
    pub name: String,
    pub scope: PluginScope,
    /// domain / service / route 范围下必填
    #[serde(default)]
    pub resource_name: Option<String>,
}

#[derive(Debug, Deserialize, JsonSchema)]
pub struct RequestBlockArgs {
    pub enabled: bool,
    /// block_bodies / block_headers / block_urls / blocked_code / case_sensitive
    pub configurations: Arguments,
    pub scope: PluginScope,
    /// domain / service / route 范围下必填
    #[serde(default)]
    pub resource_name: Option<String>,
}

pub struct ListRoutesTool {
    client: Arc<HigressClient>,
}

#[async_trait]
impl Tool for ListRoutesTool {
    fn name(&self) -> &str {
        "list_routes"
    }

    fn description(&self) -> &str {
        "List all available routes."
    }

    async fn execute(&self, _args: Arguments) -> Result<Value, ToolError> {
        self.client.list_routes().await
    }
}

pub struct GetRouteTool {
    client: Arc<HigressClient>,
}

#[async_trait]
impl Tool for GetRouteTool {
    fn name(&self) -> &str {
        "get_route"
    }

    fn description(&self) -> &str {
        "Get detailed information about a specific route."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<NameArgs>()
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let args: NameArgs = parse_args(args)?;
        self.client.get_route(&args.name).await
    }
}

pub struct AddRouteTool {
    client: Arc<HigressClient>,
}

#[async_trait]
impl Tool for AddRouteTool {
    fn name(&self) -> &str {
        "add_route"
    }

    fn description(&self) -> &str {
        "Add a new route. The configurations require name, path {matchType: PRE|EQUAL|REGULAR, \
         matchValue, caseSensitive} and services [{name, port, weight}]; optional keys are \
         domains (at most one), methods, headers, urlParams and customConfigs."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<AddArgs>()
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let args: AddArgs = parse_args(args)?;
        self.client.add_route(&args.configurations).await
    }
}

pub struct UpdateRouteTool {
    client: Arc<HigressClient>,
}

#[async_trait]
impl Tool for UpdateRouteTool {
    fn name(&self) -> &str {
        "update_route"
    }

    fn description(&self) -> &str {
        "Update an existing route. Only provide the fields you want to update; they are merged \
         into the current route configuration."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<UpdateArgs>()
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let args: UpdateArgs = parse_args(args)?;
        self.client.update_route(&args.name, &args.configurations).await
    }
}

pub struct ListServiceSourcesTool {
    client: Arc<HigressClient>,
}

#[async_trait]
impl Tool for ListServiceSourcesTool {
    fn name(&self) -> &str {
        "list_service_sources"
    }

    fn description(&self) -> &str {
        "List all service sources."
    }

    async fn execute(&self, _args: Arguments) -> Result<Value, ToolError> {
        self.client.list_service_sources().await
    }
}

pub struct GetServiceSourceTool {
    client: Arc<HigressClient>,
}

#[async_trait]
impl Tool for GetServiceSourceTool {
    fn name(&self) -> &str {
        "get_service_source"
    }

    fn description(&self) -> &str {
        "Get detailed information about a specific service source."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<NameArgs>()
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let args: NameArgs = parse_args(args)?;
        self.client.get_service_source(&args.name).await
    }
}

pub struct AddServiceSourceTool {
    client: Arc<HigressClient>,
}

#[async_trait]
impl Tool for AddServiceSourceTool {
    fn name(&self) -> &str {
        "add_service_source"
    }

    fn description(&self) -> &str {
        "Add a new service source. The configurations require name, type (static|dns), domain \
         and port; optional keys are protocol (http|https) and sni."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<AddArgs>()
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let args: AddArgs = parse_args(args)?;
        self.client.add_service_source(&args.configurations).await
    }
}

pub struct UpdateServiceSourceTool {
    client: Arc<HigressClient>,
}

#[async_trait]
impl Tool for UpdateServiceSourceTool {
    fn name(&self) -> &str {
        "update_service_source"
    }

    fn description(&self) -> &str {
        "Update an existing service source. Only provide the fields you want to update."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<UpdateArgs>()
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let args: UpdateArgs = parse_args(args)?;
        self.client
            .update_service_source(&args.name, &args.configurations)
            .await
    }
}

pub struct GetPluginTool {
    client: Arc<HigressClient>,
}

#[async_trait]
impl Tool for GetPluginTool {
    fn name(&self) -> &str {
        "get_plugin"
    }

    fn description(&self) -> &str {
        "Get detailed information about a plugin instance. scope is one of global, domain, \
         service, route; resource_name is required unless scope is global."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<GetPluginArgs>()
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let args: GetPluginArgs = parse_args(args)?;
        self.client
            .get_plugin(&args.name, args.scope, args.resource_name.as_deref())
            .await
    }
}

pub struct UpdateRequestBlockTool {
    client: Arc<HigressClient>,
}

#[async_trait]
impl Tool for UpdateRequestBlockTool {
    fn name(&self) -> &str {
        "update_request_block_plugin"
    }

    fn description(&self) -> &str {
        "Update the request-block plugin. configurations may contain block_bodies, \
         block_headers, block_urls, blocked_code and case_sensitive; given keys are merged into \
         the current configuration."
    }

    fn parameters_schema(&self) -> Value {
        parameters_schema_for::<RequestBlockArgs>()
    }

    async fn execute(&self, args: Arguments) -> Result<Value, ToolError> {
        let args: RequestBlockArgs = parse_args(args)?;
        self.client
            .update_plugin(
                REQUEST_BLOCK_PLUGIN,
                args.enabled,
                &args.configurations,
                args.scope,
                args.resource_name.as_deref(),
            )
            .await
    }
}

/// 注册全部 Higress 工具
pub fn register_higress_tools(registry: &mut ToolRegistry, client: Arc<HigressClient>) {
    registry.register(ListRoutesTool { client: client.clone() });
    registry.register(GetRouteTool { client: client.clone() });
    registry.register(AddRouteTool { client: client.clone() });
    registry.register(UpdateRouteTool { client: client.clone() });
    registry.register(ListServiceSourcesTool { client: client.clone() });
    registry.register(GetServiceSourceTool { client: client.clone() });
    registry.register(AddServiceSourceTool { client: client.clone() });
    registry.register(UpdateServiceSourceTool { client: client.clone() });
    registry.register(GetPluginTool { client: client.clone() });
    registry.register(UpdateRequestBlockTool { client });
}
