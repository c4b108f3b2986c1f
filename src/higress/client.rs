//! Higress 控制台 API 客户端
//!
//! HttpTransport 负责登录（cookie 会话由 reqwest 保存）、URL 拼接与错误映射：404 → NotFound，其他失败 → Remote。
//! HigressClient 在传输层之上提供各资源操作；更新类操作先读取当前对象，把传入的键合并进去，再整体 PUT 回去。

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, StatusCode, Url};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;

use crate::conversation::Arguments;
use crate::core::ToolError;

/// 插件生效范围
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum PluginScope {
    Global,
    Domain,
    Service,
    Route,
}

/// API 路径：按段保存，资源名作为单独一段，拼 URL 时逐段转义
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiPath(Vec<String>);

impl ApiPath {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn join(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for ApiPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for seg in &self.0 {
            write!(f, "/{seg}")?;
        }
        Ok(())
    }
}

/// 插件实例路径；非 global 范围必须提供 resource_name
pub fn plugin_path(
    name: &str,
    scope: PluginScope,
    resource_name: Option<&str>,
) -> Result<ApiPath, ToolError> {
    let resource = resource_name.map(str::trim).filter(|r| !r.is_empty());
    let prefix = match (scope, resource) {
        (PluginScope::Global, _) => ApiPath::new(["v1", "global"]),
        (_, None) => {
            return Err(ToolError::InvalidArguments(format!(
                "resource_name is required for scope {scope:?}"
            )))
        }
        (PluginScope::Domain, Some(r)) => ApiPath::new(["v1", "domains"]).join(r),
        (PluginScope::Service, Some(r)) => ApiPath::new(["v1", "services"]).join(r),
        (PluginScope::Route, Some(r)) => ApiPath::new(["v1", "routes"]).join(r),
    };
    Ok(prefix.join("plugin-instances").join(name))
}

/// API 返回多包在 {"data": ...} 里
pub fn unwrap_data(resp: Value) -> Value {
    match resp {
        Value::Object(mut obj) if obj.contains_key("data") => obj.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}

/// 浅合并：patch 中的每个键覆盖 target 对应键
pub fn merge_fields(target: &mut Value, patch: &Arguments) -> Result<(), ToolError> {
    let obj = target
        .as_object_mut()
        .ok_or_else(|| ToolError::Remote("expected a JSON object from the gateway".to_string()))?;
    for (k, v) in patch {
        obj.insert(k.clone(), v.clone());
    }
    Ok(())
}

/// 控制台传输层：发送一次请求，返回解析后的 JSON（空响应体为 Null）
#[async_trait]
pub trait HigressTransport: Send + Sync {
    async fn request(&self, method: Method, path: &ApiPath, body: Option<&Value>) -> Result<Value, ToolError>;
}

/// 基于 reqwest 的传输层
pub struct HttpTransport {
    http: Client,
    base_url: Url,
    credentials: Option<(String, String)>,
    logged_in: Mutex<bool>,
}

impl HttpTransport {
    pub fn new(
        base_url: &str,
        username: Option<String>,
        password: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ToolError> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| ToolError::InvalidArguments(format!("invalid Higress base url {base_url:?}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(ToolError::InvalidArguments(format!(
                "invalid Higress base url {base_url}"
            )));
        }
        let http = Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ToolError::Remote(e.to_string()))?;
        let credentials = match (username, password) {
            (Some(u), Some(p)) => Some((u, p)),
            _ => None,
        };
        Ok(Self {
            http,
            base_url,
            credentials,
            logged_in: Mutex::new(false),
        })
    }

    /// base_url 之后逐段追加；段内的 `/`、空格等会被转义
    pub fn url(&self, path: &ApiPath) -> Result<Url, ToolError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ToolError::InvalidArguments(format!("invalid Higress base url {}", self.base_url)))?
            .pop_if_empty()
            .extend(path.segments());
        Ok(url)
    }

    async fn ensure_login(&self) -> Result<(), ToolError> {
        let Some((username, password)) = &self.credentials else {
            return Ok(());
        };
        let mut logged_in = self.logged_in.lock().await;
        if *logged_in {
            return Ok(());
        }
        let url = self.url(&ApiPath::new(["session", "login"]))?;
        tracing::info!(url = %url, "logging in to Higress console");
        let resp = self
            .http
            .post(url)
            .json(&serde_json::json!({ "username": username, "password": password }))
            .send()
            .await
            .map_err(|e| ToolError::Remote(format!("login failed: {e}")))?;
        if !resp.status().is_success() {
            return Err(ToolError::Remote(format!("login failed: HTTP {}", resp.status())));
        }
        *logged_in = true;
        Ok(())
    }
}

#[async_trait]
impl HigressTransport for HttpTransport {
    async fn request(&self, method: Method, path: &ApiPath, body: Option<&Value>) -> Result<Value, ToolError> {
        self.ensure_login().await?;
        let url = self.url(path)?;
        tracing::info!(method = %method, url = %url, "higress request");

        let mut req = self.http.request(method.clone(), url);
        if let Some(b) = body {
            req = req.json(b);
        }
        let resp = req.send().await.map_err(|e| {
            tracing::error!(method = %method, path = %path, error = %e, "higress request failed");
            if e.is_timeout() {
                ToolError::Timeout(format!("{method} {path}"))
            } else {
                ToolError::Remote(e.to_string())
            }
        })?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ToolError::NotFound(path.to_string()));
        }
        if status == StatusCode::UNAUTHORIZED {
            *self.logged_in.lock().await = false;
        }
        let text = resp
            .text()
            .await
            .map_err(|e| ToolError::Remote(format!("read body: {e}")))?;
        if !status.is_success() {
            return Err(ToolError::Remote(format!("HTTP {status}: {text}")));
        }
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        let value: Value = serde_json::from_str(&text).map_err(|e| ToolError::Remote(format!("decode: {e}")))?;
        tracing::debug!(path = %path, response = %value, "higress response");
        Ok(value)
    }
}

pub struct HigressClient {
    transport: Arc<dyn HigressTransport>,
}

impl HigressClient {
    pub fn new(
        base_url: &str,
        username: Option<String>,
        password: Option<String>,
        timeout_secs: u64,
    ) -> Result<Self, ToolError> {
        let transport = HttpTransport::new(base_url, username, password, timeout_secs)?;
        Ok(Self::with_transport(Arc::new(transport)))
    }

    pub fn with_transport(transport: Arc<dyn HigressTransport>) -> Self {
        Self { transport }
    }

    pub async fn get(&self, path: &ApiPath) -> Result<Value, ToolError> {
        self.transport.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &ApiPath, body: &Value) -> Result<Value, ToolError> {
        self.transport.request(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &ApiPath, body: &Value) -> Result<Value, ToolError> {
        self.transport.request(Method::PUT, path, Some(body)).await
    }

    /// 读取 → 合并 → PUT
    async fn read_merge_put(&self, path: &ApiPath, patch: &Arguments) -> Result<Value, ToolError> {
        let mut current = unwrap_data(self.get(path).await?);
        merge_fields(&mut current, patch)?;
        self.put(path, &current).await
    }

    fn routes() -> ApiPath {
        ApiPath::new(["v1", "routes"])
    }

    fn service_sources() -> ApiPath {
        ApiPath::new(["v1", "service-sources"])
    }

    pub async fn list_routes(&self) -> Result<Value, ToolError> {
        self.get(&Self::routes()).await
    }

    pub async fn get_route(&self, name: &str) -> Result<Value, ToolError> {
        self.get(&Self::routes().join(name)).await
    }

    pub async fn add_route(&self, configurations: &Arguments) -> Result<Value, ToolError> {
        self.post(&Self::routes(), &Value::Object(configurations.clone()))
            .await
    }

    pub async fn update_route(&self, name: &str, configurations: &Arguments) -> Result<Value, ToolError> {
        self.read_merge_put(&Self::routes().join(name), configurations)
            .await
    }

    pub async fn list_service_sources(&self) -> Result<Value, ToolError> {
        self.get(&Self::service_sources()).await
    }

    pub async fn get_service_source(&self, name: &str) -> Result<Value, ToolError> {
        self.get(&Self::service_sources().join(name)).await
    }

    pub async fn add_service_source(&self, configurations: &Arguments) -> Result<Value, ToolError> {
        self.post(&Self::service_sources(), &Value::Object(configurations.clone()))
            .await
    }

    pub async fn update_service_source(
        &self,
        name: &str,
        configurations: &Arguments,
    ) -> Result<Value, ToolError> {
        self.read_merge_put(&Self::service_sources().join(name), configurations)
            .await
    }

    pub async fn get_plugin(
        &self,
        name: &str,
        scope: PluginScope,
        resource_name: Option<&str>,
    ) -> Result<Value, ToolError> {
        self.get(&plugin_path(name, scope, resource_name)?).await
    }

    /// 合并 configurations 并设置 enabled
    pub async fn update_plugin(
        &self,
        name: &str,
        enabled: bool,
        configurations: &Arguments,
        scope: PluginScope,
        resource_name: Option<&str>,
    ) -> Result<Value, ToolError> {
        let path = plugin_path(name, scope, resource_name)?;
        let mut data = unwrap_data(self.get(&path).await?);
        let obj = data
            .as_object_mut()
            .ok_or_else(|| ToolError::Remote("plugin instance is not an object".to_string()))?;
        let config = obj
            .entry("configurations")
            .or_insert_with(|| Value::Object(Arguments::new()));
        if config.is_null() {
            *config = Value::Object(Arguments::new());
        }
        merge_fields(config, configurations)?;
        obj.insert("enabled".to_string(), Value::Bool(enabled));
        self.put(&path, &data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;
    use std::sync::Mutex as StdMutex;

    /// 按路径返回预置 GET 响应，记录所有请求
    #[derive(Default)]
    struct StubTransport {
        objects: HashMap<String, Value>,
        requests: StdMutex<Vec<(Method, String, Option<Value>)>>,
    }

    impl StubTransport {
        fn with_object(path: &str, value: Value) -> Self {
            let mut objects = HashMap::new();
            objects.insert(path.to_string(), value);
            Self {
                objects,
                requests: StdMutex::new(Vec::new()),
            }
        }

        fn requests(&self) -> Vec<(Method, String, Option<Value>)> {
            self.requests.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl HigressTransport for StubTransport {
        async fn request(&self, method: Method, path: &ApiPath, body: Option<&Value>) -> Result<Value, ToolError> {
            let key = path.to_string();
            self.requests
                .lock()
                .unwrap()
                .push((method.clone(), key.clone(), body.cloned()));
            if method == Method::GET {
                return self.objects.get(&key).cloned().ok_or(ToolError::NotFound(key));
            }
            Ok(json!({"success": true}))
        }
    }

    fn patch(v: Value) -> Arguments {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn test_plugin_paths() {
        assert_eq!(
            plugin_path("request-block", PluginScope::Global, None)
                .unwrap()
                .to_string(),
            "/v1/global/plugin-instances/request-block"
        );
        assert_eq!(
            plugin_path("request-block", PluginScope::Route, Some("r1"))
                .unwrap()
                .to_string(),
            "/v1/routes/r1/plugin-instances/request-block"
        );
        assert_eq!(
            plugin_path("key-auth", PluginScope::Domain, Some("example.com"))
                .unwrap()
                .to_string(),
            "/v1/domains/example.com/plugin-instances/key-auth"
        );
    }

    #[test]
    fn test_non_global_scope_requires_resource() {
        let err = plugin_path("request-block", PluginScope::Service, Some("  ")).unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[test]
    fn test_merge_keeps_other_fields() {
        let mut current = unwrap_data(json!({"data": {"blocked_code": 404, "block_urls": ["a"]}}));
        merge_fields(&mut current, &patch(json!({"blocked_code": 500}))).unwrap();
        assert_eq!(current, json!({"blocked_code": 500, "block_urls": ["a"]}));
    }

    #[test]
    fn test_scope_serde() {
        let s: PluginScope = serde_json::from_value(json!("route")).unwrap();
        assert_eq!(s, PluginScope::Route);
    }

    #[test]
    fn test_resource_names_are_escaped() {
        let transport = HttpTransport::new("http://localhost:8001/console/", None, None, 1).unwrap();
        let url = transport
            .url(&ApiPath::new(["v1", "routes"]).join("a b/../c"))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:8001/console/v1/routes/a%20b%2F..%2Fc");
    }

    #[test]
    fn test_invalid_base_url() {
        assert!(HttpTransport::new("not a url", None, None, 1).is_err());
    }

    #[tokio::test]
    async fn test_update_plugin_keeps_untouched_keys() {
        let stub = Arc::new(StubTransport::with_object(
            "/v1/global/plugin-instances/request-block",
            json!({"data": {
                "enabled": false,
                "version": "7",
                "configurations": {"block_urls": ["/admin"], "blocked_code": 403, "case_sensitive": true}
            }}),
        ));
        let client = HigressClient::with_transport(stub.clone());

        client
            .update_plugin(
                "request-block",
                true,
                &patch(json!({"blocked_code": 401})),
                PluginScope::Global,
                None,
            )
            .await
            .unwrap();

        let requests = stub.requests();
        assert_eq!(requests.len(), 2);
        let (method, path, body) = &requests[1];
        assert_eq!(method, &Method::PUT);
        assert_eq!(path, "/v1/global/plugin-instances/request-block");
        assert_eq!(
            body.as_ref().unwrap(),
            &json!({
                "enabled": true,
                "version": "7",
                "configurations": {"block_urls": ["/admin"], "blocked_code": 401, "case_sensitive": true}
            })
        );
    }

    #[tokio::test]
    async fn test_update_route_merges_into_current() {
        let stub = Arc::new(StubTransport::with_object(
            "/v1/routes/r1",
            json!({"data": {"name": "r1", "path": {"matchType": "PRE", "matchValue": "/"}, "methods": []}}),
        ));
        let client = HigressClient::with_transport(stub.clone());

        client
            .update_route("r1", &patch(json!({"methods": ["GET"]})))
            .await
            .unwrap();

        let requests = stub.requests();
        let (method, _, body) = &requests[1];
        assert_eq!(method, &Method::PUT);
        assert_eq!(
            body.as_ref().unwrap(),
            &json!({"name": "r1", "path": {"matchType": "PRE", "matchValue": "/"}, "methods": ["GET"]})
        );
    }

    #[tokio::test]
    async fn test_update_missing_route_does_not_put() {
        let stub = Arc::new(StubTransport::default());
        let client = HigressClient::with_transport(stub.clone());

        let err = client
            .update_route("ghost", &patch(json!({"methods": ["GET"]})))
            .await
            .unwrap_err();
        assert_eq!(err, ToolError::NotFound("/v1/routes/ghost".to_string()));
        assert_eq!(stub.requests().len(), 1);
    }
}
