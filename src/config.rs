//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `GATEGUARD__*` 覆盖（双下划线表示嵌套，如 `GATEGUARD__LLM__PROVIDER=mock`）。
//! API Key 与 Higress 凭据未写在配置里时，回退到 OPENROUTER_API_KEY / OPENAI_API_KEY 与 HIGRESS_* 环境变量。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub graph: GraphSection,
    pub session: SessionSection,
    pub tools: ToolsSection,
    pub higress: HigressSection,
    pub web: WebSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppSection {
    pub name: Option<String>,
}

/// [llm] 段：后端选择、模型、超时
#[derive(Debug, Clone, Deserialize)]
pub struct LlmSection {
    /// openai（任意 OpenAI 兼容端点，默认 OpenRouter）/ mock
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_base_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    pub system_prompt: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "openai/gpt-4o".to_string()
}

fn default_llm_base_url() -> String {
    "https://openrouter.ai/api/v1".to_string()
}

fn default_request_timeout() -> u64 {
    60
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            base_url: default_llm_base_url(),
            api_key: None,
            request_timeout_secs: default_request_timeout(),
            system_prompt: None,
        }
    }
}

impl LlmSection {
    /// 配置中的 api_key 优先，其次 OPENROUTER_API_KEY、OPENAI_API_KEY
    pub fn resolved_api_key(&self) -> Option<String> {
        non_empty(self.api_key.clone())
            .or_else(|| non_empty(std::env::var("OPENROUTER_API_KEY").ok()))
            .or_else(|| non_empty(std::env::var("OPENAI_API_KEY").ok()))
    }
}

/// [graph] 段：执行图参数
#[derive(Debug, Clone, Deserialize)]
pub struct GraphSection {
    #[serde(default = "default_max_nudge_retries")]
    pub max_nudge_retries: usize,
    #[serde(default = "default_max_steps_per_turn")]
    pub max_steps_per_turn: usize,
    /// 需要人工审批的动作名
    #[serde(default = "default_sensitive_actions")]
    pub sensitive_actions: Vec<String>,
}

fn default_max_nudge_retries() -> usize {
    3
}

fn default_max_steps_per_turn() -> usize {
    25
}

fn default_sensitive_actions() -> Vec<String> {
    vec![
        "add_route".into(),
        "update_route".into(),
        "add_service_source".into(),
        "update_service_source".into(),
        "update_request_block_plugin".into(),
    ]
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            max_nudge_retries: default_max_nudge_retries(),
            max_steps_per_turn: default_max_steps_per_turn(),
            sensitive_actions: default_sensitive_actions(),
        }
    }
}

/// [session] 段：待审批有效期、空闲会话有效期与清理周期
#[derive(Debug, Clone, Deserialize)]
pub struct SessionSection {
    #[serde(default = "default_pending_ttl_secs")]
    pub pending_ttl_secs: u64,
    /// 未挂起的会话超过该时长未活动即被清理
    #[serde(default = "default_idle_ttl_secs")]
    pub idle_ttl_secs: u64,
    #[serde(default = "default_reap_interval_secs")]
    pub reap_interval_secs: u64,
}

fn default_pending_ttl_secs() -> u64 {
    3600
}

fn default_idle_ttl_secs() -> u64 {
    86400
}

fn default_reap_interval_secs() -> u64 {
    300
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            pending_ttl_secs: default_pending_ttl_secs(),
            idle_ttl_secs: default_idle_ttl_secs(),
            reap_interval_secs: default_reap_interval_secs(),
        }
    }
}

impl SessionSection {
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.idle_ttl_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

/// [tools] 段
#[derive(Debug, Clone, Deserialize)]
pub struct ToolsSection {
    /// 单次工具调用超时（秒）
    #[serde(default = "default_tool_timeout_secs")]
    pub tool_timeout_secs: u64,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

impl Default for ToolsSection {
    fn default() -> Self {
        Self {
            tool_timeout_secs: default_tool_timeout_secs(),
        }
    }
}

/// [higress] 段：控制台地址与登录凭据
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HigressSection {
    pub base_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

const DEFAULT_HIGRESS_URL: &str = "http://localhost:8001";

impl HigressSection {
    pub fn resolved_base_url(&self) -> String {
        non_empty(self.base_url.clone())
            .or_else(|| non_empty(std::env::var("HIGRESS_BASE_URL").ok()))
            .unwrap_or_else(|| DEFAULT_HIGRESS_URL.to_string())
    }

    pub fn resolved_username(&self) -> Option<String> {
        non_empty(self.username.clone()).or_else(|| non_empty(std::env::var("HIGRESS_USERNAME").ok()))
    }

    pub fn resolved_password(&self) -> Option<String> {
        non_empty(self.password.clone()).or_else(|| non_empty(std::env::var("HIGRESS_PASSWORD").ok()))
    }
}

/// [web] 段：gateguard-web 监听端口（GATEGUARD_WEB_PORT 可覆盖）
#[derive(Debug, Clone, Deserialize)]
pub struct WebSection {
    #[serde(default = "default_web_port")]
    pub port: u16,
}

fn default_web_port() -> u16 {
    8080
}

impl Default for WebSection {
    fn default() -> Self {
        Self {
            port: default_web_port(),
        }
    }
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.filter(|s| !s.trim().is_empty())
}

/// 从 config 目录加载配置，环境变量 GATEGUARD__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 GATEGUARD__*
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/default", "../config/default", "default"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        } else {
            tracing::warn!(path = %path.display(), "config file not found, using defaults");
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("GATEGUARD")
            .separator("__")
            .try_parsing(true)
            .list_separator(",")
            .with_list_parse_key("graph.sensitive_actions"),
    );

    builder.build()?.try_deserialize()
}
