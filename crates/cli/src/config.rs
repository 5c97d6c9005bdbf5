//! Configuration loading from tern.toml.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use mcp::LaunchSpec;
use runtime::{ConversationConfig, DEFAULT_BASE_URL, DEFAULT_MODEL, GatewayConfig};
use serde::Deserialize;

const DEFAULT_API_KEY_ENV: &str = "DEEPSEEK_API_KEY";
const DEFAULT_SYSTEM_PROMPT: &str = "You are a friendly, concise assistant. \
     Use the available tools when they help answer the question.";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gateway: GatewaySection,
    pub provider: ProviderSection,
    pub conversation: ConversationSection,
}

/// Model Gateway settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GatewaySection {
    pub base_url: String,
    pub model: String,
    /// Inline API key. Takes precedence over `api_key_env`.
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Most recent non-system turns sent per request.
    pub history_window: Option<usize>,
    pub system_prompt: String,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: None,
            max_tokens: None,
            history_window: None,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }
}

/// Tool provider process settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ProviderSection {
    pub connect_timeout_secs: u64,
    pub call_timeout_secs: u64,
    /// Variables copied from our environment, by name.
    pub inherit_env: Vec<String>,
    /// Variables set explicitly.
    pub env: HashMap<String, String>,
}

impl Default for ProviderSection {
    fn default() -> Self {
        Self {
            connect_timeout_secs: mcp::DEFAULT_CONNECT_TIMEOUT.as_secs(),
            call_timeout_secs: mcp::DEFAULT_CALL_TIMEOUT.as_secs(),
            inherit_env: vec!["PATH".to_string(), "HOME".to_string()],
            env: HashMap::new(),
        }
    }
}

/// Conversation loop settings.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ConversationSection {
    pub max_tool_rounds: usize,
    pub withhold_tools_after_cap: bool,
    pub model_timeout_secs: u64,
    /// Zero disables the per-turn bound.
    pub turn_timeout_secs: u64,
}

impl Default for ConversationSection {
    fn default() -> Self {
        let defaults = ConversationConfig::default();
        Self {
            max_tool_rounds: defaults.max_tool_rounds,
            withhold_tools_after_cap: defaults.withhold_tools_after_cap,
            model_timeout_secs: defaults.model_timeout.as_secs(),
            turn_timeout_secs: defaults.turn_timeout.map_or(0, |t| t.as_secs()),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Build the gateway settings, reading the API key from the process
    /// environment if it is not inline.
    pub fn gateway(&self) -> Result<GatewayConfig, ConfigError> {
        self.gateway_with(|name| std::env::var(name).ok())
    }

    fn gateway_with(
        &self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<GatewayConfig, ConfigError> {
        let section = &self.gateway;
        let api_key = section
            .api_key
            .clone()
            .or_else(|| lookup(&section.api_key_env))
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingApiKey(section.api_key_env.clone()))?;

        Ok(GatewayConfig {
            base_url: section.base_url.clone(),
            api_key,
            model: section.model.clone(),
            temperature: section.temperature,
            max_tokens: section.max_tokens,
            history_window: section.history_window,
        })
    }

    /// Launch settings for the provider at `executable`.
    pub fn launch_spec(&self, executable: &Path) -> LaunchSpec {
        self.launch_spec_with(executable, |name| std::env::var(name).ok())
    }

    fn launch_spec_with(
        &self,
        executable: &Path,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> LaunchSpec {
        let inherited = self
            .provider
            .inherit_env
            .iter()
            .filter_map(|name| lookup(name).map(|value| (name.clone(), value)));
        LaunchSpec::new(executable)
            .envs(inherited)
            .envs(self.provider.env.clone())
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.provider.connect_timeout_secs)
    }

    pub fn conversation(&self) -> ConversationConfig {
        let section = &self.conversation;
        ConversationConfig {
            max_tool_rounds: section.max_tool_rounds,
            withhold_tools_after_cap: section.withhold_tools_after_cap,
            model_timeout: Duration::from_secs(section.model_timeout_secs),
            tool_timeout: Duration::from_secs(self.provider.call_timeout_secs),
            turn_timeout: (section.turn_timeout_secs > 0)
                .then(|| Duration::from_secs(section.turn_timeout_secs)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("API key not configured: set gateway.api_key or the {0} environment variable")]
    MissingApiKey(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.gateway.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.gateway.model, DEFAULT_MODEL);
        assert_eq!(config.connect_timeout(), mcp::DEFAULT_CONNECT_TIMEOUT);

        let conversation = config.conversation();
        assert_eq!(conversation.max_tool_rounds, 1);
        assert_eq!(conversation.tool_timeout, mcp::DEFAULT_CALL_TIMEOUT);
        assert_eq!(conversation.turn_timeout, Some(Duration::from_secs(120)));
    }

    #[test]
    fn parses_all_sections() {
        let config = Config::parse(
            r#"
            [gateway]
            base_url = "http://localhost:8080/v1"
            model = "local-model"
            api_key = "sk-inline"
            temperature = 0.8
            history_window = 24
            system_prompt = "Be brief."

            [provider]
            connect_timeout_secs = 5
            call_timeout_secs = 7
            inherit_env = ["PATH"]
            [provider.env]
            MCP_DEBUG = "false"

            [conversation]
            max_tool_rounds = 3
            turn_timeout_secs = 0
            "#,
        )
        .unwrap();

        let gateway = config.gateway_with(no_env).unwrap();
        assert_eq!(gateway.base_url, "http://localhost:8080/v1");
        assert_eq!(gateway.api_key, "sk-inline");
        assert_eq!(gateway.temperature, Some(0.8));
        assert_eq!(gateway.history_window, Some(24));
        assert_eq!(config.gateway.system_prompt, "Be brief.");

        let conversation = config.conversation();
        assert_eq!(conversation.max_tool_rounds, 3);
        assert_eq!(conversation.tool_timeout, Duration::from_secs(7));
        assert_eq!(conversation.turn_timeout, None);
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn api_key_from_named_variable() {
        let config = Config::parse("[gateway]\napi_key_env = \"MY_KEY\"").unwrap();
        let gateway = config
            .gateway_with(|name| (name == "MY_KEY").then(|| "sk-env".to_string()))
            .unwrap();
        assert_eq!(gateway.api_key, "sk-env");
    }

    #[test]
    fn missing_api_key_is_an_error() {
        let config = Config::default();
        assert!(matches!(
            config.gateway_with(no_env),
            Err(ConfigError::MissingApiKey(name)) if name == DEFAULT_API_KEY_ENV
        ));
    }

    #[test]
    fn launch_env_is_explicit() {
        let config = Config::parse(
            r#"
            [provider]
            inherit_env = ["PATH", "UNSET_VAR"]
            [provider.env]
            MCP_DEBUG = "false"
            "#,
        )
        .unwrap();

        let spec = config.launch_spec_with(Path::new("weather.py"), |name| {
            (name == "PATH").then(|| "/usr/bin".to_string())
        });
        assert_eq!(spec.env.len(), 2);
        assert_eq!(spec.env["PATH"], "/usr/bin");
        assert_eq!(spec.env["MCP_DEBUG"], "false");
    }

    #[test]
    fn invalid_toml_is_a_parse_error() {
        assert!(matches!(
            Config::parse("[gateway\nmodel = 1"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tern.toml");
        std::fs::write(&path, "[gateway]\nmodel = \"other\"").unwrap();
        assert_eq!(Config::load(&path).unwrap().gateway.model, "other");
    }
}
