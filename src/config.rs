use anyhow::{bail, Context, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ChatError;
use crate::util::parse_bool_flag;

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_MODEL: &str = "doubao-1-5-pro-32k-250115";
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_MCP_CONFIG: &str = r#"{
  "mcpServers": {
    "weather": {
      "url": "http://127.0.0.1:8000/sse"
    }
  }
}"#;

#[derive(Debug, Clone)]
pub struct Config {
    pub base_url: String,
    pub model: String,
    pub stream: bool,
    /// Raw MCP configuration text, checked before every request.
    pub mcp_config: String,
    pub idle_timeout: Option<Duration>,
    pub inline_tool_placeholder: bool,
    pub expand_tool_details: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            stream: true,
            mcp_config: DEFAULT_MCP_CONFIG.to_string(),
            idle_timeout: Some(Duration::from_secs(DEFAULT_IDLE_TIMEOUT_SECS)),
            inline_tool_placeholder: false,
            expand_tool_details: false,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let base_url = std::env::var("MCPCHAT_URL").unwrap_or(defaults.base_url);
        let model = std::env::var("MCPCHAT_MODEL").unwrap_or(defaults.model);
        let stream = env_flag("MCPCHAT_STREAM").unwrap_or(defaults.stream);

        let mcp_config = match std::env::var("MCPCHAT_MCP_CONFIG") {
            Ok(path) if path.trim().is_empty() => String::new(),
            Ok(path) => {
                let path = PathBuf::from(path.trim());
                std::fs::read_to_string(&path).with_context(|| {
                    format!("failed to read MCP config from {}", path.display())
                })?
            }
            Err(_) => defaults.mcp_config,
        };

        let idle_timeout = match std::env::var("MCPCHAT_IDLE_TIMEOUT_SECS") {
            Ok(raw) => {
                let secs = raw.trim().parse::<u64>().with_context(|| {
                    format!("MCPCHAT_IDLE_TIMEOUT_SECS must be a whole number, got '{raw}'")
                })?;
                (secs > 0).then(|| Duration::from_secs(secs))
            }
            Err(_) => defaults.idle_timeout,
        };

        Ok(Self {
            base_url,
            model,
            stream,
            mcp_config,
            idle_timeout,
            inline_tool_placeholder: env_flag("MCPCHAT_INLINE_TOOL_PLACEHOLDER")
                .unwrap_or(defaults.inline_tool_placeholder),
            expand_tool_details: env_flag("MCPCHAT_EXPAND_TOOL_DETAILS")
                .unwrap_or(defaults.expand_tool_details),
        })
    }

    pub fn validate(&self) -> Result<()> {
        let url = self.base_url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!(
                "Invalid MCPCHAT_URL '{}': expected http:// or https:// URL",
                self.base_url
            );
        }

        if self.model.trim().is_empty() {
            bail!("MCPCHAT_MODEL must not be empty");
        }

        Ok(())
    }
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key).ok().and_then(parse_bool_flag)
}

/// Check MCP configuration text before it is attached to a request.
///
/// Empty text means "no tools". Anything else must be a JSON object with an
/// `mcpServers` field.
pub fn parse_mcp_config(text: &str) -> Result<Option<Value>, ChatError> {
    if text.trim().is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_str(text)
        .map_err(|error| ChatError::Config(format!("not valid JSON: {error}")))?;

    if value.get("mcpServers").is_none() {
        return Err(ChatError::Config(
            "configuration must contain an \"mcpServers\" field".to_string(),
        ));
    }

    Ok(Some(value))
}
