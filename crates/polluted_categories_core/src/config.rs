use std::env;
use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "polluted-categories/0.1";
pub const DEFAULT_MYSQL_PORT: u16 = 3306;
pub const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ReportConfig {
    #[serde(default)]
    pub wiki: WikiSection,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct WikiSection {
    pub api_url: Option<String>,
    pub user_agent: Option<String>,
}

impl ReportConfig {
    /// Resolve an explicit API URL: env WIKI_API_URL > config > None.
    pub fn api_url_with<F>(&self, lookup: F) -> Option<String>
    where
        F: Fn(&str) -> Option<String>,
    {
        non_blank(lookup("WIKI_API_URL")).or_else(|| non_blank(self.wiki.api_url.clone()))
    }

    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent_with<F>(&self, lookup: F) -> String
    where
        F: Fn(&str) -> Option<String>,
    {
        non_blank(lookup("WIKI_USER_AGENT"))
            .or_else(|| non_blank(self.wiki.user_agent.clone()))
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }
}

/// Load and parse a ReportConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<ReportConfig> {
    if !config_path.exists() {
        return Ok(ReportConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: ReportConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

/// Process environment lookup, the default source for credentials and overrides.
pub fn env_lookup(key: &str) -> Option<String> {
    env::var(key).ok()
}

/// Replica login. The schema is fixed; only the endpoint and account come from env.
#[derive(Clone, PartialEq, Eq)]
pub struct ReplicaCredentials {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl ReplicaCredentials {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = required_value(&lookup, "MYSQL_HOST")?.trim().to_string();
        let username = required_value(&lookup, "MYSQL_USERNAME")?.trim().to_string();
        let password = required_value(&lookup, "MYSQL_PASSWORD")?;
        let port = match non_blank(lookup("MYSQL_PORT")) {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("MYSQL_PORT must be a port number, got {value:?}"))?,
            None => DEFAULT_MYSQL_PORT,
        };
        Ok(Self {
            host,
            port,
            username,
            password,
        })
    }
}

impl fmt::Debug for ReplicaCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReplicaCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq)]
pub struct BotCredentials {
    pub username: String,
    pub password: String,
}

impl BotCredentials {
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Self {
            username: required_value(&lookup, "WIKI_BOT_USER")?.trim().to_string(),
            password: required_value(&lookup, "WIKI_BOT_PASS")?,
        })
    }
}

impl fmt::Debug for BotCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotCredentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

pub(crate) fn env_value_u64<F>(lookup: F, key: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn required_value<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => bail!("{key} is required"),
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}
