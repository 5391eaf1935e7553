use std::time::Duration;

use anyhow::{Context, Result, bail};
use log::info;
use reqwest::Url;
use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::Value;

use crate::config::{
    BotCredentials, DEFAULT_HTTP_TIMEOUT_MS, ReportConfig, env_lookup, env_value_u64,
};
use crate::report::ReportPage;

/// Language and project pair naming a Wikimedia wiki.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WikiSite {
    pub language: &'static str,
    pub project: &'static str,
}

impl WikiSite {
    pub const ENGLISH_WIKIPEDIA: Self = Self {
        language: "en",
        project: "wikipedia",
    };

    pub fn api_url(&self) -> String {
        format!("https://{}.{}.org/w/api.php", self.language, self.project)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedEdit {
    pub title: String,
    pub revision_id: Option<u64>,
    pub no_change: bool,
}

pub trait WikiWriteApi {
    fn login(&mut self, username: &str, password: &str) -> Result<()>;
    fn edit_page(
        &mut self,
        title: &str,
        content: &str,
        summary: &str,
        minor: bool,
    ) -> Result<SavedEdit>;
    fn request_count(&self) -> usize;
}

impl<A: WikiWriteApi + ?Sized> WikiWriteApi for &mut A {
    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        (**self).login(username, password)
    }

    fn edit_page(
        &mut self,
        title: &str,
        content: &str,
        summary: &str,
        minor: bool,
    ) -> Result<SavedEdit> {
        (**self).edit_page(title, content, summary, minor)
    }

    fn request_count(&self) -> usize {
        (**self).request_count()
    }
}

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_config(config: &ReportConfig, site: WikiSite) -> Self {
        Self::from_lookup(config, site, env_lookup)
    }

    pub fn from_lookup<F>(config: &ReportConfig, site: WikiSite, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        Self {
            api_url: config
                .api_url_with(&lookup)
                .unwrap_or_else(|| site.api_url()),
            user_agent: config.user_agent_with(&lookup),
            timeout_ms: env_value_u64(&lookup, "WIKI_HTTP_TIMEOUT_MS", DEFAULT_HTTP_TIMEOUT_MS),
        }
    }
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    request_count: usize,
    csrf_token: Option<String>,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        Url::parse(&config.api_url)
            .with_context(|| format!("invalid WIKI_API_URL: {}", config.api_url))?;
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            request_count: 0,
            csrf_token: None,
        })
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let pairs = api_pairs(params);
        self.request_count += 1;
        let response = self
            .client
            .get(&self.config.api_url)
            .header("User-Agent", self.config.user_agent.clone())
            .query(&pairs)
            .send()
            .context("failed to call MediaWiki API")?;
        decode_api_response(response)
    }

    fn request_json_post(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let pairs = api_pairs(params);
        self.request_count += 1;
        let response = self
            .client
            .post(&self.config.api_url)
            .header("User-Agent", self.config.user_agent.clone())
            .form(&pairs)
            .send()
            .context("failed to call MediaWiki API")?;
        decode_api_response(response)
    }

    fn ensure_csrf_token(&mut self) -> Result<String> {
        if let Some(token) = &self.csrf_token {
            return Ok(token.clone());
        }
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
        ])?;
        let parsed: TokenQueryResponse =
            serde_json::from_value(response).context("failed to decode csrf token response")?;
        let token = parsed
            .query
            .tokens
            .and_then(|tokens| tokens.csrftoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }
}

impl WikiWriteApi for MediaWikiClient {
    fn login(&mut self, username: &str, password: &str) -> Result<()> {
        let token_response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "tokens".to_string()),
            ("type", "login".to_string()),
        ])?;
        let token_payload: TokenQueryResponse = serde_json::from_value(token_response)
            .context("failed to decode login token response")?;
        let login_token = token_payload
            .query
            .tokens
            .and_then(|tokens| tokens.logintoken)
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let login_response = self.request_json_post(&[
            ("action", "login".to_string()),
            ("lgname", username.to_string()),
            ("lgpassword", password.to_string()),
            ("lgtoken", login_token),
        ])?;
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        check_login(login_payload.login)?;
        self.csrf_token = None;
        Ok(())
    }

    fn edit_page(
        &mut self,
        title: &str,
        content: &str,
        summary: &str,
        minor: bool,
    ) -> Result<SavedEdit> {
        let token = self.ensure_csrf_token()?;
        let minor_flag = if minor { "minor" } else { "notminor" };
        let response = self.request_json_post(&[
            ("action", "edit".to_string()),
            ("title", title.to_string()),
            ("text", content.to_string()),
            ("summary", summary.to_string()),
            ("bot", "1".to_string()),
            (minor_flag, "1".to_string()),
            ("token", token),
        ])?;
        let edit_payload: EditResponse =
            serde_json::from_value(response).context("failed to decode edit response")?;
        saved_edit_from_payload(title, edit_payload)
    }

    fn request_count(&self) -> usize {
        self.request_count
    }
}

/// Log in and overwrite the report page. Exactly one edit request is made.
pub fn publish_page<A: WikiWriteApi>(
    api: &mut A,
    credentials: &BotCredentials,
    page: &ReportPage,
) -> Result<SavedEdit> {
    info!("logging in to bot account {}", credentials.username);
    api.login(&credentials.username, &credentials.password)
        .context("report login failed")?;

    info!("writing to [[{}]]", page.title);
    let saved = api
        .edit_page(&page.title, &page.text, &page.summary, page.minor)
        .with_context(|| format!("failed to save [[{}]]", page.title))?;
    match saved.revision_id {
        Some(revision_id) if !saved.no_change => {
            info!("saved [[{}]] as revision {revision_id}", saved.title)
        }
        _ => info!("[[{}]] saved with no change", saved.title),
    }
    Ok(saved)
}

fn api_pairs(params: &[(&str, String)]) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len() + 2);
    pairs.push(("format".to_string(), "json".to_string()));
    pairs.push(("formatversion".to_string(), "2".to_string()));
    for (key, value) in params {
        if !value.is_empty() {
            pairs.push(((*key).to_string(), value.clone()));
        }
    }
    pairs
}

fn decode_api_response(response: reqwest::blocking::Response) -> Result<Value> {
    let status = response.status();
    if !status.is_success() {
        bail!("MediaWiki API request failed with HTTP {status}");
    }
    let payload: Value = response
        .json()
        .context("failed to decode MediaWiki API JSON response")?;
    check_api_error(payload)
}

fn check_api_error(payload: Value) -> Result<Value> {
    if let Some(error) = payload.get("error") {
        let code = error
            .get("code")
            .and_then(Value::as_str)
            .unwrap_or("unknown_error");
        let info = error
            .get("info")
            .and_then(Value::as_str)
            .unwrap_or("unknown info");
        bail!("MediaWiki API error [{code}]: {info}");
    }
    Ok(payload)
}

fn check_login(login: LoginPayload) -> Result<()> {
    match login.result.as_deref() {
        Some("Success") => Ok(()),
        other => bail!(
            "MediaWiki login failed: {}",
            login
                .reason
                .or_else(|| other.map(ToString::to_string))
                .unwrap_or_else(|| "unknown error".to_string())
        ),
    }
}

fn saved_edit_from_payload(title: &str, payload: EditResponse) -> Result<SavedEdit> {
    let edit = payload
        .edit
        .ok_or_else(|| anyhow::anyhow!("missing edit payload in API response"))?;
    if edit.result.as_deref() != Some("Success") {
        bail!(
            "MediaWiki edit failed for {}: {}",
            title,
            edit.result.unwrap_or_else(|| "unknown".to_string())
        );
    }
    Ok(SavedEdit {
        title: edit.title.unwrap_or_else(|| title.to_string()),
        revision_id: edit.newrevid,
        no_change: edit.nochange.unwrap_or(false),
    })
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryResponse {
    #[serde(default)]
    query: TokenQueryPayload,
}

#[derive(Debug, Deserialize, Default)]
struct TokenQueryPayload {
    tokens: Option<TokenPayload>,
}

#[derive(Debug, Deserialize)]
struct TokenPayload {
    csrftoken: Option<String>,
    logintoken: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginResponse {
    login: LoginPayload,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize)]
struct EditPayload {
    result: Option<String>,
    title: Option<String>,
    newrevid: Option<u64>,
    nochange: Option<bool>,
}
