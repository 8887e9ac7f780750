use std::collections::BTreeMap;
use std::env;
use std::thread::sleep;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::blocking::Client;
use reqwest::{StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::api::{WikiReadApi, WikiWriteApi};
use crate::error::WikiSyncError;
use crate::site::{Site, qualify_category_title};

/// Families hosted as `https://<code>.<family>.org/w/api.php`.
const LANGUAGE_FAMILIES: &[&str] = &[
    "wikipedia",
    "wiktionary",
    "wikibooks",
    "wikinews",
    "wikiquote",
    "wikisource",
    "wikiversity",
    "wikivoyage",
];

#[derive(Debug, Clone)]
pub struct MediaWikiClientConfig {
    pub api_url: String,
    pub user_agent: String,
    pub timeout_ms: u64,
    pub rate_limit_read_ms: u64,
    pub rate_limit_write_ms: u64,
    pub max_retries: usize,
    pub max_write_retries: usize,
    pub retry_delay_ms: u64,
}

impl MediaWikiClientConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: String::new(),
            user_agent: env_value("WIKI_USER_AGENT", crate::config::DEFAULT_USER_AGENT),
            timeout_ms: env_value_u64("WIKI_HTTP_TIMEOUT_MS", 30_000),
            rate_limit_read_ms: env_value_u64("WIKI_RATE_LIMIT_READ", 300),
            rate_limit_write_ms: env_value_u64("WIKI_RATE_LIMIT_WRITE", 1_000),
            max_retries: env_value_usize("WIKI_HTTP_RETRIES", 2),
            max_write_retries: env_value_usize("WIKI_HTTP_WRITE_RETRIES", 1),
            retry_delay_ms: env_value_u64("WIKI_HTTP_RETRY_DELAY_MS", 500),
        }
    }

    fn for_endpoint(&self, api_url: &str) -> Self {
        Self {
            api_url: api_url.to_string(),
            ..self.clone()
        }
    }
}

/// API endpoint of a well-known Wikimedia family.
pub fn family_api_url(family: &str, code: &str) -> Option<String> {
    let family = family.trim().to_ascii_lowercase();
    let code = code.trim();
    if LANGUAGE_FAMILIES.contains(&family.as_str()) {
        if code.is_empty() {
            return None;
        }
        return Some(format!("https://{code}.{family}.org/w/api.php"));
    }
    let host = match family.as_str() {
        "commons" => "commons.wikimedia.org",
        "meta" => "meta.wikimedia.org",
        "species" => "species.wikimedia.org",
        "mediawiki" => "www.mediawiki.org",
        "wikidata" => "www.wikidata.org",
        _ => return None,
    };
    Some(format!("https://{host}/w/api.php"))
}

pub struct MediaWikiClient {
    client: Client,
    config: MediaWikiClientConfig,
    last_request_at: Option<Instant>,
    request_count: usize,
    csrf_token: Option<String>,
}

impl MediaWikiClient {
    pub fn new(config: MediaWikiClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .cookie_store(true)
            .build()
            .context("failed to build MediaWiki HTTP client")?;

        Ok(Self {
            client,
            config,
            last_request_at: None,
            request_count: 0,
            csrf_token: None,
        })
    }

    pub fn set_write_delay(&mut self, delay: Duration) {
        self.config.rate_limit_write_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
    }

    pub fn request_count(&self) -> usize {
        self.request_count
    }

    pub fn site_name(&mut self) -> Result<String> {
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("meta", "siteinfo".to_string()),
            ("siprop", "general".to_string()),
        ])?;
        let parsed: SiteInfoResponse =
            serde_json::from_value(response).context("failed to decode siteinfo response")?;
        Ok(parsed.query.general.sitename.unwrap_or_default())
    }

    pub fn page_info(&mut self, title: &str) -> Result<PageInfo> {
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "info".to_string()),
        ])?;
        parse_page_info(response)
    }

    pub fn page_content(&mut self, title: &str) -> Result<Option<String>> {
        let response = self.request_json_get(&[
            ("action", "query".to_string()),
            ("titles", title.to_string()),
            ("prop", "revisions".to_string()),
            ("rvprop", "content".to_string()),
            ("rvslots", "main".to_string()),
        ])?;
        parse_page_content(response)
    }

    pub fn templates(&mut self, title: &str) -> Result<Vec<String>> {
        let mut titles = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("action", "query".to_string()),
                ("titles", title.to_string()),
                ("prop", "templates".to_string()),
                ("tllimit", "max".to_string()),
            ];
            if let Some(token) = &continue_token {
                params.push(("tlcontinue", token.clone()));
            }

            let response = self.request_json_get(&params)?;
            let parsed: QueryResponse = serde_json::from_value(response)
                .context("failed to decode templates API response")?;
            for page in parsed.query.pages {
                titles.extend(page.templates.into_iter().map(|item| item.title));
            }

            continue_token = parsed.continuation.and_then(|cont| cont.tlcontinue);
            if continue_token.is_none() {
                break;
            }
        }

        Ok(titles)
    }

    pub fn category_members(&mut self, category_title: &str) -> Result<Vec<String>> {
        let mut titles = Vec::new();
        let mut continue_token: Option<String> = None;

        loop {
            let mut params = vec![
                ("action", "query".to_string()),
                ("list", "categorymembers".to_string()),
                ("cmtitle", category_title.to_string()),
                ("cmtype", "page".to_string()),
                ("cmlimit", "500".to_string()),
            ];
            if let Some(token) = &continue_token {
                params.push(("cmcontinue", token.clone()));
            }

            let response = self.request_json_get(&params)?;
            let parsed: QueryResponse = serde_json::from_value(response)
                .context("failed to decode categorymembers API response")?;
            for item in parsed.query.categorymembers {
                titles.push(item.title);
            }

            continue_token = parsed.continuation.and_then(|cont| cont.cmcontinue);
            if continue_token.is_none() {
                break;
            }
        }

        Ok(titles)
    }

    pub fn login(&mut self, username: &str, password: &str) -> Result<()> {
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
            .as_ref()
            .and_then(|tokens| tokens.logintoken.as_ref())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki login token"))?;

        let login_response = self.request_json_post(
            &[
                ("action", "login".to_string()),
                ("lgname", username.to_string()),
                ("lgpassword", password.to_string()),
                ("lgtoken", login_token),
            ],
            true,
        )?;
        let login_payload: LoginResponse =
            serde_json::from_value(login_response).context("failed to decode login response")?;
        match login_payload.login.result.as_deref() {
            Some("Success") => {
                self.csrf_token = None;
                Ok(())
            }
            other => bail!(
                "MediaWiki login failed: {}",
                login_payload
                    .login
                    .reason
                    .or_else(|| other.map(ToString::to_string))
                    .unwrap_or_else(|| "unknown error".to_string())
            ),
        }
    }

    /// Creates the page; the edit is rejected if the title already exists.
    pub fn create_page(&mut self, title: &str, content: &str, summary: &str) -> Result<bool> {
        let token = self.ensure_csrf_token()?;
        let response =
            self.request_json_post(&create_page_params(title, content, summary, token), true)?;
        parse_edit_result(title, response)
    }

    fn request_json_get(&mut self, params: &[(&str, String)]) -> Result<Value> {
        let base_url = Url::parse(&self.config.api_url)
            .with_context(|| format!("invalid MediaWiki API URL: {}", self.config.api_url))?;
        let pairs = with_format_params(params);

        for attempt in 0..=self.config.max_retries {
            self.apply_rate_limit(false);
            debug!("GET {} {:?}", self.config.api_url, params.first());
            let response = self
                .client
                .get(base_url.clone())
                .header("User-Agent", self.config.user_agent.clone())
                .query(&pairs)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < self.config.max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt, false);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }

                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    check_api_error(&payload)?;
                    return Ok(payload);
                }
                Err(error) => {
                    if attempt < self.config.max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt, false);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    fn request_json_post(&mut self, params: &[(&str, String)], is_write: bool) -> Result<Value> {
        let max_retries = if is_write {
            self.config.max_write_retries
        } else {
            self.config.max_retries
        };
        let pairs = with_format_params(params);

        for attempt in 0..=max_retries {
            self.apply_rate_limit(is_write);
            debug!("POST {} {:?}", self.config.api_url, params.first());
            let response = self
                .client
                .post(&self.config.api_url)
                .header("User-Agent", self.config.user_agent.clone())
                .form(&pairs)
                .send();

            match response {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() {
                        if attempt < max_retries && is_retryable_status(status) {
                            self.wait_before_retry(attempt, is_write);
                            continue;
                        }
                        bail!("MediaWiki API request failed with HTTP {status}");
                    }

                    let payload: Value = response
                        .json()
                        .context("failed to decode MediaWiki API JSON response")?;
                    check_api_error(&payload)?;
                    return Ok(payload);
                }
                Err(error) => {
                    if attempt < max_retries && is_retryable_error(&error) {
                        self.wait_before_retry(attempt, is_write);
                        continue;
                    }
                    return Err(error).context("failed to call MediaWiki API");
                }
            }
        }

        bail!("MediaWiki API request exhausted retry budget")
    }

    fn apply_rate_limit(&mut self, is_write: bool) {
        let delay = if is_write {
            Duration::from_millis(self.config.rate_limit_write_ms)
        } else {
            Duration::from_millis(self.config.rate_limit_read_ms)
        };
        if let Some(last) = self.last_request_at {
            let elapsed = last.elapsed();
            if elapsed < delay {
                sleep(delay - elapsed);
            }
        }
        self.last_request_at = Some(Instant::now());
        self.request_count += 1;
    }

    fn wait_before_retry(&self, attempt: usize, is_write: bool) {
        let exponent = u32::try_from(attempt).unwrap_or(16);
        let base = self
            .config
            .retry_delay_ms
            .saturating_mul(2u64.saturating_pow(exponent));
        let jitter = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| u64::from(duration.subsec_millis() % 100))
            .unwrap_or(0);
        let multiplier = if is_write { 2u64 } else { 1u64 };
        let delay = base.saturating_mul(multiplier).saturating_add(jitter);
        debug!("retrying MediaWiki request in {delay}ms (attempt {})", attempt + 1);
        sleep(Duration::from_millis(delay));
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
            .as_ref()
            .and_then(|tokens| tokens.csrftoken.as_ref())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("failed to get MediaWiki csrf token"))?;
        self.csrf_token = Some(token.clone());
        Ok(token)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageInfo {
    pub exists: bool,
    pub interwiki: Option<String>,
}

impl PageInfo {
    /// The site a title opened on `site` belongs to.
    pub fn site(&self, site: &Site) -> Site {
        match &self.interwiki {
            Some(prefix) => Site::new(prefix.clone(), site.code.clone()),
            None => site.clone(),
        }
    }
}

/// One [`MediaWikiClient`] per connected site.
pub struct MediaWikiService {
    config: MediaWikiClientConfig,
    endpoints: BTreeMap<Site, String>,
    clients: BTreeMap<Site, MediaWikiClient>,
    last_lookup: Option<(Site, String, PageInfo)>,
}

impl MediaWikiService {
    pub fn new(config: MediaWikiClientConfig, endpoints: Vec<(Site, String)>) -> Self {
        Self {
            config,
            endpoints: endpoints.into_iter().collect(),
            clients: BTreeMap::new(),
            last_lookup: None,
        }
    }

    pub fn from_env(endpoints: Vec<(Site, String)>) -> Self {
        Self::new(MediaWikiClientConfig::from_env(), endpoints)
    }

    pub fn api_url(&self, site: &Site) -> Result<String> {
        if let Some(url) = self.endpoints.get(site) {
            return Ok(url.clone());
        }
        family_api_url(&site.family, &site.code).ok_or_else(|| {
            WikiSyncError::configuration(format!(
                "no API endpoint known for {site}; set api_url for this site"
            ))
            .into()
        })
    }

    /// Looks a title up once; the next `page_site` for the same title reuses
    /// the answer instead of querying again.
    fn lookup(&mut self, site: &Site, title: &str) -> Result<PageInfo> {
        if let Some((cached_site, cached_title, info)) = self.last_lookup.take()
            && cached_site == *site
            && cached_title == title
        {
            return Ok(info);
        }
        let info = self.client(site)?.page_info(title)?;
        self.last_lookup = Some((site.clone(), title.to_string(), info.clone()));
        Ok(info)
    }

    fn client(&mut self, site: &Site) -> Result<&mut MediaWikiClient> {
        self.clients
            .get_mut(site)
            .ok_or_else(|| anyhow::anyhow!("site {site} is not connected"))
    }
}

impl WikiReadApi for MediaWikiService {
    fn connect(&mut self, family: &str, code: &str) -> Result<Site> {
        let site = Site::new(family, code);
        if self.clients.contains_key(&site) {
            return Ok(site);
        }
        let api_url = self.api_url(&site)?;
        let mut client = MediaWikiClient::new(self.config.for_endpoint(&api_url))?;
        let name = client
            .site_name()
            .map_err(|error| WikiSyncError::ServiceUnavailable {
                site: site.clone(),
                detail: format!("{error:#}"),
            })?;
        debug!("connected to {site} ({name}) at {api_url}");
        self.clients.insert(site.clone(), client);
        Ok(site)
    }

    fn page_exists(&mut self, site: &Site, title: &str) -> Result<bool> {
        self.last_lookup = None;
        Ok(self.lookup(site, title)?.exists)
    }

    fn page_site(&mut self, site: &Site, title: &str) -> Result<Site> {
        Ok(self.lookup(site, title)?.site(site))
    }

    fn page_text(&mut self, site: &Site, title: &str) -> Result<String> {
        self.client(site)?.page_content(title)?.ok_or_else(|| {
            WikiSyncError::PageMissing {
                site: site.clone(),
                title: title.to_string(),
            }
            .into()
        })
    }

    fn invoked_templates(&mut self, site: &Site, title: &str) -> Result<Vec<String>> {
        self.client(site)?.templates(title)
    }

    fn category_articles(&mut self, site: &Site, category: &str) -> Result<Vec<String>> {
        let category_title = qualify_category_title(category);
        let client = self.client(site)?;
        if !client.page_info(&category_title)?.exists {
            return Err(WikiSyncError::CategoryNotFound {
                site: site.clone(),
                title: category_title,
            }
            .into());
        }
        client.category_members(&category_title)
    }

    fn request_count(&self) -> usize {
        self.clients.values().map(MediaWikiClient::request_count).sum()
    }
}

impl WikiWriteApi for MediaWikiService {
    fn login(&mut self, site: &Site, username: &str, password: &str) -> Result<()> {
        self.client(site)?
            .login(username, password)
            .with_context(|| format!("login to {site} failed"))
    }

    fn commit_page(
        &mut self,
        site: &Site,
        title: &str,
        text: &str,
        summary: &str,
    ) -> Result<bool> {
        self.last_lookup = None;
        self.client(site)?.create_page(title, text, summary)
    }

    fn set_write_throttle(&mut self, site: &Site, delay: Duration) {
        if let Some(client) = self.clients.get_mut(site) {
            client.set_write_delay(delay);
        }
    }
}

/// Parameters whose empty value is meaningful and must still be sent.
const KEEP_EMPTY_PARAMS: &[&str] = &["text", "summary"];

fn with_format_params(params: &[(&str, String)]) -> Vec<(String, String)> {
    let mut pairs = Vec::with_capacity(params.len() + 2);
    pairs.push(("format".to_string(), "json".to_string()));
    pairs.push(("formatversion".to_string(), "2".to_string()));
    for (key, value) in params {
        if !value.is_empty() || KEEP_EMPTY_PARAMS.contains(key) {
            pairs.push(((*key).to_string(), value.clone()));
        }
    }
    pairs
}

fn create_page_params(
    title: &str,
    content: &str,
    summary: &str,
    token: String,
) -> Vec<(&'static str, String)> {
    vec![
        ("action", "edit".to_string()),
        ("title", title.to_string()),
        ("text", content.to_string()),
        ("summary", summary.to_string()),
        ("createonly", "1".to_string()),
        ("bot", "1".to_string()),
        ("token", token),
    ]
}

fn parse_page_info(response: Value) -> Result<PageInfo> {
    let parsed: QueryResponse =
        serde_json::from_value(response).context("failed to decode page info response")?;

    if let Some(item) = parsed.query.interwiki.into_iter().next() {
        return Ok(PageInfo {
            exists: false,
            interwiki: Some(item.iw),
        });
    }
    let exists = parsed
        .query
        .pages
        .first()
        .is_some_and(|page| !page.missing.unwrap_or(false) && !page.invalid.unwrap_or(false));
    Ok(PageInfo {
        exists,
        interwiki: None,
    })
}

fn parse_page_content(response: Value) -> Result<Option<String>> {
    let parsed: QueryResponse =
        serde_json::from_value(response).context("failed to decode page content response")?;

    let content = parsed
        .query
        .pages
        .into_iter()
        .find(|page| !page.missing.unwrap_or(false))
        .and_then(|page| page.revisions.into_iter().next())
        .and_then(|revision| revision.slots)
        .and_then(|slots| slots.main)
        .map(|slot| slot.content);
    Ok(content)
}

/// Anything but `Success` is a refused edit, not an error.
fn parse_edit_result(title: &str, response: Value) -> Result<bool> {
    let payload: EditResponse =
        serde_json::from_value(response).context("failed to decode edit response")?;
    let result = payload.edit.and_then(|edit| edit.result);
    if result.as_deref() != Some("Success") {
        debug!(
            "edit of {title} returned {}",
            result.as_deref().unwrap_or("no result")
        );
        return Ok(false);
    }
    Ok(true)
}

fn check_api_error(payload: &Value) -> Result<()> {
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
    Ok(())
}

fn env_value(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_value_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_value_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|value| value.trim().parse::<usize>().ok())
        .unwrap_or(default)
}

fn is_retryable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::REQUEST_TIMEOUT
            | StatusCode::TOO_MANY_REQUESTS
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

fn is_retryable_error(error: &reqwest::Error) -> bool {
    error.is_timeout() || error.is_connect() || error.is_request()
}

#[derive(Debug, Deserialize, Default)]
struct QueryResponse {
    #[serde(default)]
    query: QueryPayload,
    #[serde(default, rename = "continue")]
    continuation: Option<ContinuationPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct QueryPayload {
    #[serde(default)]
    categorymembers: Vec<TitleQueryItem>,
    #[serde(default)]
    pages: Vec<PageQueryItem>,
    #[serde(default)]
    interwiki: Vec<InterwikiQueryItem>,
}

#[derive(Debug, Deserialize, Default)]
struct ContinuationPayload {
    cmcontinue: Option<String>,
    tlcontinue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TitleQueryItem {
    title: String,
}

#[derive(Debug, Deserialize)]
struct InterwikiQueryItem {
    iw: String,
}

#[derive(Debug, Deserialize)]
struct PageQueryItem {
    missing: Option<bool>,
    invalid: Option<bool>,
    #[serde(default)]
    revisions: Vec<RevisionQueryItem>,
    #[serde(default)]
    templates: Vec<TitleQueryItem>,
}

#[derive(Debug, Deserialize)]
struct RevisionQueryItem {
    slots: Option<RevisionSlotContainer>,
}

#[derive(Debug, Deserialize)]
struct RevisionSlotContainer {
    main: Option<RevisionMainSlot>,
}

#[derive(Debug, Deserialize)]
struct RevisionMainSlot {
    content: String,
}

#[derive(Debug, Deserialize, Default)]
struct SiteInfoResponse {
    #[serde(default)]
    query: SiteInfoPayload,
}

#[derive(Debug, Deserialize, Default)]
struct SiteInfoPayload {
    #[serde(default)]
    general: SiteInfoGeneral,
}

#[derive(Debug, Deserialize, Default)]
struct SiteInfoGeneral {
    sitename: Option<String>,
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

#[derive(Debug, Deserialize, Default)]
struct TokenPayload {
    logintoken: Option<String>,
    csrftoken: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LoginResponse {
    #[serde(default)]
    login: LoginPayload,
}

#[derive(Debug, Deserialize, Default)]
struct LoginPayload {
    result: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct EditResponse {
    edit: Option<EditPayload>,
}

#[derive(Debug, Deserialize, Default)]
struct EditPayload {
    result: Option<String>,
}
