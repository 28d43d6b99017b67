//! HTTP session with retry logic, timeouts, cookie jar and modem-specific auth state

use crate::config::HttpConfig;
use crate::models::Credentials;
use crate::utils;
use anyhow::Result;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, USER_AGENT};
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use thiserror::Error;
use url::Url;

const MAX_REDIRECTS: usize = 10;
/// Backoff stops doubling at 2^5 = 32s
const MAX_BACKOFF_SHIFT: u32 = 5;

/// Timeouts and retry budget for one session
#[derive(Debug, Clone)]
pub struct HttpSettings {
    pub timeout: Duration,
    pub connect_timeout: Duration,
    /// Extra attempts after the first for transport errors and 5xx answers
    pub max_retries: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(5),
            max_retries: 1,
        }
    }
}

impl From<&HttpConfig> for HttpSettings {
    fn from(cfg: &HttpConfig) -> Self {
        Self {
            timeout: Duration::from_secs(cfg.timeout),
            connect_timeout: Duration::from_secs(cfg.connect_timeout),
            max_retries: cfg.max_retries,
        }
    }
}

/// A fully-read response. Non-2xx statuses are data, not errors.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    /// Final URL after any followed redirects
    pub url: Url,
    pub headers: HeaderMap,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    async fn read(resp: Response) -> Result<Self> {
        let status = resp.status();
        let url = resp.url().clone();
        let headers = resp.headers().clone();
        let body = resp.text().await?;
        Ok(Self {
            status,
            url,
            headers,
            body,
        })
    }
}

/// HNAP session token attached to every HNAP call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HnapToken {
    /// `HNAP_AUTH` value handed out by the device, replayed verbatim
    Issued(String),
    /// Private key from the challenge login; each call is signed with it
    Signed { private_key: String },
}

/// Cookie jar that can be emptied between login attempts
#[derive(Default)]
struct SessionCookies(RwLock<Jar>);

impl SessionCookies {
    fn jar(&self) -> std::sync::RwLockReadGuard<'_, Jar> {
        self.0.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn clear(&self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Jar::default();
    }
}

impl CookieStore for SessionCookies {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        self.jar().set_cookies(cookie_headers, url);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.jar().cookies(url)
    }
}

/// Cookie, header and credential state for one modem.
///
/// Owned by a single discovery run or poll loop; never shared between hosts.
pub struct ModemSession {
    inner: Client,
    cookies: Arc<SessionCookies>,
    settings: HttpSettings,
    basic_auth: Option<Credentials>,
    hnap: Option<HnapToken>,
}

impl ModemSession {
    pub fn new(settings: HttpSettings) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static("Mozilla/5.0 (X11; Linux x86_64) modemscout/0.1"),
        );
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("text/html,application/xhtml+xml,application/json,*/*;q=0.8"),
        );
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("en-US,en;q=0.9"));

        let cookies = Arc::new(SessionCookies::default());

        // Modems ship self-signed certificates; this client only talks to the LAN device.
        let client = Client::builder()
            .cookie_provider(Arc::clone(&cookies))
            .danger_accept_invalid_certs(true)
            .timeout(settings.timeout)
            .connect_timeout(settings.connect_timeout)
            .redirect(redirect_policy())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            inner: client,
            cookies,
            settings,
            basic_auth: None,
            hnap: None,
        })
    }

    pub fn settings(&self) -> &HttpSettings {
        &self.settings
    }

    /// Send these credentials as HTTP Basic on every following request
    pub fn enable_basic_auth(&mut self, credentials: Credentials) {
        self.basic_auth = Some(credentials);
    }

    pub fn basic_auth_enabled(&self) -> bool {
        self.basic_auth.is_some()
    }

    pub fn hnap_token(&self) -> Option<&HnapToken> {
        self.hnap.as_ref()
    }

    pub fn set_hnap_token(&mut self, token: HnapToken) {
        self.hnap = Some(token);
    }

    /// Drop per-strategy auth state before trying another parser: Basic
    /// credentials, the HNAP token and every session cookie
    pub fn clear_auth(&mut self) {
        self.basic_auth = None;
        self.hnap = None;
        self.cookies.clear();
    }

    /// Store a `name=value` cookie for the given URL
    pub fn add_cookie(&self, cookie: &str, url: &Url) {
        self.cookies.jar().add_cookie_str(cookie, url);
    }

    pub async fn get(&self, url: &Url) -> Result<HttpResponse> {
        tracing::debug!("GET {}", url);
        self.send(|| self.inner.get(url.clone())).await
    }

    pub async fn post_form(&self, url: &Url, form: &[(&str, &str)]) -> Result<HttpResponse> {
        tracing::debug!("POST form {}", url);
        self.send(|| self.inner.post(url.clone()).form(form)).await
    }

    pub async fn post_body(
        &self,
        url: &Url,
        body: &str,
        headers: HeaderMap,
    ) -> Result<HttpResponse> {
        tracing::debug!("POST {} ({} bytes)", url, body.len());
        self.send(|| {
            self.inner
                .post(url.clone())
                .headers(headers.clone())
                .body(body.to_string())
        })
        .await
    }

    async fn send<F>(&self, build: F) -> Result<HttpResponse>
    where
        F: Fn() -> RequestBuilder,
    {
        let resp = self.with_retry(|| self.authorize(build()).send()).await?;
        HttpResponse::read(resp).await
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.basic_auth {
            Some(creds) => request.basic_auth(&creds.username, Some(&creds.password)),
            None => request,
        }
    }

    /// Retry transport errors and 5xx answers with exponential backoff
    async fn with_retry<F, Fut>(&self, request_fn: F) -> Result<Response>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = reqwest::Result<Response>>,
    {
        let attempts = self.settings.max_retries + 1;

        for attempt in 0..attempts {
            let last = attempt + 1 == attempts;
            match request_fn().await {
                Ok(resp) if resp.status().is_server_error() && !last => {
                    let delay = backoff(attempt);
                    tracing::warn!(
                        "Server error {}, retrying in {:?}... (attempt {}/{})",
                        resp.status(),
                        delay,
                        attempt + 1,
                        attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Ok(resp) => return Ok(resp),
                Err(e) if !last => {
                    let delay = backoff(attempt);
                    tracing::warn!(
                        "Request error: {}, retrying in {:?}... (attempt {}/{})",
                        e,
                        delay,
                        attempt + 1,
                        attempts
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(anyhow::anyhow!("Max retries exceeded"))
    }
}

/// Delay before retry number `attempt + 1`
fn backoff(attempt: u32) -> Duration {
    Duration::from_secs(1 << attempt.min(MAX_BACKOFF_SHIFT))
}

/// A required page answered with a non-2xx status
#[derive(Debug, Error)]
#[error("{url} returned {status}")]
pub struct StatusError {
    pub url: Url,
    pub status: StatusCode,
}

impl StatusError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status, StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN)
    }
}

/// Whether an error came from the network rather than from an HTTP answer
pub fn is_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| cause.is::<reqwest::Error>())
}

/// Whether the device answered 401/403 where a page was required
pub fn is_unauthorized(err: &anyhow::Error) -> bool {
    err.chain()
        .filter_map(|cause| cause.downcast_ref::<StatusError>())
        .any(StatusError::is_unauthorized)
}

/// Follow redirects only while they pass the host-trust rule
fn redirect_policy() -> Policy {
    Policy::custom(|attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("too many redirects");
        }
        let trusted = attempt
            .previous()
            .first()
            .map(|origin| utils::is_trusted_redirect(origin, attempt.url()))
            .unwrap_or(true);
        if trusted {
            attempt.follow()
        } else {
            tracing::warn!("Refusing redirect to untrusted host: {}", attempt.url());
            attempt.stop()
        }
    })
}
