//! Tiered modem detection
//!
//! `discover` tries the caller's cached parser first, then every parser whose
//! status page is readable without a login, then every remaining parser in
//! the order the root-page heuristics suggest. A `CircuitBreaker` bounds the
//! whole run. Tiers only move forward; a parser tried in one tier is not
//! retried in a later one.
//!
//! The returned `DetectionResult` owns the logged-in session. Callers keep it
//! and hand it back to `poll` instead of re-running detection.

use crate::auth::{self, AuthConfig};
use crate::circuit_breaker::{CircuitBreaker, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_DURATION};
use crate::config::Config;
use crate::error::ModemError;
use crate::heuristics;
use crate::http::{is_transport_error, is_unauthorized, HttpResponse, HttpSettings, ModemSession};
use crate::models::{Credentials, Page, ParseResult};
use crate::registry::{validate_capabilities, ModemParser, ParserDescriptor, ParserRegistry, UrlPattern};
use crate::utils;
use reqwest::header::HeaderMap;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

/// Tier that produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Cached,
    Anonymous,
    Heuristic,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cached => "cached",
            Self::Anonymous => "anonymous",
            Self::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A matched modem: the parser, where it answered and the session that reached it
pub struct DetectionResult {
    parser: Arc<dyn ModemParser>,
    base_url: Url,
    session: ModemSession,
    credentials: Option<Credentials>,
    pages: Vec<Page>,
    tier: Tier,
    attempts: u32,
}

impl DetectionResult {
    pub fn descriptor(&self) -> &'static ParserDescriptor {
        self.parser.descriptor()
    }

    /// Registry name, suitable as the `hint` for the next `discover`
    pub fn parser_name(&self) -> &'static str {
        self.descriptor().name
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    /// Parser trials the run needed, including the matching one
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Pages from the most recent fetch
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// Parse the most recently fetched pages. Issues no requests.
    pub fn parse(&self) -> ParseResult {
        let result = self.parser.parse(&self.pages);
        validate_capabilities(self.descriptor(), &result);
        result
    }

    fn store(&mut self, pages: Vec<Page>) -> ParseResult {
        self.pages = pages;
        self.parse()
    }
}

impl fmt::Debug for DetectionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DetectionResult")
            .field("parser", &self.parser_name())
            .field("base_url", &self.base_url.as_str())
            .field("tier", &self.tier)
            .field("attempts", &self.attempts)
            .field("pages", &self.pages.len())
            .finish()
    }
}

/// Runs detection and polling against modems. Holds no per-host state, so one
/// engine can serve many hosts concurrently.
#[derive(Clone)]
pub struct DiscoveryEngine {
    registry: ParserRegistry,
    settings: HttpSettings,
    max_attempts: u32,
    max_duration: Duration,
    deadline: Option<Instant>,
}

impl DiscoveryEngine {
    pub fn new(registry: ParserRegistry) -> Self {
        Self {
            registry,
            settings: HttpSettings::default(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_duration: DEFAULT_MAX_DURATION,
            deadline: None,
        }
    }

    pub fn from_config(registry: ParserRegistry, config: &Config) -> Self {
        Self::new(registry)
            .with_http_settings(HttpSettings::from(&config.http))
            .with_limits(config.discovery.max_attempts, config.discovery.max_duration())
    }

    pub fn with_http_settings(mut self, settings: HttpSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Circuit-breaker budget for each `discover` call
    pub fn with_limits(mut self, max_attempts: u32, max_duration: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.max_duration = max_duration;
        self
    }

    /// No `discover` call may run past this instant
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn registry(&self) -> &ParserRegistry {
        &self.registry
    }

    fn breaker(&self) -> CircuitBreaker {
        match self.deadline {
            Some(deadline) => CircuitBreaker::with_deadline(self.max_attempts, self.max_duration, deadline),
            None => CircuitBreaker::new(self.max_attempts, self.max_duration),
        }
    }

    /// Identify the modem at `host` and log in to it.
    ///
    /// `hint` names a parser to try before any search, typically the
    /// `parser_name()` of an earlier result. A stale hint only costs one attempt.
    pub async fn discover(
        &self,
        host: &str,
        credentials: Option<Credentials>,
        hint: Option<&str>,
    ) -> Result<DetectionResult, ModemError> {
        let breaker = self.breaker();
        let session = ModemSession::new(self.settings.clone())
            .map_err(|e| ModemError::connection(host, format!("{:#}", e)))?;
        let (base_url, root) = match tokio::time::timeout(breaker.remaining(), resolve(&session, host)).await {
            Ok(resolved) => resolved?,
            Err(_) => {
                tracing::warn!("No answer from {} within the detection budget", host);
                return Err(ModemError::CircuitBreaker {
                    attempts: breaker.attempts(),
                    elapsed: breaker.elapsed(),
                });
            }
        };
        tracing::info!("Detecting modem at {}", base_url);

        let run = Run {
            registry: &self.registry,
            host: utils::host_label(&base_url),
            base_url,
            session,
            credentials,
            breaker,
            reached: root.is_some(),
            root,
            tried: HashSet::new(),
            attempted: Vec::new(),
            last_transport_error: None,
            rejected_by: None,
            page_title: None,
        };
        run.execute(hint).await
    }

    /// Fetch and parse fresh data through a detected modem's session.
    ///
    /// An unusable answer (expired session, login page instead of status
    /// page, non-2xx) triggers one fresh login and a second fetch.
    pub async fn poll(&self, detection: &mut DetectionResult) -> Result<ParseResult, ModemError> {
        let host = utils::host_label(&detection.base_url);
        let parser = Arc::clone(&detection.parser);
        let d = parser.descriptor();

        match parser.fetch(&mut detection.session, &detection.base_url).await {
            Ok(pages) if is_usable(parser.as_ref(), &pages) => return Ok(detection.store(pages)),
            Ok(_) => tracing::info!("{} returned an unusable page, logging in again", d.name),
            Err(e) if is_transport_error(&e) => {
                return Err(ModemError::connection(host, format!("{:#}", e)))
            }
            Err(e) => tracing::info!("{} fetch failed ({:#}), logging in again", d.name, e),
        }

        detection.session.clear_auth();
        let outcome = auth::strategy_for(&d.auth)
            .login(
                &mut detection.session,
                &detection.base_url,
                detection.credentials.as_ref(),
            )
            .await
            .map_err(|e| ModemError::connection(&host, format!("{:#}", e)))?;
        if !outcome.success {
            return Err(ModemError::Authentication {
                parser: d.name.to_string(),
            });
        }

        let landed = landed_page(parser.as_ref(), outcome.body);
        let pages = match fetch_after_login(&mut detection.session, &detection.base_url, parser.as_ref(), landed).await {
            Ok(pages) => pages,
            Err(e) if is_unauthorized(&e) => {
                return Err(ModemError::Authentication {
                    parser: d.name.to_string(),
                })
            }
            Err(e) if is_transport_error(&e) => {
                return Err(ModemError::connection(host, format!("{:#}", e)))
            }
            Err(e) => {
                tracing::debug!("{} fetch after login failed: {:#}", d.name, e);
                Vec::new()
            }
        };
        if is_usable(parser.as_ref(), &pages) {
            Ok(detection.store(pages))
        } else {
            Err(ModemError::ParserNotFound {
                attempted: vec![d.name.to_string()],
                page_title: pages.first().and_then(|p| heuristics::page_title(&p.body)),
            })
        }
    }
}

/// The first page is recognised and is not an expired-session answer
fn is_usable(parser: &dyn ModemParser, pages: &[Page]) -> bool {
    let Some(first) = pages.first() else {
        return false;
    };
    let expired = match parser.descriptor().auth {
        AuthConfig::Hnap(cfg) => first.body.contains(cfg.session_timeout_indicator),
        _ => false,
    };
    !expired && parser.can_parse(&first.body)
}

/// Status page a redirect login already landed on, when it is the
/// parser's first page and the parser recognises it
fn landed_page(parser: &dyn ModemParser, body: Option<String>) -> Option<Page> {
    let d = parser.descriptor();
    let AuthConfig::RedirectForm(cfg) = d.auth else {
        return None;
    };
    let first = d.primary_pattern()?;
    let body = body?;
    (first.path == cfg.authenticated_page_url && parser.can_parse(&body)).then(|| Page::new(first.path, body))
}

/// Status pages after a successful login. A landed page stands in for the
/// first GET; the parser's other pages are fetched best effort.
async fn fetch_after_login(
    session: &mut ModemSession,
    base_url: &Url,
    parser: &dyn ModemParser,
    landed: Option<Page>,
) -> anyhow::Result<Vec<Page>> {
    match landed {
        Some(first) => {
            let path = first.path.clone();
            let rest = parser.descriptor().url_patterns.iter().filter(|p| p.path != path);
            Ok(follow_up_pages(session, base_url, first, rest).await)
        }
        None => parser.fetch(session, base_url).await,
    }
}

/// `first` plus each of `patterns` that answers 2xx
async fn follow_up_pages(
    session: &ModemSession,
    base_url: &Url,
    first: Page,
    patterns: impl Iterator<Item = &'static UrlPattern>,
) -> Vec<Page> {
    let mut pages = vec![first];
    for pattern in patterns {
        let Ok(url) = utils::join_path(base_url, pattern.path) else {
            continue;
        };
        match session.get(&url).await {
            Ok(resp) if resp.is_success() => pages.push(Page::new(pattern.path, resp.body)),
            Ok(resp) => tracing::debug!("Skipping {}: status {}", url, resp.status),
            Err(e) => tracing::debug!("Skipping {}: {:#}", url, e),
        }
    }
    pages
}

/// Pick the base URL. A bare host is probed over http, then https; the
/// answering root page is returned so it need not be fetched again.
async fn resolve(session: &ModemSession, host: &str) -> Result<(Url, Option<HttpResponse>), ModemError> {
    let candidates = utils::candidate_base_urls(host).map_err(|e| ModemError::connection(host, e))?;
    if candidates.len() == 1 {
        if let Some(url) = candidates.into_iter().next() {
            return Ok((url, None));
        }
        return Err(ModemError::connection(host, "no usable address"));
    }

    let mut last_error = None;
    for url in candidates {
        match session.get(&url).await {
            Ok(resp) => {
                tracing::debug!("{} answered with {}", url, resp.status);
                return Ok((url, Some(resp)));
            }
            Err(e) => {
                tracing::debug!("{} unreachable: {:#}", url, e);
                last_error = Some(e);
            }
        }
    }
    Err(ModemError::connection(
        host,
        last_error
            .map(|e| format!("{:#}", e))
            .unwrap_or_else(|| "no usable address".to_string()),
    ))
}

/// Outcome of one parser trial
enum Trial {
    Matched(Vec<Page>),
    NoMatch,
    Rejected,
    Transport(anyhow::Error),
}

type Match = (Arc<dyn ModemParser>, Vec<Page>);

/// State of one `discover` call
struct Run<'a> {
    registry: &'a ParserRegistry,
    host: String,
    base_url: Url,
    session: ModemSession,
    credentials: Option<Credentials>,
    breaker: CircuitBreaker,
    /// Root page from base-URL probing, consumed by the heuristic tier
    root: Option<HttpResponse>,
    tried: HashSet<&'static str>,
    attempted: Vec<String>,
    /// Some HTTP answer came back during the run
    reached: bool,
    last_transport_error: Option<anyhow::Error>,
    /// Parser whose rejected login is blamed if nothing matches
    rejected_by: Option<&'static str>,
    page_title: Option<String>,
}

impl Run<'_> {
    async fn execute(mut self, hint: Option<&str>) -> Result<DetectionResult, ModemError> {
        if let Some(name) = hint {
            match self.registry.by_name(name) {
                Ok(parser) => {
                    tracing::info!("Trying cached parser {}", name);
                    if let Some(pages) = self.full_trial(&parser, true).await? {
                        return Ok(self.matched(parser, pages, Tier::Cached));
                    }
                }
                Err(e) => tracing::warn!("Ignoring cached parser hint: {}", e),
            }
        }

        if let Some((parser, pages)) = self.try_anonymous().await? {
            return Ok(self.matched(parser, pages, Tier::Anonymous));
        }
        if let Some((parser, pages)) = self.try_heuristic().await? {
            return Ok(self.matched(parser, pages, Tier::Heuristic));
        }
        Err(self.exhausted())
    }

    fn has_credentials(&self) -> bool {
        self.credentials
            .as_ref()
            .map(Credentials::is_complete)
            .unwrap_or(false)
    }

    /// Count one trial against the breaker
    fn begin(&mut self, d: &'static ParserDescriptor) -> Result<(), ModemError> {
        if !self.breaker.should_continue() {
            return Err(self.tripped());
        }
        self.breaker.record_attempt();
        if !self.attempted.iter().any(|n| n == d.name) {
            self.attempted.push(d.name.to_string());
        }
        tracing::debug!("Attempt {}: {}", self.breaker.attempts(), d.name);
        Ok(())
    }

    fn tripped(&self) -> ModemError {
        tracing::warn!(
            "Circuit breaker tripped after {} attempts in {:.1}s",
            self.breaker.attempts(),
            self.breaker.elapsed().as_secs_f64()
        );
        ModemError::CircuitBreaker {
            attempts: self.breaker.attempts(),
            elapsed: self.breaker.elapsed(),
        }
    }

    fn note_transport(&mut self, what: &str, err: anyhow::Error) {
        tracing::debug!("Transport error during {}: {:#}", what, err);
        self.last_transport_error = Some(err);
    }

    /// Every parser with a login-free status page, fetched without credentials
    async fn try_anonymous(&mut self) -> Result<Option<Match>, ModemError> {
        let candidates: Vec<Arc<dyn ModemParser>> = self
            .registry
            .parsers()
            .iter()
            .filter(|p| {
                let d = p.descriptor();
                !self.tried.contains(d.name) && d.anonymous_pattern().is_some()
            })
            .cloned()
            .collect();
        tracing::info!("Probing {} anonymous status pages", candidates.len());
        self.session.clear_auth();

        let mut bodies: HashMap<&'static str, Option<String>> = HashMap::new();
        for parser in candidates {
            let d = parser.descriptor();
            let Some(pattern) = d.anonymous_pattern() else {
                continue;
            };
            self.begin(d)?;
            if matches!(d.auth, AuthConfig::None) {
                self.tried.insert(d.name);
            }

            let body = match bodies.get(pattern.path) {
                Some(cached) => cached.clone(),
                None => {
                    let budget = self.breaker.remaining();
                    let fetched = tokio::time::timeout(budget, self.fetch_anonymous(pattern.path))
                        .await
                        .map_err(|_| self.tripped())?;
                    bodies.insert(pattern.path, fetched.clone());
                    fetched
                }
            };

            if let Some(body) = body.filter(|b| parser.can_parse(b)) {
                let budget = self.breaker.remaining();
                let pages = tokio::time::timeout(budget, self.anonymous_pages(d, pattern.path, body))
                    .await
                    .map_err(|_| self.tripped())?;
                return Ok(Some((parser, pages)));
            }
        }
        Ok(None)
    }

    async fn fetch_anonymous(&mut self, path: &str) -> Option<String> {
        let url = utils::join_path(&self.base_url, path).ok()?;
        match self.session.get(&url).await {
            Ok(resp) => {
                self.reached = true;
                if resp.is_success() {
                    Some(resp.body)
                } else {
                    tracing::debug!("{} returned {}", url, resp.status);
                    None
                }
            }
            Err(e) => {
                self.note_transport(path, e);
                None
            }
        }
    }

    /// The matched page plus the parser's other login-free pages, best effort
    async fn anonymous_pages(&self, d: &'static ParserDescriptor, path: &str, body: String) -> Vec<Page> {
        let rest = d
            .url_patterns
            .iter()
            .filter(|p| p.path != path && !p.auth_required);
        follow_up_pages(&self.session, &self.base_url, Page::new(path, body), rest).await
    }

    /// Remaining parsers ranked by what the root page says
    async fn try_heuristic(&mut self) -> Result<Option<Match>, ModemError> {
        let remaining: Vec<Arc<dyn ModemParser>> = self
            .registry
            .parsers()
            .iter()
            .filter(|p| !self.tried.contains(p.descriptor().name))
            .cloned()
            .collect();
        if remaining.is_empty() {
            return Ok(None);
        }

        let (body, headers) = self.root_page().await?;
        self.page_title = heuristics::page_title(&body);
        let ranked = heuristics::rank(&remaining, &body, &headers);
        tracing::info!(
            "Heuristic search over {} parsers (page title {:?})",
            ranked.len(),
            self.page_title
        );

        for candidate in ranked {
            let strong = candidate.signal.is_strong();
            if let Some(pages) = self.full_trial(&candidate.parser, strong).await? {
                return Ok(Some((candidate.parser, pages)));
            }
        }
        Ok(None)
    }

    async fn root_page(&mut self) -> Result<(String, HeaderMap), ModemError> {
        if let Some(resp) = self.root.take() {
            return Ok((resp.body, resp.headers));
        }
        let budget = self.breaker.remaining();
        let fetched = tokio::time::timeout(budget, self.session.get(&self.base_url))
            .await
            .map_err(|_| self.tripped())?;
        match fetched {
            Ok(resp) => {
                self.reached = true;
                Ok((resp.body, resp.headers))
            }
            Err(e) => {
                self.note_transport("root page", e);
                Ok((String::new(), HeaderMap::new()))
            }
        }
    }

    /// Login plus status fetch for one parser, bounded by the remaining budget.
    ///
    /// `attribute_rejection` marks parsers whose rejected login means the
    /// credentials are wrong rather than the parser.
    async fn full_trial(
        &mut self,
        parser: &Arc<dyn ModemParser>,
        attribute_rejection: bool,
    ) -> Result<Option<Vec<Page>>, ModemError> {
        let d = parser.descriptor();
        self.tried.insert(d.name);
        if d.auth.needs_credentials() && !self.has_credentials() {
            tracing::debug!("Skipping {}: {} login needs credentials", d.name, d.auth.kind());
            return Ok(None);
        }
        self.begin(d)?;

        let budget = self.breaker.remaining();
        let trial = tokio::time::timeout(budget, self.auth_and_fetch(parser.as_ref()))
            .await
            .map_err(|_| self.tripped())?;

        match trial {
            Trial::Matched(pages) => Ok(Some(pages)),
            Trial::Rejected => {
                if attribute_rejection && self.rejected_by.is_none() {
                    self.rejected_by = Some(d.name);
                }
                Ok(None)
            }
            Trial::NoMatch => Ok(None),
            Trial::Transport(e) => {
                self.note_transport(d.name, e);
                Ok(None)
            }
        }
    }

    async fn auth_and_fetch(&mut self, parser: &dyn ModemParser) -> Trial {
        let d = parser.descriptor();
        self.session.clear_auth();

        let strategy = auth::strategy_for(&d.auth);
        let landed = match strategy
            .login(&mut self.session, &self.base_url, self.credentials.as_ref())
            .await
        {
            Ok(outcome) if outcome.success => landed_page(parser, outcome.body),
            Ok(_) => {
                self.reached = true;
                tracing::debug!("{} login rejected", d.name);
                return Trial::Rejected;
            }
            Err(e) if is_transport_error(&e) => return Trial::Transport(e),
            Err(e) => {
                self.reached = true;
                tracing::debug!("{} login failed: {:#}", d.name, e);
                return Trial::NoMatch;
            }
        };

        match fetch_after_login(&mut self.session, &self.base_url, parser, landed).await {
            Ok(pages) => {
                self.reached = true;
                if pages.first().map(|p| parser.can_parse(&p.body)).unwrap_or(false) {
                    Trial::Matched(pages)
                } else {
                    tracing::debug!("{} does not recognise the status page", d.name);
                    Trial::NoMatch
                }
            }
            Err(e) if is_transport_error(&e) => Trial::Transport(e),
            Err(e) if is_unauthorized(&e) => {
                self.reached = true;
                tracing::debug!("{} status page refused the login: {:#}", d.name, e);
                Trial::Rejected
            }
            Err(e) => {
                self.reached = true;
                tracing::debug!("{} fetch failed: {:#}", d.name, e);
                Trial::NoMatch
            }
        }
    }

    fn matched(self, parser: Arc<dyn ModemParser>, pages: Vec<Page>, tier: Tier) -> DetectionResult {
        tracing::info!(
            "Matched {} via {} tier after {} attempts in {:.1}s",
            parser.descriptor().name,
            tier,
            self.breaker.attempts(),
            self.breaker.elapsed().as_secs_f64()
        );
        DetectionResult {
            parser,
            base_url: self.base_url,
            session: self.session,
            credentials: self.credentials,
            pages,
            tier,
            attempts: self.breaker.attempts(),
        }
    }

    fn exhausted(self) -> ModemError {
        if !self.reached {
            let message = self
                .last_transport_error
                .map(|e| format!("{:#}", e))
                .unwrap_or_else(|| "no response".to_string());
            return ModemError::Connection {
                host: self.host,
                message,
            };
        }
        if let Some(parser) = self.rejected_by {
            return ModemError::Authentication {
                parser: parser.to_string(),
            };
        }
        tracing::warn!("No parser matched after {} attempts", self.breaker.attempts());
        ModemError::ParserNotFound {
            attempted: self.attempted,
            page_title: self.page_title,
        }
    }
}
