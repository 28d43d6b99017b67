//! Parser registry
//!
//! Every supported modem family implements `ModemParser` and is listed in
//! `modems::all()`. The registry is built once at startup, is read-only
//! afterwards, and can be shared between concurrently polled hosts.

use crate::auth::AuthConfig;
use crate::http::{ModemSession, StatusError};
use crate::models::{info_keys, Page, ParseResult};
use crate::utils;
use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use url::Url;

/// Optional data a parser promises to fill in when the modem reports it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ScqamDownstream,
    ScqamUpstream,
    OfdmDownstream,
    OfdmaUpstream,
    ChannelErrors,
    SystemUptime,
    SoftwareVersion,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ScqamDownstream => "scqam_downstream",
            Self::ScqamUpstream => "scqam_upstream",
            Self::OfdmDownstream => "ofdm_downstream",
            Self::OfdmaUpstream => "ofdma_upstream",
            Self::ChannelErrors => "channel_errors",
            Self::SystemUptime => "system_uptime",
            Self::SoftwareVersion => "software_version",
        }
    }

    /// Whether `result` carries the field this capability stands for
    pub fn is_satisfied_by(&self, result: &ParseResult) -> bool {
        match self {
            Self::ScqamDownstream => result
                .downstream
                .iter()
                .any(|c| !c.is_ofdm && c.frequency.is_some() && c.power.is_some()),
            Self::ScqamUpstream => result
                .upstream
                .iter()
                .any(|c| !c.is_ofdm && c.frequency.is_some() && c.power.is_some()),
            Self::OfdmDownstream => result.downstream.iter().any(|c| c.is_ofdm),
            Self::OfdmaUpstream => result.upstream.iter().any(|c| c.is_ofdm),
            Self::ChannelErrors => result
                .downstream
                .iter()
                .any(|c| c.corrected_errors.is_some() || c.uncorrected_errors.is_some()),
            Self::SystemUptime => result.system_info.contains_key(info_keys::SYSTEM_UPTIME),
            Self::SoftwareVersion => result.system_info.contains_key(info_keys::SOFTWARE_VERSION),
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A page a parser reads
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UrlPattern {
    pub path: &'static str,
    pub auth_required: bool,
}

/// Static description of one modem family
#[derive(Debug, Clone, Copy)]
pub struct ParserDescriptor {
    pub name: &'static str,
    pub manufacturer: &'static str,
    pub models: &'static [&'static str],
    /// Higher is tried earlier
    pub priority: i32,
    pub auth: AuthConfig,
    /// First entry is the status page used for detection
    pub url_patterns: &'static [UrlPattern],
    pub capabilities: &'static [Capability],
}

impl ParserDescriptor {
    pub fn primary_pattern(&self) -> Option<&'static UrlPattern> {
        self.url_patterns.first()
    }

    /// First page readable without logging in
    pub fn anonymous_pattern(&self) -> Option<&'static UrlPattern> {
        self.url_patterns.iter().find(|p| !p.auth_required)
    }

    /// Declared capabilities the result does not back up
    pub fn missing_capabilities(&self, result: &ParseResult) -> Vec<Capability> {
        self.capabilities
            .iter()
            .copied()
            .filter(|cap| !cap.is_satisfied_by(result))
            .collect()
    }
}

/// Warn about every declared capability the result lacks; never fails
pub fn validate_capabilities(descriptor: &ParserDescriptor, result: &ParseResult) -> Vec<Capability> {
    let missing = descriptor.missing_capabilities(result);
    for cap in &missing {
        tracing::warn!(
            "Parser '{}' declares {} but the parsed data does not contain it",
            descriptor.name,
            cap
        );
    }
    missing
}

/// Data extraction for one modem family
#[async_trait]
pub trait ModemParser: Send + Sync {
    fn descriptor(&self) -> &'static ParserDescriptor;

    /// Cheap check that a status page body belongs to this modem family
    fn can_parse(&self, body: &str) -> bool;

    /// Turn fetched pages into a normalized result. Pure: no I/O.
    fn parse(&self, pages: &[Page]) -> ParseResult;

    /// Fetch the pages `parse` needs. The first page is the one `can_parse` checks.
    async fn fetch(&self, session: &mut ModemSession, base_url: &Url) -> Result<Vec<Page>> {
        fetch_url_patterns(session, base_url, self.descriptor().url_patterns).await
    }
}

/// GET each pattern in order. The first must answer 2xx; later pages are best effort.
pub async fn fetch_url_patterns(
    session: &ModemSession,
    base_url: &Url,
    patterns: &[UrlPattern],
) -> Result<Vec<Page>> {
    let mut pages = Vec::with_capacity(patterns.len());
    for (i, pattern) in patterns.iter().enumerate() {
        let url = utils::join_path(base_url, pattern.path)?;
        match session.get(&url).await {
            Ok(resp) if resp.is_success() => pages.push(Page::new(pattern.path, resp.body)),
            Ok(resp) if i == 0 => {
                return Err(StatusError {
                    url,
                    status: resp.status,
                }
                .into())
            }
            Err(e) if i == 0 => return Err(e),
            Ok(resp) => tracing::debug!("Skipping {}: status {}", url, resp.status),
            Err(e) => tracing::debug!("Skipping {}: {}", url, e),
        }
    }
    Ok(pages)
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("parser not found: {0}")]
    NotFound(String),

    #[error("duplicate parser name: {0}")]
    DuplicateName(String),

    #[error("parser '{0}' declares no url patterns")]
    NoUrlPatterns(String),
}

/// Ordered, immutable catalog of parsers
#[derive(Clone)]
pub struct ParserRegistry {
    parsers: Vec<Arc<dyn ModemParser>>,
}

impl ParserRegistry {
    /// Registry of every built-in modem parser
    pub fn builtin() -> Self {
        Self::sorted(crate::modems::all())
    }

    /// Registry from an explicit parser list, checking descriptor invariants
    pub fn from_parsers(parsers: Vec<Arc<dyn ModemParser>>) -> Result<Self, RegistryError> {
        let mut seen = HashSet::new();
        for parser in &parsers {
            let d = parser.descriptor();
            if d.primary_pattern().is_none() {
                return Err(RegistryError::NoUrlPatterns(d.name.to_string()));
            }
            if !seen.insert(d.name) {
                return Err(RegistryError::DuplicateName(d.name.to_string()));
            }
        }
        Ok(Self::sorted(parsers))
    }

    fn sorted(mut parsers: Vec<Arc<dyn ModemParser>>) -> Self {
        parsers.sort_by(|a, b| {
            let (a, b) = (a.descriptor(), b.descriptor());
            a.manufacturer
                .to_ascii_lowercase()
                .cmp(&b.manufacturer.to_ascii_lowercase())
                .then(b.priority.cmp(&a.priority))
                .then(a.name.cmp(b.name))
        });
        for parser in &parsers {
            let d = parser.descriptor();
            tracing::debug!(
                "Registered parser: {} ({} {}, auth {})",
                d.name,
                d.manufacturer,
                d.models.join("/"),
                d.auth.kind()
            );
        }
        Self { parsers }
    }

    /// Descriptors sorted by manufacturer, then priority descending
    pub fn list(&self) -> Vec<&'static ParserDescriptor> {
        self.parsers.iter().map(|p| p.descriptor()).collect()
    }

    pub fn parsers(&self) -> &[Arc<dyn ModemParser>] {
        &self.parsers
    }

    pub fn by_name(&self, name: &str) -> Result<Arc<dyn ModemParser>, RegistryError> {
        self.parsers
            .iter()
            .find(|p| p.descriptor().name == name)
            .cloned()
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.parsers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parsers.is_empty()
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Channel;

    static NO_PATTERNS: ParserDescriptor = ParserDescriptor {
        name: "broken",
        manufacturer: "Acme",
        models: &["X1"],
        priority: 0,
        auth: AuthConfig::None,
        url_patterns: &[],
        capabilities: &[],
    };

    struct Fixed(&'static ParserDescriptor);

    #[async_trait]
    impl ModemParser for Fixed {
        fn descriptor(&self) -> &'static ParserDescriptor {
            self.0
        }
        fn can_parse(&self, _body: &str) -> bool {
            false
        }
        fn parse(&self, _pages: &[Page]) -> ParseResult {
            ParseResult::default()
        }
    }

    #[test]
    fn test_builtin_registry_is_valid() {
        let registry = ParserRegistry::from_parsers(crate::modems::all()).unwrap();
        assert_eq!(registry.len(), ParserRegistry::builtin().len());
        assert!(registry.len() >= 8);
    }

    #[test]
    fn test_list_sorted_by_manufacturer_then_priority() {
        let list = ParserRegistry::builtin().list();
        for pair in list.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            let (ma, mb) = (a.manufacturer.to_ascii_lowercase(), b.manufacturer.to_ascii_lowercase());
            assert!(ma < mb || (ma == mb && a.priority >= b.priority), "{} before {}", a.name, b.name);
        }
    }

    #[test]
    fn test_by_name() {
        let registry = ParserRegistry::builtin();
        assert_eq!(
            registry.by_name("arris_sb6141").unwrap().descriptor().manufacturer,
            "ARRIS"
        );
        assert!(matches!(
            registry.by_name("nope"),
            Err(RegistryError::NotFound(_))
        ));
    }

    #[test]
    fn test_empty_url_patterns_rejected() {
        let result = ParserRegistry::from_parsers(vec![Arc::new(Fixed(&NO_PATTERNS))]);
        assert!(matches!(result, Err(RegistryError::NoUrlPatterns(_))));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let a = ParserRegistry::builtin().by_name("netgear_cm600").unwrap();
        let result = ParserRegistry::from_parsers(vec![a.clone(), a]);
        assert!(matches!(result, Err(RegistryError::DuplicateName(_))));
    }

    #[test]
    fn test_every_builtin_declares_status_page() {
        for d in ParserRegistry::builtin().list() {
            assert!(d.primary_pattern().is_some(), "{}", d.name);
            assert!(!d.models.is_empty(), "{}", d.name);
        }
    }

    #[test]
    fn test_missing_uptime_is_reported_not_fatal() {
        static UPTIME: ParserDescriptor = ParserDescriptor {
            name: "uptime_only",
            manufacturer: "Acme",
            models: &["X2"],
            priority: 0,
            auth: AuthConfig::None,
            url_patterns: &[UrlPattern {
                path: "/status",
                auth_required: false,
            }],
            capabilities: &[Capability::SystemUptime, Capability::ScqamDownstream],
        };
        let mut result = ParseResult::default();
        let mut ch = Channel::new(1);
        ch.frequency = Some(591_000_000.0);
        ch.power = Some(1.2);
        result.downstream.push(ch);

        let missing = validate_capabilities(&UPTIME, &result);
        assert_eq!(missing, vec![Capability::SystemUptime]);
        assert_eq!(result.downstream.len(), 1);
    }
}
