//! Data models shared by the discovery pipeline and the parsers

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Well-known `system_info` keys. Parsers must not invent vendor-specific ones.
pub mod info_keys {
    pub const SYSTEM_UPTIME: &str = "system_uptime";
    pub const SOFTWARE_VERSION: &str = "software_version";
    pub const HARDWARE_VERSION: &str = "hardware_version";
    pub const DOCSIS_VERSION: &str = "docsis_version";
    pub const MODEL: &str = "model";
}

/// Login credentials supplied by the caller
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Both fields present
    pub fn is_complete(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }
}

// Keep passwords out of logs.
impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// A page fetched from the modem, keyed by the request path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub path: String,
    pub body: String,
}

impl Page {
    pub fn new(path: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            body: body.into(),
        }
    }
}

/// One DOCSIS channel, normalized across vendors
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Channel {
    pub channel_id: u32,
    /// Center frequency in Hz
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frequency: Option<f64>,
    /// dBmV
    #[serde(skip_serializing_if = "Option::is_none")]
    pub power: Option<f64>,
    /// dB
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snr: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modulation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corrected_errors: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uncorrected_errors: Option<u64>,
    pub is_ofdm: bool,
}

impl Channel {
    pub fn new(channel_id: u32) -> Self {
        Self {
            channel_id,
            ..Default::default()
        }
    }
}

/// Normalized result of one poll
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ParseResult {
    pub downstream: Vec<Channel>,
    pub upstream: Vec<Channel>,
    pub system_info: BTreeMap<String, String>,
}

impl ParseResult {
    pub fn is_empty(&self) -> bool {
        self.downstream.is_empty() && self.upstream.is_empty() && self.system_info.is_empty()
    }

    /// Insert a `system_info` entry, ignoring blank values
    pub fn set_info(&mut self, key: &str, value: impl AsRef<str>) {
        let value = value.as_ref().trim();
        if !value.is_empty() {
            self.system_info.insert(key.to_string(), value.to_string());
        }
    }
}
