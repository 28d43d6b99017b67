//! Parser for HNAP firmware that reports channels as `^`-separated rows
//!
//! A status fetch is one `GetMultipleHNAPs` POST. Each channel list is a
//! single string field holding rows joined by `|+|`; fields within a row are
//! separated by `^`. Vendors differ only in action names, field names and
//! column order, which is what `HnapStatusParser` carries.

use super::skip_row;
use crate::auth::AuthConfig;
use crate::hnap::{get_text_value, HnapRequestBuilder};
use crate::http::ModemSession;
use crate::models::{Channel, Page, ParseResult};
use crate::parser::{
    is_ofdm_modulation, non_empty, parse_channel_id, parse_count, parse_frequency_hz,
    parse_number, split_delimited,
};
use crate::registry::{ModemParser, ParserDescriptor};
use anyhow::{bail, Result};
use async_trait::async_trait;
use url::Url;

pub const ROW_SEPARATOR: &str = "|+|";
pub const FIELD_SEPARATOR: &str = "^";

/// Column positions within one channel row
#[derive(Debug, Clone, Copy)]
pub struct RowLayout {
    pub lock_status: usize,
    /// Modulation or, for upstream, channel type
    pub modulation: usize,
    pub channel_id: usize,
    pub frequency: usize,
    pub power: usize,
    pub snr: Option<usize>,
    pub corrected: Option<usize>,
    pub uncorrected: Option<usize>,
}

impl RowLayout {
    fn min_fields(&self) -> usize {
        [
            Some(self.lock_status),
            Some(self.modulation),
            Some(self.channel_id),
            Some(self.frequency),
            Some(self.power),
            self.snr,
            self.corrected,
            self.uncorrected,
        ]
        .into_iter()
        .flatten()
        .max()
        .unwrap_or(0)
            + 1
    }

    /// One channel, or `None` when the row is too short or its id is not a number
    pub fn decode(&self, fields: &[&str]) -> Option<Channel> {
        if fields.len() < self.min_fields() {
            return None;
        }
        let mut ch = Channel::new(parse_channel_id(fields[self.channel_id])?);
        ch.lock_status = non_empty(fields[self.lock_status]);
        ch.modulation = non_empty(fields[self.modulation]);
        ch.is_ofdm = is_ofdm_modulation(fields[self.modulation]);
        ch.frequency = parse_frequency_hz(fields[self.frequency]);
        ch.power = parse_number(fields[self.power]);
        ch.snr = self.snr.and_then(|i| parse_number(fields[i]));
        ch.corrected_errors = self.corrected.and_then(|i| parse_count(fields[i]));
        ch.uncorrected_errors = self.uncorrected.and_then(|i| parse_count(fields[i]));
        Some(ch)
    }

    /// Every well-formed row of a `|+|`-joined payload; bad rows are logged and skipped
    pub fn decode_all(&self, payload: &str, direction: &str) -> Vec<Channel> {
        split_delimited(payload, ROW_SEPARATOR, FIELD_SEPARATOR)
            .iter()
            .enumerate()
            .filter_map(|(i, fields)| {
                let ch = self.decode(fields);
                if ch.is_none() {
                    skip_row(direction, i, fields);
                }
                ch
            })
            .collect()
    }
}

/// `num^lock^modulation^id^freq^power^snr^corrected^uncorrected`
pub const DOWNSTREAM_ROW: RowLayout = RowLayout {
    lock_status: 1,
    modulation: 2,
    channel_id: 3,
    frequency: 4,
    power: 5,
    snr: Some(6),
    corrected: Some(7),
    uncorrected: Some(8),
};

/// `num^lock^type^id^symbol rate or width^freq^power`
pub const UPSTREAM_ROW: RowLayout = RowLayout {
    lock_status: 1,
    modulation: 2,
    channel_id: 3,
    frequency: 5,
    power: 6,
    snr: None,
    corrected: None,
    uncorrected: None,
};

/// Field path and layout of one channel list
#[derive(Debug, Clone, Copy)]
pub struct ChannelSource {
    pub path: &'static str,
    pub layout: RowLayout,
}

#[derive(Debug, Clone, Copy)]
pub struct HnapStatusParser {
    pub descriptor: &'static ParserDescriptor,
    /// Actions batched into every status fetch
    pub actions: &'static [&'static str],
    pub downstream: ChannelSource,
    pub upstream: ChannelSource,
    /// `(field path, system_info key)` pairs. When two paths feed the same
    /// key, the first one present wins.
    pub info: &'static [(&'static str, &'static str)],
}

impl HnapStatusParser {
    fn builder(&self) -> Result<HnapRequestBuilder> {
        match self.descriptor.auth {
            AuthConfig::Hnap(cfg) => Ok(HnapRequestBuilder::new(cfg.hnap_endpoint, cfg.soap_namespace)),
            other => bail!(
                "parser '{}' needs HNAP auth, descriptor declares {}",
                self.descriptor.name,
                other.kind()
            ),
        }
    }

    fn response_marker(&self) -> Option<String> {
        self.actions.first().map(|a| format!("{}Response", a))
    }
}

#[async_trait]
impl ModemParser for HnapStatusParser {
    fn descriptor(&self) -> &'static ParserDescriptor {
        self.descriptor
    }

    fn can_parse(&self, body: &str) -> bool {
        self.response_marker()
            .map(|marker| body.contains(&marker))
            .unwrap_or(false)
    }

    fn parse(&self, pages: &[Page]) -> ParseResult {
        let mut result = ParseResult::default();
        let Some(body) = pages.first().map(|p| p.body.as_str()) else {
            return result;
        };

        if let Some(raw) = get_text_value(body, self.downstream.path) {
            result.downstream = self.downstream.layout.decode_all(&raw, "downstream");
        }
        if let Some(raw) = get_text_value(body, self.upstream.path) {
            result.upstream = self.upstream.layout.decode_all(&raw, "upstream");
        }
        for (path, key) in self.info {
            if result.system_info.contains_key(*key) {
                continue;
            }
            if let Some(value) = get_text_value(body, path) {
                result.set_info(key, value);
            }
        }
        result
    }

    async fn fetch(&self, session: &mut ModemSession, base_url: &Url) -> Result<Vec<Page>> {
        let builder = self.builder()?;
        let body = builder.call_multiple(session, base_url, self.actions).await?;
        Ok(vec![Page::new(builder.endpoint(), body)])
    }
}
