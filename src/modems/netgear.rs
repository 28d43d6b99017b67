//! Netgear modems

use super::{page, skip_row};
use crate::auth::AuthConfig;
use crate::models::{info_keys, Channel, Page, ParseResult};
use crate::parser::{
    element_text_by_id, is_ofdm_modulation, js_function_var, non_empty, parse_channel_id,
    parse_count, parse_frequency_hz, parse_number,
};
use crate::registry::{Capability, ModemParser, ParserDescriptor, UrlPattern};
use async_trait::async_trait;

const CM600_STATUS: &str = "/DocsisStatus.asp";

static CM600: ParserDescriptor = ParserDescriptor {
    name: "netgear_cm600",
    manufacturer: "Netgear",
    models: &["CM600", "CM500"],
    priority: 50,
    auth: AuthConfig::Basic,
    url_patterns: &[UrlPattern {
        path: CM600_STATUS,
        auth_required: true,
    }],
    capabilities: &[
        Capability::ScqamDownstream,
        Capability::ScqamUpstream,
        Capability::ChannelErrors,
        Capability::SystemUptime,
    ],
};

const DS_FIELDS: usize = 9;
const US_FIELDS: usize = 7;

/// CM600 `DocsisStatus.asp`. Channel tables are filled client-side from
/// pipe-separated strings: a row count, then fixed-width rows.
pub struct Cm600;

impl Cm600 {
    /// Fixed-width rows of a `count|f1|f2|...` list. The count comes from
    /// the device, so it only bounds the rows actually present.
    fn rows<'a>(list: &'a str, width: usize, direction: &str) -> Vec<Vec<&'a str>> {
        let tokens: Vec<&str> = list.split('|').map(str::trim).collect();
        let Some(count) = tokens.first().and_then(|c| c.parse::<usize>().ok()) else {
            tracing::warn!("Netgear {} list has no row count", direction);
            return Vec::new();
        };
        let rows: Vec<Vec<&str>> = tokens[1..]
            .chunks_exact(width)
            .take(count)
            .map(|row| row.to_vec())
            .collect();
        if rows.len() < count {
            skip_row(direction, rows.len(), &format!("truncated, {} of {} rows", rows.len(), count));
        }
        rows
    }

    fn downstream(list: &str) -> Vec<Channel> {
        Self::rows(list, DS_FIELDS, "downstream")
            .into_iter()
            .enumerate()
            .filter_map(|(i, f)| {
                let Some(channel_id) = parse_channel_id(f[3]) else {
                    skip_row("downstream", i, &f);
                    return None;
                };
                let mut ch = Channel::new(channel_id);
                ch.lock_status = non_empty(f[1]);
                ch.modulation = non_empty(f[2]);
                ch.is_ofdm = is_ofdm_modulation(f[2]);
                ch.frequency = parse_frequency_hz(f[4]);
                ch.power = parse_number(f[5]);
                ch.snr = parse_number(f[6]);
                ch.corrected_errors = parse_count(f[7]);
                ch.uncorrected_errors = parse_count(f[8]);
                Some(ch)
            })
            .collect()
    }

    fn upstream(list: &str) -> Vec<Channel> {
        Self::rows(list, US_FIELDS, "upstream")
            .into_iter()
            .enumerate()
            .filter_map(|(i, f)| {
                let Some(channel_id) = parse_channel_id(f[3]) else {
                    skip_row("upstream", i, &f);
                    return None;
                };
                let mut ch = Channel::new(channel_id);
                ch.lock_status = non_empty(f[1]);
                ch.modulation = non_empty(f[2]);
                ch.frequency = parse_frequency_hz(f[5]);
                ch.power = parse_number(f[6]);
                Some(ch)
            })
            .collect()
    }
}

#[async_trait]
impl ModemParser for Cm600 {
    fn descriptor(&self) -> &'static ParserDescriptor {
        &CM600
    }

    fn can_parse(&self, body: &str) -> bool {
        body.contains("InitDsTableTagValue")
    }

    fn parse(&self, pages: &[Page]) -> ParseResult {
        let mut result = ParseResult::default();
        let Some(body) = page(pages, CM600_STATUS) else {
            return result;
        };

        if let Some(list) = js_function_var(body, "InitDsTableTagValue", "tagValueList") {
            result.downstream = Self::downstream(&list);
        }
        if let Some(list) = js_function_var(body, "InitUsTableTagValue", "tagValueList") {
            result.upstream = Self::upstream(&list);
        }
        if let Some(text) = element_text_by_id(body, "SystemUpTime") {
            let uptime = text
                .strip_prefix("System Up Time")
                .unwrap_or(&text)
                .trim_start_matches(':')
                .trim();
            result.set_info(info_keys::SYSTEM_UPTIME, uptime);
        }
        result
    }
}
