//! Technicolor gateways

use super::{attach_errors, page, skip_row};
use crate::auth::{AuthConfig, RedirectFormAuth};
use crate::models::{info_keys, Channel, Page, ParseResult};
use crate::parser::{
    extract_tables, is_ofdm_modulation, non_empty, parse_channel_id, parse_count,
    parse_frequency_hz, parse_number, table_by_label, Table,
};
use crate::registry::{Capability, ModemParser, ParserDescriptor, UrlPattern};
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;

const XB7_STATUS: &str = "/network_setup.jst";

static XB7: ParserDescriptor = ParserDescriptor {
    name: "technicolor_xb7",
    manufacturer: "Technicolor",
    models: &["CGM4331", "XB7", "CGM4140"],
    priority: 40,
    auth: AuthConfig::RedirectForm(RedirectFormAuth {
        login_url: "/check.jst",
        username_field: "username",
        password_field: "password",
        success_redirect_pattern: "at_a_glance.jst",
        authenticated_page_url: XB7_STATUS,
    }),
    url_patterns: &[UrlPattern {
        path: XB7_STATUS,
        auth_required: true,
    }],
    capabilities: &[
        Capability::ScqamDownstream,
        Capability::ScqamUpstream,
        Capability::OfdmDownstream,
        Capability::SoftwareVersion,
    ],
};

static DOWNLOAD_VERSION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"Download Version:\s*</span>\s*<span[^>]*>\s*([^<]+?)\s*</span>"#).unwrap()
});

/// XB7 network setup page: transposed tables told apart by their `summary`
pub struct Xb7;

impl Xb7 {
    fn cell<'a>(table: &'a Table, label: &str, i: usize) -> Option<&'a str> {
        table
            .row_values(label)
            .and_then(|cells| cells.get(i))
            .map(String::as_str)
    }

    /// Channel ids, preferring the `Channel ID` row over the display index
    fn ids(table: &Table) -> Option<&[String]> {
        table
            .row_values("Channel ID")
            .or_else(|| table.row_values("Index"))
    }

    fn channels(table: &Table, direction: &str) -> Vec<Channel> {
        let Some(ids) = Self::ids(table) else {
            return Vec::new();
        };
        ids.iter()
            .enumerate()
            .filter_map(|(i, id)| {
                let Some(channel_id) = parse_channel_id(id) else {
                    skip_row(direction, i, id);
                    return None;
                };
                let modulation = Self::cell(table, "Modulation", i).unwrap_or_default();
                let channel_type = Self::cell(table, "Channel Type", i).unwrap_or_default();
                let mut ch = Channel::new(channel_id);
                ch.lock_status = Self::cell(table, "Lock Status", i).and_then(non_empty);
                ch.modulation = non_empty(modulation);
                ch.is_ofdm = is_ofdm_modulation(modulation) || is_ofdm_modulation(channel_type);
                ch.frequency = Self::cell(table, "Frequency", i).and_then(parse_frequency_hz);
                ch.power = Self::cell(table, "Power Level", i).and_then(parse_number);
                ch.snr = Self::cell(table, "SNR", i).and_then(parse_number);
                Some(ch)
            })
            .collect()
    }

    fn codewords(table: &Table, downstream: &mut [Channel]) {
        let Some(ids) = Self::ids(table) else {
            return;
        };
        for (i, id) in ids.iter().enumerate() {
            if let Some(channel_id) = parse_channel_id(id) {
                attach_errors(
                    downstream,
                    channel_id,
                    Self::cell(table, "Correctable Codewords", i).and_then(parse_count),
                    Self::cell(table, "Uncorrectable Codewords", i).and_then(parse_count),
                );
            }
        }
    }
}

#[async_trait]
impl ModemParser for Xb7 {
    fn descriptor(&self) -> &'static ParserDescriptor {
        &XB7
    }

    fn can_parse(&self, body: &str) -> bool {
        body.contains("Downstream") && body.contains("CM Error Codewords")
    }

    fn parse(&self, pages: &[Page]) -> ParseResult {
        let mut result = ParseResult::default();
        let Some(body) = page(pages, XB7_STATUS) else {
            return result;
        };
        let tables = extract_tables(body);

        if let Some(t) = table_by_label(&tables, "Downstream") {
            result.downstream = Self::channels(t, "downstream");
        }
        if let Some(t) = table_by_label(&tables, "Upstream") {
            result.upstream = Self::channels(t, "upstream");
        }
        if let Some(t) = table_by_label(&tables, "CM Error Codewords") {
            Self::codewords(t, &mut result.downstream);
        }
        if let Some(caps) = DOWNLOAD_VERSION.captures(body) {
            result.set_info(info_keys::SOFTWARE_VERSION, &caps[1]);
        }
        result
    }
}
