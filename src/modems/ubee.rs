//! Ubee gateways

use super::{page, skip_row};
use crate::auth::{AuthConfig, FormAuth, PasswordEncoding};
use crate::models::{info_keys, Channel, Page, ParseResult};
use crate::parser::{
    element_text_by_id, extract_tables, non_empty, parse_channel_id, parse_frequency_hz,
    parse_number, table_by_id, Columns, Table,
};
use crate::registry::{Capability, ModemParser, ParserDescriptor, UrlPattern};
use async_trait::async_trait;

const DVW32CB_STATUS: &str = "/htdocs/cm_info_connection.php";

static DVW32CB: ParserDescriptor = ParserDescriptor {
    name: "ubee_dvw32cb",
    manufacturer: "Ubee",
    models: &["DVW32CB", "DDW36C"],
    priority: 30,
    auth: AuthConfig::Form(FormAuth {
        login_url: "/goform/loginMR3",
        username_field: "loginUsername",
        password_field: "loginPassword",
        success_indicator: None,
        encoding: PasswordEncoding::Plain,
    }),
    url_patterns: &[UrlPattern {
        path: DVW32CB_STATUS,
        auth_required: true,
    }],
    capabilities: &[
        Capability::ScqamDownstream,
        Capability::ScqamUpstream,
        Capability::SystemUptime,
    ],
};

pub struct Dvw32cb;

impl Dvw32cb {
    fn channels(table: &Table, direction: &str) -> Vec<Channel> {
        let Some(header) = table.header_row(&["Channel ID"]) else {
            return Vec::new();
        };
        let cols = Columns::new(&table.rows[header]);

        table.rows[header + 1..]
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let Some(channel_id) = cols.get(row, "channel id").and_then(parse_channel_id) else {
                    skip_row(direction, i, row);
                    return None;
                };
                let mut ch = Channel::new(channel_id);
                ch.lock_status = cols.get(row, "lock status").and_then(non_empty);
                ch.modulation = cols.get(row, "modulation").and_then(non_empty);
                ch.frequency = cols.get(row, "frequency").and_then(parse_frequency_hz);
                ch.power = cols.get(row, "power").and_then(parse_number);
                ch.snr = cols.get(row, "snr").and_then(parse_number);
                Some(ch)
            })
            .collect()
    }
}

#[async_trait]
impl ModemParser for Dvw32cb {
    fn descriptor(&self) -> &'static ParserDescriptor {
        &DVW32CB
    }

    fn can_parse(&self, body: &str) -> bool {
        body.contains("id=\"dsTable\"") || body.contains("id='dsTable'")
    }

    fn parse(&self, pages: &[Page]) -> ParseResult {
        let mut result = ParseResult::default();
        let Some(body) = page(pages, DVW32CB_STATUS) else {
            return result;
        };
        let tables = extract_tables(body);

        if let Some(t) = table_by_id(&tables, "dsTable") {
            result.downstream = Self::channels(t, "downstream");
        }
        if let Some(t) = table_by_id(&tables, "usTable") {
            result.upstream = Self::channels(t, "upstream");
        }
        if let Some(uptime) = element_text_by_id(body, "cm_system_uptime") {
            result.set_info(info_keys::SYSTEM_UPTIME, uptime);
        }
        result
    }
}
