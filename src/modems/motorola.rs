//! Motorola (Commscope) modems

use super::hnap_status::{ChannelSource, HnapStatusParser, DOWNSTREAM_ROW, UPSTREAM_ROW};
use super::{info_from_tables, page, skip_row};
use crate::auth::{AuthConfig, FormAuth, HnapAuth, PasswordEncoding};
use crate::hnap::DEFAULT_NAMESPACE;
use crate::models::{info_keys, Channel, Page, ParseResult};
use crate::parser::{
    extract_tables, is_ofdm_modulation, non_empty, parse_channel_id, parse_count,
    parse_frequency_hz, parse_number, table_by_caption, table_by_id, Columns, Table,
};
use crate::registry::{Capability, ModemParser, ParserDescriptor, UrlPattern};
use async_trait::async_trait;

const MB7621_CONNECTION: &str = "/MotoConnection.asp";
const MB7621_SOFTWARE: &str = "/MotoSwInfo.asp";

static MB7621: ParserDescriptor = ParserDescriptor {
    name: "motorola_mb7621",
    manufacturer: "Motorola",
    models: &["MB7621", "MB7420"],
    priority: 50,
    auth: AuthConfig::Form(FormAuth {
        login_url: "/goform/login",
        username_field: "loginUsername",
        password_field: "loginPassword",
        success_indicator: Some("Logout"),
        encoding: PasswordEncoding::PlainThenBase64,
    }),
    url_patterns: &[
        UrlPattern {
            path: MB7621_CONNECTION,
            auth_required: true,
        },
        UrlPattern {
            path: MB7621_SOFTWARE,
            auth_required: true,
        },
    ],
    capabilities: &[
        Capability::ScqamDownstream,
        Capability::ScqamUpstream,
        Capability::ChannelErrors,
        Capability::SystemUptime,
        Capability::SoftwareVersion,
    ],
};

/// MB7621 connection page. Tables are looked up by id, falling back to the
/// caption older firmware uses.
pub struct Mb7621;

impl Mb7621 {
    fn table<'a>(tables: &'a [Table], id: &str, caption: &str) -> Option<&'a Table> {
        table_by_id(tables, id).or_else(|| table_by_caption(tables, caption))
    }

    fn channels(table: &Table, direction: &str) -> Vec<Channel> {
        let Some(header) = table.header_row(&["Channel ID", "Lock Status"]) else {
            return Vec::new();
        };
        let cols = Columns::new(&table.rows[header]);
        let modulation_col = if direction == "upstream" {
            "channel type"
        } else {
            "modulation"
        };

        table.rows[header + 1..]
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let Some(channel_id) = cols.get(row, "channel id").and_then(parse_channel_id) else {
                    skip_row(direction, i, row);
                    return None;
                };
                let modulation = cols.get(row, modulation_col).unwrap_or_default();
                let mut ch = Channel::new(channel_id);
                ch.lock_status = cols.get(row, "lock status").and_then(non_empty);
                ch.modulation = non_empty(modulation);
                ch.is_ofdm = is_ofdm_modulation(modulation);
                ch.frequency = cols.get(row, "freq").and_then(parse_frequency_hz);
                ch.power = cols.get(row, "pwr").and_then(parse_number);
                ch.snr = cols.get(row, "snr").and_then(parse_number);
                ch.corrected_errors = cols.get(row, "corrected").and_then(parse_count);
                ch.uncorrected_errors = cols.get(row, "uncorrected").and_then(parse_count);
                Some(ch)
            })
            .collect()
    }
}

#[async_trait]
impl ModemParser for Mb7621 {
    fn descriptor(&self) -> &'static ParserDescriptor {
        &MB7621
    }

    fn can_parse(&self, body: &str) -> bool {
        body.contains("Downstream Bonded Channels") && body.contains("Pwr (dBmV)")
    }

    fn parse(&self, pages: &[Page]) -> ParseResult {
        let mut result = ParseResult::default();
        if let Some(body) = page(pages, MB7621_CONNECTION) {
            let tables = extract_tables(body);
            if let Some(t) = Self::table(&tables, "MotoDownstreamChannels", "Downstream Bonded Channels") {
                result.downstream = Self::channels(t, "downstream");
            }
            if let Some(t) = Self::table(&tables, "MotoUpstreamChannels", "Upstream Bonded Channels") {
                result.upstream = Self::channels(t, "upstream");
            }
            info_from_tables(&tables, &mut result, &[("System Up Time", info_keys::SYSTEM_UPTIME)]);
        }
        if let Some(body) = page(pages, MB7621_SOFTWARE) {
            info_from_tables(
                &extract_tables(body),
                &mut result,
                &[
                    ("Software Version", info_keys::SOFTWARE_VERSION),
                    ("Hardware Version", info_keys::HARDWARE_VERSION),
                    ("Standard Specification Compliant", info_keys::DOCSIS_VERSION),
                ],
            );
        }
        result
    }
}

static MB8611_DESCRIPTOR: ParserDescriptor = ParserDescriptor {
    name: "motorola_mb8611",
    manufacturer: "Motorola",
    models: &["MB8611", "MB8600"],
    priority: 60,
    auth: AuthConfig::Hnap(HnapAuth {
        login_url: "/Login.html",
        hnap_endpoint: "/HNAP1/",
        session_timeout_indicator: "UN-AUTH",
        soap_namespace: DEFAULT_NAMESPACE,
        challenge_response: true,
    }),
    url_patterns: &[UrlPattern {
        path: "/HNAP1/",
        auth_required: true,
    }],
    capabilities: &[
        Capability::ScqamDownstream,
        Capability::ScqamUpstream,
        Capability::OfdmDownstream,
        Capability::OfdmaUpstream,
        Capability::ChannelErrors,
        Capability::SystemUptime,
        Capability::SoftwareVersion,
    ],
};

/// MB8611 over HNAP. Frequencies are reported in MHz.
pub static MB8611: HnapStatusParser = HnapStatusParser {
    descriptor: &MB8611_DESCRIPTOR,
    actions: &[
        "GetMotoStatusDownstreamChannelInfo",
        "GetMotoStatusUpstreamChannelInfo",
        "GetMotoStatusConnectionInfo",
        "GetMotoStatusSoftware",
        "GetMotoStatusStartupSequence",
    ],
    downstream: ChannelSource {
        path: "GetMotoStatusDownstreamChannelInfoResponse/MotoConnDownstreamChannel",
        layout: DOWNSTREAM_ROW,
    },
    upstream: ChannelSource {
        path: "GetMotoStatusUpstreamChannelInfoResponse/MotoConnUpstreamChannel",
        layout: UPSTREAM_ROW,
    },
    info: &[
        ("GetMotoStatusConnectionInfoResponse/MotoConnSystemUpTime", info_keys::SYSTEM_UPTIME),
        ("GetMotoStatusSoftwareResponse/StatusSoftwareSfVer", info_keys::SOFTWARE_VERSION),
        ("GetMotoStatusSoftwareResponse/StatusSoftwareHdVer", info_keys::HARDWARE_VERSION),
        ("GetMotoStatusSoftwareResponse/StatusSoftwareSpecVer", info_keys::DOCSIS_VERSION),
        ("GetMotoStatusStartupSequenceResponse/MotoConnModelName", info_keys::MODEL),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    const CONNECTION_PAGE: &str = r#"
<html><head><title>Motorola Cable Modem : Connection</title></head><body>
<table class="moto-table-content">
  <tr><td class="moto-param-name">System Up Time</td><td class="moto-content-value">0 days 16h:49m:09s</td></tr>
</table>
<table id="MotoDownstreamChannels" class="moto-table-content">
  <tr><th colspan="9">Downstream Bonded Channels</th></tr>
  <tr><td>Channel</td><td>Lock Status</td><td>Modulation</td><td>Channel ID</td><td>Freq. (MHz)</td>
      <td>Pwr (dBmV)</td><td>SNR (dB)</td><td>Corrected</td><td>Uncorrected</td></tr>
  <tr><td>1</td><td>Locked</td><td>QAM256</td><td>21</td><td>483.0</td><td>4.2</td><td>40.1</td><td>17</td><td>2</td></tr>
  <tr><td>2</td><td>Locked</td><td>QAM256</td><td>22</td><td>489.0</td><td>4.0</td><td>40.3</td><td>0</td><td>0</td></tr>
</table>
<table id="MotoUpstreamChannels" class="moto-table-content">
  <tr><th colspan="7">Upstream Bonded Channels</th></tr>
  <tr><td>Channel</td><td>Lock Status</td><td>Channel Type</td><td>Channel ID</td><td>Symb. Rate (Ksym/sec)</td>
      <td>Freq. (MHz)</td><td>Pwr (dBmV)</td></tr>
  <tr><td>1</td><td>Locked</td><td>ATDMA</td><td>1</td><td>5120</td><td>35.6</td><td>42.8</td></tr>
</table>
</body></html>"#;

    const SOFTWARE_PAGE: &str = r#"
<table><tr><td>Software Version</td><td>7621-5.7.1.5</td></tr>
<tr><td>Hardware Version</td><td>V1.0</td></tr></table>"#;

    #[test]
    fn test_mb7621_tables_by_id() {
        assert!(Mb7621.can_parse(CONNECTION_PAGE));
        let result = Mb7621.parse(&[
            Page::new(MB7621_CONNECTION, CONNECTION_PAGE),
            Page::new(MB7621_SOFTWARE, SOFTWARE_PAGE),
        ]);

        assert_eq!(result.downstream.len(), 2);
        let ch = &result.downstream[0];
        assert_eq!(ch.channel_id, 21);
        assert_eq!(ch.frequency, Some(483_000_000.0));
        assert_eq!(ch.power, Some(4.2));
        assert_eq!(ch.uncorrected_errors, Some(2));

        assert_eq!(result.upstream.len(), 1);
        assert_eq!(result.upstream[0].modulation.as_deref(), Some("ATDMA"));
        assert_eq!(result.upstream[0].frequency, Some(35_600_000.0));

        assert_eq!(
            result.system_info.get(info_keys::SYSTEM_UPTIME).map(String::as_str),
            Some("0 days 16h:49m:09s")
        );
        assert!(MB7621.missing_capabilities(&result).is_empty());
    }

    #[test]
    fn test_mb7621_falls_back_to_caption() {
        let page_without_ids = CONNECTION_PAGE
            .replace(r#" id="MotoDownstreamChannels""#, "")
            .replace(r#" id="MotoUpstreamChannels""#, "");
        let result = Mb7621.parse(&[Page::new(MB7621_CONNECTION, page_without_ids)]);
        assert_eq!(result.downstream.len(), 2);
        assert_eq!(result.upstream.len(), 1);
    }

    #[test]
    fn test_mb8611_mhz_rows() {
        let body = r#"{"GetMultipleHNAPsResponse":{
            "GetMotoStatusDownstreamChannelInfoResponse":{"MotoConnDownstreamChannel":"1^Locked^QAM256^20^567.0^ 3.2^41.4^0^0^|+|2^Locked^OFDM PLC^33^957.0^ 1.1^39.0^1200^3^","GetMotoStatusDownstreamChannelInfoResult":"OK"},
            "GetMotoStatusUpstreamChannelInfoResponse":{"MotoConnUpstreamChannel":"1^Locked^SC-QAM^1^5120^16.4^44.3^|+|2^Locked^OFDMA^41^0^36.2^38.0^"},
            "GetMotoStatusConnectionInfoResponse":{"MotoConnSystemUpTime":"0 days 07h:14m:27s"},
            "GetMotoStatusSoftwareResponse":{"StatusSoftwareSfVer":"8611-19.2.18","StatusSoftwareHdVer":"V1.0"},
            "GetMultipleHNAPsResult":"OK"}}"#;
        assert!(MB8611.can_parse(body));
        let result = MB8611.parse(&[Page::new("/HNAP1/", body)]);

        assert_eq!(result.downstream.len(), 2);
        assert_eq!(result.downstream[0].frequency, Some(567_000_000.0));
        assert!(result.downstream[1].is_ofdm);
        assert_eq!(result.upstream.len(), 2);
        assert!(result.upstream[1].is_ofdm);
        assert_eq!(result.upstream[0].frequency, Some(16_400_000.0));
        assert_eq!(
            result.system_info.get(info_keys::SOFTWARE_VERSION).map(String::as_str),
            Some("8611-19.2.18")
        );
        assert!(MB8611_DESCRIPTOR.missing_capabilities(&result).is_empty());
    }
}
