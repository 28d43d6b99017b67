//! ARRIS SURFboard modems

use super::hnap_status::{ChannelSource, HnapStatusParser, DOWNSTREAM_ROW, UPSTREAM_ROW};
use super::{attach_errors, info_from_tables, page, skip_row};
use crate::auth::{AuthConfig, HnapAuth};
use crate::hnap::DEFAULT_NAMESPACE;
use crate::models::{info_keys, Channel, Page, ParseResult};
use crate::parser::{
    extract_tables, is_ofdm_modulation, non_empty, parse_channel_id, parse_count,
    parse_frequency_hz, parse_number, table_by_caption, Columns, Table,
};
use crate::registry::{Capability, ModemParser, ParserDescriptor, UrlPattern};
use async_trait::async_trait;

const SB6141_STATUS: &str = "/cmSignalData.htm";

static SB6141: ParserDescriptor = ParserDescriptor {
    name: "arris_sb6141",
    manufacturer: "ARRIS",
    models: &["SB6141", "SB6121"],
    priority: 60,
    auth: AuthConfig::None,
    url_patterns: &[UrlPattern {
        path: SB6141_STATUS,
        auth_required: false,
    }],
    capabilities: &[
        Capability::ScqamDownstream,
        Capability::ScqamUpstream,
        Capability::ChannelErrors,
    ],
};

/// SB61xx status page: one table per direction, one column per channel
pub struct Sb6141;

impl Sb6141 {
    fn downstream(table: &Table) -> Vec<Channel> {
        let Some(ids) = table.row_values("Channel ID") else {
            return Vec::new();
        };
        let column = |label: &str, i: usize| {
            table
                .row_values(label)
                .and_then(|cells| cells.get(i))
                .map(String::as_str)
        };

        ids.iter()
            .enumerate()
            .filter_map(|(i, id)| {
                let Some(channel_id) = parse_channel_id(id) else {
                    skip_row("downstream", i, id);
                    return None;
                };
                let mut ch = Channel::new(channel_id);
                ch.frequency = column("Frequency", i).and_then(parse_frequency_hz);
                ch.snr = column("Signal to Noise Ratio", i).and_then(parse_number);
                ch.modulation = column("Downstream Modulation", i).and_then(non_empty);
                ch.power = column("Power Level", i).and_then(parse_number);
                Some(ch)
            })
            .collect()
    }

    fn upstream(table: &Table) -> Vec<Channel> {
        let Some(ids) = table.row_values("Channel ID") else {
            return Vec::new();
        };
        let column = |label: &str, i: usize| {
            table
                .row_values(label)
                .and_then(|cells| cells.get(i))
                .map(String::as_str)
        };

        ids.iter()
            .enumerate()
            .filter_map(|(i, id)| {
                let Some(channel_id) = parse_channel_id(id) else {
                    skip_row("upstream", i, id);
                    return None;
                };
                let mut ch = Channel::new(channel_id);
                ch.frequency = column("Frequency", i).and_then(parse_frequency_hz);
                ch.power = column("Power Level", i).and_then(parse_number);
                ch.modulation = column("Upstream Modulation", i).and_then(non_empty);
                ch.lock_status = column("Ranging Status", i).and_then(non_empty);
                Some(ch)
            })
            .collect()
    }

    fn codewords(table: &Table, downstream: &mut [Channel]) {
        let (Some(ids), Some(corrected), Some(uncorrected)) = (
            table.row_values("Channel ID"),
            table.row_values("Total Correctable Codewords"),
            table.row_values("Total Uncorrectable Codewords"),
        ) else {
            return;
        };
        for (i, id) in ids.iter().enumerate() {
            if let Some(channel_id) = parse_channel_id(id) {
                attach_errors(
                    downstream,
                    channel_id,
                    corrected.get(i).and_then(|c| parse_count(c)),
                    uncorrected.get(i).and_then(|c| parse_count(c)),
                );
            }
        }
    }
}

#[async_trait]
impl ModemParser for Sb6141 {
    fn descriptor(&self) -> &'static ParserDescriptor {
        &SB6141
    }

    fn can_parse(&self, body: &str) -> bool {
        body.contains("Signal to Noise Ratio") && body.contains("Downstream Modulation")
    }

    fn parse(&self, pages: &[Page]) -> ParseResult {
        let mut result = ParseResult::default();
        let Some(body) = page(pages, SB6141_STATUS) else {
            return result;
        };
        let tables = extract_tables(body);

        if let Some(t) = table_by_caption(&tables, "Downstream") {
            result.downstream = Self::downstream(t);
        }
        if let Some(t) = table_by_caption(&tables, "Upstream") {
            result.upstream = Self::upstream(t);
        }
        if let Some(t) = table_by_caption(&tables, "Signal Stats") {
            Self::codewords(t, &mut result.downstream);
        }
        result
    }
}

const SB8200_STATUS: &str = "/cmconnectionstatus.html";
const SB8200_INFO: &str = "/cmswinfo.html";

static SB8200: ParserDescriptor = ParserDescriptor {
    name: "arris_sb8200",
    manufacturer: "ARRIS",
    models: &["SB8200"],
    priority: 55,
    auth: AuthConfig::None,
    url_patterns: &[
        UrlPattern {
            path: SB8200_STATUS,
            auth_required: false,
        },
        UrlPattern {
            path: SB8200_INFO,
            auth_required: false,
        },
    ],
    capabilities: &[
        Capability::ScqamDownstream,
        Capability::ScqamUpstream,
        Capability::OfdmDownstream,
        Capability::OfdmaUpstream,
        Capability::ChannelErrors,
        Capability::SystemUptime,
    ],
};

/// DOCSIS 3.1 SURFboard: row-per-channel tables with a named header row
pub struct Sb8200;

impl Sb8200 {
    fn downstream(table: &Table) -> Vec<Channel> {
        let Some(header) = table.header_row(&["Channel ID", "Lock Status"]) else {
            return Vec::new();
        };
        let cols = Columns::new(&table.rows[header]);

        table.rows[header + 1..]
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let Some(channel_id) = cols.get(row, "channel id").and_then(parse_channel_id) else {
                    skip_row("downstream", i, row);
                    return None;
                };
                let modulation = cols.get(row, "modulation").unwrap_or_default();
                let mut ch = Channel::new(channel_id);
                ch.lock_status = cols.get(row, "lock status").and_then(non_empty);
                ch.modulation = non_empty(modulation);
                // SB8200 labels its OFDM downstream "Other"
                ch.is_ofdm = is_ofdm_modulation(modulation) || modulation.eq_ignore_ascii_case("other");
                ch.frequency = cols.get(row, "frequency").and_then(parse_frequency_hz);
                ch.power = cols.get(row, "power").and_then(parse_number);
                ch.snr = cols.get(row, "snr").and_then(parse_number);
                ch.corrected_errors = cols.get(row, "corrected").and_then(parse_count);
                ch.uncorrected_errors = cols.get(row, "uncorrectables").and_then(parse_count);
                Some(ch)
            })
            .collect()
    }

    fn upstream(table: &Table) -> Vec<Channel> {
        let Some(header) = table.header_row(&["Channel ID", "Lock Status"]) else {
            return Vec::new();
        };
        let cols = Columns::new(&table.rows[header]);

        table.rows[header + 1..]
            .iter()
            .enumerate()
            .filter_map(|(i, row)| {
                let Some(channel_id) = cols.get(row, "channel id").and_then(parse_channel_id) else {
                    skip_row("upstream", i, row);
                    return None;
                };
                let channel_type = cols.get(row, "channel type").unwrap_or_default();
                let mut ch = Channel::new(channel_id);
                ch.lock_status = cols.get(row, "lock status").and_then(non_empty);
                ch.modulation = non_empty(channel_type);
                ch.is_ofdm = is_ofdm_modulation(channel_type);
                ch.frequency = cols.get(row, "frequency").and_then(parse_frequency_hz);
                ch.power = cols.get(row, "power").and_then(parse_number);
                Some(ch)
            })
            .collect()
    }
}

#[async_trait]
impl ModemParser for Sb8200 {
    fn descriptor(&self) -> &'static ParserDescriptor {
        &SB8200
    }

    fn can_parse(&self, body: &str) -> bool {
        body.contains("Downstream Bonded Channels") && body.contains("SNR/MER")
    }

    fn parse(&self, pages: &[Page]) -> ParseResult {
        let mut result = ParseResult::default();
        if let Some(body) = page(pages, SB8200_STATUS) {
            let tables = extract_tables(body);
            if let Some(t) = table_by_caption(&tables, "Downstream Bonded Channels") {
                result.downstream = Self::downstream(t);
            }
            if let Some(t) = table_by_caption(&tables, "Upstream Bonded Channels") {
                result.upstream = Self::upstream(t);
            }
        }
        if let Some(body) = page(pages, SB8200_INFO) {
            info_from_tables(
                &extract_tables(body),
                &mut result,
                &[
                    ("Up Time", info_keys::SYSTEM_UPTIME),
                    ("Software Version", info_keys::SOFTWARE_VERSION),
                    ("Hardware Version", info_keys::HARDWARE_VERSION),
                    ("Standard Specification Compliant", info_keys::DOCSIS_VERSION),
                ],
            );
        }
        result
    }
}

static S33_DESCRIPTOR: ParserDescriptor = ParserDescriptor {
    name: "arris_s33",
    manufacturer: "ARRIS",
    models: &["S33", "SB8200v2"],
    priority: 50,
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
        Capability::ChannelErrors,
        Capability::SoftwareVersion,
    ],
};

/// ARRIS S33 over HNAP. Frequencies are reported in Hz.
pub static S33: HnapStatusParser = HnapStatusParser {
    descriptor: &S33_DESCRIPTOR,
    actions: &[
        "GetCustomerStatusDownstreamChannelInfo",
        "GetCustomerStatusUpstreamChannelInfo",
        "GetCustomerStatusSoftware",
        "GetCustomerStatusConnectionInfo",
        "GetArrisDeviceStatus",
    ],
    downstream: ChannelSource {
        path: "GetCustomerStatusDownstreamChannelInfoResponse/CustomerConnDownstreamChannel",
        layout: DOWNSTREAM_ROW,
    },
    upstream: ChannelSource {
        path: "GetCustomerStatusUpstreamChannelInfoResponse/CustomerConnUpstreamChannel",
        layout: UPSTREAM_ROW,
    },
    info: &[
        ("GetCustomerStatusSoftwareResponse/StatusSoftwareSfVer", info_keys::SOFTWARE_VERSION),
        ("GetCustomerStatusSoftwareResponse/StatusSoftwareHdVer", info_keys::HARDWARE_VERSION),
        ("GetCustomerStatusConnectionInfoResponse/CustomerConnSystemUpTime", info_keys::SYSTEM_UPTIME),
        ("GetArrisDeviceStatusResponse/FirmwareVersion", info_keys::SOFTWARE_VERSION),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    const SB6141_PAGE: &str = r##"
<html><head><title>Signal</title></head><body>
<center><table border="1">
<tr><th colspan="4"><font color="#ffffff">Downstream </font></th></tr>
<tr><td>Channel ID</td><td>1&nbsp; </td><td>2&nbsp; </td><td>3&nbsp; </td></tr>
<tr><td>Frequency</td><td>591000000 Hz&nbsp;</td><td>597000000 Hz&nbsp;</td><td>603000000 Hz&nbsp;</td></tr>
<tr><td>Signal to Noise Ratio</td><td>38 dB&nbsp;</td><td>37 dB&nbsp;</td><td>38 dB&nbsp;</td></tr>
<tr><td>Downstream Modulation</td><td>QAM256&nbsp;</td><td>QAM256&nbsp;</td><td>QAM256&nbsp;</td></tr>
<tr><td>Power Level<table><tr><td>The Downstream Power Level reading is a snapshot taken at the time this page was requested.</td></tr></table></td>
    <td>-1 dBmV&nbsp;</td><td>0 dBmV&nbsp;</td><td>1 dBmV&nbsp;</td></tr>
</table></center>
<center><table border="1">
<tr><th colspan="3">Upstream </th></tr>
<tr><td>Channel ID</td><td>5&nbsp; </td><td>6&nbsp; </td></tr>
<tr><td>Frequency</td><td>30600000 Hz&nbsp;</td><td>24200000 Hz&nbsp;</td></tr>
<tr><td>Ranging Service ID</td><td>2287&nbsp;</td><td>2287&nbsp;</td></tr>
<tr><td>Power Level</td><td>45 dBmV&nbsp;</td><td>44 dBmV&nbsp;</td></tr>
<tr><td>Upstream Modulation</td><td>[3] 64QAM</td><td>[3] 64QAM</td></tr>
<tr><td>Ranging Status </td><td>Success&nbsp;</td><td>Success&nbsp;</td></tr>
</table></center>
<center><table border="1">
<tr><th colspan="4">Signal Stats (Codewords)</th></tr>
<tr><td>Channel ID</td><td>1&nbsp; </td><td>2&nbsp; </td><td>3&nbsp; </td></tr>
<tr><td>Total Unerrored Codewords</td><td>1000</td><td>1000</td><td>1000</td></tr>
<tr><td>Total Correctable Codewords</td><td>12</td><td>0</td><td>3</td></tr>
<tr><td>Total Uncorrectable Codewords</td><td>4</td><td>0</td><td>0</td></tr>
</table></center>
</body></html>"##;

    #[test]
    fn test_sb6141_parses_transposed_tables() {
        assert!(Sb6141.can_parse(SB6141_PAGE));
        let result = Sb6141.parse(&[Page::new(SB6141_STATUS, SB6141_PAGE)]);

        assert_eq!(result.downstream.len(), 3);
        let first = &result.downstream[0];
        assert_eq!(first.channel_id, 1);
        assert_eq!(first.frequency, Some(591_000_000.0));
        assert_eq!(first.power, Some(-1.0));
        assert_eq!(first.snr, Some(38.0));
        assert_eq!(first.corrected_errors, Some(12));
        assert_eq!(first.uncorrected_errors, Some(4));

        assert_eq!(result.upstream.len(), 2);
        assert_eq!(result.upstream[0].power, Some(45.0));
        assert_eq!(result.upstream[0].lock_status.as_deref(), Some("Success"));
        assert!(SB6141.missing_capabilities(&result).is_empty());
    }

    const SB8200_PAGE: &str = r#"
<html><body>
<table class="simpleTable">
<tr><th colspan="8"><strong>Downstream Bonded Channels</strong></th></tr>
<tr><td><strong>Channel ID</strong></td><td><strong>Lock Status</strong></td><td><strong>Modulation</strong></td>
    <td><strong>Frequency</strong></td><td><strong>Power</strong></td><td><strong>SNR/MER</strong></td>
    <td><strong>Corrected</strong></td><td><strong>Uncorrectables</strong></td></tr>
<tr><td>13</td><td>Locked</td><td>QAM256</td><td>579000000 Hz</td><td>3.1 dBmV</td><td>42.3 dB</td><td>12</td><td>0</td></tr>
<tr><td>n/a</td><td>Locked</td><td>QAM256</td><td>585000000 Hz</td><td>3.0 dBmV</td><td>42.0 dB</td><td>0</td><td>0</td></tr>
<tr><td>33</td><td>Locked</td><td>Other</td><td>957000000 Hz</td><td>2.5 dBmV</td><td>41.0 dB</td><td>1234</td><td>0</td></tr>
</table>
<table class="simpleTable">
<tr><th colspan="7"><strong>Upstream Bonded Channels</strong></th></tr>
<tr><td>Channel</td><td>Channel ID</td><td>Lock Status</td><td>US Channel Type</td><td>Frequency</td><td>Width</td><td>Power</td></tr>
<tr><td>1</td><td>3</td><td>Locked</td><td>SC-QAM Upstream</td><td>16400000 Hz</td><td>6400000 Hz</td><td>44.0 dBmV</td></tr>
<tr><td>2</td><td>41</td><td>Locked</td><td>OFDM Upstream</td><td>36200000 Hz</td><td>44400000 Hz</td><td>38.5 dBmV</td></tr>
</table>
</body></html>"#;

    const SB8200_INFO_PAGE: &str = r#"
<table class="simpleTable">
<tr><th colspan="2">Information</th></tr>
<tr><td>Standard Specification Compliant</td><td>Docsis 3.1</td></tr>
<tr><td>Hardware Version</td><td>6</td></tr>
<tr><td>Software Version</td><td>AB01.02.053.05_051921_193.0A.NSH</td></tr>
</table>
<table class="simpleTable"><tr><td>Up Time</td><td>7 days 03h:21m:15s.00</td></tr></table>"#;

    #[test]
    fn test_sb8200_parses_by_header_name() {
        assert!(Sb8200.can_parse(SB8200_PAGE));
        assert!(!Sb6141.can_parse(SB8200_PAGE));

        let result = Sb8200.parse(&[
            Page::new(SB8200_STATUS, SB8200_PAGE),
            Page::new(SB8200_INFO, SB8200_INFO_PAGE),
        ]);
        assert_eq!(result.downstream.len(), 2);
        assert!(result.downstream[1].is_ofdm);
        assert_eq!(result.downstream[1].corrected_errors, Some(1234));

        assert_eq!(result.upstream.len(), 2);
        assert_eq!(result.upstream[0].channel_id, 3);
        assert!(!result.upstream[0].is_ofdm);
        assert!(result.upstream[1].is_ofdm);

        assert_eq!(
            result.system_info.get(info_keys::SYSTEM_UPTIME).map(String::as_str),
            Some("7 days 03h:21m:15s.00")
        );
        assert!(SB8200.missing_capabilities(&result).is_empty());
    }

    #[test]
    fn test_s33_parses_hz_rows() {
        let body = r#"{"GetMultipleHNAPsResponse":{
            "GetCustomerStatusDownstreamChannelInfoResponse":{"CustomerConnDownstreamChannel":"1^Locked^256QAM^5^579000000^ 3^43^10^1^|+|2^Locked^OFDM PLC^33^850000000^ 1^40^100^0^"},
            "GetCustomerStatusUpstreamChannelInfoResponse":{"CustomerConnUpstreamChannel":"1^Locked^SC-QAM^1^6400000^16400000^44.0^"},
            "GetCustomerStatusSoftwareResponse":{"StatusSoftwareSfVer":"TB01.03.001.10_012022_212.S3"},
            "GetArrisDeviceStatusResponse":{"FirmwareVersion":"TB01.03.001.10"}}}"#;
        assert!(S33.can_parse(body));
        let result = S33.parse(&[Page::new("/HNAP1/", body)]);

        assert_eq!(result.downstream.len(), 2);
        assert_eq!(result.downstream[0].frequency, Some(579_000_000.0));
        assert!(result.downstream[1].is_ofdm);
        assert_eq!(result.upstream[0].frequency, Some(16_400_000.0));
        assert_eq!(
            result.system_info.get(info_keys::SOFTWARE_VERSION).map(String::as_str),
            Some("TB01.03.001.10_012022_212.S3")
        );
    }
}
