use std::path::PathBuf;

pub fn fixture_path(relative: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(relative)
}

pub fn load_fixture(relative: &str) -> String {
    std::fs::read_to_string(fixture_path(relative))
        .unwrap_or_else(|_| panic!("Failed to load fixture: {}", relative))
}

/// `num^lock^modulation^id^freq^power^snr^corrected^uncorrected` rows, MHz frequencies
pub fn downstream_rows(count: usize, malformed_at: Option<usize>) -> String {
    (0..count)
        .map(|i| {
            let id = if Some(i) == malformed_at {
                "n/a".to_string()
            } else {
                (i + 1).to_string()
            };
            format!(
                "{}^Locked^QAM256^{}^{:.1}^{:.1}^{:.1}^{}^{}",
                i + 1,
                id,
                435.0 + 6.0 * i as f64,
                2.0 + (i % 5) as f64 * 0.3,
                40.1,
                i * 3,
                i % 2
            )
        })
        .collect::<Vec<_>>()
        .join("|+|")
}

/// `num^lock^type^id^width^freq^power` rows
pub fn upstream_rows(count: usize) -> String {
    (0..count)
        .map(|i| format!("{}^Locked^SC-QAM^{}^5120^{:.1}^44.5", i + 1, i + 1, 16.4 + 6.4 * i as f64))
        .collect::<Vec<_>>()
        .join("|+|")
}

/// A `GetMultipleHNAPs` JSON answer for the five Motorola status actions
pub fn moto_status_json(downstream: &str, upstream: &str) -> String {
    serde_json::json!({
        "GetMultipleHNAPsResponse": {
            "GetMotoStatusDownstreamChannelInfoResponse": {
                "MotoConnDownstreamChannel": downstream,
                "GetMotoStatusDownstreamChannelInfoResult": "OK"
            },
            "GetMotoStatusUpstreamChannelInfoResponse": {
                "MotoConnUpstreamChannel": upstream,
                "GetMotoStatusUpstreamChannelInfoResult": "OK"
            },
            "GetMotoStatusConnectionInfoResponse": {
                "MotoConnSystemUpTime": "6 days 11h:32m:09s",
                "GetMotoStatusConnectionInfoResult": "OK"
            },
            "GetMotoStatusSoftwareResponse": {
                "StatusSoftwareSfVer": "8611-19.2.18",
                "StatusSoftwareHdVer": "V1.0",
                "StatusSoftwareSpecVer": "DOCSIS 3.1",
                "GetMotoStatusSoftwareResult": "OK"
            },
            "GetMotoStatusStartupSequenceResponse": {
                "MotoConnModelName": "MB8611",
                "GetMotoStatusStartupSequenceResult": "OK"
            },
            "GetMultipleHNAPsResult": "OK"
        }
    })
    .to_string()
}
