mod common;

use common::fixtures::{downstream_rows, moto_status_json, upstream_rows};
use common::wiremock_helpers::{base_url, engine, quick_settings};
use modemscout::hnap::{get_text_value, HnapRequestBuilder, DEFAULT_NAMESPACE, HNAP_AUTH_HEADER};
use modemscout::modems::motorola::MB8611;
use modemscout::{Credentials, ModemError, ModemParser, ModemSession, Page, ParserRegistry, Tier};
use wiremock::matchers::{body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const STATUS_ACTIONS: [&str; 5] = [
    "GetMotoStatusDownstreamChannelInfo",
    "GetMotoStatusUpstreamChannelInfo",
    "GetMotoStatusConnectionInfo",
    "GetMotoStatusSoftware",
    "GetMotoStatusStartupSequence",
];

async fn mount_status(server: &MockServer, body: String) {
    Mock::given(method("POST"))
        .and(path("/HNAP1/"))
        .and(body_string_contains("GetMultipleHNAPs"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_call_multiple_sends_one_post() {
    let server = MockServer::start().await;
    mount_status(&server, moto_status_json(&downstream_rows(4, None), &upstream_rows(2))).await;

    let mut session = ModemSession::new(quick_settings()).unwrap();
    let body = HnapRequestBuilder::new("/HNAP1/", DEFAULT_NAMESPACE)
        .call_multiple(&mut session, &base_url(&server), &STATUS_ACTIONS)
        .await
        .unwrap();
    assert!(body.contains("GetMultipleHNAPsResult"));

    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let sent = String::from_utf8_lossy(&requests[0].body);
    for action in STATUS_ACTIONS {
        assert!(sent.contains(action), "{} missing from {}", action, sent);
    }
    assert_eq!(
        requests[0].headers.get("soapaction").and_then(|v| v.to_str().ok()),
        Some("\"http://purenetworks.com/HNAP1/GetMultipleHNAPs\"")
    );
    assert!(requests[0].headers.get(HNAP_AUTH_HEADER).is_some());
}

#[tokio::test]
async fn test_batched_status_tolerates_one_bad_row() {
    let server = MockServer::start().await;
    mount_status(&server, moto_status_json(&downstream_rows(33, Some(17)), &upstream_rows(4))).await;

    let mut session = ModemSession::new(quick_settings()).unwrap();
    let pages = MB8611.fetch(&mut session, &base_url(&server)).await.unwrap();
    assert!(MB8611.can_parse(&pages[0].body));

    let result = MB8611.parse(&pages);
    assert_eq!(result.downstream.len(), 32);
    assert!(result.downstream.iter().all(|c| c.channel_id != 18));
    assert_eq!(result.downstream[0].frequency, Some(435_000_000.0));
    assert_eq!(result.upstream.len(), 4);
    assert_eq!(
        result.system_info.get("software_version").map(String::as_str),
        Some("8611-19.2.18")
    );
}

#[test]
fn test_xml_and_json_status_read_alike() {
    let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/"><soap:Body>
<GetMultipleHNAPsResponse xmlns="http://purenetworks.com/HNAP1/">
<GetMotoStatusDownstreamChannelInfoResponse>
<MotoConnDownstreamChannel>1^Locked^QAM256^20^477.0^1.4^39.0^10^0^|+|2^Locked^OFDM PLC^33^690.0^0.6^38.2^99^1^</MotoConnDownstreamChannel>
</GetMotoStatusDownstreamChannelInfoResponse>
</GetMultipleHNAPsResponse></soap:Body></soap:Envelope>"#;

    let result = MB8611.parse(&[Page::new("/HNAP1/", xml)]);
    assert_eq!(result.downstream.len(), 2);
    assert!(result.downstream[1].is_ofdm);
    assert_eq!(
        get_text_value(xml, "GetMotoStatusDownstreamChannelInfoResponse/MotoConnDownstreamChannel")
            .map(|s| s.split("|+|").count()),
        Some(2)
    );
}

#[tokio::test]
async fn test_challenge_login_then_batched_fetch() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Login.html"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>Login</html>"))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/HNAP1/"))
        .and(body_string_contains("<Action>request</Action>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"LoginResponse":{"Challenge":"5B7A3D5C","Cookie":"81946373","PublicKey":"AB12CD34","LoginResult":"OK"}}"#,
        ))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/HNAP1/"))
        .and(body_string_contains("<Action>login</Action>"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"LoginResponse":{"LoginResult":"OK"}}"#),
        )
        .expect(1)
        .mount(&server)
        .await;
    mount_status(&server, moto_status_json(&downstream_rows(8, None), &upstream_rows(2))).await;

    let engine = engine(ParserRegistry::builtin());
    let detection = engine
        .discover(
            &server.uri(),
            Some(Credentials::new("admin", "motorola")),
            Some("motorola_mb8611"),
        )
        .await
        .unwrap();

    assert_eq!(detection.parser_name(), "motorola_mb8611");
    assert_eq!(detection.tier(), Tier::Cached);
    assert_eq!(detection.parse().downstream.len(), 8);

    let requests = server.received_requests().await.unwrap();
    let batch = requests
        .iter()
        .find(|r| String::from_utf8_lossy(&r.body).contains("GetMultipleHNAPs"))
        .expect("status batch request");
    let cookies = batch
        .headers
        .get("cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    assert!(cookies.contains("uid=81946373"), "{}", cookies);
    assert!(cookies.contains("PrivateKey="), "{}", cookies);

    let auth = batch
        .headers
        .get(HNAP_AUTH_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let parts: Vec<&str> = auth.split(' ').collect();
    assert_eq!(parts.len(), 2, "{}", auth);
    assert_eq!(parts[0].len(), 32);
}

#[tokio::test]
async fn test_failed_challenge_login_is_authentication_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/HNAP1/"))
        .and(body_string_contains("<Action>request</Action>"))
        .respond_with(ResponseTemplate::new(200).set_body_string(
            r#"{"LoginResponse":{"Challenge":"5B7A3D5C","Cookie":"81946373","PublicKey":"AB12CD34","LoginResult":"OK"}}"#,
        ))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/HNAP1/"))
        .and(body_string_contains("<Action>login</Action>"))
        .respond_with(
            ResponseTemplate::new(200).set_body_string(r#"{"LoginResponse":{"LoginResult":"FAILED"}}"#),
        )
        .mount(&server)
        .await;

    let err = engine(ParserRegistry::builtin())
        .discover(
            &server.uri(),
            Some(Credentials::new("admin", "wrong")),
            Some("motorola_mb8611"),
        )
        .await
        .unwrap_err();

    match err {
        ModemError::Authentication { parser } => assert_eq!(parser, "motorola_mb8611"),
        other => panic!("expected authentication error, got {:?}", other),
    }
}
