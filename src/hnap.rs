//! HNAP request builder
//!
//! HNAP is SOAP 1.1 over HTTP POST. Every call names its action twice: as the
//! body element and in the `SOAPAction` header (`"{namespace}{Action}"`).
//! Status pages are fetched through the `GetMultipleHNAPs` batching action so
//! one POST returns every requested action's response.
//!
//! Responses come back as XML or JSON depending on the firmware family;
//! `get_text_value` reads either.

use crate::http::{HnapToken, ModemSession};
use crate::utils;
use anyhow::{anyhow, bail, Result};
use hmac::{Hmac, Mac};
use md5::Md5;
use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde_json::Value;
use std::time::{SystemTime, UNIX_EPOCH};
use url::Url;

pub const DEFAULT_NAMESPACE: &str = "http://purenetworks.com/HNAP1/";
pub const MULTIPLE_ACTION: &str = "GetMultipleHNAPs";
pub const HNAP_AUTH_HEADER: &str = "hnap_auth";
pub const SOAP_ACTION_HEADER: &str = "soapaction";

/// Signing key devices expect before a login has produced a private key
const UNAUTHENTICATED_KEY: &str = "withoutloginkey";

/// Builds and sends HNAP calls against one endpoint
#[derive(Debug, Clone, Copy)]
pub struct HnapRequestBuilder {
    endpoint: &'static str,
    namespace: &'static str,
}

impl HnapRequestBuilder {
    pub fn new(endpoint: &'static str, namespace: &'static str) -> Self {
        Self { endpoint, namespace }
    }

    pub fn endpoint(&self) -> &'static str {
        self.endpoint
    }

    /// Quoted `SOAPAction` header value
    pub fn soap_action(&self, action: &str) -> String {
        format!("\"{}{}\"", self.namespace, action)
    }

    /// SOAP envelope for one action with `<Name>value</Name>` parameters
    pub fn envelope(&self, action: &str, params: &[(&str, &str)]) -> String {
        let body: String = params
            .iter()
            .map(|(name, value)| format!("<{0}>{1}</{0}>", name, escape(*value)))
            .collect();
        self.wrap(action, &body)
    }

    /// `GetMultipleHNAPs` envelope listing each action as an empty child element
    pub fn multiple_envelope(&self, actions: &[&str]) -> String {
        let body: String = actions
            .iter()
            .map(|action| format!("<{0} xmlns=\"{1}\"></{0}>", action, self.namespace))
            .collect();
        self.wrap(MULTIPLE_ACTION, &body)
    }

    fn wrap(&self, action: &str, body: &str) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="utf-8"?>"#,
                r#"<soap:Envelope xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" "#,
                r#"xmlns:xsd="http://www.w3.org/2001/XMLSchema" "#,
                r#"xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">"#,
                r#"<soap:Body><{action} xmlns="{ns}">{body}</{action}></soap:Body>"#,
                r#"</soap:Envelope>"#
            ),
            action = action,
            ns = self.namespace,
            body = body
        )
    }

    fn headers(&self, session: &ModemSession, action: &str) -> Result<HeaderMap> {
        let soap_action = self.soap_action(action);
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/xml; charset=utf-8"),
        );
        headers.insert(
            HeaderName::from_static(SOAP_ACTION_HEADER),
            HeaderValue::from_str(&soap_action)?,
        );

        let auth = match session.hnap_token() {
            Some(HnapToken::Issued(token)) => token.clone(),
            Some(HnapToken::Signed { private_key }) => sign(private_key, &soap_action)?,
            None => sign(UNAUTHENTICATED_KEY, &soap_action)?,
        };
        headers.insert(
            HeaderName::from_static(HNAP_AUTH_HEADER),
            HeaderValue::from_str(&auth)?,
        );
        Ok(headers)
    }

    async fn post(
        &self,
        session: &mut ModemSession,
        base_url: &Url,
        action: &str,
        envelope: String,
    ) -> Result<String> {
        let url = utils::join_path(base_url, self.endpoint)?;
        let headers = self.headers(session, action)?;
        let resp = session.post_body(&url, &envelope, headers).await?;

        if !resp.is_success() {
            bail!("HNAP {} at {} returned {}", action, url, resp.status);
        }
        if let Some(token) = resp.header(HNAP_AUTH_HEADER) {
            if !matches!(session.hnap_token(), Some(HnapToken::Signed { .. })) {
                tracing::debug!("Device issued an HNAP_AUTH token");
                session.set_hnap_token(HnapToken::Issued(token.to_string()));
            }
        }
        Ok(resp.body)
    }

    /// One action, one POST
    pub async fn call_single(
        &self,
        session: &mut ModemSession,
        base_url: &Url,
        action: &str,
        params: &[(&str, &str)],
    ) -> Result<String> {
        let envelope = self.envelope(action, params);
        self.post(session, base_url, action, envelope).await
    }

    /// Several actions batched into a single `GetMultipleHNAPs` POST
    pub async fn call_multiple(
        &self,
        session: &mut ModemSession,
        base_url: &Url,
        actions: &[&str],
    ) -> Result<String> {
        tracing::debug!("HNAP batch of {} actions: {}", actions.len(), actions.join(", "));
        let envelope = self.multiple_envelope(actions);
        self.post(session, base_url, MULTIPLE_ACTION, envelope).await
    }
}

/// `HNAP_AUTH` header value: `HMAC-MD5(key, timestamp + SOAPAction) timestamp`
pub fn sign(key: &str, soap_action: &str) -> Result<String> {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    let timestamp = (millis % 2_000_000_000_000).to_string();
    let digest = hmac_md5_hex(key.as_bytes(), format!("{}{}", timestamp, soap_action).as_bytes())?;
    Ok(format!("{} {}", digest, timestamp))
}

/// HMAC-MD5 as upper-case hex
pub fn hmac_md5_hex(key: &[u8], message: &[u8]) -> Result<String> {
    let mut mac = Hmac::<Md5>::new_from_slice(key).map_err(|e| anyhow!("Invalid HMAC key: {}", e))?;
    mac.update(message);
    Ok(mac
        .finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect())
}

/// Text of the element or field at `path` (`Outer/Inner/Leaf`), wherever it
/// sits in the document. Works on both XML and JSON bodies.
pub fn get_text_value(body: &str, path: &str) -> Option<String> {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    if segments.is_empty() {
        return None;
    }

    let trimmed = body.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        let value: Value = serde_json::from_str(trimmed).ok()?;
        json_lookup(&value, &segments)
    } else {
        xml_lookup(body, &segments)
    }
}

fn json_lookup(value: &Value, segments: &[&str]) -> Option<String> {
    if let Some(found) = json_descend(value, segments) {
        return Some(found);
    }
    match value {
        Value::Object(map) => map.values().find_map(|v| json_lookup(v, segments)),
        Value::Array(items) => items.iter().find_map(|v| json_lookup(v, segments)),
        _ => None,
    }
}

fn json_descend(value: &Value, segments: &[&str]) -> Option<String> {
    let mut current = value;
    for segment in segments {
        current = current.as_object()?.get(*segment)?;
    }
    match current {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn xml_lookup(body: &str, segments: &[&str]) -> Option<String> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<String> = Vec::new();
    let ends_with_path = |stack: &[String]| {
        stack.len() >= segments.len()
            && stack[stack.len() - segments.len()..]
                .iter()
                .zip(segments)
                .all(|(a, b)| a == b)
    };

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
            }
            Ok(Event::Empty(e)) => {
                stack.push(String::from_utf8_lossy(e.local_name().as_ref()).into_owned());
                if ends_with_path(&stack) {
                    return Some(String::new());
                }
                stack.pop();
            }
            Ok(Event::Text(t)) => {
                if ends_with_path(&stack) {
                    return t.unescape().ok().map(|s| s.into_owned());
                }
            }
            Ok(Event::CData(c)) => {
                if ends_with_path(&stack) {
                    return Some(String::from_utf8_lossy(&c.into_inner()).into_owned());
                }
            }
            Ok(Event::End(_)) => {
                if ends_with_path(&stack) {
                    return Some(String::new());
                }
                stack.pop();
            }
            Ok(Event::Eof) => return None,
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("HNAP XML parse error: {}", e);
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn builder() -> HnapRequestBuilder {
        HnapRequestBuilder::new("/HNAP1/", DEFAULT_NAMESPACE)
    }

    #[test]
    fn test_soap_action_is_quoted_namespace_and_action() {
        assert_eq!(
            builder().soap_action("Login"),
            "\"http://purenetworks.com/HNAP1/Login\""
        );
    }

    #[test]
    fn test_envelope_escapes_params() {
        let xml = builder().envelope("Login", &[("Username", "admin"), ("LoginPassword", "a<b&c")]);
        assert!(xml.contains("<soap:Body><Login xmlns=\"http://purenetworks.com/HNAP1/\">"));
        assert!(xml.contains("<Username>admin</Username>"));
        assert!(xml.contains("<LoginPassword>a&lt;b&amp;c</LoginPassword>"));
        assert_eq!(get_text_value(&xml, "Login/LoginPassword").as_deref(), Some("a<b&c"));
    }

    #[test]
    fn test_multiple_envelope_lists_every_action() {
        let xml = builder().multiple_envelope(&["GetA", "GetB"]);
        assert!(xml.contains("<GetMultipleHNAPs xmlns="));
        assert!(xml.contains("<GetA xmlns=\"http://purenetworks.com/HNAP1/\"></GetA>"));
        assert!(xml.contains("<GetB xmlns=\"http://purenetworks.com/HNAP1/\"></GetB>"));
    }

    #[test]
    fn test_hmac_md5_rfc2104_vectors() {
        assert_eq!(
            hmac_md5_hex(b"Jefe", b"what do ya want for nothing?").unwrap(),
            "750C783E6AB0B503EAA86E310A5DB738"
        );
        assert_eq!(
            hmac_md5_hex(&[0x0b; 16], b"Hi There").unwrap(),
            "9294727A3638BB1C13F48EF8158BFC9D"
        );
    }

    #[test]
    fn test_sign_format() {
        let value = sign("withoutloginkey", "\"http://purenetworks.com/HNAP1/Login\"").unwrap();
        let (digest, timestamp) = value.split_once(' ').unwrap();
        assert_eq!(digest.len(), 32);
        assert!(timestamp.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_get_text_value_json_nested_in_batch() {
        let body = r#"{"GetMultipleHNAPsResponse":{"GetMotoStatusSoftwareResponse":{"StatusSoftwareSfVer":"8611-19.2.18","GetMotoStatusSoftwareResult":"OK"},"GetMultipleHNAPsResult":"OK"}}"#;
        assert_eq!(
            get_text_value(body, "GetMotoStatusSoftwareResponse/StatusSoftwareSfVer").as_deref(),
            Some("8611-19.2.18")
        );
        assert_eq!(
            get_text_value(body, "GetMultipleHNAPsResponse/GetMultipleHNAPsResult").as_deref(),
            Some("OK")
        );
        assert!(get_text_value(body, "Missing/Field").is_none());
    }

    #[test]
    fn test_get_text_value_xml_ignores_prefixes() {
        let body = r#"<?xml version="1.0"?>
            <soap:Envelope xmlns:soap="http://schemas.xmlsoap.org/soap/envelope/">
              <soap:Body>
                <LoginResponse xmlns="http://purenetworks.com/HNAP1/">
                  <LoginResult>OK</LoginResult>
                  <Challenge>ABC123</Challenge>
                  <Captcha/>
                </LoginResponse>
              </soap:Body>
            </soap:Envelope>"#;
        assert_eq!(get_text_value(body, "LoginResponse/Challenge").as_deref(), Some("ABC123"));
        assert_eq!(get_text_value(body, "LoginResult").as_deref(), Some("OK"));
        assert_eq!(get_text_value(body, "LoginResponse/Captcha").as_deref(), Some(""));
        assert!(get_text_value(body, "LoginResponse/PublicKey").is_none());
    }

    #[test]
    fn test_get_text_value_json_number() {
        assert_eq!(get_text_value(r#"{"a":{"b":42}}"#, "a/b").as_deref(), Some("42"));
    }
}
