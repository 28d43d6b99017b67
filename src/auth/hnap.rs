//! HNAP session login

use super::{complete, AuthKind, AuthOutcome, AuthStrategy, HnapAuth};
use crate::hnap::{get_text_value, hmac_md5_hex, HnapRequestBuilder};
use crate::http::{HnapToken, ModemSession};
use crate::models::Credentials;
use crate::utils;
use anyhow::Result;
use async_trait::async_trait;
use url::Url;

const LOGIN_ACTION: &str = "Login";

pub struct HnapLogin {
    config: HnapAuth,
}

impl HnapLogin {
    pub fn new(config: HnapAuth) -> Self {
        Self { config }
    }

    fn builder(&self) -> HnapRequestBuilder {
        HnapRequestBuilder::new(self.config.hnap_endpoint, self.config.soap_namespace)
    }

    /// Whether a response says the session is gone or the login failed
    pub fn is_rejected(&self, body: &str) -> bool {
        if body.contains(self.config.session_timeout_indicator) {
            return true;
        }
        get_text_value(body, "LoginResponse/LoginResult")
            .map(|r| r.eq_ignore_ascii_case("FAILED"))
            .unwrap_or(false)
    }

    async fn simple_login(
        &self,
        session: &mut ModemSession,
        base_url: &Url,
        creds: &Credentials,
    ) -> Result<AuthOutcome> {
        let body = self
            .builder()
            .call_single(
                session,
                base_url,
                LOGIN_ACTION,
                &[
                    ("Action", "login"),
                    ("Username", creds.username.as_str()),
                    ("LoginPassword", creds.password.as_str()),
                ],
            )
            .await?;
        Ok(self.outcome(session, body))
    }

    async fn challenge_login(
        &self,
        session: &mut ModemSession,
        base_url: &Url,
        creds: &Credentials,
    ) -> Result<AuthOutcome> {
        let builder = self.builder();
        let body = builder
            .call_single(
                session,
                base_url,
                LOGIN_ACTION,
                &[
                    ("Action", "request"),
                    ("Username", creds.username.as_str()),
                    ("LoginPassword", ""),
                    ("Captcha", ""),
                    ("PrivateLogin", "LoginPassword"),
                ],
            )
            .await?;

        let challenge = get_text_value(&body, "LoginResponse/Challenge");
        let public_key = get_text_value(&body, "LoginResponse/PublicKey");
        let cookie = get_text_value(&body, "LoginResponse/Cookie");
        let (Some(challenge), Some(public_key), Some(cookie)) = (challenge, public_key, cookie)
        else {
            tracing::debug!("HNAP login request returned no challenge");
            return Ok(AuthOutcome::rejected());
        };

        let private_key = hmac_md5_hex(
            format!("{}{}", public_key, creds.password).as_bytes(),
            challenge.as_bytes(),
        )?;
        let login_password = hmac_md5_hex(private_key.as_bytes(), challenge.as_bytes())?;

        session.add_cookie(&format!("uid={}", cookie), base_url);
        session.add_cookie(&format!("PrivateKey={}", private_key), base_url);
        session.set_hnap_token(HnapToken::Signed { private_key });

        let body = builder
            .call_single(
                session,
                base_url,
                LOGIN_ACTION,
                &[
                    ("Action", "login"),
                    ("Username", creds.username.as_str()),
                    ("LoginPassword", login_password.as_str()),
                    ("Captcha", ""),
                    ("PrivateLogin", "LoginPassword"),
                ],
            )
            .await?;
        Ok(self.outcome(session, body))
    }

    fn outcome(&self, session: &mut ModemSession, body: String) -> AuthOutcome {
        if self.is_rejected(&body) {
            session.clear_auth();
            AuthOutcome::rejected()
        } else {
            AuthOutcome::accepted(Some(body))
        }
    }
}

#[async_trait]
impl AuthStrategy for HnapLogin {
    fn kind(&self) -> AuthKind {
        AuthKind::HnapSession
    }

    async fn login(
        &self,
        session: &mut ModemSession,
        base_url: &Url,
        credentials: Option<&Credentials>,
    ) -> Result<AuthOutcome> {
        let Some(creds) = complete(credentials) else {
            return Ok(AuthOutcome::rejected());
        };

        // Some firmware hands out its first cookie with the login page.
        let login_page = utils::join_path(base_url, self.config.login_url)?;
        if let Err(e) = session.get(&login_page).await {
            tracing::debug!("HNAP login page {} not reachable: {}", login_page, e);
        }

        if self.config.challenge_response {
            self.challenge_login(session, base_url, creds).await
        } else {
            self.simple_login(session, base_url, creds).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnap::DEFAULT_NAMESPACE;

    fn login() -> HnapLogin {
        HnapLogin::new(HnapAuth {
            login_url: "/Login.html",
            hnap_endpoint: "/HNAP1/",
            session_timeout_indicator: "UN-AUTH",
            soap_namespace: DEFAULT_NAMESPACE,
            challenge_response: true,
        })
    }

    #[test]
    fn test_timeout_indicator_rejects() {
        assert!(login().is_rejected(r#"{"LoginResponse":{"LoginResult":"UN-AUTH"}}"#));
    }

    #[test]
    fn test_failed_result_rejects() {
        assert!(login().is_rejected(r#"{"LoginResponse":{"LoginResult":"FAILED"}}"#));
    }

    #[test]
    fn test_ok_result_accepted() {
        assert!(!login().is_rejected(r#"{"LoginResponse":{"LoginResult":"OK"}}"#));
    }
}
