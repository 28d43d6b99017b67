//! Logins that need no round trip: none at all, and HTTP Basic

use super::{complete, AuthKind, AuthOutcome, AuthStrategy};
use crate::http::ModemSession;
use crate::models::Credentials;
use anyhow::Result;
use async_trait::async_trait;
use url::Url;

/// Status pages open to anyone on the LAN
pub struct NoLogin;

#[async_trait]
impl AuthStrategy for NoLogin {
    fn kind(&self) -> AuthKind {
        AuthKind::NoAuth
    }

    async fn login(
        &self,
        _session: &mut ModemSession,
        _base_url: &Url,
        _credentials: Option<&Credentials>,
    ) -> Result<AuthOutcome> {
        Ok(AuthOutcome::accepted(None))
    }
}

/// HTTP Basic: the credentials ride along on every later request.
///
/// No extra request is made; a wrong password shows up as a 401 on the
/// status page fetch.
pub struct BasicLogin;

#[async_trait]
impl AuthStrategy for BasicLogin {
    fn kind(&self) -> AuthKind {
        AuthKind::BasicHttp
    }

    async fn login(
        &self,
        session: &mut ModemSession,
        _base_url: &Url,
        credentials: Option<&Credentials>,
    ) -> Result<AuthOutcome> {
        let Some(creds) = complete(credentials) else {
            tracing::debug!("Basic auth needs both username and password");
            return Ok(AuthOutcome::rejected());
        };
        session.enable_basic_auth(creds.clone());
        Ok(AuthOutcome::accepted(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpSettings;

    fn base() -> Url {
        Url::parse("http://192.168.100.1/").unwrap()
    }

    #[tokio::test]
    async fn test_no_login_always_succeeds() {
        let mut session = ModemSession::new(HttpSettings::default()).unwrap();
        let outcome = NoLogin.login(&mut session, &base(), None).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.body.is_none());
    }

    #[tokio::test]
    async fn test_basic_rejects_missing_password() {
        let mut session = ModemSession::new(HttpSettings::default()).unwrap();
        let creds = Credentials::new("admin", "");
        let outcome = BasicLogin
            .login(&mut session, &base(), Some(&creds))
            .await
            .unwrap();
        assert!(!outcome.success);
        assert!(!session.basic_auth_enabled());
    }

    #[tokio::test]
    async fn test_basic_attaches_credentials() {
        let mut session = ModemSession::new(HttpSettings::default()).unwrap();
        let creds = Credentials::new("admin", "password");
        let outcome = BasicLogin
            .login(&mut session, &base(), Some(&creds))
            .await
            .unwrap();
        assert!(outcome.success);
        assert!(session.basic_auth_enabled());
    }
}
