//! HTML form logins

use super::{complete, AuthKind, AuthOutcome, AuthStrategy, FormAuth, PasswordEncoding, RedirectFormAuth};
use crate::http::{HttpResponse, ModemSession};
use crate::models::Credentials;
use crate::utils;
use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use url::Url;

/// Without a success indicator, a logged-in page is assumed to be at least this
/// large. Login and error pages on these devices are a few hundred bytes.
const MIN_AUTHENTICATED_BODY: usize = 1024;

pub struct FormLogin {
    config: FormAuth,
}

impl FormLogin {
    pub fn new(config: FormAuth) -> Self {
        Self { config }
    }

    async fn submit(
        &self,
        session: &ModemSession,
        url: &Url,
        username: &str,
        password: &str,
    ) -> Result<HttpResponse> {
        let form = [
            (self.config.username_field, username),
            (self.config.password_field, password),
        ];
        session.post_form(url, &form).await
    }

    fn is_logged_in(&self, resp: &HttpResponse) -> bool {
        if !resp.is_success() {
            return false;
        }
        match self.config.success_indicator {
            Some(indicator) => resp.body.contains(indicator),
            None => resp.body.len() >= MIN_AUTHENTICATED_BODY,
        }
    }

    fn encodings(&self) -> &'static [PasswordEncoding] {
        match self.config.encoding {
            PasswordEncoding::Plain => &[PasswordEncoding::Plain],
            PasswordEncoding::Base64 => &[PasswordEncoding::Base64],
            PasswordEncoding::PlainThenBase64 => {
                &[PasswordEncoding::Plain, PasswordEncoding::Base64]
            }
        }
    }
}

fn encode_password(password: &str, encoding: PasswordEncoding) -> String {
    match encoding {
        PasswordEncoding::Base64 => STANDARD.encode(password),
        _ => password.to_string(),
    }
}

#[async_trait]
impl AuthStrategy for FormLogin {
    fn kind(&self) -> AuthKind {
        super::AuthConfig::Form(self.config).kind()
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
        let url = utils::join_path(base_url, self.config.login_url)?;

        for (i, encoding) in self.encodings().iter().enumerate() {
            let password = encode_password(&creds.password, *encoding);
            let resp = self.submit(session, &url, &creds.username, &password).await?;
            if self.is_logged_in(&resp) {
                tracing::debug!(
                    "Form login accepted at {} ({:?} password, attempt {})",
                    url,
                    encoding,
                    i + 1
                );
                return Ok(AuthOutcome::accepted(Some(resp.body)));
            }
            tracing::debug!("Form login with {:?} password rejected by {}", encoding, url);
        }

        Ok(AuthOutcome::rejected())
    }
}

/// Form login judged by the final URL after redirects.
///
/// Some firmware answers a bad password with HTTP 200 and the login page
/// again, so only landing on `success_redirect_pattern` counts.
pub struct RedirectFormLogin {
    config: RedirectFormAuth,
}

impl RedirectFormLogin {
    pub fn new(config: RedirectFormAuth) -> Self {
        Self { config }
    }
}

#[async_trait]
impl AuthStrategy for RedirectFormLogin {
    fn kind(&self) -> AuthKind {
        AuthKind::RedirectForm
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
        let login_url = utils::join_path(base_url, self.config.login_url)?;
        let form = [
            (self.config.username_field, creds.username.as_str()),
            (self.config.password_field, creds.password.as_str()),
        ];
        let resp = session.post_form(&login_url, &form).await?;

        if !utils::is_trusted_redirect(&login_url, &resp.url) {
            tracing::warn!(
                "Login redirect left the modem's network ({} -> {}), treating as failure",
                login_url,
                resp.url
            );
            return Ok(AuthOutcome::rejected());
        }
        if !resp.url.as_str().contains(self.config.success_redirect_pattern) {
            tracing::debug!(
                "Login ended at {} (status {}), expected '{}'",
                resp.url,
                resp.status,
                self.config.success_redirect_pattern
            );
            return Ok(AuthOutcome::rejected());
        }

        let page_url = utils::join_path(base_url, self.config.authenticated_page_url)?;
        let page = session.get(&page_url).await?;
        if !page.is_success() {
            tracing::debug!("Authenticated page {} returned {}", page_url, page.status);
            return Ok(AuthOutcome::rejected());
        }
        Ok(AuthOutcome::accepted(Some(page.body)))
    }
}
