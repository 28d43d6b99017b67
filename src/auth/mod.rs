//! Authentication strategies
//!
//! Each modem family logs in differently. A parser descriptor declares one
//! `AuthConfig` variant and `strategy_for` turns that variant into the one
//! `AuthStrategy` able to run it, so a descriptor can never be paired with
//! the wrong login flow.
//!
//! Strategies report rejected credentials as `AuthOutcome { success: false }`.
//! Only transport failures come back as `Err`.

pub mod basic;
pub mod form;
pub mod hnap;

pub use basic::{BasicLogin, NoLogin};
pub use form::{FormLogin, RedirectFormLogin};
pub use hnap::HnapLogin;

use crate::http::ModemSession;
use crate::models::Credentials;
use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use url::Url;

/// How the password is put on the wire for form logins
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordEncoding {
    Plain,
    Base64,
    /// Plain first, then base64; firmware revisions disagree on which one they accept
    PlainThenBase64,
}

/// HTML form POST; success is judged from the response body
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormAuth {
    pub login_url: &'static str,
    pub username_field: &'static str,
    pub password_field: &'static str,
    /// Text only present once logged in. `None` falls back to a body-size check.
    pub success_indicator: Option<&'static str>,
    pub encoding: PasswordEncoding,
}

/// HTML form POST whose success is proven by where the redirects land
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedirectFormAuth {
    pub login_url: &'static str,
    pub username_field: &'static str,
    pub password_field: &'static str,
    pub success_redirect_pattern: &'static str,
    pub authenticated_page_url: &'static str,
}

/// HNAP (SOAP over HTTP) session login
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HnapAuth {
    /// Page fetched first to pick up initial cookies
    pub login_url: &'static str,
    pub hnap_endpoint: &'static str,
    pub session_timeout_indicator: &'static str,
    pub soap_namespace: &'static str,
    /// Two-step HMAC challenge login instead of a single plain `Login`
    pub challenge_response: bool,
}

/// The login scheme a parser declares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthConfig {
    None,
    Basic,
    Form(FormAuth),
    RedirectForm(RedirectFormAuth),
    Hnap(HnapAuth),
}

/// Strategy names, one per concrete login flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthKind {
    NoAuth,
    BasicHttp,
    FormPlain,
    FormBase64,
    FormPlainAndBase64,
    RedirectForm,
    HnapSession,
}

impl AuthKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoAuth => "none",
            Self::BasicHttp => "basic",
            Self::FormPlain => "form_plain",
            Self::FormBase64 => "form_base64",
            Self::FormPlainAndBase64 => "form_plain_and_base64",
            Self::RedirectForm => "redirect_form",
            Self::HnapSession => "hnap",
        }
    }
}

impl fmt::Display for AuthKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AuthConfig {
    pub fn kind(&self) -> AuthKind {
        match self {
            Self::None => AuthKind::NoAuth,
            Self::Basic => AuthKind::BasicHttp,
            Self::Form(form) => match form.encoding {
                PasswordEncoding::Plain => AuthKind::FormPlain,
                PasswordEncoding::Base64 => AuthKind::FormBase64,
                PasswordEncoding::PlainThenBase64 => AuthKind::FormPlainAndBase64,
            },
            Self::RedirectForm(_) => AuthKind::RedirectForm,
            Self::Hnap(_) => AuthKind::HnapSession,
        }
    }

    pub fn needs_credentials(&self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Result of one login attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub success: bool,
    /// Page body the login produced, when the strategy fetched one
    pub body: Option<String>,
}

impl AuthOutcome {
    pub fn accepted(body: Option<String>) -> Self {
        Self {
            success: true,
            body,
        }
    }

    pub fn rejected() -> Self {
        Self {
            success: false,
            body: None,
        }
    }
}

/// A login flow for one authentication scheme
#[async_trait]
pub trait AuthStrategy: Send + Sync {
    fn kind(&self) -> AuthKind;

    /// Log in, leaving any cookies, headers or credentials on `session`
    async fn login(
        &self,
        session: &mut ModemSession,
        base_url: &Url,
        credentials: Option<&Credentials>,
    ) -> Result<AuthOutcome>;
}

/// The strategy implementing a declared `AuthConfig`
pub fn strategy_for(config: &AuthConfig) -> Box<dyn AuthStrategy> {
    match *config {
        AuthConfig::None => Box::new(NoLogin),
        AuthConfig::Basic => Box::new(BasicLogin),
        AuthConfig::Form(form) => Box::new(FormLogin::new(form)),
        AuthConfig::RedirectForm(redirect) => Box::new(RedirectFormLogin::new(redirect)),
        AuthConfig::Hnap(hnap) => Box::new(HnapLogin::new(hnap)),
    }
}

/// Credentials with both fields filled, or `None`
pub(crate) fn complete(credentials: Option<&Credentials>) -> Option<&Credentials> {
    credentials.filter(|c| c.is_complete())
}
