//! Errors surfaced to callers of `discover` and `poll`

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModemError {
    /// Transport failure: DNS, refused connection, TLS handshake, timeout
    #[error("cannot reach modem at {host}: {message}")]
    Connection { host: String, message: String },

    /// A matched parser's login was rejected
    #[error("modem '{parser}' rejected the supplied credentials")]
    Authentication { parser: String },

    /// Every tier was exhausted without a match
    #[error("no parser matched the modem ({} tried{})", .attempted.len(), title_suffix(.page_title))]
    ParserNotFound {
        attempted: Vec<String>,
        page_title: Option<String>,
    },

    /// The search budget ran out before a match
    #[error("detection aborted after {attempts} attempts in {:.1}s", .elapsed.as_secs_f64())]
    CircuitBreaker { attempts: u32, elapsed: Duration },
}

fn title_suffix(title: &Option<String>) -> String {
    match title {
        Some(t) => format!(", page title \"{}\"", t),
        None => String::new(),
    }
}

impl ModemError {
    pub fn connection(host: impl Into<String>, err: impl std::fmt::Display) -> Self {
        Self::Connection {
            host: host.into(),
            message: err.to_string(),
        }
    }

    /// Ordered, human-readable next steps for the user
    pub fn troubleshooting_steps(&self) -> Vec<String> {
        match self {
            Self::Connection { host, .. } => vec![
                format!("Check that {} is the modem's LAN address (often 192.168.100.1)", host),
                "Confirm the machine running the monitor can ping the modem".to_string(),
                "Try the other scheme (http:// or https://) explicitly".to_string(),
                "Wait a few minutes if the modem is rebooting or re-ranging".to_string(),
            ],
            Self::Authentication { parser } => vec![
                format!("Verify the username and password by logging into the {} web page in a browser", parser),
                "Many modems use 'admin' as the username and the serial number or 'password' as the default password".to_string(),
                "Log out of any open browser session; some modems allow only one session".to_string(),
                "Wait five minutes; repeated failures can lock the login page temporarily".to_string(),
                "Power-cycle the modem to clear stale sessions, then retry".to_string(),
            ],
            Self::ParserNotFound { attempted, page_title } => {
                let mut steps = vec![
                    "Confirm the address points at the cable modem, not a router behind it".to_string(),
                    format!("Supported parsers tried: {}", attempted.join(", ")),
                ];
                if let Some(title) = page_title {
                    steps.push(format!("The modem's home page reports itself as \"{}\"", title));
                }
                steps.push("Supply credentials if the status page requires a login".to_string());
                steps.push("Report the model and a saved copy of its status page to add support".to_string());
                steps
            }
            Self::CircuitBreaker { attempts, elapsed } => vec![
                format!(
                    "Detection stopped after {} attempts in {:.0}s; the modem may be slow or overloaded",
                    attempts,
                    elapsed.as_secs_f64()
                ),
                "Select the parser for your model explicitly to skip the search".to_string(),
                "Retry later when the modem is less busy".to_string(),
            ],
        }
    }
}
