//! modemscout - find, log in to and read DOCSIS status from cable modems
//!
//! ```no_run
//! # async fn demo() -> Result<(), modemscout::ModemError> {
//! use modemscout::{Credentials, DiscoveryEngine, ParserRegistry};
//!
//! let engine = DiscoveryEngine::new(ParserRegistry::builtin());
//! let mut modem = engine
//!     .discover("192.168.100.1", Some(Credentials::new("admin", "password")), None)
//!     .await?;
//! let status = modem.parse();
//! println!("{} downstream channels", status.downstream.len());
//! let status = engine.poll(&mut modem).await?;
//! # let _ = status;
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod circuit_breaker;
pub mod config;
pub mod discovery;
pub mod error;
pub mod heuristics;
pub mod hnap;
pub mod http;
pub mod models;
pub mod modems;
pub mod parser;
pub mod registry;
pub mod utils;

pub use auth::{AuthConfig, AuthKind, AuthOutcome, AuthStrategy};
pub use circuit_breaker::CircuitBreaker;
pub use config::Config;
pub use discovery::{DetectionResult, DiscoveryEngine, Tier};
pub use error::ModemError;
pub use http::{HttpSettings, ModemSession};
pub use models::{Channel, Credentials, Page, ParseResult};
pub use registry::{Capability, ModemParser, ParserDescriptor, ParserRegistry, UrlPattern};
