//! Built-in modem parsers
//!
//! Adding a modem means writing a `ModemParser` and listing it in `all()`.

pub mod arris;
pub mod hnap_status;
pub mod motorola;
pub mod netgear;
pub mod technicolor;
pub mod ubee;

use crate::models::{Channel, Page, ParseResult};
use crate::parser::Table;
use crate::registry::ModemParser;
use std::sync::Arc;

/// Every built-in parser, unordered; `ParserRegistry` sorts them
pub fn all() -> Vec<Arc<dyn ModemParser>> {
    vec![
        Arc::new(arris::Sb6141),
        Arc::new(arris::Sb8200),
        Arc::new(arris::S33),
        Arc::new(motorola::Mb7621),
        Arc::new(motorola::MB8611),
        Arc::new(netgear::Cm600),
        Arc::new(technicolor::Xb7),
        Arc::new(ubee::Dvw32cb),
    ]
}

/// Body of the fetched page for `path`
pub(crate) fn page<'a>(pages: &'a [Page], path: &str) -> Option<&'a str> {
    pages
        .iter()
        .find(|p| p.path == path)
        .map(|p| p.body.as_str())
}

/// Copy `label | value` rows found in any table into `system_info`
pub(crate) fn info_from_tables(tables: &[Table], result: &mut ParseResult, fields: &[(&str, &str)]) {
    for (label, key) in fields {
        if let Some(value) = tables.iter().find_map(|t| t.value_of(label)) {
            result.set_info(key, value);
        }
    }
}

pub(crate) fn skip_row(direction: &str, index: usize, row: &dyn std::fmt::Debug) {
    tracing::warn!("Skipping malformed {} row {}: {:?}", direction, index, row);
}

/// Attach codeword counters to downstream channels by channel id
pub(crate) fn attach_errors(channels: &mut [Channel], channel_id: u32, corrected: Option<u64>, uncorrected: Option<u64>) {
    if let Some(ch) = channels.iter_mut().find(|c| c.channel_id == channel_id) {
        ch.corrected_errors = corrected;
        ch.uncorrected_errors = uncorrected;
    }
}
