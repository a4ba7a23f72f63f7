//! Domain entities mirrored from the remote service

mod agent;
mod call;
mod connection;
mod contact;
mod department;
mod message;

pub use agent::*;
pub use call::*;
pub use connection::*;
pub use contact::*;
pub use department::*;
pub use message::*;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};

const WIRE_TIMESTAMP: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a remote timestamp.
///
/// The API emits either RFC 3339 or a naive `YYYY-MM-DD HH:MM:SS` in the
/// server's wall-clock time, which is read as local time.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = NaiveDateTime::parse_from_str(raw, WIRE_TIMESTAMP)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// Format a timestamp the way the API expects it in query parameters.
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.with_timezone(&Local).format(WIRE_TIMESTAMP).to_string()
}
