/// Utility functions for formatting packets in log output
use time::{format_description, OffsetDateTime};

use crate::models::LoopPacket;

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format.
/// Falls back to the default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]")
        .ok()
        .and_then(|format| dt.format(&format).ok())
        .unwrap_or_else(|| dt.to_string())
}

/// One-line summary of a packet: timestamp followed by `field=value` pairs
pub fn format_packet(packet: &LoopPacket) -> String {
    let fields = packet
        .fields
        .iter()
        .map(|(field, value)| format!("{}={}", field, value))
        .collect::<Vec<_>>()
        .join(" ");
    format!("{} {}", format_datetime(&packet.date_time), fields)
}
