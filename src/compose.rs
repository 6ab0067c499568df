//! Pure notification-body composition.
//!
//! No I/O happens here; given the same snapshots and report date the
//! output is byte-identical, which keeps these functions unit-testable by
//! literal comparison.

use crate::core::AnalysisSnapshot;
use chrono::NaiveDate;
use std::fmt::Write;

/// At most this many symbols are itemized in the daily digest.
const DIGEST_SYMBOL_CAP: usize = 5;

/// Fallback greeting name when a recipient has none.
const GENERIC_RECIPIENT: &str = "there";

/// Renders the daily digest body.
///
/// Itemizes the first [`DIGEST_SYMBOL_CAP`] snapshots in input order, then
/// appends aggregate totals over the whole list. Zero-change symbols count
/// in neither the up nor the down bucket.
pub fn compose_daily_digest(analysis: &[AnalysisSnapshot], report_date: NaiveDate) -> String {
    let mut body = format!("Daily Market Digest for {}\n\n", report_date);

    if analysis.is_empty() {
        body.push_str("No analysis data is available today.\n");
        return body;
    }

    for snapshot in analysis.iter().take(DIGEST_SYMBOL_CAP) {
        let _ = writeln!(
            body,
            "{}: ${:.2} ({:+.2}%) trend={} signal={}",
            snapshot.symbol,
            snapshot.current_price,
            snapshot.change_percent,
            snapshot.trend,
            snapshot.signal,
        );
    }

    let up = analysis.iter().filter(|s| s.change_percent > 0.0).count();
    let down = analysis.iter().filter(|s| s.change_percent < 0.0).count();
    let _ = write!(
        body,
        "\nTotals: {} symbols tracked, {} up, {} down\n",
        analysis.len(),
        up,
        down
    );
    body
}

/// Renders the anomaly alert body, or `None` when nothing qualifies.
///
/// Only snapshots with a non-empty anomaly list appear, in input order,
/// each with its current price and every anomaly message.
pub fn compose_alert_digest(analysis: &[AnalysisSnapshot]) -> Option<String> {
    let flagged: Vec<&AnalysisSnapshot> =
        analysis.iter().filter(|s| !s.anomalies.is_empty()).collect();
    if flagged.is_empty() {
        return None;
    }

    let mut body = String::from("Market Anomaly Alert\n\n");
    for snapshot in flagged {
        let _ = writeln!(body, "{} at ${:.2}:", snapshot.symbol, snapshot.current_price);
        for anomaly in &snapshot.anomalies {
            let _ = writeln!(body, "  - {}", anomaly.message);
        }
    }
    Some(body)
}

/// Prepends a personal greeting to a composed body.
pub fn personalize(body: &str, recipient_name: &str) -> String {
    let name = if recipient_name.trim().is_empty() {
        GENERIC_RECIPIENT
    } else {
        recipient_name.trim()
    };
    format!("Hello {},\n\n{}", name, body)
}
