//! PAX extraction: reduce the manifest's "N total" cells to one count.
//!
//! The DOM query in `session.rs` already filters by the same pattern, but the
//! texts are re-validated here so the summation is a pure, testable function
//! independent of the browser layer.

use crate::core::types::PaxCount;
use regex::Regex;
use std::sync::OnceLock;

static TOTAL_CELL: OnceLock<Regex> = OnceLock::new();

/// Whole-cell readiness marker: digits, whitespace, the literal word "total".
fn total_cell_re() -> &'static Regex {
    TOTAL_CELL.get_or_init(|| Regex::new(r"(?i)^(\d+)\s+total$").expect("valid total-cell pattern"))
}

/// `true` when a trimmed cell text is a readiness marker.
pub fn is_total_cell(text: &str) -> bool {
    total_cell_re().is_match(text.trim())
}

/// Sum the integers from every cell text fully matching `^\d+\s+total$`
/// (case-insensitive, whitespace-trimmed).
///
/// A zero sum — whether from no matches or from literal "0 total" cells — is
/// reported as `NotFound`: the dashboard renders no marker cells at all for an
/// empty date, so zero is a sentinel here, not a measurement.
pub fn sum_total_cells<'a, I>(texts: I) -> PaxCount
where
    I: IntoIterator<Item = &'a str>,
{
    let re = total_cell_re();
    let mut sum: u64 = 0;
    for text in texts {
        if let Some(caps) = re.captures(text.trim()) {
            // Saturate instead of wrapping on absurd markup; the cap is
            // unreachable for any real manifest.
            if let Ok(n) = caps[1].parse::<u64>() {
                sum = sum.saturating_add(n);
            }
        }
    }
    if sum > 0 {
        PaxCount::Found(sum)
    } else {
        PaxCount::NotFound
    }
}
