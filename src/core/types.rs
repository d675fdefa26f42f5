use chrono::NaiveDate;
use thiserror::Error;

/// Extracted PAX count for a manifest date.
///
/// Tri-state on purpose: the dashboard renders no "N total" cells at all when
/// nothing is scheduled, so a zero sum is indistinguishable from "pattern did
/// not match". Both collapse to `NotFound` rather than overloading zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaxCount {
    Found(u64),
    NotFound,
}

impl PaxCount {
    pub fn is_found(&self) -> bool {
        matches!(self, PaxCount::Found(_))
    }

    /// Token substituted into the email body: the count, or `?` when absent.
    pub fn as_token(&self) -> String {
        match self {
            PaxCount::Found(n) => n.to_string(),
            PaxCount::NotFound => "?".to_string(),
        }
    }
}

impl std::fmt::Display for PaxCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PaxCount::Found(n) => write!(f, "{} PAX", n),
            PaxCount::NotFound => write!(f, "PAX not found"),
        }
    }
}

/// Hard-failure taxonomy for a manifest run.
///
/// Soft conditions (empty manifest, missing Print button, no 2FA dialog) are
/// values, not errors — they never appear here.
#[derive(Debug, Error)]
pub enum RunError {
    /// A required DOM condition did not occur within its bound.
    #[error("timed out waiting for {what} after {waited_ms}ms")]
    Timeout { what: String, waited_ms: u64 },

    /// Browser launch / CDP / navigation failure.
    #[error("browser error: {0}")]
    Browser(String),

    /// The mail endpoint answered with a non-success status.
    #[error("mail API returned HTTP {status}: {body}")]
    ExternalService { status: u16, body: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// What a completed run produced, for the final log line.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub date: NaiveDate,
    pub pax: PaxCount,
    pub pdf_bytes: usize,
    pub pdf_path: String,
    pub recipient: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pax_token_renders_count_or_placeholder() {
        assert_eq!(PaxCount::Found(14).as_token(), "14");
        assert_eq!(PaxCount::NotFound.as_token(), "?");
    }

    #[test]
    fn timeout_error_names_the_condition() {
        let e = RunError::Timeout {
            what: "password field".to_string(),
            waited_ms: 20_000,
        };
        assert!(e.to_string().contains("password field"));
        assert!(e.to_string().contains("20000ms"));
    }
}
