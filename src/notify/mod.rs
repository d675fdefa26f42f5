//! Outbound email dispatch through an HTTP JSON mail API.
//!
//! One POST, bearer-token auth, success is 200/201/202. Anything else is a
//! hard `ExternalService` failure — no retries anywhere in this job.

use crate::core::config::RunConfig;
use crate::core::types::{PaxCount, RunError};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

/// Fixed body template; `{pax}` is the count or the `?` placeholder.
/// The "{pax}Pax Total" spacing is load-bearing — the recipient's tooling
/// greps for it.
pub const BODY_TEMPLATE: &str = "{pax}Pax Total\n\nManifest is attached\n\nPlease let me know if you have any questions.";

#[derive(Debug, Clone, Serialize)]
pub struct Attachment {
    pub filename: String,
    /// Base64-encoded file bytes.
    pub content: String,
    #[serde(rename = "contentType")]
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutboundMessage {
    pub to: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cc: Option<String>,
    pub subject: String,
    pub text: String,
    pub attachments: Vec<Attachment>,
}

/// Display-format date used in the subject line and attachment name.
fn display_date(date: NaiveDate) -> String {
    date.format("%m-%d-%Y").to_string()
}

pub fn subject(date: NaiveDate) -> String {
    format!("Manifest for {}", display_date(date))
}

pub fn attachment_filename(date: NaiveDate) -> String {
    format!("Manifest for {}.pdf", display_date(date))
}

pub fn render_body(pax: PaxCount) -> String {
    BODY_TEMPLATE.replace("{pax}", &pax.as_token())
}

/// Assemble the outbound message for a completed run.
pub fn build_message(
    cfg: &RunConfig,
    date: NaiveDate,
    pax: PaxCount,
    pdf: &[u8],
) -> OutboundMessage {
    OutboundMessage {
        to: cfg.mail_to.clone(),
        cc: cfg.mail_cc.clone(),
        subject: subject(date),
        text: render_body(pax),
        attachments: vec![Attachment {
            filename: attachment_filename(date),
            content: BASE64.encode(pdf),
            content_type: "application/pdf".to_string(),
        }],
    }
}

/// Map the mail API status to the run outcome. 200/201/202 are success.
fn classify_status(status: u16, body: String) -> Result<(), RunError> {
    match status {
        200 | 201 | 202 => Ok(()),
        _ => Err(RunError::ExternalService { status, body }),
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> Result<(), RunError>;
}

/// Mailer backed by an AgentMail-style HTTP endpoint.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl HttpMailer {
    pub fn new(client: reqwest::Client, cfg: &RunConfig) -> Self {
        Self {
            client,
            endpoint: cfg.mail_endpoint.clone(),
            token: cfg.mail_token.clone(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send(&self, message: &OutboundMessage) -> Result<(), RunError> {
        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .json(message)
            .send()
            .await
            .map_err(|e| RunError::ExternalService {
                status: 0,
                body: format!("request failed: {}", e),
            })?;

        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        classify_status(status, body).map(|()| {
            info!("mail accepted by {} (HTTP {})", self.endpoint, status);
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RunConfig {
        crate::core::config::CourierConfig {
            username: Some("ops".into()),
            password: Some("pw".into()),
            login_url: Some("https://dash.example.com/login".into()),
            manifest_url_template: Some("https://dash.example.com/manifest/{date}/".into()),
            mail_endpoint: Some("https://mail.example.com/send".into()),
            mail_token: Some("tok".into()),
            mail_to: Some("docs@example.com".into()),
            mail_cc: Some("ops@example.com".into()),
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 26).unwrap()
    }

    #[test]
    fn body_matches_template_byte_for_byte() {
        assert_eq!(
            render_body(PaxCount::Found(14)),
            "14Pax Total\n\nManifest is attached\n\nPlease let me know if you have any questions."
        );
    }

    #[test]
    fn placeholder_body_when_count_absent() {
        let body = render_body(PaxCount::NotFound);
        assert!(body.starts_with("?Pax Total"));
    }

    #[test]
    fn subject_and_filename_use_display_date() {
        let date = test_date();
        assert_eq!(subject(date), "Manifest for 08-26-2026");
        assert_eq!(attachment_filename(date), "Manifest for 08-26-2026.pdf");
    }

    #[test]
    fn message_serializes_to_the_wire_shape() {
        let msg = build_message(&test_config(), test_date(), PaxCount::Found(7), b"%PDF-1.4");
        let wire = serde_json::to_value(&msg).unwrap();

        assert_eq!(wire["to"], "docs@example.com");
        assert_eq!(wire["cc"], "ops@example.com");
        assert_eq!(wire["subject"], "Manifest for 08-26-2026");
        let attachment = &wire["attachments"][0];
        assert_eq!(attachment["filename"], "Manifest for 08-26-2026.pdf");
        assert_eq!(attachment["contentType"], "application/pdf");
        assert_eq!(
            attachment["content"],
            BASE64.encode(b"%PDF-1.4"),
            "attachment must be base64 of the raw PDF bytes"
        );
    }

    #[test]
    fn cc_is_omitted_from_the_wire_when_unset() {
        let mut cfg = test_config();
        cfg.mail_cc = None;
        let msg = build_message(&cfg, test_date(), PaxCount::Found(1), b"x");
        let wire = serde_json::to_value(&msg).unwrap();
        assert!(wire.get("cc").is_none());
    }

    #[test]
    fn only_2xx_accept_statuses_succeed() {
        assert!(classify_status(200, String::new()).is_ok());
        assert!(classify_status(201, String::new()).is_ok());
        assert!(classify_status(202, String::new()).is_ok());

        for status in [204, 301, 400, 401, 403, 429, 500, 503] {
            let err = classify_status(status, "boom".into()).unwrap_err();
            assert!(
                matches!(err, RunError::ExternalService { status: s, .. } if s == status),
                "status {} must be fatal",
                status
            );
        }
    }
}
