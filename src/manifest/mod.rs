//! Manifest run orchestration.
//!
//! The sequencing, soft/hard failure policy, and resource discipline live
//! here, behind the `ManifestDriver` seam — the browser specifics stay in
//! `browser::session` so this pipeline is testable without Chromium.

pub mod extract;

use crate::core::config::RunConfig;
use crate::core::types::{PaxCount, RunError, RunSummary};
use crate::notify::{self, Mailer};
use async_trait::async_trait;
use chrono::NaiveDate;
use std::path::Path;
use tracing::{info, warn};

/// Diagnostic artifact written on any hard failure.
pub const ERROR_SCREENSHOT_FILE: &str = "manifest_error.png";

/// Capability seam over the authenticated browser session.
///
/// One method per pipeline step; soft conditions are values (`bool`, empty
/// `Vec`), hard failures are `RunError`.
#[async_trait]
pub trait ManifestDriver: Send {
    /// Authenticate against the dashboard login form, dismissing the optional
    /// 2FA dialog when it appears.
    async fn login(&mut self) -> Result<(), RunError>;

    /// Navigate to the manifest page for `date`.
    async fn open_manifest(&mut self, date: NaiveDate) -> Result<(), RunError>;

    /// Poll (bounded) until at least one "N total" marker renders.
    /// `Ok(false)` means the bound elapsed with no markers — a valid empty
    /// manifest, not an error.
    async fn wait_for_totals(&mut self) -> Result<bool, RunError>;

    /// Final DOM pass: trimmed texts of every cell matching the marker
    /// pattern.
    async fn collect_total_cells(&mut self) -> Result<Vec<String>, RunError>;

    /// Click the in-page "Print" control. `Ok(false)` when the control is
    /// absent — capture proceeds with the current layout.
    async fn apply_print_layout(&mut self) -> Result<bool, RunError>;

    /// Rasterize the current page state to paginated PDF bytes.
    async fn capture_pdf(&mut self) -> Result<Vec<u8>, RunError>;

    /// Best-effort diagnostic screenshot of the current page state.
    async fn save_screenshot(&mut self, path: &Path) -> Result<(), RunError>;

    /// Release the browser session. Called exactly once per run, on every
    /// exit path.
    async fn close(&mut self);
}

/// Execute the full manifest run for `date`.
///
/// Guarantees, success or failure:
/// * the driver is closed exactly once;
/// * on a hard failure a diagnostic screenshot is attempted first, and a
///   failure of the screenshot itself is swallowed so it cannot mask the
///   original error.
pub async fn run<D, M>(
    driver: &mut D,
    mailer: &M,
    cfg: &RunConfig,
    date: NaiveDate,
) -> Result<RunSummary, RunError>
where
    D: ManifestDriver,
    M: Mailer + Sync,
{
    let result = drive(driver, mailer, cfg, date).await;

    if result.is_err() {
        if let Err(e) = driver.save_screenshot(Path::new(ERROR_SCREENSHOT_FILE)).await {
            warn!("diagnostic screenshot failed (ignored): {}", e);
        } else {
            info!("diagnostic screenshot saved to {}", ERROR_SCREENSHOT_FILE);
        }
    }

    driver.close().await;
    result
}

async fn drive<D, M>(
    driver: &mut D,
    mailer: &M,
    cfg: &RunConfig,
    date: NaiveDate,
) -> Result<RunSummary, RunError>
where
    D: ManifestDriver,
    M: Mailer + Sync,
{
    info!("Step 1: logging in");
    driver.login().await?;

    info!("Step 2: loading manifest for {}", date);
    driver.open_manifest(date).await?;
    let ready = driver.wait_for_totals().await?;
    if !ready {
        info!("no total markers within the poll bound — treating as an empty manifest");
    }

    info!("Step 3: extracting PAX count");
    // Must happen before the print-layout click: the layout switch can remove
    // or relocate the measured cells.
    let cells = driver.collect_total_cells().await?;
    let pax = extract::sum_total_cells(cells.iter().map(String::as_str));
    match pax {
        PaxCount::Found(n) => info!("PAX: {}", n),
        PaxCount::NotFound => warn!("PAX not found — emailing with a placeholder count"),
    }

    info!("Step 4: applying print layout");
    if driver.apply_print_layout().await? {
        info!("print layout applied");
    } else {
        info!("Print button not found — proceeding with default layout");
    }

    info!("Step 5: capturing PDF");
    let pdf = driver.capture_pdf().await?;
    let pdf_path = notify::attachment_filename(date);
    tokio::fs::write(&pdf_path, &pdf).await?;
    info!("saved {} ({} bytes)", pdf_path, pdf.len());

    info!("Step 6: sending email to {}", cfg.mail_to);
    let message = notify::build_message(cfg, date, pax, &pdf);
    mailer.send(&message).await?;

    Ok(RunSummary {
        date,
        pax,
        pdf_bytes: pdf.len(),
        pdf_path,
        recipient: cfg.mail_to.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::OutboundMessage;
    use std::sync::Mutex;

    #[derive(Clone, Copy, PartialEq, Eq, Debug)]
    enum Step {
        Login,
        OpenManifest,
        WaitForTotals,
        CollectCells,
        PrintLayout,
        CapturePdf,
    }

    struct FakeDriver {
        fail_at: Option<Step>,
        cells: Vec<String>,
        ready: bool,
        screenshot_fails: bool,
        close_calls: u32,
        screenshot_calls: u32,
    }

    impl FakeDriver {
        fn happy() -> Self {
            Self {
                fail_at: None,
                cells: vec!["5 total".into(), "9 total".into()],
                ready: true,
                screenshot_fails: false,
                close_calls: 0,
                screenshot_calls: 0,
            }
        }

        fn failing_at(step: Step) -> Self {
            Self {
                fail_at: Some(step),
                ..Self::happy()
            }
        }

        fn fail(&self, step: Step) -> Result<(), RunError> {
            if self.fail_at == Some(step) {
                Err(RunError::Browser(format!("injected failure at {:?}", step)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl ManifestDriver for FakeDriver {
        async fn login(&mut self) -> Result<(), RunError> {
            self.fail(Step::Login)
        }

        async fn open_manifest(&mut self, _date: NaiveDate) -> Result<(), RunError> {
            self.fail(Step::OpenManifest)
        }

        async fn wait_for_totals(&mut self) -> Result<bool, RunError> {
            self.fail(Step::WaitForTotals)?;
            Ok(self.ready)
        }

        async fn collect_total_cells(&mut self) -> Result<Vec<String>, RunError> {
            self.fail(Step::CollectCells)?;
            Ok(self.cells.clone())
        }

        async fn apply_print_layout(&mut self) -> Result<bool, RunError> {
            self.fail(Step::PrintLayout)?;
            Ok(true)
        }

        async fn capture_pdf(&mut self) -> Result<Vec<u8>, RunError> {
            self.fail(Step::CapturePdf)?;
            Ok(b"%PDF-1.4 fake".to_vec())
        }

        async fn save_screenshot(&mut self, _path: &Path) -> Result<(), RunError> {
            self.screenshot_calls += 1;
            if self.screenshot_fails {
                Err(RunError::Browser("screenshot capture failed".into()))
            } else {
                Ok(())
            }
        }

        async fn close(&mut self) {
            self.close_calls += 1;
        }
    }

    struct FakeMailer {
        fail_status: Option<u16>,
        sent: Mutex<Vec<OutboundMessage>>,
    }

    impl FakeMailer {
        fn ok() -> Self {
            Self {
                fail_status: None,
                sent: Mutex::new(Vec::new()),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                fail_status: Some(status),
                ..Self::ok()
            }
        }
    }

    #[async_trait]
    impl Mailer for FakeMailer {
        async fn send(&self, message: &OutboundMessage) -> Result<(), RunError> {
            self.sent.lock().unwrap().push(message.clone());
            match self.fail_status {
                Some(status) => Err(RunError::ExternalService {
                    status,
                    body: "injected".into(),
                }),
                None => Ok(()),
            }
        }
    }

    fn test_config() -> RunConfig {
        crate::core::config::CourierConfig {
            username: Some("ops".into()),
            password: Some("pw".into()),
            login_url: Some("https://dash.example.com/login".into()),
            manifest_url_template: Some("https://dash.example.com/manifest/{date}/".into()),
            mail_endpoint: Some("https://mail.example.com/send".into()),
            mail_token: Some("tok".into()),
            mail_to: Some("ops@example.com".into()),
            mail_cc: Some("cc@example.com".into()),
            ..Default::default()
        }
        .resolve()
        .unwrap()
    }

    fn test_date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 8, 26).unwrap()
    }

    #[tokio::test]
    async fn happy_path_sums_cells_and_sends_once() {
        let mut driver = FakeDriver::happy();
        let mailer = FakeMailer::ok();
        let summary = run(&mut driver, &mailer, &test_config(), test_date())
            .await
            .unwrap();

        assert_eq!(summary.pax, PaxCount::Found(14));
        assert_eq!(driver.close_calls, 1);
        assert_eq!(driver.screenshot_calls, 0);

        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.contains("14Pax Total"));
        std::fs::remove_file(&summary.pdf_path).ok();
    }

    #[tokio::test]
    async fn empty_manifest_still_sends_with_placeholder() {
        let mut driver = FakeDriver::happy();
        driver.ready = false;
        driver.cells = Vec::new();
        let mailer = FakeMailer::ok();
        let summary = run(&mut driver, &mailer, &test_config(), test_date())
            .await
            .unwrap();

        assert_eq!(summary.pax, PaxCount::NotFound);
        let sent = mailer.sent.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert!(sent[0].text.starts_with("?Pax Total"));
        std::fs::remove_file(&summary.pdf_path).ok();
    }

    #[tokio::test]
    async fn close_runs_exactly_once_on_every_failure_step() {
        for step in [
            Step::Login,
            Step::OpenManifest,
            Step::WaitForTotals,
            Step::CollectCells,
            Step::PrintLayout,
            Step::CapturePdf,
        ] {
            let mut driver = FakeDriver::failing_at(step);
            let mailer = FakeMailer::ok();
            let result = run(&mut driver, &mailer, &test_config(), test_date()).await;

            assert!(result.is_err(), "expected failure at {:?}", step);
            assert_eq!(driver.close_calls, 1, "close count wrong at {:?}", step);
            assert_eq!(
                driver.screenshot_calls, 1,
                "screenshot count wrong at {:?}",
                step
            );
        }
    }

    #[tokio::test]
    async fn screenshot_failure_does_not_mask_the_original_error() {
        let mut driver = FakeDriver::failing_at(Step::CapturePdf);
        driver.screenshot_fails = true;
        let mailer = FakeMailer::ok();
        let err = run(&mut driver, &mailer, &test_config(), test_date())
            .await
            .unwrap_err();

        assert!(err.to_string().contains("CapturePdf"), "got: {}", err);
        assert_eq!(driver.close_calls, 1);
    }

    #[tokio::test]
    async fn mail_rejection_is_fatal_and_not_retried() {
        let mut driver = FakeDriver::happy();
        let mailer = FakeMailer::failing(500);
        let err = run(&mut driver, &mailer, &test_config(), test_date())
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RunError::ExternalService { status: 500, .. }
        ));
        assert_eq!(mailer.sent.lock().unwrap().len(), 1, "no retry expected");
        assert_eq!(driver.close_calls, 1);
        std::fs::remove_file(notify::attachment_filename(test_date())).ok();
    }
}
