//! `DashboardSession` — the real `ManifestDriver` over a headless Chromium
//! session.
//!
//! Everything the dashboard's markup dictates (selectors, button labels, the
//! "N total" marker pattern) is concentrated in the JS constants here; the
//! pipeline in `manifest` never sees a selector.

use crate::browser::{self, stealth};
use crate::core::config::RunConfig;
use crate::core::types::RunError;
use crate::manifest::ManifestDriver;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, CaptureScreenshotFormat, PrintToPdfParams,
};
use chromiumoxide::page::ScreenshotParams;
use chromiumoxide::{Browser, Page};
use chrono::NaiveDate;
use futures::StreamExt;
use std::path::Path;
use std::time::Duration;
use tracing::{error, info, warn};

/// Whole-cell readiness check over the table headers the dashboard renders
/// its per-availability totals into.
const READY_MARKERS_JS: &str = r#"
Array.from(document.querySelectorAll('th'))
    .some(el => /^\d+\s+total$/i.test((el.innerText || '').trim()))
"#;

/// Final extraction pass: trimmed texts of every matching header cell.
const TOTAL_CELLS_JS: &str = r#"
Array.from(document.querySelectorAll('th'))
    .map(el => (el.innerText || '').trim())
    .filter(t => /^\d+\s+total$/i.test(t))
"#;

/// Click the print-layout control in-page; reports whether it existed.
const PRINT_CLICK_JS: &str = r#"
(() => {
    const btn = Array.from(document.querySelectorAll('button'))
        .find(b => (b.textContent || '').trim() === 'Print');
    if (btn) { btn.click(); return true; }
    return false;
})()
"#;

/// Dismiss the optional 2FA prompt by clicking its cancel button.
const TWOFA_CANCEL_JS: &str = r#"
(() => {
    const btn = Array.from(document.querySelectorAll('button'))
        .find(b => (b.textContent || '').trim().toLowerCase().includes('cancel'));
    if (btn) { btn.click(); return true; }
    return false;
})()
"#;

const PASSWORD_PRESENT_JS: &str = "document.querySelector(\"input[type='password']\") !== null";

/// Post-login proof: the SPA has routed away from the login URL.
const LEFT_LOGIN_JS: &str = "!location.href.toLowerCase().includes('login')";

pub struct DashboardSession {
    browser: Browser,
    page: Page,
    handler_task: tokio::task::JoinHandle<()>,
    cfg: RunConfig,
}

impl DashboardSession {
    /// Launch a headless session with the fingerprint scrub installed before
    /// any navigation.
    pub async fn launch(cfg: RunConfig) -> Result<Self, RunError> {
        let exe = browser::find_chrome_executable().ok_or_else(|| {
            RunError::Browser(
                "no Chromium-family browser found; install Chrome or Chromium, \
                 or set CHROME_EXECUTABLE"
                    .to_string(),
            )
        })?;

        info!("launching headless browser: {}", exe);
        let config = browser::build_headless_config(&exe, 1400, 900)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| RunError::Browser(format!("launch failed ({}): {}", exe, e)))?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    error!("CDP handler error: {}", e);
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .map_err(|e| RunError::Browser(format!("failed to open page: {}", e)))?;

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(
            stealth::fingerprint_scrub_script().to_string(),
        ))
        .await
        .map_err(|e| RunError::Browser(format!("failed to install fingerprint scrub: {}", e)))?;

        Ok(Self {
            browser,
            page,
            handler_task,
            cfg,
        })
    }

    async fn goto(&self, url: &str) -> Result<(), RunError> {
        self.page
            .goto(url)
            .await
            .map_err(|e| RunError::Browser(format!("navigation to {} failed: {}", url, e)))?;
        Ok(())
    }

    async fn type_into(&self, selector: &str, text: &str) -> Result<(), RunError> {
        let element = self
            .page
            .find_element(selector)
            .await
            .map_err(|e| RunError::Browser(format!("element `{}` not found: {}", selector, e)))?;
        element
            .click()
            .await
            .map_err(|e| RunError::Browser(format!("click on `{}` failed: {}", selector, e)))?;
        element
            .type_str(text)
            .await
            .map_err(|e| RunError::Browser(format!("typing into `{}` failed: {}", selector, e)))?;
        Ok(())
    }

    /// Fill the identifier field: the form names it `email`, but fall back to
    /// the first text input when the markup shifts.
    async fn fill_username(&self) -> Result<(), RunError> {
        if self.type_into("input[name='email']", &self.cfg.username).await.is_ok() {
            return Ok(());
        }
        self.type_into("input[type='text']", &self.cfg.username).await
    }
}

#[async_trait]
impl ManifestDriver for DashboardSession {
    async fn login(&mut self) -> Result<(), RunError> {
        self.goto(&self.cfg.login_url).await?;

        // The login form renders asynchronously; wait for the password field
        // to exist rather than sleeping blind.
        let bound = Duration::from_secs(self.cfg.login_timeout_secs);
        let form_ready =
            browser::wait_for_js(&self.page, PASSWORD_PRESENT_JS, "password field", bound).await?;
        if !form_ready {
            return Err(RunError::Timeout {
                what: "login password field".to_string(),
                waited_ms: bound.as_millis() as u64,
            });
        }

        self.fill_username().await?;
        self.type_into("input[type='password']", &self.cfg.password).await?;

        let submit = self
            .page
            .find_element("button[type='submit']")
            .await
            .map_err(|e| RunError::Browser(format!("submit button not found: {}", e)))?;
        submit
            .click()
            .await
            .map_err(|e| RunError::Browser(format!("submit click failed: {}", e)))?;

        // Proof of success is the redirect away from the login URL.
        let nav_bound = Duration::from_secs(self.cfg.nav_timeout_secs);
        let left_login =
            browser::wait_for_js(&self.page, LEFT_LOGIN_JS, "post-login redirect", nav_bound)
                .await?;
        if !left_login {
            return Err(RunError::Timeout {
                what: "post-login redirect".to_string(),
                waited_ms: nav_bound.as_millis() as u64,
            });
        }

        // Optional 2FA prompt; absence is the common case, not an error.
        let twofa_bound = Duration::from_secs(self.cfg.twofa_timeout_secs);
        let dismissed = browser::poll_until(
            "2FA cancel button",
            twofa_bound,
            browser::POLL_INTERVAL,
            || browser::eval_bool(&self.page, TWOFA_CANCEL_JS),
        )
        .await?;
        if dismissed {
            info!("dismissed 2FA prompt");
        }

        info!("logged in");
        Ok(())
    }

    async fn open_manifest(&mut self, date: NaiveDate) -> Result<(), RunError> {
        let url = self.cfg.manifest_url_for(date);
        self.goto(&url).await
    }

    async fn wait_for_totals(&mut self) -> Result<bool, RunError> {
        let bound = Duration::from_secs(self.cfg.ready_timeout_secs);
        browser::wait_for_js(&self.page, READY_MARKERS_JS, "total markers", bound).await
    }

    async fn collect_total_cells(&mut self) -> Result<Vec<String>, RunError> {
        browser::eval_string_vec(&self.page, TOTAL_CELLS_JS).await
    }

    async fn apply_print_layout(&mut self) -> Result<bool, RunError> {
        browser::eval_bool(&self.page, PRINT_CLICK_JS).await
    }

    async fn capture_pdf(&mut self) -> Result<Vec<u8>, RunError> {
        // US Letter, 0.4in margins, backgrounds on, no header/footer chrome.
        let params = PrintToPdfParams::builder()
            .print_background(true)
            .paper_width(8.5)
            .paper_height(11.0)
            .margin_top(0.4)
            .margin_bottom(0.4)
            .margin_left(0.4)
            .margin_right(0.4)
            .display_header_footer(false)
            .build();

        let response = self
            .page
            .execute(params)
            .await
            .map_err(|e| RunError::Browser(format!("printToPDF failed: {}", e)))?;

        let data: &str = response.data.as_ref();
        BASE64
            .decode(data.as_bytes())
            .map_err(|e| RunError::Browser(format!("PDF payload decode failed: {}", e)))
    }

    async fn save_screenshot(&mut self, path: &Path) -> Result<(), RunError> {
        let bytes = self
            .page
            .screenshot(
                ScreenshotParams::builder()
                    .format(CaptureScreenshotFormat::Png)
                    .full_page(true)
                    .build(),
            )
            .await
            .map_err(|e| RunError::Browser(format!("screenshot capture failed: {}", e)))?;
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn close(&mut self) {
        if let Err(e) = self.browser.close().await {
            warn!("browser close error (non-fatal): {}", e);
        }
        self.handler_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::extract;

    // The in-page filter and the Rust-side extractor must agree on the marker
    // pattern; these pin the JS literal to the same shape `extract` validates.
    #[test]
    fn js_filters_use_the_whole_cell_marker_pattern() {
        for js in [READY_MARKERS_JS, TOTAL_CELLS_JS] {
            assert!(js.contains(r"/^\d+\s+total$/i"), "pattern drifted in: {}", js);
            assert!(js.contains("querySelectorAll('th')"));
        }
        assert!(extract::is_total_cell("5 total"));
    }

    #[test]
    fn print_click_matches_exact_label_only() {
        assert!(PRINT_CLICK_JS.contains("=== 'Print'"));
    }
}
