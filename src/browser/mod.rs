//! Native browser management using `chromiumoxide`.
//!
//! Single source of truth for:
//! * Finding a usable Chromium-family executable (cross-platform).
//! * Building the headless `BrowserConfig` with stealth defaults — the
//!   dashboard's frontend refuses to hydrate under an obvious automation
//!   fingerprint.
//! * Bounded DOM polling (`poll_until` / `wait_for_js`) — every wait in this
//!   crate has an explicit upper bound; none are indefinite.
//!
//! JS-level fingerprint scrubbing is injected per-page (see `stealth.rs` and
//! `session.rs`).

pub mod session;
pub mod stealth;

use crate::core::types::RunError;
use anyhow::{anyhow, Result};
use chromiumoxide::browser::BrowserConfig;
use chromiumoxide::handler::viewport::Viewport;
use chromiumoxide::Page;
use rand::seq::IndexedRandom;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// How often bounded DOM polls re-evaluate their predicate.
pub const POLL_INTERVAL: Duration = Duration::from_millis(500);

const DESKTOP_USER_AGENTS: &[&str] = &[
    // Chrome 132 – Windows
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 132 – macOS
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/132.0.0.0 Safari/537.36",
    // Chrome 131 – Linux
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36",
];

/// Returns a randomly-chosen realistic desktop User-Agent string.
pub fn random_user_agent() -> &'static str {
    let mut rng = rand::rng();
    DESKTOP_USER_AGENTS
        .choose(&mut rng)
        .copied()
        .unwrap_or(DESKTOP_USER_AGENTS[0])
}

/// Find a usable Chromium-family browser executable.
///
/// Resolution order:
/// 1. `CHROME_EXECUTABLE` env var (explicit override)
/// 2. PATH scan — finds package-manager installs on all platforms.
/// 3. OS-specific well-known install paths.
pub fn find_chrome_executable() -> Option<String> {
    if let Some(p) = crate::core::config::chrome_executable_override() {
        return Some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        let candidates = ["google-chrome", "chromium", "chromium-browser", "chrome", "brave-browser"];
        for dir in std::env::split_paths(&path_var) {
            for exe in candidates {
                let full = dir.join(exe);
                if full.exists() {
                    return Some(full.to_string_lossy().to_string());
                }
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        let candidates = [
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
            "/Applications/Chromium.app/Contents/MacOS/Chromium",
            "/Applications/Brave Browser.app/Contents/MacOS/Brave Browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "linux")]
    {
        let candidates = [
            "/usr/bin/google-chrome",
            "/usr/bin/chromium",
            "/usr/bin/chromium-browser",
            "/usr/local/bin/chromium",
            "/usr/bin/brave-browser",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        let candidates = [
            r"C:\Program Files\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files (x86)\Google\Chrome\Application\chrome.exe",
            r"C:\Program Files\BraveSoftware\Brave-Browser\Application\brave.exe",
        ];
        for c in candidates {
            if Path::new(c).exists() {
                return Some(c.to_string());
            }
        }
    }

    None
}

/// Build a `BrowserConfig` for headless operation with stealth defaults.
///
/// Flags chosen for:
/// * Compatibility with CI / restricted environments (`--no-sandbox`,
///   `--disable-dev-shm-usage`).
/// * Stealth — `--disable-blink-features=AutomationControlled` hides the
///   `navigator.webdriver` flag; UA is drawn from `DESKTOP_USER_AGENTS`.
pub fn build_headless_config(exe: &str, width: u32, height: u32) -> Result<BrowserConfig> {
    let ua = random_user_agent();

    BrowserConfig::builder()
        .chrome_executable(exe)
        .viewport(Viewport {
            width,
            height,
            device_scale_factor: Some(1.0),
            emulating_mobile: false,
            is_landscape: true,
            has_touch: false,
        })
        .window_size(width, height)
        .arg("--disable-gpu")
        .arg("--no-sandbox")
        .arg("--disable-setuid-sandbox")
        .arg("--disable-dev-shm-usage")
        .arg("--disable-extensions")
        .arg("--disable-background-networking")
        .arg("--disable-sync")
        .arg("--disable-crash-reporter")
        .arg("--no-first-run")
        .arg("--no-default-browser-check")
        .arg("--hide-scrollbars")
        .arg("--mute-audio")
        .arg("--disable-blink-features=AutomationControlled")
        .arg(format!("--user-agent={}", ua))
        .build()
        .map_err(|e| anyhow!("Failed to build browser config: {}", e))
}

// ── Bounded polling ──────────────────────────────────────────────────────────

/// Re-run `probe` every `interval` until it returns `true` or `timeout`
/// elapses. Returns `Ok(false)` on bound exhaustion — the caller decides
/// whether that is a soft miss or a hard `Timeout`.
///
/// The probe runs once immediately, so a condition that already holds never
/// waits a full interval.
pub async fn poll_until<F, Fut>(
    what: &str,
    timeout: Duration,
    interval: Duration,
    mut probe: F,
) -> Result<bool, RunError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<bool, RunError>>,
{
    let start = tokio::time::Instant::now();
    loop {
        if probe().await? {
            debug!("poll_until: {} observed after {:?}", what, start.elapsed());
            return Ok(true);
        }
        if start.elapsed() >= timeout {
            debug!("poll_until: {} not observed within {:?}", what, timeout);
            return Ok(false);
        }
        tokio::time::sleep(interval).await;
    }
}

/// Evaluate a JS expression and coerce the result to `bool`.
///
/// Anything that is not a boolean `true` reads as `false` — including
/// evaluate failures. Mid-navigation the execution context is routinely torn
/// down between polls ("Cannot find context with specified id"), and that
/// must read as "condition not observed yet", not as a fatal browser error;
/// the surrounding poll's bound still guarantees termination.
pub async fn eval_bool(page: &Page, expr: &str) -> Result<bool, RunError> {
    let value = page
        .evaluate(expr)
        .await
        .ok()
        .and_then(|v| v.into_value::<serde_json::Value>().ok());
    Ok(truthy(value))
}

/// `true` only for a boolean `true` result; a missing or non-boolean result
/// (eval failure, destroyed context, unexpected JS value) is `false`.
fn truthy(value: Option<serde_json::Value>) -> bool {
    value.as_ref().and_then(|j| j.as_bool()).unwrap_or(false)
}

/// Evaluate a JS expression expected to yield an array of strings.
pub async fn eval_string_vec(page: &Page, expr: &str) -> Result<Vec<String>, RunError> {
    let outcome = page
        .evaluate(expr)
        .await
        .map_err(|e| RunError::Browser(format!("evaluate failed: {}", e)))?;
    outcome
        .into_value::<Vec<String>>()
        .map_err(|e| RunError::Browser(format!("unexpected evaluate result: {}", e)))
}

/// Poll the live DOM until `expr` evaluates truthy, bounded by `timeout`.
pub async fn wait_for_js(
    page: &Page,
    expr: &str,
    what: &str,
    timeout: Duration,
) -> Result<bool, RunError> {
    poll_until(what, timeout, POLL_INTERVAL, || eval_bool(page, expr)).await
}
