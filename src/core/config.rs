use anyhow::{anyhow, Context, Result};
use chrono::NaiveDate;

// ---------------------------------------------------------------------------
// CourierConfig — file-based config loader (manifest-courier.json) with
// env-var fallback for every field. Credentials are never embedded in the
// binary and never logged.
// ---------------------------------------------------------------------------

pub const ENV_USERNAME: &str = "MANIFEST_USERNAME";
pub const ENV_PASSWORD: &str = "MANIFEST_PASSWORD";
pub const ENV_LOGIN_URL: &str = "MANIFEST_LOGIN_URL";
pub const ENV_MANIFEST_URL_TEMPLATE: &str = "MANIFEST_URL_TEMPLATE";
pub const ENV_MAIL_ENDPOINT: &str = "COURIER_MAIL_ENDPOINT";
pub const ENV_MAIL_TOKEN: &str = "COURIER_MAIL_TOKEN";
pub const ENV_MAIL_TO: &str = "COURIER_MAIL_TO";
pub const ENV_MAIL_CC: &str = "COURIER_MAIL_CC";
pub const ENV_CONFIG_PATH: &str = "MANIFEST_COURIER_CONFIG";
pub const ENV_CHROME_EXECUTABLE: &str = "CHROME_EXECUTABLE";

/// Raw config as parsed from `manifest-courier.json`. Every field is optional
/// here; `resolve()` applies env-var fallbacks and rejects incomplete setups.
#[derive(serde::Deserialize, Default, Clone, Debug)]
pub struct CourierConfig {
    /// Dashboard login identifier (email or username).
    pub username: Option<String>,
    /// Dashboard password. Never logged.
    pub password: Option<String>,
    /// Login form URL.
    pub login_url: Option<String>,
    /// Per-date manifest URL with a `{date}` placeholder (YYYY-MM-DD).
    pub manifest_url_template: Option<String>,
    /// Mail API send endpoint.
    pub mail_endpoint: Option<String>,
    /// Mail API bearer token. Never logged.
    pub mail_token: Option<String>,
    /// Primary recipient.
    pub mail_to: Option<String>,
    /// Optional CC recipient.
    pub mail_cc: Option<String>,
    /// Bound for the login-form password field to appear. Default: 20.
    pub login_timeout_secs: Option<u64>,
    /// Bound for the post-login redirect away from the login URL. Default: 15.
    pub nav_timeout_secs: Option<u64>,
    /// Bound for the optional 2FA dismissal dialog. Default: 5.
    pub twofa_timeout_secs: Option<u64>,
    /// Bound for the "N total" readiness markers to render. Default: 20.
    pub ready_timeout_secs: Option<u64>,
}

fn env_nonempty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl CourierConfig {
    fn required(&self, field: Option<&String>, env_key: &str, name: &str) -> Result<String> {
        if let Some(v) = field {
            let v = v.trim();
            if !v.is_empty() {
                return Ok(v.to_string());
            }
        }
        env_nonempty(env_key)
            .ok_or_else(|| anyhow!("missing config: set `{}` in manifest-courier.json or {}", name, env_key))
    }

    fn required_url(&self, field: Option<&String>, env_key: &str, name: &str) -> Result<String> {
        let v = self.required(field, env_key, name)?;
        url::Url::parse(&v).with_context(|| format!("invalid URL in `{}`: {}", name, v))?;
        Ok(v)
    }

    /// Apply env-var fallbacks and produce a fully-resolved run config.
    pub fn resolve(&self) -> Result<RunConfig> {
        Ok(RunConfig {
            username: self.required(self.username.as_ref(), ENV_USERNAME, "username")?,
            password: self.required(self.password.as_ref(), ENV_PASSWORD, "password")?,
            login_url: self.required_url(self.login_url.as_ref(), ENV_LOGIN_URL, "login_url")?,
            manifest_url_template: self.required(
                self.manifest_url_template.as_ref(),
                ENV_MANIFEST_URL_TEMPLATE,
                "manifest_url_template",
            )?,
            mail_endpoint: self.required_url(self.mail_endpoint.as_ref(), ENV_MAIL_ENDPOINT, "mail_endpoint")?,
            mail_token: self.required(self.mail_token.as_ref(), ENV_MAIL_TOKEN, "mail_token")?,
            mail_to: self.required(self.mail_to.as_ref(), ENV_MAIL_TO, "mail_to")?,
            mail_cc: self
                .mail_cc
                .clone()
                .filter(|v| !v.trim().is_empty())
                .or_else(|| env_nonempty(ENV_MAIL_CC)),
            login_timeout_secs: self.login_timeout_secs.unwrap_or(20),
            nav_timeout_secs: self.nav_timeout_secs.unwrap_or(15),
            twofa_timeout_secs: self.twofa_timeout_secs.unwrap_or(5),
            ready_timeout_secs: self.ready_timeout_secs.unwrap_or(20),
        })
    }
}

/// Resolved, complete configuration threaded through the run.
#[derive(Clone)]
pub struct RunConfig {
    pub username: String,
    pub password: String,
    pub login_url: String,
    pub manifest_url_template: String,
    pub mail_endpoint: String,
    pub mail_token: String,
    pub mail_to: String,
    pub mail_cc: Option<String>,
    pub login_timeout_secs: u64,
    pub nav_timeout_secs: u64,
    pub twofa_timeout_secs: u64,
    pub ready_timeout_secs: u64,
}

impl std::fmt::Debug for RunConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Keep credentials out of logs.
        f.debug_struct("RunConfig")
            .field("username", &self.username)
            .field("login_url", &self.login_url)
            .field("manifest_url_template", &self.manifest_url_template)
            .field("mail_endpoint", &self.mail_endpoint)
            .field("mail_to", &self.mail_to)
            .field("mail_cc", &self.mail_cc)
            .finish_non_exhaustive()
    }
}

impl RunConfig {
    /// Manifest URL for a concrete date (ISO `YYYY-MM-DD` substitution).
    pub fn manifest_url_for(&self, date: NaiveDate) -> String {
        self.manifest_url_template
            .replace("{date}", &date.format("%Y-%m-%d").to_string())
    }
}

/// Load `manifest-courier.json` from standard locations.
///
/// Search order (first found wins):
/// 1. `MANIFEST_COURIER_CONFIG` env var path
/// 2. `./manifest-courier.json` (process cwd)
/// 3. `../manifest-courier.json`
/// 4. `~/.manifest-courier/config.json`
///
/// Missing file → `CourierConfig::default()` (env-var fallbacks apply to every
/// field). Parse error → warn and fall back to defaults.
pub fn load_courier_config() -> CourierConfig {
    let mut candidates: Vec<std::path::PathBuf> = vec![
        std::path::PathBuf::from("manifest-courier.json"),
        std::path::PathBuf::from("../manifest-courier.json"),
    ];
    if let Ok(env_path) = std::env::var(ENV_CONFIG_PATH) {
        candidates.insert(0, std::path::PathBuf::from(env_path));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".manifest-courier").join("config.json"));
    }

    for path in &candidates {
        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<CourierConfig>(&contents) {
                Ok(cfg) => {
                    tracing::info!("manifest-courier.json loaded from {}", path.display());
                    return cfg;
                }
                Err(e) => {
                    tracing::warn!(
                        "manifest-courier.json parse error at {}: {} — using defaults",
                        path.display(),
                        e
                    );
                    return CourierConfig::default();
                }
            },
            Err(_) => continue,
        }
    }

    CourierConfig::default()
}

/// Optional override for the Chromium-family browser executable.
///
/// Default behavior is auto-discovery (see `browser::find_chrome_executable`).
/// Returns a value only when `CHROME_EXECUTABLE` points at an existing path.
pub fn chrome_executable_override() -> Option<String> {
    let p = env_nonempty(ENV_CHROME_EXECUTABLE)?;
    if std::path::Path::new(&p).exists() {
        Some(p)
    } else {
        None
    }
}
