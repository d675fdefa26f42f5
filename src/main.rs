use anyhow::{anyhow, Context};
use chrono::{Days, Local, NaiveDate};
use std::env;
use tracing::{error, info};

use manifest_courier::browser::session::DashboardSession;
use manifest_courier::config;
use manifest_courier::manifest;
use manifest_courier::notify::HttpMailer;

/// Optional `--date YYYY-MM-DD` override for reruns; the job targets
/// "tomorrow" (local time) when absent.
fn parse_date_from_args() -> anyhow::Result<Option<NaiveDate>> {
    let mut args = std::env::args().peekable();
    while let Some(a) = args.next() {
        let value = if a == "--date" {
            args.next()
        } else if let Some(rest) = a.strip_prefix("--date=") {
            Some(rest.to_string())
        } else {
            continue;
        };
        let value = value.ok_or_else(|| anyhow!("--date requires a value (YYYY-MM-DD)"))?;
        let date = NaiveDate::parse_from_str(&value, "%Y-%m-%d")
            .with_context(|| format!("invalid --date `{}` (expected YYYY-MM-DD)", value))?;
        return Ok(Some(date));
    }
    Ok(None)
}

fn target_date() -> anyhow::Result<NaiveDate> {
    if let Some(date) = parse_date_from_args()? {
        return Ok(date);
    }
    Local::now()
        .date_naive()
        .checked_add_days(Days::new(1))
        .ok_or_else(|| anyhow!("date overflow computing tomorrow"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let date = target_date()?;
    info!("manifest run for {}", date);

    let cfg = config::load_courier_config()
        .resolve()
        .context("incomplete configuration")?;

    let http_timeout = env::var("HTTP_TIMEOUT_SECS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(30);
    let http_client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(http_timeout))
        .connect_timeout(std::time::Duration::from_secs(10))
        .build()?;

    let mailer = HttpMailer::new(http_client, &cfg);
    let mut session = DashboardSession::launch(cfg.clone()).await?;

    match manifest::run(&mut session, &mailer, &cfg, date).await {
        Ok(summary) => {
            info!(
                "DONE  {} | {} | {} bytes -> {} | sent to {}",
                summary.date, summary.pax, summary.pdf_bytes, summary.pdf_path, summary.recipient
            );
            Ok(())
        }
        Err(e) => {
            error!("run failed: {}", e);
            // Session is already closed; screenshot (if any) is on disk.
            std::process::exit(1);
        }
    }
}
