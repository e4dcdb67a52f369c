//! Logging Infrastructure
//!
//! Console output (pretty or JSON) plus optional file output:
//! - Daily rotating application logs (deleted after 14 days)
//! - Permanent ledger audit logs (target `audit`, never deleted)

use std::fs;
use std::path::{Path, PathBuf};
use tracing::Subscriber;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{EnvFilter, Layer, filter::filter_fn, fmt, prelude::*};

/// Tracing target for audit records
pub const AUDIT_TARGET: &str = "audit";

const APP_LOG_PREFIX: &str = "app";
const AUDIT_LOG_PREFIX: &str = "audit";
const LOG_SUFFIX: &str = "log";
const APP_LOG_RETENTION_DAYS: i64 = 14;

type BoxedLayer<S> = Box<dyn Layer<S> + Send + Sync + 'static>;

/// Delete application log files older than 14 days
///
/// Files are named `app.YYYY-MM-DD.log` by the rolling appender. Audit logs are
/// never touched.
pub fn cleanup_old_logs(log_dir: &Path) -> anyhow::Result<()> {
    let cutoff = chrono::Local::now().date_naive() - chrono::Duration::days(APP_LOG_RETENTION_DAYS);

    let app_log_dir = log_dir.join(APP_LOG_PREFIX);
    if !app_log_dir.exists() {
        return Ok(());
    }

    for entry in fs::read_dir(app_log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        let Some(date) = log_file_date(name, APP_LOG_PREFIX) else {
            continue;
        };
        if date < cutoff {
            fs::remove_file(&path)?;
            tracing::info!(file = %name, "Deleted old log file");
        }
    }

    Ok(())
}

/// Parse the date out of `{prefix}.YYYY-MM-DD.log`
fn log_file_date(name: &str, prefix: &str) -> Option<chrono::NaiveDate> {
    let date_part = name
        .strip_prefix(prefix)?
        .strip_prefix('.')?
        .strip_suffix(LOG_SUFFIX)?
        .strip_suffix('.')?;
    chrono::NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
}

fn rolling_appender(dir: &Path, prefix: &str) -> anyhow::Result<RollingFileAppender> {
    Ok(RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix(LOG_SUFFIX)
        .build(dir)?)
}

fn file_layer<S>(appender: RollingFileAppender, json_format: bool) -> BoxedLayer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    let writer = std::sync::Mutex::new(appender);
    if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_writer(writer)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(writer)
            .boxed()
    }
}

/// Initialize the logging system with daily rotating logs
///
/// # Arguments
/// * `level` - Log level (e.g., "info", "debug", "warn"); `RUST_LOG` wins when set
/// * `json_format` - Whether to use JSON format (true for production, false for development)
/// * `log_dir` - Optional directory for file logging (e.g., Some("./work_dir/logs"))
///
/// Must be called inside a tokio runtime when `log_dir` is set, since the
/// cleanup task is spawned on it.
pub fn init_logger_with_file(
    level: &str,
    json_format: bool,
    log_dir: Option<&str>,
) -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let mut layers: Vec<BoxedLayer<_>> = Vec::new();

    let console_layer = if json_format {
        fmt::layer()
            .json()
            .with_target(true)
            .with_current_span(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_file(true)
            .with_line_number(true)
            .boxed()
    };
    layers.push(console_layer);

    if let Some(dir) = log_dir {
        let log_dir = Path::new(dir);
        let app_log_dir = log_dir.join(APP_LOG_PREFIX);
        let audit_log_dir = log_dir.join(AUDIT_LOG_PREFIX);
        fs::create_dir_all(&app_log_dir)?;
        fs::create_dir_all(&audit_log_dir)?;

        let app_log = rolling_appender(&app_log_dir, APP_LOG_PREFIX)?;
        layers.push(
            file_layer(app_log, json_format)
                .with_filter(filter_fn(|meta| meta.target() != AUDIT_TARGET))
                .boxed(),
        );

        let audit_log = rolling_appender(&audit_log_dir, AUDIT_LOG_PREFIX)?;
        layers.push(
            file_layer(audit_log, json_format)
                .with_filter(filter_fn(|meta| meta.target() == AUDIT_TARGET))
                .boxed(),
        );

        tokio::spawn(periodic_cleanup(log_dir.to_path_buf()));
    }

    tracing_subscriber::registry()
        .with(env_filter)
        .with(layers)
        .try_init()?;

    Ok(())
}

/// Periodic cleanup task - runs every hour to clean old logs
async fn periodic_cleanup(log_dir: PathBuf) {
    use tokio::time::{Duration, sleep};

    loop {
        sleep(Duration::from_secs(3600)).await;

        if let Err(e) = cleanup_old_logs(&log_dir) {
            tracing::error!(error = %e, "Failed to cleanup old logs");
        }
    }
}

/// Initialize the logging system (console only)
pub fn init_logger(level: &str, json_format: bool) -> anyhow::Result<()> {
    init_logger_with_file(level, json_format, None)
}

/// Audit log helper - records every balance mutation and account provisioning
///
/// Audit records go to `audit.YYYY-MM-DD.log` and are never deleted.
///
/// # Examples
/// ```no_run
/// booth_core::audit_log!(42_i64, "charge", "model:fal-ai/flux-realism", "charged 4, balance 996");
/// ```
#[macro_export]
macro_rules! audit_log {
    ($account_id:expr, $action:expr, $resource:expr) => {
        tracing::info!(
            target: "audit",
            account_id = $account_id,
            action = %$action,
            resource = %$resource,
            timestamp = %chrono::Local::now().to_rfc3339(),
            "AUDIT"
        );
    };
    ($account_id:expr, $action:expr, $resource:expr, $details:expr) => {
        tracing::info!(
            target: "audit",
            account_id = $account_id,
            action = %$action,
            resource = %$resource,
            details = %$details,
            timestamp = %chrono::Local::now().to_rfc3339(),
            "AUDIT"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_date() {
        assert_eq!(
            log_file_date("app.2026-03-04.log", "app"),
            chrono::NaiveDate::from_ymd_opt(2026, 3, 4)
        );
        assert!(log_file_date("audit.2026-03-04.log", "app").is_none());
        assert!(log_file_date("app.latest.log", "app").is_none());
    }

    #[test]
    fn test_cleanup_old_logs_keeps_recent_and_audit() {
        let dir = tempfile::tempdir().unwrap();
        let app_dir = dir.path().join("app");
        let audit_dir = dir.path().join("audit");
        fs::create_dir_all(&app_dir).unwrap();
        fs::create_dir_all(&audit_dir).unwrap();

        let today = chrono::Local::now().date_naive();
        let old = today - chrono::Duration::days(30);
        let old_name = format!("app.{}.log", old.format("%Y-%m-%d"));
        let new_name = format!("app.{}.log", today.format("%Y-%m-%d"));
        let audit_name = format!("audit.{}.log", old.format("%Y-%m-%d"));

        fs::write(app_dir.join(&old_name), "old").unwrap();
        fs::write(app_dir.join(&new_name), "new").unwrap();
        fs::write(audit_dir.join(&audit_name), "audit").unwrap();

        cleanup_old_logs(dir.path()).unwrap();

        assert!(!app_dir.join(&old_name).exists());
        assert!(app_dir.join(&new_name).exists());
        assert!(audit_dir.join(&audit_name).exists());
    }
}
