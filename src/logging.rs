use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, SystemTime},
};

use anyhow::{Context, Result, bail};
use tracing_appender::{non_blocking::WorkerGuard, rolling};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, Layer, filter::LevelFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};
use uuid::Uuid;

use crate::config::{LoggingConfig, LoggingRotation};

/// Rotated files are named `portal.log.<date>`.
pub const LOG_FILE_PREFIX: &str = "portal.log";

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Holds the non-blocking file writer open. Keep it until `main` returns.
pub struct LoggingGuard {
    _flush: WorkerGuard,
    run_id: String,
    log_dir: PathBuf,
}

impl LoggingGuard {
    /// Identifies this process run in every log file.
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Installs the global subscriber: JSON lines to a rolling file, WARN+ to stderr.
pub fn init_tracing(config: &LoggingConfig) -> Result<LoggingGuard> {
    let filter = parse_filter(&config.filter)?;
    if config.dir.as_os_str().is_empty() {
        bail!("logging.dir must not be empty");
    }

    let log_dir = if config.dir.is_absolute() {
        config.dir.clone()
    } else {
        std::env::current_dir()
            .context("cannot resolve logging.dir against the working directory")?
            .join(&config.dir)
    };
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("cannot create log directory {}", log_dir.display()))?;

    let retention = RetentionReport::sweep(
        &log_dir,
        LOG_FILE_PREFIX,
        config.retention_days,
        SystemTime::now(),
    );

    let appender = match config.rotation {
        LoggingRotation::Daily => rolling::daily(&log_dir, LOG_FILE_PREFIX),
        LoggingRotation::Hourly => rolling::hourly(&log_dir, LOG_FILE_PREFIX),
    };
    let (writer, flush) = tracing_appender::non_blocking(appender);

    let json_file = fmt::layer()
        .json()
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_current_span(true)
        .with_span_list(true)
        .with_target(true)
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(filter);
    let warnings_to_stderr = config.stderr_warn_enabled.then(|| {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(LevelFilter::WARN)
    });

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(json_file)
        .with(warnings_to_stderr)
        .try_init()
        .context("a global tracing subscriber is already installed")?;

    let run_id = Uuid::now_v7().to_string();
    tracing::info!(
        target: "logging",
        run_id = %run_id,
        dir = %log_dir.display(),
        filter = %config.filter,
        rotation = ?config.rotation,
        retention_days = config.retention_days,
        expired_files_removed = retention.removed,
        "logging_ready"
    );
    for problem in &retention.problems {
        tracing::warn!(target: "logging", problem = %problem, "log_retention_problem");
    }

    Ok(LoggingGuard {
        _flush: flush,
        run_id,
        log_dir,
    })
}

fn parse_filter(directives: &str) -> Result<EnvFilter> {
    if directives.trim().is_empty() {
        bail!("logging.filter must not be empty");
    }
    EnvFilter::try_new(directives)
        .with_context(|| format!("logging.filter '{directives}' is not a valid filter"))
}

/// Outcome of purging rotated log files past the retention window.
#[derive(Debug, Default)]
struct RetentionReport {
    removed: usize,
    problems: Vec<String>,
}

impl RetentionReport {
    fn sweep(log_dir: &Path, prefix: &str, retention_days: usize, now: SystemTime) -> Self {
        let window = Duration::from_secs((retention_days as u64).saturating_mul(SECONDS_PER_DAY));
        let cutoff = now.checked_sub(window).unwrap_or(SystemTime::UNIX_EPOCH);
        let mut report = Self::default();

        let listing = match fs::read_dir(log_dir) {
            Ok(listing) => listing,
            Err(err) => {
                report
                    .problems
                    .push(format!("cannot list {}: {}", log_dir.display(), err));
                return report;
            }
        };

        let candidates = listing
            .flatten()
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(prefix));
        for entry in candidates {
            let path = entry.path();
            let modified = match entry.metadata() {
                Ok(metadata) if !metadata.is_file() => continue,
                Ok(metadata) => metadata.modified(),
                Err(err) => Err(err),
            };
            match modified {
                Ok(modified) if modified > cutoff => {}
                Ok(_) => match fs::remove_file(&path) {
                    Ok(()) => report.removed += 1,
                    Err(err) => report
                        .problems
                        .push(format!("cannot remove {}: {}", path.display(), err)),
                },
                Err(err) => report
                    .problems
                    .push(format!("cannot read mtime of {}: {}", path.display(), err)),
            }
        }

        report
    }
}
