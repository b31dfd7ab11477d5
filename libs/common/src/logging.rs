//! Unified logging module for the station services
//!
//! Console and file output share one bracketed format. The file side goes
//! through a non-blocking appender into `YYYYMMDD_<service>.log`, rolled daily
//! and by size. `RUST_LOG` overrides the configured level.
//!
//! Lifecycle is explicit: [`init_with_config`] at startup, [`flush`] before the
//! process exits.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, OnceLock};

use flate2::write::GzEncoder;
use flate2::Compression;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::Writer, FmtContext, FormatEvent, FormatFields},
    layer::SubscriberExt,
    registry::LookupSpan,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Environment override for the log root
pub const LOG_DIR_ENV: &str = "STATIONSRV_LOG_DIR";

/// Default max file size: 50MB
const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;

/// Custom format for log level with brackets: `[INFO]`, `[WARN]`, etc.
fn format_level(level: &Level) -> &'static str {
    match *level {
        Level::TRACE => "[TRACE]",
        Level::DEBUG => "[DEBUG]",
        Level::INFO => "[INFO]",
        Level::WARN => "[WARN]",
        Level::ERROR => "[ERROR]",
    }
}

/// Event formatter that outputs: `timestamp [LEVEL] message`
///
/// Example output: `2026-03-02 08:15:44.809 [INFO] SN FM71234 -> OK`
struct BracketedLevelFormat;

impl<S, N> FormatEvent<S, N> for BracketedLevelFormat
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std::fmt::Result {
        // Station operators read local wall-clock time
        let now = chrono::Local::now();
        write!(writer, "{} ", now.format("%Y-%m-%d %H:%M:%S%.3f"))?;

        let level = *event.metadata().level();
        if writer.has_ansi_escapes() {
            let color = match level {
                Level::TRACE => "\x1b[35m",
                Level::DEBUG => "\x1b[34m",
                Level::INFO => "\x1b[32m",
                Level::WARN => "\x1b[33m",
                Level::ERROR => "\x1b[31m",
            };
            write!(writer, "{}{}\x1b[0m ", color, format_level(&level))?;
        } else {
            write!(writer, "{} ", format_level(&level))?;
        }

        // Workflow spans carry side and SN
        if let Some(scope) = ctx.event_scope() {
            for span in scope.from_root() {
                write!(writer, "{}", span.name())?;
                let ext = span.extensions();
                if let Some(fields) = ext.get::<fmt::FormattedFields<N>>() {
                    if !fields.is_empty() {
                        write!(writer, "{{{}}}", fields)?;
                    }
                }
                write!(writer, ": ")?;
            }
        }

        ctx.field_format().format_fields(writer.by_ref(), event)?;

        writeln!(writer)
    }
}

// ============================================================================
// Log Root Directory Configuration
// ============================================================================

/// Priority: STATIONSRV_LOG_DIR env > config dir > default "logs"
static LOG_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Initialize log root directory from config or environment
///
/// Call before [`init_with_config`]. Later calls are ignored.
pub fn init_log_root(config_dir: Option<&str>) {
    LOG_ROOT.get_or_init(|| {
        std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                config_dir
                    .map(PathBuf::from)
                    .unwrap_or_else(|| PathBuf::from("logs"))
            })
    });
}

/// Get log root directory
///
/// Falls back to the environment or "logs" when [`init_log_root`] was not
/// called. Test binaries log under the system temp directory.
pub fn get_log_root() -> PathBuf {
    LOG_ROOT.get().cloned().unwrap_or_else(|| {
        std::env::var(LOG_DIR_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| {
                if is_test_environment() {
                    std::env::temp_dir().join("stationsrv-test-logs")
                } else {
                    PathBuf::from("logs")
                }
            })
    })
}

fn is_test_environment() -> bool {
    if std::env::var("CARGO_TARGET_TMPDIR").is_ok() {
        return true;
    }

    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.to_str().map(|s| s.contains("target/debug/deps")))
        .unwrap_or(false)
}

// ============================================================================
// Daily rolling writer
// ============================================================================

/// Active file plus the bookkeeping needed to decide when to roll
struct RollingState {
    date: String,
    file: File,
    size: u64,
    rotation: u32,
}

/// Daily rolling file writer: `{YYYYMMDD}_{service}.log`, then
/// `{YYYYMMDD}_{service}.{n}.log` once a file passes `max_file_size`
#[derive(Clone)]
struct DailyRollingWriter {
    service_name: String,
    log_dir: PathBuf,
    max_file_size: u64,
    state: Arc<Mutex<RollingState>>,
}

impl DailyRollingWriter {
    fn new(service_name: String, log_dir: PathBuf, max_file_size: u64) -> std::io::Result<Self> {
        fs::create_dir_all(&log_dir)?;
        let date = today();
        let file = open_append(&log_dir.join(format!("{}_{}.log", date, service_name)))?;
        let size = file.metadata().map(|m| m.len()).unwrap_or(0);

        Ok(Self {
            service_name,
            log_dir,
            max_file_size,
            state: Arc::new(Mutex::new(RollingState {
                date,
                file,
                size,
                rotation: 0,
            })),
        })
    }

    fn roll_if_needed(&self, state: &mut RollingState, incoming: usize) -> std::io::Result<()> {
        let date = today();
        if state.date != date {
            fs::create_dir_all(&self.log_dir)?;
            state.file = open_append(
                &self
                    .log_dir
                    .join(format!("{}_{}.log", date, self.service_name)),
            )?;
            state.size = state.file.metadata().map(|m| m.len()).unwrap_or(0);
            state.date = date;
            state.rotation = 0;
        }

        if state.size > 0 && state.size + incoming as u64 > self.max_file_size {
            state.rotation += 1;
            state.file = open_append(&self.log_dir.join(format!(
                "{}_{}.{}.log",
                state.date, self.service_name, state.rotation
            )))?;
            state.size = 0;
        }
        Ok(())
    }
}

impl Write for DailyRollingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))?;
        self.roll_if_needed(&mut state, buf.len())?;
        let written = state.file.write(buf)?;
        state.size += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut state = self
            .state
            .lock()
            .map_err(|e| std::io::Error::other(format!("Mutex poisoned: {}", e)))?;
        state.file.flush()
    }
}

fn today() -> String {
    chrono::Local::now().format("%Y%m%d").to_string()
}

fn open_append(path: &Path) -> std::io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

// ============================================================================
// Subscriber setup
// ============================================================================

// Appender guard, held until flush()
static GUARD: OnceLock<Mutex<Option<WorkerGuard>>> = OnceLock::new();

/// `logging` section of the service configuration file
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log root directory
    pub dir: String,
    /// Default filter when RUST_LOG is unset
    pub level: String,
    /// Size limit per file before rolling
    pub max_file_size_mb: u64,
    /// Days before a finished log file is gzip-archived
    pub archive_after_days: u64,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
            level: "info".to_string(),
            max_file_size_mb: DEFAULT_MAX_FILE_SIZE / 1024 / 1024,
            archive_after_days: 7,
        }
    }
}

/// Logger configuration
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Service name, used in file names and the default filter
    pub service_name: String,
    /// Directory the rolling files are written to
    pub log_dir: PathBuf,
    /// Base level when RUST_LOG is unset
    pub console_level: Level,
    pub enable_ansi: bool,
    pub enable_json: bool,
    pub max_file_size: u64,
    /// Days before archiving, `None` disables the archive task
    pub archive_after_days: Option<u64>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            service_name: "unknown".to_string(),
            log_dir: get_log_root(),
            console_level: Level::INFO,
            enable_ansi: true,
            enable_json: false,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            archive_after_days: Some(7),
        }
    }
}

/// Initialize logging system with configuration
pub fn init_with_config(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let writer = DailyRollingWriter::new(
        config.service_name.clone(),
        config.log_dir.clone(),
        config.max_file_size,
    )?;
    let (non_blocking, guard) = tracing_appender::non_blocking(writer);

    let slot = GUARD.get_or_init(|| Mutex::new(None));
    match slot.lock() {
        Ok(mut g) => *g = Some(guard),
        Err(poisoned) => *poisoned.into_inner() = Some(guard),
    }

    // RUST_LOG wins over the configured level
    let filter_str = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        format!(
            "{},{}=debug",
            config.console_level.as_str().to_lowercase(),
            config.service_name
        )
    });
    let env_filter = EnvFilter::try_new(&filter_str)?;

    let console_layer = fmt::layer()
        .with_ansi(config.enable_ansi)
        .event_format(BracketedLevelFormat)
        .boxed();

    let file_layer = if config.enable_json {
        fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_target(true)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .event_format(BracketedLevelFormat)
            .boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Logging: {} @ {:?}", config.service_name, config.log_dir);

    if let Some(days) = config.archive_after_days {
        start_log_archive_task(config.log_dir, config.service_name, days);
    }

    Ok(())
}

/// Flush buffered file output and release the appender worker
///
/// Safe to call more than once. Events logged afterwards only reach the console.
pub fn flush() {
    if let Some(slot) = GUARD.get() {
        let guard = match slot.lock() {
            Ok(mut g) => g.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        drop(guard);
    }
}

// ==================== Log Archive Support ====================

/// Archive finished log files once a day in the background
pub fn start_log_archive_task(log_dir: PathBuf, service_name: String, after_days: u64) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        tracing::debug!("No runtime, log archiving disabled");
        return;
    };
    handle.spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(86400));
        loop {
            interval.tick().await;
            let dir = log_dir.clone();
            let service = service_name.clone();
            let result = tokio::task::spawn_blocking(move || {
                archive_old_logs(&dir, &service, std::time::Duration::from_secs(after_days * 86400))
            })
            .await;
            match result {
                Ok(Ok(n)) if n > 0 => tracing::debug!("Archived {} log file(s)", n),
                Ok(Ok(_)) => {},
                Ok(Err(e)) => tracing::error!("Log archive error for {}: {}", service_name, e),
                Err(e) => tracing::error!("Log archive task failed: {}", e),
            }
        }
    });
}

/// Gzip every `*_{service}*.log` older than `max_age`, returning how many were archived
pub fn archive_old_logs(
    log_dir: &Path,
    service_name: &str,
    max_age: std::time::Duration,
) -> std::io::Result<usize> {
    let marker = format!("_{}", service_name);
    let mut archived = 0;

    for entry in fs::read_dir(log_dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().map(|n| n.to_string_lossy().to_string()) else {
            continue;
        };
        if !name.ends_with(".log") || !name.contains(&marker) {
            continue;
        }

        let age = fs::metadata(&path)?
            .modified()?
            .elapsed()
            .unwrap_or_default();
        if age > max_age {
            compress_file(&path)?;
            fs::remove_file(&path)?;
            archived += 1;
        }
    }

    Ok(archived)
}

fn compress_file(path: &Path) -> std::io::Result<()> {
    let data = fs::read(path)?;
    let output = File::create(format!("{}.gz", path.display()))?;
    let mut encoder = GzEncoder::new(output, Compression::best());
    encoder.write_all(&data)?;
    encoder.finish()?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_rolling_writer_rotates_by_size() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer =
            DailyRollingWriter::new("station".into(), dir.path().to_path_buf(), 16).unwrap();

        writer.write_all(b"0123456789").unwrap();
        writer.write_all(b"0123456789").unwrap();
        writer.flush().unwrap();

        let date = today();
        let first = dir.path().join(format!("{}_station.log", date));
        let rolled = dir.path().join(format!("{}_station.1.log", date));
        assert_eq!(fs::read(&first).unwrap().len(), 10);
        assert_eq!(fs::read(&rolled).unwrap().len(), 10);
    }

    #[test]
    fn test_archive_old_logs() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("20240101_station.log");
        fs::write(&log, b"scan FM71234 -> OK\n").unwrap();
        fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        let old = std::time::SystemTime::now() - std::time::Duration::from_secs(3600);
        File::options()
            .write(true)
            .open(&log)
            .unwrap()
            .set_modified(old)
            .unwrap();

        let archived =
            archive_old_logs(dir.path(), "station", std::time::Duration::from_secs(60)).unwrap();
        assert_eq!(archived, 1);
        assert!(!log.exists());

        let gz = File::open(dir.path().join("20240101_station.log.gz")).unwrap();
        let mut decoded = String::new();
        flate2::read::GzDecoder::new(gz)
            .read_to_string(&mut decoded)
            .unwrap();
        assert_eq!(decoded, "scan FM71234 -> OK\n");
        assert!(dir.path().join("notes.txt").exists());
    }

    #[test]
    fn test_logging_config_defaults() {
        let cfg = LoggingConfig::default();
        assert_eq!(cfg.dir, "logs");
        assert_eq!(cfg.max_file_size_mb, 50);
        assert_eq!(cfg.archive_after_days, 7);
    }
}
