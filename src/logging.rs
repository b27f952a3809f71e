use std::env;
use std::fs::OpenOptions;
use std::io;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Log file path; logs go to stderr when unset
pub const ENV_LOG_FILE: &str = "BEEF_LSP_LOG_FILE";

/// When "true", the process id is added to the log file name
pub const ENV_LOG_UNIQUE: &str = "BEEF_LSP_LOG_UNIQUE";

/// When "true", logs are written as JSON lines
pub const ENV_LOG_JSON: &str = "BEEF_LSP_LOG_JSON";

/// Configuration for the logging system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogConfig {
    /// Log level filter (e.g., "debug", "info", "warn", "error")
    pub level: String,
    /// Optional log file path. If None, logs only to stderr
    pub file_path: Option<PathBuf>,
    /// Whether to use structured JSON format for logs
    pub json_format: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file_path: None,
            json_format: false,
        }
    }
}

impl LogConfig {
    /// Create LogConfig from environment variables
    pub fn from_env() -> Self {
        Self::from_values(
            env::var("RUST_LOG").ok(),
            env::var(ENV_LOG_FILE).ok(),
            env::var(ENV_LOG_UNIQUE).unwrap_or_default() == "true",
            env::var(ENV_LOG_JSON).unwrap_or_default() == "true",
        )
    }

    fn from_values(
        level: Option<String>,
        file_path: Option<String>,
        unique: bool,
        json_format: bool,
    ) -> Self {
        let file_path = file_path.map(|path| {
            let path_buf = PathBuf::from(path);
            if unique {
                unique_log_path(path_buf, std::process::id())
            } else {
                path_buf
            }
        });

        Self {
            level: level.unwrap_or_else(|| "info".to_string()),
            file_path,
            json_format,
        }
    }

    /// Override values from CLI arguments
    pub fn with_overrides(mut self, level: Option<String>, file_path: Option<PathBuf>) -> Self {
        if let Some(level) = level {
            self.level = level;
        }
        if let Some(file_path) = file_path {
            self.file_path = Some(file_path);
        }
        self
    }
}

/// `client.log` -> `client.<pid>.log`
fn unique_log_path(mut path_buf: PathBuf, pid: u32) -> PathBuf {
    if let Some(filename) = path_buf.file_stem() {
        let extension = path_buf
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("");

        let unique_filename = if extension.is_empty() {
            format!("{}.{}", filename.to_string_lossy(), pid)
        } else {
            format!("{}.{}.{}", filename.to_string_lossy(), pid, extension)
        };

        path_buf.set_file_name(unique_filename);
    }
    path_buf
}

/// Initialize the logging system based on configuration
pub fn init_logging(config: LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = EnvFilter::try_new(&config.level).or_else(|_| EnvFilter::try_new("info"))?;

    let subscriber = tracing_subscriber::registry().with(env_filter);

    match (&config.file_path, config.json_format) {
        (Some(file_path), true) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)?;

            let file_layer = fmt::layer().json().with_writer(file).with_ansi(false);

            subscriber.with(file_layer).try_init()?;
        }
        (Some(file_path), false) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(file_path)?;

            let file_layer = fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true);

            subscriber.with(file_layer).try_init()?;
        }
        (None, true) => {
            let stderr_layer = fmt::layer().json().with_writer(io::stderr).with_ansi(false);

            subscriber.with(stderr_layer).try_init()?;
        }
        // Default: human readable on stderr
        (None, false) => {
            let stderr_layer = fmt::layer()
                .with_writer(io::stderr)
                .with_ansi(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true);

            subscriber.with(stderr_layer).try_init()?;
        }
    }

    Ok(())
}

/// Log one LSP message (request, response or notification) as a single structured event
#[macro_export]
macro_rules! log_lsp_message {
    ($level:expr, $direction:expr, $method:expr, $data:expr) => {
        tracing::event!(
            $level,
            direction = $direction,
            method = $method,
            data = ?$data,
            pid = std::process::id(),
            "LSP message"
        );
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_from_values_defaults() {
        let config = LogConfig::from_values(None, None, false, false);
        assert_eq!(config, LogConfig::default());
    }

    #[test]
    fn test_unique_log_path_inserts_pid() {
        assert_eq!(
            unique_log_path(PathBuf::from("/tmp/beef-lsp.log"), 42),
            Path::new("/tmp/beef-lsp.42.log")
        );
        assert_eq!(
            unique_log_path(PathBuf::from("/tmp/beef-lsp"), 42),
            Path::new("/tmp/beef-lsp.42")
        );

        let config = LogConfig::from_values(
            Some("debug".to_string()),
            Some("/tmp/client.log".to_string()),
            true,
            true,
        );
        let expected = format!("/tmp/client.{}.log", std::process::id());
        assert_eq!(config.file_path.as_deref(), Some(Path::new(&expected)));
        assert_eq!(config.level, "debug");
        assert!(config.json_format);
    }

    #[test]
    fn test_cli_overrides_win() {
        let config = LogConfig::from_values(
            Some("warn".to_string()),
            Some("/tmp/env.log".to_string()),
            false,
            false,
        )
        .with_overrides(Some("trace".to_string()), Some(PathBuf::from("/tmp/cli.log")));

        assert_eq!(config.level, "trace");
        assert_eq!(config.file_path.as_deref(), Some(Path::new("/tmp/cli.log")));

        let untouched = LogConfig::default().with_overrides(None, None);
        assert_eq!(untouched, LogConfig::default());
    }
}
