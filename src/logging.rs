use crate::error::GuardError;
use crate::utils::truncate_str;
use crate::PreviewResult;
use tracing::{info, warn};

#[cfg(feature = "logging")]
pub use subscriber::{setup_logging, LogConfig, LogLevelGuard};

fn or_na(value: &str) -> &str {
    if value.is_empty() {
        "N/A"
    } else {
        value
    }
}

pub fn log_preview_card(preview: &PreviewResult) {
    const CARD_WIDTH: usize = 80;
    const CONTENT_WIDTH: usize = CARD_WIDTH - 10;

    let horizontal_line = "═".repeat(CARD_WIDTH - 2);

    info!(
        "\n╔{}╗\n\
         URL:    {}\n\
         Final:  {}\n\
         Title:  {}\n\
         Desc:   {}\n\
         Image:  {}\n\
         Site:   {}\n\
         Status: {}\n\
         ╚{}╝",
        horizontal_line,
        truncate_str(&preview.url, CONTENT_WIDTH),
        truncate_str(or_na(&preview.final_url), CONTENT_WIDTH),
        truncate_str(or_na(&preview.title), CONTENT_WIDTH),
        truncate_str(or_na(&preview.description), CONTENT_WIDTH),
        truncate_str(or_na(&preview.image_url), CONTENT_WIDTH),
        truncate_str(or_na(&preview.site_name), CONTENT_WIDTH),
        preview
            .status
            .map(|s| s.to_string())
            .unwrap_or_else(|| "N/A".to_string()),
        horizontal_line,
    );
}

/// Server-side audit record of a refusal. Includes the full error detail,
/// blocked address included, unlike [`GuardError::user_message`].
pub fn log_denial_card(url: &str, error: &GuardError) {
    const CARD_WIDTH: usize = 70;
    const CONTENT_WIDTH: usize = CARD_WIDTH - 10;

    let top_bottom = "═".repeat(CARD_WIDTH - 2);
    let reason = error
        .deny_reason()
        .map(|r| format!("{r:?}"))
        .unwrap_or_else(|| "FetchFailure".to_string());

    warn!(
        "\n╔{}╗\n\
         URL:    {}\n\
         Reason: {} ({})\n\
         Detail: {}\n\
         ╚{}╝",
        top_bottom,
        truncate_str(url, CONTENT_WIDTH),
        reason,
        error.status_class(),
        truncate_str(&error.to_string(), CONTENT_WIDTH),
        top_bottom,
    );
}

#[cfg(feature = "logging")]
mod subscriber {
    use std::io;
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex, PoisonError};
    use tracing::debug;
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{
        fmt as subscriber_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer,
    };

    #[derive(Debug)]
    pub struct LogConfig {
        pub log_dir: PathBuf,
        pub log_level: String,
        pub console_output: bool,
        pub file_output: bool,
    }

    impl Default for LogConfig {
        fn default() -> Self {
            Self {
                log_dir: "logs".into(),
                log_level: "info".into(),
                console_output: true,
                file_output: false,
            }
        }
    }

    /// Installs the global subscriber. Fails if the log directory cannot be
    /// created or a subscriber is already set.
    pub fn setup_logging(config: LogConfig) -> std::io::Result<()> {
        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(&config.log_level));

        let mut layers = Vec::new();

        if config.console_output {
            let console_layer = subscriber_fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_file(true)
                .compact();
            layers.push(console_layer.boxed());
        }

        if config.file_output {
            std::fs::create_dir_all(&config.log_dir)?;

            let file_appender =
                RollingFileAppender::new(Rotation::DAILY, &config.log_dir, "link-guard.log");

            let file_layer = subscriber_fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_writer(file_appender);

            layers.push(file_layer.boxed());
        }

        tracing_subscriber::registry()
            .with(env_filter)
            .with(layers)
            .try_init()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        debug!("Logging system initialized with config: {:?}", config);
        Ok(())
    }

    /// Thread-scoped subscriber that replaces the global one until dropped.
    pub struct LogLevelGuard {
        _guard: tracing::dispatcher::DefaultGuard,
        captured: Option<CapturedLogs>,
    }

    impl LogLevelGuard {
        /// Compact console output at `level`.
        pub fn set_level(level: &str) -> Self {
            let subscriber = tracing_subscriber::registry()
                .with(EnvFilter::new(level))
                .with(subscriber_fmt::layer().with_target(true).compact());

            LogLevelGuard {
                _guard: tracing::subscriber::set_default(subscriber),
                captured: None,
            }
        }

        /// Keeps events at `level` in memory instead of printing them, so the
        /// audit trail of a denial can be inspected.
        pub fn capture(level: &str) -> Self {
            let captured = CapturedLogs::default();
            let writer = captured.clone();
            let subscriber = tracing_subscriber::registry()
                .with(EnvFilter::new(level))
                .with(
                    subscriber_fmt::layer()
                        .with_ansi(false)
                        .with_writer(move || writer.clone()),
                );

            LogLevelGuard {
                _guard: tracing::subscriber::set_default(subscriber),
                captured: Some(captured),
            }
        }

        /// Text recorded so far. Always empty for [`LogLevelGuard::set_level`].
        pub fn captured(&self) -> String {
            self.captured
                .as_ref()
                .map(CapturedLogs::contents)
                .unwrap_or_default()
        }
    }

    #[derive(Clone, Default)]
    struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

    impl CapturedLogs {
        fn contents(&self) -> String {
            let buf = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&buf).into_owned()
        }
    }

    impl io::Write for CapturedLogs {
        fn write(&mut self, data: &[u8]) -> io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(data);
            Ok(data.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

}
