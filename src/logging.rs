//! Logging configuration with journald support on Linux.
//!
//! The status server logs like any other service: systemd's journal on
//! Linux, a rolling file otherwise. The exporter writes human-readable
//! lines to stderr, which the status server captures into the run log,
//! and keeps a debug file alongside.

use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Where log output should go.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogOutput {
    /// Long-running status server.
    Service,
    /// One export run, usually launched by the status server.
    Exporter,
}

/// Initialize the logging system.
///
/// Log level can be controlled via the `ALBUM_MIRROR_LOG` environment variable
/// using `EnvFilter` syntax, e.g. `ALBUM_MIRROR_LOG=debug` or
/// `ALBUM_MIRROR_LOG=album_mirror::sync=trace`. Defaults to `info`.
pub fn init(output: LogOutput, log_dir: PathBuf) -> Result<()> {
    let env_filter = EnvFilter::try_from_env("ALBUM_MIRROR_LOG")
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match output {
        LogOutput::Service => init_service(env_filter, log_dir),
        LogOutput::Exporter => init_exporter(env_filter, log_dir),
    }
}

fn init_service(env_filter: EnvFilter, log_dir: PathBuf) -> Result<()> {
    #[cfg(target_os = "linux")]
    {
        // Try to use journald on Linux
        if let Ok(journald_layer) = tracing_journald::layer() {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(journald_layer)
                .init();

            tracing::info!("Logging initialized with journald backend");
            return Ok(());
        }
    }

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "album-mirror-web.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    keep_guard(guard);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    tracing::info!("Logging initialized with file backend at {:?}", log_dir);
    Ok(())
}

fn init_exporter(env_filter: EnvFilter, log_dir: PathBuf) -> Result<()> {
    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);

    // The debug file is best-effort; a read-only temp dir must not stop a run.
    if std::fs::create_dir_all(&log_dir).is_ok() {
        let file_appender = tracing_appender::rolling::daily(&log_dir, "album-mirror-debug.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        keep_guard(guard);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(stderr_layer)
            .init();
    }

    Ok(())
}

/// The worker guard flushes on drop, so it has to live for the whole process.
fn keep_guard(guard: tracing_appender::non_blocking::WorkerGuard) {
    static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
        std::sync::OnceLock::new();
    let _ = GUARD.set(guard);
}
