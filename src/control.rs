//! Cooperative pause and shutdown for a run in progress.
//!
//! Signals only flip flags here. The sync loop looks at them between rows,
//! so an in-flight copy always finishes before a pause or shutdown applies.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone, Default)]
pub struct RunControl {
    pause_requested: Arc<AtomicBool>,
    shutdown_requested: Arc<AtomicBool>,
}

impl RunControl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_pause(&self) {
        self.pause_requested.store(true, Ordering::SeqCst);
    }

    pub fn request_resume(&self) {
        self.pause_requested.store(false, Ordering::SeqCst);
    }

    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::SeqCst);
    }

    pub fn is_pause_requested(&self) -> bool {
        self.pause_requested.load(Ordering::SeqCst)
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::SeqCst)
    }
}

/// Map process signals onto `control` from a dedicated thread.
///
/// SIGUSR1 pauses, SIGUSR2 resumes, SIGTERM and SIGINT request shutdown.
/// Handlers are installed before this returns.
#[cfg(unix)]
pub fn listen_for_signals(control: RunControl) -> Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    let (mut pause, mut resume, mut terminate, mut interrupt) = {
        let _guard = runtime.enter();
        (
            signal(SignalKind::user_defined1()).context("Failed to install SIGUSR1 handler")?,
            signal(SignalKind::user_defined2()).context("Failed to install SIGUSR2 handler")?,
            signal(SignalKind::terminate()).context("Failed to install SIGTERM handler")?,
            signal(SignalKind::interrupt()).context("Failed to install SIGINT handler")?,
        )
    };

    std::thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                loop {
                    tokio::select! {
                        _ = pause.recv() => {
                            info!("Pause requested");
                            control.request_pause();
                        }
                        _ = resume.recv() => {
                            info!("Resume requested");
                            control.request_resume();
                        }
                        _ = terminate.recv() => {
                            info!("Received SIGTERM, stopping after the current file");
                            control.request_shutdown();
                        }
                        _ = interrupt.recv() => {
                            info!("Received SIGINT, stopping after the current file");
                            control.request_shutdown();
                        }
                    }
                }
            })
        })
        .context("Failed to spawn signal thread")?;

    Ok(())
}

#[cfg(not(unix))]
pub fn listen_for_signals(control: RunControl) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;

    std::thread::Builder::new()
        .name("signals".to_string())
        .spawn(move || {
            runtime.block_on(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Received Ctrl+C, stopping after the current file");
                    control.request_shutdown();
                }
            })
        })
        .context("Failed to spawn signal thread")?;

    Ok(())
}
