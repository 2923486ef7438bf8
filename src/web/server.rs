use anyhow::{Context, Result};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::lock::RunLock;
use super::logs;
use crate::config::Config;
use crate::progress::{now_stamp, FileProgressStore, ProgressStore};

const DEFAULT_TAIL: usize = 200;
const EXPORTER_NAME: &str = "album-mirror";

pub struct AppState {
    config: Config,
    config_path: Option<PathBuf>,
    progress: Arc<FileProgressStore>,
    lock: RunLock,
    /// Serializes check-then-launch so two requests cannot both start a run.
    launching: Mutex<()>,
}

impl AppState {
    pub fn new(config: Config, config_path: Option<PathBuf>) -> Self {
        let progress = Arc::new(FileProgressStore::new(config.progress_path()));
        let lock = RunLock::new(&config.web.lock_file);
        Self {
            config,
            config_path,
            progress,
            lock,
            launching: Mutex::new(()),
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/status", get(status))
        .route("/progress", get(progress))
        .route("/log", get(log))
        .route("/run-now", get(run_now).post(run_now))
        .route("/run-now/", get(run_now).post(run_now))
        .with_state(state)
}

/// Serve until Ctrl+C or SIGTERM.
pub async fn serve(config: Config, config_path: Option<PathBuf>) -> Result<()> {
    let bind = config.web.bind.clone();
    let state = Arc::new(AppState::new(config, config_path));
    let app = router(state);

    let listener = TcpListener::bind(&bind)
        .await
        .with_context(|| format!("Failed to bind {}", bind))?;
    info!("Status server listening on {}", bind);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Status server failed")?;

    info!("Status server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}

async fn index() -> Html<&'static str> {
    Html(DASHBOARD)
}

async fn status(State(state): State<Arc<AppState>>) -> Response {
    let worker = state.clone();
    let result = tokio::task::spawn_blocking(move || {
        let pid = worker.lock.active_pid();
        (pid, worker.progress.snapshot())
    })
    .await;

    match result {
        Ok((pid, progress)) => Json(json!({
            "running": pid.is_some(),
            "pid": pid,
            "export_dir": state.config.export.dir,
            "progress": progress,
        }))
        .into_response(),
        Err(e) => internal_error(e),
    }
}

async fn progress(State(state): State<Arc<AppState>>) -> Response {
    match tokio::task::spawn_blocking(move || state.progress.snapshot()).await {
        Ok(progress) => Json(progress).into_response(),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct LogQuery {
    tail: Option<usize>,
}

async fn log(State(state): State<Arc<AppState>>, Query(query): Query<LogQuery>) -> Response {
    let n = query.tail.unwrap_or(DEFAULT_TAIL);
    let path = state.config.web.run_log.clone();
    match tokio::task::spawn_blocking(move || logs::tail(&path, n)).await {
        Ok(text) => text.into_response(),
        Err(e) => internal_error(e),
    }
}

async fn run_now(State(state): State<Arc<AppState>>) -> Response {
    let _launching = state.launching.lock().await;

    let worker = state.clone();
    let active = match tokio::task::spawn_blocking(move || worker.lock.active_pid()).await {
        Ok(active) => active,
        Err(e) => return internal_error(e),
    };

    if let Some(pid) = active {
        info!("Run requested but exporter {} is still running", pid);
        return (
            StatusCode::CONFLICT,
            Json(json!({ "status": "already_running", "pid": pid })),
        )
            .into_response();
    }

    match launch(&state).await {
        Ok(pid) => Json(json!({ "status": "started", "pid": pid })).into_response(),
        Err(e) => {
            error!("Failed to start exporter: {:#}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "status": "error", "error": format!("{:#}", e) })),
            )
                .into_response()
        }
    }
}

/// Start the exporter in the background with its output in the run log.
async fn launch(state: &Arc<AppState>) -> Result<u32> {
    let exporter = exporter_path(&state.config)?;

    let run_log = state.config.web.run_log.clone();
    let header = exporter.clone();
    let (stdout, stderr) =
        tokio::task::spawn_blocking(move || open_run_log(&run_log, &header)).await??;

    let mut command = Command::new(&exporter);
    if let Some(path) = &state.config_path {
        command.arg("--config").arg(path);
    }
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .stderr(Stdio::from(stderr))
        .spawn()
        .with_context(|| format!("Failed to spawn {}", exporter.display()))?;

    let pid = child
        .id()
        .context("Exporter exited before its PID could be recorded")?;
    let lock = state.lock.clone();
    match tokio::task::spawn_blocking(move || lock.acquire(pid)).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => warn!("Exporter {} started without a lock file: {:#}", pid, e),
        Err(e) => warn!("Exporter {} started without a lock file: {}", pid, e),
    }
    info!("Started exporter {} (pid {})", exporter.display(), pid);

    let lock = state.lock.clone();
    tokio::spawn(async move {
        match child.wait().await {
            Ok(exit) => info!("Exporter {} finished: {}", pid, exit),
            Err(e) => warn!("Failed to wait for exporter {}: {}", pid, e),
        }
        if let Err(e) = tokio::task::spawn_blocking(move || lock.release(pid)).await {
            warn!("Failed to release lock for {}: {}", pid, e);
        }
    });

    Ok(pid)
}

/// Truncate the run log, write a header, and hand back stdout/stderr handles.
fn open_run_log(run_log: &Path, exporter: &Path) -> Result<(File, File)> {
    if let Some(parent) = run_log.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut stdout = File::create(run_log)
        .with_context(|| format!("Failed to open run log {}", run_log.display()))?;
    writeln!(stdout, "=== Run started {} ({}) ===", now_stamp(), exporter.display())?;
    let stderr = stdout.try_clone()?;
    Ok((stdout, stderr))
}

fn exporter_path(config: &Config) -> Result<PathBuf> {
    if let Some(bin) = &config.web.exporter_bin {
        return Ok(bin.clone());
    }

    let current = std::env::current_exe().context("Cannot locate the running binary")?;
    let name = format!("{}{}", EXPORTER_NAME, std::env::consts::EXE_SUFFIX);
    Ok(current.with_file_name(name))
}

fn internal_error(e: tokio::task::JoinError) -> Response {
    error!("Request task failed: {}", e);
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

const DASHBOARD: &str = r#"<!doctype html>
<html>
<head>
<meta charset="utf-8">
<title>Album Mirror</title>
<style>
  body { font-family: sans-serif; margin: 2em; max-width: 60em; }
  .bar { background: #ddd; height: 1.2em; border-radius: 4px; overflow: hidden; }
  .fill { background: #4a90d9; height: 100%; width: 0; }
  pre { background: #f4f4f4; padding: 1em; max-height: 30em; overflow: auto; }
  .guard { color: #b36b00; }
  .error { color: #c00; }
</style>
</head>
<body>
<h1>Album Mirror</h1>
<p>Status: <b id="status">loading</b> <span id="pid"></span></p>
<div class="bar"><div class="fill" id="fill"></div></div>
<p id="counts"></p>
<p id="current"></p>
<p class="guard" id="guard"></p>
<p class="error" id="error"></p>
<button id="run">Run now</button> <span id="run-result"></span>
<h2>Run log</h2>
<pre id="log">Loading...</pre>
<script>
function text(id, value) { document.getElementById(id).textContent = value || ''; }

async function refresh() {
  try {
    const s = await (await fetch('status')).json();
    const p = s.progress;
    const processed = p.copied + p.skipped + p.failed;
    const pct = p.total ? (100 * processed / p.total) : 0;
    text('status', p.paused ? p.status + ' (paused)' : p.status);
    text('pid', s.running ? 'pid ' + s.pid : '');
    document.getElementById('fill').style.width = pct.toFixed(1) + '%';
    text('counts', `${processed}/${p.total} processed: copied ${p.copied}, skipped ${p.skipped}, ` +
      `failed ${p.failed}, deleted ${p.deleted}` +
      (p.files_per_second ? `, ${p.files_per_second} files/s` : '') +
      (p.estimated_remaining ? `, ${p.estimated_remaining} left` : ''));
    text('current', p.current_file ? `${p.current_album}: ${p.current_file}` : `Last update ${p.last_run}`);
    text('guard', p.guard ? 'Deletion skipped: ' + p.guard : '');
    text('error', p.error);
    document.getElementById('run').disabled = s.running;
  } catch (e) {
    text('status', 'unreachable');
  }
  try {
    text('log', await (await fetch('log?tail=200')).text());
  } catch (e) {}
}

document.getElementById('run').onclick = async () => {
  const r = await (await fetch('run-now', { method: 'POST' })).json();
  text('run-result', r.status === 'started' ? 'Started (pid ' + r.pid + ')' :
    r.status === 'already_running' ? 'Already running (pid ' + r.pid + ')' : r.error);
  refresh();
};

setInterval(refresh, 5000);
refresh();
</script>
</body>
</html>
"#;
