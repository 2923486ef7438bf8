//! Status server for album-mirror.
//!
//! Serves a dashboard plus JSON endpoints over the progress file, tails
//! the run log, and starts the `album-mirror` exporter on request.
//!
//! ## Usage
//!
//! ```bash
//! album-mirror-web                    # Listen on WEB_BIND (default 0.0.0.0:5000)
//! album-mirror-web --config my.toml   # Same config file the exporter should use
//! ```

use anyhow::Result;
use std::path::PathBuf;
use tracing::{info, warn};

use album_mirror::config::Config;
use album_mirror::logging::{self, LogOutput};
use album_mirror::web;

fn parse_args() -> Option<PathBuf> {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("album-mirror-web {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            _ => {
                eprintln!("Unknown argument: {}", args[i]);
                print_help();
                std::process::exit(1);
            }
        }
        i += 1;
    }

    config_path
}

fn print_help() {
    println!(
        r#"album-mirror-web - Status dashboard and run trigger for album-mirror

USAGE:
    album-mirror-web [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file (also passed to started runs)
    --version, -V       Show version
    --help, -h          Show this help message

ENDPOINTS:
    GET  /              Dashboard
    GET  /status        Run lock state and progress
    GET  /progress      Raw progress
    GET  /log?tail=N    Last N lines of the run log (default 200)
    POST /run-now       Start the exporter unless one is running

ENVIRONMENT:
    ALBUM_MIRROR_CONFIG Path to config file (overrides default location)
    ALBUM_MIRROR_LOG    Log filter (trace, debug, info, warn, error)
    WEB_BIND            Listen address (default 0.0.0.0:5000)
    LOCK_FILE, RUN_LOG, LOG_DIR, EXPORTER_BIN

See also: album-mirror --help"#
    );
}

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = parse_args();
    let (config, missing) = Config::load(config_path.as_deref())?;

    logging::init(LogOutput::Service, config.web.log_dir.clone())?;
    if let Some(path) = missing {
        warn!("Config file not found at {:?}, using defaults", path);
    }
    info!("album-mirror-web {} starting", env!("CARGO_PKG_VERSION"));

    web::serve(config, config_path).await
}
