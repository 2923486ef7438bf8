use anyhow::Result;
use std::path::PathBuf;
use tracing::{info, warn};

use album_mirror::config::Config;
use album_mirror::control::{listen_for_signals, RunControl};
use album_mirror::export::run_export;
use album_mirror::logging::{self, LogOutput};

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
                println!("album-mirror {}", env!("CARGO_PKG_VERSION"));
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
        r#"album-mirror - Export photo albums into a directory-per-album mirror

USAGE:
    album-mirror [OPTIONS]

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    ALBUM_MIRROR_CONFIG Path to config file (overrides default location)
    ALBUM_MIRROR_LOG    Log filter (trace, debug, info, warn, error)
    EXPORT_DIR, DB_HOST, DB_PORT, DB_NAME, DB_USER, DB_PASS,
    IMMICH_USER_ID, ASSETS_ROOT, MIN_FOUND_ABS, MIN_FOUND_FRACTION,
    HA_API_BASE, SUPERVISOR_TOKEN, HA_PUSH_INTERVAL_SEC,
    PARALLEL_COPIES, VERIFY_INTEGRITY, DB_CONNECT_RETRIES,
    DB_CONNECT_TIMEOUT_SEC
                        Override the matching config file settings

SIGNALS:
    SIGUSR1             Pause between files
    SIGUSR2             Resume
    SIGTERM, SIGINT     Stop after the current file; nothing is pruned

Config file location: $XDG_CONFIG_HOME/album-mirror/config.toml

See also: album-mirror-web --help"#
    );
}

fn main() -> Result<()> {
    let config_path = parse_args();
    let (config, missing) = Config::load(config_path.as_deref())?;

    logging::init(LogOutput::Exporter, config.web.log_dir.clone())?;
    if let Some(path) = missing {
        warn!("Config file not found at {:?}, using defaults", path);
    }
    info!(
        "album-mirror {} exporting to {}",
        env!("CARGO_PKG_VERSION"),
        config.export.dir.display()
    );

    let control = RunControl::new();
    if let Err(e) = listen_for_signals(control.clone()) {
        warn!("Signal handling unavailable, pause/resume disabled: {:#}", e);
    }

    let progress = run_export(&config, &control);
    info!("Final status: {}", progress.status.as_str());
    Ok(())
}
