use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the progress snapshot written inside the export directory.
pub const PROGRESS_FILE_NAME: &str = "progress.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub export: ExportConfig,

    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub assets: AssetsConfig,

    #[serde(default)]
    pub guard: GuardConfig,

    #[serde(default)]
    pub sensor: SensorConfig,

    #[serde(default)]
    pub copy: CopyConfig,

    #[serde(default)]
    pub web: WebConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_export_dir")]
    pub dir: PathBuf,
}

fn default_export_dir() -> PathBuf {
    PathBuf::from("/mnt/album_export")
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            dir: default_export_dir(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_host")]
    pub host: String,

    #[serde(default = "default_db_port")]
    pub port: u16,

    #[serde(default = "default_db_name")]
    pub name: String,

    #[serde(default = "default_db_user")]
    pub user: String,

    #[serde(default = "default_db_password")]
    pub password: String,

    /// Only export albums owned by this user, when the album table has an owner column.
    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,

    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_name() -> String {
    "immich".to_string()
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_password() -> String {
    "password".to_string()
}

fn default_connect_retries() -> u32 {
    3
}

fn default_connect_timeout_secs() -> u64 {
    10
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: default_db_host(),
            port: default_db_port(),
            name: default_db_name(),
            user: default_db_user(),
            password: default_db_password(),
            user_id: None,
            connect_retries: default_connect_retries(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AssetsConfig {
    /// Local mount of the photo library's upload directory (e.g. "/media/immich_assets").
    #[serde(default)]
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardConfig {
    /// Deletion stays enabled once at least this many sources were found.
    #[serde(default = "default_min_found_abs")]
    pub min_found_abs: usize,

    /// ...or once at least this fraction of all rows was found.
    #[serde(default = "default_min_found_fraction")]
    pub min_found_fraction: f64,
}

fn default_min_found_abs() -> usize {
    100
}

fn default_min_found_fraction() -> f64 {
    0.05
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            min_found_abs: default_min_found_abs(),
            min_found_fraction: default_min_found_fraction(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorConfig {
    #[serde(default = "default_sensor_api_base")]
    pub api_base: String,

    /// Bearer token; pushes are disabled without one.
    #[serde(default)]
    pub token: Option<String>,

    #[serde(default = "default_push_interval_secs")]
    pub push_interval_secs: u64,
}

fn default_sensor_api_base() -> String {
    "http://supervisor/core/api".to_string()
}

fn default_push_interval_secs() -> u64 {
    60
}

impl Default for SensorConfig {
    fn default() -> Self {
        Self {
            api_base: default_sensor_api_base(),
            token: None,
            push_interval_secs: default_push_interval_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyConfig {
    /// Accepted for compatibility; copies always run one at a time.
    #[serde(default = "default_parallel_copies")]
    pub parallel_copies: usize,

    /// Compare SHA-256 of source and destination after each copy.
    #[serde(default)]
    pub verify_integrity: bool,
}

fn default_parallel_copies() -> usize {
    1
}

impl Default for CopyConfig {
    fn default() -> Self {
        Self {
            parallel_copies: default_parallel_copies(),
            verify_integrity: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebConfig {
    #[serde(default = "default_bind")]
    pub bind: String,

    #[serde(default = "default_lock_file")]
    pub lock_file: PathBuf,

    #[serde(default = "default_run_log")]
    pub run_log: PathBuf,

    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,

    /// Exporter executable; defaults to `album-mirror` next to the running binary.
    #[serde(default)]
    pub exporter_bin: Option<PathBuf>,
}

fn default_bind() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_lock_file() -> PathBuf {
    std::env::temp_dir().join("album_mirror.lock")
}

fn default_run_log() -> PathBuf {
    std::env::temp_dir().join("album_mirror_run.log")
}

fn default_log_dir() -> PathBuf {
    std::env::temp_dir().join("album_mirror_logs")
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            lock_file: default_lock_file(),
            run_log: default_run_log(),
            log_dir: default_log_dir(),
            exporter_bin: None,
        }
    }
}

impl Config {
    /// Load defaults, then the TOML file (if any), then environment overrides.
    ///
    /// Runs before logging is up, so a missing config file is handed back
    /// for the caller to report once it can.
    pub fn load(path: Option<&Path>) -> Result<(Self, Option<PathBuf>)> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::config_path);

        let mut missing = None;
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config file {}", path.display()))?;
            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config file {}", path.display()))?
        } else {
            missing = Some(path);
            Config::default()
        };

        config.apply_env(|name| std::env::var(name).ok());
        Ok((config, missing))
    }

    fn config_path() -> PathBuf {
        if let Ok(path) = std::env::var("ALBUM_MIRROR_CONFIG") {
            return PathBuf::from(path);
        }

        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("album-mirror")
            .join("config.toml")
    }

    /// Apply environment overrides. `lookup` is injectable so tests don't touch the process env.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| is_set(v));

        if let Some(v) = get("EXPORT_DIR") {
            self.export.dir = PathBuf::from(v);
        }

        if let Some(v) = get("DB_HOST") {
            self.database.host = v;
        }
        parse_into(get("DB_PORT"), &mut self.database.port);
        if let Some(v) = get("DB_NAME") {
            self.database.name = v;
        }
        if let Some(v) = get("DB_USER") {
            self.database.user = v;
        }
        if let Some(v) = get("DB_PASS") {
            self.database.password = v;
        }
        if let Some(v) = get("IMMICH_USER_ID") {
            self.database.user_id = Some(v);
        }
        parse_into(get("DB_CONNECT_RETRIES"), &mut self.database.connect_retries);
        parse_into(get("DB_CONNECT_TIMEOUT_SEC"), &mut self.database.connect_timeout_secs);

        if let Some(v) = get("ASSETS_ROOT") {
            self.assets.root = Some(PathBuf::from(v));
        }

        parse_into(get("MIN_FOUND_ABS"), &mut self.guard.min_found_abs);
        parse_into(get("MIN_FOUND_FRACTION"), &mut self.guard.min_found_fraction);

        if let Some(v) = get("HA_API_BASE") {
            self.sensor.api_base = v;
        }
        if let Some(v) = get("SUPERVISOR_TOKEN") {
            self.sensor.token = Some(v);
        }
        parse_into(get("HA_PUSH_INTERVAL_SEC"), &mut self.sensor.push_interval_secs);

        parse_into(get("PARALLEL_COPIES"), &mut self.copy.parallel_copies);
        if let Some(v) = get("VERIFY_INTEGRITY") {
            self.copy.verify_integrity = matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on");
        }

        if let Some(v) = get("WEB_BIND") {
            self.web.bind = v;
        }
        if let Some(v) = get("LOCK_FILE") {
            self.web.lock_file = PathBuf::from(v);
        }
        if let Some(v) = get("RUN_LOG") {
            self.web.run_log = PathBuf::from(v);
        }
        if let Some(v) = get("LOG_DIR") {
            self.web.log_dir = PathBuf::from(v);
        }
        if let Some(v) = get("EXPORTER_BIN") {
            self.web.exporter_bin = Some(PathBuf::from(v));
        }
    }

    pub fn progress_path(&self) -> PathBuf {
        self.export.dir.join(PROGRESS_FILE_NAME)
    }
}

/// Add-on option UIs hand us literal "null"/"None" for unset fields.
fn is_set(value: &str) -> bool {
    !(value.is_empty() || value.eq_ignore_ascii_case("null") || value == "None")
}

/// Unparsable values keep the current setting.
fn parse_into<T: std::str::FromStr>(value: Option<String>, target: &mut T) {
    if let Some(parsed) = value.and_then(|v| v.trim().parse().ok()) {
        *target = parsed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.export.dir, PathBuf::from("/mnt/album_export"));
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.guard.min_found_abs, 100);
        assert!((config.guard.min_found_fraction - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.sensor.push_interval_secs, 60);
        assert!(config.assets.root.is_none());
        assert_eq!(
            config.progress_path(),
            PathBuf::from("/mnt/album_export/progress.json")
        );
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("EXPORT_DIR", "/data/export"),
            ("DB_PORT", "6543"),
            ("IMMICH_USER_ID", "abc-123"),
            ("ASSETS_ROOT", "/media/lib"),
            ("MIN_FOUND_FRACTION", "0.25"),
            ("VERIFY_INTEGRITY", "true"),
        ]));

        assert_eq!(config.export.dir, PathBuf::from("/data/export"));
        assert_eq!(config.database.port, 6543);
        assert_eq!(config.database.user_id.as_deref(), Some("abc-123"));
        assert_eq!(config.assets.root, Some(PathBuf::from("/media/lib")));
        assert!((config.guard.min_found_fraction - 0.25).abs() < f64::EPSILON);
        assert!(config.copy.verify_integrity);
    }

    #[test]
    fn test_null_and_garbage_values_are_ignored() {
        let mut config = Config::default();
        config.apply_env(env(&[
            ("IMMICH_USER_ID", "null"),
            ("ASSETS_ROOT", ""),
            ("DB_PORT", "not-a-port"),
            ("MIN_FOUND_ABS", "None"),
        ]));

        assert!(config.database.user_id.is_none());
        assert!(config.assets.root.is_none());
        assert_eq!(config.database.port, 5432);
        assert_eq!(config.guard.min_found_abs, 100);
    }

    #[test]
    fn test_toml_sections_fill_defaults() {
        let config: Config = toml::from_str(
            r#"
            [export]
            dir = "/srv/mirror"

            [guard]
            min_found_abs = 10
            "#,
        )
        .unwrap();

        assert_eq!(config.export.dir, PathBuf::from("/srv/mirror"));
        assert_eq!(config.guard.min_found_abs, 10);
        assert!((config.guard.min_found_fraction - 0.05).abs() < f64::EPSILON);
        assert_eq!(config.database.name, "immich");
    }

    #[test]
    fn test_missing_config_file_is_reported_to_caller() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.toml");

        let (config, missing) = Config::load(Some(&path)).unwrap();

        assert_eq!(missing, Some(path));
        assert_eq!(config.database.port, Config::default().database.port);
    }

    #[test]
    fn test_present_config_file_is_not_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[sensor]\npush_interval_secs = 15\n").unwrap();

        let (config, missing) = Config::load(Some(&path)).unwrap();

        assert!(missing.is_none());
        assert_eq!(config.sensor.push_interval_secs, 15);
    }
}
