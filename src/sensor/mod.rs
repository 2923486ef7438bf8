//! Relaying run progress to a home-automation hub as sensor entities.
//!
//! Each push cycle posts one state per entity. Relay problems are logged
//! and otherwise ignored: the hub being down must never affect a run.

pub mod throttle;

use anyhow::{anyhow, Result};
use serde_json::{json, Value};
use std::thread;
use std::time::Duration;
use tracing::warn;

use crate::config::SensorConfig;
use crate::progress::{RunProgress, Status};

pub use throttle::Throttle;

/// A sink accepting `{state, attributes}` per named entity.
pub trait SensorSink: Send + Sync {
    fn post_state(&self, entity_id: &str, state: &str, attributes: &Value) -> Result<()>;

    /// Get the sink name for logs
    fn sink_name(&self) -> &'static str;
}

/// Home Assistant REST API (`POST {api_base}/states/{entity_id}`).
pub struct HomeAssistantSink {
    agent: ureq::Agent,
    api_base: String,
    token: String,
    attempts: u32,
    retry_delay: Duration,
}

impl HomeAssistantSink {
    pub fn new(api_base: &str, token: &str) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_secs(5))
            .build();

        Self {
            agent,
            api_base: api_base.trim_end_matches('/').to_string(),
            token: token.to_string(),
            attempts: 2,
            retry_delay: Duration::from_millis(500),
        }
    }
}

impl SensorSink for HomeAssistantSink {
    fn post_state(&self, entity_id: &str, state: &str, attributes: &Value) -> Result<()> {
        let url = format!("{}/states/{}", self.api_base, entity_id);
        let body = json!({ "state": state, "attributes": attributes });

        let mut last_error = None;
        for attempt in 1..=self.attempts {
            let result = self
                .agent
                .post(&url)
                .set("Authorization", &format!("Bearer {}", self.token))
                .set("Content-Type", "application/json")
                .send_json(&body);

            match result {
                Ok(_) => return Ok(()),
                // The hub answered; asking again would get the same answer.
                Err(e @ ureq::Error::Status(..)) => {
                    last_error = Some(e);
                    break;
                }
                Err(e) => {
                    last_error = Some(e);
                    if attempt < self.attempts {
                        thread::sleep(self.retry_delay * attempt);
                    }
                }
            }
        }

        Err(anyhow!(
            "state push failed for {}: {}",
            entity_id,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))
    }

    fn sink_name(&self) -> &'static str {
        "Home Assistant"
    }
}

/// Used when no token is configured.
pub struct NullSink;

impl SensorSink for NullSink {
    fn post_state(&self, _entity_id: &str, _state: &str, _attributes: &Value) -> Result<()> {
        Ok(())
    }

    fn sink_name(&self) -> &'static str {
        "disabled"
    }
}

/// Pick the sink for this configuration.
pub fn create_sink(config: &SensorConfig) -> Box<dyn SensorSink> {
    match config.token.as_deref() {
        Some(token) if !token.is_empty() => Box::new(HomeAssistantSink::new(&config.api_base, token)),
        _ => Box::new(NullSink),
    }
}

/// One entity state to publish.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorUpdate {
    pub entity_id: &'static str,
    pub state: String,
    pub attributes: Value,
}

impl SensorUpdate {
    fn new(entity_id: &'static str, state: impl ToString, attributes: Value) -> Self {
        Self {
            entity_id,
            state: state.to_string(),
            attributes,
        }
    }
}

/// Home Assistant rejects states longer than this.
pub const MAX_STATE_CHARS: usize = 255;

fn state_text(text: &str) -> String {
    text.chars().take(MAX_STATE_CHARS).collect()
}

fn on_off(flag: bool) -> &'static str {
    if flag {
        "on"
    } else {
        "off"
    }
}

fn counter(icon: &str) -> Value {
    json!({
        "friendly_name": "Immich Backup",
        "unit_of_measurement": "files",
        "icon": icon,
    })
}

fn plain(icon: &str) -> Value {
    json!({ "friendly_name": "Immich Backup", "icon": icon })
}

/// Entities describing a progress snapshot.
pub fn sensor_updates(progress: &RunProgress) -> Vec<SensorUpdate> {
    vec![
        SensorUpdate::new(
            "sensor.immich_backup_status",
            progress.status.as_str(),
            plain("mdi:cloud-sync"),
        ),
        SensorUpdate::new(
            "binary_sensor.immich_backup_running",
            on_off(progress.status == Status::Running),
            json!({ "friendly_name": "Immich Backup Running" }),
        ),
        SensorUpdate::new("sensor.immich_backup_copied", progress.copied, counter("mdi:file-upload")),
        SensorUpdate::new(
            "sensor.immich_backup_skipped",
            progress.skipped,
            counter("mdi:file-cancel-outline"),
        ),
        SensorUpdate::new("sensor.immich_backup_failed", progress.failed, counter("mdi:alert-circle")),
        SensorUpdate::new(
            "sensor.immich_backup_deleted",
            progress.deleted,
            counter("mdi:trash-can-outline"),
        ),
        SensorUpdate::new("sensor.immich_backup_total", progress.total, counter("mdi:counter")),
        SensorUpdate::new(
            "sensor.immich_backup_last_run",
            state_text(&progress.last_run),
            plain("mdi:clock-outline"),
        ),
        SensorUpdate::new(
            "sensor.immich_backup_percent_copied",
            progress.percent(),
            json!({
                "friendly_name": "Immich Backup % Copied",
                "unit_of_measurement": "%",
                "icon": "mdi:progress-check",
            }),
        ),
        SensorUpdate::new(
            "sensor.immich_backup_guard",
            state_text(progress.guard.as_deref().unwrap_or("")),
            plain("mdi:shield-lock"),
        ),
        SensorUpdate::new(
            "sensor.immich_backup_error",
            state_text(progress.error.as_deref().unwrap_or("")),
            plain("mdi:alert"),
        ),
        SensorUpdate::new(
            "binary_sensor.immich_backup_paused",
            on_off(progress.paused),
            json!({ "friendly_name": "Immich Backup Paused" }),
        ),
        SensorUpdate::new(
            "sensor.immich_backup_files_per_second",
            progress.files_per_second,
            json!({
                "friendly_name": "Immich Backup Throughput",
                "unit_of_measurement": "files/s",
                "icon": "mdi:speedometer",
            }),
        ),
    ]
}

/// Push every entity. A failed entity is logged and the rest still go out.
pub fn push_all(sink: &dyn SensorSink, progress: &RunProgress) {
    for update in sensor_updates(progress) {
        if let Err(e) = sink.post_state(update.entity_id, &update.state, &update.attributes) {
            warn!("{} push failed for {}: {}", sink.sink_name(), update.entity_id, e);
        }
    }
}
