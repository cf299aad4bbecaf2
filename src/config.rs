//! Process configuration (environment) and per-workspace engine settings.

use anyhow::Context;
use chrono::NaiveDate;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

use crate::db;

pub const ENV_LOG: &str = "TRAININGD_LOG";
pub const ENV_WORKSPACE: &str = "TRAININGD_WORKSPACE";
pub const ENV_TODAY: &str = "TRAININGD_TODAY";

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub log_filter: String,
    pub workspace: Option<PathBuf>,
    pub today: Option<NaiveDate>,
}

impl DaemonConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let log_filter = std::env::var(ENV_LOG)
            .or_else(|_| std::env::var("RUST_LOG"))
            .unwrap_or_else(|_| "info".to_string());
        let workspace = std::env::var_os(ENV_WORKSPACE).map(PathBuf::from);
        let today = match std::env::var(ENV_TODAY) {
            Ok(raw) => Some(
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                    .with_context(|| format!("{} must be YYYY-MM-DD, got {:?}", ENV_TODAY, raw))?,
            ),
            Err(_) => None,
        };
        Ok(Self {
            log_filter,
            workspace,
            today,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsSection {
    Store,
    Aggregates,
}

impl SettingsSection {
    pub const ALL: [SettingsSection; 2] = [Self::Store, Self::Aggregates];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "store" => Some(Self::Store),
            "aggregates" => Some(Self::Aggregates),
            _ => None,
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Self::Store => "setup.store",
            Self::Aggregates => "setup.aggregates",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Store => "store",
            Self::Aggregates => "aggregates",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct StoreSettings {
    pub busy_retries: u32,
    pub busy_timeout_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            busy_retries: 3,
            busy_timeout_ms: 5000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AggregateSettings {
    pub decimals: u32,
}

impl Default for AggregateSettings {
    fn default() -> Self {
        Self { decimals: 2 }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineSettings {
    pub store: StoreSettings,
    pub aggregates: AggregateSettings,
}

fn default_section(section: SettingsSection) -> Value {
    let v = match section {
        SettingsSection::Store => serde_json::to_value(StoreSettings::default()),
        SettingsSection::Aggregates => serde_json::to_value(AggregateSettings::default()),
    };
    v.unwrap_or(Value::Null)
}

pub fn merge_section_patch(
    section: SettingsSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let Some(obj) = current.as_object_mut() else {
        return Err("section is not an object".to_string());
    };
    for (k, v) in patch {
        match (section, k.as_str()) {
            (SettingsSection::Store, "busyRetries") => {
                let n = v.as_u64().filter(|n| *n <= 10).ok_or("busyRetries must be 0..=10")?;
                obj.insert(k.clone(), Value::from(n));
            }
            (SettingsSection::Store, "busyTimeoutMs") => {
                let n = v
                    .as_u64()
                    .filter(|n| *n <= 60_000)
                    .ok_or("busyTimeoutMs must be 0..=60000")?;
                obj.insert(k.clone(), Value::from(n));
            }
            (SettingsSection::Aggregates, "decimals") => {
                let n = v.as_u64().filter(|n| *n <= 4).ok_or("decimals must be 0..=4")?;
                obj.insert(k.clone(), Value::from(n));
            }
            _ => return Err(format!("unknown {} field: {}", section.name(), k)),
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: SettingsSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        // A malformed stored section falls back to defaults as a whole.
        let mut merged = current.clone();
        let outcome = match saved.as_object() {
            Some(saved_obj) => merge_section_patch(section, &mut merged, saved_obj),
            None => Err("stored value is not an object".to_string()),
        };
        match outcome {
            Ok(()) => current = merged,
            Err(reason) => {
                warn!(section = section.name(), %reason, "ignoring saved settings section");
            }
        }
    }
    Ok(current)
}

pub fn load_engine_settings(conn: &Connection) -> anyhow::Result<EngineSettings> {
    let store = serde_json::from_value(load_section(conn, SettingsSection::Store)?)
        .context("decode store settings")?;
    let aggregates = serde_json::from_value(load_section(conn, SettingsSection::Aggregates)?)
        .context("decode aggregates settings")?;
    Ok(EngineSettings { store, aggregates })
}

pub fn apply_connection_settings(conn: &Connection, settings: &EngineSettings) -> anyhow::Result<()> {
    conn.busy_timeout(Duration::from_millis(settings.store.busy_timeout_ms))?;
    Ok(())
}
