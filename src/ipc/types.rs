use chrono::NaiveDate;
use std::path::PathBuf;

use rusqlite::Connection;
use serde::Deserialize;

use crate::clock::{Clock, FixedClock, SystemClock};
use crate::config::EngineSettings;

#[derive(Debug, Deserialize, Clone)]
pub struct Request {
    pub id: String,
    pub method: String,
    #[serde(default)]
    pub params: serde_json::Value,
}

pub struct AppState {
    pub workspace: Option<PathBuf>,
    pub db: Option<Connection>,
    pub clock: Box<dyn Clock>,
    pub settings: EngineSettings,
    /// Date pinned from the environment; a `workspace.select {today}` wins over it.
    pub default_today: Option<NaiveDate>,
}

impl AppState {
    pub fn new(default_today: Option<NaiveDate>) -> Self {
        Self {
            workspace: None,
            db: None,
            clock: clock_for(default_today),
            settings: EngineSettings::default(),
            default_today,
        }
    }
}

pub fn clock_for(today: Option<NaiveDate>) -> Box<dyn Clock> {
    match today {
        Some(d) => Box::new(FixedClock(d)),
        None => Box::new(SystemClock),
    }
}
