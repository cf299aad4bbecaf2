use chrono::NaiveDate;
use rusqlite::Connection;

use crate::clock::Clock;
use crate::config::EngineSettings;
use crate::db;
use crate::error::EngineResult;

/// Everything a core operation needs: the workspace connection, the injected
/// clock and the workspace's engine settings.
pub struct EngineContext<'a> {
    pub conn: &'a Connection,
    pub clock: &'a dyn Clock,
    pub settings: &'a EngineSettings,
}

impl<'a> EngineContext<'a> {
    pub fn new(conn: &'a Connection, clock: &'a dyn Clock, settings: &'a EngineSettings) -> Self {
        Self {
            conn,
            clock,
            settings,
        }
    }

    pub fn today(&self) -> NaiveDate {
        self.clock.today()
    }

    pub fn decimals(&self) -> u32 {
        self.settings.aggregates.decimals
    }

    /// Atomic write; see [`db::with_tx`].
    pub fn write<T, F>(&self, op: F) -> EngineResult<T>
    where
        F: FnMut(&Connection) -> EngineResult<T>,
    {
        db::with_tx(self.conn, self.settings.store.busy_retries, op)
    }
}
