pub mod mysql;

#[cfg(test)]
pub mod memory;

use crate::model::attendance::{AttendanceSummary, NewAttendance};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::Serialize;
use strum_macros::AsRefStr;
use utoipa::ToSchema;

pub use mysql::MySqlAttendanceStore;

#[derive(Debug, Display)]
pub enum StoreError {
    #[display(fmt = "database error: {}", _0)]
    Database(sqlx::Error),
    #[display(fmt = "timed out waiting for the session lock of guard {:?}", _0)]
    LockTimeout(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Database(e)
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StoreError::Database(e) => Some(e),
            StoreError::LockTimeout(_) => None,
        }
    }
}

/// What an accepted upload did to the guard's attendance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, AsRefStr, ToSchema)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionAction {
    /// Opened a new session.
    CheckIn,
    /// Closed the guard's open session.
    CheckOut,
    /// Stored a standalone event; pairing is off.
    Recorded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTransition {
    pub id: u64,
    pub action: SessionAction,
}

impl SessionTransition {
    pub fn checked_in(id: u64) -> Self {
        Self {
            id,
            action: SessionAction::CheckIn,
        }
    }

    pub fn checked_out(id: u64) -> Self {
        Self {
            id,
            action: SessionAction::CheckOut,
        }
    }
}

#[async_trait]
pub trait AttendanceStore: Send + Sync {
    /// Insert an open row and return its id.
    async fn insert(&self, entry: &NewAttendance) -> Result<u64, StoreError>;

    /// Close the guard's open session at `entry.recorded_at`, or open one with
    /// `entry` when there is none. Atomic per guard.
    async fn check_in_or_out(&self, entry: &NewAttendance)
    -> Result<SessionTransition, StoreError>;

    /// Every row, oldest first, without photos.
    async fn list(&self) -> Result<Vec<AttendanceSummary>, StoreError>;

    async fn latest_start(&self) -> Result<Option<DateTime<Utc>>, StoreError>;

    async fn image(&self, id: u64) -> Result<Option<Vec<u8>>, StoreError>;
}
