use super::{AttendanceStore, SessionTransition, StoreError};
use crate::model::attendance::{AttendanceRecord, AttendanceSummary, NewAttendance};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

/// In-process store for handler and recorder tests.
#[derive(Default)]
pub struct MemoryAttendanceStore {
    rows: Mutex<Vec<AttendanceRecord>>,
    failing: AtomicBool,
}

impl MemoryAttendanceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent call fails as if the database were gone.
    pub fn fail_all(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn rows(&self) -> Vec<AttendanceRecord> {
        self.rows.lock().unwrap().clone()
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::Database(sqlx::Error::PoolClosed));
        }
        Ok(())
    }

    fn push(rows: &mut Vec<AttendanceRecord>, entry: &NewAttendance) -> u64 {
        let id = rows.len() as u64 + 1;
        rows.push(AttendanceRecord {
            id,
            guard_name: entry.guard_name.clone(),
            image: entry.image.clone(),
            latitude: entry.latitude(),
            longitude: entry.longitude(),
            start_timestamp: entry.recorded_at,
            end_timestamp: None,
        });
        id
    }
}

#[async_trait]
impl AttendanceStore for MemoryAttendanceStore {
    async fn insert(&self, entry: &NewAttendance) -> Result<u64, StoreError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();
        Ok(Self::push(&mut rows, entry))
    }

    async fn check_in_or_out(
        &self,
        entry: &NewAttendance,
    ) -> Result<SessionTransition, StoreError> {
        self.check()?;
        let mut rows = self.rows.lock().unwrap();

        let open = rows
            .iter()
            .position(|row| row.guard_name == entry.guard_name && row.is_open());

        match open {
            Some(index) => {
                let row = &mut rows[index];
                row.end_timestamp = Some(entry.recorded_at);
                Ok(SessionTransition::checked_out(row.id))
            }
            None => Ok(SessionTransition::checked_in(Self::push(&mut rows, entry))),
        }
    }

    async fn list(&self) -> Result<Vec<AttendanceSummary>, StoreError> {
        self.check()?;
        Ok(self.rows.lock().unwrap().iter().map(AttendanceRecord::summary).collect())
    }

    async fn latest_start(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        self.check()?;
        Ok(self.rows.lock().unwrap().iter().map(|row| row.start_timestamp).max())
    }

    async fn image(&self, id: u64) -> Result<Option<Vec<u8>>, StoreError> {
        self.check()?;
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|row| row.id == id)
            .map(|row| row.image.clone()))
    }
}
