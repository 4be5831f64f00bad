use super::{AttendanceStore, SessionTransition, StoreError};
use crate::model::attendance::{AttendanceSummary, NewAttendance};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::pool::PoolConnection;
use sqlx::{Connection, MySql, MySqlConnection, MySqlPool};
use tracing::{debug, warn};

/// `guard_attendance` backed by MySQL.
///
/// Check-in/check-out for one guard is serialized with a named lock
/// (`GET_LOCK`) held on a single pooled connection for the whole
/// lookup-then-write, so at most one session per guard is ever open.
#[derive(Clone)]
pub struct MySqlAttendanceStore {
    pool: MySqlPool,
    lock_timeout_secs: u64,
}

impl MySqlAttendanceStore {
    pub fn new(pool: MySqlPool, lock_timeout_secs: u64) -> Self {
        Self {
            pool,
            lock_timeout_secs,
        }
    }
}

// SHA1 keeps the lock name under MySQL's 64 character limit for any guard name.
const ACQUIRE_GUARD_LOCK: &str = "SELECT GET_LOCK(CONCAT('guard_attendance:', SHA1(?)), ?)";
const RELEASE_GUARD_LOCK: &str = "SELECT RELEASE_LOCK(CONCAT('guard_attendance:', SHA1(?)))";

async fn insert_on(conn: &mut MySqlConnection, entry: &NewAttendance) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        INSERT INTO guard_attendance (guard_name, image, latitude, longitude, start_timestamp)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(entry.guard_name.as_str())
    .bind(entry.image.as_slice())
    .bind(entry.latitude())
    .bind(entry.longitude())
    .bind(entry.recorded_at)
    .execute(&mut *conn)
    .await?;

    Ok(result.last_insert_id())
}

async fn transition_locked(
    conn: &mut MySqlConnection,
    entry: &NewAttendance,
) -> Result<SessionTransition, sqlx::Error> {
    let mut tx = conn.begin().await?;

    let open_id: Option<u64> = sqlx::query_scalar(
        r#"
        SELECT id
        FROM guard_attendance
        WHERE guard_name = ?
        AND end_timestamp IS NULL
        ORDER BY id
        LIMIT 1
        FOR UPDATE
        "#,
    )
    .bind(entry.guard_name.as_str())
    .fetch_optional(&mut *tx)
    .await?;

    let transition = match open_id {
        Some(id) => {
            sqlx::query("UPDATE guard_attendance SET end_timestamp = ? WHERE id = ?")
                .bind(entry.recorded_at)
                .bind(id)
                .execute(&mut *tx)
                .await?;
            SessionTransition::checked_out(id)
        }
        None => SessionTransition::checked_in(insert_on(&mut tx, entry).await?),
    };

    tx.commit().await?;

    Ok(transition)
}

/// A pooled connection holding one guard's named lock.
///
/// Named locks belong to the MySQL session, not to a transaction. Unless
/// `release` succeeds, dropping the guard detaches and closes the connection
/// so the server ends the session and frees the lock. This also covers the
/// request future being dropped mid-flight.
struct GuardLock {
    conn: Option<PoolConnection<MySql>>,
    guard_name: String,
}

impl GuardLock {
    async fn acquire(
        pool: &MySqlPool,
        guard_name: &str,
        timeout_secs: u64,
    ) -> Result<Self, StoreError> {
        let mut lock = Self {
            conn: Some(pool.acquire().await?),
            guard_name: guard_name.to_owned(),
        };

        let acquired: Option<i64> = sqlx::query_scalar(ACQUIRE_GUARD_LOCK)
            .bind(guard_name)
            .bind(timeout_secs)
            .fetch_one(lock.conn()?)
            .await?;

        if acquired != Some(1) {
            // Nothing is held, the connection can go back to the pool.
            drop(lock.conn.take());
            return Err(StoreError::LockTimeout(guard_name.to_owned()));
        }
        debug!(guard_name, "Guard lock acquired");

        Ok(lock)
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection, StoreError> {
        self.conn
            .as_deref_mut()
            .ok_or(StoreError::Database(sqlx::Error::PoolClosed))
    }

    async fn release(mut self) {
        let guard_name = self.guard_name.clone();
        let released = match self.conn() {
            Ok(conn) => sqlx::query(RELEASE_GUARD_LOCK)
                .bind(guard_name.as_str())
                .execute(conn)
                .await
                .map(|_| ()),
            Err(_) => return,
        };

        match released {
            // Back to the pool with the lock freed.
            Ok(()) => drop(self.conn.take()),
            Err(e) => warn!(error = %e, guard_name = %guard_name, "Guard lock release failed"),
        }
    }
}

impl Drop for GuardLock {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            warn!(guard_name = %self.guard_name, "Guard lock may still be held, closing connection");
            drop(conn.detach());
        }
    }
}

#[async_trait]
impl AttendanceStore for MySqlAttendanceStore {
    async fn insert(&self, entry: &NewAttendance) -> Result<u64, StoreError> {
        let mut conn = self.pool.acquire().await?;
        Ok(insert_on(&mut conn, entry).await?)
    }

    async fn check_in_or_out(
        &self,
        entry: &NewAttendance,
    ) -> Result<SessionTransition, StoreError> {
        let mut lock =
            GuardLock::acquire(&self.pool, &entry.guard_name, self.lock_timeout_secs).await?;

        let result = transition_locked(lock.conn()?, entry).await;
        lock.release().await;

        Ok(result?)
    }

    async fn list(&self) -> Result<Vec<AttendanceSummary>, StoreError> {
        let records = sqlx::query_as::<_, AttendanceSummary>(
            r#"
            SELECT id, guard_name, latitude, longitude, start_timestamp, end_timestamp
            FROM guard_attendance
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn latest_start(&self) -> Result<Option<DateTime<Utc>>, StoreError> {
        let latest = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(start_timestamp) FROM guard_attendance",
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(latest)
    }

    async fn image(&self, id: u64) -> Result<Option<Vec<u8>>, StoreError> {
        let image = sqlx::query_scalar::<_, Vec<u8>>("SELECT image FROM guard_attendance WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(image)
    }
}
