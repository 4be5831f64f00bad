use crate::location::Coordinates;
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;

/// One row of `guard_attendance`, photo included.
#[cfg(test)]
#[derive(Debug, Clone)]
pub struct AttendanceRecord {
    pub id: u64,
    pub guard_name: String,
    pub image: Vec<u8>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub start_timestamp: DateTime<Utc>,
    pub end_timestamp: Option<DateTime<Utc>>,
}

#[cfg(test)]
impl AttendanceRecord {
    pub fn is_open(&self) -> bool {
        self.end_timestamp.is_none()
    }

    pub fn summary(&self) -> AttendanceSummary {
        AttendanceSummary {
            id: self.id,
            guard_name: self.guard_name.clone(),
            latitude: self.latitude,
            longitude: self.longitude,
            start_timestamp: self.start_timestamp,
            end_timestamp: self.end_timestamp,
        }
    }
}

/// Listing row; the photo is fetched separately through `/image/{id}`.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow, ToSchema)]
#[schema(example = json!({
    "id": 1,
    "guard_name": "Ravi",
    "latitude": 13.0827,
    "longitude": 80.2707,
    "start_timestamp": "2026-01-01T08:00:00Z",
    "end_timestamp": "2026-01-01T20:00:00Z"
}))]
pub struct AttendanceSummary {
    #[schema(example = 1)]
    pub id: u64,
    #[schema(example = "Ravi")]
    pub guard_name: String,
    #[schema(example = 13.0827, nullable = true)]
    pub latitude: Option<f64>,
    #[schema(example = 80.2707, nullable = true)]
    pub longitude: Option<f64>,
    #[schema(example = "2026-01-01T08:00:00Z", format = "date-time", value_type = String)]
    pub start_timestamp: DateTime<Utc>,
    #[schema(example = "2026-01-01T20:00:00Z", format = "date-time", value_type = Option<String>, nullable = true)]
    pub end_timestamp: Option<DateTime<Utc>>,
}

impl AttendanceSummary {
    pub fn image_url(&self) -> String {
        format!("/image/{}", self.id)
    }
}

/// An accepted upload waiting to be written.
#[derive(Debug, Clone)]
pub struct NewAttendance {
    pub guard_name: String,
    pub image: Vec<u8>,
    pub coordinates: Option<Coordinates>,
    pub recorded_at: DateTime<Utc>,
}

impl NewAttendance {
    pub fn latitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c.latitude)
    }

    pub fn longitude(&self) -> Option<f64> {
        self.coordinates.map(|c| c.longitude)
    }
}
