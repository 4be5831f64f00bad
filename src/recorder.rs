//! Turns an uploaded photo into an attendance event: decode the geotag, check
//! it against the boundary, then open or close the guard's session.

use crate::location::{Boundary, Coordinates, decode_coordinates};
use crate::model::attendance::NewAttendance;
use crate::store::{AttendanceStore, SessionAction, SessionTransition, StoreError};
use chrono::Utc;
use derive_more::Display;
use std::sync::Arc;
use tracing::info;

#[derive(Debug, Clone)]
pub struct RecorderPolicy {
    /// `None` accepts photos from anywhere, with or without a geotag.
    pub boundary: Option<Boundary>,
    /// Pair uploads into check-in/check-out sessions. When off every upload
    /// is stored as its own open row.
    pub pairing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Display)]
pub enum Rejection {
    #[display(fmt = "No GPS coordinates found in image. Record rejected.")]
    MissingCoordinates,
    #[display(fmt = "Coordinates are outside the permitted boundary. Record rejected.")]
    OutsideBoundary(Coordinates),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Submission {
    Accepted {
        transition: SessionTransition,
        coordinates: Option<Coordinates>,
    },
    Rejected(Rejection),
}

pub struct Recorder {
    store: Arc<dyn AttendanceStore>,
    policy: RecorderPolicy,
}

impl Recorder {
    pub fn new(store: Arc<dyn AttendanceStore>, policy: RecorderPolicy) -> Self {
        Self { store, policy }
    }

    /// Decide whether a (possibly absent) position may be recorded.
    pub fn evaluate(&self, coordinates: Option<Coordinates>) -> Result<(), Rejection> {
        let Some(boundary) = &self.policy.boundary else {
            return Ok(());
        };

        match coordinates {
            None => Err(Rejection::MissingCoordinates),
            Some(point) if boundary.contains(&point) => Ok(()),
            Some(point) => Err(Rejection::OutsideBoundary(point)),
        }
    }

    /// Record one upload. Rejections write nothing; accepted uploads write
    /// exactly once.
    pub async fn submit(&self, guard_name: &str, image: Vec<u8>) -> Result<Submission, StoreError> {
        let coordinates = decode_coordinates(&image);

        if let Err(rejection) = self.evaluate(coordinates) {
            info!(guard_name, ?coordinates, reason = %rejection, "Submission rejected");
            return Ok(Submission::Rejected(rejection));
        }

        let entry = NewAttendance {
            guard_name: guard_name.to_owned(),
            image,
            coordinates,
            recorded_at: Utc::now(),
        };

        let transition = if self.policy.pairing {
            self.store.check_in_or_out(&entry).await?
        } else {
            SessionTransition {
                id: self.store.insert(&entry).await?,
                action: SessionAction::Recorded,
            }
        };

        info!(
            guard_name,
            id = transition.id,
            action = transition.action.as_ref(),
            "Attendance recorded"
        );

        Ok(Submission::Accepted {
            transition,
            coordinates,
        })
    }
}
