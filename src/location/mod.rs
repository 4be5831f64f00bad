pub mod boundary;
pub mod geotag;

pub use boundary::Boundary;
pub use geotag::decode_coordinates;

/// Signed decimal degrees. South and west are negative.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}
