//! Point-in-polygon test for the permitted check-in area.

use super::Coordinates;
use derive_more::Display;
use geo_types::{Coord, LineString, Polygon};

/// Vertices are `(longitude, latitude)`, matching x/y order.
pub type Vertex = (f64, f64);

/// Chennai, as a rectangle. Used when no boundary is configured.
pub const DEFAULT_BOUNDARY: [Vertex; 5] = [
    (80.00318186871408, 13.351066789714721),
    (80.00318186871408, 12.86828560130985),
    (80.5085899702865, 12.86828560130985),
    (80.5085899702865, 13.351066789714721),
    (80.00318186871408, 13.351066789714721),
];

const EDGE_EPSILON: f64 = 1e-12;

#[derive(Debug, Display, PartialEq)]
pub enum BoundaryError {
    #[display(fmt = "boundary needs at least 3 distinct vertices, got {}", _0)]
    TooFewVertices(usize),
    #[display(fmt = "boundary vertex {} is not a finite coordinate", _0)]
    NonFinite(usize),
    #[display(fmt = "boundary vertices enclose no area")]
    ZeroArea,
}

impl std::error::Error for BoundaryError {}

#[derive(Debug, Clone)]
pub struct Boundary {
    polygon: Polygon<f64>,
}

impl Boundary {
    /// Build a boundary from an ordered ring. The ring is closed if the last
    /// vertex differs from the first.
    pub fn new(vertices: &[Vertex]) -> Result<Self, BoundaryError> {
        if let Some(index) = vertices
            .iter()
            .position(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(BoundaryError::NonFinite(index));
        }

        let mut distinct: Vec<Vertex> = Vec::with_capacity(vertices.len());
        for vertex in vertices {
            if !distinct.contains(vertex) {
                distinct.push(*vertex);
            }
        }
        if distinct.len() < 3 {
            return Err(BoundaryError::TooFewVertices(distinct.len()));
        }

        let ring: Vec<Coord<f64>> = vertices.iter().map(|&(x, y)| Coord { x, y }).collect();
        // Polygon::new closes an open exterior ring.
        let polygon = Polygon::new(LineString::from(ring), vec![]);

        // Collinear rings have no interior, so nothing would ever be inside.
        if twice_area(&polygon.exterior().0).abs() <= EDGE_EPSILON {
            return Err(BoundaryError::ZeroArea);
        }

        Ok(Self { polygon })
    }

    /// Strict containment. Points exactly on an edge or vertex are outside.
    pub fn contains(&self, point: &Coordinates) -> bool {
        let (px, py) = (point.longitude, point.latitude);
        let exterior = &self.polygon.exterior().0;

        if exterior
            .windows(2)
            .any(|edge| on_segment(px, py, edge[0], edge[1]))
        {
            return false;
        }

        // Ray casting towards +x.
        let mut inside = false;
        let mut j = exterior.len() - 1;
        for i in 0..exterior.len() {
            let vi = exterior[i];
            let vj = exterior[j];

            if ((vi.y > py) != (vj.y > py))
                && (px < (vj.x - vi.x) * (py - vi.y) / (vj.y - vi.y) + vi.x)
            {
                inside = !inside;
            }
            j = i;
        }

        inside
    }
}

/// Shoelace sum over a closed ring.
fn twice_area(ring: &[Coord<f64>]) -> f64 {
    ring.windows(2)
        .map(|edge| edge[0].x * edge[1].y - edge[1].x * edge[0].y)
        .sum()
}

fn on_segment(px: f64, py: f64, a: Coord<f64>, b: Coord<f64>) -> bool {
    let cross = (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x);
    let scale = (b.x - a.x).abs().max((b.y - a.y).abs()).max(1.0);
    if cross.abs() > EDGE_EPSILON * scale {
        return false;
    }

    px >= a.x.min(b.x) && px <= a.x.max(b.x) && py >= a.y.min(b.y) && py <= a.y.max(b.y)
}
