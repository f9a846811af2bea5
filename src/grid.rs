//! Grid engine - periodic cells anchored to a fixed reference point

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::geo::{km_to_lat_degrees, km_to_lng_degrees, Bounds, LatLng};

/// Grid origin. Every grid line is an integer number of pitches away from it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferencePoint {
    pub lat: f64,
    pub lng: f64,
}

impl ReferencePoint {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }
}

/// Angular step between adjacent grid lines
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellPitch {
    pub lat: f64,
    pub lng: f64,
}

impl CellPitch {
    /// Derive the pitch from kilometre spacings. The longitude step is fixed at the
    /// reference latitude and is not recomputed per cell.
    pub fn from_km(parallel_km: f64, meridian_km: f64, reference_lat: f64) -> Self {
        Self {
            lat: km_to_lat_degrees(parallel_km),
            lng: km_to_lng_degrees(meridian_km, reference_lat),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite() && self.lat > 0.0 && self.lng > 0.0
    }
}

/// Absolute cell position in pitches from the reference point
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CellId {
    pub x: i64,
    pub y: i64,
}

impl CellId {
    pub fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// East, west, north and south neighbours (4-connectivity)
    pub fn neighbors(self) -> [CellId; 4] {
        [
            CellId::new(self.x + 1, self.y),
            CellId::new(self.x - 1, self.y),
            CellId::new(self.x, self.y + 1),
            CellId::new(self.x, self.y - 1),
        ]
    }

    pub fn is_adjacent(self, other: CellId) -> bool {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        dx + dy == 1
    }
}

impl std::fmt::Display for CellId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.x, self.y)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridCell {
    pub id: CellId,
    pub bounds: Bounds,
    pub center: LatLng,
}

impl GridCell {
    pub fn grid_x(&self) -> i64 {
        self.id.x
    }

    pub fn grid_y(&self) -> i64 {
        self.id.y
    }

    pub fn contains(&self, point: LatLng) -> bool {
        self.bounds.contains(point)
    }
}

/// Result of one grid pass: ascending line coordinates and the cells between them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridLayout {
    pub horizontal_lines: Vec<f64>,
    pub vertical_lines: Vec<f64>,
    pub cells: Vec<GridCell>,
}

impl GridLayout {
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    pub fn cell_at(&self, point: LatLng) -> Option<&GridCell> {
        self.cells.iter().find(|cell| cell.contains(point))
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum GridError {
    #[error("invalid viewport {0:?}")]
    InvalidViewport(Bounds),
    #[error("viewport needs {required} cells but the limit is {max}; coverage is incomplete")]
    CapacityExceeded { required: u64, max: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct GridInfo {
    pub reference: ReferencePoint,
    pub pitch: CellPitch,
    pub max_cells: usize,
}

#[derive(Debug, Clone)]
pub struct GridEngine {
    reference: ReferencePoint,
    pitch: CellPitch,
    max_cells: usize,
}

impl GridEngine {
    pub fn new(reference: ReferencePoint, pitch: CellPitch, max_cells: usize) -> Self {
        Self {
            reference,
            pitch,
            max_cells,
        }
    }

    pub fn reference(&self) -> ReferencePoint {
        self.reference
    }

    pub fn pitch(&self) -> CellPitch {
        self.pitch
    }

    pub fn info(&self) -> GridInfo {
        GridInfo {
            reference: self.reference,
            pitch: self.pitch,
            max_cells: self.max_cells,
        }
    }

    pub fn compute(&self, viewport: &Bounds) -> Result<GridLayout, GridError> {
        compute_grid(viewport, self.reference, self.pitch, self.max_cells)
    }

    /// Absolute id of the cell containing `point`, without computing a layout.
    ///
    /// A point on a shared edge belongs to the south/west cell, the same cell
    /// [`GridLayout::cell_at`] finds first in scan order.
    pub fn cell_id_at(&self, point: LatLng) -> CellId {
        CellId::new(
            edge_inclusive_index(point.lng, self.reference.lng, self.pitch.lng),
            edge_inclusive_index(point.lat, self.reference.lat, self.pitch.lat),
        )
    }
}

/// Index of the band `(origin + (k-1) * step, origin + k * step]` holding `value`,
/// shifted so band `k` starts at line `k`.
fn edge_inclusive_index(value: f64, origin: f64, step: f64) -> i64 {
    ((value - origin) / step).ceil() as i64 - 1
}

/// Line indices `k` (line = origin + k * step) covering `[low, high]` of an already
/// expanded range: one line below the last line at or under `low`, up to the last
/// line at or under `high + step`.
fn line_index_range(low: f64, high: f64, origin: f64, step: f64) -> (f64, f64) {
    let first = ((low - origin) / step).floor() - 1.0;
    let last = ((high + step - origin) / step).floor();
    (first, last)
}

fn emit_lines(first: i64, last: i64, origin: f64, step: f64) -> Vec<f64> {
    (first..=last).map(|k| origin + k as f64 * step).collect()
}

/// Compute grid lines and cells covering `viewport` plus one pitch on every side.
///
/// Cells are identified by their absolute offset from `reference`, so the same
/// geographic area always produces the same ids regardless of the viewport. If the
/// viewport needs more than `max_cells` cells nothing is returned and the caller gets
/// [`GridError::CapacityExceeded`].
pub fn compute_grid(
    viewport: &Bounds,
    reference: ReferencePoint,
    pitch: CellPitch,
    max_cells: usize,
) -> Result<GridLayout, GridError> {
    if !viewport.is_finite()
        || viewport.south > viewport.north
        || viewport.west > viewport.east
        || viewport.south < -90.0
        || viewport.north > 90.0
    {
        return Err(GridError::InvalidViewport(*viewport));
    }

    let expanded = viewport.expand(pitch.lat, pitch.lng);
    let (lat_first, lat_last) =
        line_index_range(expanded.south, expanded.north, reference.lat, pitch.lat);
    let (lng_first, lng_last) =
        line_index_range(expanded.west, expanded.east, reference.lng, pitch.lng);

    // Counted in f64 so an absurd viewport cannot overflow before the cap check.
    let rows = lat_last - lat_first;
    let cols = lng_last - lng_first;
    // Line indices collapse when the coordinates dwarf the pitch.
    if rows < 1.0 || cols < 1.0 {
        return Err(GridError::InvalidViewport(*viewport));
    }
    let required = rows * cols;
    if !required.is_finite() || required > max_cells as f64 {
        let required = if required.is_finite() {
            required as u64
        } else {
            u64::MAX
        };
        return Err(GridError::CapacityExceeded {
            required,
            max: max_cells,
        });
    }

    let horizontal_lines = emit_lines(lat_first as i64, lat_last as i64, reference.lat, pitch.lat);
    let vertical_lines = emit_lines(lng_first as i64, lng_last as i64, reference.lng, pitch.lng);

    let mut cells = Vec::with_capacity(required as usize);
    for (row, lat_pair) in horizontal_lines.windows(2).enumerate() {
        let (south, north) = (lat_pair[0], lat_pair[1]);
        let grid_y = lat_first as i64 + row as i64;
        for (col, lng_pair) in vertical_lines.windows(2).enumerate() {
            let (west, east) = (lng_pair[0], lng_pair[1]);
            let grid_x = lng_first as i64 + col as i64;
            let bounds = Bounds::new(south, north, west, east);
            cells.push(GridCell {
                id: CellId::new(grid_x, grid_y),
                bounds,
                center: bounds.center(),
            });
        }
    }

    debug!(
        horizontal = horizontal_lines.len(),
        vertical = vertical_lines.len(),
        cells = cells.len(),
        "computed grid"
    );

    Ok(GridLayout {
        horizontal_lines,
        vertical_lines,
        cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn unit_engine(max_cells: usize) -> GridEngine {
        GridEngine::new(
            ReferencePoint::new(0.0, 0.0),
            CellPitch { lat: 1.0, lng: 1.0 },
            max_cells,
        )
    }

    fn ids(layout: &GridLayout) -> BTreeSet<CellId> {
        layout.cells.iter().map(|cell| cell.id).collect()
    }

    #[test]
    fn test_lines_are_snapped_and_ascending() {
        let engine = unit_engine(1000);
        let layout = engine.compute(&Bounds::new(0.5, 2.5, 0.5, 2.5)).unwrap();

        // expanded south -0.5 -> last line at or below is -1, one more step is -2
        assert_eq!(layout.horizontal_lines.first(), Some(&-2.0));
        // expanded north 3.5 -> emitted while <= 4.5
        assert_eq!(layout.horizontal_lines.last(), Some(&4.0));
        assert!(layout.horizontal_lines.windows(2).all(|w| w[0] < w[1]));
        assert!(layout.vertical_lines.contains(&0.0));
    }

    #[test]
    fn test_cells_have_absolute_ids() {
        let engine = unit_engine(1000);
        let layout = engine.compute(&Bounds::new(0.5, 2.5, 0.5, 2.5)).unwrap();

        let cell = layout.cell_at(LatLng::new(1.5, 2.5)).unwrap();
        assert_eq!(cell.id, CellId::new(2, 1));
        assert_eq!(cell.center, LatLng::new(1.5, 2.5));
        assert_eq!(cell.bounds, Bounds::new(1.0, 2.0, 2.0, 3.0));

        let rows = layout.horizontal_lines.len() - 1;
        let cols = layout.vertical_lines.len() - 1;
        assert_eq!(layout.cell_count(), rows * cols);
    }

    #[test]
    fn test_negative_coordinates() {
        let engine = unit_engine(1000);
        let layout = engine.compute(&Bounds::new(-3.5, -2.5, -7.5, -6.5)).unwrap();

        let cell = layout.cell_at(LatLng::new(-3.2, -7.2)).unwrap();
        assert_eq!(cell.id, CellId::new(-8, -4));
        assert_eq!(engine.cell_id_at(LatLng::new(-3.2, -7.2)), cell.id);
    }

    #[test]
    fn test_idempotent() {
        let engine = unit_engine(1000);
        let viewport = Bounds::new(-1.3, 2.7, 4.1, 6.9);

        let a = engine.compute(&viewport).unwrap();
        let b = engine.compute(&viewport).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_pan_preserves_identity() {
        let engine = GridEngine::new(
            ReferencePoint::new(-6.970723, 107.57757),
            CellPitch::from_km(4.82803, 4.82803, -6.970723),
            5000,
        );
        let before = engine.compute(&Bounds::new(-7.0, -6.9, 107.55, 107.7)).unwrap();
        let after = engine
            .compute(&Bounds::new(-6.99, -6.89, 107.56, 107.71))
            .unwrap();

        for cell in &after.cells {
            if let Some(old) = before.cells.iter().find(|c| c.id == cell.id) {
                assert!((old.center.lat - cell.center.lat).abs() < 1e-12);
                assert!((old.center.lng - cell.center.lng).abs() < 1e-12);
            }
        }
        let point = LatLng::new(-6.95, 107.62);
        assert_eq!(
            before.cell_at(point).map(|c| c.id),
            after.cell_at(point).map(|c| c.id)
        );
        assert!(!ids(&before).is_disjoint(&ids(&after)));
    }

    #[test]
    fn test_degenerate_viewport_still_covered() {
        let engine = unit_engine(1000);
        let point = LatLng::new(0.25, 0.75);
        let layout = engine
            .compute(&Bounds::new(point.lat, point.lat, point.lng, point.lng))
            .unwrap();

        assert!(!layout.cells.is_empty());
        assert_eq!(layout.cell_at(point).unwrap().id, CellId::new(0, 0));
    }

    #[test]
    fn test_viewport_north_of_reference() {
        let engine = unit_engine(1000);
        let layout = engine.compute(&Bounds::new(40.2, 40.8, 0.2, 0.8)).unwrap();

        // only the neighbourhood of the viewport is produced
        assert!(layout.cell_count() <= 36);
        assert_eq!(
            layout.cell_at(LatLng::new(40.5, 0.5)).unwrap().id,
            CellId::new(0, 40)
        );
    }

    #[test]
    fn test_capacity_exceeded() {
        let engine = unit_engine(10);
        let err = engine.compute(&Bounds::new(0.5, 2.5, 0.5, 2.5)).unwrap_err();

        match err {
            GridError::CapacityExceeded { required, max } => {
                assert_eq!(max, 10);
                assert!(required > 10);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_invalid_viewport() {
        let engine = unit_engine(10);
        assert!(matches!(
            engine.compute(&Bounds::new(1.0, 0.0, 0.0, 1.0)),
            Err(GridError::InvalidViewport(_))
        ));
        assert!(matches!(
            engine.compute(&Bounds::new(0.0, f64::NAN, 0.0, 1.0)),
            Err(GridError::InvalidViewport(_))
        ));
    }

    #[test]
    fn test_out_of_range_viewport() {
        let engine = unit_engine(1000);
        assert!(matches!(
            engine.compute(&Bounds::new(-91.0, 0.0, 0.0, 1.0)),
            Err(GridError::InvalidViewport(_))
        ));

        let far = GridEngine::new(
            ReferencePoint::new(0.0, 0.0),
            CellPitch { lat: 0.04, lng: 0.04 },
            1000,
        );
        assert!(matches!(
            far.compute(&Bounds::new(1e18, 1e18, 0.5, 0.5)),
            Err(GridError::InvalidViewport(_))
        ));
        assert!(matches!(
            far.compute(&Bounds::new(10.0, 10.0, 1e18, 1e18)),
            Err(GridError::InvalidViewport(_))
        ));
    }

    #[test]
    fn test_ids_match_cell_corners() {
        let reference = ReferencePoint::new(-6.970723, 107.57757);
        let pitch = CellPitch::from_km(4.82803, 4.82803, reference.lat);
        let layout = compute_grid(&Bounds::new(-7.3, -6.6, 107.2, 108.0), reference, pitch, 1000)
            .unwrap();

        for cell in &layout.cells {
            let x = ((cell.bounds.west - reference.lng) / pitch.lng).round() as i64;
            let y = ((cell.bounds.south - reference.lat) / pitch.lat).round() as i64;
            assert_eq!(cell.id, CellId::new(x, y));
        }
    }

    #[test]
    fn test_shared_edge_point_matches_layout() {
        let engine = unit_engine(1000);
        let layout = engine.compute(&Bounds::new(0.5, 2.5, 0.5, 2.5)).unwrap();

        let corner = LatLng::new(1.0, 2.0);
        let cell = layout.cell_at(corner).unwrap();
        assert_eq!(cell.id, CellId::new(1, 0));
        assert_eq!(engine.cell_id_at(corner), cell.id);
        assert_eq!(engine.cell_id_at(LatLng::new(1.5, 2.5)), CellId::new(2, 1));
    }

    #[test]
    fn test_cell_adjacency() {
        let id = CellId::new(-1, 0);
        assert!(id.is_adjacent(CellId::new(0, 0)));
        assert!(id.is_adjacent(CellId::new(-1, -1)));
        assert!(!id.is_adjacent(CellId::new(0, 1)));
        assert!(!id.is_adjacent(id));
        assert!(id.neighbors().iter().all(|n| id.is_adjacent(*n)));
        assert_eq!(id.to_string(), "-1-0");
    }
}
