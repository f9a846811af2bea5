//! Zone pattern resolution and the monthly rotation calendar

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::geo::LatLng;
use crate::grid::GridCell;
use crate::zone::{ZoneId, ZONE_COUNT};

/// Row stride of the linear pattern index
const LINEAR_ROW_STRIDE: u64 = 1000;

/// Rotation applied to the custom tile, one entry per calendar month (January first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonthOffsets(pub [u8; 12]);

impl MonthOffsets {
    pub const NONE: MonthOffsets = MonthOffsets([0; 12]);

    pub fn is_valid(&self) -> bool {
        self.0.iter().all(|offset| (*offset as usize) < ZONE_COUNT)
    }

    /// Offset in effect on `date` under the first-Monday rule
    pub fn offset_on(&self, date: NaiveDate) -> u8 {
        self.0[effective_month0(date) as usize]
    }
}

impl Default for MonthOffsets {
    fn default() -> Self {
        MonthOffsets([0, 1, 2, 3, 0, 1, 2, 3, 0, 1, 2, 3])
    }
}

/// Day of month (1-based) of the first Monday in `date`'s month
pub fn first_monday_day(date: NaiveDate) -> u32 {
    // Derived arithmetically so no intermediate date has to be constructed.
    let weekday_today = date.weekday().num_days_from_sunday();
    let weekday_first = (weekday_today + 7 - date.day0() % 7) % 7;
    match weekday_first {
        1 => 1,
        0 => 2,
        weekday => 1 + (8 - weekday),
    }
}

/// Zero-based month whose offset applies on `date`. Days before the first Monday
/// still belong to the previous month's rotation.
pub fn effective_month0(date: NaiveDate) -> u32 {
    let month0 = date.month0();
    if date.day() >= first_monday_day(date) {
        month0
    } else if month0 == 0 {
        11
    } else {
        month0 - 1
    }
}

/// Repeating matrix of zone ids, indexed `[row = gridY][column = gridX]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<Vec<u8>>", into = "Vec<Vec<u8>>")]
pub struct ZoneTile {
    rows: Vec<Vec<ZoneId>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileError {
    Empty,
    Ragged { row: usize },
    BadZone { row: usize, col: usize, value: u8 },
}

impl std::fmt::Display for TileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TileError::Empty => write!(f, "zone tile must have at least one row and column"),
            TileError::Ragged { row } => write!(f, "zone tile row {row} has a different width"),
            TileError::BadZone { row, col, value } => {
                write!(f, "zone tile entry [{row}][{col}] = {value} is outside 1..=4")
            }
        }
    }
}

impl std::error::Error for TileError {}

impl ZoneTile {
    pub fn new(rows: Vec<Vec<u8>>) -> Result<Self, TileError> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if width == 0 {
            return Err(TileError::Empty);
        }
        let mut parsed = Vec::with_capacity(rows.len());
        for (row_index, row) in rows.into_iter().enumerate() {
            if row.len() != width {
                return Err(TileError::Ragged { row: row_index });
            }
            let zones = row
                .into_iter()
                .enumerate()
                .map(|(col, value)| {
                    ZoneId::new(value).ok_or(TileError::BadZone {
                        row: row_index,
                        col,
                        value,
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;
            parsed.push(zones);
        }
        Ok(Self { rows: parsed })
    }

    /// 4x4 tile from zone ids that are valid by construction
    pub(crate) fn from_grid(rows: [[ZoneId; 4]; 4]) -> Self {
        Self {
            rows: rows.iter().map(|row| row.to_vec()).collect(),
        }
    }

    pub fn width(&self) -> usize {
        self.rows[0].len()
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    /// Tile entry for an absolute cell, using floor-modulo so negative coordinates wrap
    pub fn base_zone(&self, grid_x: i64, grid_y: i64) -> ZoneId {
        let pattern_x = grid_x.rem_euclid(self.width() as i64) as usize;
        let pattern_y = grid_y.rem_euclid(self.height() as i64) as usize;
        self.rows[pattern_y][pattern_x]
    }
}

impl TryFrom<Vec<Vec<u8>>> for ZoneTile {
    type Error = TileError;

    fn try_from(value: Vec<Vec<u8>>) -> Result<Self, Self::Error> {
        ZoneTile::new(value)
    }
}

impl From<ZoneTile> for Vec<Vec<u8>> {
    fn from(value: ZoneTile) -> Self {
        value
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(ZoneId::get).collect())
            .collect()
    }
}

/// How cells are mapped onto zones
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ZonePattern {
    /// 2x2 alternation on grid parity
    Checkerboard,
    /// `(|gridY| * 1000 + |gridX|) mod 4`
    Linear,
    /// Four quadrants around a fixed geographic point
    Quadrant { center: LatLng },
    /// Repeating tile rotated by a monthly offset
    Custom {
        tile: ZoneTile,
        #[serde(default)]
        month_offsets: MonthOffsets,
    },
}

impl ZonePattern {
    pub fn name(&self) -> &'static str {
        match self {
            ZonePattern::Checkerboard => "checkerboard",
            ZonePattern::Linear => "linear",
            ZonePattern::Quadrant { .. } => "quadrant",
            ZonePattern::Custom { .. } => "custom",
        }
    }

    /// Rotation offset this pattern applies on `as_of` (always 0 for date-free modes)
    pub fn offset_on(&self, as_of: NaiveDate) -> u8 {
        match self {
            ZonePattern::Custom { month_offsets, .. } => month_offsets.offset_on(as_of),
            _ => 0,
        }
    }

    pub fn resolve_cell(&self, cell: &GridCell, as_of: NaiveDate) -> ZoneId {
        self.resolve(cell.grid_x(), cell.grid_y(), cell.center, as_of)
    }

    /// Zone owning the cell at `(grid_x, grid_y)` whose centre is `center`
    pub fn resolve(&self, grid_x: i64, grid_y: i64, center: LatLng, as_of: NaiveDate) -> ZoneId {
        match self {
            ZonePattern::Checkerboard => checkerboard_zone(grid_x, grid_y),
            ZonePattern::Linear => linear_zone(grid_x, grid_y),
            ZonePattern::Quadrant { center: origin } => quadrant_zone(center, *origin),
            ZonePattern::Custom {
                tile,
                month_offsets,
            } => custom_zone(tile, grid_x, grid_y, month_offsets.offset_on(as_of)),
        }
    }
}

fn checkerboard_zone(grid_x: i64, grid_y: i64) -> ZoneId {
    let zone = match (grid_x.rem_euclid(2), grid_y.rem_euclid(2)) {
        (0, 0) => 1,
        (1, 0) => 2,
        (0, 1) => 3,
        _ => 4,
    };
    ZoneId::clamped(zone)
}

fn linear_zone(grid_x: i64, grid_y: i64) -> ZoneId {
    // Reduced mod 4 term by term so large coordinates cannot overflow.
    let row = grid_y.unsigned_abs() % 4 * (LINEAR_ROW_STRIDE % 4);
    let index = (row + grid_x.unsigned_abs() % 4) % 4;
    ZoneId::clamped(index as i64 + 1)
}

fn quadrant_zone(point: LatLng, origin: LatLng) -> ZoneId {
    let north = point.lat >= origin.lat;
    let east = point.lng >= origin.lng;
    let zone = match (north, east) {
        (true, true) => 1,
        (true, false) => 2,
        (false, false) => 3,
        (false, true) => 4,
    };
    ZoneId::clamped(zone)
}

fn custom_zone(tile: &ZoneTile, grid_x: i64, grid_y: i64, offset: u8) -> ZoneId {
    tile.base_zone(grid_x, grid_y).rotate(offset)
}
