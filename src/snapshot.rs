//! Published grid/zone state and its JSON export

use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geo::{Bounds, LatLng};
use crate::grid::{CellId, GridCell, GridInfo, GridLayout};
use crate::region::{self, Region};
use crate::zone::ZoneId;

/// One complete, immutable recomputation result.
///
/// Cells never carry their zone; membership is looked up in `assignments`.
#[derive(Debug, Clone)]
pub struct ZoneSnapshot {
    generation: u64,
    as_of: NaiveDate,
    viewport: Bounds,
    zoom: u8,
    active: bool,
    show_labels: bool,
    offset: u8,
    layout: GridLayout,
    assignments: HashMap<CellId, ZoneId>,
    regions: BTreeMap<ZoneId, Vec<Region>>,
}

/// Inputs describing what a snapshot was computed for
#[derive(Debug, Clone, Copy)]
pub struct SnapshotMeta {
    pub generation: u64,
    pub as_of: NaiveDate,
    pub viewport: Bounds,
    pub zoom: u8,
    pub show_labels: bool,
    pub offset: u8,
}

impl ZoneSnapshot {
    /// Tag every cell with `zone_of` and derive regions
    pub fn build(
        meta: SnapshotMeta,
        layout: GridLayout,
        mut zone_of: impl FnMut(&GridCell) -> ZoneId,
    ) -> Self {
        let assignments: HashMap<CellId, ZoneId> = layout
            .cells
            .iter()
            .map(|cell| (cell.id, zone_of(cell)))
            .collect();
        let regions = region::aggregate(
            layout
                .cells
                .iter()
                .filter_map(|cell| assignments.get(&cell.id).map(|zone| (cell, *zone))),
        );
        Self {
            generation: meta.generation,
            as_of: meta.as_of,
            viewport: meta.viewport,
            zoom: meta.zoom,
            active: true,
            show_labels: meta.show_labels,
            offset: meta.offset,
            layout,
            assignments,
            regions,
        }
    }

    /// Empty snapshot published while the map is zoomed out past the grid threshold
    pub fn inactive(meta: SnapshotMeta) -> Self {
        Self {
            generation: meta.generation,
            as_of: meta.as_of,
            viewport: meta.viewport,
            zoom: meta.zoom,
            active: false,
            show_labels: false,
            offset: meta.offset,
            layout: GridLayout::default(),
            assignments: HashMap::new(),
            regions: BTreeMap::new(),
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn viewport(&self) -> Bounds {
        self.viewport
    }

    pub fn zoom(&self) -> u8 {
        self.zoom
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn show_labels(&self) -> bool {
        self.show_labels
    }

    /// Rotation offset that was in effect for `as_of`
    pub fn offset(&self) -> u8 {
        self.offset
    }

    pub fn layout(&self) -> &GridLayout {
        &self.layout
    }

    pub fn cells(&self) -> &[GridCell] {
        &self.layout.cells
    }

    pub fn horizontal_lines(&self) -> &[f64] {
        &self.layout.horizontal_lines
    }

    pub fn vertical_lines(&self) -> &[f64] {
        &self.layout.vertical_lines
    }

    pub fn zone_of(&self, id: CellId) -> Option<ZoneId> {
        self.assignments.get(&id).copied()
    }

    pub fn cell_at(&self, point: LatLng) -> Option<&GridCell> {
        self.layout.cell_at(point)
    }

    pub fn regions(&self, zone: ZoneId) -> &[Region] {
        self.regions.get(&zone).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn all_regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values().flatten()
    }

    pub fn cells_of_zone(&self, zone: ZoneId) -> impl Iterator<Item = &GridCell> {
        self.layout
            .cells
            .iter()
            .filter(move |cell| self.zone_of(cell.id) == Some(zone))
    }

    pub fn zone_cell_counts(&self) -> BTreeMap<ZoneId, usize> {
        let mut counts: BTreeMap<ZoneId, usize> = ZoneId::ALL.iter().map(|z| (*z, 0)).collect();
        for zone in self.assignments.values() {
            *counts.entry(*zone).or_default() += 1;
        }
        counts
    }

    pub fn export(&self, grid: GridInfo) -> SnapshotExport {
        let cells = self
            .layout
            .cells
            .iter()
            .filter_map(|cell| {
                self.zone_of(cell.id).map(|zone| CellRecord {
                    id: cell.id.to_string(),
                    grid_position: [cell.id.x, cell.id.y],
                    center: cell.center,
                    bounds: cell.bounds,
                    zone,
                })
            })
            .collect();
        SnapshotExport {
            generation: self.generation,
            as_of: self.as_of,
            zoom: self.zoom,
            active: self.active,
            offset: self.offset,
            grid,
            viewport: self.viewport,
            horizontal_lines: self.layout.horizontal_lines.clone(),
            vertical_lines: self.layout.vertical_lines.clone(),
            cells,
            regions: self.all_regions().cloned().collect(),
            statistics: self
                .zone_cell_counts()
                .into_iter()
                .map(|(zone, count)| (zone.to_string(), count))
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CellRecord {
    pub id: String,
    pub grid_position: [i64; 2],
    pub center: LatLng,
    pub bounds: Bounds,
    pub zone: ZoneId,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotExport {
    pub generation: u64,
    pub as_of: NaiveDate,
    pub zoom: u8,
    pub active: bool,
    pub offset: u8,
    pub grid: GridInfo,
    pub viewport: Bounds,
    pub horizontal_lines: Vec<f64>,
    pub vertical_lines: Vec<f64>,
    pub cells: Vec<CellRecord>,
    pub regions: Vec<Region>,
    /// Cell count per zone id
    pub statistics: BTreeMap<String, usize>,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SnapshotExport {
    pub fn to_json_pretty(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Write to `<dir>/snapshot_<generation>.json`
    pub fn write_json(&self, dir: impl AsRef<Path>) -> Result<PathBuf, SnapshotError> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let path = dir.join(format!("snapshot_{:06}.json", self.generation));
        let mut file = File::create(&path)?;
        file.write_all(self.to_json_pretty()?.as_bytes())?;
        Ok(path)
    }
}
