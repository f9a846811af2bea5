//! Point, zone and distance lookups against a published snapshot

use std::collections::BTreeSet;

use serde::Serialize;

use crate::geo::{haversine_km, Bounds, LatLng};
use crate::grid::GridCell;
use crate::snapshot::ZoneSnapshot;
use crate::zone::{ZoneCatalog, ZoneDefinition, ZoneId};

#[derive(Debug, Clone, Serialize)]
pub struct ZoneInfo<'a> {
    pub zone: &'a ZoneDefinition,
    pub cell_count: usize,
    pub cells: Vec<&'a GridCell>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ClosestZone<'a> {
    pub zone: &'a ZoneDefinition,
    pub cell: &'a GridCell,
    pub distance_km: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ZoneQuery<'a> {
    snapshot: &'a ZoneSnapshot,
    zones: &'a ZoneCatalog,
}

impl<'a> ZoneQuery<'a> {
    pub fn new(snapshot: &'a ZoneSnapshot, zones: &'a ZoneCatalog) -> Self {
        Self { snapshot, zones }
    }

    pub fn snapshot(&self) -> &'a ZoneSnapshot {
        self.snapshot
    }

    /// Cell containing `point`, by linear scan
    pub fn cell_at(&self, point: LatLng) -> Option<&'a GridCell> {
        self.snapshot.cell_at(point)
    }

    /// Zone of the cell containing `point`, or `None` outside the computed grid
    pub fn zone_at(&self, point: LatLng) -> Option<&'a ZoneDefinition> {
        let cell = self.cell_at(point)?;
        self.snapshot
            .zone_of(cell.id)
            .map(|zone| self.zones.get(zone))
    }

    pub fn cells_of_zone(&self, zone: ZoneId) -> Vec<&'a GridCell> {
        self.snapshot.cells_of_zone(zone).collect()
    }

    pub fn zone_info(&self, zone: ZoneId) -> ZoneInfo<'a> {
        let cells = self.cells_of_zone(zone);
        ZoneInfo {
            zone: self.zones.get(zone),
            cell_count: cells.len(),
            cells,
        }
    }

    pub fn all_zones(&self) -> Vec<ZoneInfo<'a>> {
        ZoneId::ALL.iter().map(|zone| self.zone_info(*zone)).collect()
    }

    /// Cell count per zone, keyed by zone name
    pub fn statistics(&self) -> Vec<(&'a str, usize)> {
        self.snapshot
            .zone_cell_counts()
            .into_iter()
            .map(|(zone, count)| (self.zones.get(zone).name.as_str(), count))
            .collect()
    }

    /// Zones with at least one cell intersecting `area`
    pub fn zones_in_area(&self, area: &Bounds) -> Vec<&'a ZoneDefinition> {
        let found: BTreeSet<ZoneId> = self
            .snapshot
            .cells()
            .iter()
            .filter(|cell| area.intersects(&cell.bounds))
            .filter_map(|cell| self.snapshot.zone_of(cell.id))
            .collect();
        found.into_iter().map(|zone| self.zones.get(zone)).collect()
    }

    /// Among `candidates`, the zone whose nearest cell centre is closest to `point`.
    ///
    /// An empty candidate list means every zone. Zones without cells in the snapshot
    /// are skipped; `None` when no candidate has any cell.
    pub fn closest_zone(&self, point: LatLng, candidates: &[ZoneId]) -> Option<ClosestZone<'a>> {
        let candidates: &[ZoneId] = if candidates.is_empty() {
            &ZoneId::ALL
        } else {
            candidates
        };

        let mut best: Option<ClosestZone<'a>> = None;
        for zone in candidates {
            for cell in self.snapshot.cells_of_zone(*zone) {
                let distance_km = haversine_km(point, cell.center);
                if best.as_ref().map_or(true, |b| distance_km < b.distance_km) {
                    best = Some(ClosestZone {
                        zone: self.zones.get(*zone),
                        cell,
                        distance_km,
                    });
                }
            }
        }
        best
    }
}
