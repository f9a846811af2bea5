//! Contiguous same-zone regions used for label placement

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::Serialize;

use crate::geo::LatLng;
use crate::grid::{CellId, GridCell};
use crate::zone::ZoneId;

/// Maximal 4-connected set of cells sharing one zone
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Region {
    pub zone: ZoneId,
    pub cells: Vec<CellId>,
    /// Mean of member cell centres (planar approximation)
    pub centroid: LatLng,
}

impl Region {
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn contains(&self, id: CellId) -> bool {
        self.cells.contains(&id)
    }
}

/// Split the cells of one zone into connected components.
///
/// Traversal starts from cells in input order, so the output order is stable for a
/// given input.
pub fn group_regions<'a>(zone: ZoneId, cells: impl IntoIterator<Item = &'a GridCell>) -> Vec<Region> {
    let cells: Vec<&GridCell> = cells.into_iter().collect();
    let by_id: HashMap<CellId, &GridCell> = cells.iter().map(|cell| (cell.id, *cell)).collect();
    let mut visited: HashSet<CellId> = HashSet::with_capacity(cells.len());
    let mut regions = Vec::new();

    for start in &cells {
        if visited.contains(&start.id) {
            continue;
        }
        let mut members = Vec::new();
        let mut stack = vec![start.id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            members.push(current);
            for neighbor in current.neighbors() {
                if by_id.contains_key(&neighbor) && !visited.contains(&neighbor) {
                    stack.push(neighbor);
                }
            }
        }
        let centroid = centroid(members.iter().filter_map(|id| by_id.get(id)).map(|c| c.center));
        regions.push(Region {
            zone,
            cells: members,
            centroid,
        });
    }

    regions
}

/// Group every tagged cell by zone, then split each zone into regions
pub fn aggregate<'a>(
    tagged: impl IntoIterator<Item = (&'a GridCell, ZoneId)>,
) -> BTreeMap<ZoneId, Vec<Region>> {
    let mut by_zone: BTreeMap<ZoneId, Vec<&GridCell>> = BTreeMap::new();
    for (cell, zone) in tagged {
        by_zone.entry(zone).or_default().push(cell);
    }
    by_zone
        .into_iter()
        .map(|(zone, cells)| (zone, group_regions(zone, cells)))
        .collect()
}

fn centroid(points: impl Iterator<Item = LatLng>) -> LatLng {
    let (mut lat, mut lng, mut count) = (0.0, 0.0, 0usize);
    for point in points {
        lat += point.lat;
        lng += point.lng;
        count += 1;
    }
    if count == 0 {
        return LatLng::new(0.0, 0.0);
    }
    LatLng::new(lat / count as f64, lng / count as f64)
}
