use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::NaiveDate;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::geo::Bounds;
use crate::grid::{CellId, GridEngine, GridError};
use crate::pattern::ZonePattern;
use crate::query::ZoneQuery;
use crate::snapshot::{SnapshotMeta, ZoneSnapshot};
use crate::zone::{ZoneCatalog, ZoneId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
    Recomputing,
}

/// What the map currently shows
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportRequest {
    pub bounds: Bounds,
    pub zoom: u8,
}

/// Coalescing queue: at most one pending request, newest wins.
///
/// A request becomes due once `delay` has passed without a newer one arriving.
#[derive(Debug)]
pub struct RecomputeQueue {
    delay: Duration,
    pending: Option<(ViewportRequest, Instant)>,
    superseded: u64,
}

impl RecomputeQueue {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            pending: None,
            superseded: 0,
        }
    }

    pub fn push(&mut self, request: ViewportRequest, now: Instant) {
        if self.pending.replace((request, now)).is_some() {
            self.superseded += 1;
        }
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Requests dropped because a newer one replaced them
    pub fn superseded(&self) -> u64 {
        self.superseded
    }

    pub fn take_due(&mut self, now: Instant) -> Option<ViewportRequest> {
        match self.pending {
            Some((_, queued_at)) if now.saturating_duration_since(queued_at) >= self.delay => {
                self.pending.take().map(|(request, _)| request)
            }
            _ => None,
        }
    }

    /// Take the pending request regardless of the delay
    pub fn flush(&mut self) -> Option<ViewportRequest> {
        self.pending.take().map(|(request, _)| request)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Highlight {
    pub zone: ZoneId,
    pub cells: Vec<CellId>,
    /// `None` stays until cleared
    pub expires_at: Option<Instant>,
}

impl Highlight {
    pub fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecomputeOutcome {
    /// A full snapshot with this many cells was published
    Published { generation: u64, cells: usize },
    /// Zoom is below the grid threshold; an empty snapshot was published
    Inactive { generation: u64 },
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Grid(#[from] GridError),
    #[error("no viewport has been set")]
    NoViewport,
}

/// Owns the current snapshot and swaps it wholesale on every recomputation
pub struct ZoneEngine {
    config: Config,
    grid: GridEngine,
    zones: ZoneCatalog,
    state: EngineState,
    snapshot: Option<Arc<ZoneSnapshot>>,
    queue: RecomputeQueue,
    last_viewport: Option<ViewportRequest>,
    as_of: NaiveDate,
    generation: u64,
    highlight: Option<Highlight>,
}

impl ZoneEngine {
    /// Validate `config` and build an engine evaluating zones on `as_of`
    pub fn new(config: Config, as_of: NaiveDate) -> Result<Self, EngineError> {
        config.validate()?;
        let zones = config.zone_catalog()?;
        let grid = config.grid_engine();
        let queue = RecomputeQueue::new(Duration::from_millis(config.limits.update_delay_ms));
        debug!(
            name = %config.name,
            pattern = config.pattern.name(),
            pitch_lat = grid.pitch().lat,
            pitch_lng = grid.pitch().lng,
            "zone engine configured"
        );
        Ok(Self {
            config,
            grid,
            zones,
            state: EngineState::Uninitialized,
            snapshot: None,
            queue,
            last_viewport: None,
            as_of,
            generation: 0,
            highlight: None,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn grid(&self) -> &GridEngine {
        &self.grid
    }

    pub fn zones(&self) -> &ZoneCatalog {
        &self.zones
    }

    pub fn pattern(&self) -> &ZonePattern {
        &self.config.pattern
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Latest complete snapshot. Cheap to clone and unaffected by later updates.
    pub fn snapshot(&self) -> Option<Arc<ZoneSnapshot>> {
        self.snapshot.clone()
    }

    pub fn query(&self) -> Option<ZoneQuery<'_>> {
        self.snapshot
            .as_deref()
            .map(|snapshot| ZoneQuery::new(snapshot, &self.zones))
    }

    pub fn queue(&self) -> &RecomputeQueue {
        &self.queue
    }

    /// Record a viewport change; it is computed by [`ZoneEngine::poll`] once due
    pub fn viewport_changed(&mut self, bounds: Bounds, zoom: u8, now: Instant) {
        self.queue.push(ViewportRequest { bounds, zoom }, now);
    }

    /// Move the calendar date and queue a recomputation of the current viewport so
    /// the published snapshot always carries the engine's date.
    pub fn date_changed(&mut self, as_of: NaiveDate, now: Instant) {
        if as_of == self.as_of {
            return;
        }
        self.as_of = as_of;
        let request = self.queue.flush().or(self.last_viewport);
        if let Some(request) = request {
            self.queue.push(request, now);
        }
    }

    /// Run the pending request if its quiet period has elapsed
    pub fn poll(&mut self, now: Instant) -> Option<Result<RecomputeOutcome, EngineError>> {
        let request = self.queue.take_due(now)?;
        Some(self.recompute(request.bounds, request.zoom))
    }

    /// Recompute the last viewport immediately (explicit refresh)
    pub fn refresh(&mut self) -> Result<RecomputeOutcome, EngineError> {
        let request = self
            .queue
            .flush()
            .or(self.last_viewport)
            .ok_or(EngineError::NoViewport)?;
        self.recompute(request.bounds, request.zoom)
    }

    /// Build a new snapshot for `bounds` and publish it.
    ///
    /// On failure the previous snapshot stays published and the state returns to what
    /// it was before.
    pub fn recompute(&mut self, bounds: Bounds, zoom: u8) -> Result<RecomputeOutcome, EngineError> {
        let previous = self.state;
        self.state = EngineState::Recomputing;
        let result = self.build_snapshot(bounds, zoom);
        match result {
            Ok(snapshot) => {
                let outcome = if snapshot.is_active() {
                    RecomputeOutcome::Published {
                        generation: snapshot.generation(),
                        cells: snapshot.cells().len(),
                    }
                } else {
                    RecomputeOutcome::Inactive {
                        generation: snapshot.generation(),
                    }
                };
                self.generation = snapshot.generation();
                self.last_viewport = Some(ViewportRequest { bounds, zoom });
                self.snapshot = Some(Arc::new(snapshot));
                self.state = EngineState::Ready;
                info!(?outcome, "published zone snapshot");
                Ok(outcome)
            }
            Err(err) => {
                self.state = if previous == EngineState::Uninitialized {
                    EngineState::Uninitialized
                } else {
                    EngineState::Ready
                };
                warn!("zone recomputation abandoned, keeping previous snapshot: {err}");
                Err(err)
            }
        }
    }

    fn build_snapshot(&self, bounds: Bounds, zoom: u8) -> Result<ZoneSnapshot, EngineError> {
        let limits = &self.config.limits;
        let meta = SnapshotMeta {
            generation: self.generation + 1,
            as_of: self.as_of,
            viewport: bounds,
            zoom,
            show_labels: zoom >= limits.label_min_zoom,
            offset: self.config.pattern.offset_on(self.as_of),
        };

        if zoom < limits.min_zoom {
            debug!(zoom, min_zoom = limits.min_zoom, "grid hidden at this zoom");
            return Ok(ZoneSnapshot::inactive(meta));
        }

        let layout = self.grid.compute(&bounds)?;
        let pattern = &self.config.pattern;
        let as_of = self.as_of;
        let snapshot = ZoneSnapshot::build(meta, layout, |cell| pattern.resolve_cell(cell, as_of));
        debug!(
            offset = meta.offset,
            counts = ?snapshot.zone_cell_counts(),
            "assigned zones"
        );
        Ok(snapshot)
    }

    /// Emphasise every cell of `zone` for `duration_ms`; zero or negative means until
    /// cleared. Returns `None` when the zone has no cells in the current snapshot.
    pub fn highlight(&mut self, zone: ZoneId, duration_ms: i64, now: Instant) -> Option<&Highlight> {
        let cells: Vec<CellId> = self
            .snapshot
            .as_deref()?
            .cells_of_zone(zone)
            .map(|cell| cell.id)
            .collect();
        if cells.is_empty() {
            return None;
        }
        let expires_at = u64::try_from(duration_ms)
            .ok()
            .filter(|ms| *ms > 0)
            .map(|ms| now + Duration::from_millis(ms));
        self.highlight = Some(Highlight {
            zone,
            cells,
            expires_at,
        });
        self.highlight.as_ref()
    }

    /// Current highlight, dropping it first if it has expired
    pub fn active_highlight(&mut self, now: Instant) -> Option<&Highlight> {
        if self.highlight.as_ref().is_some_and(|h| h.is_expired(now)) {
            self.highlight = None;
        }
        self.highlight.as_ref()
    }

    pub fn clear_highlight(&mut self) {
        self.highlight = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::LatLng;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn viewport() -> Bounds {
        Bounds::new(-7.0, -6.92, 107.55, 107.65)
    }

    fn engine() -> ZoneEngine {
        ZoneEngine::new(Config::jwa_default(), date(2024, 5, 15)).unwrap()
    }

    #[test]
    fn test_state_transitions() {
        let mut engine = engine();
        assert_eq!(engine.state(), EngineState::Uninitialized);
        assert!(engine.query().is_none());

        let outcome = engine.recompute(viewport(), 14).unwrap();
        assert!(matches!(outcome, RecomputeOutcome::Published { generation: 1, .. }));
        assert_eq!(engine.state(), EngineState::Ready);
        assert!(engine.query().is_some());
    }

    #[test]
    fn test_invalid_config_is_fatal() {
        let mut config = Config::jwa_default();
        config.cell_distance_km.parallel = -1.0;
        assert!(matches!(
            ZoneEngine::new(config, date(2024, 5, 15)),
            Err(EngineError::Config(ConfigError::Pitch { .. }))
        ));
    }

    #[test]
    fn test_capacity_keeps_previous_snapshot() {
        let mut config = Config::jwa_default();
        config.limits.max_cells = 200;
        let mut engine = ZoneEngine::new(config, date(2024, 5, 15)).unwrap();

        assert!(matches!(
            engine.recompute(Bounds::new(-8.0, -6.0, 106.0, 108.0), 14),
            Err(EngineError::Grid(GridError::CapacityExceeded { .. }))
        ));
        assert_eq!(engine.state(), EngineState::Uninitialized);

        engine.recompute(viewport(), 14).unwrap();
        let before = engine.snapshot().unwrap();
        assert!(engine
            .recompute(Bounds::new(-8.0, -6.0, 106.0, 108.0), 14)
            .is_err());
        assert_eq!(engine.state(), EngineState::Ready);
        assert!(Arc::ptr_eq(&before, &engine.snapshot().unwrap()));
    }

    #[test]
    fn test_snapshot_is_swapped_not_mutated() {
        let mut engine = engine();
        engine.recompute(viewport(), 14).unwrap();
        let held = engine.snapshot().unwrap();
        let held_cells = held.cells().len();

        engine
            .recompute(Bounds::new(-7.2, -7.1, 107.3, 107.4), 14)
            .unwrap();
        assert_eq!(held.generation(), 1);
        assert_eq!(held.cells().len(), held_cells);
        assert_eq!(engine.snapshot().unwrap().generation(), 2);
    }

    #[test]
    fn test_below_min_zoom_publishes_inactive() {
        let mut engine = engine();
        let outcome = engine.recompute(viewport(), 9).unwrap();

        assert_eq!(outcome, RecomputeOutcome::Inactive { generation: 1 });
        let query = engine.query().unwrap();
        assert!(query.zone_at(LatLng::new(-6.95, 107.6)).is_none());
        assert!(!query.snapshot().show_labels());
    }

    #[test]
    fn test_label_threshold() {
        let mut engine = engine();
        engine.recompute(viewport(), 12).unwrap();
        assert!(!engine.snapshot().unwrap().show_labels());
        engine.recompute(viewport(), 13).unwrap();
        assert!(engine.snapshot().unwrap().show_labels());
    }

    #[test]
    fn test_debounce_keeps_latest() {
        let mut engine = engine();
        let t0 = Instant::now();

        engine.viewport_changed(Bounds::new(-7.5, -7.4, 107.0, 107.1), 14, t0);
        engine.viewport_changed(viewport(), 14, t0 + Duration::from_millis(40));
        assert_eq!(engine.queue().superseded(), 1);

        // quiet period restarts with the newer request
        assert!(engine.poll(t0 + Duration::from_millis(120)).is_none());
        let outcome = engine
            .poll(t0 + Duration::from_millis(140))
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, RecomputeOutcome::Published { generation: 1, .. }));
        assert_eq!(engine.snapshot().unwrap().viewport(), viewport());
        assert!(engine.poll(t0 + Duration::from_secs(5)).is_none());
    }

    #[test]
    fn test_date_change_requeues_current_viewport() {
        let mut engine = engine();
        let t0 = Instant::now();
        engine.recompute(viewport(), 14).unwrap();

        engine.date_changed(engine.as_of(), t0);
        assert!(!engine.queue().is_pending());

        // still May's rotation, but the snapshot date must follow
        engine.date_changed(date(2024, 5, 31), t0);
        assert!(engine.queue().is_pending());
        engine.refresh().unwrap();
        let snapshot = engine.snapshot().unwrap();
        assert_eq!(snapshot.as_of(), date(2024, 5, 31));
        assert_eq!(snapshot.offset(), 0);

        // 2024-06-03 is the first Monday of June
        engine.date_changed(date(2024, 6, 3), t0);
        assert!(engine.queue().is_pending());
        engine.refresh().unwrap();
        assert_eq!(engine.snapshot().unwrap().offset(), 1);
    }

    #[test]
    fn test_refresh_without_viewport() {
        let mut engine = engine();
        assert!(matches!(engine.refresh(), Err(EngineError::NoViewport)));
    }

    #[test]
    fn test_highlight_expires() {
        let mut engine = engine();
        let t0 = Instant::now();
        assert!(engine.highlight(ZoneId::ALL[0], 3000, t0).is_none());

        engine.recompute(viewport(), 14).unwrap();
        let highlight = engine.highlight(ZoneId::ALL[0], 3000, t0).unwrap();
        assert!(!highlight.cells.is_empty());

        assert!(engine
            .active_highlight(t0 + Duration::from_millis(2999))
            .is_some());
        assert!(engine
            .active_highlight(t0 + Duration::from_millis(3000))
            .is_none());
    }

    #[test]
    fn test_indefinite_highlight() {
        let mut engine = engine();
        let t0 = Instant::now();
        engine.recompute(viewport(), 14).unwrap();

        engine.highlight(ZoneId::ALL[2], 0, t0).unwrap();
        assert!(engine.active_highlight(t0 + Duration::from_secs(3600)).is_some());
        engine.highlight(ZoneId::ALL[2], -5, t0).unwrap();
        assert!(engine.active_highlight(t0 + Duration::from_secs(3600)).is_some());

        engine.clear_highlight();
        assert!(engine.active_highlight(t0).is_none());
    }
}
