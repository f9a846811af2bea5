pub mod config;
pub mod engine;
pub mod geo;
pub mod grid;
pub mod pattern;
pub mod query;
pub mod region;
pub mod snapshot;
pub mod zone;

pub use config::Config;
pub use engine::{EngineState, RecomputeOutcome, ZoneEngine};
pub use grid::{compute_grid, CellId, CellPitch, GridCell, ReferencePoint};
pub use pattern::ZonePattern;
pub use zone::{ZoneDefinition, ZoneId};
