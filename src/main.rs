use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveDate};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use zonegrid::{
    geo::{Bounds, LatLng},
    Config, RecomputeOutcome, ZoneEngine, ZoneId,
};

#[derive(Debug, Parser)]
#[command(author, version, about = "Grid and zone overlay calculator")]
struct Cli {
    /// Path to the overlay configuration YAML file
    #[arg(long, default_value = "config/jwa_bandung.yaml")]
    config: PathBuf,

    /// Viewport south edge in degrees
    #[arg(long, allow_hyphen_values = true)]
    south: f64,

    /// Viewport north edge in degrees
    #[arg(long, allow_hyphen_values = true)]
    north: f64,

    /// Viewport west edge in degrees
    #[arg(long, allow_hyphen_values = true)]
    west: f64,

    /// Viewport east edge in degrees
    #[arg(long, allow_hyphen_values = true)]
    east: f64,

    /// Map zoom level
    #[arg(long, default_value_t = 13)]
    zoom: u8,

    /// Date the zone rotation is evaluated for (defaults to today)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Find the closest zone to LAT,LNG
    #[arg(long, value_parser = parse_lat_lng, allow_hyphen_values = true)]
    locate: Option<LatLng>,

    /// Zone ids to consider for --locate (all when omitted)
    #[arg(long, value_delimiter = ',')]
    zones: Vec<u8>,

    /// Directory to write the snapshot JSON into
    #[arg(long)]
    export: Option<PathBuf>,
}

fn parse_lat_lng(value: &str) -> Result<LatLng, String> {
    let (lat, lng) = value
        .split_once(',')
        .ok_or_else(|| format!("expected LAT,LNG, got '{value}'"))?;
    let lat = lat.trim().parse::<f64>().map_err(|err| err.to_string())?;
    let lng = lng.trim().parse::<f64>().map_err(|err| err.to_string())?;
    Ok(LatLng::new(lat, lng))
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_yaml(&cli.config)
        .with_context(|| format!("Failed to load config {}", cli.config.display()))?;
    init_logging(&config.logging.level);

    let as_of = cli.date.unwrap_or_else(|| Local::now().date_naive());
    let mut engine = ZoneEngine::new(config, as_of).context("Invalid overlay configuration")?;

    let viewport = Bounds::new(cli.south, cli.north, cli.west, cli.east);
    engine.viewport_changed(viewport, cli.zoom, Instant::now());
    let outcome = engine.refresh().context("Grid recomputation failed")?;

    let Some(query) = engine.query() else {
        bail!("no snapshot was published");
    };
    let snapshot = query.snapshot();
    match outcome {
        RecomputeOutcome::Inactive { .. } => {
            println!(
                "Zoom {} is below the grid threshold ({}); nothing to show.",
                cli.zoom,
                engine.config().limits.min_zoom
            );
        }
        RecomputeOutcome::Published { cells, .. } => {
            println!(
                "{} cells ({} x {} lines) for {} with rotation offset {}",
                cells,
                snapshot.horizontal_lines().len(),
                snapshot.vertical_lines().len(),
                as_of,
                snapshot.offset()
            );
            for zone in engine.zones().iter() {
                println!(
                    "  {}: {} cells in {} areas",
                    zone.name,
                    query.cells_of_zone(zone.id).len(),
                    snapshot.regions(zone.id).len()
                );
            }
        }
    }

    if let Some(point) = cli.locate {
        let candidates = cli
            .zones
            .iter()
            .map(|id| ZoneId::new(*id).with_context(|| format!("Unknown zone id {id}")))
            .collect::<Result<Vec<_>>>()?;
        match query.closest_zone(point, &candidates) {
            Some(found) => println!(
                "Closest: {} at cell {} ({:.1} km)",
                found.zone.name, found.cell.id, found.distance_km
            ),
            None => println!("No matching zone cells in view"),
        }
    }

    if let Some(dir) = &cli.export {
        let path = snapshot
            .export(engine.grid().info())
            .write_json(dir)
            .with_context(|| format!("Failed to export snapshot to {}", dir.display()))?;
        println!("Snapshot written to {}", path.display());
    }

    Ok(())
}
