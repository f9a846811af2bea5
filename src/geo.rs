//! Spherical-earth helpers shared by the grid and the locate queries

use serde::{Deserialize, Serialize};

/// Mean earth radius used for great-circle distances
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Length of one degree of latitude
pub const KM_PER_DEGREE_LAT: f64 = 111.32;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLng {
    pub lat: f64,
    pub lng: f64,
}

impl LatLng {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    pub fn is_finite(&self) -> bool {
        self.lat.is_finite() && self.lng.is_finite()
    }

    pub fn distance_km(&self, other: LatLng) -> f64 {
        haversine_km(*self, other)
    }
}

/// Axis-aligned box in degrees. Edges are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub south: f64,
    pub north: f64,
    pub west: f64,
    pub east: f64,
}

impl Bounds {
    pub fn new(south: f64, north: f64, west: f64, east: f64) -> Self {
        Self {
            south,
            north,
            west,
            east,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.south.is_finite()
            && self.north.is_finite()
            && self.west.is_finite()
            && self.east.is_finite()
    }

    pub fn contains(&self, point: LatLng) -> bool {
        point.lat >= self.south
            && point.lat <= self.north
            && point.lng >= self.west
            && point.lng <= self.east
    }

    pub fn intersects(&self, other: &Bounds) -> bool {
        other.north >= self.south
            && other.south <= self.north
            && other.east >= self.west
            && other.west <= self.east
    }

    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.south + self.north) / 2.0,
            (self.west + self.east) / 2.0,
        )
    }

    /// Grow the box by the given margins on every side
    pub fn expand(&self, lat_margin: f64, lng_margin: f64) -> Bounds {
        Bounds {
            south: self.south - lat_margin,
            north: self.north + lat_margin,
            west: self.west - lng_margin,
            east: self.east + lng_margin,
        }
    }
}

/// Great-circle distance in kilometres (haversine)
pub fn haversine_km(a: LatLng, b: LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

pub fn km_to_lat_degrees(km: f64) -> f64 {
    km / KM_PER_DEGREE_LAT
}

/// Longitude degrees spanning `km` at latitude `at_lat`. Not finite at the poles.
pub fn km_to_lng_degrees(km: f64, at_lat: f64) -> f64 {
    km / (KM_PER_DEGREE_LAT * at_lat.to_radians().cos())
}
