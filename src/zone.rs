//! The four zones and their display records

use std::fmt;

use serde::{Deserialize, Serialize};

pub const ZONE_COUNT: usize = 4;

/// Zone identifier, always in `1..=4`
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub struct ZoneId(u8);

impl ZoneId {
    pub const ALL: [ZoneId; ZONE_COUNT] = [ZoneId(1), ZoneId(2), ZoneId(3), ZoneId(4)];

    pub fn new(id: u8) -> Option<Self> {
        (1..=ZONE_COUNT as u8).contains(&id).then_some(Self(id))
    }

    /// Clamp any pattern output into the valid range
    pub fn clamped(value: i64) -> Self {
        Self(value.clamp(1, ZONE_COUNT as i64) as u8)
    }

    pub fn get(self) -> u8 {
        self.0
    }

    /// Zero-based index into per-zone tables
    pub fn index(self) -> usize {
        self.0 as usize - 1
    }

    /// Rotate forward by `offset` steps, wrapping 4 back to 1
    pub fn rotate(self, offset: u8) -> Self {
        let rotated = (self.index() + offset as usize) % ZONE_COUNT;
        Self(rotated as u8 + 1)
    }
}

impl TryFrom<u8> for ZoneId {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        ZoneId::new(value).ok_or_else(|| format!("zone id {value} is outside 1..=4"))
    }
}

impl From<ZoneId> for u8 {
    fn from(value: ZoneId) -> Self {
        value.0
    }
}

impl fmt::Display for ZoneId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDefinition {
    pub id: ZoneId,
    pub name: String,
    pub color: String,
    pub opacity: f32,
}

impl ZoneDefinition {
    pub fn new(id: ZoneId, name: impl Into<String>, color: impl Into<String>, opacity: f32) -> Self {
        Self {
            id,
            name: name.into(),
            color: color.into(),
            opacity,
        }
    }
}

/// Exactly one definition per zone id, ordered by id
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ZoneCatalog {
    zones: [ZoneDefinition; ZONE_COUNT],
}

impl ZoneCatalog {
    /// Build from definitions in any order. Returns `None` unless every id 1..=4
    /// appears exactly once.
    pub fn from_definitions(definitions: &[ZoneDefinition]) -> Option<Self> {
        if definitions.len() != ZONE_COUNT {
            return None;
        }
        let mut sorted = definitions.to_vec();
        sorted.sort_by_key(|zone| zone.id);
        let in_order = sorted
            .iter()
            .zip(ZoneId::ALL)
            .all(|(zone, id)| zone.id == id);
        if !in_order {
            return None;
        }
        let zones: [ZoneDefinition; ZONE_COUNT] = sorted.try_into().ok()?;
        Some(Self { zones })
    }

    pub fn get(&self, id: ZoneId) -> &ZoneDefinition {
        &self.zones[id.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ZoneDefinition> {
        self.zones.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definitions() -> Vec<ZoneDefinition> {
        vec![
            ZoneDefinition::new(ZoneId::ALL[2], "Zone 3", "#45B7D1", 0.4),
            ZoneDefinition::new(ZoneId::ALL[0], "Zone 1", "#FF6B6B", 0.4),
            ZoneDefinition::new(ZoneId::ALL[3], "Zone 4", "#96CEB4", 0.4),
            ZoneDefinition::new(ZoneId::ALL[1], "Zone 2", "#4ECDC4", 0.4),
        ]
    }

    #[test]
    fn test_zone_id_range() {
        assert!(ZoneId::new(0).is_none());
        assert!(ZoneId::new(5).is_none());
        assert_eq!(ZoneId::new(3).map(ZoneId::get), Some(3));
        assert_eq!(ZoneId::clamped(-7).get(), 1);
        assert_eq!(ZoneId::clamped(9).get(), 4);
    }

    #[test]
    fn test_rotation_wraps() {
        let one = ZoneId::ALL[0];
        assert_eq!(one.rotate(0).get(), 1);
        assert_eq!(one.rotate(3).get(), 4);
        assert_eq!(ZoneId::ALL[3].rotate(1).get(), 1);
        assert_eq!(ZoneId::ALL[2].rotate(2).get(), 1);
    }

    #[test]
    fn test_catalog_orders_by_id() {
        let catalog = ZoneCatalog::from_definitions(&definitions()).unwrap();
        let names: Vec<_> = catalog.iter().map(|z| z.name.as_str()).collect();
        assert_eq!(names, ["Zone 1", "Zone 2", "Zone 3", "Zone 4"]);
        assert_eq!(catalog.get(ZoneId::ALL[3]).color, "#96CEB4");
    }

    #[test]
    fn test_catalog_rejects_duplicates_and_wrong_count() {
        let mut defs = definitions();
        defs[0].id = ZoneId::ALL[0];
        assert!(ZoneCatalog::from_definitions(&defs).is_none());
        assert!(ZoneCatalog::from_definitions(&definitions()[..3]).is_none());
    }

    #[test]
    fn test_zone_id_serde() {
        let id: ZoneId = serde_json::from_str("2").unwrap();
        assert_eq!(id.get(), 2);
        assert!(serde_json::from_str::<ZoneId>("7").is_err());
        assert_eq!(serde_json::to_string(&id).unwrap(), "2");
    }
}
