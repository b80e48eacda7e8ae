//! Declarative map content.
//!
//! The session describes what should be on the map as a flat list of [`MapFeature`]s.
//! A rendering adapter diffs consecutive lists with [`reconcile`] and applies only the
//! changes to the map SDK, so simulation state never holds SDK objects.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::Location;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Rendezvous,
    Participant,
    SearchResult,
    Candidate,
    Destination,
    Route,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates", rename_all = "snake_case")]
pub enum FeatureGeometry {
    Point(Location),
    Polyline(Vec<Location>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct FeatureStyle {
    /// `#RRGGBB`
    pub color: String,
    /// Marker diameter or line width in pixels.
    pub size: f32,
    pub outline_color: Option<String>,
    /// Popup is open on this feature.
    pub highlighted: bool,
}

impl FeatureStyle {
    pub fn marker(color: &str, size: f32) -> Self {
        Self {
            color: color.to_string(),
            size,
            outline_color: Some("#FFFFFF".to_string()),
            highlighted: false,
        }
    }

    pub fn line(color: &str, width: f32) -> Self {
        Self {
            color: color.to_string(),
            size: width,
            outline_color: None,
            highlighted: false,
        }
    }
}

/// One thing to draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapFeature {
    /// Stable across updates, e.g. `participant:barry`.
    pub id: String,
    pub kind: FeatureKind,
    pub geometry: FeatureGeometry,
    pub style: FeatureStyle,
    /// Popup content (title, address, votes, ...).
    pub metadata: BTreeMap<String, String>,
}

impl MapFeature {
    pub fn point(kind: FeatureKind, id: &str, location: Location, style: FeatureStyle) -> Self {
        Self {
            id: id.to_string(),
            kind,
            geometry: FeatureGeometry::Point(location),
            style,
            metadata: BTreeMap::new(),
        }
    }

    pub fn polyline(kind: FeatureKind, id: &str, points: Vec<Location>, style: FeatureStyle) -> Self {
        Self {
            id: id.to_string(),
            kind,
            geometry: FeatureGeometry::Polyline(points),
            style,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: impl ToString) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    pub fn highlighted(mut self, on: bool) -> Self {
        self.style.highlighted = on;
        self
    }
}

/// A change the rendering adapter must apply.
#[derive(Debug, Clone, PartialEq)]
pub enum FeatureChange {
    Add(MapFeature),
    Update(MapFeature),
    Remove(String),
}

/// Changes turning `previous` into `next`. Adds and updates follow `next`'s order;
/// removals come last.
pub fn reconcile(previous: &[MapFeature], next: &[MapFeature]) -> Vec<FeatureChange> {
    let before: HashMap<&str, &MapFeature> = previous.iter().map(|f| (f.id.as_str(), f)).collect();
    let after: HashMap<&str, &MapFeature> = next.iter().map(|f| (f.id.as_str(), f)).collect();

    let mut changes: Vec<FeatureChange> = next
        .iter()
        .filter_map(|f| match before.get(f.id.as_str()) {
            None => Some(FeatureChange::Add(f.clone())),
            Some(old) if *old != f => Some(FeatureChange::Update(f.clone())),
            Some(_) => None,
        })
        .collect();

    changes.extend(
        previous
            .iter()
            .filter(|f| !after.contains_key(f.id.as_str()))
            .map(|f| FeatureChange::Remove(f.id.clone())),
    );

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn marker(id: &str, lat: f64) -> MapFeature {
        MapFeature::point(FeatureKind::Participant, id, Location::new(lat, 0.0), FeatureStyle::marker("#FF6B6B", 12.0))
    }

    #[test]
    fn test_reconcile_add_update_remove() {
        let previous = vec![marker("a", 1.0), marker("b", 1.0)];
        let next = vec![marker("b", 2.0), marker("c", 1.0)];

        let changes = reconcile(&previous, &next);
        assert_eq!(
            changes,
            vec![
                FeatureChange::Update(marker("b", 2.0)),
                FeatureChange::Add(marker("c", 1.0)),
                FeatureChange::Remove("a".into()),
            ]
        );
    }

    #[test]
    fn test_reconcile_unchanged_is_empty() {
        let features = vec![marker("a", 1.0).with_meta("name", "Barry")];
        assert!(reconcile(&features, &features).is_empty());
    }

    #[test]
    fn test_geometry_serializes_tagged() {
        let json = serde_json::to_value(FeatureGeometry::Point(Location::new(1.0, 2.0))).unwrap();
        assert_eq!(json["type"], "point");
        assert_eq!(json["coordinates"]["latitude"], 1.0);
    }
}
