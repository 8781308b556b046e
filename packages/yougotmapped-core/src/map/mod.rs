//! Map data model and rendering.
//!
//! The orchestrator produces a [`ResultSet`] of [`TaggedPoint`]s; a
//! [`MapRenderer`] turns it into an artifact on disk.

mod leaflet;

pub use leaflet::LeafletRenderer;

use crate::geo::{Coordinates, GeoRecord};
use serde::Serialize;
use std::path::PathBuf;

/// Zoom used when the map shows a single point
pub const SINGLE_POINT_ZOOM: u8 = 12;
/// Zoom used before bounds fitting when the map shows several points
pub const MULTI_POINT_ZOOM: u8 = 2;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("nothing to render")]
    Empty,
    #[error("failed to serialize map data: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write map to {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Display role of a point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PointRole {
    /// Location of a target itself
    Primary,
    /// Location of the last addressed traceroute hop towards a target
    HopEndpoint,
}

impl PointRole {
    pub fn color(self) -> &'static str {
        match self {
            PointRole::Primary => "red",
            PointRole::HopEndpoint => "blue",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            PointRole::Primary => "primary",
            PointRole::HopEndpoint => "hop-endpoint",
        }
    }
}

/// A geolocated record that can be drawn. Always has coordinates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TaggedPoint {
    /// Target the point belongs to, as the user typed it
    target: String,
    role: PointRole,
    color: &'static str,
    coordinates: Coordinates,
    record: GeoRecord,
}

impl TaggedPoint {
    /// Tag a record. Returns `None` if the record has no coordinates.
    pub fn new(target: impl Into<String>, record: GeoRecord, role: PointRole) -> Option<Self> {
        let coordinates = record.coordinates?;
        Some(Self {
            target: target.into(),
            role,
            color: role.color(),
            coordinates,
            record,
        })
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn role(&self) -> PointRole {
        self.role
    }

    pub fn color(&self) -> &'static str {
        self.color
    }

    pub fn coordinates(&self) -> Coordinates {
        self.coordinates
    }

    pub fn record(&self) -> &GeoRecord {
        &self.record
    }
}

/// Points in target order, each hop endpoint directly after its primary.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ResultSet {
    points: Vec<TaggedPoint>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, point: TaggedPoint) {
        self.points.push(point);
    }

    pub fn points(&self) -> &[TaggedPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn primary_count(&self) -> usize {
        self.points
            .iter()
            .filter(|p| p.role == PointRole::Primary)
            .count()
    }

    /// Viewport for the points, or `None` when there is nothing to show.
    pub fn view(&self) -> Option<MapView> {
        let first = self.points.first()?.coordinates;
        if self.points.len() == 1 {
            return Some(MapView {
                center: first,
                zoom: SINGLE_POINT_ZOOM,
                bounds: None,
            });
        }

        let (mut south, mut west, mut north, mut east) =
            (first.latitude, first.longitude, first.latitude, first.longitude);
        for p in &self.points[1..] {
            south = south.min(p.coordinates.latitude);
            north = north.max(p.coordinates.latitude);
            west = west.min(p.coordinates.longitude);
            east = east.max(p.coordinates.longitude);
        }

        Some(MapView {
            center: Coordinates {
                latitude: (south + north) / 2.0,
                longitude: (west + east) / 2.0,
            },
            zoom: MULTI_POINT_ZOOM,
            bounds: Some(Bounds {
                south_west: Coordinates {
                    latitude: south,
                    longitude: west,
                },
                north_east: Coordinates {
                    latitude: north,
                    longitude: east,
                },
            }),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Bounds {
    pub south_west: Coordinates,
    pub north_east: Coordinates,
}

/// Initial viewport. `bounds` is set when the renderer should fit all points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MapView {
    pub center: Coordinates,
    pub zoom: u8,
    pub bounds: Option<Bounds>,
}

/// Turns a non-empty result set into a persisted artifact.
pub trait MapRenderer: Send + Sync {
    /// Returns the path of the written artifact.
    fn render(&self, points: &ResultSet) -> Result<PathBuf, RenderError>;
}

/// Open a rendered map in the default browser.
#[cfg(feature = "browser")]
pub fn open_in_browser(path: &std::path::Path) -> std::io::Result<()> {
    let url = format!("file://{}", path.display());
    tracing::debug!("Opening {}", url);
    webbrowser::open(&url)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn record_at(ip: &str, lat: f64, lon: f64) -> GeoRecord {
        GeoRecord {
            ip: ip.to_string(),
            hostname: None,
            city: Some("Testville".to_string()),
            region: None,
            country: Some("US".to_string()),
            coordinates: Some(Coordinates {
                latitude: lat,
                longitude: lon,
            }),
            org: None,
            postal: None,
            timezone: None,
            bogon: false,
        }
    }

    pub(crate) fn point_at(
        target: &str,
        ip: &str,
        lat: f64,
        lon: f64,
        role: PointRole,
    ) -> TaggedPoint {
        TaggedPoint::new(target, record_at(ip, lat, lon), role).unwrap()
    }

    #[test]
    fn test_point_requires_coordinates() {
        let mut record = record_at("10.0.0.1", 1.0, 2.0);
        record.coordinates = None;
        assert!(TaggedPoint::new("10.0.0.1", record, PointRole::Primary).is_none());
    }

    #[test]
    fn test_role_colors_differ() {
        let primary = point_at("a", "1.1.1.1", 0.0, 0.0, PointRole::Primary);
        let hop = point_at("a", "2.2.2.2", 0.0, 0.0, PointRole::HopEndpoint);
        assert_eq!(primary.color(), "red");
        assert_eq!(hop.color(), "blue");
        assert_ne!(primary.color(), hop.color());
    }

    #[test]
    fn test_single_point_view() {
        let mut set = ResultSet::new();
        set.push(point_at("a", "1.1.1.1", 40.0, -74.0, PointRole::Primary));
        let view = set.view().unwrap();
        assert_eq!(view.zoom, SINGLE_POINT_ZOOM);
        assert_eq!(view.center.latitude, 40.0);
        assert!(view.bounds.is_none());
    }

    #[test]
    fn test_multi_point_view_fits_bounds() {
        let mut set = ResultSet::new();
        set.push(point_at("a", "1.1.1.1", 40.0, -74.0, PointRole::Primary));
        set.push(point_at("a", "2.2.2.2", 50.0, 10.0, PointRole::HopEndpoint));
        set.push(point_at("b", "3.3.3.3", 30.0, 0.0, PointRole::Primary));

        let view = set.view().unwrap();
        let bounds = view.bounds.unwrap();
        assert_eq!(bounds.south_west.latitude, 30.0);
        assert_eq!(bounds.south_west.longitude, -74.0);
        assert_eq!(bounds.north_east.latitude, 50.0);
        assert_eq!(bounds.north_east.longitude, 10.0);
        assert_eq!(view.center.latitude, 40.0);
        assert_eq!(view.center.longitude, -32.0);
        assert_eq!(set.primary_count(), 2);
    }

    #[test]
    fn test_empty_set_has_no_view() {
        assert!(ResultSet::new().view().is_none());
    }
}
