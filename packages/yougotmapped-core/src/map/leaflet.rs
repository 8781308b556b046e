//! Self-contained Leaflet HTML map

use super::{MapRenderer, MapView, RenderError, ResultSet, TaggedPoint};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Radius of the "approximate area" circle drawn around each point, in meters
const AREA_RADIUS_M: u32 = 10_000;

const TEMPLATE: &str = r#"<!DOCTYPE html>
<html>
<head>
<meta charset="utf-8">
<title>__TITLE__</title>
<meta name="viewport" content="width=device-width, initial-scale=1.0">
<link rel="stylesheet" href="https://unpkg.com/leaflet@1.9.4/dist/leaflet.css">
<script src="https://unpkg.com/leaflet@1.9.4/dist/leaflet.js"></script>
<style>html, body, #map { height: 100%; margin: 0; }</style>
</head>
<body>
<div id="map"></div>
<script>
const doc = __DATA__;
const map = L.map("map").setView([doc.view.center.latitude, doc.view.center.longitude], doc.view.zoom);
L.tileLayer("https://{s}.tile.openstreetmap.org/{z}/{x}/{y}.png", {
  maxZoom: 19,
  attribution: "&copy; OpenStreetMap contributors"
}).addTo(map);
function popup(lines) {
  const el = document.createElement("div");
  lines.forEach(function (line) {
    const row = document.createElement("div");
    row.textContent = line;
    el.appendChild(row);
  });
  return el;
}
doc.points.forEach(function (p) {
  const icon = L.divIcon({
    className: "",
    html: '<svg width="18" height="18"><circle cx="9" cy="9" r="7" fill="' + p.color + '" stroke="white" stroke-width="2"/></svg>',
    iconSize: [18, 18],
    iconAnchor: [9, 9]
  });
  L.marker([p.lat, p.lon], { icon: icon, title: p.title }).bindPopup(popup(p.lines)).addTo(map);
  L.circle([p.lat, p.lon], {
    radius: doc.radius,
    color: p.color,
    fill: true,
    fillColor: p.color,
    fillOpacity: 0.2
  }).bindPopup("Approximate Area").addTo(map);
});
if (doc.view.bounds) {
  map.fitBounds([
    [doc.view.bounds.south_west.latitude, doc.view.bounds.south_west.longitude],
    [doc.view.bounds.north_east.latitude, doc.view.bounds.north_east.longitude]
  ], { padding: [40, 40] });
}
</script>
</body>
</html>
"#;

#[derive(Serialize)]
struct MapDocument<'a> {
    view: MapView,
    radius: u32,
    points: Vec<MarkerData<'a>>,
}

#[derive(Serialize)]
struct MarkerData<'a> {
    lat: f64,
    lon: f64,
    color: &'a str,
    title: String,
    lines: Vec<String>,
}

impl<'a> MarkerData<'a> {
    fn from_point(point: &'a TaggedPoint) -> Self {
        let record = point.record();
        let na = |v: &Option<String>| v.clone().unwrap_or_else(|| "N/A".to_string());
        let coords = point.coordinates();

        Self {
            lat: coords.latitude,
            lon: coords.longitude,
            color: point.color(),
            title: format!("{} ({})", record.ip, point.role().label()),
            lines: vec![
                format!("IP: {}", record.ip),
                format!("City: {}", na(&record.city)),
                format!("Region: {}", na(&record.region)),
                format!("Country: {}", na(&record.country)),
                format!("Target: {}", point.target()),
                format!("Role: {}", point.role().label()),
            ],
        }
    }
}

/// Writes an interactive HTML map backed by Leaflet and OpenStreetMap tiles.
#[derive(Debug, Clone)]
pub struct LeafletRenderer {
    output: PathBuf,
    title: String,
}

impl LeafletRenderer {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            output: output.into(),
            title: "IP Geolocation Map".to_string(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    fn build_html(&self, points: &ResultSet) -> Result<String, RenderError> {
        let view = points.view().ok_or(RenderError::Empty)?;
        let doc = MapDocument {
            view,
            radius: AREA_RADIUS_M,
            points: points.points().iter().map(MarkerData::from_point).collect(),
        };

        // `</` inside a script element would end it early
        let data = serde_json::to_string(&doc)?.replace("</", "<\\/");

        Ok(TEMPLATE
            .replace("__TITLE__", &escape_html(&self.title))
            .replace("__DATA__", &data))
    }
}

impl MapRenderer for LeafletRenderer {
    fn render(&self, points: &ResultSet) -> Result<PathBuf, RenderError> {
        let html = self.build_html(points)?;

        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| RenderError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        fs::write(&self.output, html).map_err(|e| RenderError::Io {
            path: self.output.clone(),
            source: e,
        })?;

        tracing::info!("Map with {} points saved to {:?}", points.len(), self.output);
        Ok(std::path::absolute(&self.output).unwrap_or_else(|_| self.output.clone()))
    }
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
