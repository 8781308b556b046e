//! Geolocation records as returned by the ipinfo.io JSON API.

use serde::{Deserialize, Serialize};

/// Latitude/longitude pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinates {
    /// Parse the service's `"lat,lon"` notation. Out-of-range values are rejected.
    pub fn parse(loc: &str) -> Option<Self> {
        let (lat, lon) = loc.split_once(',')?;
        let latitude: f64 = lat.trim().parse().ok()?;
        let longitude: f64 = lon.trim().parse().ok()?;
        if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
            return None;
        }
        Some(Self {
            latitude,
            longitude,
        })
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{},{}", self.latitude, self.longitude)
    }
}

/// Raw response body of `GET /{ip}/json`
#[derive(Debug, Deserialize)]
pub(crate) struct IpInfoResponse {
    ip: Option<String>,
    hostname: Option<String>,
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    loc: Option<String>,
    org: Option<String>,
    postal: Option<String>,
    timezone: Option<String>,
    #[serde(default)]
    bogon: bool,
    error: Option<IpInfoError>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct IpInfoError {
    title: Option<String>,
    message: Option<String>,
}

impl IpInfoError {
    pub(crate) fn describe(&self) -> String {
        match (&self.title, &self.message) {
            (Some(t), Some(m)) => format!("{}: {}", t, m),
            (Some(t), None) => t.clone(),
            (None, Some(m)) => m.clone(),
            (None, None) => "unknown error".to_string(),
        }
    }
}

impl IpInfoResponse {
    pub(crate) fn error(&self) -> Option<&IpInfoError> {
        self.error.as_ref()
    }

    /// Convert into a record, falling back to the queried address when the
    /// body omits `ip`.
    pub(crate) fn into_record(self, queried: &str) -> GeoRecord {
        let coordinates = self.loc.as_deref().and_then(|loc| {
            let parsed = Coordinates::parse(loc);
            if parsed.is_none() {
                tracing::debug!("Ignoring malformed loc '{}' for {}", loc, queried);
            }
            parsed
        });

        GeoRecord {
            ip: self.ip.unwrap_or_else(|| queried.to_string()),
            hostname: non_empty(self.hostname),
            city: non_empty(self.city),
            region: non_empty(self.region),
            country: non_empty(self.country),
            coordinates,
            org: non_empty(self.org),
            postal: non_empty(self.postal),
            timezone: non_empty(self.timezone),
            bogon: self.bogon,
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Metadata for one address. Records without coordinates are valid but
/// cannot be placed on a map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoRecord {
    pub ip: String,
    pub hostname: Option<String>,
    pub city: Option<String>,
    pub region: Option<String>,
    pub country: Option<String>,
    pub coordinates: Option<Coordinates>,
    pub org: Option<String>,
    pub postal: Option<String>,
    pub timezone: Option<String>,
    /// Private or reserved address the service has no data for
    #[serde(default)]
    pub bogon: bool,
}

impl GeoRecord {
    pub fn is_mappable(&self) -> bool {
        self.coordinates.is_some()
    }

    /// Report fields in display order. Missing values are `None`.
    pub fn fields(&self) -> [(&'static str, Option<String>); 9] {
        [
            ("Ip", Some(self.ip.clone())),
            ("Hostname", self.hostname.clone()),
            ("City", self.city.clone()),
            ("Region", self.region.clone()),
            ("Country", self.country.clone()),
            ("Loc", self.coordinates.map(|c| c.to_string())),
            ("Org", self.org.clone()),
            ("Postal", self.postal.clone()),
            ("Timezone", self.timezone.clone()),
        ]
    }
}
