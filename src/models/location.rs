//! Location model for geographic coordinates and place inputs

use std::fmt;

use serde::{Deserialize, Serialize};

/// A latitude/longitude pair in decimal degrees
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct LatLng {
    /// Latitude in decimal degrees
    pub lat: f64,
    /// Longitude in decimal degrees
    pub lng: f64,
}

impl LatLng {
    #[must_use]
    pub const fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Both components finite and within the WGS84 ranges
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance to another point in kilometers
    #[must_use]
    pub fn distance_km(&self, other: &LatLng) -> f64 {
        haversine::distance(
            haversine::Location {
                latitude: self.lat,
                longitude: self.lng,
            },
            haversine::Location {
                latitude: other.lat,
                longitude: other.lng,
            },
            haversine::Units::Kilometers,
        )
    }
}

impl fmt::Display for LatLng {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}

/// Origin or destination of a route request.
///
/// Serialized untagged: an address is a bare JSON string, coordinates are
/// a `{lat, lng}` object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum PlaceInput {
    Coordinates(LatLng),
    Address(String),
}

impl PlaceInput {
    /// Parse free text: `"lat,lng"` (or whitespace separated) becomes
    /// coordinates, anything else is passed through as an address.
    #[must_use]
    pub fn parse(input: &str) -> Self {
        let input = input.trim();
        match parse_coordinates(input) {
            Some(coords) => PlaceInput::Coordinates(coords),
            None => PlaceInput::Address(input.to_string()),
        }
    }
}

impl From<LatLng> for PlaceInput {
    fn from(value: LatLng) -> Self {
        PlaceInput::Coordinates(value)
    }
}

impl fmt::Display for PlaceInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlaceInput::Coordinates(c) => write!(f, "{c}"),
            PlaceInput::Address(a) => f.write_str(a),
        }
    }
}

fn parse_coordinates(input: &str) -> Option<LatLng> {
    let parts: Vec<&str> = input
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect();

    if parts.len() != 2 {
        return None;
    }

    let lat = parts[0].parse::<f64>().ok()?;
    let lng = parts[1].parse::<f64>().ok()?;
    let coords = LatLng::new(lat, lng);
    coords.is_valid().then_some(coords)
}
