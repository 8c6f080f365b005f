//! Saved routes owned by the backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{LatLng, RouteResponse};

/// Origin or destination as stored with a saved route
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct SavedPlace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
    #[serde(default)]
    pub address: String,
}

impl SavedPlace {
    #[must_use]
    pub fn new(location: Option<LatLng>, address: Option<&str>, unknown: &str) -> Self {
        Self {
            lat: location.map(|l| l.lat),
            lng: location.map(|l| l.lng),
            address: address.unwrap_or(unknown).to_string(),
        }
    }

    #[must_use]
    pub fn coordinates(&self) -> Option<LatLng> {
        Some(LatLng::new(self.lat?, self.lng?))
    }
}

/// Body of `POST /routes`
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewSavedRoute {
    pub name: String,
    pub origin: SavedPlace,
    pub destination: SavedPlace,
    pub route_snapshot: RouteResponse,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub custom_warnings: Vec<Value>,
}

/// Reply to `POST /routes`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SaveRouteReceipt {
    #[serde(default)]
    pub message: String,
    pub route_id: String,
}

/// Generic `{message}` reply
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct MessageReceipt {
    #[serde(default)]
    pub message: String,
}

/// Entry of `GET /routes`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedRouteSummary {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub origin: SavedPlace,
    #[serde(default)]
    pub destination: SavedPlace,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Full saved route from `GET /routes/{id}`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SavedRoute {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub origin: SavedPlace,
    #[serde(default)]
    pub destination: SavedPlace,
    #[serde(default, alias = "googleRouteData")]
    pub route_snapshot: Option<RouteResponse>,
    #[serde(default)]
    pub custom_warnings: Vec<Value>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}
