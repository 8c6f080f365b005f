//! Route response model as returned by the directions provider via the backend
//!
//! Only the fields this crate reads are typed. Everything else the provider
//! sends is kept in `extra` so a response can be saved and reloaded intact.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::LatLng;

/// Human text plus machine value, e.g. `{"text": "0.3 km", "value": 312}`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct TextValue {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub value: f64,
}

/// Rectangular envelope given by its north-east and south-west corners
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub northeast: LatLng,
    pub southwest: LatLng,
}

impl Bounds {
    /// Smallest envelope containing all points, `None` for an empty input
    #[must_use]
    pub fn from_points(points: &[LatLng]) -> Option<Self> {
        let first = points.first()?;
        let mut bounds = Bounds {
            northeast: *first,
            southwest: *first,
        };
        for p in &points[1..] {
            bounds.northeast.lat = bounds.northeast.lat.max(p.lat);
            bounds.northeast.lng = bounds.northeast.lng.max(p.lng);
            bounds.southwest.lat = bounds.southwest.lat.min(p.lat);
            bounds.southwest.lng = bounds.southwest.lng.min(p.lng);
        }
        Some(bounds)
    }

    /// Corners are valid coordinates and north is not below south
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.northeast.is_valid()
            && self.southwest.is_valid()
            && self.northeast.lat >= self.southwest.lat
    }

    #[must_use]
    pub fn center(&self) -> LatLng {
        LatLng::new(
            (self.northeast.lat + self.southwest.lat) / 2.0,
            (self.northeast.lng + self.southwest.lng) / 2.0,
        )
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct EncodedPolyline {
    #[serde(default)]
    pub points: String,
}

/// One instruction unit within a leg
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Step {
    /// Instruction text, possibly containing HTML markup
    #[serde(default)]
    pub html_instructions: String,
    #[serde(default)]
    pub distance: Option<TextValue>,
    #[serde(default)]
    pub duration: Option<TextValue>,
    #[serde(default)]
    pub start_location: Option<LatLng>,
    #[serde(default)]
    pub end_location: Option<LatLng>,
    #[serde(default)]
    pub travel_mode: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Leg {
    #[serde(default)]
    pub distance: Option<TextValue>,
    #[serde(default)]
    pub duration: Option<TextValue>,
    #[serde(default)]
    pub start_location: Option<LatLng>,
    #[serde(default)]
    pub end_location: Option<LatLng>,
    #[serde(default)]
    pub start_address: Option<String>,
    #[serde(default)]
    pub end_address: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// One route alternative
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct Route {
    #[serde(default)]
    pub bounds: Option<Bounds>,
    #[serde(default)]
    pub legs: Vec<Leg>,
    #[serde(default)]
    pub overview_polyline: Option<EncodedPolyline>,
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Full result of a directions computation
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Default)]
pub struct RouteResponse {
    #[serde(default)]
    pub routes: Vec<Route>,
    #[serde(default)]
    pub status: Option<String>,
    /// Warnings added by the backend from user-reported accessibility points
    #[serde(default)]
    pub custom_accessibility_warnings: Vec<Value>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Position of a step inside a [`RouteResponse`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StepRef {
    pub route: usize,
    pub leg: usize,
    pub step: usize,
}

impl StepRef {
    pub const FIRST: StepRef = StepRef {
        route: 0,
        leg: 0,
        step: 0,
    };

    /// Step `index` of the first leg of the first route
    #[must_use]
    pub const fn first_leg(index: usize) -> Self {
        StepRef {
            route: 0,
            leg: 0,
            step: index,
        }
    }
}

impl RouteResponse {
    #[must_use]
    pub fn first_route(&self) -> Option<&Route> {
        self.routes.first()
    }

    #[must_use]
    pub fn first_leg(&self) -> Option<&Leg> {
        self.first_route()?.legs.first()
    }

    #[must_use]
    pub fn step(&self, at: StepRef) -> Option<&Step> {
        self.routes.get(at.route)?.legs.get(at.leg)?.steps.get(at.step)
    }

    /// Reference to the first step of the first leg of the first route, if any
    #[must_use]
    pub fn first_step_ref(&self) -> Option<StepRef> {
        self.step(StepRef::FIRST).map(|_| StepRef::FIRST)
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use serde_json::json;

    use super::RouteResponse;

    /// One route, one leg, `steps` walking steps between two Lagos addresses
    pub(crate) fn route_with_steps(steps: usize) -> RouteResponse {
        let steps: Vec<_> = (0..steps)
            .map(|i| {
                json!({
                    "html_instructions": format!("Head <b>north</b> on Street {i}"),
                    "distance": {"text": format!("{} m", 100 * (i + 1)), "value": 100 * (i + 1)},
                    "duration": {"text": "1 min", "value": 60},
                    "start_location": {"lat": 6.52 + i as f64 * 0.001, "lng": 3.37},
                    "end_location": {"lat": 6.521 + i as f64 * 0.001, "lng": 3.37},
                    "travel_mode": "WALKING"
                })
            })
            .collect();

        serde_json::from_value(json!({
            "status": "OK",
            "geocoded_waypoints": [],
            "routes": [{
                "summary": "Main St",
                "bounds": {
                    "northeast": {"lat": 6.53, "lng": 3.38},
                    "southwest": {"lat": 6.52, "lng": 3.37}
                },
                "overview_polyline": {"points": "_p~iF~ps|U_ulLnnqC_mqNvxq`@"},
                "legs": [{
                    "distance": {"text": "1.2 km", "value": 1200},
                    "duration": {"text": "15 mins", "value": 900},
                    "start_address": "123 Main St",
                    "end_address": "456 Oak Ave",
                    "start_location": {"lat": 6.52, "lng": 3.37},
                    "end_location": {"lat": 6.53, "lng": 3.38},
                    "steps": steps
                }]
            }]
        }))
        .expect("fixture is valid")
    }
}
