//! User-reported accessibility points (ramps, elevators, obstacles...)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::LatLng;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum PointType {
    Ramp,
    Elevator,
    Stairs,
    AccessibleEntrance,
    AccessibleToilet,
    Obstacle,
    #[serde(untagged)]
    Other(String),
}

impl PointType {
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            PointType::Ramp => "ramp",
            PointType::Elevator => "elevator",
            PointType::Stairs => "stairs",
            PointType::AccessibleEntrance => "accessible-entrance",
            PointType::AccessibleToilet => "accessible-toilet",
            PointType::Obstacle => "obstacle",
            PointType::Other(other) => other,
        }
    }
}

impl std::str::FromStr for PointType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "ramp" => PointType::Ramp,
            "elevator" => PointType::Elevator,
            "stairs" => PointType::Stairs,
            "accessible-entrance" => PointType::AccessibleEntrance,
            "accessible-toilet" => PointType::AccessibleToilet,
            "obstacle" => PointType::Obstacle,
            other => PointType::Other(other.to_string()),
        })
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AccessibilityPoint {
    #[serde(alias = "_id")]
    pub id: String,
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "type")]
    pub point_type: PointType,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl AccessibilityPoint {
    #[must_use]
    pub fn location(&self) -> LatLng {
        LatLng::new(self.lat, self.lng)
    }
}

/// Body of `POST /accessibility-points`
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct NewAccessibilityPoint {
    pub lat: f64,
    pub lng: f64,
    #[serde(rename = "type")]
    pub point_type: PointType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Reply to `POST /accessibility-points`
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AddPointReceipt {
    #[serde(default)]
    pub message: String,
    pub point_id: String,
}

/// Query for `GET /accessibility-points`
#[derive(Debug, Clone, PartialEq)]
pub struct PointQuery {
    pub center: LatLng,
    /// Search radius in meters; the backend default applies when absent
    pub radius: Option<u32>,
    pub point_type: Option<PointType>,
}

impl PointQuery {
    #[must_use]
    pub fn near(center: LatLng) -> Self {
        Self {
            center,
            radius: None,
            point_type: None,
        }
    }

    /// URL query string without the leading `?`
    #[must_use]
    pub fn to_query_string(&self) -> String {
        let mut query = format!("lat={}&lng={}", self.center.lat, self.center.lng);
        if let Some(radius) = self.radius {
            query.push_str(&format!("&radius={radius}"));
        }
        if let Some(point_type) = &self.point_type {
            query.push_str("&type=");
            query.push_str(&urlencoding::encode(point_type.as_str()));
        }
        query
    }
}

/// Sort points by distance from `center`, closest first
pub fn sort_by_distance(points: &mut [AccessibilityPoint], center: &LatLng) {
    points.sort_by(|a, b| {
        a.location()
            .distance_km(center)
            .total_cmp(&b.location().distance_km(center))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_point_type_wire_format() {
        assert_eq!(
            serde_json::to_value(PointType::AccessibleEntrance).unwrap(),
            json!("accessible-entrance")
        );
        let other: PointType = serde_json::from_value(json!("tactile-paving")).unwrap();
        assert_eq!(other, PointType::Other("tactile-paving".into()));
        assert_eq!("Ramp".parse::<PointType>().unwrap(), PointType::Ramp);
    }

    #[test]
    fn test_query_string() {
        let mut query = PointQuery::near(LatLng::new(6.5, 3.4));
        assert_eq!(query.to_query_string(), "lat=6.5&lng=3.4");

        query.radius = Some(500);
        query.point_type = Some(PointType::Other("bus stop".into()));
        assert_eq!(
            query.to_query_string(),
            "lat=6.5&lng=3.4&radius=500&type=bus%20stop"
        );
    }

    #[test]
    fn test_sort_by_distance() {
        let point = |id: &str, lat: f64| AccessibilityPoint {
            id: id.into(),
            lat,
            lng: 3.4,
            point_type: PointType::Ramp,
            description: None,
            image_url: None,
            source: None,
            created_at: None,
        };
        let mut points = vec![point("far", 7.5), point("near", 6.51), point("mid", 6.9)];
        sort_by_distance(&mut points, &LatLng::new(6.5, 3.4));
        let ids: Vec<_> = points.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, ["near", "mid", "far"]);
    }
}
