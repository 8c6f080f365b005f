//! User routing preferences

use serde::{Deserialize, Serialize};

#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MobilityMode {
    #[default]
    Standard,
    Wheelchair,
}

#[derive(Debug, Default, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TravelMode {
    #[default]
    Walking,
    Transit,
}

/// Routing preferences injected into every route request.
///
/// Always fully populated: keys missing from a backend payload are
/// backfilled from [`Preferences::default`] during deserialization.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Preferences {
    #[serde(rename = "defaultMobility", alias = "mobilityMode")]
    pub mobility_mode: MobilityMode,
    #[serde(rename = "avoidStairs")]
    pub avoid_stairs: bool,
    #[serde(rename = "wheelchairAccessibleTransit")]
    pub wheelchair_accessible_transit: bool,
    #[serde(rename = "mode", alias = "travelMode")]
    pub travel_mode: TravelMode,
    #[serde(rename = "voiceURI")]
    pub voice_uri: Option<String>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            mobility_mode: MobilityMode::Standard,
            avoid_stairs: true,
            wheelchair_accessible_transit: true,
            travel_mode: TravelMode::Walking,
            voice_uri: None,
        }
    }
}

impl Preferences {
    /// New snapshot with the fields present in `update` applied on top of `self`
    #[must_use]
    pub fn merged(&self, update: &PreferencesUpdate) -> Self {
        Self {
            mobility_mode: update.mobility_mode.unwrap_or(self.mobility_mode),
            avoid_stairs: update.avoid_stairs.unwrap_or(self.avoid_stairs),
            wheelchair_accessible_transit: update
                .wheelchair_accessible_transit
                .unwrap_or(self.wheelchair_accessible_transit),
            travel_mode: update.travel_mode.unwrap_or(self.travel_mode),
            voice_uri: match &update.voice_uri {
                Some(voice) => voice.clone(),
                None => self.voice_uri.clone(),
            },
        }
    }
}

/// Partial preferences body for `PUT /user/preferences`
#[derive(Debug, Default, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct PreferencesUpdate {
    #[serde(rename = "defaultMobility", skip_serializing_if = "Option::is_none")]
    pub mobility_mode: Option<MobilityMode>,
    #[serde(rename = "avoidStairs", skip_serializing_if = "Option::is_none")]
    pub avoid_stairs: Option<bool>,
    #[serde(
        rename = "wheelchairAccessibleTransit",
        skip_serializing_if = "Option::is_none"
    )]
    pub wheelchair_accessible_transit: Option<bool>,
    #[serde(rename = "mode", skip_serializing_if = "Option::is_none")]
    pub travel_mode: Option<TravelMode>,
    /// `Some(None)` clears the stored voice, `None` leaves it untouched
    #[serde(rename = "voiceURI", skip_serializing_if = "Option::is_none")]
    pub voice_uri: Option<Option<String>>,
}

impl PreferencesUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

impl From<&Preferences> for PreferencesUpdate {
    fn from(prefs: &Preferences) -> Self {
        Self {
            mobility_mode: Some(prefs.mobility_mode),
            avoid_stairs: Some(prefs.avoid_stairs),
            wheelchair_accessible_transit: Some(prefs.wheelchair_accessible_transit),
            travel_mode: Some(prefs.travel_mode),
            voice_uri: Some(prefs.voice_uri.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_missing_keys_are_backfilled() {
        let prefs: Preferences =
            serde_json::from_value(json!({"defaultMobility": "wheelchair", "voiceURI": null}))
                .unwrap();
        assert_eq!(prefs.mobility_mode, MobilityMode::Wheelchair);
        assert!(prefs.avoid_stairs);
        assert!(prefs.wheelchair_accessible_transit);
        assert_eq!(prefs.travel_mode, TravelMode::Walking);
        assert_eq!(prefs.voice_uri, None);
    }

    #[test]
    fn test_aliases_accepted() {
        let prefs: Preferences = serde_json::from_value(json!({
            "mobilityMode": "wheelchair",
            "travelMode": "transit",
            "avoidStairs": false
        }))
        .unwrap();
        assert_eq!(prefs.mobility_mode, MobilityMode::Wheelchair);
        assert_eq!(prefs.travel_mode, TravelMode::Transit);
        assert!(!prefs.avoid_stairs);
    }

    #[test]
    fn test_wire_names() {
        let value = serde_json::to_value(Preferences::default()).unwrap();
        assert_eq!(
            value,
            json!({
                "defaultMobility": "standard",
                "avoidStairs": true,
                "wheelchairAccessibleTransit": true,
                "mode": "walking",
                "voiceURI": null
            })
        );
    }

    #[test]
    fn test_merged_leaves_source_untouched() {
        let base = Preferences::default();
        let update = PreferencesUpdate {
            travel_mode: Some(TravelMode::Transit),
            voice_uri: Some(Some("urn:voice:en-gb".into())),
            ..Default::default()
        };
        let next = base.merged(&update);
        assert_eq!(next.travel_mode, TravelMode::Transit);
        assert_eq!(next.voice_uri.as_deref(), Some("urn:voice:en-gb"));
        assert_eq!(base, Preferences::default());

        let cleared = next.merged(&PreferencesUpdate {
            voice_uri: Some(None),
            ..Default::default()
        });
        assert_eq!(cleared.voice_uri, None);
    }

    #[test]
    fn test_update_serializes_only_present_fields() {
        let update = PreferencesUpdate {
            avoid_stairs: Some(false),
            ..Default::default()
        };
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"avoidStairs": false}));
        assert!(PreferencesUpdate::default().is_empty());
    }
}
