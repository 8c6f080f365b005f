//! Data models for `AccessNav`
//!
//! This module contains the domain models organized by concern:
//! - Location: coordinates and free-text place inputs
//! - Preferences: routing preferences persisted per user
//! - Route: directions provider response and step references
//! - Saved route: routes persisted by the backend
//! - Accessibility: user-reported accessibility points

pub mod accessibility;
pub mod location;
pub mod preferences;
pub mod route;
pub mod saved_route;

// Re-export all public types for convenient access
pub use accessibility::{AccessibilityPoint, AddPointReceipt, NewAccessibilityPoint, PointQuery, PointType};
pub use location::{LatLng, PlaceInput};
pub use preferences::{MobilityMode, Preferences, PreferencesUpdate, TravelMode};
pub use route::{Bounds, Leg, Route, RouteResponse, Step, StepRef, TextValue};
pub use saved_route::{
    MessageReceipt, NewSavedRoute, SaveRouteReceipt, SavedPlace, SavedRoute, SavedRouteSummary,
};
