//! `AccessNav` - Accessible navigation client
//!
//! This library provides the client side of an accessibility-aware
//! navigation service: the backend API client, the route request state
//! machine, map viewport synchronization, turn-by-turn directions with
//! speech output, and geolocation.

pub mod api;
pub mod auth;
pub mod config;
pub mod directions;
pub mod error;
pub mod geolocation;
pub mod logging;
pub mod map_sync;
pub mod models;
pub mod orchestrator;
pub mod polyline;
pub mod preferences;
pub mod speech;

// Re-export core types for public API
pub use api::{ApiError, BackendClient, PreferencesBackend, RouteService};
pub use auth::AuthToken;
pub use config::AccessNavConfig;
pub use directions::{DirectionsPresenter, DirectionsView, StepItem};
pub use error::{AccessNavError, LocationErrorKind};
pub use geolocation::{GeolocationOptions, GeolocationWatcher, LocationState, Position, PositionSource};
pub use map_sync::{HeadlessMap, MapSurface, MapSynchronizer, Viewport};
pub use models::{LatLng, PlaceInput, Preferences, PreferencesUpdate, RouteResponse, StepRef};
pub use orchestrator::{RequestStatus, RouteOrchestrator, RouteState};
pub use preferences::PreferencesStore;
pub use speech::{SpeechBackend, SpeechEvent, SpeechSession, VoiceDescriptor};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, AccessNavError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
