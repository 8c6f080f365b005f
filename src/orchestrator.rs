//! Route request state machine
//!
//! `Idle -> Loading -> {Success, Error}`. Each transition replaces the whole
//! [`RouteState`] snapshot on a watch channel, so observers never see a
//! half-updated state. Entering `Loading` clears the previous route, error
//! and step.
//!
//! Overlapping requests are not serialized: whichever response resolves
//! last determines the final state.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use crate::api::{ApiError, RouteService};
use crate::auth::AuthToken;
use crate::error::{AccessNavError, LocationErrorKind};
use crate::geolocation::GeolocationWatcher;
use crate::models::{
    NewSavedRoute, PlaceInput, Preferences, RouteResponse, SaveRouteReceipt, SavedPlace, StepRef,
};
use crate::Result;

const MISSING_INPUT_MESSAGE: &str = "Please enter both origin and destination.";
const UNKNOWN_PLACE: &str = "Unknown";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestStatus {
    #[default]
    Idle,
    Loading,
    Success,
    Error,
}

/// Snapshot of the route request lifecycle
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RouteState {
    pub status: RequestStatus,
    pub route: Option<Arc<RouteResponse>>,
    /// User-visible failure text
    pub error: Option<String>,
    pub current_step: Option<StepRef>,
}

impl RouteState {
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.status == RequestStatus::Loading
    }

    fn loading() -> Self {
        Self {
            status: RequestStatus::Loading,
            ..Self::default()
        }
    }

    fn success(route: Arc<RouteResponse>) -> Self {
        let current_step = route.first_step_ref();
        Self {
            status: RequestStatus::Success,
            route: Some(route),
            error: None,
            current_step,
        }
    }

    fn failed(error: &AccessNavError) -> Self {
        Self {
            status: RequestStatus::Error,
            error: Some(error.user_message()),
            ..Self::default()
        }
    }
}

/// Whether `input` asks for the device position
#[must_use]
pub fn is_my_location(input: &str) -> bool {
    let normalized: String = input
        .chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect();
    matches!(normalized.as_str(), "mylocation" | "currentlocation")
}

pub struct RouteOrchestrator<S: RouteService> {
    service: S,
    geolocation: Option<Arc<GeolocationWatcher>>,
    state: watch::Sender<RouteState>,
}

impl<S: RouteService> RouteOrchestrator<S> {
    pub fn new(service: S, geolocation: Option<Arc<GeolocationWatcher>>) -> Self {
        let (state, _) = watch::channel(RouteState::default());
        Self {
            service,
            geolocation,
            state,
        }
    }

    /// Current snapshot
    #[must_use]
    pub fn state(&self) -> RouteState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<RouteState> {
        self.state.subscribe()
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    /// Validate, resolve the origin, fetch a route and publish the outcome
    #[instrument(skip(self, preferences))]
    pub async fn request_route(
        &self,
        origin: &str,
        destination: &str,
        preferences: &Preferences,
    ) -> Result<Arc<RouteResponse>> {
        self.state.send_replace(RouteState::loading());

        let result = self.resolve_and_fetch(origin, destination, preferences).await;
        self.publish(result)
    }

    async fn resolve_and_fetch(
        &self,
        origin: &str,
        destination: &str,
        preferences: &Preferences,
    ) -> Result<Arc<RouteResponse>> {
        let (origin, destination) = (origin.trim(), destination.trim());
        if origin.is_empty() || destination.is_empty() {
            return Err(AccessNavError::validation(MISSING_INPUT_MESSAGE));
        }

        let origin = self.resolve_place(origin).await?;
        let destination = PlaceInput::parse(destination);

        info!("Requesting route from {} to {}", origin, destination);
        let route = self
            .service
            .compute_route(&origin, &destination, preferences)
            .await?;
        Ok(Arc::new(route))
    }

    async fn resolve_place(&self, input: &str) -> Result<PlaceInput> {
        if !is_my_location(input) {
            return Ok(PlaceInput::parse(input));
        }

        let watcher = self
            .geolocation
            .as_ref()
            .ok_or(AccessNavError::Location(LocationErrorKind::Unsupported))?;
        let position = watcher.resolve().await?;
        debug!("Resolved current location to {}", position.coords);
        Ok(PlaceInput::Coordinates(position.coords))
    }

    /// Load a saved route and make its snapshot the active route
    #[instrument(skip(self, token))]
    pub async fn load_saved_route(&self, id: &str, token: &AuthToken) -> Result<Arc<RouteResponse>> {
        self.state.send_replace(RouteState::loading());

        let result = async {
            let saved = self.service.get_route(id, token).await?;
            let snapshot = saved.route_snapshot.ok_or_else(|| {
                ApiError::invalid_response(200, format!("saved route {id} has no route data"))
            })?;
            info!("Loaded saved route '{}'", saved.name);
            Ok::<_, AccessNavError>(Arc::new(snapshot))
        }
        .await;

        self.publish(result)
    }

    /// Save the active route under `name`
    #[instrument(skip(self, token))]
    pub async fn save_current_route(
        &self,
        name: &str,
        token: &AuthToken,
    ) -> Result<SaveRouteReceipt> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AccessNavError::validation("Please enter a name for the route."));
        }

        let route = self
            .state
            .borrow()
            .route
            .clone()
            .ok_or_else(|| AccessNavError::validation("No route to save."))?;

        let leg = route.first_leg();
        let origin = SavedPlace::new(
            leg.and_then(|l| l.start_location),
            leg.and_then(|l| l.start_address.as_deref()),
            UNKNOWN_PLACE,
        );
        let destination = SavedPlace::new(
            leg.and_then(|l| l.end_location),
            leg.and_then(|l| l.end_address.as_deref()),
            UNKNOWN_PLACE,
        );

        let request = NewSavedRoute {
            name: name.to_string(),
            origin,
            destination,
            route_snapshot: (*route).clone(),
            custom_warnings: route.custom_accessibility_warnings.clone(),
        };

        let receipt = self.service.save_route(&request, token).await?;
        info!("Saved route '{}' as {}", name, receipt.route_id);
        Ok(receipt)
    }

    /// Select step `index` of the first leg; `None` when out of range
    pub fn select_step(&self, index: usize) -> Option<StepRef> {
        let at = StepRef::first_leg(index);
        let mut selected = None;
        self.state.send_if_modified(|state| {
            let exists = state.route.as_ref().is_some_and(|r| r.step(at).is_some());
            if !exists || state.current_step == Some(at) {
                selected = exists.then_some(at);
                return false;
            }
            state.current_step = Some(at);
            selected = Some(at);
            true
        });
        selected
    }

    /// Back to `Idle` with nothing selected
    pub fn reset(&self) {
        self.state.send_replace(RouteState::default());
    }

    fn publish(&self, result: Result<Arc<RouteResponse>>) -> Result<Arc<RouteResponse>> {
        match &result {
            Ok(route) => {
                debug!("Route request succeeded with {} routes", route.routes.len());
                self.state.send_replace(RouteState::success(Arc::clone(route)));
            }
            Err(e) => {
                warn!("Route request failed: {}", e);
                self.state.send_replace(RouteState::failed(e));
            }
        }
        result
    }
}
