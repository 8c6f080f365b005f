//! Backend REST client
//!
//! One method per backend operation. Every request goes through
//! [`BackendClient::send`], which attaches the bearer token where required
//! and funnels the response through [`handle_response`].

use std::time::{Duration, Instant};

use reqwest::Method;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, info, instrument, warn};

use crate::auth::AuthToken;
use crate::config::AccessNavConfig;
use crate::error::AccessNavError;
use crate::models::{
    AccessibilityPoint, AddPointReceipt, MessageReceipt, NewAccessibilityPoint, NewSavedRoute,
    PlaceInput, PointQuery, Preferences, PreferencesUpdate, RouteResponse, SaveRouteReceipt,
    SavedRoute, SavedRouteSummary,
};

mod error;

pub use error::{ApiError, handle_response};

/// Route operations the orchestrator depends on
pub trait RouteService {
    async fn compute_route(
        &self,
        origin: &PlaceInput,
        destination: &PlaceInput,
        preferences: &Preferences,
    ) -> Result<RouteResponse, ApiError>;

    async fn get_route(&self, id: &str, token: &AuthToken) -> Result<SavedRoute, ApiError>;

    async fn save_route(
        &self,
        route: &NewSavedRoute,
        token: &AuthToken,
    ) -> Result<SaveRouteReceipt, ApiError>;
}

/// Preference persistence the preferences store depends on
pub trait PreferencesBackend {
    async fn get_preferences(&self, token: &AuthToken) -> Result<Preferences, ApiError>;

    async fn update_preferences(
        &self,
        update: &PreferencesUpdate,
        token: &AuthToken,
    ) -> Result<Preferences, ApiError>;
}

/// HTTP client for the accessible-navigation backend
#[derive(Clone)]
pub struct BackendClient {
    client: ClientWithMiddleware,
    /// Same transport without retries, for requests that must not repeat
    once: ClientWithMiddleware,
    base_url: String,
}

impl BackendClient {
    /// Create a client for `<backend.base_url>/api`
    pub fn new(config: &AccessNavConfig) -> Result<Self, AccessNavError> {
        let timeout = Duration::from_secs(config.backend.timeout_seconds.into());

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("accessnav/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AccessNavError::config(format!("Failed to create HTTP client: {e}")))?;

        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(config.backend.max_retries);
        let client = ClientBuilder::new(http.clone())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        let once = ClientBuilder::new(http).build();

        let base_url = config.api_base_url();
        info!("API base URL configured to: {}", base_url);

        Ok(Self {
            client,
            once,
            base_url,
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `POST /route`
    #[instrument(skip(self, origin, destination, preferences), fields(%origin, %destination))]
    pub async fn compute_route(
        &self,
        origin: &PlaceInput,
        destination: &PlaceInput,
        preferences: &Preferences,
    ) -> Result<RouteResponse, ApiError> {
        let body = json!({
            "origin": origin,
            "destination": destination,
            "preferences": preferences,
        });
        self.send_expect(Method::POST, "/route", Some(&body), None)
            .await
    }

    /// `POST /routes`
    #[instrument(skip(self, route, token), fields(name = %route.name))]
    pub async fn save_route(
        &self,
        route: &NewSavedRoute,
        token: &AuthToken,
    ) -> Result<SaveRouteReceipt, ApiError> {
        self.send_expect(Method::POST, "/routes", Some(route), Some(token))
            .await
    }

    /// `GET /routes`
    #[instrument(skip(self, token))]
    pub async fn list_routes(&self, token: &AuthToken) -> Result<Vec<SavedRouteSummary>, ApiError> {
        self.send_expect(Method::GET, "/routes", None::<&()>, Some(token))
            .await
    }

    /// `GET /routes/{id}`
    #[instrument(skip(self, token))]
    pub async fn get_route(&self, id: &str, token: &AuthToken) -> Result<SavedRoute, ApiError> {
        let path = format!("/routes/{}", urlencoding::encode(id));
        self.send_expect(Method::GET, &path, None::<&()>, Some(token))
            .await
    }

    /// `DELETE /routes/{id}`; `None` when the backend answers 204
    #[instrument(skip(self, token))]
    pub async fn delete_route(
        &self,
        id: &str,
        token: &AuthToken,
    ) -> Result<Option<MessageReceipt>, ApiError> {
        let path = format!("/routes/{}", urlencoding::encode(id));
        self.send(Method::DELETE, &path, None::<&()>, Some(token))
            .await
    }

    /// `GET /user/preferences`
    #[instrument(skip(self, token))]
    pub async fn get_preferences(&self, token: &AuthToken) -> Result<Preferences, ApiError> {
        self.send_expect(Method::GET, "/user/preferences", None::<&()>, Some(token))
            .await
    }

    /// `PUT /user/preferences`
    #[instrument(skip(self, token))]
    pub async fn update_preferences(
        &self,
        update: &PreferencesUpdate,
        token: &AuthToken,
    ) -> Result<Preferences, ApiError> {
        self.send_expect(Method::PUT, "/user/preferences", Some(update), Some(token))
            .await
    }

    /// `POST /accessibility-points`
    #[instrument(skip(self, point, token), fields(point_type = point.point_type.as_str()))]
    pub async fn add_accessibility_point(
        &self,
        point: &NewAccessibilityPoint,
        token: &AuthToken,
    ) -> Result<AddPointReceipt, ApiError> {
        self.send_expect(Method::POST, "/accessibility-points", Some(point), Some(token))
            .await
    }

    /// `GET /accessibility-points?lat&lng&radius&type`
    #[instrument(skip(self))]
    pub async fn list_accessibility_points(
        &self,
        query: &PointQuery,
    ) -> Result<Vec<AccessibilityPoint>, ApiError> {
        let path = format!("/accessibility-points?{}", query.to_query_string());
        self.send_expect(Method::GET, &path, None::<&()>, None)
            .await
    }

    /// `GET /accessibility-points/{id}`
    #[instrument(skip(self))]
    pub async fn get_accessibility_point(&self, id: &str) -> Result<AccessibilityPoint, ApiError> {
        let path = format!("/accessibility-points/{}", urlencoding::encode(id));
        self.send_expect(Method::GET, &path, None::<&()>, None)
            .await
    }

    /// Like [`Self::send`] for endpoints that must return a body
    async fn send_expect<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&AuthToken>,
    ) -> Result<T, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.send(method, path, body, token)
            .await?
            .ok_or_else(|| ApiError::invalid_response(204, format!("{path} returned no content")))
    }

    /// The single request path shared by all endpoints
    async fn send<B, T>(
        &self,
        method: Method,
        path: &str,
        body: Option<&B>,
        token: Option<&AuthToken>,
    ) -> Result<Option<T>, ApiError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let url = format!("{}{}", self.base_url, path);
        debug!("{} {}", method, url);
        let start = Instant::now();

        // Only idempotent methods are retried; POST creates records
        let client = if method.is_idempotent() {
            &self.client
        } else {
            &self.once
        };
        let mut request = client.request(method.clone(), &url);
        if let Some(token) = token {
            request = request.header(AUTHORIZATION, token.header_value());
        }
        if let Some(body) = body {
            let bytes = serde_json::to_vec(body)
                .map_err(|e| ApiError::network(format!("Failed to encode request body: {e}")))?;
            request = request.header(CONTENT_TYPE, "application/json").body(bytes);
        }

        let response = request.send().await.map_err(|e| {
            warn!("Error calling {} {}: {}", method, url, e);
            ApiError::network(format!("Could not reach the server: {e}"))
        })?;

        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| {
            warn!("Error reading response from {}: {}", url, e);
            ApiError::network(format!("Failed to read server response: {e}"))
        })?;

        let elapsed = start.elapsed();
        debug!(
            "{} {} -> {} in {:.3}s",
            method,
            url,
            status,
            elapsed.as_secs_f64()
        );
        if elapsed.as_secs() > 5 {
            warn!("Slow API response detected: {:.3}s", elapsed.as_secs_f64());
        }

        handle_response(status, &bytes)
    }
}

impl RouteService for BackendClient {
    async fn compute_route(
        &self,
        origin: &PlaceInput,
        destination: &PlaceInput,
        preferences: &Preferences,
    ) -> Result<RouteResponse, ApiError> {
        BackendClient::compute_route(self, origin, destination, preferences).await
    }

    async fn get_route(&self, id: &str, token: &AuthToken) -> Result<SavedRoute, ApiError> {
        BackendClient::get_route(self, id, token).await
    }

    async fn save_route(
        &self,
        route: &NewSavedRoute,
        token: &AuthToken,
    ) -> Result<SaveRouteReceipt, ApiError> {
        BackendClient::save_route(self, route, token).await
    }
}

impl PreferencesBackend for BackendClient {
    async fn get_preferences(&self, token: &AuthToken) -> Result<Preferences, ApiError> {
        BackendClient::get_preferences(self, token).await
    }

    async fn update_preferences(
        &self,
        update: &PreferencesUpdate,
        token: &AuthToken,
    ) -> Result<Preferences, ApiError> {
        BackendClient::update_preferences(self, update, token).await
    }
}
