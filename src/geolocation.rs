//! Geolocation watcher
//!
//! Wraps a platform [`PositionSource`] with one-shot and continuous modes.
//! Failures are reported as [`LocationErrorKind`] values, never as panics,
//! so callers can branch on the kind.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::GeolocationConfig;
use crate::error::LocationErrorKind;
use crate::models::LatLng;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeolocationOptions {
    pub high_accuracy: bool,
    /// Upper bound for a single position query
    pub timeout: Duration,
    /// Cached fixes younger than this are reused by one-shot queries
    pub maximum_age: Duration,
    /// Delay between queries in watch mode
    pub watch_interval: Duration,
}

impl Default for GeolocationOptions {
    fn default() -> Self {
        Self::from(&GeolocationConfig::default())
    }
}

impl From<&GeolocationConfig> for GeolocationOptions {
    fn from(config: &GeolocationConfig) -> Self {
        Self {
            high_accuracy: config.high_accuracy,
            timeout: Duration::from_millis(config.timeout_ms),
            maximum_age: Duration::from_millis(config.max_cache_age_ms),
            watch_interval: Duration::from_millis(config.watch_interval_ms),
        }
    }
}

/// A position fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
    pub coords: LatLng,
    /// Accuracy radius in meters, when the source reports one
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl Position {
    #[must_use]
    pub fn now(coords: LatLng, accuracy_m: Option<f64>) -> Self {
        Self {
            coords,
            accuracy_m,
            timestamp: Utc::now(),
        }
    }
}

/// Platform location capability
#[async_trait]
pub trait PositionSource: Send + Sync {
    fn is_supported(&self) -> bool {
        true
    }

    async fn locate(&self, high_accuracy: bool) -> Result<Position, LocationErrorKind>;
}

/// Reports a configured position
pub struct FixedPositionSource {
    coords: LatLng,
}

impl FixedPositionSource {
    #[must_use]
    pub fn new(coords: LatLng) -> Self {
        Self { coords }
    }
}

#[async_trait]
impl PositionSource for FixedPositionSource {
    async fn locate(&self, _high_accuracy: bool) -> Result<Position, LocationErrorKind> {
        Ok(Position::now(self.coords, Some(0.0)))
    }
}

/// Platform without any location capability
pub struct UnsupportedPositionSource;

#[async_trait]
impl PositionSource for UnsupportedPositionSource {
    fn is_supported(&self) -> bool {
        false
    }

    async fn locate(&self, _high_accuracy: bool) -> Result<Position, LocationErrorKind> {
        Err(LocationErrorKind::Unsupported)
    }
}

/// Latest state published in watch mode
#[derive(Debug, Clone, PartialEq)]
pub enum LocationState {
    Pending,
    Fix(Position),
    Failed(LocationErrorKind),
}

type CachedFix = Arc<Mutex<Option<(Instant, Position)>>>;

pub struct GeolocationWatcher {
    source: Arc<dyn PositionSource>,
    options: GeolocationOptions,
    last_fix: CachedFix,
    state: Arc<watch::Sender<LocationState>>,
    watch_task: Mutex<Option<JoinHandle<()>>>,
}

impl GeolocationWatcher {
    pub fn new(source: Arc<dyn PositionSource>, options: GeolocationOptions) -> Self {
        let (state, _) = watch::channel(LocationState::Pending);
        Self {
            source,
            options,
            last_fix: Arc::new(Mutex::new(None)),
            state: Arc::new(state),
            watch_task: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn is_supported(&self) -> bool {
        self.source.is_supported()
    }

    /// One-shot query, reusing a cached fix younger than `maximum_age`
    pub async fn get_current_position(&self) -> Result<Position, LocationErrorKind> {
        if !self.source.is_supported() {
            return Err(LocationErrorKind::Unsupported);
        }

        if let Some(position) = self.cached_fix() {
            debug!("Using cached position {}", position.coords);
            return Ok(position);
        }

        query_source(self.source.as_ref(), &self.options, &self.last_fix).await
    }

    /// Start continuous updates, replacing any previous watch
    pub fn watch_position(&self) {
        self.stop();

        if !self.source.is_supported() {
            self.state
                .send_replace(LocationState::Failed(LocationErrorKind::Unsupported));
            return;
        }

        self.state.send_replace(LocationState::Pending);

        let source = Arc::clone(&self.source);
        let options = self.options;
        let last_fix = Arc::clone(&self.last_fix);
        let state = Arc::clone(&self.state);

        let handle = tokio::spawn(async move {
            loop {
                let next = match query_source(source.as_ref(), &options, &last_fix).await {
                    Ok(position) => LocationState::Fix(position),
                    Err(kind) => LocationState::Failed(kind),
                };
                state.send_replace(next);
                tokio::time::sleep(options.watch_interval).await;
            }
        });

        info!("Started watching geolocation");
        *lock(&self.watch_task) = Some(handle);
    }

    /// Stop continuous updates; no-op when not watching
    pub fn stop(&self) {
        if let Some(handle) = lock(&self.watch_task).take() {
            handle.abort();
            info!("Stopped watching geolocation");
        }
    }

    #[must_use]
    pub fn is_watching(&self) -> bool {
        lock(&self.watch_task)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// Receiver for watch-mode updates
    pub fn subscribe(&self) -> watch::Receiver<LocationState> {
        self.state.subscribe()
    }

    /// Position for a route request.
    ///
    /// While watching, the latest watch state decides: no fix yet is
    /// [`LocationErrorKind::Pending`]. Otherwise a one-shot query is made.
    pub async fn resolve(&self) -> Result<Position, LocationErrorKind> {
        if self.is_watching() {
            return match &*self.state.borrow() {
                LocationState::Pending => Err(LocationErrorKind::Pending),
                LocationState::Fix(position) => Ok(*position),
                LocationState::Failed(kind) => Err(*kind),
            };
        }
        self.get_current_position().await
    }

    fn cached_fix(&self) -> Option<Position> {
        if self.options.maximum_age.is_zero() {
            return None;
        }
        let cached = *lock(&self.last_fix);
        cached
            .filter(|(at, _)| at.elapsed() <= self.options.maximum_age)
            .map(|(_, position)| position)
    }
}

impl Drop for GeolocationWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn query_source(
    source: &dyn PositionSource,
    options: &GeolocationOptions,
    last_fix: &CachedFix,
) -> Result<Position, LocationErrorKind> {
    let result = match tokio::time::timeout(options.timeout, source.locate(options.high_accuracy))
        .await
    {
        Ok(result) => result,
        Err(_) => Err(LocationErrorKind::Timeout),
    };

    match &result {
        Ok(position) => *lock(last_fix) = Some((Instant::now(), *position)),
        Err(kind) => warn!("Geolocation error: {}", kind),
    }
    result
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedSource;
    use super::*;

    const HERE: LatLng = LatLng::new(6.5244, 3.3792);

    fn options(timeout_ms: u64, max_age_ms: u64) -> GeolocationOptions {
        GeolocationOptions {
            high_accuracy: true,
            timeout: Duration::from_millis(timeout_ms),
            maximum_age: Duration::from_millis(max_age_ms),
            watch_interval: Duration::from_millis(10),
        }
    }

    #[tokio::test]
    async fn test_one_shot_fixed_source() {
        let watcher = GeolocationWatcher::new(
            Arc::new(FixedPositionSource::new(HERE)),
            GeolocationOptions::default(),
        );
        let position = watcher.get_current_position().await.unwrap();
        assert_eq!(position.coords, HERE);
        assert!(!watcher.is_watching());
    }

    #[tokio::test]
    async fn test_unsupported_platform() {
        let watcher = GeolocationWatcher::new(
            Arc::new(UnsupportedPositionSource),
            GeolocationOptions::default(),
        );
        assert!(!watcher.is_supported());
        assert_eq!(
            watcher.get_current_position().await,
            Err(LocationErrorKind::Unsupported)
        );

        watcher.watch_position();
        assert_eq!(
            *watcher.subscribe().borrow(),
            LocationState::Failed(LocationErrorKind::Unsupported)
        );
    }

    #[tokio::test]
    async fn test_slow_source_times_out() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(HERE)], Duration::from_secs(5)));
        let watcher = GeolocationWatcher::new(source, options(20, 0));
        assert_eq!(
            watcher.get_current_position().await,
            Err(LocationErrorKind::Timeout)
        );
    }

    #[tokio::test]
    async fn test_permission_denied_is_reported_as_kind() {
        let source = Arc::new(ScriptedSource::new(
            vec![Err(LocationErrorKind::PermissionDenied)],
            Duration::ZERO,
        ));
        let watcher = GeolocationWatcher::new(source, options(1000, 0));
        assert_eq!(watcher.resolve().await, Err(LocationErrorKind::PermissionDenied));
    }

    #[tokio::test]
    async fn test_cached_fix_is_reused_within_max_age() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(HERE)], Duration::ZERO));
        let watcher = GeolocationWatcher::new(source.clone(), options(1000, 60_000));
        watcher.get_current_position().await.unwrap();
        watcher.get_current_position().await.unwrap();
        assert_eq!(source.calls(), 1);

        let uncached_source = Arc::new(ScriptedSource::new(vec![Ok(HERE)], Duration::ZERO));
        let uncached = GeolocationWatcher::new(uncached_source.clone(), options(1000, 0));
        uncached.get_current_position().await.unwrap();
        uncached.get_current_position().await.unwrap();
        assert_eq!(uncached_source.calls(), 2);
    }

    #[tokio::test]
    async fn test_watch_publishes_fix_and_resolve_uses_it() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(HERE)], Duration::ZERO));
        let watcher = GeolocationWatcher::new(source, options(1000, 0));
        let mut updates = watcher.subscribe();

        watcher.watch_position();
        assert!(watcher.is_watching());

        updates
            .wait_for(|state| matches!(state, LocationState::Fix(_)))
            .await
            .unwrap();
        assert_eq!(watcher.resolve().await.unwrap().coords, HERE);
    }

    #[tokio::test]
    async fn test_resolve_while_watch_is_pending() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(HERE)], Duration::from_secs(30)));
        let watcher = GeolocationWatcher::new(source, options(60_000, 0));
        watcher.watch_position();
        assert_eq!(watcher.resolve().await, Err(LocationErrorKind::Pending));
    }

    #[tokio::test]
    async fn test_watch_reports_failures_then_recovers() {
        let other = LatLng::new(6.6, 3.4);
        let source = Arc::new(ScriptedSource::new(
            vec![Err(LocationErrorKind::PositionUnavailable), Ok(other)],
            Duration::ZERO,
        ));
        let watcher = GeolocationWatcher::new(source, options(1000, 0));
        let mut updates = watcher.subscribe();
        watcher.watch_position();

        updates
            .wait_for(|state| *state == LocationState::Failed(LocationErrorKind::PositionUnavailable))
            .await
            .unwrap();
        updates
            .wait_for(|state| matches!(state, LocationState::Fix(p) if p.coords == other))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_stop_releases_the_watch() {
        let source = Arc::new(ScriptedSource::new(vec![Ok(HERE)], Duration::ZERO));
        let watcher = GeolocationWatcher::new(source.clone(), options(1000, 0));
        let mut updates = watcher.subscribe();
        watcher.watch_position();
        updates
            .wait_for(|state| matches!(state, LocationState::Fix(_)))
            .await
            .unwrap();

        watcher.stop();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!watcher.is_watching());
        let calls = source.calls();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(source.calls(), calls);

        // restartable
        watcher.watch_position();
        assert!(watcher.is_watching());
    }
}
