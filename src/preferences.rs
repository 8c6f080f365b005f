//! Preferences store
//!
//! Holds the active [`Preferences`] as an immutable snapshot. Every change
//! replaces the snapshot, so a route request in flight keeps the values it
//! started with.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::Result;
use crate::api::PreferencesBackend;
use crate::auth::AuthToken;
use crate::error::AccessNavError;
use crate::models::{Preferences, PreferencesUpdate};

pub struct PreferencesStore {
    current: watch::Sender<Arc<Preferences>>,
    error: Mutex<Option<String>>,
}

impl Default for PreferencesStore {
    fn default() -> Self {
        Self::new(Preferences::default())
    }
}

impl PreferencesStore {
    pub fn new(initial: Preferences) -> Self {
        let (current, _) = watch::channel(Arc::new(initial));
        Self {
            current,
            error: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn current(&self) -> Arc<Preferences> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Preferences>> {
        self.current.subscribe()
    }

    /// Message from the last failed load or save
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        lock(&self.error).clone()
    }

    /// Load the signed-in user's preferences, or defaults when signed out.
    ///
    /// Failures fall back to defaults and are kept in [`Self::last_error`].
    pub async fn load<B: PreferencesBackend>(
        &self,
        backend: &B,
        token: Option<&AuthToken>,
    ) -> Arc<Preferences> {
        *lock(&self.error) = None;

        let Some(token) = token else {
            debug!("Not signed in, using default preferences");
            return self.replace(Preferences::default());
        };

        match backend.get_preferences(token).await {
            Ok(loaded) => {
                info!("Preferences loaded");
                self.replace(loaded)
            }
            Err(e) => {
                warn!("Failed to load preferences: {}", e);
                *lock(&self.error) =
                    Some(format!("Could not load preferences: {}. Using defaults.", e.message()));
                self.replace(Preferences::default())
            }
        }
    }

    /// Apply `update` locally, then persist the full result.
    ///
    /// The local snapshot is kept even when persisting fails.
    pub async fn update<B: PreferencesBackend>(
        &self,
        backend: &B,
        token: Option<&AuthToken>,
        update: &PreferencesUpdate,
    ) -> Result<Arc<Preferences>> {
        let Some(token) = token else {
            let message = "You must be logged in to save preferences.";
            *lock(&self.error) = Some(message.to_string());
            return Err(AccessNavError::validation(message));
        };

        let optimistic = self.replace(self.current().merged(update));
        *lock(&self.error) = None;

        match backend
            .update_preferences(&PreferencesUpdate::from(optimistic.as_ref()), token)
            .await
        {
            Ok(saved) => {
                info!("Preferences saved");
                Ok(self.replace(saved))
            }
            Err(e) => {
                warn!("Failed to save preferences: {}", e);
                *lock(&self.error) = Some(format!(
                    "Failed to save preferences: {}. Changes might not persist.",
                    e.message()
                ));
                Err(e.into())
            }
        }
    }

    fn replace(&self, preferences: Preferences) -> Arc<Preferences> {
        let snapshot = Arc::new(preferences);
        self.current.send_replace(Arc::clone(&snapshot));
        snapshot
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::models::{MobilityMode, TravelMode};

    #[derive(Default)]
    struct StubPreferences {
        stored: Mutex<Option<Preferences>>,
        fail: bool,
        updates: Mutex<Vec<PreferencesUpdate>>,
    }

    impl PreferencesBackend for StubPreferences {
        async fn get_preferences(
            &self,
            _token: &AuthToken,
        ) -> std::result::Result<Preferences, ApiError> {
            if self.fail {
                return Err(ApiError::http(500, "HTTP status 500 - Internal Server Error"));
            }
            Ok(self.stored.lock().unwrap().clone().unwrap_or_default())
        }

        async fn update_preferences(
            &self,
            update: &PreferencesUpdate,
            _token: &AuthToken,
        ) -> std::result::Result<Preferences, ApiError> {
            self.updates.lock().unwrap().push(update.clone());
            if self.fail {
                return Err(ApiError::network("Could not reach the server"));
            }
            let saved = Preferences::default().merged(update);
            *self.stored.lock().unwrap() = Some(saved.clone());
            Ok(saved)
        }
    }

    fn token() -> AuthToken {
        AuthToken::new("t").unwrap()
    }

    #[tokio::test]
    async fn test_signed_out_uses_defaults() {
        let store = PreferencesStore::new(Preferences {
            avoid_stairs: false,
            ..Preferences::default()
        });
        let prefs = store.load(&StubPreferences::default(), None).await;
        assert_eq!(*prefs, Preferences::default());
        assert_eq!(store.last_error(), None);
    }

    #[tokio::test]
    async fn test_load_from_backend() {
        let backend = StubPreferences::default();
        *backend.stored.lock().unwrap() = Some(Preferences {
            mobility_mode: MobilityMode::Wheelchair,
            ..Preferences::default()
        });
        let store = PreferencesStore::default();
        let prefs = store.load(&backend, Some(&token())).await;
        assert_eq!(prefs.mobility_mode, MobilityMode::Wheelchair);
    }

    #[tokio::test]
    async fn test_load_failure_falls_back_to_defaults() {
        let backend = StubPreferences {
            fail: true,
            ..Default::default()
        };
        let store = PreferencesStore::default();
        let prefs = store.load(&backend, Some(&token())).await;
        assert_eq!(*prefs, Preferences::default());
        assert!(store.last_error().unwrap().starts_with("Could not load preferences: "));
    }

    #[tokio::test]
    async fn test_update_requires_login() {
        let store = PreferencesStore::default();
        let update = PreferencesUpdate {
            avoid_stairs: Some(false),
            ..Default::default()
        };
        let err = store
            .update(&StubPreferences::default(), None, &update)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessNavError::Validation { .. }));
        assert!(store.current().avoid_stairs);
    }

    #[tokio::test]
    async fn test_update_replaces_snapshot_and_sends_full_object() {
        let backend = StubPreferences::default();
        let store = PreferencesStore::default();
        let before = store.current();

        let update = PreferencesUpdate {
            travel_mode: Some(TravelMode::Transit),
            ..Default::default()
        };
        let after = store.update(&backend, Some(&token()), &update).await.unwrap();

        assert_eq!(after.travel_mode, TravelMode::Transit);
        assert_eq!(before.travel_mode, TravelMode::Walking);
        assert!(!Arc::ptr_eq(&before, &after));

        let sent = backend.updates.lock().unwrap().clone();
        assert_eq!(sent, vec![PreferencesUpdate::from(after.as_ref())]);
    }

    #[tokio::test]
    async fn test_failed_save_keeps_optimistic_snapshot() {
        let backend = StubPreferences {
            fail: true,
            ..Default::default()
        };
        let store = PreferencesStore::default();
        let update = PreferencesUpdate {
            voice_uri: Some(Some("en-us".to_string())),
            ..Default::default()
        };

        let err = store
            .update(&backend, Some(&token()), &update)
            .await
            .unwrap_err();
        assert!(matches!(err, AccessNavError::Api(ApiError::Network { .. })));
        assert_eq!(store.current().voice_uri.as_deref(), Some("en-us"));
        assert!(store.last_error().unwrap().starts_with("Failed to save preferences: "));
    }
}
