//! Configuration management for `AccessNav`
//!
//! Handles loading configuration from files and environment variables,
//! and validates that everything required to talk to the backend is present.

use crate::AccessNavError;
use crate::models::LatLng;
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AccessNavConfig {
    /// Backend REST API
    pub backend: BackendConfig,
    /// Mapping provider credentials
    pub maps: MapsConfig,
    /// Map viewport policy
    pub map: MapConfig,
    /// Position source settings
    pub geolocation: GeolocationConfig,
    /// Speech synthesis settings
    pub speech: SpeechConfig,
    /// Identity provider token
    pub auth: AuthConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Backend origin, e.g. `https://nav.example.org`; `/api` is appended
    pub base_url: String,
    /// Request timeout in seconds
    pub timeout_seconds: u32,
    /// Retries for transient failures
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct MapsConfig {
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Center shown when no route is loaded
    pub default_center: LatLng,
    pub default_zoom: f64,
    /// Fitted routes never zoom in past this level
    pub max_fit_zoom: f64,
    /// Zoom used when centering on the route start because bounds are unusable
    pub fallback_zoom: f64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    /// Pixels kept free around fitted bounds
    pub padding: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeolocationConfig {
    pub high_accuracy: bool,
    pub timeout_ms: u64,
    /// Age under which a cached fix is reused; 0 always asks the source
    pub max_cache_age_ms: u64,
    pub watch_interval_ms: u64,
    /// Position reported by the desktop position source
    pub fixed_position: Option<LatLng>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeechConfig {
    /// Speech command, invoked as `<command> [-v voice] [-s rate] <text>`
    pub command: String,
    /// Words per minute
    pub rate: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AuthConfig {
    pub token: Option<String>,
}

/// Logging configuration settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (error, warn, info, debug, trace)
    pub level: String,
    /// Log format (pretty or json)
    pub format: String,
}

// Default value functions
fn default_backend_timeout() -> u32 {
    15
}

fn default_backend_max_retries() -> u32 {
    2
}

fn default_center() -> LatLng {
    LatLng::new(6.5244, 3.3792)
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout_seconds: default_backend_timeout(),
            max_retries: default_backend_max_retries(),
        }
    }
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_center: default_center(),
            default_zoom: 12.0,
            max_fit_zoom: 16.0,
            fallback_zoom: 14.0,
            viewport_width: 1024,
            viewport_height: 768,
            padding: 40,
        }
    }
}

impl Default for GeolocationConfig {
    fn default() -> Self {
        Self {
            high_accuracy: true,
            timeout_ms: 5000,
            max_cache_age_ms: 0,
            watch_interval_ms: 5000,
            fixed_position: None,
        }
    }
}

impl Default for SpeechConfig {
    fn default() -> Self {
        Self {
            command: "espeak-ng".to_string(),
            rate: 160,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl AccessNavConfig {
    /// Load configuration from the default file location and environment
    pub fn load() -> Result<Self, AccessNavError> {
        Self::load_from_path(None)
    }

    /// Load configuration from specified path, then `ACCESSNAV_*` variables.
    ///
    /// Nested keys use a double underscore: `ACCESSNAV_BACKEND__BASE_URL`.
    pub fn load_from_path(config_path: Option<PathBuf>) -> Result<Self, AccessNavError> {
        let mut builder = Config::builder();

        let config_file = config_path.unwrap_or_else(|| {
            Self::get_config_path().unwrap_or_else(|| PathBuf::from("accessnav.toml"))
        });

        if config_file.exists() {
            builder = builder.add_source(
                File::from(config_file.clone())
                    .required(false)
                    .format(config::FileFormat::Toml),
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("ACCESSNAV")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder.build().map_err(|e| {
            AccessNavError::config(format!("Failed to build configuration: {e}"))
        })?;

        let mut config: AccessNavConfig = settings.try_deserialize().map_err(|e| {
            AccessNavError::config(format!("Failed to deserialize configuration: {e}"))
        })?;

        config.apply_defaults();
        config.validate()?;

        Ok(config)
    }

    /// Get the default configuration file path
    #[must_use]
    pub fn get_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("accessnav").join("config.toml"))
    }

    /// Apply default values to zeroed or empty fields
    pub fn apply_defaults(&mut self) {
        if self.backend.timeout_seconds == 0 {
            self.backend.timeout_seconds = default_backend_timeout();
        }
        if self.logging.level.is_empty() {
            self.logging.level = default_log_level();
        }
        if self.logging.format.is_empty() {
            self.logging.format = default_log_format();
        }
        while self.backend.base_url.ends_with('/') {
            self.backend.base_url.pop();
        }
    }

    /// Validate all configuration settings
    pub fn validate(&self) -> Result<(), AccessNavError> {
        self.validate_required()?;
        self.validate_numeric_ranges()?;
        self.validate_string_values()?;
        Ok(())
    }

    /// The backend origin and the maps API key must be supplied externally
    pub fn validate_required(&self) -> Result<(), AccessNavError> {
        if self.backend.base_url.trim().is_empty() {
            return Err(AccessNavError::config(
                "backend.base_url is not set (ACCESSNAV_BACKEND__BASE_URL)",
            ));
        }

        if !self.backend.base_url.starts_with("http://")
            && !self.backend.base_url.starts_with("https://")
        {
            return Err(AccessNavError::config(
                "backend.base_url must be a valid HTTP or HTTPS URL",
            ));
        }

        match self.maps.api_key.as_deref().map(str::trim) {
            None | Some("") => Err(AccessNavError::config(
                "maps.api_key is not set (ACCESSNAV_MAPS__API_KEY)",
            )),
            Some(key) if key.len() < 8 => Err(AccessNavError::config(
                "maps.api_key appears to be invalid (too short)",
            )),
            Some(_) => Ok(()),
        }
    }

    fn validate_numeric_ranges(&self) -> Result<(), AccessNavError> {
        if self.backend.timeout_seconds > 300 {
            return Err(AccessNavError::config(
                "Backend timeout cannot exceed 300 seconds",
            ));
        }

        if self.backend.max_retries > 10 {
            return Err(AccessNavError::config("Backend max retries cannot exceed 10"));
        }

        let zooms = [
            ("map.default_zoom", self.map.default_zoom),
            ("map.max_fit_zoom", self.map.max_fit_zoom),
            ("map.fallback_zoom", self.map.fallback_zoom),
        ];
        for (name, zoom) in zooms {
            if !(0.0..=22.0).contains(&zoom) {
                return Err(AccessNavError::config(format!(
                    "{name} must be between 0 and 22, got {zoom}"
                )));
            }
        }

        if self.map.viewport_width <= 2 * self.map.padding
            || self.map.viewport_height <= 2 * self.map.padding
        {
            return Err(AccessNavError::config(
                "Map viewport must be larger than twice its padding",
            ));
        }

        if !self.map.default_center.is_valid() {
            return Err(AccessNavError::config("map.default_center is not a valid coordinate"));
        }

        if self.geolocation.timeout_ms == 0 || self.geolocation.watch_interval_ms == 0 {
            return Err(AccessNavError::config(
                "Geolocation timeout and watch interval must be positive",
            ));
        }

        Ok(())
    }

    fn validate_string_values(&self) -> Result<(), AccessNavError> {
        let valid_log_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_log_levels.contains(&self.logging.level.as_str()) {
            return Err(AccessNavError::config(format!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                valid_log_levels.join(", ")
            )));
        }

        let valid_log_formats = ["pretty", "json"];
        if !valid_log_formats.contains(&self.logging.format.as_str()) {
            return Err(AccessNavError::config(format!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                valid_log_formats.join(", ")
            )));
        }

        Ok(())
    }

    /// Endpoint root: the configured origin followed by `/api`
    #[must_use]
    pub fn api_base_url(&self) -> String {
        format!("{}/api", self.backend.base_url.trim_end_matches('/'))
    }
}
