//! Keeps a map surface in step with the active route
//!
//! The synchronizer reacts to route identity only: syncing the same
//! `Arc<RouteResponse>` twice applies nothing the second time, so unrelated
//! refreshes never move the viewport.

use std::f64::consts::PI;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::MapConfig;
use crate::models::{Bounds, LatLng, RouteResponse};
use crate::polyline;

/// Web-Mercator world size at zoom 0, in pixels
const WORLD_TILE_SIZE: f64 = 256.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Viewport {
    pub center: LatLng,
    pub zoom: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkerKind {
    Origin,
    Destination,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Marker {
    pub kind: MarkerKind,
    pub position: LatLng,
}

/// Decoded overview path of the active route
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RouteOverlay {
    pub path: Vec<LatLng>,
}

/// Map rendering port
pub trait MapSurface {
    fn set_viewport(&mut self, viewport: Viewport);
    fn set_route_overlay(&mut self, overlay: Option<RouteOverlay>);
    fn set_markers(&mut self, markers: Vec<Marker>);
}

/// Surface that only records what was applied
#[derive(Debug, Default, Clone, Serialize)]
pub struct HeadlessMap {
    pub viewport: Option<Viewport>,
    pub overlay: Option<RouteOverlay>,
    pub markers: Vec<Marker>,
    /// Number of viewport changes applied
    pub viewport_updates: usize,
}

impl MapSurface for HeadlessMap {
    fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = Some(viewport);
        self.viewport_updates += 1;
    }

    fn set_route_overlay(&mut self, overlay: Option<RouteOverlay>) {
        self.overlay = overlay;
    }

    fn set_markers(&mut self, markers: Vec<Marker>) {
        self.markers = markers;
    }
}

pub struct MapSynchronizer<M: MapSurface> {
    surface: M,
    config: MapConfig,
    /// Identity of the last synced route; `Some(None)` after a reset
    last: Option<Option<Arc<RouteResponse>>>,
}

impl<M: MapSurface> MapSynchronizer<M> {
    pub fn new(surface: M, config: MapConfig) -> Self {
        Self {
            surface,
            config,
            last: None,
        }
    }

    pub fn surface(&self) -> &M {
        &self.surface
    }

    pub fn into_surface(self) -> M {
        self.surface
    }

    /// Apply `route` to the surface if its identity changed.
    ///
    /// Returns whether anything was applied.
    pub fn sync(&mut self, route: Option<&Arc<RouteResponse>>) -> bool {
        let unchanged = match (&self.last, route) {
            (Some(Some(previous)), Some(current)) => Arc::ptr_eq(previous, current),
            (Some(None), None) => true,
            _ => false,
        };
        if unchanged {
            return false;
        }

        match route {
            Some(route) => self.show_route(route),
            None => self.reset(),
        }
        self.last = Some(route.cloned());
        true
    }

    fn show_route(&mut self, route: &RouteResponse) {
        let path = overview_path(route);
        let viewport = self.viewport_for(route, &path);
        debug!(
            "Fitting map to route: center {} zoom {}",
            viewport.center, viewport.zoom
        );
        self.surface.set_viewport(viewport);

        let markers = route
            .first_leg()
            .map(|leg| {
                [
                    (MarkerKind::Origin, leg.start_location),
                    (MarkerKind::Destination, leg.end_location),
                ]
                .into_iter()
                .filter_map(|(kind, position)| Some(Marker { kind, position: position? }))
                .collect()
            })
            .unwrap_or_default();
        self.surface.set_markers(markers);

        let overlay = (!path.is_empty()).then_some(RouteOverlay { path });
        self.surface.set_route_overlay(overlay);
    }

    fn reset(&mut self) {
        debug!("Route cleared, resetting map to default view");
        self.surface.set_viewport(self.default_viewport());
        self.surface.set_markers(Vec::new());
        self.surface.set_route_overlay(None);
    }

    fn default_viewport(&self) -> Viewport {
        Viewport {
            center: self.config.default_center,
            zoom: self.config.default_zoom,
        }
    }

    fn viewport_for(&self, route: &RouteResponse, path: &[LatLng]) -> Viewport {
        let bounds = route
            .first_route()
            .and_then(|r| r.bounds)
            .or_else(|| Bounds::from_points(path));

        if let Some(bounds) = bounds.filter(Bounds::is_valid) {
            let zoom = fit_zoom(&bounds, &self.config).min(self.config.max_fit_zoom);
            return Viewport {
                center: bounds.center(),
                zoom,
            };
        }

        let start = route
            .first_leg()
            .and_then(|leg| leg.start_location)
            .filter(LatLng::is_valid);
        match start {
            Some(center) => {
                warn!("Route bounds unusable, centering on route start");
                Viewport {
                    center,
                    zoom: self.config.fallback_zoom,
                }
            }
            None => {
                warn!("Route has neither bounds nor a start location");
                self.default_viewport()
            }
        }
    }
}

/// Largest integer zoom at which `bounds` fits the configured viewport,
/// before clamping
#[must_use]
pub fn fit_zoom(bounds: &Bounds, config: &MapConfig) -> f64 {
    let padding = 2.0 * f64::from(config.padding);
    let width = (f64::from(config.viewport_width) - padding).max(1.0);
    let height = (f64::from(config.viewport_height) - padding).max(1.0);

    let lat_fraction =
        (mercator_lat(bounds.northeast.lat) - mercator_lat(bounds.southwest.lat)) / PI;
    let lng_span = bounds.northeast.lng - bounds.southwest.lng;
    let lng_fraction = if lng_span < 0.0 { lng_span + 360.0 } else { lng_span } / 360.0;

    let lat_zoom = zoom_for(height, lat_fraction);
    let lng_zoom = zoom_for(width, lng_fraction);
    lat_zoom.min(lng_zoom)
}

fn mercator_lat(lat: f64) -> f64 {
    let sin = (lat * PI / 180.0).sin();
    let rad_x2 = ((1.0 + sin) / (1.0 - sin)).ln() / 2.0;
    rad_x2.clamp(-PI, PI) / 2.0
}

fn zoom_for(pixels: f64, fraction: f64) -> f64 {
    if fraction <= 0.0 {
        return f64::INFINITY;
    }
    (pixels / WORLD_TILE_SIZE / fraction).log2().floor()
}

fn overview_path(route: &RouteResponse) -> Vec<LatLng> {
    let Some(encoded) = route
        .first_route()
        .and_then(|r| r.overview_polyline.as_ref())
        .filter(|p| !p.points.is_empty())
    else {
        return Vec::new();
    };

    match polyline::decode(&encoded.points) {
        Ok(path) => path,
        Err(e) => {
            warn!("Ignoring malformed overview polyline: {}", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::models::route::fixtures::route_with_steps;

    fn synchronizer() -> MapSynchronizer<HeadlessMap> {
        MapSynchronizer::new(HeadlessMap::default(), MapConfig::default())
    }

    fn route_with_bounds(northeast: LatLng, southwest: LatLng) -> Arc<RouteResponse> {
        let mut route = route_with_steps(1);
        route.routes[0].bounds = Some(Bounds {
            northeast,
            southwest,
        });
        Arc::new(route)
    }

    #[test]
    fn test_fit_zoom_for_short_route() {
        let bounds = Bounds {
            northeast: LatLng::new(6.5249, 3.3811),
            southwest: LatLng::new(6.5244, 3.3792),
        };
        assert_eq!(fit_zoom(&bounds, &MapConfig::default()), 19.0);
    }

    #[test]
    fn test_zoom_is_clamped_to_max_fit_zoom() {
        let mut sync = synchronizer();
        let route = route_with_bounds(LatLng::new(6.5249, 3.3811), LatLng::new(6.5244, 3.3792));
        assert!(sync.sync(Some(&route)));

        let viewport = sync.surface().viewport.unwrap();
        assert_eq!(viewport.zoom, 16.0);
        assert!((viewport.center.lat - 6.52465).abs() < 1e-9);
    }

    #[test]
    fn test_route_fits_bounds_and_places_markers() {
        let mut sync = synchronizer();
        let route = Arc::new(route_with_steps(3));
        sync.sync(Some(&route));

        let map = sync.surface();
        let viewport = map.viewport.unwrap();
        assert!((viewport.center.lat - 6.525).abs() < 1e-9);
        assert!((viewport.center.lng - 3.375).abs() < 1e-9);
        assert_eq!(viewport.zoom, 16.0);
        assert_eq!(map.markers.len(), 2);
        assert_eq!(map.markers[0].kind, MarkerKind::Origin);
        assert_eq!(map.markers[1].position, LatLng::new(6.53, 3.38));
        assert_eq!(map.overlay.as_ref().unwrap().path.len(), 3);
    }

    #[test]
    fn test_wide_route_is_not_clamped() {
        let mut sync = synchronizer();
        let route = route_with_bounds(LatLng::new(9.07, 7.49), LatLng::new(6.45, 3.39));
        sync.sync(Some(&route));
        let zoom = sync.surface().viewport.unwrap().zoom;
        assert!(zoom < 16.0 && zoom >= 5.0, "zoom {zoom}");
    }

    #[test]
    fn test_cleared_route_resets_to_default_view() {
        let mut sync = synchronizer();
        sync.sync(Some(&Arc::new(route_with_steps(1))));
        assert!(sync.sync(None));

        let map = sync.surface();
        let config = MapConfig::default();
        assert_eq!(
            map.viewport,
            Some(Viewport {
                center: config.default_center,
                zoom: config.default_zoom
            })
        );
        assert!(map.markers.is_empty());
        assert!(map.overlay.is_none());
    }

    #[test]
    fn test_same_route_identity_is_not_reapplied() {
        let mut sync = synchronizer();
        let route = Arc::new(route_with_steps(2));
        assert!(sync.sync(Some(&route)));
        assert!(!sync.sync(Some(&route.clone())));
        assert_eq!(sync.surface().viewport_updates, 1);

        // equal content, new snapshot
        let copy = Arc::new((*route).clone());
        assert!(sync.sync(Some(&copy)));
        assert_eq!(sync.surface().viewport_updates, 2);

        assert!(sync.sync(None));
        assert!(!sync.sync(None));
        assert_eq!(sync.surface().viewport_updates, 3);
    }

    #[test]
    fn test_malformed_bounds_fall_back_to_start() {
        let mut sync = synchronizer();
        // north below south
        let route = route_with_bounds(LatLng::new(6.0, 3.38), LatLng::new(6.5, 3.37));
        sync.sync(Some(&route));
        assert_eq!(
            sync.surface().viewport,
            Some(Viewport {
                center: LatLng::new(6.52, 3.37),
                zoom: 14.0
            })
        );
    }

    #[test]
    fn test_missing_bounds_use_polyline() {
        let mut sync = synchronizer();
        let mut route = route_with_steps(1);
        route.routes[0].bounds = None;
        sync.sync(Some(&Arc::new(route)));

        // polyline spans 38.5,-120.2 to 43.252,-126.453
        let viewport = sync.surface().viewport.unwrap();
        assert!((viewport.center.lat - 40.876).abs() < 1e-6);
        assert!(viewport.zoom < 10.0);
    }

    #[test]
    fn test_zero_results_does_not_fail() {
        let mut sync = synchronizer();
        let route: RouteResponse =
            serde_json::from_value(json!({"routes": [], "status": "ZERO_RESULTS"})).unwrap();
        assert!(sync.sync(Some(&Arc::new(route))));
        let config = MapConfig::default();
        assert_eq!(
            sync.surface().viewport.unwrap().center,
            config.default_center
        );
        assert!(sync.surface().markers.is_empty());
    }
}
