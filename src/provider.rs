//! Mapping provider seam: geocoding, suggestions, place search and routing.
//!
//! The engine never talks to a map SDK directly. Everything goes through
//! [`MapProvider`], so a REST client (see the `http` feature), a scripted fixture, or a
//! host-side bridge can be swapped in. Failures are typed here but the callers in this
//! crate degrade them (no coordinates, empty suggestions, skipped origins) instead of
//! propagating.

use async_trait::async_trait;
use log::warn;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use thiserror::Error;

use crate::directions::{scripted_directions, DirectionStep};
use crate::geo_utils::haversine_meters;
use crate::search::SearchResult;
use crate::Location;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProviderError {
    #[error("no coordinates found for {0:?}")]
    NoMatch(String),
    #[error("provider unreachable: {0}")]
    Unreachable(String),
    #[error("HTTP {0}")]
    Status(u16),
    #[error("max retries exceeded")]
    RetriesExhausted,
    #[error("malformed provider response: {0}")]
    Malformed(String),
}

/// Autocomplete suggestion for an address field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Suggestion {
    pub address: String,
    /// Opaque provider key used to resolve the suggestion.
    pub key: String,
}

/// A route between two points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct RouteResult {
    pub polyline: Vec<Location>,
    pub directions: Vec<DirectionStep>,
}

#[async_trait]
pub trait MapProvider: Send + Sync {
    /// Resolve a free-form address to coordinates.
    async fn geocode(&self, address: &str) -> Result<Location, ProviderError>;

    /// Address suggestions for partial input.
    async fn suggest(&self, text: &str) -> Result<Vec<Suggestion>, ProviderError>;

    /// Places matching `query` within `radius_meters` of `near`, in provider order.
    async fn find_places(
        &self,
        query: &str,
        near: Location,
        radius_meters: f64,
    ) -> Result<Vec<SearchResult>, ProviderError>;

    /// Driving route from `start` to `end`.
    async fn route(&self, start: Location, end: Location) -> Result<RouteResult, ProviderError>;
}

/// Geocode, logging and swallowing any failure.
pub async fn geocode_or_none(provider: &dyn MapProvider, address: &str) -> Option<Location> {
    match provider.geocode(address).await {
        Ok(location) => Some(location),
        Err(e) => {
            warn!("[Provider] Geocoding {:?} failed: {}", address, e);
            None
        }
    }
}

/// Suggestions, or an empty list on failure.
pub async fn suggest_or_empty(provider: &dyn MapProvider, text: &str) -> Vec<Suggestion> {
    provider.suggest(text).await.unwrap_or_else(|e| {
        warn!("[Provider] Suggestions for {:?} failed: {}", text, e);
        Vec::new()
    })
}

/// Route, falling back to a straight line with scripted directions.
pub async fn route_or_scripted(
    provider: &dyn MapProvider,
    start: Location,
    end: Location,
    destination_name: &str,
) -> RouteResult {
    match provider.route(start, end).await {
        Ok(route) if route.polyline.len() >= 2 => route,
        Ok(_) => {
            warn!("[Provider] Route to {} had no geometry, using straight line", destination_name);
            straight_route(start, end, destination_name)
        }
        Err(e) => {
            warn!("[Provider] Routing to {} failed: {}, using straight line", destination_name, e);
            straight_route(start, end, destination_name)
        }
    }
}

const STRAIGHT_ROUTE_VERTICES: usize = 12;

fn straight_route(start: Location, end: Location, destination_name: &str) -> RouteResult {
    let n = STRAIGHT_ROUTE_VERTICES - 1;
    let mut polyline: Vec<Location> = (0..n)
        .map(|i| {
            let t = i as f64 / n as f64;
            Location::new(
                start.latitude + t * (end.latitude - start.latitude),
                start.longitude + t * (end.longitude - start.longitude),
            )
        })
        .collect();
    // Exact endpoint, interpolation can be off by an ulp
    polyline.push(end);

    RouteResult {
        polyline,
        directions: scripted_directions(destination_name, haversine_meters(&start, &end)),
    }
}

// ============================================================================
// Scripted provider
// ============================================================================

/// In-memory provider with canned answers, for demos and tests.
///
/// Addresses and queries match case-insensitively. Place search returns every
/// registered place whose name or category contains the query and lies within the
/// radius, in registration order.
#[derive(Default)]
pub struct ScriptedProvider {
    addresses: HashMap<String, Location>,
    places: Vec<(String, SearchResult)>,
    failing_origins: Vec<Location>,
    routes: HashMap<String, RouteResult>,
    unreachable: bool,
    calls: AtomicU32,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_address(mut self, address: &str, location: Location) -> Self {
        self.addresses.insert(address.to_lowercase(), location);
        self
    }

    /// Register a place under a category keyword (e.g. "pizza").
    pub fn with_place(mut self, category: &str, place: SearchResult) -> Self {
        self.places.push((category.to_lowercase(), place));
        self
    }

    /// Register a fixed route ending at `end`. Other destinations get a straight line.
    pub fn with_route(mut self, end: Location, route: RouteResult) -> Self {
        self.routes.insert(route_key(&end), route);
        self
    }

    /// Place searches around this origin fail.
    pub fn failing_near(mut self, origin: Location) -> Self {
        self.failing_origins.push(origin);
        self
    }

    /// Every call fails as if the network were down.
    pub fn unreachable(mut self) -> Self {
        self.unreachable = true;
        self
    }

    /// Number of provider calls made so far.
    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::Relaxed)
    }

    fn record_call(&self) -> Result<(), ProviderError> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if self.unreachable {
            return Err(ProviderError::Unreachable("scripted outage".to_string()));
        }
        Ok(())
    }
}

fn route_key(end: &Location) -> String {
    format!("{:.5},{:.5}", end.latitude, end.longitude)
}

#[async_trait]
impl MapProvider for ScriptedProvider {
    async fn geocode(&self, address: &str) -> Result<Location, ProviderError> {
        self.record_call()?;
        self.addresses
            .get(&address.to_lowercase())
            .copied()
            .ok_or_else(|| ProviderError::NoMatch(address.to_string()))
    }

    async fn suggest(&self, text: &str) -> Result<Vec<Suggestion>, ProviderError> {
        self.record_call()?;
        let needle = text.to_lowercase();
        let mut found: Vec<Suggestion> = self
            .addresses
            .keys()
            .filter(|a| !needle.is_empty() && a.contains(&needle))
            .map(|a| Suggestion { address: a.clone(), key: format!("addr:{}", a) })
            .collect();
        found.sort_by(|a, b| a.address.cmp(&b.address));
        Ok(found)
    }

    async fn find_places(
        &self,
        query: &str,
        near: Location,
        radius_meters: f64,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        self.record_call()?;
        if self.failing_origins.iter().any(|o| haversine_meters(o, &near) < 1.0) {
            return Err(ProviderError::Status(500));
        }

        let needle = query.to_lowercase();
        Ok(self
            .places
            .iter()
            .filter(|(category, place)| {
                category.contains(&needle) || place.name.to_lowercase().contains(&needle)
            })
            .filter(|(_, place)| haversine_meters(&place.location, &near) <= radius_meters)
            .map(|(_, place)| place.clone())
            .collect())
    }

    async fn route(&self, start: Location, end: Location) -> Result<RouteResult, ProviderError> {
        self.record_call()?;
        match self.routes.get(&route_key(&end)) {
            Some(route) => {
                let mut route = route.clone();
                if route.polyline.first() != Some(&start) {
                    route.polyline.insert(0, start);
                }
                Ok(route)
            }
            None => Ok(straight_route(start, end, "destination")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pizza(id: &str, lat: f64, lng: f64, score: f64) -> SearchResult {
        SearchResult::new(id, &format!("Pizza {}", id), "Main St", Location::new(lat, lng), score)
    }

    #[tokio::test]
    async fn test_geocode_is_case_insensitive() {
        let provider = ScriptedProvider::new().with_address("123 Main St", Location::new(40.0, -75.0));
        assert_eq!(provider.geocode("123 MAIN ST").await, Ok(Location::new(40.0, -75.0)));
        assert!(matches!(provider.geocode("nowhere").await, Err(ProviderError::NoMatch(_))));
    }

    #[tokio::test]
    async fn test_degraded_helpers() {
        let provider = ScriptedProvider::new().unreachable();
        assert_eq!(geocode_or_none(&provider, "123 Main St").await, None);
        assert!(suggest_or_empty(&provider, "123").await.is_empty());
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test]
    async fn test_find_places_respects_radius() {
        let provider = ScriptedProvider::new()
            .with_place("pizza", pizza("near", 40.001, -75.0, 90.0))
            .with_place("pizza", pizza("far", 41.0, -75.0, 99.0));

        let found = provider.find_places("pizza", Location::new(40.0, -75.0), 8000.0).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].place_id, "near");
    }

    #[tokio::test]
    async fn test_route_fallback_is_straight_line() {
        let provider = ScriptedProvider::new().unreachable();
        let start = Location::new(40.0, -75.0);
        let end = Location::new(40.01, -75.0);

        let route = route_or_scripted(&provider, start, end, "Pizza Place").await;
        assert_eq!(route.polyline.len(), STRAIGHT_ROUTE_VERTICES);
        assert_eq!(route.polyline[0], start);
        assert_eq!(*route.polyline.last().unwrap(), end);
        assert!(!route.directions.is_empty());
    }

    #[tokio::test]
    async fn test_registered_route_starts_at_origin() {
        let end = Location::new(40.01, -75.0);
        let provider = ScriptedProvider::new().with_route(
            end,
            RouteResult { polyline: vec![Location::new(40.005, -75.001), end], directions: vec![] },
        );
        let start = Location::new(40.0, -75.0);
        let route = provider.route(start, end).await.unwrap();
        assert_eq!(route.polyline.len(), 3);
        assert_eq!(route.polyline[0], start);
    }
}
