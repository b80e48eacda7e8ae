//! # Rendezvous Engine
//!
//! Meetup planning engine: propose a rendezvous, invite participants, find a place
//! that sits between everyone, vote on candidates, and simulate everyone travelling
//! to the chosen destination.
//!
//! This library provides:
//! - Geometry for group search (triangle containment, haversine, polyline walking)
//! - Place search across participant locations with de-duplication and a triangle filter
//! - A candidate store with per-user voting and exclusive selection
//! - A scripted participant timeline published as an event stream
//! - A [`Session`] that folds events into state and renders declarative map features
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel triangle filtering with rayon
//! - **`http`** - Enable the ArcGIS location services provider
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use rendezvous_engine::{Location, SearchConfig, SearchResult, filter_within_triangle};
//!
//! let me = Location::new(37.7749, -122.4194);
//! let friends = vec![Location::new(37.7949, -122.3944), Location::new(37.7549, -122.3894)];
//!
//! let results = vec![
//!     SearchResult::new("a", "Pieology", "1 Market St", Location::new(37.7760, -122.4050), 95.0),
//!     SearchResult::new("b", "Pizza Hut", "2 Bay St", Location::new(37.8100, -122.4400), 99.0),
//! ];
//!
//! // Only one result is between us, so the top results are kept unfiltered
//! let kept = filter_within_triangle(&results, me, &friends, &SearchConfig::default());
//! assert_eq!(kept.len(), 2);
//! ```

use serde::{Deserialize, Serialize};

pub mod geo_utils;
pub mod color;

pub mod candidates;
pub use candidates::{CandidateError, CandidateStore, PlaceCandidate, ProposedPlace, VoteDirection};

pub mod search;
pub use search::{dedup_results, filter_within_triangle, parse_natural_query, search, ParsedQuery, SearchConfig, SearchResult};

pub mod directions;
pub use directions::{DirectionStep, ManeuverType, Navigator};

pub mod provider;
pub use provider::{MapProvider, ProviderError, RouteResult, ScriptedProvider, Suggestion};

// ArcGIS provider
#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
pub use http::ArcGisClient;

pub mod rendezvous;
pub use rendezvous::{resolve_view, Invitation, RendezvousEvent, Transportation, View};

pub mod notify;
pub use notify::{LogNotifier, Notification, NotificationLevel, Notifier, RecordingNotifier};

pub mod timeline;
pub use timeline::{EventStream, ParticipantEvent, ParticipantState, ScriptedTimeline, SimulationConfig, SimulationHandle};

pub mod map_features;
pub use map_features::{reconcile, FeatureChange, FeatureGeometry, FeatureKind, MapFeature};

pub mod scoring;
pub use scoring::{leaderboard, score_trip, ParticipantScore, ScoringConfig, TripRecord, TripStats};

pub mod session;
pub use session::{scripted_participants, FeatureSet, Session, SessionError, USER_ID};

pub mod trip_store;
pub use trip_store::{forward_participant_events, InMemoryTripStore, StoreError, TripParticipant, TripStore};

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("RendezvousEngine")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use rendezvous_engine::Location;
/// let sf = Location::new(37.7749, -122.4194);
/// assert!(sf.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    /// Create a new location.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Check if the location has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Someone taking part in a rendezvous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Participant {
    pub id: String,
    pub name: String,
    pub location: Location,
    /// Marker color, `#RRGGBB`.
    pub color: String,
    pub joined: bool,
    /// Privacy mode: the marker is not drawn but the participant still takes part.
    #[serde(default)]
    pub hidden: bool,
}

impl Participant {
    /// A participant who has not joined yet.
    pub fn new(id: &str, name: &str, location: Location, color: &str) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            location,
            color: color.to_string(),
            joined: false,
            hidden: false,
        }
    }
}

/// Bounding box for fitting the map view.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from locations. Invalid coordinates are skipped.
    pub fn from_points(points: &[Location]) -> Option<Self> {
        let mut valid = points.iter().filter(|p| p.is_valid()).peekable();
        valid.peek()?;

        let mut bounds = Self {
            min_lat: f64::MAX,
            max_lat: f64::MIN,
            min_lng: f64::MAX,
            max_lng: f64::MIN,
        };
        for p in valid {
            bounds.min_lat = bounds.min_lat.min(p.latitude);
            bounds.max_lat = bounds.max_lat.max(p.latitude);
            bounds.min_lng = bounds.min_lng.min(p.longitude);
            bounds.max_lng = bounds.max_lng.max(p.longitude);
        }
        Some(bounds)
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> Location {
        Location::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }

    /// Grow every side by `fraction` of the span, so edge markers are not clipped.
    pub fn padded(&self, fraction: f64) -> Self {
        let dlat = (self.max_lat - self.min_lat) * fraction;
        let dlng = (self.max_lng - self.min_lng) * fraction;
        Self {
            min_lat: self.min_lat - dlat,
            max_lat: self.max_lat + dlat,
            min_lng: self.min_lng - dlng,
            max_lng: self.max_lng + dlng,
        }
    }
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::{debug, info};

    /// Area-sum triangle containment.
    #[uniffi::export]
    pub fn ffi_point_in_triangle(point: Location, a: Location, b: Location, c: Location) -> bool {
        geo_utils::point_in_triangle(&point, &[a, b, c])
    }

    /// Great-circle distance in miles.
    #[uniffi::export]
    pub fn ffi_haversine_distance(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
        geo_utils::haversine_distance(lat1, lng1, lat2, lng2)
    }

    /// Leaderboard tint for a score in [0, 100].
    #[uniffi::export]
    pub fn ffi_score_color(score: f64) -> String {
        color::score_color(score)
    }

    #[uniffi::export]
    pub fn ffi_participant_color(index: u32) -> String {
        color::participant_color(index as usize).to_string()
    }

    /// Keep results between the user and the first two participants.
    #[uniffi::export]
    pub fn ffi_filter_within_triangle(
        results: Vec<SearchResult>,
        primary: Location,
        participants: Vec<Location>,
        config: SearchConfig,
    ) -> Vec<SearchResult> {
        init_logging();
        let kept = filter_within_triangle(&results, primary, &participants, &config);
        info!("[RendezvousEngine] Triangle filter kept {}/{} results", kept.len(), results.len());
        kept
    }

    #[uniffi::export]
    pub fn ffi_dedup_results(results: Vec<SearchResult>, meters: f64) -> Vec<SearchResult> {
        init_logging();
        dedup_results(results, meters)
    }

    /// URL path segment for the map view.
    #[uniffi::export]
    pub fn ffi_encode_rendezvous(event: RendezvousEvent) -> String {
        event.to_url_segment()
    }

    /// Decode a map-view path segment. `None` means "go home".
    #[uniffi::export]
    pub fn ffi_decode_rendezvous(segment: String) -> Option<RendezvousEvent> {
        init_logging();
        match resolve_view(Some(&segment)) {
            View::Map(event) => Some(event),
            View::Home => None,
        }
    }

    /// `mailto:` URL inviting people to a rendezvous.
    #[uniffi::export]
    pub fn ffi_invitation_mailto(event: RendezvousEvent, base_url: String) -> String {
        let link = event.share_link(&base_url);
        Invitation::new(&event, &link).mailto()
    }

    #[uniffi::export]
    pub fn ffi_leaderboard(records: Vec<TripRecord>, config: ScoringConfig) -> Vec<ParticipantScore> {
        init_logging();
        debug!("[RendezvousEngine] Scoring {} travellers", records.len());
        leaderboard(&records, &config)
    }

    #[uniffi::export]
    pub fn ffi_trip_stats(records: Vec<TripRecord>) -> Option<TripStats> {
        TripStats::from_records(&records)
    }

    /// Place search through ArcGIS, blocking the calling thread.
    #[cfg(feature = "http")]
    #[uniffi::export]
    pub fn ffi_search_places(
        api_key: String,
        query: String,
        origins: Vec<Location>,
        config: SearchConfig,
    ) -> Vec<SearchResult> {
        use log::warn;
        use tokio::runtime::Builder;

        init_logging();
        let rt = match Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                warn!("[RendezvousEngine] Failed to create tokio runtime: {}", e);
                return Vec::new();
            }
        };
        let client = match ArcGisClient::new(&api_key) {
            Ok(c) => c,
            Err(e) => {
                warn!("[RendezvousEngine] Failed to create ArcGIS client: {}", e);
                return Vec::new();
            }
        };
        rt.block_on(search(&client, &query, &origins, &config))
    }

    /// Get default search configuration.
    #[uniffi::export]
    pub fn default_search_config() -> SearchConfig {
        SearchConfig::default()
    }

    /// Get default simulation timing.
    #[uniffi::export]
    pub fn default_simulation_config() -> SimulationConfig {
        SimulationConfig::default()
    }

    /// Get default scoring rules.
    #[uniffi::export]
    pub fn default_scoring_config() -> ScoringConfig {
        ScoringConfig::default()
    }

    #[uniffi::export]
    pub fn default_feature_set() -> FeatureSet {
        FeatureSet::default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_validation() {
        assert!(Location::new(37.7749, -122.4194).is_valid());
        assert!(!Location::new(91.0, 0.0).is_valid());
        assert!(!Location::new(0.0, 181.0).is_valid());
        assert!(!Location::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_participant_defaults() {
        let p = Participant::new("barry", "Barry Allen", Location::new(1.0, 2.0), "#4ECDC4");
        assert!(!p.joined);
        assert!(!p.hidden);
    }

    #[test]
    fn test_participant_hidden_defaults_when_missing() {
        let json = r##"{"id":"a","name":"A","location":{"latitude":1.0,"longitude":2.0},"color":"#FFFFFF","joined":true}"##;
        let p: Participant = serde_json::from_str(json).unwrap();
        assert!(p.joined);
        assert!(!p.hidden);
    }

    #[test]
    fn test_bounds() {
        let points = vec![
            Location::new(37.77, -122.42),
            Location::new(37.79, -122.39),
            Location::new(f64::NAN, 0.0),
        ];
        let bounds = Bounds::from_points(&points).unwrap();
        assert_eq!(bounds.min_lat, 37.77);
        assert_eq!(bounds.max_lng, -122.39);

        let center = bounds.center();
        assert!((center.latitude - 37.78).abs() < 1e-9);

        let padded = bounds.padded(0.5);
        assert!((padded.max_lat - 37.80).abs() < 1e-9);

        assert!(Bounds::from_points(&[]).is_none());
        assert!(Bounds::from_points(&[Location::new(f64::NAN, 0.0)]).is_none());
    }
}
