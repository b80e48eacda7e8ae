//! ArcGIS location services as a [`MapProvider`].
//!
//! - Geocoding and place search: World GeocodeServer `findAddressCandidates`
//! - Address autocomplete: World GeocodeServer `suggest`
//! - Routing: World Route `solve`, with driving directions
//!
//! Requests share one pooled client, are spaced out by a dispatch rate limiter
//! (a group search fans out one lookup per participant), time out after 30 s, and
//! retry with exponential backoff on 429 and transport errors.

use async_trait::async_trait;
use log::{debug, info, warn};
use reqwest::Client;
use serde::Deserialize;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::directions::{DirectionStep, ManeuverType};
use crate::geo_utils::{haversine_meters, meters_to_degrees};
use crate::provider::{MapProvider, ProviderError, RouteResult, Suggestion};
use crate::search::SearchResult;
use crate::Location;

const GEOCODE_URL: &str = "https://geocode-api.arcgis.com/arcgis/rest/services/World/GeocodeServer";
const ROUTE_URL: &str = "https://route-api.arcgis.com/arcgis/rest/services/World/Route/NAServer/Route_World/solve";

const DISPATCH_INTERVAL_MS: u64 = 50;
const REQUEST_TIMEOUT_SECS: u64 = 30;
const MAX_RETRIES: u32 = 3;
const MAX_PLACE_CANDIDATES: u32 = 50;
const MAX_SUGGESTIONS: u32 = 5;

// ============================================================================
// Response types
// ============================================================================

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CandidatesResponse {
    #[serde(default)]
    candidates: Vec<ApiCandidate>,
}

#[derive(Debug, Deserialize)]
struct ApiCandidate {
    address: String,
    location: ApiPoint,
    #[serde(default)]
    score: f64,
    #[serde(default)]
    attributes: ApiAttributes,
}

#[derive(Debug, Default, Deserialize)]
struct ApiAttributes {
    #[serde(rename = "PlaceName", default)]
    place_name: String,
    #[serde(rename = "Place_addr", default)]
    place_addr: String,
}

#[derive(Debug, Deserialize)]
struct ApiPoint {
    x: f64,
    y: f64,
}

#[derive(Debug, Deserialize)]
struct SuggestResponse {
    #[serde(default)]
    suggestions: Vec<ApiSuggestion>,
}

#[derive(Debug, Deserialize)]
struct ApiSuggestion {
    text: String,
    #[serde(rename = "magicKey")]
    magic_key: String,
}

#[derive(Debug, Deserialize)]
struct SolveResponse {
    routes: ApiRoutes,
    #[serde(default)]
    directions: Vec<ApiDirections>,
}

#[derive(Debug, Deserialize)]
struct ApiRoutes {
    #[serde(default)]
    features: Vec<ApiRouteFeature>,
}

#[derive(Debug, Deserialize)]
struct ApiRouteFeature {
    geometry: ApiPaths,
}

#[derive(Debug, Deserialize)]
struct ApiPaths {
    /// `[x, y]` vertices, optionally with z/m values after them.
    paths: Vec<Vec<Vec<f64>>>,
}

#[derive(Debug, Deserialize)]
struct ApiDirections {
    #[serde(default)]
    features: Vec<ApiDirectionFeature>,
}

#[derive(Debug, Deserialize)]
struct ApiDirectionFeature {
    attributes: ApiDirectionAttributes,
}

#[derive(Debug, Deserialize)]
struct ApiDirectionAttributes {
    text: String,
    #[serde(default)]
    length: f64,
    /// Minutes.
    #[serde(default)]
    time: f64,
    #[serde(rename = "maneuverType", default)]
    maneuver_type: String,
}

// ============================================================================
// Response parsing
// ============================================================================

/// ArcGIS reports most failures as HTTP 200 with an `error` object.
fn parse_body<'a, T: Deserialize<'a>>(body: &'a [u8]) -> Result<T, ProviderError> {
    if let Ok(ErrorEnvelope { error: Some(e) }) = serde_json::from_slice::<ErrorEnvelope>(body) {
        warn!("[ArcGIS] Service error {}: {}", e.code, e.message);
        return Err(match u16::try_from(e.code) {
            Ok(code) if (400..600).contains(&code) => ProviderError::Status(code),
            _ => ProviderError::Malformed(e.message),
        });
    }
    serde_json::from_slice(body).map_err(|e| ProviderError::Malformed(e.to_string()))
}

fn parse_geocode(body: &[u8], address: &str) -> Result<Location, ProviderError> {
    let response: CandidatesResponse = parse_body(body)?;
    response
        .candidates
        .into_iter()
        .next()
        .map(|c| Location::new(c.location.y, c.location.x))
        .ok_or_else(|| ProviderError::NoMatch(address.to_string()))
}

fn parse_places(body: &[u8], near: Location, radius_meters: f64) -> Result<Vec<SearchResult>, ProviderError> {
    let response: CandidatesResponse = parse_body(body)?;
    Ok(response
        .candidates
        .into_iter()
        .map(|c| {
            let location = Location::new(c.location.y, c.location.x);
            let name = if c.attributes.place_name.is_empty() {
                c.address.clone()
            } else {
                c.attributes.place_name
            };
            let address = if c.attributes.place_addr.is_empty() {
                c.address
            } else {
                c.attributes.place_addr
            };
            let place_id = format!("{}@{:.5},{:.5}", name, location.latitude, location.longitude);
            SearchResult::new(&place_id, &name, &address, location, c.score)
        })
        .filter(|r| haversine_meters(&r.location, &near) <= radius_meters)
        .collect())
}

fn parse_suggestions(body: &[u8]) -> Result<Vec<Suggestion>, ProviderError> {
    let response: SuggestResponse = parse_body(body)?;
    Ok(response
        .suggestions
        .into_iter()
        .map(|s| Suggestion { address: s.text, key: s.magic_key })
        .collect())
}

fn parse_route(body: &[u8]) -> Result<RouteResult, ProviderError> {
    let response: SolveResponse = parse_body(body)?;
    let polyline: Vec<Location> = response
        .routes
        .features
        .into_iter()
        .next()
        .ok_or_else(|| ProviderError::Malformed("solve returned no route".to_string()))?
        .geometry
        .paths
        .into_iter()
        .flatten()
        .filter_map(|v| match v.as_slice() {
            [x, y, ..] => Some(Location::new(*y, *x)),
            _ => None,
        })
        .collect();

    let directions = response
        .directions
        .into_iter()
        .next()
        .map(|d| {
            d.features
                .into_iter()
                .map(|f| {
                    let a = f.attributes;
                    DirectionStep::new(&a.text, a.length, a.time * 60.0, ManeuverType::from_provider(&a.maneuver_type))
                })
                .collect()
        })
        .unwrap_or_default();

    Ok(RouteResult { polyline, directions })
}

// ============================================================================
// Rate limiting
// ============================================================================

/// Spaces out when requests start, and backs off after 429s.
struct DispatchRateLimiter {
    next_dispatch: Mutex<Instant>,
    dispatched_count: AtomicU32,
    consecutive_429s: AtomicU32,
}

impl DispatchRateLimiter {
    fn new() -> Self {
        Self {
            next_dispatch: Mutex::new(Instant::now()),
            dispatched_count: AtomicU32::new(0),
            consecutive_429s: AtomicU32::new(0),
        }
    }

    /// Wait for our dispatch slot. Each caller gets a unique slot
    /// DISPATCH_INTERVAL_MS after the previous one.
    async fn wait_for_dispatch_slot(&self) -> u32 {
        let (wait, dispatch_num) = {
            let mut next = self.next_dispatch.lock().await;
            let now = Instant::now();
            let dispatch_at = (*next).max(now);
            *next = dispatch_at + Duration::from_millis(DISPATCH_INTERVAL_MS);

            let num = self.dispatched_count.fetch_add(1, Ordering::Relaxed) + 1;
            (dispatch_at - now, num)
        };

        // Wait outside the lock
        if !wait.is_zero() {
            debug!("[ArcGIS #{}] Waiting {:?} for slot", dispatch_num, wait);
            tokio::time::sleep(wait).await;
        }
        dispatch_num
    }

    fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        let backoff = retry_backoff(count);
        warn!("[ArcGIS] Got 429, consecutive: {}, backing off {:?}", count, backoff);
        backoff
    }
}

/// 1s, 2s, 4s max
fn retry_backoff(attempt: u32) -> Duration {
    Duration::from_millis(500 * (1 << attempt.min(3)))
}

// ============================================================================
// Client
// ============================================================================

/// ArcGIS location services client. Cheap to share behind an `Arc`.
pub struct ArcGisClient {
    client: Client,
    api_key: String,
    geocode_url: String,
    route_url: String,
    rate_limiter: DispatchRateLimiter,
}

impl ArcGisClient {
    pub fn new(api_key: &str) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .pool_max_idle_per_host(8)
            .pool_idle_timeout(Duration::from_secs(60))
            .tcp_keepalive(Duration::from_secs(30))
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| ProviderError::Unreachable(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key: api_key.to_string(),
            geocode_url: GEOCODE_URL.to_string(),
            route_url: ROUTE_URL.to_string(),
            rate_limiter: DispatchRateLimiter::new(),
        })
    }

    /// Point at other service roots (an enterprise portal or a proxy).
    pub fn with_endpoints(mut self, geocode_url: &str, route_url: &str) -> Self {
        self.geocode_url = geocode_url.trim_end_matches('/').to_string();
        self.route_url = route_url.to_string();
        self
    }

    /// GET with rate limiting and retries. Returns the raw body of a 2xx response.
    async fn get(&self, url: &str, params: &[(&str, String)]) -> Result<Vec<u8>, ProviderError> {
        let mut retries = 0;
        let started = Instant::now();

        loop {
            let dispatch_num = self.rate_limiter.wait_for_dispatch_slot().await;
            let response = self
                .client
                .get(url)
                .query(params)
                .query(&[("f", "json"), ("token", self.api_key.as_str())])
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > MAX_RETRIES {
                            return Err(ProviderError::RetriesExhausted);
                        }
                        let wait = self.rate_limiter.record_429();
                        tokio::time::sleep(wait).await;
                        continue;
                    }

                    self.rate_limiter.record_success();

                    if !status.is_success() {
                        warn!("[ArcGIS #{}] HTTP {} from {}", dispatch_num, status, url);
                        return Err(ProviderError::Status(status.as_u16()));
                    }

                    let body = resp
                        .bytes()
                        .await
                        .map_err(|e| ProviderError::Unreachable(format!("body download error: {}", e)))?;
                    debug!(
                        "[ArcGIS #{}] {} -> {:.1}KB in {:?}",
                        dispatch_num,
                        url,
                        body.len() as f64 / 1024.0,
                        started.elapsed()
                    );
                    return Ok(body.to_vec());
                }
                Err(e) => {
                    retries += 1;
                    if retries > MAX_RETRIES {
                        return Err(ProviderError::Unreachable(e.to_string()));
                    }
                    let wait = retry_backoff(retries);
                    warn!("[ArcGIS #{}] Error: {}, retry {} after {:?}", dispatch_num, e, retries, wait);
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }

    fn find_candidates_url(&self) -> String {
        format!("{}/findAddressCandidates", self.geocode_url)
    }
}

#[async_trait]
impl MapProvider for ArcGisClient {
    async fn geocode(&self, address: &str) -> Result<Location, ProviderError> {
        let params = [("SingleLine", address.to_string()), ("maxLocations", "1".to_string())];
        let body = self.get(&self.find_candidates_url(), &params).await?;
        let location = parse_geocode(&body, address)?;
        info!("[ArcGIS] Geocoded {:?} -> ({:.5}, {:.5})", address, location.latitude, location.longitude);
        Ok(location)
    }

    async fn suggest(&self, text: &str) -> Result<Vec<Suggestion>, ProviderError> {
        let params = [("text", text.to_string()), ("maxSuggestions", MAX_SUGGESTIONS.to_string())];
        let body = self.get(&format!("{}/suggest", self.geocode_url), &params).await?;
        parse_suggestions(&body)
    }

    async fn find_places(
        &self,
        query: &str,
        near: Location,
        radius_meters: f64,
    ) -> Result<Vec<SearchResult>, ProviderError> {
        let d = meters_to_degrees(radius_meters, near.latitude);
        let extent = format!(
            "{},{},{},{}",
            near.longitude - d,
            near.latitude - d,
            near.longitude + d,
            near.latitude + d
        );
        let params = [
            ("SingleLine", query.to_string()),
            ("location", format!("{},{}", near.longitude, near.latitude)),
            ("searchExtent", extent),
            ("outFields", "PlaceName,Place_addr".to_string()),
            ("maxLocations", MAX_PLACE_CANDIDATES.to_string()),
        ];
        let body = self.get(&self.find_candidates_url(), &params).await?;
        let places = parse_places(&body, near, radius_meters)?;
        debug!("[ArcGIS] {} places for {:?}", places.len(), query);
        Ok(places)
    }

    async fn route(&self, start: Location, end: Location) -> Result<RouteResult, ProviderError> {
        let stops = format!("{},{};{},{}", start.longitude, start.latitude, end.longitude, end.latitude);
        let params = [
            ("stops", stops),
            ("returnDirections", "true".to_string()),
            ("directionsLengthUnits", "esriNAUMeters".to_string()),
        ];
        let body = self.get(&self.route_url, &params).await?;
        let route = parse_route(&body)?;
        info!("[ArcGIS] Route with {} vertices, {} steps", route.polyline.len(), route.directions.len());
        Ok(route)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_dispatch_rate_limiter() {
        let limiter = DispatchRateLimiter::new();

        let start = Instant::now();
        assert_eq!(limiter.wait_for_dispatch_slot().await, 1);
        assert!(start.elapsed() < Duration::from_millis(1));

        let start2 = Instant::now();
        assert_eq!(limiter.wait_for_dispatch_slot().await, 2);
        let elapsed = start2.elapsed();
        assert!(elapsed >= Duration::from_millis(DISPATCH_INTERVAL_MS), "got {:?}", elapsed);
        assert!(elapsed < Duration::from_millis(DISPATCH_INTERVAL_MS + 10), "got {:?}", elapsed);
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let limiter = DispatchRateLimiter::new();
        let waits: Vec<Duration> = (0..5).map(|_| limiter.record_429()).collect();
        assert_eq!(waits[0], Duration::from_secs(1));
        assert_eq!(waits[1], Duration::from_secs(2));
        assert_eq!(waits[4], Duration::from_secs(4));
        limiter.record_success();
        assert_eq!(limiter.record_429(), Duration::from_secs(1));
    }

    #[test]
    fn test_transport_retries_use_same_backoff() {
        let waits: Vec<Duration> = (1..=MAX_RETRIES).map(retry_backoff).collect();
        assert_eq!(waits, vec![Duration::from_secs(1), Duration::from_secs(2), Duration::from_secs(4)]);
    }

    #[test]
    fn test_parse_geocode_takes_first_candidate() {
        let body = br#"{"candidates":[
            {"address":"123 Main St","location":{"x":-122.4194,"y":37.7749},"score":100},
            {"address":"123 Main Ave","location":{"x":-122.0,"y":37.0},"score":80}
        ]}"#;
        assert_eq!(parse_geocode(body, "123 Main St"), Ok(Location::new(37.7749, -122.4194)));
        assert_eq!(
            parse_geocode(br#"{"candidates":[]}"#, "nowhere"),
            Err(ProviderError::NoMatch("nowhere".into()))
        );
    }

    #[test]
    fn test_parse_places_uses_poi_fields_and_radius() {
        let body = br#"{"candidates":[
            {"address":"Pieology","location":{"x":-122.405,"y":37.776},"score":95,
             "attributes":{"PlaceName":"Pieology","Place_addr":"1 Market St, San Francisco"}},
            {"address":"Far Pizza","location":{"x":-121.0,"y":38.0},"score":99,"attributes":{}}
        ]}"#;
        let places = parse_places(body, Location::new(37.7749, -122.4194), 8000.0).unwrap();
        assert_eq!(places.len(), 1);
        assert_eq!(places[0].name, "Pieology");
        assert_eq!(places[0].address, "1 Market St, San Francisco");
        assert_eq!(places[0].place_id, "Pieology@37.77600,-122.40500");
    }

    #[test]
    fn test_service_error_in_200_body() {
        let body = br#"{"error":{"code":498,"message":"Invalid token.","details":[]}}"#;
        assert_eq!(parse_suggestions(body), Err(ProviderError::Status(498)));

        let body = br#"{"error":{"code":-1,"message":"odd"}}"#;
        assert_eq!(parse_suggestions(body), Err(ProviderError::Malformed("odd".into())));
    }

    #[test]
    fn test_parse_route_with_directions() {
        let body = br#"{
            "routes":{"features":[{"geometry":{"paths":[[[-122.4194,37.7749],[-122.41,37.776,0],[-122.405,37.776]]]}}]},
            "directions":[{"features":[
                {"attributes":{"text":"Start at Location 1","length":0,"time":0,"maneuverType":"esriDMTDepart"}},
                {"attributes":{"text":"Turn left on Market St","length":1200,"time":2.5,"maneuverType":"esriDMTTurnLeft"}}
            ]}]
        }"#;
        let route = parse_route(body).unwrap();
        assert_eq!(route.polyline.len(), 3);
        assert_eq!(route.polyline[0], Location::new(37.7749, -122.4194));
        assert_eq!(route.directions.len(), 2);
        assert_eq!(route.directions[1].maneuver_type, ManeuverType::TurnLeft);
        assert_eq!(route.directions[1].time, 150.0);
    }

    #[test]
    fn test_parse_route_without_features_is_malformed() {
        assert!(matches!(
            parse_route(br#"{"routes":{"features":[]}}"#),
            Err(ProviderError::Malformed(_))
        ));
    }
}
