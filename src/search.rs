//! # Group-Aware Place Search
//!
//! Searches for places around every participant, merges the answers, and narrows them
//! to the area the group spans.
//!
//! ## Pipeline
//! 1. One provider lookup per origin within [`SearchConfig::radius_meters`]
//! 2. Merge in origin order, dropping any result within [`SearchConfig::dedup_meters`]
//!    of one already kept (first seen wins, R-tree pre-filtered)
//! 3. Stable sort by provider relevance, descending
//! 4. Truncate to [`SearchConfig::max_results`]
//! 5. Optionally keep only results inside the triangle spanned by the primary location
//!    and the first two participants ([`filter_within_triangle`])
//!
//! A failing origin is logged and skipped. If every origin fails the search yields an
//! empty list; it never returns an error to the caller.

use futures::future::join_all;
use log::{debug, info, warn};
use rstar::{primitives::GeomWithData, RTree, AABB};
use serde::{Deserialize, Serialize};

use crate::geo_utils::{haversine_meters, meters_to_degrees, point_in_triangle};
use crate::provider::MapProvider;
use crate::Location;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// A place returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SearchResult {
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub location: Location,
    /// Provider relevance score, higher is better.
    pub score: f64,
}

impl SearchResult {
    pub fn new(place_id: &str, name: &str, address: &str, location: Location, score: f64) -> Self {
        Self {
            place_id: place_id.to_string(),
            name: name.to_string(),
            address: address.to_string(),
            location,
            score,
        }
    }
}

/// Configuration for place search and the triangle filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default)]
pub struct SearchConfig {
    /// Lookup radius around each origin.
    /// Default: 8000.0 meters
    pub radius_meters: f64,

    /// Results closer than this to an already kept result are duplicates.
    /// Default: 100.0 meters
    pub dedup_meters: f64,

    /// Maximum merged results.
    /// Default: 25
    pub max_results: u32,

    /// Below this many results inside the triangle, fall back to the unfiltered top.
    /// Default: 3
    pub min_filtered_results: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            radius_meters: 8000.0,
            dedup_meters: 100.0,
            max_results: 25,
            min_filtered_results: 3,
        }
    }
}

// ============================================================================
// Search
// ============================================================================

/// Query the provider once per origin and merge the answers.
///
/// Lookups run concurrently; merge order is still origin order so "first seen" is
/// deterministic.
pub async fn search(
    provider: &dyn MapProvider,
    query: &str,
    origins: &[Location],
    config: &SearchConfig,
) -> Vec<SearchResult> {
    let query = query.trim();
    if query.is_empty() || origins.is_empty() {
        return Vec::new();
    }

    info!("[Search] {:?} from {} origins (radius {}m)", query, origins.len(), config.radius_meters);

    let lookups = origins
        .iter()
        .map(|origin| provider.find_places(query, *origin, config.radius_meters));
    let answers = join_all(lookups).await;

    let mut merged = Vec::new();
    let mut failures = 0;
    for (origin, answer) in origins.iter().zip(answers) {
        match answer {
            Ok(results) => {
                debug!(
                    "[Search] {} results near ({:.4}, {:.4})",
                    results.len(), origin.latitude, origin.longitude
                );
                merged.extend(results);
            }
            Err(e) => {
                failures += 1;
                warn!(
                    "[Search] Lookup near ({:.4}, {:.4}) failed, skipping: {}",
                    origin.latitude, origin.longitude, e
                );
            }
        }
    }

    if failures == origins.len() {
        warn!("[Search] Every origin failed, returning no results");
        return Vec::new();
    }

    let mut results = dedup_results(merged, config.dedup_meters);
    results.sort_by(|a, b| b.score.total_cmp(&a.score));
    results.truncate(config.max_results as usize);

    info!("[Search] {:?} -> {} results", query, results.len());
    results
}

/// Drop any result within `meters` of an earlier one. Order is preserved.
///
/// Accepted results are kept in an R-tree so each candidate only runs the exact
/// haversine check against neighbours inside its search envelope.
///
/// ```
/// use rendezvous_engine::{Location, SearchResult, search::dedup_results};
///
/// let a = SearchResult::new("a", "Pizza", "1 Main", Location::new(40.0000, -75.0), 1.0);
/// let b = SearchResult::new("b", "Pizza", "1 Main", Location::new(40.0003, -75.0), 9.0);
/// let kept = dedup_results(vec![a, b], 100.0);
/// assert_eq!(kept.len(), 1);
/// assert_eq!(kept[0].place_id, "a");
/// ```
pub fn dedup_results(results: Vec<SearchResult>, meters: f64) -> Vec<SearchResult> {
    let mut index: RTree<GeomWithData<[f64; 2], usize>> = RTree::new();
    let mut kept: Vec<SearchResult> = Vec::with_capacity(results.len());

    for result in results {
        let loc = result.location;
        let buffer = meters_to_degrees(meters, loc.latitude);
        let envelope = AABB::from_corners(
            [loc.longitude - buffer, loc.latitude - buffer],
            [loc.longitude + buffer, loc.latitude + buffer],
        );

        let duplicate = index
            .locate_in_envelope(&envelope)
            .any(|near| haversine_meters(&kept[near.data].location, &loc) < meters);

        if duplicate {
            debug!("[Search] Dropping duplicate {} ({})", result.name, result.place_id);
            continue;
        }

        index.insert(GeomWithData::new([loc.longitude, loc.latitude], kept.len()));
        kept.push(result);
    }

    kept
}

// ============================================================================
// Triangle filter
// ============================================================================

/// Keep results inside the triangle formed by `primary` and the first two
/// `participants`.
///
/// - Fewer than two participant locations: the triangle is undefined and the input is
///   returned unchanged.
/// - Fewer than `min_filtered_results` inside: the top `min_filtered_results`
///   unfiltered results are returned instead (all of them if there are fewer), so the
///   user never faces an empty screen because of the geometry.
pub fn filter_within_triangle(
    results: &[SearchResult],
    primary: Location,
    participants: &[Location],
    config: &SearchConfig,
) -> Vec<SearchResult> {
    let (first, second) = match participants {
        [first, second, ..] => (*first, *second),
        _ => {
            debug!("[Search] {} participant locations, triangle undefined", participants.len());
            return results.to_vec();
        }
    };

    let corners = [primary, first, second];

    #[cfg(feature = "parallel")]
    let inside: Vec<SearchResult> = results
        .par_iter()
        .filter(|r| point_in_triangle(&r.location, &corners))
        .cloned()
        .collect();

    #[cfg(not(feature = "parallel"))]
    let inside: Vec<SearchResult> = results
        .iter()
        .filter(|r| point_in_triangle(&r.location, &corners))
        .cloned()
        .collect();

    let min = config.min_filtered_results as usize;
    if inside.len() < min {
        info!(
            "[Search] Only {} of {} results inside the group triangle, showing top {} instead",
            inside.len(), results.len(), min
        );
        return results.iter().take(min).cloned().collect();
    }

    inside
}

// ============================================================================
// Natural-language query stub
// ============================================================================

/// Result of interpreting a free-text request such as "find pizza between us".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedQuery {
    /// The search term to send to the provider.
    pub term: String,
    /// The request asked for somewhere central to the group.
    pub wants_midpoint: bool,
}

const FILLER_WORDS: &[&str] = &[
    "a", "an", "the", "some", "me", "us", "we", "i", "find", "search", "for", "looking",
    "show", "want", "to", "get", "grab", "can", "where", "good", "nice", "place", "places",
    "spot", "spots", "near", "nearby", "around", "somewhere", "please", "lets", "let's",
    "go", "eat", "in", "of", "all", "is", "there",
];

const MIDPOINT_WORDS: &[&str] = &["between", "middle", "halfway", "central", "everyone", "midpoint"];

/// Rule-based stand-in for an AI query parser.
///
/// ```
/// use rendezvous_engine::search::parse_natural_query;
///
/// let parsed = parse_natural_query("Find a good sushi restaurant between us?");
/// assert_eq!(parsed.term, "sushi restaurant");
/// assert!(parsed.wants_midpoint);
/// ```
pub fn parse_natural_query(text: &str) -> ParsedQuery {
    let lowered = text.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| c.is_whitespace() || matches!(c, ',' | '.' | '?' | '!'))
        .filter(|w| !w.is_empty())
        .collect();

    let wants_midpoint = words.iter().any(|w| MIDPOINT_WORDS.contains(w));
    let term: Vec<&str> = words
        .iter()
        .copied()
        .filter(|w| !FILLER_WORDS.contains(w) && !MIDPOINT_WORDS.contains(w))
        .collect();

    let term = if term.is_empty() { text.trim().to_string() } else { term.join(" ") };
    debug!("[Search] Parsed {:?} -> {:?} (midpoint: {})", text, term, wants_midpoint);

    ParsedQuery { term, wants_midpoint }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::ScriptedProvider;

    fn result(id: &str, lat: f64, lng: f64, score: f64) -> SearchResult {
        SearchResult::new(id, &format!("Pizza {}", id), "Main St", Location::new(lat, lng), score)
    }

    fn triangle_people() -> (Location, Vec<Location>) {
        (
            Location::new(40.00, -75.00),
            vec![Location::new(40.00, -74.90), Location::new(40.08, -74.95)],
        )
    }

    #[test]
    fn test_dedup_keeps_first_encountered() {
        let results = vec![
            result("first", 40.0000, -75.0000, 1.0),
            result("second", 40.0005, -75.0000, 50.0), // ~55m away
            result("third", 40.0100, -75.0000, 10.0),  // ~1.1km away
        ];
        let kept = dedup_results(results, 100.0);
        let ids: Vec<&str> = kept.iter().map(|r| r.place_id.as_str()).collect();
        assert_eq!(ids, vec!["first", "third"]);
    }

    #[test]
    fn test_dedup_chain_is_not_transitive() {
        // b is a duplicate of a, c is 150m from a but only 75m from the dropped b
        let results = vec![
            result("a", 40.00000, -75.0, 1.0),
            result("b", 40.00068, -75.0, 1.0),
            result("c", 40.00135, -75.0, 1.0),
        ];
        let kept = dedup_results(results, 100.0);
        assert_eq!(kept.len(), 2);
        assert_eq!(kept[1].place_id, "c");
    }

    #[tokio::test]
    async fn test_search_merges_sorts_and_truncates() {
        let mut provider = ScriptedProvider::new();
        for i in 0..40 {
            provider = provider.with_place(
                "pizza",
                result(&format!("p{}", i), 40.0 + i as f64 * 0.002, -75.0, i as f64),
            );
        }
        let origins = [Location::new(40.0, -75.0), Location::new(40.05, -75.0)];

        let found = search(&provider, "pizza", &origins, &SearchConfig::default()).await;
        assert_eq!(found.len(), 25);
        assert_eq!(found[0].place_id, "p39");
        assert!(found.windows(2).all(|w| w[0].score >= w[1].score));
        // Both origins see the middle places; they must not appear twice
        let mut ids: Vec<&str> = found.iter().map(|r| r.place_id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 25);
    }

    #[tokio::test]
    async fn test_failing_origin_is_skipped() {
        let bad = Location::new(41.0, -75.0);
        let provider = ScriptedProvider::new()
            .with_place("pizza", result("good", 40.001, -75.0, 5.0))
            .failing_near(bad);

        let found = search(&provider, "pizza", &[bad, Location::new(40.0, -75.0)], &SearchConfig::default()).await;
        assert_eq!(found.len(), 1);
    }

    #[tokio::test]
    async fn test_unreachable_provider_yields_empty() {
        let provider = ScriptedProvider::new().unreachable();
        let found = search(&provider, "pizza", &[Location::new(40.0, -75.0)], &SearchConfig::default()).await;
        assert!(found.is_empty());
    }

    #[test]
    fn test_triangle_undefined_returns_input() {
        let (primary, people) = triangle_people();
        let results = vec![result("x", 10.0, 10.0, 1.0)];
        let config = SearchConfig::default();

        assert_eq!(filter_within_triangle(&results, primary, &[], &config), results);
        assert_eq!(filter_within_triangle(&results, primary, &people[..1], &config), results);
    }

    #[test]
    fn test_triangle_keeps_inside_results() {
        let (primary, people) = triangle_people();
        let results = vec![
            result("in1", 40.02, -74.95, 9.0),
            result("out", 45.00, -70.00, 8.0),
            result("in2", 40.03, -74.96, 7.0),
            result("in3", 40.01, -74.97, 6.0),
        ];
        let kept = filter_within_triangle(&results, primary, &people, &SearchConfig::default());
        let ids: Vec<&str> = kept.iter().map(|r| r.place_id.as_str()).collect();
        assert_eq!(ids, vec!["in1", "in2", "in3"]);
    }

    #[test]
    fn test_sparse_triangle_falls_back_to_top_three() {
        let (primary, people) = triangle_people();
        let results = vec![
            result("out1", 45.0, -70.0, 9.0),
            result("in", 40.02, -74.95, 8.0),
            result("out2", 46.0, -70.0, 7.0),
            result("out3", 47.0, -70.0, 6.0),
        ];
        let kept = filter_within_triangle(&results, primary, &people, &SearchConfig::default());
        let ids: Vec<&str> = kept.iter().map(|r| r.place_id.as_str()).collect();
        assert_eq!(ids, vec!["out1", "in", "out2"]);

        let two = &results[..2];
        assert_eq!(filter_within_triangle(two, primary, &people, &SearchConfig::default()).len(), 2);
    }

    #[test]
    fn test_parse_natural_query() {
        assert_eq!(
            parse_natural_query("pizza"),
            ParsedQuery { term: "pizza".into(), wants_midpoint: false }
        );
        let parsed = parse_natural_query("Where can we get coffee halfway?");
        assert_eq!(parsed.term, "coffee");
        assert!(parsed.wants_midpoint);
        // Nothing but filler: keep the raw text
        assert_eq!(parse_natural_query("find us a place").term, "find us a place");
    }
}
