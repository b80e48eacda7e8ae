//! Triangle filtering over random places, with and without the fallback.
//!
//! Run with: cargo run --example triangle_search --features parallel

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::Instant;

use rendezvous_engine::{dedup_results, filter_within_triangle, geo_utils, Location, SearchConfig, SearchResult};

fn main() {
    env_logger::init();

    let me = Location::new(40.7580, -73.9855);
    let friends = [Location::new(40.7484, -73.9857), Location::new(40.7527, -73.9772)];
    let config = SearchConfig::default();

    let mut rng = StdRng::seed_from_u64(7);
    let places: Vec<SearchResult> = (0..5_000)
        .map(|i| {
            let location = Location::new(rng.gen_range(40.740..40.765), rng.gen_range(-73.995..-73.970));
            SearchResult::new(&format!("p{}", i), &format!("Place {}", i), "Manhattan", location, rng.gen_range(0.0..100.0))
        })
        .collect();

    let start = Instant::now();
    let unique = dedup_results(places.clone(), config.dedup_meters);
    println!("Dedup: {} -> {} places in {:?}", places.len(), unique.len(), start.elapsed());

    let start = Instant::now();
    let inside = filter_within_triangle(&unique, me, &friends, &config);
    println!("Triangle: {} places between us in {:?}", inside.len(), start.elapsed());

    let centre = geo_utils::compute_center(&[me, friends[0], friends[1]]);
    if let Some(closest) = inside.iter().min_by(|a, b| {
        geo_utils::haversine_meters(&a.location, &centre).total_cmp(&geo_utils::haversine_meters(&b.location, &centre))
    }) {
        let miles = geo_utils::haversine_distance(
            closest.location.latitude,
            closest.location.longitude,
            centre.latitude,
            centre.longitude,
        );
        println!("Most central: {} ({:.2} mi from the centre)", closest.name, miles);
    }

    // Three places far away: nothing is inside, so the top three come back
    let far: Vec<SearchResult> = unique.iter().take(3).cloned().collect();
    let shifted: Vec<SearchResult> = far
        .into_iter()
        .map(|mut r| {
            r.location.latitude += 1.0;
            r
        })
        .collect();
    let fallback = filter_within_triangle(&shifted, me, &friends, &config);
    println!("Fallback kept {} of {} outside places", fallback.len(), shifted.len());
}
