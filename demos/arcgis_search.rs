//! Live place search and routing against ArcGIS location services.
//!
//! Run with: ARCGIS_API_KEY=... cargo run --example arcgis_search --features http -- "pizza"

use std::time::Instant;

use rendezvous_engine::provider::{geocode_or_none, route_or_scripted, suggest_or_empty};
use rendezvous_engine::{filter_within_triangle, search, ArcGisClient, Location, SearchConfig};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let api_key = std::env::var("ARCGIS_API_KEY").map_err(|_| "set ARCGIS_API_KEY")?;
    let query = std::env::args().nth(1).unwrap_or_else(|| "pizza".to_string());
    let client = ArcGisClient::new(&api_key)?;

    for s in suggest_or_empty(&client, "1 Market St, San Fr").await {
        println!("Suggestion: {}", s.address);
    }

    let me = geocode_or_none(&client, "1 Market St, San Francisco, CA")
        .await
        .unwrap_or(Location::new(37.7946, -122.3950));
    let friends = [Location::new(37.7599, -122.4148), Location::new(37.7858, -122.4364)];
    let origins = [me, friends[0], friends[1]];
    let config = SearchConfig::default();

    let start = Instant::now();
    let results = search(&client, &query, &origins, &config).await;
    println!("{} merged results for {:?} in {:?}", results.len(), query, start.elapsed());

    let between = filter_within_triangle(&results, me, &friends, &config);
    for r in &between {
        println!("  {:<30} {:>5.1}  {}", r.name, r.score, r.address);
    }

    if let Some(best) = between.first() {
        let route = route_or_scripted(&client, me, best.location, &best.name).await;
        println!("\nRoute to {}: {} vertices", best.name, route.polyline.len());
        for step in &route.directions {
            println!("  {:>6.0}m  {}", step.distance, step.text);
        }
    }

    Ok(())
}
