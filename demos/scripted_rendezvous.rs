//! End-to-end scripted rendezvous with compressed timings.
//!
//! Run with: RUST_LOG=info cargo run --example scripted_rendezvous

use std::sync::Arc;

use rendezvous_engine::{
    scripted_participants, FeatureSet, LogNotifier, Location, ProposedPlace, RendezvousEvent, ScriptedProvider,
    ScriptedTimeline, SearchResult, Session, SimulationConfig, Transportation,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let home = Location::new(37.7749, -122.4194);
    let provider = ScriptedProvider::new()
        .with_address("123 Main St", home)
        .with_place("pizza", SearchResult::new("pieology", "Pieology", "1 Market St", Location::new(37.7760, -122.4050), 95.0))
        .with_place("pizza", SearchResult::new("tonys", "Tony's Pizza", "2 Columbus Ave", Location::new(37.7700, -122.4000), 90.0))
        .with_place("pizza", SearchResult::new("golden", "Golden Boy Pizza", "3 Green St", Location::new(37.7800, -122.3950), 85.0))
        .with_place("pizza", SearchResult::new("hut", "Pizza Hut", "4 Bay St", Location::new(37.8100, -122.4400), 99.0));

    let event = RendezvousEvent::new("Pizza Night", "2025-06-01T19:30", "123 Main St", Transportation::Driving);
    let mut session = Session::open(&provider, event, "Deanne Watts", FeatureSet::default(), Arc::new(LogNotifier))
        .await
        .ok_or("rendezvous location not found")?;

    // Ten times faster than the real demo
    let config = SimulationConfig {
        join_offsets_ms: vec![200, 500],
        vote_offsets_ms: vec![300, 600],
        travel_min_secs: 3,
        travel_max_secs: 4,
        step_interval_ms: 100,
    };
    let (mut timeline, mut stream) = ScriptedTimeline::new(config);

    println!("Share: {}", session.share("https://rendezview.app"));
    timeline.start_joins(scripted_participants(session.origin()));
    session.run_until(&mut stream, |s| s.participants().len() == 2).await;

    let results = session.search(&provider, "pizza").await?.to_vec();
    println!("\nBetween everyone:");
    for r in &results {
        println!("  {:<18} {:>5.1}  {}", r.name, r.score, r.address);
    }
    let best = results.first().ok_or("no pizza between us")?;

    session.propose(ProposedPlace::from(best))?;
    timeline.start_votes(&best.place_id, session.scripted_votes());
    let expected_votes = 1 + session.participants().len() as u32;
    session
        .run_until(&mut stream, |s| {
            s.candidates().leading().map_or(false, |c| c.upvotes + c.downvotes >= expected_votes)
        })
        .await;

    let confirmed = session.confirm(&best.place_id)?;
    println!("\nConfirmed {} ({} up / {} down)", confirmed.name, confirmed.upvotes, confirmed.downvotes);

    session.start_trip(&provider, &mut timeline).await?;
    if let Some(step) = session.navigator().current() {
        println!("First step: {}", step.text);
    }
    session.run(&mut stream).await;

    println!("\nLeaderboard:");
    for (rank, score) in session.leaderboard().iter().enumerate() {
        println!("  {}. {:<16} {:>3} pts  {:?}  {}", rank + 1, score.name, score.total, score.status, score.color);
    }
    if let Some(stats) = session.trip_stats() {
        println!(
            "\n{:.2} miles total, {:.1} mph average, {:.1}s door to door",
            stats.total_distance_miles, stats.average_speed_mph, stats.total_time_secs
        );
    }
    println!("{} map features on screen", session.map_features().len());

    Ok(())
}
