//! # Rendezvous Session
//!
//! [`Session`] holds everything the map view shows for one rendezvous: the user,
//! the participants who joined, the candidate store, search results, routes, the
//! user's turn-by-turn [`Navigator`], and arrival tracking. It is updated by the
//! user's own calls and by folding [`ParticipantEvent`]s from any stream, and it
//! renders itself as a declarative list of [`MapFeature`]s.
//!
//! ```text
//! share ─▶ Joined ─▶ search ─▶ propose ─▶ Voted ─▶ confirm ─▶ start_trip ─▶ Moved… ─▶ Arrived
//! ```

use futures::{Stream, StreamExt};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tokio::time::Instant;

use crate::candidates::{CandidateError, CandidateStore, PlaceCandidate, ProposedPlace, VoteDirection};
use crate::color::participant_color;
use crate::directions::Navigator;
use crate::geo_utils::{meters_to_miles, polyline_length};
use crate::map_features::{FeatureKind, FeatureStyle, MapFeature};
use crate::notify::Notifier;
use crate::provider::{route_or_scripted, MapProvider};
use crate::rendezvous::{Invitation, RendezvousEvent};
use crate::scoring::{leaderboard, ParticipantScore, ScoringConfig, TripRecord, TripStats};
use crate::search::{filter_within_triangle, parse_natural_query, search, SearchConfig, SearchResult};
use crate::timeline::{ParticipantEvent, ParticipantState, ScriptedTimeline};
use crate::{Bounds, Location, Participant};

/// Participant id of the local user.
pub const USER_ID: &str = "me";

const RENDEZVOUS_COLOR: &str = "#4285F4";
const SEARCH_RESULT_COLOR: &str = "#757575";
const CANDIDATE_COLOR: &str = "#FFA000";
const DESTINATION_COLOR: &str = "#2E7D32";

// ============================================================================
// Configuration
// ============================================================================

/// Which parts of the map view are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default)]
pub struct FeatureSet {
    /// Default: true
    pub search: bool,
    /// Natural-language search. Default: true
    pub ai_search: bool,
    /// Default: true
    pub voting: bool,
    /// Default: true
    pub route_animation: bool,
}

impl Default for FeatureSet {
    fn default() -> Self {
        Self {
            search: true,
            ai_search: true,
            voting: true,
            route_animation: true,
        }
    }
}

impl FeatureSet {
    fn require(&self, enabled: bool, name: &'static str) -> Result<(), SessionError> {
        if enabled {
            Ok(())
        } else {
            debug!("[Session] Feature {} is disabled", name);
            Err(SessionError::FeatureDisabled(name))
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SessionError {
    #[error("the {0} feature is disabled")]
    FeatureDisabled(&'static str),
    #[error(transparent)]
    Candidate(#[from] CandidateError),
    #[error("no destination has been confirmed")]
    NotConfirmed,
    #[error("the trip has already started")]
    TripStarted,
}

// ============================================================================
// Arrival tracking
// ============================================================================

/// Who is expected at the destination and who is already there.
#[derive(Debug, Clone, Default)]
pub struct ArrivalTracker {
    expected: Vec<String>,
    arrived: HashSet<String>,
    announced: bool,
}

impl ArrivalTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn track(&mut self, id: &str) {
        if !self.expected.iter().any(|e| e == id) {
            self.expected.push(id.to_string());
        }
    }

    /// Returns `true` the first time a tracked actor arrives.
    pub fn mark_arrived(&mut self, id: &str) -> bool {
        if !self.expected.iter().any(|e| e == id) {
            warn!("[Session] Arrival from untracked {}", id);
            return false;
        }
        self.arrived.insert(id.to_string())
    }

    pub fn has_arrived(&self, id: &str) -> bool {
        self.arrived.contains(id)
    }

    pub fn all_arrived(&self) -> bool {
        !self.expected.is_empty() && self.expected.iter().all(|id| self.arrived.contains(id))
    }

    /// `true` exactly once, when the last expected actor arrives.
    pub fn take_everyone_arrived(&mut self) -> bool {
        if self.announced || !self.all_arrived() {
            return false;
        }
        self.announced = true;
        true
    }

    pub fn expected_count(&self) -> usize {
        self.expected.len()
    }

    pub fn arrived_count(&self) -> usize {
        self.arrived.len()
    }
}

/// One row of the progress view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TravelProgress {
    pub participant_id: String,
    pub name: String,
    pub color: String,
    /// Route fraction in `[0, 1]`.
    pub progress: f64,
    pub remaining_miles: f64,
    pub arrived: bool,
}

// ============================================================================
// Session
// ============================================================================

/// State of one rendezvous, as seen from the local user.
pub struct Session {
    event: RendezvousEvent,
    origin: Location,
    user: Participant,
    participants: Vec<Participant>,
    states: HashMap<String, ParticipantState>,
    candidates: CandidateStore,
    search_results: Vec<SearchResult>,
    arrivals: ArrivalTracker,
    navigator: Navigator,
    routes: HashMap<String, Vec<Location>>,
    progress: HashMap<String, f64>,
    features: FeatureSet,
    search_config: SearchConfig,
    scoring_config: ScoringConfig,
    notifier: Arc<dyn Notifier>,
    shared_at: Option<Instant>,
    joined_after: HashMap<String, f64>,
    departed_at: Option<Instant>,
    arrived_after: HashMap<String, f64>,
}

impl Session {
    /// A session whose user starts at `origin`.
    pub fn new(
        event: RendezvousEvent,
        user_name: &str,
        origin: Location,
        features: FeatureSet,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let mut user = Participant::new(USER_ID, user_name, origin, participant_color(0));
        user.joined = true;

        let mut arrivals = ArrivalTracker::new();
        arrivals.track(USER_ID);

        let mut states = HashMap::new();
        states.insert(USER_ID.to_string(), ParticipantState::Joined);

        info!("[Session] Opened {:?} at ({:.5}, {:.5})", event.name, origin.latitude, origin.longitude);

        Self {
            event,
            origin,
            user,
            participants: Vec::new(),
            states,
            candidates: CandidateStore::new(),
            search_results: Vec::new(),
            arrivals,
            navigator: Navigator::default(),
            routes: HashMap::new(),
            progress: HashMap::new(),
            features,
            search_config: SearchConfig::default(),
            scoring_config: ScoringConfig::default(),
            notifier,
            shared_at: None,
            joined_after: HashMap::new(),
            departed_at: None,
            arrived_after: HashMap::new(),
        }
    }

    /// Resolve the rendezvous location and open a session there.
    ///
    /// Returns `None` (after notifying the user) when the location cannot be found.
    pub async fn open(
        provider: &dyn MapProvider,
        event: RendezvousEvent,
        user_name: &str,
        features: FeatureSet,
        notifier: Arc<dyn Notifier>,
    ) -> Option<Self> {
        match event.location_input().resolve(provider).await {
            Some(origin) => Some(Self::new(event, user_name, origin, features, notifier)),
            None => {
                notifier.error("Could not find the rendezvous location", Some(&event.location));
                None
            }
        }
    }

    pub fn with_search_config(mut self, config: SearchConfig) -> Self {
        self.search_config = config;
        self
    }

    pub fn with_scoring_config(mut self, config: ScoringConfig) -> Self {
        self.scoring_config = config;
        self
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn event(&self) -> &RendezvousEvent {
        &self.event
    }

    /// Where the rendezvous started.
    pub fn origin(&self) -> Location {
        self.origin
    }

    pub fn user(&self) -> &Participant {
        &self.user
    }

    /// Joined participants, in join order. The user is not included.
    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant(&self, id: &str) -> Option<&Participant> {
        if id == USER_ID {
            return Some(&self.user);
        }
        self.participants.iter().find(|p| p.id == id)
    }

    pub fn state_of(&self, id: &str) -> ParticipantState {
        self.states.get(id).copied().unwrap_or_default()
    }

    pub fn candidates(&self) -> &CandidateStore {
        &self.candidates
    }

    pub fn search_results(&self) -> &[SearchResult] {
        &self.search_results
    }

    pub fn arrivals(&self) -> &ArrivalTracker {
        &self.arrivals
    }

    pub fn navigator(&self) -> &Navigator {
        &self.navigator
    }

    pub fn features(&self) -> FeatureSet {
        self.features
    }

    pub fn route_of(&self, id: &str) -> Option<&[Location]> {
        self.routes.get(id).map(Vec::as_slice)
    }

    // ------------------------------------------------------------------------
    // Sharing and privacy
    // ------------------------------------------------------------------------

    /// Link that opens this rendezvous. The first call starts the response clock used
    /// for scoring.
    pub fn share(&mut self, base_url: &str) -> String {
        if self.shared_at.is_none() {
            self.shared_at = Some(Instant::now());
        }
        let link = self.event.share_link(base_url);
        self.notifier.success("Link copied", None);
        link
    }

    pub fn invitation(&mut self, base_url: &str) -> Invitation {
        let link = self.share(base_url);
        Invitation::new(&self.event, &link)
    }

    /// Hide or reveal a participant's marker. The participant keeps taking part.
    pub fn set_hidden(&mut self, id: &str, hidden: bool) -> bool {
        let participant = if id == USER_ID {
            Some(&mut self.user)
        } else {
            self.participants.iter_mut().find(|p| p.id == id)
        };
        match participant {
            Some(p) => {
                p.hidden = hidden;
                true
            }
            None => false,
        }
    }

    // ------------------------------------------------------------------------
    // Participant events
    // ------------------------------------------------------------------------

    /// Fold one event into the session. Events that break a participant's lifecycle
    /// are ignored; returns whether the event was applied.
    pub fn apply(&mut self, event: ParticipantEvent) -> bool {
        let id = event.participant_id().to_string();
        let current = self.state_of(&id);
        let Some(next) = current.next(&event) else {
            warn!("[Session] Ignoring {:?} from {} in state {:?}", event, id, current);
            return false;
        };
        // Latecomers get no route and would never arrive
        if matches!(event, ParticipantEvent::Joined(_)) && self.departed_at.is_some() {
            warn!("[Session] {} joined after the trip started, ignoring", id);
            return false;
        }

        match event {
            ParticipantEvent::Joined(participant) => self.on_joined(participant),
            ParticipantEvent::Proposed { place, .. } => {
                match self.candidates.add_participant_candidate(place.clone()) {
                    Ok(true) => {
                        let who = self.display_name(&id);
                        self.notifier.info(&format!("{} proposed a place", who), Some(&place.name));
                    }
                    Ok(false) => {}
                    Err(e) => {
                        warn!("[Session] Proposal from {} rejected: {}", id, e);
                        return false;
                    }
                }
            }
            ParticipantEvent::Voted { place_id, direction, .. } => {
                if let Err(e) = self.candidates.apply_participant_vote(&place_id, direction) {
                    warn!("[Session] Vote from {} rejected: {}", id, e);
                    return false;
                }
                let who = self.display_name(&id);
                self.notifier.info(&format!("{} voted", who), None);
            }
            ParticipantEvent::Moved { location, progress, .. } => {
                self.on_moved(&id, location, progress);
            }
            ParticipantEvent::Arrived { .. } => self.on_arrived(&id),
        }

        self.states.insert(id, next);
        true
    }

    fn on_joined(&mut self, mut participant: Participant) {
        participant.joined = true;
        let joined_after = self.shared_at.map(|t| t.elapsed().as_secs_f64()).unwrap_or(0.0);
        info!("[Session] {} joined after {:.1}s", participant.name, joined_after);

        self.joined_after.insert(participant.id.clone(), joined_after);
        self.arrivals.track(&participant.id);
        self.notifier.info(&format!("{} joined the rendezvous", participant.name), None);
        self.participants.push(participant);
    }

    fn on_moved(&mut self, id: &str, location: Location, progress: f64) {
        let progress = progress.clamp(0.0, 1.0);
        if id == USER_ID {
            self.user.location = location;
            self.navigator.seek_fraction(progress);
        } else if let Some(p) = self.participants.iter_mut().find(|p| p.id == id) {
            p.location = location;
        }
        self.progress.insert(id.to_string(), progress);
    }

    fn on_arrived(&mut self, id: &str) {
        if !self.arrivals.mark_arrived(id) {
            return;
        }
        if let Some(start) = self.departed_at {
            self.arrived_after.insert(id.to_string(), start.elapsed().as_secs_f64());
        }
        let end = self.routes.get(id).and_then(|route| route.last().copied());
        if let Some(end) = end {
            self.on_moved(id, end, 1.0);
        }
        self.progress.insert(id.to_string(), 1.0);

        let who = self.display_name(id);
        info!("[Session] {} arrived ({}/{})", who, self.arrivals.arrived_count(), self.arrivals.expected_count());
        self.notifier.success(&format!("{} arrived", who), None);

        if self.arrivals.take_everyone_arrived() {
            info!("[Session] Everyone has arrived");
            self.notifier.success("Everyone has arrived!", None);
        }
    }

    fn display_name(&self, id: &str) -> String {
        self.participant(id).map(|p| p.name.clone()).unwrap_or_else(|| id.to_string())
    }

    /// Apply events until `done` holds or the stream ends. Returns the number applied.
    pub async fn run_until<S, F>(&mut self, events: &mut S, done: F) -> usize
    where
        S: Stream<Item = ParticipantEvent> + Unpin,
        F: Fn(&Session) -> bool,
    {
        let mut applied = 0;
        while !done(&*self) {
            let Some(event) = events.next().await else {
                debug!("[Session] Event stream ended");
                break;
            };
            if self.apply(event) {
                applied += 1;
            }
        }
        applied
    }

    /// Apply events until everyone has arrived or the stream ends.
    pub async fn run<S>(&mut self, events: &mut S) -> usize
    where
        S: Stream<Item = ParticipantEvent> + Unpin,
    {
        self.run_until(events, |s| s.arrivals.all_arrived()).await
    }

    // ------------------------------------------------------------------------
    // Search
    // ------------------------------------------------------------------------

    /// Search around everyone and keep what lies between the group.
    pub async fn search(&mut self, provider: &dyn MapProvider, query: &str) -> Result<&[SearchResult], SessionError> {
        self.features.require(self.features.search, "search")?;
        self.run_search(provider, query, true).await;
        Ok(&self.search_results)
    }

    /// Free-text search ("find a pizza place between us"). The triangle filter only
    /// applies when the text asks for a place between the group.
    pub async fn ai_search(&mut self, provider: &dyn MapProvider, text: &str) -> Result<&[SearchResult], SessionError> {
        self.features.require(self.features.ai_search, "ai_search")?;
        let parsed = parse_natural_query(text);
        debug!("[Session] {:?} parsed as {:?}", text, parsed);
        self.run_search(provider, &parsed.term, parsed.wants_midpoint).await;
        Ok(&self.search_results)
    }

    async fn run_search(&mut self, provider: &dyn MapProvider, term: &str, use_triangle: bool) {
        let others: Vec<Location> = self.participants.iter().map(|p| p.location).collect();
        let mut origins = Vec::with_capacity(others.len() + 1);
        origins.push(self.user.location);
        origins.extend(others.iter().copied());

        let results = search(provider, term, &origins, &self.search_config).await;
        self.search_results = if use_triangle {
            filter_within_triangle(&results, self.user.location, &others, &self.search_config)
        } else {
            results
        };

        if self.search_results.is_empty() {
            self.notifier.info("No places found", Some(term));
        }
    }

    // ------------------------------------------------------------------------
    // Candidates and voting
    // ------------------------------------------------------------------------

    /// Add a place to the candidate list. Returns `true` if it was new.
    pub fn propose(&mut self, place: ProposedPlace) -> Result<bool, SessionError> {
        self.features.require(self.features.voting, "voting")?;
        let name = place.name.clone();
        let inserted = self.candidates.add_candidate(place)?;
        if inserted {
            self.notifier.success("Added to candidates", Some(&name));
        }
        Ok(inserted)
    }

    pub fn vote(&mut self, place_id: &str, direction: VoteDirection) -> Result<bool, SessionError> {
        self.features.require(self.features.voting, "voting")?;
        Ok(self.candidates.handle_vote(place_id, direction)?)
    }

    /// Open a candidate's popup.
    pub fn select(&mut self, place_id: &str) -> Result<(), SessionError> {
        Ok(self.candidates.select(place_id)?)
    }

    pub fn close_popup(&mut self) {
        self.candidates.clear_selection();
    }

    /// How the joined participants vote on a new candidate in the scripted demo:
    /// everyone upvotes except every third participant.
    pub fn scripted_votes(&self) -> Vec<(String, VoteDirection)> {
        self.participants
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let direction = if i % 3 == 2 { VoteDirection::Down } else { VoteDirection::Up };
                (p.id.clone(), direction)
            })
            .collect()
    }

    /// Fix the meeting point. Search results are cleared.
    pub fn confirm(&mut self, place_id: &str) -> Result<PlaceCandidate, SessionError> {
        let confirmed = self.candidates.confirm_candidate(place_id)?.clone();
        self.search_results.clear();
        self.notifier.success("Rendezvous confirmed", Some(&confirmed.name));
        Ok(confirmed)
    }

    // ------------------------------------------------------------------------
    // Trip
    // ------------------------------------------------------------------------

    /// Route everyone to the confirmed destination and start the travel animation.
    pub async fn start_trip(
        &mut self,
        provider: &dyn MapProvider,
        timeline: &mut ScriptedTimeline,
    ) -> Result<(), SessionError> {
        self.features.require(self.features.route_animation, "route_animation")?;
        let destination = self.candidates.confirmed().cloned().ok_or(SessionError::NotConfirmed)?;
        if self.departed_at.is_some() {
            return Err(SessionError::TripStarted);
        }

        let travellers: Vec<(String, Location)> = std::iter::once(&self.user)
            .chain(self.participants.iter())
            .map(|p| (p.id.clone(), p.location))
            .collect();

        for (id, start) in travellers {
            let route = route_or_scripted(provider, start, destination.location, &destination.name).await;
            if id == USER_ID {
                self.navigator = Navigator::new(route.directions);
            }
            self.progress.insert(id.clone(), 0.0);
            self.routes.insert(id.clone(), route.polyline.clone());
            let duration = timeline.start_travel(&id, route.polyline);
            debug!("[Session] {} travels for {:?}", id, duration);
        }

        self.departed_at = Some(Instant::now());
        self.notifier.info("Trip started", Some(&destination.name));
        Ok(())
    }

    /// Progress rows for the user and every joined participant.
    pub fn progress(&self) -> Vec<TravelProgress> {
        std::iter::once(&self.user)
            .chain(self.participants.iter())
            .map(|p| {
                let progress = self.progress.get(&p.id).copied().unwrap_or(0.0);
                let route_miles = self.routes.get(&p.id).map(|r| meters_to_miles(polyline_length(r))).unwrap_or(0.0);
                TravelProgress {
                    participant_id: p.id.clone(),
                    name: p.name.clone(),
                    color: p.color.clone(),
                    progress,
                    remaining_miles: route_miles * (1.0 - progress),
                    arrived: self.arrivals.has_arrived(&p.id),
                }
            })
            .collect()
    }

    /// Scoring input for everyone who set off.
    pub fn trip_records(&self) -> Vec<TripRecord> {
        if self.departed_at.is_none() {
            return Vec::new();
        }
        std::iter::once(&self.user)
            .chain(self.participants.iter())
            .filter(|p| self.routes.contains_key(&p.id))
            .map(|p| TripRecord {
                participant_id: p.id.clone(),
                name: p.name.clone(),
                joined_after_secs: self.joined_after.get(&p.id).copied().unwrap_or(0.0),
                departed_at_secs: 0.0,
                arrived_at_secs: self.arrived_after.get(&p.id).copied(),
                distance_miles: self.routes.get(&p.id).map(|r| meters_to_miles(polyline_length(r))).unwrap_or(0.0),
            })
            .collect()
    }

    pub fn leaderboard(&self) -> Vec<ParticipantScore> {
        leaderboard(&self.trip_records(), &self.scoring_config)
    }

    pub fn trip_stats(&self) -> Option<TripStats> {
        TripStats::from_records(&self.trip_records())
    }

    // ------------------------------------------------------------------------
    // Map output
    // ------------------------------------------------------------------------

    /// Everything that should be on the map right now.
    pub fn map_features(&self) -> Vec<MapFeature> {
        let mut features = vec![MapFeature::point(
            FeatureKind::Rendezvous,
            "rendezvous",
            self.origin,
            FeatureStyle::marker(RENDEZVOUS_COLOR, 16.0),
        )
        .with_meta("name", &self.event.name)
        .with_meta("datetime", &self.event.datetime)];

        for (p, route) in self.visible().filter_map(|p| self.routes.get(&p.id).map(|r| (p, r))) {
            features.push(MapFeature::polyline(
                FeatureKind::Route,
                &format!("route:{}", p.id),
                route.clone(),
                FeatureStyle::line(&p.color, 4.0),
            ));
        }

        match self.candidates.confirmed() {
            Some(destination) => features.push(
                MapFeature::point(
                    FeatureKind::Destination,
                    "destination",
                    destination.location,
                    FeatureStyle::marker(DESTINATION_COLOR, 18.0),
                )
                .with_meta("name", &destination.name)
                .with_meta("address", &destination.address),
            ),
            None => {
                let candidate_ids: HashSet<&str> =
                    self.candidates.candidates().iter().map(|c| c.place_id.as_str()).collect();
                features.extend(
                    self.search_results
                        .iter()
                        .filter(|r| !candidate_ids.contains(r.place_id.as_str()))
                        .map(|r| {
                            MapFeature::point(
                                FeatureKind::SearchResult,
                                &format!("result:{}", r.place_id),
                                r.location,
                                FeatureStyle::marker(SEARCH_RESULT_COLOR, 10.0),
                            )
                            .with_meta("name", &r.name)
                            .with_meta("address", &r.address)
                        }),
                );
                features.extend(self.candidates.candidates().iter().map(|c| {
                    MapFeature::point(
                        FeatureKind::Candidate,
                        &format!("candidate:{}", c.place_id),
                        c.location,
                        FeatureStyle::marker(CANDIDATE_COLOR, 14.0),
                    )
                    .with_meta("name", &c.name)
                    .with_meta("address", &c.address)
                    .with_meta("upvotes", c.upvotes)
                    .with_meta("downvotes", c.downvotes)
                    .highlighted(c.is_selected)
                }));
            }
        }

        features.extend(self.visible().map(|p| {
            MapFeature::point(
                FeatureKind::Participant,
                &format!("participant:{}", p.id),
                p.location,
                FeatureStyle::marker(&p.color, 12.0),
            )
            .with_meta("name", &p.name)
            .with_meta("state", format!("{:?}", self.state_of(&p.id)))
        }));

        features
    }

    /// Bounds that fit every visible marker.
    pub fn view_bounds(&self) -> Option<Bounds> {
        let mut points: Vec<Location> = vec![self.origin];
        points.extend(self.visible().map(|p| p.location));
        points.extend(self.candidates.candidates().iter().map(|c| c.location));
        points.extend(self.search_results.iter().map(|r| r.location));
        Bounds::from_points(&points)
    }

    fn visible(&self) -> impl Iterator<Item = &Participant> {
        std::iter::once(&self.user)
            .chain(self.participants.iter())
            .filter(|p| !p.hidden)
    }
}

/// The two scripted friends, placed to either side of `around`.
pub fn scripted_participants(around: Location) -> Vec<Participant> {
    [("barry", "Barry Allen", 0.020, 0.025), ("pietro", "Pietro Maximoff", -0.020, 0.030)]
        .iter()
        .enumerate()
        .map(|(i, (id, name, dlat, dlng))| {
            Participant::new(
                id,
                name,
                Location::new(around.latitude + dlat, around.longitude + dlng),
                participant_color(i + 1),
            )
        })
        .collect()
}
