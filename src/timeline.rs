//! # Participant Event Stream and Scripted Timeline
//!
//! Everything other actors do reaches the session as a [`ParticipantEvent`]. The
//! session only consumes a `Stream` of events, so a scripted demo and a networked
//! backend are interchangeable.
//!
//! [`ScriptedTimeline`] produces the demo stream: participants join at fixed offsets
//! after the user shares the link, vote at fixed offsets after the first candidate
//! appears, and travel along a route polyline at a fixed step cadence until they
//! arrive. All timers live in tokio tasks owned by a [`SimulationHandle`]; cancelling
//! stops them at the next step and dropping the handle aborts them outright.

use futures::Stream;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::candidates::{ProposedPlace, VoteDirection};
use crate::geo_utils::interpolate_along;
use crate::{Location, Participant};

// ============================================================================
// Events and per-participant state
// ============================================================================

/// Something a participant did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParticipantEvent {
    Joined(Participant),
    Proposed { participant_id: String, place: ProposedPlace },
    Voted { participant_id: String, place_id: String, direction: VoteDirection },
    /// Position update while travelling; `progress` is the route fraction in `[0, 1]`.
    Moved { participant_id: String, location: Location, progress: f64 },
    Arrived { participant_id: String },
}

impl ParticipantEvent {
    pub fn participant_id(&self) -> &str {
        match self {
            Self::Joined(p) => &p.id,
            Self::Proposed { participant_id, .. }
            | Self::Voted { participant_id, .. }
            | Self::Moved { participant_id, .. }
            | Self::Arrived { participant_id } => participant_id,
        }
    }
}

/// Lifecycle of one participant.
///
/// `NotJoined → Joined → Voted(n) → Traveling → Arrived`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ParticipantState {
    #[default]
    NotJoined,
    Joined,
    Voted(u32),
    Traveling,
    Arrived,
}

impl ParticipantState {
    /// State after `event`, or `None` if the event is not allowed here.
    pub fn next(self, event: &ParticipantEvent) -> Option<Self> {
        use ParticipantEvent as E;
        use ParticipantState as S;

        match (self, event) {
            (S::NotJoined, E::Joined(_)) => Some(S::Joined),
            (S::Joined, E::Voted { .. }) => Some(S::Voted(1)),
            (S::Voted(n), E::Voted { .. }) => Some(S::Voted(n + 1)),
            (S::Joined | S::Voted(_), E::Proposed { .. }) => Some(self),
            (S::Joined | S::Voted(_) | S::Traveling, E::Moved { .. }) => Some(S::Traveling),
            (S::Joined | S::Voted(_) | S::Traveling, E::Arrived { .. }) => Some(S::Arrived),
            _ => None,
        }
    }

    pub fn has_joined(self) -> bool {
        self != Self::NotJoined
    }
}

// ============================================================================
// Configuration
// ============================================================================

/// Timing of the scripted simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default)]
pub struct SimulationConfig {
    /// Delay after sharing before each scripted participant joins.
    /// Default: [2000, 5000] ms
    pub join_offsets_ms: Vec<u64>,

    /// Delay after the first candidate before each scripted vote.
    /// Default: [3000, 6000] ms
    pub vote_offsets_ms: Vec<u64>,

    /// Shortest travel time for a participant.
    /// Default: 25 s
    pub travel_min_secs: u64,

    /// Longest travel time for a participant.
    /// Default: 35 s
    pub travel_max_secs: u64,

    /// Interval between position updates while travelling.
    /// Default: 500 ms
    pub step_interval_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            join_offsets_ms: vec![2000, 5000],
            vote_offsets_ms: vec![3000, 6000],
            travel_min_secs: 25,
            travel_max_secs: 35,
            step_interval_ms: 500,
        }
    }
}

impl SimulationConfig {
    /// Offset for the n-th item. Past the configured list, offsets keep growing by the
    /// last gap so later actors never fire together.
    fn offset(offsets: &[u64], n: usize) -> Duration {
        let ms = match offsets {
            [] => 0,
            [only] => only * (n as u64 + 1),
            _ if n < offsets.len() => offsets[n],
            _ => {
                let last = offsets[offsets.len() - 1];
                let gap = last.saturating_sub(offsets[offsets.len() - 2]).max(1);
                last + gap * (n - offsets.len() + 1) as u64
            }
        };
        Duration::from_millis(ms)
    }

    pub fn join_offset(&self, n: usize) -> Duration {
        Self::offset(&self.join_offsets_ms, n)
    }

    pub fn vote_offset(&self, n: usize) -> Duration {
        Self::offset(&self.vote_offsets_ms, n)
    }

    /// Deterministic travel time for the n-th traveller, spread across the
    /// configured range.
    pub fn travel_duration(&self, n: usize) -> Duration {
        let min = self.travel_min_secs.min(self.travel_max_secs);
        let span = self.travel_max_secs.max(self.travel_min_secs) - min;
        Duration::from_secs(min + (n as u64 * 5) % (span + 1))
    }

    pub fn step_interval(&self) -> Duration {
        Duration::from_millis(self.step_interval_ms.max(1))
    }
}

// ============================================================================
// Route animation
// ============================================================================

/// Discretised movement along a route polyline.
#[derive(Debug, Clone)]
pub struct RouteAnimation {
    pub participant_id: String,
    pub polyline: Vec<Location>,
    pub steps: u32,
    pub step_interval: Duration,
}

impl RouteAnimation {
    /// Split `duration` into steps of `step_interval` (at least one step).
    pub fn new(participant_id: &str, polyline: Vec<Location>, duration: Duration, step_interval: Duration) -> Self {
        let interval = step_interval.max(Duration::from_millis(1));
        let steps = (duration.as_millis() as f64 / interval.as_millis() as f64).ceil().max(1.0) as u32;
        Self {
            participant_id: participant_id.to_string(),
            polyline,
            steps,
            step_interval: interval,
        }
    }

    /// Position and progress after `step` steps. The final step lands exactly on the
    /// last vertex.
    pub fn position_at(&self, step: u32) -> Option<(Location, f64)> {
        let progress = (step.min(self.steps) as f64) / self.steps as f64;
        interpolate_along(&self.polyline, progress).map(|loc| (loc, progress))
    }

    /// Every event this animation emits, in order: one `Moved` per step, then `Arrived`.
    pub fn events(&self) -> Vec<ParticipantEvent> {
        let mut events: Vec<ParticipantEvent> = (1..=self.steps)
            .filter_map(|step| self.position_at(step))
            .map(|(location, progress)| ParticipantEvent::Moved {
                participant_id: self.participant_id.clone(),
                location,
                progress,
            })
            .collect();
        events.push(ParticipantEvent::Arrived { participant_id: self.participant_id.clone() });
        events
    }
}

// ============================================================================
// Event stream
// ============================================================================

/// Receiving end of a participant event channel.
pub struct EventStream {
    rx: mpsc::UnboundedReceiver<ParticipantEvent>,
}

impl EventStream {
    /// Open a channel whose sender can be handed to any event source.
    pub fn channel() -> (mpsc::UnboundedSender<ParticipantEvent>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self { rx })
    }

    /// Next event without waiting, if one is queued.
    pub fn try_next_event(&mut self) -> Option<ParticipantEvent> {
        self.rx.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = ParticipantEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

// ============================================================================
// Timers
// ============================================================================

/// Owns the timer tasks of a simulation.
///
/// `cancel` stops every task at its next wake-up; dropping the handle aborts them.
pub struct SimulationHandle {
    cancel: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl SimulationHandle {
    fn new() -> Self {
        let (cancel, _) = watch::channel(false);
        Self { cancel, tasks: Vec::new() }
    }

    pub fn cancel(&self) {
        info!("[Timeline] Cancelling {} timers", self.active_tasks());
        self.cancel.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Timers that have not finished yet.
    pub fn active_tasks(&self) -> usize {
        self.tasks.iter().filter(|t| !t.is_finished()).count()
    }

    fn spawn<F, Fut>(&mut self, task: F)
    where
        F: FnOnce(watch::Receiver<bool>) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.tasks.retain(|t| !t.is_finished());
        let rx = self.cancel.subscribe();
        self.tasks.push(tokio::spawn(task(rx)));
    }
}

impl Drop for SimulationHandle {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}

/// Sleep for `delay` unless cancelled first. Returns `false` when cancelled.
async fn sleep_unless_cancelled(delay: Duration, cancel: &mut watch::Receiver<bool>) -> bool {
    if *cancel.borrow() {
        return false;
    }
    tokio::select! {
        _ = tokio::time::sleep(delay) => !*cancel.borrow(),
        _ = cancel.changed() => false,
    }
}

/// Scripted stand-in for other participants.
///
/// Must be used from within a tokio runtime.
pub struct ScriptedTimeline {
    config: SimulationConfig,
    tx: mpsc::UnboundedSender<ParticipantEvent>,
    handle: SimulationHandle,
    travellers: usize,
}

impl ScriptedTimeline {
    pub fn new(config: SimulationConfig) -> (Self, EventStream) {
        let (tx, stream) = EventStream::channel();
        let timeline = Self {
            config,
            tx,
            handle: SimulationHandle::new(),
            travellers: 0,
        };
        (timeline, stream)
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn handle(&self) -> &SimulationHandle {
        &self.handle
    }

    /// Another producer for the same stream (e.g. the user's own actions or a backend).
    pub fn sender(&self) -> mpsc::UnboundedSender<ParticipantEvent> {
        self.tx.clone()
    }

    pub fn cancel(&self) {
        self.handle.cancel();
    }

    /// Schedule each participant's join, in order, at the configured offsets.
    pub fn start_joins(&mut self, participants: Vec<Participant>) {
        for (n, participant) in participants.into_iter().enumerate() {
            let delay = self.config.join_offset(n);
            let tx = self.tx.clone();
            debug!("[Timeline] {} joins in {:?}", participant.name, delay);

            self.handle.spawn(move |mut cancel| async move {
                if !sleep_unless_cancelled(delay, &mut cancel).await {
                    return;
                }
                let mut participant = participant;
                participant.joined = true;
                info!("[Timeline] {} joined", participant.name);
                let _ = tx.send(ParticipantEvent::Joined(participant));
            });
        }
    }

    /// Schedule scripted votes on `place_id`, one per `(participant_id, direction)`.
    pub fn start_votes(&mut self, place_id: &str, votes: Vec<(String, VoteDirection)>) {
        for (n, (participant_id, direction)) in votes.into_iter().enumerate() {
            let delay = self.config.vote_offset(n);
            let tx = self.tx.clone();
            let place_id = place_id.to_string();

            self.handle.spawn(move |mut cancel| async move {
                if !sleep_unless_cancelled(delay, &mut cancel).await {
                    return;
                }
                debug!("[Timeline] {} votes {:?} on {}", participant_id, direction, place_id);
                let _ = tx.send(ParticipantEvent::Voted { participant_id, place_id, direction });
            });
        }
    }

    /// Animate a participant along `polyline`, using the next travel duration from the
    /// configured range.
    pub fn start_travel(&mut self, participant_id: &str, polyline: Vec<Location>) -> Duration {
        let duration = self.config.travel_duration(self.travellers);
        self.travellers += 1;
        self.start_travel_for(participant_id, polyline, duration);
        duration
    }

    /// Animate a participant along `polyline` over exactly `duration`.
    pub fn start_travel_for(&mut self, participant_id: &str, polyline: Vec<Location>, duration: Duration) {
        if polyline.is_empty() {
            warn!("[Timeline] {} has an empty route, marking arrived", participant_id);
            let _ = self.tx.send(ParticipantEvent::Arrived { participant_id: participant_id.to_string() });
            return;
        }

        let animation = RouteAnimation::new(participant_id, polyline, duration, self.config.step_interval());
        let tx = self.tx.clone();
        info!(
            "[Timeline] {} departs: {} steps every {:?}",
            participant_id, animation.steps, animation.step_interval
        );

        self.handle.spawn(move |mut cancel| async move {
            let interval = animation.step_interval;
            for event in animation.events() {
                if matches!(event, ParticipantEvent::Moved { .. })
                    && !sleep_unless_cancelled(interval, &mut cancel).await
                {
                    debug!("[Timeline] {} travel cancelled", animation.participant_id);
                    return;
                }
                if tx.send(event).is_err() {
                    return;
                }
            }
            info!("[Timeline] {} arrived", animation.participant_id);
        });
    }
}
