//! Shared trip records: who is on a trip and where they last were.
//!
//! [`TripStore`] is the persistence seam. [`InMemoryTripStore`] backs tests and
//! single-process demos; a hosted document store implements the same trait.
//! [`forward_participant_events`] turns store updates into [`ParticipantEvent`]s so a
//! networked trip drives a [`Session`](crate::session::Session) exactly like the
//! scripted timeline does.

use async_trait::async_trait;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use crate::color::participant_color;
use crate::timeline::ParticipantEvent;
use crate::{Location, Participant};

/// Snapshots buffered per subscriber before the slowest one starts lagging.
const SUBSCRIBER_BUFFER: usize = 64;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("trip {0} does not exist")]
    TripNotFound(String),
    #[error("{user_id} is not on trip {trip_id}")]
    ParticipantNotFound { trip_id: String, user_id: String },
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// One participant document of a trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TripParticipant {
    pub user_id: String,
    pub name: String,
    pub location: Location,
    /// Milliseconds since the Unix epoch.
    pub last_updated: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Trip {
    pub trip_id: String,
    pub name: String,
    pub created_by: String,
    pub created_at: u64,
}

#[async_trait]
pub trait TripStore: Send + Sync {
    /// Create a trip with its creator as the first participant. Returns the trip id.
    async fn create_trip(
        &self,
        name: &str,
        user_id: &str,
        user_name: &str,
        location: Location,
    ) -> Result<String, StoreError>;

    /// Add (or re-add) a participant.
    async fn join_trip(&self, trip_id: &str, user_id: &str, name: &str, location: Location) -> Result<(), StoreError>;

    /// Move a participant. Only the location and timestamp change.
    async fn update_location(&self, trip_id: &str, user_id: &str, location: Location) -> Result<(), StoreError>;

    async fn trip(&self, trip_id: &str) -> Result<Trip, StoreError>;

    /// Current participants in join order.
    async fn participants(&self, trip_id: &str) -> Result<Vec<TripParticipant>, StoreError>;

    /// Full participant list after every change.
    async fn subscribe(&self, trip_id: &str) -> Result<broadcast::Receiver<Vec<TripParticipant>>, StoreError>;
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

struct TripEntry {
    trip: Trip,
    participants: Vec<TripParticipant>,
    updates: broadcast::Sender<Vec<TripParticipant>>,
}

impl TripEntry {
    fn publish(&self) {
        // No subscribers is fine
        let _ = self.updates.send(self.participants.clone());
    }
}

/// Process-local store.
#[derive(Default)]
pub struct InMemoryTripStore {
    trips: Mutex<HashMap<String, TripEntry>>,
    next_id: AtomicU64,
}

impl InMemoryTripStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_trip<T>(&self, trip_id: &str, f: impl FnOnce(&mut TripEntry) -> Result<T, StoreError>) -> Result<T, StoreError> {
        let mut trips = self
            .trips
            .lock()
            .map_err(|_| StoreError::Unavailable("trip table lock poisoned".to_string()))?;
        let entry = trips
            .get_mut(trip_id)
            .ok_or_else(|| StoreError::TripNotFound(trip_id.to_string()))?;
        f(entry)
    }
}

#[async_trait]
impl TripStore for InMemoryTripStore {
    async fn create_trip(
        &self,
        name: &str,
        user_id: &str,
        user_name: &str,
        location: Location,
    ) -> Result<String, StoreError> {
        let trip_id = format!("trip-{}", self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let now = now_millis();
        let (updates, _) = broadcast::channel(SUBSCRIBER_BUFFER);

        let entry = TripEntry {
            trip: Trip {
                trip_id: trip_id.clone(),
                name: name.to_string(),
                created_by: user_id.to_string(),
                created_at: now,
            },
            participants: vec![TripParticipant {
                user_id: user_id.to_string(),
                name: user_name.to_string(),
                location,
                last_updated: now,
            }],
            updates,
        };

        self.trips
            .lock()
            .map_err(|_| StoreError::Unavailable("trip table lock poisoned".to_string()))?
            .insert(trip_id.clone(), entry);
        info!("[TripStore] Created {} ({:?}) for {}", trip_id, name, user_id);
        Ok(trip_id)
    }

    async fn join_trip(&self, trip_id: &str, user_id: &str, name: &str, location: Location) -> Result<(), StoreError> {
        self.with_trip(trip_id, |entry| {
            let participant = TripParticipant {
                user_id: user_id.to_string(),
                name: name.to_string(),
                location,
                last_updated: now_millis(),
            };
            match entry.participants.iter_mut().find(|p| p.user_id == user_id) {
                Some(existing) => *existing = participant,
                None => entry.participants.push(participant),
            }
            info!("[TripStore] {} joined {}", user_id, trip_id);
            entry.publish();
            Ok(())
        })
    }

    async fn update_location(&self, trip_id: &str, user_id: &str, location: Location) -> Result<(), StoreError> {
        self.with_trip(trip_id, |entry| {
            let participant = entry
                .participants
                .iter_mut()
                .find(|p| p.user_id == user_id)
                .ok_or_else(|| StoreError::ParticipantNotFound {
                    trip_id: trip_id.to_string(),
                    user_id: user_id.to_string(),
                })?;
            participant.location = location;
            participant.last_updated = now_millis();
            debug!("[TripStore] {} moved on {}", user_id, trip_id);
            entry.publish();
            Ok(())
        })
    }

    async fn trip(&self, trip_id: &str) -> Result<Trip, StoreError> {
        self.with_trip(trip_id, |entry| Ok(entry.trip.clone()))
    }

    async fn participants(&self, trip_id: &str) -> Result<Vec<TripParticipant>, StoreError> {
        self.with_trip(trip_id, |entry| Ok(entry.participants.clone()))
    }

    async fn subscribe(&self, trip_id: &str) -> Result<broadcast::Receiver<Vec<TripParticipant>>, StoreError> {
        self.with_trip(trip_id, |entry| Ok(entry.updates.subscribe()))
    }
}

/// Translate store snapshots into participant events.
///
/// New users become `Joined`, location changes become `Moved` (progress is unknown
/// for a networked trip and reported as 0). `exclude` skips the local user, whose
/// state the session already owns. The task ends when the store drops the trip or
/// the receiving side goes away.
pub fn forward_participant_events(
    mut updates: broadcast::Receiver<Vec<TripParticipant>>,
    events: mpsc::UnboundedSender<ParticipantEvent>,
    exclude: &str,
) -> JoinHandle<()> {
    let exclude = exclude.to_string();
    tokio::spawn(async move {
        let mut known: HashMap<String, Location> = HashMap::new();
        loop {
            let snapshot = match updates.recv().await {
                Ok(snapshot) => snapshot,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("[TripStore] Bridge lagged, skipped {} snapshots", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => break,
            };

            for p in snapshot.into_iter().filter(|p| p.user_id != exclude) {
                let event = match known.get(&p.user_id) {
                    None => {
                        let color = participant_color(known.len() + 1);
                        let mut participant = Participant::new(&p.user_id, &p.name, p.location, color);
                        participant.joined = true;
                        ParticipantEvent::Joined(participant)
                    }
                    Some(previous) if *previous != p.location => ParticipantEvent::Moved {
                        participant_id: p.user_id.clone(),
                        location: p.location,
                        progress: 0.0,
                    },
                    Some(_) => continue,
                };
                known.insert(p.user_id.clone(), p.location);
                if events.send(event).is_err() {
                    return;
                }
            }
        }
        debug!("[TripStore] Bridge closed");
    })
}
