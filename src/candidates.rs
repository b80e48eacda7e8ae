//! Candidate meeting places and group voting.
//!
//! The store keeps the list of proposed destinations, the current user's vote on each,
//! and which candidate's detail popup is open. Invariants held after every operation:
//!
//! - at most one candidate has `is_selected == true`
//! - `upvotes` and `downvotes` never go below zero
//! - once a candidate is confirmed the list is a singleton and no longer changes

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Location;
use crate::search::SearchResult;

/// Direction of a vote on a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "lowercase")]
pub enum VoteDirection {
    Up,
    Down,
}

/// A proposed meeting place undergoing group voting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct PlaceCandidate {
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub location: Location,
    pub upvotes: u32,
    pub downvotes: u32,
    pub is_selected: bool,
    /// The current user's vote. Simulated participants are not tracked here.
    pub user_vote: Option<VoteDirection>,
}

impl PlaceCandidate {
    /// Net score (upvotes minus downvotes).
    pub fn score(&self) -> i64 {
        self.upvotes as i64 - self.downvotes as i64
    }
}

/// A place proposed for voting, before it becomes a [`PlaceCandidate`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ProposedPlace {
    pub place_id: String,
    pub name: String,
    pub address: String,
    pub location: Location,
}

impl From<&SearchResult> for ProposedPlace {
    fn from(result: &SearchResult) -> Self {
        Self {
            place_id: result.place_id.clone(),
            name: result.name.clone(),
            address: result.address.clone(),
            location: result.location,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CandidateError {
    #[error("no candidate with place id {0:?}")]
    UnknownCandidate(String),
    #[error("the rendezvous destination is already confirmed")]
    AlreadyConfirmed,
}

/// In-memory list of candidates with voting and exclusive selection.
#[derive(Debug, Clone, Default)]
pub struct CandidateStore {
    candidates: Vec<PlaceCandidate>,
    confirmed: Option<PlaceCandidate>,
}

impl CandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn candidates(&self) -> &[PlaceCandidate] {
        &self.candidates
    }

    pub fn get(&self, place_id: &str) -> Option<&PlaceCandidate> {
        self.candidates.iter().find(|c| c.place_id == place_id)
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    /// The candidate whose popup is open, if any.
    pub fn selected(&self) -> Option<&PlaceCandidate> {
        self.candidates.iter().find(|c| c.is_selected)
    }

    /// The confirmed meeting point. Immutable once set.
    pub fn confirmed(&self) -> Option<&PlaceCandidate> {
        self.confirmed.as_ref()
    }

    /// Highest net score, earliest proposal wins ties.
    pub fn leading(&self) -> Option<&PlaceCandidate> {
        self.candidates
            .iter()
            .rev()
            .max_by_key(|c| c.score())
    }

    /// Propose a place. New candidates start with the proposer's upvote and become the
    /// selected candidate; a place that is already listed is only selected.
    ///
    /// Returns `true` when a new candidate was inserted.
    ///
    /// ```
    /// use rendezvous_engine::{Location, CandidateStore, ProposedPlace, VoteDirection};
    ///
    /// let mut store = CandidateStore::new();
    /// let place = ProposedPlace {
    ///     place_id: "p1".into(),
    ///     name: "Pieology".into(),
    ///     address: "1 Main St".into(),
    ///     location: Location::new(37.77, -122.41),
    /// };
    /// assert!(store.add_candidate(place.clone()).unwrap());
    /// assert!(!store.add_candidate(place).unwrap());
    ///
    /// let c = store.get("p1").unwrap();
    /// assert_eq!((c.upvotes, c.is_selected, c.user_vote), (1, true, Some(VoteDirection::Up)));
    /// ```
    pub fn add_candidate(&mut self, place: ProposedPlace) -> Result<bool, CandidateError> {
        self.ensure_open()?;

        let inserted = if self.get(&place.place_id).is_some() {
            debug!("[Candidates] {} already proposed, selecting", place.place_id);
            false
        } else {
            info!("[Candidates] Proposed {} ({})", place.name, place.place_id);
            self.candidates.push(PlaceCandidate {
                place_id: place.place_id.clone(),
                name: place.name,
                address: place.address,
                location: place.location,
                upvotes: 1,
                downvotes: 0,
                is_selected: false,
                user_vote: Some(VoteDirection::Up),
            });
            true
        };

        self.select(&place.place_id)?;
        Ok(inserted)
    }

    /// Propose a place on behalf of another participant. The proposer's upvote is
    /// counted but the user's vote slot and the selection are left alone.
    pub fn add_participant_candidate(&mut self, place: ProposedPlace) -> Result<bool, CandidateError> {
        self.ensure_open()?;

        if self.get(&place.place_id).is_some() {
            return Ok(false);
        }
        info!("[Candidates] Participant proposed {} ({})", place.name, place.place_id);
        self.candidates.push(PlaceCandidate {
            place_id: place.place_id,
            name: place.name,
            address: place.address,
            location: place.location,
            upvotes: 1,
            downvotes: 0,
            is_selected: false,
            user_vote: None,
        });
        Ok(true)
    }

    /// Apply the current user's vote.
    ///
    /// Repeating the previous direction is a no-op. Switching direction reverses the
    /// earlier vote before applying the new one, so a user holds exactly one vote per
    /// candidate. The voted candidate becomes the selected one.
    ///
    /// Returns `true` when the counts changed.
    pub fn handle_vote(&mut self, place_id: &str, direction: VoteDirection) -> Result<bool, CandidateError> {
        self.ensure_open()?;

        let candidate = self.get_mut(place_id)?;
        let changed = if candidate.user_vote == Some(direction) {
            debug!("[Candidates] Duplicate {:?} vote on {} ignored", direction, place_id);
            false
        } else {
            match candidate.user_vote {
                Some(VoteDirection::Up) => candidate.upvotes = candidate.upvotes.saturating_sub(1),
                Some(VoteDirection::Down) => candidate.downvotes = candidate.downvotes.saturating_sub(1),
                None => {}
            }
            match direction {
                VoteDirection::Up => candidate.upvotes += 1,
                VoteDirection::Down => candidate.downvotes += 1,
            }
            candidate.user_vote = Some(direction);
            true
        };

        self.select(place_id)?;
        Ok(changed)
    }

    /// Record a vote from a simulated or remote participant.
    ///
    /// This path only increments a count: per-participant vote slots are not tracked
    /// here, so callers must not replay the same participant's vote. Selection is left
    /// untouched so the user's open popup does not jump.
    pub fn apply_participant_vote(&mut self, place_id: &str, direction: VoteDirection) -> Result<(), CandidateError> {
        self.ensure_open()?;

        let candidate = self.get_mut(place_id)?;
        match direction {
            VoteDirection::Up => candidate.upvotes += 1,
            VoteDirection::Down => candidate.downvotes += 1,
        }
        debug!(
            "[Candidates] Participant {:?} vote on {} -> +{}/-{}",
            direction, place_id, candidate.upvotes, candidate.downvotes
        );
        Ok(())
    }

    /// Make `place_id` the only selected candidate.
    pub fn select(&mut self, place_id: &str) -> Result<(), CandidateError> {
        if self.get(place_id).is_none() {
            return Err(CandidateError::UnknownCandidate(place_id.to_string()));
        }
        for c in &mut self.candidates {
            c.is_selected = c.place_id == place_id;
        }
        Ok(())
    }

    /// Close any open popup.
    pub fn clear_selection(&mut self) {
        for c in &mut self.candidates {
            c.is_selected = false;
        }
    }

    /// Confirm the meeting point, collapsing the list to that single candidate.
    pub fn confirm_candidate(&mut self, place_id: &str) -> Result<&PlaceCandidate, CandidateError> {
        self.ensure_open()?;

        let idx = self
            .candidates
            .iter()
            .position(|c| c.place_id == place_id)
            .ok_or_else(|| CandidateError::UnknownCandidate(place_id.to_string()))?;

        let mut chosen = self.candidates.swap_remove(idx);
        chosen.is_selected = true;
        info!(
            "[Candidates] Confirmed {} with {} up / {} down, dropping {} other candidates",
            chosen.name, chosen.upvotes, chosen.downvotes, self.candidates.len()
        );

        self.candidates = vec![chosen.clone()];
        let confirmed = self.confirmed.insert(chosen);
        Ok(&*confirmed)
    }

    fn ensure_open(&self) -> Result<(), CandidateError> {
        if self.confirmed.is_some() {
            warn!("[Candidates] Ignoring change after confirmation");
            return Err(CandidateError::AlreadyConfirmed);
        }
        Ok(())
    }

    fn get_mut(&mut self, place_id: &str) -> Result<&mut PlaceCandidate, CandidateError> {
        self.candidates
            .iter_mut()
            .find(|c| c.place_id == place_id)
            .ok_or_else(|| CandidateError::UnknownCandidate(place_id.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(id: &str) -> ProposedPlace {
        ProposedPlace {
            place_id: id.to_string(),
            name: format!("Place {}", id),
            address: format!("{} Main St", id),
            location: Location::new(37.77, -122.41),
        }
    }

    fn selected_count(store: &CandidateStore) -> usize {
        store.candidates().iter().filter(|c| c.is_selected).count()
    }

    #[test]
    fn test_add_candidate_self_upvotes_and_selects() {
        let mut store = CandidateStore::new();
        store.add_candidate(place("a")).unwrap();
        store.add_candidate(place("b")).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.selected().unwrap().place_id, "b");
        assert!(!store.get("a").unwrap().is_selected);
        assert_eq!(store.get("b").unwrap().upvotes, 1);
    }

    #[test]
    fn test_readding_existing_only_selects() {
        let mut store = CandidateStore::new();
        store.add_candidate(place("a")).unwrap();
        store.add_candidate(place("b")).unwrap();
        assert!(!store.add_candidate(place("a")).unwrap());

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("a").unwrap().upvotes, 1);
        assert_eq!(store.selected().unwrap().place_id, "a");
    }

    #[test]
    fn test_duplicate_vote_is_idempotent() {
        let mut store = CandidateStore::new();
        store.add_candidate(place("a")).unwrap();

        assert!(!store.handle_vote("a", VoteDirection::Up).unwrap());
        assert!(!store.handle_vote("a", VoteDirection::Up).unwrap());
        assert_eq!(store.get("a").unwrap().upvotes, 1);
    }

    #[test]
    fn test_switching_vote_moves_the_count() {
        let mut store = CandidateStore::new();
        store.add_candidate(place("a")).unwrap();

        assert!(store.handle_vote("a", VoteDirection::Down).unwrap());
        let c = store.get("a").unwrap();
        assert_eq!((c.upvotes, c.downvotes, c.user_vote), (0, 1, Some(VoteDirection::Down)));

        assert!(store.handle_vote("a", VoteDirection::Up).unwrap());
        let c = store.get("a").unwrap();
        assert_eq!((c.upvotes, c.downvotes), (1, 0));
    }

    #[test]
    fn test_selection_stays_exclusive() {
        let mut store = CandidateStore::new();
        for id in ["a", "b", "c"] {
            store.add_candidate(place(id)).unwrap();
            assert_eq!(selected_count(&store), 1);
        }
        store.handle_vote("a", VoteDirection::Down).unwrap();
        assert_eq!(selected_count(&store), 1);
        store.apply_participant_vote("c", VoteDirection::Up).unwrap();
        assert_eq!(selected_count(&store), 1);
        assert_eq!(store.selected().unwrap().place_id, "a");

        store.clear_selection();
        assert_eq!(selected_count(&store), 0);
    }

    #[test]
    fn test_unknown_candidate() {
        let mut store = CandidateStore::new();
        assert_eq!(
            store.handle_vote("missing", VoteDirection::Up),
            Err(CandidateError::UnknownCandidate("missing".into()))
        );
    }

    #[test]
    fn test_participant_votes_accumulate() {
        let mut store = CandidateStore::new();
        store.add_candidate(place("a")).unwrap();
        store.apply_participant_vote("a", VoteDirection::Up).unwrap();
        store.apply_participant_vote("a", VoteDirection::Down).unwrap();

        let c = store.get("a").unwrap();
        assert_eq!((c.upvotes, c.downvotes), (2, 1));
        // The user's slot is unaffected
        assert_eq!(c.user_vote, Some(VoteDirection::Up));
    }

    #[test]
    fn test_confirm_collapses_and_freezes() {
        let mut store = CandidateStore::new();
        store.add_candidate(place("a")).unwrap();
        store.add_candidate(place("b")).unwrap();
        store.confirm_candidate("a").unwrap();

        assert_eq!(store.len(), 1);
        assert_eq!(store.confirmed().unwrap().place_id, "a");
        assert_eq!(store.add_candidate(place("c")), Err(CandidateError::AlreadyConfirmed));
        assert_eq!(store.handle_vote("a", VoteDirection::Down), Err(CandidateError::AlreadyConfirmed));
        assert_eq!(store.confirm_candidate("a").unwrap_err(), CandidateError::AlreadyConfirmed);
    }

    #[test]
    fn test_participant_candidate_keeps_user_selection() {
        let mut store = CandidateStore::new();
        store.add_candidate(place("a")).unwrap();
        assert!(store.add_participant_candidate(place("b")).unwrap());
        assert!(!store.add_participant_candidate(place("b")).unwrap());

        let b = store.get("b").unwrap();
        assert_eq!((b.upvotes, b.user_vote, b.is_selected), (1, None, false));
        assert_eq!(store.selected().unwrap().place_id, "a");

        // The user's first vote on someone else's proposal adds to theirs
        store.handle_vote("b", VoteDirection::Up).unwrap();
        assert_eq!(store.get("b").unwrap().upvotes, 2);
    }

    #[test]
    fn test_leading_prefers_earliest_on_tie() {
        let mut store = CandidateStore::new();
        store.add_candidate(place("a")).unwrap();
        store.add_candidate(place("b")).unwrap();
        assert_eq!(store.leading().unwrap().place_id, "a");

        store.apply_participant_vote("b", VoteDirection::Up).unwrap();
        assert_eq!(store.leading().unwrap().place_id, "b");
    }
}
