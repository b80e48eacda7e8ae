//! Post-trip scoring and the leaderboard.
//!
//! Each traveller earns points for being on time, leaving first, and responding
//! quickly to the invitation. Totals feed [`score_color`] so a host can tint the
//! leaderboard without its own palette logic.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::color::score_color;

/// What the scorer needs to know about one traveller. Times are seconds since the
/// trip started.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TripRecord {
    pub participant_id: String,
    pub name: String,
    /// Seconds between sharing the invitation and joining.
    pub joined_after_secs: f64,
    pub departed_at_secs: f64,
    /// `None` while still on the way.
    pub arrived_at_secs: Option<f64>,
    pub distance_miles: f64,
}

impl TripRecord {
    pub fn travel_secs(&self) -> Option<f64> {
        self.arrived_at_secs.map(|a| (a - self.departed_at_secs).max(0.0))
    }
}

/// Point values and thresholds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
#[serde(default)]
pub struct ScoringConfig {
    /// Arrivals after this many seconds from the start are late.
    /// Default: 30 s
    pub scheduled_arrival_secs: f64,

    /// Joining within this many seconds of the invitation counts as quick.
    /// Default: 5 s
    pub quick_response_secs: f64,

    /// Default: -10
    pub late_penalty: i32,

    /// Points for the earliest on-time arrival.
    /// Default: 25
    pub first_arrival_points: i32,

    /// Points for every other on-time arrival.
    /// Default: 15
    pub on_time_points: i32,

    /// Points for the first to leave.
    /// Default: 10
    pub leadership_points: i32,

    /// Default: 20
    pub quick_response_points: i32,

    /// Default: 15
    pub response_points: i32,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            scheduled_arrival_secs: 30.0,
            quick_response_secs: 5.0,
            late_penalty: -10,
            first_arrival_points: 25,
            on_time_points: 15,
            leadership_points: 10,
            quick_response_points: 20,
            response_points: 15,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "snake_case")]
pub enum ArrivalStatus {
    OnTime,
    Late,
    EnRoute,
}

/// Score breakdown for one traveller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ParticipantScore {
    pub participant_id: String,
    pub name: String,
    pub status: ArrivalStatus,
    pub lateness: i32,
    pub punctuality: i32,
    pub leadership: i32,
    pub responsiveness: i32,
    pub total: i32,
    /// Leaderboard tint for `total`.
    pub color: String,
}

/// Score every record, in input order.
///
/// Travellers still en route are treated as late. Ties for first departure or first
/// arrival go to the earlier record.
pub fn score_trip(records: &[TripRecord], config: &ScoringConfig) -> Vec<ParticipantScore> {
    let first_to_leave = first_index(records.iter().map(|r| Some(r.departed_at_secs)));
    let first_on_time = first_index(records.iter().map(|r| {
        r.arrived_at_secs.filter(|&t| t <= config.scheduled_arrival_secs)
    }));

    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let status = match record.arrived_at_secs {
                None => ArrivalStatus::EnRoute,
                Some(t) if t <= config.scheduled_arrival_secs => ArrivalStatus::OnTime,
                Some(_) => ArrivalStatus::Late,
            };

            let (lateness, punctuality) = match status {
                ArrivalStatus::OnTime if first_on_time == Some(i) => (0, config.first_arrival_points),
                ArrivalStatus::OnTime => (0, config.on_time_points),
                ArrivalStatus::Late | ArrivalStatus::EnRoute => (config.late_penalty, 0),
            };
            let leadership = if first_to_leave == Some(i) { config.leadership_points } else { 0 };
            let responsiveness = if record.joined_after_secs <= config.quick_response_secs {
                config.quick_response_points
            } else {
                config.response_points
            };

            let total = lateness + punctuality + leadership + responsiveness;
            ParticipantScore {
                participant_id: record.participant_id.clone(),
                name: record.name.clone(),
                status,
                lateness,
                punctuality,
                leadership,
                responsiveness,
                total,
                color: score_color(total as f64),
            }
        })
        .collect()
}

/// Scores sorted by total, highest first, ties by name.
pub fn leaderboard(records: &[TripRecord], config: &ScoringConfig) -> Vec<ParticipantScore> {
    let mut scores = score_trip(records, config);
    scores.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    scores
}

/// Index of the smallest present value, earliest on ties.
fn first_index(values: impl Iterator<Item = Option<f64>>) -> Option<usize> {
    values
        .enumerate()
        .filter_map(|(i, v)| v.map(|v| (i, v)))
        .min_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)))
        .map(|(i, _)| i)
}

/// Group totals for the trip summary card.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TripStats {
    /// Sum of every traveller's route length.
    pub total_distance_miles: f64,
    /// Total distance over total travel time of those who arrived.
    pub average_speed_mph: f64,
    /// Seconds from the first departure to the last arrival.
    pub total_time_secs: f64,
}

impl TripStats {
    /// `None` until at least one traveller has arrived.
    pub fn from_records(records: &[TripRecord]) -> Option<Self> {
        let arrived: Vec<&TripRecord> = records.iter().filter(|r| r.arrived_at_secs.is_some()).collect();
        if arrived.is_empty() {
            return None;
        }

        let travelled_miles: f64 = arrived.iter().map(|r| r.distance_miles).sum();
        let travel_hours: f64 = arrived.iter().filter_map(|r| r.travel_secs()).sum::<f64>() / 3600.0;
        let first_departure = records.iter().map(|r| r.departed_at_secs).fold(f64::INFINITY, f64::min);
        let last_arrival = arrived
            .iter()
            .filter_map(|r| r.arrived_at_secs)
            .fold(f64::NEG_INFINITY, f64::max);

        Some(Self {
            total_distance_miles: records.iter().map(|r| r.distance_miles).sum(),
            average_speed_mph: if travel_hours > 0.0 { travelled_miles / travel_hours } else { 0.0 },
            total_time_secs: (last_arrival - first_departure).max(0.0),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, joined: f64, departed: f64, arrived: Option<f64>) -> TripRecord {
        TripRecord {
            participant_id: id.to_lowercase(),
            name: id.to_string(),
            joined_after_secs: joined,
            departed_at_secs: departed,
            arrived_at_secs: arrived,
            distance_miles: 0.5,
        }
    }

    fn crew() -> Vec<TripRecord> {
        vec![
            record("Deanne Watts", 0.0, 0.0, Some(25.0)),
            record("Barry Allen", 2.0, 0.0, Some(28.0)),
            record("Pietro Maximoff", 7.0, 0.0, Some(35.0)),
        ]
    }

    #[test]
    fn test_score_breakdown() {
        let scores = score_trip(&crew(), &ScoringConfig::default());

        // First on time, first to leave, quick to join
        assert_eq!(scores[0].status, ArrivalStatus::OnTime);
        assert_eq!((scores[0].punctuality, scores[0].leadership, scores[0].responsiveness), (25, 10, 20));
        assert_eq!(scores[0].total, 55);

        assert_eq!((scores[1].punctuality, scores[1].leadership), (15, 0));
        assert_eq!(scores[1].total, 35);

        assert_eq!(scores[2].status, ArrivalStatus::Late);
        assert_eq!((scores[2].lateness, scores[2].punctuality, scores[2].responsiveness), (-10, 0, 15));
        assert_eq!(scores[2].total, 5);
    }

    #[test]
    fn test_first_arrival_skips_late_travellers() {
        let records = vec![
            record("A", 0.0, 0.0, Some(40.0)),
            record("B", 0.0, 1.0, Some(29.0)),
            record("C", 0.0, 2.0, None),
        ];
        let scores = score_trip(&records, &ScoringConfig::default());
        assert_eq!(scores[0].punctuality, 0);
        assert_eq!(scores[1].punctuality, 25);
        assert_eq!(scores[2].status, ArrivalStatus::EnRoute);
        assert_eq!(scores[2].lateness, -10);
        assert_eq!(scores[0].leadership, 10);
    }

    #[test]
    fn test_leaderboard_order_and_color() {
        let mut records = crew();
        records.push(record("Aaron", 2.0, 0.0, Some(28.0)));
        let board = leaderboard(&records, &ScoringConfig::default());

        let names: Vec<&str> = board.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Deanne Watts", "Aaron", "Barry Allen", "Pietro Maximoff"]);
        assert_eq!(board[0].color, score_color(55.0));
        assert!(board.windows(2).all(|w| w[0].total >= w[1].total));
    }

    #[test]
    fn test_trip_stats() {
        let stats = TripStats::from_records(&crew()).unwrap();
        assert!((stats.total_distance_miles - 1.5).abs() < 1e-9);
        assert_eq!(stats.total_time_secs, 35.0);
        // 1.5 miles over 88 seconds
        assert!((stats.average_speed_mph - 1.5 / (88.0 / 3600.0)).abs() < 1e-9);

        let nobody = vec![record("A", 0.0, 0.0, None)];
        assert_eq!(TripStats::from_records(&nobody), None);
    }
}
