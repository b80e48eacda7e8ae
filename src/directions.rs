//! Turn-by-turn directions consumed step by step during simulated navigation.

use serde::{Deserialize, Serialize};

/// Kind of maneuver for a direction step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
#[serde(rename_all = "snake_case")]
pub enum ManeuverType {
    Depart,
    Straight,
    TurnLeft,
    TurnRight,
    Arrive,
    Other,
}

impl ManeuverType {
    /// Map an ArcGIS `maneuverType` string (e.g. `esriDMTTurnLeft`).
    pub fn from_provider(raw: &str) -> Self {
        match raw {
            "esriDMTDepart" => Self::Depart,
            "esriDMTStraight" => Self::Straight,
            "esriDMTTurnLeft" | "esriDMTSharpLeft" | "esriDMTBearLeft" => Self::TurnLeft,
            "esriDMTTurnRight" | "esriDMTSharpRight" | "esriDMTBearRight" => Self::TurnRight,
            "esriDMTStop" => Self::Arrive,
            _ => Self::Other,
        }
    }
}

/// One instruction of a route.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct DirectionStep {
    pub text: String,
    /// Meters covered by this step.
    pub distance: f64,
    /// Seconds this step takes.
    pub time: f64,
    pub maneuver_type: ManeuverType,
}

impl DirectionStep {
    pub fn new(text: &str, distance: f64, time: f64, maneuver_type: ManeuverType) -> Self {
        Self { text: text.to_string(), distance, time, maneuver_type }
    }
}

/// Hard-coded directions used when the routing provider is unavailable.
///
/// The total distance is split across the middle steps so that
/// [`Navigator::remaining_distance`] still counts down meaningfully.
pub fn scripted_directions(destination_name: &str, total_meters: f64) -> Vec<DirectionStep> {
    // ~30 km/h city driving
    const METERS_PER_SECOND: f64 = 8.3;
    let leg = total_meters.max(0.0) / 3.0;
    let secs = leg / METERS_PER_SECOND;

    vec![
        DirectionStep::new("Start at your location", 0.0, 0.0, ManeuverType::Depart),
        DirectionStep::new("Head north on the main road", leg, secs, ManeuverType::Straight),
        DirectionStep::new("Turn right at the next intersection", leg, secs, ManeuverType::TurnRight),
        DirectionStep::new("Continue straight", leg, secs, ManeuverType::Straight),
        DirectionStep::new(&format!("Arrive at {}", destination_name), 0.0, 0.0, ManeuverType::Arrive),
    ]
}

/// Cursor over an ordered list of steps.
#[derive(Debug, Clone, Default)]
pub struct Navigator {
    steps: Vec<DirectionStep>,
    index: usize,
}

impl Navigator {
    pub fn new(steps: Vec<DirectionStep>) -> Self {
        Self { steps, index: 0 }
    }

    pub fn steps(&self) -> &[DirectionStep] {
        &self.steps
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn current(&self) -> Option<&DirectionStep> {
        self.steps.get(self.index)
    }

    /// Move to the next step, returning it. Stays on the last step once reached.
    pub fn advance(&mut self) -> Option<&DirectionStep> {
        if self.index + 1 < self.steps.len() {
            self.index += 1;
            self.steps.get(self.index)
        } else {
            None
        }
    }

    /// Jump to the step that covers `fraction` of the total distance. A full fraction
    /// lands on the final step.
    pub fn seek_fraction(&mut self, fraction: f64) {
        let total: f64 = self.steps.iter().map(|s| s.distance).sum();
        if self.steps.is_empty() || total <= 0.0 {
            return;
        }
        if fraction >= 1.0 {
            self.index = self.steps.len() - 1;
            return;
        }
        let target = total * fraction.max(0.0);
        let mut covered = 0.0;
        for (i, step) in self.steps.iter().enumerate() {
            covered += step.distance;
            if covered >= target && step.distance > 0.0 {
                self.index = self.index.max(i);
                return;
            }
        }
        self.index = self.steps.len() - 1;
    }

    /// Meters left including the current step.
    pub fn remaining_distance(&self) -> f64 {
        self.steps.iter().skip(self.index).map(|s| s.distance).sum()
    }

    /// Seconds left including the current step.
    pub fn remaining_time(&self) -> f64 {
        self.steps.iter().skip(self.index).map(|s| s.time).sum()
    }

    pub fn is_finished(&self) -> bool {
        self.steps.is_empty() || self.index + 1 == self.steps.len()
    }
}
