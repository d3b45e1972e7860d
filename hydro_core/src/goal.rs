//! Daily goal and progress arithmetic.
//!
//! The goal is 35 ml per kilogram of body weight. Age and activity level are
//! not part of the formula.

use crate::UserProfile;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Milliliters of water per kilogram of body weight per day
pub const ML_PER_KG: f64 = 35.0;

/// Daily target in ml, 0 when the weight is not positive
pub fn daily_goal_ml(weight_kg: f64) -> u32 {
    if weight_kg > 0.0 {
        // `as` saturates for absurd weights
        (weight_kg * ML_PER_KG).round() as u32
    } else {
        0
    }
}

/// Share of the goal reached, rounded and capped at 100
pub fn progress_percent(intake_ml: u32, goal_ml: u32) -> u32 {
    if goal_ml == 0 {
        return 0;
    }
    let percent = (f64::from(intake_ml) / f64::from(goal_ml) * 100.0).round();
    percent.min(100.0) as u32
}

/// Milliliters still to drink, never negative
pub fn remaining_ml(intake_ml: u32, goal_ml: u32) -> u32 {
    goal_ml.saturating_sub(intake_ml)
}

/// Where the user stands against the goal
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "delta_ml", rename_all = "snake_case")]
pub enum Prediction {
    Ahead(u32),
    Behind(u32),
    NoGoal,
}

pub fn prediction(intake_ml: u32, goal_ml: u32) -> Prediction {
    if goal_ml == 0 {
        Prediction::NoGoal
    } else if intake_ml >= goal_ml {
        Prediction::Ahead(intake_ml - goal_ml)
    } else {
        Prediction::Behind(goal_ml - intake_ml)
    }
}

impl fmt::Display for Prediction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Prediction::Ahead(ml) => write!(f, "You are ahead by {} ml.", ml),
            Prediction::Behind(ml) => write!(f, "You are behind by {} ml.", ml),
            Prediction::NoGoal => write!(f, "Enter your weight to set a goal."),
        }
    }
}

/// Badge shown once progress reaches 100%
pub const GOAL_REACHED_BADGE: &str = "Goal Achieved!";

/// Badge shown while the goal is still ahead
pub const IN_PROGRESS_BADGE: &str = "In Progress";

/// Goal figures for one intake total
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GoalSummary {
    pub goal_ml: u32,
    pub intake_ml: u32,
    pub progress_percent: u32,
    pub remaining_ml: u32,
    pub prediction: Prediction,
    pub prediction_text: String,
    pub goal_reached: bool,
}

impl GoalSummary {
    pub fn compute(profile: &UserProfile, intake_ml: u32) -> Self {
        let goal_ml = daily_goal_ml(profile.weight_kg);
        let prediction = prediction(intake_ml, goal_ml);
        let progress_percent = progress_percent(intake_ml, goal_ml);
        Self {
            goal_ml,
            intake_ml,
            progress_percent,
            remaining_ml: remaining_ml(intake_ml, goal_ml),
            prediction,
            prediction_text: prediction.to_string(),
            // Follows the displayed (rounded) percentage
            goal_reached: progress_percent >= 100,
        }
    }

    pub fn badge(&self) -> &'static str {
        if self.goal_reached {
            GOAL_REACHED_BADGE
        } else {
            IN_PROGRESS_BADGE
        }
    }
}
