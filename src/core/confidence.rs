use serde::{Deserialize, Serialize};
use std::fmt;

pub const HIGH_THRESHOLD: f64 = 0.8;
pub const MEDIUM_THRESHOLD: f64 = 0.6;
pub const LOW_THRESHOLD: f64 = 0.4;

/// Display band for a continuous confidence score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
    VeryLow,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        // NaN 不符合任何門檻，落到 VeryLow
        if score >= HIGH_THRESHOLD {
            ConfidenceLevel::High
        } else if score >= MEDIUM_THRESHOLD {
            ConfidenceLevel::Medium
        } else if score >= LOW_THRESHOLD {
            ConfidenceLevel::Low
        } else {
            ConfidenceLevel::VeryLow
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "HIGH",
            ConfidenceLevel::Medium => "MEDIUM",
            ConfidenceLevel::Low => "LOW",
            ConfidenceLevel::VeryLow => "VERY_LOW",
        }
    }

    pub fn recommendation(&self) -> &'static str {
        match self {
            ConfidenceLevel::High => "Auto-approve eligible",
            ConfidenceLevel::Medium => "Standard review",
            ConfidenceLevel::Low => "Detailed review",
            ConfidenceLevel::VeryLow => "Investigation needed",
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn action_recommendation(score: f64) -> &'static str {
    ConfidenceLevel::from_score(score).recommendation()
}
