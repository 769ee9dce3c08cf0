//! Severity classification of evaluation drops — pure functions only

use serde::{Deserialize, Serialize};

use crate::error::WorkerError;

const DEFAULT_INACCURACY: u32 = 50;
const DEFAULT_MISTAKE: u32 = 150;
const DEFAULT_BLUNDER: u32 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Inaccuracy,
    Mistake,
    Blunder,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Inaccuracy => "inaccuracy",
            Severity::Mistake => "mistake",
            Severity::Blunder => "blunder",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Centipawn drop needed for each tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeverityThresholds {
    #[serde(alias = "inacc")]
    pub inaccuracy: u32,
    pub mistake: u32,
    pub blunder: u32,
}

impl Default for SeverityThresholds {
    fn default() -> Self {
        Self {
            inaccuracy: DEFAULT_INACCURACY,
            mistake: DEFAULT_MISTAKE,
            blunder: DEFAULT_BLUNDER,
        }
    }
}

impl SeverityThresholds {
    /// Tiers must not overlap: inaccuracy <= mistake <= blunder.
    pub fn validate(&self) -> Result<(), WorkerError> {
        if self.inaccuracy > self.mistake || self.mistake > self.blunder {
            return Err(WorkerError::InvalidInput(format!(
                "thresholds must be ordered inaccuracy <= mistake <= blunder (got {}, {}, {})",
                self.inaccuracy, self.mistake, self.blunder
            )));
        }
        Ok(())
    }
}

/// Map a centipawn drop to a tier, checking the highest tier first.
pub fn classify(drop: u32, thresholds: &SeverityThresholds) -> Option<Severity> {
    if drop >= thresholds.blunder {
        Some(Severity::Blunder)
    } else if drop >= thresholds.mistake {
        Some(Severity::Mistake)
    } else if drop >= thresholds.inaccuracy {
        Some(Severity::Inaccuracy)
    } else {
        None
    }
}

/// Drop caused by a move, from the mover's perspective.
///
/// `cp_before` is scored for the mover; `cp_after` for the opponent, who is to
/// move once the move is played. Improvements clamp to zero.
pub fn evaluation_drop(cp_before: i32, cp_after: i32) -> u32 {
    (cp_before.saturating_add(cp_after)).max(0) as u32
}
