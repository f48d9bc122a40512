//! Stage state machine.
//!
//! ```text
//! INGEST → FEATURE → FORECAST → VALIDATE → STORE → SUCCESS
//!    └────────┴──────────┴──────────┴────────┴──→ FAILURE → FALLBACK
//!                                             STORE → FALLBACK
//! ```
//!
//! `STORE → FALLBACK` is taken when the run completed but at least one
//! product was served from a substitute forecast.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StageState {
    Ingest,
    Feature,
    Forecast,
    Validate,
    Store,
    Success,
    Failure,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid stage transition {from} -> {to}")]
pub struct InvalidTransition {
    pub from: StageState,
    pub to: StageState,
}

impl StageState {
    /// Working stages in execution order.
    pub const WORKING: [StageState; 5] = [
        StageState::Ingest,
        StageState::Feature,
        StageState::Forecast,
        StageState::Validate,
        StageState::Store,
    ];

    /// Lowercase stage name used in errors and logs.
    pub fn name(self) -> &'static str {
        match self {
            StageState::Ingest => "ingest",
            StageState::Feature => "feature",
            StageState::Forecast => "forecast",
            StageState::Validate => "validate",
            StageState::Store => "store",
            StageState::Success => "success",
            StageState::Failure => "failure",
            StageState::Fallback => "fallback",
        }
    }

    pub fn is_working(self) -> bool {
        Self::WORKING.contains(&self)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StageState::Success | StageState::Fallback)
    }

    /// The stage after a successful working stage.
    pub fn next(self) -> Option<StageState> {
        match self {
            StageState::Ingest => Some(StageState::Feature),
            StageState::Feature => Some(StageState::Forecast),
            StageState::Forecast => Some(StageState::Validate),
            StageState::Validate => Some(StageState::Store),
            StageState::Store => Some(StageState::Success),
            _ => None,
        }
    }

    pub fn can_transition_to(self, to: StageState) -> bool {
        if self.next() == Some(to) {
            return true;
        }
        match (self, to) {
            (from, StageState::Failure) => from.is_working(),
            (StageState::Failure, StageState::Fallback) => true,
            (StageState::Store, StageState::Fallback) => true,
            _ => false,
        }
    }

    pub fn transition(self, to: StageState) -> Result<StageState, InvalidTransition> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name().to_ascii_uppercase())
    }
}
