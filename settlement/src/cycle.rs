//! Settlement cycle state machine
//!
//! ```text
//! Idle -> Collecting -> Netting -> Validating -> Halted
//!                                            \-> Previewing -> Completed
//!                                            \-> Executing  -> Completed
//! Collecting | Netting | Executing -> Failed
//! Collecting -> Completed            (nothing to settle)
//! ```

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase of a single `process_settlement` run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    /// Not started
    Idle,
    /// Fetching unsettled transactions
    Collecting,
    /// Computing positions and instructions
    Netting,
    /// Running circuit breakers
    Validating,
    /// Blocked by a violation; nothing persisted
    Halted,
    /// Simulation result being assembled
    Previewing,
    /// Writing cycle, instructions and transaction updates
    Executing,
    /// Finished
    Completed,
    /// Unrecoverable error
    Failed,
}

impl CycleState {
    /// Whether `next` may follow `self`
    pub fn can_transition_to(&self, next: CycleState) -> bool {
        use CycleState::*;

        matches!(
            (self, next),
            (Idle, Collecting)
                | (Collecting, Netting)
                | (Collecting, Completed)
                | (Collecting, Failed)
                | (Netting, Validating)
                | (Netting, Failed)
                | (Validating, Halted)
                | (Validating, Previewing)
                | (Validating, Executing)
                | (Previewing, Completed)
                | (Executing, Completed)
                | (Executing, Failed)
        )
    }

    /// No further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, CycleState::Halted | CycleState::Completed | CycleState::Failed)
    }
}

/// Tracks the state of one run and refuses illegal transitions
#[derive(Debug)]
pub struct CycleTracker {
    run_id: Uuid,
    state: CycleState,
}

impl CycleTracker {
    /// Start a run in `Idle`
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: CycleState::Idle,
        }
    }

    /// Current state
    pub fn state(&self) -> CycleState {
        self.state
    }

    /// Move to `next`
    pub fn advance(&mut self, next: CycleState) -> crate::Result<()> {
        if !self.state.can_transition_to(next) {
            return Err(crate::Error::Other(format!(
                "Illegal cycle transition {:?} -> {:?} in run {}",
                self.state, next, self.run_id
            )));
        }

        tracing::debug!(run_id = %self.run_id, from = ?self.state, to = ?next, "Cycle transition");
        self.state = next;
        Ok(())
    }
}
