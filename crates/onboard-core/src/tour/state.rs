use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::storage::{keys, StateStore, StateTxn};

/// Where the tour stands, derived from the store on every read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum TourState {
    /// No step has ever been entered.
    NotStarted,
    /// Working through the main sequence.
    StepActive {
        step: u32,
        session_counter: Option<u32>,
        impression_count: u32,
        /// A snippet is on screen and waiting for a response or timeout.
        presenting: bool,
    },
    /// Main sequence finished with nothing left to replay.
    MainComplete,
    /// Main sequence finished; missed steps are being shown again.
    ReplayingMissed { head: u32, presenting: bool },
    /// The tour is over for good.
    EndOfLife,
}

impl TourState {
    pub fn read<S: StateStore>(txn: &StateTxn<'_, S>) -> Result<Self, StoreError> {
        if txn.get(keys::DESTROY_ADDON)?.is_true() {
            return Ok(TourState::EndOfLife);
        }
        let Some(step) = txn.get(keys::STEP)?.present() else {
            return Ok(TourState::NotStarted);
        };
        let presenting = txn.get(keys::SNIPPET_IN_PROGRESS)?.is_present();

        if txn.get(keys::MAIN_TOUR_COMPLETE)?.is_true() {
            let missed = txn.get(keys::MISSED_SNIPPETS)?.unwrap_or_default();
            return Ok(match missed.first() {
                Some(&head) => TourState::ReplayingMissed { head, presenting },
                None => TourState::MainComplete,
            });
        }

        Ok(TourState::StepActive {
            step,
            session_counter: txn.get(keys::SESSION_COUNTER)?.present(),
            impression_count: txn.get(keys::IMPRESSION_COUNT)?.unwrap_or(0),
            presenting,
        })
    }

    pub fn is_presenting(&self) -> bool {
        matches!(
            self,
            TourState::StepActive {
                presenting: true,
                ..
            } | TourState::ReplayingMissed {
                presenting: true,
                ..
            }
        )
    }

    /// Still has steps to show or replay.
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            TourState::StepActive { .. } | TourState::ReplayingMissed { .. }
        )
    }
}

impl std::fmt::Display for TourState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TourState::NotStarted => write!(f, "not started"),
            TourState::StepActive { step, presenting, .. } => {
                write!(f, "step {step}")?;
                if *presenting {
                    write!(f, " (presenting)")?;
                }
                Ok(())
            }
            TourState::MainComplete => write!(f, "main tour complete"),
            TourState::ReplayingMissed { head, .. } => write!(f, "replaying step {head}"),
            TourState::EndOfLife => write!(f, "ended"),
        }
    }
}
