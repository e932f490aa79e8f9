use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::timer::TimerKind;
use crate::tour::{Resolution, Snippet, TourState};

/// Every state change the coordinator makes produces an event.
/// Hosts print, log or forward them; the tour itself never reads them back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum TourEvent {
    /// First launch ever seen.
    Installed {
        at: DateTime<Utc>,
    },
    SnippetPresented {
        snippet: Snippet,
        at: DateTime<Utc>,
    },
    NotificationShown {
        step: u32,
        at: DateTime<Utc>,
    },
    StepFinished {
        step: u32,
        resolution: Resolution,
        replay: bool,
        at: DateTime<Utc>,
    },
    MainTourCompleted {
        at: DateTime<Utc>,
    },
    TimerArmed {
        kind: TimerKind,
        delay_ms: u64,
        /// Re-armed from a persisted anchor rather than started fresh.
        resumed: bool,
        at: DateTime<Utc>,
    },
    TimerDisarmed {
        at: DateTime<Utc>,
    },
    /// A timer ran out while the host was not running.
    TimerOverdue {
        kind: TimerKind,
        overdue_ms: u64,
        at: DateTime<Utc>,
    },
    /// A fired ticket whose timer had been cancelled or replaced.
    StaleTimerIgnored {
        kind: TimerKind,
        generation: u64,
        at: DateTime<Utc>,
    },
    /// The tour was live but no timer anchor survived.
    StateRecovered {
        state: TourState,
        at: DateTime<Utc>,
    },
    TourRetired {
        at: DateTime<Utc>,
    },
    TourReset {
        at: DateTime<Utc>,
    },
}
