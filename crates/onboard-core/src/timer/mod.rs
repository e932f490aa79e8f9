mod deferrer;
mod scheduler;

pub use deferrer::{
    DeferHandle, Deferrer, DetachedDeferrer, ManualDeferrer, PendingTicket, TokioDeferrer,
};
pub use scheduler::{ArmedTimer, ResumeOutcome, TimerScheduler};

use serde::{Deserialize, Serialize};

use crate::storage::{keys, Key};

/// The logical timers. At most one is armed at any moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerKind {
    /// Delay between the first launch and step 0.
    Welcome,
    /// How long the current snippet stays up.
    Duration,
    /// Gap before the next snippet.
    Interval,
    /// Grace period before the tour retires.
    Destroy,
}

impl TimerKind {
    /// Latest stage first. When several anchors survive a crash the first
    /// present one in this order wins.
    pub const BY_PRECEDENCE: [TimerKind; 4] = [
        TimerKind::Destroy,
        TimerKind::Duration,
        TimerKind::Interval,
        TimerKind::Welcome,
    ];

    /// Store key holding this timer's start time.
    pub fn anchor_key(self) -> Key<u64> {
        match self {
            TimerKind::Welcome => keys::WELCOME_TIMER_START,
            TimerKind::Duration => keys::DURATION_TIMER_START,
            TimerKind::Interval => keys::INTERVAL_TIMER_START,
            TimerKind::Destroy => keys::DESTROY_TIMER_START,
        }
    }
}

impl std::fmt::Display for TimerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TimerKind::Welcome => "welcome",
            TimerKind::Duration => "duration",
            TimerKind::Interval => "interval",
            TimerKind::Destroy => "destroy",
        };
        f.write_str(name)
    }
}

/// Delivered back to the host when a physical timer elapses.
///
/// `generation` identifies the arming; a ticket from a timer that has since
/// been cancelled or replaced no longer matches and is ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimerTicket {
    pub kind: TimerKind,
    pub generation: u64,
}
