//! Persisted key names.
//!
//! Key strings are camelCase so existing tour state stays readable by name.

use super::Key;

pub const STEP: Key<u32> = Key::new("step");
pub const MAIN_TOUR_COMPLETE: Key<bool> = Key::new("mainTourComplete");
pub const MAIN_CTA_COMPLETE: Key<bool> = Key::new("mainCTAComplete");
pub const SNIPPET_DISMISSED: Key<bool> = Key::new("snippetDismissed");
/// Presence-checked: any present value means a snippet is on screen.
pub const SNIPPET_IN_PROGRESS: Key<bool> = Key::new("snippetInProgress");
pub const MISSED_SNIPPETS: Key<Vec<u32>> = Key::new("missedSnippets");
pub const SESSION_COUNTER: Key<u32> = Key::new("sessionCounter");
pub const IMPRESSION_COUNT: Key<u32> = Key::new("impressionCount");
pub const DESTROY_ADDON: Key<bool> = Key::new("destroyAddon");
pub const SHOWN_NOTIFICATION: Key<bool> = Key::new("shownNotification");
pub const INSTALL_TIME: Key<u64> = Key::new("installTime");

pub const DURATION_TIMER_START: Key<u64> = Key::new("durationTimerStartTime");
pub const INTERVAL_TIMER_START: Key<u64> = Key::new("intervalTimerStartTime");
pub const DESTROY_TIMER_START: Key<u64> = Key::new("destroyTimerStartTime");
pub const WELCOME_TIMER_START: Key<u64> = Key::new("welcomeTimerStartTime");

/// Every key the tour writes, used by a full reset.
pub const ALL: [&str; 15] = [
    STEP.name(),
    MAIN_TOUR_COMPLETE.name(),
    MAIN_CTA_COMPLETE.name(),
    SNIPPET_DISMISSED.name(),
    SNIPPET_IN_PROGRESS.name(),
    MISSED_SNIPPETS.name(),
    SESSION_COUNTER.name(),
    IMPRESSION_COUNT.name(),
    DESTROY_ADDON.name(),
    SHOWN_NOTIFICATION.name(),
    INSTALL_TIME.name(),
    DURATION_TIMER_START.name(),
    INTERVAL_TIMER_START.name(),
    DESTROY_TIMER_START.name(),
    WELCOME_TIMER_START.name(),
];
