//! Restart tests against the on-disk SQLite store.
//!
//! Each `launch` opens the database fresh, like a new host process would. A
//! detached deferrer never fires, so everything that happens between launches
//! is driven by the persisted timer anchors.

use std::path::Path;

use onboard_core::storage::keys;
use onboard_core::tour::{RecordingNotifier, RecordingPresenter, Resolution};
use onboard_core::{
    Config, Database, DetachedDeferrer, ManualClock, Persisted, SessionCoordinator, StateStore,
    TimerKind, TourEvent, TourState,
};

const T0: u64 = 1_700_000_000_000;
const HOUR: u64 = 3_600_000;
const DAY: u64 = 24 * HOUR;

type Host = SessionCoordinator<Database, DetachedDeferrer, ManualClock>;

fn open(path: &Path, clock: &ManualClock, presenter: &RecordingPresenter) -> Host {
    SessionCoordinator::new(
        Database::open_at(path).unwrap(),
        DetachedDeferrer::default(),
        clock.clone(),
        &Config::default(),
        Box::new(presenter.clone()),
        Box::new(RecordingNotifier::new()),
    )
}

fn has_event(events: &[TourEvent], pred: impl Fn(&TourEvent) -> bool) -> bool {
    events.iter().any(pred)
}

#[test]
fn tour_progresses_across_process_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("onboard.db");
    let clock = ManualClock::new(T0);
    let presenter = RecordingPresenter::new();

    // Day 0: first launch shows step 0.
    open(&path, &clock, &presenter).on_launch().unwrap();
    assert_eq!(presenter.last_shown().unwrap().step, 0);

    // Three hours later: same snippet, exact remainder.
    clock.advance(3 * HOUR);
    let host = open(&path, &clock, &presenter);
    let status = host.status().unwrap();
    let timer = status.timer.unwrap();
    assert_eq!(timer.kind, TimerKind::Duration);
    assert_eq!(timer.remaining_ms, DAY - 3 * HOUR);
    assert!(!timer.scheduled);

    // Next day: the duration ran out while the host was down.
    clock.set(T0 + DAY + HOUR);
    let events = open(&path, &clock, &presenter).on_launch().unwrap();
    assert!(has_event(&events, |e| matches!(
        e,
        TourEvent::TimerOverdue {
            kind: TimerKind::Duration,
            overdue_ms: HOUR,
            ..
        }
    )));
    assert!(has_event(&events, |e| matches!(
        e,
        TourEvent::StepFinished {
            step: 0,
            resolution: Resolution::Expired,
            ..
        }
    )));

    // Interval elapses while down: step 1 appears on launch.
    clock.set(T0 + 2 * DAY + 2 * HOUR);
    open(&path, &clock, &presenter).on_launch().unwrap();
    assert_eq!(presenter.last_shown().unwrap().step, 1);

    // A separate one-shot process records the click.
    let mut host = open(&path, &clock, &presenter);
    host.on_cta_complete().unwrap();
    let db = host.into_store();
    assert_eq!(db.get(keys::STEP).unwrap(), Persisted::Present(2));
    assert_eq!(db.get(keys::MISSED_SNIPPETS).unwrap(), Persisted::Present(vec![0]));
    assert!(db.get(keys::INTERVAL_TIMER_START).unwrap().is_present());
    assert!(db.get(keys::DURATION_TIMER_START).unwrap().is_absent());
}

#[test]
fn reset_clears_the_database() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("onboard.db");
    let clock = ManualClock::new(T0);
    let presenter = RecordingPresenter::new();

    open(&path, &clock, &presenter).on_launch().unwrap();
    let mut host = open(&path, &clock, &presenter);
    host.reset().unwrap();
    assert_eq!(host.store().key_count().unwrap(), 0);

    let host = open(&path, &clock, &presenter);
    assert_eq!(host.status().unwrap().state, TourState::NotStarted);
}

#[test]
fn failed_presentation_leaves_disk_state_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("onboard.db");
    let clock = ManualClock::new(T0);
    let presenter = RecordingPresenter::new();

    open(&path, &clock, &presenter).on_launch().unwrap();
    open(&path, &clock, &presenter).on_cta_complete().unwrap();

    clock.advance(DAY);
    presenter.fail_with(Some("window closed"));
    assert!(open(&path, &clock, &presenter).on_launch().is_err());

    let host = open(&path, &clock, &presenter);
    let status = host.status().unwrap();
    assert_eq!(status.step, Some(1));
    assert_eq!(status.timer.map(|t| t.kind), Some(TimerKind::Interval));
    assert!(!status.state.is_presenting());
}
