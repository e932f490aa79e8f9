//! Step progression state machine.
//!
//! The engine owns the step, completion flags and the missed backlog. It never
//! touches timers directly: every operation returns a [`TimerIntent`] that the
//! coordinator hands to the scheduler inside the same transaction.
//!
//! ```text
//! NotStarted -> StepActive(0) -> ... -> StepActive(last) -> MainComplete/ReplayingMissed -> EndOfLife
//! ```

use serde::{Deserialize, Serialize};

use super::{Snippet, TourState};
use crate::error::{CoreError, Result, StoreError};
use crate::storage::{keys, StateStore, StateTxn, TourConfig};
use crate::timer::TimerKind;

/// What the scheduler should do after an engine operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "intent", content = "kind", rename_all = "snake_case")]
pub enum TimerIntent {
    Keep,
    Arm(TimerKind),
    Disarm,
}

/// How a presented step ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    Completed,
    Dismissed,
    /// Timed out, or the session cap was reached.
    Expired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinishedStep {
    pub step: u32,
    pub resolution: Resolution,
    pub replay: bool,
}

/// Result of a progress attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    pub intent: TimerIntent,
    /// `None` when nothing was in progress and the call was a no-op.
    pub finished: Option<FinishedStep>,
    /// This call finished the main sequence.
    pub main_completed: bool,
}

impl Progress {
    fn noop() -> Self {
        Self {
            intent: TimerIntent::Keep,
            finished: None,
            main_completed: false,
        }
    }

    fn intent(intent: TimerIntent) -> Self {
        Self {
            intent,
            finished: None,
            main_completed: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    topics: Vec<String>,
    session_cap: u32,
    destroy_grace: bool,
}

impl ProgressionEngine {
    /// `destroy_grace` arms a destroy timer at end of life instead of retiring at once.
    pub fn new(topics: Vec<String>, session_cap: u32, destroy_grace: bool) -> Self {
        Self {
            topics,
            session_cap: session_cap.max(1),
            destroy_grace,
        }
    }

    pub fn from_config(tour: &TourConfig, destroy_grace_ms: u64) -> Self {
        Self::new(tour.topics(), tour.session_cap, destroy_grace_ms > 0)
    }

    pub fn last_step(&self) -> u32 {
        (self.topics.len() as u32).saturating_sub(1)
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn state<S: StateStore>(&self, txn: &StateTxn<'_, S>) -> Result<TourState, StoreError> {
        TourState::read(txn)
    }

    // ── Entering and presenting ──────────────────────────────────────

    /// Record the first launch ever. Returns `true` if this call recorded it.
    pub fn record_install<S: StateStore>(
        &self,
        txn: &mut StateTxn<'_, S>,
        now_ms: u64,
    ) -> Result<bool, StoreError> {
        if txn.get(keys::INSTALL_TIME)?.is_present() {
            return Ok(false);
        }
        txn.set(keys::INSTALL_TIME, &now_ms)?;
        Ok(true)
    }

    /// Move from `NotStarted` to step 0.
    pub fn enter_first_step<S: StateStore>(
        &self,
        txn: &mut StateTxn<'_, S>,
    ) -> Result<TimerIntent> {
        let state = self.state(txn)?;
        if state != TourState::NotStarted {
            return Err(CoreError::InvalidTransition {
                operation: "enter first step",
                state,
            });
        }
        txn.set(keys::STEP, &0)?;
        txn.set(keys::SESSION_COUNTER, &1)?;
        tracing::info!("tour started");
        Ok(TimerIntent::Arm(TimerKind::Duration))
    }

    /// Mark the current step (or backlog head) as on screen and build its snippet.
    pub fn begin_presentation<S: StateStore>(
        &self,
        txn: &mut StateTxn<'_, S>,
    ) -> Result<Snippet> {
        let (step, replay) = match self.state(txn)? {
            TourState::StepActive { step, .. } => (step, false),
            TourState::ReplayingMissed { head, .. } => (head, true),
            state => {
                return Err(CoreError::InvalidTransition {
                    operation: "present",
                    state,
                })
            }
        };

        let impression = txn.get(keys::IMPRESSION_COUNT)?.unwrap_or(0) + 1;
        txn.set(keys::IMPRESSION_COUNT, &impression)?;
        txn.set(keys::SNIPPET_IN_PROGRESS, &true)?;
        if txn.get(keys::SESSION_COUNTER)?.is_absent() {
            txn.set(keys::SESSION_COUNTER, &1)?;
        }
        Ok(Snippet::new(step, &self.topics, replay, impression))
    }

    // ── User responses ───────────────────────────────────────────────

    pub fn record_cta_complete<S: StateStore>(
        &self,
        txn: &mut StateTxn<'_, S>,
    ) -> Result<Progress> {
        self.require_presenting(txn, "complete")?;
        txn.set(keys::MAIN_CTA_COMPLETE, &true)?;
        self.progress(txn, Resolution::Completed)
    }

    pub fn record_dismiss<S: StateStore>(&self, txn: &mut StateTxn<'_, S>) -> Result<Progress> {
        self.require_presenting(txn, "dismiss")?;
        txn.set(keys::SNIPPET_DISMISSED, &true)?;
        self.progress(txn, Resolution::Dismissed)
    }

    fn require_presenting<S: StateStore>(
        &self,
        txn: &StateTxn<'_, S>,
        operation: &'static str,
    ) -> Result<()> {
        let state = self.state(txn)?;
        if state.is_presenting() {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition { operation, state })
        }
    }

    /// Time ran out on the current snippet.
    pub fn expire_step<S: StateStore>(&self, txn: &mut StateTxn<'_, S>) -> Result<Progress> {
        if txn.get(keys::SNIPPET_IN_PROGRESS)?.is_absent() {
            return Ok(Progress::noop());
        }
        txn.set(keys::IMPRESSION_COUNT, &0)?;
        self.progress(txn, Resolution::Expired)
    }

    /// Count a new host session against the current snippet.
    ///
    /// When the counter already sits at the cap it restarts at 1 and the step
    /// expires. Sessions only count while a snippet is on screen.
    pub fn on_session_boundary<S: StateStore>(
        &self,
        txn: &mut StateTxn<'_, S>,
    ) -> Result<Progress> {
        if !self.state(txn)?.is_presenting() {
            return Ok(Progress::noop());
        }
        match txn.get(keys::SESSION_COUNTER)?.present() {
            Some(count) if count >= self.session_cap => {
                tracing::info!(count, cap = self.session_cap, "session cap reached");
                txn.set(keys::SESSION_COUNTER, &1)?;
                self.expire_step(txn)
            }
            Some(count) => {
                txn.set(keys::SESSION_COUNTER, &(count + 1))?;
                Ok(Progress::noop())
            }
            None => {
                txn.set(keys::SESSION_COUNTER, &1)?;
                Ok(Progress::noop())
            }
        }
    }

    // ── Progression ──────────────────────────────────────────────────

    /// Finish whatever is on screen: the main sequence advances, a replay
    /// consumes the backlog head.
    pub fn progress<S: StateStore>(
        &self,
        txn: &mut StateTxn<'_, S>,
        resolution: Resolution,
    ) -> Result<Progress> {
        if txn.get(keys::MAIN_TOUR_COMPLETE)?.is_true() {
            self.replay_next(txn, resolution)
        } else {
            self.advance(txn, resolution)
        }
    }

    /// Leave the current main-sequence step.
    ///
    /// A no-op unless a snippet is in progress, so a second call for the same
    /// step changes nothing.
    pub fn advance<S: StateStore>(
        &self,
        txn: &mut StateTxn<'_, S>,
        resolution: Resolution,
    ) -> Result<Progress> {
        if txn.get(keys::SNIPPET_IN_PROGRESS)?.is_absent() {
            return Ok(Progress::noop());
        }
        let Some(step) = txn.get(keys::STEP)?.present() else {
            return Ok(Progress::noop());
        };
        txn.clear(keys::SNIPPET_IN_PROGRESS);

        let completed = txn.get(keys::MAIN_CTA_COMPLETE)?.is_true();
        let dismissed = txn.get(keys::SNIPPET_DISMISSED)?.is_true();
        let main_complete = txn.get(keys::MAIN_TOUR_COMPLETE)?.is_true();
        if !completed && !dismissed && !main_complete {
            let mut missed = txn.get(keys::MISSED_SNIPPETS)?.unwrap_or_default();
            if !missed.contains(&step) {
                missed.push(step);
                txn.set(keys::MISSED_SNIPPETS, &missed)?;
            }
        }

        let finished = Some(FinishedStep {
            step,
            resolution,
            replay: false,
        });

        if step < self.last_step() {
            txn.set(keys::STEP, &(step + 1))?;
            tracing::info!(from = step, to = step + 1, ?resolution, "step advanced");
            return Ok(Progress {
                intent: TimerIntent::Arm(TimerKind::Interval),
                finished,
                main_completed: false,
            });
        }

        txn.set(keys::MAIN_TOUR_COMPLETE, &true)?;
        tracing::info!(step, ?resolution, "main tour complete");
        let intent = self.check_end_of_life(txn)?;
        Ok(Progress {
            intent,
            finished,
            main_completed: true,
        })
    }

    /// Decide what follows the main sequence.
    pub fn check_end_of_life<S: StateStore>(
        &self,
        txn: &mut StateTxn<'_, S>,
    ) -> Result<TimerIntent> {
        let missed = txn.get(keys::MISSED_SNIPPETS)?.unwrap_or_default();
        if !missed.is_empty() {
            tracing::debug!(backlog = missed.len(), "replaying missed steps");
            return Ok(TimerIntent::Arm(TimerKind::Interval));
        }
        if self.destroy_grace {
            return Ok(TimerIntent::Arm(TimerKind::Destroy));
        }
        self.retire(txn)
    }

    /// Consume the backlog head that was on screen.
    pub fn replay_next<S: StateStore>(
        &self,
        txn: &mut StateTxn<'_, S>,
        resolution: Resolution,
    ) -> Result<Progress> {
        if txn.get(keys::SNIPPET_IN_PROGRESS)?.is_absent() {
            return Ok(Progress::noop());
        }
        txn.clear(keys::SNIPPET_IN_PROGRESS);

        let mut missed = txn.get(keys::MISSED_SNIPPETS)?.unwrap_or_default();
        let finished = if missed.is_empty() {
            None
        } else {
            let step = missed.remove(0);
            txn.set(keys::MISSED_SNIPPETS, &missed)?;
            tracing::info!(step, remaining = missed.len(), ?resolution, "missed step replayed");
            Some(FinishedStep {
                step,
                resolution,
                replay: true,
            })
        };

        Ok(Progress {
            intent: self.check_end_of_life(txn)?,
            finished,
            main_completed: false,
        })
    }

    /// Set the end-of-life flag.
    pub fn retire<S: StateStore>(&self, txn: &mut StateTxn<'_, S>) -> Result<TimerIntent> {
        txn.set(keys::DESTROY_ADDON, &true)?;
        tracing::info!("tour retired");
        Ok(TimerIntent::Disarm)
    }

    /// Start a fresh presentation cycle.
    pub fn reset_presentation_state<S: StateStore>(&self, txn: &mut StateTxn<'_, S>) {
        txn.clear(keys::SNIPPET_IN_PROGRESS);
        txn.clear(keys::MAIN_CTA_COMPLETE);
        txn.clear(keys::SNIPPET_DISMISSED);
        txn.clear(keys::SESSION_COUNTER);
        txn.clear(keys::IMPRESSION_COUNT);
    }

    /// Forget the whole tour, including the install time.
    pub fn reset_all<S: StateStore>(&self, txn: &mut StateTxn<'_, S>) {
        for name in keys::ALL {
            txn.clear_name(name);
        }
        tracing::info!("tour state reset");
    }

    /// Wrap an intent that did not finish any step.
    pub fn idle(intent: TimerIntent) -> Progress {
        Progress::intent(intent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, Persisted};

    fn engine() -> ProgressionEngine {
        ProgressionEngine::from_config(&TourConfig::default(), 0)
    }

    /// Run `f` in a transaction and apply it.
    fn with_txn<R>(store: &mut MemoryStore, f: impl FnOnce(&mut StateTxn<'_, MemoryStore>) -> R) -> R {
        let mut txn = StateTxn::new(&*store);
        let out = f(&mut txn);
        let batch = txn.into_batch();
        store.apply(&batch).unwrap();
        out
    }

    fn present(store: &mut MemoryStore, e: &ProgressionEngine) -> Snippet {
        with_txn(store, |t| {
            e.reset_presentation_state(t);
            e.begin_presentation(t).unwrap()
        })
    }

    fn started() -> (MemoryStore, ProgressionEngine) {
        let e = engine();
        let mut store = MemoryStore::new();
        with_txn(&mut store, |t| e.enter_first_step(t).unwrap());
        present(&mut store, &e);
        (store, e)
    }

    fn missed(store: &MemoryStore) -> Vec<u32> {
        store.get(keys::MISSED_SNIPPETS).unwrap().unwrap_or_default()
    }

    #[test]
    fn enter_first_step_arms_duration() {
        let e = engine();
        let mut store = MemoryStore::new();
        let intent = with_txn(&mut store, |t| e.enter_first_step(t).unwrap());
        assert_eq!(intent, TimerIntent::Arm(TimerKind::Duration));
        assert_eq!(store.get(keys::STEP).unwrap(), Persisted::Present(0));
        assert_eq!(store.get(keys::SESSION_COUNTER).unwrap(), Persisted::Present(1));

        let err = with_txn(&mut store, |t| e.enter_first_step(t).unwrap_err());
        assert!(matches!(err, CoreError::InvalidTransition { .. }));
    }

    #[test]
    fn presentation_counts_impressions() {
        let (mut store, e) = started();
        let again = with_txn(&mut store, |t| e.begin_presentation(t).unwrap());
        assert_eq!(again.impression, 2);
        assert_eq!(again.topic, "sync");
        assert!(!again.replay);
    }

    #[test]
    fn cta_advances_without_missing() {
        let (mut store, e) = started();
        let p = with_txn(&mut store, |t| e.record_cta_complete(t).unwrap());
        assert_eq!(p.intent, TimerIntent::Arm(TimerKind::Interval));
        assert_eq!(
            p.finished,
            Some(FinishedStep {
                step: 0,
                resolution: Resolution::Completed,
                replay: false
            })
        );
        assert_eq!(store.get(keys::STEP).unwrap(), Persisted::Present(1));
        assert!(missed(&store).is_empty());
    }

    #[test]
    fn expiry_records_missed_step() {
        let (mut store, e) = started();
        with_txn(&mut store, |t| e.expire_step(t).unwrap());
        assert_eq!(missed(&store), vec![0]);
        assert_eq!(store.get(keys::IMPRESSION_COUNT).unwrap(), Persisted::Present(0));
    }

    #[test]
    fn double_advance_is_idempotent() {
        let (mut store, e) = started();
        let first = with_txn(&mut store, |t| e.advance(t, Resolution::Expired).unwrap());
        let second = with_txn(&mut store, |t| e.advance(t, Resolution::Expired).unwrap());
        assert!(first.finished.is_some());
        assert_eq!(second, Progress::noop());
        assert_eq!(store.get(keys::STEP).unwrap(), Persisted::Present(1));
        assert_eq!(missed(&store), vec![0]);
    }

    #[test]
    fn cta_without_snippet_is_rejected() {
        let e = engine();
        let mut store = MemoryStore::new();
        store.set(keys::STEP, &2).unwrap();
        let err = with_txn(&mut store, |t| e.record_cta_complete(t).unwrap_err());
        assert!(matches!(
            err,
            CoreError::InvalidTransition {
                operation: "complete",
                ..
            }
        ));
        assert!(store.get(keys::MAIN_CTA_COMPLETE).unwrap().is_absent());
    }

    #[test]
    fn session_cap_forces_progress_on_third_boundary() {
        let e = engine();
        let mut store = MemoryStore::new();
        store.set(keys::STEP, &1).unwrap();
        present(&mut store, &e);

        for _ in 0..2 {
            let p = with_txn(&mut store, |t| e.on_session_boundary(t).unwrap());
            assert!(p.finished.is_none());
        }
        let p = with_txn(&mut store, |t| e.on_session_boundary(t).unwrap());
        assert_eq!(p.finished.map(|f| f.resolution), Some(Resolution::Expired));
        assert_eq!(store.get(keys::STEP).unwrap(), Persisted::Present(2));
        assert_eq!(missed(&store), vec![1]);
        assert_eq!(store.get(keys::SESSION_COUNTER).unwrap(), Persisted::Present(1));

        // No longer presenting, so further boundaries do nothing.
        let p = with_txn(&mut store, |t| e.on_session_boundary(t).unwrap());
        assert_eq!(p, Progress::noop());
    }

    #[test]
    fn missed_steps_replay_in_fifo_order() {
        let e = engine();
        let mut store = MemoryStore::new();
        with_txn(&mut store, |t| e.enter_first_step(t).unwrap());

        // Miss 1 and 3, complete the rest.
        for step in 0..=5 {
            present(&mut store, &e);
            if step == 1 || step == 3 {
                with_txn(&mut store, |t| e.expire_step(t).unwrap());
            } else {
                with_txn(&mut store, |t| e.record_dismiss(t).unwrap());
            }
        }
        assert_eq!(missed(&store), vec![1, 3]);

        let mut replayed = Vec::new();
        loop {
            let state = with_txn(&mut store, |t| e.state(t).unwrap());
            if state == TourState::EndOfLife {
                break;
            }
            let snippet = present(&mut store, &e);
            assert!(snippet.replay);
            replayed.push(snippet.step);
            // Replays that time out are not queued again.
            with_txn(&mut store, |t| e.expire_step(t).unwrap());
        }
        assert_eq!(replayed, vec![1, 3]);
        assert!(store.get(keys::DESTROY_ADDON).unwrap().is_true());
    }

    #[test]
    fn end_of_life_after_last_step() {
        let (mut store, e) = started();
        for _ in 0..5 {
            with_txn(&mut store, |t| e.record_cta_complete(t).unwrap());
            present(&mut store, &e);
        }
        assert_eq!(store.get(keys::STEP).unwrap(), Persisted::Present(5));

        let p = with_txn(&mut store, |t| e.record_cta_complete(t).unwrap());
        assert!(p.main_completed);
        assert_eq!(p.intent, TimerIntent::Disarm);
        assert_eq!(with_txn(&mut store, |t| e.state(t).unwrap()), TourState::EndOfLife);
    }

    #[test]
    fn destroy_grace_arms_destroy_timer() {
        let e = ProgressionEngine::new(vec!["only".into()], 3, true);
        let mut store = MemoryStore::new();
        with_txn(&mut store, |t| e.enter_first_step(t).unwrap());
        present(&mut store, &e);

        let p = with_txn(&mut store, |t| e.record_cta_complete(t).unwrap());
        assert_eq!(p.intent, TimerIntent::Arm(TimerKind::Destroy));
        assert_eq!(with_txn(&mut store, |t| e.state(t).unwrap()), TourState::MainComplete);
    }

    #[test]
    fn reset_all_returns_to_not_started() {
        let (mut store, e) = started();
        with_txn(&mut store, |t| e.record_install(t, 42).unwrap());
        with_txn(&mut store, |t| e.reset_all(t));
        assert!(store.is_empty());
        assert_eq!(with_txn(&mut store, |t| e.state(t).unwrap()), TourState::NotStarted);
    }

    #[test]
    fn install_time_is_recorded_once() {
        let e = engine();
        let mut store = MemoryStore::new();
        assert!(with_txn(&mut store, |t| e.record_install(t, 10).unwrap()));
        assert!(!with_txn(&mut store, |t| e.record_install(t, 20).unwrap()));
        assert_eq!(store.get(keys::INSTALL_TIME).unwrap(), Persisted::Present(10));
    }
}
