//! Per-launch entry point and event dispatcher.
//!
//! Every public call runs as one event: engine, scheduler and gate write into
//! a shared [`StateTxn`], the batch is applied once at the end, and only then
//! does the scheduler touch the physical timer. If anything fails the store is
//! left as it was and the staged timer change is dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{
    NotificationGate, Notifier, Presenter, Progress, ProgressionEngine, TimerIntent, TourState,
};
use crate::clock::Clock;
use crate::error::{CoreError, Result};
use crate::events::TourEvent;
use crate::storage::{keys, Config, StateStore, StateTxn, TimersConfig};
use crate::timer::{Deferrer, ResumeOutcome, TimerKind, TimerScheduler, TimerTicket};

/// The timer a status report sees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerStatus {
    pub kind: TimerKind,
    pub started_at_ms: u64,
    pub remaining_ms: u64,
    /// A physical timer is running in this process. When false the value
    /// comes from the persisted anchor and resumes on the next launch.
    pub scheduled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TourStatus {
    pub state: TourState,
    pub step: Option<u32>,
    pub last_step: u32,
    pub timer: Option<TimerStatus>,
    pub missed: Vec<u32>,
    pub install_time_ms: Option<u64>,
}

pub struct SessionCoordinator<S: StateStore, D: Deferrer, C: Clock> {
    store: S,
    scheduler: TimerScheduler<D, C>,
    engine: ProgressionEngine,
    gate: NotificationGate,
    timers: TimersConfig,
    presenter: Box<dyn Presenter>,
    notifier: Box<dyn Notifier>,
}

impl<S: StateStore, D: Deferrer, C: Clock> SessionCoordinator<S, D, C> {
    pub fn new(
        store: S,
        deferrer: D,
        clock: C,
        config: &Config,
        presenter: Box<dyn Presenter>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            scheduler: TimerScheduler::new(deferrer, clock, config.timers.resume_threshold_ms),
            engine: ProgressionEngine::from_config(&config.tour, config.timers.destroy_grace_ms),
            gate: NotificationGate::new(config.notifications.enabled),
            timers: config.timers.clone(),
            presenter,
            notifier,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn scheduler(&self) -> &TimerScheduler<D, C> {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut TimerScheduler<D, C> {
        &mut self.scheduler
    }

    pub fn engine(&self) -> &ProgressionEngine {
        &self.engine
    }

    // ── Host events ──────────────────────────────────────────────────

    /// The host process started.
    pub fn on_launch(&mut self) -> Result<Vec<TourEvent>> {
        self.dispatch(|scope| scope.launch())
    }

    /// The user completed the primary action of the snippet on screen.
    pub fn on_cta_complete(&mut self) -> Result<Vec<TourEvent>> {
        self.dispatch(|scope| {
            let progress = scope.engine.record_cta_complete(&mut scope.txn)?;
            scope.after_progress(progress)
        })
    }

    /// The user closed the snippet on screen.
    pub fn on_dismiss(&mut self) -> Result<Vec<TourEvent>> {
        self.dispatch(|scope| {
            let progress = scope.engine.record_dismiss(&mut scope.txn)?;
            scope.after_progress(progress)
        })
    }

    /// A new host session started without a process restart.
    pub fn on_session_boundary(&mut self) -> Result<Vec<TourEvent>> {
        self.dispatch(|scope| {
            let progress = scope.engine.on_session_boundary(&mut scope.txn)?;
            scope.after_progress(progress)
        })
    }

    /// A ticket from the deferrer came due.
    pub fn on_timer_fired(&mut self, ticket: TimerTicket) -> Result<Vec<TourEvent>> {
        if !self.scheduler.accept(ticket) {
            return Ok(vec![TourEvent::StaleTimerIgnored {
                kind: ticket.kind,
                generation: ticket.generation,
                at: event_time(self.scheduler.now_ms()),
            }]);
        }
        let result = self.dispatch(|scope| scope.fire(ticket.kind));
        if let Err(e) = &result {
            tracing::error!(kind = %ticket.kind, error = %e, "timer action failed, will resume on next launch");
        }
        result
    }

    /// Forget the tour and cancel any timer.
    pub fn reset(&mut self) -> Result<Vec<TourEvent>> {
        self.dispatch(|scope| {
            scope.engine.reset_all(&mut scope.txn);
            scope.scheduler.disarm(&mut scope.txn);
            let at = scope.at();
            scope.emit(TourEvent::TourReset { at });
            Ok(())
        })
    }

    pub fn status(&self) -> Result<TourStatus> {
        let txn = StateTxn::new(&self.store);
        let now = self.scheduler.now_ms();

        let timer = match self.scheduler.armed() {
            Some(armed) => Some(TimerStatus {
                kind: armed.kind,
                started_at_ms: armed.started_at_ms,
                remaining_ms: armed.due_at_ms().saturating_sub(now),
                scheduled: true,
            }),
            None => self
                .scheduler
                .current_anchor(&txn)?
                .map(|(kind, started_at_ms)| TimerStatus {
                    kind,
                    started_at_ms,
                    remaining_ms: self
                        .timers
                        .nominal_ms(kind)
                        .saturating_sub(now.saturating_sub(started_at_ms)),
                    scheduled: false,
                }),
        };

        Ok(TourStatus {
            state: self.engine.state(&txn)?,
            step: txn.get(keys::STEP)?.present(),
            last_step: self.engine.last_step(),
            timer,
            missed: txn.get(keys::MISSED_SNIPPETS)?.unwrap_or_default(),
            install_time_ms: txn.get(keys::INSTALL_TIME)?.present(),
        })
    }

    fn dispatch(
        &mut self,
        f: impl FnOnce(&mut EventScope<'_, S, D, C>) -> Result<()>,
    ) -> Result<Vec<TourEvent>> {
        let staged = {
            let mut scope = EventScope {
                txn: StateTxn::new(&self.store),
                scheduler: &mut self.scheduler,
                engine: &self.engine,
                gate: self.gate,
                timers: &self.timers,
                presenter: &mut self.presenter,
                notifier: &mut self.notifier,
                events: Vec::new(),
            };
            match f(&mut scope) {
                Ok(()) => Ok((scope.txn.into_batch(), scope.events)),
                Err(e) => Err(e),
            }
        };

        let (batch, events) = match staged {
            Ok(staged) => staged,
            Err(e) => {
                self.scheduler.rollback();
                return Err(e);
            }
        };

        if let Err(e) = self.store.apply(&batch) {
            tracing::error!(error = %e, "failed to persist tour state");
            self.scheduler.rollback();
            return Err(e.into());
        }
        self.scheduler.commit();
        Ok(events)
    }
}

fn event_time(now_ms: u64) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(now_ms as i64).unwrap_or_else(Utc::now)
}

/// Whether a surviving `kind` anchor can have been armed in `state`.
fn anchor_fits(state: &TourState, kind: TimerKind) -> bool {
    match kind {
        TimerKind::Welcome => *state == TourState::NotStarted,
        TimerKind::Duration | TimerKind::Interval => state.is_live(),
        TimerKind::Destroy => *state == TourState::MainComplete,
    }
}

/// Everything one event may touch.
struct EventScope<'a, S: StateStore, D: Deferrer, C: Clock> {
    txn: StateTxn<'a, S>,
    scheduler: &'a mut TimerScheduler<D, C>,
    engine: &'a ProgressionEngine,
    gate: NotificationGate,
    timers: &'a TimersConfig,
    presenter: &'a mut Box<dyn Presenter>,
    notifier: &'a mut Box<dyn Notifier>,
    events: Vec<TourEvent>,
}

impl<S: StateStore, D: Deferrer, C: Clock> EventScope<'_, S, D, C> {
    fn at(&self) -> DateTime<Utc> {
        event_time(self.scheduler.now_ms())
    }

    fn emit(&mut self, event: TourEvent) {
        self.events.push(event);
    }

    fn launch(&mut self) -> Result<()> {
        let state = self.engine.state(&self.txn)?;
        if state == TourState::EndOfLife {
            tracing::debug!("tour already retired");
            return Ok(());
        }

        let now = self.scheduler.now_ms();
        if self.engine.record_install(&mut self.txn, now)? {
            let at = self.at();
            self.emit(TourEvent::Installed { at });
        }

        let anchor = self.scheduler.reconcile(&mut self.txn)?.map(|(kind, _)| kind);
        match anchor {
            None if state == TourState::NotStarted => self.begin_tour(),
            None => self.recover(),
            Some(kind) if anchor_fits(&state, kind) => self.resume(kind),
            Some(kind) => self.drop_orphan(kind),
        }
    }

    /// An anchor that cannot belong to the current state: clear it and
    /// fall back to missing-state recovery.
    fn drop_orphan(&mut self, kind: TimerKind) -> Result<()> {
        let state = self.engine.state(&self.txn)?;
        tracing::warn!(%kind, %state, "clearing timer anchor left over from another state");
        self.apply_intent(TimerIntent::Disarm)?;
        self.recover()
    }

    fn resume(&mut self, kind: TimerKind) -> Result<()> {
        let nominal_ms = self.timers.nominal_ms(kind);
        match self.scheduler.resume(&mut self.txn, kind, nominal_ms)? {
            ResumeOutcome::FireNow { overdue_ms } => {
                let at = self.at();
                self.emit(TourEvent::TimerOverdue {
                    kind,
                    overdue_ms,
                    at,
                });
                self.fire(kind)
            }
            ResumeOutcome::Armed { remaining_ms } => {
                let at = self.at();
                self.emit(TourEvent::TimerArmed {
                    kind,
                    delay_ms: remaining_ms,
                    resumed: true,
                    at,
                });
                if kind == TimerKind::Duration {
                    self.new_session()?;
                }
                Ok(())
            }
            ResumeOutcome::NoAnchor => self.recover(),
        }
    }

    /// A launch while a snippet is up counts toward the session cap; if the
    /// cap is not hit the snippet is shown again.
    fn new_session(&mut self) -> Result<()> {
        if !self.engine.state(&self.txn)?.is_presenting() {
            return self.recover();
        }
        let progress = self.engine.on_session_boundary(&mut self.txn)?;
        if progress.finished.is_some() {
            return self.after_progress(progress);
        }
        self.present()
    }

    /// Run the action bound to `kind`.
    fn fire(&mut self, kind: TimerKind) -> Result<()> {
        tracing::info!(%kind, "timer fired");
        let state = self.engine.state(&self.txn)?;
        match kind {
            TimerKind::Welcome if state == TourState::NotStarted => self.enter_first_step(),
            TimerKind::Duration if state.is_presenting() => {
                let progress = self.engine.expire_step(&mut self.txn)?;
                self.after_progress(progress)
            }
            TimerKind::Interval if state.is_live() => self.start_cycle(),
            TimerKind::Destroy if state == TourState::MainComplete => {
                let intent = self.engine.retire(&mut self.txn)?;
                self.after_progress(ProgressionEngine::idle(intent))
            }
            _ => {
                tracing::warn!(%kind, %state, "timer does not match tour state");
                self.recover()
            }
        }
    }

    fn begin_tour(&mut self) -> Result<()> {
        if self.timers.first_step_delay_ms > 0 {
            self.apply_intent(TimerIntent::Arm(TimerKind::Welcome))
        } else {
            self.enter_first_step()
        }
    }

    fn enter_first_step(&mut self) -> Result<()> {
        let intent = self.engine.enter_first_step(&mut self.txn)?;
        self.gate.rearm(&mut self.txn);
        self.present()?;
        self.apply_intent(intent)
    }

    /// Interval elapsed: show the next snippet and start its duration.
    fn start_cycle(&mut self) -> Result<()> {
        self.engine.reset_presentation_state(&mut self.txn);
        self.gate.rearm(&mut self.txn);
        self.present()?;
        self.apply_intent(TimerIntent::Arm(TimerKind::Duration))
    }

    fn present(&mut self) -> Result<()> {
        let snippet = self.engine.begin_presentation(&mut self.txn)?;
        self.presenter
            .present(&snippet)
            .map_err(|e| CoreError::Presentation {
                step: snippet.step,
                message: e.to_string(),
            })?;
        tracing::info!(
            step = snippet.step,
            topic = %snippet.topic,
            replay = snippet.replay,
            impression = snippet.impression,
            "snippet presented"
        );

        let notified = self
            .gate
            .notify_once(&mut self.txn, &snippet, &mut **self.notifier)?;
        let at = self.at();
        if notified {
            self.emit(TourEvent::NotificationShown {
                step: snippet.step,
                at,
            });
        }
        self.emit(TourEvent::SnippetPresented { snippet, at });
        Ok(())
    }

    /// Missing-state recovery: act as if no timer had been armed.
    fn recover(&mut self) -> Result<()> {
        let state = self.engine.state(&self.txn)?;
        match state {
            TourState::NotStarted => self.begin_tour(),
            TourState::EndOfLife => self.apply_intent(TimerIntent::Disarm),
            TourState::MainComplete => {
                tracing::warn!("main tour complete without a timer, checking end of life");
                let at = self.at();
                self.emit(TourEvent::StateRecovered { state, at });
                let intent = self.engine.check_end_of_life(&mut self.txn)?;
                self.after_progress(ProgressionEngine::idle(intent))
            }
            TourState::StepActive { .. } | TourState::ReplayingMissed { .. } => {
                tracing::warn!(%state, "live tour without a timer, presenting again");
                let at = self.at();
                self.emit(TourEvent::StateRecovered { state, at });
                self.start_cycle()
            }
        }
    }

    fn after_progress(&mut self, progress: Progress) -> Result<()> {
        let at = self.at();
        if let Some(finished) = progress.finished {
            self.emit(TourEvent::StepFinished {
                step: finished.step,
                resolution: finished.resolution,
                replay: finished.replay,
                at,
            });
        }
        if progress.main_completed {
            self.emit(TourEvent::MainTourCompleted { at });
        }
        self.apply_intent(progress.intent)?;

        if self.engine.state(&self.txn)? == TourState::EndOfLife {
            if let Err(e) = self.presenter.retire() {
                tracing::warn!(error = %e, "presenter failed to retire");
            }
            self.emit(TourEvent::TourRetired { at });
        }
        Ok(())
    }

    fn apply_intent(&mut self, intent: TimerIntent) -> Result<()> {
        match intent {
            TimerIntent::Keep => {}
            TimerIntent::Arm(kind) => {
                let delay_ms = self.timers.nominal_ms(kind);
                self.scheduler.arm(&mut self.txn, kind, delay_ms)?;
                let at = self.at();
                self.emit(TourEvent::TimerArmed {
                    kind,
                    delay_ms,
                    resumed: false,
                    at,
                });
            }
            TimerIntent::Disarm => {
                self.scheduler.disarm(&mut self.txn);
                let at = self.at();
                self.emit(TourEvent::TimerDisarmed { at });
            }
        }
        Ok(())
    }
}
