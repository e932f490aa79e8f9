//! Single-slot logical timer.
//!
//! The scheduler owns at most one armed timer. Arming always disarms first,
//! so no two timer actions can ever be pending at once. Each timer's start
//! time is persisted as an anchor; after an unclean restart [`TimerScheduler::resume`]
//! rebuilds the remaining time from that anchor instead of starting over.
//!
//! ## Two-phase changes
//!
//! Anchor writes go into the caller's [`StateTxn`]. The matching physical
//! cancel/arm is staged and only reaches the [`Deferrer`] on
//! [`TimerScheduler::commit`], after the transaction has been applied. If the
//! transaction fails, [`TimerScheduler::rollback`] drops the staged change and
//! the previously armed physical timer keeps running.

use serde::{Deserialize, Serialize};

use super::{DeferHandle, Deferrer, TimerKind, TimerTicket};
use crate::clock::Clock;
use crate::error::StoreError;
use crate::storage::{Persisted, StateStore, StateTxn};

/// The physical timer currently occupying the slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmedTimer {
    pub kind: TimerKind,
    /// Persisted anchor this timer counts from.
    pub started_at_ms: u64,
    /// Delay handed to the deferrer.
    pub delay_ms: u64,
    /// When the physical timer was handed to the deferrer.
    pub armed_at_ms: u64,
    pub generation: u64,
    handle: DeferHandle,
}

impl ArmedTimer {
    /// Wall-clock time the timer is due.
    pub fn due_at_ms(&self) -> u64 {
        self.armed_at_ms.saturating_add(self.delay_ms)
    }
}

/// Result of resuming a timer from its persisted anchor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ResumeOutcome {
    /// The deadline has passed or is within the threshold: run the action now.
    FireNow { overdue_ms: u64 },
    /// A physical timer was staged for the remainder.
    Armed { remaining_ms: u64 },
    /// No anchor is stored for this kind.
    NoAnchor,
}

#[derive(Debug, Clone, Copy)]
struct TimerPlan {
    kind: TimerKind,
    started_at_ms: u64,
    delay_ms: u64,
}

pub struct TimerScheduler<D: Deferrer, C: Clock> {
    deferrer: D,
    clock: C,
    threshold_ms: u64,
    slot: Option<ArmedTimer>,
    /// `Some(None)` = disarm on commit, `Some(Some(plan))` = replace on commit.
    staged: Option<Option<TimerPlan>>,
    next_generation: u64,
}

impl<D: Deferrer, C: Clock> TimerScheduler<D, C> {
    /// `threshold_ms` is the floor below which a resumed timer fires at once.
    pub fn new(deferrer: D, clock: C, threshold_ms: u64) -> Self {
        Self {
            deferrer,
            clock,
            threshold_ms,
            slot: None,
            staged: None,
            next_generation: 1,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }

    pub fn deferrer(&self) -> &D {
        &self.deferrer
    }

    pub fn deferrer_mut(&mut self) -> &mut D {
        &mut self.deferrer
    }

    /// The committed physical timer, if any.
    pub fn armed(&self) -> Option<&ArmedTimer> {
        self.slot.as_ref()
    }

    /// Milliseconds until the committed physical timer is due.
    pub fn remaining_ms(&self) -> Option<u64> {
        let armed = self.slot.as_ref()?;
        Some(armed.due_at_ms().saturating_sub(self.clock.now_ms()))
    }

    /// The persisted anchor with the highest precedence, without changing anything.
    pub fn current_anchor<S: StateStore>(
        &self,
        txn: &StateTxn<'_, S>,
    ) -> Result<Option<(TimerKind, u64)>, StoreError> {
        for kind in TimerKind::BY_PRECEDENCE {
            if let Persisted::Present(start) = txn.get(kind.anchor_key())? {
                return Ok(Some((kind, start)));
            }
        }
        Ok(None)
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Arm a fresh timer of `kind` anchored at now.
    pub fn arm<S: StateStore>(
        &mut self,
        txn: &mut StateTxn<'_, S>,
        kind: TimerKind,
        nominal_ms: u64,
    ) -> Result<(), StoreError> {
        let now = self.clock.now_ms();
        clear_anchors(txn, None);
        txn.set(kind.anchor_key(), &now)?;
        tracing::debug!(%kind, delay_ms = nominal_ms, "arming timer");
        self.staged = Some(Some(TimerPlan {
            kind,
            started_at_ms: now,
            delay_ms: nominal_ms,
        }));
        Ok(())
    }

    /// Arm `kind` for `remaining_ms`, keeping its stored anchor.
    ///
    /// Falls back to anchoring at now if the anchor is missing.
    pub fn arm_remaining<S: StateStore>(
        &mut self,
        txn: &mut StateTxn<'_, S>,
        kind: TimerKind,
        remaining_ms: u64,
    ) -> Result<(), StoreError> {
        let started_at_ms = match txn.get(kind.anchor_key())? {
            Persisted::Present(start) => start,
            Persisted::Absent => {
                let now = self.clock.now_ms();
                txn.set(kind.anchor_key(), &now)?;
                now
            }
        };
        clear_anchors(txn, Some(kind));
        tracing::debug!(%kind, remaining_ms, started_at_ms, "re-arming timer");
        self.staged = Some(Some(TimerPlan {
            kind,
            started_at_ms,
            delay_ms: remaining_ms,
        }));
        Ok(())
    }

    /// Cancel whatever is armed and clear every anchor.
    pub fn disarm<S: StateStore>(&mut self, txn: &mut StateTxn<'_, S>) {
        clear_anchors(txn, None);
        self.staged = Some(None);
    }

    /// Rebuild `kind` from its anchor after a restart.
    ///
    /// `FireNow` leaves the anchor and the slot untouched; the caller runs the
    /// bound action, which arms the next timer or disarms.
    pub fn resume<S: StateStore>(
        &mut self,
        txn: &mut StateTxn<'_, S>,
        kind: TimerKind,
        nominal_ms: u64,
    ) -> Result<ResumeOutcome, StoreError> {
        let started_at_ms = match txn.get(kind.anchor_key())? {
            Persisted::Present(start) => start,
            Persisted::Absent => return Ok(ResumeOutcome::NoAnchor),
        };

        let now = self.clock.now_ms();
        // A start time in the future (clock moved back) counts as no time elapsed.
        let elapsed = now.saturating_sub(started_at_ms);
        let remaining = nominal_ms.saturating_sub(elapsed);

        if remaining <= self.threshold_ms {
            let overdue_ms = elapsed.saturating_sub(nominal_ms);
            tracing::info!(%kind, elapsed, overdue_ms, "timer expired while away");
            return Ok(ResumeOutcome::FireNow { overdue_ms });
        }

        self.arm_remaining(txn, kind, remaining)?;
        tracing::info!(%kind, remaining_ms = remaining, "timer resumed");
        Ok(ResumeOutcome::Armed {
            remaining_ms: remaining,
        })
    }

    /// Keep only the highest-precedence anchor when more than one survived.
    pub fn reconcile<S: StateStore>(
        &mut self,
        txn: &mut StateTxn<'_, S>,
    ) -> Result<Option<(TimerKind, u64)>, StoreError> {
        let mut present = Vec::new();
        for kind in TimerKind::BY_PRECEDENCE {
            if let Persisted::Present(start) = txn.get(kind.anchor_key())? {
                present.push((kind, start));
            }
        }

        let Some(&(keep, start)) = present.first() else {
            return Ok(None);
        };
        if present.len() > 1 {
            let dropped: Vec<TimerKind> = present[1..].iter().map(|(k, _)| *k).collect();
            tracing::warn!(kept = %keep, ?dropped, "multiple timer anchors found");
            clear_anchors(txn, Some(keep));
        }
        Ok(Some((keep, start)))
    }

    /// Claim a fired ticket.
    ///
    /// Returns `false` for stale tickets: ones whose timer was cancelled or
    /// replaced after the ticket was queued.
    pub fn accept(&mut self, ticket: TimerTicket) -> bool {
        match self.slot {
            Some(armed) if armed.generation == ticket.generation && armed.kind == ticket.kind => {
                self.slot = None;
                true
            }
            _ => {
                tracing::debug!(kind = %ticket.kind, generation = ticket.generation, "ignoring stale timer ticket");
                false
            }
        }
    }

    /// Apply the staged physical change after the transaction landed.
    pub fn commit(&mut self) {
        let Some(plan) = self.staged.take() else {
            return;
        };

        if let Some(previous) = self.slot.take() {
            self.deferrer.cancel(previous.handle);
        }

        if let Some(plan) = plan {
            let generation = self.next_generation;
            self.next_generation += 1;
            let handle = self.deferrer.after(
                plan.delay_ms,
                TimerTicket {
                    kind: plan.kind,
                    generation,
                },
            );
            self.slot = Some(ArmedTimer {
                kind: plan.kind,
                started_at_ms: plan.started_at_ms,
                delay_ms: plan.delay_ms,
                armed_at_ms: self.clock.now_ms(),
                generation,
                handle,
            });
        }
    }

    /// Drop the staged physical change; the committed slot is untouched.
    pub fn rollback(&mut self) {
        if self.staged.take().is_some() {
            tracing::debug!("discarding staged timer change");
        }
    }
}

fn clear_anchors<S: StateStore>(txn: &mut StateTxn<'_, S>, keep: Option<TimerKind>) {
    for kind in TimerKind::BY_PRECEDENCE {
        if Some(kind) != keep {
            txn.clear(kind.anchor_key());
        }
    }
}
