//! Deferred execution backends.
//!
//! A [`Deferrer`] schedules a [`TimerTicket`] to be handed back to the host
//! after a delay. It never runs tour logic itself: the host loop receives the
//! ticket and passes it to `SessionCoordinator::on_timer_fired`, which keeps
//! every state change on one call stack.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{TimerKind, TimerTicket};
use crate::clock::{Clock, ManualClock};

/// Opaque handle for a scheduled ticket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeferHandle(pub u64);

pub trait Deferrer {
    /// Deliver `ticket` after `delay_ms`.
    fn after(&mut self, delay_ms: u64, ticket: TimerTicket) -> DeferHandle;

    /// Cancel a scheduled ticket. Unknown or already-fired handles are ignored.
    fn cancel(&mut self, handle: DeferHandle);
}

/// Runs each timer as a tokio task that sends its ticket on a channel.
///
/// Must be used from inside a tokio runtime.
pub struct TokioDeferrer {
    tx: mpsc::UnboundedSender<TimerTicket>,
    tasks: HashMap<u64, JoinHandle<()>>,
    next_id: u64,
}

impl TokioDeferrer {
    /// Create a deferrer and the receiver the host loop should poll.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TimerTicket>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                tasks: HashMap::new(),
                next_id: 1,
            },
            rx,
        )
    }

    pub fn pending(&self) -> usize {
        self.tasks.values().filter(|t| !t.is_finished()).count()
    }
}

impl Deferrer for TokioDeferrer {
    fn after(&mut self, delay_ms: u64, ticket: TimerTicket) -> DeferHandle {
        self.tasks.retain(|_, task| !task.is_finished());

        let id = self.next_id;
        self.next_id += 1;
        let tx = self.tx.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
            // Receiver gone means the host is shutting down.
            let _ = tx.send(ticket);
        });
        self.tasks.insert(id, task);
        DeferHandle(id)
    }

    fn cancel(&mut self, handle: DeferHandle) {
        if let Some(task) = self.tasks.remove(&handle.0) {
            task.abort();
        }
    }
}

impl Drop for TokioDeferrer {
    fn drop(&mut self) {
        for (_, task) in self.tasks.drain() {
            task.abort();
        }
    }
}

/// For one-shot processes that exit before any timer could fire.
///
/// Nothing is scheduled; the persisted anchor carries the deadline and the
/// next launch resumes it.
#[derive(Debug, Default)]
pub struct DetachedDeferrer {
    next_id: u64,
}

impl Deferrer for DetachedDeferrer {
    fn after(&mut self, delay_ms: u64, ticket: TimerTicket) -> DeferHandle {
        tracing::debug!(kind = ?ticket.kind, delay_ms, "timer detached until next launch");
        self.next_id += 1;
        DeferHandle(self.next_id)
    }

    fn cancel(&mut self, _handle: DeferHandle) {}
}

/// A scheduled ticket held by [`ManualDeferrer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTicket {
    pub handle: DeferHandle,
    pub due_at_ms: u64,
    pub delay_ms: u64,
    pub ticket: TimerTicket,
}

/// Deterministic deferrer that computes deadlines from a [`ManualClock`].
///
/// Tickets are only released by [`ManualDeferrer::take_due`].
#[derive(Debug, Default)]
pub struct ManualDeferrer {
    clock: ManualClock,
    pending: Vec<PendingTicket>,
    cancelled: Vec<DeferHandle>,
    next_id: u64,
}

impl ManualDeferrer {
    pub fn new(clock: ManualClock) -> Self {
        Self {
            clock,
            ..Self::default()
        }
    }

    pub fn pending(&self) -> &[PendingTicket] {
        &self.pending
    }

    pub fn cancelled(&self) -> &[DeferHandle] {
        &self.cancelled
    }

    /// The single outstanding ticket of `kind`, if any.
    pub fn pending_of(&self, kind: TimerKind) -> Option<&PendingTicket> {
        self.pending.iter().find(|p| p.ticket.kind == kind)
    }

    /// Remove and return every ticket due at or before `now_ms`, earliest first.
    pub fn take_due(&mut self, now_ms: u64) -> Vec<TimerTicket> {
        let mut due: Vec<PendingTicket> = Vec::new();
        self.pending.retain(|p| {
            if p.due_at_ms <= now_ms {
                due.push(*p);
                false
            } else {
                true
            }
        });
        due.sort_by_key(|p| p.due_at_ms);
        due.into_iter().map(|p| p.ticket).collect()
    }
}

impl Deferrer for ManualDeferrer {
    fn after(&mut self, delay_ms: u64, ticket: TimerTicket) -> DeferHandle {
        self.next_id += 1;
        let handle = DeferHandle(self.next_id);
        self.pending.push(PendingTicket {
            handle,
            due_at_ms: self.clock.now_ms().saturating_add(delay_ms),
            delay_ms,
            ticket,
        });
        handle
    }

    fn cancel(&mut self, handle: DeferHandle) {
        let before = self.pending.len();
        self.pending.retain(|p| p.handle != handle);
        if self.pending.len() != before {
            self.cancelled.push(handle);
        }
    }
}
