use super::{Notifier, Snippet};
use crate::error::StoreError;
use crate::storage::{keys, StateStore, StateTxn};

/// Lets at most one notification through per presentation cycle.
#[derive(Debug, Clone, Copy)]
pub struct NotificationGate {
    enabled: bool,
}

impl NotificationGate {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    /// True when no notification was shown for the current cycle.
    pub fn should_show<S: StateStore>(&self, txn: &StateTxn<'_, S>) -> Result<bool, StoreError> {
        Ok(!txn.get(keys::SHOWN_NOTIFICATION)?.is_true())
    }

    pub fn mark_shown<S: StateStore>(&self, txn: &mut StateTxn<'_, S>) -> Result<(), StoreError> {
        txn.set(keys::SHOWN_NOTIFICATION, &true)
    }

    /// Open the gate for a new cycle.
    pub fn rearm<S: StateStore>(&self, txn: &mut StateTxn<'_, S>) {
        txn.clear(keys::SHOWN_NOTIFICATION);
    }

    /// Notify for `snippet` unless this cycle already did. Returns whether a
    /// notification went out.
    ///
    /// A failing notifier is logged and leaves the gate open so the next
    /// presentation retries.
    pub fn notify_once<S: StateStore>(
        &self,
        txn: &mut StateTxn<'_, S>,
        snippet: &Snippet,
        notifier: &mut dyn Notifier,
    ) -> Result<bool, StoreError> {
        if !self.enabled || !self.should_show(txn)? {
            return Ok(false);
        }
        if let Err(e) = notifier.notify(snippet) {
            tracing::warn!(step = snippet.step, error = %e, "notification failed");
            return Ok(false);
        }
        self.mark_shown(txn)?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;
    use crate::tour::RecordingNotifier;

    struct BrokenNotifier;

    impl Notifier for BrokenNotifier {
        fn notify(&mut self, _snippet: &Snippet) -> Result<(), Box<dyn std::error::Error>> {
            Err("no display".into())
        }
    }

    fn snippet() -> Snippet {
        Snippet::new(0, &["sync".to_string()], false, 1)
    }

    #[test]
    fn notifies_once_per_cycle() {
        let gate = NotificationGate::new(true);
        let store = MemoryStore::new();
        let mut notifier = RecordingNotifier::new();
        let mut txn = StateTxn::new(&store);

        assert!(gate.notify_once(&mut txn, &snippet(), &mut notifier).unwrap());
        assert!(!gate.notify_once(&mut txn, &snippet(), &mut notifier).unwrap());
        assert_eq!(notifier.sent().len(), 1);

        gate.rearm(&mut txn);
        assert!(gate.should_show(&txn).unwrap());
        assert!(gate.notify_once(&mut txn, &snippet(), &mut notifier).unwrap());
        assert_eq!(notifier.sent().len(), 2);
    }

    #[test]
    fn explicit_false_flag_allows_notification() {
        let mut store = MemoryStore::new();
        store.set(keys::SHOWN_NOTIFICATION, &false).unwrap();
        let txn = StateTxn::new(&store);
        assert!(NotificationGate::new(true).should_show(&txn).unwrap());
    }

    #[test]
    fn disabled_gate_never_notifies() {
        let gate = NotificationGate::new(false);
        let store = MemoryStore::new();
        let mut notifier = RecordingNotifier::new();
        let mut txn = StateTxn::new(&store);
        assert!(!gate.notify_once(&mut txn, &snippet(), &mut notifier).unwrap());
        assert!(notifier.sent().is_empty());
    }

    #[test]
    fn failed_notification_keeps_gate_open() {
        let gate = NotificationGate::new(true);
        let store = MemoryStore::new();
        let mut txn = StateTxn::new(&store);
        assert!(!gate.notify_once(&mut txn, &snippet(), &mut BrokenNotifier).unwrap());
        assert!(gate.should_show(&txn).unwrap());
    }
}
