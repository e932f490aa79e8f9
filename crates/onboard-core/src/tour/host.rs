use std::sync::{Arc, Mutex, MutexGuard};

use super::Snippet;

/// Renders tour content into the host UI.
///
/// The user's response comes back separately through
/// `SessionCoordinator::on_cta_complete` / `on_dismiss`; a snippet nobody
/// acts on simply times out.
pub trait Presenter {
    /// Show `snippet`. An error aborts the event and leaves state unchanged.
    fn present(&mut self, snippet: &Snippet) -> Result<(), Box<dyn std::error::Error>>;

    /// Called once when the tour reaches end of life.
    fn retire(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        Ok(()) // default no-op
    }
}

/// Displays a notification that new tour content is available.
pub trait Notifier {
    fn notify(&mut self, snippet: &Snippet) -> Result<(), Box<dyn std::error::Error>>;
}

#[derive(Debug, Default)]
struct PresenterLog {
    shown: Vec<Snippet>,
    retired: bool,
    fail_with: Option<String>,
}

/// Presenter that records what it was asked to show.
///
/// Clones share one log, so a test can keep a clone after handing the
/// presenter to a coordinator.
#[derive(Debug, Default, Clone)]
pub struct RecordingPresenter {
    log: Arc<Mutex<PresenterLog>>,
}

impl RecordingPresenter {
    pub fn new() -> Self {
        Self::default()
    }

    fn log(&self) -> MutexGuard<'_, PresenterLog> {
        self.log.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn shown(&self) -> Vec<Snippet> {
        self.log().shown.clone()
    }

    pub fn last_shown(&self) -> Option<Snippet> {
        self.log().shown.last().cloned()
    }

    pub fn retired(&self) -> bool {
        self.log().retired
    }

    /// Make every following `present` fail with `message` (or succeed again on `None`).
    pub fn fail_with(&self, message: Option<&str>) {
        self.log().fail_with = message.map(str::to_string);
    }
}

impl Presenter for RecordingPresenter {
    fn present(&mut self, snippet: &Snippet) -> Result<(), Box<dyn std::error::Error>> {
        let mut log = self.log();
        if let Some(message) = &log.fail_with {
            return Err(message.clone().into());
        }
        log.shown.push(snippet.clone());
        Ok(())
    }

    fn retire(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.log().retired = true;
        Ok(())
    }
}

/// Notifier that records each notification. Clones share one log.
#[derive(Debug, Default, Clone)]
pub struct RecordingNotifier {
    sent: Arc<Mutex<Vec<Snippet>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Snippet> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&mut self, snippet: &Snippet) -> Result<(), Box<dyn std::error::Error>> {
        self.sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(snippet.clone());
        Ok(())
    }
}
