//! Tour progression: what to show, when, and what happens after.

mod content;
mod coordinator;
mod engine;
mod gate;
mod host;
mod state;

pub use content::{Snippet, Variation};
pub use coordinator::{SessionCoordinator, TimerStatus, TourStatus};
pub use engine::{FinishedStep, Progress, ProgressionEngine, Resolution, TimerIntent};
pub use gate::NotificationGate;
pub use host::{Notifier, Presenter, RecordingNotifier, RecordingPresenter};
pub use state::TourState;
