//! # Onboard Core Library
//!
//! This library drives a multi-session onboarding tour inside a long-lived
//! host application. It decides which step of the tour to present, schedules
//! presentation and expiry, and picks up where it left off when the host is
//! killed and restarted mid-timer.
//!
//! ## Architecture
//!
//! - **Storage**: typed key/value state (SQLite or in-memory) written in
//!   atomic batches, plus TOML configuration
//! - **Timer**: a single-slot logical timer anchored to wall-clock start
//!   times so the remaining duration survives restarts
//! - **Tour**: the step progression state machine, the notification gate,
//!   and the coordinator that turns host events into state changes
//!
//! ## Key Components
//!
//! - [`SessionCoordinator`]: per-launch entry point and event dispatcher
//! - [`ProgressionEngine`]: step advancement and the missed-step backlog
//! - [`TimerScheduler`]: arm/disarm/resume against persisted anchors
//! - [`Database`]: persistent state store
//! - [`Config`]: application configuration management

pub mod clock;
pub mod error;
pub mod events;
pub mod storage;
pub mod timer;
pub mod tour;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ConfigError, CoreError, StoreError};
pub use events::TourEvent;
pub use storage::{Config, Database, MemoryStore, Persisted, StateStore};
pub use timer::{
    DetachedDeferrer, ManualDeferrer, ResumeOutcome, TimerKind, TimerScheduler, TimerTicket,
    TokioDeferrer,
};
pub use tour::{
    Notifier, Presenter, ProgressionEngine, SessionCoordinator, Snippet, TourState, TourStatus,
};
