use onboard_core::{
    Config, CoreError, Database, DetachedDeferrer, SessionCoordinator, SystemClock, TourEvent,
};

use crate::console::{print_events, ConsoleNotifier, ConsolePresenter};

type OneShot = SessionCoordinator<Database, DetachedDeferrer, SystemClock>;

/// A coordinator for a process that exits right after one event.
///
/// Timers are not kept alive; the persisted anchors carry them to the next
/// invocation.
fn open() -> Result<OneShot, Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let total = config.tour.topics().len();
    Ok(SessionCoordinator::new(
        Database::open()?,
        DetachedDeferrer::default(),
        SystemClock,
        &config,
        Box::new(ConsolePresenter::new(total)),
        Box::new(ConsoleNotifier),
    ))
}

fn handle(
    event: impl FnOnce(&mut OneShot) -> Result<Vec<TourEvent>, CoreError>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut coordinator = open()?;
    let events = event(&mut coordinator)?;
    print_events(&events)
}

pub fn launch() -> Result<(), Box<dyn std::error::Error>> {
    handle(|c| c.on_launch())
}

pub fn cta() -> Result<(), Box<dyn std::error::Error>> {
    handle(|c| c.on_cta_complete())
}

pub fn dismiss() -> Result<(), Box<dyn std::error::Error>> {
    handle(|c| c.on_dismiss())
}

pub fn session() -> Result<(), Box<dyn std::error::Error>> {
    handle(|c| c.on_session_boundary())
}

pub fn reset() -> Result<(), Box<dyn std::error::Error>> {
    handle(|c| c.reset())
}

pub fn status() -> Result<(), Box<dyn std::error::Error>> {
    let status = open()?.status()?;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
