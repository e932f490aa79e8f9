//! Long-lived host loop.
//!
//! Timer tickets from the [`TokioDeferrer`] and commands read from stdin are
//! handled one at a time on a single task, so every coordinator call runs to
//! completion before the next one starts.

use onboard_core::timer::Deferrer;
use onboard_core::{
    Clock, Config, CoreError, Database, SessionCoordinator, StateStore, SystemClock,
    TokioDeferrer, TourEvent,
};
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::console::{print_events, ConsoleNotifier, ConsolePresenter};

pub fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(host_loop(config))
}

/// Print the events of one call, or log its error and keep going.
fn report(result: Result<Vec<TourEvent>, CoreError>) -> Result<(), Box<dyn std::error::Error>> {
    match result {
        Ok(events) => print_events(&events),
        Err(e) => {
            tracing::error!(error = %e, "tour event failed");
            eprintln!("error: {e}");
            Ok(())
        }
    }
}

/// Current status as one JSON line, or `None` after logging a read failure.
fn status_line<S: StateStore, D: Deferrer, C: Clock>(
    coordinator: &SessionCoordinator<S, D, C>,
) -> Option<String> {
    let status = match coordinator.status() {
        Ok(status) => status,
        Err(e) => {
            tracing::error!(error = %e, "failed to read tour status");
            eprintln!("error: {e}");
            return None;
        }
    };
    match serde_json::to_string(&status) {
        Ok(line) => Some(line),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode tour status");
            None
        }
    }
}

async fn host_loop(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    let (deferrer, mut tickets) = TokioDeferrer::channel();
    let total = config.tour.topics().len();
    let mut coordinator = SessionCoordinator::new(
        Database::open()?,
        deferrer,
        SystemClock,
        &config,
        Box::new(ConsolePresenter::new(total)),
        Box::new(ConsoleNotifier),
    );

    report(coordinator.on_launch())?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            Some(ticket) = tickets.recv() => {
                report(coordinator.on_timer_fired(ticket))?;
            }
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                match line.trim() {
                    "" => {}
                    "cta" => report(coordinator.on_cta_complete())?,
                    "dismiss" => report(coordinator.on_dismiss())?,
                    "session" => report(coordinator.on_session_boundary())?,
                    "status" => {
                        if let Some(line) = status_line(&coordinator) {
                            println!("{line}");
                        }
                    }
                    "quit" | "exit" => break,
                    other => eprintln!("unknown command: {other}"),
                }
            }
        }
    }

    tracing::info!("host loop stopped");
    Ok(())
}
