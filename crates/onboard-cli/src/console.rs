//! Terminal rendering for tour content.
//!
//! Snippets and notifications are written to stderr as plain text so stdout
//! stays a clean stream of JSON events.

use onboard_core::{Notifier, Presenter, Snippet, TourEvent};

pub struct ConsolePresenter {
    total: usize,
}

impl ConsolePresenter {
    pub fn new(total: usize) -> Self {
        Self { total }
    }
}

impl Presenter for ConsolePresenter {
    fn present(&mut self, snippet: &Snippet) -> Result<(), Box<dyn std::error::Error>> {
        let label = if snippet.replay { " (again)" } else { "" };
        eprintln!(
            "[tour] {}/{}: {}{label}",
            snippet.count, self.total, snippet.topic
        );
        Ok(())
    }

    fn retire(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        eprintln!("[tour] finished");
        Ok(())
    }
}

pub struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&mut self, snippet: &Snippet) -> Result<(), Box<dyn std::error::Error>> {
        eprintln!("[notify] new tip available: {}", snippet.topic);
        Ok(())
    }
}

/// Print each event as one JSON line on stdout.
pub fn print_events(events: &[TourEvent]) -> Result<(), Box<dyn std::error::Error>> {
    for event in events {
        println!("{}", serde_json::to_string(event)?);
    }
    Ok(())
}
