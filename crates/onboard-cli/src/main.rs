use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod console;

#[derive(Parser)]
#[command(name = "onboard-cli", version, about = "Onboarding tour host")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Host started: resume timers and present whatever is due
    Launch,
    /// The user completed the call to action of the snippet on screen
    Cta,
    /// The user dismissed the snippet on screen
    Dismiss,
    /// A new host session started
    Session,
    /// Print tour state as JSON
    Status,
    /// Forget all tour progress
    Reset,
    /// Stay running: timers fire in-process, events are read from stdin
    Run,
    /// Configuration management
    Config {
        #[command(subcommand)]
        action: commands::config::ConfigAction,
    },
}

fn main() {
    // stdout carries JSON events; diagnostics go to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Launch => commands::tour::launch(),
        Commands::Cta => commands::tour::cta(),
        Commands::Dismiss => commands::tour::dismiss(),
        Commands::Session => commands::tour::session(),
        Commands::Status => commands::tour::status(),
        Commands::Reset => commands::tour::reset(),
        Commands::Run => commands::run::run(),
        Commands::Config { action } => commands::config::run(action),
    };

    if let Err(e) = result {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}
