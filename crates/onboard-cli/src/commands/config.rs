use clap::Subcommand;
use onboard_core::Config;

#[derive(Subcommand)]
pub enum ConfigAction {
    /// Print one setting
    Get {
        /// Dot-separated key under [timers], [tour] or [notifications]
        /// (e.g. "timers.duration_ms", "tour.session_cap")
        key: String,
    },
    /// Change one setting; takes effect on the next launch
    Set {
        /// Dot-separated key
        key: String,
        /// New value: milliseconds for timers, "a"/"b" for tour.variation,
        /// a JSON list for tour.custom_topics (e.g. '["sync","search"]')
        value: String,
    },
    /// Print every setting as `key = value`
    List,
    /// Restore the default tour pacing and content
    Reset,
}

pub fn run(action: ConfigAction) -> Result<(), Box<dyn std::error::Error>> {
    match action {
        ConfigAction::Get { key } => {
            let config = Config::load()?;
            match config.get(&key) {
                Some(value) => println!("{value}"),
                None => {
                    eprintln!("unknown key: {key}");
                    eprintln!("known keys: {}", config.keys().join(", "));
                    std::process::exit(1);
                }
            }
        }
        ConfigAction::Set { key, value } => {
            let mut config = Config::load()?;
            config.set(&key, &value)?;
            let stored = config.get(&key).unwrap_or(value);
            println!("{key} = {stored}");
        }
        ConfigAction::List => {
            let config = Config::load()?;
            for key in config.keys() {
                if let Some(value) = config.get(&key) {
                    println!("{key} = {value}");
                }
            }
        }
        ConfigAction::Reset => {
            Config::default().save()?;
            println!("tour settings reset to defaults");
        }
    }
    Ok(())
}
