use serde::{Deserialize, Serialize};

/// Content track: which topic each step presents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variation {
    #[default]
    A,
    B,
}

const TRACK_A: [&str; 6] = [
    "sync",
    "addons",
    "search",
    "customize",
    "private_browsing",
    "default_browser",
];

const TRACK_B: [&str; 6] = [
    "private_browsing",
    "addons",
    "search",
    "customize",
    "sync",
    "default_browser",
];

impl Variation {
    pub fn topics(self) -> &'static [&'static str] {
        match self {
            Variation::A => &TRACK_A,
            Variation::B => &TRACK_B,
        }
    }
}

/// What the presenter is asked to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snippet {
    /// Step index in the main sequence.
    pub step: u32,
    pub topic: String,
    /// 1-based position shown to the user.
    pub count: u32,
    /// True when this is a replay of a missed step.
    pub replay: bool,
    /// How many times this snippet has now been shown.
    pub impression: u32,
}

impl Snippet {
    pub(crate) fn new(step: u32, topics: &[String], replay: bool, impression: u32) -> Self {
        let topic = topics
            .get(step as usize)
            .cloned()
            .unwrap_or_else(|| format!("step_{step}"));
        Self {
            step,
            topic,
            count: step + 1,
            replay,
            impression,
        }
    }
}
