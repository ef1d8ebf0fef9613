//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "toxwatch",
    version,
    author = "neur0map",
    about = "Watches a post timeline and highlights toxic posts as they appear",
    long_about = "Toxwatch scrapes posts as they render, deduplicates them by normalized text, sends \
                  new posts to a toxicity classifier in batches, and tints or hides the toxic ones. \
                  `toxwatch run` hosts the watcher; the other commands talk to it over a local socket."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/toxwatch/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the watcher daemon in the foreground
    Run {
        /// Replay a scripted page timeline (JSON)
        #[arg(short, long, value_name = "FILE")]
        replay: Option<PathBuf>,
    },

    /// Start observing the timeline
    Start,

    /// Stop observing the timeline
    Stop,

    /// Show observation state, progress and flags
    Status {
        /// Print the raw JSON report
        #[arg(long)]
        json: bool,
    },

    /// Score a piece of text with the configured classifier
    Analyze {
        /// Text to score
        text: String,
    },

    /// Classify one recorded post again
    Recheck {
        /// Post id in the current epoch
        id: u64,
    },

    /// Set a stored flag (observation_active, hide_toxic, user_anonymization)
    Flag {
        key: String,

        #[arg(action = clap::ArgAction::Set)]
        value: bool,
    },

    /// Shut the daemon down
    Shutdown,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
