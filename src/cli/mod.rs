//! Command Line Interface module
//!
//! Implements the CLI commands and argument parsing for tickroute.

use clap::{Parser, Subcommand};

#[derive(Parser, Debug, Clone)]
#[command(name = "tickroute")]
#[command(about = "Correlation-keyed market data session client")]
#[command(
    long_about = "Subscribes to a simulated market data session and routes its events through correlation-keyed handlers"
)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    #[arg(long, default_value = "config.toml")]
    pub config_file: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a subscriber session against the simulated feed
    Run {
        /// Session endpoint as host:port, repeatable
        #[arg(long = "server", value_name = "HOST:PORT")]
        servers: Vec<String>,

        /// Service the topics live under, e.g. //sim/mktdata
        #[arg(long)]
        service: Option<String>,

        /// Topics to subscribe to, comma separated or repeated
        #[arg(long, value_delimiter = ',')]
        topics: Vec<String>,

        /// Fields requested per topic, comma separated or repeated
        #[arg(long, value_delimiter = ',')]
        fields: Vec<String>,

        /// Authorization mode (none, user, dir=, app=, userapp=, manual=)
        #[arg(long)]
        auth: Option<String>,

        /// Stop after printing this many ticks
        #[arg(long)]
        max_ticks: Option<u64>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: Option<ConfigAction>,
    },
}

impl Default for Commands {
    fn default() -> Self {
        Commands::Run {
            servers: Vec::new(),
            service: None,
            topics: Vec::new(),
            fields: Vec::new(),
            auth: None,
            max_ticks: None,
        }
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Get the actual command, using default if none provided
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or_default()
    }

    /// Adjust log level based on verbose flag
    pub fn effective_log_level(&self) -> String {
        if self.verbose {
            "debug".to_string()
        } else {
            self.log_level.clone()
        }
    }
}
