//! Command-line interface definition.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// alohartc - call and watch alohacam devices
#[derive(Debug, Parser)]
#[command(name = "alohartc")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, short, global = true, env = "ALOHARTC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, short = 'v', global = true)]
    pub debug: bool,

    /// Emit a JSON trace of every signaling frame and state transition
    #[arg(long, global = true, conflicts_with = "debug")]
    pub trace_signaling: bool,

    /// Signaling server base URL
    #[arg(long, global = true, env = "ALOHARTC_SERVER")]
    pub server: Option<String>,

    /// Auth token (overrides `[auth] token`)
    #[arg(long, global = true, env = "ALOHARTC_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    /// Seconds to wait for a call to be established
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Call a device and hold the session until interrupted
    Call {
        /// Device to call
        #[arg(long)]
        device_id: String,

        /// ICE server URL to use instead of requesting relay credentials
        /// (can be repeated)
        #[arg(long = "ice-server", action = clap::ArgAction::Append)]
        ice_servers: Vec<String>,

        /// Only use relay candidates
        #[arg(long)]
        relay_only: bool,
    },

    /// Print device status changes until interrupted
    Monitor {
        /// Watch a single device
        #[arg(long = "device-id", group = "target", required_unless_present = "group")]
        device: Option<String>,

        /// Watch every device of a group
        #[arg(long, group = "target")]
        group: Option<String>,

        /// Print one JSON object per status change
        #[arg(long)]
        json: bool,
    },

    /// Configuration commands
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Configuration actions.
#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Dump current configuration
    Dump,

    /// Validate configuration
    Validate,

    /// Show configuration file path
    Path,
}
