//! # Turntable CLI Module
//!
//! ## Available Commands
//!
//! - `server` - Start the HTTP control surface (default)
//! - `position` - Initialize the stage and print the encoder position
//! - `home` - Initialize the stage and return to home
//! - `calibrate` - Initialize the stage and run anti-cogging calibration
//! - `config` - Print the resolved configuration

mod commands;

use crate::config::AppConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use turntable_core::{LinkKind, StageError};

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Turntable - rotary stage controller
///
/// Drives a stepper or closed-loop motor through a serial link and serves a
/// browser control panel.
#[derive(Parser, Debug)]
#[command(name = "turntable")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Transport: "serial", "motion-controller" or "simulated"
    #[arg(short = 'T', long, global = true)]
    pub transport: Option<String>,

    /// Serial device path
    #[arg(short = 'd', long, global = true)]
    pub device: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start HTTP server
    Server {
        /// Host to bind to
        #[arg(short = 'H', long)]
        host: Option<String>,

        /// Port to bind to
        #[arg(short, long)]
        port: Option<u16>,

        /// Finish initialization before accepting requests
        #[arg(long)]
        blocking_init: bool,

        /// Directory served under /static
        #[arg(long)]
        static_dir: Option<PathBuf>,
    },

    /// Print the encoder position
    Position,

    /// Return to the home position
    Home,

    /// Run anti-cogging calibration (closed-loop links only)
    Calibrate,

    /// Print the resolved configuration
    Config,
}

// =============================================================================
// CONFIGURATION RESOLUTION
// =============================================================================

/// Parse a transport name as written in the TOML file.
pub fn parse_transport(name: &str) -> Result<LinkKind, StageError> {
    match name.trim() {
        "serial" => Ok(LinkKind::Serial),
        "motion-controller" => Ok(LinkKind::MotionController),
        "simulated" => Ok(LinkKind::Simulated),
        other => Err(StageError::Config(format!(
            "Unknown transport '{}', expected serial, motion-controller or simulated",
            other
        ))),
    }
}

/// File, then global flags. Server flags are applied by `execute`.
pub fn resolve_config(cli: &Cli) -> Result<AppConfig, StageError> {
    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(name) = &cli.transport {
        config.stage.transport = parse_transport(name)?;
    }
    if let Some(device) = &cli.device {
        config.stage.device_path = device.display().to_string();
    }
    config.stage.validate()?;
    Ok(config)
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub async fn execute(cli: Cli) -> Result<(), StageError> {
    let mut config = resolve_config(&cli)?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Server {
            host,
            port,
            blocking_init,
            static_dir,
        }) => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            config.server.blocking_init |= blocking_init;
            if static_dir.is_some() {
                config.server.static_dir = static_dir;
            }
            cmd_server(config).await
        }
        Some(Commands::Position) => cmd_position(config, json_mode).await,
        Some(Commands::Home) => cmd_home(config, json_mode).await,
        Some(Commands::Calibrate) => cmd_calibrate(config, json_mode).await,
        Some(Commands::Config) => cmd_config(&config, json_mode),
        None => cmd_server(config).await,
    }
}
