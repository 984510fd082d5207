//! # CLI Command Implementations

use crate::api::{self, AppState};
use crate::config::AppConfig;
use serde_json::json;
use std::sync::Arc;
use turntable_core::{CommandOutcome, StageController, StageError};

/// Open the configured link and build the controller.
fn build_controller(config: &AppConfig) -> Result<Arc<StageController>, StageError> {
    Ok(Arc::new(StageController::from_config(config.stage.clone())?))
}

/// Initialize synchronously, then run one operation on the blocking pool.
async fn run_one_shot<T, F>(config: &AppConfig, op: F) -> Result<T, StageError>
where
    T: Send + 'static,
    F: FnOnce(&StageController) -> Result<T, StageError> + Send + 'static,
{
    let controller = build_controller(config)?;
    api::spawn_initialization(controller.clone())
        .await
        .map_err(|e| StageError::Io(format!("Initialization task failed: {}", e)))??;

    tokio::task::spawn_blocking(move || op(&controller))
        .await
        .map_err(|e| StageError::Io(format!("Command task failed: {}", e)))?
}

fn print_outcome(action: &str, outcome: CommandOutcome, json_mode: bool) {
    let label = match outcome {
        CommandOutcome::Sent => "done",
        CommandOutcome::NotReady => "ignored (stage not ready)",
    };
    if json_mode {
        println!(
            "{}",
            json!({ "action": action, "success": outcome.is_sent() })
        );
    } else {
        println!("{}: {}", action, label);
    }
}

// =============================================================================
// SERVER COMMAND
// =============================================================================

/// Start the HTTP control surface.
pub async fn cmd_server(config: AppConfig) -> Result<(), StageError> {
    let controller = build_controller(&config)?;
    let server = &config.server;

    println!("Turntable Control Server Starting...");
    println!();
    println!("Configuration:");
    println!("  Host:      {}", server.host);
    println!("  Port:      {}", server.port);
    println!("  Transport: {}", config.stage.transport);
    println!("  Device:    {}", config.stage.device_path);
    println!();
    println!("Endpoints:");
    println!("  GET  /        - Control panel");
    println!("  GET  /status  - Stage status");
    println!("  GET  /getpos  - Encoder position");
    println!("  GET  /health  - Health check");
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let init = api::spawn_initialization(controller.clone());
    if server.blocking_init {
        tracing::info!("Waiting for stage initialization before serving");
        init.await
            .map_err(|e| StageError::Io(format!("Initialization task failed: {}", e)))??;
    } else {
        api::supervise_initialization(init);
    }

    let state = AppState::new(controller)
        .with_title(server.title.clone())
        .with_static_dir(server.static_dir.clone());
    api::run_server(&server.addr(), state).await
}

// =============================================================================
// ONE-SHOT COMMANDS
// =============================================================================

/// Print the encoder position.
pub async fn cmd_position(config: AppConfig, json_mode: bool) -> Result<(), StageError> {
    let position = run_one_shot(&config, StageController::position).await?;
    if json_mode {
        println!("{}", json!({ "position": position.ticks() }));
    } else {
        println!("Position: {}", position);
    }
    Ok(())
}

/// Return to home.
pub async fn cmd_home(config: AppConfig, json_mode: bool) -> Result<(), StageError> {
    let outcome = run_one_shot(&config, StageController::home).await?;
    print_outcome("home", outcome, json_mode);
    Ok(())
}

/// Run anti-cogging calibration and wait for it.
pub async fn cmd_calibrate(mut config: AppConfig, json_mode: bool) -> Result<(), StageError> {
    // The process exits afterwards, so always wait for completion.
    config.stage.restore_gains_after_anticogging = true;
    let outcome = run_one_shot(&config, StageController::calibrate_anticogging).await?;
    print_outcome("calibrate", outcome, json_mode);
    Ok(())
}

// =============================================================================
// CONFIG COMMAND
// =============================================================================

/// Print the resolved configuration as TOML, or JSON in JSON mode.
pub fn cmd_config(config: &AppConfig, json_mode: bool) -> Result<(), StageError> {
    if json_mode {
        let text = serde_json::to_string_pretty(config)
            .map_err(|e| StageError::Config(e.to_string()))?;
        println!("{}", text);
    } else {
        print!("{}", config.to_toml()?);
    }
    Ok(())
}
