//! Tests for the API response types and configuration files.

#![allow(clippy::unwrap_used, clippy::panic)]

use serde_json::json;
use std::io::Write;
use turntable::api::{ActionResponse, HealthResponse, StatusResponse, TurnsForm};
use turntable::config::AppConfig;
use turntable_core::{
    CommandOutcome, InitPhase, LinkKind, Position, StageState, StageStatus, StageError,
};

fn status(phase: InitPhase, position: Position) -> StageStatus {
    StageStatus {
        state: StageState {
            speed_limit: 12.5,
            turn_increment: 0.25,
            home_offset: 300,
            ready: phase == InitPhase::Ready,
            phase,
        },
        link: LinkKind::MotionController,
        closed_loop: true,
        ticks_per_revolution: 8192,
        position,
    }
}

// =============================================================================
// STATUS
// =============================================================================

#[test]
fn test_status_response_from_ready_snapshot() {
    let response = StatusResponse::from(status(InitPhase::Ready, Position::Known(-42)));

    let value = serde_json::to_value(&response).unwrap();
    assert_eq!(
        value,
        json!({
            "ready": true,
            "phase": "ready",
            "error": null,
            "link": "motion-controller",
            "closed_loop": true,
            "position": -42,
            "speed_limit": 12.5,
            "turn_increment": 0.25,
            "home_offset": 300,
            "ticks_per_revolution": 8192,
        })
    );
}

#[test]
fn test_status_response_carries_init_failure() {
    let response = StatusResponse::from(status(
        InitPhase::Failed("Device unavailable: /dev/ttyACM0".to_string()),
        Position::Unknown,
    ));

    assert!(!response.ready);
    assert_eq!(response.phase, "failed");
    assert_eq!(
        response.error.as_deref(),
        Some("Device unavailable: /dev/ttyACM0")
    );
    assert_eq!(response.position, None);
}

#[test]
fn test_status_response_roundtrip() {
    let original = StatusResponse::from(status(InitPhase::Homing, Position::Unknown));
    let text = serde_json::to_string(&original).unwrap();
    let parsed: StatusResponse = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed.phase, "homing");
    assert_eq!(parsed.home_offset, 300);
}

// =============================================================================
// ACTIONS AND FORMS
// =============================================================================

#[test]
fn test_action_response_outcomes() {
    let sent = ActionResponse::from(CommandOutcome::Sent);
    assert!(sent.success);
    assert_eq!(sent.outcome, "sent");

    let ignored = ActionResponse::from(CommandOutcome::NotReady);
    assert!(ignored.success);
    assert_eq!(ignored.outcome, "not_ready");

    let failed = ActionResponse::error("Transport error: gone".to_string());
    assert!(!failed.success);
    assert_eq!(failed.error.as_deref(), Some("Transport error: gone"));
}

#[test]
fn test_health_response_default() {
    let health = HealthResponse::default();
    assert_eq!(health.status, "ok");
    assert!(!health.version.is_empty());
}

#[test]
fn test_turns_form_field_optional() {
    let form: TurnsForm = serde_json::from_value(json!({})).unwrap();
    assert!(form.turns.is_none());
}

// =============================================================================
// CONFIGURATION FILES
// =============================================================================

#[test]
fn test_config_file_loads() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"
[server]
port = 9090
title = "Bench"

[stage]
transport = "simulated"
axis = 1
home_on_startup = false
homing_timeout_ms = 30000

[stage.anticogging_gains]
pos_gain = 120.0
vel_gain = 0.0004
vel_integrator_gain = 0.0
"#
    )
    .unwrap();

    let config = AppConfig::load(Some(file.path())).unwrap();
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.server.title, "Bench");
    assert_eq!(config.stage.transport, LinkKind::Simulated);
    assert_eq!(config.stage.axis, 1);
    assert!(!config.stage.home_on_startup);
    assert_eq!(config.stage.homing_timeout_ms, Some(30000));
    assert_eq!(config.stage.anticogging_gains.pos_gain, 120.0);
}

#[test]
fn test_config_missing_file_is_io_error() {
    let dir = tempfile::tempdir().unwrap();
    let result = AppConfig::load(Some(&dir.path().join("absent.toml")));
    assert!(matches!(result, Err(StageError::Io(_))));
}

#[test]
fn test_config_toml_roundtrip() {
    let mut config = AppConfig::default();
    config.server.port = 8181;
    config.stage.transport = LinkKind::MotionController;
    config.stage.calibration_timeout_ms = Some(45_000);

    let text = config.to_toml().unwrap();
    assert_eq!(AppConfig::from_toml(&text).unwrap(), config);
}
