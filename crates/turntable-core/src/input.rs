//! # Loose Input Parsing
//!
//! Form fields arrive as optional strings. Nothing here ever rejects input:
//! absent, empty, non-numeric and non-finite values all fall back to a
//! documented default.

use crate::primitives::{DEFAULT_SPEED, DEFAULT_TURN_INCREMENT};

/// Parse a number, returning `None` for anything that is not a finite real.
pub fn parse_number(raw: Option<&str>) -> Option<f64> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Clamp a speed into `[0, max]`. Non-finite values become the default.
pub fn clamp_speed(value: f64, max: f64) -> f64 {
    if !value.is_finite() {
        return DEFAULT_SPEED.clamp(0.0, max);
    }
    value.clamp(0.0, max)
}

/// Parse a speed field: default 1, clamped to `[0, max]`.
pub fn parse_speed(raw: Option<&str>, max: f64) -> f64 {
    clamp_speed(parse_number(raw).unwrap_or(DEFAULT_SPEED), max)
}

/// Parse a turns field: default 1, sign preserved.
pub fn parse_turns(raw: Option<&str>) -> f64 {
    parse_number(raw).unwrap_or(DEFAULT_TURN_INCREMENT)
}
