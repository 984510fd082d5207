//! # turntable
//!
//! Application layer over `turntable-core`: HTTP control surface, CLI and
//! layered configuration.

pub mod api;
pub mod cli;
pub mod config;
