//! # Turntable - Rotary Stage Controller
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                apps/turntable (THE BINARY)               │
//! │                                                          │
//! │   ┌─────────────┐   ┌──────────────┐   ┌─────────────┐   │
//! │   │    CLI      │   │  HTTP panel  │   │   Config    │   │
//! │   │   (clap)    │   │   (axum)     │   │   (toml)    │   │
//! │   └──────┬──────┘   └──────┬───────┘   └──────┬──────┘   │
//! │          └─────────────────┼──────────────────┘          │
//! │                            ▼                             │
//! │                   ┌────────────────┐                     │
//! │                   │ turntable-core │                     │
//! │                   │  (THE LOGIC)   │                     │
//! │                   └────────────────┘                     │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! turntable server --port 8080 --transport motion-controller
//! turntable --config turntable.toml home
//! turntable --transport simulated position
//! ```

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use turntable::cli;

#[tokio::main]
async fn main() {
    let cli = cli::Cli::parse();

    // TURNTABLE_LOG_FORMAT=json enables machine-parseable output.
    let log_format = std::env::var("TURNTABLE_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if cli.verbose {
        "turntable=debug,turntable_core=debug,tower_http=debug"
    } else {
        "turntable=info,turntable_core=info,tower_http=debug"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    if let Err(e) = cli::execute(cli).await {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

fn print_banner() {
    println!(
        r#"
  ╔╦╗╦ ╦╦═╗╔╗╔╔╦╗╔═╗╔╗ ╦  ╔═╗
   ║ ║ ║╠╦╝║║║ ║ ╠═╣╠╩╗║  ║╣
   ╩ ╚═╝╩╚═╝╚╝ ╩ ╩ ╩╚═╝╩═╝╚═╝

  Rotary stage controller v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
