//! # Turntable HTTP Control Surface
//!
//! ## Endpoints
//!
//! - `GET /` - Control panel
//! - `GET /health` - Health check
//! - `GET /status` - Stage status snapshot
//! - `GET /getpos` - Encoder position as plain text
//! - `GET|POST /home`, `/turnleft`, `/turnright`, `/stepleft`, `/stepright`,
//!   `/bigstepleft`, `/bigstepright`, `/stop` - Motion, then 303 to `/`
//! - `POST /setspeed`, `/setturns`, `/sethome` - Settings, then 303 to `/`
//! - `POST /calibrate` - Anti-cogging calibration in the background
//! - `GET /static/*` - Static files, when a directory is configured
//!
//! ## Security Configuration (Environment Variables)
//!
//! - `TURNTABLE_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*" for all (default: localhost only)
//! - `TURNTABLE_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `TURNTABLE_API_KEY`: If set, requires Bearer token authentication

mod auth;
mod error;
mod handlers;
mod middleware;
mod panel;
mod types;

pub use auth::{API_KEY_ENV, get_api_key_from_env};
pub use error::{ApiError, status_for};
pub use middleware::{RATE_LIMIT_ENV, create_rate_limiter, get_rate_limit_from_env};
pub use types::{ActionResponse, HealthResponse, SpeedForm, StatusResponse, TurnsForm};

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware as axum_middleware,
    routing::{get, post},
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use turntable_core::{Sequencer, StageController, StageError};

/// Request body limit; forms here are a few bytes.
const MAX_BODY_BYTES: usize = 64 * 1024;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<StageController>,
    /// Heading of the control panel.
    pub title: String,
    /// Directory served under `/static`.
    pub static_dir: Option<PathBuf>,
}

impl AppState {
    #[must_use]
    pub fn new(controller: Arc<StageController>) -> Self {
        Self {
            controller,
            title: "Turntable 360".to_string(),
            static_dir: None,
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = title.into();
        self
    }

    #[must_use]
    pub fn with_static_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.static_dir = dir;
        self
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build the CORS layer from `TURNTABLE_CORS_ORIGINS`.
///
/// `*` allows everything, unset means localhost only, otherwise a
/// comma-separated origin list.
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("TURNTABLE_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (TURNTABLE_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in TURNTABLE_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                    .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            }
        }
        None => {
            tracing::info!("CORS: No TURNTABLE_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

fn build_localhost_cors() -> CorsLayer {
    let origins: Vec<HeaderValue> = [
        "http://localhost",
        "http://localhost:8080",
        "http://127.0.0.1",
        "http://127.0.0.1:8080",
    ]
    .into_iter()
    .filter_map(|o| o.parse::<HeaderValue>().ok())
    .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the router with all endpoints and middleware.
///
/// Middleware stack (outer to inner): tracing, CORS, body limit, rate
/// limiting (if enabled), authentication (if configured).
pub fn create_router(state: AppState) -> Router {
    let rate_limit = get_rate_limit_from_env();
    let rate_limiter = if rate_limit > 0 {
        tracing::info!("Rate limiting enabled: {} requests/second", rate_limit);
        Some(create_rate_limiter(rate_limit))
    } else {
        tracing::info!("Rate limiting disabled");
        None
    };

    let has_auth = get_api_key_from_env().is_some();
    if has_auth {
        tracing::info!("API key authentication enabled");
    } else {
        tracing::warn!(
            "API key authentication DISABLED - anyone on the network can move the stage. \
             Set TURNTABLE_API_KEY to enable authentication."
        );
    }

    let mut router = Router::new()
        .route("/", get(handlers::index_handler))
        .route("/health", get(handlers::health_handler))
        .route("/status", get(handlers::status_handler))
        .route("/getpos", get(handlers::position_handler))
        .route(
            "/home",
            get(handlers::home_handler).post(handlers::home_handler),
        )
        .route(
            "/turnleft",
            get(handlers::turn_left_handler).post(handlers::turn_left_handler),
        )
        .route(
            "/turnright",
            get(handlers::turn_right_handler).post(handlers::turn_right_handler),
        )
        .route(
            "/stepleft",
            get(handlers::step_left_handler).post(handlers::step_left_handler),
        )
        .route(
            "/stepright",
            get(handlers::step_right_handler).post(handlers::step_right_handler),
        )
        .route(
            "/bigstepleft",
            get(handlers::big_step_left_handler).post(handlers::big_step_left_handler),
        )
        .route(
            "/bigstepright",
            get(handlers::big_step_right_handler).post(handlers::big_step_right_handler),
        )
        .route(
            "/stop",
            get(handlers::stop_handler).post(handlers::stop_handler),
        )
        .route("/setspeed", post(handlers::set_speed_handler))
        .route("/setturns", post(handlers::set_turns_handler))
        .route("/sethome", post(handlers::set_home_handler))
        .route("/calibrate", post(handlers::calibrate_handler));

    if let Some(dir) = &state.static_dir {
        tracing::info!(dir = %dir.display(), "Serving static files under /static");
        router = router.nest_service("/static", ServeDir::new(dir));
    }

    if has_auth {
        router = router.layer(axum_middleware::from_fn(auth::api_key_auth_middleware));
    }

    if let Some(limiter) = rate_limiter {
        router = router.layer(axum_middleware::from_fn_with_state(
            limiter,
            middleware::rate_limit_middleware,
        ));
    }

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(build_cors_layer())
                .layer(axum::extract::DefaultBodyLimit::max(MAX_BODY_BYTES)),
        )
        .with_state(state)
}

// =============================================================================
// INITIALIZATION
// =============================================================================

/// Run the initialization sequence on the blocking pool.
///
/// The handle resolves with the sequence's own result; a panicked or
/// cancelled task surfaces as `StageError::Io`.
pub fn spawn_initialization(controller: Arc<StageController>) -> JoinHandle<Result<(), StageError>> {
    tokio::spawn(async move {
        let sequencer = Sequencer::new(controller);
        match tokio::task::spawn_blocking(move || sequencer.run()).await {
            Ok(result) => result,
            Err(e) => Err(StageError::Io(format!("Initialization task failed: {}", e))),
        }
    })
}

/// Log the outcome of a background initialization.
pub fn supervise_initialization(handle: JoinHandle<Result<(), StageError>>) {
    tokio::spawn(async move {
        match handle.await {
            Ok(Ok(())) => tracing::info!("Stage ready"),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Initialization failed, motion commands will be ignored");
            }
            Err(e) => tracing::error!(error = %e, "Initialization supervisor lost its task"),
        }
    });
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Cannot listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

/// Serve the control surface until Ctrl+C.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), StageError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| StageError::Io(format!("Bind failed: {}", e)))?;

    tracing::info!("Turntable HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| StageError::Io(format!("Server error: {}", e)))
}
