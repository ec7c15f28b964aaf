//! Defines the HTTP trigger surface.
//!
//! ## Structure
//! - `GET  /`        : run the relay once (same as POST)
//! - `POST /`        : run the relay once
//! - `GET  /healthz` : liveness

use crate::handlers::{
    health_handlers::healthz,
    trigger_handlers::{RelayState, trigger},
};
use axum::{Router, routing::get};

/// Build and return the router.
///
/// The router carries the shared `RelayState` to the trigger handler.
pub fn routes() -> Router<RelayState> {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/", get(trigger).post(trigger))
}
