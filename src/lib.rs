//! An HTTP worker performing basic object-storage operations against a bucket.
//!
//! Requests are dispatched by path (see [`routes::routes::Route`]); a timer
//! drives periodic writes through [`services::scheduler`].

use axum::Router;
use services::worker_service::WorkerService;

pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;

/// Build the worker router with its state attached.
pub fn create_router(service: WorkerService) -> Router {
    routes::routes::routes().with_state(service)
}
