//! Maps request paths to worker behaviors.
//!
//! ## Structure
//! - `/delete` — delete up to 10 objects, reply with their keys
//! - `/`       — seed a few writes, reply with the bucket listing
//! - anything else — fetch the object whose key is the path minus its leading slash
//!
//! Every method is accepted; the path alone decides the behavior. A request
//! for `/favicon.ico` is an ordinary lookup of the key `favicon.ico`.

use crate::{handlers::worker_handlers::dispatch, services::worker_service::WorkerService};
use axum::Router;

/// The behavior selected for a request path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    DeleteBatch,
    Fetch(String),
    SeedAndList,
}

impl Route {
    /// First match wins: `/delete`, then any path other than `/`, then `/`.
    pub fn from_path(path: &str) -> Self {
        if path == "/delete" {
            Route::DeleteBatch
        } else if path != "/" {
            let key = path.strip_prefix('/').unwrap_or(path).trim();
            Route::Fetch(key.to_string())
        } else {
            Route::SeedAndList
        }
    }
}

/// Build the worker router. Every request lands in `dispatch`.
pub fn routes() -> Router<WorkerService> {
    Router::new().fallback(dispatch)
}
