//! Storage capability, its implementations, and the host-side scheduler.

pub mod bucket;
pub mod local_bucket;
pub mod memory_bucket;
pub mod scheduler;
pub mod worker_service;
