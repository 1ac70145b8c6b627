pub mod worker_handlers;
