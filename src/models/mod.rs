//! Core data models for the bucket worker.
//!
//! `object` describes what the bucket stores and returns; `payload` describes
//! what the worker itself writes and the request data it is built from.

pub mod object;
pub mod payload;
