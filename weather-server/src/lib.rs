//! HTTP server for the weather lookup service.
//!
//! This crate focuses on:
//! - Routing and JSON error mapping
//! - CORS and request logging middleware
//! - Tracing subscriber setup

pub mod http;
pub mod logging;

pub use http::{AppState, build_router, error_payload, serve};
