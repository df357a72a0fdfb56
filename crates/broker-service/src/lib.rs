//! HTTP service for the evidence broker.
//!
//! # Components
//!
//! - `api`: router, shared state and server loop
//! - `apis`: endpoint handlers
//! - `errors`: outward status and envelope mapping for every failure
//! - `policy`: authorization collaborator
//! - `cli`: command-line interface
//! - `telemetry`: tracing setup

pub mod api;
pub mod apis;
pub mod cli;
pub mod errors;
pub mod policy;
pub mod telemetry;
