//! Shared types for the evidence broker and the evidence sources it calls.
//!
//! - `errors`: the closed error taxonomy and stable code table
//! - `model`: `ErrorModel` and the hosting runtime's crash envelope
//! - `request`: the request envelope and asynchronous evidence tags

pub mod errors;
pub mod model;
pub mod request;

pub use errors::*;
pub use model::*;
pub use request::*;
