//! Toolkit for writing evidence sources the broker can call.
//!
//! A source handler returns `Result<T, EvidenceSourceError>`; the
//! [`SourceResponder`] turns that into the status and [`broker_types::ErrorModel`]
//! the broker expects, and [`source_host`] installs the fault handler that
//! covers everything else.

pub mod host;
pub mod response;

pub use host::{crash_response, source_host};
pub use response::{status_for, SourceResponder};
