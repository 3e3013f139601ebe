//! Parking survey rover: plate detection, reading and registration.
//!
//! The implementation lives in the workspace crates; this package hosts the
//! cross-crate integration tests.

pub use common;
pub use rover_service;
