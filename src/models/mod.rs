//! Data models for the Rollcall backend.
//!
//! Field names serialize in camelCase to match the stored document shape.

mod group;
mod member;
mod snapshot;

pub use group::*;
pub use member::*;
pub use snapshot::*;
