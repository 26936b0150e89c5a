//! # hx-model
//!
//! pyhf JSON workspace schema for Histoscope: serde types for the
//! community HistFactory interchange format, plus structural validation and
//! name-listing helpers used by the aggregation engine.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod schema;
pub mod workspace;


pub use schema::*;
pub use workspace::parse_workspace;
