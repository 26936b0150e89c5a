//! # hx-core
//!
//! Core types shared across Histoscope crates: the error taxonomy and the
//! fit-result structures exchanged with external fit services.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{FitResults, NuisanceParameters};

/// Histoscope version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
