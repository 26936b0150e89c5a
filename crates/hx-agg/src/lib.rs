//! # hx-agg
//!
//! The aggregation engine of Histoscope: turns a parsed workspace into
//! yields, stacked bin content, normalization-factor resolution, and
//! per-systematic uncertainty bands, in pre-fit and post-fit modes.
//!
//! All computations here are synchronous and pure: derived structures are
//! rebuilt from the workspace on every call, and callers decide what to
//! cache. Malformed lookups recover locally (neutral factor, zero yield)
//! with a diagnostic instead of aborting.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod modifiers;
pub mod normfactor;
pub mod postfit;
pub mod uncertainty;
pub mod yields;

pub use modifiers::{ModifierTypes, ResolvedKind};
pub use normfactor::{NormFactor, NormFactorRegistry};
pub use uncertainty::{Band, UncertaintySummary};
pub use yields::{StackedChannel, StackedChannelBinwise, StackedProcess};
