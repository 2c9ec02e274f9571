//! Non-cached combinators on [`Staged`](crate::Staged).
//!
//! None of these touch the stage directory: each call recomputes its output from the
//! in-memory values.

pub mod joins;
pub mod keyed;
pub mod ordering;
