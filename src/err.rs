//! Common error utilities for this crate.
//!
//! All of the fallible layers of the crate (lexing, parsing, assembling,
//! simulating) define their own error enums. Beyond the standard
//! [`std::error::Error`] requirements, they also implement this module's
//! [`Error`] trait, which lets a frontend display richer diagnostics
//! (the offending source line and a help message) uniformly.

use std::borrow::Cow;

/// Unified error interface for all errors in this crate.
pub trait Error: std::error::Error {
    /// The 0-indexed source line this error occurred on (if known).
    ///
    /// Simulation errors have no associated source line and return `None`.
    fn line(&self) -> Option<usize> {
        None
    }

    /// A hint on how the user can fix this error (if one applies).
    fn help(&self) -> Option<Cow<str>> {
        None
    }
}
