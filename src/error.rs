//! Domain error kinds for the event bus.
//!
//! Bad-argument mistakes (malformed event type, oversized payload, family
//! change on resub) are programmer errors and panic via `assert!` at the
//! call site instead of going through this enum — see module docs on
//! `dispatcher` for the rationale. `BusError` covers the kinds that are
//! expected to happen in a correctly-written program and that a caller
//! may want to match on.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusError {
    /// Envelope or subscription allocation failed. Not retried by the core.
    AllocFailed,
    /// `resub` attempted to change the filter's family.
    FamilyMismatch { from: u8, to: u8 },
}

impl fmt::Display for BusError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BusError::AllocFailed => write!(f, "allocation failed"),
            BusError::FamilyMismatch { from, to } => {
                write!(f, "resub family mismatch: {from} -> {to}")
            }
        }
    }
}

impl std::error::Error for BusError {}
