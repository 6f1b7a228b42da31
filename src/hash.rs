//! Stable ID hashing for subscription lookup.
//!
//! Goals:
//! - Use a stable, explicit hash (not std's `DefaultHasher`, which is not
//!   guaranteed stable across releases) so an `id` computed once keeps
//!   meaning for the life of the process.
//! - Collisions are tolerated: callers who can't accept collision risk
//!   should use the pointer-subscribe path instead of identified lookup.

use std::hash::{Hash, Hasher};
use twox_hash::XxHash64;

/// Compute a stable 64-bit id from a scope and a name. Callers own scope
/// uniqueness (e.g. `bus_id(b"filters", b"my-filter")`).
pub fn bus_id(scope: &[u8], name: &[u8]) -> u64 {
    let mut h = XxHash64::with_seed(0);
    scope.hash(&mut h);
    name.hash(&mut h);
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_inputs_hash_the_same() {
        assert_eq!(bus_id(b"scope", b"name"), bus_id(b"scope", b"name"));
    }

    #[test]
    fn different_scope_changes_the_hash() {
        assert_ne!(bus_id(b"a", b"name"), bus_id(b"b", b"name"));
    }
}
