//! Family+subtype algebra (C1).
//!
//! An [`EventType`] is a `(family, subtype-bitmask)` pair. Family 0 is
//! reserved for control events emitted by the core itself (currently only
//! [`SUB_END`]). A registration whose bitmask is 0 matches any subtype in
//! that family — see [`EventType::matches`].

use anyhow::{anyhow, Result};
use std::fmt;
use std::str::FromStr;

/// Family reserved for events the core itself emits.
pub const CONTROL_FAMILY: u8 = 0;

/// Bit 0 of the control family: subscription-ended notice.
pub const SUB_END_SUBTYPE: u16 = 1 << 0;

/// `(family, subtype-bit)` event type, with bitmask-based filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventType {
    family: u8,
    subtype: u16,
}

impl EventType {
    /// Build a type from a family and a subtype bitmask (may be a single bit,
    /// several OR'd together, or 0 meaning "whole family" when used as a filter).
    pub const fn new(family: u8, subtype: u16) -> Self {
        Self { family, subtype }
    }

    /// The terminal control event delivered to async-task subscriptions.
    pub const fn sub_end() -> Self {
        Self::new(CONTROL_FAMILY, SUB_END_SUBTYPE)
    }

    #[inline]
    pub const fn family(&self) -> u8 {
        self.family
    }

    #[inline]
    pub const fn subtype(&self) -> u16 {
        self.subtype
    }

    /// True iff exactly one subtype bit is set — the shape a *published*
    /// event (as opposed to a filter) must have.
    #[inline]
    pub const fn is_single_subtype(&self) -> bool {
        self.subtype != 0 && self.subtype.count_ones() == 1
    }

    /// OR two types' bitmasks together. Fails if the families differ —
    /// a registration can't span families.
    pub fn union(a: EventType, b: EventType) -> Result<EventType> {
        if a.family != b.family {
            return Err(anyhow!(
                "event type union: family mismatch ({} vs {})",
                a.family,
                b.family
            ));
        }
        Ok(EventType::new(a.family, a.subtype | b.subtype))
    }

    /// `filter` matches `event` iff families are equal and bitmasks
    /// intersect. `filter.subtype() == 0` is shorthand for "any subtype".
    #[inline]
    pub fn matches(&self, event: EventType) -> bool {
        self.family == event.family && (self.subtype == 0 || (self.subtype & event.subtype) != 0)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = registry::lookup_name(self.family, self.subtype) {
            write!(f, "{name}")
        } else {
            write!(f, "{}:{:#06x}", self.family, self.subtype)
        }
    }
}

impl FromStr for EventType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some(t) = registry::lookup_type(s) {
            return Ok(t);
        }
        let (fam, sub) = s
            .split_once(':')
            .ok_or_else(|| anyhow!("event type {:?}: expected \"family:subtype\" or a registered name", s))?;
        let family: u8 = fam.parse().map_err(|_| anyhow!("bad family in {:?}", s))?;
        let subtype = if let Some(hex) = sub.strip_prefix("0x") {
            u16::from_str_radix(hex, 16).map_err(|_| anyhow!("bad subtype in {:?}", s))?
        } else {
            sub.parse().map_err(|_| anyhow!("bad subtype in {:?}", s))?
        };
        Ok(EventType::new(family, subtype))
    }
}

/// Static name registry backing [`EventType`]'s `Display`/`FromStr`, keyed on
/// `(family, subtype-bit-position)`. Up to 256 families, 16 subtypes per family.
mod registry {
    use super::EventType;
    use std::collections::HashMap;
    use std::sync::OnceLock;
    use std::sync::RwLock;

    fn table() -> &'static RwLock<HashMap<(u8, u8), &'static str>> {
        static TABLE: OnceLock<RwLock<HashMap<(u8, u8), &'static str>>> = OnceLock::new();
        TABLE.get_or_init(|| RwLock::new(HashMap::new()))
    }

    fn names() -> &'static RwLock<HashMap<&'static str, EventType>> {
        static NAMES: OnceLock<RwLock<HashMap<&'static str, EventType>>> = OnceLock::new();
        NAMES.get_or_init(|| RwLock::new(HashMap::new()))
    }

    /// Register a human-readable name for a single subtype bit in a family.
    /// `bit` is the bit position (0..16), not the mask.
    pub fn register(family: u8, bit: u8, name: &'static str) {
        table().write().unwrap().insert((family, bit), name);
        names().write().unwrap().insert(name, EventType::new(family, 1u16 << bit));
    }

    pub fn lookup_name(family: u8, subtype: u16) -> Option<&'static str> {
        if subtype.count_ones() != 1 {
            return None;
        }
        let bit = subtype.trailing_zeros() as u8;
        table().read().unwrap().get(&(family, bit)).copied()
    }

    pub fn lookup_type(name: &str) -> Option<EventType> {
        names().read().unwrap().get(name).copied()
    }
}

/// Register a human-readable name for a single subtype bit (`bit` is the bit
/// position, not the mask) of `family`, used by `Display`/`FromStr`.
pub fn register_name(family: u8, bit: u8, name: &'static str) {
    registry::register(family, bit, name);
}
