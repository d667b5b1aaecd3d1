//! Identity (provenance) metadata attached to tests.
//!
//! An identity links a test to the rule variable it came from and to the
//! field of the fact it matched. The grounding id is what the chunker
//! reasons about: two tests denote the same learned variable iff their
//! grounding ids end up in the same equivalence class, and the core's job is
//! to request the right unifications between them.

use std::num::NonZeroU64;

use serde::{Deserialize, Serialize};

use crate::graph::WmeId;
use crate::symbol::Sym;

/// Lazily assigned id scoping one field of one fact to one goal-stack level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct GroundingId(NonZeroU64);

impl GroundingId {
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(GroundingId)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for GroundingId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Hands out fresh grounding ids, one agent-wide sequence.
#[derive(Debug)]
pub struct GroundingAllocator {
    next: u64,
}

impl GroundingAllocator {
    pub fn new() -> Self {
        Self { next: 1 }
    }

    pub fn next_id(&mut self) -> GroundingId {
        let raw = self.next;
        self.next += 1;
        // `next` starts at 1 and only grows.
        GroundingId(NonZeroU64::MIN.saturating_add(raw - 1))
    }
}

impl Default for GroundingAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Which field of a fact a test grounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WmeField {
    Id,
    Attr,
    Value,
}

impl WmeField {
    pub const ALL: [WmeField; 3] = [WmeField::Id, WmeField::Attr, WmeField::Value];
}

impl std::fmt::Display for WmeField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WmeField::Id => f.write_str("id"),
            WmeField::Attr => f.write_str("attr"),
            WmeField::Value => f.write_str("value"),
        }
    }
}

/// Provenance record carried by every non-conjunctive test.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Identity {
    /// Rule variable this test traces back to, if it came from one.
    pub original_var: Option<Sym>,
    pub grounding_id: Option<GroundingId>,
    pub grounding_field: Option<WmeField>,
    /// Matched fact cached while a condition is being reconstructed. Cleared
    /// once the grounding id has been assigned.
    pub grounding_wme: Option<WmeId>,
}

impl Identity {
    /// An identity is empty until it has been grounded.
    pub fn is_empty(&self) -> bool {
        self.grounding_id.is_none()
    }

    /// Record `sym` as the originating rule variable. Non-variables carry no
    /// provenance, so anything else clears it.
    pub fn set_rule_variable(&mut self, sym: &Sym) {
        self.original_var = sym.is_variable().then(|| sym.clone());
    }

    /// Cache the matched fact and field until a grounding id is assigned.
    pub fn cache_grounding(&mut self, wme: WmeId, field: WmeField) {
        self.grounding_wme = Some(wme);
        self.grounding_field = Some(field);
    }
}

/// Grounding ids for the three fields of a condition or preference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdentityTriple {
    pub id: Option<GroundingId>,
    pub attr: Option<GroundingId>,
    pub value: Option<GroundingId>,
}

impl IdentityTriple {
    pub fn new(
        id: Option<GroundingId>,
        attr: Option<GroundingId>,
        value: Option<GroundingId>,
    ) -> Self {
        Self { id, attr, value }
    }

    pub fn field(&self, field: WmeField) -> Option<GroundingId> {
        match field {
            WmeField::Id => self.id,
            WmeField::Attr => self.attr,
            WmeField::Value => self.value,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.attr.is_none() && self.value.is_none()
    }
}
