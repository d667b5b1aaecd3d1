//! Identity unification requests.
//!
//! The core never merges identities itself. It tells an [`IdentityUnifier`]
//! that two grounding ids denote the same learned variable and leaves the
//! equivalence-class bookkeeping to it. The only rule enforced here is the
//! guard in [`request_unification`]: a pair with two empty sides is never
//! sent.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::identity::{GroundingAllocator, GroundingId, IdentityTriple, WmeField};

/// The external resolver of unification requests.
///
/// Implementations must treat requests as idempotent and order-insensitive:
/// `unify(a, b)` means the same as `unify(b, a)`, and repeating it changes
/// nothing.
pub trait IdentityUnifier {
    fn unify(&mut self, a: Option<GroundingId>, b: Option<GroundingId>);
}

impl<U: IdentityUnifier + ?Sized> IdentityUnifier for &mut U {
    fn unify(&mut self, a: Option<GroundingId>, b: Option<GroundingId>) {
        (**self).unify(a, b);
    }
}

/// Send `unify(a, b)` unless both sides are empty.
///
/// Returns whether a request was sent.
pub fn request_unification<U: IdentityUnifier + ?Sized>(
    unifier: &mut U,
    a: Option<GroundingId>,
    b: Option<GroundingId>,
) -> bool {
    if a.is_none() && b.is_none() {
        return false;
    }
    tracing::trace!(?a, ?b, "unify");
    unifier.unify(a, b);
    true
}

/// Unify two identity triples field by field.
///
/// Returns the number of requests sent (0 to 3).
pub fn unify_triples<U: IdentityUnifier + ?Sized>(
    unifier: &mut U,
    a: &IdentityTriple,
    b: &IdentityTriple,
) -> usize {
    WmeField::ALL
        .iter()
        .filter(|&&field| request_unification(unifier, a.field(field), b.field(field)))
        .count()
}

/// One request as seen by the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnificationRequest {
    pub a: Option<GroundingId>,
    pub b: Option<GroundingId>,
}

impl UnificationRequest {
    /// True if this request pairs `x` and `y`, in either order.
    pub fn pairs(&self, x: Option<GroundingId>, y: Option<GroundingId>) -> bool {
        (self.a == x && self.b == y) || (self.a == y && self.b == x)
    }
}

impl std::fmt::Display for UnificationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let show = |g: Option<GroundingId>| g.map_or_else(|| "-".to_string(), |g| g.to_string());
        write!(f, "{} = {}", show(self.a), show(self.b))
    }
}

/// A resolver that only records what it was asked.
#[derive(Debug, Default, Clone)]
pub struct RecordingUnifier {
    requests: Vec<UnificationRequest>,
}

impl RecordingUnifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requests(&self) -> &[UnificationRequest] {
        &self.requests
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    pub fn into_requests(self) -> Vec<UnificationRequest> {
        self.requests
    }
}

impl IdentityUnifier for RecordingUnifier {
    fn unify(&mut self, a: Option<GroundingId>, b: Option<GroundingId>) {
        self.requests.push(UnificationRequest { a, b });
    }
}

/// Canonical identities for the rule under construction.
///
/// Each source grounding id met while copying conditions into the rule is
/// mapped to one fresh id, allocated on first sight.
#[derive(Debug, Default)]
pub struct ChunkIdentities {
    canonical: HashMap<GroundingId, GroundingId>,
}

impl ChunkIdentities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn canonical_for(
        &mut self,
        source: GroundingId,
        allocator: &mut GroundingAllocator,
    ) -> GroundingId {
        *self
            .canonical
            .entry(source)
            .or_insert_with(|| allocator.next_id())
    }

    pub fn get(&self, source: GroundingId) -> Option<GroundingId> {
        self.canonical.get(&source).copied()
    }

    pub fn len(&self) -> usize {
        self.canonical.len()
    }

    pub fn is_empty(&self) -> bool {
        self.canonical.is_empty()
    }

    pub fn clear(&mut self) {
        self.canonical.clear();
    }
}
