//! Sets of chunk conditions with duplicate detection.

use std::collections::HashMap;

use serde::Serialize;

use crate::condition::{Condition, conditions_are_equal, hash_condition};
use crate::graph::ConditionId;

/// A condition collected for the rule under construction: the source
/// condition plus an instantiated copy owned by the set.
#[derive(Debug, Clone)]
pub struct ChunkCond {
    pub cond: ConditionId,
    pub instantiated: Condition,
    pub hash: u32,
}

/// Copy a negative or negated-conjunction condition for the negated set.
pub fn make_chunk_cond_for_negated_condition(cond_id: ConditionId, cond: &Condition) -> ChunkCond {
    let instantiated = cond.clone();
    let hash = hash_condition(&instantiated);
    ChunkCond {
        cond: cond_id,
        instantiated,
        hash,
    }
}

/// Insertion-ordered set of chunk conditions, bucketed by hash.
#[derive(Debug, Default)]
pub struct ChunkCondSet {
    members: Vec<ChunkCond>,
    buckets: HashMap<u32, Vec<usize>>,
}

impl ChunkCondSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `cc` unless an equal condition is already present.
    /// Returns whether it was inserted.
    pub fn insert(&mut self, cc: ChunkCond) -> bool {
        let bucket = self.buckets.entry(cc.hash).or_default();
        if bucket
            .iter()
            .any(|&index| conditions_are_equal(&self.members[index].instantiated, &cc.instantiated))
        {
            tracing::trace!(cond = %cc.instantiated, "duplicate chunk condition");
            return false;
        }
        bucket.push(self.members.len());
        self.members.push(cc);
        true
    }

    pub fn contains(&self, cond: &Condition) -> bool {
        self.buckets.get(&hash_condition(cond)).is_some_and(|bucket| {
            bucket
                .iter()
                .any(|&index| conditions_are_equal(&self.members[index].instantiated, cond))
        })
    }

    /// Remove the member for source condition `cond`, keeping insertion order.
    pub fn remove(&mut self, cond: ConditionId) -> Option<ChunkCond> {
        let index = self.members.iter().position(|cc| cc.cond == cond)?;
        let removed = self.members.remove(index);
        self.rebuild_buckets();
        Some(removed)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChunkCond> + '_ {
        self.members.iter()
    }

    /// Source condition handles, in insertion order.
    pub fn conditions(&self) -> Vec<ConditionId> {
        self.members.iter().map(|cc| cc.cond).collect()
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn clear(&mut self) {
        self.members.clear();
        self.buckets.clear();
    }

    fn rebuild_buckets(&mut self) {
        self.buckets.clear();
        for (index, cc) in self.members.iter().enumerate() {
            self.buckets.entry(cc.hash).or_default().push(index);
        }
    }
}

/// Serialisable view of one member, for reports.
#[derive(Debug, Clone, Serialize)]
pub struct ChunkCondSummary {
    pub condition: String,
    pub hash: u32,
}

impl From<&ChunkCond> for ChunkCondSummary {
    fn from(cc: &ChunkCond) -> Self {
        Self {
            condition: cc.instantiated.to_string(),
            hash: cc.hash,
        }
    }
}
