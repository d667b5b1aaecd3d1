//! Working-memory elements (facts).

use std::collections::HashMap;
use std::fmt;

use crate::graph::{ConditionId, Epoch, PrefId};
use crate::identity::{GroundingId, WmeField};
use crate::symbol::{GoalLevel, Sym};

/// One identifier/attribute/value fact.
#[derive(Debug, Clone)]
pub struct Wme {
    pub id: Sym,
    pub attr: Sym,
    pub value: Sym,
    /// The fact is an acceptable-preference fact.
    pub acceptable: bool,
    pub timetag: u64,
    /// Preference supporting this fact, if it was not created by the
    /// architecture. Holds a reference on the preference.
    pub preference: Option<PrefId>,
    /// Grounds epoch in which a condition last grounded this fact.
    pub grounds_tc: Epoch,
    /// First condition that grounded this fact in the current grounds epoch.
    pub first_ground_cond: Option<ConditionId>,
    groundings: HashMap<(GoalLevel, WmeField), GroundingId>,
}

impl Wme {
    pub(crate) fn new(id: Sym, attr: Sym, value: Sym, acceptable: bool, timetag: u64) -> Self {
        Self {
            id,
            attr,
            value,
            acceptable,
            timetag,
            preference: None,
            grounds_tc: 0,
            first_ground_cond: None,
            groundings: HashMap::new(),
        }
    }

    pub fn field(&self, field: WmeField) -> &Sym {
        match field {
            WmeField::Id => &self.id,
            WmeField::Attr => &self.attr,
            WmeField::Value => &self.value,
        }
    }

    /// Grounding id already assigned for `(level, field)`.
    pub fn grounding(&self, level: GoalLevel, field: WmeField) -> Option<GroundingId> {
        self.groundings.get(&(level, field)).copied()
    }

    pub(crate) fn grounding_or_insert_with(
        &mut self,
        level: GoalLevel,
        field: WmeField,
        allocate: impl FnOnce() -> GroundingId,
    ) -> GroundingId {
        *self.groundings.entry((level, field)).or_insert_with(allocate)
    }
}

impl fmt::Display for Wme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}: {} ^{} {}", self.timetag, self.id, self.attr, self.value)?;
        if self.acceptable {
            f.write_str(" +")?;
        }
        f.write_str(")")
    }
}
