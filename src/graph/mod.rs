//! The instantiation graph the backtracer walks.
//!
//! Facts, preferences, instantiations and conditions live in generation-checked
//! arenas and point at each other through handles:
//!
//! - an instantiation owns its conditions and lists the preferences it made
//! - a condition references the fact it matched and the preference that
//!   supported it (plus any CDPS entries)
//! - a fact references its supporting preference
//! - a preference references the instantiation that made it
//!
//! Preferences are reference counted by the facts, condition traces and CDPS
//! entries holding them, and stay alive while still in their slot. An
//! instantiation stays alive while it is in the match set or while any
//! preference it produced survives. [`InstantiationGraph::retract_from_match_set`],
//! [`remove_preference_from_slot`](InstantiationGraph::remove_preference_from_slot)
//! and [`remove_wme`](InstantiationGraph::remove_wme) run the deallocation
//! cascade.

pub mod instantiation;
pub mod preference;
pub mod wme;

use std::collections::VecDeque;

use crate::arena::{Arena, Handle};
use crate::condition::{Condition, ConditionKind};
use crate::error::{EbcResult, GraphError};
use crate::identity::{GroundingAllocator, GroundingId, IdentityTriple, WmeField};
use crate::symbol::{ATTRIBUTE_IMPASSE_LEVEL, GoalLevel, Sym, SymbolTable};
use crate::test::TestKind;

pub use instantiation::{Instantiation, NotPair};
pub use preference::{Preference, PreferenceType};
pub use wme::Wme;

/// Value of a backtrace or grounds epoch counter. Zero means "never".
pub type Epoch = u64;

pub type WmeId = Handle<Wme>;
pub type PrefId = Handle<Preference>;
pub type InstId = Handle<Instantiation>;
pub type ConditionId = Handle<Condition>;

/// Records freed by one lifecycle operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Deallocated {
    pub preferences: Vec<PrefId>,
    pub instantiations: Vec<InstId>,
    pub conditions: Vec<ConditionId>,
}

enum Pending {
    Preference(PrefId),
    Instantiation(InstId),
}

/// One agent's instantiation graph.
#[derive(Debug)]
pub struct InstantiationGraph {
    symbols: SymbolTable,
    groundings: GroundingAllocator,
    wmes: Arena<Wme>,
    preferences: Arena<Preference>,
    instantiations: Arena<Instantiation>,
    conditions: Arena<Condition>,
    next_timetag: u64,
}

fn stale<T>(kind: &'static str, handle: Handle<T>) -> GraphError {
    GraphError::StaleHandle {
        kind,
        handle: format!("{handle:?}"),
    }
}

impl InstantiationGraph {
    pub fn new() -> EbcResult<Self> {
        Ok(Self {
            symbols: SymbolTable::new()?,
            groundings: GroundingAllocator::new(),
            wmes: Arena::new(),
            preferences: Arena::new(),
            instantiations: Arena::new(),
            conditions: Arena::new(),
            next_timetag: 1,
        })
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn symbols_mut(&mut self) -> &mut SymbolTable {
        &mut self.symbols
    }

    pub fn grounding_allocator_mut(&mut self) -> &mut GroundingAllocator {
        &mut self.groundings
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn wme(&self, id: WmeId) -> EbcResult<&Wme> {
        self.wmes.get(id).ok_or_else(|| stale("wme", id).into())
    }

    pub fn wme_mut(&mut self, id: WmeId) -> EbcResult<&mut Wme> {
        self.wmes.get_mut(id).ok_or_else(|| stale("wme", id).into())
    }

    pub fn preference(&self, id: PrefId) -> EbcResult<&Preference> {
        self.preferences
            .get(id)
            .ok_or_else(|| stale("preference", id).into())
    }

    pub fn preference_mut(&mut self, id: PrefId) -> EbcResult<&mut Preference> {
        self.preferences
            .get_mut(id)
            .ok_or_else(|| stale("preference", id).into())
    }

    pub fn instantiation(&self, id: InstId) -> EbcResult<&Instantiation> {
        self.instantiations
            .get(id)
            .ok_or_else(|| stale("instantiation", id).into())
    }

    pub fn instantiation_mut(&mut self, id: InstId) -> EbcResult<&mut Instantiation> {
        self.instantiations
            .get_mut(id)
            .ok_or_else(|| stale("instantiation", id).into())
    }

    pub fn condition(&self, id: ConditionId) -> EbcResult<&Condition> {
        self.conditions
            .get(id)
            .ok_or_else(|| stale("condition", id).into())
    }

    pub fn condition_mut(&mut self, id: ConditionId) -> EbcResult<&mut Condition> {
        self.conditions
            .get_mut(id)
            .ok_or_else(|| stale("condition", id).into())
    }

    pub fn wme_count(&self) -> usize {
        self.wmes.len()
    }

    pub fn preference_count(&self) -> usize {
        self.preferences.len()
    }

    pub fn instantiation_count(&self) -> usize {
        self.instantiations.len()
    }

    pub fn condition_count(&self) -> usize {
        self.conditions.len()
    }

    pub fn instantiations(&self) -> impl Iterator<Item = (InstId, &Instantiation)> + '_ {
        self.instantiations.iter()
    }

    // -----------------------------------------------------------------------
    // Building
    // -----------------------------------------------------------------------

    /// Add a fact, optionally supported by `preference`.
    pub fn add_wme(
        &mut self,
        id: Sym,
        attr: Sym,
        value: Sym,
        acceptable: bool,
        preference: Option<PrefId>,
    ) -> EbcResult<WmeId> {
        if let Some(pref) = preference {
            self.preference_mut(pref)?.reference_count += 1;
        }
        let mut wme = Wme::new(id, attr, value, acceptable, self.next_timetag);
        wme.preference = preference;
        self.next_timetag += 1;
        Ok(self.wmes.insert(wme))
    }

    /// Add a rule firing. Its level is the match goal's level, or
    /// [`ATTRIBUTE_IMPASSE_LEVEL`] when there is no match goal.
    pub fn add_instantiation(&mut self, prod_name: Option<&str>, match_goal: Option<Sym>) -> InstId {
        let level = match_goal
            .as_ref()
            .and_then(|goal| goal.level())
            .unwrap_or(ATTRIBUTE_IMPASSE_LEVEL);
        self.instantiations.insert(Instantiation::new(
            prod_name.map(str::to_string),
            match_goal,
            level,
        ))
    }

    pub fn set_reliable(&mut self, inst: InstId, reliable: bool) -> EbcResult<()> {
        self.instantiation_mut(inst)?.reliable = reliable;
        Ok(())
    }

    pub fn add_not(&mut self, inst: InstId, a: Sym, b: Sym) -> EbcResult<()> {
        self.instantiation_mut(inst)?.nots.push(NotPair { a, b });
        Ok(())
    }

    /// Add a condition to the end of `inst`'s condition list.
    ///
    /// For a positive condition with a matched fact, the goal level and the
    /// supporting preference are filled in from the fact, the trace and CDPS
    /// entries take their references, and every equality test is grounded.
    pub fn add_condition(&mut self, inst: InstId, mut condition: Condition) -> EbcResult<ConditionId> {
        let level = self.instantiation(inst)?.match_goal_level;
        condition.inst = Some(inst);

        if condition.is_positive() {
            if let Some(wme_id) = condition.bt.wme {
                let wme = self.wme(wme_id)?;
                condition.bt.level = wme.id.level().unwrap_or(level);
                if condition.bt.trace.is_none() {
                    condition.bt.trace = wme.preference;
                }
                for field in WmeField::ALL {
                    if let Some(test) = condition.field_mut(field) {
                        for member in test.members_mut() {
                            if member.is_equality() && member.identity.grounding_id.is_none() {
                                member.identity.cache_grounding(wme_id, field);
                            }
                        }
                    }
                }
            }
            let held: Vec<PrefId> = condition
                .bt
                .trace
                .iter()
                .chain(condition.bt.cdps.iter())
                .copied()
                .collect();
            for pref in held {
                self.preference_mut(pref)?.reference_count += 1;
            }
        }

        let id = self.conditions.insert(condition);
        self.instantiation_mut(inst)?.conditions.push(id);
        self.assign_grounding_ids(inst)?;
        Ok(id)
    }

    /// Positive condition matching `wme` exactly, with optional rule
    /// variables recorded as provenance on each field.
    pub fn add_matched_condition(
        &mut self,
        inst: InstId,
        wme: WmeId,
        vars: [Option<Sym>; 3],
    ) -> EbcResult<ConditionId> {
        let fact = self.wme(wme)?;
        let mut condition = Condition::from_triple(&fact.id, &fact.attr, &fact.value);
        condition.test_for_acceptable_preference = fact.acceptable;
        condition.bt.wme = Some(wme);
        for (field, var) in WmeField::ALL.into_iter().zip(vars) {
            if let (Some(var), Some(test)) = (var, condition.field_mut(field)) {
                for member in test.members_mut() {
                    member.identity.set_rule_variable(&var);
                }
            }
        }
        self.add_condition(inst, condition)
    }

    /// Record `pref` as another justification of `cond`'s fact.
    pub fn add_cdps(&mut self, cond: ConditionId, pref: PrefId) -> EbcResult<()> {
        self.preference_mut(pref)?.reference_count += 1;
        self.condition_mut(cond)?.bt.cdps.push(pref);
        Ok(())
    }

    /// Add a preference made by `inst`, at `inst`'s level.
    ///
    /// Each field's identity is taken from the condition of `inst` that bound
    /// the same symbol, so add the firing's conditions first.
    pub fn add_preference(
        &mut self,
        inst: InstId,
        kind: PreferenceType,
        id: Sym,
        attr: Sym,
        value: Sym,
        referent: Option<Sym>,
    ) -> EbcResult<PrefId> {
        let level = self.instantiation(inst)?.match_goal_level;
        let identities = IdentityTriple::new(
            self.identity_for_symbol(inst, &id)?,
            self.identity_for_symbol(inst, &attr)?,
            self.identity_for_symbol(inst, &value)?,
        );
        let pref = self.preferences.insert(Preference {
            kind,
            id,
            attr,
            value,
            referent,
            identities,
            inst,
            level,
            in_slot: true,
            reference_count: 0,
            next_clone: None,
            prev_clone: None,
        });
        self.instantiation_mut(inst)?.preferences_generated.push(pref);
        Ok(pref)
    }

    /// Clone `pref` for another goal level and link it into the clone chain
    /// right after `pref`.
    pub fn add_clone(&mut self, pref: PrefId, level: GoalLevel) -> EbcResult<PrefId> {
        let original = self.preference(pref)?;
        let mut clone = original.clone();
        clone.level = level;
        clone.reference_count = 0;
        clone.prev_clone = Some(pref);
        let next = original.next_clone;
        let inst = original.inst;

        let clone_id = self.preferences.insert(clone);
        self.preference_mut(pref)?.next_clone = Some(clone_id);
        if let Some(next) = next {
            self.preference_mut(next)?.prev_clone = Some(clone_id);
        }
        self.instantiation_mut(inst)?.preferences_generated.push(clone_id);
        Ok(clone_id)
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    /// The member of `pref`'s clone chain at `level`: `pref` itself, then
    /// the clones after it, then the clones before it.
    pub fn find_clone_for_level(&self, pref: Option<PrefId>, level: GoalLevel) -> Option<PrefId> {
        let start = pref?;
        let first = self.preferences.get(start)?;
        if first.level == level {
            return Some(start);
        }
        let walk = |mut next: Option<PrefId>, forward: bool| {
            while let Some(id) = next {
                let clone = self.preferences.get(id)?;
                if clone.level == level {
                    return Some(id);
                }
                next = if forward { clone.next_clone } else { clone.prev_clone };
            }
            None
        };
        walk(first.next_clone, true).or_else(|| walk(first.prev_clone, false))
    }

    /// Grounding id for one field of a fact at one goal level, allocated on
    /// first request.
    pub fn grounding_id_for(&mut self, wme: WmeId, level: GoalLevel, field: WmeField) -> EbcResult<GroundingId> {
        let groundings = &mut self.groundings;
        let wme = self.wmes.get_mut(wme).ok_or_else(|| stale("wme", wme))?;
        Ok(wme.grounding_or_insert_with(level, field, || groundings.next_id()))
    }

    /// Ground every equality test of `inst`'s conditions that still has a
    /// cached matched fact, then drop the cache.
    pub fn assign_grounding_ids(&mut self, inst: InstId) -> EbcResult<()> {
        let (level, conditions) = {
            let inst = self.instantiation(inst)?;
            (inst.match_goal_level, inst.conditions.clone())
        };
        for cond_id in conditions {
            let mut pending = Vec::new();
            let cond = self.condition(cond_id)?;
            for field in WmeField::ALL {
                if let Some(test) = cond.field(field) {
                    for (index, member) in test.members().iter().enumerate() {
                        if let (Some(wme), Some(grounded_field)) =
                            (member.identity.grounding_wme, member.identity.grounding_field)
                        {
                            pending.push((field, index, wme, grounded_field));
                        }
                    }
                }
            }
            for (field, index, wme, grounded_field) in pending {
                let grounding = self.grounding_id_for(wme, level, grounded_field)?;
                let cond = self.condition_mut(cond_id)?;
                if let Some(member) = cond
                    .field_mut(field)
                    .and_then(|test| test.members_mut().get_mut(index))
                {
                    member.identity.grounding_id = Some(grounding);
                    member.identity.grounding_wme = None;
                    tracing::trace!(cond = %cond_id, %field, %grounding, "grounded");
                }
            }
        }
        Ok(())
    }

    /// Identity `inst` gives to `sym`: the grounding id of the first equality
    /// test in its positive conditions that is on `sym` or on a rule variable
    /// named like it.
    pub fn identity_for_symbol(&self, inst: InstId, sym: &Sym) -> EbcResult<Option<GroundingId>> {
        for &cond_id in &self.instantiation(inst)?.conditions {
            let cond = self.condition(cond_id)?;
            if !cond.is_positive() {
                continue;
            }
            for field in WmeField::ALL {
                let Some(test) = cond.field(field) else {
                    continue;
                };
                for member in test.members() {
                    let TestKind::Equality(referent) = &member.kind else {
                        continue;
                    };
                    let matches = referent == sym || member.identity.original_var.as_ref() == Some(sym);
                    if matches && member.identity.grounding_id.is_some() {
                        return Ok(member.identity.grounding_id);
                    }
                }
            }
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Remove `inst` from the match set. It is deallocated once none of its
    /// preferences survive.
    pub fn retract_from_match_set(&mut self, inst: InstId) -> EbcResult<Deallocated> {
        self.instantiation_mut(inst)?.in_ms = false;
        self.cascade(Pending::Instantiation(inst))
    }

    /// Take `pref` out of its slot. It is deallocated once nothing holds it.
    pub fn remove_preference_from_slot(&mut self, pref: PrefId) -> EbcResult<Deallocated> {
        self.preference_mut(pref)?.in_slot = false;
        self.cascade(Pending::Preference(pref))
    }

    /// Remove a fact, releasing its supporting preference.
    pub fn remove_wme(&mut self, wme: WmeId) -> EbcResult<Deallocated> {
        let removed = self.wmes.remove(wme).ok_or_else(|| stale("wme", wme))?;
        match removed.preference {
            Some(pref) => {
                self.release_preference(pref);
                self.cascade(Pending::Preference(pref))
            }
            None => Ok(Deallocated::default()),
        }
    }

    fn release_preference(&mut self, pref: PrefId) {
        if let Some(p) = self.preferences.get_mut(pref) {
            p.reference_count = p.reference_count.saturating_sub(1);
        }
    }

    fn cascade(&mut self, start: Pending) -> EbcResult<Deallocated> {
        let mut freed = Deallocated::default();
        let mut queue = VecDeque::from([start]);

        while let Some(next) = queue.pop_front() {
            match next {
                Pending::Preference(pref) => {
                    let Some(p) = self.preferences.get(pref) else {
                        continue;
                    };
                    if p.in_slot || p.reference_count > 0 {
                        continue;
                    }
                    let Some(p) = self.preferences.remove(pref) else {
                        continue;
                    };
                    if let Some(prev) = p.prev_clone.and_then(|id| self.preferences.get_mut(id)) {
                        prev.next_clone = p.next_clone;
                    }
                    if let Some(next) = p.next_clone.and_then(|id| self.preferences.get_mut(id)) {
                        next.prev_clone = p.prev_clone;
                    }
                    if let Some(inst) = self.instantiations.get_mut(p.inst) {
                        inst.preferences_generated.retain(|&other| other != pref);
                    }
                    tracing::debug!(%pref, "preference deallocated");
                    freed.preferences.push(pref);
                    queue.push_back(Pending::Instantiation(p.inst));
                }
                Pending::Instantiation(inst) => {
                    let Some(i) = self.instantiations.get(inst) else {
                        continue;
                    };
                    if i.in_ms || !i.preferences_generated.is_empty() {
                        continue;
                    }
                    let Some(i) = self.instantiations.remove(inst) else {
                        continue;
                    };
                    for cond_id in i.conditions {
                        let Some(cond) = self.conditions.remove(cond_id) else {
                            continue;
                        };
                        freed.conditions.push(cond_id);
                        if !matches!(cond.kind, ConditionKind::Positive) {
                            continue;
                        }
                        for pref in cond.bt.trace.into_iter().chain(cond.bt.cdps) {
                            self.release_preference(pref);
                            queue.push_back(Pending::Preference(pref));
                        }
                    }
                    tracing::debug!(inst = %inst, name = i.prod_name.as_deref().unwrap_or("-"), "instantiation deallocated");
                    freed.instantiations.push(inst);
                }
            }
        }
        Ok(freed)
    }
}
