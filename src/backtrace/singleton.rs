//! Singleton unification.
//!
//! Some facts can exist only once per goal: a state's `^superstate` and its
//! selected `^operator`. Two conditions matching such a fact must end up with
//! the same identities, so the backtracer unifies them when it notices.

use crate::error::EbcResult;
use crate::graph::ConditionId;
use crate::unify::{IdentityUnifier, unify_triples};

use super::BacktraceSession;

impl<U: IdentityUnifier + ?Sized> BacktraceSession<'_, U> {
    /// Whether `cond` matched a goal's `^operator` or `^superstate` fact.
    fn matches_grounded_singleton(&self, cond: ConditionId) -> EbcResult<bool> {
        let wme = self.graph.wme(self.matched_wme(cond)?)?;
        let arch = self.graph.symbols().arch();
        Ok(wme.id.is_goal() && (wme.attr == arch.operator || wme.attr == arch.superstate))
    }

    /// Whether `cond` matched the `^superstate` fact of a goal.
    fn matches_local_superstate(&self, cond: ConditionId) -> EbcResult<bool> {
        let wme = self.graph.wme(self.matched_wme(cond)?)?;
        let arch = self.graph.symbols().arch();
        Ok(wme.id.is_goal() && wme.attr == arch.superstate)
    }

    /// `cond` grounds the same fact as `first`, an earlier ground of this
    /// build. Unify them if the fact is a singleton.
    pub(super) fn add_singleton_unification_if_needed(
        &mut self,
        cond: ConditionId,
        first: ConditionId,
    ) -> EbcResult<()> {
        if !self.matches_grounded_singleton(cond)? {
            return Ok(());
        }
        let ours = self.graph.condition(cond)?.identity_triple();
        let theirs = self.graph.condition(first)?.identity_triple();
        let sent = unify_triples(&mut *self.unifier, &ours, &theirs);
        tracing::debug!(cond = %cond, first = %first, sent, "repeated singleton ground unified");
        self.stats.singleton_unifications += 1;
        self.stats.unification_requests += sent as u64;
        Ok(())
    }

    /// Every local `^superstate` condition of a build shares the identities
    /// of the first one seen.
    pub(super) fn add_local_singleton_unification_if_needed(&mut self, cond: ConditionId) -> EbcResult<()> {
        if !self.matches_local_superstate(cond)? {
            return Ok(());
        }
        let ours = self.graph.condition(cond)?.identity_triple();
        let Some(cached) = self.local_singleton_superstate else {
            tracing::trace!(cond = %cond, "caching local superstate identities");
            self.local_singleton_superstate = Some(ours);
            return Ok(());
        };
        let sent = unify_triples(&mut *self.unifier, &ours, &cached);
        tracing::debug!(cond = %cond, sent, "local superstate unified");
        self.stats.singleton_unifications += 1;
        self.stats.unification_requests += sent as u64;
        Ok(())
    }
}
