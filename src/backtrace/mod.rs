//! The backtracer.
//!
//! Starting from the instantiation that produced a result, the backtracer
//! walks the instantiation graph and sorts every instantiated condition it
//! meets:
//!
//! - grounds: positive conditions on identifiers at or above the grounds
//!   level, kept in the learned rule
//! - locals: positive conditions below it, traced further back through the
//!   preference that supported their fact
//! - negated: negative and negated-conjunction conditions, grounded later
//!
//! Each instantiation is visited at most once per chunk build (backtrace
//! epoch), and the first condition grounding each fact is remembered (grounds
//! epoch) so later ones can be unified with it. Locals are drained from an
//! explicit worklist, never by recursion.

pub mod singleton;
pub mod trace;

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::chunk_cond::{ChunkCondSet, make_chunk_cond_for_negated_condition};
use crate::condition::Condition;
use crate::config::{EbcConfig, LocalsOrder};
use crate::error::{BacktraceError, EbcResult, GraphError};
use crate::graph::{ConditionId, Epoch, InstId, InstantiationGraph, WmeId};
use crate::identity::{IdentityTriple, WmeField};
use crate::symbol::GoalLevel;
use crate::unify::{IdentityUnifier, request_unification};

pub use trace::{TraceEvent, Tracer};

/// Why an instantiation was backtraced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BacktraceSource {
    /// The instantiation that produced the result.
    Base,
    /// Producer of a local condition's fact.
    Normal,
    /// Producer of a conditionally dependent preference.
    Cdps,
    /// Producer of another result of the same chunk.
    ExtraResult,
}

/// One instantiation visit, in visiting order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Visit {
    pub inst: InstId,
    pub source: BacktraceSource,
}

/// Counters for one chunk build.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BacktraceStats {
    pub instantiations_backtraced: u64,
    /// Visits stopped by the epoch gate.
    pub seen_instantiations_backtraced: u64,
    pub grounds: u64,
    pub locals: u64,
    /// Negated conditions admitted to the set; duplicates are not counted.
    pub negated: u64,
    /// Locals whose fact had no supporting preference at the right level.
    pub locals_dropped: u64,
    pub cdps_traced: u64,
    pub unification_requests: u64,
    pub singleton_unifications: u64,
    #[serde(skip)]
    pub visited: Vec<Visit>,
}

/// What a finished chunk build hands to chunk assembly.
#[derive(Debug)]
pub struct BacktraceOutcome {
    /// Grounds, in the order they were found.
    pub grounds: Vec<ConditionId>,
    /// Every condition classified local, in the order found.
    pub locals: Vec<ConditionId>,
    pub negated: ChunkCondSet,
    pub reliable: bool,
    pub stats: BacktraceStats,
    pub events: Vec<TraceEvent>,
}

/// Per-agent chunker state that survives across chunk builds.
#[derive(Debug, Default)]
pub struct ExplanationChunker {
    config: EbcConfig,
    backtrace_number: Epoch,
    grounds_tc: Epoch,
}

impl ExplanationChunker {
    pub fn new(config: EbcConfig) -> Self {
        Self {
            config,
            backtrace_number: 0,
            grounds_tc: 0,
        }
    }

    pub fn config(&self) -> &EbcConfig {
        &self.config
    }

    /// Epoch of the most recent chunk build.
    pub fn backtrace_number(&self) -> Epoch {
        self.backtrace_number
    }

    /// Start a chunk build: bump both epochs and open a fresh session.
    pub fn begin_build<'g, U>(
        &mut self,
        graph: &'g mut InstantiationGraph,
        unifier: &'g mut U,
    ) -> BacktraceSession<'g, U>
    where
        U: IdentityUnifier + ?Sized,
    {
        self.backtrace_number += 1;
        self.grounds_tc += 1;
        tracing::debug!(epoch = self.backtrace_number, "chunk build started");
        BacktraceSession {
            graph,
            unifier,
            locals_order: self.config.locals_order,
            backtrace_number: self.backtrace_number,
            grounds_tc: self.grounds_tc,
            grounds: Vec::new(),
            locals: VecDeque::new(),
            all_locals: Vec::new(),
            negated: ChunkCondSet::new(),
            local_singleton_superstate: None,
            reliable: true,
            stats: BacktraceStats::default(),
            tracer: Tracer::new(self.config.trace_backtracing),
        }
    }

    /// Run a whole build: backtrace the base instantiation and any extra
    /// results, drain the locals, and return the outcome.
    pub fn explain<U>(
        &mut self,
        graph: &mut InstantiationGraph,
        unifier: &mut U,
        base: InstId,
        grounds_level: GoalLevel,
        extra_results: &[InstId],
    ) -> EbcResult<BacktraceOutcome>
    where
        U: IdentityUnifier + ?Sized,
    {
        let mut session = self.begin_build(graph, unifier);
        session.backtrace(base, grounds_level, None, None, 0, BacktraceSource::Base)?;
        for &extra in extra_results {
            session.backtrace(extra, grounds_level, None, None, 0, BacktraceSource::ExtraResult)?;
        }
        session.trace_locals(grounds_level)?;
        Ok(session.finish())
    }
}

/// State of one chunk build. Dropped (or finished) at the end of the build.
pub struct BacktraceSession<'g, U: IdentityUnifier + ?Sized> {
    graph: &'g mut InstantiationGraph,
    unifier: &'g mut U,
    locals_order: LocalsOrder,
    backtrace_number: Epoch,
    grounds_tc: Epoch,
    grounds: Vec<ConditionId>,
    locals: VecDeque<ConditionId>,
    all_locals: Vec<ConditionId>,
    negated: ChunkCondSet,
    local_singleton_superstate: Option<IdentityTriple>,
    reliable: bool,
    stats: BacktraceStats,
    tracer: Tracer,
}

impl<U: IdentityUnifier + ?Sized> BacktraceSession<'_, U> {
    pub fn grounds(&self) -> &[ConditionId] {
        &self.grounds
    }

    /// Locals still waiting to be traced.
    pub fn pending_locals(&self) -> impl Iterator<Item = ConditionId> + '_ {
        self.locals.iter().copied()
    }

    pub fn negated(&self) -> &ChunkCondSet {
        &self.negated
    }

    pub fn is_reliable(&self) -> bool {
        self.reliable
    }

    pub fn stats(&self) -> &BacktraceStats {
        &self.stats
    }

    pub fn graph(&self) -> &InstantiationGraph {
        self.graph
    }

    /// Backtrace through one instantiation.
    ///
    /// If `trace_cond` is given, its identities are first unified with
    /// `identities_to_unify` (the producing preference's identities). This
    /// happens even when the instantiation was already visited in this build.
    pub fn backtrace(
        &mut self,
        inst_id: InstId,
        grounds_level: GoalLevel,
        trace_cond: Option<ConditionId>,
        identities_to_unify: Option<IdentityTriple>,
        depth: u64,
        source: BacktraceSource,
    ) -> EbcResult<()> {
        let name = self.graph.instantiation(inst_id)?.name().to_string();
        tracing::debug!(inst = %inst_id, %name, grounds_level, epoch = self.backtrace_number, ?source, "backtracing");

        if let Some(cond) = trace_cond {
            self.unify_backtraced_conditions(cond, &identities_to_unify.unwrap_or_default())?;
        }

        let depth = depth + 1;
        let inst = self.graph.instantiation_mut(inst_id)?;
        inst.explain_depth = inst.explain_depth.min(depth);

        if inst.backtrace_number == self.backtrace_number {
            self.stats.seen_instantiations_backtraced += 1;
            self.tracer.emit(|| TraceEvent::Backtrace {
                production: name,
                already_backtraced: true,
            });
            tracing::trace!(inst = %inst_id, "already backtraced");
            return Ok(());
        }
        inst.backtrace_number = self.backtrace_number;
        if !inst.reliable {
            tracing::debug!(inst = %inst_id, "unreliable instantiation in derivation");
            self.reliable = false;
        }
        let conditions = inst.conditions.clone();

        self.stats.instantiations_backtraced += 1;
        self.stats.visited.push(Visit {
            inst: inst_id,
            source,
        });
        self.tracer.emit(|| TraceEvent::Backtrace {
            production: name,
            already_backtraced: false,
        });

        let mut grounds_here = Vec::new();
        let mut locals_here = Vec::new();
        let mut negated_here = Vec::new();
        for cond_id in conditions {
            let cond = self.graph.condition(cond_id)?;
            if cond.is_positive() {
                if condition_is_operational(cond, grounds_level)? {
                    self.add_to_grounds(cond_id)?;
                    grounds_here.push(cond_id);
                } else {
                    self.add_to_locals(cond_id)?;
                    locals_here.push(cond_id);
                }
                continue;
            }
            tracing::trace!(cond = %cond, "negated condition");
            let cc = make_chunk_cond_for_negated_condition(cond_id, cond);
            if self.negated.insert(cc) {
                self.stats.negated += 1;
            }
            negated_here.push(cond_id);
        }

        if self.tracer.enabled() {
            let wmes = |ids: &[ConditionId]| -> EbcResult<Vec<String>> {
                ids.iter().map(|&id| self.describe_wme(id)).collect()
            };
            let grounds = wmes(&grounds_here)?;
            let locals = wmes(&locals_here)?;
            let negated = negated_here
                .iter()
                .map(|&id| self.graph.condition(id).map(ToString::to_string))
                .collect::<EbcResult<Vec<_>>>()?;
            self.tracer.emit(|| TraceEvent::Grounds { wmes: grounds });
            self.tracer.emit(|| TraceEvent::Locals { wmes: locals });
            self.tracer.emit(|| TraceEvent::Negated { conditions: negated });
        }
        Ok(())
    }

    /// Drain the locals worklist, backtracing through the producer of each
    /// local's fact one level below the grounds level. Locals found along the
    /// way join the same worklist.
    pub fn trace_locals(&mut self, grounds_level: GoalLevel) -> EbcResult<()> {
        tracing::debug!(grounds_level, "tracing locals");
        self.tracer.emit(|| TraceEvent::TracingLocals);

        while let Some(cond_id) = self.next_local() {
            let cond = self.graph.condition(cond_id)?;
            let trace = cond.bt.trace;
            let cdps = cond.bt.cdps.clone();
            let owner = cond.inst;
            if self.tracer.enabled() {
                let wme = self.describe_wme(cond_id)?;
                self.tracer.emit(|| TraceEvent::Local { wme });
            }

            let producer = grounds_level
                .checked_add(1)
                .and_then(|level| self.graph.find_clone_for_level(trace, level));

            if let Some(pref_id) = producer {
                let depth = match owner {
                    Some(owner) => self.graph.instantiation(owner)?.explain_depth,
                    None => 0,
                };
                let pref = self.graph.preference(pref_id)?;
                let (inst, identities) = (pref.inst, pref.identities);
                self.backtrace(inst, grounds_level, Some(cond_id), Some(identities), depth, BacktraceSource::Normal)?;

                for cdps_pref in cdps {
                    let pref = self.graph.preference(cdps_pref)?;
                    let inst = pref.inst;
                    if self.tracer.enabled() {
                        let preference = pref.to_string();
                        self.tracer.emit(|| TraceEvent::CdpsPreference { preference });
                    }
                    self.stats.cdps_traced += 1;
                    self.backtrace(inst, grounds_level, None, None, depth, BacktraceSource::Cdps)?;
                }
                continue;
            }

            self.stats.locals_dropped += 1;
            if self.tracer.enabled() {
                let wme = self.describe_wme(cond_id)?;
                self.tracer.emit(|| TraceEvent::NoTrace { wme });
            }

            let cond = self.graph.condition(cond_id)?;
            let id = cond.require_equality_referent(WmeField::Id)?;
            if id.is_goal() {
                let arch = self.graph.symbols().arch();
                let attr = cond.require_equality_referent(WmeField::Attr)?;
                let value = cond.require_equality_referent(WmeField::Value)?;
                if *attr == arch.quiescence && *value == arch.t && !cond.test_for_acceptable_preference {
                    tracing::debug!(cond = %cond, "quiescence dependency");
                    self.reliable = false;
                    if self.tracer.enabled() {
                        let wme = self.describe_wme(cond_id)?;
                        self.tracer.emit(|| TraceEvent::QuiescenceDependency { wme });
                    }
                }
                continue;
            }
            tracing::trace!(cond = %cond_id, "local condition dropped, no trace");
        }
        Ok(())
    }

    /// Close the session and hand over its results.
    pub fn finish(self) -> BacktraceOutcome {
        tracing::debug!(
            epoch = self.backtrace_number,
            grounds = self.grounds.len(),
            negated = self.negated.len(),
            reliable = self.reliable,
            "chunk build finished"
        );
        BacktraceOutcome {
            grounds: self.grounds,
            locals: self.all_locals,
            negated: self.negated,
            reliable: self.reliable,
            stats: self.stats,
            events: self.tracer.into_events(),
        }
    }

    fn next_local(&mut self) -> Option<ConditionId> {
        match self.locals_order {
            LocalsOrder::Lifo => self.locals.pop_back(),
            LocalsOrder::Fifo => self.locals.pop_front(),
        }
    }

    fn add_to_grounds(&mut self, cond_id: ConditionId) -> EbcResult<()> {
        let wme_id = self.matched_wme(cond_id)?;
        let grounds_tc = self.grounds_tc;
        let wme = self.graph.wme_mut(wme_id)?;
        let first = if wme.grounds_tc != grounds_tc {
            wme.grounds_tc = grounds_tc;
            wme.first_ground_cond = Some(cond_id);
            None
        } else {
            wme.first_ground_cond.filter(|&first| first != cond_id)
        };
        if let Some(first) = first {
            self.add_singleton_unification_if_needed(cond_id, first)?;
        }
        tracing::trace!(cond = %cond_id, "ground condition added");
        self.stats.grounds += 1;
        self.grounds.push(cond_id);
        Ok(())
    }

    fn add_to_locals(&mut self, cond_id: ConditionId) -> EbcResult<()> {
        self.add_local_singleton_unification_if_needed(cond_id)?;
        tracing::trace!(cond = %cond_id, "local condition added");
        self.stats.locals += 1;
        self.locals.push_back(cond_id);
        self.all_locals.push(cond_id);
        Ok(())
    }

    /// Unify a traced local's identities with its producer's.
    fn unify_backtraced_conditions(&mut self, cond_id: ConditionId, identities: &IdentityTriple) -> EbcResult<()> {
        let own = self.graph.condition(cond_id)?.identity_triple();
        for field in WmeField::ALL {
            if request_unification(&mut *self.unifier, own.field(field), identities.field(field)) {
                self.stats.unification_requests += 1;
            }
        }
        Ok(())
    }

    fn matched_wme(&self, cond_id: ConditionId) -> EbcResult<WmeId> {
        let cond = self.graph.condition(cond_id)?;
        cond.bt.wme.ok_or_else(|| {
            GraphError::MissingWme {
                condition: cond.to_string(),
            }
            .into()
        })
    }

    fn describe_wme(&self, cond_id: ConditionId) -> EbcResult<String> {
        let wme = self.matched_wme(cond_id)?;
        Ok(self.graph.wme(wme)?.to_string())
    }
}

/// A positive condition is operational when the identifier it tests lives at
/// or above the grounds level.
fn condition_is_operational(cond: &Condition, grounds_level: GoalLevel) -> EbcResult<bool> {
    let id = cond.require_equality_referent(WmeField::Id)?;
    let level = id.level().ok_or_else(|| BacktraceError::NonIdentifier {
        condition: cond.to_string(),
        symbol: id.name.clone(),
    })?;
    if level > cond.bt.level {
        return Err(BacktraceError::LevelInversion {
            condition: cond.to_string(),
            level,
            matched: cond.bt.level,
        }
        .into());
    }
    Ok(level <= grounds_level)
}
