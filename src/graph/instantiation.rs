//! Instantiations: records of rule firings.

use std::fmt;

use crate::graph::{ConditionId, Epoch, PrefId};
use crate::symbol::{GoalLevel, Sym};

/// Inequality constraint between two identifiers bound by the same firing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotPair {
    pub a: Sym,
    pub b: Sym,
}

impl fmt::Display for NotPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <> {}", self.a, self.b)
    }
}

#[derive(Debug, Clone)]
pub struct Instantiation {
    /// Rule that fired; `None` for architecturally synthesised firings.
    pub prod_name: Option<String>,
    /// Instantiated conditions, top to bottom.
    pub conditions: Vec<ConditionId>,
    pub nots: Vec<NotPair>,
    pub match_goal: Option<Sym>,
    pub match_goal_level: GoalLevel,
    /// False if this firing's justification depends on timing.
    pub reliable: bool,
    /// Still part of the match set.
    pub in_ms: bool,
    /// Backtrace epoch in which this instantiation was last visited.
    pub backtrace_number: Epoch,
    /// Smallest backtrace depth at which this instantiation was reached.
    pub explain_depth: u64,
    pub preferences_generated: Vec<PrefId>,
}

impl Instantiation {
    pub(crate) fn new(prod_name: Option<String>, match_goal: Option<Sym>, match_goal_level: GoalLevel) -> Self {
        Self {
            prod_name,
            conditions: Vec::new(),
            nots: Vec::new(),
            match_goal,
            match_goal_level,
            reliable: true,
            in_ms: true,
            backtrace_number: 0,
            explain_depth: u64::MAX,
            preferences_generated: Vec::new(),
        }
    }

    /// Rule name, or a placeholder for architectural firings.
    pub fn name(&self) -> &str {
        self.prod_name
            .as_deref()
            .unwrap_or("[Architectural Fake Instantiation]")
    }
}
