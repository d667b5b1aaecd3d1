//! Preferences: bindings generated by rule firings.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::graph::{InstId, PrefId};
use crate::identity::IdentityTriple;
use crate::symbol::{GoalLevel, Sym};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreferenceType {
    Acceptable,
    Require,
    Reject,
    Prohibit,
    Reconsider,
    UnaryIndifferent,
    UnaryParallel,
    Best,
    Worst,
    BinaryIndifferent,
    BinaryParallel,
    Better,
    Worse,
    NumericIndifferent,
}

impl PreferenceType {
    /// Binary preferences compare the value against a referent.
    pub fn is_binary(self) -> bool {
        matches!(
            self,
            PreferenceType::BinaryIndifferent
                | PreferenceType::BinaryParallel
                | PreferenceType::Better
                | PreferenceType::Worse
                | PreferenceType::NumericIndifferent
        )
    }

    fn symbol(self) -> &'static str {
        match self {
            PreferenceType::Acceptable => "+",
            PreferenceType::Require => "!",
            PreferenceType::Reject => "-",
            PreferenceType::Prohibit => "~",
            PreferenceType::Reconsider => "@",
            PreferenceType::UnaryIndifferent => "=",
            PreferenceType::UnaryParallel => "&",
            PreferenceType::Best => ">",
            PreferenceType::Worst => "<",
            PreferenceType::BinaryIndifferent => "=",
            PreferenceType::BinaryParallel => "&",
            PreferenceType::Better => ">",
            PreferenceType::Worse => "<",
            PreferenceType::NumericIndifferent => "=",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Preference {
    pub kind: PreferenceType,
    pub id: Sym,
    pub attr: Sym,
    pub value: Sym,
    pub referent: Option<Sym>,
    /// Identities of the rule bindings that produced the triple.
    pub identities: IdentityTriple,
    pub inst: InstId,
    /// Goal level this preference (or clone) belongs to.
    pub level: GoalLevel,
    /// Still held by its slot in working memory.
    pub in_slot: bool,
    /// Facts, condition traces and CDPS entries holding this preference.
    pub reference_count: u32,
    pub next_clone: Option<PrefId>,
    pub prev_clone: Option<PrefId>,
}

impl fmt::Display for Preference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({} ^{} {} {}", self.id, self.attr, self.value, self.kind.symbol())?;
        if let Some(referent) = &self.referent {
            write!(f, " {referent}")?;
        }
        f.write_str(")")
    }
}
