//! Instantiated conditions.
//!
//! A condition is one left-hand-side element of a rule firing: three field
//! tests plus the backtrace scratch state recording which fact it matched
//! and which preference supported that fact.

use std::fmt;

use crate::error::{BacktraceError, EbcResult};
use crate::graph::{InstId, PrefId, WmeId};
use crate::identity::{IdentityTriple, WmeField};
use crate::symbol::{GoalLevel, Sym};
use crate::test::{FieldDisplay, SimpleTest, Test, field_tests_are_equal, hash_field_test};

/// Polarity of a condition. A negated conjunction owns its sub-conditions.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionKind {
    Positive,
    Negative,
    NegatedConjunction(Vec<Condition>),
}

/// Backtrace scratch state of a positive instantiated condition.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BacktraceInfo {
    /// The fact this condition matched.
    pub wme: Option<WmeId>,
    /// Preference that supported the fact when the rule fired. Holds a
    /// reference on the preference.
    pub trace: Option<PrefId>,
    /// Goal-stack level of the matched fact.
    pub level: GoalLevel,
    /// Conditionally dependent preferences: other justifications of the same
    /// fact. Each entry holds a reference on its preference.
    pub cdps: Vec<PrefId>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub id_test: Option<Test>,
    pub attr_test: Option<Test>,
    pub value_test: Option<Test>,
    /// The condition tests the acceptable-preference form of the fact.
    pub test_for_acceptable_preference: bool,
    /// Owning instantiation, set when the condition is added to the graph.
    pub inst: Option<InstId>,
    pub bt: BacktraceInfo,
}

impl Condition {
    fn with_kind(kind: ConditionKind, id: Option<Test>, attr: Option<Test>, value: Option<Test>) -> Self {
        Self {
            kind,
            id_test: id,
            attr_test: attr,
            value_test: value,
            test_for_acceptable_preference: false,
            inst: None,
            bt: BacktraceInfo::default(),
        }
    }

    pub fn positive(id: Option<Test>, attr: Option<Test>, value: Option<Test>) -> Self {
        Self::with_kind(ConditionKind::Positive, id, attr, value)
    }

    pub fn negative(id: Option<Test>, attr: Option<Test>, value: Option<Test>) -> Self {
        Self::with_kind(ConditionKind::Negative, id, attr, value)
    }

    pub fn negated_conjunction(conditions: Vec<Condition>) -> Self {
        Self::with_kind(ConditionKind::NegatedConjunction(conditions), None, None, None)
    }

    /// Positive condition with one equality test per field.
    pub fn from_triple(id: &Sym, attr: &Sym, value: &Sym) -> Self {
        Self::positive(
            Some(SimpleTest::equality(id).into()),
            Some(SimpleTest::equality(attr).into()),
            Some(SimpleTest::equality(value).into()),
        )
    }

    pub fn is_positive(&self) -> bool {
        matches!(self.kind, ConditionKind::Positive)
    }

    pub fn field(&self, field: WmeField) -> Option<&Test> {
        match field {
            WmeField::Id => self.id_test.as_ref(),
            WmeField::Attr => self.attr_test.as_ref(),
            WmeField::Value => self.value_test.as_ref(),
        }
    }

    pub fn field_mut(&mut self, field: WmeField) -> Option<&mut Test> {
        match field {
            WmeField::Id => self.id_test.as_mut(),
            WmeField::Attr => self.attr_test.as_mut(),
            WmeField::Value => self.value_test.as_mut(),
        }
    }

    /// Main equality test of a field.
    pub fn equality_test(&self, field: WmeField) -> Option<&SimpleTest> {
        self.field(field).and_then(Test::equality_test)
    }

    /// Referent of a field's equality test, or an invariant violation.
    pub fn require_equality_referent(&self, field: WmeField) -> EbcResult<&Sym> {
        self.equality_test(field)
            .and_then(SimpleTest::referent)
            .ok_or_else(|| {
                BacktraceError::NoEqualityTest {
                    condition: self.to_string(),
                    field: field.to_string(),
                }
                .into()
            })
    }

    /// Grounding ids of the three equality tests.
    pub fn identity_triple(&self) -> IdentityTriple {
        let grounding = |field| {
            self.equality_test(field)
                .and_then(|test| test.identity.grounding_id)
        };
        IdentityTriple::new(
            grounding(WmeField::Id),
            grounding(WmeField::Attr),
            grounding(WmeField::Value),
        )
    }
}

const NEGATIVE_HASH_SEED: u32 = 1_267_818;
const NCC_HASH_SEED: u32 = 82_348_149;

/// Structural hash consistent with [`conditions_are_equal`].
pub fn hash_condition(cond: &Condition) -> u32 {
    let fields = |seed: u32, neg: bool| {
        let mut result = seed ^ hash_field_test(cond.id_test.as_ref(), neg);
        result = result.rotate_right(8) ^ hash_field_test(cond.attr_test.as_ref(), neg);
        result = result.rotate_right(8) ^ hash_field_test(cond.value_test.as_ref(), neg);
        if cond.test_for_acceptable_preference {
            result = result.wrapping_add(1);
        }
        result
    };
    match &cond.kind {
        ConditionKind::Positive => fields(0, false),
        ConditionKind::Negative => fields(NEGATIVE_HASH_SEED, true),
        ConditionKind::NegatedConjunction(subs) => subs
            .iter()
            .fold(NCC_HASH_SEED, |acc, sub| (acc ^ hash_condition(sub)).rotate_right(8)),
    }
}

/// Duplicate detection between conditions.
///
/// Positive conditions compare their tests exactly; negative conditions
/// treat any two variables as interchangeable. Negated conjunctions compare
/// their sub-conditions pairwise, in order.
pub fn conditions_are_equal(c1: &Condition, c2: &Condition) -> bool {
    let same_fields = |neg: bool| {
        c1.test_for_acceptable_preference == c2.test_for_acceptable_preference
            && field_tests_are_equal(c1.id_test.as_ref(), c2.id_test.as_ref(), neg)
            && field_tests_are_equal(c1.attr_test.as_ref(), c2.attr_test.as_ref(), neg)
            && field_tests_are_equal(c1.value_test.as_ref(), c2.value_test.as_ref(), neg)
    };
    match (&c1.kind, &c2.kind) {
        (ConditionKind::Positive, ConditionKind::Positive) => same_fields(false),
        (ConditionKind::Negative, ConditionKind::Negative) => same_fields(true),
        (ConditionKind::NegatedConjunction(a), ConditionKind::NegatedConjunction(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| conditions_are_equal(x, y))
        }
        _ => false,
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            ConditionKind::NegatedConjunction(subs) => {
                f.write_str("-{")?;
                for sub in subs {
                    write!(f, " {sub}")?;
                }
                f.write_str(" }")
            }
            kind => {
                if matches!(kind, ConditionKind::Negative) {
                    f.write_str("-")?;
                }
                write!(
                    f,
                    "({} ^{} {}",
                    FieldDisplay(self.id_test.as_ref()),
                    FieldDisplay(self.attr_test.as_ref()),
                    FieldDisplay(self.value_test.as_ref())
                )?;
                if self.test_for_acceptable_preference {
                    f.write_str(" +")?;
                }
                f.write_str(")")
            }
        }
    }
}
