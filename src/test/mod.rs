//! Tests: the constraint language used on each field of a condition.
//!
//! A field test is `Option<Test>`; `None` is the blank test. A [`Test`] is
//! either one [`SimpleTest`] or a conjunction of them. Conjunction members
//! are `SimpleTest`s, so conjunctions cannot nest.
//!
//! Every `SimpleTest` owns an [`Identity`] slot, used or not. Conjunctions
//! carry no identity of their own; only their members do.
//!
//! - `compare`: loose and strict equality, hashing
//! - `edit`: insertion, deletion and the copy variants


use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EbcResult, TestError};
use crate::identity::Identity;
use crate::symbol::{Sym, SymbolId};

pub use compare::{field_tests_are_equal, hash_field_test, hash_test, tests_are_equal, tests_identical};
pub use edit::{
    add_relational_test, add_test, add_test_if_not_already_there, copy_non_identical_tests,
    delete_test_from_conjunct, CopyUnification, GoalImpasseRemoval,
};

/// Relational comparison against a referent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationKind {
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
    SameType,
}

impl RelationKind {
    pub fn test_type(self) -> TestType {
        match self {
            RelationKind::NotEqual => TestType::NotEqual,
            RelationKind::Less => TestType::Less,
            RelationKind::Greater => TestType::Greater,
            RelationKind::LessOrEqual => TestType::LessOrEqual,
            RelationKind::GreaterOrEqual => TestType::GreaterOrEqual,
            RelationKind::SameType => TestType::SameType,
        }
    }

    fn operator(self) -> &'static str {
        match self {
            RelationKind::NotEqual => "<>",
            RelationKind::Less => "<",
            RelationKind::Greater => ">",
            RelationKind::LessOrEqual => "<=",
            RelationKind::GreaterOrEqual => ">=",
            RelationKind::SameType => "<=>",
        }
    }
}

/// Flat tag over every test variant, with the numeric codes used by hashing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestType {
    Equality,
    NotEqual,
    Less,
    Greater,
    LessOrEqual,
    GreaterOrEqual,
    SameType,
    Disjunction,
    Conjunction,
    GoalId,
    ImpasseId,
}

impl TestType {
    pub fn code(self) -> u32 {
        match self {
            TestType::Equality => 0,
            TestType::NotEqual => 1,
            TestType::Less => 2,
            TestType::Greater => 3,
            TestType::LessOrEqual => 4,
            TestType::GreaterOrEqual => 5,
            TestType::SameType => 6,
            TestType::Disjunction => 7,
            TestType::Conjunction => 8,
            TestType::GoalId => 9,
            TestType::ImpasseId => 10,
        }
    }

    fn relation(self) -> Option<RelationKind> {
        match self {
            TestType::NotEqual => Some(RelationKind::NotEqual),
            TestType::Less => Some(RelationKind::Less),
            TestType::Greater => Some(RelationKind::Greater),
            TestType::LessOrEqual => Some(RelationKind::LessOrEqual),
            TestType::GreaterOrEqual => Some(RelationKind::GreaterOrEqual),
            TestType::SameType => Some(RelationKind::SameType),
            _ => None,
        }
    }
}

impl fmt::Display for TestType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TestType::Equality => "EQUALITY_TEST",
            TestType::NotEqual => "NOT_EQUAL_TEST",
            TestType::Less => "LESS_TEST",
            TestType::Greater => "GREATER_TEST",
            TestType::LessOrEqual => "LESS_OR_EQUAL_TEST",
            TestType::GreaterOrEqual => "GREATER_OR_EQUAL_TEST",
            TestType::SameType => "SAME_TYPE_TEST",
            TestType::Disjunction => "DISJUNCTION_TEST",
            TestType::Conjunction => "CONJUNCTIVE_TEST",
            TestType::GoalId => "GOAL_ID_TEST",
            TestType::ImpasseId => "IMPASSE_ID_TEST",
        };
        f.write_str(name)
    }
}

/// The constraint a single, non-conjunctive test applies.
#[derive(Debug, Clone, PartialEq)]
pub enum TestKind {
    Equality(Sym),
    Relational(RelationKind, Sym),
    /// Must equal one of these constants.
    Disjunction(Vec<Sym>),
    GoalId,
    ImpasseId,
}

/// A non-conjunctive test plus its identity slot.
#[derive(Debug, Clone, PartialEq)]
pub struct SimpleTest {
    pub kind: TestKind,
    pub identity: Identity,
}

/// A field test: a single test or a flat conjunction of them.
#[derive(Debug, Clone, PartialEq)]
pub enum Test {
    Simple(SimpleTest),
    Conjunction(Vec<SimpleTest>),
}

impl SimpleTest {
    pub fn new(kind: TestKind) -> Self {
        Self {
            kind,
            identity: Identity::default(),
        }
    }

    pub fn equality(sym: &Sym) -> Self {
        Self::new(TestKind::Equality(sym.clone()))
    }

    pub fn relational(relation: RelationKind, sym: &Sym) -> Self {
        Self::new(TestKind::Relational(relation, sym.clone()))
    }

    pub fn disjunction(values: &[Sym]) -> Self {
        Self::new(TestKind::Disjunction(values.to_vec()))
    }

    pub fn goal_id() -> Self {
        Self::new(TestKind::GoalId)
    }

    pub fn impasse_id() -> Self {
        Self::new(TestKind::ImpasseId)
    }

    /// Equality test whose identity records `var` as its rule variable.
    pub fn equality_for_variable(sym: &Sym, var: &Sym) -> Self {
        let mut test = Self::equality(sym);
        test.identity.set_rule_variable(var);
        test
    }

    pub fn test_type(&self) -> TestType {
        match &self.kind {
            TestKind::Equality(_) => TestType::Equality,
            TestKind::Relational(relation, _) => relation.test_type(),
            TestKind::Disjunction(_) => TestType::Disjunction,
            TestKind::GoalId => TestType::GoalId,
            TestKind::ImpasseId => TestType::ImpasseId,
        }
    }

    /// Referent of an equality or relational test.
    pub fn referent(&self) -> Option<&Sym> {
        match &self.kind {
            TestKind::Equality(sym) | TestKind::Relational(_, sym) => Some(sym),
            _ => None,
        }
    }

    pub fn is_equality(&self) -> bool {
        matches!(self.kind, TestKind::Equality(_))
    }

    /// True for an equality or relational test against a variable.
    pub fn is_variable(&self) -> bool {
        self.referent().is_some_and(|sym| sym.is_variable())
    }
}

impl From<SimpleTest> for Test {
    fn from(test: SimpleTest) -> Self {
        Test::Simple(test)
    }
}

/// Build a test of the given type.
///
/// Equality and relational tests need a referent; every other type must be
/// built without one. Disjunction and conjunction tests start out empty.
pub fn make_test(sym: Option<&Sym>, test_type: TestType) -> EbcResult<Test> {
    let kind = match (test_type, sym) {
        (TestType::Equality, Some(sym)) => TestKind::Equality(sym.clone()),
        (TestType::Equality, None) => return Err(missing_referent(test_type)),
        (TestType::Conjunction, None) => return Ok(Test::Conjunction(Vec::new())),
        (TestType::Disjunction, None) => TestKind::Disjunction(Vec::new()),
        (TestType::GoalId, None) => TestKind::GoalId,
        (TestType::ImpasseId, None) => TestKind::ImpasseId,
        (TestType::Conjunction | TestType::Disjunction | TestType::GoalId | TestType::ImpasseId, Some(_)) => {
            return Err(TestError::UnexpectedReferent {
                test_type: test_type.to_string(),
            }
            .into());
        }
        (relational, sym) => match (relational.relation(), sym) {
            (Some(relation), Some(sym)) => TestKind::Relational(relation, sym.clone()),
            _ => return Err(missing_referent(test_type)),
        },
    };
    Ok(Test::Simple(SimpleTest::new(kind)))
}

fn missing_referent(test_type: TestType) -> crate::error::EbcError {
    TestError::MissingReferent {
        test_type: test_type.to_string(),
    }
    .into()
}

impl Test {
    pub fn test_type(&self) -> TestType {
        match self {
            Test::Simple(simple) => simple.test_type(),
            Test::Conjunction(_) => TestType::Conjunction,
        }
    }

    /// The simple tests making up this test, in order.
    pub fn members(&self) -> &[SimpleTest] {
        match self {
            Test::Simple(simple) => std::slice::from_ref(simple),
            Test::Conjunction(members) => members,
        }
    }

    pub fn members_mut(&mut self) -> &mut [SimpleTest] {
        match self {
            Test::Simple(simple) => std::slice::from_mut(simple),
            Test::Conjunction(members) => members,
        }
    }

    /// The first equality test, looking inside conjunctions.
    pub fn equality_test(&self) -> Option<&SimpleTest> {
        self.members().iter().find(|t| t.is_equality())
    }

    pub fn equality_test_mut(&mut self) -> Option<&mut SimpleTest> {
        self.members_mut().iter_mut().find(|t| t.is_equality())
    }

    /// Referent of the main equality test.
    pub fn equality_referent(&self) -> Option<&Sym> {
        self.equality_test().and_then(SimpleTest::referent)
    }

    /// The first equality test on a variable.
    pub fn equality_var_test(&self) -> Option<&SimpleTest> {
        self.members()
            .iter()
            .find(|t| t.is_equality() && t.is_variable())
    }

    /// Equality test on a variable if there is one, otherwise on a literal.
    pub fn find_equality_test_preferring_vars(&self) -> Option<&SimpleTest> {
        self.equality_var_test().or_else(|| self.equality_test())
    }

    /// True if this test contains an equality test for `sym`, or any equality
    /// test at all when `sym` is `None`.
    pub fn includes_equality_test_for(&self, sym: Option<&Sym>) -> bool {
        self.members().iter().any(|t| match (&t.kind, sym) {
            (TestKind::Equality(referent), Some(sym)) => referent == sym,
            (TestKind::Equality(_), None) => true,
            _ => false,
        })
    }

    pub fn includes_goal_or_impasse_id_test(&self, look_for_goal: bool, look_for_impasse: bool) -> bool {
        self.members().iter().any(|t| match t.kind {
            TestKind::GoalId => look_for_goal,
            TestKind::ImpasseId => look_for_impasse,
            _ => false,
        })
    }

    /// True for a lone equality or relational test on a variable.
    pub fn is_variable(&self) -> bool {
        match self {
            Test::Simple(simple) => simple.is_variable(),
            Test::Conjunction(_) => false,
        }
    }

    /// Letter for generated variable names, or `'*'`.
    pub fn first_letter(&self) -> char {
        self.members()
            .iter()
            .map(|t| match &t.kind {
                TestKind::Equality(sym) => sym.first_letter(),
                TestKind::GoalId => 's',
                TestKind::ImpasseId => 'i',
                _ => '*',
            })
            .find(|&c| c != '*')
            .unwrap_or('*')
    }

    /// Push every variable referenced by an equality or relational member onto
    /// `out`, skipping any already in `seen`.
    pub fn all_variables(&self, seen: &mut HashSet<SymbolId>, out: &mut Vec<Sym>) {
        for member in self.members() {
            if let Some(sym) = member.referent() {
                if sym.is_variable() && seen.insert(sym.id) {
                    out.push(sym.clone());
                }
            }
        }
    }

    /// Like [`all_variables`](Self::all_variables), but only variables bound by
    /// equality tests.
    pub fn bound_variables(&self, seen: &mut HashSet<SymbolId>, out: &mut Vec<Sym>) {
        for member in self.members() {
            if let TestKind::Equality(sym) = &member.kind {
                if sym.is_variable() && seen.insert(sym.id) {
                    out.push(sym.clone());
                }
            }
        }
    }
}

impl fmt::Display for SimpleTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            TestKind::Equality(sym) => write!(f, "{sym}"),
            TestKind::Relational(relation, sym) => write!(f, "{} {sym}", relation.operator()),
            TestKind::Disjunction(values) => {
                f.write_str("<<")?;
                for value in values {
                    write!(f, " {value}")?;
                }
                f.write_str(" >>")
            }
            TestKind::GoalId => f.write_str("state"),
            TestKind::ImpasseId => f.write_str("impasse"),
        }
    }
}

impl fmt::Display for Test {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Test::Simple(simple) => fmt::Display::fmt(simple, f),
            Test::Conjunction(members) => {
                f.write_str("{")?;
                for member in members {
                    write!(f, " {member}")?;
                }
                f.write_str(" }")
            }
        }
    }
}

/// Display helper for a possibly blank field test.
pub struct FieldDisplay<'a>(pub Option<&'a Test>);

impl fmt::Display for FieldDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(test) => fmt::Display::fmt(test, f),
            None => f.write_str("*"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolTable;

    #[test]
    fn make_test_validates_referents() {
        let mut table = SymbolTable::new().unwrap();
        let blue = table.str_constant("blue").unwrap();

        let eq = make_test(Some(&blue), TestType::Equality).unwrap();
        assert_eq!(eq.test_type(), TestType::Equality);
        assert_eq!(eq.equality_referent(), Some(&blue));

        let lt = make_test(Some(&blue), TestType::Less).unwrap();
        assert_eq!(lt.test_type(), TestType::Less);

        assert!(make_test(None, TestType::Equality).is_err());
        assert!(make_test(None, TestType::GreaterOrEqual).is_err());
        assert!(make_test(Some(&blue), TestType::GoalId).is_err());
        assert!(matches!(
            make_test(None, TestType::Conjunction).unwrap(),
            Test::Conjunction(ref m) if m.is_empty()
        ));
    }

    #[test]
    fn every_simple_test_has_an_identity_slot() {
        let goal = make_test(None, TestType::GoalId).unwrap();
        let Test::Simple(simple) = goal else {
            panic!("goal test should be simple");
        };
        assert!(simple.identity.is_empty());
    }

    #[test]
    fn type_codes_and_names() {
        assert_eq!(TestType::Equality.code(), 0);
        assert_eq!(TestType::SameType.code(), 6);
        assert_eq!(TestType::ImpasseId.code(), 10);
        assert_eq!(TestType::Conjunction.to_string(), "CONJUNCTIVE_TEST");
    }

    #[test]
    fn equality_lookup_prefers_variables() {
        let mut table = SymbolTable::new().unwrap();
        let blue = table.str_constant("blue").unwrap();
        let x = table.variable("x").unwrap();
        let conj = Test::Conjunction(vec![
            SimpleTest::equality(&blue),
            SimpleTest::relational(RelationKind::NotEqual, &blue),
            SimpleTest::equality(&x),
        ]);
        assert_eq!(conj.equality_referent(), Some(&blue));
        assert_eq!(conj.find_equality_test_preferring_vars().unwrap().referent(), Some(&x));
        assert!(conj.includes_equality_test_for(Some(&x)));
        assert!(conj.includes_equality_test_for(None));
        assert!(!conj.is_variable());
    }

    #[test]
    fn goal_and_impasse_detection() {
        let conj = Test::Conjunction(vec![SimpleTest::goal_id()]);
        assert!(conj.includes_goal_or_impasse_id_test(true, false));
        assert!(!conj.includes_goal_or_impasse_id_test(false, true));
        assert_eq!(conj.first_letter(), 's');
    }

    #[test]
    fn variable_collection_deduplicates() {
        let mut table = SymbolTable::new().unwrap();
        let x = table.variable("x").unwrap();
        let y = table.variable("y").unwrap();
        let conj = Test::Conjunction(vec![
            SimpleTest::equality(&x),
            SimpleTest::relational(RelationKind::NotEqual, &y),
            SimpleTest::relational(RelationKind::Less, &x),
        ]);

        let mut seen = HashSet::new();
        let mut all = Vec::new();
        conj.all_variables(&mut seen, &mut all);
        assert_eq!(all, vec![x.clone(), y.clone()]);

        let mut seen = HashSet::new();
        let mut bound = Vec::new();
        conj.bound_variables(&mut seen, &mut bound);
        assert_eq!(bound, vec![x]);
    }

    #[test]
    fn display_forms() {
        let mut table = SymbolTable::new().unwrap();
        let a = table.str_constant("a").unwrap();
        let b = table.str_constant("b").unwrap();
        let five = table.int_constant(5).unwrap();
        let x = table.variable("x").unwrap();

        assert_eq!(SimpleTest::equality(&x).to_string(), "<x>");
        assert_eq!(SimpleTest::relational(RelationKind::NotEqual, &a).to_string(), "<> a");
        assert_eq!(SimpleTest::relational(RelationKind::Less, &five).to_string(), "< 5");
        assert_eq!(SimpleTest::relational(RelationKind::SameType, &a).to_string(), "<=> a");
        assert_eq!(SimpleTest::disjunction(&[a.clone(), b.clone()]).to_string(), "<< a b >>");
        let conj = Test::Conjunction(vec![SimpleTest::equality(&a), SimpleTest::goal_id()]);
        assert_eq!(conj.to_string(), "{ a state }");
        assert_eq!(FieldDisplay(None).to_string(), "*");
    }
}
