//! JSON fixtures describing an instantiation graph.
//!
//! A fixture lists identifiers, top-level facts and rule firings in the order
//! they happened (producers before the firings that test their results).
//! Everything is referred to by name; [`GraphFixture::build`] turns it into an
//! [`InstantiationGraph`] plus name maps for the caller.
//!
//! ```json
//! {
//!   "identifiers": [{ "name": "S1", "level": 1, "goal": true }],
//!   "wmes": [{ "name": "color", "triple": ["S1", "color", "blue"] }],
//!   "instantiations": [{
//!     "name": "look",
//!     "match_goal": "S1",
//!     "conditions": [{ "kind": "positive", "wme": "color" }]
//!   }]
//! }
//! ```

use std::collections::HashMap;
use std::path::Path;

use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::condition::Condition;
use crate::error::EbcResult;
use crate::graph::{ConditionId, InstId, InstantiationGraph, PrefId, PreferenceType, WmeId};
use crate::identity::{GroundingId, WmeField};
use crate::symbol::{GoalLevel, Sym};
use crate::test::SimpleTest;

/// Errors from loading a fixture.
#[derive(Debug, Error, Diagnostic)]
pub enum FixtureError {
    #[error("failed to read fixture: {path}")]
    #[diagnostic(code(ebc::fixture::read), help("Ensure the fixture file exists and is readable."))]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse fixture: {path}: {message}")]
    #[diagnostic(
        code(ebc::fixture::parse),
        help("Fixtures are JSON objects with identifiers, wmes and instantiations arrays.")
    )]
    Parse { path: String, message: String },

    #[error("unknown {kind} \"{name}\"")]
    #[diagnostic(
        code(ebc::fixture::unknown_name),
        help("Declare the {kind} before referring to it. Instantiations are loaded in order.")
    )]
    UnknownName { kind: &'static str, name: String },

    #[error("duplicate {kind} name \"{name}\"")]
    #[diagnostic(code(ebc::fixture::duplicate_name), help("Every {kind} in a fixture needs a unique name."))]
    DuplicateName { kind: &'static str, name: String },

    #[error("malformed fixture entry: {message}")]
    #[diagnostic(code(ebc::fixture::malformed))]
    Malformed { message: String },
}

pub type FixtureResult<T> = std::result::Result<T, FixtureError>;

// ---------------------------------------------------------------------------
// Fixture format
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphFixture {
    #[serde(default)]
    pub identifiers: Vec<IdentifierSpec>,
    #[serde(default)]
    pub wmes: Vec<WmeSpec>,
    #[serde(default)]
    pub instantiations: Vec<InstantiationSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentifierSpec {
    pub name: String,
    pub level: GoalLevel,
    #[serde(default)]
    pub goal: bool,
    #[serde(default)]
    pub impasse: bool,
}

/// A fact with no supporting preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmeSpec {
    pub name: String,
    pub triple: [String; 3],
    #[serde(default)]
    pub acceptable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InstantiationSpec {
    pub name: String,
    /// Rule name; defaults to `name`. `null` is an architectural firing.
    #[serde(default = "InstantiationSpec::default_production")]
    pub production: Option<String>,
    pub match_goal: Option<String>,
    #[serde(default = "default_true")]
    pub reliable: bool,
    #[serde(default)]
    pub conditions: Vec<ConditionSpec>,
    #[serde(default)]
    pub nots: Vec<[String; 2]>,
    #[serde(default)]
    pub preferences: Vec<PreferenceSpec>,
}

impl InstantiationSpec {
    fn default_production() -> Option<String> {
        Some(String::new())
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConditionSpec {
    Positive {
        #[serde(default)]
        name: Option<String>,
        wme: String,
        /// Rule variables bound to each field.
        #[serde(default)]
        vars: [Option<String>; 3],
        /// Preset grounding ids, for firings whose identities are already known.
        #[serde(default)]
        groundings: [Option<u64>; 3],
        /// Names of other preferences justifying the same fact.
        #[serde(default)]
        cdps: Vec<String>,
    },
    Negative {
        #[serde(default)]
        name: Option<String>,
        triple: [String; 3],
        #[serde(default)]
        acceptable: bool,
    },
    Ncc {
        #[serde(default)]
        name: Option<String>,
        conditions: Vec<[String; 3]>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceSpec {
    pub name: String,
    #[serde(rename = "type", default = "PreferenceSpec::default_type")]
    pub kind: PreferenceType,
    pub triple: [String; 3],
    #[serde(default)]
    pub referent: Option<String>,
    /// Fact created from this preference, nameable by later conditions.
    #[serde(default)]
    pub wme: Option<WmeRef>,
    /// Goal levels this preference is cloned to.
    #[serde(default)]
    pub clones: Vec<GoalLevel>,
}

impl PreferenceSpec {
    fn default_type() -> PreferenceType {
        PreferenceType::Acceptable
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WmeRef {
    pub name: String,
    #[serde(default)]
    pub acceptable: bool,
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// A built graph with the fixture's names resolved to handles.
#[derive(Debug)]
pub struct LoadedFixture {
    pub graph: InstantiationGraph,
    pub instantiations: HashMap<String, InstId>,
    pub wmes: HashMap<String, WmeId>,
    pub preferences: HashMap<String, PrefId>,
    pub conditions: HashMap<String, ConditionId>,
}

impl LoadedFixture {
    pub fn instantiation(&self, name: &str) -> FixtureResult<InstId> {
        lookup(&self.instantiations, "instantiation", name)
    }

    pub fn condition(&self, name: &str) -> FixtureResult<ConditionId> {
        lookup(&self.conditions, "condition", name)
    }

    pub fn preference(&self, name: &str) -> FixtureResult<PrefId> {
        lookup(&self.preferences, "preference", name)
    }

    /// Fixture name of a condition, if it was given one.
    pub fn condition_name(&self, id: ConditionId) -> Option<&str> {
        self.conditions
            .iter()
            .find(|&(_, &cond)| cond == id)
            .map(|(name, _)| name.as_str())
    }
}

fn lookup<T: Copy>(map: &HashMap<String, T>, kind: &'static str, name: &str) -> FixtureResult<T> {
    map.get(name).copied().ok_or_else(|| FixtureError::UnknownName {
        kind,
        name: name.to_string(),
    })
}

fn insert_unique<T>(map: &mut HashMap<String, T>, kind: &'static str, name: &str, value: T) -> FixtureResult<()> {
    if map.contains_key(name) {
        return Err(FixtureError::DuplicateName {
            kind,
            name: name.to_string(),
        });
    }
    map.insert(name.to_string(), value);
    Ok(())
}

impl GraphFixture {
    /// Load from a JSON file.
    pub fn load(path: &Path) -> FixtureResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| FixtureError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    pub fn from_json_str(content: &str) -> FixtureResult<Self> {
        Self::parse(content, "<string>")
    }

    fn parse(content: &str, origin: &str) -> FixtureResult<Self> {
        serde_json::from_str(content).map_err(|e| FixtureError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })
    }

    /// Build the graph.
    pub fn build(&self) -> EbcResult<LoadedFixture> {
        let mut loaded = LoadedFixture {
            graph: InstantiationGraph::new()?,
            instantiations: HashMap::new(),
            wmes: HashMap::new(),
            preferences: HashMap::new(),
            conditions: HashMap::new(),
        };

        for spec in &self.identifiers {
            loaded
                .graph
                .symbols_mut()
                .named_identifier(&spec.name, spec.level, spec.goal, spec.impasse)?;
        }

        for spec in &self.wmes {
            let [id, attr, value] = resolve_triple(&mut loaded.graph, &spec.triple)?;
            let wme = loaded.graph.add_wme(id, attr, value, spec.acceptable, None)?;
            insert_unique(&mut loaded.wmes, "wme", &spec.name, wme)?;
        }

        for spec in &self.instantiations {
            build_instantiation(&mut loaded, spec)?;
        }

        tracing::debug!(
            wmes = loaded.graph.wme_count(),
            instantiations = loaded.graph.instantiation_count(),
            preferences = loaded.graph.preference_count(),
            "fixture loaded"
        );
        Ok(loaded)
    }
}

fn build_instantiation(loaded: &mut LoadedFixture, spec: &InstantiationSpec) -> EbcResult<()> {
    let match_goal = spec
        .match_goal
        .as_deref()
        .map(|name| loaded.graph.symbols().resolve(name))
        .transpose()?;
    let production = spec
        .production
        .as_deref()
        .map(|p| if p.is_empty() { spec.name.as_str() } else { p });
    let inst = loaded.graph.add_instantiation(production, match_goal);
    insert_unique(&mut loaded.instantiations, "instantiation", &spec.name, inst)?;
    loaded.graph.set_reliable(inst, spec.reliable)?;

    for cond in &spec.conditions {
        let (name, id) = match cond {
            ConditionSpec::Positive {
                name,
                wme,
                vars,
                groundings,
                cdps,
            } => {
                let wme = lookup(&loaded.wmes, "wme", wme)?;
                let vars = resolve_vars(&mut loaded.graph, vars)?;
                let id = if groundings.iter().any(Option::is_some) {
                    let fact = loaded.graph.wme(wme)?;
                    let mut condition = Condition::from_triple(&fact.id, &fact.attr, &fact.value);
                    condition.test_for_acceptable_preference = fact.acceptable;
                    condition.bt.wme = Some(wme);
                    let fields = WmeField::ALL.into_iter().zip(vars.into_iter().zip(groundings.iter().copied()));
                    for (field, (var, raw)) in fields {
                        let Some(test) = condition.field_mut(field) else {
                            continue;
                        };
                        for member in test.members_mut() {
                            if let Some(var) = &var {
                                member.identity.set_rule_variable(var);
                            }
                            // Unset fields are grounded from the fact as usual.
                            if let Some(grounding) = raw.and_then(GroundingId::new) {
                                member.identity.grounding_id = Some(grounding);
                            }
                        }
                    }
                    loaded.graph.add_condition(inst, condition)?
                } else {
                    loaded.graph.add_matched_condition(inst, wme, vars)?
                };
                for pref in cdps {
                    let pref = lookup(&loaded.preferences, "preference", pref)?;
                    loaded.graph.add_cdps(id, pref)?;
                }
                (name, id)
            }
            ConditionSpec::Negative {
                name,
                triple,
                acceptable,
            } => {
                let mut condition = negative(&mut loaded.graph, triple)?;
                condition.test_for_acceptable_preference = *acceptable;
                (name, loaded.graph.add_condition(inst, condition)?)
            }
            ConditionSpec::Ncc { name, conditions } => {
                if conditions.is_empty() {
                    return Err(FixtureError::Malformed {
                        message: format!("negated conjunction in {} has no conditions", spec.name),
                    }
                    .into());
                }
                let subs = conditions
                    .iter()
                    .map(|triple| {
                        let [id, attr, value] = resolve_triple(&mut loaded.graph, triple)?;
                        Ok(Condition::from_triple(&id, &attr, &value))
                    })
                    .collect::<EbcResult<Vec<_>>>()?;
                let condition = Condition::negated_conjunction(subs);
                (name, loaded.graph.add_condition(inst, condition)?)
            }
        };
        if let Some(name) = name {
            insert_unique(&mut loaded.conditions, "condition", name, id)?;
        }
    }

    for [a, b] in &spec.nots {
        let a = loaded.graph.symbols().resolve(a)?;
        let b = loaded.graph.symbols().resolve(b)?;
        loaded.graph.add_not(inst, a, b)?;
    }

    for pref in &spec.preferences {
        let [id, attr, value] = resolve_triple(&mut loaded.graph, &pref.triple)?;
        let referent = pref
            .referent
            .as_deref()
            .map(|name| resolve(&mut loaded.graph, name))
            .transpose()?;
        let pref_id = loaded
            .graph
            .add_preference(inst, pref.kind, id.clone(), attr.clone(), value.clone(), referent)?;
        insert_unique(&mut loaded.preferences, "preference", &pref.name, pref_id)?;
        for &level in &pref.clones {
            loaded.graph.add_clone(pref_id, level)?;
        }
        if let Some(wme) = &pref.wme {
            let wme_id = loaded
                .graph
                .add_wme(id, attr, value, wme.acceptable, Some(pref_id))?;
            insert_unique(&mut loaded.wmes, "wme", &wme.name, wme_id)?;
        }
    }
    Ok(())
}

/// Resolve a name: declared identifiers and interned symbols first, then
/// `<var>` variables, numbers, and finally string constants.
fn resolve(graph: &mut InstantiationGraph, name: &str) -> EbcResult<Sym> {
    let symbols = graph.symbols_mut();
    if let Some(sym) = symbols.find(name) {
        return Ok(sym);
    }
    if name.starts_with('<') && name.ends_with('>') {
        return symbols.variable(name);
    }
    if let Ok(value) = name.parse::<i64>() {
        return symbols.int_constant(value);
    }
    if name.contains('.') {
        if let Ok(value) = name.parse::<f64>() {
            return symbols.float_constant(value);
        }
    }
    symbols.str_constant(name)
}

fn resolve_triple(graph: &mut InstantiationGraph, triple: &[String; 3]) -> EbcResult<[Sym; 3]> {
    Ok([
        resolve(graph, &triple[0])?,
        resolve(graph, &triple[1])?,
        resolve(graph, &triple[2])?,
    ])
}

fn resolve_vars(graph: &mut InstantiationGraph, vars: &[Option<String>; 3]) -> EbcResult<[Option<Sym>; 3]> {
    let mut out: [Option<Sym>; 3] = Default::default();
    for (slot, var) in out.iter_mut().zip(vars) {
        if let Some(var) = var {
            *slot = Some(graph.symbols_mut().variable(var)?);
        }
    }
    Ok(out)
}

fn negative(graph: &mut InstantiationGraph, triple: &[String; 3]) -> EbcResult<Condition> {
    let [id, attr, value] = resolve_triple(graph, triple)?;
    Ok(Condition::negative(
        Some(SimpleTest::equality(&id).into()),
        Some(SimpleTest::equality(&attr).into()),
        Some(SimpleTest::equality(&value).into()),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SMALL: &str = r#"{
        "identifiers": [
            { "name": "S1", "level": 1, "goal": true },
            { "name": "S2", "level": 2, "goal": true }
        ],
        "wmes": [{ "name": "color", "triple": ["S1", "color", "blue"] }],
        "instantiations": [
            {
                "name": "copy",
                "match_goal": "S2",
                "conditions": [{ "kind": "positive", "name": "c1", "wme": "color", "vars": ["<s>", null, "<c>"] }],
                "preferences": [{
                    "name": "p1",
                    "triple": ["S2", "color", "blue"],
                    "wme": { "name": "sub-color" },
                    "clones": [1]
                }]
            },
            {
                "name": "use",
                "production": "use*color",
                "match_goal": "S2",
                "reliable": false,
                "conditions": [
                    { "kind": "positive", "wme": "sub-color", "cdps": ["p1"] },
                    { "kind": "negative", "name": "n1", "triple": ["S1", "size", "3"] },
                    { "kind": "ncc", "conditions": [["S1", "a", "b"], ["S1", "c", "2.5"]] }
                ],
                "nots": [["S1", "S2"]]
            }
        ]
    }"#;

    #[test]
    fn small_fixture_builds() {
        let loaded = GraphFixture::from_json_str(SMALL).unwrap().build().unwrap();
        assert_eq!(loaded.graph.wme_count(), 2);
        assert_eq!(loaded.graph.preference_count(), 2);

        let copy = loaded.graph.instantiation(loaded.instantiation("copy").unwrap()).unwrap();
        assert_eq!(copy.name(), "copy");
        assert_eq!(copy.match_goal_level, 2);

        let used = loaded.graph.instantiation(loaded.instantiation("use").unwrap()).unwrap();
        assert_eq!(used.name(), "use*color");
        assert!(!used.reliable);
        assert_eq!(used.conditions.len(), 3);
        assert_eq!(used.nots.len(), 1);

        let c1 = loaded.graph.condition(loaded.condition("c1").unwrap()).unwrap();
        let var = c1.equality_test(WmeField::Id).unwrap().identity.original_var.clone();
        assert_eq!(var.unwrap().name, "<s>");
        assert_eq!(loaded.condition_name(loaded.condition("n1").unwrap()), Some("n1"));

        let p1 = loaded.preference("p1").unwrap();
        assert!(loaded.graph.find_clone_for_level(Some(p1), 1).is_some());
    }

    #[test]
    fn unknown_names_are_reported() {
        let json = r#"{ "instantiations": [{ "name": "x", "match_goal": null,
            "conditions": [{ "kind": "positive", "wme": "missing" }] }] }"#;
        let err = GraphFixture::from_json_str(json).unwrap().build().unwrap_err();
        assert!(matches!(
            err,
            crate::error::EbcError::Fixture(FixtureError::UnknownName { kind: "wme", .. })
        ));
    }

    #[test]
    fn duplicate_names_are_reported() {
        let json = r#"{
            "identifiers": [{ "name": "S1", "level": 1, "goal": true }],
            "wmes": [
                { "name": "w", "triple": ["S1", "a", "b"] },
                { "name": "w", "triple": ["S1", "a", "c"] }
            ]
        }"#;
        let err = GraphFixture::from_json_str(json).unwrap().build().unwrap_err();
        assert!(matches!(
            err,
            crate::error::EbcError::Fixture(FixtureError::DuplicateName { kind: "wme", .. })
        ));
    }

    #[test]
    fn bad_json_is_a_parse_error() {
        let err = GraphFixture::from_json_str("{ \"wmes\": 3 }").unwrap_err();
        assert!(matches!(err, FixtureError::Parse { .. }));
    }

    #[test]
    fn preset_groundings_are_kept() {
        let json = r#"{
            "identifiers": [{ "name": "S1", "level": 1, "goal": true }],
            "wmes": [{ "name": "op", "triple": ["S1", "operator", "go"] }],
            "instantiations": [{
                "name": "x",
                "match_goal": "S1",
                "conditions": [{ "kind": "positive", "name": "c", "wme": "op", "groundings": [101, 102, 103] }]
            }]
        }"#;
        let loaded = GraphFixture::from_json_str(json).unwrap().build().unwrap();
        let cond = loaded.graph.condition(loaded.condition("c").unwrap()).unwrap();
        let triple = cond.identity_triple();
        assert_eq!(triple.id, GroundingId::new(101));
        assert_eq!(triple.value, GroundingId::new(103));
    }
}
