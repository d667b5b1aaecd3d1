//! Core symbol types for the chunking core.
//!
//! Symbols are the atomic values tested by conditions and stored in facts:
//! short-term identifiers, rule variables, and constants. Every symbol is
//! interned once in a [`SymbolTable`] and shared through [`Sym`]
//! (`Rc<Symbol>`), so the strong count *is* the symbol's reference count.
//! Equality is identity: two `Sym`s are the same symbol iff their
//! [`SymbolId`]s match.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::error::{EbcResult, SymbolError};

/// Goal-stack depth. The top state lives at level 1; deeper substates have
/// larger levels.
pub type GoalLevel = u16;

/// Level of the top state.
pub const TOP_GOAL_LEVEL: GoalLevel = 1;

/// Level used for instantiations without a match goal.
pub const ATTRIBUTE_IMPASSE_LEVEL: GoalLevel = GoalLevel::MAX;

/// Unique, niche-optimized identifier for a symbol.
///
/// Uses `NonZeroU64` so that `Option<SymbolId>` is the same size as `SymbolId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(transparent)]
pub struct SymbolId(NonZeroU64);

impl SymbolId {
    /// Create a `SymbolId` from a raw `u64`.
    ///
    /// Returns `None` if `raw` is zero.
    pub fn new(raw: u64) -> Option<Self> {
        NonZeroU64::new(raw).map(SymbolId)
    }

    /// Get the underlying `u64` value.
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl std::fmt::Display for SymbolId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sym:{}", self.0)
    }
}

/// Classification of a symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SymbolKind {
    /// A short-term identifier living at some goal-stack level.
    Identifier {
        level: GoalLevel,
        /// True if this identifier is a goal (state).
        goal: bool,
        /// True if this identifier is an impasse.
        impasse: bool,
    },
    /// A rule variable such as `<s>`.
    Variable,
    StrConstant,
    IntConstant(i64),
    FloatConstant(f64),
}

/// An interned symbol.
#[derive(Debug, Serialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: String,
    pub kind: SymbolKind,
    /// Hash contribution used by test and condition hashing.
    pub hash_id: u32,
}

/// Shared handle to an interned symbol.
pub type Sym = Rc<Symbol>;

impl Symbol {
    pub fn is_variable(&self) -> bool {
        matches!(self.kind, SymbolKind::Variable)
    }

    /// True for short-term identifiers.
    pub fn is_identifier(&self) -> bool {
        matches!(self.kind, SymbolKind::Identifier { .. })
    }

    pub fn is_goal(&self) -> bool {
        matches!(self.kind, SymbolKind::Identifier { goal: true, .. })
    }

    pub fn is_impasse(&self) -> bool {
        matches!(self.kind, SymbolKind::Identifier { impasse: true, .. })
    }

    /// True for string, integer and float constants.
    pub fn is_constant(&self) -> bool {
        !self.is_identifier() && !self.is_variable()
    }

    /// Goal-stack level of an identifier; `None` for everything else.
    pub fn level(&self) -> Option<GoalLevel> {
        match self.kind {
            SymbolKind::Identifier { level, .. } => Some(level),
            _ => None,
        }
    }

    /// Letter used when generating names for things bound to this symbol.
    ///
    /// Identifiers and string constants use their lowercased first letter,
    /// variables the first letter inside the brackets, numbers `'*'`.
    pub fn first_letter(&self) -> char {
        let letter = match self.kind {
            SymbolKind::Variable => self.name.chars().nth(1),
            SymbolKind::Identifier { .. } | SymbolKind::StrConstant => self.name.chars().next(),
            SymbolKind::IntConstant(_) | SymbolKind::FloatConstant(_) => None,
        };
        match letter {
            Some(c) if c.is_ascii_alphabetic() => c.to_ascii_lowercase(),
            _ => '*',
        }
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Symbol ID allocator.
///
/// Produces monotonically increasing IDs starting from 1.
#[derive(Debug)]
pub struct SymbolAllocator {
    next: u64,
}

impl SymbolAllocator {
    /// Create a new allocator that starts from ID 1.
    pub fn new() -> Self {
        Self { next: 1 }
    }

    /// Allocate the next symbol ID.
    pub fn next_id(&mut self) -> EbcResult<SymbolId> {
        let raw = self.next;
        self.next = self.next.checked_add(1).ok_or(SymbolError::AllocatorExhausted)?;
        SymbolId::new(raw).ok_or_else(|| SymbolError::AllocatorExhausted.into())
    }
}

impl Default for SymbolAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbols the architecture itself tests for.
#[derive(Debug, Clone)]
pub struct ArchSymbols {
    pub operator: Sym,
    pub superstate: Sym,
    pub quiescence: Sym,
    pub t: Sym,
}

/// Interning table: one [`Symbol`] per name.
#[derive(Debug)]
pub struct SymbolTable {
    allocator: SymbolAllocator,
    by_name: HashMap<String, Sym>,
    id_counters: HashMap<char, u64>,
    arch: ArchSymbols,
}

impl SymbolTable {
    /// Create a table with the architectural symbols pre-interned.
    pub fn new() -> EbcResult<Self> {
        let mut allocator = SymbolAllocator::new();
        let mut by_name = HashMap::new();
        let mut make = |name: &str| -> EbcResult<Sym> {
            let sym = Rc::new(new_symbol(allocator.next_id()?, name, SymbolKind::StrConstant));
            by_name.insert(name.to_string(), Rc::clone(&sym));
            Ok(sym)
        };
        let arch = ArchSymbols {
            operator: make("operator")?,
            superstate: make("superstate")?,
            quiescence: make("quiescence")?,
            t: make("t")?,
        };
        Ok(Self {
            allocator,
            by_name,
            id_counters: HashMap::new(),
            arch,
        })
    }

    pub fn arch(&self) -> &ArchSymbols {
        &self.arch
    }

    /// Look up an interned symbol by name.
    pub fn find(&self, name: &str) -> Option<Sym> {
        self.by_name.get(name).cloned()
    }

    /// Like [`find`](Self::find), but missing names are an error.
    pub fn resolve(&self, name: &str) -> EbcResult<Sym> {
        self.find(name).ok_or_else(|| {
            SymbolError::Unknown {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Intern a string constant.
    pub fn str_constant(&mut self, name: &str) -> EbcResult<Sym> {
        self.intern(name, SymbolKind::StrConstant)
    }

    /// Intern an integer constant.
    pub fn int_constant(&mut self, value: i64) -> EbcResult<Sym> {
        self.intern(&value.to_string(), SymbolKind::IntConstant(value))
    }

    /// Intern a float constant.
    pub fn float_constant(&mut self, value: f64) -> EbcResult<Sym> {
        self.intern(&format!("{value:?}"), SymbolKind::FloatConstant(value))
    }

    /// Intern a variable. Names are bracketed (`<s>`); brackets are added if missing.
    pub fn variable(&mut self, name: &str) -> EbcResult<Sym> {
        let name = if name.starts_with('<') && name.ends_with('>') {
            name.to_string()
        } else {
            format!("<{name}>")
        };
        self.intern(&name, SymbolKind::Variable)
    }

    /// Create a fresh identifier named `<LETTER><n>`.
    pub fn new_identifier(
        &mut self,
        letter: char,
        level: GoalLevel,
        goal: bool,
        impasse: bool,
    ) -> EbcResult<Sym> {
        let letter = if letter.is_ascii_alphabetic() {
            letter.to_ascii_uppercase()
        } else {
            'I'
        };
        loop {
            let counter = self.id_counters.entry(letter).or_insert(0);
            *counter += 1;
            let name = format!("{letter}{counter}");
            if !self.by_name.contains_key(&name) {
                return self.named_identifier(&name, level, goal, impasse);
            }
        }
    }

    /// Create (or fetch) an identifier with an explicit name.
    pub fn named_identifier(
        &mut self,
        name: &str,
        level: GoalLevel,
        goal: bool,
        impasse: bool,
    ) -> EbcResult<Sym> {
        self.intern(
            name,
            SymbolKind::Identifier {
                level,
                goal,
                impasse,
            },
        )
    }

    /// Number of interned symbols.
    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    fn intern(&mut self, name: &str, kind: SymbolKind) -> EbcResult<Sym> {
        if let Some(existing) = self.by_name.get(name) {
            if existing.kind != kind {
                return Err(SymbolError::KindClash {
                    name: name.to_string(),
                }
                .into());
            }
            return Ok(Rc::clone(existing));
        }
        let sym = Rc::new(new_symbol(self.allocator.next_id()?, name, kind));
        self.by_name.insert(name.to_string(), Rc::clone(&sym));
        Ok(sym)
    }
}

fn new_symbol(id: SymbolId, name: &str, kind: SymbolKind) -> Symbol {
    // Knuth multiplicative hash of the serial number.
    let hash_id = (id.get() as u32).wrapping_mul(2_654_435_761);
    Symbol {
        id,
        name: name.to_string(),
        kind,
        hash_id,
    }
}
