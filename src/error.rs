//! Rich diagnostic error types for the explanation-based chunking core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes, help text, and source chains. Errors raised while a
//! chunk build is running are fatal for that build: the session is discarded
//! and no partial outcome escapes.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the chunking core.
///
/// Each variant wraps a subsystem-specific error, preserving the full diagnostic
/// chain (error codes, help text) through to the caller.
#[derive(Debug, Error, Diagnostic)]
pub enum EbcError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Symbol(#[from] SymbolError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Test(#[from] TestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Backtrace(#[from] BacktraceError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] crate::config::ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Fixture(#[from] crate::fixture::FixtureError),
}

// ---------------------------------------------------------------------------
// Symbol errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SymbolError {
    #[error("symbol allocator exhausted")]
    #[diagnostic(
        code(ebc::symbol::exhausted),
        help("The 64-bit ID space has been exhausted. This should never happen in practice.")
    )]
    AllocatorExhausted,

    #[error("unknown symbol: \"{name}\"")]
    #[diagnostic(
        code(ebc::symbol::unknown),
        help("Intern the symbol (or create the identifier) before referring to it by name.")
    )]
    Unknown { name: String },

    #[error("symbol name \"{name}\" is already bound to a symbol of a different kind")]
    #[diagnostic(
        code(ebc::symbol::kind_clash),
        help(
            "Identifiers, variables and constants share one name space. \
             Pick a different name or reuse the existing symbol."
        )
    )]
    KindClash { name: String },
}

// ---------------------------------------------------------------------------
// Test errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum TestError {
    #[error("{test_type} test requires a referent symbol")]
    #[diagnostic(
        code(ebc::test::missing_referent),
        help("Equality and relational tests compare against a symbol; pass one to make_test.")
    )]
    MissingReferent { test_type: String },

    #[error("{test_type} test does not take a referent symbol")]
    #[diagnostic(
        code(ebc::test::unexpected_referent),
        help(
            "Goal-id, impasse-id, disjunction and conjunction tests are built without a \
             referent; disjunction values and conjunction members are added afterwards."
        )
    )]
    UnexpectedReferent { test_type: String },
}

// ---------------------------------------------------------------------------
// Graph errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum GraphError {
    #[error("stale {kind} handle {handle}")]
    #[diagnostic(
        code(ebc::graph::stale_handle),
        help(
            "The referenced {kind} has already been deallocated. A handle outlived the \
             record it points to, which indicates a reference-count bug in the caller."
        )
    )]
    StaleHandle { kind: &'static str, handle: String },

    #[error("condition {condition} has no matched fact")]
    #[diagnostic(
        code(ebc::graph::missing_wme),
        help("Positive instantiated conditions must record the fact they matched.")
    )]
    MissingWme { condition: String },
}

// ---------------------------------------------------------------------------
// Backtrace errors
// ---------------------------------------------------------------------------

/// Invariant violations detected while backtracing.
///
/// These indicate a corrupted instantiation graph (a matcher bug), never bad
/// input, and abort the chunk build.
#[derive(Debug, Error, Diagnostic)]
pub enum BacktraceError {
    #[error("condition {condition} has no equality test in its {field} field")]
    #[diagnostic(
        code(ebc::backtrace::no_equality_test),
        help("Instantiated conditions always carry an equality test on each field.")
    )]
    NoEqualityTest { condition: String, field: String },

    #[error("condition {condition} tests non-identifier \"{symbol}\" in its identifier field")]
    #[diagnostic(
        code(ebc::backtrace::non_identifier),
        help("The identifier field of an instantiated condition must be bound to an identifier.")
    )]
    NonIdentifier { condition: String, symbol: String },

    #[error("condition {condition} matched at level {matched} but its identifier lives at level {level}")]
    #[diagnostic(
        code(ebc::backtrace::level_inversion),
        help("An identifier can never be deeper in the goal stack than the fact that matched it.")
    )]
    LevelInversion {
        condition: String,
        level: u16,
        matched: u16,
    },
}

/// Convenience alias for functions returning chunking-core results.
pub type EbcResult<T> = std::result::Result<T, EbcError>;
