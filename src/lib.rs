// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # ebc-core
//!
//! The backtracing core of explanation-based chunking for a Soar-style
//! production system. When a rule firing in a subgoal produces a result for a
//! higher goal, the backtracer walks the instantiation graph behind that
//! result and sorts every condition it depended on into grounds (kept in the
//! learned rule), locals (traced further back) and negated conditions, while
//! asking an external resolver to unify identities that must end up as the
//! same rule variable.
//!
//! ## Architecture
//!
//! - **Symbols** (`symbol`): interned `Rc` symbols with goal-stack levels
//! - **Tests** (`test`): the closed test sum type, comparison, hashing, editing
//! - **Conditions** (`condition`, `chunk_cond`): instantiated conditions and
//!   duplicate-free condition sets
//! - **Graph** (`graph`, `arena`): facts, preferences, instantiations and
//!   conditions in generation-checked arenas, with the deallocation cascade
//! - **Identities** (`identity`, `unify`): grounding ids and unification requests
//! - **Backtracer** (`backtrace`): per-build sessions, locals worklist,
//!   singleton unification, user-facing trace
//!
//! ## Library usage
//!
//! ```no_run
//! use ebc_core::backtrace::ExplanationChunker;
//! use ebc_core::config::EbcConfig;
//! use ebc_core::fixture::GraphFixture;
//! use ebc_core::unify::RecordingUnifier;
//!
//! let fixture = GraphFixture::load("graph.json".as_ref()).unwrap();
//! let mut loaded = fixture.build().unwrap();
//! let base = loaded.instantiation("apply*result").unwrap();
//!
//! let mut chunker = ExplanationChunker::new(EbcConfig::default());
//! let mut unifier = RecordingUnifier::new();
//! let outcome = chunker.explain(&mut loaded.graph, &mut unifier, base, 1, &[]).unwrap();
//! println!("{} grounds, reliable: {}", outcome.grounds.len(), outcome.reliable);
//! ```

pub mod arena;
pub mod backtrace;
pub mod chunk_cond;
pub mod condition;
pub mod config;
pub mod error;
pub mod fixture;
pub mod graph;
pub mod identity;
pub mod symbol;
pub mod test;
pub mod unify;
