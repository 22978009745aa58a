//! Incremental static type inference for Lua, built for code completion.
//!
//! Given Lua source text, the engine builds a conservative model of the
//! shape of every reachable identifier, table, and function, and answers
//! completion queries against it. The standard library ships as a frozen,
//! shared type graph; each analysis session extends it speculatively through
//! generation-tagged overlays, so no session can corrupt the base for the
//! others.
//!
//! The typical entry point is [`Engine`]:
//!
//! ```no_run
//! use luacomp_core::{Engine, Options};
//!
//! let mut engine = Engine::new(Options::default())?;
//! let source = "local greeting = 'hi'\ngree";
//! let suggestions = engine.complete(source, source.len(), false)?;
//! # Ok::<(), luacomp_core::EngineError>(())
//! ```

pub mod analysis;
pub mod engine;
pub mod extraction;
pub mod format;
pub mod lattice;
pub mod module_cache;
pub mod options;
pub mod parser;
pub mod resolve;
pub mod syntax;
pub mod typedef;

pub use analysis::{Accessor, Analysis, Found, ModuleResult, SessionState};
pub use engine::{Engine, EngineError};
pub use extraction::DiscoveryStrategy;
pub use format::Suggestion;
pub use options::{load_project_config, LuaVersion, Options, RawConfig};
pub use typedef::{TypeArena, TypeContext, TypeDef};
