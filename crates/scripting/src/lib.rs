//! # Skript Scripting
//!
//! Loads scripts into a host: every top-level section of a script is matched
//! against registered structure descriptors and driven through the load
//! phases (`init`, `preload`, `load`, `after_load`, and later `unload`).
//!
//! ## Pieces
//! - [`pattern`] and [`registry`]: section header patterns and descriptors
//! - [`context`]: per-parser state and typed sub-contexts
//! - [`structures`]: options, aliases, variables, functions, commands and events
//! - [`event`] and [`trigger`]: buffered event triggers, bound when a script is done
//! - [`scheduler`]: main-thread handoff for host mutations
//! - [`host`]: the host surface plus an in-memory host
//! - [`loader`]: the phase pipeline over whole scripts and folders

pub mod aliases;
pub mod builtins;
pub mod classes;
pub mod commands;
pub mod context;
pub mod error;
pub mod event;
pub mod functions;
pub mod host;
pub mod items;
pub mod loader;
pub mod pattern;
pub mod registry;
pub mod scheduler;
pub mod structure;
pub mod structures;
pub mod trigger;
pub mod variables;

pub use builtins::{default_data, default_registry};
pub use context::{DataRegistry, ParserContext, ParserData, ScriptInfo};
pub use error::{ErrorKind, Result, ScriptError};
pub use event::{EventClass, HostEvent, SelfRegistering, SkriptEvent};
pub use host::{Host, InMemoryHost};
pub use loader::{LoadSummary, LoadedScript, ScriptLoader, ScriptSource};
pub use pattern::{ParseResult, Pattern};
pub use registry::{StructureInfo, StructureRegistry};
pub use scheduler::MainThread;
pub use structure::Structure;
pub use trigger::Trigger;
