//! Unreloader
//!
//! Development-time hot reloading for an embedded language runtime. Files
//! are loaded through a pluggable [`LoadCapability`]; the reloader records
//! which named definitions each file produced and which files it required,
//! and when a file changes it unloads that file together with every file
//! that depends on it before loading them again.
//!
//! Key pieces:
//! - [`Reloader`]: the engine (require, reload cycle, clear)
//! - [`Unreloader`]: reloader plus an entry block re-run on each call
//! - [`Namespace`] / [`DefinitionRegistry`]: the live bindings and the
//!   rules for removing them
//! - [`DependencyGraph`]: file -> definitions and file -> file edges
//! - [`FileClock`]: where modification times come from

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod graph;
pub mod loader;
pub mod name;
pub mod namespace;
pub mod registry;
pub mod reloader;
mod unloader;
pub mod unreloader;
pub mod watcher;

pub use clock::{FileClock, ManualClock, SystemClock};
pub use config::{ReloaderConfig, SubclassRoots, DEFAULT_COOLDOWN_SECS};
pub use error::{ReloadError, ReloadErrorContext, ReloadResult};
pub use events::{LogCrateLogger, MemoryLogger, ReloadEvent, ReloadLogger};
pub use graph::{DependencyGraph, TrackedFile};
pub use loader::{LoadCapability, LoadContext, SourceUnit};
pub use name::QualifiedName;
pub use namespace::{Binding, DefinitionKind, DefinitionValue, Namespace};
pub use registry::{DefinitionRegistry, RemoveOutcome, ScopeRestriction, SkipReason};
pub use reloader::{ReloadState, Reloader, ReloaderBuilder};
pub use unreloader::Unreloader;
pub use watcher::SourceFilter;
#[cfg(feature = "watch")]
pub use watcher::WatchedClock;
