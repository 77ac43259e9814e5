//! Reload events
//!
//! Every externally visible step of a reload cycle is reported as a
//! [`ReloadEvent`]. Their `Display` output is the stable line format that
//! existing tooling greps for, so do not reword them.

use std::fmt;
use std::path::PathBuf;

use parking_lot::Mutex;

use crate::name::QualifiedName;

/// Discrete reload event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReloadEvent {
    /// First load of a file
    Loading(PathBuf),
    /// Load of a file that was loaded successfully before
    Reloading(PathBuf),
    /// A tracked file disappeared from disk
    Unloading(PathBuf),
    RemovedConstant(QualifiedName),
    /// The load capability raised; partial definitions are being removed
    LoadFailed(PathBuf),
    /// A configured scope root is not a legal name
    InvalidConstantName(String),
    /// A definition owned by one file was redefined by another
    OwnershipTransferred {
        name: QualifiedName,
        from: PathBuf,
        to: PathBuf,
    },
}

impl ReloadEvent {
    /// Level the default sink uses for this event
    pub fn level(&self) -> log::Level {
        match self {
            ReloadEvent::LoadFailed(_) => log::Level::Error,
            ReloadEvent::InvalidConstantName(_) | ReloadEvent::OwnershipTransferred { .. } => {
                log::Level::Warn
            }
            _ => log::Level::Info,
        }
    }
}

impl fmt::Display for ReloadEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReloadEvent::Loading(path) => write!(f, "Loading {}", path.display()),
            ReloadEvent::Reloading(path) => write!(f, "Reloading {}", path.display()),
            ReloadEvent::Unloading(path) => write!(f, "Unloading {}", path.display()),
            ReloadEvent::RemovedConstant(name) => write!(f, "Removed constant {}", name),
            ReloadEvent::LoadFailed(path) => write!(
                f,
                "Failed to load {}; removing partially defined constants",
                path.display()
            ),
            ReloadEvent::InvalidConstantName(raw) => {
                write!(f, "{:?} is not a valid constant name!", raw)
            }
            ReloadEvent::OwnershipTransferred { name, from, to } => write!(
                f,
                "{} redefined by {} (previously defined by {})",
                name,
                to.display(),
                from.display()
            ),
        }
    }
}

/// Sink for reload events
pub trait ReloadLogger: Send + Sync {
    fn log(&self, event: &ReloadEvent);
}

/// Default sink: forwards events to the `log` facade
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCrateLogger;

impl ReloadLogger for LogCrateLogger {
    fn log(&self, event: &ReloadEvent) {
        log::log!(target: "unreloader", event.level(), "{}", event);
    }
}

/// Sink that keeps rendered lines in memory
#[derive(Debug, Default)]
pub struct MemoryLogger {
    lines: Mutex<Vec<String>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every line logged so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl ReloadLogger for MemoryLogger {
    fn log(&self, event: &ReloadEvent) {
        self.lines.lock().push(event.to_string());
    }
}
