//! Shared fixtures for the integration tests
//!
//! `ScriptLoader` executes a tiny line-oriented language:
//! - `require <path>`: nested require, relative to the current file
//! - `class <Name> [< <Parent>]` / `module <Name>`: open (or reopen) a
//!   definition; its value is a JSON array kept across reopenings
//! - `push <int>`: append to the open definition
//! - `capture <Name>`: append another definition's current value
//! - `fail <message>`: abort the load

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use anyhow::{anyhow, bail, Context};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tempfile::TempDir;

use unreloader::{
    DefinitionKind, FileClock, LoadCapability, LoadContext, ManualClock, MemoryLogger, Namespace,
    QualifiedName, Reloader, ReloaderConfig, SourceUnit,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub struct ScriptLoader;

impl LoadCapability for ScriptLoader {
    fn execute(&self, unit: &SourceUnit, cx: &mut LoadContext<'_>) -> anyhow::Result<()> {
        let source = unit.read_to_string()?;
        let mut open: Option<(String, DefinitionKind)> = None;

        for (number, line) in source.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (command, rest) = line.split_once(' ').unwrap_or((line, ""));
            let rest = rest.trim();

            match command {
                "require" => cx.require(rest)?,
                "class" => {
                    let (name, kind) = match rest.split_once('<') {
                        Some((name, parent)) => {
                            let parent = QualifiedName::parse(parent.trim())?;
                            (name.trim(), DefinitionKind::subclass_of(parent))
                        }
                        None => (rest, DefinitionKind::class()),
                    };
                    reopen(cx, name, kind.clone())?;
                    open = Some((name.to_string(), kind));
                }
                "module" => {
                    reopen(cx, rest, DefinitionKind::Module)?;
                    open = Some((rest.to_string(), DefinitionKind::Module));
                }
                "push" | "capture" => {
                    let (name, kind) = open
                        .clone()
                        .ok_or_else(|| anyhow!("line {}: {} outside a definition", number + 1, command))?;
                    let item = if command == "push" {
                        Value::from(rest.parse::<i64>().with_context(|| format!("line {}", number + 1))?)
                    } else {
                        cx.value::<Value>(rest)
                            .cloned()
                            .ok_or_else(|| anyhow!("uninitialized constant {}", rest))?
                    };
                    let mut items = current_items(cx, &name);
                    items.push(item);
                    cx.define(&name, kind, Value::Array(items))?;
                }
                "fail" => bail!("{}", rest),
                other => bail!("line {}: unknown command {:?}", number + 1, other),
            }
        }
        Ok(())
    }
}

fn current_items(cx: &LoadContext<'_>, name: &str) -> Vec<Value> {
    cx.value::<Value>(name)
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

/// Bind `name`, keeping the items of an existing binding
fn reopen(cx: &mut LoadContext<'_>, name: &str, kind: DefinitionKind) -> anyhow::Result<()> {
    let items = current_items(cx, name);
    cx.define(name, kind, Value::Array(items))?;
    Ok(())
}

/// Integer items of a definition
pub fn ints(namespace: &Namespace, name: &str) -> Option<Vec<i64>> {
    namespace
        .value::<Value>(name)?
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_i64).collect())
}

/// Raw JSON value of a definition
pub fn json_value(namespace: &Namespace, name: &str) -> Option<Value> {
    namespace.value::<Value>(name).cloned()
}

/// Counts timestamp reads per path on top of a `ManualClock`
#[derive(Default)]
pub struct CountingClock {
    pub inner: ManualClock,
    reads: Mutex<FxHashMap<PathBuf, usize>>,
    total: AtomicUsize,
}

impl CountingClock {
    pub fn reads(&self, path: &Path) -> usize {
        self.reads.lock().get(path).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.reads.lock().clear();
        self.total.store(0, Ordering::SeqCst);
    }
}

impl FileClock for CountingClock {
    fn modified_at(&self, path: &Path) -> Option<SystemTime> {
        *self.reads.lock().entry(path.to_path_buf()).or_default() += 1;
        self.total.fetch_add(1, Ordering::SeqCst);
        self.inner.modified_at(path)
    }

    fn now(&self) -> Instant {
        self.inner.now()
    }
}

/// Temp directory of script files with pinned, increasing timestamps
pub struct Project {
    pub dir: TempDir,
    pub clock: Arc<ManualClock>,
    pub logger: Arc<MemoryLogger>,
    tick: u64,
}

impl Project {
    pub fn new() -> Self {
        init_logging();
        Self {
            dir: TempDir::new().expect("Failed to create temp directory for project"),
            clock: Arc::new(ManualClock::new()),
            logger: Arc::new(MemoryLogger::new()),
            tick: 0,
        }
    }

    /// Reloader wired to this project's clock and logger
    pub fn reloader(&self, config: ReloaderConfig) -> Reloader {
        Reloader::builder(ScriptLoader)
            .config(config)
            .clock(self.clock.clone())
            .logger(self.logger.clone())
            .build()
    }

    pub fn zero_cooldown() -> ReloaderConfig {
        ReloaderConfig::default().with_cooldown(Duration::ZERO)
    }

    /// Write `body` to `file` and give it a newer timestamp than anything
    /// written before. Returns the canonical path.
    pub fn write(&mut self, file: &str, body: &str) -> PathBuf {
        let path = self.dir.path().join(file);
        std::fs::write(&path, body).expect("write script");
        self.tick += 1;
        self.clock.set_modified_secs(&path, self.tick);
        path.canonicalize().expect("canonical script path")
    }

    /// Delete `file` and report it missing
    pub fn delete(&self, file: &str) {
        let path = self.dir.path().join(file);
        self.clock.mark_missing(&path);
        std::fs::remove_file(&path).expect("delete script");
    }

    pub fn path(&self, file: &str) -> PathBuf {
        self.dir.path().join(file)
    }

    pub fn lines(&self) -> Vec<String> {
        self.logger.lines()
    }

    pub fn loading(path: &Path) -> String {
        format!("Loading {}", path.display())
    }

    pub fn reloading(path: &Path) -> String {
        format!("Reloading {}", path.display())
    }

    pub fn unloading(path: &Path) -> String {
        format!("Unloading {}", path.display())
    }

    pub fn failed(path: &Path) -> String {
        format!("Failed to load {}; removing partially defined constants", path.display())
    }

    pub fn removed(name: &str) -> String {
        format!("Removed constant {}", name)
    }
}
