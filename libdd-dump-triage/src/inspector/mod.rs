// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Read-only capability set over an opened process dump.
//!
//! The triage core never parses dump files itself; a dump-reader library
//! implements these traits and the builder consumes them. Implementations do
//! not need to be thread-safe: the core is single-threaded per analysis and
//! never issues concurrent calls into an inspector. OS resources held by an
//! inspector are released on drop, on every exit path.

use std::path::Path;

#[cfg(any(test, feature = "test-utils"))]
pub mod memory;

/// Opens dumps. The entry point the triage pipeline is generic over.
pub trait DumpSource {
    fn open(&self, path: &Path) -> anyhow::Result<Box<dyn DumpInspector>>;
}

/// An opened dump.
pub trait DumpInspector {
    /// Managed runtimes found in the dump, in discovery order. The builder
    /// works against the first one.
    fn runtimes(&self) -> anyhow::Result<Vec<Box<dyn RuntimeHandle + '_>>>;
}

/// One managed runtime inside the dump.
pub trait RuntimeHandle {
    fn banner(&self) -> RuntimeBanner;
    fn threads(&self) -> anyhow::Result<Vec<Box<dyn ThreadHandle + '_>>>;
    /// None when the dump carries no usable heap metadata at all.
    fn heap(&self) -> Option<Box<dyn HeapHandle + '_>>;
    /// Loaded modules in load order.
    fn modules(&self) -> Vec<ModuleRecord>;
}

/// A managed thread. Property reads are infallible snapshots of the dump's
/// metadata; only the stack-frame walk can fail mid-flight.
pub trait ThreadHandle {
    fn managed_id(&self) -> i32;
    /// Native thread object address, used to resolve sync-block owners.
    fn address(&self) -> u64;
    fn is_alive(&self) -> bool;
    fn state_text(&self) -> String;
    fn lock_count(&self) -> u32;
    fn current_exception(&self) -> Option<ExceptionInfo>;
    fn is_finalizer(&self) -> bool;
    fn is_gc(&self) -> bool;
    /// Accumulated CPU time, when the reader can supply it.
    fn cpu_time_ms(&self) -> Option<f64>;
    /// Object addresses rooted by this thread's stack.
    fn stack_roots(&self) -> Box<dyn Iterator<Item = u64> + '_>;
    /// Rendered stack frames, innermost first. After the first `Err` item
    /// the walk is abandoned; frames already yielded stay valid.
    fn stack_frames(&self) -> Box<dyn Iterator<Item = anyhow::Result<String>> + '_>;
}

/// The garbage-collected heap of one runtime.
pub trait HeapHandle {
    fn can_walk(&self) -> bool;
    fn is_server(&self) -> bool;
    fn segments(&self) -> Vec<SegmentRecord>;
    /// Every object on the heap. May be millions of items; the builder walks
    /// this at most once.
    fn objects(&self) -> Box<dyn Iterator<Item = Box<dyn ObjectHandle + '_>> + '_>;
    /// Resolves a single object, e.g. a stack-root address.
    fn object_at(&self, address: u64) -> Option<Box<dyn ObjectHandle + '_>>;
    fn sync_blocks(&self) -> Vec<SyncBlockRecord>;
}

/// One heap object.
pub trait ObjectHandle {
    fn address(&self) -> u64;
    fn is_valid(&self) -> bool;
    fn type_name(&self) -> Option<String>;
    fn is_string(&self) -> bool;
    fn size(&self) -> u64;
    /// Reads at most `max_chars` characters of a string object's payload.
    fn read_string(&self, max_chars: usize) -> anyhow::Result<String>;
}

/// Runtime identification, e.g. flavor ".NET Core" and version "8.0.11".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeBanner {
    pub flavor: String,
    pub version: String,
}

impl RuntimeBanner {
    pub fn describe(&self) -> String {
        format!("{} {}", self.flavor, self.version)
    }
}

/// The exception a thread was carrying when the dump was taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionInfo {
    pub type_name: String,
    pub message: Option<String>,
}

impl ExceptionInfo {
    pub fn describe(&self) -> String {
        match &self.message {
            Some(message) => format!("{}: {}", self.type_name, message),
            None => self.type_name.clone(),
        }
    }
}

/// Heap segment classes tracked by the GC accounting phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentKind {
    Gen0,
    Gen1,
    Gen2,
    Large,
    Pinned,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentRecord {
    pub kind: SegmentKind,
    pub length: u64,
}

/// A runtime sync block: an object used as a monitor, who holds it, and how
/// many threads wait on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncBlockRecord {
    pub object_address: u64,
    pub waiting_thread_count: u32,
    pub is_monitor_held: bool,
    pub holding_thread_address: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub name: String,
    pub size: u64,
}
