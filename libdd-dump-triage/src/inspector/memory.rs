// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Deterministic in-memory dump fixture.
//!
//! Backs the crate's own tests and lets consumers exercise reporters or new
//! reasoner rules without a real dump reader. Failure knobs cover the
//! degraded dumps the builder has to survive: stack walks that die part way,
//! strings that will not read, heaps that cannot be walked.

use std::collections::BTreeMap;
use std::path::Path;

use super::{
    DumpInspector, DumpSource, ExceptionInfo, HeapHandle, ModuleRecord, ObjectHandle,
    RuntimeBanner, RuntimeHandle, SegmentKind, SegmentRecord, SyncBlockRecord, ThreadHandle,
};

/// A dump source that hands out copies of a scripted runtime.
#[derive(Debug, Clone, Default)]
pub struct MemoryDump {
    pub runtimes: Vec<MemoryRuntime>,
}

impl MemoryDump {
    pub fn new(runtime: MemoryRuntime) -> Self {
        Self {
            runtimes: vec![runtime],
        }
    }

    /// A dump in which no managed runtime was found.
    pub fn without_runtime() -> Self {
        Self { runtimes: vec![] }
    }
}

impl DumpSource for MemoryDump {
    fn open(&self, _path: &Path) -> anyhow::Result<Box<dyn DumpInspector>> {
        Ok(Box::new(MemoryInspector {
            runtimes: self.runtimes.clone(),
        }))
    }
}

#[derive(Debug, Clone)]
pub struct MemoryInspector {
    runtimes: Vec<MemoryRuntime>,
}

impl DumpInspector for MemoryInspector {
    fn runtimes(&self) -> anyhow::Result<Vec<Box<dyn RuntimeHandle + '_>>> {
        Ok(self
            .runtimes
            .iter()
            .map(|r| Box::new(r.clone()) as Box<dyn RuntimeHandle>)
            .collect())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryRuntime {
    pub flavor: String,
    pub version: String,
    pub threads: Vec<MemoryThread>,
    pub heap: Option<MemoryHeap>,
    pub modules: Vec<ModuleRecord>,
}

impl Default for MemoryRuntime {
    fn default() -> Self {
        Self {
            flavor: ".NET Core".to_string(),
            version: "8.0.11".to_string(),
            threads: vec![],
            heap: Some(MemoryHeap::default()),
            modules: vec![],
        }
    }
}

impl MemoryRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_thread(mut self, thread: MemoryThread) -> Self {
        self.threads.push(thread);
        self
    }

    pub fn with_heap(mut self, heap: MemoryHeap) -> Self {
        self.heap = Some(heap);
        self
    }

    pub fn with_module(mut self, name: &str, size: u64) -> Self {
        self.modules.push(ModuleRecord {
            name: name.to_string(),
            size,
        });
        self
    }
}

impl RuntimeHandle for MemoryRuntime {
    fn banner(&self) -> RuntimeBanner {
        RuntimeBanner {
            flavor: self.flavor.clone(),
            version: self.version.clone(),
        }
    }

    fn threads(&self) -> anyhow::Result<Vec<Box<dyn ThreadHandle + '_>>> {
        Ok(self
            .threads
            .iter()
            .map(|t| Box::new(t.clone()) as Box<dyn ThreadHandle>)
            .collect())
    }

    fn heap(&self) -> Option<Box<dyn HeapHandle + '_>> {
        self.heap
            .as_ref()
            .map(|h| Box::new(h.clone()) as Box<dyn HeapHandle>)
    }

    fn modules(&self) -> Vec<ModuleRecord> {
        self.modules.clone()
    }
}

#[derive(Debug, Clone)]
pub struct MemoryThread {
    pub managed_id: i32,
    pub address: u64,
    pub is_alive: bool,
    pub state: String,
    pub lock_count: u32,
    pub exception: Option<ExceptionInfo>,
    pub is_finalizer: bool,
    pub is_gc: bool,
    pub cpu_time_ms: Option<f64>,
    pub stack_roots: Vec<u64>,
    pub frames: Vec<String>,
    /// When set, the frame walk yields this many frames and then fails.
    pub fail_frames_after: Option<usize>,
}

impl MemoryThread {
    pub fn new(managed_id: i32, state: &str) -> Self {
        Self {
            managed_id,
            address: 0x7000_0000 + managed_id as u64 * 0x100,
            is_alive: true,
            state: state.to_string(),
            lock_count: 0,
            exception: None,
            is_finalizer: false,
            is_gc: false,
            cpu_time_ms: None,
            stack_roots: vec![],
            frames: vec![],
            fail_frames_after: None,
        }
    }

    pub fn running(managed_id: i32) -> Self {
        Self::new(managed_id, "Running")
    }

    pub fn waiting(managed_id: i32) -> Self {
        Self::new(managed_id, "WaitSleepJoin")
    }

    pub fn with_exception(mut self, type_name: &str, message: &str) -> Self {
        self.exception = Some(ExceptionInfo {
            type_name: type_name.to_string(),
            message: Some(message.to_string()),
        });
        self
    }

    pub fn with_frames(mut self, frames: &[&str]) -> Self {
        self.frames = frames.iter().map(|f| f.to_string()).collect();
        self
    }

    pub fn with_roots(mut self, roots: &[u64]) -> Self {
        self.stack_roots = roots.to_vec();
        self
    }

    pub fn with_locks(mut self, lock_count: u32) -> Self {
        self.lock_count = lock_count;
        self
    }
}

impl ThreadHandle for MemoryThread {
    fn managed_id(&self) -> i32 {
        self.managed_id
    }

    fn address(&self) -> u64 {
        self.address
    }

    fn is_alive(&self) -> bool {
        self.is_alive
    }

    fn state_text(&self) -> String {
        self.state.clone()
    }

    fn lock_count(&self) -> u32 {
        self.lock_count
    }

    fn current_exception(&self) -> Option<ExceptionInfo> {
        self.exception.clone()
    }

    fn is_finalizer(&self) -> bool {
        self.is_finalizer
    }

    fn is_gc(&self) -> bool {
        self.is_gc
    }

    fn cpu_time_ms(&self) -> Option<f64> {
        self.cpu_time_ms
    }

    fn stack_roots(&self) -> Box<dyn Iterator<Item = u64> + '_> {
        Box::new(self.stack_roots.iter().copied())
    }

    fn stack_frames(&self) -> Box<dyn Iterator<Item = anyhow::Result<String>> + '_> {
        let mut items: Vec<anyhow::Result<String>> = Vec::with_capacity(self.frames.len() + 1);
        match self.fail_frames_after {
            Some(good) => {
                items.extend(self.frames.iter().take(good).cloned().map(Ok));
                items.push(Err(anyhow::anyhow!(
                    "stack walk aborted for thread {}",
                    self.managed_id
                )));
            }
            None => items.extend(self.frames.iter().cloned().map(Ok)),
        }
        Box::new(items.into_iter())
    }
}

#[derive(Debug, Clone)]
pub struct MemoryHeap {
    pub can_walk: bool,
    pub is_server: bool,
    pub segments: Vec<SegmentRecord>,
    pub objects: BTreeMap<u64, MemoryObject>,
    pub sync_blocks: Vec<SyncBlockRecord>,
}

impl Default for MemoryHeap {
    fn default() -> Self {
        Self {
            can_walk: true,
            is_server: true,
            segments: vec![],
            objects: BTreeMap::new(),
            sync_blocks: vec![],
        }
    }
}

impl MemoryHeap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn unwalkable() -> Self {
        Self {
            can_walk: false,
            ..Self::default()
        }
    }

    /// Convenience for per-generation segment setup; zero-length generations
    /// are omitted.
    pub fn with_generations(mut self, gen0: u64, gen1: u64, gen2: u64, loh: u64, pinned: u64) -> Self {
        let kinds = [
            (SegmentKind::Gen0, gen0),
            (SegmentKind::Gen1, gen1),
            (SegmentKind::Gen2, gen2),
            (SegmentKind::Large, loh),
            (SegmentKind::Pinned, pinned),
        ];
        for (kind, length) in kinds {
            if length > 0 {
                self.segments.push(SegmentRecord { kind, length });
            }
        }
        self
    }

    pub fn with_object(mut self, object: MemoryObject) -> Self {
        self.objects.insert(object.address, object);
        self
    }

    pub fn with_sync_block(mut self, block: SyncBlockRecord) -> Self {
        self.sync_blocks.push(block);
        self
    }
}

impl HeapHandle for MemoryHeap {
    fn can_walk(&self) -> bool {
        self.can_walk
    }

    fn is_server(&self) -> bool {
        self.is_server
    }

    fn segments(&self) -> Vec<SegmentRecord> {
        self.segments.clone()
    }

    fn objects(&self) -> Box<dyn Iterator<Item = Box<dyn ObjectHandle + '_>> + '_> {
        Box::new(
            self.objects
                .values()
                .map(|o| Box::new(o.clone()) as Box<dyn ObjectHandle>),
        )
    }

    fn object_at(&self, address: u64) -> Option<Box<dyn ObjectHandle + '_>> {
        self.objects
            .get(&address)
            .map(|o| Box::new(o.clone()) as Box<dyn ObjectHandle>)
    }

    fn sync_blocks(&self) -> Vec<SyncBlockRecord> {
        self.sync_blocks.clone()
    }
}

#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub address: u64,
    pub type_name: String,
    pub size: u64,
    pub string_value: Option<String>,
    pub unreadable: bool,
    pub valid: bool,
}

impl MemoryObject {
    pub fn instance(address: u64, type_name: &str, size: u64) -> Self {
        Self {
            address,
            type_name: type_name.to_string(),
            size,
            string_value: None,
            unreadable: false,
            valid: true,
        }
    }

    pub fn string(address: u64, value: &str) -> Self {
        Self {
            address,
            type_name: "System.String".to_string(),
            size: 26 + 2 * value.chars().count() as u64,
            string_value: Some(value.to_string()),
            unreadable: false,
            valid: true,
        }
    }

    pub fn unreadable_string(address: u64) -> Self {
        Self {
            unreadable: true,
            ..Self::string(address, "")
        }
    }

    pub fn invalid(address: u64) -> Self {
        Self {
            valid: false,
            ..Self::instance(address, "", 0)
        }
    }
}

impl ObjectHandle for MemoryObject {
    fn address(&self) -> u64 {
        self.address
    }

    fn is_valid(&self) -> bool {
        self.valid
    }

    fn type_name(&self) -> Option<String> {
        if self.type_name.is_empty() {
            None
        } else {
            Some(self.type_name.clone())
        }
    }

    fn is_string(&self) -> bool {
        self.string_value.is_some()
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn read_string(&self, max_chars: usize) -> anyhow::Result<String> {
        if self.unreadable {
            anyhow::bail!("object memory unavailable at {:#x}", self.address);
        }
        match &self.string_value {
            Some(value) => Ok(value.chars().take(max_chars).collect()),
            None => anyhow::bail!("object at {:#x} is not a string", self.address),
        }
    }
}
