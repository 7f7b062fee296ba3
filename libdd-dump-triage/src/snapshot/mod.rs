// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The immutable snapshot extracted from a dump.
//!
//! Every entity here is produced by the builder and only read afterwards:
//! the reasoner and any reporters consume a `Snapshot` without mutating it.

mod builder;
mod strings;
mod threads;

pub use builder::{build_snapshot, build_snapshot_with, CancelToken};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::text::contains_ignore_case;

/// One captured thread, with as much of its stack as the frame cap allowed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ThreadSnapshot {
    pub managed_id: i32,
    pub state: String,
    pub lock_count: u32,
    pub current_exception: Option<String>,
    pub is_finalizer: bool,
    pub is_gc: bool,
    /// Rendered frames, innermost first. Never longer than requested.
    pub stack_frames: Vec<String>,
    pub captured_frame_count: usize,
    pub requested_frame_count: usize,
    pub cpu_time_ms: Option<f64>,
}

impl ThreadSnapshot {
    pub fn state_contains(&self, needle: &str) -> bool {
        contains_ignore_case(&self.state, needle)
    }

    pub fn has_frame_containing(&self, needle: &str) -> bool {
        self.stack_frames
            .iter()
            .any(|f| contains_ignore_case(f, needle))
    }
}

/// Where a notable string was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum StringSource {
    Stack,
    Heap,
    StackAndHeap,
}

/// A de-duplicated in-memory string worth surfacing, keyed by its
/// post-truncation text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct NotableString {
    /// Threads whose stacks root this value. Empty for heap-only strings.
    pub thread_ids: Vec<i32>,
    pub text: String,
    /// Length of the first observed value before head+tail truncation.
    pub total_length: usize,
    pub was_truncated: bool,
    pub source: StringSource,
    pub occurrences: u64,
}

/// GC heap accounting summed from segment metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct GcSnapshot {
    pub total_heap_bytes: u64,
    pub large_object_heap_bytes: u64,
    pub segment_count: usize,
    pub is_server_gc: bool,
    pub gen0_bytes: u64,
    pub gen1_bytes: u64,
    pub gen2_bytes: u64,
    pub pinned_bytes: u64,
}

/// Monitor usage at dump time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct BlockingSummary {
    pub sync_block_count: usize,
    pub waiting_thread_count: u64,
}

/// A monitor with waiters, or one still held at dump time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DeadlockCandidate {
    /// None when the holding thread could not be mapped to a managed id.
    pub owner_thread_id: Option<i32>,
    pub waiting_thread_count: u32,
    pub object_address: u64,
}

/// Aggregated footprint of one heap type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct HeapTypeStat {
    pub type_name: String,
    pub total_size: u64,
    pub instance_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModuleInfo {
    pub name: String,
    pub size: u64,
}

/// Data-quality warning categories, listed here in display priority order.
/// Sorting uses the explicit [`WarningCategory::priority`] table rather than
/// declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum WarningCategory {
    HeapUnavailable,
    ThreadTruncation,
    StackReadPartial,
    ThreadSelection,
    StringClamp,
    HeapStringClamp,
    StringDedupe,
    HeapHistogramClamp,
    ModuleClamp,
    Other,
}

impl WarningCategory {
    pub fn priority(self) -> u8 {
        match self {
            WarningCategory::HeapUnavailable => 0,
            WarningCategory::ThreadTruncation => 1,
            WarningCategory::StackReadPartial => 2,
            WarningCategory::ThreadSelection => 3,
            WarningCategory::StringClamp => 4,
            WarningCategory::HeapStringClamp => 5,
            WarningCategory::StringDedupe => 6,
            WarningCategory::HeapHistogramClamp => 7,
            WarningCategory::ModuleClamp => 8,
            WarningCategory::Other => 9,
        }
    }
}

/// A recorded data-quality event: something was truncated, clamped, or only
/// partially read while building the snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DataWarning {
    pub category: WarningCategory,
    pub message: String,
}

impl DataWarning {
    pub fn new(category: WarningCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
        }
    }
}

/// Everything the triage pipeline extracted from one dump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Snapshot {
    pub dump_path: String,
    pub runtime_description: String,
    /// Alive threads in the dump, before any display truncation.
    pub total_thread_count: usize,
    pub threads: Vec<ThreadSnapshot>,
    pub gc: GcSnapshot,
    pub blocking: BlockingSummary,
    /// First-seen order.
    pub strings: Vec<NotableString>,
    pub deadlocks: Vec<DeadlockCandidate>,
    /// Descending by total size.
    pub heap_histogram: Vec<HeapTypeStat>,
    /// Load order, unclamped; display layers apply their own caps.
    pub modules: Vec<ModuleInfo>,
    pub total_heap_type_count: usize,
    pub total_module_count: usize,
    pub total_module_bytes: u64,
    /// Fraction of module bytes covered by the twenty largest modules.
    pub module_coverage_shown: f64,
    pub unique_string_count: usize,
    pub total_string_occurrences: u64,
    pub stack_string_occurrences: u64,
    pub heap_string_occurrences: u64,
    pub total_heap_object_count: u64,
    /// Fraction of heap bytes attributed to the surfaced histogram entries.
    pub heap_histogram_coverage: f64,
    /// Sorted by category priority, then message.
    pub warnings: Vec<DataWarning>,
}
