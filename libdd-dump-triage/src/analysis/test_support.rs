// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Hand-built snapshots for rule-level tests.

use crate::snapshot::{
    BlockingSummary, GcSnapshot, Snapshot, ThreadSnapshot,
};

/// An empty but well-formed snapshot; tests overwrite the fields a rule
/// reads.
pub(crate) fn snapshot() -> Snapshot {
    Snapshot {
        dump_path: "/dumps/w3wp-fixture.dmp".to_string(),
        runtime_description: ".NET Core 8.0.11".to_string(),
        total_thread_count: 0,
        threads: vec![],
        gc: GcSnapshot::default(),
        blocking: BlockingSummary::default(),
        strings: vec![],
        deadlocks: vec![],
        heap_histogram: vec![],
        modules: vec![],
        total_heap_type_count: 0,
        total_module_count: 0,
        total_module_bytes: 0,
        module_coverage_shown: 1.0,
        unique_string_count: 0,
        total_string_occurrences: 0,
        stack_string_occurrences: 0,
        heap_string_occurrences: 0,
        total_heap_object_count: 0,
        heap_histogram_coverage: 0.0,
        warnings: vec![],
    }
}

pub(crate) fn thread(managed_id: i32, state: &str) -> ThreadSnapshot {
    ThreadSnapshot {
        managed_id,
        state: state.to_string(),
        lock_count: 0,
        current_exception: None,
        is_finalizer: false,
        is_gc: false,
        stack_frames: vec![],
        captured_frame_count: 0,
        requested_frame_count: 30,
        cpu_time_ms: None,
    }
}

pub(crate) fn thread_with_frames(managed_id: i32, state: &str, frames: &[&str]) -> ThreadSnapshot {
    let mut t = thread(managed_id, state);
    t.stack_frames = frames.iter().map(|f| f.to_string()).collect();
    t.captured_frame_count = t.stack_frames.len();
    t
}
