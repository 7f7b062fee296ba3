// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Process-level signals: crashes, memory pressure, GC shape, monitor
//! contention, and CPU saturation.

use crate::analysis::{AnalysisContext, Finding, Severity};
use crate::snapshot::Snapshot;
use crate::text::format_bytes;

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

/// A kept thread carrying a current exception is the strongest signal a
/// dump can show.
pub(super) fn crash_signals(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    let mut lines: Vec<String> = Vec::new();
    for thread in &snapshot.threads {
        if let Some(exception) = &thread.current_exception {
            lines.push(format!("Thread {}: {}", thread.managed_id, exception));
        }
    }
    if lines.is_empty() {
        return;
    }
    findings.push(Finding::critical(
        "Application crash or unhandled exception",
        lines.join("\n"),
        "Walk the faulting thread's stack top-down to the first application frame. \
         Fix the exception source or add handling at the boundary where the runtime \
         terminated the process.",
    ));
}

pub(super) fn memory_signals(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    let gc = &snapshot.gc;
    if gc.total_heap_bytes > 2 * GIB {
        findings.push(Finding::critical(
            "High managed memory pressure",
            format!(
                "Total managed heap: {} across {} segment(s)\nGen0 {}, Gen1 {}, Gen2 {}, LOH {}, Pinned {}",
                format_bytes(gc.total_heap_bytes),
                gc.segment_count,
                format_bytes(gc.gen0_bytes),
                format_bytes(gc.gen1_bytes),
                format_bytes(gc.gen2_bytes),
                format_bytes(gc.large_object_heap_bytes),
                format_bytes(gc.pinned_bytes),
            ),
            "Check the heap histogram for the dominant types and trace who retains them. \
             Compare against a healthy dump of the same process to separate leak from load.",
        ));
    } else if gc.large_object_heap_bytes > 512 * MIB {
        findings.push(Finding::warning(
            "Large Object Heap growth",
            format!(
                "LOH holds {} of a {} managed heap",
                format_bytes(gc.large_object_heap_bytes),
                format_bytes(gc.total_heap_bytes),
            ),
            "Large allocations (>85 KB) land on the LOH and are only collected with Gen2. \
             Pool big buffers (ArrayPool) or chunk them below the LOH threshold.",
        ));
    }
}

pub(super) fn gc_nuance_signals(
    snapshot: &Snapshot,
    context: &AnalysisContext,
    findings: &mut Vec<Finding>,
) {
    let gc = &snapshot.gc;
    let total = gc.total_heap_bytes;
    let (g2, g0, pinned) = if total == 0 {
        (0.0, 0.0, 0.0)
    } else {
        (
            gc.gen2_bytes as f64 / total as f64,
            gc.gen0_bytes as f64 / total as f64,
            gc.pinned_bytes as f64 / total as f64,
        )
    };

    if g2 >= 0.8 && g0 < 0.1 {
        findings.push(Finding::warning(
            "Gen2 dominant",
            format!(
                "Gen2 holds {:.0}% of the heap while Gen0 holds {:.0}%",
                g2 * 100.0,
                g0 * 100.0
            ),
            "Most of the heap survived two collections, which usually means unbounded \
             caches or event-handler leaks. Review the histogram's long-lived types.",
        ));
    }
    if pinned >= 0.10 {
        findings.push(Finding::warning(
            "High pinned object pressure",
            format!("Pinned segments hold {:.0}% of the heap", pinned * 100.0),
            "Pinned buffers fragment the heap and defeat compaction. Prefer the pinned \
             object heap or pooled buffers for interop and socket I/O.",
        ));
    }
    if !gc.is_server_gc && context.cpu_count >= 4 {
        findings.push(Finding::info(
            "Workstation GC on multi-core host",
            format!(
                "Workstation GC is active on a host with {} logical CPUs",
                context.cpu_count
            ),
            "Server GC usually lowers pause times for multi-core server workloads; \
             set <ServerGarbageCollection> and re-measure.",
        ));
    }
}

pub(super) fn blocking_signals(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    let blocking = &snapshot.blocking;
    let locks_held = snapshot
        .threads
        .iter()
        .filter(|t| t.lock_count > 0)
        .count();

    if blocking.sync_block_count > 0 {
        let severity = if blocking.sync_block_count > 10 || blocking.waiting_thread_count > 5 {
            Severity::Critical
        } else {
            Severity::Warning
        };
        findings.push(Finding::new(
            severity,
            "Synchronization contention",
            format!(
                "{} active sync block(s), {} thread(s) waiting on monitors, {} captured thread(s) holding locks",
                blocking.sync_block_count, blocking.waiting_thread_count, locks_held
            ),
            "Correlate the deadlock candidates with the waiting stacks. Shrink lock scopes \
             or replace hot monitors with lock-free or reader-writer structures.",
        ));
    } else if locks_held > 0 {
        findings.push(Finding::warning(
            "Locks held by managed threads",
            format!("{locks_held} captured thread(s) hold at least one monitor"),
            "No waiters were observed, but held locks at dump time are worth a look if \
             the process was stalling; check what those threads were doing.",
        ));
    }
}

pub(super) fn cpu_signals(
    snapshot: &Snapshot,
    context: &AnalysisContext,
    findings: &mut Vec<Finding>,
) {
    let running = snapshot
        .threads
        .iter()
        .filter(|t| t.state_contains("Running"))
        .count();
    if running > context.cpu_count * 4 {
        findings.push(Finding::warning(
            "High CPU suspicion",
            format!(
                "{} runnable thread(s) against {} logical CPUs",
                running, context.cpu_count
            ),
            "Far more runnable threads than cores points at spinning or oversubscription. \
             Sample CPU time per thread and look for tight retry loops.",
        ));
    }

    let gc_threads = snapshot.threads.iter().filter(|t| t.is_gc).count();
    if gc_threads > (context.cpu_count / 2).max(2) {
        findings.push(Finding::warning(
            "GC threads elevated",
            format!(
                "{} GC thread(s) captured against {} logical CPUs",
                gc_threads, context.cpu_count
            ),
            "An outsized GC thread population suggests the collector is struggling to \
             keep up; check allocation rate and the memory findings above.",
        ));
    }
}
