// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Inventory-level signals: heap composition, module anomalies, coverage of
//! the bounded walks, and the data-quality rollup.

use crate::analysis::Finding;
use crate::snapshot::Snapshot;
use crate::text::{contains_ignore_case, format_bytes};

const MIB: u64 = 1024 * 1024;
const SUSPICIOUS_MODULE_MARKERS: [&str; 3] = ["profiler", "instrumentation", "agent"];

pub(super) fn heap_leak_signals(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    let Some(top) = snapshot.heap_histogram.first() else {
        return;
    };
    let total = snapshot.gc.total_heap_bytes;
    if total == 0 {
        return;
    }
    let share = top.total_size as f64 / total as f64;
    if share > 0.5 {
        findings.push(Finding::warning(
            "Dominant heap type detected",
            format!(
                "{} holds {} across {} instance(s) ({:.0}% of the heap)",
                top.type_name,
                format_bytes(top.total_size),
                top.instance_count,
                share * 100.0
            ),
            "One type owning most of the heap is the classic leak shape. Dump the \
             retention paths for a few instances and find the collection that never \
             shrinks.",
        ));
    }
}

pub(super) fn module_anomalies(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    let large: Vec<String> = snapshot
        .modules
        .iter()
        .filter(|m| m.size >= 200 * MIB)
        .take(5)
        .map(|m| format!("{} ({})", m.name, format_bytes(m.size)))
        .collect();
    if !large.is_empty() {
        findings.push(Finding::warning(
            "Unusually large modules loaded",
            large.join("\n"),
            "Modules this size are unusual for managed processes; check for embedded \
             resources, self-contained bundles, or native libraries that belong out of \
             process.",
        ));
    }

    let suspicious: Vec<String> = snapshot
        .modules
        .iter()
        .filter(|m| {
            SUSPICIOUS_MODULE_MARKERS
                .iter()
                .any(|marker| contains_ignore_case(&m.name, marker))
        })
        .map(|m| m.name.clone())
        .collect();
    if !suspicious.is_empty() {
        findings.push(Finding::info(
            "Profiler/instrumentation modules detected",
            suspicious.join("\n"),
            "Profilers and agents rewrite IL and intercept calls; rule them out as a \
             contributing factor by reproducing the issue with instrumentation off.",
        ));
    }
}

pub(super) fn coverage_signals(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    if snapshot.heap_histogram_coverage < 0.5 && !snapshot.heap_histogram.is_empty() {
        findings.push(Finding::info(
            "Heap type coverage limited",
            format!(
                "The surfaced histogram covers {:.0}% of {} heap bytes",
                snapshot.heap_histogram_coverage * 100.0,
                format_bytes(snapshot.gc.total_heap_bytes)
            ),
            "Size-based conclusions below only describe the covered share; raise the \
             histogram budget for a fuller picture.",
        ));
    }
    if snapshot.module_coverage_shown < 0.9 && !snapshot.modules.is_empty() {
        findings.push(Finding::info(
            "Module list truncated",
            format!(
                "The {}-module display covers {:.0}% of {} module bytes",
                snapshot.total_module_count.min(20),
                snapshot.module_coverage_shown * 100.0,
                format_bytes(snapshot.total_module_bytes)
            ),
            "Smaller modules are hidden from the report view; consult the JSON output \
             for the complete list.",
        ));
    }
}

pub(super) fn native_signals(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    if snapshot.total_module_bytes > 1_000_000_000 && snapshot.gc.total_heap_bytes < 512 * MIB {
        findings.push(Finding::info(
            "Native footprint elevated",
            format!(
                "Modules account for {} while the managed heap holds only {}",
                format_bytes(snapshot.total_module_bytes),
                format_bytes(snapshot.gc.total_heap_bytes)
            ),
            "Most of this process's memory is native, so managed-heap tooling will not \
             explain its footprint; profile native allocations and loaded libraries.",
        ));
    }
}

pub(super) fn data_availability_signals(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    if snapshot.warnings.is_empty() {
        return;
    }
    let evidence: Vec<String> = snapshot
        .warnings
        .iter()
        .map(|w| format!("{:?}: {}", w.category, w.message))
        .collect();
    findings.push(Finding::warning(
        "Data availability warning",
        evidence.join("\n"),
        "Parts of the dump were truncated, clamped, or unreadable; treat counts and \
         coverage-based findings as lower bounds.",
    ));
}

pub(super) fn deadlock_signals(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    let contended: Vec<String> = snapshot
        .deadlocks
        .iter()
        .filter(|d| d.waiting_thread_count > 0)
        .map(|d| {
            let owner = d
                .owner_thread_id
                .map(|id| id.to_string())
                .unwrap_or_else(|| "unknown".to_string());
            format!(
                "Object {:#x}: owner thread {}, {} thread(s) waiting",
                d.object_address, owner, d.waiting_thread_count
            )
        })
        .collect();
    if contended.is_empty() {
        return;
    }
    findings.push(Finding::critical(
        "Potential deadlock/monitor contention",
        contended.join("\n"),
        "Cross-reference the owner threads' stacks with what the waiters need. Two \
         owners each waiting on the other's monitor is a hard deadlock; a single hot \
         monitor is contention to be broken up.",
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::snapshot;
    use crate::analysis::Severity;
    use crate::snapshot::{
        DataWarning, DeadlockCandidate, HeapTypeStat, ModuleInfo, WarningCategory,
    };

    #[test]
    fn dominant_type_needs_a_majority_share() {
        let mut snap = snapshot();
        snap.gc.total_heap_bytes = 1000 * MIB;
        snap.heap_histogram = vec![HeapTypeStat {
            type_name: "System.Byte[]".into(),
            total_size: 400 * MIB,
            instance_count: 10_000,
        }];
        let mut findings = vec![];
        heap_leak_signals(&snap, &mut findings);
        assert!(findings.is_empty());

        snap.heap_histogram[0].total_size = 600 * MIB;
        heap_leak_signals(&snap, &mut findings);
        assert_eq!(findings[0].title, "Dominant heap type detected");
        assert!(findings[0].evidence.contains("System.Byte[]"));
    }

    #[test]
    fn large_module_list_caps_at_five_entries() {
        let mut snap = snapshot();
        for i in 0..8 {
            snap.modules.push(ModuleInfo {
                name: format!("blob{i}.dll"),
                size: 300 * MIB,
            });
        }
        let mut findings = vec![];
        module_anomalies(&snap, &mut findings);
        assert_eq!(findings[0].evidence.lines().count(), 5);
    }

    #[test]
    fn instrumentation_markers_match_case_insensitively() {
        let mut snap = snapshot();
        snap.modules = vec![
            ModuleInfo {
                name: "Datadog.Trace.ClrProfiler.Native.dll".into(),
                size: 4 * MIB,
            },
            ModuleInfo {
                name: "MyApp.Core.dll".into(),
                size: 2 * MIB,
            },
        ];
        let mut findings = vec![];
        module_anomalies(&snap, &mut findings);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Info);
        assert!(findings[0].evidence.contains("ClrProfiler"));
    }

    #[test]
    fn coverage_notes_require_nonempty_inventories() {
        let mut snap = snapshot();
        snap.heap_histogram_coverage = 0.2;
        snap.module_coverage_shown = 0.5;
        let mut findings = vec![];
        coverage_signals(&snap, &mut findings);
        // Empty histogram and module list suppress both notes.
        assert!(findings.is_empty());

        snap.heap_histogram = vec![HeapTypeStat {
            type_name: "T".into(),
            total_size: 1,
            instance_count: 1,
        }];
        snap.modules = vec![ModuleInfo {
            name: "a.dll".into(),
            size: 1,
        }];
        coverage_signals(&snap, &mut findings);
        assert_eq!(findings.len(), 2);
    }

    #[test]
    fn native_footprint_requires_small_managed_heap() {
        let mut snap = snapshot();
        snap.total_module_bytes = 1_500_000_000;
        snap.gc.total_heap_bytes = 600 * MIB;
        let mut findings = vec![];
        native_signals(&snap, &mut findings);
        assert!(findings.is_empty());

        snap.gc.total_heap_bytes = 100 * MIB;
        native_signals(&snap, &mut findings);
        assert_eq!(findings[0].title, "Native footprint elevated");
    }

    #[test]
    fn warnings_roll_up_into_one_finding() {
        let mut snap = snapshot();
        snap.warnings = vec![
            DataWarning::new(WarningCategory::ThreadTruncation, "dropped 12 threads"),
            DataWarning::new(WarningCategory::StringClamp, "clamped to 2000"),
        ];
        let mut findings = vec![];
        data_availability_signals(&snap, &mut findings);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].evidence.contains("ThreadTruncation: dropped 12 threads"));
        assert!(findings[0].evidence.contains("StringClamp: clamped to 2000"));
    }

    #[test]
    fn deadlock_evidence_formats_owner_and_address() {
        let mut snap = snapshot();
        snap.deadlocks = vec![
            DeadlockCandidate {
                owner_thread_id: Some(4),
                waiting_thread_count: 3,
                object_address: 0xabc0,
            },
            DeadlockCandidate {
                owner_thread_id: None,
                waiting_thread_count: 1,
                object_address: 0xdef0,
            },
            // Held but nobody waiting: not listed.
            DeadlockCandidate {
                owner_thread_id: Some(9),
                waiting_thread_count: 0,
                object_address: 0x1230,
            },
        ];
        let mut findings = vec![];
        deadlock_signals(&snap, &mut findings);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].severity, Severity::Critical);
        let evidence = &findings[0].evidence;
        assert!(evidence.contains("0xabc0"));
        assert!(evidence.contains("owner thread 4"));
        assert!(evidence.contains("owner thread unknown"));
        assert!(!evidence.contains("0x1230"));
    }
}
