// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Report surfaces: the `{snapshot, findings}` JSON document and a plain
//! text rendering for terminals. Richer front-ends (PDF, GUI) consume the
//! same pair through their own layers.

use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::analysis::Finding;
use crate::snapshot::Snapshot;
use crate::text::format_bytes;

/// The serialized report: the snapshot verbatim plus the ranked findings.
#[derive(Debug, Serialize)]
pub struct TriageReport<'a> {
    pub snapshot: &'a Snapshot,
    pub findings: &'a [Finding],
}

/// Writes the pretty-printed JSON report to `path`.
pub fn write_json_report(
    path: &Path,
    snapshot: &Snapshot,
    findings: &[Finding],
) -> anyhow::Result<()> {
    let file =
        File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, &TriageReport { snapshot, findings })
        .with_context(|| format!("Failed to serialize report to {}", path.display()))?;
    Ok(())
}

/// Renders a terminal-friendly summary: dump header, findings with evidence,
/// then the data warnings.
pub fn render_text_report(snapshot: &Snapshot, findings: &[Finding]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Dump:     {}", snapshot.dump_path);
    let _ = writeln!(out, "Runtime:  {}", snapshot.runtime_description);
    let _ = writeln!(
        out,
        "Threads:  {} alive, {} captured with stacks",
        snapshot.total_thread_count,
        snapshot.threads.len()
    );
    let _ = writeln!(
        out,
        "GC heap:  {} across {} segment(s), {} GC",
        format_bytes(snapshot.gc.total_heap_bytes),
        snapshot.gc.segment_count,
        if snapshot.gc.is_server_gc {
            "server"
        } else {
            "workstation"
        }
    );
    let _ = writeln!(
        out,
        "Modules:  {} loaded, {}",
        snapshot.total_module_count,
        format_bytes(snapshot.total_module_bytes)
    );

    let _ = writeln!(out, "\nFindings ({}):", findings.len());
    for finding in findings {
        let _ = writeln!(out, "\n[{}] {}", finding.severity, finding.title);
        for line in finding.evidence.lines() {
            let _ = writeln!(out, "    {line}");
        }
        let _ = writeln!(out, "    => {}", finding.recommendation);
    }

    if !snapshot.warnings.is_empty() {
        let _ = writeln!(out, "\nData warnings ({}):", snapshot.warnings.len());
        for warning in &snapshot.warnings {
            let _ = writeln!(out, "  [{:?}] {}", warning.category, warning.message);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Severity;
    use crate::snapshot::{DataWarning, WarningCategory};
    use tempfile::tempdir;

    fn sample_snapshot() -> Snapshot {
        let mut snapshot: Snapshot =
            serde_json::from_value(serde_json::json!({
                "dump_path": "/dumps/w3wp.dmp",
                "runtime_description": ".NET Core 8.0.11",
                "total_thread_count": 12,
                "threads": [],
                "gc": {
                    "total_heap_bytes": 104857600u64,
                    "large_object_heap_bytes": 0,
                    "segment_count": 3,
                    "is_server_gc": true,
                    "gen0_bytes": 41943040u64,
                    "gen1_bytes": 31457280u64,
                    "gen2_bytes": 31457280u64,
                    "pinned_bytes": 0
                },
                "blocking": { "sync_block_count": 0, "waiting_thread_count": 0 },
                "strings": [],
                "deadlocks": [],
                "heap_histogram": [],
                "modules": [],
                "total_heap_type_count": 0,
                "total_module_count": 0,
                "total_module_bytes": 0,
                "module_coverage_shown": 1.0,
                "unique_string_count": 0,
                "total_string_occurrences": 0,
                "stack_string_occurrences": 0,
                "heap_string_occurrences": 0,
                "total_heap_object_count": 0,
                "heap_histogram_coverage": 0.0,
                "warnings": []
            }))
            .unwrap();
        snapshot
            .warnings
            .push(DataWarning::new(WarningCategory::ModuleClamp, "25 modules"));
        snapshot
    }

    #[test]
    fn json_report_carries_every_snapshot_field() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("report.json");
        let snapshot = sample_snapshot();
        let findings = vec![Finding::info("No critical signals detected", "-", "-")];

        write_json_report(&path, &snapshot, &findings).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let snap = &value["snapshot"];
        for field in [
            "dump_path",
            "runtime_description",
            "total_thread_count",
            "threads",
            "gc",
            "blocking",
            "strings",
            "deadlocks",
            "heap_histogram",
            "modules",
            "total_heap_type_count",
            "total_module_count",
            "total_module_bytes",
            "module_coverage_shown",
            "unique_string_count",
            "total_string_occurrences",
            "stack_string_occurrences",
            "heap_string_occurrences",
            "total_heap_object_count",
            "heap_histogram_coverage",
            "warnings",
        ] {
            assert!(!snap[field].is_null(), "missing snapshot field {field}");
        }
        assert_eq!(value["findings"][0]["severity"], "Info");
    }

    #[test]
    fn text_report_shows_findings_and_warnings() {
        let snapshot = sample_snapshot();
        let findings = vec![
            Finding::new(
                Severity::Critical,
                "Application crash or unhandled exception",
                "Thread 1: System.NullReferenceException: boom",
                "Fix it.",
            ),
            Finding::info("No critical signals detected", "-", "-"),
        ];
        let text = render_text_report(&snapshot, &findings);

        assert!(text.contains("Dump:     /dumps/w3wp.dmp"));
        assert!(text.contains("[CRITICAL] Application crash or unhandled exception"));
        assert!(text.contains("    Thread 1: System.NullReferenceException: boom"));
        assert!(text.contains("100.0 MiB"));
        assert!(text.contains("[ModuleClamp] 25 modules"));
    }
}
