// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Workload-shape signals: string churn, finalization, thread-pool health,
//! and what blocked threads were actually waiting on.

use std::collections::BTreeMap;

use crate::analysis::{AnalysisContext, Finding};
use crate::snapshot::Snapshot;
use crate::text::{contains_ignore_case, truncate_middle};

const HTTP_WAIT_MARKERS: [&str; 3] = ["HttpClient", "System.Net.Http", "HttpConnection"];
const SQL_WAIT_MARKERS: [&str; 3] = [
    "SqlClient",
    "Microsoft.Data.SqlClient",
    "System.Data.SqlClient",
];
const TASK_WAIT_MARKERS: [&str; 3] = ["Task.Wait", "Task`1.GetResult", "GetAwaiter().GetResult"];

pub(super) fn string_signals(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    let total = snapshot.total_string_occurrences;
    if total == 0 {
        return;
    }

    let duplication = 1.0 - snapshot.unique_string_count as f64 / total as f64;
    if duplication >= 0.75 && total >= 20 {
        let example = snapshot
            .strings
            .iter()
            .max_by_key(|s| s.occurrences)
            .map(|s| format!("{}x \"{}\"", s.occurrences, truncate_middle(&s.text, 80)))
            .unwrap_or_default();
        findings.push(Finding::warning(
            "High duplicate string frequency",
            format!(
                "{} occurrence(s) collapse into {} unique value(s) ({:.0}% duplication)\nMost repeated: {}",
                total,
                snapshot.unique_string_count,
                duplication * 100.0,
                example
            ),
            "Heavy duplication wastes heap and hints at per-request re-construction of \
             identical values. Intern or cache them (connection strings and SQL text are \
             the usual offenders).",
        ));
    }

    if snapshot.stack_string_occurrences > 2 * snapshot.heap_string_occurrences
        && snapshot.stack_string_occurrences >= 20
    {
        findings.push(Finding::info(
            "Strings concentrated on stacks",
            format!(
                "{} stack-rooted occurrence(s) vs {} heap occurrence(s)",
                snapshot.stack_string_occurrences, snapshot.heap_string_occurrences
            ),
            "Stack-rooted strings are in active use by running code; skim the notable \
             string list for payloads that explain what threads were processing.",
        ));
    }
}

pub(super) fn finalizer_signals(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    let blocked: Vec<String> = snapshot
        .threads
        .iter()
        .filter(|t| t.is_finalizer && (t.state_contains("Wait") || t.state_contains("Block")))
        .map(|t| format!("Thread {} in state {}", t.managed_id, t.state))
        .collect();
    if !blocked.is_empty() {
        findings.push(Finding::critical(
            "Finalizer thread may be blocked",
            blocked.join("\n"),
            "A stuck finalizer stops every finalizable object from being reclaimed and \
             eventually exhausts memory. Inspect the finalizer stack for a lock or I/O \
             call inside a finalizer.",
        ));
    }

    let finalize_frames = snapshot
        .threads
        .iter()
        .flat_map(|t| t.stack_frames.iter())
        .filter(|f| contains_ignore_case(f, "Finalize"))
        .count();
    if finalize_frames > 50 {
        findings.push(Finding::warning(
            "Heavy finalization activity",
            format!("{finalize_frames} captured frame(s) reference finalization"),
            "Finalization at this volume usually means missing Dispose calls; prefer \
             deterministic disposal so objects never reach the finalizer queue.",
        ));
    }
}

pub(super) fn threadpool_signals(
    snapshot: &Snapshot,
    context: &AnalysisContext,
    findings: &mut Vec<Finding>,
) {
    let running = snapshot
        .threads
        .iter()
        .filter(|t| t.state_contains("Running"))
        .count();
    let waiting = snapshot
        .threads
        .iter()
        .filter(|t| t.state_contains("Wait") || t.state_contains("Sleep"))
        .count();

    if running <= (context.cpu_count / 2).max(1) && waiting > 4 * running && waiting >= 8 {
        findings.push(Finding::warning(
            "ThreadPool starvation or queue backlog",
            format!("{running} runnable thread(s) while {waiting} are parked"),
            "Almost everything is waiting while little runs: classic pool starvation. \
             Look for blocking calls on pool threads (see the wait classifications) and \
             make the hot paths truly asynchronous.",
        ));
    }

    let gate_frames = snapshot
        .threads
        .iter()
        .flat_map(|t| t.stack_frames.iter().take(5))
        .filter(|f| {
            contains_ignore_case(f, "ThreadPoolWorkQueue")
                || contains_ignore_case(f, "PortableThreadPool")
        })
        .count();
    if gate_frames >= 5 {
        findings.push(Finding::warning(
            "ThreadPool gate congestion",
            format!("{gate_frames} top-of-stack frame(s) sit in thread-pool dispatch"),
            "Many threads parked at the pool gate means work items outpace workers. \
             Check queue lengths and whether long-running work hogs pool threads.",
        ));
    }
}

pub(super) fn wait_classification_signals(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    let http = threads_with_any_marker(snapshot, &HTTP_WAIT_MARKERS);
    if http >= 3 {
        findings.push(Finding::info(
            "HTTP I/O waits observed",
            format!("{http} thread(s) show outbound HTTP frames"),
            "Threads were awaiting HTTP responses at dump time; if the process stalls, \
             check downstream service latency and HttpClient timeout configuration.",
        ));
    }

    let sql = threads_with_any_marker(snapshot, &SQL_WAIT_MARKERS);
    if sql >= 3 {
        findings.push(Finding::info(
            "SQL I/O waits observed",
            format!("{sql} thread(s) show SQL client frames"),
            "Threads were inside the SQL client; slow queries or pool exhaustion on the \
             database side often masquerade as application hangs.",
        ));
    }

    let task_waits = threads_with_any_marker(snapshot, &TASK_WAIT_MARKERS);
    if task_waits >= 3 {
        findings.push(Finding::warning(
            "Sync-over-async / Task waits detected",
            format!("{task_waits} thread(s) block on Task results"),
            "Synchronous waits on tasks burn pool threads and invite deadlocks under \
             load. Propagate async/await end to end instead of calling .Wait() or \
             .GetAwaiter().GetResult().",
        ));
    }
}

fn threads_with_any_marker(snapshot: &Snapshot, markers: &[&str]) -> usize {
    snapshot
        .threads
        .iter()
        .filter(|t| {
            t.stack_frames
                .iter()
                .any(|f| markers.iter().any(|m| contains_ignore_case(f, m)))
        })
        .count()
}

/// Groups parked threads by their first non-empty frame, excluding monitor
/// waits (those are covered by the blocking rules), and surfaces the
/// hottest parking spots.
pub(super) fn non_monitor_blocking_signals(snapshot: &Snapshot, findings: &mut Vec<Finding>) {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for thread in &snapshot.threads {
        if !(thread.state_contains("Wait")
            || thread.state_contains("Sleep")
            || thread.state_contains("Block"))
        {
            continue;
        }
        let Some(frame) = thread.stack_frames.iter().find(|f| !f.trim().is_empty()) else {
            continue;
        };
        if contains_ignore_case(frame, "Monitor") {
            continue;
        }
        *counts.entry(frame.as_str()).or_default() += 1;
    }

    let mut hot: Vec<(&str, usize)> = counts.into_iter().filter(|(_, c)| *c >= 5).collect();
    hot.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    hot.truncate(3);
    if hot.is_empty() {
        return;
    }

    let evidence: Vec<String> = hot
        .iter()
        .map(|(frame, count)| format!("{count} thread(s) parked in {frame}"))
        .collect();
    findings.push(Finding::warning(
        "Non-monitor blocking hotspot",
        evidence.join("\n"),
        "Clusters of threads parked on the same non-monitor primitive (events, \
         semaphores, sleeps) point at a shared gate; find who owns it and why it \
         never opens.",
    ));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::test_support::{snapshot, thread, thread_with_frames};
    use crate::analysis::Severity;

    fn ctx(cpu_count: usize) -> AnalysisContext {
        AnalysisContext { cpu_count }
    }

    #[test]
    fn duplication_needs_both_ratio_and_volume() {
        let mut snap = snapshot();
        snap.unique_string_count = 1;
        snap.total_string_occurrences = 10;
        let mut findings = vec![];
        string_signals(&snap, &mut findings);
        // 90% duplication but below the 20-occurrence floor.
        assert!(findings.iter().all(|f| f.title != "High duplicate string frequency"));

        snap.total_string_occurrences = 40;
        snap.stack_string_occurrences = 40;
        findings.clear();
        string_signals(&snap, &mut findings);
        assert!(findings
            .iter()
            .any(|f| f.title == "High duplicate string frequency"));
        // 40 stack vs 0 heap also trips the concentration info.
        assert!(findings
            .iter()
            .any(|f| f.title == "Strings concentrated on stacks"));
    }

    #[test]
    fn no_strings_no_findings() {
        let snap = snapshot();
        let mut findings = vec![];
        string_signals(&snap, &mut findings);
        assert!(findings.is_empty());
    }

    #[test]
    fn waiting_finalizer_is_critical() {
        let mut snap = snapshot();
        let mut fin = thread(2, "WaitSleepJoin");
        fin.is_finalizer = true;
        snap.threads = vec![fin, thread(3, "Running")];
        let mut findings = vec![];
        finalizer_signals(&snap, &mut findings);
        assert_eq!(findings[0].severity, Severity::Critical);
        assert!(findings[0].evidence.contains("Thread 2"));
    }

    #[test]
    fn running_finalizer_is_fine() {
        let mut snap = snapshot();
        let mut fin = thread(2, "Running");
        fin.is_finalizer = true;
        snap.threads = vec![fin];
        let mut findings = vec![];
        finalizer_signals(&snap, &mut findings);
        assert!(findings.is_empty());
    }

    #[test]
    fn heavy_finalization_counts_frames_across_threads() {
        let mut snap = snapshot();
        let frames: Vec<String> = (0..26)
            .map(|i| format!("System.Object.Finalize() [{i}]"))
            .collect();
        let frame_refs: Vec<&str> = frames.iter().map(|s| s.as_str()).collect();
        snap.threads = vec![
            thread_with_frames(1, "Running", &frame_refs),
            thread_with_frames(2, "Running", &frame_refs),
        ];
        let mut findings = vec![];
        finalizer_signals(&snap, &mut findings);
        assert!(findings
            .iter()
            .any(|f| f.title == "Heavy finalization activity"));
    }

    #[test]
    fn starvation_needs_low_running_and_high_waiting() {
        let mut snap = snapshot();
        snap.threads = vec![thread(0, "Running")];
        for i in 1..10 {
            snap.threads.push(thread(i, "WaitSleepJoin"));
        }
        let mut findings = vec![];
        threadpool_signals(&snap, &ctx(4), &mut findings);
        assert_eq!(findings[0].title, "ThreadPool starvation or queue backlog");

        // Plenty of runnable threads clears the signal.
        findings.clear();
        for i in 10..14 {
            snap.threads.push(thread(i, "Running"));
        }
        threadpool_signals(&snap, &ctx(4), &mut findings);
        assert!(findings.is_empty());
    }

    #[test]
    fn gate_congestion_counts_only_top_frames() {
        let mut snap = snapshot();
        // The pool frame sits below the top five and must not count.
        let deep: Vec<&str> = vec![
            "A()", "B()", "C()", "D()", "E()",
            "System.Threading.ThreadPoolWorkQueue.Dispatch()",
        ];
        for i in 0..6 {
            snap.threads.push(thread_with_frames(i, "Running", &deep));
        }
        let mut findings = vec![];
        threadpool_signals(&snap, &ctx(64), &mut findings);
        assert!(findings.is_empty());

        let shallow: Vec<&str> = vec!["System.Threading.PortableThreadPool.WorkerThread.WorkerThreadStart()"];
        snap.threads = (0..5)
            .map(|i| thread_with_frames(i, "Running", &shallow))
            .collect();
        threadpool_signals(&snap, &ctx(64), &mut findings);
        assert_eq!(findings[0].title, "ThreadPool gate congestion");
    }

    #[test]
    fn wait_classes_need_three_threads_each() {
        let mut snap = snapshot();
        snap.threads = vec![
            thread_with_frames(1, "Wait", &["System.Net.Http.HttpConnection.SendAsync()"]),
            thread_with_frames(2, "Wait", &["MyApp.Api.HttpClientHelper.Get()"]),
        ];
        let mut findings = vec![];
        wait_classification_signals(&snap, &mut findings);
        assert!(findings.is_empty());

        snap.threads.push(thread_with_frames(
            3,
            "Wait",
            &["System.Net.Http.HttpConnectionPool.RentAsync()"],
        ));
        snap.threads.push(thread_with_frames(
            4,
            "Wait",
            &["Microsoft.Data.SqlClient.SqlCommand.ExecuteReader()"],
        ));
        wait_classification_signals(&snap, &mut findings);
        assert_eq!(findings.len(), 1);
        assert_eq!(findings[0].title, "HTTP I/O waits observed");
    }

    #[test]
    fn monitor_frames_are_excluded_from_hotspots() {
        let mut snap = snapshot();
        for i in 0..6 {
            snap.threads.push(thread_with_frames(
                i,
                "WaitSleepJoin",
                &["System.Threading.Monitor.Wait(Object)"],
            ));
        }
        for i in 6..12 {
            snap.threads.push(thread_with_frames(
                i,
                "WaitSleepJoin",
                &["System.Threading.SemaphoreSlim.Wait()"],
            ));
        }
        let mut findings = vec![];
        non_monitor_blocking_signals(&snap, &mut findings);
        assert_eq!(findings.len(), 1);
        assert!(findings[0].evidence.contains("SemaphoreSlim"));
        assert!(!findings[0].evidence.contains("Monitor.Wait"));
    }

    #[test]
    fn hotspots_surface_the_top_three_by_count() {
        let mut snap = snapshot();
        let gates = [
            ("Gate.A()", 9),
            ("Gate.B()", 7),
            ("Gate.C()", 6),
            ("Gate.D()", 5),
        ];
        let mut id = 0;
        for (frame, count) in gates {
            for _ in 0..count {
                snap.threads
                    .push(thread_with_frames(id, "Wait", &[frame]));
                id += 1;
            }
        }
        let mut findings = vec![];
        non_monitor_blocking_signals(&snap, &mut findings);
        let evidence = &findings[0].evidence;
        assert!(evidence.contains("Gate.A()"));
        assert!(evidence.contains("Gate.C()"));
        assert!(!evidence.contains("Gate.D()"));
    }
}
