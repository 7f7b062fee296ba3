// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thread scoring and selection.
//!
//! A dump can carry thousands of threads; only a bounded set keeps its
//! stack. Threads are ranked by how diagnostic they look (exceptions first,
//! then runnable and blocked threads, finalizer/GC threads, lock holders),
//! and a small forced set guarantees the interesting categories survive the
//! cut even when the score ordering alone would drop them.

use std::cmp::Reverse;
use std::collections::BTreeMap;

use crate::snapshot::{DataWarning, WarningCategory};
use crate::text::contains_ignore_case;

/// Owned thread facts gathered up front so selection never re-enters the
/// inspector.
#[derive(Debug, Clone)]
pub(crate) struct ThreadCandidate {
    /// Position in the alive-thread handle list, for the later stack read.
    pub handle_index: usize,
    pub managed_id: i32,
    pub address: u64,
    pub state: String,
    pub lock_count: u32,
    pub exception: Option<String>,
    pub is_finalizer: bool,
    pub is_gc: bool,
    pub cpu_time_ms: Option<f64>,
}

impl ThreadCandidate {
    fn is_running(&self) -> bool {
        contains_ignore_case(&self.state, "Running")
    }

    fn is_parked(&self) -> bool {
        contains_ignore_case(&self.state, "Wait") || contains_ignore_case(&self.state, "Sleep")
    }
}

pub(crate) fn score(candidate: &ThreadCandidate) -> i64 {
    let mut score = 0i64;
    if candidate.exception.is_some() {
        score += 1000;
    }
    if candidate.is_running() {
        score += 200;
    }
    if candidate.is_parked() {
        score += 120;
    }
    if candidate.is_finalizer {
        score += 80;
    }
    if candidate.is_gc {
        score += 40;
    }
    score += (i64::from(candidate.lock_count) * 5).min(200);
    score
}

#[derive(Debug)]
pub(crate) struct ThreadSelection {
    /// Final comparator order; at most the keep budget.
    pub kept: Vec<ThreadCandidate>,
    pub dropped: Vec<ThreadCandidate>,
}

/// Orders candidates, pins the forced set, and splits at the keep budget.
pub(crate) fn select_threads(mut candidates: Vec<ThreadCandidate>, keep: usize) -> ThreadSelection {
    candidates.sort_by_key(|c| (Reverse(score(c)), Reverse(c.lock_count), Reverse(c.managed_id)));

    // Forced set: the first excepting thread, plus up to five runnable and
    // five parked threads, all taken in score order. A thread consumes only
    // the first slot it qualifies for.
    let mut forced: Vec<i32> = Vec::new();
    let mut exception_taken = false;
    let mut running_taken = 0usize;
    let mut parked_taken = 0usize;
    for c in &candidates {
        let force = if !exception_taken && c.exception.is_some() {
            exception_taken = true;
            true
        } else if running_taken < 5 && c.is_running() {
            running_taken += 1;
            true
        } else if parked_taken < 5 && c.is_parked() {
            parked_taken += 1;
            true
        } else {
            false
        };
        if force {
            forced.push(c.managed_id);
        }
    }

    candidates.sort_by_key(|c| {
        (
            Reverse(forced.contains(&c.managed_id)),
            Reverse(score(c)),
            Reverse(c.lock_count),
            Reverse(c.managed_id),
        )
    });

    let dropped = if candidates.len() > keep {
        candidates.split_off(keep)
    } else {
        Vec::new()
    };
    ThreadSelection {
        kept: candidates,
        dropped,
    }
}

/// Describes what the keep budget cut: up to twenty dropped ids plus a
/// per-state histogram, states sorted alphabetically.
pub(crate) fn truncation_warning(
    dropped: &[ThreadCandidate],
    alive: usize,
    kept: usize,
) -> DataWarning {
    let mut ids: Vec<String> = dropped
        .iter()
        .take(20)
        .map(|c| c.managed_id.to_string())
        .collect();
    if dropped.len() > 20 {
        ids.push(format!("(+{} more)", dropped.len() - 20));
    }

    let mut states: BTreeMap<&str, usize> = BTreeMap::new();
    for c in dropped {
        *states.entry(c.state.as_str()).or_default() += 1;
    }
    let histogram: Vec<String> = states
        .iter()
        .map(|(state, count)| format!("{state}={count}"))
        .collect();

    DataWarning::new(
        WarningCategory::ThreadTruncation,
        format!(
            "Captured stacks for {kept} of {alive} alive threads; dropped ids: {}; dropped states: {}",
            ids.join(", "),
            histogram.join(", ")
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(id: i32, state: &str) -> ThreadCandidate {
        ThreadCandidate {
            handle_index: id as usize,
            managed_id: id,
            address: 0x1000 + id as u64,
            state: state.to_string(),
            lock_count: 0,
            exception: None,
            is_finalizer: false,
            is_gc: false,
            cpu_time_ms: None,
        }
    }

    #[test]
    fn score_components_add_up() {
        let mut c = candidate(1, "Running");
        assert_eq!(score(&c), 200);

        c.exception = Some("System.Exception: boom".into());
        assert_eq!(score(&c), 1200);

        c.state = "WaitSleepJoin".into();
        assert_eq!(score(&c), 1120);

        c.is_finalizer = true;
        c.is_gc = true;
        assert_eq!(score(&c), 1240);

        c.lock_count = 7;
        assert_eq!(score(&c), 1275);

        c.lock_count = 100;
        // Lock contribution caps at 200.
        assert_eq!(score(&c), 1440);
    }

    #[test]
    fn excepting_thread_is_forced_in_despite_low_score() {
        let mut candidates: Vec<ThreadCandidate> = (0..30)
            .map(|i| {
                let mut c = candidate(i, "Running");
                c.lock_count = 10;
                c
            })
            .collect();
        let mut sick = candidate(99, "Background");
        sick.exception = Some("System.AccessViolationException".into());
        candidates.push(sick);

        let selection = select_threads(candidates, 10);
        assert_eq!(selection.kept.len(), 10);
        assert_eq!(selection.kept[0].managed_id, 99);
    }

    #[test]
    fn forced_running_and_parked_quotas_are_five_each() {
        let mut candidates = Vec::new();
        for i in 0..8 {
            candidates.push(candidate(i, "Running"));
        }
        for i in 8..16 {
            candidates.push(candidate(i, "WaitSleepJoin"));
        }
        // High-lock background threads outscore parked threads.
        for i in 16..40 {
            let mut c = candidate(i, "Background");
            c.lock_count = 50;
            candidates.push(c);
        }

        let selection = select_threads(candidates, 12);
        let kept_ids: Vec<i32> = selection.kept.iter().map(|c| c.managed_id).collect();
        // 5 forced running + 5 forced parked occupy the front in score order.
        let running_kept = kept_ids.iter().filter(|id| **id < 8).count();
        let parked_kept = kept_ids.iter().filter(|id| (8..16).contains(*id)).count();
        assert_eq!(running_kept, 5);
        assert_eq!(parked_kept, 5);
        assert_eq!(selection.kept.len(), 12);
    }

    #[test]
    fn final_order_is_deterministic() {
        let make = || {
            vec![
                candidate(3, "Running"),
                candidate(1, "Running"),
                candidate(2, "WaitSleepJoin"),
            ]
        };
        let a = select_threads(make(), 10);
        let b = select_threads(make(), 10);
        let ids = |s: &ThreadSelection| s.kept.iter().map(|c| c.managed_id).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
        // Equal scores break ties on managed id, descending.
        assert_eq!(ids(&a), vec![3, 1, 2]);
    }

    #[test]
    fn truncation_warning_lists_ids_and_state_histogram() {
        let dropped: Vec<ThreadCandidate> = (0..25)
            .map(|i| candidate(i, if i % 2 == 0 { "Background" } else { "Unstarted" }))
            .collect();
        let warning = truncation_warning(&dropped, 35, 10);
        assert_eq!(warning.category, WarningCategory::ThreadTruncation);
        assert!(warning.message.contains("10 of 35"));
        assert!(warning.message.contains("(+5 more)"));
        // Alphabetical: Background before Unstarted.
        let b = warning.message.find("Background=13").unwrap();
        let u = warning.message.find("Unstarted=12").unwrap();
        assert!(b < u);
    }
}
