// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The heuristic reasoner: a pure transform from snapshot to ranked findings.
//!
//! Rule groups run in a fixed order and each appends zero or more findings.
//! Every group computes its counts from the snapshot alone; no rule observes
//! another rule's output, so two runs over the same snapshot always produce
//! the same sequence.

mod inventory_rules;
mod process_rules;
#[cfg(test)]
mod test_support;
mod workload_rules;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::error::TriageError;
use crate::snapshot::{CancelToken, Snapshot};

/// How urgent a finding is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        };
        f.write_str(text)
    }
}

/// One diagnostic conclusion with its supporting evidence and a suggested
/// next step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Finding {
    pub title: String,
    pub severity: Severity,
    /// Multiline; each line is one observed fact.
    pub evidence: String,
    pub recommendation: String,
}

impl Finding {
    pub fn critical(
        title: impl Into<String>,
        evidence: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Critical, title, evidence, recommendation)
    }

    pub fn warning(
        title: impl Into<String>,
        evidence: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Warning, title, evidence, recommendation)
    }

    pub fn info(
        title: impl Into<String>,
        evidence: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self::new(Severity::Info, title, evidence, recommendation)
    }

    pub fn new(
        severity: Severity,
        title: impl Into<String>,
        evidence: impl Into<String>,
        recommendation: impl Into<String>,
    ) -> Self {
        Self {
            title: title.into(),
            severity,
            evidence: evidence.into(),
            recommendation: recommendation.into(),
        }
    }
}

/// Host facts the rules need beyond the snapshot itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnalysisContext {
    /// Logical CPU count of the analysis host, standing in for the original
    /// machine when the dump does not record one.
    pub cpu_count: usize,
}

impl AnalysisContext {
    pub fn detect() -> Self {
        Self {
            cpu_count: num_cpus::get(),
        }
    }
}

impl Default for AnalysisContext {
    fn default() -> Self {
        Self::detect()
    }
}

type RuleGroup = fn(&Snapshot, &AnalysisContext, &mut Vec<Finding>);

/// The fixed invocation order. Finding order in the output is exactly this
/// order; changing it is a behavioral change, not a refactor.
const RULE_GROUPS: [RuleGroup; 16] = [
    |s, _, f| process_rules::crash_signals(s, f),
    |s, _, f| process_rules::memory_signals(s, f),
    process_rules::gc_nuance_signals,
    |s, _, f| process_rules::blocking_signals(s, f),
    process_rules::cpu_signals,
    |s, _, f| workload_rules::string_signals(s, f),
    |s, _, f| workload_rules::finalizer_signals(s, f),
    workload_rules::threadpool_signals,
    |s, _, f| workload_rules::wait_classification_signals(s, f),
    |s, _, f| workload_rules::non_monitor_blocking_signals(s, f),
    |s, _, f| inventory_rules::heap_leak_signals(s, f),
    |s, _, f| inventory_rules::module_anomalies(s, f),
    |s, _, f| inventory_rules::coverage_signals(s, f),
    |s, _, f| inventory_rules::native_signals(s, f),
    |s, _, f| inventory_rules::data_availability_signals(s, f),
    |s, _, f| inventory_rules::deadlock_signals(s, f),
];

/// Runs the full rule set with a detected host context.
pub fn analyze(snapshot: &Snapshot) -> Vec<Finding> {
    analyze_with(snapshot, &AnalysisContext::detect())
}

/// Runs the full rule set. Pure: the output depends only on the arguments.
pub fn analyze_with(snapshot: &Snapshot, context: &AnalysisContext) -> Vec<Finding> {
    let mut findings: Vec<Finding> = Vec::new();
    for group in RULE_GROUPS {
        group(snapshot, context, &mut findings);
    }
    finish(findings)
}

/// [`analyze_with`] with a cancellation handle, checked between rule groups.
/// A cancelled run never returns a partial finding list.
pub fn analyze_cancellable(
    snapshot: &Snapshot,
    context: &AnalysisContext,
    cancel: &CancelToken,
) -> Result<Vec<Finding>, TriageError> {
    let mut findings: Vec<Finding> = Vec::new();
    for group in RULE_GROUPS {
        if cancel.is_cancelled() {
            return Err(TriageError::Cancelled);
        }
        group(snapshot, context, &mut findings);
    }
    Ok(finish(findings))
}

fn finish(mut findings: Vec<Finding>) -> Vec<Finding> {
    if findings.is_empty() {
        findings.push(Finding::info(
            "No critical signals detected",
            "No crash, memory, blocking, threading, or data-quality signal crossed its alerting threshold.",
            "Nothing to act on from this dump. If the process still misbehaves, capture a second dump under load and compare.",
        ));
    }
    findings
}
