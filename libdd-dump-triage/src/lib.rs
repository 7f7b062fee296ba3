// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Offline triage of managed-runtime process dumps.
//!
//! Two cores cooperate here. The snapshot builder walks an opened dump
//! through the [`inspector`] capability traits and extracts a bounded,
//! deterministic [`snapshot::Snapshot`]: threads with stacks, GC heap
//! accounting, sync blocks, notable strings, heap histogram, and modules,
//! with every truncation or partial read recorded as a data warning. The
//! [`analysis`] reasoner then turns a snapshot into ranked findings with
//! evidence and remediation text.
//!
//! The crate performs no network or live-process access: a dump file goes
//! in, an in-memory report comes out. Dump readers, interactive front-ends,
//! and report formatters plug in around this core.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod analysis;
pub mod cli;
pub mod error;
pub mod inspector;
pub mod options;
pub mod report;
pub mod snapshot;
mod text;

pub use analysis::{analyze, analyze_cancellable, analyze_with, AnalysisContext, Finding, Severity};
pub use error::TriageError;
pub use options::{BuildOptions, STRING_CAPTURE_HARD_CAP, STRING_LENGTH_HARD_CAP};
pub use snapshot::{build_snapshot, build_snapshot_with, CancelToken, Snapshot};
