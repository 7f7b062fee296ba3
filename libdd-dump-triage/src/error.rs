// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use thiserror::Error;

/// Failure kinds surfaced at the triage boundary.
///
/// Per-item inspector failures (a frame that will not enumerate, a string
/// that will not read) never appear here; the builder converts those into
/// data warnings or silent skips so a snapshot is always produced from a
/// partially broken dump.
#[derive(Debug, Error)]
pub enum TriageError {
    #[error("No dump path was provided")]
    MissingPath,
    #[error("Dump file not found: {0}")]
    FileNotFound(String),
    #[error("The dump contains no managed runtime")]
    NoManagedRuntime,
    #[error("Snapshot build was cancelled")]
    Cancelled,
    #[error("Dump inspection failed: {0}")]
    Internal(#[from] anyhow::Error),
}
