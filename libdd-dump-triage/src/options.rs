// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use serde::{Deserialize, Serialize};

/// Upper bound on notable-string aggregates across the stack-root and heap
/// walks combined. Requests above this clamp and record a warning.
pub const STRING_CAPTURE_HARD_CAP: usize = 2000;

/// Upper bound on characters retained per captured string.
pub const STRING_LENGTH_HARD_CAP: usize = 32_768;

/// Resource bounds for a snapshot build. Every knob is independent; zero
/// disables the corresponding capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildOptions {
    /// Cap on distinct string aggregates captured from stack roots.
    pub max_strings_to_capture: usize,
    /// Characters kept per string before head+tail truncation applies.
    pub max_string_length: usize,
    /// Cap on *additional* string aggregates captured from the heap walk.
    pub heap_string_limit: usize,
    /// Number of top heap types to surface; zero disables the heap walk.
    pub heap_histogram_count: usize,
    /// Per-thread stack frame cap.
    pub max_stack_frames: usize,
    /// Display cap for threads carrying stacks. Capture keeps at least ten
    /// threads regardless, to preserve context around the interesting ones.
    pub top_stack_threads: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            max_strings_to_capture: 200,
            max_string_length: 65_536,
            heap_string_limit: 200,
            heap_histogram_count: 20,
            max_stack_frames: 30,
            top_stack_threads: 5,
        }
    }
}

impl BuildOptions {
    /// Stack-root capture limit after the global hard cap.
    pub fn capture_limit(&self) -> usize {
        self.max_strings_to_capture.min(STRING_CAPTURE_HARD_CAP)
    }

    /// Per-string length limit after the global hard cap.
    pub fn effective_max_length(&self) -> usize {
        self.max_string_length.min(STRING_LENGTH_HARD_CAP)
    }

    /// Number of threads whose stacks are actually captured.
    pub fn kept_thread_count(&self) -> usize {
        self.top_stack_threads.max(10)
    }
}
