// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! The snapshot extraction pipeline.
//!
//! Eleven deterministic phases walk the inspector under strict resource
//! bounds. Per-item failures (a frame that will not enumerate, a string that
//! will not read) degrade into data warnings or skips; only path validation,
//! runtime discovery, and cancellation abort the build.

use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::TriageError;
use crate::inspector::{
    DumpInspector, DumpSource, HeapHandle, ObjectHandle, RuntimeHandle, SegmentKind, ThreadHandle,
};
use crate::options::{BuildOptions, STRING_CAPTURE_HARD_CAP, STRING_LENGTH_HARD_CAP};
use crate::snapshot::strings::StringPool;
use crate::snapshot::threads::{self, ThreadCandidate};
use crate::snapshot::{
    BlockingSummary, DataWarning, DeadlockCandidate, GcSnapshot, HeapTypeStat, ModuleInfo,
    Snapshot, ThreadSnapshot, WarningCategory,
};

/// Number of modules the display layer surfaces; the snapshot records all of
/// them, plus the coverage of this cap.
const MODULE_DISPLAY_CAP: usize = 20;

/// Cooperative cancellation handle. Clones share one flag; the builder
/// checks it between phases and never returns a partially built snapshot.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn checkpoint(&self) -> Result<(), TriageError> {
        if self.is_cancelled() {
            Err(TriageError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Builds a snapshot from the dump at `dump_path`.
pub fn build_snapshot(
    source: &dyn DumpSource,
    dump_path: &str,
    options: &BuildOptions,
) -> Result<Snapshot, TriageError> {
    build_snapshot_with(source, dump_path, options, &CancelToken::new())
}

/// [`build_snapshot`] with a cancellation handle.
pub fn build_snapshot_with(
    source: &dyn DumpSource,
    dump_path: &str,
    options: &BuildOptions,
    cancel: &CancelToken,
) -> Result<Snapshot, TriageError> {
    // Phase 1: validate and open.
    if dump_path.trim().is_empty() {
        return Err(TriageError::MissingPath);
    }
    let path = Path::new(dump_path);
    if !path.exists() {
        return Err(TriageError::FileNotFound(dump_path.to_string()));
    }
    let inspector = source.open(path)?;
    let runtimes = inspector.runtimes()?;
    let runtime = runtimes
        .into_iter()
        .next()
        .ok_or(TriageError::NoManagedRuntime)?;
    build_from_runtime(runtime.as_ref(), dump_path, options, cancel)
}

fn build_from_runtime(
    runtime: &dyn RuntimeHandle,
    dump_path: &str,
    options: &BuildOptions,
    cancel: &CancelToken,
) -> Result<Snapshot, TriageError> {
    let mut warnings: Vec<DataWarning> = Vec::new();
    let runtime_description = runtime.banner().describe();

    // Phase 2: seed warnings.
    let heap = runtime.heap();
    let heap_walkable = heap.as_ref().map(|h| h.can_walk()).unwrap_or(false);
    if !heap_walkable {
        warnings.push(DataWarning::new(
            WarningCategory::HeapUnavailable,
            "GC heap is not walkable; heap statistics, heap strings, and stack-root strings are unavailable",
        ));
    }
    cancel.checkpoint()?;

    // Phase 3: thread selection and stack read.
    let alive: Vec<_> = runtime
        .threads()?
        .into_iter()
        .filter(|t| t.is_alive())
        .collect();
    let total_thread_count = alive.len();
    let candidates: Vec<ThreadCandidate> = alive
        .iter()
        .enumerate()
        .map(|(handle_index, t)| ThreadCandidate {
            handle_index,
            managed_id: t.managed_id(),
            address: t.address(),
            state: t.state_text(),
            lock_count: t.lock_count(),
            exception: t.current_exception().map(|e| e.describe()),
            is_finalizer: t.is_finalizer(),
            is_gc: t.is_gc(),
            cpu_time_ms: t.cpu_time_ms(),
        })
        .collect();
    let address_to_id: HashMap<u64, i32> = candidates
        .iter()
        .map(|c| (c.address, c.managed_id))
        .collect();

    let selection = threads::select_threads(candidates, options.kept_thread_count());
    if !selection.dropped.is_empty() {
        warnings.push(threads::truncation_warning(
            &selection.dropped,
            total_thread_count,
            selection.kept.len(),
        ));
    }

    let mut thread_snapshots: Vec<ThreadSnapshot> = Vec::with_capacity(selection.kept.len());
    let mut failed_stack_ids: Vec<i32> = Vec::new();
    for c in &selection.kept {
        let handle = &alive[c.handle_index];
        let mut frames: Vec<String> = Vec::new();
        for frame in handle.stack_frames().take(options.max_stack_frames) {
            match frame {
                Ok(text) => frames.push(text),
                Err(_) => {
                    failed_stack_ids.push(c.managed_id);
                    break;
                }
            }
        }
        let captured_frame_count = frames.len();
        thread_snapshots.push(ThreadSnapshot {
            managed_id: c.managed_id,
            state: c.state.clone(),
            lock_count: c.lock_count,
            current_exception: c.exception.clone(),
            is_finalizer: c.is_finalizer,
            is_gc: c.is_gc,
            stack_frames: frames,
            captured_frame_count,
            requested_frame_count: options.max_stack_frames,
            cpu_time_ms: c.cpu_time_ms,
        });
    }
    if !failed_stack_ids.is_empty() {
        let shown: Vec<String> = failed_stack_ids
            .iter()
            .take(10)
            .map(|id| id.to_string())
            .collect();
        warnings.push(DataWarning::new(
            WarningCategory::StackReadPartial,
            format!(
                "Stack frames could not be fully read for {} thread(s); ids: {}",
                failed_stack_ids.len(),
                shown.join(", ")
            ),
        ));
    }
    debug!(
        alive = total_thread_count,
        kept = thread_snapshots.len(),
        "thread selection complete"
    );
    cancel.checkpoint()?;

    // Phase 4: GC segment accounting.
    let mut gc = GcSnapshot::default();
    if let Some(h) = heap.as_ref() {
        gc.is_server_gc = h.is_server();
        for segment in h.segments() {
            gc.segment_count += 1;
            gc.total_heap_bytes += segment.length;
            match segment.kind {
                SegmentKind::Gen0 => gc.gen0_bytes += segment.length,
                SegmentKind::Gen1 => gc.gen1_bytes += segment.length,
                SegmentKind::Gen2 => gc.gen2_bytes += segment.length,
                SegmentKind::Large => gc.large_object_heap_bytes += segment.length,
                SegmentKind::Pinned => gc.pinned_bytes += segment.length,
            }
        }
    }
    cancel.checkpoint()?;

    // Phase 5: blocking summary.
    let sync_blocks = heap.as_ref().map(|h| h.sync_blocks()).unwrap_or_default();
    let blocking = BlockingSummary {
        sync_block_count: sync_blocks.len(),
        waiting_thread_count: sync_blocks
            .iter()
            .map(|b| u64::from(b.waiting_thread_count))
            .sum(),
    };
    cancel.checkpoint()?;

    // Phase 6: stack-root string extraction.
    let effective_max_length = options.effective_max_length();
    if options.max_strings_to_capture > STRING_CAPTURE_HARD_CAP {
        warnings.push(DataWarning::new(
            WarningCategory::StringClamp,
            format!(
                "Requested {} stack strings; capture is capped at {STRING_CAPTURE_HARD_CAP}",
                options.max_strings_to_capture
            ),
        ));
    }
    if options.max_string_length > STRING_LENGTH_HARD_CAP {
        warnings.push(DataWarning::new(
            WarningCategory::StringClamp,
            format!(
                "Requested string length {}; capture is capped at {STRING_LENGTH_HARD_CAP} characters",
                options.max_string_length
            ),
        ));
    }

    let mut pool = StringPool::new(effective_max_length);
    let mut stack_owners: HashMap<u64, BTreeSet<i32>> = HashMap::new();
    let capture_limit = options.capture_limit();
    if capture_limit > 0 && heap_walkable {
        if let Some(h) = heap.as_ref() {
            'walk: for handle in &alive {
                let thread_id = handle.managed_id();
                for root in handle.stack_roots() {
                    stack_owners.entry(root).or_default().insert(thread_id);
                    if pool.len() >= capture_limit {
                        break 'walk;
                    }
                    let Some(object) = h.object_at(root) else {
                        continue;
                    };
                    if !object.is_valid() || !object.is_string() {
                        continue;
                    }
                    let Ok(value) = object.read_string(effective_max_length + 1) else {
                        continue;
                    };
                    if value.is_empty() {
                        continue;
                    }
                    pool.record_stack(&value, thread_id);
                }
            }
        }
        if pool.stack_deduped() > 0 {
            warnings.push(DataWarning::new(
                WarningCategory::StringDedupe,
                format!(
                    "Deduplicated {} repeated stack-root string value(s)",
                    pool.stack_deduped()
                ),
            ));
        }
    }
    cancel.checkpoint()?;

    // Phase 7: deadlock candidates.
    let deadlocks: Vec<DeadlockCandidate> = sync_blocks
        .iter()
        .filter(|b| b.waiting_thread_count > 0 || b.is_monitor_held)
        .map(|b| DeadlockCandidate {
            owner_thread_id: b
                .holding_thread_address
                .and_then(|addr| address_to_id.get(&addr).copied()),
            waiting_thread_count: b.waiting_thread_count,
            object_address: b.object_address,
        })
        .collect();
    cancel.checkpoint()?;

    // Phase 8: heap histogram and heap strings, fused into one object walk.
    let mut heap_histogram: Vec<HeapTypeStat> = Vec::new();
    let mut total_heap_type_count = 0usize;
    let mut total_heap_object_count = 0u64;
    if heap_walkable {
        let starting_count = pool.len();
        let available = STRING_CAPTURE_HARD_CAP.saturating_sub(starting_count);
        let heap_capture_limit = options.heap_string_limit.min(available);
        if options.heap_string_limit > heap_capture_limit {
            warnings.push(DataWarning::new(
                WarningCategory::HeapStringClamp,
                format!(
                    "Requested {} heap strings; {} capture slot(s) remain under the {STRING_CAPTURE_HARD_CAP} cap",
                    options.heap_string_limit, heap_capture_limit
                ),
            ));
        }

        let do_histogram = options.heap_histogram_count > 0;
        let mut strings_open = heap_capture_limit > 0;
        if do_histogram || strings_open {
            if let Some(h) = heap.as_ref() {
                let mut types: HashMap<String, (u64, u64)> = HashMap::new();
                for object in h.objects() {
                    total_heap_object_count += 1;
                    if strings_open && pool.len() >= starting_count + heap_capture_limit {
                        strings_open = false;
                        if !do_histogram {
                            break;
                        }
                    }
                    if do_histogram {
                        if let Some(name) = object.type_name() {
                            if !name.is_empty() {
                                let entry = types.entry(name).or_default();
                                entry.0 += object.size();
                                entry.1 += 1;
                            }
                        }
                    }
                    if strings_open && object.is_valid() && object.is_string() {
                        if let Ok(value) = object.read_string(effective_max_length + 1) {
                            if !value.is_empty() {
                                pool.record_heap(&value, stack_owners.get(&object.address()));
                            }
                        }
                    }
                }

                if do_histogram {
                    total_heap_type_count = types.len();
                    let mut stats: Vec<HeapTypeStat> = types
                        .into_iter()
                        .map(|(type_name, (total_size, instance_count))| HeapTypeStat {
                            type_name,
                            total_size,
                            instance_count,
                        })
                        .collect();
                    stats.sort_by(|a, b| {
                        b.total_size
                            .cmp(&a.total_size)
                            .then_with(|| a.type_name.cmp(&b.type_name))
                    });
                    stats.truncate(options.heap_histogram_count);
                    heap_histogram = stats;
                    if total_heap_type_count > 10 {
                        let coverage =
                            histogram_coverage(&heap_histogram, gc.total_heap_bytes);
                        warnings.push(DataWarning::new(
                            WarningCategory::HeapHistogramClamp,
                            format!(
                                "Heap histogram shows {} of {} types ({:.0}% of heap bytes)",
                                heap_histogram.len(),
                                total_heap_type_count,
                                coverage * 100.0
                            ),
                        ));
                    }
                }
            }
        }
        if pool.heap_deduped() > 0 {
            warnings.push(DataWarning::new(
                WarningCategory::StringDedupe,
                format!(
                    "Deduplicated {} repeated heap string value(s)",
                    pool.heap_deduped()
                ),
            ));
        }
        debug!(
            objects = total_heap_object_count,
            types = total_heap_type_count,
            "heap walk complete"
        );
    }
    cancel.checkpoint()?;

    // Phase 9: modules.
    let module_records = runtime.modules();
    let total_module_count = module_records.len();
    let total_module_bytes: u64 = module_records.iter().map(|m| m.size).sum();
    if total_module_count > MODULE_DISPLAY_CAP {
        warnings.push(DataWarning::new(
            WarningCategory::ModuleClamp,
            format!(
                "{total_module_count} modules loaded; reports show the {MODULE_DISPLAY_CAP} largest"
            ),
        ));
    }
    let modules: Vec<ModuleInfo> = module_records
        .into_iter()
        .map(|m| ModuleInfo {
            name: m.name,
            size: m.size,
        })
        .collect();
    cancel.checkpoint()?;

    // Phase 10: coverage.
    let module_coverage_shown = if total_module_bytes == 0 {
        1.0
    } else {
        let mut sizes: Vec<u64> = modules.iter().map(|m| m.size).collect();
        sizes.sort_unstable_by(|a, b| b.cmp(a));
        let shown: u64 = sizes.iter().take(MODULE_DISPLAY_CAP).sum();
        (shown as f64 / total_module_bytes as f64).clamp(0.0, 1.0)
    };
    let heap_histogram_coverage = histogram_coverage(&heap_histogram, gc.total_heap_bytes);
    cancel.checkpoint()?;

    // Phase 11: warning sort.
    warnings.sort_by(|a, b| {
        a.category
            .priority()
            .cmp(&b.category.priority())
            .then_with(|| a.message.cmp(&b.message))
    });

    let unique_string_count = pool.len();
    let total_string_occurrences = pool.total_occurrences();
    let stack_string_occurrences = pool.stack_occurrences();
    let heap_string_occurrences = pool.heap_occurrences();

    Ok(Snapshot {
        dump_path: dump_path.to_string(),
        runtime_description,
        total_thread_count,
        threads: thread_snapshots,
        gc,
        blocking,
        strings: pool.into_notable_strings(),
        deadlocks,
        heap_histogram,
        modules,
        total_heap_type_count,
        total_module_count,
        total_module_bytes,
        module_coverage_shown,
        unique_string_count,
        total_string_occurrences,
        stack_string_occurrences,
        heap_string_occurrences,
        total_heap_object_count,
        heap_histogram_coverage,
        warnings,
    })
}

fn histogram_coverage(histogram: &[HeapTypeStat], total_heap_bytes: u64) -> f64 {
    if total_heap_bytes == 0 {
        return 0.0;
    }
    let shown: u64 = histogram.iter().map(|s| s.total_size).sum();
    (shown as f64 / total_heap_bytes as f64).clamp(0.0, 1.0)
}
