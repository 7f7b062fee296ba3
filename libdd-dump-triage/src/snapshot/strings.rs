// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Notable-string aggregation shared by the stack-root and heap walks.
//!
//! Strings are de-duplicated by their post-truncation text, so two values
//! that shorten to the same head and tail merge into one aggregate. The
//! pre-truncation length and truncation flag of the first observer are kept.

use std::collections::{BTreeSet, HashMap};

use crate::snapshot::{NotableString, StringSource};
use crate::text::truncate_middle;

#[derive(Debug)]
struct StringAggregate {
    text: String,
    total_length: usize,
    was_truncated: bool,
    source: StringSource,
    occurrences: u64,
    thread_ids: BTreeSet<i32>,
}

/// Accumulator for both string walks. Insertion order is preserved; the
/// occurrence totals are partitioned by the walk that observed each hit.
#[derive(Debug)]
pub(crate) struct StringPool {
    entries: Vec<StringAggregate>,
    index: HashMap<String, usize>,
    max_length: usize,
    stack_occurrences: u64,
    heap_occurrences: u64,
    stack_deduped: u64,
    heap_deduped: u64,
}

impl StringPool {
    pub fn new(max_length: usize) -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
            max_length,
            stack_occurrences: 0,
            heap_occurrences: 0,
            stack_deduped: 0,
            heap_deduped: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Records a value observed through a stack root.
    pub fn record_stack(&mut self, raw: &str, thread_id: i32) {
        self.stack_occurrences += 1;
        let (text, total_length, was_truncated) = self.shape(raw);
        match self.index.get(&text) {
            Some(&idx) => {
                let entry = &mut self.entries[idx];
                entry.occurrences += 1;
                entry.thread_ids.insert(thread_id);
                if entry.source == StringSource::Heap {
                    entry.source = StringSource::StackAndHeap;
                }
                self.stack_deduped += 1;
            }
            None => {
                self.insert(
                    text,
                    total_length,
                    was_truncated,
                    StringSource::Stack,
                    BTreeSet::from([thread_id]),
                );
            }
        }
    }

    /// Records a value observed during the heap walk. Returns true when a
    /// new aggregate was created, which is the only case that counts
    /// against the heap capture budget.
    pub fn record_heap(&mut self, raw: &str, owners: Option<&BTreeSet<i32>>) -> bool {
        self.heap_occurrences += 1;
        let (text, total_length, was_truncated) = self.shape(raw);
        match self.index.get(&text) {
            Some(&idx) => {
                let entry = &mut self.entries[idx];
                entry.occurrences += 1;
                if entry.source == StringSource::Stack {
                    entry.source = StringSource::StackAndHeap;
                }
                if let Some(owners) = owners {
                    entry.thread_ids.extend(owners.iter().copied());
                }
                self.heap_deduped += 1;
                false
            }
            None => {
                self.insert(
                    text,
                    total_length,
                    was_truncated,
                    StringSource::Heap,
                    owners.cloned().unwrap_or_default(),
                );
                true
            }
        }
    }

    fn shape(&self, raw: &str) -> (String, usize, bool) {
        let total_length = raw.chars().count();
        if total_length > self.max_length {
            (truncate_middle(raw, self.max_length), total_length, true)
        } else {
            (raw.to_string(), total_length, false)
        }
    }

    fn insert(
        &mut self,
        text: String,
        total_length: usize,
        was_truncated: bool,
        source: StringSource,
        thread_ids: BTreeSet<i32>,
    ) {
        let idx = self.entries.len();
        self.index.insert(text.clone(), idx);
        self.entries.push(StringAggregate {
            text,
            total_length,
            was_truncated,
            source,
            occurrences: 1,
            thread_ids,
        });
    }

    pub fn stack_deduped(&self) -> u64 {
        self.stack_deduped
    }

    pub fn heap_deduped(&self) -> u64 {
        self.heap_deduped
    }

    pub fn stack_occurrences(&self) -> u64 {
        self.stack_occurrences
    }

    pub fn heap_occurrences(&self) -> u64 {
        self.heap_occurrences
    }

    pub fn total_occurrences(&self) -> u64 {
        self.stack_occurrences + self.heap_occurrences
    }

    pub fn into_notable_strings(self) -> Vec<NotableString> {
        self.entries
            .into_iter()
            .map(|entry| NotableString {
                thread_ids: entry.thread_ids.into_iter().collect(),
                text: entry.text,
                total_length: entry.total_length,
                was_truncated: entry.was_truncated,
                source: entry.source,
                occurrences: entry.occurrences,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn stack_values_deduplicate_and_collect_owners() {
        let mut pool = StringPool::new(64);
        pool.record_stack("connection string", 1);
        pool.record_stack("connection string", 2);
        pool.record_stack("connection string", 2);
        pool.record_stack("other", 3);

        assert_eq!(pool.len(), 2);
        assert_eq!(pool.stack_deduped(), 2);
        assert_eq!(pool.stack_occurrences(), 4);

        let strings = pool.into_notable_strings();
        assert_eq!(strings[0].occurrences, 3);
        assert_eq!(strings[0].thread_ids, vec![1, 2]);
        assert_eq!(strings[0].source, StringSource::Stack);
    }

    #[test]
    fn heap_hit_on_a_stack_string_upgrades_the_source() {
        let mut pool = StringPool::new(64);
        pool.record_stack("shared value", 7);
        let owners = BTreeSet::from([9]);
        let inserted = pool.record_heap("shared value", Some(&owners));

        assert!(!inserted);
        assert_eq!(pool.heap_deduped(), 1);

        let strings = pool.into_notable_strings();
        assert_eq!(strings[0].source, StringSource::StackAndHeap);
        assert_eq!(strings[0].thread_ids, vec![7, 9]);
        assert_eq!(strings[0].occurrences, 2);
    }

    #[test]
    fn heap_only_strings_keep_pinning_owners() {
        let mut pool = StringPool::new(64);
        let owners = BTreeSet::from([3, 1]);
        assert!(pool.record_heap("heap resident", Some(&owners)));
        assert!(pool.record_heap("anonymous", None));

        let strings = pool.into_notable_strings();
        assert_eq!(strings[0].source, StringSource::Heap);
        assert_eq!(strings[0].thread_ids, vec![1, 3]);
        assert!(strings[1].thread_ids.is_empty());
    }

    #[test]
    fn long_values_truncate_but_keep_the_original_length() {
        let mut pool = StringPool::new(20);
        let long = "x".repeat(33);
        pool.record_stack(&long, 1);

        let strings = pool.into_notable_strings();
        assert!(strings[0].was_truncated);
        assert_eq!(strings[0].total_length, 33);
        assert_eq!(strings[0].text.chars().count(), 20);
    }

    #[test]
    fn distinct_values_merging_after_truncation_is_accepted() {
        // Intentional: dedup keys on the post-truncation text.
        let mut pool = StringPool::new(13);
        let a = format!("abcdefg{}z", "1".repeat(40));
        let b = format!("abcdefg{}z", "2".repeat(40));
        pool.record_stack(&a, 1);
        pool.record_stack(&b, 2);

        assert_eq!(pool.len(), 1);
        let strings = pool.into_notable_strings();
        assert_eq!(strings[0].occurrences, 2);
        // First observer's length wins.
        assert_eq!(strings[0].total_length, 48);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            .. ProptestConfig::default()
        })]

        #[test]
        fn occurrence_totals_partition_and_lengths_obey_the_cap(
            stack_values in proptest::collection::vec("[a-p]{1,40}", 0..24),
            heap_values in proptest::collection::vec("[a-p]{1,40}", 0..24),
            max_length in 13usize..32,
        ) {
            let mut pool = StringPool::new(max_length);
            for (i, value) in stack_values.iter().enumerate() {
                pool.record_stack(value, i as i32);
            }
            for value in &heap_values {
                pool.record_heap(value, None);
            }

            let stack = pool.stack_occurrences();
            let heap = pool.heap_occurrences();
            let total = pool.total_occurrences();
            prop_assert_eq!(stack, stack_values.len() as u64);
            prop_assert_eq!(heap, heap_values.len() as u64);
            prop_assert_eq!(total, stack + heap);

            let strings = pool.into_notable_strings();
            let summed: u64 = strings.iter().map(|s| s.occurrences).sum();
            prop_assert_eq!(summed, total);
            for s in &strings {
                prop_assert!(s.text.chars().count() <= max_length);
                prop_assert_eq!(s.was_truncated, s.total_length > max_length);
            }
        }
    }
}
