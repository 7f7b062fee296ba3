// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Small text helpers shared by the snapshot builder and the reasoner.

/// Separator spliced between the preserved head and tail of a shortened
/// string. Its length is part of the truncation budget.
const SEPARATOR: &str = " ... ";
const SEPARATOR_LEN: usize = 5;

/// Shortens `value` to at most `limit` code points while keeping both ends
/// readable: the result is `head + " ... " + tail` of the original.
///
/// Very small limits degrade to a plain prefix, since a midsection marker
/// would eat the whole budget.
pub(crate) fn truncate_middle(value: &str, limit: usize) -> String {
    if limit == 0 {
        return String::new();
    }
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len();
    if len <= limit {
        return value.to_string();
    }
    if limit <= 12 {
        return chars[..limit].iter().collect();
    }

    let mut head = (limit / 2).max(8).min(len - 1);
    let mut tail = limit.saturating_sub(head + SEPARATOR_LEN).max(4);
    tail = tail.min(len - head);
    // Shrink the tail before the head until the separator fits the budget;
    // neither end drops below a single code point.
    while head + tail + SEPARATOR_LEN > limit {
        if tail > 1 {
            tail -= 1;
        } else if head > 1 {
            head -= 1;
        } else {
            break;
        }
    }
    if head + tail >= len {
        return chars[..limit].iter().collect();
    }

    let mut out = String::with_capacity(limit * 4);
    out.extend(&chars[..head]);
    out.push_str(SEPARATOR);
    out.extend(&chars[len - tail..]);
    out
}

/// Case-insensitive substring match. All keyword probes against thread
/// states and stack frame text go through here.
pub(crate) fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() {
        return true;
    }
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Renders a byte count for finding evidence ("2.50 GiB", "640.0 MiB").
pub(crate) fn format_bytes(bytes: u64) -> String {
    const KIB: u64 = 1024;
    const MIB: u64 = KIB * 1024;
    const GIB: u64 = MIB * 1024;
    if bytes >= GIB {
        format!("{:.2} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}
