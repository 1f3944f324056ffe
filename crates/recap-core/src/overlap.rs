//! Seam deduplication for sequentially reassembled chunk outputs.

use crate::text::{head_chars, tail_chars};

/// Shortest seam considered a real duplication rather than a coincidence.
pub const MIN_OVERLAP_CHARS: usize = 20;
/// How much of each side of a seam is compared.
pub const OVERLAP_WINDOW_CHARS: usize = 200;

/// Longest suffix of `previous_tail` that is also a prefix of `current_head`,
/// at least `min_len` characters long. Empty when there is none.
pub fn find_overlap<'a>(previous_tail: &str, current_head: &'a str, min_len: usize) -> &'a str {
    let tail_len = previous_tail.chars().count();
    let head_len = current_head.chars().count();
    let longest = tail_len.min(head_len);
    let shortest = min_len.max(1);
    if longest < shortest {
        return "";
    }

    for len in (shortest..=longest).rev() {
        let head = head_chars(current_head, len);
        if tail_chars(previous_tail, len) == head {
            return head;
        }
    }
    ""
}

/// [`find_overlap`] with the default floor.
pub fn strip_overlap<'a>(previous_tail: &str, current_head: &'a str) -> &'a str {
    find_overlap(previous_tail, current_head, MIN_OVERLAP_CHARS)
}

/// Join sequential parts with blank lines, dropping text each part repeats
/// from the end of the part kept before it.
pub fn merge_sequential<S: AsRef<str>>(parts: &[S], window: usize, min_len: usize) -> String {
    let mut kept: Vec<&str> = Vec::with_capacity(parts.len());
    for part in parts {
        let mut current = part.as_ref();
        if let Some(previous) = kept.last() {
            let overlap = find_overlap(
                tail_chars(previous, window),
                head_chars(current, window),
                min_len,
            );
            if !overlap.is_empty() {
                current = current[overlap.len()..].trim_start();
            }
        }
        if !current.trim().is_empty() {
            kept.push(current);
        }
    }
    kept.join("\n\n")
}
