// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Tolerant matchers used when a SEARCH block is not found verbatim.
//!
//! Both return byte offsets `(start, end)` into the original, aligned to line
//! boundaries, with `end` including the newline of the last matched line when
//! there is one.

struct Lines<'a> {
    lines: Vec<&'a str>,
    /// Byte offset where each line starts, plus one past the end
    offsets: Vec<usize>,
}

impl<'a> Lines<'a> {
    fn new(original: &'a str) -> Self {
        let lines: Vec<&str> = original.split('\n').collect();
        let mut offsets = Vec::with_capacity(lines.len() + 1);
        let mut offset = 0;
        for line in &lines {
            offsets.push(offset);
            offset += line.len() + 1;
        }
        offsets.push(offset);
        Self { lines, offsets }
    }

    fn first_line_at_or_after(&self, from: usize) -> Option<usize> {
        self.offsets[..self.lines.len()]
            .iter()
            .position(|&offset| offset >= from)
    }

    fn span(&self, first: usize, count: usize, total_len: usize) -> (usize, usize) {
        let start = self.offsets[first];
        let end = self.offsets[first + count].min(total_len);
        (start, end)
    }
}

fn search_lines(search: &str) -> Vec<&str> {
    let mut lines: Vec<&str> = search.split('\n').collect();
    if lines.last() == Some(&"") {
        lines.pop();
    }
    lines
}

/// Match every line after trimming leading and trailing whitespace.
pub(super) fn line_trimmed_match(original: &str, search: &str, from: usize) -> Option<(usize, usize)> {
    let haystack = Lines::new(original);
    let needle = search_lines(search);
    if needle.is_empty() || needle.len() > haystack.lines.len() {
        return None;
    }

    let first = haystack.first_line_at_or_after(from)?;
    let last_start = haystack.lines.len() - needle.len();
    (first..=last_start)
        .find(|&i| {
            needle
                .iter()
                .enumerate()
                .all(|(k, line)| haystack.lines[i + k].trim() == line.trim())
        })
        .map(|i| haystack.span(i, needle.len(), original.len()))
}

/// Match on the first and last lines only, for blocks of three or more lines
/// whose middle drifted from the file.
pub(super) fn block_anchor_match(original: &str, search: &str, from: usize) -> Option<(usize, usize)> {
    let haystack = Lines::new(original);
    let needle = search_lines(search);
    if needle.len() < 3 || needle.len() > haystack.lines.len() {
        return None;
    }

    let head = needle[0].trim();
    let tail = needle[needle.len() - 1].trim();
    let first = haystack.first_line_at_or_after(from)?;
    let last_start = haystack.lines.len() - needle.len();
    (first..=last_start)
        .find(|&i| {
            haystack.lines[i].trim() == head
                && haystack.lines[i + needle.len() - 1].trim() == tail
        })
        .map(|i| haystack.span(i, needle.len(), original.len()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_trimmed_ignores_indentation() {
        let original = "a\n    b\n  c\nd\n";
        let (start, end) = line_trimmed_match(original, "b\nc\n", 0).unwrap();
        assert_eq!(&original[start..end], "    b\n  c\n");
    }

    #[test]
    fn test_line_trimmed_respects_from() {
        let original = "x\ny\nx\n";
        let (start, _) = line_trimmed_match(original, " x\n", 1).unwrap();
        assert_eq!(start, 4);
    }

    #[test]
    fn test_line_trimmed_last_line_without_newline() {
        let original = "a\nb";
        let (start, end) = line_trimmed_match(original, "b \n", 0).unwrap();
        assert_eq!((start, end), (2, 3));
    }

    #[test]
    fn test_block_anchor() {
        let original = "fn a() {\n    old body\n}\n";
        let search = "fn a() {\n    different body\n}\n";
        let (start, end) = block_anchor_match(original, search, 0).unwrap();
        assert_eq!(&original[start..end], original);
    }

    #[test]
    fn test_block_anchor_needs_three_lines() {
        assert!(block_anchor_match("a\nb\n", "a\nb\n", 0).is_none());
    }
}
