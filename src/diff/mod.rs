// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2025 Blackman Artificial Intelligence Technologies Inc.

//! Search/replace patch application
//!
//! A patch is a sequence of blocks:
//!
//! ```text
//! <<<<<<< SEARCH
//! exact lines from the file
//! =======
//! replacement lines
//! >>>>>>> REPLACE
//! ```
//!
//! Blocks apply top to bottom; each search must match at or after the end of
//! the previous match. Matching is exact first, then line-by-line ignoring
//! surrounding whitespace, then by first/last line anchors for blocks of three
//! or more lines. An empty search replaces the whole file (or creates it).
//! Content outside the matched spans is copied through byte for byte.

mod fallback;

use thiserror::Error;

pub const SEARCH_MARKER: &str = "<<<<<<< SEARCH";
pub const SEPARATOR: &str = "=======";
pub const REPLACE_MARKER: &str = ">>>>>>> REPLACE";

/// Lines of original content shown around a failed search
const CONTEXT_RADIUS: usize = 5;

/// Why a patch could not be applied
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DiffError {
    /// A SEARCH block matched nothing at or after the previous block
    #[error("The SEARCH block:\n{search}\n...does not match anything in the file.")]
    SearchNotFound {
        /// The search text as the model sent it
        search: String,
        /// Nearby lines of the original, to help the model retry
        context: String,
    },

    /// Marker structure is broken (e.g. REPLACE without SEARCH)
    #[error("Malformed patch: {0}")]
    MalformedPatch(String),
}

#[derive(Debug, Clone, Copy)]
struct Match {
    start: usize,
    end: usize,
    /// Matched the final line of a file without a trailing newline
    at_unterminated_eof: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Section {
    Outside,
    Search,
    Replace,
}

/// Apply `diff` to `original`.
///
/// While `is_final` is false the diff may end mid-block; the returned content
/// is the best reconstructable prefix (untouched content after the last
/// completed block is omitted).
pub fn construct_new_file_content(
    diff: &str,
    original: &str,
    is_final: bool,
) -> Result<String, DiffError> {
    let mut result = String::with_capacity(original.len() + diff.len());
    let mut last_processed = 0usize;
    let mut section = Section::Outside;
    let mut current_search = String::new();
    let mut current_match: Option<Match> = None;

    let mut lines: Vec<&str> = diff.split('\n').collect();
    if let Some(last) = lines.last() {
        let is_marker_fragment = (last.starts_with('<')
            || last.starts_with('=')
            || last.starts_with('>'))
            && *last != SEARCH_MARKER
            && *last != SEPARATOR
            && *last != REPLACE_MARKER;
        if is_marker_fragment {
            lines.pop();
        }
    }

    for line in lines {
        match line.trim_end() {
            SEARCH_MARKER => {
                if section != Section::Outside {
                    return Err(DiffError::MalformedPatch(
                        "SEARCH marker inside an unfinished block".to_string(),
                    ));
                }
                section = Section::Search;
                current_search.clear();
                continue;
            }
            SEPARATOR if section == Section::Search => {
                if current_search.is_empty() && last_processed > 0 {
                    return Err(DiffError::MalformedPatch(
                        "an empty SEARCH block must be the only block".to_string(),
                    ));
                }
                let found = find_match(original, &current_search, last_processed).ok_or_else(
                    || DiffError::SearchNotFound {
                        search: current_search.trim_end_matches('\n').to_string(),
                        context: surrounding_context(original, &current_search),
                    },
                )?;
                if found.start < last_processed {
                    return Err(DiffError::MalformedPatch(
                        "SEARCH block matched before the previous block".to_string(),
                    ));
                }
                result.push_str(&original[last_processed..found.start]);
                current_match = Some(found);
                section = Section::Replace;
                continue;
            }
            REPLACE_MARKER => {
                let Some(found) = current_match.take() else {
                    return Err(DiffError::MalformedPatch(
                        "REPLACE marker without a matched SEARCH block".to_string(),
                    ));
                };
                if found.at_unterminated_eof && result.ends_with('\n') {
                    result.pop();
                }
                last_processed = found.end;
                section = Section::Outside;
                continue;
            }
            _ => {}
        }

        match section {
            Section::Search => {
                current_search.push_str(line);
                current_search.push('\n');
            }
            Section::Replace => {
                result.push_str(line);
                result.push('\n');
            }
            Section::Outside => {}
        }
    }

    if is_final {
        if section != Section::Outside {
            return Err(DiffError::MalformedPatch(
                "patch ended inside an unfinished block".to_string(),
            ));
        }
        result.push_str(&original[last_processed..]);
    }

    Ok(result)
}

fn find_match(original: &str, search: &str, from: usize) -> Option<Match> {
    if search.is_empty() {
        // Empty search: create the file, or replace all of it.
        return Some(Match {
            start: 0,
            end: original.len(),
            at_unterminated_eof: false,
        });
    }

    if let Some(offset) = original[from..].find(search) {
        let start = from + offset;
        return Some(Match {
            start,
            end: start + search.len(),
            at_unterminated_eof: false,
        });
    }

    // The last line of a file may lack its newline.
    if let Some(stripped) = search.strip_suffix('\n') {
        if !stripped.is_empty() && original.ends_with(stripped) {
            let start = original.len() - stripped.len();
            if start >= from {
                return Some(Match {
                    start,
                    end: original.len(),
                    at_unterminated_eof: true,
                });
            }
        }
    }

    fallback::line_trimmed_match(original, search, from)
        .or_else(|| fallback::block_anchor_match(original, search, from))
        .map(|(start, end)| {
            let at_unterminated_eof = end == original.len() && !original.ends_with('\n');
            Match {
                start,
                end,
                at_unterminated_eof,
            }
        })
}

/// Lines of the original near where the search probably meant to land.
fn surrounding_context(original: &str, search: &str) -> String {
    let original_lines: Vec<&str> = original.lines().collect();
    let anchor = search.lines().map(str::trim).find(|l| !l.is_empty());

    let center = anchor
        .and_then(|anchor| {
            original_lines
                .iter()
                .position(|l| l.trim() == anchor)
                .or_else(|| original_lines.iter().position(|l| l.contains(anchor)))
        })
        .unwrap_or(0);

    let start = center.saturating_sub(CONTEXT_RADIUS);
    let end = (center + CONTEXT_RADIUS + 1).min(original_lines.len());
    original_lines[start..end]
        .iter()
        .enumerate()
        .map(|(i, line)| format!("{:>4} | {}", start + i + 1, line))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(search: &str, replace: &str) -> String {
        format!(
            "{}\n{}\n{}\n{}\n{}",
            SEARCH_MARKER, search, SEPARATOR, replace, REPLACE_MARKER
        )
    }

    #[test]
    fn test_single_replacement() {
        let original = "fn main() {\n    println!(\"hi\");\n}\n";
        let diff = block("    println!(\"hi\");", "    println!(\"bye\");");
        let result = construct_new_file_content(&diff, original, true).unwrap();
        assert_eq!(result, "fn main() {\n    println!(\"bye\");\n}\n");
    }

    #[test]
    fn test_multiple_blocks_in_order() {
        let original = "a\nb\nc\nd\n";
        let diff = format!("{}\n{}", block("a", "A"), block("c", "C"));
        let result = construct_new_file_content(&diff, original, true).unwrap();
        assert_eq!(result, "A\nb\nC\nd\n");
    }

    #[test]
    fn test_noop_patch_is_identity() {
        let original = "one\ntwo\nthree";
        for target in ["one", "two", "three", "two\nthree"] {
            let diff = block(target, target);
            let result = construct_new_file_content(&diff, original, true).unwrap();
            assert_eq!(result, original, "target {:?}", target);
        }
    }

    #[test]
    fn test_search_not_found_carries_context() {
        let original = "alpha\nbeta\ngamma\n";
        let diff = block("delta", "x");
        let err = construct_new_file_content(&diff, original, true).unwrap_err();
        match err {
            DiffError::SearchNotFound { search, context } => {
                assert_eq!(search, "delta");
                assert!(context.contains("alpha"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_empty_search_on_empty_file_creates() {
        let diff = format!("{}\n{}\nnew content\n{}", SEARCH_MARKER, SEPARATOR, REPLACE_MARKER);
        let result = construct_new_file_content(&diff, "", true).unwrap();
        assert_eq!(result, "new content\n");
    }

    #[test]
    fn test_empty_search_replaces_whole_file() {
        let diff = format!("{}\n{}\nfresh\n{}", SEARCH_MARKER, SEPARATOR, REPLACE_MARKER);
        let result = construct_new_file_content(&diff, "old\nstuff\n", true).unwrap();
        assert_eq!(result, "fresh\n");
    }

    #[test]
    fn test_empty_search_after_another_block_is_malformed() {
        let original = "a\nb\nc\n";
        let empty = format!("{}\n{}\nX\n{}", SEARCH_MARKER, SEPARATOR, REPLACE_MARKER);
        let diff = format!("{}\n{}", block("b", "B"), empty);
        let err = construct_new_file_content(&diff, original, true).unwrap_err();
        assert!(matches!(err, DiffError::MalformedPatch(_)));
    }

    #[test]
    fn test_whitespace_tolerant_match() {
        let original = "fn f() {\n\tlet x = 1;\n}\n";
        let diff = block("    let x = 1;", "\tlet x = 2;");
        let result = construct_new_file_content(&diff, original, true).unwrap();
        assert_eq!(result, "fn f() {\n\tlet x = 2;\n}\n");
    }

    #[test]
    fn test_partial_diff_returns_prefix() {
        let original = "a\nb\nc\n";
        let diff = format!("{}\nb\n{}\nB1\nB2\n>>>", SEARCH_MARKER, SEPARATOR);
        let result = construct_new_file_content(&diff, original, false).unwrap();
        assert_eq!(result, "a\nB1\nB2\n");
    }

    #[test]
    fn test_partial_diff_inside_search() {
        let original = "a\nb\n";
        let diff = format!("{}\na", SEARCH_MARKER);
        let result = construct_new_file_content(&diff, original, false).unwrap();
        assert_eq!(result, "");
    }

    #[test]
    fn test_final_unfinished_block_is_malformed() {
        let diff = format!("{}\na\n{}\nb", SEARCH_MARKER, SEPARATOR);
        let err = construct_new_file_content(&diff, "a\n", true).unwrap_err();
        assert!(matches!(err, DiffError::MalformedPatch(_)));
    }

    #[test]
    fn test_out_of_order_blocks_fail() {
        let original = "a\nb\n";
        let diff = format!("{}\n{}", block("b", "B"), block("a", "A"));
        assert!(construct_new_file_content(&diff, original, true).is_err());
    }

    #[test]
    fn test_untouched_regions_preserved_exactly() {
        let original = "  keep  \r\n\ttabs\t\nchange me\ntrailing   ";
        let diff = block("change me", "changed");
        let result = construct_new_file_content(&diff, original, true).unwrap();
        assert_eq!(result, "  keep  \r\n\ttabs\t\nchanged\ntrailing   ");
    }
}
