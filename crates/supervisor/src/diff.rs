// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capture diffing for the poll loop (§4.4): new lines are the suffix
//! following the longest common prefix between the previous and current
//! `capture_pane` output. Scrollback drift (the previous tail is no longer
//! a prefix of the new capture) is treated as a full reset.

/// Default window of lines emitted on a full reset.
pub const RESET_WINDOW: usize = 200;

pub enum Diff {
    /// No new lines.
    Unchanged,
    /// The suffix of `new` following the longest common prefix with `prev`.
    Appended(Vec<String>),
    /// Scrollback drift detected; these are the last `RESET_WINDOW` lines
    /// of `new`.
    Reset(Vec<String>),
}

fn split_lines(capture: &str) -> Vec<&str> {
    capture.lines().collect()
}

fn longest_common_prefix_len(prev: &[&str], new: &[&str]) -> usize {
    prev.iter().zip(new.iter()).take_while(|(a, b)| a == b).count()
}

/// Diffs `new` against `prev`, applying the longest-common-prefix rule and
/// falling back to a window reset on drift.
pub fn diff_capture(prev: &str, new: &str) -> Diff {
    if prev == new {
        return Diff::Unchanged;
    }
    let prev_lines = split_lines(prev);
    let new_lines = split_lines(new);

    let prefix_len = longest_common_prefix_len(&prev_lines, &new_lines);

    // The old tail must itself be a prefix of the new capture for this to
    // be a clean append; otherwise scrollback has drifted from under us.
    if prefix_len == prev_lines.len() {
        let appended: Vec<String> = new_lines[prefix_len..].iter().map(|s| s.to_string()).collect();
        if appended.is_empty() {
            Diff::Unchanged
        } else {
            Diff::Appended(appended)
        }
    } else {
        let start = new_lines.len().saturating_sub(RESET_WINDOW);
        Diff::Reset(new_lines[start..].iter().map(|s| s.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_capture_yields_no_lines() {
        assert!(matches!(diff_capture("a\nb\n", "a\nb\n"), Diff::Unchanged));
    }

    #[test]
    fn clean_append_returns_only_new_suffix() {
        let diff = diff_capture("a\nb\n", "a\nb\nc\nd\n");
        match diff {
            Diff::Appended(lines) => assert_eq!(lines, vec!["c", "d"]),
            _ => panic!("expected Appended"),
        }
    }

    #[test]
    fn scrollback_drift_triggers_reset_with_window() {
        let diff = diff_capture("a\nb\nc\n", "x\ny\nz\n");
        match diff {
            Diff::Reset(lines) => assert_eq!(lines, vec!["x", "y", "z"]),
            _ => panic!("expected Reset"),
        }
    }
}
