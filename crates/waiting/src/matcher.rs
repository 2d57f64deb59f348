// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Output-pattern matcher (§4.6): scans the last N captured lines for
//! prompts that mean the assistant is waiting on the user.

use regex::RegexSet;

use crate::types::WaitingReason;

const LOOKBACK_LINES: usize = 8;

/// Prompts that unambiguously require a yes/no or explicit choice.
const IMMEDIATE_PATTERNS: &[&str] = &[
    r"(?i)do you want to proceed\??",
    r"(?i)allow this (action|command|tool)\??",
    r"\(y/n\)",
    r"(?i)press enter to continue",
];

/// Softer heuristics that usually, but don't always, mean the assistant
/// is waiting on direction.
const HEURISTIC_PATTERNS: &[&str] = &[r"(?i)what would you like", r"(?i)\bshould i\b"];

pub struct OutputMatcher {
    immediate: RegexSet,
    heuristic: RegexSet,
}

impl OutputMatcher {
    pub fn new() -> Self {
        Self {
            immediate: RegexSet::new(IMMEDIATE_PATTERNS).expect("static immediate patterns compile"),
            heuristic: RegexSet::new(HEURISTIC_PATTERNS).expect("static heuristic patterns compile"),
        }
    }

    /// Checks the last [`LOOKBACK_LINES`] of `lines` for a waiting prompt.
    pub fn scan(&self, lines: &[String]) -> Option<WaitingReason> {
        let tail_start = lines.len().saturating_sub(LOOKBACK_LINES);
        let tail = &lines[tail_start..];

        if tail.iter().any(|line| self.immediate.is_match(line)) {
            return Some(WaitingReason::OutputPrompt);
        }
        if tail.iter().any(|line| self.heuristic.is_match(line)) {
            return Some(WaitingReason::OutputPrompt);
        }
        if let Some(last_non_blank) = tail.iter().rev().find(|line| !line.trim().is_empty()) {
            if last_non_blank.trim_end().ends_with('?') {
                return Some(WaitingReason::OutputPrompt);
            }
        }
        None
    }
}

impl Default for OutputMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &str) -> Vec<String> {
        text.lines().map(str::to_string).collect()
    }

    #[test]
    fn immediate_pattern_is_detected() {
        let matcher = OutputMatcher::new();
        let result = matcher.scan(&lines("running build\nDo you want to proceed?"));
        assert_eq!(result, Some(WaitingReason::OutputPrompt));
    }

    #[test]
    fn heuristic_pattern_is_detected() {
        let matcher = OutputMatcher::new();
        let result = matcher.scan(&lines("all done\nWhat would you like me to do next?"));
        assert_eq!(result, Some(WaitingReason::OutputPrompt));
    }

    #[test]
    fn trailing_question_mark_is_detected() {
        let matcher = OutputMatcher::new();
        let result = matcher.scan(&lines("Ready to continue with step 2?"));
        assert_eq!(result, Some(WaitingReason::OutputPrompt));
    }

    #[test]
    fn plain_output_is_not_detected() {
        let matcher = OutputMatcher::new();
        let result = matcher.scan(&lines("compiling crate core\nfinished in 1.2s"));
        assert_eq!(result, None);
    }

    #[test]
    fn only_last_n_lines_are_considered() {
        let matcher = OutputMatcher::new();
        let mut text: Vec<String> = (0..20).map(|i| format!("log line {i}")).collect();
        text.push("Do you want to proceed?".to_string());
        text.push("trailing noise".to_string());
        assert_eq!(matcher.scan(&text), None);
    }
}
