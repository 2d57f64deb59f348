// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Fixed-capacity line buffer for captured session output (§4.3).
//!
//! Adapted from a byte-oriented circular buffer to a line-oriented one:
//! consumers here want whole captured lines in emission order, not a replay
//! offset into a raw byte stream.

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::error::{Error, Result};

struct Inner {
    lines: VecDeque<String>,
    capacity: usize,
}

impl Inner {
    fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }
}

/// Internally synchronized (§5): push and read never tear, but this is not
/// lock-free.
pub struct OutputRingBuffer {
    inner: Mutex<Inner>,
}

impl OutputRingBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity < 1 {
            return Err(Error::validation("ring buffer capacity must be >= 1"));
        }
        Ok(Self { inner: Mutex::new(Inner { lines: VecDeque::with_capacity(capacity), capacity }) })
    }

    pub fn push(&self, line: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.push(line.into());
    }

    pub fn push_many(&self, lines: impl IntoIterator<Item = String>) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        for line in lines {
            inner.push(line);
        }
    }

    /// The most recent `min(k, size)` lines, oldest first.
    pub fn last(&self, k: usize) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        let skip = inner.lines.len().saturating_sub(k);
        inner.lines.iter().skip(skip).cloned().collect()
    }

    pub fn to_array(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.lines.iter().cloned().collect()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.lines.clear();
    }

    pub fn size(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    pub fn is_full(&self) -> bool {
        let inner = self.inner.lock().unwrap_or_else(|p| p.into_inner());
        inner.lines.len() == inner.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_zero_is_rejected() {
        assert!(OutputRingBuffer::new(0).is_err());
    }

    #[test]
    fn push_past_capacity_evicts_oldest() {
        let buf = OutputRingBuffer::new(3).expect("valid capacity");
        for i in 0..5 {
            buf.push(format!("line{i}"));
        }
        assert_eq!(buf.size(), 3);
        assert_eq!(buf.to_array(), vec!["line2", "line3", "line4"]);
    }

    #[test]
    fn last_returns_most_recent_in_emission_order() {
        let buf = OutputRingBuffer::new(10).expect("valid capacity");
        buf.push_many(["a", "b", "c", "d"].into_iter().map(String::from));
        assert_eq!(buf.last(2), vec!["c", "d"]);
        assert_eq!(buf.last(100), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn capacity_one_keeps_only_last_pushed() {
        let buf = OutputRingBuffer::new(1).expect("valid capacity");
        for i in 0..10 {
            buf.push(format!("line{i}"));
        }
        assert_eq!(buf.size(), 1);
        assert_eq!(buf.last(1), vec!["line9"]);
    }

    #[test]
    fn clear_resets_to_empty() {
        let buf = OutputRingBuffer::new(5).expect("valid capacity");
        buf.push("a");
        buf.clear();
        assert!(buf.is_empty());
        assert_eq!(buf.size(), 0);
    }

    #[test]
    fn is_full_tracks_capacity() {
        let buf = OutputRingBuffer::new(2).expect("valid capacity");
        assert!(!buf.is_full());
        buf.push("a");
        buf.push("b");
        assert!(buf.is_full());
    }
}
