//! Bounded console capture buffer

use std::collections::VecDeque;

use serde::Serialize;

use crate::browser::ConsoleLevel;
use crate::common::config::ConsoleConfig;

/// A captured console line
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConsoleLine {
    /// Arrival sequence number, starting at 0 and never reused
    pub seq: u64,
    pub level: ConsoleLevel,
    pub text: String,
    /// Milliseconds since the session was opened
    pub at_ms: u64,
}

/// Ordered, append-only console capture
///
/// When either limit is reached the oldest lines are evicted first; the
/// remaining lines keep their arrival order and sequence numbers.
#[derive(Debug, Clone)]
pub struct ConsoleBuffer {
    lines: VecDeque<ConsoleLine>,
    next_seq: u64,
    current_bytes: usize,
    max_events: usize,
    max_bytes: usize,
    evicted: u64,
}

impl ConsoleBuffer {
    pub fn new(max_events: usize, max_bytes: usize) -> Self {
        Self {
            lines: VecDeque::new(),
            next_seq: 0,
            current_bytes: 0,
            max_events: max_events.max(1),
            max_bytes: max_bytes.max(1),
            evicted: 0,
        }
    }

    pub fn from_config(config: &ConsoleConfig) -> Self {
        Self::new(config.max_events, config.max_bytes_mb * 1024 * 1024)
    }

    /// Append a line
    pub fn push(&mut self, level: ConsoleLevel, text: String, at_ms: u64) {
        let text = if text.len() > self.max_bytes {
            tracing::warn!(
                "Console line ({} bytes) exceeds buffer size ({} bytes), truncating",
                text.len(),
                self.max_bytes
            );
            let mut end = self.max_bytes;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            text[..end].to_string()
        } else {
            text
        };
        let bytes = text.len();

        while (self.current_bytes + bytes > self.max_bytes || self.lines.len() >= self.max_events)
            && !self.lines.is_empty()
        {
            if let Some(removed) = self.lines.pop_front() {
                self.current_bytes = self.current_bytes.saturating_sub(removed.text.len());
                self.evicted += 1;
            }
        }

        self.lines.push_back(ConsoleLine {
            seq: self.next_seq,
            level,
            text,
            at_ms,
        });
        self.next_seq += 1;
        self.current_bytes += bytes;
    }

    /// Lines matching `predicate`, in arrival order
    pub fn filter<F>(&self, mut predicate: F) -> Vec<&ConsoleLine>
    where
        F: FnMut(&ConsoleLine) -> bool,
    {
        self.lines.iter().filter(|line| predicate(line)).collect()
    }

    /// Lines containing `needle`, in arrival order
    pub fn matching(&self, needle: &str) -> Vec<&ConsoleLine> {
        self.filter(|line| line.text.contains(needle))
    }

    pub fn lines(&self) -> impl Iterator<Item = &ConsoleLine> {
        self.lines.iter()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    /// Lines dropped to stay within limits
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}
