/// History window — the rolling context fed back into continuation prompts.
use std::collections::VecDeque;

/// Bounded FIFO of the most recently emitted fragment texts.
///
/// Capacity is fixed at construction. Pushing past capacity evicts the
/// oldest entry, so `len() <= capacity()` always holds.
#[derive(Debug, Clone, Default)]
pub struct HistoryWindow {
    entries: VecDeque<String>,
    capacity: usize,
}

impl HistoryWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, text: impl Into<String>) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(text.into());
    }

    /// Up to `k` most recent entries, oldest first and most recent last.
    pub fn recent(&self, k: usize) -> impl Iterator<Item = &str> + '_ {
        let skip = self.entries.len().saturating_sub(k);
        self.entries.iter().skip(skip).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> + '_ {
        self.entries.iter().map(String::as_str)
    }
}
