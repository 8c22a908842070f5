use std::collections::VecDeque;

/// Number of lines kept when no configuration overrides it.
pub const DEFAULT_HISTORY_SIZE: usize = 10;

/// Bounded record of the most recent input lines, oldest first.
///
/// Once full, recording a new line drops the oldest one.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Records `line` without its line terminator. Blank lines are ignored.
    pub fn record(&mut self, line: &str) {
        let line = line.trim_end_matches(['\n', '\r']);
        if line.trim().is_empty() || self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(line.to_owned());
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_only_the_newest_lines() {
        let mut history = History::new(3);
        for line in ["a", "b", "c", "d", "e"] {
            history.record(line);
        }
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["c", "d", "e"]);
        assert_eq!(history.len(), 3);
    }

    #[test]
    fn test_ignores_blank_lines_and_strips_newline() {
        let mut history = History::default();
        history.record("\n");
        history.record("   ");
        history.record("ls -l\n");
        assert_eq!(history.iter().collect::<Vec<_>>(), vec!["ls -l"]);
    }

    #[test]
    fn test_zero_capacity_records_nothing() {
        let mut history = History::new(0);
        history.record("ls");
        assert!(history.is_empty());
    }
}
