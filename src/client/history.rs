//! Bounded window of recently received relay messages

use std::collections::VecDeque;

use crate::types::{RelayMessage, StatusEvent};

pub const DEFAULT_MAX_HISTORY: usize = 50;

#[derive(Debug, Clone)]
pub struct StatusHistory {
    capacity: usize,
    entries: VecDeque<RelayMessage>,
}

impl StatusHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append a message, evicting the oldest beyond capacity
    pub fn push(&mut self, message: RelayMessage) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(message);
    }

    /// Most recent `status` frame
    pub fn latest_status(&self) -> Option<&StatusEvent> {
        self.entries.iter().rev().find_map(RelayMessage::as_status)
    }

    /// A workflow is running when the latest status is not terminal
    pub fn is_workflow_active(&self) -> bool {
        self.latest_status().is_some_and(|s| !s.is_terminal())
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RelayMessage> {
        self.entries.iter()
    }
}

impl Default for StatusHistory {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusUpdate;

    fn status(name: &str) -> RelayMessage {
        RelayMessage::status(StatusUpdate::new(name, name))
    }

    #[test]
    fn test_keeps_last_n() {
        let mut history = StatusHistory::new(3);
        for name in ["a", "b", "c", "d"] {
            history.push(status(name));
        }
        let kept: Vec<&str> = history
            .iter()
            .filter_map(RelayMessage::as_status)
            .map(|s| s.status.as_str())
            .collect();
        assert_eq!(kept, vec!["b", "c", "d"]);
    }

    #[test]
    fn test_latest_status_skips_other_frames() {
        let mut history = StatusHistory::default();
        assert!(history.latest_status().is_none());
        history.push(status("processing"));
        history.push(RelayMessage::connected("abc"));
        assert_eq!(history.latest_status().unwrap().status, "processing");
    }

    #[test]
    fn test_workflow_activity() {
        let mut history = StatusHistory::default();
        assert!(!history.is_workflow_active());

        history.push(status("analyzing"));
        assert!(history.is_workflow_active());

        history.push(status("completed"));
        assert!(!history.is_workflow_active());

        history.clear();
        assert!(history.is_empty());
    }
}
