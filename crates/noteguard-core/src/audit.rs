//! Bounded audit log.
//!
//! Append-only ring buffer; the oldest entry is evicted once the
//! configured capacity is exceeded.

use parking_lot::Mutex;
use std::collections::VecDeque;

/// Default number of entries retained.
pub const DEFAULT_AUDIT_CAPACITY: usize = 1000;

pub struct AuditLog<T> {
    entries: Mutex<VecDeque<T>>,
    capacity: usize,
}

impl<T: Clone> AuditLog<T> {
    /// Create a log holding at most `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_AUDIT_CAPACITY))),
            capacity,
        }
    }

    pub fn append(&self, entry: T) {
        let mut entries = self.entries.lock();
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
    }

    /// The last `n` entries, newest first.
    pub fn recent(&self, n: usize) -> Vec<T> {
        self.entries.lock().iter().rev().take(n).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl<T: Clone> Default for AuditLog<T> {
    fn default() -> Self {
        Self::new(DEFAULT_AUDIT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recent_is_newest_first() {
        let log = AuditLog::new(10);
        for i in 0..5 {
            log.append(i);
        }
        assert_eq!(log.recent(3), vec![4, 3, 2]);
        assert_eq!(log.recent(100), vec![4, 3, 2, 1, 0]);
    }

    #[test]
    fn test_oldest_evicted_at_capacity() {
        let log = AuditLog::new(3);
        for i in 0..5 {
            log.append(i);
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.recent(3), vec![4, 3, 2]);
    }

    #[test]
    fn test_default_capacity() {
        let log: AuditLog<u32> = AuditLog::default();
        assert_eq!(log.capacity(), DEFAULT_AUDIT_CAPACITY);
        for i in 0..1005 {
            log.append(i);
        }
        assert_eq!(log.len(), DEFAULT_AUDIT_CAPACITY);
        assert_eq!(log.recent(1), vec![1004]);
    }

    #[test]
    fn test_zero_capacity_keeps_one() {
        let log = AuditLog::new(0);
        log.append("a");
        log.append("b");
        assert_eq!(log.recent(5), vec!["b"]);
    }
}
