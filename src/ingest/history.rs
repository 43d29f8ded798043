/// Bounded window of recently processed transaction signatures

use std::collections::VecDeque;
use std::sync::Mutex;

use crate::core::SIGNATURE_HISTORY_CAPACITY;

/// FIFO set of at most `capacity` signatures; the oldest entry is evicted first
#[derive(Debug)]
pub struct SignatureHistory {
    capacity: usize,
    entries: Mutex<VecDeque<String>>,
}

impl Default for SignatureHistory {
    fn default() -> Self {
        Self::new(SIGNATURE_HISTORY_CAPACITY)
    }
}

impl SignatureHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(VecDeque::with_capacity(capacity + 1)),
        }
    }

    pub fn seen(&self, signature: &str) -> bool {
        self.lock().iter().any(|s| s == signature)
    }

    /// Adds `signature` unless it is already in the window
    pub fn record(&self, signature: &str) {
        self.check_and_record(signature);
    }

    /// Records `signature` and returns true if it was not already in the window
    pub fn check_and_record(&self, signature: &str) -> bool {
        let mut entries = self.lock();
        if entries.iter().any(|s| s == signature) {
            return false;
        }
        Self::push(&mut entries, self.capacity, signature);
        true
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn push(entries: &mut VecDeque<String>, capacity: usize, signature: &str) {
        entries.push_back(signature.to_string());
        while entries.len() > capacity {
            entries.pop_front();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, VecDeque<String>> {
        self.entries
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
