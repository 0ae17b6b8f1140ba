//! Per-mailbox record of accepted submissions and their remaining edits.
//!
//! The ledger also remembers which letters were already answered, because
//! the read window can hand the same letter to the pipeline on every poll.

use std::collections::{HashMap, HashSet, VecDeque};

use chrono::NaiveDate;

/// Corrections allowed after a first submission.
pub const DEFAULT_EDIT_LIMIT: u8 = 2;

/// Handled letters remembered per mailbox; the oldest are forgotten first.
pub const HANDLED_LETTERS: usize = 4096;

/// Identity of a submission: competition date and sender.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DedupKey {
    /// Competition date taken from the subject.
    pub date: NaiveDate,
    /// Normalized sender address.
    pub sender: String,
}

impl DedupKey {
    /// Creates a key, lowercasing the sender.
    #[must_use]
    pub fn new(date: NaiveDate, sender: &str) -> Self {
        Self {
            date,
            sender: sender.trim().to_lowercase(),
        }
    }
}

/// Maps each accepted submission to the number of corrections still allowed.
///
/// Owned by exactly one watcher; entries are never removed.
#[derive(Debug, Clone)]
pub struct DedupLedger {
    edit_limit: u8,
    entries: HashMap<DedupKey, u8>,
    handled: HashSet<String>,
    handled_order: VecDeque<String>,
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::new(DEFAULT_EDIT_LIMIT)
    }
}

impl DedupLedger {
    /// Creates an empty ledger granting `edit_limit` corrections per key.
    #[must_use]
    pub fn new(edit_limit: u8) -> Self {
        Self {
            edit_limit,
            entries: HashMap::new(),
            handled: HashSet::new(),
            handled_order: VecDeque::new(),
        }
    }

    /// Corrections granted to a fresh submission.
    #[must_use]
    pub const fn edit_limit(&self) -> u8 {
        self.edit_limit
    }

    /// Remaining corrections for `key`, or `None` if never accepted.
    #[must_use]
    pub fn remaining(&self, key: &DedupKey) -> Option<u8> {
        self.entries.get(key).copied()
    }

    /// Records a first accepted submission.
    pub fn record_new(&mut self, key: DedupKey) {
        self.entries.insert(key, self.edit_limit);
    }

    /// Spends one correction. Returns the count left afterwards.
    ///
    /// A key with no entry or no edits left is unchanged.
    pub fn record_correction(&mut self, key: &DedupKey) -> Option<u8> {
        let remaining = self.entries.get_mut(key)?;
        *remaining = remaining.saturating_sub(1);
        Some(*remaining)
    }

    /// Whether the letter identified by `letter_id` was already answered.
    #[must_use]
    pub fn is_handled(&self, letter_id: &str) -> bool {
        self.handled.contains(letter_id)
    }

    /// Remembers an answered letter so a refetch is skipped.
    pub fn mark_handled(&mut self, letter_id: &str) {
        if !self.handled.insert(letter_id.to_string()) {
            return;
        }
        self.handled_order.push_back(letter_id.to_string());
        if self.handled_order.len() > HANDLED_LETTERS
            && let Some(oldest) = self.handled_order.pop_front()
        {
            self.handled.remove(&oldest);
        }
    }

    /// Number of tracked submissions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing has been accepted yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
