//! Bounded conversation memory.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// One completed question and answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub response: String,
}

impl Turn {
    pub fn new(question: impl Into<String>, response: impl Into<String>) -> Self {
        Self { question: question.into(), response: response.into() }
    }
}

/// The last `capacity` turns of a session, oldest first.
///
/// Pushing onto a full memory evicts the oldest turn. Memory lives only as
/// long as its session.
#[derive(Debug, Clone)]
pub struct ConversationMemory {
    capacity: usize,
    turns: VecDeque<Turn>,
}

impl ConversationMemory {
    /// A memory holding at most `capacity` turns (at least one).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { capacity, turns: VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, turn: Turn) {
        if self.turns.len() == self.capacity {
            self.turns.pop_front();
        }
        self.turns.push_back(turn);
    }

    pub fn turns(&self) -> impl Iterator<Item = &Turn> {
        self.turns.iter()
    }

    /// Owned copy of the turns, oldest first.
    pub fn snapshot(&self) -> Vec<Turn> {
        self.turns.iter().cloned().collect()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }
}
