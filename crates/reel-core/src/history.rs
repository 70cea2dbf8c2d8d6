//! Generic undo/redo stack with atomic current-state publication
//!
//! [`StateHistory`] keeps every state a value has ever had (the states are
//! persistent, so this is cheap) and publishes the current one through a
//! `basedrop::SharedCell`. Writers mutate the stacks behind whatever lock
//! their owner provides; readers on the audio thread only ever touch the
//! cell, which is a lock-free pointer load.

use std::collections::VecDeque;
use std::sync::Arc;

use basedrop::{Handle, Shared, SharedCell};

use crate::gc::gc_handle;

/// Undo/redo stacks plus the atomically published current state
///
/// Invariants: the undo stack is never empty (it is seeded with the initial
/// state and the initial state cannot be undone away), the published state
/// is always the back of the undo stack, and pushing a new state clears the
/// redo stack.
pub struct StateHistory<T> {
    undo: VecDeque<Shared<T>>,
    redo: VecDeque<Shared<T>>,
    current: Arc<SharedCell<T>>,
    handle: Handle,
}

impl<T: Send + Sync + 'static> StateHistory<T> {
    /// Seed the history with its initial state
    pub fn new(initial: T) -> Self {
        let handle = gc_handle();
        let first = Shared::new(&handle, initial);
        let current = Arc::new(SharedCell::new(first.clone()));
        let mut undo = VecDeque::new();
        undo.push_back(first);
        Self {
            undo,
            redo: VecDeque::new(),
            current,
            handle,
        }
    }

    /// Append a new state and publish it; discards any redo states
    pub fn push(&mut self, state: T) {
        let state = Shared::new(&self.handle, state);
        self.redo.clear();
        self.undo.push_back(state.clone());
        self.current.set(state);
    }

    /// Step back one state; returns false when only the initial state is left
    pub fn undo(&mut self) -> bool {
        if self.undo.len() <= 1 {
            return false;
        }
        if let Some(state) = self.undo.pop_back() {
            self.redo.push_front(state);
        }
        if let Some(state) = self.undo.back() {
            self.current.set(state.clone());
        }
        true
    }

    /// Step forward one state; returns false when there is nothing to redo
    pub fn redo(&mut self) -> bool {
        match self.redo.pop_front() {
            Some(state) => {
                self.undo.push_back(state.clone());
                self.current.set(state);
                true
            }
            None => false,
        }
    }

    pub fn can_undo(&self) -> bool {
        self.undo.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// The current state
    pub fn current(&self) -> Shared<T> {
        self.current.get()
    }

    /// A handle other threads can read the current state through without
    /// taking the owner's lock
    pub fn reader(&self) -> Arc<SharedCell<T>> {
        Arc::clone(&self.current)
    }

    /// Number of states that can be undone
    pub fn undo_depth(&self) -> usize {
        self.undo.len() - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_initial_state_is_floor_protected() {
        let mut h = StateHistory::new(1);
        assert!(!h.can_undo());
        assert!(!h.undo());
        assert_eq!(*h.current(), 1);
    }

    #[test]
    fn test_push_undo_redo() {
        let mut h = StateHistory::new(1);
        h.push(2);
        h.push(3);
        assert_eq!(*h.current(), 3);
        assert_eq!(h.undo_depth(), 2);

        assert!(h.undo());
        assert_eq!(*h.current(), 2);
        assert!(h.can_redo());

        assert!(h.redo());
        assert_eq!(*h.current(), 3);
        assert!(!h.can_redo());
    }

    #[test]
    fn test_push_clears_redo() {
        let mut h = StateHistory::new(1);
        h.push(2);
        assert!(h.undo());
        h.push(5);
        assert!(!h.can_redo());
        assert!(!h.redo());
        assert_eq!(*h.current(), 5);
        // The discarded branch is gone; undo goes back to the initial state
        assert!(h.undo());
        assert_eq!(*h.current(), 1);
    }

    #[test]
    fn test_reader_tracks_publication() {
        let mut h = StateHistory::new(10);
        let reader = h.reader();
        assert_eq!(*reader.get(), 10);
        h.push(20);
        assert_eq!(*reader.get(), 20);
        h.undo();
        assert_eq!(*reader.get(), 10);
    }
}
