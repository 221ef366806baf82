//! Bounded undo log over a [`MarkStore`]
//!
//! Fixed capacity: pushing past it drops the oldest entry. Undo always
//! pops the newest one.

use crate::marks::{Mark, MarkFields, MarkId};
use crate::store::MarkStore;
use std::collections::VecDeque;

pub const DEFAULT_UNDO_CAPACITY: usize = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum UndoAction {
    /// A mark was added to `page`.
    Add { page: u32, id: MarkId },
    /// `mark` was removed from `page`.
    Delete { page: u32, mark: Mark },
    /// The mark's fields were edited; `before` is the prior snapshot.
    Edit { id: MarkId, before: MarkFields },
    /// The mark was moved away from `before`.
    Move { id: MarkId, before: (f64, f64) },
}

impl UndoAction {
    /// Apply the inverse of this action to `store`.
    fn revert(self, store: &mut MarkStore) {
        match self {
            UndoAction::Add { page, id } => {
                store.remove_mark(page, id);
            }
            UndoAction::Delete { page, mark } => {
                store.restore_mark(page, mark);
            }
            UndoAction::Edit { id, before } => {
                if let Some(mark) = store.mark_mut(id) {
                    mark.apply(before);
                }
            }
            UndoAction::Move { id, before } => {
                if let Some(mark) = store.mark_mut(id) {
                    mark.set_position(before.0, before.1);
                }
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct UndoLog {
    actions: VecDeque<UndoAction>,
    capacity: usize,
}

impl Default for UndoLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_UNDO_CAPACITY)
    }
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            actions: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn push(&mut self, action: UndoAction) {
        self.actions.push_back(action);
        while self.actions.len() > self.capacity {
            self.actions.pop_front();
        }
    }

    /// Revert the most recent action. Returns `false` if there was none.
    pub fn undo(&mut self, store: &mut MarkStore) -> bool {
        match self.actions.pop_back() {
            Some(action) => {
                tracing::debug!("Undoing {:?}", action);
                action.revert(store);
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
