use std::collections::VecDeque;
use std::fmt::Debug;

use tokio::sync::mpsc;
use tracing::debug;

use crate::error::HistoryError;

/// Values with a stable identity, used to detect no-op pushes.
pub trait Identified {
    type Id: PartialEq + Debug;

    fn identity(&self) -> Self::Id;
}

/// Bounded undo/redo history with a single cursor.
///
/// The cursor is `None` when no state is active (position -1). Pushing
/// after an undo discards the redo branch. Every call that changes the
/// entries or the cursor publishes the new current value, once, to the
/// subscriber installed with [`EditStack::subscribe`].
pub struct EditStack<T: Identified + Clone> {
    entries: VecDeque<T>,
    cursor: Option<usize>,
    limit: Option<usize>,
    subscriber: Option<mpsc::UnboundedSender<Option<T>>>,
}

impl<T: Identified + Clone> Default for EditStack<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Identified + Clone> EditStack<T> {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            cursor: None,
            limit: None,
            subscriber: None,
        }
    }

    /// A stack that keeps at most `limit` states, evicting the oldest.
    /// A limit of zero means unbounded.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: (limit > 0).then_some(limit),
            ..Self::new()
        }
    }

    /// Install the single subscriber, replacing any previous one.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<Option<T>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscriber = Some(tx);
        rx
    }

    pub fn push(&mut self, state: T) -> Result<(), HistoryError> {
        if let Some(current) = self.current_ref()
            && current.identity() == state.identity()
        {
            return Err(HistoryError::EmptyOperation);
        }

        let keep = self.cursor.map_or(0, |c| c + 1);
        if keep < self.entries.len() {
            debug!(dropped = self.entries.len() - keep, "truncating redo branch");
            self.entries.truncate(keep);
        }

        self.entries.push_back(state);
        if let Some(limit) = self.limit {
            while self.entries.len() > limit {
                self.entries.pop_front();
            }
        }
        self.cursor = Some(self.entries.len() - 1);
        self.publish();
        Ok(())
    }

    /// Step back one state. At position -1 this is a no-op.
    pub fn undo(&mut self) -> Option<T> {
        match self.cursor {
            None => None,
            Some(0) => {
                self.cursor = None;
                self.publish();
                None
            }
            Some(c) => {
                self.cursor = Some(c - 1);
                self.publish();
                self.current()
            }
        }
    }

    /// Step forward one state. At the last entry this is a no-op.
    pub fn redo(&mut self) -> Option<T> {
        if self.reached_end() {
            return self.current();
        }
        self.cursor = Some(self.cursor.map_or(0, |c| c + 1));
        self.publish();
        self.current()
    }

    /// Remove the newest entry, keeping the cursor in bounds.
    pub fn pop(&mut self) -> Option<T> {
        let removed = self.entries.pop_back()?;
        let last = self.entries.len().checked_sub(1);
        self.cursor = match (self.cursor, last) {
            (Some(c), Some(last)) => Some(c.min(last)),
            _ => None,
        };
        self.publish();
        Some(removed)
    }

    pub fn clear(&mut self) {
        if self.entries.is_empty() {
            return;
        }
        self.entries.clear();
        self.cursor = None;
        self.publish();
    }

    pub fn current(&self) -> Option<T> {
        self.current_ref().cloned()
    }

    pub fn get(&self, index: usize) -> Option<T> {
        self.entries.get(index).cloned()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// Cursor as a signed position, -1 when nothing is active.
    pub fn position(&self) -> isize {
        self.cursor.map_or(-1, |c| c as isize)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// True iff the cursor is on the last entry (or both are at -1).
    pub fn reached_end(&self) -> bool {
        self.position() == self.entries.len() as isize - 1
    }

    pub fn can_undo(&self) -> bool {
        self.cursor.is_some()
    }

    pub fn can_redo(&self) -> bool {
        !self.reached_end()
    }

    fn current_ref(&self) -> Option<&T> {
        self.cursor.and_then(|c| self.entries.get(c))
    }

    fn publish(&mut self) {
        let Some(tx) = &self.subscriber else {
            return;
        };
        if tx.send(self.current()).is_err() {
            debug!("history subscriber closed");
            self.subscriber = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, Debug, PartialEq)]
    struct S(&'static str);

    impl Identified for S {
        type Id = &'static str;

        fn identity(&self) -> &'static str {
            self.0
        }
    }

    fn stack(items: &[&'static str]) -> EditStack<S> {
        let mut stack = EditStack::new();
        for &item in items {
            stack.push(S(item)).unwrap();
        }
        stack
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<Option<S>>) -> Vec<Option<S>> {
        let mut out = Vec::new();
        while let Ok(v) = rx.try_recv() {
            out.push(v);
        }
        out
    }

    #[test]
    fn push_after_undo_truncates_redo_branch() {
        let mut stack = stack(&["A", "B", "C"]);
        assert_eq!(stack.undo(), Some(S("B")));
        assert_eq!(stack.cursor(), Some(1));

        stack.push(S("D")).unwrap();
        let items: Vec<_> = (0..stack.len()).filter_map(|i| stack.get(i)).collect();
        assert_eq!(items, vec![S("A"), S("B"), S("D")]);
        assert_eq!(stack.cursor(), Some(2));
        assert!(stack.reached_end());
    }

    #[test]
    fn undo_on_empty_is_noop() {
        let mut stack: EditStack<S> = EditStack::new();
        assert_eq!(stack.undo(), None);
        assert_eq!(stack.position(), -1);
        assert!(stack.reached_end());
    }

    #[test]
    fn undo_down_to_no_state() {
        let mut stack = stack(&["A"]);
        assert_eq!(stack.undo(), None);
        assert_eq!(stack.position(), -1);
        assert_eq!(stack.current(), None);
        assert_eq!(stack.undo(), None);
        assert_eq!(stack.position(), -1);
        assert_eq!(stack.redo(), Some(S("A")));
    }

    #[test]
    fn redo_at_end_is_noop() {
        let mut stack = stack(&["A", "B"]);
        assert_eq!(stack.redo(), Some(S("B")));
        assert_eq!(stack.cursor(), Some(1));
    }

    #[test]
    fn cursor_stays_in_bounds() {
        let mut stack = stack(&["A", "B", "C"]);
        // Deterministic mix of operations.
        let ops = b"uuuuurrrruupdpuurrrrpppp";
        let mut next = 0;
        for op in ops {
            match op {
                b'u' => {
                    stack.undo();
                }
                b'r' => {
                    stack.redo();
                }
                b'p' => {
                    stack.pop();
                }
                _ => {
                    next += 1;
                    let name: &'static str = ["D", "E", "F"][next % 3];
                    let _ = stack.push(S(name));
                }
            }
            let pos = stack.position();
            assert!(pos >= -1 && pos <= stack.len() as isize - 1, "{pos} / {}", stack.len());
        }
    }

    #[test]
    fn identical_push_is_rejected() {
        let mut stack = stack(&["A"]);
        let mut rx = stack.subscribe();
        assert_eq!(stack.push(S("A")), Err(HistoryError::EmptyOperation));
        assert_eq!(stack.len(), 1);
        assert!(drain(&mut rx).is_empty());
    }

    #[test]
    fn identical_push_after_undo_keeps_redo_branch() {
        let mut stack = stack(&["A", "B"]);
        stack.undo();
        assert_eq!(stack.push(S("A")), Err(HistoryError::EmptyOperation));
        assert_eq!(stack.len(), 2);
        assert!(stack.can_redo());
    }

    #[test]
    fn limit_evicts_oldest() {
        let mut stack = EditStack::with_limit(2);
        for s in ["A", "B", "C"] {
            stack.push(S(s)).unwrap();
        }
        assert_eq!(stack.len(), 2);
        assert_eq!(stack.get(0), Some(S("B")));
        assert_eq!(stack.current(), Some(S("C")));
        assert_eq!(stack.cursor(), Some(1));
    }

    #[test]
    fn pop_clamps_cursor() {
        let mut stack = stack(&["A", "B"]);
        assert_eq!(stack.pop(), Some(S("B")));
        assert_eq!(stack.cursor(), Some(0));
        assert_eq!(stack.pop(), Some(S("A")));
        assert_eq!(stack.cursor(), None);
        assert_eq!(stack.pop(), None);
    }

    #[test]
    fn publishes_once_per_mutation() {
        let mut stack: EditStack<S> = EditStack::new();
        let mut rx = stack.subscribe();

        stack.push(S("A")).unwrap();
        stack.push(S("B")).unwrap();
        stack.undo();
        stack.undo();
        stack.undo(); // clamped
        stack.redo();
        stack.redo();
        stack.redo(); // clamped

        assert_eq!(
            drain(&mut rx),
            vec![
                Some(S("A")),
                Some(S("B")),
                Some(S("A")),
                None,
                Some(S("A")),
                Some(S("B")),
            ]
        );
    }

    #[test]
    fn clear_publishes_absence() {
        let mut stack = stack(&["A"]);
        let mut rx = stack.subscribe();
        stack.clear();
        stack.clear();
        assert_eq!(drain(&mut rx), vec![None]);
        assert!(stack.is_empty());
        assert!(!stack.can_undo());
    }

    #[test]
    fn closed_subscriber_is_dropped() {
        let mut stack: EditStack<S> = EditStack::new();
        drop(stack.subscribe());
        stack.push(S("A")).unwrap();
        assert!(stack.subscriber.is_none());
    }
}
