//! Per-handle command queue.

use std::collections::HashMap;

use tether_shared::ObjectHandle;

use crate::error::{BridgeError, BridgeResult};
use crate::protocol::{encode_command, Arg};

/// A command waiting for the next message flush.
#[derive(Clone, Debug, PartialEq)]
pub struct PendingMessage {
    /// Command name.
    pub command: String,
    /// Arguments, kept typed until flush.
    pub args: Vec<Arg>,
}

impl PendingMessage {
    /// Creates a pending message.
    #[must_use]
    pub fn new(command: impl Into<String>, args: Vec<Arg>) -> Self {
        Self {
            command: command.into(),
            args,
        }
    }

    /// Encodes as one text command.
    #[must_use]
    pub fn encode(&self) -> String {
        encode_command(&self.command, &self.args)
    }
}

/// Pending commands grouped by handle.
///
/// Handles flush in the order they were first mentioned since the last
/// flush; each handle's commands flush in arrival order.
#[derive(Debug, Default)]
pub struct CommandQueue {
    /// Handles in first-mention order.
    order: Vec<ObjectHandle>,
    /// Commands per handle.
    by_handle: HashMap<ObjectHandle, Vec<PendingMessage>>,
    /// Total pending commands.
    pending: usize,
    /// Bound on `pending`; zero for unbounded.
    limit: usize,
}

impl CommandQueue {
    /// Creates an unbounded queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a queue holding at most `limit` commands (zero: unbounded).
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Appends a command for `handle`.
    ///
    /// # Errors
    ///
    /// [`BridgeError::QueueFull`] if the queue is bounded and full. The
    /// command is dropped.
    pub fn enqueue(&mut self, handle: ObjectHandle, message: PendingMessage) -> BridgeResult<()> {
        if self.limit > 0 && self.pending >= self.limit {
            return Err(BridgeError::QueueFull {
                handle,
                command: message.command,
                limit: self.limit,
            });
        }
        let queue = self.by_handle.entry(handle).or_insert_with(|| {
            self.order.push(handle);
            Vec::new()
        });
        queue.push(message);
        self.pending += 1;
        Ok(())
    }

    /// Drops every pending command for `handle`. Returns how many went.
    pub fn purge(&mut self, handle: ObjectHandle) -> usize {
        let Some(dropped) = self.by_handle.remove(&handle) else {
            return 0;
        };
        self.order.retain(|h| *h != handle);
        self.pending -= dropped.len();
        dropped.len()
    }

    /// Empties the queue, returning commands in flush order.
    ///
    /// Anything enqueued afterwards belongs to the next flush.
    pub fn take(&mut self) -> Vec<(ObjectHandle, Vec<PendingMessage>)> {
        let order = std::mem::take(&mut self.order);
        let mut by_handle = std::mem::take(&mut self.by_handle);
        self.pending = 0;
        order
            .into_iter()
            .filter_map(|handle| by_handle.remove(&handle).map(|msgs| (handle, msgs)))
            .collect()
    }

    /// Total pending commands.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.pending
    }

    /// True if nothing is pending.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.pending == 0
    }

    /// Pending commands for one handle.
    #[must_use]
    pub fn pending_for(&self, handle: ObjectHandle) -> usize {
        self.by_handle.get(&handle).map_or(0, Vec::len)
    }

    /// Configured bound (zero: unbounded).
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(name: &str) -> PendingMessage {
        PendingMessage::new(name, Vec::new())
    }

    fn names(taken: &[(ObjectHandle, Vec<PendingMessage>)]) -> Vec<String> {
        taken
            .iter()
            .flat_map(|(h, msgs)| msgs.iter().map(move |m| format!("{h}:{}", m.command)))
            .collect()
    }

    #[test]
    fn test_per_handle_fifo() {
        let mut queue = CommandQueue::new();
        let h = ObjectHandle(7);
        for name in ["A", "B", "C"] {
            queue.enqueue(h, msg(name)).unwrap();
        }
        assert_eq!(names(&queue.take()), vec!["7:A", "7:B", "7:C"]);
    }

    #[test]
    fn test_first_mention_order_across_handles() {
        let mut queue = CommandQueue::new();
        queue.enqueue(ObjectHandle(300), msg("a")).unwrap();
        queue.enqueue(ObjectHandle(101), msg("b")).unwrap();
        queue.enqueue(ObjectHandle(300), msg("c")).unwrap();
        assert_eq!(queue.len(), 3);
        assert_eq!(names(&queue.take()), vec!["300:a", "300:c", "101:b"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_purge() {
        let mut queue = CommandQueue::new();
        queue.enqueue(ObjectHandle(1), msg("x")).unwrap();
        queue.enqueue(ObjectHandle(2), msg("y")).unwrap();
        queue.enqueue(ObjectHandle(1), msg("z")).unwrap();

        assert_eq!(queue.purge(ObjectHandle(1)), 2);
        assert_eq!(queue.purge(ObjectHandle(1)), 0);
        assert_eq!(queue.len(), 1);
        assert_eq!(names(&queue.take()), vec!["2:y"]);
    }

    #[test]
    fn test_purged_handle_mentioned_again_goes_last() {
        let mut queue = CommandQueue::new();
        queue.enqueue(ObjectHandle(1), msg("x")).unwrap();
        queue.enqueue(ObjectHandle(2), msg("y")).unwrap();
        queue.purge(ObjectHandle(1));
        queue.enqueue(ObjectHandle(1), msg("destroyObject")).unwrap();
        assert_eq!(names(&queue.take()), vec!["2:y", "1:destroyObject"]);
    }

    #[test]
    fn test_bound_drops_excess() {
        let mut queue = CommandQueue::with_limit(2);
        queue.enqueue(ObjectHandle(1), msg("a")).unwrap();
        queue.enqueue(ObjectHandle(1), msg("b")).unwrap();
        let err = queue.enqueue(ObjectHandle(2), msg("c")).unwrap_err();
        assert!(matches!(err, BridgeError::QueueFull { limit: 2, .. }));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.pending_for(ObjectHandle(2)), 0);

        queue.take();
        assert!(queue.enqueue(ObjectHandle(2), msg("c")).is_ok());
    }
}
