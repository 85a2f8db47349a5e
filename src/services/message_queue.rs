//! Sequential message dispatcher
//!
//! Serializes programmatically generated messages (multi-step workflows)
//! through the send path one at a time. The head is removed only after its
//! send resolves, so no two queued messages are ever in flight together;
//! concurrent sends would race on the conversation's message list.

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;

use crate::models::Message;

use super::chat_controller::SendOutcome;

/// Pending messages shared between the queue and the controller (which
/// clears it when a send is aborted).
pub type PendingMessages = Arc<Mutex<VecDeque<Message>>>;

/// Destination for dispatched messages. Implemented by `ChatController`
/// with `delete_count = 0` and no plugin.
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: Message) -> SendOutcome;
}

pub struct MessageQueue {
    pending: PendingMessages,
    notify: Notify,
}

impl MessageQueue {
    pub fn new() -> Self {
        Self {
            pending: Arc::new(Mutex::new(VecDeque::new())),
            notify: Notify::new(),
        }
    }

    /// Handle to the shared deque, given to the controller so an abort can
    /// clear pending workflow steps.
    pub fn pending_handle(&self) -> PendingMessages {
        self.pending.clone()
    }

    pub fn enqueue(&self, messages: Vec<Message>) {
        if messages.is_empty() {
            return;
        }
        self.pending.lock().extend(messages);
        self.notify.notify_one();
    }

    pub fn clear(&self) {
        self.pending.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Dispatch queued messages until the queue is empty, strictly FIFO and
    /// strictly serial. An aborted send clears the remainder: downstream
    /// steps may assume context the aborted turn never established.
    pub async fn drain<S: MessageSink + ?Sized>(&self, sink: &S) {
        loop {
            let Some(head) = self.pending.lock().front().cloned() else {
                break;
            };

            let outcome = sink.deliver(head).await;

            match outcome {
                SendOutcome::Aborted => {
                    debug!("Queued send aborted, clearing remaining messages");
                    self.clear();
                    break;
                }
                _ => {
                    self.pending.lock().pop_front();
                }
            }
        }
    }

    /// Long-running dispatcher: waits for enqueued messages and drains them.
    /// Spawn this on the runtime; it never returns.
    pub async fn run<S: MessageSink + ?Sized>(&self, sink: &S) {
        loop {
            let notified = self.notify.notified();
            if self.is_empty() {
                notified.await;
            }
            self.drain(sink).await;
        }
    }
}

impl Default for MessageQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;

    use super::*;

    /// Records delivery order and asserts no two deliveries overlap.
    struct RecordingSink {
        delivered: Mutex<Vec<String>>,
        in_flight: AtomicBool,
        outcomes: Mutex<VecDeque<SendOutcome>>,
    }

    impl RecordingSink {
        fn new(outcomes: Vec<SendOutcome>) -> Self {
            Self {
                delivered: Mutex::new(Vec::new()),
                in_flight: AtomicBool::new(false),
                outcomes: Mutex::new(outcomes.into_iter().collect()),
            }
        }

        fn completed() -> SendOutcome {
            SendOutcome::Completed {
                text: String::new(),
            }
        }
    }

    #[async_trait]
    impl MessageSink for RecordingSink {
        async fn deliver(&self, message: Message) -> SendOutcome {
            assert!(
                !self.in_flight.swap(true, Ordering::SeqCst),
                "two sends overlapped"
            );
            tokio::time::sleep(Duration::from_millis(2)).await;
            self.delivered.lock().push(message.content.clone());
            self.in_flight.store(false, Ordering::SeqCst);

            self.outcomes
                .lock()
                .pop_front()
                .unwrap_or_else(RecordingSink::completed)
        }
    }

    #[tokio::test]
    async fn test_drain_is_strictly_fifo_and_serial() {
        let queue = MessageQueue::new();
        let sink = RecordingSink::new(vec![]);

        queue.enqueue(vec![
            Message::automation("one"),
            Message::automation("two"),
            Message::automation("three"),
        ]);
        queue.drain(&sink).await;

        assert_eq!(*sink.delivered.lock(), vec!["one", "two", "three"]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_abort_clears_remaining_queue() {
        let queue = MessageQueue::new();
        let sink = RecordingSink::new(vec![SendOutcome::Aborted]);

        queue.enqueue(vec![
            Message::automation("one"),
            Message::automation("two"),
            Message::automation("three"),
        ]);
        queue.drain(&sink).await;

        // Only the first was attempted; the rest were discarded
        assert_eq!(*sink.delivered.lock(), vec!["one"]);
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_failed_send_pops_and_continues() {
        let queue = MessageQueue::new();
        let sink = RecordingSink::new(vec![SendOutcome::Failed {
            message: "Bad Gateway".to_string(),
        }]);

        queue.enqueue(vec![Message::automation("one"), Message::automation("two")]);
        queue.drain(&sink).await;

        assert_eq!(*sink.delivered.lock(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_drain_on_empty_queue_is_noop() {
        let queue = MessageQueue::new();
        let sink = RecordingSink::new(vec![]);
        queue.drain(&sink).await;
        assert!(sink.delivered.lock().is_empty());
    }

    #[tokio::test]
    async fn test_enqueue_nothing_does_not_notify() {
        let queue = MessageQueue::new();
        queue.enqueue(vec![]);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_run_picks_up_later_enqueues() {
        let queue = Arc::new(MessageQueue::new());
        let sink = Arc::new(RecordingSink::new(vec![]));

        let runner = {
            let queue = queue.clone();
            let sink = sink.clone();
            tokio::spawn(async move { queue.run(sink.as_ref()).await })
        };

        queue.enqueue(vec![Message::automation("late")]);

        // Give the dispatcher a moment to pick the message up
        for _ in 0..50 {
            if !sink.delivered.lock().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        assert_eq!(*sink.delivered.lock(), vec!["late"]);
        runner.abort();
    }
}
