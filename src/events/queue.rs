use tokio::sync::mpsc;

use super::types::Event;

/// Create the unbounded FIFO queue feeding the session loop
pub fn event_queue() -> (EventSender, EventReceiver) {
    let (sender, receiver) = mpsc::unbounded_channel();
    (EventSender { sender }, EventReceiver { receiver })
}

/// Producer handle; cheap to clone, one per background task
#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::UnboundedSender<Event>,
}

impl EventSender {
    /// Enqueue an event; fails only once the receiving session is gone
    pub fn send(&self, event: impl Into<Event>) -> Result<(), QueueClosed> {
        self.sender.send(event.into()).map_err(|_| QueueClosed)
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Handle that does not keep the queue open
    pub fn downgrade(&self) -> WeakEventSender {
        WeakEventSender {
            sender: self.sender.downgrade(),
        }
    }
}

/// Non-owning producer handle; upgrades only while a strong sender exists
#[derive(Debug, Clone)]
pub struct WeakEventSender {
    sender: mpsc::WeakUnboundedSender<Event>,
}

impl WeakEventSender {
    pub fn upgrade(&self) -> Option<EventSender> {
        self.sender.upgrade().map(|sender| EventSender { sender })
    }
}

/// The single consumer side, owned by the session
#[derive(Debug)]
pub struct EventReceiver {
    receiver: mpsc::UnboundedReceiver<Event>,
}

impl EventReceiver {
    /// Wait for the next event; `None` once every sender is dropped
    pub async fn recv(&mut self) -> Option<Event> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Event> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("Event queue is closed")]
pub struct QueueClosed;
