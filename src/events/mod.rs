pub mod queue;
pub mod types;

pub use queue::{event_queue, EventReceiver, EventSender, QueueClosed, WeakEventSender};
pub use types::{Event, RuntimeEvent, RuntimeEventKind};
