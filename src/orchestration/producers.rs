//! Background tasks feeding the event queue.
//!
//! Producers only enqueue. Each one runs until its cancellation token fires
//! or the queue closes, whichever comes first.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::events::{Event, EventSender, RuntimeEvent};
use crate::runtime::ContainerRuntime;

/// Enqueue a tick every `interval`, the first one after a full interval
pub fn spawn_ticker(
    sender: EventSender,
    interval: Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval_at(time::Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if sender.send(Event::Tick).is_err() {
                        break;
                    }
                }
            }
        }
        debug!("Ticker stopped");
    })
}

/// Enqueue an interrupt for every Ctrl-C
pub fn spawn_interrupt_listener(sender: EventSender, cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                signal = tokio::signal::ctrl_c() => match signal {
                    Ok(()) => {
                        info!("🛑 Interrupt received");
                        if sender.send(Event::Interrupt).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Cannot listen for interrupts");
                        break;
                    }
                },
            }
        }
        debug!("Interrupt listener stopped");
    })
}

/// Forward runtime lifecycle events until the stream ends or fails
pub fn spawn_event_subscriber(
    runtime: Arc<dyn ContainerRuntime>,
    sender: EventSender,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let forward = |event: RuntimeEvent| {
            let _ = sender.send(event);
        };
        match runtime.subscribe_events(cancel, &forward).await {
            Ok(()) => debug!("Runtime event subscription ended"),
            Err(e) => warn!(error = %e, "Runtime event subscription failed"),
        }
    })
}

/// Forward the output of one container, tagged with its declared name
pub fn spawn_log_follower(
    runtime: Arc<dyn ContainerRuntime>,
    runtime_id: String,
    container: String,
    sender: EventSender,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let forward = |line: String| {
            let _ = sender.send(Event::Log {
                container: container.clone(),
                line,
            });
        };
        match runtime.read_logs(&runtime_id, cancel, &forward).await {
            Ok(()) => debug!(container = %container, "Log stream ended"),
            Err(e) => debug!(container = %container, error = %e, "Log stream failed"),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{event_queue, RuntimeEventKind};
    use crate::runtime::fake::{FakeBehavior, FakeRuntime};
    use crate::runtime::{CreateRequest, LABEL_CONTAINER};

    #[tokio::test(start_paused = true)]
    async fn test_ticker_ticks_until_cancelled() {
        let (sender, mut receiver) = event_queue();
        let cancel = CancellationToken::new();
        let handle = spawn_ticker(sender, Duration::from_millis(100), cancel.clone());

        time::sleep(Duration::from_millis(350)).await;
        cancel.cancel();
        handle.await.unwrap();

        let mut ticks = 0;
        while let Some(event) = receiver.try_recv() {
            assert_eq!(event, Event::Tick);
            ticks += 1;
        }
        assert_eq!(ticks, 3);
    }

    #[tokio::test]
    async fn test_subscriber_forwards_runtime_events() {
        let runtime = FakeRuntime::new();
        runtime.inject(RuntimeEvent::new(RuntimeEventKind::ContainerStart, "fake-9"));
        runtime.fail_stream("gone");

        let (sender, mut receiver) = event_queue();
        spawn_event_subscriber(Arc::new(runtime), sender, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(receiver.recv().await.unwrap().id(), Some("fake-9"));
        assert_eq!(receiver.recv().await.unwrap().event_type(), "error");
        // the subscriber task dropped its sender
        assert_eq!(receiver.recv().await, None);
    }

    #[tokio::test]
    async fn test_log_follower_tags_lines() {
        let runtime = FakeRuntime::new()
            .with_behavior("db", FakeBehavior::new().with_logs(["ready", "accepting"]));
        let request = CreateRequest {
            name: "testdrive_x_db".to_string(),
            image: "postgres".to_string(),
            labels: [(LABEL_CONTAINER.to_string(), "db".to_string())].into(),
            ..Default::default()
        };
        let runtime_id = runtime.create_container(&request).await.unwrap();

        let (sender, mut receiver) = event_queue();
        let cancel = CancellationToken::new();
        let handle = spawn_log_follower(
            Arc::new(runtime),
            runtime_id,
            "db".to_string(),
            sender,
            cancel.clone(),
        );

        for expected in ["ready", "accepting"] {
            assert_eq!(
                receiver.recv().await,
                Some(Event::Log {
                    container: "db".to_string(),
                    line: expected.to_string(),
                })
            );
        }
        cancel.cancel();
        handle.await.unwrap();
    }
}
