use crate::common::*;
use testdrive::events::EventSender;
use testdrive::runtime::fake::{FakeBehavior, FakeRuntime};
use testdrive::{ContainerStatus, Event, Phase};

/// Deliver `count` interrupts, `gap` apart, starting after one gap
fn interrupt_later(sender: EventSender, count: usize, gap: std::time::Duration) {
    tokio::spawn(async move {
        for _ in 0..count {
            tokio::time::sleep(gap).await;
            if sender.send(Event::Interrupt).is_err() {
                return;
            }
        }
    });
}

#[tokio::test(start_paused = true)]
async fn test_single_interrupt_tears_down_cleanly() {
    // itest never exits by itself
    let mut harness = Harness::new(DB_APP_ITEST, FakeRuntime::new());
    interrupt_later(harness.session.sender().expect("queue is open"), 1, millis(100));

    let outcome = harness.run().await;

    assert!(!outcome.aborted);
    assert!(outcome.failed.is_empty());
    assert_eq!(harness.session.phase(), Phase::Terminated);
    for name in ["db", "app", "itest"] {
        harness.position(stop(name));
        assert_eq!(
            harness.session.model().status_of(name),
            Some(ContainerStatus::Destroyed)
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_third_interrupt_abandons_stuck_teardown() {
    let runtime = FakeRuntime::new().with_behavior(
        "db",
        FakeBehavior::new().failing_stop().failing_destroy(),
    );
    let mut harness = Harness::new(DB_APP_ITEST, runtime);
    interrupt_later(harness.session.sender().expect("queue is open"), 3, millis(100));

    let outcome = harness.run().await;

    assert!(outcome.aborted);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(
        harness.session.transitions(),
        &[Phase::Startup, Phase::Running, Phase::Shutdown, Phase::Cleanup]
    );

    // teardown carried on past db and settled everything else
    let model = harness.session.model();
    assert_eq!(model.status_of("db"), Some(ContainerStatus::Destroying));
    assert_eq!(model.status_of("app"), Some(ContainerStatus::Destroyed));
    assert_eq!(model.status_of("itest"), Some(ContainerStatus::Destroyed));
    assert_eq!(harness.runtime.observed_state("db").as_deref(), Some("running"));
}

#[tokio::test(start_paused = true)]
async fn test_second_interrupt_cleans_up_while_stopping() {
    // db never confirms its stop, so it is still Stopping at the second interrupt
    let runtime = FakeRuntime::new().with_behavior("db", FakeBehavior::new().silent());
    let mut harness = Harness::new(DB_APP_ITEST, runtime);
    let sender = harness.session.sender().expect("queue is open");
    tokio::spawn(async move {
        tokio::time::sleep(millis(8000)).await;
        let _ = sender.send(Event::Interrupt);
        tokio::time::sleep(millis(100)).await;
        let _ = sender.send(Event::Interrupt);
    });

    let outcome = harness.run().await;

    assert!(!outcome.aborted);
    assert!(outcome.failed.is_empty());
    assert_eq!(
        harness.session.transitions(),
        &[
            Phase::Startup,
            Phase::Running,
            Phase::Shutdown,
            Phase::Cleanup,
            Phase::Terminated
        ]
    );

    // destroy followed the stop well inside the event timeout, before state
    // sync could have settled db as Stopped
    let db = harness.session.model().get("db").expect("db is declared");
    let stopping_since = db.timestamps.stop_started_at.expect("db was stopped");
    let destroying_since = db.timestamps.destroy_started_at.expect("db was destroyed");
    assert!(destroying_since.duration_since(stopping_since) < millis(1000));
    assert!(harness.position(stop("db")) < harness.position(destroy("db")));

    for name in ["db", "app", "itest"] {
        assert_eq!(
            harness.session.model().status_of(name),
            Some(ContainerStatus::Destroyed)
        );
    }
}

#[tokio::test(start_paused = true)]
async fn test_interrupt_during_startup_skips_tasks() {
    let yaml = r#"
services:
  db:
    image: postgres
    healthcheck:
      test: ["CMD", "pg_isready"]
tasks:
  itest: {image: itest, depends_on: [db]}
"#;
    // db never reports healthy, so the session sits in startup
    let mut harness = Harness::new(yaml, FakeRuntime::new());
    interrupt_later(harness.session.sender().expect("queue is open"), 1, millis(500));

    let outcome = harness.run().await;

    assert!(outcome.is_success());
    assert_eq!(
        harness.session.transitions(),
        &[Phase::Startup, Phase::Shutdown, Phase::Cleanup, Phase::Terminated]
    );
    assert_eq!(harness.runtime.position(&create("itest")), None);
    assert_eq!(
        harness.session.model().status_of("itest"),
        Some(ContainerStatus::New)
    );
    harness.position(stop("db"));
    harness.position(destroy("db"));
}
