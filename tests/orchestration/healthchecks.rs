use crate::common::*;
use testdrive::runtime::fake::{FakeBehavior, FakeRuntime};
use testdrive::{ContainerStatus, Phase};

const HEALTHCHECKED_DB: &str = r#"
services:
  db:
    image: postgres
    healthcheck:
      test: ["CMD", "pg_isready"]
      interval_ms: 100
  app:
    image: app
    depends_on: [db]
tasks:
  itest:
    image: itest
    depends_on: [app]
"#;

#[tokio::test(start_paused = true)]
async fn test_dependents_wait_for_healthy_report() {
    let runtime = FakeRuntime::new()
        .with_behavior("db", FakeBehavior::new().healthy_after(millis(400)))
        .with_behavior("itest", FakeBehavior::new().exits_with(0, millis(50)));
    let mut harness = Harness::new(HEALTHCHECKED_DB, runtime);

    let started = tokio::time::Instant::now();
    let outcome = harness.run().await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert!(started.elapsed() >= millis(400));
    assert!(harness.position(start("db")) < harness.position(start("app")));
    assert_eq!(harness.session.phase(), Phase::Terminated);
}

#[tokio::test(start_paused = true)]
async fn test_unhealthy_service_holds_startup() {
    let runtime = FakeRuntime::new();
    let mut harness = Harness::new(HEALTHCHECKED_DB, runtime);
    let sender = harness.session.sender().expect("queue is open");

    tokio::spawn(async move {
        // well past several resync ticks
        tokio::time::sleep(std::time::Duration::from_secs(5)).await;
        let _ = sender.send(testdrive::Event::Interrupt);
    });
    let outcome = harness.run().await;

    assert!(!outcome.aborted);
    assert_eq!(harness.runtime.position(&start("app")), None);
    assert_eq!(harness.runtime.position(&create("itest")), None);
    assert_eq!(
        harness.session.model().status_of("app"),
        Some(ContainerStatus::Destroyed)
    );
    assert!(!harness.session.transitions().contains(&Phase::Running));
}
