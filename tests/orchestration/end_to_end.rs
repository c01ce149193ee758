use crate::common::*;
use testdrive::runtime::fake::{FakeBehavior, FakeRuntime};
use testdrive::{ContainerStatus, Phase, TestdriveError};

const ALL_PHASES: [Phase; 5] = [
    Phase::Startup,
    Phase::Running,
    Phase::Shutdown,
    Phase::Cleanup,
    Phase::Terminated,
];

#[tokio::test(start_paused = true)]
async fn test_services_then_task_then_teardown() {
    let runtime = FakeRuntime::new().with_behavior(
        "itest",
        FakeBehavior::new()
            .exits_with(0, millis(200))
            .with_logs(["collected 12 items", "12 passed"]),
    );
    let mut harness = Harness::new(DB_APP_ITEST, runtime);

    let outcome = harness.run().await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(outcome.exit_code(), 0);
    assert_eq!(harness.session.transitions(), &ALL_PHASES);

    // app waits for db; itest only runs once every service is ready
    assert!(harness.position(start("db")) < harness.position(start("app")));
    assert!(harness.position(start("app")) < harness.position(start("itest")));
    assert!(harness.position(create("itest")) > harness.position(start("app")));

    // services are stopped after the task finished; the task exited by itself
    assert!(harness.position(stop("db")) > harness.position(start("itest")));
    assert!(harness.position(stop("app")) > harness.position(start("itest")));
    assert_eq!(harness.runtime.position(&stop("itest")), None);

    for name in ["db", "app", "itest"] {
        assert!(harness.position(destroy(name)) > harness.position(stop("db")));
        assert_eq!(
            harness.session.model().status_of(name),
            Some(ContainerStatus::Destroyed)
        );
        assert_eq!(harness.runtime.observed_state(name), None);
    }

    assert_eq!(
        harness.output.lines_for("itest"),
        vec!["collected 12 items", "12 passed"]
    );

    // every producer has been joined, so nothing keeps the queue open
    assert!(harness.session.sender().is_none());
    assert!(harness.session.run().await.is_err());
}

#[tokio::test(start_paused = true)]
async fn test_failing_service_shuts_the_session_down() {
    let runtime = FakeRuntime::new()
        .with_behavior("app", FakeBehavior::new().exits_with(1, millis(100)))
        .with_behavior(
            "itest",
            FakeBehavior::new().exits_with(0, std::time::Duration::from_secs(3600)),
        );
    let mut harness = Harness::new(DB_APP_ITEST, runtime);

    let outcome = harness.run().await;

    assert_eq!(outcome.failed, vec!["app"]);
    assert_eq!(outcome.exit_code(), 3);
    assert!(!outcome.aborted);
    assert_eq!(harness.session.transitions(), &ALL_PHASES);

    // the still-running task is stopped, the dead service is not
    harness.position(stop("itest"));
    harness.position(stop("db"));
    assert_eq!(harness.runtime.position(&stop("app")), None);
    assert!(harness
        .session
        .model()
        .containers()
        .all(|c| c.status == ContainerStatus::Destroyed));
}

#[tokio::test(start_paused = true)]
async fn test_failing_task_is_reported() {
    let runtime =
        FakeRuntime::new().with_behavior("itest", FakeBehavior::new().exits_with(2, millis(50)));
    let mut harness = Harness::new(DB_APP_ITEST, runtime);

    let outcome = harness.run().await;

    assert_eq!(outcome.failed, vec!["itest"]);
    assert_eq!(outcome.exit_code(), 3);
    assert_eq!(harness.session.phase(), Phase::Terminated);
}

#[tokio::test(start_paused = true)]
async fn test_create_failure_ends_the_run_with_an_error() {
    let runtime = FakeRuntime::new().with_behavior("db", FakeBehavior::new().failing_create());
    let mut harness = Harness::new(DB_APP_ITEST, runtime);

    let err = harness.session.run().await.unwrap_err();

    assert!(matches!(err, TestdriveError::Runtime(_)), "{err}");
    assert_eq!(
        harness.session.model().status_of("db"),
        Some(ContainerStatus::Failed)
    );
    assert_eq!(harness.session.phase(), Phase::Startup);
}

#[tokio::test(start_paused = true)]
async fn test_task_waits_for_task_dependency() {
    let yaml = r#"
services:
  db: {image: postgres}
tasks:
  migrate: {image: migrate, depends_on: [db]}
  itest: {image: itest, depends_on: [db, migrate]}
"#;
    let runtime = FakeRuntime::new()
        .with_behavior("migrate", FakeBehavior::new().exits_with(0, millis(300)))
        .with_behavior("itest", FakeBehavior::new().exits_with(0, millis(100)));
    let mut harness = Harness::new(yaml, runtime);

    let outcome = harness.run().await;

    assert!(outcome.is_success());
    // itest is created alongside migrate but only started once migrate stopped
    assert!(harness.position(create("itest")) < harness.position(start("migrate")));
    assert!(harness.position(start("itest")) > harness.position(start("migrate")));
}

#[tokio::test(start_paused = true)]
async fn test_report_after_run() {
    let runtime =
        FakeRuntime::new().with_behavior("itest", FakeBehavior::new().exits_with(0, millis(10)));
    let mut harness = Harness::new(DB_APP_ITEST, runtime);

    let outcome = harness.run().await;
    let report = harness.session.report(&outcome);

    assert_eq!(report.session_id, harness.session.id());
    assert_eq!(report.phases, ALL_PHASES.to_vec());
    assert_eq!(report.containers.len(), 3);
    assert!(report
        .containers
        .iter()
        .all(|c| c.status == ContainerStatus::Destroyed && c.runtime_id.is_some()));
    assert_eq!(report.exit_code, 0);
    assert!(report.finished_at >= report.started_at);

    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
    assert_eq!(json["phases"][4], "Terminated");
}

#[tokio::test(start_paused = true)]
async fn test_stop_failure_is_force_destroyed() {
    let runtime = FakeRuntime::new()
        .with_behavior("db", FakeBehavior::new().failing_stop())
        .with_behavior("itest", FakeBehavior::new().exits_with(0, millis(100)));
    let mut harness = Harness::new(DB_APP_ITEST, runtime);

    let outcome = tokio::time::timeout(std::time::Duration::from_secs(3600), harness.run())
        .await
        .expect("teardown should not get stuck");

    assert!(!outcome.aborted);
    assert_eq!(harness.session.transitions(), &ALL_PHASES);
    assert!(harness.position(destroy("db")) > harness.position(stop("db")));
    assert_eq!(
        harness.session.model().status_of("db"),
        Some(ContainerStatus::Destroyed)
    );
    assert_eq!(harness.runtime.observed_state("db"), None);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_gives_up_on_undestroyable_container() {
    let runtime = FakeRuntime::new()
        .with_behavior("db", FakeBehavior::new().failing_destroy())
        .with_behavior("itest", FakeBehavior::new().exits_with(0, millis(100)));
    let mut harness = Harness::new(DB_APP_ITEST, runtime);

    let outcome = tokio::time::timeout(std::time::Duration::from_secs(3600), harness.run())
        .await
        .expect("teardown should not get stuck");

    assert!(!outcome.aborted);
    assert_eq!(harness.session.phase(), Phase::Terminated);
    let destroys = harness
        .runtime
        .commands()
        .into_iter()
        .filter(|command| *command == destroy("db"))
        .count();
    assert_eq!(destroys, 3);

    let model = harness.session.model();
    assert_eq!(model.status_of("db"), Some(ContainerStatus::Destroying));
    assert_eq!(model.status_of("app"), Some(ContainerStatus::Destroyed));
    assert_eq!(harness.runtime.observed_state("db").as_deref(), Some("exited"));
}
