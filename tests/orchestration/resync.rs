use crate::common::*;
use std::collections::BTreeMap;
use testdrive::orchestration::reconcile;
use testdrive::events::{RuntimeEvent, RuntimeEventKind};
use testdrive::runtime::fake::{FakeBehavior, FakeRuntime};
use testdrive::runtime::{ContainerRuntime, CreateRequest, LABEL_CONTAINER, LABEL_SESSION};
use testdrive::{Container, ContainerConfig, ContainerStatus, Model, Phase};

#[tokio::test(start_paused = true)]
async fn test_session_completes_without_event_stream() {
    let yaml = "services:\n  db:\n    image: postgres\n";
    let runtime = FakeRuntime::new();
    // the subscription reports the failure and every later event is lost
    runtime.fail_stream("daemon restarted");
    let mut harness = Harness::new(yaml, runtime);

    let outcome = harness.run().await;

    assert!(outcome.is_success());
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
    assert_eq!(
        harness.session.model().status_of("db"),
        Some(ContainerStatus::Destroyed)
    );
    assert_eq!(harness.runtime.observed_state("db"), None);
}

#[tokio::test(start_paused = true)]
async fn test_output_followed_for_promoted_container() {
    let yaml = r#"
services:
  db: {image: postgres}
tasks:
  itest: {image: itest, depends_on: [db]}
"#;
    let runtime = FakeRuntime::new()
        .with_behavior("db", FakeBehavior::new().silent().with_logs(["db up"]))
        .with_behavior(
            "itest",
            FakeBehavior::new().exits_with(0, std::time::Duration::from_secs(10)),
        );
    let late = runtime.clone();
    tokio::spawn(async move {
        // state sync has promoted db to ready by now
        tokio::time::sleep(millis(4500)).await;
        if let Some(runtime_id) = late.runtime_id_of("db") {
            late.inject(RuntimeEvent::new(RuntimeEventKind::ContainerStart, runtime_id));
        }
    });
    let mut harness = Harness::new(yaml, runtime);

    let outcome = harness.run().await;

    assert!(outcome.is_success(), "{outcome:?}");
    assert_eq!(harness.output.lines_for("db"), vec!["db up"]);
    assert_eq!(
        harness.session.model().status_of("db"),
        Some(ContainerStatus::Destroyed)
    );
}

const SESSION: &str = "resync-session";

async fn created_in_runtime(runtime: &FakeRuntime, model: &mut Model, name: &str) {
    model
        .add_container(Container::service(name, ContainerConfig::new("postgres")))
        .unwrap();
    let request = CreateRequest {
        name: format!("testdrive_resync_{name}"),
        image: "postgres".to_string(),
        labels: BTreeMap::from([
            (LABEL_CONTAINER.to_string(), name.to_string()),
            (LABEL_SESSION.to_string(), SESSION.to_string()),
        ]),
        ..Default::default()
    };
    model.mark_creating(name);
    let runtime_id = runtime.create_container(&request).await.unwrap();
    model.set_runtime_id(name, runtime_id);
}

#[tokio::test(start_paused = true)]
async fn test_missed_create_is_recovered_once() {
    let runtime = FakeRuntime::new();
    let mut model = Model::new();
    created_in_runtime(&runtime, &mut model, "db").await;
    let timeout = millis(1000);

    // confirmation is not overdue yet
    assert_eq!(reconcile::resync(&mut model, &runtime, SESSION, timeout).await.unwrap(), 0);
    assert_eq!(model.status_of("db"), Some(ContainerStatus::Creating));

    tokio::time::advance(millis(1500)).await;
    assert_eq!(reconcile::resync(&mut model, &runtime, SESSION, timeout).await.unwrap(), 1);
    assert_eq!(model.status_of("db"), Some(ContainerStatus::Created));

    // a second pass over the same observation changes nothing
    assert_eq!(reconcile::resync(&mut model, &runtime, SESSION, timeout).await.unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_vanished_container_is_destroyed() {
    let runtime = FakeRuntime::new();
    let mut model = Model::new();
    created_in_runtime(&runtime, &mut model, "db").await;
    model.mark_created("db");
    model.mark_starting("db");
    model.mark_ready("db");

    let runtime_id = runtime.runtime_id_of("db").unwrap();
    runtime.destroy_container(&runtime_id).await.unwrap();

    let changes = reconcile::resync(&mut model, &runtime, SESSION, millis(1000)).await;
    assert_eq!(changes.unwrap(), 1);
    assert_eq!(model.status_of("db"), Some(ContainerStatus::Destroyed));
}

#[tokio::test(start_paused = true)]
async fn test_listing_failure_is_returned() {
    let runtime = FakeRuntime::new();
    let mut model = Model::new();
    created_in_runtime(&runtime, &mut model, "db").await;
    runtime.set_listing_fails(true);

    tokio::time::advance(millis(1500)).await;
    assert!(reconcile::resync(&mut model, &runtime, SESSION, millis(1000))
        .await
        .is_err());
    assert_eq!(model.status_of("db"), Some(ContainerStatus::Creating));

    runtime.set_listing_fails(false);
    assert_eq!(
        reconcile::resync(&mut model, &runtime, SESSION, millis(1000))
            .await
            .unwrap(),
        1
    );
}
