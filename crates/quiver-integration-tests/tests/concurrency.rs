//! Concurrency ceilings and queued cancellation.

mod common;

use std::path::Path;
use std::time::{Duration, Instant};

use quiver_broker::{BrokerConfig, Invocation};
use quiver_core::ErrorKind;
use quiver_sandbox::HandleStatus;
use quiver_test::{PackageFixture, ToolFixture};
use serde_json::json;

/// A tool that notes any overlap with another run sharing `dir`.
fn exclusive_script(dir: &Path) -> String {
    let dir = dir.display();
    format!(
        "read -r invoke\n\
         if [ -f '{dir}/busy' ]; then echo overlap >> '{dir}/overlaps'; fi\n\
         touch '{dir}/busy'\n\
         sleep 0.3\n\
         rm -f '{dir}/busy'\n\
         echo '@quiver:result {{\"data\":{{}}}}'\n"
    )
}

#[tokio::test]
async fn test_per_capability_ceiling_serializes_runs() {
    let dirs = common::Dirs::new();
    let package = PackageFixture::new("exclusive")
        .tool(ToolFixture::shell("run", &exclusive_script(dirs.work())))
        .load(dirs.packages());
    let broker = common::broker_builder(dirs.work())
        .config(BrokerConfig::default().with_concurrency(8, 1))
        .build()
        .unwrap();

    let clock = Instant::now();
    let mut handles: Vec<_> = (0..3)
        .map(|_| broker.submit(Invocation::new(std::sync::Arc::clone(&package), "run", json!({}))))
        .collect();
    for handle in &mut handles {
        let result = handle.wait(Duration::from_secs(20)).await.unwrap();
        assert!(result.is_ok(), "{result:?}");
    }

    assert!(clock.elapsed() >= Duration::from_millis(900));
    assert!(!dirs.work().join("overlaps").exists());
    assert_eq!(broker.inflight(), 0);
}

#[tokio::test]
async fn test_global_ceiling_spans_capabilities() {
    let dirs = common::Dirs::new();
    let script = exclusive_script(dirs.work());
    let first = PackageFixture::new("first")
        .tool(ToolFixture::shell("run", &script))
        .load(dirs.packages());
    let second = PackageFixture::new("second")
        .tool(ToolFixture::shell("run", &script))
        .load(dirs.packages());
    let broker = common::broker_builder(dirs.work())
        .config(BrokerConfig::default().with_concurrency(1, 4))
        .build()
        .unwrap();

    let mut a = broker.submit(Invocation::new(first, "run", json!({})));
    let mut b = broker.submit(Invocation::new(second, "run", json!({})));
    assert!(a.wait(Duration::from_secs(20)).await.unwrap().is_ok());
    assert!(b.wait(Duration::from_secs(20)).await.unwrap().is_ok());

    assert!(!dirs.work().join("overlaps").exists());
}

#[tokio::test]
async fn test_queued_request_cancels_without_running() {
    let dirs = common::Dirs::new();
    let package = PackageFixture::new("exclusive")
        .tool(ToolFixture::shell(
            "run",
            "read -r invoke\necho ran >> runs.log\nsleep 0.5\necho '@quiver:result {\"data\":{}}'\n",
        ))
        .load(dirs.packages());
    let runs = package.root.join("runs.log");
    let broker = common::broker_builder(dirs.work())
        .config(BrokerConfig::default().with_concurrency(8, 1))
        .build()
        .unwrap();

    let mut running = broker.submit(Invocation::new(std::sync::Arc::clone(&package), "run", json!({})));
    assert!(common::eventually(|| running.status() == HandleStatus::Running).await);

    let queued = Invocation::new(package, "run", json!({}));
    let queued_id = queued.request_id;
    let mut queued = broker.submit(queued);
    assert!(broker.cancel(&queued_id));

    let cancelled = queued.wait(Duration::from_secs(10)).await.unwrap();
    assert_eq!(cancelled.error_kind(), Some(ErrorKind::Cancelled));
    assert!(running.wait(Duration::from_secs(10)).await.unwrap().is_ok());
    assert_eq!(std::fs::read_to_string(runs).unwrap(), "ran\n");

    let summary = common::records(&broker, &queued_id).pop().unwrap();
    assert!(summary.is_summary());
}
