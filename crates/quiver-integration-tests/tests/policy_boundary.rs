//! Package permissions intersected with the host boundary, end to end.

mod common;

use std::time::Duration;

use quiver_broker::Invocation;
use quiver_core::ErrorKind;
use quiver_policy::{Decision, DenyReason, ExternalBoundary, RequestedAction, evaluate};
use quiver_test::{PackageFixture, ToolFixture, calls_script};
use serde_json::{Value, json};

fn read(path: &str) -> Value {
    json!({ "op": "fs.read", "path": path })
}

#[test]
fn test_path_outside_root_denied_under_any_boundary() {
    let dirs = common::Dirs::new();
    let package = PackageFixture::new("pdf-tools")
        .permissions(json!({ "fs_read": ["**/*.pdf"] }))
        .load(dirs.packages());
    let boundaries = [
        ExternalBoundary::unrestricted(dirs.work()),
        ExternalBoundary::unrestricted(dirs.work()).with_fs_read(["**"]),
        ExternalBoundary::unrestricted(dirs.work()).with_fs_read(["**/*.pdf"]),
    ];

    let escape = RequestedAction::ReadFile {
        path: "/etc/passwd".to_owned(),
    };
    let climb = RequestedAction::ReadFile {
        path: "../../etc/passwd.pdf".to_owned(),
    };
    let inside = RequestedAction::ReadFile {
        path: "reports/q1.pdf".to_owned(),
    };
    for boundary in &boundaries {
        let decision = evaluate(package.permissions(), boundary, &escape);
        assert!(
            matches!(decision, Decision::Deny { reason: DenyReason::EscapesRoot { .. } }),
            "{decision:?}"
        );
        assert!(!evaluate(package.permissions(), boundary, &climb).is_granted());
        assert!(evaluate(package.permissions(), boundary, &inside).is_granted());
    }
}

#[tokio::test]
async fn test_effective_read_is_the_intersection() {
    let dirs = common::Dirs::new();
    dirs.put("docs/public/a.txt", "public");
    dirs.put("docs/private/b.txt", "private");
    dirs.put("notes.txt", "notes");

    let package = PackageFixture::new("reader")
        .permissions(json!({ "fs_read": ["docs/**"] }))
        .tool(ToolFixture::shell(
            "run",
            &calls_script(&[
                read("docs/public/a.txt"),
                read("docs/private/b.txt"),
                read("notes.txt"),
            ]),
        ))
        .load(dirs.packages());
    let broker = common::broker_builder(dirs.work())
        .boundary(ExternalBoundary::unrestricted(dirs.work()).with_fs_read(["docs/public/**"]))
        .build()
        .unwrap();

    let result = broker.execute(Invocation::new(package, "run", json!({}))).await;
    let answers = &result.data().unwrap()["answers"];

    assert_eq!(answers[0]["data"]["content"], "public");
    assert_eq!(answers[1]["error"]["kind"], "permission_denied");
    assert!(
        answers[1]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("host boundary")
    );
    assert_eq!(answers[2]["error"]["kind"], "permission_denied");
    assert!(
        answers[2]["error"]["message"]
            .as_str()
            .unwrap()
            .contains("package permissions")
    );
}

#[tokio::test]
async fn test_disjoint_network_grant_is_empty() {
    let dirs = common::Dirs::new();
    let package = PackageFixture::new("fetcher")
        .permissions(json!({ "network": ["api.example.com"] }))
        .tool(ToolFixture::shell(
            "run",
            &calls_script(&[json!({ "op": "net.fetch", "url": "https://api.example.com/v1" })]),
        ))
        .load(dirs.packages());
    let broker = common::broker_builder(dirs.work())
        .boundary(ExternalBoundary::unrestricted(dirs.work()).with_network(Vec::<String>::new()))
        .build()
        .unwrap();

    let result = broker.execute(Invocation::new(package, "run", json!({}))).await;
    let answer = &result.data().unwrap()["answers"][0];
    assert_eq!(answer["ok"], false);
    assert_eq!(answer["error"]["kind"], "permission_denied");
    assert!(answer["error"]["message"].as_str().unwrap().contains("do not overlap"));
}

#[tokio::test]
async fn test_boundary_swap_applies_to_next_call() {
    let dirs = common::Dirs::new();
    dirs.put("docs/a.txt", "first");

    let script = format!(
        "read -r invoke\n\
         echo '@quiver:call {first}'\nread -r a0\n\
         while [ ! -f go ]; do sleep 0.05; done\n\
         echo '@quiver:call {first}'\nread -r a1\n\
         printf '@quiver:result {{\"data\":{{\"answers\":[%s,%s]}}}}\\n' \"$a0\" \"$a1\"\n",
        first = read("docs/a.txt"),
    );
    let package = PackageFixture::new("reader")
        .permissions(json!({ "fs_read": ["docs/**"] }))
        .tool(ToolFixture::shell("run", &script))
        .load(dirs.packages());
    let go = package.root.join("go");
    let broker = common::broker_builder(dirs.work()).build().unwrap();

    let invocation = Invocation::new(package, "run", json!({}));
    let id = invocation.request_id;
    let mut handle = broker.submit(invocation);

    assert!(common::eventually(|| !common::records(&broker, &id).is_empty()).await);
    broker
        .set_boundary(ExternalBoundary::unrestricted(dirs.work()).with_fs_read(Vec::<String>::new()))
        .await
        .unwrap();
    std::fs::write(go, "").unwrap();

    let result = handle.wait(Duration::from_secs(20)).await.unwrap();
    let answers = &result.data().unwrap()["answers"];
    assert_eq!(answers[0]["data"]["content"], "first");
    assert_eq!(answers[1]["error"]["kind"], "permission_denied");
}

#[cfg(unix)]
#[tokio::test]
async fn test_symlink_out_of_root_denied() {
    let dirs = common::Dirs::new();
    let outside = tempfile::tempdir().unwrap();
    std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
    std::fs::create_dir_all(dirs.work().join("docs")).unwrap();
    std::os::unix::fs::symlink(
        outside.path().join("secret.txt"),
        dirs.work().join("docs/secret.txt"),
    )
    .unwrap();
    std::os::unix::fs::symlink(outside.path(), dirs.work().join("docs/out")).unwrap();

    let package = PackageFixture::new("reader")
        .permissions(json!({ "fs_read": ["docs/**"], "fs_write": ["docs/**"] }))
        .tool(ToolFixture::shell(
            "run",
            &calls_script(&[
                read("docs/secret.txt"),
                json!({ "op": "fs.write", "path": "docs/out/planted.txt", "content": "x" }),
            ]),
        ))
        .load(dirs.packages());
    let broker = common::broker_builder(dirs.work()).build().unwrap();

    let result = broker.execute(Invocation::new(package, "run", json!({}))).await;
    let answers = &result.data().unwrap()["answers"];
    assert_eq!(answers[0]["error"]["kind"], "permission_denied");
    assert_eq!(answers[1]["error"]["kind"], "permission_denied");
    assert!(!outside.path().join("planted.txt").exists());
}

#[tokio::test]
async fn test_process_spawn_follows_declaration_and_boundary() {
    let dirs = common::Dirs::new();
    let spawn = calls_script(&[json!({ "op": "process.spawn", "program": "echo", "args": ["hi"] })]);

    let undeclared = PackageFixture::new("quiet")
        .tool(ToolFixture::shell("run", &spawn))
        .load(dirs.packages());
    let declared = PackageFixture::new("loud")
        .permissions(json!({ "process_spawn": true }))
        .tool(ToolFixture::shell("run", &spawn))
        .load(dirs.packages());

    let open = common::broker_builder(dirs.work()).build().unwrap();
    let result = open
        .execute(Invocation::new(undeclared, "run", json!({})))
        .await;
    assert_eq!(
        result.data().unwrap()["answers"][0]["error"]["kind"],
        "permission_denied"
    );

    let result = open
        .execute(Invocation::new(std::sync::Arc::clone(&declared), "run", json!({})))
        .await;
    let answer = &result.data().unwrap()["answers"][0];
    assert_eq!(answer["data"]["status"], 0);
    assert_eq!(answer["data"]["stdout"], "hi\n");

    let closed = common::broker_builder(dirs.work())
        .boundary(ExternalBoundary::unrestricted(dirs.work()).with_process_spawn(false))
        .build()
        .unwrap();
    let result = closed.execute(Invocation::new(declared, "run", json!({}))).await;
    assert_eq!(result.error_kind(), None);
    assert_eq!(
        result.data().unwrap()["answers"][0]["error"]["kind"],
        "permission_denied"
    );
}

#[tokio::test]
async fn test_undeclared_tool_fails_before_sandbox() {
    let dirs = common::Dirs::new();
    let package = PackageFixture::new("reader").load(dirs.packages());
    let broker = common::broker_builder(dirs.work()).build().unwrap();
    let result = broker.execute(Invocation::new(package, "run", json!({}))).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::InvalidRequest));
}
