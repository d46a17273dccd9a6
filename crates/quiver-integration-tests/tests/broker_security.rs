//! Credentials, confirmation, tokens and the audit trail.

mod common;

use std::sync::Arc;
use std::time::Duration;

use quiver_audit::{ApprovalState, AuditLog, RecordKind, verify_records};
use quiver_broker::{
    BrokerConfig, CapabilityToken, Credential, CredentialStore, Invocation, ToolBroker,
};
use quiver_core::ErrorKind;
use quiver_crypto::KeyPair;
use quiver_policy::ExternalBoundary;
use quiver_test::{
    CountingAlarm, EchoToolHost, FailingSink, MockApprover, PackageFixture, ToolFixture,
    calls_script, result_script,
};
use serde_json::json;

const SECRET: &str = "s3cr3t-value-0042";

#[tokio::test]
async fn test_credential_injected_but_never_seen_by_sandbox() {
    let dirs = common::Dirs::new();
    let (port, server) = common::reflecting_server().await;

    let script = format!(
        "read -r invoke\n\
         echo '@quiver:call {}'\nread -r a0\n\
         printf '@quiver:result {{\"data\":{{\"answer\":%s,\"token\":\"%s\",\"leaked\":\"%s\"}}}}\\n' \
         \"$a0\" \"$QUIVER_CAPABILITY_TOKEN\" \"$(env | grep -c {SECRET})\"\n",
        json!({ "op": "net.fetch", "url": format!("http://127.0.0.1:{port}/search?q=rust") }),
    );
    let package = PackageFixture::new("searcher")
        .secrets(&["search"])
        .permissions(json!({ "network": [format!("127.0.0.1:{port}")] }))
        .tool(ToolFixture::shell("run", &script))
        .load(dirs.packages());
    let credentials = CredentialStore::new().with(
        Credential::new("search", SECRET, &["127.0.0.1".to_owned()], "Authorization", "Bearer")
            .unwrap(),
    );
    let broker = common::broker_builder(dirs.work())
        .credentials(credentials)
        .build()
        .unwrap();

    let invocation = Invocation::new(package, "run", json!({}));
    let id = invocation.request_id;
    let result = broker.execute(invocation).await;
    let head = server.await.unwrap();

    assert!(
        head.to_ascii_lowercase()
            .contains(&format!("authorization: bearer {SECRET}"))
    );

    let data = result.data().unwrap();
    assert_eq!(data["answer"]["data"]["status"], 200);
    let body = data["answer"]["data"]["body"].as_str().unwrap();
    assert!(body.contains("/search?q=rust"));
    assert!(!body.contains(SECRET));
    assert_eq!(data["leaked"], "0");

    let token = CapabilityToken::decode(data["token"].as_str().unwrap()).unwrap();
    let grant = token
        .grants
        .iter()
        .find(|g| g.operation == "net.fetch")
        .unwrap();
    assert_eq!(grant.resource, "127.0.0.1");
    token
        .verify(&broker.token_issuer(), &id, "net.fetch", &grant.resource)
        .unwrap();
    assert!(!token.grants("tool.invoke", "anything"));

    for record in common::records(&broker, &id) {
        let line = serde_json::to_string(&record).unwrap();
        assert!(!line.contains(SECRET));
    }
}

#[tokio::test]
async fn test_undeclared_credential_not_injected() {
    let dirs = common::Dirs::new();
    let (port, server) = common::reflecting_server().await;
    let package = PackageFixture::new("searcher")
        .permissions(json!({ "network": [format!("127.0.0.1:{port}")] }))
        .tool(ToolFixture::shell(
            "run",
            &calls_script(&[json!({ "op": "net.fetch", "url": format!("http://127.0.0.1:{port}/") })]),
        ))
        .load(dirs.packages());
    let credentials = CredentialStore::new().with(
        Credential::new("search", SECRET, &["127.0.0.1".to_owned()], "Authorization", "Bearer")
            .unwrap(),
    );
    let broker = common::broker_builder(dirs.work())
        .credentials(credentials)
        .build()
        .unwrap();

    let result = broker.execute(Invocation::new(package, "run", json!({}))).await;
    let head = server.await.unwrap();
    assert!(!head.to_ascii_lowercase().contains("authorization"));
    assert_eq!(result.data().unwrap()["answers"][0]["data"]["status"], 200);
}

#[tokio::test]
async fn test_tool_confirmation_times_out() {
    let dirs = common::Dirs::new();
    let package = PackageFixture::new("mailer")
        .tool(
            ToolFixture::shell("send", &result_script(&json!({ "sent": true })))
                .confirmation("required"),
        )
        .load(dirs.packages());
    let approver = Arc::new(MockApprover::approving("late").with_delay(Duration::from_secs(5)));
    let broker = common::broker_builder(dirs.work())
        .config(BrokerConfig::default().with_confirmation_timeout(Duration::from_millis(200)))
        .approver(approver.clone())
        .build()
        .unwrap();

    let invocation = Invocation::new(package, "send", json!({}));
    let id = invocation.request_id;
    let result = broker.execute(invocation).await;

    assert_eq!(result.error_kind(), Some(ErrorKind::ConfirmationRequired));
    assert_eq!(approver.requests().len(), 1);
    let summary = common::records(&broker, &id).pop().unwrap();
    assert_eq!(summary.body.approval, ApprovalState::TimedOut);
}

#[tokio::test]
async fn test_recommended_confirmation_only_under_strict_mode() {
    let dirs = common::Dirs::new();
    let package = PackageFixture::new("mailer")
        .tool(
            ToolFixture::shell("send", &result_script(&json!({ "sent": true })))
                .confirmation("recommended"),
        )
        .load(dirs.packages());

    let relaxed = common::broker_builder(dirs.work()).build().unwrap();
    let result = relaxed
        .execute(Invocation::new(Arc::clone(&package), "send", json!({})))
        .await;
    assert!(result.is_ok());

    let strict = common::broker_builder(dirs.work())
        .config(BrokerConfig {
            strict_confirmation: true,
            ..BrokerConfig::default()
        })
        .build()
        .unwrap();
    let result = strict.execute(Invocation::new(package, "send", json!({}))).await;
    assert_eq!(result.error_kind(), Some(ErrorKind::ConfirmationRequired));
}

#[tokio::test]
async fn test_gated_write_refused_by_approver() {
    let dirs = common::Dirs::new();
    dirs.put("out/report.txt", "original");
    let package = PackageFixture::new("writer")
        .permissions(json!({ "fs_write": ["out/**"] }))
        .safety(json!({ "require_confirmation_for": ["destructive_write"] }))
        .tool(ToolFixture::shell(
            "run",
            &calls_script(&[
                json!({ "op": "fs.write", "path": "out/fresh.txt", "content": "new" }),
                json!({ "op": "fs.write", "path": "out/report.txt", "content": "clobbered" }),
            ]),
        ))
        .load(dirs.packages());
    let approver = Arc::new(MockApprover::denying("keep the report"));
    let broker = common::broker_builder(dirs.work())
        .approver(approver.clone())
        .build()
        .unwrap();

    let invocation = Invocation::new(package, "run", json!({}));
    let id = invocation.request_id;
    let result = broker.execute(invocation).await;
    let answers = &result.data().unwrap()["answers"];

    assert_eq!(answers[0]["ok"], true);
    assert_eq!(answers[1]["error"]["kind"], "confirmation_required");
    assert_eq!(
        std::fs::read_to_string(dirs.work().join("out/report.txt")).unwrap(),
        "original"
    );
    assert_eq!(
        std::fs::read_to_string(dirs.work().join("out/fresh.txt")).unwrap(),
        "new"
    );
    assert_eq!(approver.requests().len(), 1);

    let records = common::records(&broker, &id);
    assert_eq!(records[0].body.approval, ApprovalState::NotRequired);
    assert!(matches!(records[1].body.approval, ApprovalState::Denied { .. }));
}

#[tokio::test]
async fn test_audit_chain_verifies_and_detects_tampering() {
    let dirs = common::Dirs::new();
    dirs.put("docs/a.txt", "a");
    let package = PackageFixture::new("reader")
        .permissions(json!({ "fs_read": ["docs/**"] }))
        .tool(ToolFixture::shell(
            "run",
            &calls_script(&[
                json!({ "op": "fs.read", "path": "docs/a.txt" }),
                json!({ "op": "fs.read", "path": "docs/missing.txt" }),
            ]),
        ))
        .load(dirs.packages());
    let broker = common::broker_builder(dirs.work()).build().unwrap();

    let invocation = Invocation::new(package, "run", json!({}));
    let id = invocation.request_id;
    broker.execute(invocation).await;

    let mut records = common::records(&broker, &id);
    assert_eq!(records.len(), 3);
    assert_eq!(records[2].body.kind, RecordKind::RequestSummary { calls: 2 });
    let key = broker.audit().public_key();
    assert!(verify_records(&records, Some(&key)).valid);

    records[0].body.tool = "something-else".to_owned();
    assert!(!verify_records(&records, Some(&key)).valid);
}

#[tokio::test]
async fn test_audit_failure_raises_alarm_without_failing_request() {
    let dirs = common::Dirs::new();
    let package = PackageFixture::new("pdf-tools")
        .tool(ToolFixture::shell("count", &result_script(&json!({ "pages": 3 }))))
        .load(dirs.packages());
    let alarm = Arc::new(CountingAlarm::new());
    let audit = Arc::new(AuditLog::new(KeyPair::generate(), Arc::new(FailingSink)));
    let broker = ToolBroker::builder(audit)
        .sandbox(common::sandbox())
        .boundary(ExternalBoundary::unrestricted(dirs.work()))
        .alarm(alarm.clone())
        .build()
        .unwrap();

    let result = broker.execute(Invocation::new(package, "count", json!({}))).await;
    assert_eq!(result.data(), Some(&json!({ "pages": 3 })));
    assert_eq!(alarm.count(), 1);
    assert_eq!(broker.audit_failures(), 1);
}

#[tokio::test]
async fn test_tool_invoke_reaches_registered_host_with_token() {
    let dirs = common::Dirs::new();
    let script = "read -r invoke\n\
        printf '@quiver:call {\"op\":\"tool.invoke\",\"host\":\"search\",\"tool\":\"find\",\"arguments\":{\"q\":\"rust\"},\"token\":\"%s\"}\\n' \"$QUIVER_CAPABILITY_TOKEN\"\n\
        read -r a0\n\
        echo '@quiver:call {\"op\":\"tool.invoke\",\"host\":\"search\",\"tool\":\"find\",\"arguments\":{}}'\n\
        read -r a1\n\
        echo '@quiver:call {\"op\":\"tool.invoke\",\"host\":\"nowhere\",\"tool\":\"find\",\"arguments\":{}}'\n\
        read -r a2\n\
        printf '@quiver:result {\"data\":{\"answers\":[%s,%s,%s]}}\\n' \"$a0\" \"$a1\" \"$a2\"\n";
    let package = PackageFixture::new("meta")
        .tool(ToolFixture::shell("run", script))
        .load(dirs.packages());
    let host = Arc::new(EchoToolHost::new("search"));
    let broker = common::broker_builder(dirs.work())
        .tool_host(host.clone())
        .build()
        .unwrap();

    let result = broker.execute(Invocation::new(package, "run", json!({}))).await;
    let answers = &result.data().unwrap()["answers"];

    assert_eq!(answers[0]["data"]["tool"], "find");
    assert_eq!(answers[0]["data"]["arguments"]["q"], "rust");
    assert_eq!(answers[1]["error"]["kind"], "permission_denied");
    assert_eq!(answers[2]["error"]["kind"], "invalid_request");
    assert_eq!(host.calls().len(), 1);
}
