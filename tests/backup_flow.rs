//! End-to-end backup runs against a mock remote API.

use chanvault::api::ApiClient;
use chanvault::backup::downloader::attachment_filename;
use chanvault::backup::{BackupOrchestrator, CheckpointStore, NoopProgress};
use chanvault::config::Config;
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;
use wiremock::matchers::{method, path, query_param, query_param_is_missing};
use wiremock::{Mock, MockServer, ResponseTemplate};

const CHANNEL_ID: &str = "42";

fn ts(id: &str) -> String {
    format!("2024-09-05T12.00.{id}+00.00")
}

fn record(server_uri: &str, id: &str, author: &str, attachments: &[&str]) -> Value {
    json!({
        "id": id,
        "timestamp": ts(id),
        "author": {"username": author},
        "content": format!("msg {id}"),
        "attachments": attachments.iter().map(|f| json!({
            "url": format!("{server_uri}/cdn/{id}/{f}"),
            "filename": f,
        })).collect::<Vec<_>>()
    })
}

fn test_config(server: &MockServer, root: &Path) -> Config {
    Config {
        token: "tok".into(),
        api_base: server.uri(),
        backup_root: root.to_string_lossy().into_owned(),
        page_limit: 100,
        request_delay_ms: 0,
        max_retries: 3,
        ..Config::default()
    }
}

fn orchestrator(server: &MockServer, root: &Path) -> BackupOrchestrator {
    let config = test_config(server, root);
    let api = Arc::new(ApiClient::new("tok", server.uri()));
    BackupOrchestrator::new(api, &config, Arc::new(NoopProgress))
}

/// Mount the three-message history from newest to oldest: 102, 101, 100.
/// Message 102 carries one attachment.
async fn mount_history(server: &MockServer) {
    let uri = server.uri();
    Mock::given(method("GET"))
        .and(path(format!("/channels/{CHANNEL_ID}/messages")))
        .and(query_param_is_missing("before"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            record(&uri, "102", "alice", &["pic.png"]),
            record(&uri, "101", "bob", &[]),
            record(&uri, "100", "alice", &[]),
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/channels/{CHANNEL_ID}/messages")))
        .and(query_param("before", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/102/pic.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pngbytes".to_vec()))
        .mount(server)
        .await;
}

fn read_log(root: &Path) -> String {
    std::fs::read_to_string(root.join("test").join("test_messages.txt")).unwrap()
}

fn attachment_files(root: &Path) -> Vec<String> {
    let dir = root.join("test").join("attachments");
    if !dir.exists() {
        return Vec::new();
    }
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}

#[tokio::test]
async fn test_full_run_scenario() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    let root = TempDir::new().unwrap();

    let summary = orchestrator(&server, root.path())
        .backup_channel("test", CHANNEL_ID)
        .await
        .unwrap();
    assert_eq!(summary.messages, 3);
    assert_eq!(summary.attachments_saved, 1);

    // Message lines appear in API order: newest first.
    let log = read_log(root.path());
    let message_lines: Vec<&str> = log.lines().filter(|l| l.contains(": msg ")).collect();
    assert_eq!(message_lines.len(), 3);
    assert!(message_lines[0].contains("msg 102"));
    assert!(message_lines[1].contains("msg 101"));
    assert!(message_lines[2].contains("msg 100"));

    // Attachment saved under its deterministic name and referenced in the log.
    let expected = attachment_filename(&ts("102"), "alice", 0, "pic.png");
    assert_eq!(attachment_files(root.path()), vec![expected.clone()]);
    assert!(log.contains(&format!("attachments/{expected}")));

    // Checkpoint is the oldest (last processed) message.
    let checkpoint = CheckpointStore::new(root.path().join("test"))
        .read("test")
        .unwrap();
    assert_eq!(checkpoint.as_deref(), Some("100"));
}

#[tokio::test]
async fn test_rerun_is_idempotent() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    let root = TempDir::new().unwrap();
    let orch = orchestrator(&server, root.path());

    orch.backup_channel("test", CHANNEL_ID).await.unwrap();
    let log_after_first = read_log(root.path());
    let files_after_first = attachment_files(root.path());

    // Second run resumes at checkpoint 100 and finds nothing older.
    let summary = orch.backup_channel("test", CHANNEL_ID).await.unwrap();
    assert_eq!(summary.messages, 0);
    assert_eq!(summary.attachments_saved, 0);

    assert_eq!(read_log(root.path()), log_after_first);
    assert_eq!(attachment_files(root.path()), files_after_first);
}

#[tokio::test]
async fn test_resume_matches_uninterrupted_run() {
    let server = MockServer::start().await;
    mount_history(&server).await;
    Mock::given(method("GET"))
        .and(path(format!("/channels/{CHANNEL_ID}/messages")))
        .and(query_param("before", "101"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([record(
            &server.uri(),
            "100",
            "alice",
            &[]
        )])))
        .mount(&server)
        .await;

    // Reference: one uninterrupted run.
    let full = TempDir::new().unwrap();
    orchestrator(&server, full.path())
        .backup_channel("test", CHANNEL_ID)
        .await
        .unwrap();

    // Interrupted run: messages 102 and 101 were already processed, the
    // checkpoint advanced to 101, then the process died.
    let resumed = TempDir::new().unwrap();
    let channel_dir = resumed.path().join("test");
    std::fs::create_dir_all(&channel_dir).unwrap();
    let expected_attachment = attachment_filename(&ts("102"), "alice", 0, "pic.png");
    let partial_log = format!(
        "[{}] alice: msg 102\n[{}] alice shared an attachment: attachments/{}\n[{}] bob: msg 101\n",
        ts("102"),
        ts("102"),
        expected_attachment,
        ts("101"),
    );
    std::fs::write(channel_dir.join("test_messages.txt"), &partial_log).unwrap();
    let attachments_dir = channel_dir.join("attachments");
    std::fs::create_dir_all(&attachments_dir).unwrap();
    std::fs::write(attachments_dir.join(&expected_attachment), b"pngbytes").unwrap();
    CheckpointStore::new(&channel_dir).write("test", "101").unwrap();

    orchestrator(&server, resumed.path())
        .backup_channel("test", CHANNEL_ID)
        .await
        .unwrap();

    assert_eq!(read_log(resumed.path()), read_log(full.path()));
    assert_eq!(attachment_files(resumed.path()), attachment_files(full.path()));
    let checkpoint = CheckpointStore::new(resumed.path().join("test"))
        .read("test")
        .unwrap();
    assert_eq!(checkpoint.as_deref(), Some("100"));
}

#[tokio::test]
async fn test_partial_attachment_failure_still_checkpoints() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path(format!("/channels/{CHANNEL_ID}/messages")))
        .and(query_param_is_missing("before"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([record(
            &uri,
            "200",
            "carol",
            &["a.png", "broken.png", "c.png"]
        )])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/channels/{CHANNEL_ID}/messages")))
        .and(query_param("before", "200"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/200/a.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"a".to_vec()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/200/broken.png"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/200/c.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"c".to_vec()))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let summary = orchestrator(&server, root.path())
        .backup_channel("test", CHANNEL_ID)
        .await
        .unwrap();

    assert_eq!(summary.messages, 1);
    assert_eq!(summary.attachments_saved, 2);

    let files = attachment_files(root.path());
    assert_eq!(files.len(), 2);
    assert!(files.iter().any(|f| f.ends_with("a.png")));
    assert!(files.iter().any(|f| f.ends_with("c.png")));

    let log = read_log(root.path());
    assert!(log.contains("msg 200"));

    let checkpoint = CheckpointStore::new(root.path().join("test"))
        .read("test")
        .unwrap();
    assert_eq!(checkpoint.as_deref(), Some("200"));
}

#[tokio::test]
async fn test_fatal_error_mid_run_leaves_durable_checkpoint() {
    let server = MockServer::start().await;
    let uri = server.uri();

    Mock::given(method("GET"))
        .and(path(format!("/channels/{CHANNEL_ID}/messages")))
        .and(query_param_is_missing("before"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            record(&uri, "102", "alice", &[]),
            record(&uri, "101", "bob", &[]),
        ])))
        .mount(&server)
        .await;
    // Deeper history is unreachable: the token lost access mid-run.
    Mock::given(method("GET"))
        .and(path(format!("/channels/{CHANNEL_ID}/messages")))
        .and(query_param("before", "101"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .mount(&server)
        .await;

    let root = TempDir::new().unwrap();
    let err = orchestrator(&server, root.path())
        .backup_channel("test", CHANNEL_ID)
        .await
        .unwrap_err();
    assert!(matches!(err, chanvault::errors::VaultError::Auth(_)));

    // Everything processed before the failure is durable.
    let log = read_log(root.path());
    assert!(log.contains("msg 102"));
    assert!(log.contains("msg 101"));
    let checkpoint = CheckpointStore::new(root.path().join("test"))
        .read("test")
        .unwrap();
    assert_eq!(checkpoint.as_deref(), Some("101"));
}
