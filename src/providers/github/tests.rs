use std::time::Duration;

use mockito::Matcher;
use tokio_util::sync::CancellationToken;

use super::provider::normalize_run;
use super::types::{map_status, GitHubWorkflowRun};
use super::GitHubProvider;
use crate::auth::Token;
use crate::domain::{Event, Status};
use crate::error::{ActionError, ActionKind, ConnectivityError};
use crate::providers::Backend;

const RUNS_BODY: &str = r#"{
  "total_count": 1,
  "workflow_runs": [
    {
      "id": 101,
      "name": "CI",
      "head_branch": "main",
      "head_commit": { "message": "fix: flaky test", "author": { "name": "Ada" } },
      "status": "in_progress",
      "conclusion": null,
      "created_at": "2024-05-01T10:00:00Z",
      "run_started_at": "2024-05-01T10:00:05Z",
      "updated_at": "2024-05-01T10:02:00Z",
      "html_url": "https://github.com/owner/repo/actions/runs/101"
    }
  ]
}"#;

const JOBS_BODY: &str = r#"{
  "total_count": 2,
  "jobs": [
    { "id": 7, "name": "build", "status": "completed", "conclusion": "success",
      "started_at": "2024-05-01T10:00:10Z", "completed_at": "2024-05-01T10:01:10Z",
      "html_url": "https://github.com/owner/repo/actions/runs/101/job/7" },
    { "id": 8, "name": "test", "status": "in_progress", "conclusion": null,
      "started_at": "2024-05-01T10:01:15Z", "completed_at": null, "html_url": null }
  ]
}"#;

fn provider(base_url: String) -> GitHubProvider {
    GitHubProvider::new(
        base_url,
        "owner/repo".to_string(),
        Some(Token::from("test-token")),
        Duration::from_secs(3600),
        CancellationToken::new(),
    )
    .unwrap()
}

fn run_fixture() -> GitHubWorkflowRun {
    let runs: serde_json::Value = serde_json::from_str(RUNS_BODY).unwrap();
    serde_json::from_value(runs["workflow_runs"][0].clone()).unwrap()
}

#[test]
fn test_github_provider_invalid_repo_path() {
    let result = GitHubProvider::new(
        "https://api.github.com".to_string(),
        "invalid-path".to_string(),
        Some(Token::from("test-token")),
        Duration::from_secs(10),
        CancellationToken::new(),
    );

    let err = result.err().unwrap();
    assert!(err.to_string().contains("owner/repo"));
}

#[test]
fn test_github_provider_repo_path_with_multiple_slashes() {
    let result = GitHubProvider::new(
        "https://api.github.com".to_string(),
        "owner/repo/extra".to_string(),
        Some(Token::from("test-token")),
        Duration::from_secs(10),
        CancellationToken::new(),
    );

    assert!(result.is_err());
}

#[test]
fn test_github_provider_requires_token() {
    let result = GitHubProvider::new(
        "https://api.github.com".to_string(),
        "owner/repo".to_string(),
        None,
        Duration::from_secs(10),
        CancellationToken::new(),
    );

    let err = result.err().unwrap();
    assert!(err.to_string().contains("Missing GitHub token"));
}

#[test]
fn test_map_status() {
    assert_eq!(map_status("queued", None), Status::Running);
    assert_eq!(map_status("waiting", None), Status::Running);
    assert_eq!(map_status("completed", Some("success")), Status::Success);
    assert_eq!(map_status("completed", Some("timed_out")), Status::Failed);
    assert_eq!(map_status("completed", Some("action_required")), Status::Failed);
    assert_eq!(map_status("completed", Some("cancelled")), Status::Canceled);
    assert_eq!(map_status("completed", Some("skipped")), Status::Skipped);
    assert_eq!(map_status("completed", Some("neutral")), Status::Failed);
    assert_eq!(map_status("requested", None), Status::Pending);
}

#[test]
fn test_normalize_run_without_jobs_has_no_stages() {
    let pipeline = normalize_run(run_fixture(), None);

    assert_eq!(pipeline.id, "101");
    assert_eq!(pipeline.ref_, "main");
    assert_eq!(pipeline.author, "Ada");
    assert_eq!(pipeline.status, Status::Running);
    assert!(pipeline.duration.is_none());
    assert!(pipeline.stages.is_empty());
}

#[tokio::test]
async fn test_subscribe_emits_normalized_pipelines() {
    let mut server = mockito::Server::new_async().await;
    let runs = server
        .mock("GET", "/repos/owner/repo/actions/runs")
        .match_query(Matcher::UrlEncoded("per_page".into(), "5".into()))
        .match_header("authorization", "Bearer test-token")
        .with_header("content-type", "application/json")
        .with_body(RUNS_BODY)
        .create_async()
        .await;
    let jobs = server
        .mock("GET", "/repos/owner/repo/actions/runs/101/jobs")
        .with_header("content-type", "application/json")
        .with_body(JOBS_BODY)
        .create_async()
        .await;

    let provider = provider(server.url());
    let stream = provider.subscribe();

    let Some(Event::Update { source, pipeline }) = stream.next().await else {
        panic!("expected an update event");
    };
    assert_eq!(source, "owner/repo");
    assert_eq!(pipeline.commit_message, "fix: flaky test");
    assert_eq!(pipeline.stages.len(), 1);

    let stage = &pipeline.stages[0];
    assert_eq!(stage.name, "Workflow");
    assert_eq!(stage.status, Status::Running);
    assert_eq!(stage.jobs[0].id, "7");
    assert_eq!(stage.jobs[0].duration, Some(Duration::from_secs(60)));
    assert_eq!(stage.jobs[1].status, Status::Running);

    runs.assert_async().await;
    jobs.assert_async().await;
}

#[tokio::test]
async fn test_failed_listing_emits_error_event() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/repos/owner/repo/actions/runs")
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let provider = provider(server.url());
    let event = provider.subscribe().next().await.unwrap();

    match event {
        Event::Error { source, cause } => {
            assert_eq!(source, "owner/repo");
            assert!(cause.to_string().contains("500"));
        }
        Event::Update { .. } => panic!("expected an error event"),
    }
}

#[tokio::test]
async fn test_actions_hit_run_endpoints() {
    let mut server = mockito::Server::new_async().await;
    let rerun = server
        .mock("POST", "/repos/owner/repo/actions/runs/101/rerun")
        .with_status(201)
        .create_async()
        .await;
    let cancel = server
        .mock("POST", "/repos/owner/repo/actions/runs/101/cancel")
        .with_status(409)
        .create_async()
        .await;
    let log = server
        .mock("GET", "/repos/owner/repo/actions/jobs/7/logs")
        .with_body("line 1\nline 2\n")
        .create_async()
        .await;

    let provider = provider(server.url());

    assert!(provider.retry_pipeline("101").await.is_ok());
    assert!(matches!(
        provider.cancel_pipeline("101").await,
        Err(ActionError::Rejected { status: 409 })
    ));
    assert_eq!(provider.get_job_log("7").await.unwrap(), "line 1\nline 2\n");

    rerun.assert_async().await;
    cancel.assert_async().await;
    log.assert_async().await;
}

#[tokio::test]
async fn test_retry_job_is_unsupported() {
    let provider = provider("http://127.0.0.1:9".to_string());

    match provider.retry_job("7").await {
        Err(ActionError::Unsupported { action, .. }) => assert_eq!(action, ActionKind::RetryJob),
        other => panic!("expected unsupported, got {other:?}"),
    }
}

#[tokio::test]
async fn test_ping_reports_rejected_credentials() {
    let mut server = mockito::Server::new_async().await;
    server
        .mock("GET", "/user")
        .with_status(401)
        .create_async()
        .await;

    let provider = provider(server.url());
    assert!(matches!(
        provider.ping().await,
        Err(ConnectivityError::Unauthorized { status: 401 })
    ));
}
