use std::sync::Arc;

use pretty_assertions::assert_eq;
use quadrant_client::Error;
use quadrant_client::HttpClient;
use quadrant_client::ListId;
use quadrant_client::RemoteTask;
use quadrant_client::TaskId;
use quadrant_client::TaskPayload;
use quadrant_client::TaskStatus;
use quadrant_client::TasksBackend;
use quadrant_client::TokenSource;
use serde_json::json;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::body_json;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;
use wiremock::matchers::query_param;

type TestResult = Result<(), Box<dyn std::error::Error>>;

fn client_for(server: &MockServer) -> Result<HttpClient, anyhow::Error> {
    Ok(HttpClient::new(server.uri())?.with_bearer_token("t-123"))
}

#[tokio::test]
async fn lists_task_lists_with_bearer_auth() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me/lists"))
        .and(header("authorization", "Bearer t-123"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "l1", "title": "My Tasks" },
                { "id": "l2", "title": "Work" },
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server)?;
    let lists = client.list_task_lists().await?;
    assert_eq!(lists.len(), 2);
    assert_eq!(lists[0].id, ListId("l1".to_string()));
    assert_eq!(lists[1].title, "Work");
    Ok(())
}

#[tokio::test]
async fn missing_items_field_means_empty() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me/lists"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "kind": "tasks#taskLists" })))
        .mount(&server)
        .await;

    let client = client_for(&server)?;
    let lists = client.list_task_lists().await?;
    assert_eq!(lists, vec![]);
    Ok(())
}

#[tokio::test]
async fn task_fetch_requests_hidden_and_completed_up_to_100() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lists/l1/tasks"))
        .and(query_param("showCompleted", "true"))
        .and(query_param("showHidden", "true"))
        .and(query_param("maxResults", "100"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "id": "t1", "title": "[DO] Pay bill", "status": "needsAction" },
                { "id": "t2", "title": "[DELAY] Garage", "status": "completed", "notes": "soon" },
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server)?;
    let tasks = client.list_tasks(&ListId("l1".to_string())).await?;
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].status, TaskStatus::NeedsAction);
    assert_eq!(tasks[1].status, TaskStatus::Completed);
    assert_eq!(tasks[1].notes.as_deref(), Some("soon"));
    Ok(())
}

#[tokio::test]
async fn unauthorized_surfaces_provider_message() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me/lists"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "code": 401, "message": "Invalid Credentials", "status": "UNAUTHENTICATED" }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server)?;
    let err = match client.list_task_lists().await {
        Err(err) => err,
        Ok(_) => panic!("expected an auth error"),
    };
    assert!(err.is_auth(), "got {err:?}");
    assert!(matches!(err, Error::Auth(msg) if msg == "Invalid Credentials"));
    Ok(())
}

#[tokio::test]
async fn other_failures_carry_status_and_message() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/lists/l1/tasks"))
        .respond_with(ResponseTemplate::new(503).set_body_json(json!({
            "error": { "message": "Backend Error" }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server)?;
    let err = match client.list_tasks(&ListId("l1".to_string())).await {
        Err(err) => err,
        Ok(_) => panic!("expected a request error"),
    };
    assert!(!err.is_auth());
    match err {
        Error::Status { status, message } => {
            assert_eq!(status, 503);
            assert!(message.contains("Backend Error"), "got {message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn delete_accepts_no_content() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/lists/l1/tasks/t1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server)?;
    client
        .delete_task(&ListId("l1".to_string()), &TaskId("t1".to_string()))
        .await?;
    Ok(())
}

#[tokio::test]
async fn create_sends_exactly_the_given_fields() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/lists/l1/tasks"))
        .and(body_json(json!({
            "title": "[DELEGATE:a@b.com] Write report",
            "status": "needsAction"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t9",
            "title": "[DELEGATE:a@b.com] Write report",
            "status": "needsAction"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server)?;
    let payload = TaskPayload {
        title: Some("[DELEGATE:a@b.com] Write report".to_string()),
        status: Some(TaskStatus::NeedsAction),
        ..Default::default()
    };
    let created = client
        .create_task(&ListId("l1".to_string()), &payload)
        .await?;
    assert_eq!(created.id, TaskId("t9".to_string()));
    Ok(())
}

#[tokio::test]
async fn patch_omits_absent_fields() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/lists/l1/tasks/t1"))
        .and(body_json(json!({ "title": "[DELETE] Pay bill" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t1",
            "title": "[DELETE] Pay bill",
            "status": "needsAction"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server)?;
    let payload = TaskPayload {
        title: Some("[DELETE] Pay bill".to_string()),
        ..Default::default()
    };
    let updated = client
        .patch_task(&ListId("l1".to_string()), &TaskId("t1".to_string()), &payload)
        .await?;
    assert_eq!(updated.title, "[DELETE] Pay bill");
    Ok(())
}

#[tokio::test]
async fn move_creates_in_target_then_deletes_from_source() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/lists/l2/tasks"))
        .and(body_json(json!({
            "title": "[DO] Pay bill",
            "notes": "by Friday",
            "status": "needsAction"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t-new",
            "title": "[DO] Pay bill",
            "notes": "by Friday",
            "status": "needsAction"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/lists/l1/tasks/t-old"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server)?;
    let task = RemoteTask {
        id: TaskId("t-old".to_string()),
        title: "[DO] Pay bill".to_string(),
        notes: Some("by Friday".to_string()),
        due: None,
        status: TaskStatus::NeedsAction,
    };
    let moved = client
        .move_task(&ListId("l1".to_string()), &ListId("l2".to_string()), &task)
        .await?;
    assert_eq!(moved.id, TaskId("t-new".to_string()));
    Ok(())
}

#[tokio::test]
async fn failed_move_delete_leaves_duplicate_and_reports() -> TestResult {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/lists/l2/tasks"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "t-new",
            "title": "[DO] Pay bill",
            "status": "needsAction"
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/lists/l1/tasks/t-old"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "transient" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server)?;
    let task = RemoteTask {
        id: TaskId("t-old".to_string()),
        title: "[DO] Pay bill".to_string(),
        notes: None,
        due: None,
        status: TaskStatus::NeedsAction,
    };
    let result = client
        .move_task(&ListId("l1".to_string()), &ListId("l2".to_string()), &task)
        .await;
    assert!(matches!(result, Err(Error::Status { status: 500, .. })));
    Ok(())
}

#[tokio::test]
async fn token_source_overrides_static_bearer() -> TestResult {
    struct Fixed;
    impl TokenSource for Fixed {
        fn access_token(&self) -> Option<String> {
            Some("fresh-token".to_string())
        }
    }

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/users/@me/lists"))
        .and(header("authorization", "Bearer fresh-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "items": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let client = HttpClient::new(server.uri())?
        .with_bearer_token("stale-token")
        .with_token_source(Arc::new(Fixed));
    client.list_task_lists().await?;
    Ok(())
}
