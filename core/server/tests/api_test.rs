use anyhow::Result;
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use journal_analysis::{Analyzer, ChatModel};
use journal_composer::{ContextLimits, Prompt};
use journal_server::{build_router, AppState};
use journal_storage::Database;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tower::ServiceExt;

/// Replays canned replies; an exhausted script is an upstream failure
struct CannedModel {
    replies: StdMutex<VecDeque<String>>,
    calls: AtomicUsize,
}

#[async_trait]
impl ChatModel for CannedModel {
    async fn complete_json(&self, _prompt: &Prompt) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("model unavailable"))
    }

    fn describe(&self) -> String {
        "canned".to_string()
    }
}

struct TestApp {
    router: Router,
    model: Arc<CannedModel>,
}

fn app(replies: &[&str]) -> TestApp {
    let db = Arc::new(Mutex::new(Database::open_in_memory().unwrap()));
    let model = Arc::new(CannedModel {
        replies: StdMutex::new(replies.iter().map(|r| r.to_string()).collect()),
        calls: AtomicUsize::new(0),
    });
    let analyzer = Analyzer::new(db.clone(), model.clone(), ContextLimits::default());

    let state = AppState {
        db,
        analyzer: Arc::new(analyzer),
    };

    TestApp {
        router: build_router(state, None),
        model,
    }
}

async fn send(router: &Router, method: &str, uri: &str, user: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(user) = user {
        builder = builder.header("x-user-id", user);
    }

    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, value)
}

const ANALYSIS_REPLY: &str = r#"{
    "priorities": [{ "content": "Finalize Atlas pricing", "rank": 1 }],
    "entities": [
        { "type": "person", "name": "Alex" },
        { "type": "project", "name": "Atlas" }
    ],
    "relationships": [
        { "sourceName": "Alex", "relationshipType": "works_on", "targetName": "Atlas" }
    ],
    "clarifyingQuestions": ["What is Alex's role on Atlas?"]
}"#;

#[tokio::test]
async fn test_health_needs_no_user() {
    let app = app(&[]);
    let (status, body) = send(&app.router, "GET", "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_missing_user_is_unauthorized() {
    let app = app(&[]);
    let (status, body) = send(&app.router, "GET", "/api/journal", None, None).await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].as_str().unwrap().contains("X-User-Id"));
}

#[tokio::test]
async fn test_journal_crud_and_pagination() {
    let app = app(&[]);
    let r = &app.router;

    for (i, date) in ["2025-03-12", "2025-03-13", "2025-03-14"].iter().enumerate() {
        let (status, _) = send(
            r,
            "POST",
            "/api/journal",
            Some("alice"),
            Some(json!({ "content": format!("Entry {}", i), "date": date })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, page) = send(r, "GET", "/api/journal?limit=2&offset=0", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], 3);
    assert_eq!(page["entries"].as_array().unwrap().len(), 2);
    assert_eq!(page["entries"][0]["date"], "2025-03-14");

    let (_, by_date) = send(r, "GET", "/api/journal/by-date?date=2025-03-13", Some("alice"), None).await;
    let id = by_date[0]["id"].as_str().unwrap().to_string();
    assert_eq!(by_date[0]["content"], "Entry 1");

    let (status, updated) = send(
        r,
        "PUT",
        &format!("/api/journal/{}", id),
        Some("alice"),
        Some(json!({ "content": "Entry one, revised" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["content"], "Entry one, revised");
    assert_eq!(updated["date"], "2025-03-13");

    // Other users cannot see it
    let (status, _) = send(r, "GET", &format!("/api/journal/{}", id), Some("bob"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(r, "DELETE", &format!("/api/journal/{}", id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(r, "GET", &format!("/api/journal/{}", id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_journal_validation() {
    let app = app(&[]);
    let r = &app.router;

    let (status, body) = send(r, "POST", "/api/journal", Some("alice"), Some(json!({ "content": "  " }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(r, "GET", "/api/journal?limit=0", Some("alice"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(r, "GET", "/api/journal/by-date?date=14-03-2025", Some("alice"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(r, "POST", "/api/journal", Some("alice"), Some(json!({ "content": 5 }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, body) = send(r, "GET", "/api/journal?offset=-1", Some("alice"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let (status, _) = send(r, "GET", "/api/journal?offset=9223372036854775808", Some("alice"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_priority_lifecycle() {
    let app = app(&[]);
    let r = &app.router;

    let (status, first) = send(
        r,
        "POST",
        "/api/priorities",
        Some("alice"),
        Some(json!({ "content": "Book venue", "date": "2025-03-14" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(first["rank"], 1);
    assert_eq!(first["completed"], false);

    let (_, second) = send(
        r,
        "POST",
        "/api/priorities",
        Some("alice"),
        Some(json!({ "content": "Email Sam", "date": "2025-03-14" })),
    )
    .await;
    assert_eq!(second["rank"], 2);

    let id = second["id"].as_str().unwrap();
    let (_, toggled) = send(r, "PATCH", &format!("/api/priorities/{}/toggle", id), Some("alice"), None).await;
    assert_eq!(toggled["completed"], true);

    let (status, ranked) = send(
        r,
        "PATCH",
        &format!("/api/priorities/{}/rank", id),
        Some("alice"),
        Some(json!({ "rank": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ranked["rank"], 1);

    let (status, _) = send(
        r,
        "PATCH",
        &format!("/api/priorities/{}/rank", id),
        Some("alice"),
        Some(json!({ "rank": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, listed) = send(r, "GET", "/api/priorities/by-date?date=2025-03-14", Some("alice"), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 2);

    let (status, _) = send(r, "DELETE", &format!("/api/priorities/{}", id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (_, listed) = send(r, "GET", "/api/priorities?date=2025-03-14", Some("alice"), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = send(
        r,
        "POST",
        "/api/priorities",
        Some("alice"),
        Some(json!({ "content": "Orphan", "journalEntryId": "entry_missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_priority_rank_ceiling() {
    let app = app(&[]);
    let r = &app.router;

    let (status, body) = send(
        r,
        "POST",
        "/api/priorities",
        Some("alice"),
        Some(json!({ "content": "Someday", "date": "2025-03-20", "rank": 4294967295u64 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("rank"));

    let (status, ceiling) = send(
        r,
        "POST",
        "/api/priorities",
        Some("alice"),
        Some(json!({ "content": "Someday", "date": "2025-03-20", "rank": 2147483647 })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(ceiling["rank"], 2147483647);

    let (status, after) = send(
        r,
        "POST",
        "/api/priorities",
        Some("alice"),
        Some(json!({ "content": "Maybe later", "date": "2025-03-20" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(after["rank"], 2147483647);
}

#[tokio::test]
async fn test_analyze_entry_flow() {
    let app = app(&[ANALYSIS_REPLY]);
    let r = &app.router;

    let (_, entry) = send(
        r,
        "POST",
        "/api/journal",
        Some("alice"),
        Some(json!({
            "content": "Met with Alex about the Atlas launch, need to finalize pricing by Friday",
            "date": "2025-03-14"
        })),
    )
    .await;
    let entry_id = entry["id"].as_str().unwrap();

    let (status, analysis) = send(r, "POST", &format!("/api/ai/analyze-entry/{}", entry_id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(analysis["entryId"], entry_id);
    assert_eq!(analysis["priorities"][0]["content"], "Finalize Atlas pricing");
    assert_eq!(analysis["priorities"][0]["journalEntryId"], entry_id);
    assert_eq!(analysis["entities"]["created"], 2);
    assert_eq!(analysis["relationships"]["created"], 1);
    assert_eq!(analysis["questions"][0]["status"], "pending");

    let (_, entities) = send(r, "GET", "/api/context/entities?type=person", Some("alice"), None).await;
    assert_eq!(entities.as_array().unwrap().len(), 1);
    assert_eq!(entities[0]["type"], "person");
    assert_eq!(entities[0]["name"], "Alex");

    let (_, edges) = send(r, "GET", "/api/context/relationships", Some("alice"), None).await;
    assert_eq!(edges[0]["sourceName"], "Alex");
    assert_eq!(edges[0]["relationshipType"], "works_on");

    let alex_id = entities[0]["id"].as_str().unwrap();
    let (status, alex) = send(r, "GET", &format!("/api/context/entities/{}", alex_id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(alex["name"], "Alex");
    let (status, _) = send(r, "GET", &format!("/api/context/entities/{}", alex_id), Some("bob"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(r, "DELETE", &format!("/api/context/entities/{}", alex_id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(r, "GET", &format!("/api/context/entities/{}", alex_id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, edges) = send(r, "GET", "/api/context/relationships", Some("alice"), None).await;
    assert!(edges.as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_analyze_unknown_entry_is_404_on_both_paths() {
    let app = app(&[]);

    for path in ["/api/ai/analyze-entry/entry_nope", "/api/ai/analyze/entry_nope"] {
        let (status, _) = send(&app.router, "POST", path, Some("alice"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
    assert_eq!(app.model.calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_model_failure_is_bad_gateway() {
    let app = app(&[]);
    let r = &app.router;

    let (_, entry) = send(r, "POST", "/api/journal", Some("alice"), Some(json!({ "content": "Quiet day" }))).await;
    let entry_id = entry["id"].as_str().unwrap();

    let (status, body) = send(r, "POST", &format!("/api/ai/analyze/{}", entry_id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body["error"].as_str().unwrap().contains("model unavailable"));
}

#[tokio::test]
async fn test_question_flow() {
    let app = app(&[
        r#"{"questions": ["Who owns Atlas pricing?"]}"#,
        r#"{"entities": [{"type": "person", "name": "Sam"}], "relationships": []}"#,
    ]);
    let r = &app.router;

    send(r, "POST", "/api/journal", Some("alice"), Some(json!({ "content": "Atlas kickoff" }))).await;

    let (status, questions) = send(r, "GET", "/api/ai/clarifying-questions", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(questions.as_array().unwrap().len(), 1);

    // Pending questions are returned again without another model call
    let (_, again) = send(r, "GET", "/api/ai/questions", Some("alice"), None).await;
    assert_eq!(again, questions);
    assert_eq!(app.model.calls.load(Ordering::SeqCst), 1);

    let id = questions[0]["id"].as_str().unwrap();

    let (status, _) = send(
        r,
        "POST",
        &format!("/api/ai/questions/{}/answer", id),
        Some("alice"),
        Some(json!({ "answer": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, answered) = send(
        r,
        "POST",
        &format!("/api/ai/answer-question/{}", id),
        Some("alice"),
        Some(json!({ "answer": "Sam does" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(answered["question"]["status"], "answered");
    assert_eq!(answered["question"]["answer"], "Sam does");
    assert_eq!(answered["entities"]["created"], 1);

    let (status, _) = send(r, "POST", &format!("/api/ai/questions/{}/dismiss", id), Some("alice"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (_, listed) = send(r, "GET", "/api/ai/questions?status=answered", Some("alice"), None).await;
    assert_eq!(listed.as_array().unwrap().len(), 1);

    let (status, _) = send(r, "GET", "/api/ai/questions?status=maybe", Some("alice"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        r,
        "POST",
        &format!("/api/ai/answer-question/{}", id),
        Some("bob"),
        Some(json!({ "answer": "Not mine" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_daily_summary_without_entries() {
    let app = app(&[]);

    let (status, body) = send(&app.router, "GET", "/api/ai/summary?date=2025-03-14", Some("alice"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["date"], "2025-03-14");
    assert!(body["summary"].is_null());
    assert_eq!(body["created"], 0);
    assert_eq!(app.model.calls.load(Ordering::SeqCst), 0);
}
