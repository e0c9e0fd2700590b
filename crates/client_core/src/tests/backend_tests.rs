use super::*;
use std::sync::Arc;

use axum::{
    extract::{Path, RawQuery, State},
    http::{HeaderMap, StatusCode},
    routing::{get, put},
    Json, Router,
};
use serde_json::{json, Value};
use shared::domain::{EntryId, Term};
use tokio::{net::TcpListener, sync::Mutex};

#[derive(Debug, Clone, PartialEq)]
struct RecordedRequest {
    route: String,
    user: Option<String>,
    query: Option<String>,
    body: Option<Value>,
}

#[derive(Clone, Default)]
struct ServerState {
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl ServerState {
    async fn record(&self, route: String, headers: &HeaderMap, query: Option<String>, body: Option<Value>) {
        let user = headers
            .get(USER_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        self.requests.lock().await.push(RecordedRequest {
            route,
            user,
            query,
            body,
        });
    }
}

fn plan_json(id: i64, name: &str) -> Value {
    json!({
        "id": id,
        "name": name,
        "start_year": 2024,
        "created_at": "2024-09-01T12:00:00Z",
        "user_id": "student-1",
    })
}

fn entry_json(id: i64, course_id: i64, position: u32) -> Value {
    json!({
        "id": id,
        "plan": 3,
        "year_index": 1,
        "term": "FALL",
        "course_id": course_id,
        "status": "planned",
        "position": position,
        "notes": null,
        "created_at": "2024-09-01T12:00:00Z",
    })
}

async fn list_plans(State(state): State<ServerState>, headers: HeaderMap) -> Json<Value> {
    state.record("GET /plans/".into(), &headers, None, None).await;
    Json(json!({ "plans": [plan_json(3, "Main"), plan_json(4, "Backup")] }))
}

async fn create_plan(
    State(state): State<ServerState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let name = body["name"].as_str().unwrap_or_default().to_string();
    state
        .record("POST /plans/".into(), &headers, None, Some(body))
        .await;
    (StatusCode::CREATED, Json(json!({ "plan": plan_json(9, &name) })))
}

async fn rename_plan(
    State(state): State<ServerState>,
    Path(plan_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    state
        .record(format!("PUT /plans/{plan_id}"), &headers, None, Some(body))
        .await;
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": "Plan name is required" })),
    )
}

async fn list_items(
    State(state): State<ServerState>,
    Path(plan_id): Path<i64>,
    headers: HeaderMap,
) -> Json<Value> {
    state
        .record(format!("GET /plans/{plan_id}/items/"), &headers, None, None)
        .await;
    Json(json!({
        "items": [
            entry_json(41, 7, 0),
            { "id": 42, "plan": 3, "year_index": 1, "term": "FALL" },
            entry_json(43, 8, 1),
        ]
    }))
}

async fn create_item(
    State(state): State<ServerState>,
    Path(plan_id): Path<i64>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let course_id = body["course_id"].as_i64().unwrap_or_default();
    state
        .record(format!("POST /plans/{plan_id}/items/"), &headers, None, Some(body))
        .await;
    (StatusCode::CREATED, Json(json!({ "item": entry_json(77, course_id, 0) })))
}

async fn move_item(
    State(state): State<ServerState>,
    Path((plan_id, item_id)): Path<(i64, i64)>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> (StatusCode, String) {
    state
        .record(format!("PUT /plans/{plan_id}/items/{item_id}"), &headers, None, Some(body))
        .await;
    (StatusCode::OK, String::new())
}

async fn delete_item(
    State(state): State<ServerState>,
    Path((plan_id, item_id)): Path<(i64, i64)>,
    headers: HeaderMap,
) -> StatusCode {
    state
        .record(format!("DELETE /plans/{plan_id}/items/{item_id}"), &headers, None, None)
        .await;
    StatusCode::NO_CONTENT
}

async fn list_subjects(State(state): State<ServerState>, headers: HeaderMap) -> Json<Value> {
    state.record("GET /subjects".into(), &headers, None, None).await;
    Json(json!({ "subjects": [{ "id": 1, "code": "MATH", "name": "Mathematics" }] }))
}

async fn courses_by_ids(
    State(state): State<ServerState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Json<Value> {
    state
        .record("GET /courses/by-ids/".into(), &headers, query, None)
        .await;
    Json(json!({
        "courses": [
            { "id": 7, "subject_area_id": 1, "number": "31A", "title": "Calculus", "units": 4.0 },
        ]
    }))
}

async fn list_courses(
    State(state): State<ServerState>,
    Path(subject_id): Path<i64>,
    headers: HeaderMap,
) -> (StatusCode, String) {
    state
        .record(format!("GET /courses/{subject_id}"), &headers, None, None)
        .await;
    (StatusCode::BAD_GATEWAY, "upstream down".to_string())
}

async fn spawn_planner_server() -> anyhow::Result<(String, ServerState)> {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let state = ServerState::default();
    let app = Router::new()
        .route("/plans/", get(list_plans).post(create_plan))
        .route("/plans/:plan_id", put(rename_plan))
        .route("/plans/:plan_id/items/", get(list_items).post(create_item))
        .route(
            "/plans/:plan_id/items/:item_id",
            put(move_item).delete(delete_item),
        )
        .route("/subjects", get(list_subjects))
        .route("/courses/by-ids/", get(courses_by_ids))
        .route("/courses/:subject_id", get(list_courses))
        .with_state(state.clone());
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    Ok((format!("http://{addr}/"), state))
}

fn user() -> UserId {
    UserId::parse("student-1").expect("user id")
}

#[tokio::test]
async fn plan_requests_forward_the_user_header() {
    let (server_url, server_state) = spawn_planner_server().await.expect("spawn server");
    let backend = HttpPlannerBackend::new(&server_url).expect("backend");

    let plans = backend.list_plans(&user()).await.expect("list plans");
    assert_eq!(plans.len(), 2);
    assert_eq!(plans[0].name, "Main");
    assert_eq!(plans[0].owner_id.as_str(), "student-1");

    let requests = server_state.requests.lock().await;
    assert_eq!(requests[0].route, "GET /plans/");
    assert_eq!(requests[0].user.as_deref(), Some("student-1"));
}

#[tokio::test]
async fn create_plan_unwraps_the_plan_envelope() {
    let (server_url, server_state) = spawn_planner_server().await.expect("spawn server");
    let backend = HttpPlannerBackend::new(&server_url).expect("backend");

    let plan = backend
        .create_plan(
            &user(),
            &CreatePlanRequest {
                name: "Transfer plan".to_string(),
                start_year: Some(2025),
            },
        )
        .await
        .expect("create plan");
    assert_eq!(plan.id, PlanId(9));
    assert_eq!(plan.name, "Transfer plan");

    let requests = server_state.requests.lock().await;
    assert_eq!(
        requests[0].body,
        Some(json!({ "name": "Transfer plan", "start_year": 2025 }))
    );
}

#[tokio::test]
async fn list_entries_skips_malformed_items() {
    let (server_url, _server_state) = spawn_planner_server().await.expect("spawn server");
    let backend = HttpPlannerBackend::new(&server_url).expect("backend");

    let entries = backend
        .list_entries(&user(), PlanId(3))
        .await
        .expect("list entries");
    let ids: Vec<EntryId> = entries.iter().map(|entry| entry.id).collect();
    assert_eq!(ids, vec![EntryId::Persisted(41), EntryId::Persisted(43)]);
    assert_eq!(entries[0].plan_id, PlanId(3));
    assert_eq!(entries[0].term, Term::Fall);
}

#[tokio::test]
async fn create_entry_posts_placement_and_returns_server_entry() {
    let (server_url, server_state) = spawn_planner_server().await.expect("spawn server");
    let backend = HttpPlannerBackend::new(&server_url).expect("backend");

    let entry = backend
        .create_entry(
            &user(),
            PlanId(3),
            &CreateEntryRequest {
                year_index: 2,
                term: Term::Winter,
                course_id: CourseId(7),
                status: shared::domain::EntryStatus::Planned,
                position: 0,
            },
        )
        .await
        .expect("create entry");
    assert_eq!(entry.id, EntryId::Persisted(77));
    assert_eq!(entry.course_id, CourseId(7));

    let requests = server_state.requests.lock().await;
    assert_eq!(requests[0].route, "POST /plans/3/items/");
    assert_eq!(
        requests[0].body,
        Some(json!({
            "year_index": 2,
            "term": "WINTER",
            "course_id": 7,
            "status": "planned",
            "position": 0,
        }))
    );
}

#[tokio::test]
async fn move_entry_accepts_an_empty_acknowledgement() {
    let (server_url, server_state) = spawn_planner_server().await.expect("spawn server");
    let backend = HttpPlannerBackend::new(&server_url).expect("backend");

    let reply = backend
        .move_entry(
            &user(),
            PlanId(3),
            41,
            &MoveEntryRequest {
                year_index: 1,
                term: Term::Winter,
                position: 1,
            },
        )
        .await
        .expect("move entry");
    assert!(reply.is_none());

    backend
        .delete_entry(&user(), PlanId(3), 41)
        .await
        .expect("delete entry");

    let requests = server_state.requests.lock().await;
    let routes: Vec<&str> = requests.iter().map(|request| request.route.as_str()).collect();
    assert_eq!(routes, vec!["PUT /plans/3/items/41", "DELETE /plans/3/items/41"]);
}

#[tokio::test]
async fn error_body_message_is_surfaced() {
    let (server_url, _server_state) = spawn_planner_server().await.expect("spawn server");
    let backend = HttpPlannerBackend::new(&server_url).expect("backend");

    let err = backend
        .rename_plan(
            &user(),
            PlanId(3),
            &RenamePlanRequest {
                name: "x".to_string(),
            },
        )
        .await
        .expect_err("rename should fail");
    match err {
        BackendError::Api(api) => {
            assert_eq!(api.status, 400);
            assert_eq!(api.message, "Plan name is required");
        }
        other => panic!("unexpected error: {other:?}"),
    }

    let err = backend
        .list_courses(SubjectId(1))
        .await
        .expect_err("courses should fail");
    assert_eq!(err.status(), Some(502));
    assert!(err.to_string().contains("upstream down"));
}

#[tokio::test]
async fn bulk_lookup_sends_comma_joined_ids() {
    let (server_url, server_state) = spawn_planner_server().await.expect("spawn server");
    let backend = HttpPlannerBackend::new(&server_url).expect("backend");

    let courses = backend
        .courses_by_ids(&[CourseId(7), CourseId(9)])
        .await
        .expect("lookup");
    assert_eq!(courses.len(), 1);
    assert_eq!(courses[0].units, "4");

    let subjects = backend.list_subjects().await.expect("subjects");
    assert_eq!(subjects[0].code, "MATH");

    let requests = server_state.requests.lock().await;
    assert_eq!(requests[0].query.as_deref(), Some("ids=7,9"));
    assert_eq!(requests[0].user, None);
}

#[tokio::test]
async fn bulk_lookup_with_no_ids_sends_nothing() {
    let backend = HttpPlannerBackend::new("http://127.0.0.1:9").expect("backend");
    let courses = backend.courses_by_ids(&[]).await.expect("lookup");
    assert!(courses.is_empty());
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    std::env::set_var("NO_PROXY", "127.0.0.1,localhost");
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let backend = HttpPlannerBackend::new(&format!("http://{addr}")).expect("backend");
    let err = backend.list_subjects().await.expect_err("should fail");
    assert!(matches!(err, BackendError::Transport(_)));
}

#[test]
fn base_url_must_be_http() {
    assert!(matches!(
        HttpPlannerBackend::new("ftp://planner.example"),
        Err(BackendError::InvalidBaseUrl { .. })
    ));
    assert!(HttpPlannerBackend::new("not a url").is_err());

    let backend = HttpPlannerBackend::new(" https://planner.example/api/ ").expect("backend");
    assert_eq!(backend.api_base(), "https://planner.example/api");
}
