use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use chrono::{Duration, Utc};
use serde_json::{Value, json};
use tempfile::TempDir;
use tower::ServiceExt;

use safeline_api::auth::{ensure_admin_exists, login_user, register_user};
use safeline_api::reports::all_reports;
use safeline_api::token::{issue_token_at, validate_token};
use safeline_api::{AppState, AppStateInner, router};
use safeline_db::Database;
use safeline_types::models::Role;

const SECRET: &str = "integration-secret";
const BOUNDARY: &str = "----safeline-test-boundary";
const MIB: usize = 1024 * 1024;

struct TestApp {
    app: Router,
    state: AppState,
    _dir: TempDir,
    user_token: String,
    admin_token: String,
}

fn setup() -> TestApp {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open_in_memory().unwrap();
    db.migrate().unwrap();

    let user_token = register_user(&db, SECRET, "siswa", "password1").unwrap().token;
    ensure_admin_exists(&db, "admin", "adminpass").unwrap();
    let admin_token = login_user(&db, SECRET, "admin", "adminpass").unwrap().token;

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: SECRET.to_string(),
        upload_dir: dir.path().join("uploads"),
    });

    TestApp {
        app: router(state.clone()),
        state,
        _dir: dir,
        user_token,
        admin_token,
    }
}

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into()))
    };
    (status, body)
}

fn json_request(method: Method, uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn empty_request(method: Method, uri: &str, token: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
}

fn multipart_request(token: &str, fields: &[(&str, &str)], file: Option<(&str, &[u8])>) -> Request<Body> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    if let Some((filename, bytes)) = file {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"{filename}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    post_multipart(token, body)
}

fn post_multipart(token: &str, body: Vec<u8>) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri("/reports")
        .header(header::AUTHORIZATION, format!("Bearer {token}"))
        .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={BOUNDARY}"))
        .body(Body::from(body))
        .unwrap()
}

fn jpeg(len: usize) -> Vec<u8> {
    let mut bytes = vec![0xff, 0xd8, 0xff, 0xe0];
    bytes.resize(len, 0x42);
    bytes
}

const REPORT_FIELDS: &[(&str, &str)] = &[
    ("location", "Block A"),
    ("description", "noise"),
    ("category", "Stress"),
];

async fn create_json_report(t: &TestApp) -> i64 {
    let (status, body) = send(
        &t.app,
        json_request(
            Method::POST,
            "/reports",
            Some(&t.user_token),
            json!({ "location": "Kantin", "description": "perundungan", "category": "Trauma" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["report"]["id"].as_i64().unwrap()
}

// -- Auth --

#[tokio::test]
async fn register_and_login_issue_matching_tokens() {
    let t = setup();

    let (status, registered) = send(
        &t.app,
        json_request(Method::POST, "/auth/register", None, json!({ "username": "guru", "password": "s3cret" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(registered["user"]["username"], "guru");
    assert_eq!(registered["user"]["role"], "user");

    let (status, logged_in) = send(
        &t.app,
        json_request(Method::POST, "/auth/login", None, json!({ "username": "guru", "password": "s3cret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(logged_in["user"], registered["user"]);

    let claims = validate_token(logged_in["token"].as_str().unwrap(), SECRET).unwrap();
    assert_eq!(claims.sub, registered["user"]["id"].as_i64().unwrap());
    assert_eq!(claims.role, Role::User);
}

#[tokio::test]
async fn duplicate_registration_conflicts() {
    let t = setup();
    let (status, body) = send(
        &t.app,
        json_request(Method::POST, "/auth/register", None, json!({ "username": "siswa", "password": "x" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "username already exists");
}

#[tokio::test]
async fn login_does_not_reveal_which_part_was_wrong() {
    let t = setup();

    let wrong_password = send(
        &t.app,
        json_request(Method::POST, "/auth/login", None, json!({ "username": "siswa", "password": "nope" })),
    )
    .await;
    let unknown_user = send(
        &t.app,
        json_request(Method::POST, "/auth/login", None, json!({ "username": "ghost", "password": "password1" })),
    )
    .await;

    assert_eq!(wrong_password.0, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password, unknown_user);
}

#[tokio::test]
async fn malformed_auth_body_is_a_validation_error() {
    let t = setup();
    let (status, body) = send(
        &t.app,
        json_request(Method::POST, "/auth/login", None, json!({ "username": "siswa" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());
}

// -- Access control --

#[tokio::test]
async fn listing_requires_admin() {
    let t = setup();

    let (status, _) = send(&t.app, empty_request(Method::GET, "/reports", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = send(&t.app, empty_request(Method::GET, "/reports", Some(&t.user_token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"], "forbidden");

    let (status, body) = send(&t.app, empty_request(Method::GET, "/reports", Some(&t.admin_token))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["reports"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn expired_and_forged_tokens_are_rejected() {
    let t = setup();

    let stale = issue_token_at(1, Role::Admin, SECRET, Utc::now() - Duration::hours(25)).unwrap();
    let (status, body) = send(&t.app, empty_request(Method::GET, "/reports", Some(&stale))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"], "token expired");

    let forged = issue_token_at(1, Role::Admin, "not-the-secret", Utc::now()).unwrap();
    let (status, _) = send(&t.app, empty_request(Method::GET, "/reports", Some(&forged))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn submitting_requires_a_token() {
    let t = setup();
    let (status, _) = send(
        &t.app,
        json_request(
            Method::POST,
            "/reports",
            None,
            json!({ "location": "A", "description": "B", "category": "Stress" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

// -- Report workflow --

#[tokio::test]
async fn json_report_is_created_and_publicly_readable() {
    let t = setup();
    let id = create_json_report(&t).await;

    let (status, body) = send(&t.app, empty_request(Method::GET, &format!("/reports/{id}"), None)).await;
    assert_eq!(status, StatusCode::OK);
    let report = &body["report"];
    assert_eq!(report["status"], "BELUM DITANGANI");
    assert_eq!(report["category"], "Trauma");
    assert_eq!(report["reporter_username"], "siswa");
    assert!(report["reporter_id"].is_i64());
    assert!(report["image_url"].is_null());
}

#[tokio::test]
async fn unknown_or_bad_report_ids() {
    let t = setup();
    let (status, body) = send(&t.app, empty_request(Method::GET, "/reports/999", None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not found");

    let (status, _) = send(&t.app, empty_request(Method::GET, "/reports/abc", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&t.app, empty_request(Method::PUT, "/reports/999/handle", Some(&t.admin_token))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_json_reports_are_rejected() {
    let t = setup();
    for body in [
        json!({ "location": "A", "description": "B", "category": "stress" }),
        json!({ "location": " ", "description": "B", "category": "Stress" }),
        json!({ "description": "B", "category": "Stress" }),
    ] {
        let (status, _) = send(&t.app, json_request(Method::POST, "/reports", Some(&t.user_token), body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
    assert!(all_reports(&t.state.db).unwrap().is_empty());
}

#[tokio::test]
async fn handling_twice_succeeds() {
    let t = setup();
    let id = create_json_report(&t).await;
    let uri = format!("/reports/{id}/handle");

    let (status, _) = send(&t.app, empty_request(Method::PUT, &uri, Some(&t.user_token))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    for _ in 0..2 {
        let (status, body) = send(&t.app, empty_request(Method::PUT, &uri, Some(&t.admin_token))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["report"]["status"], "SUDAH DITANGANI");
    }
}

#[tokio::test]
async fn admin_can_recategorise() {
    let t = setup();
    let id = create_json_report(&t).await;
    let uri = format!("/reports/{id}/category");

    let (status, _) = send(
        &t.app,
        json_request(Method::PUT, &uri, Some(&t.admin_token), json!({ "category": "Depression" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &t.app,
        json_request(Method::PUT, &uri, Some(&t.admin_token), json!({ "category": "Depresi" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["report"]["category"], "Depresi");

    let (status, _) = send(
        &t.app,
        json_request(Method::PUT, &uri, Some(&t.user_token), json!({ "category": "Stress" })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn list_is_newest_first() {
    let t = setup();
    let mut ids = Vec::new();
    for _ in 0..3 {
        ids.push(create_json_report(&t).await);
    }

    let (_, body) = send(&t.app, empty_request(Method::GET, "/reports", Some(&t.admin_token))).await;
    let listed: Vec<i64> = body["reports"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["id"].as_i64().unwrap())
        .collect();
    ids.reverse();
    assert_eq!(listed, ids);
}

// -- Uploads --

#[tokio::test]
async fn oversized_image_is_rejected_without_creating_a_report() {
    let t = setup();
    let big = jpeg(6 * MIB);

    let (status, body) = send(
        &t.app,
        multipart_request(&t.user_token, REPORT_FIELDS, Some(("big.jpg", big.as_slice()))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "file too large; max 5MB");
    assert!(all_reports(&t.state.db).unwrap().is_empty());
    assert!(!t.state.upload_dir.exists() || std::fs::read_dir(&t.state.upload_dir).unwrap().next().is_none());
}

#[tokio::test]
async fn image_type_comes_from_content_not_name() {
    let t = setup();
    let image = jpeg(10 * 1024);

    let (status, body) = send(
        &t.app,
        multipart_request(&t.user_token, REPORT_FIELDS, Some(("evidence.txt", image.as_slice()))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    let report = &body["report"];
    assert_eq!(report["status"], "BELUM DITANGANI");
    assert_eq!(report["location"], "Block A");

    let url = report["image_url"].as_str().unwrap();
    assert!(url.starts_with("/uploads/"));
    assert!(url.ends_with("_evidence.txt"));

    let response = t.app.clone().oneshot(empty_request(Method::GET, url, None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let served = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(served.as_ref(), image.as_slice());
}

#[tokio::test]
async fn non_image_upload_is_rejected() {
    let t = setup();
    let gif: &[u8] = b"GIF89a not a png";
    let (status, body) = send(
        &t.app,
        multipart_request(&t.user_token, REPORT_FIELDS, Some(("photo.png", gif))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid image type; only PNG and JPEG allowed");
    assert!(all_reports(&t.state.db).unwrap().is_empty());
}

#[tokio::test]
async fn multipart_without_image_is_accepted() {
    let t = setup();
    let (status, body) = send(&t.app, multipart_request(&t.user_token, REPORT_FIELDS, None)).await;
    assert_eq!(status, StatusCode::CREATED);
    assert!(body["report"]["image_url"].is_null());
}

#[tokio::test]
async fn multipart_fields_are_validated_before_saving_the_image() {
    let t = setup();
    let fields = [("location", "Block A"), ("description", "noise"), ("category", "Panic")];
    let image = jpeg(64);
    let (status, body) = send(
        &t.app,
        multipart_request(&t.user_token, &fields, Some(("a.jpg", image.as_slice()))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "invalid category");
    assert!(!t.state.upload_dir.exists());
}

#[tokio::test]
async fn image_at_exactly_the_limit_is_accepted() {
    let t = setup();
    let image = jpeg(5 * MIB);
    let (status, body) = send(
        &t.app,
        multipart_request(&t.user_token, REPORT_FIELDS, Some(("max.jpg", image.as_slice()))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body["report"]["image_url"].as_str().unwrap().ends_with("_max.jpg"));
}

#[tokio::test]
async fn one_byte_over_the_limit_is_rejected() {
    let t = setup();
    let image = jpeg(5 * MIB + 1);
    let (status, body) = send(
        &t.app,
        multipart_request(&t.user_token, REPORT_FIELDS, Some(("over.jpg", image.as_slice()))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "file too large; max 5MB");
    assert!(all_reports(&t.state.db).unwrap().is_empty());
}

#[tokio::test]
async fn declared_part_size_over_the_limit_is_rejected() {
    let t = setup();
    let image = jpeg(64);

    let mut body = Vec::new();
    for (name, value) in REPORT_FIELDS {
        body.extend_from_slice(
            format!("--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n")
                .as_bytes(),
        );
    }
    // The part claims 6 MiB while carrying only a few bytes
    body.extend_from_slice(
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"claim.jpg\"\r\n\
             Content-Type: image/jpeg\r\nContent-Length: {}\r\n\r\n",
            6 * MIB
        )
        .as_bytes(),
    );
    body.extend_from_slice(&image);
    body.extend_from_slice(format!("\r\n--{BOUNDARY}--\r\n").as_bytes());

    let (status, body) = send(&t.app, post_multipart(&t.user_token, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "file too large; max 5MB");
    assert!(all_reports(&t.state.db).unwrap().is_empty());
    assert!(!t.state.upload_dir.exists());
}

#[tokio::test]
async fn body_over_the_transport_limit_is_too_large() {
    let t = setup();
    let description = "a".repeat(9 * MIB);
    let fields = [("location", "Block A"), ("description", description.as_str()), ("category", "Stress")];

    let (status, body) = send(&t.app, multipart_request(&t.user_token, &fields, None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "file too large; max 5MB");
    assert!(all_reports(&t.state.db).unwrap().is_empty());
}
