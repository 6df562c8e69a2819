//! HTTP-level integration tests for the `/exec` endpoints.

mod common;

use std::time::{Duration, Instant};

use axum::http::StatusCode;
use common::{body_json, post_json_auth, post_raw_auth, token};
use serde_json::json;

fn exec_token() -> String {
    token(&["execute"])
}

// ---------------------------------------------------------------------------
// Request validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_command_is_400() {
    let response = post_json_auth(
        common::build_test_app(),
        "/exec/command",
        json!({ "command": "   " }),
        &exec_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn malformed_json_is_400() {
    let response = post_raw_auth(
        common::build_test_app(),
        "/exec/command",
        "{\"command\": ",
        &exec_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = body_json(response).await;
    assert_eq!(json["code"], "BAD_REQUEST");
    assert!(json["error"].is_string());
}

#[tokio::test]
async fn zero_timeout_is_400() {
    let response = post_json_auth(
        common::build_test_app(),
        "/exec/command",
        json!({ "command": "echo hi", "timeout": 0 }),
        &exec_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn token_without_execute_scope_is_403() {
    let response = post_json_auth(
        common::build_test_app(),
        "/exec/script/content",
        json!({ "script": "echo hi" }),
        &token(&["read"]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(response).await["code"], "FORBIDDEN");
}

#[tokio::test]
async fn unknown_dynamic_language_is_400() {
    let response = post_json_auth(
        common::build_test_app(),
        "/exec/script/dynamic",
        json!({ "code": "print 1", "language": "cobol" }),
        &exec_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn missing_script_file_is_404() {
    let response = post_json_auth(
        common::build_test_app(),
        "/exec/script/file",
        json!({ "script_path": "/nonexistent/dir/deploy.sh" }),
        &exec_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["code"], "SCRIPT_NOT_FOUND");
}

// ---------------------------------------------------------------------------
// Execution
// ---------------------------------------------------------------------------

#[cfg(unix)]
#[tokio::test]
async fn echo_hello_succeeds() {
    let response = post_json_auth(
        common::build_test_app(),
        "/exec/command",
        json!({ "command": "echo hello" }),
        &exec_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["output"], "hello\n");
    assert_eq!(json["error"], "");
    assert_eq!(json["return_code"], 0);
    assert_eq!(json["success"], true);
    assert_eq!(json["timed_out"], false);
}

#[cfg(unix)]
#[tokio::test]
async fn nonzero_exit_is_unsuccessful_but_200() {
    let response = post_json_auth(
        common::build_test_app(),
        "/exec/command",
        json!({ "command": "echo oops >&2; exit 3" }),
        &exec_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["return_code"], 3);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "oops\n");
}

#[cfg(unix)]
#[tokio::test]
async fn request_env_reaches_the_child() {
    let response = post_json_auth(
        common::build_test_app(),
        "/exec/command",
        json!({ "command": "echo \"$GREETING\"", "env": { "GREETING": "bonjour" } }),
        &exec_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["output"], "bonjour\n");
}

#[cfg(unix)]
#[tokio::test]
async fn unknown_user_is_an_unsuccessful_result() {
    let response = post_json_auth(
        common::build_test_app(),
        "/exec/command",
        json!({ "command": "whoami", "user": "nonexistent_user_xyz" }),
        &exec_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], false);
    assert!(json["error"].as_str().expect("error").contains("UserNotFound"));
}

#[cfg(unix)]
#[tokio::test]
async fn sleeping_script_times_out() {
    let started = Instant::now();
    let response = post_json_auth(
        common::build_test_app(),
        "/exec/script/content",
        json!({ "script": "#!/bin/bash\nsleep 10", "timeout": 1 }),
        &exec_token(),
    )
    .await;
    let elapsed = started.elapsed();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["timed_out"], true);
    assert_eq!(json["success"], false);
    assert_eq!(json["return_code"], -1);
    assert!(elapsed < Duration::from_secs(5), "took {elapsed:?}");
}

#[cfg(unix)]
#[tokio::test]
async fn inline_script_runs() {
    let response = post_json_auth(
        common::build_test_app(),
        "/exec/script/content",
        json!({ "script": "#!/bin/sh\nfor i in 1 2; do echo line$i; done" }),
        &exec_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["output"], "line1\nline2\n");
    assert_eq!(json["success"], true);
}

#[cfg(unix)]
#[tokio::test]
async fn dynamic_script_accepts_code_and_language() {
    let response = post_json_auth(
        common::build_test_app(),
        "/exec/script/dynamic",
        json!({ "code": "echo dynamic", "language": "shell" }),
        &exec_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["output"], "dynamic\n");
}

#[cfg(unix)]
#[tokio::test]
async fn script_file_runs_in_requested_working_dir() {
    let dir = tempfile::tempdir().expect("tempdir");
    let script = dir.path().join("where.sh");
    std::fs::write(&script, "#!/bin/sh\npwd\n").expect("write script");

    let response = post_json_auth(
        common::build_test_app(),
        "/exec/script/file",
        json!({
            "script_path": script,
            "working_dir": dir.path(),
        }),
        &exec_token(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["success"], true);
    let printed = json["output"].as_str().expect("output").trim().to_string();
    let expected = dir.path().canonicalize().expect("canonicalize");
    assert_eq!(
        std::path::Path::new(&printed).canonicalize().expect("canonicalize"),
        expected
    );
}

#[cfg(unix)]
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn slow_executions_do_not_stall_other_requests() {
    let app = common::build_test_app();
    let sleeper = |app: axum::Router| async move {
        post_json_auth(app, "/exec/command", json!({ "command": "sleep 1" }), &exec_token()).await
    };

    let started = Instant::now();
    let first = tokio::spawn(sleeper(app.clone()));
    let second = tokio::spawn(sleeper(app.clone()));

    tokio::time::sleep(Duration::from_millis(200)).await;
    let health_started = Instant::now();
    let health = common::get(app.clone(), "/health").await;
    assert_eq!(health.status(), StatusCode::OK);
    assert!(
        health_started.elapsed() < Duration::from_millis(500),
        "health waited {:?}",
        health_started.elapsed()
    );

    for response in [first.await.expect("join"), second.await.expect("join")] {
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["success"], true);
    }
    let elapsed = started.elapsed();
    assert!(elapsed < Duration::from_millis(1800), "ran serially: {elapsed:?}");
}
