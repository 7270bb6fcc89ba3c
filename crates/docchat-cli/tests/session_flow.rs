use std::fs;
use std::path::Path;

use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use serde_json::{Value, json};
use tempfile::tempdir;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TOKEN: &str = "tok-cli-session-42";

fn auth_data() -> Value {
    json!({
        "user": {
            "id": "user-1",
            "email": "ada@example.com",
            "fullName": "Ada Lovelace",
            "createdAt": "2024-05-01T12:00:00Z",
            "updatedAt": "2024-05-01T12:00:00Z"
        },
        "organization": {
            "id": "org-1",
            "name": "Acme",
            "slug": "acme",
            "createdAt": "2024-05-01T12:00:00Z",
            "updatedAt": "2024-05-01T12:00:00Z"
        },
        "profile": {
            "id": "profile-1",
            "organizationId": "org-1",
            "role": "admin",
            "email": "ada@example.com",
            "fullName": "Ada Lovelace",
            "createdAt": "2024-05-01T12:00:00Z",
            "updatedAt": "2024-05-01T12:00:00Z"
        },
        "token": TOKEN
    })
}

fn ok(data: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": data }))
}

/// Writes the two durable keys the way a previous login would have.
fn seed_session(home: &Path) {
    let storage = home.join("storage");
    fs::create_dir_all(&storage).unwrap();
    let mut state = auth_data();
    state["isAuthenticated"] = json!(true);
    let snapshot = json!({ "state": state, "version": 0 });
    fs::write(storage.join("auth-storage"), snapshot.to_string()).unwrap();
    fs::write(storage.join("authToken"), TOKEN).unwrap();
}

#[tokio::test]
async fn test_login_persists_session() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .and(body_json(json!({ "email": "ada@example.com", "password": "hunter22" })))
        .respond_with(ok(auth_data()))
        .mount(&server)
        .await;

    let home = tempdir().unwrap();

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", home.path())
        .env("DOCCHAT_API_URL", server.uri())
        .args(["login", "--email", "ada@example.com", "--password", "hunter22"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged in as ada@example.com (Acme)"));

    let storage = home.path().join("storage");
    assert_eq!(fs::read_to_string(storage.join("authToken")).unwrap(), TOKEN);
    let snapshot: Value =
        serde_json::from_str(&fs::read_to_string(storage.join("auth-storage")).unwrap()).unwrap();
    assert_eq!(snapshot["version"], 0);
    assert_eq!(snapshot["state"]["token"], TOKEN);
    assert_eq!(snapshot["state"]["isAuthenticated"], true);
    assert_eq!(snapshot["state"]["user"]["email"], "ada@example.com");

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", home.path())
        .env("DOCCHAT_API_URL", server.uri())
        .arg("whoami")
        .assert()
        .success()
        .stdout(predicate::str::contains("Ada Lovelace <ada@example.com>"))
        .stdout(predicate::str::contains("Role: admin"));
}

#[tokio::test]
async fn test_bad_credentials_show_server_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(json!({ "success": false, "error": "Invalid credentials" })),
        )
        .mount(&server)
        .await;

    let home = tempdir().unwrap();

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", home.path())
        .env("DOCCHAT_API_URL", server.uri())
        .args(["login", "--email", "ada@example.com", "--password", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid credentials"));

    assert!(!home.path().join("storage").join("authToken").exists());
}

#[tokio::test]
async fn test_saved_session_sends_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chatbots"))
        .and(header("authorization", format!("Bearer {TOKEN}").as_str()))
        .respond_with(ok(json!([{
            "id": "c1",
            "organizationId": "org-1",
            "name": "Support bot",
            "isActive": true,
            "createdAt": "2024-05-01T12:00:00Z",
            "updatedAt": "2024-05-01T12:00:00Z"
        }])))
        .expect(1)
        .mount(&server)
        .await;

    let home = tempdir().unwrap();
    seed_session(home.path());

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", home.path())
        .env("DOCCHAT_API_URL", server.uri())
        .args(["chatbots", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("c1  Support bot  active"));
}

#[tokio::test]
async fn test_expired_session_is_cleared() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chatbots"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_json(json!({ "success": false, "error": "Token expired" })),
        )
        .mount(&server)
        .await;

    let home = tempdir().unwrap();
    seed_session(home.path());

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", home.path())
        .env("DOCCHAT_API_URL", server.uri())
        .args(["chatbots", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Session expired"))
        .stderr(predicate::str::contains("Token expired"));

    let storage = home.path().join("storage");
    assert!(!storage.join("authToken").exists());
    assert!(!storage.join("auth-storage").exists());
}

#[tokio::test]
async fn test_logout_clears_session_even_if_server_fails() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/auth/logout"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let home = tempdir().unwrap();
    seed_session(home.path());

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", home.path())
        .env("DOCCHAT_API_URL", server.uri())
        .arg("logout")
        .assert()
        .success()
        .stdout(predicate::str::contains("Logged out"));

    assert!(!home.path().join("storage").join("authToken").exists());
}

#[tokio::test]
async fn test_export_writes_into_dir() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/chatbots/c1/export"))
        .and(query_param("format", "csv"))
        .respond_with(ResponseTemplate::new(200).set_body_string("id,text\nm1,hello\n"))
        .mount(&server)
        .await;

    let home = tempdir().unwrap();
    let out = tempdir().unwrap();
    seed_session(home.path());

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", home.path())
        .env("DOCCHAT_API_URL", server.uri())
        .args(["history", "export", "c1", "--dir"])
        .arg(out.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("chatbot-c1-history.csv"));

    let written = fs::read_to_string(out.path().join("chatbot-c1-history.csv")).unwrap();
    assert_eq!(written, "id,text\nm1,hello\n");
}

#[tokio::test]
async fn test_health_command() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let home = tempdir().unwrap();

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", home.path())
        .args(["health", "--api-url", &server.uri()])
        .assert()
        .success()
        .stdout(predicate::str::contains("is reachable"));

    cargo_bin_cmd!("docchat")
        .env("DOCCHAT_HOME", home.path())
        .args(["health", "--api-url", "http://127.0.0.1:1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("is unreachable"));
}
