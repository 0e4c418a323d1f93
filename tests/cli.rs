use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// Runs the binary from an empty directory so no stray .env or secrets file is picked up.
fn saju_chat(dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("saju-chat").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("GOOGLE_API_KEY")
        .env_remove("GEMINI_API_BASE")
        .env_remove("GEMINI_MODEL")
        .env("SAJU_SECRETS_PATH", dir.path().join("secrets.toml"));
    cmd
}

#[test]
fn test_cli_help() {
    let dir = TempDir::new().unwrap();
    saju_chat(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: saju-chat <COMMAND>"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("categories"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_cli_serve_help() {
    let dir = TempDir::new().unwrap();
    saju_chat(&dir)
        .args(["serve", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: saju-chat serve"))
        .stdout(predicate::str::contains("--port <PORT>"))
        .stdout(predicate::str::contains("--model <MODEL>"))
        .stdout(predicate::str::contains("--secrets <SECRETS>"));
}

#[test]
fn test_cli_no_command() {
    let dir = TempDir::new().unwrap();
    saju_chat(&dir)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Usage: saju-chat <COMMAND>"));
}

#[test]
fn test_categories_needs_no_credential() {
    let dir = TempDir::new().unwrap();
    saju_chat(&dir)
        .arg("categories")
        .assert()
        .success()
        .stdout(predicate::str::contains("생활운세\n  - 오늘의 운세"))
        .stdout(predicate::str::contains("  - 프리미엄 궁합"));
}

#[test]
fn test_serve_without_credential_stops_at_startup() {
    let dir = TempDir::new().unwrap();
    saju_chat(&dir)
        .args(["serve", "--port", "0"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("API 키를 찾을 수 없습니다"));
}

#[test]
fn test_chat_keeps_prompting_when_service_is_unreachable() {
    let dir = TempDir::new().unwrap();
    saju_chat(&dir)
        .env("GOOGLE_API_KEY", "test-key")
        .args(["chat", "--api-base", "http://127.0.0.1:1/v1beta"])
        .write_stdin("hello\n/reset\n/quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("⚠️  failed to open a consultation").count(4))
        .stdout(predicate::str::contains("👤 > "));
}

#[tokio::test]
async fn test_chat_consultation_with_key_from_secrets_file() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/v1beta/models/gemini-2.5-flash"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "name": "models/gemini-2.5-flash" })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/gemini-2.5-flash:generateContent"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "role": "model", "parts": [{ "text": "알겠네" }] } }]
        })))
        .mount(&server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("secrets.toml"), "GOOGLE_API_KEY = \"from-secrets\"\n").unwrap();
    let api_base = format!("{}/v1beta", server.uri());

    let assert = tokio::task::spawn_blocking(move || {
        saju_chat(&dir)
            .args(["chat", "--main", "생활운세", "--sub", "오늘의 운세", "--model", "gemini-2.5-flash"])
            .args(["--api-base", &api_base])
            .write_stdin("김철수, 남자, 1990-01-01, 모름\n/quit\n")
            .assert()
    })
    .await
    .unwrap();

    assert
        .success()
        .stdout(predicate::str::contains("🔮 오늘의 운세"))
        .stdout(predicate::str::contains("어서오게. [오늘의 운세]"))
        .stdout(predicate::str::contains("🔮 알겠네"));
}
