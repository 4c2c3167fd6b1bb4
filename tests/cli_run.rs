//! Runs the compiled binary against a mock Kroger API.

use serde_json::{Value, json};
use std::path::Path;
use tokio::process::Command;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const BIN: &str = env!("CARGO_BIN_EXE_grocery-sniper");

fn write_config(dir: &Path, base_url: &str, terms: &[&str]) -> String {
    let config = json!({
        "source": { "kind": "kroger", "base_url": base_url, "location_ids": ["70300123"] },
        "terms": terms,
        "pagination": { "page_size": 50, "page_delay_ms": 0 },
        "retry": { "max_attempts": 2, "base_delay_ms": 0 }
    });
    let path = dir.join("config.json");
    std::fs::write(&path, config.to_string()).unwrap();
    path.display().to_string()
}

async fn run(config: &str, output: &Path) -> std::process::Output {
    Command::new(BIN)
        .arg(output)
        .arg("--config")
        .arg(config)
        .env("KROGER_CLIENT_ID", "test-client")
        .env("KROGER_CLIENT_SECRET", "test-secret")
        .env_remove("RUST_LOG")
        .output()
        .await
        .unwrap()
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/connect/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "access_token": "tok" })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn partial_failure_keeps_successful_units_and_exits_2() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/products"))
        .and(query_param("filter.term", "milk"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [
                {
                    "productId": "1",
                    "description": "Whole Milk",
                    "items": [{ "price": { "regular": 3.19 } }]
                },
                { "productId": "2" },
                { "productId": "3", "description": "Skim Milk" }
            ],
            "meta": { "pagination": { "total": 3, "start": 0, "limit": 50 } }
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/v1/products"))
        .and(query_param("filter.term", "bread"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &server.uri(), &["milk", "bread"]);
    let output = dir.path().join("results.json");

    let out = run(&config, &output).await;
    assert_eq!(out.status.code(), Some(2), "stderr: {}", String::from_utf8_lossy(&out.stderr));

    let written: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    let milk = written["70300123/milk"].as_array().unwrap();
    assert_eq!(milk.len(), 2);
    assert_eq!(milk[0]["price"], 3.19);
    assert!(milk[1]["price"].is_null());
    assert!(written.get("70300123/bread").is_none());
}

#[tokio::test]
async fn full_success_exits_0() {
    let server = MockServer::start().await;
    mount_token(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/products"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": [{ "productId": "9", "description": "Banana" }],
            "meta": { "pagination": { "total": 1, "start": 0, "limit": 50 } }
        })))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &server.uri(), &["banana"]);
    let output = dir.path().join("results.json");

    let out = run(&config, &output).await;
    assert_eq!(out.status.code(), Some(0), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let written: Value = serde_json::from_str(&std::fs::read_to_string(&output).unwrap()).unwrap();
    assert_eq!(written["70300123/banana"][0]["name"], "Banana");
}

#[tokio::test]
async fn missing_config_exits_1_without_output() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("results.json");
    let missing = dir.path().join("nope.json");

    let out = run(&missing.display().to_string(), &output).await;
    assert_eq!(out.status.code(), Some(1));
    assert!(!output.exists());
}

#[tokio::test]
async fn rejected_startup_credentials_exit_1() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/connect/oauth2/token"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let dir = tempfile::tempdir().unwrap();
    let config = write_config(dir.path(), &server.uri(), &["milk"]);
    let output = dir.path().join("results.json");

    let out = run(&config, &output).await;
    assert_eq!(out.status.code(), Some(1));
    assert!(!output.exists());
}
