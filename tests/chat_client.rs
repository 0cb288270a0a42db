use std::time::Duration;

use httptest::matchers::{all_of, contains, request};
use httptest::responders::{cycle, json_encoded, status_code, Responder};
use httptest::{Expectation, Server};
use secrecy::SecretString;
use serde_json::{json, Value};
use tempfile::tempdir;

use trail_importer::chat::{
    ChatMessage, ChatOptions, RetryPolicy, StructuredChat, StructuredChatClient,
};
use trail_importer::shape::{FieldType, TargetShape};
use trail_importer::{AppConfig, AppError, ChatError, ErrorKind};

const COMPLETIONS: &str = "/v1/chat/completions";

fn client_for(server: &Server) -> StructuredChatClient {
    let dir = tempdir().unwrap();
    let mut config = AppConfig::with_defaults(dir.path());
    config.chat_api_key = Some(SecretString::from("sk-test".to_string()));
    config.chat_api_base = server.url_str("/v1");
    StructuredChatClient::new(&config)
        .unwrap()
        .with_retry_policy(RetryPolicy::new(3, Duration::ZERO, Duration::ZERO))
}

fn completion(content: &str, usage: Option<Value>) -> Value {
    let mut body = json!({
        "id": "chatcmpl-1",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    });
    if let Some(usage) = usage {
        body["usage"] = usage;
    }
    body
}

fn standard_usage() -> Option<Value> {
    Some(json!({ "prompt_tokens": 1000, "completion_tokens": 500, "total_tokens": 1500 }))
}

fn shape() -> TargetShape {
    TargetShape::open().required("trails", FieldType::array_of(FieldType::Any))
}

async fn ask(client: &StructuredChatClient) -> Result<trail_importer::chat::StructuredResponse, ChatError> {
    client
        .request_structured(
            &[ChatMessage::user("List trails in Utah")],
            &shape(),
            &ChatOptions::default(),
        )
        .await
}

#[tokio::test]
async fn retries_transient_failure_then_succeeds() {
    let server = Server::run();
    let responders: Vec<Box<dyn Responder>> = vec![
        Box::new(status_code(503)),
        Box::new(json_encoded(completion(
            r#"{"trails":[{"name":"Angels Landing"}]}"#,
            standard_usage(),
        ))),
    ];
    server.expect(
        Expectation::matching(request::method_path("POST", COMPLETIONS))
            .times(2)
            .respond_with(cycle(responders)),
    );

    let response = ask(&client_for(&server)).await.unwrap();
    assert_eq!(response.value["trails"][0]["name"], "Angels Landing");
    assert!((response.cost_usd - 0.000_45).abs() < 1e-12);
    assert_eq!(response.model, "gpt-4o-mini");
}

#[tokio::test]
async fn client_error_fails_without_retry() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", COMPLETIONS))
            .times(1)
            .respond_with(status_code(400).body(r#"{"error":{"message":"bad model"}}"#)),
    );

    let err = ask(&client_for(&server)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ClientRequestError);
    match err {
        ChatError::ClientRequest { status, message } => {
            assert_eq!(status, 400);
            assert!(message.contains("bad model"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn persistent_server_error_exhausts_after_four_attempts() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", COMPLETIONS))
            .times(4)
            .respond_with(status_code(500)),
    );

    let err = ask(&client_for(&server)).await.unwrap_err();
    match err {
        ChatError::UpstreamUnavailable {
            attempts,
            last_fault,
        } => {
            assert_eq!(attempts, 4);
            assert!(last_fault.contains("500"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn rate_limit_is_retried() {
    let server = Server::run();
    let responders: Vec<Box<dyn Responder>> = vec![
        Box::new(status_code(429)),
        Box::new(status_code(429)),
        Box::new(json_encoded(completion(r#"{"trails":[]}"#, standard_usage()))),
    ];
    server.expect(
        Expectation::matching(request::method_path("POST", COMPLETIONS))
            .times(3)
            .respond_with(cycle(responders)),
    );

    let response = ask(&client_for(&server)).await.unwrap();
    assert_eq!(response.value["trails"], json!([]));
}

#[tokio::test]
async fn non_json_content_is_a_schema_failure() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", COMPLETIONS))
            .times(1)
            .respond_with(json_encoded(completion("not json", standard_usage()))),
    );

    let err = ask(&client_for(&server)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaValidationError);
    assert!((err.cost_usd() - 0.000_45).abs() < 1e-12);
}

#[tokio::test]
async fn shape_violation_is_a_schema_failure() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", COMPLETIONS))
            .times(1)
            .respond_with(json_encoded(completion(
                r#"{"trails":"none"}"#,
                standard_usage(),
            ))),
    );

    let err = ask(&client_for(&server)).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SchemaValidationError);
    assert!(err.to_string().contains("$.trails"));
    assert!((err.cost_usd() - 0.000_45).abs() < 1e-12);
}

#[tokio::test]
async fn schema_failure_without_usage_costs_nothing() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", COMPLETIONS))
            .times(1)
            .respond_with(json_encoded(completion(r#"{"hikes":[]}"#, None))),
    );

    let err = ask(&client_for(&server)).await.unwrap_err();
    match err {
        ChatError::SchemaValidation { reason, cost_usd } => {
            assert!(reason.contains("trails"));
            assert_eq!(cost_usd, 0.0);
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn missing_usage_reports_zero_cost() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", COMPLETIONS))
            .respond_with(json_encoded(completion(r#"{"trails":[]}"#, None))),
    );

    let response = ask(&client_for(&server)).await.unwrap();
    assert_eq!(response.cost_usd, 0.0);
    assert!(response.usage.is_none());
}

#[tokio::test]
async fn sends_bearer_credential_and_json_mode() {
    let server = Server::run();
    server.expect(
        Expectation::matching(all_of!(
            request::method_path("POST", COMPLETIONS),
            request::headers(contains(("authorization", "Bearer sk-test"))),
        ))
        .respond_with(json_encoded(completion(r#"{"trails":[]}"#, standard_usage()))),
    );

    assert!(ask(&client_for(&server)).await.is_ok());
}

#[test]
fn missing_credential_is_a_configuration_error() {
    let dir = tempdir().unwrap();
    let config = AppConfig::with_defaults(dir.path());
    assert!(matches!(
        StructuredChatClient::new(&config),
        Err(AppError::Config(_))
    ));

    let mut blank = AppConfig::with_defaults(dir.path());
    blank.chat_api_key = Some(SecretString::from("   ".to_string()));
    assert!(matches!(
        StructuredChatClient::new(&blank),
        Err(AppError::Config(_))
    ));
}
