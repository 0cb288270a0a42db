use std::sync::Arc;
use std::time::Duration;

use httptest::matchers::request;
use httptest::responders::{cycle, json_encoded, Responder};
use httptest::{Expectation, Server};
use parking_lot::Mutex;
use secrecy::SecretString;
use serde_json::{json, Value};
use tempfile::tempdir;

use trail_importer::chat::{RetryPolicy, StructuredChatClient};
use trail_importer::commands::{last_import, list_trails, run_import, ImportRequest};
use trail_importer::db::bootstrap;
use trail_importer::generation::TrailGenerationTask;
use trail_importer::regions::{RegionCatalog, RegionEnumerator, RegionScope};
use trail_importer::store::SqliteTrailStore;
use trail_importer::{AppConfig, AppError, AppState, ErrorKind, ImportOrchestrator};

const COMPLETIONS: &str = "/v1/chat/completions";

fn config_for(server: &Server, data_dir: &std::path::Path) -> AppConfig {
    let mut config = AppConfig::with_defaults(data_dir);
    config.chat_api_key = Some(SecretString::from("sk-test".to_string()));
    config.chat_api_base = server.url_str("/v1");
    config
}

fn completion(content: Value) -> Value {
    json!({
        "model": "gpt-4o-mini",
        "choices": [{ "message": { "role": "assistant", "content": content.to_string() } }],
        "usage": { "prompt_tokens": 1000, "completion_tokens": 500 }
    })
}

fn trail_batch() -> Value {
    completion(json!({
        "trails": [
            {
                "name": "Angels Landing", "distance": 5.4, "elevation_gain": 1488,
                "difficulty": "Hard", "route_type": "Out & Back", "city": "Springdale",
                "latitude": 37.2692, "longitude": -112.9469
            },
            {
                "name": "angels  landing!", "distance": 5.4, "elevation_gain": 1488,
                "difficulty": "Hard", "route_type": "Out & Back"
            },
            {
                "name": "Delicate Arch", "distance": 4.8, "distance_unit": "km",
                "elevation_gain": 146, "elevation_unit": "m",
                "difficulty": "moderate", "route_type": "out and back"
            },
            {
                "name": "Broken Trail", "distance": -3, "elevation_gain": 100,
                "difficulty": "Easy", "route_type": "Loop"
            }
        ]
    }))
}

fn orchestrator(config: &AppConfig, store: SqliteTrailStore) -> ImportOrchestrator {
    let chat = StructuredChatClient::new(config)
        .unwrap()
        .with_retry_policy(RetryPolicy::new(3, Duration::ZERO, Duration::ZERO));
    let catalog = RegionCatalog::empty().with_subdivisions(
        "US",
        "United States",
        &[("UT", "Utah"), ("AZ", "Arizona")],
    );
    ImportOrchestrator::new(
        RegionEnumerator::new(Arc::new(catalog), RegionScope::Subdivisions),
        Arc::new(TrailGenerationTask::new(Arc::new(chat))),
        Arc::new(store),
    )
    .with_concurrency(1)
}

fn sqlite_store(data_dir: &std::path::Path) -> SqliteTrailStore {
    let ctx = bootstrap(data_dir, "pipeline.db").unwrap();
    SqliteTrailStore::new(Arc::new(Mutex::new(ctx.connection)))
}

#[tokio::test]
async fn failing_region_does_not_stop_the_run() {
    let server = Server::run();
    let responders: Vec<Box<dyn Responder>> = vec![
        Box::new(json_encoded(trail_batch())),
        Box::new(json_encoded(json!({
            "model": "gpt-4o-mini",
            "choices": [{ "message": { "role": "assistant", "content": "not json" } }],
            "usage": { "prompt_tokens": 1000, "completion_tokens": 500 }
        }))),
    ];
    server.expect(
        Expectation::matching(request::method_path("POST", COMPLETIONS))
            .times(2)
            .respond_with(cycle(responders)),
    );

    let dir = tempdir().unwrap();
    let config = config_for(&server, dir.path());
    let store = sqlite_store(dir.path());
    let summary = orchestrator(&config, store.clone()).run("us", 10).await;

    assert_eq!(summary.regions_total, 2);
    assert_eq!(summary.regions_processed, 2);
    assert_eq!(summary.trails_created, 2);
    assert_eq!(summary.trails_skipped, 1);
    assert_eq!(summary.trails_rejected, 1);
    assert_eq!(summary.errors.len(), 1);
    assert_eq!(summary.errors["AZ"].kind, ErrorKind::SchemaValidationError);
    // The rejected AZ completion was still billed.
    assert!((summary.total_cost_usd - 0.0009).abs() < 1e-12);
    assert!(!summary.cancelled);

    let trails = list_trails_from(&store, "UT");
    assert_eq!(trails.len(), 2);
    let arch = trails.iter().find(|t| t.name == "Delicate Arch").unwrap();
    assert!((arch.distance_miles - 2.98).abs() < 1e-9);
    assert_eq!(arch.elevation_gain_ft, 479);
}

fn list_trails_from(store: &SqliteTrailStore, region: &str) -> Vec<trail_importer::trail::Trail> {
    store.list_trails("US", Some(region)).unwrap()
}

#[tokio::test]
async fn second_run_skips_everything_created_by_the_first() {
    let server = Server::run();
    server.expect(
        Expectation::matching(request::method_path("POST", COMPLETIONS))
            .times(4)
            .respond_with(json_encoded(trail_batch())),
    );

    let dir = tempdir().unwrap();
    let config = config_for(&server, dir.path());
    let store = sqlite_store(dir.path());
    let orchestrator = orchestrator(&config, store.clone());

    let first = orchestrator.run("US", 10).await;
    let second = orchestrator.run("US", 10).await;

    assert_eq!(first.trails_created, 4);
    assert_eq!(first.trails_returned(), 8);
    assert_eq!(second.trails_created, 0);
    assert_eq!(second.trails_skipped, first.trails_created + first.trails_skipped);
    assert_eq!(second.trails_returned(), 8);
    assert_eq!(store.count().unwrap(), 4);
    assert!((second.total_cost_usd - 0.0009).abs() < 1e-12);
}

#[tokio::test]
async fn commands_surface_configuration_faults_only() {
    let dir = tempdir().unwrap();
    let state = AppState::initialize(AppConfig::with_defaults(dir.path())).unwrap();
    let err = run_import(
        &state,
        ImportRequest {
            country_code: "US".into(),
            limit_per_state: 10,
            scope: None,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[tokio::test]
async fn unknown_country_completes_with_empty_summary() {
    let server = Server::run();
    let dir = tempdir().unwrap();
    let state = AppState::initialize(config_for(&server, dir.path())).unwrap();

    let summary = run_import(
        &state,
        ImportRequest {
            country_code: "zz".into(),
            limit_per_state: 2,
            scope: Some(RegionScope::Parks),
        },
    )
    .await
    .unwrap();

    assert_eq!(summary.country_code, "ZZ");
    assert_eq!(summary.limit_per_region, 5);
    assert_eq!(summary.regions_total, 0);
    assert_eq!(summary.total_cost_usd, 0.0);
    assert!(summary.errors.is_empty());
    assert_eq!(last_import(&state, "ZZ").unwrap(), Some(summary));
    assert!(list_trails(&state, "ZZ", None).unwrap().is_empty());
}
