use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::PublicAppConfig;
use crate::errors::{AppError, AppResult};
use crate::orchestrator::ImportSummary;
use crate::regions::RegionScope;
use crate::seed::{apply_seed, load_seed_file, SeedSummary};
use crate::trail::Trail;
use crate::AppState;

const DEFAULT_LIMIT_PER_STATE: usize = 10;

fn default_limit() -> usize {
    DEFAULT_LIMIT_PER_STATE
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportRequest {
    pub country_code: String,
    #[serde(default = "default_limit")]
    pub limit_per_state: usize,
    #[serde(default)]
    pub scope: Option<RegionScope>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImporterHealth {
    pub db_path: String,
    pub journal_path: String,
    pub journal_pending: usize,
    pub trail_count: usize,
    pub config: PublicAppConfig,
}

pub async fn run_import(state: &AppState, request: ImportRequest) -> AppResult<ImportSummary> {
    run_import_with_cancel(state, request, None).await
}

pub async fn run_import_with_cancel(
    state: &AppState,
    request: ImportRequest,
    cancel: Option<Arc<AtomicBool>>,
) -> AppResult<ImportSummary> {
    let country_code = request.country_code.trim();
    if country_code.is_empty() {
        return Err(AppError::Parse("countryCode is required".into()));
    }
    let orchestrator = state.orchestrator(request.scope.unwrap_or_default())?;
    Ok(orchestrator
        .run_with_cancel(country_code, request.limit_per_state, cancel)
        .await)
}

pub fn last_import(state: &AppState, country_code: &str) -> AppResult<Option<ImportSummary>> {
    state
        .settings()
        .get_json(&crate::settings::last_summary_key(country_code))
}

pub fn list_trails(
    state: &AppState,
    country_code: &str,
    region_code: Option<&str>,
) -> AppResult<Vec<Trail>> {
    state.store().list_trails(country_code, region_code)
}

pub fn seed_trails(
    state: &AppState,
    path: &std::path::Path,
    reset: bool,
) -> AppResult<SeedSummary> {
    let seed = load_seed_file(path)?;
    apply_seed(state.store(), &seed, reset)
}

pub fn importer_health(state: &AppState) -> AppResult<ImporterHealth> {
    Ok(ImporterHealth {
        db_path: state.db_path().to_string_lossy().to_string(),
        journal_path: state.journal().path().to_string_lossy().to_string(),
        journal_pending: state.journal().pending(),
        trail_count: state.store().count()?,
        config: state.config().public_profile(),
    })
}
