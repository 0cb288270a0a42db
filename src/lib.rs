pub mod chat;
pub mod commands;
pub mod config;
pub mod db;
pub mod errors;
pub mod generation;
pub mod journal;
pub mod orchestrator;
pub mod pricing;
pub mod regions;
pub mod seed;
pub mod settings;
pub mod shape;
pub mod store;
pub mod trail;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::chat::StructuredChatClient;
use crate::db::{bootstrap, DatabaseContext};
use crate::generation::TrailGenerationTask;
use crate::journal::RunJournal;
use crate::regions::{RegionEnumerator, RegionCatalog, RegionScope};
use crate::settings::SettingsStore;
use crate::store::SqliteTrailStore;

pub use commands::{run_import, ImportRequest};
pub use config::AppConfig;
pub use errors::{AppError, AppResult, ChatError, ErrorKind, GenerationError};
pub use orchestrator::{ImportOrchestrator, ImportSummary, RegionFailure};

pub struct AppState {
    db_path: PathBuf,
    config: AppConfig,
    store: SqliteTrailStore,
    settings: SettingsStore,
    journal: RunJournal,
}

impl AppState {
    pub fn initialize(config: AppConfig) -> AppResult<Self> {
        init_tracing();
        let DatabaseContext { connection, path } =
            bootstrap(&config.data_dir, &config.database_file_name)?;
        let journal = RunJournal::open(&config.data_dir, &config)?;
        let db = Arc::new(Mutex::new(connection));

        info!(
            target: "app_state",
            db = %path.display(),
            journal = %journal.path().display(),
            has_chat_api_key = config.chat_api_key.is_some(),
            "importer state ready"
        );

        Ok(Self {
            store: SqliteTrailStore::new(Arc::clone(&db)),
            settings: SettingsStore::new(db),
            db_path: path,
            config,
            journal,
        })
    }

    pub fn orchestrator(&self, scope: RegionScope) -> AppResult<ImportOrchestrator> {
        let chat = StructuredChatClient::new(&self.config)?;
        let generator = TrailGenerationTask::new(Arc::new(chat));
        Ok(ImportOrchestrator::new(
            RegionEnumerator::new(RegionCatalog::builtin(), scope),
            Arc::new(generator),
            Arc::new(self.store.clone()),
        )
        .with_concurrency(self.config.import_concurrency)
        .with_journal(self.journal.clone())
        .with_settings(self.settings.clone()))
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn store(&self) -> &SqliteTrailStore {
        &self.store
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    pub fn journal(&self) -> &RunJournal {
        &self.journal
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,trail_importer=debug"));
        let _ = tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init();
    });
}
