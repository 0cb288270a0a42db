use std::path::PathBuf;
use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

const DEFAULT_CHAT_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_JOURNAL_BUFFER_MAX_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_JOURNAL_BUFFER_MAX_FILES: usize = 5;
const DEFAULT_IMPORT_CONCURRENCY: usize = 3;
const MAX_IMPORT_CONCURRENCY: usize = 8;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub chat_api_key: Option<SecretString>,
    pub chat_api_base: String,
    pub chat_model: String,
    pub chat_timeout_secs: u64,
    pub chat_price_table: Option<String>,
    pub import_concurrency: usize,
    pub data_dir: PathBuf,
    pub database_file_name: String,
    pub journal_enabled: bool,
    pub journal_batch_size: usize,
    pub journal_buffer_max_bytes: u64,
    pub journal_buffer_max_files: usize,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicAppConfig {
    pub chat_api_base: String,
    pub chat_model: String,
    pub chat_timeout_secs: u64,
    pub has_chat_api_key: bool,
    pub has_custom_price_table: bool,
    pub import_concurrency: usize,
    pub data_dir: String,
    pub database_file_name: String,
    pub journal_enabled: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            chat_api_key: env::var("CHAT_API_KEY")
                .or_else(|_| env::var("OPENAI_API_KEY"))
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            chat_api_base: env::var("CHAT_API_BASE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CHAT_API_BASE.to_string()),
            chat_model: env::var("CHAT_MODEL")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            chat_timeout_secs: parse_u64("CHAT_TIMEOUT_SECS", 60).max(1),
            chat_price_table: env::var("CHAT_PRICE_TABLE")
                .ok()
                .filter(|v| !v.trim().is_empty()),
            import_concurrency: clamp_concurrency(parse_usize(
                "IMPORT_CONCURRENCY",
                DEFAULT_IMPORT_CONCURRENCY,
            )),
            data_dir: env::var("DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("data")),
            database_file_name: env::var("DATABASE_FILE_NAME")
                .unwrap_or_else(|_| "trails.db".to_string()),
            journal_enabled: parse_bool("JOURNAL_ENABLED", true),
            journal_batch_size: parse_usize("JOURNAL_BATCH_SIZE", 16).max(1),
            journal_buffer_max_bytes: parse_u64(
                "JOURNAL_BUFFER_MAX_BYTES",
                DEFAULT_JOURNAL_BUFFER_MAX_BYTES,
            ),
            journal_buffer_max_files: parse_usize(
                "JOURNAL_BUFFER_MAX_FILES",
                DEFAULT_JOURNAL_BUFFER_MAX_FILES,
            )
            .max(1),
        }
    }

    pub fn with_defaults(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            chat_api_key: None,
            chat_api_base: DEFAULT_CHAT_API_BASE.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            chat_timeout_secs: 60,
            chat_price_table: None,
            import_concurrency: DEFAULT_IMPORT_CONCURRENCY,
            data_dir: data_dir.into(),
            database_file_name: "trails.db".to_string(),
            journal_enabled: true,
            journal_batch_size: 16,
            journal_buffer_max_bytes: DEFAULT_JOURNAL_BUFFER_MAX_BYTES,
            journal_buffer_max_files: DEFAULT_JOURNAL_BUFFER_MAX_FILES,
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            chat_api_base: self.chat_api_base.clone(),
            chat_model: self.chat_model.clone(),
            chat_timeout_secs: self.chat_timeout_secs,
            has_chat_api_key: self.chat_api_key.is_some(),
            has_custom_price_table: self.chat_price_table.is_some(),
            import_concurrency: self.import_concurrency,
            data_dir: self.data_dir.to_string_lossy().to_string(),
            database_file_name: self.database_file_name.clone(),
            journal_enabled: self.journal_enabled,
        }
    }
}

pub fn clamp_concurrency(value: usize) -> usize {
    value.clamp(1, MAX_IMPORT_CONCURRENCY)
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_usize(key: &str, default: usize) -> usize {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_public_profile_without_secrets() {
        env::set_var("CHAT_API_KEY", "sk-secret");
        env::set_var("CHAT_MODEL", "gpt-4o");
        env::set_var("DATABASE_FILE_NAME", "custom.db");
        env::set_var("JOURNAL_ENABLED", "false");
        env::set_var("IMPORT_CONCURRENCY", "64");

        let config = AppConfig::from_env();
        let public = config.public_profile();

        assert_eq!(public.database_file_name, "custom.db");
        assert_eq!(public.chat_model, "gpt-4o");
        assert!(!public.journal_enabled);
        assert!(public.has_chat_api_key);
        assert_eq!(public.import_concurrency, MAX_IMPORT_CONCURRENCY);
        let rendered = serde_json::to_string(&public).unwrap();
        assert!(!rendered.contains("sk-secret"));
    }

    #[test]
    fn clamps_concurrency_floor() {
        assert_eq!(clamp_concurrency(0), 1);
        assert_eq!(clamp_concurrency(4), 4);
    }
}
