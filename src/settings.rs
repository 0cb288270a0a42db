use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::warn;

use crate::db::now_timestamp;
use crate::errors::AppResult;

const LAST_SUMMARY_PREFIX: &str = "import.last_summary.";

#[derive(Clone)]
pub struct SettingsStore {
    db: Arc<Mutex<Connection>>,
}

impl SettingsStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.db.lock();
        let value = conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                [key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.db.lock();
        conn.execute(
            "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now_timestamp()],
        )?;
        Ok(())
    }

    /// Reads a JSON value. A stored value that no longer parses is treated as
    /// absent.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> AppResult<Option<T>> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Ok(Some(value)),
            Err(err) => {
                warn!(
                    target: "settings",
                    key,
                    error = ?err,
                    "stored setting is not valid json; ignoring"
                );
                Ok(None)
            }
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> AppResult<()> {
        let serialized = serde_json::to_string(value)?;
        self.set(key, &serialized)
    }
}

pub fn last_summary_key(country_code: &str) -> String {
    format!(
        "{LAST_SUMMARY_PREFIX}{}",
        country_code.trim().to_ascii_uppercase()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{bootstrap, open_in_memory};
    use serde_json::{json, Value};
    use tempfile::tempdir;

    fn store() -> SettingsStore {
        SettingsStore::new(Arc::new(Mutex::new(open_in_memory().unwrap())))
    }

    #[test]
    fn set_overwrites_previous_value() {
        let settings = store();
        assert_eq!(settings.get("import.mode").unwrap(), None);
        settings.set("import.mode", "parks").unwrap();
        settings.set("import.mode", "subdivisions").unwrap();
        assert_eq!(
            settings.get("import.mode").unwrap().as_deref(),
            Some("subdivisions")
        );
    }

    #[test]
    fn json_values_survive_reopen() {
        let dir = tempdir().unwrap();
        let key = last_summary_key("us");
        {
            let ctx = bootstrap(dir.path(), "settings.db").unwrap();
            let settings = SettingsStore::new(Arc::new(Mutex::new(ctx.connection)));
            settings
                .set_json(&key, &json!({ "trailsCreated": 4 }))
                .unwrap();
        }
        let ctx = bootstrap(dir.path(), "settings.db").unwrap();
        let settings = SettingsStore::new(Arc::new(Mutex::new(ctx.connection)));
        let value: Value = settings.get_json(&key).unwrap().unwrap();
        assert_eq!(key, "import.last_summary.US");
        assert_eq!(value["trailsCreated"], 4);
    }

    #[test]
    fn malformed_json_reads_as_absent() {
        let settings = store();
        settings.set("broken", "{not json").unwrap();
        let value: Option<Value> = settings.get_json("broken").unwrap();
        assert!(value.is_none());
    }
}
