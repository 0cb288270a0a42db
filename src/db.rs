use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::{Connection, OpenFlags};
use tracing::info;

use crate::errors::AppResult;

pub struct DatabaseContext {
    pub connection: Connection,
    pub path: PathBuf,
}

pub fn bootstrap<P: AsRef<Path>>(data_dir: P, database_file: &str) -> AppResult<DatabaseContext> {
    let data_dir = data_dir.as_ref();
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join(database_file);

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
    let connection = Connection::open_with_flags(&db_path, flags)?;
    configure(&connection)?;
    run_migrations(&connection)?;
    info!(
        target: "database_bootstrap",
        path = %db_path.display(),
        "trail database ready"
    );

    Ok(DatabaseContext {
        connection,
        path: db_path,
    })
}

pub fn open_in_memory() -> AppResult<Connection> {
    let connection = Connection::open_in_memory()?;
    connection.execute_batch("PRAGMA foreign_keys = ON;")?;
    run_migrations(&connection)?;
    Ok(connection)
}

fn configure(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA foreign_keys = ON;
        "#,
    )?;
    Ok(())
}

fn run_migrations(connection: &Connection) -> AppResult<()> {
    connection.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS trails (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL,
            country_code TEXT NOT NULL,
            region_code TEXT NOT NULL,
            region_name TEXT NOT NULL,
            city TEXT,
            distance_miles REAL NOT NULL CHECK (distance_miles > 0),
            elevation_gain_ft INTEGER NOT NULL DEFAULT 0 CHECK (elevation_gain_ft >= 0),
            difficulty TEXT NOT NULL,
            route_type TEXT,
            lat REAL,
            lon REAL,
            average_rating REAL,
            review_count INTEGER,
            is_seed INTEGER NOT NULL DEFAULT 0 CHECK (is_seed IN (0, 1)),
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL DEFAULT (DATETIME('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_trails_country_region ON trails(country_code, region_code);
        CREATE INDEX IF NOT EXISTS idx_trails_name_key ON trails(name_key);
        "#,
    )?;

    Ok(())
}

pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339()
}
