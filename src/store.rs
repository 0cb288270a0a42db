use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::trace;

use crate::db::now_timestamp;
use crate::errors::{AppError, AppResult};
use crate::trail::{Coordinates, Difficulty, NaturalKey, NewTrail, RouteType, Trail};

const TRAIL_COLUMNS: &str = "id, name, country_code, region_code, region_name, city, \
     distance_miles, elevation_gain_ft, difficulty, route_type, lat, lon, \
     average_rating, review_count, is_seed, created_at";

#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(Trail),
    Existing(Trail),
}

impl UpsertOutcome {
    pub fn trail(&self) -> &Trail {
        match self {
            UpsertOutcome::Created(trail) | UpsertOutcome::Existing(trail) => trail,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, UpsertOutcome::Created(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedWrite {
    Created,
    Updated,
}

#[async_trait]
pub trait TrailStore: Send + Sync {
    async fn find_by_natural_key(&self, key: &NaturalKey) -> AppResult<Option<Trail>>;

    /// Creates the record, or returns the existing one untouched.
    async fn upsert(&self, trail: NewTrail) -> AppResult<UpsertOutcome>;
}

#[derive(Clone)]
pub struct SqliteTrailStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteTrailStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub fn list_trails(&self, country_code: &str, region_code: Option<&str>) -> AppResult<Vec<Trail>> {
        let conn = self.db.lock();
        let country = country_code.trim().to_ascii_uppercase();
        let trails = match region_code {
            Some(region) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TRAIL_COLUMNS} FROM trails
                    WHERE country_code = ?1 AND LOWER(region_code) = ?2
                    ORDER BY name ASC"
                ))?;
                let rows = stmt
                    .query_map(
                        params![country, region.trim().to_ascii_lowercase()],
                        parse_trail,
                    )?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {TRAIL_COLUMNS} FROM trails WHERE country_code = ?1 ORDER BY name ASC"
                ))?;
                let rows = stmt
                    .query_map([country], parse_trail)?
                    .collect::<Result<Vec<_>, _>>()?;
                rows
            }
        };
        Ok(trails)
    }

    pub fn count(&self) -> AppResult<usize> {
        let conn = self.db.lock();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM trails", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn clear(&self) -> AppResult<usize> {
        let conn = self.db.lock();
        Ok(conn.execute("DELETE FROM trails", [])?)
    }

    pub fn save_seed(&self, trail: &NewTrail) -> AppResult<SeedWrite> {
        let conn = self.db.lock();
        let key = trail.natural_key();
        match find_by_key(&conn, &key)? {
            Some(existing) => {
                conn.execute(
                    "UPDATE trails SET distance_miles = ?1, elevation_gain_ft = ?2 WHERE id = ?3",
                    params![trail.distance_miles, trail.elevation_gain_ft, existing.id],
                )?;
                Ok(SeedWrite::Updated)
            }
            None => {
                insert_trail(&conn, &key, trail)?;
                Ok(SeedWrite::Created)
            }
        }
    }
}

#[async_trait]
impl TrailStore for SqliteTrailStore {
    async fn find_by_natural_key(&self, key: &NaturalKey) -> AppResult<Option<Trail>> {
        let conn = self.db.lock();
        find_by_key(&conn, key)
    }

    async fn upsert(&self, trail: NewTrail) -> AppResult<UpsertOutcome> {
        let mut conn = self.db.lock();
        let key = trail.natural_key();
        let tx = conn.transaction()?;
        if let Some(existing) = find_by_key(&tx, &key)? {
            return Ok(UpsertOutcome::Existing(existing));
        }
        let id = insert_trail(&tx, &key, &trail)?;
        let created = load_trail(&tx, id)?;
        tx.commit()?;
        trace!(target: "trail_store", id, key = %key, "trail created");
        Ok(UpsertOutcome::Created(created))
    }
}

fn find_by_key(conn: &Connection, key: &NaturalKey) -> AppResult<Option<Trail>> {
    conn.query_row(
        &format!(
            "SELECT {TRAIL_COLUMNS} FROM trails
            WHERE name_key = ?1 AND country_code = ?2 AND LOWER(region_code) = ?3
            ORDER BY id ASC LIMIT 1"
        ),
        params![key.name_key, key.country_code, key.region_code],
        parse_trail,
    )
    .optional()
    .map_err(AppError::from)
}

fn load_trail(conn: &Connection, id: i64) -> AppResult<Trail> {
    conn.query_row(
        &format!("SELECT {TRAIL_COLUMNS} FROM trails WHERE id = ?1"),
        [id],
        parse_trail,
    )
    .map_err(AppError::from)
}

fn insert_trail(conn: &Connection, key: &NaturalKey, trail: &NewTrail) -> AppResult<i64> {
    conn.execute(
        "INSERT INTO trails (
            name, name_key, country_code, region_code, region_name, city,
            distance_miles, elevation_gain_ft, difficulty, route_type, lat, lon,
            is_seed, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            trail.name,
            key.name_key,
            key.country_code,
            trail.region_code,
            trail.region_name,
            trail.city,
            trail.distance_miles,
            trail.elevation_gain_ft,
            trail.difficulty.as_str(),
            trail.route_type.map(|route| route.as_str()),
            trail.coordinates.map(|c| c.lat),
            trail.coordinates.map(|c| c.lon),
            trail.is_seed,
            now_timestamp(),
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn parse_trail(row: &Row<'_>) -> rusqlite::Result<Trail> {
    let difficulty: String = row.get(8)?;
    let difficulty = Difficulty::parse(&difficulty)
        .ok_or_else(|| conversion_failure(8, format!("unknown difficulty {difficulty:?}")))?;
    let route_type: Option<String> = row.get(9)?;
    let route_type = match route_type {
        Some(raw) => Some(
            RouteType::parse(&raw)
                .ok_or_else(|| conversion_failure(9, format!("unknown route type {raw:?}")))?,
        ),
        None => None,
    };
    let lat: Option<f64> = row.get(10)?;
    let lon: Option<f64> = row.get(11)?;

    Ok(Trail {
        id: row.get(0)?,
        name: row.get(1)?,
        country_code: row.get(2)?,
        region_code: row.get(3)?,
        region_name: row.get(4)?,
        city: row.get(5)?,
        distance_miles: row.get(6)?,
        elevation_gain_ft: row.get(7)?,
        difficulty,
        route_type,
        coordinates: lat.zip(lon).and_then(|(lat, lon)| Coordinates::new(lat, lon)),
        average_rating: row.get(12)?,
        review_count: row.get(13)?,
        is_seed: row.get(14)?,
        created_at: row.get(15)?,
    })
}

fn conversion_failure(column: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, message.into())
}
