use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::errors::{AppError, AppResult};
use crate::regions::{RegionCatalog, RegionEnumerator, RegionScope};
use crate::store::{SeedWrite, SqliteTrailStore};
use crate::trail::{Difficulty, NewTrail};

#[derive(Debug, Clone, Deserialize)]
pub struct SeedFile {
    #[serde(default)]
    pub hikes: Vec<SeedHike>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedHike {
    pub name: String,
    pub country_code: String,
    pub state_code: Option<String>,
    #[serde(default)]
    pub distance_miles: Option<f64>,
    #[serde(default)]
    pub elevation_gain_ft: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedSummary {
    pub created: usize,
    pub updated: usize,
    pub skipped: usize,
}

pub fn load_seed_file(path: &Path) -> AppResult<SeedFile> {
    let contents = fs::read_to_string(path).map_err(|err| {
        AppError::Path(format!("unable to read seed file {}: {err}", path.display()))
    })?;
    Ok(serde_json::from_str(&contents)?)
}

pub fn apply_seed(store: &SqliteTrailStore, seed: &SeedFile, reset: bool) -> AppResult<SeedSummary> {
    if reset {
        let removed = store.clear()?;
        info!(target: "seed", removed, "cleared existing trails");
    }

    let regions = RegionEnumerator::new(RegionCatalog::builtin(), RegionScope::Subdivisions);
    let mut summary = SeedSummary::default();
    for hike in &seed.hikes {
        let Some(trail) = seed_trail(hike, &regions) else {
            warn!(target: "seed", name = %hike.name, "skipping incomplete seed entry");
            summary.skipped += 1;
            continue;
        };
        match store.save_seed(&trail)? {
            SeedWrite::Created => summary.created += 1,
            SeedWrite::Updated => summary.updated += 1,
        }
    }

    info!(
        target: "seed",
        created = summary.created,
        updated = summary.updated,
        skipped = summary.skipped,
        "seed trails applied"
    );
    Ok(summary)
}

fn seed_trail(hike: &SeedHike, regions: &RegionEnumerator) -> Option<NewTrail> {
    let name = hike.name.trim();
    let distance_miles = hike.distance_miles.filter(|d| d.is_finite() && *d > 0.0)?;
    if name.is_empty() {
        return None;
    }
    let elevation_gain_ft = hike
        .elevation_gain_ft
        .filter(|e| e.is_finite() && *e >= 0.0)
        .map(|e| e.round() as i64)
        .unwrap_or(0);

    let country_code = hike.country_code.trim().to_ascii_uppercase();
    let region_code = hike
        .state_code
        .as_deref()
        .map(str::trim)
        .unwrap_or_default()
        .to_string();
    let region_name = regions
        .list_regions(&country_code, 0)
        .into_iter()
        .find(|region| region.id.eq_ignore_ascii_case(&region_code))
        .map(|region| region.name)
        .unwrap_or_else(|| region_code.clone());

    Some(NewTrail {
        name: name.to_string(),
        country_code,
        region_code,
        region_name,
        city: None,
        distance_miles,
        elevation_gain_ft,
        difficulty: Difficulty::estimate(distance_miles, elevation_gain_ft),
        route_type: None,
        coordinates: None,
        is_seed: true,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tempfile::tempdir;

    use super::*;
    use crate::db::open_in_memory;
    use crate::store::TrailStore;
    use crate::trail::NaturalKey;

    const SEED: &str = r#"{
        "hikes": [
            { "name": "Angels Landing", "countryCode": "US", "stateCode": "UT",
              "distanceMiles": 5.4, "elevationGainFt": 1488 },
            { "name": "Grinnell Glacier", "countryCode": "us", "stateCode": "MT",
              "distanceMiles": 10.6, "elevationGainFt": 1600 },
            { "name": "Nameless", "countryCode": "US", "stateCode": "UT" }
        ]
    }"#;

    fn store() -> SqliteTrailStore {
        SqliteTrailStore::new(Arc::new(Mutex::new(open_in_memory().unwrap())))
    }

    #[tokio::test]
    async fn creates_then_updates_seed_trails() {
        let store = store();
        let seed: SeedFile = serde_json::from_str(SEED).unwrap();

        let first = apply_seed(&store, &seed, false).unwrap();
        assert_eq!(
            first,
            SeedSummary {
                created: 2,
                updated: 0,
                skipped: 1
            }
        );
        let second = apply_seed(&store, &seed, false).unwrap();
        assert_eq!(second.created, 0);
        assert_eq!(second.updated, 2);

        let trail = store
            .find_by_natural_key(&NaturalKey::new("Grinnell Glacier", "US", "MT"))
            .await
            .unwrap()
            .unwrap();
        assert!(trail.is_seed);
        assert_eq!(trail.region_name, "Montana");
        assert_eq!(trail.difficulty, Difficulty::Hard);
    }

    #[test]
    fn reset_clears_existing_trails() {
        let store = store();
        let seed: SeedFile = serde_json::from_str(SEED).unwrap();
        apply_seed(&store, &seed, false).unwrap();
        let again = apply_seed(&store, &seed, true).unwrap();
        assert_eq!(again.created, 2);
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn loads_seed_from_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("preloaded.json");
        std::fs::write(&path, SEED).unwrap();
        assert_eq!(load_seed_file(&path).unwrap().hikes.len(), 3);
        assert!(matches!(
            load_seed_file(&dir.path().join("missing.json")),
            Err(AppError::Path(_))
        ));
    }
}
