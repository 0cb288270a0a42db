use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    Moderate,
    Hard,
    #[serde(rename = "Very Hard")]
    VeryHard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Moderate => "Moderate",
            Difficulty::Hard => "Hard",
            Difficulty::VeryHard => "Very Hard",
        }
    }

    /// Case-insensitive match that ignores spaces, `_` and `-`.
    pub fn parse(value: &str) -> Option<Self> {
        match squash(value).as_str() {
            "easy" => Some(Difficulty::Easy),
            "moderate" => Some(Difficulty::Moderate),
            "hard" => Some(Difficulty::Hard),
            "veryhard" => Some(Difficulty::VeryHard),
            _ => None,
        }
    }

    pub fn estimate(distance_miles: f64, elevation_gain_ft: i64) -> Self {
        if distance_miles >= 8.0 || elevation_gain_ft >= 2500 {
            Difficulty::Hard
        } else if distance_miles >= 5.0 || elevation_gain_ft >= 1500 {
            Difficulty::Moderate
        } else {
            Difficulty::Easy
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RouteType {
    Loop,
    #[serde(rename = "Out & Back")]
    OutAndBack,
    #[serde(rename = "Point to Point")]
    PointToPoint,
}

impl RouteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Loop => "Loop",
            RouteType::OutAndBack => "Out & Back",
            RouteType::PointToPoint => "Point to Point",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match squash(&value.replace('&', "and")).as_str() {
            "loop" => Some(RouteType::Loop),
            "outandback" => Some(RouteType::OutAndBack),
            "pointtopoint" => Some(RouteType::PointToPoint),
            _ => None,
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lon: f64) -> Option<Self> {
        let valid = lat.is_finite()
            && lon.is_finite()
            && (-90.0..=90.0).contains(&lat)
            && (-180.0..=180.0).contains(&lon);
        valid.then_some(Self { lat, lon })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct NaturalKey {
    pub name_key: String,
    pub country_code: String,
    pub region_code: String,
}

impl NaturalKey {
    pub fn new(name: &str, country_code: &str, region_code: &str) -> Self {
        Self {
            name_key: normalize_name(name),
            country_code: country_code.trim().to_ascii_uppercase(),
            region_code: region_code.trim().to_ascii_lowercase(),
        }
    }
}

impl fmt::Display for NaturalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.country_code, self.region_code, self.name_key
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTrail {
    pub name: String,
    pub country_code: String,
    pub region_code: String,
    pub region_name: String,
    pub city: Option<String>,
    pub distance_miles: f64,
    pub elevation_gain_ft: i64,
    pub difficulty: Difficulty,
    pub route_type: Option<RouteType>,
    pub coordinates: Option<Coordinates>,
    pub is_seed: bool,
}

impl NewTrail {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.name, &self.country_code, &self.region_code)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Trail {
    pub id: i64,
    pub name: String,
    pub country_code: String,
    pub region_code: String,
    pub region_name: String,
    pub city: Option<String>,
    pub distance_miles: f64,
    pub elevation_gain_ft: i64,
    pub difficulty: Difficulty,
    pub route_type: Option<RouteType>,
    pub coordinates: Option<Coordinates>,
    pub average_rating: Option<f64>,
    pub review_count: Option<i64>,
    pub is_seed: bool,
    pub created_at: String,
}

impl Trail {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey::new(&self.name, &self.country_code, &self.region_code)
    }
}

// Apostrophes vanish so "Angel's" and "Angels" share a key; every other run
// of non-alphanumerics becomes one space.
pub fn normalize_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '\'' | '\u{2019}'))
        .collect::<String>()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

fn squash(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}
