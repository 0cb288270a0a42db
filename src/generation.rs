use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

use crate::chat::{ChatMessage, ChatOptions, StructuredChat};
use crate::errors::GenerationError;
use crate::regions::{Region, RegionKind};
use crate::shape::{FieldType, TargetShape};
use crate::trail::{Coordinates, Difficulty, NewTrail, RouteType};

const GENERATION_TEMPERATURE: f64 = 0.2;
const BASE_TOKEN_BUDGET: u32 = 300;
const TOKENS_PER_TRAIL: u32 = 180;
const MAX_TOKEN_BUDGET: u32 = 6_000;
const MILES_PER_KILOMETER: f64 = 0.621_371;
const FEET_PER_METER: f64 = 3.280_84;

#[derive(Debug, Clone)]
pub struct GenerationResult {
    pub region: Region,
    pub trails: Vec<NewTrail>,
    pub returned: usize,
    pub rejected: usize,
    pub cost_usd: f64,
}

#[async_trait]
pub trait TrailGenerator: Send + Sync {
    async fn generate(&self, region: &Region) -> Result<GenerationResult, GenerationError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotAnObject,
    MissingName,
    InvalidDistance,
    InvalidElevation,
    UnknownDifficulty,
    UnknownRouteType,
    UnknownUnit,
    OverLimit,
}

pub struct TrailGenerationTask {
    chat: Arc<dyn StructuredChat>,
}

impl TrailGenerationTask {
    pub fn new(chat: Arc<dyn StructuredChat>) -> Self {
        Self { chat }
    }

    // Checked item by item in validate_items, never as part of the envelope.
    pub fn item_shape() -> TargetShape {
        TargetShape::open()
            .required("name", FieldType::String)
            .required("distance", FieldType::Number)
            .optional("distance_unit", FieldType::String)
            .required("elevation_gain", FieldType::Number)
            .optional("elevation_unit", FieldType::String)
            .required("difficulty", FieldType::String)
            .required("route_type", FieldType::String)
            .optional("city", FieldType::String)
            .optional("latitude", FieldType::Number)
            .optional("longitude", FieldType::Number)
    }

    pub fn response_shape() -> TargetShape {
        TargetShape::open().required("trails", FieldType::array_of(FieldType::Any))
    }

    pub fn build_messages(region: &Region) -> Vec<ChatMessage> {
        let place = match region.kind {
            RegionKind::Park => format!("{} National Park ({})", region.name, region.country_name),
            RegionKind::Subdivision => format!("{}, {}", region.name, region.country_name),
        };
        let system = "You are a meticulous hiking guide editor. Only list real, named, \
                      verifiable hiking trails that exist today. Never invent trails.";
        let user = format!(
            "List up to {limit} popular hiking trails in {place}. Return an object with a \
             \"trails\" array whose entries look like {item}. distance is the full hike \
             length and elevation_gain the total climb. difficulty is one of Easy, Moderate, \
             Hard, Very Hard. route_type is one of Loop, Out & Back, Point to Point. city is \
             the nearest town; latitude and longitude locate the trailhead. Distances are in \
             miles and elevations in feet unless distance_unit is \"km\" or elevation_unit \
             is \"m\".",
            limit = region.limit,
            item = Self::item_shape().describe(),
        );
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }

    pub fn token_budget(limit: usize) -> u32 {
        let limit = u32::try_from(limit).unwrap_or(u32::MAX);
        BASE_TOKEN_BUDGET
            .saturating_add(TOKENS_PER_TRAIL.saturating_mul(limit))
            .min(MAX_TOKEN_BUDGET)
    }
}

#[async_trait]
impl TrailGenerator for TrailGenerationTask {
    async fn generate(&self, region: &Region) -> Result<GenerationResult, GenerationError> {
        let options = ChatOptions {
            temperature: GENERATION_TEMPERATURE,
            max_tokens: Self::token_budget(region.limit),
            model: None,
        };
        let response = self
            .chat
            .request_structured(
                &Self::build_messages(region),
                &Self::response_shape(),
                &options,
            )
            .await
            .map_err(|cause| GenerationError::new(region.id.clone(), cause))?;

        let items = response
            .value
            .get("trails")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let (trails, rejected) = validate_items(&items, region);
        info!(
            target: "trail_generation",
            region = %region.id,
            returned = items.len(),
            accepted = trails.len(),
            rejected,
            cost_usd = response.cost_usd,
            "region generation settled"
        );

        Ok(GenerationResult {
            region: region.clone(),
            returned: items.len(),
            trails,
            rejected,
            cost_usd: response.cost_usd,
        })
    }
}

// Items past the region cap count as rejected.
pub fn validate_items(items: &[Value], region: &Region) -> (Vec<NewTrail>, usize) {
    let mut trails = Vec::with_capacity(items.len().min(region.limit));
    let mut rejected = 0;
    for (index, item) in items.iter().enumerate() {
        let outcome = if trails.len() >= region.limit {
            Err(RejectReason::OverLimit)
        } else {
            candidate_from_item(item, region)
        };
        match outcome {
            Ok(trail) => trails.push(trail),
            Err(reason) => {
                debug!(
                    target: "trail_generation",
                    region = %region.id,
                    index,
                    ?reason,
                    "dropping generated item"
                );
                rejected += 1;
            }
        }
    }
    (trails, rejected)
}

pub fn candidate_from_item(item: &Value, region: &Region) -> Result<NewTrail, RejectReason> {
    let object = item.as_object().ok_or(RejectReason::NotAnObject)?;

    let name = object
        .get("name")
        .and_then(Value::as_str)
        .map(collapse_whitespace)
        .filter(|name| !name.is_empty())
        .ok_or(RejectReason::MissingName)?;

    let distance_miles = match object.get("distance") {
        Some(value) => {
            let raw = value.as_f64().ok_or(RejectReason::InvalidDistance)?;
            raw * distance_factor(object.get("distance_unit"))?
        }
        None => object
            .get("distance_miles")
            .and_then(Value::as_f64)
            .ok_or(RejectReason::InvalidDistance)?,
    };
    let distance_miles = round_to(distance_miles, 2);
    if !distance_miles.is_finite() || distance_miles <= 0.0 {
        return Err(RejectReason::InvalidDistance);
    }

    let elevation_ft = match object.get("elevation_gain") {
        Some(value) => {
            let raw = value.as_f64().ok_or(RejectReason::InvalidElevation)?;
            raw * elevation_factor(object.get("elevation_unit"))?
        }
        None => object
            .get("elevation_gain_ft")
            .and_then(Value::as_f64)
            .ok_or(RejectReason::InvalidElevation)?,
    };
    if !elevation_ft.is_finite() || elevation_ft < 0.0 {
        return Err(RejectReason::InvalidElevation);
    }

    let difficulty = object
        .get("difficulty")
        .and_then(Value::as_str)
        .and_then(Difficulty::parse)
        .ok_or(RejectReason::UnknownDifficulty)?;

    let route_type = object
        .get("route_type")
        .and_then(Value::as_str)
        .and_then(RouteType::parse)
        .ok_or(RejectReason::UnknownRouteType)?;

    let city = object
        .get("city")
        .and_then(Value::as_str)
        .map(collapse_whitespace)
        .filter(|city| !city.is_empty());

    let coordinates = match (
        object.get("latitude").and_then(Value::as_f64),
        object.get("longitude").and_then(Value::as_f64),
    ) {
        (Some(lat), Some(lon)) => Coordinates::new(lat, lon),
        _ => None,
    };

    Ok(NewTrail {
        name,
        country_code: region.country_code.clone(),
        region_code: region.id.clone(),
        region_name: region.name.clone(),
        city,
        distance_miles,
        elevation_gain_ft: elevation_ft.round() as i64,
        difficulty,
        route_type: Some(route_type),
        coordinates,
        is_seed: false,
    })
}

fn distance_factor(unit: Option<&Value>) -> Result<f64, RejectReason> {
    match unit_label(unit)?.as_deref() {
        None | Some("mi" | "mile" | "miles") => Ok(1.0),
        Some("km" | "kilometer" | "kilometers" | "kilometre" | "kilometres") => {
            Ok(MILES_PER_KILOMETER)
        }
        Some(_) => Err(RejectReason::UnknownUnit),
    }
}

fn elevation_factor(unit: Option<&Value>) -> Result<f64, RejectReason> {
    match unit_label(unit)?.as_deref() {
        None | Some("ft" | "foot" | "feet") => Ok(1.0),
        Some("m" | "meter" | "meters" | "metre" | "metres") => Ok(FEET_PER_METER),
        Some(_) => Err(RejectReason::UnknownUnit),
    }
}

fn unit_label(unit: Option<&Value>) -> Result<Option<String>, RejectReason> {
    match unit {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(label)) => {
            let label = label.trim().trim_end_matches('.').to_ascii_lowercase();
            Ok((!label.is_empty()).then_some(label))
        }
        Some(_) => Err(RejectReason::UnknownUnit),
    }
}

fn collapse_whitespace(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10_f64.powi(places);
    (value * factor).round() / factor
}
