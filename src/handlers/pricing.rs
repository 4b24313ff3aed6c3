use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::errors::AppError;
use crate::models::{Location, ServiceClass};
use crate::services::pricing::FareEstimate;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct EstimateQuery {
    pub from: Option<String>,
    pub to: Option<String>,
    pub distance_km: Option<f64>,
    #[serde(alias = "resource_id")]
    pub class: Option<String>,
}

fn parse_location(field: &str, value: Option<&str>) -> Result<Location, AppError> {
    let value = value.ok_or_else(|| AppError::validation(format!("{field} is required")))?;
    Location::parse(value).map_err(|e| AppError::validation(format!("{field}: {e}")))
}

// GET /pricing/estimate?from=lat,lng&to=lat,lng&class=standard
// GET /pricing/estimate?distance_km=12.5&class=premium
pub async fn estimate(
    State(state): State<Arc<AppState>>,
    Query(query): Query<EstimateQuery>,
) -> Result<Json<FareEstimate>, AppError> {
    let class = match query.class.as_deref() {
        None => ServiceClass::Standard,
        Some(c) => ServiceClass::parse(c)
            .ok_or_else(|| AppError::validation(format!("unknown class: {c}")))?,
    };

    let estimate = match query.distance_km {
        Some(d) => state
            .rates
            .estimate(class, d)
            .map_err(|e| AppError::validation(e.to_string()))?,
        None => {
            let from = parse_location("from", query.from.as_deref())?;
            let to = parse_location("to", query.to.as_deref())?;
            state.rates.estimate_between(class, &from, &to)
        }
    };

    Ok(Json(estimate))
}
