//! `/api/statistics/*` (§4.7), grounded on
//! `examples/original_source/app/services/statistics_service.py`. Every
//! aggregate's parameter is clamped inside the `Store` methods themselves
//! (§8), so these handlers pass the raw query value straight through.

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::store::stats::{DailyPoint, HourlyDedup, NetdiskShare, Overview};

use super::extractors::Viewer;
use super::ApiState;

#[derive(Debug, Deserialize, Default)]
pub struct DaysQuery {
    pub days: Option<i64>,
}

#[derive(Debug, Deserialize, Default)]
pub struct HoursQuery {
    pub hours: Option<i64>,
}

pub async fn overview(State(state): State<ApiState>, _viewer: Viewer) -> Result<Json<Overview>, AppError> {
    Ok(Json(state.store.overview(crate::time::now_local())?))
}

pub async fn daily_trend(
    State(state): State<ApiState>,
    _viewer: Viewer,
    Query(query): Query<DaysQuery>,
) -> Result<Json<Vec<DailyPoint>>, AppError> {
    Ok(Json(state.store.daily_trend(query.days.unwrap_or(7), crate::time::now_local())?))
}

pub async fn dedup_stats(
    State(state): State<ApiState>,
    _viewer: Viewer,
    Query(query): Query<HoursQuery>,
) -> Result<Json<Vec<HourlyDedup>>, AppError> {
    Ok(Json(state.store.dedup_stats_by_hour(query.hours.unwrap_or(24), crate::time::now_local())?))
}

pub async fn netdisk_distribution(
    State(state): State<ApiState>,
    _viewer: Viewer,
    Query(query): Query<HoursQuery>,
) -> Result<Json<Vec<NetdiskShare>>, AppError> {
    Ok(Json(state.store.netdisk_distribution(query.hours.unwrap_or(24), crate::time::now_local())?))
}
