//! `/api/messages/*` (§4.7), grounded on
//! `examples/original_source/app/services/message_service.py`.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;

use crate::error::AppError;
use crate::store::messages::{MessageFilter, Page, TimeRange};
use crate::store::stats::TagCount;

use super::extractors::{coerce_guest_filter, Viewer};
use super::ApiState;

#[derive(Debug, Deserialize, Default)]
pub struct MessagesQuery {
    pub query: Option<String>,
    pub time_range: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub providers: Vec<String>,
    pub min_combined_length: Option<i64>,
    #[serde(default)]
    pub links_only: bool,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

impl From<MessagesQuery> for MessageFilter {
    fn from(q: MessagesQuery) -> Self {
        MessageFilter {
            query: q.query,
            time_range: q.time_range.as_deref().map(TimeRange::parse).unwrap_or_default(),
            tags: q.tags,
            providers: q.providers,
            min_combined_length: q.min_combined_length,
            links_only: q.links_only,
            page: q.page.unwrap_or(1),
            page_size: q.page_size.unwrap_or(100),
        }
    }
}

pub async fn list_messages(
    State(state): State<ApiState>,
    viewer: Viewer,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Page>, AppError> {
    let filter: MessageFilter = query.into();
    let filter = match viewer {
        Viewer::User(_) => filter,
        Viewer::Guest => coerce_guest_filter(filter),
    };
    Ok(Json(state.store.get_filtered_messages(&filter)?))
}

pub async fn get_message(
    State(state): State<ApiState>,
    _viewer: Viewer,
    Path(id): Path<i64>,
) -> Result<Json<crate::domain::Message>, AppError> {
    let message = state.store.get_message_by_id(id)?.ok_or_else(|| AppError::NotFound(format!("message {id} not found")))?;
    Ok(Json(message))
}

#[derive(Debug, Deserialize, Default)]
pub struct TagStatsQuery {
    pub limit: Option<i64>,
}

pub async fn tag_stats(
    State(state): State<ApiState>,
    _viewer: Viewer,
    Query(query): Query<TagStatsQuery>,
) -> Result<Json<Vec<TagCount>>, AppError> {
    Ok(Json(state.store.tag_stats(query.limit.unwrap_or(20))?))
}
