use crate::dtos::{
    parse_limit, DeleteResponse, IpListResponse, LimitParams, SaveMessageRequest,
    SaveMessageResponse, SearchParams, SearchResponse, SessionListResponse, SessionResponse,
    StatsResponse,
};
use crate::extract::{ApiJson, ApiPath, ApiQuery};
use crate::models::NewMessage;
use crate::services::repository::{
    DEFAULT_HISTORY_LIMIT, DEFAULT_IP_LIST_LIMIT, DEFAULT_SEARCH_LIMIT,
};
use crate::startup::AppState;
use axum::{
    extract::State,
    response::IntoResponse,
    Json,
};
use service_core::error::AppError;

#[tracing::instrument(skip(state, request))]
pub async fn save_message(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SaveMessageRequest>,
) -> Result<impl IntoResponse, AppError> {
    let message = NewMessage::try_from(request)?;
    let outcome = state.repository.append_message(message).await?;

    Ok(Json(SaveMessageResponse::new(&outcome.session, outcome.created)))
}

#[tracing::instrument(skip(state))]
pub async fn get_session(
    State(state): State<AppState>,
    ApiPath(session_id): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let session = state.repository.get_by_session(&session_id).await?;

    Ok(Json(SessionResponse {
        success: true,
        data: session.into(),
    }))
}

#[tracing::instrument(skip(state, params))]
pub async fn get_history(
    State(state): State<AppState>,
    ApiPath(ip_address): ApiPath<String>,
    ApiQuery(params): ApiQuery<LimitParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_HISTORY_LIMIT);
    let sessions = state.repository.get_by_ip(&ip_address, limit).await?;

    Ok(Json(SessionListResponse::from(sessions)))
}

#[tracing::instrument(skip(state, params))]
pub async fn search_messages(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<SearchParams>,
) -> Result<impl IntoResponse, AppError> {
    let query = params.query.unwrap_or_default();
    if query.trim().is_empty() {
        return Err(AppError::validation("Search query is required"));
    }
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_SEARCH_LIMIT);

    let sessions = state
        .repository
        .search_messages(&query, params.ip_address.as_deref(), limit)
        .await?;
    let listing = SessionListResponse::from(sessions);

    Ok(Json(SearchResponse {
        success: true,
        count: listing.count,
        data: listing.data,
        query,
    }))
}

#[tracing::instrument(skip(state))]
pub async fn get_stats(
    State(state): State<AppState>,
    ApiPath(ip_address): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let stats = state.repository.stats_by_ip(&ip_address).await?;

    Ok(Json(StatsResponse {
        success: true,
        data: stats.into(),
    }))
}

#[tracing::instrument(skip(state))]
pub async fn delete_by_ip(
    State(state): State<AppState>,
    ApiPath(ip_address): ApiPath<String>,
) -> Result<impl IntoResponse, AppError> {
    let deleted_count = state.repository.delete_by_ip(&ip_address).await?;

    Ok(Json(DeleteResponse {
        success: true,
        message: format!(
            "Deleted {} chat sessions for IP {}",
            deleted_count,
            ip_address.trim()
        ),
        deleted_count,
    }))
}

#[tracing::instrument(skip(state, params))]
pub async fn list_ips(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<LimitParams>,
) -> Result<impl IntoResponse, AppError> {
    let limit = parse_limit(params.limit.as_deref(), DEFAULT_IP_LIST_LIMIT);
    let listing = state.repository.list_distinct_ips(limit).await?;

    Ok(Json(IpListResponse {
        success: true,
        count: listing.ips.len(),
        data: listing.ips,
        total: listing.total,
    }))
}
