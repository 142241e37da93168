//! HTTP surface: router, request/response DTOs, and handlers.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::trace::TraceLayer;

use crate::cache::ExportCache;
use crate::config::Config;
use crate::db::{ExportRow, Locale, Store, Tag, TranslationInput, TranslationRecord};
use crate::error::{ErrorBody, ErrorParts, ServiceError, ServiceResult};
use crate::export;
use crate::query::{PageRequest, PageResult, SearchFilters};
use crate::security;

/// Shared state behind every handler.
pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub export_cache: Arc<ExportCache>,
}

impl AppState {
    pub fn new(config: Config, store: Store) -> Self {
        let export_cache = Arc::new(ExportCache::new(Duration::from_secs(
            config.export_cache_ttl_secs,
        )));
        Self {
            config,
            store,
            export_cache,
        }
    }
}

pub fn router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/api/translations", post(create_translation))
        .route("/api/translations/search", get(search_translations))
        .route("/api/translations/export", get(export_all))
        .route(
            "/api/translations/exportByLocalAndTag",
            get(export_by_locale_and_tag),
        )
        .route("/api/translations/export/:file", get(export_bundle))
        .route(
            "/api/translations/:id",
            get(get_translation)
                .put(update_translation)
                .delete(delete_translation),
        )
        .route("/api/locales", post(create_locale).get(list_locales))
        .route(
            "/api/locales/:id",
            get(get_locale).put(update_locale).delete(delete_locale),
        )
        .route("/api/tags", post(create_tag).get(list_tags))
        .route(
            "/api/tags/:id",
            get(get_tag).put(update_tag).delete(delete_tag),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            security::require_api_key,
        ));

    Router::new()
        .merge(api)
        .route("/health", get(health))
        .layer(middleware::from_fn(attach_error_path))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Completes engine error envelopes with the request path.
async fn attach_error_path(req: Request, next: Next) -> Response {
    let path = req.uri().path().to_string();
    let response = next.run(req).await;
    if let Some(parts) = response.extensions().get::<ErrorParts>().cloned() {
        let body = ErrorBody::new(parts.status, &parts.message, &path);
        return (parts.status, Json(body)).into_response();
    }
    response
}

// ==================== Request DTOs ====================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationRequest {
    pub key: Option<String>,
    pub locale_id: Option<i64>,
    pub tag_id: Option<i64>,
    pub content: Option<String>,
}

impl TranslationRequest {
    /// The schema keeps the tag nullable, but the request contract requires
    /// both references to be present.
    fn into_input(self) -> ServiceResult<TranslationInput> {
        let locale_id = self
            .locale_id
            .ok_or_else(|| ServiceError::Validation("Locale is required".into()))?;
        let tag_id = self
            .tag_id
            .ok_or_else(|| ServiceError::Validation("Tag is required".into()))?;
        Ok(TranslationInput {
            key: self.key.unwrap_or_default(),
            locale_id,
            tag_id: Some(tag_id),
            content: self.content.unwrap_or_default(),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct CodeRequest {
    pub code: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NameRequest {
    pub name: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub key: Option<String>,
    pub tag: Option<String>,
    pub content: Option<String>,
    pub page: i64,
    pub size: i64,
}

#[derive(Debug, Deserialize)]
pub struct ExportAllParams {
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_export_size")]
    pub size: i64,
}

// Bulk-transfer endpoint: pages are meant to be large
fn default_export_size() -> i64 {
    10000
}

#[derive(Debug, Deserialize)]
pub struct LocaleTagParams {
    pub locale: String,
    pub tag: Option<String>,
    #[serde(default)]
    pub page: i64,
    #[serde(default = "default_locale_export_size")]
    pub size: i64,
}

fn default_locale_export_size() -> i64 {
    10
}

#[derive(Debug, Deserialize)]
pub struct BundleParams {
    pub tag: Option<String>,
}

// ==================== Response DTOs ====================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageBody<T> {
    pub items: Vec<T>,
    pub current_page: i64,
    pub total_items: i64,
    pub total_pages: i64,
}

impl<T> PageBody<T> {
    fn from_result(result: PageResult<T>) -> Self {
        let total_pages = result.total_pages();
        Self {
            current_page: result.page,
            total_items: result.total_items,
            total_pages,
            items: result.items,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportAllBody {
    pub translations: Vec<ExportRow>,
    pub current_page: i64,
    pub total_items: i64,
    pub total_pages: i64,
    pub processing_time_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LocaleTagExportBody {
    pub data: BTreeMap<String, String>,
    pub current_page: i64,
    pub total_items: i64,
    pub total_pages: i64,
    pub processing_time_ms: u64,
}

#[derive(Debug, Serialize)]
pub struct MessageBody {
    pub message: String,
}

// ==================== Health ====================

async fn health(State(state): State<Arc<AppState>>) -> Result<&'static str, ServiceError> {
    state.store.health_check().await?;
    Ok("OK")
}

// ==================== Translations ====================

async fn create_translation(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TranslationRequest>,
) -> Result<(StatusCode, Json<TranslationRecord>), ServiceError> {
    let input = req.into_input()?;
    let record = state.store.create_translation(&input).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn search_translations(
    State(state): State<Arc<AppState>>,
    Query(params): Query<SearchParams>,
) -> Result<Json<PageBody<TranslationRecord>>, ServiceError> {
    let page = PageRequest::new(params.page, params.size)?;
    let filters = SearchFilters::new(params.key, params.tag, params.content);
    let result = state.store.search_translations(&filters, page).await?;
    Ok(Json(PageBody::from_result(result)))
}

async fn export_all(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ExportAllParams>,
) -> Result<Response, ServiceError> {
    let page = PageRequest::new(params.page, params.size)?;

    // Runs on the worker pool; failures come back through the handle.
    let handle = export::export_all_task(state.store.clone(), state.export_cache.clone(), page);
    let result = handle
        .await
        .map_err(|e| ServiceError::Unexpected(format!("Export task failed: {e}")))??;

    let body = ExportAllBody {
        translations: result.page.translations,
        current_page: result.page.current_page,
        total_items: result.page.total_items,
        total_pages: result.page.total_pages,
        processing_time_ms: result.query_time_ms,
    };
    let max_age = format!("max-age={}", state.export_cache.ttl().as_secs());
    Ok(([(header::CACHE_CONTROL, max_age)], Json(body)).into_response())
}

async fn export_by_locale_and_tag(
    State(state): State<Arc<AppState>>,
    Query(params): Query<LocaleTagParams>,
) -> Result<Response, ServiceError> {
    let page = PageRequest::new(params.page, params.size)?;

    let started = Instant::now();
    let result =
        export::export_json(&state.store, &params.locale, params.tag.as_deref(), page).await?;

    let total_pages = result.total_pages();
    let body = LocaleTagExportBody {
        current_page: result.page,
        total_items: result.total_items,
        total_pages,
        data: export::flatten_pairs(result.items),
        processing_time_ms: started.elapsed().as_millis() as u64,
    };
    Ok((
        [(header::CACHE_CONTROL, "no-cache".to_string())],
        Json(body),
    )
        .into_response())
}

async fn export_bundle(
    State(state): State<Arc<AppState>>,
    Path(file): Path<String>,
    Query(params): Query<BundleParams>,
) -> Result<Response, ServiceError> {
    let Some(locale) = file.strip_suffix(".json") else {
        return Err(ServiceError::NotFound(format!(
            "Unsupported export format: {file}"
        )));
    };

    let bundle = export::export_bundle(&state.store, locale, params.tag.as_deref()).await?;
    if bundle.is_empty() {
        // Absent resource, not an error envelope: bundle consumers key off
        // the status alone.
        return Ok(StatusCode::NOT_FOUND.into_response());
    }

    Ok((
        [(header::CACHE_CONTROL, "max-age=21600".to_string())],
        Json(bundle),
    )
        .into_response())
}

async fn get_translation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<TranslationRecord>, ServiceError> {
    Ok(Json(state.store.get_translation(id).await?))
}

async fn update_translation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<TranslationRequest>,
) -> Result<Json<TranslationRecord>, ServiceError> {
    let input = req.into_input()?;
    Ok(Json(state.store.update_translation(id, &input).await?))
}

async fn delete_translation(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MessageBody>, ServiceError> {
    state.store.delete_translation(id).await?;
    Ok(Json(MessageBody {
        message: "Translation deleted successfully".to_string(),
    }))
}

// ==================== Locales ====================

async fn create_locale(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CodeRequest>,
) -> Result<(StatusCode, Json<Locale>), ServiceError> {
    let locale = state
        .store
        .create_locale(req.code.as_deref().unwrap_or(""))
        .await?;
    Ok((StatusCode::CREATED, Json(locale)))
}

async fn list_locales(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Locale>>, ServiceError> {
    Ok(Json(state.store.list_locales().await?))
}

async fn get_locale(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Locale>, ServiceError> {
    Ok(Json(state.store.get_locale(id).await?))
}

async fn update_locale(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<CodeRequest>,
) -> Result<Json<Locale>, ServiceError> {
    Ok(Json(
        state
            .store
            .update_locale(id, req.code.as_deref().unwrap_or(""))
            .await?,
    ))
}

async fn delete_locale(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    state.store.delete_locale(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ==================== Tags ====================

async fn create_tag(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NameRequest>,
) -> Result<(StatusCode, Json<Tag>), ServiceError> {
    let tag = state
        .store
        .create_tag(req.name.as_deref().unwrap_or(""))
        .await?;
    Ok((StatusCode::CREATED, Json(tag)))
}

async fn list_tags(State(state): State<Arc<AppState>>) -> Result<Json<Vec<Tag>>, ServiceError> {
    Ok(Json(state.store.list_tags().await?))
}

async fn get_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Tag>, ServiceError> {
    Ok(Json(state.store.get_tag(id).await?))
}

async fn update_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(req): Json<NameRequest>,
) -> Result<Json<Tag>, ServiceError> {
    Ok(Json(
        state
            .store
            .update_tag(id, req.name.as_deref().unwrap_or(""))
            .await?,
    ))
}

async fn delete_tag(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ServiceError> {
    state.store.delete_tag(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
