use std::sync::Arc;

use anyhow::Result;
use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode, Uri},
    response::Html,
    routing::get,
    Json, Router,
};
use storefront_core::canonical::DEFAULT_HOST;
use storefront_core::{get_server_state, CanonicalUrl, PageLayout, PagePayload, SearchClient, SearchError, MAIN_INDEX};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Runtime settings that are not part of the page layout.
#[derive(Debug, Clone)]
pub struct AppSettings {
    pub index_name: String,
    /// Host used when a request carries no `host` header.
    pub fallback_host: String,
}

impl Default for AppSettings {
    fn default() -> Self {
        Self { index_name: MAIN_INDEX.to_string(), fallback_host: DEFAULT_HOST.to_string() }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub client: Arc<dyn SearchClient>,
    pub layout: Arc<PageLayout>,
    pub settings: Arc<AppSettings>,
}

pub fn build_app(settings: AppSettings, client: Arc<dyn SearchClient>) -> Result<Router> {
    let layout = PageLayout::catalog_for(&settings.index_name);
    layout.validate()?;
    tracing::info!(index = %layout.index_name, fallback_host = %settings.fallback_host, "page layout ready");
    let app_state = AppState { client, layout: Arc::new(layout), settings: Arc::new(settings) };

    // CORS: read CORS_ALLOW_ORIGIN (comma-separated) or allow Any by default
    let cors = match std::env::var("CORS_ALLOW_ORIGIN") {
        Ok(val) => {
            let origins: Vec<_> = val.split(',').filter_map(|s| s.trim().parse().ok()).collect();
            if origins.is_empty() {
                CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
            } else {
                CorsLayer::new().allow_origin(AllowOrigin::list(origins)).allow_methods(Any).allow_headers(Any)
            }
        }
        Err(_) => CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any),
    };

    let app = Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/", get(page_handler))
        .route("/api/page-props", get(page_props_handler))
        .with_state(app_state)
        .layer(TraceLayer::new_for_http())
        .layer(cors);
    Ok(app)
}

fn header_str<'a>(headers: &'a HeaderMap, name: header::HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn canonical_url(state: &AppState, headers: &HeaderMap, path_and_query: &str) -> CanonicalUrl {
    CanonicalUrl::from_parts(
        header_str(headers, header::REFERER),
        header_str(headers, header::HOST),
        path_and_query,
        &state.settings.fallback_host,
    )
}

fn backend_error(err: SearchError) -> (StatusCode, String) {
    tracing::error!(error = %err, "search state precomputation failed");
    (StatusCode::BAD_GATEWAY, err.to_string())
}

async fn precompute(state: &AppState, url: CanonicalUrl) -> Result<(PagePayload, String), (StatusCode, String)> {
    let render = get_server_state(&state.layout, &url, state.client.as_ref()).await.map_err(backend_error)?;
    Ok((PagePayload::from_render(&render), render.markup))
}

/// Full search page: markup rendered from the precomputed results plus the embedded payload.
pub async fn page_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Html<String>, (StatusCode, String)> {
    let path_and_query = uri.path_and_query().map(|p| p.as_str()).unwrap_or("/");
    let url = canonical_url(&state, &headers, path_and_query);
    let (payload, markup) = precompute(&state, url).await?;
    let document = payload
        .render_document(&state.layout, &markup)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(Html(document))
}

/// Page properties alone, for navigations that already have the page shell.
/// The query string is interpreted as the search page's own.
pub async fn page_props_handler(
    State(state): State<AppState>,
    headers: HeaderMap,
    uri: Uri,
) -> Result<Json<PagePayload>, (StatusCode, String)> {
    let path_and_query = match uri.query() {
        Some(q) if !q.is_empty() => format!("/?{q}"),
        _ => "/".to_string(),
    };
    let url = canonical_url(&state, &headers, &path_and_query);
    let (payload, _) = precompute(&state, url).await?;
    Ok(Json(payload))
}
