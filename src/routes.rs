use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use crate::news::{NewsAggregator, NewsItem};
use crate::prices::{PriceAggregator, PriceSnapshot};

pub struct AppState {
    pub news: NewsAggregator,
    pub prices: PriceAggregator,
    /// Upper bound for items on the index page
    pub news_limit: usize,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/prices", get(api_prices))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Template structs
#[derive(Template)]
#[template(path = "index.html")]
pub struct IndexTemplate {
    pub news_list: Vec<NewsItem>,
    pub source_count: usize,
}

// Wrapper for HTML responses
struct HtmlTemplate<T>(T);

impl<T: Template> IntoResponse for HtmlTemplate<T> {
    fn into_response(self) -> Response {
        match self.0.render() {
            Ok(html) => Html(html).into_response(),
            Err(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Failed to render template: {}", err),
            )
                .into_response(),
        }
    }
}

/// Raw `?limit=` value; anything that is not a count is ignored.
#[derive(Deserialize)]
pub struct IndexQuery {
    pub limit: Option<String>,
}

impl IndexQuery {
    /// Requested item count, never above `max`.
    pub fn effective_limit(&self, max: usize) -> usize {
        self.limit
            .as_deref()
            .and_then(|limit| limit.trim().parse::<usize>().ok())
            .map_or(max, |limit| limit.min(max))
    }
}

// Route handlers
pub async fn index(
    State(state): State<Arc<AppState>>,
    Query(query): Query<IndexQuery>,
) -> impl IntoResponse {
    let limit = query.effective_limit(state.news_limit);
    let news_list = state.news.fetch_news(limit).await;

    HtmlTemplate(IndexTemplate {
        news_list,
        source_count: state.news.feeds().len(),
    })
}

pub async fn api_prices(State(state): State<Arc<AppState>>) -> Json<PriceSnapshot> {
    Json(state.prices.fetch_prices().await)
}

pub async fn health() -> impl IntoResponse {
    Html("OK")
}
