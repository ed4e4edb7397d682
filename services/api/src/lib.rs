//! Read-only reporting API over the movie revenue warehouse
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /genres - Genre names, sorted
//! - GET /years - Calendar years in the date dimension
//! - GET /rankings/movies?genre=&year=&limit= - Top movies by revenue
//! - GET /rankings/genres?genre=&year=&limit= - Top genres by revenue

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;
use warehouse::report::{self, GenreRanking, MovieRanking, RankingFilter};
use warehouse::Store;

#[derive(Clone)]
pub struct AppState {
    store: Store,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self { store }
    }
}

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Store failure surfaced as a 500 with an `{error}` body
struct ApiError(warehouse::Error);

impl From<warehouse::Error> for ApiError {
    fn from(e: warehouse::Error) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        error!("Request failed: {}", self.0);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                error: self.0.to_string(),
            }),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn genres_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<String>> {
    Ok(Json(report::genres(&state.store).await?))
}

async fn years_handler(State(state): State<Arc<AppState>>) -> ApiResult<Vec<i32>> {
    Ok(Json(report::years(&state.store).await?))
}

async fn top_movies_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RankingFilter>,
) -> ApiResult<Vec<MovieRanking>> {
    Ok(Json(report::top_movies(&state.store, &filter).await?))
}

async fn top_genres_handler(
    State(state): State<Arc<AppState>>,
    Query(filter): Query<RankingFilter>,
) -> ApiResult<Vec<GenreRanking>> {
    Ok(Json(report::top_genres(&state.store, &filter).await?))
}

pub fn build_router(state: AppState) -> Router {
    // CORS for dashboard frontends
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/genres", get(genres_handler))
        .route("/years", get(years_handler))
        .route("/rankings/movies", get(top_movies_handler))
        .route("/rankings/genres", get(top_genres_handler))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}
