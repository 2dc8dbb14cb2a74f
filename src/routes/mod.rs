//! HTTP API serving review lookups

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::error::ApiError;
use crate::review_finder::{ReviewFinder, ReviewsPayload};

#[derive(Debug, Deserialize)]
struct ReviewsParams {
    page: Option<String>,
}

pub fn router(finder: Arc<ReviewFinder>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health))
        .route("/api/reviews", get(get_reviews))
        .layer(cors)
        .with_state(finder)
}

pub async fn serve(addr: SocketAddr, finder: Arc<ReviewFinder>) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Review API listening on http://{}", listener.local_addr()?);

    axum::serve(listener, router(finder)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

async fn get_reviews(
    State(finder): State<Arc<ReviewFinder>>,
    Query(params): Query<ReviewsParams>,
) -> Result<Json<ReviewsPayload>, ApiError> {
    let page = params.page.unwrap_or_default();
    finder.find_reviews(&page).await.map(Json)
}
