//! HTTP API.
//!
//! `GET /api/nowplaying?station=ID` answers `200 {"title": ...}` when the
//! station currently announces a title, `204` when it does not (or cannot be
//! reached), and `400` for ids outside the allow-list.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::{Query, State},
    http::{header, Method, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, info};

use nowplaying_proto::protocol::{ApiError, NowPlaying, StationInfo};
use nowplaying_proto::stations::StationTable;
use nowplaying_proto::IcyFetcher;

#[derive(Clone)]
pub struct HttpState {
    fetcher: IcyFetcher,
    stations: Arc<StationTable>,
}

impl HttpState {
    pub fn new(fetcher: IcyFetcher, stations: StationTable) -> Self {
        Self {
            fetcher,
            stations: Arc::new(stations),
        }
    }
}

#[derive(Debug, Deserialize)]
struct NowPlayingQuery {
    station: Option<String>,
}

pub fn router(state: HttpState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET]);

    Router::new()
        .route("/api/nowplaying", get(now_playing))
        .route("/api/stations", get(list_stations))
        .layer(cors)
        .with_state(state)
}

/// Serve until `shutdown` is cancelled.
pub async fn serve(
    bind_address: &str,
    port: u16,
    state: HttpState,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = format!("{}:{}", bind_address, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind HTTP API to {}", addr))?;

    info!("HTTP API listening on http://{}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("HTTP API stopped");
    Ok(())
}

async fn now_playing(
    State(state): State<HttpState>,
    Query(query): Query<NowPlayingQuery>,
) -> Response {
    let requested = query.station.unwrap_or_default();
    let Some(station) = state.stations.lookup(&requested) else {
        debug!("HTTP API: unsupported station {:?}", requested);
        return (
            StatusCode::BAD_REQUEST,
            Json(ApiError::unsupported_station()),
        )
            .into_response();
    };

    match state.fetcher.fetch_title(&station.url).await {
        Some(title) => {
            info!("HTTP API: {} now playing {:?}", station.id, title);
            (
                [(header::CACHE_CONTROL, "no-store")],
                Json(NowPlaying { title }),
            )
                .into_response()
        }
        None => {
            debug!("HTTP API: no title for {}", station.id);
            (StatusCode::NO_CONTENT, [(header::CACHE_CONTROL, "no-store")]).into_response()
        }
    }
}

async fn list_stations(State(state): State<HttpState>) -> Json<Vec<StationInfo>> {
    Json(state.stations.infos())
}
