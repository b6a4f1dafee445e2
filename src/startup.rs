use std::{net::SocketAddr, sync::Arc};

use axum::{
    Json, Router,
    extract::Extension,
    http::{
        HeaderValue, Method, StatusCode,
        header::{ACCEPT, CACHE_CONTROL, CONTENT_TYPE},
    },
    response::IntoResponse,
    routing::{get, post},
};
use serde_json::json;
use tokio::net::TcpListener;
use tower_cookies::{CookieManagerLayer, Key};
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use crate::config::ServerConfig;
use crate::polls::{create_poll, get_poll, vote_on_poll};
use crate::socket::{RoomSender, poll_room_ws, room_channel};
use crate::store::{PollStore, StorePool};
use crate::voter::cookie_key;

#[derive(Clone)]
pub struct AppState {
    pub store: StorePool,
    pub rooms: RoomSender,
    pub config: Arc<ServerConfig>,
    pub cookie_key: Key,
}

impl AppState {
    pub fn new(config: ServerConfig) -> Self {
        AppState {
            store: PollStore::new_pool(),
            rooms: room_channel(config.room_buffer),
            cookie_key: cookie_key(&config.secret_key),
            config: Arc::new(config),
        }
    }
}

pub fn build_router(app_state: AppState) -> Router {
    let cors = cors_layer(&app_state.config);

    Router::new()
        .route("/health", get(healthcheck))
        .route("/api/polls", post(create_poll))
        .route("/api/polls/:poll_id", get(get_poll))
        .route("/api/polls/:poll_id/vote", post(vote_on_poll))
        .route("/ws", get(poll_room_ws))
        .layer(Extension(app_state))
        .layer(CookieManagerLayer::new())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .fallback(handler_404)
}

/// Serves the poll API on `listener` until the process stops.
pub async fn serve(listener: TcpListener, app_state: AppState) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!("listening on {addr}");
    }

    axum::serve(
        listener,
        build_router(app_state).into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}

fn cors_layer(config: &ServerConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!("ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_credentials(true)
        .allow_methods([Method::POST, Method::GET, Method::OPTIONS])
        .allow_headers([CONTENT_TYPE, ACCEPT, CACHE_CONTROL])
}

async fn healthcheck() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn handler_404() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "Not found." })))
}
