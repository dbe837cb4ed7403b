//! HTTP façade: a small JSON API over the RCON client, plus the static GUI.

use std::path::Path;
use std::sync::Arc;

use axum::{
    extract::{Path as UrlPath, Request, State},
    http::{header, HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Json, Router,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use log::{error, info, warn};
use minecontrol_rcon::{AsyncClient, ErrorKind};
use serde::Serialize;
use tower_http::services::ServeDir;

use crate::players::PlayerList;

const LIST_COMMAND: &str = "/list";

/// Shared by every handler. The client is the one the server was started with.
pub struct AppState {
    pub rcon: Arc<AsyncClient>,
    /// `address:port` of the RCON server, for display.
    pub target: String,
    pub credentials: Option<Credentials>,
}

/// HTTP basic auth username and password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
struct ApiInfo {
    name: &'static str,
    version: &'static str,
    rcon: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    online: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max: Option<u32>,
}

#[derive(Debug, Serialize)]
struct UserStatus {
    username: String,
    online: bool,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

/// An RCON failure, answered with a 5xx status.
struct ApiError(minecontrol_rcon::Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::NotConnected => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::BAD_GATEWAY,
        };
        let message = crate::report(&self.0);
        error!("RCON command failed: {}", message);

        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<minecontrol_rcon::Error> for ApiError {
    fn from(err: minecontrol_rcon::Error) -> Self {
        ApiError(err)
    }
}

pub fn router(state: Arc<AppState>, assets: &Path) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::to("/gui/") }))
        .nest_service("/gui", ServeDir::new(assets))
        .route("/api", get(api_root))
        .route("/api/users", get(users_root))
        .route("/api/users/:username", get(user_status))
        .layer(middleware::from_fn_with_state(state.clone(), basic_auth))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>, assets: &Path) -> std::io::Result<()> {
    if state.credentials.is_none() {
        warn!("No HTTP username configured, the API is open to anyone who can reach it");
    }

    let app = router(state, assets);
    let listener = tokio::net::TcpListener::bind(("0.0.0.0", port)).await?;

    info!("Starting server on port {}", port);
    axum::serve(listener, app).await
}

async fn list_players(state: &AppState) -> Result<PlayerList, ApiError> {
    let output = state.rcon.execute(LIST_COMMAND).await?;
    Ok(PlayerList::parse(&output))
}

async fn api_root(State(state): State<Arc<AppState>>) -> Result<Json<ApiInfo>, ApiError> {
    let players = list_players(&state).await?;

    Ok(Json(ApiInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
        rcon: state.target.clone(),
        online: players.online,
        max: players.max,
    }))
}

async fn users_root(State(state): State<Arc<AppState>>) -> Result<Json<PlayerList>, ApiError> {
    Ok(Json(list_players(&state).await?))
}

async fn user_status(
    State(state): State<Arc<AppState>>,
    UrlPath(username): UrlPath<String>,
) -> Result<Json<UserStatus>, ApiError> {
    let players = list_players(&state).await?;

    Ok(Json(UserStatus {
        online: players.contains(&username),
        username,
    }))
}

async fn basic_auth(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let credentials = match &state.credentials {
        Some(credentials) => credentials,
        None => return next.run(request).await,
    };

    if authorized(request.headers(), credentials) {
        next.run(request).await
    } else {
        (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, "Basic realm=\"minecontrol\"")],
            "Unauthorized",
        )
            .into_response()
    }
}

fn authorized(headers: &HeaderMap, credentials: &Credentials) -> bool {
    let encoded = match headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Basic "))
    {
        Some(encoded) => encoded.trim(),
        None => return false,
    };

    let decoded = match BASE64.decode(encoded).ok().and_then(|d| String::from_utf8(d).ok()) {
        Some(decoded) => decoded,
        None => return false,
    };

    match decoded.split_once(':') {
        Some((username, password)) => {
            username == credentials.username && password == credentials.password
        }
        None => false,
    }
}
