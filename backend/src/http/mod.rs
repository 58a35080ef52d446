// HTTP handlers and routing.

use std::net::SocketAddr;

use axum::async_trait;
use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{BodyStream, ConnectInfo, DefaultBodyLimit, FromRequest, State as AxumState};
use axum::http::{header, Request, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Form, Json, Router};
use futures::StreamExt;
use tracing::{info, warn};

use crate::app::AppState;
use crate::constants::{INGEST_PATH, STREAMOFF_COMMAND, STREAMON_COMMAND};
use crate::error::{Error, Result};
use crate::ws::viewer_socket;

mod types;
pub use types::*;

const VIEWER_PAGE: &str = include_str!("../../static/index.html");

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/command", post(command))
        .route("/streamon", post(streamon))
        .route("/streamoff", post(streamoff))
        .route(
            INGEST_PATH,
            post(ingest_stream).layer(DefaultBodyLimit::disable()),
        )
        .route("/telemetry", get(telemetry))
        .route("/health", get(health))
        .with_state(app_state)
}

/// Viewer page for plain requests; WebSocket upgrades become video viewers.
async fn index(
    AxumState(app_state): AxumState<AppState>,
    remote: Option<ConnectInfo<SocketAddr>>,
    ws: Option<WebSocketUpgrade>,
) -> Response {
    match ws {
        Some(ws) => {
            let remote = remote.map(|ConnectInfo(addr)| addr);
            let hub = app_state.hub.clone();
            ws.on_upgrade(move |socket| viewer_socket(socket, hub, remote))
                .into_response()
        }
        None => Html(VIEWER_PAGE).into_response(),
    }
}

/// `CommandRequest` from either a JSON or a urlencoded form body.
pub struct CommandPayload(pub CommandRequest);

#[async_trait]
impl<S, B> FromRequest<S, B> for CommandPayload
where
    Json<CommandRequest>: FromRequest<S, B>,
    Form<CommandRequest>: FromRequest<S, B>,
    S: Send + Sync,
    B: Send + 'static,
{
    type Rejection = Response;

    async fn from_request(
        req: Request<B>,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let is_form = req
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map_or(false, |value| {
                value.starts_with("application/x-www-form-urlencoded")
            });

        if is_form {
            let Form(payload) = Form::<CommandRequest>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(payload))
        } else {
            let Json(payload) = Json::<CommandRequest>::from_request(req, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(payload))
        }
    }
}

async fn command(
    AxumState(app_state): AxumState<AppState>,
    CommandPayload(payload): CommandPayload,
) -> StatusCode {
    if payload.command.is_empty() {
        info!("empty command ignored");
        return StatusCode::OK;
    }
    info!(command = %payload.command, "command requested");
    app_state.commands.send(&payload.command).await;
    StatusCode::OK
}

async fn streamon(AxumState(app_state): AxumState<AppState>) -> StatusCode {
    info!("starting stream");
    app_state.dispatcher.dispatch(STREAMON_COMMAND).await;
    StatusCode::OK
}

async fn streamoff(AxumState(app_state): AxumState<AppState>) -> StatusCode {
    info!("stopping stream");
    app_state.dispatcher.dispatch(STREAMOFF_COMMAND).await;
    StatusCode::OK
}

/// Transcoder output. The request stays open for as long as the transcoder writes.
async fn ingest_stream(
    AxumState(app_state): AxumState<AppState>,
    remote: Option<ConnectInfo<SocketAddr>>,
    mut body: BodyStream,
) -> StatusCode {
    let remote = remote.map(|ConnectInfo(addr)| addr);
    info!(?remote, "stream connected");

    let mut chunks: u64 = 0;
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => {
                chunks += 1;
                forward_chunk(&app_state, chunk).await;
            }
            Err(err) => {
                warn!(?err, ?remote, "stream read failed");
                break;
            }
        }
    }

    info!(?remote, chunks, "stream disconnected");
    StatusCode::OK
}

async fn forward_chunk(app_state: &AppState, chunk: Bytes) {
    if chunk.is_empty() {
        return;
    }
    app_state.hub.broadcast(chunk).await;
}

async fn telemetry(AxumState(app_state): AxumState<AppState>) -> impl IntoResponse {
    let frame = app_state.telemetry.borrow().clone();
    Json(TelemetryResponse { frame })
}

async fn health(AxumState(app_state): AxumState<AppState>) -> impl IntoResponse {
    let relay = *app_state.relay_state.borrow();
    let transcoder = *app_state.transcoder.borrow();
    Json(HealthResponse {
        status: "ok",
        relay,
        transcoder,
        viewers: app_state.hub.viewer_count().await,
    })
}

pub fn bind_listener(addr: SocketAddr) -> Result<std::net::TcpListener> {
    let listener = std::net::TcpListener::bind(addr)
        .and_then(|listener| listener.set_nonblocking(true).map(|_| listener))
        .map_err(|source| Error::Bind {
            what: "http",
            addr,
            source,
        })?;
    Ok(listener)
}

/// Serves the API on an already bound listener until the server fails.
pub async fn serve(listener: std::net::TcpListener, app_state: AppState) -> Result<()> {
    let app = router(app_state);
    axum::Server::from_tcp(listener)
        .map_err(|err| Error::Server(err.to_string()))?
        .serve(app.into_make_service_with_connect_info::<SocketAddr>())
        .await
        .map_err(|err| Error::Server(err.to_string()))
}
