//! Purpose: Expose a memory host over the JSON `/v0` bridge protocol.
//! Exports: `ServeConfig`, `serve`.
//! Role: Axum server the HTTP gateway talks to; the host side of the CLI.
//! Invariants: Bodies are the `hostlist::api::wire` types; error kinds stay stable.
//! Invariants: Host calls block, so they run on the blocking pool.
//! Invariants: Loopback-only unless explicitly allowed.

use axum::extract::{DefaultBodyLimit, Path as AxumPath, State};
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Serialize;
use serde_json::json;
use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::trace::TraceLayer;

use hostlist::api::wire::{
    DoneBody, ErrorBody, ErrorEnvelope, FetchBody, FetchedBody, KeyBody, ListInfoBody,
    OpenListBody, OpenedListBody, ReceiveBody, RecordBody, RemoveBody, ReplyBody, SendBody,
};
use hostlist::api::{Error, ErrorKind, ListHandle, QueueIdentity, RemoteCallGateway};
use hostlist::host::MemoryHost;

#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub bind: SocketAddr,
    pub token: Option<String>,
    pub queues: Vec<QueueIdentity>,
    pub allow_non_loopback: bool,
    pub max_body_bytes: usize,
}

struct AppState {
    host: Arc<MemoryHost>,
    token: Option<String>,
}

pub async fn serve(config: ServeConfig) -> Result<(), Error> {
    validate_config(&config)?;

    let host = Arc::new(MemoryHost::new());
    for queue in &config.queues {
        host.create_queue(queue)?;
    }
    let state = Arc::new(AppState {
        host,
        token: config.token,
    });

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/v0/lists/open", post(open_list))
        .route("/v0/lists/:handle/length", post(list_length))
        .route("/v0/lists/:handle/entries", post(fetch_entries))
        .route("/v0/lists/:handle", delete(close_list))
        .route("/v0/receive", post(receive))
        .route("/v0/send", post(send))
        .route("/v0/reply", post(reply))
        .route("/v0/remove", post(remove))
        .layer(DefaultBodyLimit::max(config.max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Transport)
                .with_message("failed to bind server")
                .with_source(err)
        })?;
    tracing::info!(
        bind = %config.bind,
        queues = ?state.host.queues().iter().map(ToString::to_string).collect::<Vec<_>>(),
        "bridge listening"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
    let server = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        })
        .into_future();
    tokio::pin!(server);

    tokio::select! {
        result = &mut server => {
            result.map_err(|err| {
                Error::new(ErrorKind::Transport)
                    .with_message("server failed")
                    .with_source(err)
            })?;
        }
        _ = shutdown_signal() => {
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(Duration::from_secs(10), &mut server).await {
                Ok(result) => result.map_err(|err| {
                    Error::new(ErrorKind::Transport)
                        .with_message("server failed")
                        .with_source(err)
                })?,
                Err(_) => {
                    return Err(Error::new(ErrorKind::Transport)
                        .with_message("server shutdown timed out"));
                }
            }
        }
    };
    Ok(())
}

fn is_loopback(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(addr) => addr.is_loopback(),
        IpAddr::V6(addr) => addr.is_loopback(),
    }
}

fn validate_config(config: &ServeConfig) -> Result<(), Error> {
    if !is_loopback(config.bind.ip()) && !config.allow_non_loopback {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires explicit opt-in")
            .with_hint("Re-run with --allow-non-loopback or use a loopback address."));
    }
    if !is_loopback(config.bind.ip()) && config.token.is_none() {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("non-loopback bind requires --token")
            .with_hint("Set HOSTLIST_TOKEN or pass --token."));
    }
    if config.max_body_bytes == 0 {
        return Err(Error::new(ErrorKind::Usage)
            .with_message("--max-body-bytes must be greater than zero")
            .with_hint("Use a positive value like 16777216."));
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };
    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(_) => std::future::pending::<()>().await,
        }
    };
    #[cfg(unix)]
    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    #[cfg(not(unix))]
    ctrl_c.await;
}

fn authorize(headers: &HeaderMap, state: &AppState) -> Result<(), Error> {
    let Some(token) = state.token.as_ref() else {
        return Ok(());
    };
    let Some(value) = headers.get(axum::http::header::AUTHORIZATION) else {
        return Err(unauthorized("missing bearer token"));
    };
    let value = value.to_str().unwrap_or_default();
    if value != format!("Bearer {token}") {
        return Err(unauthorized("invalid bearer token"));
    }
    Ok(())
}

fn unauthorized(message: &str) -> Error {
    Error::new(ErrorKind::Usage)
        .with_message(format!("unauthorized: {message}"))
        .with_hint("Pass the bridge token with --token or HOSTLIST_TOKEN.")
}

/// Runs a host call on the blocking pool.
async fn run_blocking<T, F>(state: &AppState, call: F) -> Result<T, Error>
where
    T: Send + 'static,
    F: FnOnce(&MemoryHost) -> Result<T, Error> + Send + 'static,
{
    let host = state.host.clone();
    tokio::task::spawn_blocking(move || call(&host))
        .await
        .map_err(|err| {
            Error::new(ErrorKind::Internal)
                .with_message("host call panicked")
                .with_source(err)
        })?
}

fn parse_handle(raw: &str) -> Result<ListHandle, Error> {
    raw.parse()
}

async fn healthz() -> Response {
    json_response(json!({ "ok": true }))
}

async fn open_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<OpenListBody>,
) -> Response {
    let result = async {
        authorize(&headers, &state)?;
        let request = body.into_request()?;
        let opened = run_blocking(&state, move |host| host.open_list(&request)).await?;
        Ok::<_, Error>(OpenedListBody::from_opened(&opened))
    }
    .await;
    respond(result)
}

async fn list_length(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(handle): AxumPath<String>,
) -> Response {
    let result = async {
        authorize(&headers, &state)?;
        let handle = parse_handle(&handle)?;
        let info = run_blocking(&state, move |host| host.list_length(handle)).await?;
        Ok::<_, Error>(ListInfoBody {
            info: info.encode().to_vec(),
        })
    }
    .await;
    respond(result)
}

async fn fetch_entries(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(handle): AxumPath<String>,
    Json(body): Json<FetchBody>,
) -> Response {
    let result = async {
        authorize(&headers, &state)?;
        let request = body.into_request(parse_handle(&handle)?)?;
        let page = run_blocking(&state, move |host| host.fetch_entries(&request)).await?;
        Ok::<_, Error>(FetchedBody::from_page(&page))
    }
    .await;
    respond(result)
}

async fn close_list(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    AxumPath(handle): AxumPath<String>,
) -> Response {
    let result = async {
        authorize(&headers, &state)?;
        let handle = parse_handle(&handle)?;
        run_blocking(&state, move |host| host.close_list(handle)).await?;
        Ok::<_, Error>(DoneBody { ok: true })
    }
    .await;
    respond(result)
}

async fn receive(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ReceiveBody>,
) -> Response {
    let result = async {
        authorize(&headers, &state)?;
        let request = body.into_request()?;
        let record = run_blocking(&state, move |host| host.receive_one(&request)).await?;
        Ok::<_, Error>(RecordBody { record })
    }
    .await;
    respond(result)
}

async fn send(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<SendBody>,
) -> Response {
    let result = async {
        authorize(&headers, &state)?;
        let request = body.into_request()?;
        let key = run_blocking(&state, move |host| host.send_message(&request)).await?;
        Ok::<_, Error>(KeyBody {
            key: key.to_string(),
        })
    }
    .await;
    respond(result)
}

async fn reply(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<ReplyBody>,
) -> Response {
    let result = async {
        authorize(&headers, &state)?;
        let request = body.into_request()?;
        run_blocking(&state, move |host| host.send_reply(&request)).await?;
        Ok::<_, Error>(DoneBody { ok: true })
    }
    .await;
    respond(result)
}

async fn remove(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(body): Json<RemoveBody>,
) -> Response {
    let result = async {
        authorize(&headers, &state)?;
        let request = body.into_request()?;
        run_blocking(&state, move |host| host.remove_messages(&request)).await?;
        Ok::<_, Error>(DoneBody { ok: true })
    }
    .await;
    respond(result)
}

fn respond<T: Serialize>(result: Result<T, Error>) -> Response {
    match result {
        Ok(body) => with_version((StatusCode::OK, Json(body)).into_response()),
        Err(err) => error_response(err),
    }
}

fn json_response(payload: serde_json::Value) -> Response {
    with_version(Json(payload).into_response())
}

fn with_version(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert("hostlist-version", HeaderValue::from_static("0"));
    response
}

fn error_response(err: Error) -> Response {
    let status = match err.kind() {
        ErrorKind::Usage if is_unauthorized(&err) => StatusCode::UNAUTHORIZED,
        ErrorKind::Usage => StatusCode::BAD_REQUEST,
        ErrorKind::Transport => StatusCode::BAD_GATEWAY,
        ErrorKind::ListStatus => StatusCode::LOCKED,
        ErrorKind::Corrupt | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    };
    if status.is_server_error() {
        tracing::warn!(status = status.as_u16(), "{err}");
    }
    let body = ErrorEnvelope {
        error: ErrorBody::from_error(&err),
    };
    with_version((status, Json(body)).into_response())
}

fn is_unauthorized(err: &Error) -> bool {
    err.message()
        .is_some_and(|message| message.starts_with("unauthorized:"))
}
