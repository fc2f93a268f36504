//! Development HTTP servers.
//!
//! Two listeners share one current-thread runtime on a dedicated thread:
//! the site on `port`, which either forwards to the configured upstream or
//! serves `dist`, and the control plane on `ui_port`.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::{get, post};
use camino::Utf8PathBuf;
use console::style;
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::info;

use crate::core::{Reload, ReloadKind};
use crate::error::ServerError;
use crate::reload::LiveReload;
use crate::{Environment, Mode};

/// Everything the request handlers need, cheap to clone.
#[derive(Clone)]
pub struct ServerState {
    mode: Mode,
    port: u16,
    upstream: Option<Arc<str>>,
    dist: Utf8PathBuf,
    client: reqwest::Client,
    live: Option<Arc<LiveReload>>,
    script: Option<Arc<str>>,
}

impl ServerState {
    pub fn new(env: &Environment, live: Option<Arc<LiveReload>>) -> Self {
        let config = &env.config;
        Self {
            mode: env.mode,
            port: config.port,
            upstream: config.proxy.as_deref().map(|p| p.trim_end_matches('/').into()),
            dist: config.dist_dir(),
            client: reqwest::Client::new(),
            script: live.as_ref().map(|live| live.script().into()),
            live,
        }
    }

    fn signal(&self, kind: ReloadKind) {
        if let Some(live) = &self.live {
            live.signal(kind);
        }
    }
}

/// Binds both ports, then runs the servers on their own thread. A port that
/// is already taken fails here, before anything is spawned.
pub fn start(
    env: &Environment,
    live: Option<Arc<LiveReload>>,
) -> Result<thread::JoinHandle<Result<(), ServerError>>, ServerError> {
    let config = &env.config;
    let site = bind(config.port)?;
    let ui = bind(config.ui_port)?;
    let state = ServerState::new(env, live);

    Ok(thread::spawn(move || {
        let run = || -> Result<(), ServerError> {
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()?
                .block_on(async move {
                    let site = TcpListener::from_std(site)?;
                    let ui = TcpListener::from_std(ui)?;
                    serve(site, ui, state).await
                })
        };

        let result = run();
        if let Err(e) = &result {
            tracing::error!("server stopped: {e}");
        }
        result
    }))
}

fn bind(port: u16) -> Result<std::net::TcpListener, ServerError> {
    let listener = std::net::TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port)))
        .map_err(|e| ServerError::Bind(port, e))?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

pub async fn serve(site: TcpListener, ui: TcpListener, state: ServerState) -> Result<(), ServerError> {
    let site_port = site.local_addr()?.port();
    let ui_port = ui.local_addr()?.port();

    match &state.upstream {
        Some(upstream) => {
            info!(url = %style(format!("http://localhost:{site_port}/")).yellow(), %upstream, "proxying")
        }
        None => {
            info!(url = %style(format!("http://localhost:{site_port}/")).yellow(), dist = %state.dist, "serving")
        }
    }
    info!(url = %style(format!("http://localhost:{ui_port}/")).yellow(), "control panel");

    tokio::try_join!(
        async { axum::serve(site, router(state.clone())).await },
        async { axum::serve(ui, control_router(state.clone())).await },
    )?;

    Ok(())
}

/// The site router: forwards to the upstream when one is configured,
/// otherwise serves the output directory.
pub fn router(state: ServerState) -> Router {
    let router = match &state.upstream {
        Some(_) => Router::new().fallback(proxy),
        None => Router::new().fallback_service(ServeDir::new(&state.dist)),
    };

    router
        .layer(middleware::from_fn_with_state(state.clone(), inject_script))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

/// The control plane: a status page and manual reload triggers.
pub fn control_router(state: ServerState) -> Router {
    Router::new()
        .route("/", get(status))
        .route("/reload", post(reload_full))
        .route("/reload/css", post(reload_css))
        .layer(middleware::from_fn(log_request))
        .with_state(state)
}

async fn log_request(request: Request, next: Next) -> Response {
    let path = request.uri().path_and_query().map_or("/", |pq| pq.as_str());
    info!(method = %request.method(), "{path}");
    next.run(request).await
}

async fn proxy(State(state): State<ServerState>, request: Request) -> Response {
    match forward(&state, request).await {
        Ok(response) => response,
        Err(e) => {
            tracing::warn!("{e}");
            (StatusCode::BAD_GATEWAY, e.to_string()).into_response()
        }
    }
}

async fn forward(state: &ServerState, request: Request) -> Result<Response, ServerError> {
    let upstream = state.upstream.as_deref().unwrap_or_default();
    let (parts, body) = request.into_parts();
    let path = parts.uri.path_and_query().map_or("/", |pq| pq.as_str());
    let url = format!("{upstream}{path}");

    let body = axum::body::to_bytes(body, usize::MAX)
        .await
        .map_err(|e| ServerError::Proxy(e.to_string()))?;

    let mut headers = parts.headers;
    headers.remove(header::HOST);
    // Plain bodies only, compressed HTML could not get the client script.
    headers.remove(header::ACCEPT_ENCODING);

    let upstream_response = state
        .client
        .request(parts.method, &url)
        .headers(headers)
        .body(body)
        .send()
        .await
        .map_err(|e| ServerError::Proxy(format!("{url}: {e}")))?;

    let status = upstream_response.status();
    let mut headers = upstream_response.headers().clone();
    headers.remove(header::TRANSFER_ENCODING);
    headers.remove(header::CONNECTION);

    let bytes = upstream_response
        .bytes()
        .await
        .map_err(|e| ServerError::Proxy(format!("{url}: {e}")))?;

    let mut response = Response::new(Body::from(bytes));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    Ok(response)
}

async fn inject_script(State(state): State<ServerState>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;
    let Some(script) = &state.script else {
        return response;
    };

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.starts_with("text/html"));
    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::warn!("could not read response body: {e}");
            return StatusCode::BAD_GATEWAY.into_response();
        }
    };

    let html = inject(&String::from_utf8_lossy(&bytes), script);
    parts.headers.remove(header::CONTENT_LENGTH);
    Response::from_parts(parts, Body::from(html))
}

/// Puts `script` right before the last `</body>`, or at the end when there
/// is none.
fn inject(html: &str, script: &str) -> String {
    let mut out = String::with_capacity(html.len() + script.len());
    match html.rfind("</body>") {
        Some(i) => {
            out.push_str(&html[..i]);
            out.push_str(script);
            out.push_str(&html[i..]);
        }
        None => {
            out.push_str(html);
            out.push_str(script);
        }
    }
    out
}

async fn status(State(state): State<ServerState>) -> Html<String> {
    let target = match &state.upstream {
        Some(upstream) => format!("proxying {upstream}"),
        None => format!("serving {}", state.dist),
    };
    let clients = state.live.as_ref().map_or(0, |live| live.clients());

    Html(format!(
        "<!doctype html>\n<title>tsumiki</title>\n<h1>tsumiki</h1>\n<ul>\n\
         <li>mode: {}</li>\n<li>site: http://localhost:{}/ ({target})</li>\n\
         <li>live reload clients: {clients}</li>\n</ul>\n\
         <form method=\"post\" action=\"/reload\"><button>Reload</button></form>\n\
         <form method=\"post\" action=\"/reload/css\"><button>Reload CSS</button></form>\n",
        state.mode, state.port,
    ))
}

async fn reload_full(State(state): State<ServerState>) -> StatusCode {
    state.signal(ReloadKind::Full);
    StatusCode::NO_CONTENT
}

async fn reload_css(State(state): State<ServerState>) -> StatusCode {
    state.signal(ReloadKind::Css);
    StatusCode::NO_CONTENT
}
