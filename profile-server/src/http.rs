//! HTTP server part of profile-server

use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Instant,
};

use async_graphql::{
    Data,
    http::{ALL_WEBSOCKET_PROTOCOLS, GraphiQLSource},
};
use async_graphql_axum::{GraphQLProtocol, GraphQLRequest, GraphQLResponse, GraphQLWebSocket};
use axum::{
    Router,
    extract::{ConnectInfo, Request, State, WebSocketUpgrade},
    http::{HeaderMap, Method, StatusCode, header},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
};
use iroh_metrics::MetricsSource;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};
use tokio::{net::TcpListener, task::JoinSet};
use tower_http::{
    cors::{self, CorsLayer},
    trace::TraceLayer,
};
use tracing::{Level, info, span, warn};

mod error;

use self::error::{AppError, AppResult};
use crate::{metrics::Metrics, state::AppState};

/// Path of the GraphQL endpoint.
pub const GRAPHQL_PATH: &str = "/graphql";
/// Path of the GraphQL WebSocket endpoint for subscriptions.
pub const GRAPHQL_WS_PATH: &str = "/graphql/ws";

const OPENMETRICS_CONTENT_TYPE: &str = "application/openmetrics-text; version=1.0.0; charset=utf-8";

/// Config for the HTTP server
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct HttpConfig {
    /// Port to bind to
    pub port: u16,
    /// Optionally set a custom bind address (will use 0.0.0.0 if unset)
    pub bind_addr: Option<IpAddr>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: None,
        }
    }
}

/// Errors of the HTTP server.
#[allow(missing_docs)]
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum HttpError {
    #[snafu(display("failed to bind HTTP server to {addr}"))]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
    #[snafu(display("HTTP server failed"))]
    Serve { source: std::io::Error },
    #[snafu(display("HTTP server task panicked"))]
    Task { source: tokio::task::JoinError },
}

/// The HTTP server part of profile-server
#[derive(Debug)]
pub struct HttpServer {
    tasks: JoinSet<std::io::Result<()>>,
    http_addr: SocketAddr,
}

impl HttpServer {
    /// Spawn the server
    pub async fn spawn(config: HttpConfig, state: AppState) -> Result<HttpServer, HttpError> {
        let app = create_app(state);

        let mut tasks = JoinSet::new();

        let bind_addr = SocketAddr::new(
            config.bind_addr.unwrap_or(Ipv4Addr::UNSPECIFIED.into()),
            config.port,
        );
        let listener = TcpListener::bind(bind_addr)
            .await
            .context(BindSnafu { addr: bind_addr })?;
        let http_addr = listener
            .local_addr()
            .context(BindSnafu { addr: bind_addr })?;
        let serve = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        );
        info!("HTTP server listening on {http_addr}");
        tasks.spawn(async move { serve.await });

        Ok(HttpServer { tasks, http_addr })
    }

    /// Get the bound address of the HTTP socket.
    pub fn http_addr(&self) -> SocketAddr {
        self.http_addr
    }

    /// Shutdown the server and wait for all tasks to complete.
    pub async fn shutdown(mut self) -> Result<(), HttpError> {
        self.tasks.abort_all();
        self.run_until_done().await
    }

    /// Wait for all tasks to complete.
    ///
    /// Runs forever unless tasks fail.
    pub async fn run_until_done(mut self) -> Result<(), HttpError> {
        let mut final_res = Ok(());
        while let Some(res) = self.tasks.join_next().await {
            match res {
                Ok(Ok(())) => {}
                Err(err) if err.is_cancelled() => {}
                Ok(Err(err)) => {
                    warn!(?err, "task failed");
                    final_res = Err(err).context(ServeSnafu);
                }
                Err(err) => {
                    warn!(?err, "task panicked");
                    final_res = Err(err).context(TaskSnafu);
                }
            }
        }
        final_res
    }
}

pub(crate) fn create_app(state: AppState) -> Router {
    // configure cors middleware
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_origin(cors::Any);

    // configure tracing middleware
    let trace = TraceLayer::new_for_http().make_span_with(|request: &http::Request<_>| {
        let src = request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|conn_info| conn_info.0);
        span!(
            Level::DEBUG,
            "http_request",
            method = ?request.method(),
            uri = ?request.uri(),
            src = ?src,
        )
    });

    let metrics = state.metrics.clone();

    // configure routes
    let mut router = Router::new()
        .route(GRAPHQL_PATH, get(graphiql).post(graphql))
        .route(GRAPHQL_WS_PATH, get(graphql_ws))
        .route("/healthcheck", get(healthcheck))
        .route("/", get(|| async { "Hi!" }));
    if state.registry.is_some() {
        router = router.route("/metrics", get(serve_metrics));
    }
    let router = router.with_state(state);

    // configure app
    router
        .layer(cors)
        .layer(trace)
        .route_layer(middleware::from_fn_with_state(metrics, metrics_middleware))
}

/// Execute a query or mutation.
async fn graphql(
    State(state): State<AppState>,
    headers: HeaderMap,
    req: GraphQLRequest,
) -> GraphQLResponse {
    let auth = state.context.build(&headers);
    let req = req.into_inner().data(auth);
    state.schema.execute(req).await.into()
}

/// Serve the GraphiQL page.
async fn graphiql() -> impl IntoResponse {
    Html(
        GraphiQLSource::build()
            .endpoint(GRAPHQL_PATH)
            .subscription_endpoint(GRAPHQL_WS_PATH)
            .finish(),
    )
}

/// Upgrade to a WebSocket carrying subscriptions.
///
/// The caller identity is built once per connection.
async fn graphql_ws(
    State(state): State<AppState>,
    headers: HeaderMap,
    protocol: GraphQLProtocol,
    upgrade: WebSocketUpgrade,
) -> Response {
    let auth = state.context.build(&headers);
    let schema = state.schema.clone();
    upgrade
        .protocols(ALL_WEBSOCKET_PROTOCOLS)
        .on_upgrade(move |stream| {
            let mut data = Data::default();
            data.insert(auth);
            GraphQLWebSocket::new(stream, schema, protocol)
                .with_data(data)
                .serve()
        })
}

/// Report whether the store answers.
async fn healthcheck(State(state): State<AppState>) -> AppResult<&'static str> {
    match state.store.count().await {
        Ok(_) => Ok("OK"),
        Err(err) => Err(AppError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            Some(format!("store unavailable: {err}")),
        )),
    }
}

/// Encode all counters in the OpenMetrics text format.
async fn serve_metrics(State(state): State<AppState>) -> AppResult<Response> {
    let Some(registry) = state.registry else {
        return Err(AppError::new(StatusCode::NOT_FOUND, None::<String>));
    };
    let body = registry.encode_openmetrics_to_string().map_err(|err| {
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, Some(err))
    })?;
    Ok(([(header::CONTENT_TYPE, OPENMETRICS_CONTENT_TYPE)], body).into_response())
}

/// Record request metrics.
///
// TODO: Request duration would be much better tracked as a histogram.
async fn metrics_middleware(
    State(metrics): State<Arc<Metrics>>,
    req: Request,
    next: Next,
) -> impl IntoResponse {
    let start = Instant::now();
    let response = next.run(req).await;
    let latency = start.elapsed().as_millis();
    let status = response.status();
    metrics.http_requests_duration_ms.inc_by(latency as u64);
    metrics.http_requests.inc();
    if status.is_success() || status == StatusCode::SWITCHING_PROTOCOLS {
        metrics.http_requests_success.inc();
    } else {
        metrics.http_requests_error.inc();
    }
    response
}
