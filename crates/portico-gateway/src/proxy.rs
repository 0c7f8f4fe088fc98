// crates/portico-gateway/src/proxy.rs
//
// GatewayProxy: REST routes transcoded onto the RPC server, plus liveness.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::{Path, Query};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, on, MethodRouter};
use axum::{Json, Router};
use bytes::Bytes;
use serde_json::{Map, Value};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use portico_rpc::client::dial_uri;
use portico_rpc::{Code, DrainOutcome, RestMapping, RpcClient, ServerState, ServerStateMachine, TranscodeError};

use crate::error::GatewayError;
use crate::route::GatewayRoute;
use crate::status::error_response;

/// Path prefix all transcoded routes are mounted under.
pub const DEFAULT_PREFIX: &str = "/api/v1";

/// Gateway settings.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Prefix stripped before route matching, e.g. `/api/v1`.
    pub prefix: String,
    /// Connect timeout used when dialing the RPC endpoint.
    pub dial_timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            dial_timeout: Duration::from_secs(5),
        }
    }
}

/// The REST gateway and its listener lifecycle.
pub struct GatewayProxy {
    config: GatewayConfig,
    machine: ServerStateMachine,
    routes: Vec<GatewayRoute>,
    client: Option<RpcClient>,
    local_addr: Option<SocketAddr>,
    shutdown: CancellationToken,
    accept_loop: Option<JoinHandle<std::io::Result<()>>>,
}

impl std::fmt::Debug for GatewayProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayProxy")
            .field("prefix", &self.config.prefix)
            .field("state", &self.machine.current())
            .field("routes", &self.routes.len())
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

impl GatewayProxy {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            config,
            machine: ServerStateMachine::new("gateway"),
            routes: Vec::new(),
            client: None,
            local_addr: None,
            shutdown: CancellationToken::new(),
            accept_loop: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.machine.current()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn routes(&self) -> &[GatewayRoute] {
        &self.routes
    }

    /// Build routes from `mappings` and dial the RPC server at `endpoint`.
    ///
    /// The dial is eager: an unreachable endpoint fails here, not on the
    /// first request. Unspecified hosts are dialed on loopback.
    pub async fn register_from_endpoint(
        &mut self,
        endpoint: &str,
        mappings: Vec<RestMapping>,
    ) -> Result<usize, GatewayError> {
        self.machine.check(ServerState::Configured)?;

        let mut routes = Vec::with_capacity(mappings.len());
        let mut seen = HashSet::new();
        for mapping in mappings {
            let route = GatewayRoute::from_mapping(mapping)?;
            if !seen.insert((route.verb(), route.template())) {
                return Err(GatewayError::DuplicateRoute {
                    verb: route.verb().to_string(),
                    path: route.template().to_string(),
                });
            }
            routes.push(route);
        }

        let target = dial_uri(endpoint);
        let client = RpcClient::connect(&target, self.config.dial_timeout)
            .await
            .map_err(|source| GatewayError::Dial {
                endpoint: target.clone(),
                source,
            })?;

        tracing::info!(
            "Gateway registered {} routes under {} -> {}",
            routes.len(),
            self.config.prefix,
            target
        );
        let count = routes.len();
        self.routes = routes;
        self.client = Some(client);
        self.machine.transition(ServerState::Configured)?;
        Ok(count)
    }

    /// The full HTTP router: `/healthz` plus, once registered, every route
    /// nested under the prefix.
    pub fn router(&self) -> Router {
        let mut router = Router::new().route("/healthz", get(healthz));

        if let Some(client) = &self.client {
            let api = api_router(&self.routes, client);
            let prefix = self.config.prefix.trim_end_matches('/');
            router = if prefix.is_empty() {
                router.merge(api)
            } else {
                router.nest(prefix, api)
            };
        }

        router.layer(TraceLayer::new_for_http())
    }

    /// Bind `addr` and spawn the HTTP accept loop.
    pub async fn start(&mut self, addr: &str) -> Result<SocketAddr, GatewayError> {
        self.machine.check(ServerState::Listening)?;

        let listener = TcpListener::bind(addr).await.map_err(|source| GatewayError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| GatewayError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        let app = self.router();
        let shutdown = self.shutdown.clone();
        self.accept_loop = Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown.cancelled_owned())
                .await
        }));
        self.local_addr = Some(local_addr);
        self.machine.transition(ServerState::Listening)?;

        tracing::info!(addr = %local_addr, "Gateway listening");
        Ok(local_addr)
    }

    /// Stop accepting and wait up to `deadline` for open requests.
    pub async fn stop(&mut self, deadline: Duration) -> Result<DrainOutcome, GatewayError> {
        match self.machine.current() {
            ServerState::Created | ServerState::Configured => {
                self.machine.transition(ServerState::Stopped)?;
                return Ok(DrainOutcome::NotStarted);
            }
            _ => self.machine.transition(ServerState::Draining)?,
        }

        let started = Instant::now();
        self.shutdown.cancel();

        let outcome = match self.accept_loop.take() {
            None => DrainOutcome::Drained,
            Some(mut handle) => match tokio::time::timeout(deadline, &mut handle).await {
                Ok(Ok(Ok(()))) => DrainOutcome::Drained,
                Ok(Ok(Err(e))) => {
                    tracing::error!("Gateway accept loop failed: {}", e);
                    DrainOutcome::Drained
                }
                Ok(Err(e)) => {
                    tracing::error!("Gateway accept loop task failed: {}", e);
                    DrainOutcome::Drained
                }
                Err(_) => {
                    handle.abort();
                    tracing::warn!(
                        deadline_ms = deadline.as_millis() as u64,
                        "Gateway drain deadline elapsed, closing open requests"
                    );
                    DrainOutcome::TimedOut { abandoned: 0 }
                }
            },
        };

        self.machine.transition(ServerState::Stopped)?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Gateway stopped"
        );
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn healthz() -> Json<Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Everything one transcoded route needs at request time.
struct RouteTarget {
    mapping: RestMapping,
    client: RpcClient,
}

fn api_router(routes: &[GatewayRoute], client: &RpcClient) -> Router {
    // Verbs sharing a path are combined into one MethodRouter.
    let mut by_path: BTreeMap<String, MethodRouter> = BTreeMap::new();

    for route in routes {
        let target = Arc::new(RouteTarget {
            mapping: route.mapping().clone(),
            client: client.clone(),
        });
        let handler = move |path: Option<Path<HashMap<String, String>>>,
                            Query(query): Query<HashMap<String, String>>,
                            body: Bytes| {
            let target = Arc::clone(&target);
            async move {
                let path = path.map(|Path(p)| p).unwrap_or_default();
                transcode(&target, path, query, body).await
            }
        };

        let axum_path = route.axum_path();
        let method_router = match by_path.remove(&axum_path) {
            Some(existing) => existing.on(route.method_filter(), handler),
            None => on(route.method_filter(), handler),
        };
        by_path.insert(axum_path, method_router);
    }

    by_path
        .into_iter()
        .fold(Router::new(), |router, (path, method_router)| router.route(&path, method_router))
}

/// Merge request parameters into one JSON object and run the mapping.
/// Precedence: path over body over query.
async fn transcode(
    target: &RouteTarget,
    path: HashMap<String, String>,
    query: HashMap<String, String>,
    body: Bytes,
) -> Response {
    let mut fields = Map::new();
    for (key, value) in query {
        fields.insert(key, Value::String(value));
    }

    if !body.iter().all(u8::is_ascii_whitespace) {
        match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(object)) => fields.extend(object),
            Ok(_) => return error_response(Code::InvalidArgument, "request body must be a JSON object"),
            Err(e) => return error_response(Code::InvalidArgument, format!("malformed JSON body: {}", e)),
        }
    }

    for (key, value) in path {
        fields.insert(key, Value::String(value));
    }

    match target.mapping.invoke(target.client.clone(), Value::Object(fields)).await {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(TranscodeError::InvalidRequest(msg)) => error_response(Code::InvalidArgument, msg),
        Err(TranscodeError::Rpc(status)) => error_response(status.code(), status.message()),
        Err(TranscodeError::Encode(msg)) => {
            tracing::error!(
                method = %target.mapping.descriptor().path(),
                error = %msg,
                "Failed to encode transcoded response"
            );
            error_response(Code::Internal, "internal server error")
        }
    }
}
