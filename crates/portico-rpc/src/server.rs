// crates/portico-rpc/src/server.rs
//
// RPC server: owns one listener, dispatches gRPC calls by method path through
// the interceptor chain, and drains gracefully on stop.
//
// Calls are served by axum/hyper over HTTP/2. Framing is delegated to
// `tonic::server::Grpc` with the pass-through RawCodec; routing is a lookup in
// the immutable MethodTable built at configure time. The standard health and
// reflection services are tonic services mounted beside the table and are
// not wrapped by the interceptor chain.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::Router;
use bytes::Bytes;
use http::header::{HeaderValue, CONTENT_TYPE};
use http_body_util::BodyExt;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tonic::body::BoxBody;
use tonic::server::{Grpc, UnaryService};
use tonic::service::Routes;
use tonic::Status;

use crate::codec::RawCodec;
use crate::descriptor::MethodDescriptor;
use crate::error::RpcError;
use crate::health::HealthTracker;
use crate::interceptor::{CallContext, InterceptorChain, UnaryCall, UnaryHandler};
use crate::method::MethodTable;
use crate::registry::ServiceRegistry;
use crate::state::{ServerState, ServerStateMachine};
use crate::{health, reflection};

/// Result of a graceful stop. A drain that runs out of time is reported,
/// not raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Every in-flight call finished and every connection closed.
    Drained,
    /// The deadline elapsed with `abandoned` calls still running.
    TimedOut { abandoned: usize },
    /// The component never started listening; nothing to drain.
    NotStarted,
}

impl DrainOutcome {
    pub fn is_clean(&self) -> bool {
        !matches!(self, DrainOutcome::TimedOut { .. })
    }
}

// ---------------------------------------------------------------------------
// Drain bookkeeping
// ---------------------------------------------------------------------------

/// Draining flag, in-flight counter and shutdown signals shared between the
/// server handle and the dispatcher.
#[derive(Debug, Default)]
pub(crate) struct DrainState {
    draining: AtomicBool,
    in_flight: AtomicUsize,
    idle: Notify,
    /// Cooperative signal visible to handlers, fired when the drain begins.
    shutdown: CancellationToken,
    /// Closes the listener and sends GOAWAY on open connections. Fired once
    /// in-flight calls reach zero, so until then new calls on existing
    /// connections reach the dispatcher and are answered `Unavailable`.
    close: CancellationToken,
    /// Fires when the drain deadline elapses; abandons in-flight calls.
    abandon: CancellationToken,
}

impl DrainState {
    pub(crate) fn is_draining(&self) -> bool {
        self.draining.load(Ordering::SeqCst)
    }

    fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    fn begin_drain(&self) {
        self.draining.store(true, Ordering::SeqCst);
        self.shutdown.cancel();
    }

    fn enter(self: &Arc<Self>) -> InFlight {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        InFlight {
            state: Arc::clone(self),
        }
    }

    async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Counts one call as in flight for as long as it lives.
struct InFlight {
    state: Arc<DrainState>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if self.state.in_flight.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.state.idle.notify_waiters();
        }
    }
}

/// Read-only view of a server's drain state, usable after the server handle
/// has been moved.
#[derive(Debug, Clone)]
pub struct ServerMonitor {
    state: Arc<DrainState>,
}

impl ServerMonitor {
    /// Calls currently being dispatched.
    pub fn in_flight(&self) -> usize {
        self.state.in_flight()
    }

    pub fn is_draining(&self) -> bool {
        self.state.is_draining()
    }
}

// ---------------------------------------------------------------------------
// RpcServer
// ---------------------------------------------------------------------------

/// The RPC listener and its lifecycle.
pub struct RpcServer {
    machine: ServerStateMachine,
    drain: Arc<DrainState>,
    dispatcher: Option<Dispatcher>,
    health: Option<HealthTracker>,
    local_addr: Option<SocketAddr>,
    accept_loop: Option<JoinHandle<std::io::Result<()>>>,
}

impl std::fmt::Debug for RpcServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcServer")
            .field("state", &self.machine.current())
            .field("local_addr", &self.local_addr)
            .finish()
    }
}

impl RpcServer {
    pub fn new() -> Self {
        Self {
            machine: ServerStateMachine::new("rpc"),
            drain: Arc::new(DrainState::default()),
            dispatcher: None,
            health: None,
            local_addr: None,
            accept_loop: None,
        }
    }

    pub fn state(&self) -> ServerState {
        self.machine.current()
    }

    /// The bound address, once listening.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    pub fn monitor(&self) -> ServerMonitor {
        ServerMonitor {
            state: Arc::clone(&self.drain),
        }
    }

    /// Descriptors of every method in the table, the listing service
    /// included. Empty until configured.
    pub fn methods(&self) -> Vec<MethodDescriptor> {
        self.dispatcher
            .as_ref()
            .map(|d| d.methods.descriptors())
            .unwrap_or_default()
    }

    /// Attach the interceptor chain and apply the registry, then register the
    /// listing service and build the standard health and reflection services.
    pub fn configure(&mut self, chain: InterceptorChain, registry: &mut ServiceRegistry) -> Result<(), RpcError> {
        self.machine.check(ServerState::Configured)?;

        let mut table = MethodTable::new();
        registry.apply(&mut table)?;
        reflection::register(&mut table).map_err(|source| RpcError::Registration {
            service: reflection::SERVICE.to_string(),
            source,
        })?;

        let mut known: Vec<String> = table.services().into_iter().map(str::to_string).collect();
        known.extend(
            [health::SERVICE, reflection::STANDARD_V1, reflection::STANDARD_V1ALPHA]
                .into_iter()
                .map(str::to_string),
        );
        let (tracker, health_service) = HealthTracker::new(known);
        let transport = reflection::add_standard(Routes::new(health_service), table.files()).map_err(|source| {
            RpcError::Registration {
                service: reflection::STANDARD_V1.to_string(),
                source,
            }
        })?;

        tracing::info!(
            "RPC server configured: {} methods, {} proto files, interceptors {:?}",
            table.len(),
            table.files().len(),
            chain.names()
        );
        self.dispatcher = Some(Dispatcher {
            methods: Arc::new(table),
            transport,
            chain,
            drain: Arc::clone(&self.drain),
        });
        self.health = Some(tracker);
        self.machine.transition(ServerState::Configured)?;
        Ok(())
    }

    /// Bind `addr` and spawn the accept loop. Returns once the listener is
    /// bound, with the resolved address (port 0 becomes the chosen port).
    pub async fn start(&mut self, addr: &str) -> Result<SocketAddr, RpcError> {
        self.machine.check(ServerState::Listening)?;
        let dispatcher = match &self.dispatcher {
            Some(d) => d.clone(),
            None => {
                return Err(RpcError::InvalidState(crate::state::InvalidTransition {
                    component: "rpc",
                    from: self.machine.current(),
                    to: ServerState::Listening,
                }))
            }
        };

        let listener = TcpListener::bind(addr).await.map_err(|source| RpcError::Bind {
            addr: addr.to_string(),
            source,
        })?;
        let local_addr = listener.local_addr().map_err(|source| RpcError::Bind {
            addr: addr.to_string(),
            source,
        })?;

        let app = Router::new().fallback_service(dispatcher);
        let close = self.drain.close.clone();
        self.accept_loop = Some(tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(close.cancelled_owned())
                .await
        }));
        self.local_addr = Some(local_addr);
        self.machine.transition(ServerState::Listening)?;
        if let Some(health) = &self.health {
            health.mark_serving().await;
        }

        tracing::info!(addr = %local_addr, "RPC server listening");
        Ok(local_addr)
    }

    /// Report NOT_SERVING, reject new calls with `Unavailable`, and wait up to
    /// `deadline` for in-flight calls to finish before closing the listener
    /// and connections. Calls still running at the deadline are abandoned and
    /// answered `Aborted`.
    pub async fn stop(&mut self, deadline: Duration) -> Result<DrainOutcome, RpcError> {
        match self.machine.current() {
            ServerState::Created | ServerState::Configured => {
                self.machine.transition(ServerState::Stopped)?;
                tracing::info!("RPC server stopped before it started");
                return Ok(DrainOutcome::NotStarted);
            }
            _ => self.machine.transition(ServerState::Draining)?,
        }

        let started = Instant::now();
        tracing::info!(
            in_flight = self.drain.in_flight(),
            deadline_ms = deadline.as_millis() as u64,
            "RPC server draining"
        );
        if let Some(health) = &self.health {
            health.mark_not_serving().await;
        }
        self.drain.begin_drain();

        let mut accept_loop = self.accept_loop.take();
        let finished = {
            let drain = Arc::clone(&self.drain);
            let accept_loop = &mut accept_loop;
            tokio::time::timeout(deadline.saturating_sub(started.elapsed()), async move {
                drain.wait_idle().await;
                drain.close.cancel();
                if let Some(handle) = accept_loop.as_mut() {
                    match handle.await {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => tracing::error!("RPC accept loop failed: {}", e),
                        Err(e) => tracing::error!("RPC accept loop task failed: {}", e),
                    }
                }
            })
            .await
        };

        let outcome = match finished {
            Ok(()) => DrainOutcome::Drained,
            Err(_) => {
                let abandoned = self.drain.in_flight();
                self.drain.abandon.cancel();
                self.drain.close.cancel();
                if let Some(handle) = accept_loop.take() {
                    handle.abort();
                }
                tracing::warn!(
                    abandoned,
                    deadline_ms = deadline.as_millis() as u64,
                    "RPC drain deadline elapsed, abandoning in-flight calls"
                );
                DrainOutcome::TimedOut { abandoned }
            }
        };

        self.machine.transition(ServerState::Stopped)?;
        tracing::info!(
            elapsed_ms = started.elapsed().as_millis() as u64,
            "RPC server stopped"
        );
        Ok(outcome)
    }
}

impl Default for RpcServer {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

/// Routes HTTP/2 requests to method handlers by path.
#[derive(Clone)]
struct Dispatcher {
    methods: Arc<MethodTable>,
    /// Standard health and reflection services.
    transport: Routes,
    chain: InterceptorChain,
    drain: Arc<DrainState>,
}

impl Dispatcher {
    async fn dispatch(self, req: http::Request<Body>) -> http::Response<BoxBody> {
        // Counted before the draining check: a call either sees the flag or
        // is seen by the drain.
        let in_flight = self.drain.enter();

        // Health must stay answerable while draining, to report NOT_SERVING.
        if is_transport(req.uri().path()) {
            let mut transport = self.transport.clone();
            // Routes is always ready.
            let response = match tower_service::Service::call(&mut transport, req.map(tonic::body::boxed)).await {
                Ok(response) => response,
                Err(e) => {
                    tracing::error!("Standard gRPC service failed: {}", e);
                    status_response(&Status::internal("internal error"))
                }
            };
            drop(in_flight);
            return response;
        }

        if self.drain.is_draining() {
            return status_response(&Status::unavailable("server is shutting down"));
        }

        let path = req.uri().path().to_string();
        let handler = match self.methods.lookup(&path) {
            Some(entry) => Arc::clone(&entry.handler),
            None => {
                tracing::debug!("Unknown RPC method {}", path);
                return status_response(&Status::unimplemented(format!("unknown method {}", path)));
            }
        };

        let call = ChainedCall {
            chain: self.chain.clone(),
            handler,
            method: Arc::from(path),
            shutdown: self.drain.shutdown.clone(),
        };
        let mut grpc = Grpc::new(RawCodec);
        let response = tokio::select! {
            response = grpc.unary(call, req) => response,
            _ = self.drain.abandon.cancelled() => {
                status_response(&Status::aborted("call abandoned: server shut down"))
            }
        };
        drop(in_flight);
        response
    }
}

impl tower_service::Service<http::Request<Body>> for Dispatcher {
    type Response = http::Response<BoxBody>;
    type Error = std::convert::Infallible;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<Body>) -> Self::Future {
        let dispatcher = self.clone();
        Box::pin(async move { Ok(dispatcher.dispatch(req).await) })
    }
}

/// One call's trip through the interceptor chain, in the shape tonic's
/// unary server expects.
struct ChainedCall {
    chain: InterceptorChain,
    handler: Arc<dyn UnaryHandler>,
    method: Arc<str>,
    shutdown: CancellationToken,
}

impl UnaryService<Bytes> for ChainedCall {
    type Response = Bytes;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<tonic::Response<Bytes>, Status>> + Send>,
    >;

    fn call(&mut self, request: tonic::Request<Bytes>) -> Self::Future {
        let chain = self.chain.clone();
        let handler = Arc::clone(&self.handler);
        let context_method = Arc::clone(&self.method);
        let shutdown = self.shutdown.clone();

        Box::pin(async move {
            let (metadata, _extensions, message) = request.into_parts();
            let call = UnaryCall {
                context: CallContext::new(context_method, metadata, shutdown),
                message,
            };
            chain.invoke(call, handler).await.map(tonic::Response::new)
        })
    }
}

/// Whether `path` belongs to a service answered by tonic-health or
/// tonic-reflection.
fn is_transport(path: &str) -> bool {
    let service = path.strip_prefix('/').and_then(|p| p.split_once('/')).map(|(service, _)| service);
    matches!(
        service,
        Some(health::SERVICE) | Some(reflection::STANDARD_V1) | Some(reflection::STANDARD_V1ALPHA)
    )
}

/// Trailers-only gRPC response carrying just a status.
fn status_response(status: &Status) -> http::Response<BoxBody> {
    let body = BoxBody::new(http_body_util::Empty::<Bytes>::new().map_err(|never| match never {}));
    let mut response = http::Response::new(body);
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/grpc"));
    headers.insert("grpc-status", HeaderValue::from(i32::from(status.code())));
    if let Ok(message) = HeaderValue::from_str(status.message()) {
        headers.insert("grpc-message", message);
    }
    response
}
