// crates/portico-rpc/tests/common/mod.rs
//
// Shared helpers for the RPC integration tests: a log-capturing tracing
// layer, a fault-injecting test service, and server startup on port 0.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tonic::Status;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};

use portico_core::PlatformService;
use portico_rpc::handlers::platform::{self, PingResponse};
use portico_rpc::{
    InterceptorChain, MethodDescriptor, MethodTable, RpcClient, RpcServer, ServiceRegistration, ServiceRegistry,
};
use portico_store::InMemoryUserStore;

// ---------------------------------------------------------------------------
// Log capture
// ---------------------------------------------------------------------------

/// One captured tracing event.
#[derive(Debug, Clone)]
pub struct Record {
    pub level: Level,
    pub message: String,
    pub fields: HashMap<String, String>,
}

impl Record {
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields.get(name).map(String::as_str)
    }
}

/// Layer that stores every event it sees.
#[derive(Clone, Default)]
pub struct Capture {
    records: Arc<Mutex<Vec<Record>>>,
}

impl Capture {
    pub fn records(&self) -> Vec<Record> {
        self.records.lock().unwrap().clone()
    }

    /// Records with the given message.
    pub fn with_message(&self, message: &str) -> Vec<Record> {
        self.records().into_iter().filter(|r| r.message == message).collect()
    }

    /// Call-log records (completed or failed) for one method path.
    pub fn call_records(&self, method: &str) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.message == "rpc call completed" || r.message == "rpc call failed")
            .filter(|r| r.field("method") == Some(method))
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for Capture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut visitor = FieldVisitor::default();
        event.record(&mut visitor);
        self.records.lock().unwrap().push(Record {
            level: *event.metadata().level(),
            message: visitor.message,
            fields: visitor.fields,
        });
    }
}

#[derive(Default)]
struct FieldVisitor {
    message: String,
    fields: HashMap<String, String>,
}

impl Visit for FieldVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        let rendered = format!("{:?}", value);
        if field.name() == "message" {
            self.message = rendered;
        } else {
            self.fields.insert(field.name().to_string(), rendered);
        }
    }
}

/// Install a capturing subscriber for the current thread. Tests using this
/// must run on the current-thread runtime (the `#[tokio::test]` default).
pub fn capture_logs() -> (Capture, tracing::subscriber::DefaultGuard) {
    let capture = Capture::default();
    let subscriber = tracing_subscriber::registry().with(capture.clone());
    let guard = tracing::subscriber::set_default(subscriber);
    (capture, guard)
}

// ---------------------------------------------------------------------------
// Fault-injecting test service
// ---------------------------------------------------------------------------

pub const FAULTS: &str = "test.v1.Faults";

pub const PANIC: MethodDescriptor = MethodDescriptor::new(FAULTS, "Panic", "test.v1.Empty", "test.v1.Empty");
pub const SLOW: MethodDescriptor = MethodDescriptor::new(FAULTS, "Slow", "test.v1.SlowRequest", "platform.v1.PingResponse");
pub const MISSING: MethodDescriptor = MethodDescriptor::new(FAULTS, "Missing", "test.v1.Empty", "test.v1.Empty");

#[derive(Clone, PartialEq, prost::Message)]
pub struct Empty {}

#[derive(Clone, PartialEq, prost::Message)]
pub struct SlowRequest {
    #[prost(uint64, tag = "1")]
    pub millis: u64,
}

/// Panic: always panics. Slow: sleeps `millis` then answers "done".
/// Missing: always NotFound.
pub fn faults_registration() -> ServiceRegistration {
    ServiceRegistration::new(FAULTS, |table: &mut MethodTable| {
        table.add_unary(PANIC, |_ctx, _req: Empty| async move {
            if true {
                panic!("handler exploded");
            }
            Ok(Empty {})
        })?;
        table.add_unary(SLOW, |_ctx, req: SlowRequest| async move {
            tokio::time::sleep(Duration::from_millis(req.millis)).await;
            Ok(PingResponse {
                message: "done".to_string(),
            })
        })?;
        table.add_unary(MISSING, |_ctx, _req: Empty| async move {
            Err::<Empty, _>(Status::not_found("nothing here"))
        })?;
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Server startup
// ---------------------------------------------------------------------------

/// Registry with the platform service (in-memory store) and the fault service.
pub fn full_registry() -> ServiceRegistry {
    let api = Arc::new(PlatformService::new(Arc::new(InMemoryUserStore::new())));
    let mut registry = ServiceRegistry::new();
    registry.add(platform::registration(api)).unwrap();
    registry.add(faults_registration()).unwrap();
    registry
}

/// Configure and start a server on an ephemeral loopback port.
pub async fn start_server(mut registry: ServiceRegistry) -> (RpcServer, SocketAddr) {
    let mut server = RpcServer::new();
    server.configure(InterceptorChain::standard(), &mut registry).unwrap();
    let addr = server.start("127.0.0.1:0").await.unwrap();
    (server, addr)
}

pub async fn connect(addr: SocketAddr) -> RpcClient {
    RpcClient::connect(&addr.to_string(), Duration::from_secs(2)).await.unwrap()
}

/// Plain tonic channel, for the generated health and reflection clients.
pub async fn channel(addr: SocketAddr) -> tonic::transport::Channel {
    tonic::transport::Endpoint::from_shared(format!("http://{}", addr))
        .unwrap()
        .connect()
        .await
        .unwrap()
}

/// Poll `check` every 5 ms until it holds, failing after two seconds.
pub async fn wait_until(mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !check() {
        assert!(tokio::time::Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
