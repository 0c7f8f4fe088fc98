// crates/portico-rpc/tests/server.rs
//
// End-to-end tests for the RPC server over real loopback sockets: dispatch,
// the standard interceptor chain, built-in services and graceful drain.

mod common;

use std::net::SocketAddr;
use std::time::{Duration, Instant};

use bytes::Bytes;
use prost::Message;
use prost_types::FileDescriptorProto;
use tonic::metadata::MetadataMap;
use tonic::Code;
use tracing::Level;

use portico_rpc::handlers::platform::{
    self, CreateUserRequest, CreateUserResponse, GetUserRequest, GetUserResponse, PingRequest, PingResponse,
};
use portico_rpc::health::{self, HealthCheckRequest, HealthCheckResponse, ServingStatus};
use portico_rpc::reflection::{self, ListServicesRequest, ListServicesResponse};
use tonic_health::pb::health_client::HealthClient;
use tonic_reflection::pb::{v1, v1alpha};
use portico_rpc::{DrainOutcome, InterceptorChain, RpcError, RpcServer, ServerState, ServiceRegistry};

use common::*;

// ---------------------------------------------------------------------------
// Dispatch and interceptors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn ping_returns_pong_with_one_info_record() {
    let (logs, _guard) = capture_logs();
    let (mut server, addr) = start_server(full_registry()).await;
    let client = connect(addr).await;

    let resp: PingResponse = client.call(&platform::PING, PingRequest {}).await.unwrap();
    assert_eq!(resp.message, "pong");

    let records = logs.call_records(&platform::PING.path());
    assert_eq!(records.len(), 1, "records: {:?}", records);
    let record = &records[0];
    assert_eq!(record.level, Level::INFO);
    assert_eq!(record.field("code"), Some("Ok"));
    let duration: f64 = record.field("duration_ms").unwrap().parse().unwrap();
    assert!(duration >= 0.0);

    server.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn failed_call_logs_at_error_with_actual_code() {
    let (logs, _guard) = capture_logs();
    let (mut server, addr) = start_server(full_registry()).await;
    let client = connect(addr).await;

    let err = client
        .call::<Empty, Empty>(&MISSING, Empty {})
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);

    let records = logs.call_records(&MISSING.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].level, Level::ERROR);
    assert_eq!(records[0].field("code"), Some("NotFound"));

    server.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn panicking_handler_is_recovered_and_server_keeps_serving() {
    let (logs, _guard) = capture_logs();
    let (mut server, addr) = start_server(full_registry()).await;
    let client = connect(addr).await;

    let err = client.call::<Empty, Empty>(&PANIC, Empty {}).await.unwrap_err();
    assert_eq!(err.code(), Code::Internal);
    assert_eq!(err.message(), "internal server error");

    let recovered = logs.with_message("rpc handler panicked");
    assert_eq!(recovered.len(), 1);
    assert_eq!(recovered[0].level, Level::ERROR);
    assert_eq!(recovered[0].field("panic"), Some("handler exploded"));
    assert_eq!(recovered[0].field("method"), Some(PANIC.path().as_str()));

    let records = logs.call_records(&PANIC.path());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].field("code"), Some("Internal"));

    // Same server, same connection: the next call succeeds.
    let resp: PingResponse = client.call(&platform::PING, PingRequest {}).await.unwrap();
    assert_eq!(resp.message, "pong");

    server.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn unknown_method_is_unimplemented() {
    let (mut server, addr) = start_server(full_registry()).await;
    let client = connect(addr).await;

    let err = client
        .call_raw("/platform.v1.PlatformService/Nope", Bytes::new(), MetadataMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unimplemented);

    server.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn user_crud_over_rpc() {
    let (mut server, addr) = start_server(full_registry()).await;
    let client = connect(addr).await;

    let created: CreateUserResponse = client
        .call(
            &platform::CREATE_USER,
            CreateUserRequest {
                username: "grace".into(),
                email: "grace@example.com".into(),
            },
        )
        .await
        .unwrap();
    let user = created.user.unwrap();
    assert_eq!(user.id, 1);

    let fetched: GetUserResponse = client
        .call(&platform::GET_USER, GetUserRequest { id: user.id })
        .await
        .unwrap();
    assert_eq!(fetched.user.unwrap().email, "grace@example.com");

    let dup = client
        .call::<_, CreateUserResponse>(
            &platform::CREATE_USER,
            CreateUserRequest {
                username: "grace".into(),
                email: "other@example.com".into(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(dup.code(), Code::AlreadyExists);

    server.stop(Duration::from_secs(2)).await.unwrap();
}

// ---------------------------------------------------------------------------
// Built-in services
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_registry_still_serves_reflection_and_health() {
    let (mut server, addr) = start_server(ServiceRegistry::new()).await;
    let client = connect(addr).await;

    let listing: ListServicesResponse = client
        .call(&reflection::LIST_SERVICES, ListServicesRequest {})
        .await
        .unwrap();
    let names: Vec<_> = listing.services.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            health::SERVICE,
            reflection::STANDARD_V1,
            reflection::STANDARD_V1ALPHA,
            reflection::SERVICE
        ]
    );

    let health: HealthCheckResponse = client
        .call(&health::CHECK, HealthCheckRequest { service: String::new() })
        .await
        .unwrap();
    assert_eq!(health.status(), ServingStatus::Serving);

    server.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn reflection_lists_platform_methods_with_http_bindings() {
    let (mut server, addr) = start_server(full_registry()).await;
    let client = connect(addr).await;

    let listing: ListServicesResponse = client
        .call(&reflection::LIST_SERVICES, ListServicesRequest {})
        .await
        .unwrap();
    let platform_svc = listing
        .services
        .iter()
        .find(|s| s.name == platform::SERVICE)
        .unwrap();
    let get_user = platform_svc.methods.iter().find(|m| m.name == "GetUser").unwrap();
    assert_eq!(get_user.http_method, "GET");
    assert_eq!(get_user.http_path, "/users/{id}");
    assert_eq!(get_user.input_type, "platform.v1.GetUserRequest");
    assert!(listing.contains(FAULTS));

    server.stop(Duration::from_secs(2)).await.unwrap();
}

/// One request/response exchange on the v1 reflection stream.
async fn reflect_v1(
    addr: SocketAddr,
    request: v1::server_reflection_request::MessageRequest,
) -> v1::server_reflection_response::MessageResponse {
    let mut client = v1::server_reflection_client::ServerReflectionClient::new(channel(addr).await);
    let request = v1::ServerReflectionRequest {
        host: String::new(),
        message_request: Some(request),
    };
    let mut responses = client
        .server_reflection_info(futures::stream::iter([request]))
        .await
        .unwrap()
        .into_inner();
    responses.message().await.unwrap().unwrap().message_response.unwrap()
}

#[tokio::test]
async fn standard_reflection_v1_lists_services() {
    let (mut server, addr) = start_server(full_registry()).await;

    let response = reflect_v1(addr, v1::server_reflection_request::MessageRequest::ListServices(String::new())).await;
    let listing = match response {
        v1::server_reflection_response::MessageResponse::ListServicesResponse(listing) => listing,
        other => panic!("expected a service listing, got {:?}", other),
    };
    let names: Vec<_> = listing.service.iter().map(|s| s.name.as_str()).collect();
    for expected in [platform::SERVICE, health::SERVICE, reflection::STANDARD_V1, reflection::SERVICE] {
        assert!(names.contains(&expected), "{} missing from {:?}", expected, names);
    }

    server.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn standard_reflection_v1_serves_platform_descriptor() {
    let (mut server, addr) = start_server(full_registry()).await;

    let response = reflect_v1(
        addr,
        v1::server_reflection_request::MessageRequest::FileContainingSymbol(platform::SERVICE.to_string()),
    )
    .await;
    let files = match response {
        v1::server_reflection_response::MessageResponse::FileDescriptorResponse(files) => files,
        other => panic!("expected file descriptors, got {:?}", other),
    };
    let platform_file = files
        .file_descriptor_proto
        .iter()
        .map(|bytes| FileDescriptorProto::decode(bytes.as_slice()).unwrap())
        .find(|f| f.name() == "platform/v1/platform.proto")
        .unwrap();
    let service = &platform_file.service[0];
    assert_eq!(service.name(), "PlatformService");
    let get_user = service.method.iter().find(|m| m.name() == "GetUser").unwrap();
    assert_eq!(get_user.input_type(), ".platform.v1.GetUserRequest");
    assert_eq!(get_user.output_type(), ".platform.v1.GetUserResponse");

    server.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn standard_reflection_v1alpha_lists_services() {
    let (mut server, addr) = start_server(full_registry()).await;

    let mut client = v1alpha::server_reflection_client::ServerReflectionClient::new(channel(addr).await);
    let request = v1alpha::ServerReflectionRequest {
        host: String::new(),
        message_request: Some(v1alpha::server_reflection_request::MessageRequest::ListServices(String::new())),
    };
    let mut responses = client
        .server_reflection_info(futures::stream::iter([request]))
        .await
        .unwrap()
        .into_inner();
    let response = responses.message().await.unwrap().unwrap().message_response.unwrap();
    let listing = match response {
        v1alpha::server_reflection_response::MessageResponse::ListServicesResponse(listing) => listing,
        other => panic!("expected a service listing, got {:?}", other),
    };
    let names: Vec<_> = listing.service.iter().map(|s| s.name.as_str()).collect();
    assert!(names.contains(&platform::SERVICE), "{:?}", names);
    assert!(names.contains(&reflection::STANDARD_V1ALPHA), "{:?}", names);

    server.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn health_answers_per_service() {
    let (mut server, addr) = start_server(full_registry()).await;
    let client = connect(addr).await;

    let known: HealthCheckResponse = client
        .call(
            &health::CHECK,
            HealthCheckRequest {
                service: platform::SERVICE.to_string(),
            },
        )
        .await
        .unwrap();
    assert_eq!(known.status(), ServingStatus::Serving);

    let unknown = client
        .call::<_, HealthCheckResponse>(
            &health::CHECK,
            HealthCheckRequest {
                service: "nope.v1.Nothing".to_string(),
            },
        )
        .await
        .unwrap_err();
    assert_eq!(unknown.code(), Code::NotFound);

    server.stop(Duration::from_secs(2)).await.unwrap();
}

#[tokio::test]
async fn health_watch_sees_drain() {
    let (mut server, addr) = start_server(full_registry()).await;

    let mut client = HealthClient::new(channel(addr).await);
    let mut updates = client
        .watch(HealthCheckRequest {
            service: platform::SERVICE.to_string(),
        })
        .await
        .unwrap()
        .into_inner();
    let first = updates.message().await.unwrap().unwrap();
    assert_eq!(first.status(), ServingStatus::Serving);

    let stopping = tokio::spawn(async move {
        let outcome = server.stop(Duration::from_millis(500)).await;
        (server, outcome)
    });

    let next = tokio::time::timeout(Duration::from_secs(2), updates.message())
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(next.status(), ServingStatus::NotServing);
    drop(updates);
    drop(client);

    let (server, outcome) = stopping.await.unwrap();
    assert!(outcome.is_ok());
    assert_eq!(server.state(), ServerState::Stopped);
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bind_failure_is_reported() {
    let occupied = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = occupied.local_addr().unwrap();

    let mut server = RpcServer::new();
    server
        .configure(InterceptorChain::standard(), &mut ServiceRegistry::new())
        .unwrap();
    let err = server.start(&addr.to_string()).await.unwrap_err();
    assert!(matches!(err, RpcError::Bind { .. }), "got {:?}", err);
    assert_eq!(server.state(), ServerState::Configured);
}

#[tokio::test]
async fn configure_twice_is_rejected() {
    let mut server = RpcServer::new();
    let mut registry = ServiceRegistry::new();
    server.configure(InterceptorChain::standard(), &mut registry).unwrap();

    let err = server
        .configure(InterceptorChain::standard(), &mut ServiceRegistry::new())
        .unwrap_err();
    assert!(matches!(err, RpcError::InvalidState(_)));
    assert!(registry.is_frozen());
}

#[tokio::test]
async fn drain_rejects_new_calls_and_finishes_in_flight_ones() {
    let (mut server, addr) = start_server(full_registry()).await;
    let client = connect(addr).await;
    let monitor = server.monitor();

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.call::<_, PingResponse>(&SLOW, SlowRequest { millis: 500 }).await })
    };
    wait_until(|| monitor.in_flight() == 1).await;

    let stopping = tokio::spawn(async move {
        let outcome = server.stop(Duration::from_secs(5)).await;
        (server, outcome)
    });
    wait_until(|| monitor.is_draining()).await;

    // The connection stays open while the slow call runs, so the rejection
    // comes from the server rather than from a GOAWAY.
    let asked = Instant::now();
    let rejected = tokio::time::timeout(
        Duration::from_secs(2),
        client.call::<_, PingResponse>(&platform::PING, PingRequest {}),
    )
    .await
    .unwrap()
    .unwrap_err();
    assert_eq!(rejected.code(), Code::Unavailable);
    assert_eq!(rejected.message(), "server is shutting down");
    assert!(asked.elapsed() < Duration::from_millis(200), "rejection took {:?}", asked.elapsed());
    assert!(!slow.is_finished());

    let finished = slow.await.unwrap().unwrap();
    assert_eq!(finished.message, "done");

    let (server, outcome) = stopping.await.unwrap();
    assert_eq!(outcome.unwrap(), DrainOutcome::Drained);
    assert_eq!(server.state(), ServerState::Stopped);
    assert_eq!(monitor.in_flight(), 0);
}

#[tokio::test]
async fn health_reports_not_serving_while_draining() {
    let (mut server, addr) = start_server(full_registry()).await;
    let client = connect(addr).await;
    let monitor = server.monitor();

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.call::<_, PingResponse>(&SLOW, SlowRequest { millis: 500 }).await })
    };
    wait_until(|| monitor.in_flight() == 1).await;

    let stopping = tokio::spawn(async move {
        let outcome = server.stop(Duration::from_secs(5)).await;
        (server, outcome)
    });
    wait_until(|| monitor.is_draining()).await;

    for service in ["", platform::SERVICE] {
        let health: HealthCheckResponse = client
            .call(&health::CHECK, HealthCheckRequest { service: service.into() })
            .await
            .unwrap();
        assert_eq!(health.status(), ServingStatus::NotServing, "service '{}'", service);
    }

    assert!(slow.await.unwrap().is_ok());
    let (_server, outcome) = stopping.await.unwrap();
    assert_eq!(outcome.unwrap(), DrainOutcome::Drained);
}

#[tokio::test]
async fn drain_deadline_abandons_slow_calls() {
    let (logs, _guard) = capture_logs();
    let (mut server, addr) = start_server(full_registry()).await;
    let client = connect(addr).await;
    let monitor = server.monitor();

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.call::<_, PingResponse>(&SLOW, SlowRequest { millis: 10_000 }).await })
    };
    wait_until(|| monitor.in_flight() == 1).await;

    let started = Instant::now();
    let outcome = server.stop(Duration::from_millis(200)).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(outcome, DrainOutcome::TimedOut { abandoned: 1 });
    assert!(elapsed >= Duration::from_millis(200));
    assert!(elapsed < Duration::from_secs(2), "stop took {:?}", elapsed);
    assert_eq!(server.state(), ServerState::Stopped);

    let warnings: Vec<_> = logs
        .records()
        .into_iter()
        .filter(|r| r.level == Level::WARN)
        .filter(|r| r.message.starts_with("RPC drain deadline elapsed"))
        .collect();
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].field("abandoned"), Some("1"));

    // The abandoned caller gets an error rather than hanging.
    let result = tokio::time::timeout(Duration::from_secs(2), slow).await.unwrap().unwrap();
    assert!(result.is_err());
}
