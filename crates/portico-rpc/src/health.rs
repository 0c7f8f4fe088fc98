// crates/portico-rpc/src/health.rs
//
// Standard `grpc.health.v1.Health` (Check and Watch) via tonic-health, so
// stock probes (grpc_health_probe, load balancers) can query the server.
// Every registered service is reported SERVING once the listener is up and
// NOT_SERVING as soon as a drain begins.

use tonic_health::server::{health_reporter, HealthReporter};
use tonic_health::ServingStatus as Reported;

use crate::descriptor::MethodDescriptor;

pub use tonic_health::pb::health_check_response::ServingStatus;
pub use tonic_health::pb::{HealthCheckRequest, HealthCheckResponse};

pub const SERVICE: &str = "grpc.health.v1.Health";

pub const CHECK: MethodDescriptor = MethodDescriptor::new(
    SERVICE,
    "Check",
    "grpc.health.v1.HealthCheckRequest",
    "grpc.health.v1.HealthCheckResponse",
);

/// Server-streaming; listed for discovery only.
pub const WATCH: MethodDescriptor = MethodDescriptor::new(
    SERVICE,
    "Watch",
    "grpc.health.v1.HealthCheckRequest",
    "grpc.health.v1.HealthCheckResponse",
);

/// Owns the reporter side of the health service.
#[derive(Clone)]
pub(crate) struct HealthTracker {
    reporter: HealthReporter,
    services: Vec<String>,
}

impl std::fmt::Debug for HealthTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HealthTracker").field("services", &self.services).finish()
    }
}

impl HealthTracker {
    /// Build the tracker and the tonic service it drives. Services named in
    /// `services` answer NOT_SERVING until `mark_serving`; any other name
    /// answers `NotFound`.
    pub(crate) fn new(
        services: Vec<String>,
    ) -> (
        Self,
        tonic_health::pb::health_server::HealthServer<impl tonic_health::pb::health_server::Health>,
    ) {
        let (reporter, service) = health_reporter();
        (Self { reporter, services }, service)
    }

    pub(crate) async fn mark_serving(&self) {
        self.set_all(Reported::Serving).await;
    }

    pub(crate) async fn mark_not_serving(&self) {
        self.set_all(Reported::NotServing).await;
    }

    async fn set_all(&self, status: Reported) {
        let mut reporter = self.reporter.clone();
        // The empty name stands for the server as a whole.
        reporter.set_service_status("", status).await;
        for service in &self.services {
            reporter.set_service_status(service, status).await;
        }
        tracing::debug!("Health of {} services set to {:?}", self.services.len(), status);
    }
}
