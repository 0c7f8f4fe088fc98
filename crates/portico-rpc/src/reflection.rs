// crates/portico-rpc/src/reflection.rs
//
// Server reflection, in two forms:
//
// - the standard `grpc.reflection.v1` and `v1alpha` ServerReflection services
//   (tonic-reflection), serving the proto files attached to the MethodTable
//   so grpcurl and similar tools can discover and call methods;
// - `portico.reflection.v1.ServerReflection/ListServices`, a unary listing of
//   every service with method signatures and REST bindings, used by the CLI.
//
// Both are computed once at configure time; the table is immutable afterwards.

use std::collections::BTreeMap;
use std::sync::Arc;

use prost_types::{FileDescriptorProto, FileDescriptorSet};
use serde::{Deserialize, Serialize};
use tonic::service::Routes;

use crate::descriptor::MethodDescriptor;
use crate::error::RegistrationError;
use crate::method::MethodTable;
use crate::schema::{field, ProtoFile};

pub const SERVICE: &str = "portico.reflection.v1.ServerReflection";

pub const LIST_SERVICES: MethodDescriptor = MethodDescriptor::new(
    SERVICE,
    "ListServices",
    "portico.reflection.v1.ListServicesRequest",
    "portico.reflection.v1.ListServicesResponse",
);

pub const STANDARD_V1: &str = "grpc.reflection.v1.ServerReflection";
pub const STANDARD_V1ALPHA: &str = "grpc.reflection.v1alpha.ServerReflection";

/// Bidirectional stream; listed for discovery only.
pub const INFO_V1: MethodDescriptor = MethodDescriptor::new(
    STANDARD_V1,
    "ServerReflectionInfo",
    "grpc.reflection.v1.ServerReflectionRequest",
    "grpc.reflection.v1.ServerReflectionResponse",
);

pub const INFO_V1ALPHA: MethodDescriptor = MethodDescriptor::new(
    STANDARD_V1ALPHA,
    "ServerReflectionInfo",
    "grpc.reflection.v1alpha.ServerReflectionRequest",
    "grpc.reflection.v1alpha.ServerReflectionResponse",
);

/// Services answered outside the method table, by tonic-health and
/// tonic-reflection.
pub const TRANSPORT_METHODS: [MethodDescriptor; 4] = [crate::health::CHECK, crate::health::WATCH, INFO_V1, INFO_V1ALPHA];

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct ListServicesRequest {}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct ListServicesResponse {
    #[prost(message, repeated, tag = "1")]
    pub services: Vec<ServiceInfo>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
pub struct ServiceInfo {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(message, repeated, tag = "2")]
    pub methods: Vec<MethodInfo>,
}

#[derive(Clone, PartialEq, prost::Message, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MethodInfo {
    #[prost(string, tag = "1")]
    pub name: String,
    #[prost(string, tag = "2")]
    pub input_type: String,
    #[prost(string, tag = "3")]
    pub output_type: String,
    /// REST verb, empty when the method has no HTTP binding.
    #[prost(string, tag = "4")]
    pub http_method: String,
    #[prost(string, tag = "5")]
    pub http_path: String,
}

impl ListServicesResponse {
    /// Build the listing from method descriptors, grouped by service.
    pub fn from_descriptors(descriptors: &[MethodDescriptor]) -> Self {
        let mut grouped: BTreeMap<&str, Vec<MethodInfo>> = BTreeMap::new();
        for d in descriptors {
            let (http_method, http_path) = match &d.http {
                Some(rule) => (rule.verb.as_str().to_string(), rule.path.to_string()),
                None => (String::new(), String::new()),
            };
            grouped.entry(d.service).or_default().push(MethodInfo {
                name: d.method.to_string(),
                input_type: d.input_type.to_string(),
                output_type: d.output_type.to_string(),
                http_method,
                http_path,
            });
        }
        Self {
            services: grouped
                .into_iter()
                .map(|(name, methods)| ServiceInfo {
                    name: name.to_string(),
                    methods,
                })
                .collect(),
        }
    }

    /// Whether `service` appears in the listing.
    pub fn contains(&self, service: &str) -> bool {
        self.services.iter().any(|s| s.name == service)
    }
}

/// Descriptor of `portico/reflection/v1/reflection.proto`.
pub fn proto_file() -> FileDescriptorProto {
    ProtoFile::new("portico/reflection/v1/reflection.proto", "portico.reflection.v1")
        .message("ListServicesRequest", vec![])
        .message(
            "ListServicesResponse",
            vec![field::repeated_message("services", 1, "portico.reflection.v1.ServiceInfo")],
        )
        .message(
            "ServiceInfo",
            vec![
                field::string("name", 1),
                field::repeated_message("methods", 2, "portico.reflection.v1.MethodInfo"),
            ],
        )
        .message(
            "MethodInfo",
            vec![
                field::string("name", 1),
                field::string("input_type", 2),
                field::string("output_type", 3),
                field::string("http_method", 4),
                field::string("http_path", 5),
            ],
        )
        .service(&[LIST_SERVICES])
        .build()
}

/// Register the listing service. Must run after every other registration.
pub(crate) fn register(table: &mut MethodTable) -> Result<(), RegistrationError> {
    table.describe(proto_file());

    let mut descriptors = table.descriptors();
    descriptors.push(LIST_SERVICES);
    descriptors.extend(TRANSPORT_METHODS);
    let listing = Arc::new(ListServicesResponse::from_descriptors(&descriptors));

    table.add_unary(LIST_SERVICES, move |_ctx, _request: ListServicesRequest| {
        let listing = Arc::clone(&listing);
        async move { Ok(ListServicesResponse::clone(&listing)) }
    })
}

/// Add the standard v1 and v1alpha reflection services to `routes`, serving
/// every file in `files` plus the health protocol's own descriptor.
pub(crate) fn add_standard(routes: Routes, files: &[FileDescriptorProto]) -> Result<Routes, RegistrationError> {
    let failed = |e: tonic_reflection::server::Error| RegistrationError::Failed(format!("reflection: {}", e));
    let v1 = standard_builder(files).build_v1().map_err(failed)?;
    let v1alpha = standard_builder(files).build_v1alpha().map_err(failed)?;
    Ok(routes.add_service(v1).add_service(v1alpha))
}

fn standard_builder(files: &[FileDescriptorProto]) -> tonic_reflection::server::Builder<'static> {
    tonic_reflection::server::Builder::configure()
        .register_encoded_file_descriptor_set(tonic_health::pb::FILE_DESCRIPTOR_SET)
        .register_file_descriptor_set(FileDescriptorSet { file: files.to_vec() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::HttpVerb;

    #[test]
    fn listing_groups_methods_by_service() {
        let descriptors = [
            MethodDescriptor::new("b.v1.Beta", "Get", "b.v1.Req", "b.v1.Resp").with_http(HttpVerb::Get, "/beta/{id}"),
            MethodDescriptor::new("a.v1.Alpha", "Run", "a.v1.Req", "a.v1.Resp"),
            MethodDescriptor::new("b.v1.Beta", "Put", "b.v1.Req", "b.v1.Resp"),
        ];
        let listing = ListServicesResponse::from_descriptors(&descriptors);

        let names: Vec<_> = listing.services.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["a.v1.Alpha", "b.v1.Beta"]);

        let beta = &listing.services[1];
        assert_eq!(beta.methods.len(), 2);
        assert_eq!(beta.methods[0].http_method, "GET");
        assert_eq!(beta.methods[0].http_path, "/beta/{id}");
        assert_eq!(beta.methods[1].http_method, "");
    }

    #[test]
    fn registration_lists_itself() {
        let mut table = MethodTable::new();
        register(&mut table).unwrap();
        assert!(table.contains(&LIST_SERVICES.path()));
        assert_eq!(table.files()[0].name(), "portico/reflection/v1/reflection.proto");
    }

    #[test]
    fn listing_proto_is_self_contained() {
        assert!(crate::schema::unresolved_types(&proto_file()).is_empty());
    }

    #[test]
    fn standard_services_accept_described_files() {
        let mut table = MethodTable::new();
        table.describe(crate::handlers::platform::proto_file());
        register(&mut table).unwrap();

        let routes = Routes::new(tonic_health::server::health_reporter().1);
        assert!(add_standard(routes, table.files()).is_ok());
    }
}
