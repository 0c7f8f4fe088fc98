// crates/portico-rpc/src/method.rs
//
// Method table: wire path -> (descriptor, handler). Filled by registration
// callbacks during configure, then frozen behind an Arc for dispatch.

use std::collections::BTreeMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use prost::Message;
use prost_types::FileDescriptorProto;
use tonic::Status;

use crate::descriptor::MethodDescriptor;
use crate::error::RegistrationError;
use crate::interceptor::{CallContext, UnaryCall, UnaryHandler};

/// One routable method.
#[derive(Clone)]
pub struct MethodEntry {
    pub descriptor: MethodDescriptor,
    pub(crate) handler: Arc<dyn UnaryHandler>,
}

/// All methods served by one RPC server, keyed by wire path.
#[derive(Clone, Default)]
pub struct MethodTable {
    entries: BTreeMap<String, MethodEntry>,
    files: Vec<FileDescriptorProto>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a typed unary method.
    ///
    /// The request is decoded from protobuf before `handler` runs (a
    /// malformed payload answers `InvalidArgument`) and the response is
    /// encoded after it returns.
    pub fn add_unary<Req, Resp, F, Fut>(
        &mut self,
        descriptor: MethodDescriptor,
        handler: F,
    ) -> Result<(), RegistrationError>
    where
        Req: Message + Default + 'static,
        Resp: Message + 'static,
        F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
    {
        let typed = TypedUnary {
            handler,
            _types: PhantomData,
        };
        self.add_handler(descriptor, Arc::new(typed))
    }

    /// Register a method backed by a raw-bytes handler.
    pub fn add_handler(
        &mut self,
        descriptor: MethodDescriptor,
        handler: Arc<dyn UnaryHandler>,
    ) -> Result<(), RegistrationError> {
        let path = descriptor.path();
        descriptor
            .validate()
            .map_err(|reason| RegistrationError::InvalidDescriptor {
                path: path.clone(),
                reason,
            })?;
        if self.entries.contains_key(&path) {
            return Err(RegistrationError::DuplicateMethod(path));
        }
        self.entries.insert(path, MethodEntry { descriptor, handler });
        Ok(())
    }

    /// Attach the proto file describing a registration's messages, so
    /// standard reflection can serve it. A file name seen before is ignored.
    pub fn describe(&mut self, file: FileDescriptorProto) {
        if self.files.iter().any(|f| f.name == file.name) {
            return;
        }
        self.files.push(file);
    }

    /// Proto files attached so far, in registration order.
    pub fn files(&self) -> &[FileDescriptorProto] {
        &self.files
    }

    pub fn lookup(&self, path: &str) -> Option<&MethodEntry> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    /// Descriptors of every registered method, ordered by path.
    pub fn descriptors(&self) -> Vec<MethodDescriptor> {
        self.entries.values().map(|e| e.descriptor).collect()
    }

    /// Distinct service names, sorted.
    pub fn services(&self) -> Vec<&'static str> {
        let mut services: Vec<&'static str> = self.entries.values().map(|e| e.descriptor.service).collect();
        services.sort_unstable();
        services.dedup();
        services
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl std::fmt::Debug for MethodTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.keys()).finish()
    }
}

struct TypedUnary<Req, Resp, F> {
    handler: F,
    _types: PhantomData<fn(Req) -> Resp>,
}

#[async_trait]
impl<Req, Resp, F, Fut> UnaryHandler for TypedUnary<Req, Resp, F>
where
    Req: Message + Default + 'static,
    Resp: Message + 'static,
    F: Fn(CallContext, Req) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Resp, Status>> + Send + 'static,
{
    async fn call(&self, call: UnaryCall) -> Result<Bytes, Status> {
        let request = Req::decode(call.message)
            .map_err(|e| Status::invalid_argument(format!("malformed request message: {}", e)))?;
        let response = (self.handler)(call.context, request).await?;
        Ok(Bytes::from(response.encode_to_vec()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_util::sync::CancellationToken;
    use tonic::metadata::MetadataMap;

    use crate::descriptor::HttpVerb;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Num {
        #[prost(uint64, tag = "1")]
        value: u64,
    }

    const DOUBLE: MethodDescriptor = MethodDescriptor::new("math.v1.Math", "Double", "math.v1.Num", "math.v1.Num");
    const HALVE: MethodDescriptor = MethodDescriptor::new("math.v1.Math", "Halve", "math.v1.Num", "math.v1.Num")
        .with_http(HttpVerb::Get, "/halve/{value}");

    fn table() -> MethodTable {
        let mut table = MethodTable::new();
        table
            .add_unary(DOUBLE, |_ctx, req: Num| async move { Ok(Num { value: req.value * 2 }) })
            .unwrap();
        table
            .add_unary(HALVE, |_ctx, req: Num| async move { Ok(Num { value: req.value / 2 }) })
            .unwrap();
        table
    }

    fn call(message: Bytes) -> UnaryCall {
        UnaryCall {
            context: CallContext::new(DOUBLE.path(), MetadataMap::new(), CancellationToken::new()),
            message,
        }
    }

    #[tokio::test]
    async fn typed_handler_decodes_and_encodes() {
        let table = table();
        let entry = table.lookup("/math.v1.Math/Double").unwrap();
        let out = entry
            .handler
            .call(call(Bytes::from(Num { value: 21 }.encode_to_vec())))
            .await
            .unwrap();
        assert_eq!(Num::decode(out).unwrap().value, 42);
    }

    #[tokio::test]
    async fn malformed_payload_is_invalid_argument() {
        let table = table();
        let entry = table.lookup("/math.v1.Math/Double").unwrap();
        let err = entry
            .handler
            .call(call(Bytes::from_static(&[0xff, 0xff, 0xff])))
            .await
            .unwrap_err();
        assert_eq!(err.code(), tonic::Code::InvalidArgument);
    }

    #[test]
    fn duplicate_paths_are_rejected() {
        let mut table = table();
        let err = table
            .add_unary(DOUBLE, |_ctx, req: Num| async move { Ok(req) })
            .unwrap_err();
        assert_eq!(err, RegistrationError::DuplicateMethod("/math.v1.Math/Double".to_string()));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn invalid_descriptors_are_rejected() {
        let mut table = MethodTable::new();
        let bad = MethodDescriptor::new("math.v1.Math", "", "math.v1.Num", "math.v1.Num");
        let err = table
            .add_unary(bad, |_ctx, req: Num| async move { Ok(req) })
            .unwrap_err();
        assert!(matches!(err, RegistrationError::InvalidDescriptor { .. }));
        assert!(table.is_empty());
    }

    #[test]
    fn described_files_are_kept_once() {
        let mut table = table();
        let file = crate::schema::ProtoFile::new("math/v1/math.proto", "math.v1")
            .message("Num", vec![crate::schema::field::uint64("value", 1)])
            .service(&[DOUBLE, HALVE])
            .build();
        table.describe(file.clone());
        table.describe(file);
        assert_eq!(table.files().len(), 1);
        assert_eq!(table.files()[0].service[0].method.len(), 2);
    }

    #[test]
    fn services_are_distinct() {
        assert_eq!(table().services(), vec!["math.v1.Math"]);
        assert_eq!(table().descriptors().len(), 2);
    }
}
