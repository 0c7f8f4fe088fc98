// crates/portico-rpc/src/interceptor.rs
//
// Unary call pipeline.
//
// An InterceptorChain `[I1, I2, ..., In]` wraps a handler as
// `I1(I2(...(In(handler))))`: the first entry is outermost. The chain is
// fixed when the server is configured and shared immutably by every call.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tonic::metadata::MetadataMap;
use tonic::Status;

use crate::middleware::{CallLogger, Recovery};

/// Per-call context handed to interceptors and handlers.
#[derive(Debug, Clone)]
pub struct CallContext {
    method: Arc<str>,
    metadata: MetadataMap,
    shutdown: CancellationToken,
}

impl CallContext {
    pub fn new(method: impl Into<Arc<str>>, metadata: MetadataMap, shutdown: CancellationToken) -> Self {
        Self {
            method: method.into(),
            metadata,
            shutdown,
        }
    }

    /// Full method path, e.g. `/platform.v1.PlatformService/Ping`.
    pub fn method(&self) -> &str {
        &self.method
    }

    pub(crate) fn method_arc(&self) -> Arc<str> {
        Arc::clone(&self.method)
    }

    /// Request metadata (gRPC headers) sent by the caller.
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// True once the server has begun draining.
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolves when the server begins draining. Long-running handlers can
    /// select on this to finish early.
    pub async fn shutdown_requested(&self) {
        self.shutdown.cancelled().await
    }
}

/// A unary call in flight: its context and the encoded request message.
#[derive(Debug, Clone)]
pub struct UnaryCall {
    pub context: CallContext,
    pub message: Bytes,
}

/// Terminal stage of the pipeline: decodes the request, runs the method
/// and encodes the response.
#[async_trait]
pub trait UnaryHandler: Send + Sync {
    async fn call(&self, call: UnaryCall) -> Result<Bytes, Status>;
}

/// Call-wrapping middleware.
///
/// An interceptor may inspect or replace the call, short-circuit with an
/// error, or invoke `next.run(call)` to continue down the chain.
#[async_trait]
pub trait Interceptor: Send + Sync {
    /// Short name used in diagnostics.
    fn name(&self) -> &'static str;

    async fn intercept(&self, call: UnaryCall, next: Next) -> Result<Bytes, Status>;
}

/// The remainder of the chain below the current interceptor.
pub struct Next {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
    position: usize,
    handler: Arc<dyn UnaryHandler>,
}

impl Next {
    /// Run the next interceptor, or the handler once the chain is exhausted.
    pub async fn run(self, call: UnaryCall) -> Result<Bytes, Status> {
        match self.interceptors.get(self.position).cloned() {
            Some(interceptor) => {
                let next = Next {
                    interceptors: self.interceptors,
                    position: self.position + 1,
                    handler: self.handler,
                };
                interceptor.intercept(call, next).await
            }
            None => self.handler.call(call).await,
        }
    }
}

/// Ordered, immutable list of interceptors.
#[derive(Clone)]
pub struct InterceptorChain {
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl InterceptorChain {
    pub fn new(interceptors: Vec<Arc<dyn Interceptor>>) -> Self {
        Self {
            interceptors: interceptors.into(),
        }
    }

    /// The mandatory pair: Recovery outermost, then CallLogger.
    pub fn standard() -> Self {
        Self::new(vec![Arc::new(Recovery), Arc::new(CallLogger)])
    }

    /// A chain with no interceptors; calls go straight to the handler.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Interceptor names, outermost first.
    pub fn names(&self) -> Vec<&'static str> {
        self.interceptors.iter().map(|i| i.name()).collect()
    }

    /// Run `call` through every interceptor and then `handler`.
    pub async fn invoke(&self, call: UnaryCall, handler: Arc<dyn UnaryHandler>) -> Result<Bytes, Status> {
        Next {
            interceptors: Arc::clone(&self.interceptors),
            position: 0,
            handler,
        }
        .run(call)
        .await
    }
}

impl Default for InterceptorChain {
    fn default() -> Self {
        Self::standard()
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Tag {
        name: &'static str,
        trail: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Interceptor for Tag {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn intercept(&self, call: UnaryCall, next: Next) -> Result<Bytes, Status> {
            self.trail.lock().unwrap().push(format!("enter {}", self.name));
            let result = next.run(call).await;
            self.trail.lock().unwrap().push(format!("leave {}", self.name));
            result
        }
    }

    struct Reject;

    #[async_trait]
    impl Interceptor for Reject {
        fn name(&self) -> &'static str {
            "reject"
        }

        async fn intercept(&self, _call: UnaryCall, _next: Next) -> Result<Bytes, Status> {
            Err(Status::permission_denied("rejected"))
        }
    }

    struct Echo {
        trail: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl UnaryHandler for Echo {
        async fn call(&self, call: UnaryCall) -> Result<Bytes, Status> {
            self.trail.lock().unwrap().push("handler".to_string());
            Ok(call.message)
        }
    }

    fn call(message: &'static [u8]) -> UnaryCall {
        UnaryCall {
            context: CallContext::new("/demo.v1.Demo/Echo", MetadataMap::new(), CancellationToken::new()),
            message: Bytes::from_static(message),
        }
    }

    #[tokio::test]
    async fn first_interceptor_is_outermost() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(vec![
            Arc::new(Tag { name: "a", trail: trail.clone() }),
            Arc::new(Tag { name: "b", trail: trail.clone() }),
        ]);
        let handler: Arc<dyn UnaryHandler> = Arc::new(Echo { trail: trail.clone() });

        let out = chain.invoke(call(b"hi"), handler).await.unwrap();
        assert_eq!(&out[..], b"hi");
        assert_eq!(
            *trail.lock().unwrap(),
            vec!["enter a", "enter b", "handler", "leave b", "leave a"]
        );
    }

    #[tokio::test]
    async fn interceptor_can_short_circuit() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let chain = InterceptorChain::new(vec![
            Arc::new(Tag { name: "outer", trail: trail.clone() }),
            Arc::new(Reject),
        ]);
        let handler: Arc<dyn UnaryHandler> = Arc::new(Echo { trail: trail.clone() });

        let err = chain.invoke(call(b"x"), handler).await.unwrap_err();
        assert_eq!(err.code(), tonic::Code::PermissionDenied);
        assert_eq!(*trail.lock().unwrap(), vec!["enter outer", "leave outer"]);
    }

    #[tokio::test]
    async fn empty_chain_calls_handler_directly() {
        let trail = Arc::new(Mutex::new(Vec::new()));
        let handler: Arc<dyn UnaryHandler> = Arc::new(Echo { trail: trail.clone() });
        let out = InterceptorChain::empty().invoke(call(b"raw"), handler).await.unwrap();
        assert_eq!(&out[..], b"raw");
    }

    #[test]
    fn standard_chain_puts_recovery_first() {
        assert_eq!(InterceptorChain::standard().names(), vec!["recovery", "logging"]);
    }

    #[test]
    fn context_reports_shutdown() {
        let token = CancellationToken::new();
        let ctx = CallContext::new("/a.B/C", MetadataMap::new(), token.clone());
        assert!(!ctx.is_shutting_down());
        token.cancel();
        assert!(ctx.is_shutting_down());
    }
}
