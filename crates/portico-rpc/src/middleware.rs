// crates/portico-rpc/src/middleware.rs
//
// The two mandatory interceptors: panic recovery and per-call logging.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use futures::FutureExt;
use tonic::{Code, Status};

use crate::interceptor::{Interceptor, Next, UnaryCall};

/// Message returned to callers whose handler panicked.
pub const INTERNAL_ERROR_MESSAGE: &str = "internal server error";

/// Converts a panic anywhere below it into a single `Internal` status.
///
/// The panic is confined to the call that raised it: the connection, the
/// server and concurrent calls carry on.
#[derive(Debug, Default, Clone, Copy)]
pub struct Recovery;

#[async_trait]
impl Interceptor for Recovery {
    fn name(&self) -> &'static str {
        "recovery"
    }

    async fn intercept(&self, call: UnaryCall, next: Next) -> Result<Bytes, Status> {
        let method = call.context.method_arc();
        match AssertUnwindSafe(next.run(call)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => {
                let panic = panic_message(payload.as_ref());
                tracing::error!(method = %method, panic = %panic, "rpc handler panicked");
                Err(Status::internal(INTERNAL_ERROR_MESSAGE))
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Emits exactly one record per call with `method`, `duration_ms` and `code`.
///
/// Successful calls log at info, failed ones at error. A call that panics is
/// recorded as `Internal` before the panic continues outward; a call whose
/// future is dropped (abandoned at shutdown, or the client went away) is
/// recorded as `Cancelled`.
#[derive(Debug, Default, Clone, Copy)]
pub struct CallLogger;

#[async_trait]
impl Interceptor for CallLogger {
    fn name(&self) -> &'static str {
        "logging"
    }

    async fn intercept(&self, call: UnaryCall, next: Next) -> Result<Bytes, Status> {
        let mut record = CallRecord::start(call.context.method_arc());
        match AssertUnwindSafe(next.run(call)).catch_unwind().await {
            Ok(result) => {
                match &result {
                    Ok(_) => record.finish(Code::Ok, ""),
                    Err(status) => record.finish(status.code(), status.message()),
                }
                result
            }
            Err(payload) => {
                record.finish(Code::Internal, "handler panicked");
                drop(record);
                std::panic::resume_unwind(payload)
            }
        }
    }
}

/// Drop guard that writes the call's log line.
struct CallRecord {
    method: Arc<str>,
    started: Instant,
    outcome: Option<(Code, String)>,
}

impl CallRecord {
    fn start(method: Arc<str>) -> Self {
        Self {
            method,
            started: Instant::now(),
            outcome: None,
        }
    }

    fn finish(&mut self, code: Code, message: &str) {
        self.outcome = Some((code, message.to_string()));
    }
}

impl Drop for CallRecord {
    fn drop(&mut self) {
        let duration_ms = self.started.elapsed().as_secs_f64() * 1000.0;
        let (code, message) = self
            .outcome
            .take()
            .unwrap_or_else(|| (Code::Cancelled, "call abandoned before completion".to_string()));

        if code == Code::Ok {
            tracing::info!(
                method = %self.method,
                duration_ms,
                code = ?code,
                "rpc call completed"
            );
        } else {
            tracing::error!(
                method = %self.method,
                duration_ms,
                code = ?code,
                error = %message,
                "rpc call failed"
            );
        }
    }
}
