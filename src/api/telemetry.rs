use crate::api::{
    error::ApiErrorKind,
    types::{Method, RequestId},
};

#[derive(Debug, Clone)]
pub enum ApiTelemetryEvent {
    RequestStarted {
        request_id: RequestId,
        method: Method,
        path: String,
    },
    RequestCompleted {
        request_id: RequestId,
        status: u16,
        elapsed_ms: u64,
    },
    RequestFailed {
        request_id: RequestId,
        kind: ApiErrorKind,
        status: Option<u16>,
        elapsed_ms: u64,
    },
}

pub trait TelemetrySink: Send + Sync {
    fn on_event(&self, event: ApiTelemetryEvent);
}

#[derive(Default)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn on_event(&self, _event: ApiTelemetryEvent) {}
}

/// Forwards every event to `tracing` under the `api` target.
#[derive(Default)]
pub struct TracingTelemetrySink;

impl TelemetrySink for TracingTelemetrySink {
    fn on_event(&self, event: ApiTelemetryEvent) {
        match event {
            ApiTelemetryEvent::RequestStarted {
                request_id,
                method,
                path,
            } => {
                tracing::debug!(
                    target: "api",
                    request_id = %request_id,
                    method = %method,
                    path = %path,
                    "request_started"
                );
            }
            ApiTelemetryEvent::RequestCompleted {
                request_id,
                status,
                elapsed_ms,
            } => {
                tracing::debug!(
                    target: "api",
                    request_id = %request_id,
                    status = status,
                    elapsed_ms = elapsed_ms,
                    "request_completed"
                );
            }
            ApiTelemetryEvent::RequestFailed {
                request_id,
                kind,
                status,
                elapsed_ms,
            } => {
                tracing::warn!(
                    target: "api",
                    request_id = %request_id,
                    kind = ?kind,
                    status = ?status,
                    elapsed_ms = elapsed_ms,
                    "request_failed"
                );
            }
        }
    }
}
