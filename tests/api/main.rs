mod reqwest_transport;

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use serde_json::Value;

use portal_core::api::{
    ApiClient, ApiError,
    telemetry::{ApiTelemetryEvent, TelemetrySink},
    transport::HttpTransport,
    types::{ApiConfig, ApiRequest, ApiResponse, CredentialRef},
};

/// Records every request and answers from a queue of canned responses.
#[derive(Default)]
pub struct MockTransport {
    replies: Mutex<VecDeque<Result<ApiResponse, ApiError>>>,
    pub requests: Mutex<Vec<ApiRequest>>,
}

impl MockTransport {
    pub fn replying(replies: Vec<Result<ApiResponse, ApiError>>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(VecDeque::from(replies)),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn recorded(&self) -> Vec<ApiRequest> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        self.requests.lock().expect("lock").push(request);
        self.replies
            .lock()
            .expect("lock")
            .pop_front()
            .expect("unexpected request")
    }
}

#[derive(Default)]
pub struct RecordingTelemetry {
    pub events: Mutex<Vec<ApiTelemetryEvent>>,
}

impl TelemetrySink for RecordingTelemetry {
    fn on_event(&self, event: ApiTelemetryEvent) {
        self.events.lock().expect("lock").push(event);
    }
}

pub fn respond(status: u16, body: Value) -> Result<ApiResponse, ApiError> {
    Ok(ApiResponse { status, body })
}

pub fn config() -> ApiConfig {
    ApiConfig {
        base_url: "https://portal.example.test/".to_string(),
        credential: CredentialRef::InlineToken {
            token: "session-token".to_string(),
        },
        ..ApiConfig::default()
    }
}

pub fn client_with(config: ApiConfig, transport: &Arc<MockTransport>) -> ApiClient {
    ApiClient::with_transport(config, transport.clone())
}
