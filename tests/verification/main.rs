mod flow;

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;

use portal_core::{
    api::{
        ApiError, ApiErrorKind,
        endpoints::{
            CheckVerificationRequest, CheckVerificationResponse, StartVerificationRequest,
            StartVerificationResponse,
        },
    },
    verification::{VerificationApi, VerificationConfig, VerificationFlow},
};

/// Scripted server: replies are consumed in order, requests are recorded.
#[derive(Default)]
pub struct MockVerificationApi {
    start_replies: Mutex<VecDeque<Result<StartVerificationResponse, ApiError>>>,
    check_replies: Mutex<VecDeque<Result<CheckVerificationResponse, ApiError>>>,
    pub starts: Mutex<Vec<StartVerificationRequest>>,
    pub checks: Mutex<Vec<CheckVerificationRequest>>,
}

impl MockVerificationApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply_start(&self, reply: Result<StartVerificationResponse, ApiError>) {
        self.start_replies.lock().expect("lock").push_back(reply);
    }

    pub fn reply_check(&self, reply: Result<CheckVerificationResponse, ApiError>) {
        self.check_replies.lock().expect("lock").push_back(reply);
    }

    pub fn start_count(&self) -> usize {
        self.starts.lock().expect("lock").len()
    }

    pub fn check_count(&self) -> usize {
        self.checks.lock().expect("lock").len()
    }
}

#[async_trait]
impl VerificationApi for MockVerificationApi {
    async fn start(
        &self,
        request: StartVerificationRequest,
    ) -> Result<StartVerificationResponse, ApiError> {
        self.starts.lock().expect("lock").push(request);
        self.start_replies
            .lock()
            .expect("lock")
            .pop_front()
            .expect("unexpected start call")
    }

    async fn check(
        &self,
        request: CheckVerificationRequest,
    ) -> Result<CheckVerificationResponse, ApiError> {
        self.checks.lock().expect("lock").push(request);
        self.check_replies
            .lock()
            .expect("lock")
            .pop_front()
            .expect("unexpected check call")
    }
}

pub fn sent() -> Result<StartVerificationResponse, ApiError> {
    Ok(StartVerificationResponse {
        success: true,
        message: Some("Verification code sent".to_string()),
    })
}

pub fn code_result(success: bool, valid: bool) -> Result<CheckVerificationResponse, ApiError> {
    Ok(CheckVerificationResponse {
        success,
        valid,
        message: None,
    })
}

pub fn network_down() -> ApiError {
    ApiError::new(ApiErrorKind::Transport, "connection refused")
}

pub fn flow_with(api: &Arc<MockVerificationApi>) -> VerificationFlow {
    VerificationFlow::new(api.clone(), VerificationConfig::default())
}
