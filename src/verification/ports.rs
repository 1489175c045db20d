use async_trait::async_trait;

use crate::api::{
    ApiClient, ApiError,
    endpoints::{
        CheckVerificationRequest, CheckVerificationResponse, StartVerificationRequest,
        StartVerificationResponse, VERIFICATION_CHECK_PATH, VERIFICATION_START_PATH,
    },
};

/// Server side of the verification flow.
#[async_trait]
pub trait VerificationApi: Send + Sync {
    async fn start(
        &self,
        request: StartVerificationRequest,
    ) -> Result<StartVerificationResponse, ApiError>;

    async fn check(
        &self,
        request: CheckVerificationRequest,
    ) -> Result<CheckVerificationResponse, ApiError>;
}

pub struct HttpVerificationApi {
    client: ApiClient,
}

impl HttpVerificationApi {
    pub fn new(client: ApiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl VerificationApi for HttpVerificationApi {
    async fn start(
        &self,
        request: StartVerificationRequest,
    ) -> Result<StartVerificationResponse, ApiError> {
        self.client
            .post_typed(VERIFICATION_START_PATH, &request)
            .await
    }

    async fn check(
        &self,
        request: CheckVerificationRequest,
    ) -> Result<CheckVerificationResponse, ApiError> {
        self.client
            .post_typed(VERIFICATION_CHECK_PATH, &request)
            .await
    }
}
