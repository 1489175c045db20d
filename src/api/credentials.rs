use std::env;

use async_trait::async_trait;

use crate::api::{
    error::{ApiError, ApiErrorKind, invalid_request},
    types::{CredentialRef, ResolvedCredential},
};

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn resolve(&self, reference: &CredentialRef) -> Result<ResolvedCredential, ApiError>;
}

#[derive(Default)]
pub struct EnvCredentialProvider;

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn resolve(&self, reference: &CredentialRef) -> Result<ResolvedCredential, ApiError> {
        match reference {
            CredentialRef::Env { var } => {
                let token = env::var(var).map_err(|_| {
                    ApiError::new(
                        ApiErrorKind::Unauthorized,
                        format!("missing credential environment variable {}", var),
                    )
                })?;
                if token.trim().is_empty() {
                    return Err(invalid_request(format!(
                        "credential environment variable {} is empty",
                        var
                    )));
                }
                Ok(ResolvedCredential::bearer(token.trim()))
            }
            CredentialRef::InlineToken { token } => {
                if token.trim().is_empty() {
                    return Err(invalid_request("inline credential token cannot be empty"));
                }
                Ok(ResolvedCredential::bearer(token))
            }
            CredentialRef::None => Ok(ResolvedCredential::none()),
        }
    }
}
