use std::{collections::BTreeMap, sync::Arc, time::Instant};

use futures_util::FutureExt;
use reqwest::Url;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use uuid::Uuid;

use crate::{
    api::{
        credentials::{CredentialProvider, EnvCredentialProvider},
        error::{
            ApiError, ApiErrorKind, decode_error, internal_error, invalid_request, map_http_error,
        },
        telemetry::{ApiTelemetryEvent, TelemetrySink, TracingTelemetrySink},
        transport::{HttpTransport, ReqwestTransport},
        types::{ApiConfig, ApiRequest, Method, UnauthorizedBehavior},
    },
    query::{Fetcher, QueryKey},
};

/// Only the path of this url is kept when a query key is turned into a request target.
const KEY_BASE_URL: &str = "http://query-key.invalid/";

/// JSON-over-HTTP client for the portal REST API.
#[derive(Clone)]
pub struct ApiClient {
    config: ApiConfig,
    transport: Arc<dyn HttpTransport>,
    credential_provider: Arc<dyn CredentialProvider>,
    telemetry: Arc<dyn TelemetrySink>,
}

impl ApiClient {
    pub fn new(config: ApiConfig) -> Result<Self, ApiError> {
        Ok(Self::with_transport(config, Arc::new(ReqwestTransport::new()?)))
    }

    pub fn with_transport(config: ApiConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            config,
            transport,
            credential_provider: Arc::new(EnvCredentialProvider),
            telemetry: Arc::new(TracingTelemetrySink),
        }
    }

    pub fn with_credential_provider(
        mut self,
        credential_provider: Arc<dyn CredentialProvider>,
    ) -> Self {
        self.credential_provider = credential_provider;
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn config(&self) -> &ApiConfig {
        &self.config
    }

    pub async fn get_json(
        &self,
        path: &str,
        query: BTreeMap<String, String>,
    ) -> Result<Value, ApiError> {
        self.send_json(Method::Get, path, query, None).await
    }

    pub async fn post_json(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send_json(Method::Post, path, BTreeMap::new(), Some(body))
            .await
    }

    pub async fn patch_json(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.send_json(Method::Patch, path, BTreeMap::new(), Some(body))
            .await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.send_json(Method::Delete, path, BTreeMap::new(), None)
            .await
    }

    /// Serializes `body`, POSTs it, and parses the reply into `R`.
    pub async fn post_typed<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let body = serde_json::to_value(body)
            .map_err(|err| invalid_request(format!("failed to encode request body: {}", err)))?;
        let value = self.post_json(path, body).await?;
        serde_json::from_value(value).map_err(|err| {
            decode_error(format!("unexpected response shape: {}", err)).with_path(path.to_string())
        })
    }

    pub async fn send_json(
        &self,
        method: Method,
        path: &str,
        query: BTreeMap<String, String>,
        body: Option<Value>,
    ) -> Result<Value, ApiError> {
        let url = self.resolve_url(path)?;
        let credential = self
            .credential_provider
            .resolve(&self.config.credential)
            .await?;
        let request = ApiRequest {
            request_id: Uuid::now_v7().to_string(),
            method,
            url,
            path: path.to_string(),
            query,
            body,
            credential,
            timeout: self.config.request_timeout(),
        };
        let request_id = request.request_id.clone();

        self.telemetry.on_event(ApiTelemetryEvent::RequestStarted {
            request_id: request_id.clone(),
            method,
            path: path.to_string(),
        });
        let started_at = Instant::now();

        let outcome = match self.transport.send(request).await {
            Ok(response) if response.is_success() => Ok((response.status, response.body)),
            Ok(response)
                if response.status == 401
                    && method.is_idempotent()
                    && self.config.on_unauthorized == UnauthorizedBehavior::ReturnNull =>
            {
                Ok((response.status, Value::Null))
            }
            Ok(response) => {
                let body_text = match &response.body {
                    Value::String(text) => text.clone(),
                    Value::Null => String::new(),
                    other => other.to_string(),
                };
                Err(map_http_error(response.status, path, &body_text))
            }
            Err(err) => Err(err),
        };

        let elapsed_ms = started_at.elapsed().as_millis() as u64;
        match outcome {
            Ok((status, body)) => {
                self.telemetry.on_event(ApiTelemetryEvent::RequestCompleted {
                    request_id,
                    status,
                    elapsed_ms,
                });
                Ok(body)
            }
            Err(err) => {
                self.telemetry.on_event(ApiTelemetryEvent::RequestFailed {
                    request_id,
                    kind: err.kind,
                    status: err.status,
                    elapsed_ms,
                });
                Err(err)
            }
        }
    }

    /// The default query function: derives a GET from the key's segments.
    pub fn resource_fetcher(&self, key: &QueryKey) -> Fetcher {
        let client = self.clone();
        let target = request_target_for_key(key);
        Arc::new(move || {
            let client = client.clone();
            let target = target.clone();
            async move {
                let (path, query) = target?;
                client.get_json(&path, query).await
            }
            .boxed()
        })
    }

    fn resolve_url(&self, path: &str) -> Result<String, ApiError> {
        if path.starts_with("http://") || path.starts_with("https://") {
            return Ok(path.to_string());
        }
        if !path.starts_with('/') {
            return Err(invalid_request(format!(
                "api path must start with '/': {}",
                path
            )));
        }
        Ok(format!(
            "{}{}",
            self.config.base_url.trim_end_matches('/'),
            path
        ))
    }
}

/// Scalar segments are joined onto the path; object segments become query parameters.
///
/// Each scalar segment is percent-encoded as a single path segment, so `/`,
/// `?` and `#` inside an id cannot change the request target. `.` and `..`
/// are refused.
pub fn request_target_for_key(
    key: &QueryKey,
) -> Result<(String, BTreeMap<String, String>), ApiError> {
    let mut segments = key.segments().iter();
    let root = match segments.next() {
        Some(Value::String(path)) if path.starts_with('/') => path,
        _ => {
            return Err(invalid_request(format!(
                "query key {} must start with an api path",
                key
            )));
        }
    };

    let mut target = Url::parse(KEY_BASE_URL)
        .and_then(|base| base.join(root))
        .map_err(|err| invalid_request(format!("query key {} has a bad path: {}", key, err)))?;
    let mut query = BTreeMap::new();
    {
        let mut path = target
            .path_segments_mut()
            .map_err(|()| internal_error("query key base url cannot carry a path"))?;
        path.pop_if_empty();

        for segment in segments {
            let text = match segment {
                Value::Null => continue,
                Value::String(text) => text.clone(),
                Value::Number(number) => number.to_string(),
                Value::Bool(flag) => flag.to_string(),
                Value::Object(filters) => {
                    for (name, value) in filters {
                        match value {
                            Value::Null => {}
                            Value::String(text) => {
                                query.insert(name.clone(), text.clone());
                            }
                            other => {
                                query.insert(name.clone(), other.to_string());
                            }
                        }
                    }
                    continue;
                }
                Value::Array(_) => {
                    return Err(ApiError::new(
                        ApiErrorKind::InvalidRequest,
                        format!("query key {} has an array segment", key),
                    ));
                }
            };
            if matches!(text.as_str(), "" | "." | "..") {
                return Err(invalid_request(format!(
                    "query key {} has an empty or relative path segment",
                    key
                )));
            }
            path.push(&text);
        }
    }

    Ok((target.path().to_string(), query))
}
