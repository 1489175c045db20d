use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, header};
use serde_json::Value;

use crate::api::{
    error::{ApiError, decode_error, internal_error, transport_error},
    types::{ApiRequest, ApiResponse, Method},
};

/// Sends one HTTP exchange. Non-2xx statuses are returned as responses, not errors.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self, ApiError> {
        let client = Client::builder()
            .pool_idle_timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| internal_error(format!("failed to build http client: {}", err)))?;
        Ok(Self { client })
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, ApiError> {
        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        };

        let mut req_builder = self
            .client
            .request(method, &request.url)
            .timeout(request.timeout)
            .header(header::ACCEPT, "application/json")
            .header("x-request-id", request.request_id.as_str());

        if !request.query.is_empty() {
            req_builder = req_builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            req_builder = req_builder.json(body);
        }
        if let Some(auth_header) = &request.credential.auth_header {
            req_builder = req_builder.header(header::AUTHORIZATION, auth_header.as_str());
        }
        for (k, v) in &request.credential.extra_headers {
            req_builder = req_builder.header(k.as_str(), v.as_str());
        }

        let response = req_builder.send().await.map_err(|err| {
            transport_error(format!("request failed: {}", err)).with_path(request.path.clone())
        })?;

        let status = response.status().as_u16();
        let text = response.text().await.map_err(|err| {
            transport_error(format!("failed to read response body: {}", err))
                .with_path(request.path.clone())
                .with_status(status)
        })?;

        let body = parse_body(&text, status).map_err(|err| err.with_path(request.path.clone()))?;
        Ok(ApiResponse { status, body })
    }
}

/// Empty bodies become `null`; non-JSON bodies on error statuses are kept as strings.
fn parse_body(text: &str, status: u16) -> Result<Value, ApiError> {
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }

    match serde_json::from_str(text) {
        Ok(value) => Ok(value),
        Err(_) if !(200..300).contains(&status) => Ok(Value::String(text.to_string())),
        Err(err) => Err(decode_error(format!("response body is not valid json: {}", err))
            .with_status(status)),
    }
}
