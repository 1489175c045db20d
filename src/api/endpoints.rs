//! Typed payloads for the endpoints this crate calls directly.
//!
//! Everything else in the portal API is consumed as raw JSON through the
//! query cache and parsed by the caller with `Subscription::data_as`.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const VERIFICATION_START_PATH: &str = "/api/verification/start";
pub const VERIFICATION_CHECK_PATH: &str = "/api/verification/check";

pub static E164_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[1-9]\d{9,14}$").expect("e164 pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum VerificationChannel {
    #[default]
    Sms,
    Call,
}

impl VerificationChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            VerificationChannel::Sms => "sms",
            VerificationChannel::Call => "call",
        }
    }
}

impl std::str::FromStr for VerificationChannel {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "sms" => Ok(VerificationChannel::Sms),
            "call" | "voice" => Ok(VerificationChannel::Call),
            other => Err(format!("unknown verification channel '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct StartVerificationRequest {
    #[validate(regex(path = *E164_PATTERN, message = "phone number must be 10-15 digits"))]
    pub phone_number: String,
    pub channel: VerificationChannel,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartVerificationResponse {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CheckVerificationRequest {
    #[validate(regex(path = *E164_PATTERN, message = "phone number must be 10-15 digits"))]
    pub phone_number: String,
    #[validate(length(min = 4, max = 10, message = "code must be 4-10 characters"))]
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckVerificationResponse {
    pub success: bool,
    #[serde(default)]
    pub valid: bool,
    #[serde(default)]
    pub message: Option<String>,
}
