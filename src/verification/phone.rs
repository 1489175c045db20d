use validator::Validate;

use crate::{
    api::endpoints::{
        CheckVerificationRequest, E164_PATTERN, StartVerificationRequest, VerificationChannel,
    },
    verification::error::{VerificationError, validation_error},
};

pub const MIN_CODE_LEN: usize = 4;
pub const MAX_CODE_LEN: usize = 10;

/// Normalizes user input to E.164.
///
/// Spaces, dashes, dots and parentheses are stripped first. The remainder
/// must match `^\+?[1-9]\d{9,14}$`. A bare 10-digit number is treated as
/// North American and gets `+1`; any other number without `+` already
/// carries its country code and only gets the `+`.
pub fn normalize_phone_number(input: &str) -> Result<String, VerificationError> {
    let compact: String = input
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '.' | '(' | ')'))
        .collect();

    if compact.is_empty() {
        return Err(validation_error("phone number is required"));
    }
    if !E164_PATTERN.is_match(&compact) {
        return Err(validation_error(format!(
            "'{}' is not a valid phone number (expected 10-15 digits)",
            input.trim()
        )));
    }

    if compact.starts_with('+') {
        return Ok(compact);
    }
    if compact.len() == 10 {
        return Ok(format!("+1{}", compact));
    }
    Ok(format!("+{}", compact))
}

/// Builds the start request, refusing numbers that are not E.164.
pub fn start_request(
    phone_number: &str,
    channel: VerificationChannel,
) -> Result<StartVerificationRequest, VerificationError> {
    let request = StartVerificationRequest {
        phone_number: phone_number.to_string(),
        channel,
    };
    request
        .validate()
        .map_err(|errors| validation_error(format!("cannot send a code to this number: {}", errors)))?;
    Ok(request)
}

/// Checks the code length and builds the check request for `phone_number`.
pub fn check_request(
    phone_number: &str,
    code: &str,
) -> Result<CheckVerificationRequest, VerificationError> {
    let request = CheckVerificationRequest {
        phone_number: phone_number.to_string(),
        code: code.trim().to_string(),
    };
    request.validate().map_err(|errors| {
        validation_error(format!(
            "verification code must be {}-{} characters: {}",
            MIN_CODE_LEN, MAX_CODE_LEN, errors
        ))
    })?;
    Ok(request)
}
