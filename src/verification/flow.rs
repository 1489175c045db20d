use std::{sync::Arc, time::Duration};

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::{
    api::endpoints::VerificationChannel,
    verification::{
        error::{VerificationError, invalid_transition, rejected},
        phone::{check_request, normalize_phone_number, start_request},
        ports::VerificationApi,
    },
};

fn default_redirect_delay_ms() -> u64 {
    2_000
}

fn default_redirect_path() -> String {
    "/dashboard".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationConfig {
    #[serde(default = "default_redirect_delay_ms")]
    pub redirect_delay_ms: u64,
    #[serde(default = "default_redirect_path")]
    pub redirect_path: String,
    #[serde(default)]
    pub default_channel: VerificationChannel,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            redirect_delay_ms: default_redirect_delay_ms(),
            redirect_path: default_redirect_path(),
            default_channel: VerificationChannel::Sms,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VerificationStep {
    CollectPhone,
    CollectCode,
    Verified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSession {
    pub phone_number: String,
    pub channel: VerificationChannel,
    pub step: VerificationStep,
    pub verified: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingRedirect {
    path: String,
    due_at: Instant,
}

/// Two-step phone verification: request a code, then submit it.
///
/// ```text
/// CollectPhone --start ok--> CollectCode --verify ok--> Verified
///       ^                      |   ^  |
///       +-------- back --------+   +--+ verify failed / resend
/// ```
///
/// Failures never leave the current step; the error is kept in
/// `last_error` until the next action.
pub struct VerificationFlow {
    api: Arc<dyn VerificationApi>,
    config: VerificationConfig,
    channel: VerificationChannel,
    session: Option<VerificationSession>,
    entered_code: Option<String>,
    last_error: Option<VerificationError>,
    status_message: Option<String>,
    redirect: Option<PendingRedirect>,
    shutdown: CancellationToken,
}

impl VerificationFlow {
    pub fn new(api: Arc<dyn VerificationApi>, config: VerificationConfig) -> Self {
        let channel = config.default_channel;
        Self {
            api,
            config,
            channel,
            session: None,
            entered_code: None,
            last_error: None,
            status_message: None,
            redirect: None,
            shutdown: CancellationToken::new(),
        }
    }

    /// Resumes at code entry for a number that was already sent a code,
    /// e.g. after the page holding the flow was reloaded.
    pub fn resume(
        api: Arc<dyn VerificationApi>,
        config: VerificationConfig,
        phone_input: &str,
        channel: VerificationChannel,
    ) -> Result<Self, VerificationError> {
        let phone_number = normalize_phone_number(phone_input)?;
        let mut flow = Self::new(api, config);
        flow.channel = channel;
        flow.session = Some(VerificationSession {
            phone_number,
            channel,
            step: VerificationStep::CollectCode,
            verified: false,
        });
        Ok(flow)
    }

    pub fn step(&self) -> VerificationStep {
        self.session
            .as_ref()
            .map(|session| session.step)
            .unwrap_or(VerificationStep::CollectPhone)
    }

    pub fn session(&self) -> Option<&VerificationSession> {
        self.session.as_ref()
    }

    pub fn channel(&self) -> VerificationChannel {
        self.channel
    }

    pub fn entered_code(&self) -> Option<&str> {
        self.entered_code.as_deref()
    }

    pub fn last_error(&self) -> Option<&VerificationError> {
        self.last_error.as_ref()
    }

    /// Informational message from the last successful server call.
    pub fn status_message(&self) -> Option<&str> {
        self.status_message.as_deref()
    }

    /// The channel can only change while the phone number is being collected.
    pub fn set_channel(&mut self, channel: VerificationChannel) -> Result<(), VerificationError> {
        if self.step() != VerificationStep::CollectPhone {
            return Err(invalid_transition(
                "the delivery channel can only change before a code is requested",
            ));
        }
        self.channel = channel;
        Ok(())
    }

    pub async fn start(
        &mut self,
        phone_input: &str,
        channel: VerificationChannel,
    ) -> Result<(), VerificationError> {
        if self.step() != VerificationStep::CollectPhone {
            return Err(invalid_transition(format!(
                "cannot request a code from step {:?}",
                self.step()
            )));
        }

        self.channel = channel;
        let phone_number = match normalize_phone_number(phone_input) {
            Ok(phone_number) => phone_number,
            Err(err) => return Err(self.record_error(err)),
        };

        self.request_code(phone_number, channel).await?;
        self.session = self.session.take().map(|mut session| {
            session.step = VerificationStep::CollectCode;
            session
        });
        Ok(())
    }

    pub async fn resend(&mut self) -> Result<(), VerificationError> {
        let Some(session) = self.session.as_ref() else {
            return Err(invalid_transition("no code has been requested yet"));
        };
        if session.step != VerificationStep::CollectCode {
            return Err(invalid_transition(format!(
                "cannot resend a code from step {:?}",
                session.step
            )));
        }

        let phone_number = session.phone_number.clone();
        let channel = session.channel;
        self.request_code(phone_number, channel).await?;
        self.entered_code = None;
        Ok(())
    }

    pub async fn verify(&mut self, code: &str) -> Result<(), VerificationError> {
        let Some(session) = self.session.as_ref() else {
            return Err(invalid_transition("no code has been requested yet"));
        };
        if session.step != VerificationStep::CollectCode {
            return Err(invalid_transition(format!(
                "cannot verify a code from step {:?}",
                session.step
            )));
        }

        self.entered_code = Some(code.to_string());
        let request = match check_request(&session.phone_number, code) {
            Ok(request) => request,
            Err(err) => return Err(self.record_error(err)),
        };
        let masked = mask_phone_number(&request.phone_number);

        let response = match self.api.check(request).await {
            Ok(response) => response,
            Err(err) => return Err(self.record_error(err.into())),
        };

        if !(response.success && response.valid) {
            tracing::info!(
                target: "verification",
                phone = %masked,
                success = response.success,
                "verification_code_rejected"
            );
            let message = response
                .message
                .unwrap_or_else(|| "invalid verification code".to_string());
            return Err(self.record_error(rejected(message)));
        }

        let delay = Duration::from_millis(self.config.redirect_delay_ms);
        self.redirect = Some(PendingRedirect {
            path: self.config.redirect_path.clone(),
            due_at: Instant::now() + delay,
        });
        if let Some(session) = self.session.as_mut() {
            session.step = VerificationStep::Verified;
            session.verified = true;
        }
        self.last_error = None;
        self.status_message = response.message;
        tracing::info!(
            target: "verification",
            phone = %masked,
            redirect_delay_ms = self.config.redirect_delay_ms,
            "verification_succeeded"
        );
        Ok(())
    }

    /// Returns to phone entry, keeping the collected number for editing.
    pub fn back(&mut self) -> Result<(), VerificationError> {
        match self.session.as_mut() {
            Some(session) if session.step == VerificationStep::CollectCode => {
                session.step = VerificationStep::CollectPhone;
                self.entered_code = None;
                self.last_error = None;
                Ok(())
            }
            _ => Err(invalid_transition(format!(
                "cannot go back from step {:?}",
                self.step()
            ))),
        }
    }

    /// Path the caller should navigate to once verified.
    pub fn redirect_target(&self) -> Option<&str> {
        self.redirect.as_ref().map(|redirect| redirect.path.as_str())
    }

    /// Resolves with the redirect path once its delay elapses, or `None` if
    /// there is no redirect or the flow was torn down first.
    pub async fn wait_for_redirect(&self) -> Option<String> {
        let redirect = self.redirect.clone()?;
        tokio::select! {
            _ = self.shutdown.cancelled() => None,
            _ = sleep_until(redirect.due_at) => Some(redirect.path),
        }
    }

    /// Token cancelled by `teardown` or drop; pending redirects observe it.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn teardown(&mut self) {
        self.shutdown.cancel();
        self.session = None;
        self.entered_code = None;
        self.redirect = None;
    }

    async fn request_code(
        &mut self,
        phone_number: String,
        channel: VerificationChannel,
    ) -> Result<(), VerificationError> {
        let masked = mask_phone_number(&phone_number);
        let request = match start_request(&phone_number, channel) {
            Ok(request) => request,
            Err(err) => return Err(self.record_error(err)),
        };

        let response = match self.api.start(request).await {
            Ok(response) => response,
            Err(err) => return Err(self.record_error(err.into())),
        };
        if !response.success {
            let message = response
                .message
                .unwrap_or_else(|| "failed to send verification code".to_string());
            return Err(self.record_error(rejected(message)));
        }

        tracing::info!(
            target: "verification",
            phone = %masked,
            channel = channel.as_str(),
            "verification_code_requested"
        );
        let step = self.step();
        self.session = Some(VerificationSession {
            phone_number,
            channel,
            step,
            verified: false,
        });
        self.last_error = None;
        self.status_message = response.message;
        Ok(())
    }

    fn record_error(&mut self, err: VerificationError) -> VerificationError {
        tracing::debug!(
            target: "verification",
            kind = ?err.kind,
            step = ?self.step(),
            error = %err,
            "verification_action_failed"
        );
        self.last_error = Some(err.clone());
        err
    }
}

impl Drop for VerificationFlow {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// Keeps only the last four digits for logs.
pub fn mask_phone_number(phone_number: &str) -> String {
    let digits: Vec<char> = phone_number.chars().filter(char::is_ascii_digit).collect();
    let visible: String = digits[digits.len().saturating_sub(4)..].iter().collect();
    format!("***{}", visible)
}
