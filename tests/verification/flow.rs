use portal_core::{
    api::endpoints::VerificationChannel,
    verification::{VerificationConfig, VerificationErrorKind, VerificationFlow, VerificationStep},
};

use crate::{MockVerificationApi, code_result, flow_with, network_down, sent};

#[tokio::test]
async fn given_formatted_us_number_when_starting_then_normalized_number_is_sent_and_code_is_collected() {
    let api = MockVerificationApi::new();
    api.reply_start(sent());
    let mut flow = flow_with(&api);

    flow.start("(555) 123-4567", VerificationChannel::Sms)
        .await
        .expect("start should succeed");

    assert_eq!(flow.step(), VerificationStep::CollectCode);
    let starts = api.starts.lock().expect("lock").clone();
    assert_eq!(starts.len(), 1);
    assert_eq!(starts[0].phone_number, "+15551234567");
    assert_eq!(starts[0].channel, VerificationChannel::Sms);
    assert_eq!(flow.status_message(), Some("Verification code sent"));
    let session = flow.session().expect("session exists");
    assert!(!session.verified);
}

#[tokio::test]
async fn given_too_short_number_when_starting_then_validation_fails_without_network_call() {
    let api = MockVerificationApi::new();
    let mut flow = flow_with(&api);

    let err = flow
        .start("123", VerificationChannel::Sms)
        .await
        .expect_err("short number must be rejected");

    assert_eq!(err.kind, VerificationErrorKind::Validation);
    assert!(err.is_user_correctable());
    assert_eq!(flow.step(), VerificationStep::CollectPhone);
    assert_eq!(api.start_count(), 0);
    assert_eq!(flow.last_error().map(|e| e.kind), Some(VerificationErrorKind::Validation));
}

#[tokio::test]
async fn given_server_refuses_to_send_when_starting_then_flow_stays_on_phone_step() {
    let api = MockVerificationApi::new();
    api.reply_start(Ok(portal_core::api::endpoints::StartVerificationResponse {
        success: false,
        message: None,
    }));
    let mut flow = flow_with(&api);

    let err = flow
        .start("5551234567", VerificationChannel::Sms)
        .await
        .expect_err("refusal must surface");

    assert_eq!(err.kind, VerificationErrorKind::Rejected);
    assert_eq!(err.message, "failed to send verification code");
    assert_eq!(flow.step(), VerificationStep::CollectPhone);
}

#[tokio::test]
async fn given_network_failure_when_starting_then_network_error_is_recorded() {
    let api = MockVerificationApi::new();
    api.reply_start(Err(network_down()));
    let mut flow = flow_with(&api);

    let err = flow
        .start("+442079460958", VerificationChannel::Call)
        .await
        .expect_err("transport failure must surface");

    assert_eq!(err.kind, VerificationErrorKind::Network);
    assert!(!err.is_user_correctable());
    assert!(err.source.is_some());
    assert_eq!(flow.step(), VerificationStep::CollectPhone);
    assert_eq!(api.start_count(), 1);
}

#[tokio::test]
async fn given_wrong_code_when_verifying_then_rejected_and_code_is_kept_for_editing() {
    let api = MockVerificationApi::new();
    api.reply_start(sent());
    api.reply_check(code_result(true, false));
    let mut flow = flow_with(&api);
    flow.start("5551234567", VerificationChannel::Sms)
        .await
        .expect("start should succeed");

    let err = flow.verify("0000").await.expect_err("wrong code");

    assert_eq!(err.kind, VerificationErrorKind::Rejected);
    assert_eq!(err.message, "invalid verification code");
    assert_eq!(flow.step(), VerificationStep::CollectCode);
    assert_eq!(flow.entered_code(), Some("0000"));
    assert!(flow.redirect_target().is_none());

    let checks = api.checks.lock().expect("lock").clone();
    assert_eq!(checks[0].phone_number, "+15551234567");
    assert_eq!(checks[0].code, "0000");
}

#[tokio::test]
async fn given_short_code_when_verifying_then_validation_fails_without_network_call() {
    let api = MockVerificationApi::new();
    api.reply_start(sent());
    let mut flow = flow_with(&api);
    flow.start("5551234567", VerificationChannel::Sms)
        .await
        .expect("start should succeed");

    let err = flow.verify("12").await.expect_err("code too short");

    assert_eq!(err.kind, VerificationErrorKind::Validation);
    assert_eq!(api.check_count(), 0);
    assert_eq!(flow.step(), VerificationStep::CollectCode);
}

#[tokio::test]
async fn given_resend_then_same_number_and_channel_are_reused_and_entered_code_cleared() {
    let api = MockVerificationApi::new();
    api.reply_start(sent());
    api.reply_check(code_result(true, false));
    api.reply_start(sent());
    let mut flow = flow_with(&api);
    flow.start("555.123.4567", VerificationChannel::Call)
        .await
        .expect("start should succeed");
    let _ = flow.verify("9999").await;

    flow.resend().await.expect("resend should succeed");

    let starts = api.starts.lock().expect("lock").clone();
    assert_eq!(starts.len(), 2);
    assert_eq!(starts[1], starts[0]);
    assert_eq!(starts[1].channel, VerificationChannel::Call);
    assert_eq!(flow.step(), VerificationStep::CollectCode);
    assert_eq!(flow.entered_code(), None);
    assert!(flow.last_error().is_none());
}

#[tokio::test]
async fn given_code_step_when_changing_channel_then_transition_is_refused() {
    let api = MockVerificationApi::new();
    api.reply_start(sent());
    let mut flow = flow_with(&api);
    flow.set_channel(VerificationChannel::Call)
        .expect("channel can change before start");
    assert_eq!(flow.channel(), VerificationChannel::Call);

    flow.start("5551234567", VerificationChannel::Sms)
        .await
        .expect("start should succeed");
    let err = flow
        .set_channel(VerificationChannel::Call)
        .expect_err("channel is locked after start");

    assert_eq!(err.kind, VerificationErrorKind::InvalidTransition);
    assert_eq!(flow.channel(), VerificationChannel::Sms);
}

#[tokio::test]
async fn given_back_from_code_step_when_verifying_then_transition_is_refused() {
    let api = MockVerificationApi::new();
    api.reply_start(sent());
    let mut flow = flow_with(&api);
    flow.start("5551234567", VerificationChannel::Sms)
        .await
        .expect("start should succeed");

    flow.back().expect("back from code step");
    assert_eq!(flow.step(), VerificationStep::CollectPhone);
    assert_eq!(
        flow.session().map(|session| session.phone_number.as_str()),
        Some("+15551234567")
    );

    let err = flow.verify("1234").await.expect_err("no code step");
    assert_eq!(err.kind, VerificationErrorKind::InvalidTransition);
    assert_eq!(api.check_count(), 0);
    assert!(flow.back().is_err());
}

#[tokio::test]
async fn given_fresh_flow_when_resending_or_verifying_then_transition_is_refused() {
    let api = MockVerificationApi::new();
    let mut flow = flow_with(&api);

    let resend = flow.resend().await.expect_err("nothing to resend");
    let verify = flow.verify("1234").await.expect_err("nothing to verify");

    assert_eq!(resend.kind, VerificationErrorKind::InvalidTransition);
    assert_eq!(verify.kind, VerificationErrorKind::InvalidTransition);
}

#[tokio::test]
async fn given_resumed_flow_then_code_can_be_checked_immediately() {
    let api = MockVerificationApi::new();
    api.reply_check(code_result(true, true));

    let mut flow = VerificationFlow::resume(
        api.clone(),
        VerificationConfig::default(),
        "+1 555 123 4567",
        VerificationChannel::Sms,
    )
    .expect("resume should accept a valid number");
    assert_eq!(flow.step(), VerificationStep::CollectCode);

    flow.verify(" 4821 ").await.expect("verify should succeed");

    assert_eq!(flow.step(), VerificationStep::Verified);
    assert!(flow.session().is_some_and(|session| session.verified));
    assert_eq!(api.checks.lock().expect("lock")[0].code, "4821");
    assert_eq!(api.start_count(), 0);
}
