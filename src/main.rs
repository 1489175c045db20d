use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::{Map, Value};
use tokio::signal::unix::{SignalKind, signal};

use portal_core::{
    api::ApiClient,
    cli::{Command, args_from_env},
    config::Config,
    logging::init_tracing,
    query::{QueryClient, QueryKey},
    verification::{HttpVerificationApi, VerificationApi, VerificationFlow},
};

#[tokio::main]
async fn main() -> Result<()> {
    let args = args_from_env()?;
    let config = Config::load(&args.config_path)
        .with_context(|| format!("failed to load config from {}", args.config_path.display()))?;
    let logging = init_tracing(&config.logging).context("failed to initialize logging")?;
    tracing::info!(target: "portal", run_id = logging.run_id(), "portal_core_started");

    let api = ApiClient::new(config.api.clone()).context("failed to construct api client")?;

    match args.command {
        Command::Get { path, filters } => {
            let queries = QueryClient::new(config.query.clone());
            let mut key = QueryKey::new(path);
            if !filters.is_empty() {
                let filters: Map<String, Value> = filters
                    .into_iter()
                    .map(|(name, value)| (name, Value::String(value)))
                    .collect();
                key = key.push(Value::Object(filters));
            }
            let fetcher = api.resource_fetcher(&key);
            let data = queries
                .fetch(key.clone(), fetcher, queries.default_options())
                .await
                .with_context(|| format!("failed to fetch {key}"))?;
            println!("{}", serde_json::to_string_pretty(data.as_ref())?);
        }
        Command::VerifyStart { phone, channel } => {
            let verification_api: Arc<dyn VerificationApi> =
                Arc::new(HttpVerificationApi::new(api));
            let channel = channel.unwrap_or(config.verification.default_channel);
            let mut flow = VerificationFlow::new(verification_api, config.verification.clone());
            flow.start(&phone, channel).await?;
            let session = flow
                .session()
                .context("verification session missing after start")?;
            println!(
                "code sent to {} via {}{}",
                session.phone_number,
                channel.as_str(),
                flow.status_message()
                    .map(|message| format!(": {message}"))
                    .unwrap_or_default()
            );
        }
        Command::VerifyCheck { phone, code } => {
            let verification_api: Arc<dyn VerificationApi> =
                Arc::new(HttpVerificationApi::new(api));
            let mut flow = VerificationFlow::resume(
                verification_api,
                config.verification.clone(),
                &phone,
                config.verification.default_channel,
            )?;
            flow.verify(&code).await?;
            println!("phone number verified");

            let mut sigint =
                signal(SignalKind::interrupt()).context("unable to listen for SIGINT (Ctrl+C)")?;
            let mut sigterm =
                signal(SignalKind::terminate()).context("unable to listen for SIGTERM")?;
            let shutdown = flow.shutdown_token();
            let redirect = tokio::select! {
                target = flow.wait_for_redirect() => target,
                _ = sigint.recv() => { shutdown.cancel(); None }
                _ = sigterm.recv() => { shutdown.cancel(); None }
            };
            match redirect {
                Some(target) => println!("continue at {target}"),
                None => tracing::info!(target: "portal", "redirect_cancelled"),
            }
        }
    }

    Ok(())
}
