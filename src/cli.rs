use std::{collections::BTreeMap, path::PathBuf};

use anyhow::{Result, anyhow};

use crate::api::endpoints::VerificationChannel;

const USAGE: &str = "usage: portal-core [--config <path>] <get <path> [key=value ...] | verify-start <phone> [sms|call] | verify-check <phone> <code>>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Get {
        path: String,
        filters: BTreeMap<String, String>,
    },
    VerifyStart {
        phone: String,
        channel: Option<VerificationChannel>,
    },
    VerifyCheck {
        phone: String,
        code: String,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliArgs {
    pub config_path: PathBuf,
    pub command: Command,
}

pub fn args_from_env() -> Result<CliArgs> {
    parse_args(std::env::args().skip(1))
}

pub fn parse_args(args: impl IntoIterator<Item = String>) -> Result<CliArgs> {
    let mut args = args.into_iter();
    let mut config_path = None;
    let mut positional = Vec::new();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| anyhow!("missing value for --config"))?;
                config_path = Some(PathBuf::from(value));
            }
            flag if flag.starts_with("--") => {
                return Err(anyhow!("unknown argument: {flag}. {USAGE}"));
            }
            _ => positional.push(arg),
        }
    }

    let mut positional = positional.into_iter();
    let command = match positional.next().as_deref() {
        Some("get") => {
            let path = positional
                .next()
                .ok_or_else(|| anyhow!("get requires an api path. {USAGE}"))?;
            let mut filters = BTreeMap::new();
            for pair in positional.by_ref() {
                let (name, value) = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("filter '{pair}' must look like key=value"))?;
                filters.insert(name.to_string(), value.to_string());
            }
            Command::Get { path, filters }
        }
        Some("verify-start") => {
            let phone = positional
                .next()
                .ok_or_else(|| anyhow!("verify-start requires a phone number. {USAGE}"))?;
            let channel = positional
                .next()
                .map(|raw| raw.parse::<VerificationChannel>().map_err(|err| anyhow!(err)))
                .transpose()?;
            Command::VerifyStart { phone, channel }
        }
        Some("verify-check") => {
            let phone = positional
                .next()
                .ok_or_else(|| anyhow!("verify-check requires a phone number. {USAGE}"))?;
            let code = positional
                .next()
                .ok_or_else(|| anyhow!("verify-check requires a code. {USAGE}"))?;
            Command::VerifyCheck { phone, code }
        }
        Some(other) => return Err(anyhow!("unknown command: {other}. {USAGE}")),
        None => return Err(anyhow!("missing command. {USAGE}")),
    };

    if let Some(extra) = positional.next() {
        return Err(anyhow!("unexpected argument: {extra}. {USAGE}"));
    }

    Ok(CliArgs {
        config_path: config_path.unwrap_or_else(|| PathBuf::from("./portal.jsonc")),
        command,
    })
}
