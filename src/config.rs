use std::{
    fs,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::JSONSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{api::types::ApiConfig, query::QueryConfig, verification::VerificationConfig};

/// Schema looked up beside the config file when `$schema` is absent.
pub const DEFAULT_SCHEMA_FILE: &str = "portal.schema.json";

/// Whole portal configuration. Every section may be omitted.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub query: QueryConfig,
    pub verification: VerificationConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum LoggingRotation {
    Daily,
    Hourly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub dir: PathBuf,
    pub filter: String,
    pub rotation: LoggingRotation,
    pub retention_days: usize,
    /// Mirrors WARN and above to stderr next to the JSON file output.
    pub stderr_warn_enabled: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("./logs/portal"),
            filter: "info".to_string(),
            rotation: LoggingRotation::Daily,
            retention_days: 14,
            stderr_warn_enabled: true,
        }
    }
}

impl Config {
    /// Reads a JSON5 file, checks it against the schema, then applies defaults.
    ///
    /// A relative `logging.dir` is taken relative to the config file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("cannot read config {}", path.display()))?;
        let document: Value = json5::from_str(&raw)
            .with_context(|| format!("config {} is not valid json5", path.display()))?;

        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let schema = locate_schema(base_dir, &document)?;
        check_schema(&document, &schema)?;

        let mut config: Config =
            serde_json::from_value(document).context("config does not match portal settings")?;
        if config.logging.dir.is_relative() {
            config.logging.dir = base_dir.join(&config.logging.dir);
        }
        Ok(config)
    }
}

fn locate_schema(base_dir: &Path, document: &Value) -> Result<PathBuf> {
    match document.get("$schema").and_then(Value::as_str) {
        Some(declared) => {
            let declared = Path::new(declared);
            Ok(if declared.is_absolute() {
                declared.to_path_buf()
            } else {
                base_dir.join(declared)
            })
        }
        None => {
            let beside = base_dir.join(DEFAULT_SCHEMA_FILE);
            if !beside.exists() {
                bail!(
                    "no $schema in config and no {} in {}",
                    DEFAULT_SCHEMA_FILE,
                    base_dir.display()
                );
            }
            Ok(beside)
        }
    }
}

fn check_schema(document: &Value, schema_path: &Path) -> Result<()> {
    let schema_text = fs::read_to_string(schema_path)
        .with_context(|| format!("cannot read schema {}", schema_path.display()))?;
    let schema: Value = serde_json::from_str(&schema_text)
        .with_context(|| format!("schema {} is not valid json", schema_path.display()))?;
    let validator =
        JSONSchema::compile(&schema).map_err(|err| anyhow!("schema does not compile: {err}"))?;

    if let Err(errors) = validator.validate(document) {
        let problems = errors
            .map(|error| format!("{} at '{}'", error, error.instance_path))
            .collect::<Vec<_>>();
        bail!("config rejected by schema: {}", problems.join("; "));
    }
    Ok(())
}
