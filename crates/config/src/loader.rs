use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::defaults::default_config;
use crate::errors::ConfigError;
use crate::model::{ConfigSource, ResilienceConfig};

const ENV_PREFIX: &str = "RESILIENCE__";
const ENV_JSON: &str = "RESILIENCE_OVERRIDE_JSON";

#[derive(Debug, Default)]
pub struct LoadOptions {
    pub paths: Vec<PathBuf>,
    pub include_env: bool,
}

impl LoadOptions {
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            paths: vec![path.into()],
            include_env: true,
        }
    }
}

pub fn load_config(path: Option<&Path>) -> Result<ResilienceConfig, ConfigError> {
    let mut options = LoadOptions::default();
    if let Some(p) = path {
        options.paths.push(p.to_path_buf());
    }
    options.include_env = true;
    load_config_with_options(&options)
}

pub fn load_config_with_options(options: &LoadOptions) -> Result<ResilienceConfig, ConfigError> {
    let mut config = default_config();

    for path in &options.paths {
        if path.exists() {
            let overlays = overlays_from_file(path)?;
            apply_overlays(&mut config, overlays)?;
        } else {
            debug!("config file {} not found, skipping", path.display());
        }
    }

    if options.include_env {
        let env_overlays = overlays_from_env()?;
        apply_overlays(&mut config, env_overlays)?;
    }

    config.validate()?;
    Ok(config)
}

pub(crate) struct ConfigOverlay {
    pub path: String,
    pub value: Value,
    pub source: ConfigSource,
}

pub(crate) fn apply_overlays(
    config: &mut ResilienceConfig,
    overlays: Vec<ConfigOverlay>,
) -> Result<(), ConfigError> {
    for overlay in overlays {
        apply_override(config, &overlay.path, &overlay.value, overlay.source)?;
    }
    Ok(())
}

/// Set one dotted-path leaf, re-checking its type through serde
pub(crate) fn apply_override(
    config: &mut ResilienceConfig,
    path: &str,
    value: &Value,
    source: ConfigSource,
) -> Result<(), ConfigError> {
    let mut tree =
        serde_json::to_value(&*config).map_err(|err| ConfigError::Invalid(format!("{}", err)))?;
    let slot = path
        .split('.')
        .try_fold(&mut tree, |node, segment| node.get_mut(segment))
        .ok_or_else(|| ConfigError::UnsupportedPath(path.to_string()))?;
    if slot.is_object() {
        return Err(ConfigError::UnsupportedPath(path.to_string()));
    }
    *slot = value.clone();

    let mut updated: ResilienceConfig = serde_json::from_value(tree)
        .map_err(|err| ConfigError::invalid_value(path, err.to_string()))?;
    updated.provenance = config.provenance.clone();
    updated.provenance.insert(path.to_string(), source);
    *config = updated;
    debug!("config override {} = {} ({:?})", path, value, source);
    Ok(())
}

fn overlays_from_file(path: &Path) -> Result<Vec<ConfigOverlay>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|err| ConfigError::Io(format!("{}", err)))?;
    let yaml_value: serde_yaml::Value =
        serde_yaml::from_str(&content).map_err(|err| ConfigError::Invalid(format!("{}", err)))?;
    let json_value =
        serde_json::to_value(yaml_value).map_err(|err| ConfigError::Invalid(format!("{}", err)))?;
    Ok(flatten_value(json_value, None, ConfigSource::File))
}

fn overlays_from_env() -> Result<Vec<ConfigOverlay>, ConfigError> {
    let mut overlays = Vec::new();
    for (key, raw) in env::vars() {
        if let Some(stripped) = key.strip_prefix(ENV_PREFIX) {
            let path = stripped
                .split("__")
                .filter(|segment| !segment.is_empty())
                .map(|segment| segment.to_ascii_lowercase())
                .collect::<Vec<_>>()
                .join(".");
            if path.is_empty() {
                continue;
            }
            let value = parse_env_value(&raw);
            overlays.push(ConfigOverlay {
                path,
                value,
                source: ConfigSource::Env,
            });
        }
    }

    if let Ok(raw_json) = env::var(ENV_JSON) {
        if !raw_json.trim().is_empty() {
            let json_value: Value = serde_json::from_str(&raw_json)
                .map_err(|err| ConfigError::Invalid(format!("{}", err)))?;
            overlays.extend(flatten_value(json_value, None, ConfigSource::Env));
        }
    }

    Ok(overlays)
}

pub(crate) fn parse_env_value(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::Null;
    }
    if let Ok(parsed) = serde_json::from_str::<Value>(raw) {
        return parsed;
    }
    if let Ok(boolean) = raw.parse::<bool>() {
        return Value::Bool(boolean);
    }
    if let Ok(int_val) = raw.parse::<i64>() {
        return Value::Number(int_val.into());
    }
    Value::String(raw.to_string())
}

fn flatten_value(value: Value, prefix: Option<String>, source: ConfigSource) -> Vec<ConfigOverlay> {
    match value {
        Value::Object(map) => {
            let mut result = Vec::new();
            for (key, value) in map {
                let key_segment = key.trim().to_ascii_lowercase();
                let next_prefix = match &prefix {
                    Some(prefix) if !prefix.is_empty() => format!("{}.{}", prefix, key_segment),
                    _ => key_segment,
                };
                result.extend(flatten_value(value, Some(next_prefix), source));
            }
            result
        }
        other => match prefix {
            Some(prefix) => vec![ConfigOverlay {
                path: prefix,
                value: other,
                source,
            }],
            None => Vec::new(),
        },
    }
}
