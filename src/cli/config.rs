use anyhow::{anyhow, Result};
use clap::Args;
use resilience_config::ResilienceConfig;
use serde_json::Value;

use super::{emit, OutputFormat};

#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Only print one section (retry, classifier, recovery, ...)
    #[arg(long)]
    pub section: Option<String>,

    /// List the recognized camelCase option keys instead
    #[arg(long)]
    pub options: bool,
}

pub fn effective(config: &ResilienceConfig, section: Option<&str>) -> Result<Value> {
    let value = serde_json::to_value(config)?;
    match section {
        None => Ok(value),
        Some(name) => value
            .get(name)
            .cloned()
            .ok_or_else(|| anyhow!("Unknown configuration section '{}'", name)),
    }
}

pub fn cmd_config(
    args: ConfigArgs,
    config: &ResilienceConfig,
    format: OutputFormat,
) -> Result<()> {
    if args.options {
        let keys = resilience_config::options::recognized_options().collect::<Vec<_>>();
        return emit(&keys, format, |keys| keys.join("\n"));
    }
    let value = effective(config, args.section.as_deref())?;
    emit(&value, format, |value| {
        serde_yaml::to_string(value).unwrap_or_else(|_| value.to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_section() {
        let config = ResilienceConfig::default();
        let retry = effective(&config, Some("retry")).unwrap();
        assert_eq!(retry["max_attempts"], 5);
        assert_eq!(retry["base_delay_ms"], 1_000);
        assert!(effective(&config, Some("nope")).is_err());
    }
}
