use std::time::Duration;

use anyhow::{ensure, Result};
use clap::Args;
use resilience_config::ResilienceConfig;
use resilience_engine::settings;
use resilience_recovery::RetryPolicy;
use serde::Serialize;

use super::{emit, OutputFormat};

#[derive(Args, Debug, Default)]
pub struct BackoffArgs {
    /// Maximum attempts (overrides retry.max_attempts)
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Base delay in ms (overrides retry.base_delay_ms)
    #[arg(long)]
    pub base_ms: Option<u64>,

    /// Delay cap in ms (overrides retry.max_delay_ms)
    #[arg(long)]
    pub max_ms: Option<u64>,

    /// Backoff factor (overrides retry.backoff_factor)
    #[arg(long)]
    pub factor: Option<f64>,

    /// Jitter fraction in [0, 1] (overrides retry.jitter_fraction)
    #[arg(long)]
    pub jitter: Option<f64>,
}

#[derive(Debug, Serialize, PartialEq)]
pub struct ScheduleEntry {
    /// Attempt that failed before this delay
    pub after_attempt: u32,
    pub nominal_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

pub fn policy_from(args: &BackoffArgs, config: &ResilienceConfig) -> Result<RetryPolicy> {
    let mut policy = settings::retry_policy(config);
    if let Some(attempts) = args.attempts {
        policy.max_attempts = attempts;
    }
    if let Some(base) = args.base_ms {
        policy.base_delay = Duration::from_millis(base);
    }
    if let Some(max) = args.max_ms {
        policy.max_delay = Duration::from_millis(max);
    }
    if let Some(factor) = args.factor {
        policy.backoff_factor = factor;
    }
    if let Some(jitter) = args.jitter {
        ensure!((0.0..=1.0).contains(&jitter), "--jitter must be within [0, 1]");
        policy.jitter_fraction = jitter;
    }
    ensure!(policy.max_attempts >= 1, "--attempts must be at least 1");
    Ok(policy)
}

pub fn schedule(policy: &RetryPolicy) -> Vec<ScheduleEntry> {
    (1..policy.max_attempts)
        .map(|attempt| ScheduleEntry {
            after_attempt: attempt,
            nominal_ms: policy.nominal_delay(attempt).as_millis() as u64,
            min_ms: policy.jittered_delay(attempt, -1.0).as_millis() as u64,
            max_ms: policy.jittered_delay(attempt, 1.0).as_millis() as u64,
        })
        .collect()
}

pub fn cmd_backoff(
    args: BackoffArgs,
    config: &ResilienceConfig,
    format: OutputFormat,
) -> Result<()> {
    let policy = policy_from(&args, config)?;
    let entries = schedule(&policy);
    emit(&entries, format, |entries| {
        if entries.is_empty() {
            return "no retries (max attempts is 1)".to_string();
        }
        entries
            .iter()
            .map(|e| {
                format!(
                    "after attempt {:>2}: {:>6}ms  (jittered {}..{}ms)",
                    e.after_attempt, e.nominal_ms, e.min_ms, e.max_ms
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    })
}
