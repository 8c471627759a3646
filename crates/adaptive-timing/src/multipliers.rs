//! Pure timeout multipliers.
//!
//! Each factor is computed independently and clamped to its own range so that one extreme signal
//! cannot dominate the prediction.

use std::time::Duration;

use resilience_core_types::ConnectionClass;

use crate::history::HistorySummary;
use crate::types::{BrowserFamily, DeviceClass, NetworkConditions, PageComplexity, TimingContext};

pub const NETWORK_RANGE: (f64, f64) = (0.5, 5.0);
pub const COMPLEXITY_RANGE: (f64, f64) = (0.8, 3.0);
pub const HISTORY_RANGE: (f64, f64) = (0.5, 2.0);
pub const CONTEXT_RANGE: (f64, f64) = (0.8, 1.5);

pub fn connection_factor(connection: ConnectionClass) -> f64 {
    match connection {
        ConnectionClass::Slow2g => 3.0,
        ConnectionClass::TwoG => 2.5,
        ConnectionClass::ThreeG => 1.5,
        ConnectionClass::FourG | ConnectionClass::Wifi => 1.0,
        ConnectionClass::Ethernet => 0.9,
        ConnectionClass::Unknown => 1.2,
    }
}

pub fn network_multiplier(network: &NetworkConditions) -> f64 {
    let mut factor = connection_factor(network.connection);
    factor *= if network.latency_ms > 1_000.0 {
        2.0
    } else if network.latency_ms > 500.0 {
        1.5
    } else if network.latency_ms > 200.0 {
        1.2
    } else {
        1.0
    };
    if !network.online {
        factor *= 5.0;
    }
    factor.clamp(NETWORK_RANGE.0, NETWORK_RANGE.1)
}

pub fn complexity_multiplier(page: &PageComplexity) -> f64 {
    let mut factor: f64 = 1.0;
    factor *= if page.dom_size > 5_000 {
        1.5
    } else if page.dom_size > 2_000 {
        1.3
    } else if page.dom_size > 1_000 {
        1.1
    } else {
        1.0
    };
    factor *= if page.script_count > 50 {
        1.3
    } else if page.script_count > 20 {
        1.15
    } else {
        1.0
    };
    if page.dynamic {
        factor += 0.2;
    }
    factor += (0.1 * page.active_ajax as f64).min(0.5);
    factor.clamp(COMPLEXITY_RANGE.0, COMPLEXITY_RANGE.1)
}

/// Neutral (1.0) until `min_samples` outcomes are known for the kind.
pub fn history_multiplier(
    summary: Option<&HistorySummary>,
    baseline: Duration,
    min_samples: usize,
) -> f64 {
    let Some(summary) = summary.filter(|s| s.samples >= min_samples) else {
        return 1.0;
    };

    let mut factor: f64 = if summary.success_rate < 0.5 {
        1.5
    } else if summary.success_rate < 0.8 {
        1.2
    } else if summary.success_rate > 0.95 {
        0.9
    } else {
        1.0
    };

    let baseline_ms = baseline.as_secs_f64() * 1_000.0;
    if baseline_ms > 0.0 {
        let ratio = summary.mean_duration_ms / baseline_ms;
        if ratio > 1.5 {
            factor *= 1.3;
        } else if ratio < 0.5 {
            factor *= 0.8;
        }
    }
    factor.clamp(HISTORY_RANGE.0, HISTORY_RANGE.1)
}

pub fn context_multiplier(context: &TimingContext) -> f64 {
    let mut factor: f64 = match context.hour {
        Some(hour) if hour < 6 => 0.9,
        Some(hour) if (9..18).contains(&hour) => 1.1,
        _ => 1.0,
    };
    factor *= match context.browser {
        BrowserFamily::Chromium => 1.0,
        BrowserFamily::Firefox => 1.05,
        BrowserFamily::Safari => 1.1,
    };
    factor *= match context.device {
        DeviceClass::Desktop => 1.0,
        DeviceClass::Tablet => 1.1,
        DeviceClass::Mobile => 1.2,
    };
    factor.clamp(CONTEXT_RANGE.0, CONTEXT_RANGE.1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn network_table_and_latency_tiers() {
        let mut net = NetworkConditions {
            latency_ms: 50.0,
            connection: ConnectionClass::ThreeG,
            online: true,
        };
        assert!(close(network_multiplier(&net), 1.5));
        net.latency_ms = 600.0;
        assert!(close(network_multiplier(&net), 2.25));
        net.connection = ConnectionClass::Ethernet;
        net.latency_ms = 10.0;
        assert!(close(network_multiplier(&net), 0.9));
    }

    #[test]
    fn offline_is_clamped() {
        let net = NetworkConditions {
            latency_ms: 2_000.0,
            connection: ConnectionClass::Slow2g,
            online: false,
        };
        assert_eq!(network_multiplier(&net), 5.0);
    }

    #[test]
    fn complexity_steps_and_additions() {
        let page = PageComplexity {
            dom_size: 3_000,
            script_count: 30,
            dynamic: true,
            active_ajax: 9,
            loading: false,
        };
        // 1.3 * 1.15 + 0.2 + 0.5
        assert!(close(complexity_multiplier(&page), 1.3 * 1.15 + 0.7));
        assert_eq!(complexity_multiplier(&PageComplexity::default()), 1.0);
    }

    #[test]
    fn history_needs_samples() {
        let summary = HistorySummary {
            samples: 2,
            success_rate: 0.1,
            mean_duration_ms: 100.0,
        };
        let baseline = Duration::from_secs(5);
        assert_eq!(history_multiplier(Some(&summary), baseline, 3), 1.0);

        let summary = HistorySummary {
            samples: 10,
            success_rate: 0.4,
            mean_duration_ms: 9_000.0,
        };
        assert!(close(history_multiplier(Some(&summary), baseline, 3), 1.95));

        let summary = HistorySummary {
            samples: 10,
            success_rate: 1.0,
            mean_duration_ms: 1_000.0,
        };
        assert!(close(history_multiplier(Some(&summary), baseline, 3), 0.72));
    }

    #[test]
    fn context_nudges() {
        let ctx = TimingContext {
            browser: BrowserFamily::Safari,
            device: DeviceClass::Mobile,
            hour: Some(10),
        };
        assert!(close(context_multiplier(&ctx), 1.1 * 1.1 * 1.2));
        assert_eq!(context_multiplier(&TimingContext::default()), 1.0);
        let night = TimingContext {
            hour: Some(3),
            ..Default::default()
        };
        assert!(close(context_multiplier(&night), 0.9));
    }
}
