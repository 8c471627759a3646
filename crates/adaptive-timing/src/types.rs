use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use resilience_core_types::{ConnectionClass, PageState};
use serde::{Deserialize, Serialize};

/// Kind of action a timeout is being predicted for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Click,
    Type,
    Select,
    Hover,
    Scroll,
    Submit,
    Navigate,
    Upload,
    /// Element lookup by the locator.
    Query,
    Wait,
}

impl ActionKind {
    /// Timeout before any adjustment.
    pub fn baseline(&self) -> Duration {
        Duration::from_millis(match self {
            ActionKind::Click | ActionKind::Type | ActionKind::Select | ActionKind::Query => 5_000,
            ActionKind::Hover | ActionKind::Scroll => 3_000,
            ActionKind::Submit | ActionKind::Wait => 10_000,
            ActionKind::Navigate | ActionKind::Upload => 30_000,
        })
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Click => "click",
            ActionKind::Type => "type",
            ActionKind::Select => "select",
            ActionKind::Hover => "hover",
            ActionKind::Scroll => "scroll",
            ActionKind::Submit => "submit",
            ActionKind::Navigate => "navigate",
            ActionKind::Upload => "upload",
            ActionKind::Query => "query",
            ActionKind::Wait => "wait",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "click" => ActionKind::Click,
            "type" | "fill" => ActionKind::Type,
            "select" => ActionKind::Select,
            "hover" => ActionKind::Hover,
            "scroll" => ActionKind::Scroll,
            "submit" => ActionKind::Submit,
            "navigate" | "goto" => ActionKind::Navigate,
            "upload" => ActionKind::Upload,
            "query" | "locate" => ActionKind::Query,
            "wait" => ActionKind::Wait,
            other => return Err(format!("unknown action kind '{other}'")),
        })
    }
}

/// What to wait for before (or while) performing an action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaitStrategy {
    ElementVisible,
    ElementInteractable,
    NetworkIdle,
    /// `DOMContentLoaded` fired; scripts and subresources may still be loading
    DomContentLoaded,
    DomStable,
    AjaxComplete,
    /// Full `load` of the new document
    NavigationComplete,
    FixedDelay,
}

/// Primary wait strategy plus at most three ordered fallbacks.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WaitPlan {
    pub primary: WaitStrategy,
    pub fallbacks: Vec<WaitStrategy>,
}

impl WaitPlan {
    pub const MAX_FALLBACKS: usize = 3;

    pub fn new(primary: WaitStrategy, fallbacks: impl IntoIterator<Item = WaitStrategy>) -> Self {
        let mut unique = Vec::new();
        for strategy in fallbacks {
            if strategy != primary && !unique.contains(&strategy) {
                unique.push(strategy);
            }
        }
        unique.truncate(Self::MAX_FALLBACKS);
        Self {
            primary,
            fallbacks: unique,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = WaitStrategy> + '_ {
        std::iter::once(self.primary).chain(self.fallbacks.iter().copied())
    }
}

/// Measured network conditions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NetworkConditions {
    pub latency_ms: f64,
    pub connection: ConnectionClass,
    pub online: bool,
}

impl Default for NetworkConditions {
    fn default() -> Self {
        Self {
            latency_ms: 0.0,
            connection: ConnectionClass::Unknown,
            online: true,
        }
    }
}

/// Measured page complexity.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PageComplexity {
    pub dom_size: usize,
    pub script_count: usize,
    pub dynamic: bool,
    pub active_ajax: usize,
    /// Document still parsing (`readyState == "loading"`)
    #[serde(default)]
    pub loading: bool,
}

impl From<&PageState> for PageComplexity {
    fn from(page: &PageState) -> Self {
        Self {
            dom_size: page.dom_size,
            script_count: page.script_count,
            dynamic: page.has_dynamic_content(),
            active_ajax: page.active_ajax,
            loading: page.ready_state == "loading",
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BrowserFamily {
    #[default]
    Chromium,
    Firefox,
    Safari,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DeviceClass {
    #[default]
    Desktop,
    Tablet,
    Mobile,
}

/// Caller-supplied execution context.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TimingContext {
    pub browser: BrowserFamily,
    pub device: DeviceClass,
    /// Local hour of day (0-23) the action runs at, if known.
    pub hour: Option<u32>,
}

/// Individual adjustment factors.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Multipliers {
    pub network: f64,
    pub complexity: f64,
    pub history: f64,
    pub context: f64,
}

impl Default for Multipliers {
    fn default() -> Self {
        Self {
            network: 1.0,
            complexity: 1.0,
            history: 1.0,
            context: 1.0,
        }
    }
}

impl Multipliers {
    pub fn product(&self) -> f64 {
        self.network * self.complexity * self.history * self.context
    }
}

/// Predicted timeout and wait plan for one upcoming action.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimingDecision {
    pub kind: ActionKind,
    pub timeout: Duration,
    pub wait: WaitPlan,
    pub multipliers: Multipliers,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wait_plan_caps_and_dedups_fallbacks() {
        let plan = WaitPlan::new(
            WaitStrategy::DomStable,
            [
                WaitStrategy::DomStable,
                WaitStrategy::NetworkIdle,
                WaitStrategy::NetworkIdle,
                WaitStrategy::ElementVisible,
                WaitStrategy::FixedDelay,
                WaitStrategy::AjaxComplete,
            ],
        );
        assert_eq!(
            plan.fallbacks,
            vec![
                WaitStrategy::NetworkIdle,
                WaitStrategy::ElementVisible,
                WaitStrategy::FixedDelay
            ]
        );
        assert_eq!(plan.iter().count(), 4);
    }

    #[test]
    fn action_kind_parses() {
        assert_eq!("Click".parse::<ActionKind>().unwrap(), ActionKind::Click);
        assert_eq!("goto".parse::<ActionKind>().unwrap(), ActionKind::Navigate);
        assert!("teleport".parse::<ActionKind>().is_err());
    }
}
