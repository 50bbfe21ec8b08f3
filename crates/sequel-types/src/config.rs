//! Configuration types for the scheduler and proxy links.

use serde::{Deserialize, Serialize};

use crate::{EventName, constants};

/// What the scheduler does with a rejection nobody observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnhandledRejectionPolicy {
    /// Drop it silently.
    Ignore,
    /// Log a `tracing` warning and record it.
    Warn,
    /// Record it without logging.
    Record,
}

/// Scheduler tuning for the current thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Upper bound on tasks executed by one `run_until_idle` call.
    pub max_ticks_per_run: usize,
    /// Handling of rejections without any settlement-linked observer.
    pub unhandled_rejections: UnhandledRejectionPolicy,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_ticks_per_run: constants::DEFAULT_MAX_TICKS_PER_RUN,
            unhandled_rejections: UnhandledRejectionPolicy::Warn,
        }
    }
}

impl SchedulerConfig {
    /// Parse a JSON document, filling omitted fields with defaults.
    pub fn from_json(json: &str) -> crate::Result<Self> {
        let cfg: Self = serde_json::from_str(json)?;
        if cfg.max_ticks_per_run == 0 {
            return Err(crate::SequelError::Configuration(
                "max_ticks_per_run must be > 0".to_string(),
            ));
        }
        Ok(cfg)
    }
}

/// Which events a proxy link forwards.
///
/// The default forwards everything the source emits.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProxyOptions {
    /// Events to forward; empty forwards every event.
    pub events: Vec<EventName>,
    /// Events never forwarded, even when listed in `events`.
    pub skip_events: Vec<EventName>,
}

impl ProxyOptions {
    /// Forward only `events`.
    #[must_use]
    pub fn only(events: impl IntoIterator<Item = EventName>) -> Self {
        Self {
            events: events.into_iter().collect(),
            skip_events: Vec::new(),
        }
    }

    /// Forward every event except `skip`.
    #[must_use]
    pub fn skipping(skip: impl IntoIterator<Item = EventName>) -> Self {
        Self {
            skip_events: skip.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Whether a link built from these options forwards `event`.
    #[must_use]
    pub fn forwards(&self, event: &EventName) -> bool {
        (self.events.is_empty() || self.events.contains(event)) && !self.skip_events.contains(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_config_defaults() {
        let cfg = SchedulerConfig::default();
        assert_eq!(cfg.max_ticks_per_run, 1_000_000);
        assert_eq!(cfg.unhandled_rejections, UnhandledRejectionPolicy::Warn);
    }

    #[test]
    fn scheduler_config_partial_json() {
        let cfg = SchedulerConfig::from_json(r#"{"unhandled_rejections": "record"}"#).unwrap();
        assert_eq!(cfg.unhandled_rejections, UnhandledRejectionPolicy::Record);
        assert_eq!(cfg.max_ticks_per_run, constants::DEFAULT_MAX_TICKS_PER_RUN);
    }

    #[test]
    fn scheduler_config_rejects_zero_budget() {
        let err = SchedulerConfig::from_json(r#"{"max_ticks_per_run": 0}"#).unwrap_err();
        assert!(matches!(err, crate::SequelError::Configuration(_)));
    }

    #[test]
    fn proxy_defaults_forward_every_event() {
        let opts = ProxyOptions::default();
        assert!(opts.forwards(&EventName::Success));
        assert!(opts.forwards(&EventName::Error));
        assert!(opts.forwards(&EventName::Sql));
        assert!(opts.forwards(&EventName::from("progress")));
    }

    #[test]
    fn proxy_only_restricts_events() {
        let opts = ProxyOptions::only([EventName::from("progress")]);
        assert!(opts.forwards(&EventName::from("progress")));
        assert!(!opts.forwards(&EventName::Success));
    }

    #[test]
    fn proxy_skip_events() {
        let opts = ProxyOptions::skipping([EventName::Sql]);
        assert!(opts.forwards(&EventName::Success));
        assert!(!opts.forwards(&EventName::Sql));
    }

    #[test]
    fn proxy_options_serde_roundtrip() {
        let opts = ProxyOptions::skipping([EventName::Error]);
        let json = serde_json::to_string(&opts).unwrap();
        let back: ProxyOptions = serde_json::from_str(&json).unwrap();
        assert_eq!(opts, back);
    }
}
