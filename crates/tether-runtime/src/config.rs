#![forbid(unsafe_code)]

//! Binding configuration.
//!
//! [`BinderConfig`] is handed to [`BindManager::with_config`] (or per binding
//! to [`BindManager::bind_with`]). The one knob today is what a binding does
//! with its subscription while its owner is paused or stopped.
//!
//! [`BindManager::with_config`]: crate::BindManager::with_config
//! [`BindManager::bind_with`]: crate::BindManager::bind_with

use std::env;
use std::fmt;
use std::str::FromStr;

use tether_core::Error;

/// Environment variable read by [`BinderConfig::from_env`].
pub const PAUSE_POLICY_ENV: &str = "TETHER_PAUSE_POLICY";

/// What a binding does with its subscription on `Pause`/`Stop`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PausePolicy {
    /// Keep the subscription until the owner is destroyed. Values keep flowing
    /// into the sink while the owner is in the background.
    #[default]
    Retain,
    /// Drop the subscription on `Pause`/`Stop` and subscribe again on
    /// `Start`/`Resume`.
    Release,
}

impl PausePolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Retain => "retain",
            Self::Release => "release",
        }
    }
}

impl fmt::Display for PausePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PausePolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "retain" => Ok(Self::Retain),
            "release" => Ok(Self::Release),
            other => Err(Error::msg(format!("unknown pause policy `{other}`"))),
        }
    }
}

/// Per-binding settings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BinderConfig {
    pub pause_policy: PausePolicy,
}

impl BinderConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the pause policy.
    #[must_use]
    pub fn pause_policy(mut self, policy: PausePolicy) -> Self {
        self.pause_policy = policy;
        self
    }

    /// Defaults, overridden by `TETHER_PAUSE_POLICY` when it is set.
    ///
    /// An unparseable value is logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        let raw = env::var(PAUSE_POLICY_ENV).ok();
        Self::from_env_value(raw.as_deref())
    }

    fn from_env_value(raw: Option<&str>) -> Self {
        let Some(raw) = raw.filter(|r| !r.trim().is_empty()) else {
            return Self::default();
        };
        match raw.parse() {
            Ok(policy) => Self::default().pause_policy(policy),
            Err(err) => {
                tracing::warn!(%err, var = PAUSE_POLICY_ENV, "ignoring invalid pause policy");
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn parses_policies() {
        assert_eq!("retain".parse::<PausePolicy>().unwrap(), PausePolicy::Retain);
        assert_eq!(" Release ".parse::<PausePolicy>().unwrap(), PausePolicy::Release);
        assert!("drop".parse::<PausePolicy>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        for policy in [PausePolicy::Retain, PausePolicy::Release] {
            assert_eq!(policy.to_string().parse::<PausePolicy>().unwrap(), policy);
        }
    }

    #[test]
    fn default_retains() {
        assert_eq!(BinderConfig::default().pause_policy, PausePolicy::Retain);
        assert_eq!(
            BinderConfig::new().pause_policy(PausePolicy::Release).pause_policy,
            PausePolicy::Release
        );
    }

    #[test]
    fn env_value_overrides_default() {
        assert_eq!(BinderConfig::from_env_value(None), BinderConfig::default());
        assert_eq!(BinderConfig::from_env_value(Some("  ")), BinderConfig::default());
        assert_eq!(
            BinderConfig::from_env_value(Some("release")).pause_policy,
            PausePolicy::Release
        );
    }

    #[test]
    #[traced_test]
    fn invalid_env_value_is_logged_and_ignored() {
        let config = BinderConfig::from_env_value(Some("sometimes"));
        assert_eq!(config, BinderConfig::default());
        assert!(logs_contain("ignoring invalid pause policy"));
    }
}
