use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;
use xcrit_core::OmegaPolicy;

use crate::gemini::{DEFAULT_BASE_URL, DEFAULT_MODEL, GeminiConfig};
use crate::retry::RetryPolicy;

pub const DEFAULT_STAGE_TIMEOUT_SECS: u64 = 120;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid {var}='{value}': {reason}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
    pub reason: String,
}

/// Everything the orchestrator and provider read from the environment.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub gemini: GeminiConfig,
    /// Upper bound for a single provider attempt.
    pub stage_timeout: Duration,
    pub retry: RetryPolicy,
    pub omega: OmegaPolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            gemini: GeminiConfig::default(),
            stage_timeout: Duration::from_secs(DEFAULT_STAGE_TIMEOUT_SECS),
            retry: RetryPolicy::default(),
            omega: OmegaPolicy::default(),
        }
    }
}

impl RuntimeConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from any variable source; unset and blank variables take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let api_key = get("XCRIT_GEMINI_API_KEY").or_else(|| get("GEMINI_API_KEY"));
        let gemini = GeminiConfig {
            api_key,
            model: get("XCRIT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: get("XCRIT_PROVIDER_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
        };

        let timeout_secs: u64 = parse(&get, "XCRIT_STAGE_TIMEOUT_SECS", DEFAULT_STAGE_TIMEOUT_SECS)?;
        if timeout_secs == 0 {
            return Err(ConfigError {
                var: "XCRIT_STAGE_TIMEOUT_SECS",
                value: timeout_secs.to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let retry = RetryPolicy {
            max_retries: parse(&get, "XCRIT_MAX_RETRIES", defaults.retry.max_retries)?,
            ..defaults.retry
        };

        let omega = OmegaPolicy {
            objective_tilt: unit_fraction(&get, "XCRIT_OBJECTIVE_TILT", defaults.omega.objective_tilt)?,
            penalty_scale: unit_fraction(&get, "XCRIT_PENALTY_SCALE", defaults.omega.penalty_scale)?,
            ..defaults.omega
        };

        Ok(Self {
            gemini,
            stage_timeout: Duration::from_secs(timeout_secs),
            retry,
            omega,
        })
    }
}

fn parse<T, G>(get: &G, var: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(var) {
        None => Ok(default),
        Some(value) => value.parse().map_err(|e: T::Err| ConfigError {
            var,
            reason: e.to_string(),
            value,
        }),
    }
}

fn unit_fraction<G>(get: &G, var: &'static str, default: f64) -> Result<f64, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let value: f64 = parse(get, var, default)?;
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError {
            var,
            value: value.to_string(),
            reason: "must be within [0, 1]".to_string(),
        });
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config(vars: &[(&str, &str)]) -> Result<RuntimeConfig, ConfigError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        RuntimeConfig::from_lookup(|var| map.get(var).cloned())
    }

    #[test]
    fn empty_environment_uses_defaults() {
        let cfg = config(&[]).unwrap();
        assert_eq!(cfg, RuntimeConfig::default());
        assert_eq!(cfg.gemini.model, "gemini-3-pro-preview");
        assert_eq!(cfg.stage_timeout, Duration::from_secs(120));
        assert_eq!(cfg.retry.max_retries, 2);
        assert_eq!(cfg.omega.penalty_scale, 0.3);
    }

    #[test]
    fn prefixed_key_wins_over_generic_key() {
        let cfg = config(&[
            ("GEMINI_API_KEY", "generic"),
            ("XCRIT_GEMINI_API_KEY", "specific"),
        ])
        .unwrap();
        assert_eq!(cfg.gemini.api_key.as_deref(), Some("specific"));

        let cfg = config(&[("GEMINI_API_KEY", "generic"), ("XCRIT_GEMINI_API_KEY", " ")]).unwrap();
        assert_eq!(cfg.gemini.api_key.as_deref(), Some("generic"));
    }

    #[test]
    fn overrides_are_parsed() {
        let cfg = config(&[
            ("XCRIT_MODEL", "gemini-2.5-flash"),
            ("XCRIT_STAGE_TIMEOUT_SECS", "45"),
            ("XCRIT_MAX_RETRIES", "0"),
            ("XCRIT_OBJECTIVE_TILT", "0.1"),
            ("XCRIT_PENALTY_SCALE", "0.5"),
        ])
        .unwrap();
        assert_eq!(cfg.gemini.model, "gemini-2.5-flash");
        assert_eq!(cfg.stage_timeout, Duration::from_secs(45));
        assert_eq!(cfg.retry.max_retries, 0);
        assert_eq!(cfg.omega.objective_tilt, 0.1);
        assert_eq!(cfg.omega.penalty_scale, 0.5);
        assert_eq!(cfg.omega.override_value, 0.1);
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = config(&[("XCRIT_MAX_RETRIES", "many")]).unwrap_err();
        assert_eq!(err.var, "XCRIT_MAX_RETRIES");

        let err = config(&[("XCRIT_STAGE_TIMEOUT_SECS", "0")]).unwrap_err();
        assert_eq!(err.var, "XCRIT_STAGE_TIMEOUT_SECS");

        let err = config(&[("XCRIT_PENALTY_SCALE", "1.5")]).unwrap_err();
        assert_eq!(err.var, "XCRIT_PENALTY_SCALE");
        assert!(err.to_string().contains("[0, 1]"));
    }
}
