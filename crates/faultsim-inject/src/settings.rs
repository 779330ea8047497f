//! ---
//! fsim_section: "02-failure-injection"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Failure taxonomy and injection planning."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::probability::Probability;

/// One of the four tunable failure probabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKnob {
    /// Chance of an immediate taxonomy error.
    ErrorRate,
    /// Chance of a slow database query.
    SlowDb,
    /// Chance of a downstream service failure.
    ExtApiFail,
    /// Chance of a downstream timeout.
    Timeout,
}

impl FailureKnob {
    /// Every knob, in header order.
    pub const ALL: [FailureKnob; 4] = [
        FailureKnob::ErrorRate,
        FailureKnob::Timeout,
        FailureKnob::SlowDb,
        FailureKnob::ExtApiFail,
    ];

    /// Request header overriding the knob for a single call.
    pub fn header(&self) -> &'static str {
        match self {
            FailureKnob::ErrorRate => "X-Error-Rate",
            FailureKnob::SlowDb => "X-Slow-DB-Prob",
            FailureKnob::ExtApiFail => "X-Ext-API-Fail-Prob",
            FailureKnob::Timeout => "X-Timeout-Prob",
        }
    }

    /// JSON key used by the configuration endpoint.
    pub fn key(&self) -> &'static str {
        match self {
            FailureKnob::ErrorRate => "error_rate",
            FailureKnob::SlowDb => "slow_db_prob",
            FailureKnob::ExtApiFail => "ext_api_fail_prob",
            FailureKnob::Timeout => "timeout_prob",
        }
    }
}

/// The four failure probabilities read by `/api/data`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct FailureConfig {
    /// Chance of an immediate taxonomy error.
    #[serde(default)]
    pub error_rate: Probability,
    /// Chance of the slow latency band.
    #[serde(default)]
    pub slow_db_prob: Probability,
    /// Chance of a downstream service failure after the query.
    #[serde(default)]
    pub ext_api_fail_prob: Probability,
    /// Chance of a downstream timeout after the query.
    #[serde(default)]
    pub timeout_prob: Probability,
}

impl FailureConfig {
    /// Profile used by the simulation driver for keys the caller leaves out.
    pub fn simulation_default() -> Self {
        Self {
            error_rate: Probability::from_unchecked(0.3),
            slow_db_prob: Probability::from_unchecked(0.2),
            ext_api_fail_prob: Probability::from_unchecked(0.1),
            timeout_prob: Probability::from_unchecked(0.1),
        }
    }

    /// Every knob set to the same probability.
    pub fn uniform(probability: Probability) -> Self {
        Self {
            error_rate: probability,
            slow_db_prob: probability,
            ext_api_fail_prob: probability,
            timeout_prob: probability,
        }
    }

    /// Read one knob.
    pub fn get(&self, knob: FailureKnob) -> Probability {
        match knob {
            FailureKnob::ErrorRate => self.error_rate,
            FailureKnob::SlowDb => self.slow_db_prob,
            FailureKnob::ExtApiFail => self.ext_api_fail_prob,
            FailureKnob::Timeout => self.timeout_prob,
        }
    }

    /// Overwrite one knob.
    pub fn set(&mut self, knob: FailureKnob, value: Probability) {
        match knob {
            FailureKnob::ErrorRate => self.error_rate = value,
            FailureKnob::SlowDb => self.slow_db_prob = value,
            FailureKnob::ExtApiFail => self.ext_api_fail_prob = value,
            FailureKnob::Timeout => self.timeout_prob = value,
        }
    }

    /// Overwrite the knobs present in `patch`, leaving the rest untouched.
    pub fn apply(&mut self, patch: &FailureConfigPatch) {
        for knob in FailureKnob::ALL {
            if let Some(value) = patch.get(knob) {
                self.set(knob, value);
            }
        }
    }

    /// Copy of `self` with `patch` applied.
    pub fn patched(mut self, patch: &FailureConfigPatch) -> Self {
        self.apply(patch);
        self
    }
}

/// Partial failure configuration; absent keys are left unchanged and unknown keys are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[allow(missing_docs)]
pub struct FailureConfigPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_rate: Option<Probability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub slow_db_prob: Option<Probability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ext_api_fail_prob: Option<Probability>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_prob: Option<Probability>,
}

impl FailureConfigPatch {
    /// Read one knob of the patch.
    pub fn get(&self, knob: FailureKnob) -> Option<Probability> {
        match knob {
            FailureKnob::ErrorRate => self.error_rate,
            FailureKnob::SlowDb => self.slow_db_prob,
            FailureKnob::ExtApiFail => self.ext_api_fail_prob,
            FailureKnob::Timeout => self.timeout_prob,
        }
    }

    /// Whether the patch changes nothing.
    pub fn is_empty(&self) -> bool {
        FailureKnob::ALL.iter().all(|knob| self.get(*knob).is_none())
    }
}

impl From<FailureConfig> for FailureConfigPatch {
    fn from(config: FailureConfig) -> Self {
        Self {
            error_rate: Some(config.error_rate),
            slow_db_prob: Some(config.slow_db_prob),
            ext_api_fail_prob: Some(config.ext_api_fail_prob),
            timeout_prob: Some(config.timeout_prob),
        }
    }
}

/// Process-wide failure configuration handle shared by the handlers.
///
/// Reads take a snapshot; writes go through [`FailureSettings::apply`] only.
#[derive(Debug, Default)]
pub struct FailureSettings {
    current: RwLock<FailureConfig>,
}

impl FailureSettings {
    /// Start from an initial configuration.
    pub fn new(initial: FailureConfig) -> Self {
        Self {
            current: RwLock::new(initial),
        }
    }

    /// Copy of the current configuration.
    pub fn snapshot(&self) -> FailureConfig {
        *self.current.read()
    }

    /// Apply a patch atomically and return the resulting configuration.
    pub fn apply(&self, patch: &FailureConfigPatch) -> FailureConfig {
        let mut guard = self.current.write();
        guard.apply(patch);
        let next = *guard;
        drop(guard);
        info!(
            error_rate = next.error_rate.value(),
            slow_db_prob = next.slow_db_prob.value(),
            ext_api_fail_prob = next.ext_api_fail_prob.value(),
            timeout_prob = next.timeout_prob.value(),
            "failure configuration updated"
        );
        next
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_ignores_unknown_keys() {
        let patch: FailureConfigPatch =
            serde_json::from_str(r#"{"error_rate": 0.5, "bogus": 3, "timeout_prob": 1}"#)
                .unwrap();
        let settings = FailureSettings::default();
        let next = settings.apply(&patch);
        let json = serde_json::to_value(next).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "error_rate": 0.5,
                "slow_db_prob": 0.0,
                "ext_api_fail_prob": 0.0,
                "timeout_prob": 1.0
            })
        );
    }

    #[test]
    fn apply_is_idempotent() {
        let settings = FailureSettings::default();
        let patch: FailureConfigPatch =
            serde_json::from_str(r#"{"slow_db_prob": 0.3, "ext_api_fail_prob": 0.2}"#).unwrap();
        let first = settings.apply(&patch);
        let second = settings.apply(&patch);
        assert_eq!(first, second);
        assert_eq!(settings.snapshot(), second);
    }

    #[test]
    fn out_of_range_patch_is_rejected_by_schema() {
        assert!(serde_json::from_str::<FailureConfigPatch>(r#"{"error_rate": 1.2}"#).is_err());
        assert!(serde_json::from_str::<FailureConfigPatch>(r#"{"error_rate": "x"}"#).is_err());
    }

    #[test]
    fn simulation_default_profile() {
        let profile = FailureConfig::simulation_default();
        assert_eq!(profile.error_rate.value(), 0.3);
        assert_eq!(profile.timeout_prob.value(), 0.1);
        assert_eq!(profile.slow_db_prob.value(), 0.2);
        assert_eq!(profile.ext_api_fail_prob.value(), 0.1);
        let patched = profile.patched(&FailureConfigPatch {
            error_rate: Some(Probability::ONE),
            ..Default::default()
        });
        assert_eq!(patched.error_rate, Probability::ONE);
        assert_eq!(patched.slow_db_prob.value(), 0.2);
    }

    #[test]
    fn knob_headers_match_wire_names() {
        let headers: Vec<_> = FailureKnob::ALL.iter().map(|k| k.header()).collect();
        assert_eq!(
            headers,
            vec![
                "X-Error-Rate",
                "X-Timeout-Prob",
                "X-Slow-DB-Prob",
                "X-Ext-API-Fail-Prob"
            ]
        );
    }
}
