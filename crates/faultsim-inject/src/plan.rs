//! ---
//! fsim_section: "02-failure-injection"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Failure taxonomy and injection planning."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
use std::ops::RangeInclusive;
use std::time::Duration;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

use crate::settings::FailureConfig;
use crate::taxonomy::{ClassifiedError, ErrorKind};

/// Latency band chosen by the slow-query draw.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LatencyBand {
    /// Regular query latency.
    Normal,
    /// Degraded query latency.
    Slow,
}

impl LatencyBand {
    /// Bounds of the band in seconds, inclusive.
    pub fn seconds(&self) -> RangeInclusive<f64> {
        match self {
            LatencyBand::Normal => 0.01..=0.1,
            LatencyBand::Slow => 1.0..=5.0,
        }
    }

    /// Payload returned under `db_data.data`.
    pub fn payload(&self) -> &'static str {
        match self {
            LatencyBand::Normal => "query result",
            LatencyBand::Slow => "slow query result",
        }
    }

    /// Short label used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            LatencyBand::Normal => "normal",
            LatencyBand::Slow => "slow",
        }
    }
}

/// What a single `/api/data` call must do.
#[derive(Debug, Clone, PartialEq)]
pub enum InjectionPlan {
    /// Fail immediately, before any simulated work.
    Reject(ClassifiedError),
    /// Sleep for `latency`, then finish with `outcome`.
    Proceed {
        /// Simulated query latency.
        latency: Duration,
        /// Band the latency was drawn from.
        band: LatencyBand,
        /// Downstream result evaluated after the query.
        outcome: Result<(), ClassifiedError>,
    },
}

impl InjectionPlan {
    /// Error the call ends with, if any.
    pub fn error(&self) -> Option<&ClassifiedError> {
        match self {
            InjectionPlan::Reject(err) => Some(err),
            InjectionPlan::Proceed { outcome, .. } => outcome.as_ref().err(),
        }
    }
}

/// Run the ordered draw sequence for one call.
///
/// Each check consumes its own uniform draw, in this order: error rate,
/// slow query (plus the latency itself), timeout, downstream failure.
pub fn plan_request<R: Rng + ?Sized>(config: &FailureConfig, rng: &mut R) -> InjectionPlan {
    if config.error_rate.fires(rng.gen::<f64>()) {
        let pick = rng.gen_range(0..ErrorKind::RANDOM_POOL.len());
        return InjectionPlan::Reject(ClassifiedError::new(ErrorKind::RANDOM_POOL[pick]));
    }

    let band = if config.slow_db_prob.fires(rng.gen::<f64>()) {
        LatencyBand::Slow
    } else {
        LatencyBand::Normal
    };
    let latency = Duration::from_secs_f64(rng.gen_range(band.seconds()));

    let outcome = if config.timeout_prob.fires(rng.gen::<f64>()) {
        Err(ClassifiedError::new(ErrorKind::ExternalTimeout))
    } else if config.ext_api_fail_prob.fires(rng.gen::<f64>()) {
        Err(ClassifiedError::new(ErrorKind::ExternalServiceError))
    } else {
        Ok(())
    };

    InjectionPlan::Proceed {
        latency,
        band,
        outcome,
    }
}

/// Thread-safe planner holding the random source.
#[derive(Debug)]
pub struct FailureInjector {
    rng: Mutex<StdRng>,
}

impl FailureInjector {
    /// Seeded injectors replay the same sequence of plans; unseeded ones draw from entropy.
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            rng: Mutex::new(rng),
        }
    }

    /// Plan one call against `config`.
    pub fn plan(&self, config: &FailureConfig) -> InjectionPlan {
        let plan = plan_request(config, &mut *self.rng.lock());
        debug!(
            target: "faultsim::inject",
            error = plan.error().map(|err| err.kind().as_str()),
            "injection planned"
        );
        plan
    }
}

impl Default for FailureInjector {
    fn default() -> Self {
        Self::new(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probability::Probability;
    use crate::settings::FailureConfig;

    fn config(error: f64, slow: f64, timeout: f64, ext: f64) -> FailureConfig {
        FailureConfig {
            error_rate: Probability::new(error).unwrap(),
            slow_db_prob: Probability::new(slow).unwrap(),
            timeout_prob: Probability::new(timeout).unwrap(),
            ext_api_fail_prob: Probability::new(ext).unwrap(),
        }
    }

    #[test]
    fn all_zero_always_succeeds_in_normal_band() {
        let mut rng = StdRng::seed_from_u64(7);
        let cfg = FailureConfig::default();
        for _ in 0..500 {
            match plan_request(&cfg, &mut rng) {
                InjectionPlan::Proceed {
                    latency,
                    band,
                    outcome,
                } => {
                    assert_eq!(band, LatencyBand::Normal);
                    assert!(outcome.is_ok());
                    let secs = latency.as_secs_f64();
                    assert!((0.01..=0.1).contains(&secs), "latency {secs} out of band");
                }
                other => panic!("unexpected plan {other:?}"),
            }
        }
    }

    #[test]
    fn error_rate_is_checked_first() {
        let mut rng = StdRng::seed_from_u64(11);
        let cfg = FailureConfig::uniform(Probability::ONE);
        for _ in 0..200 {
            let plan = plan_request(&cfg, &mut rng);
            let InjectionPlan::Reject(err) = plan else {
                panic!("expected rejection");
            };
            assert!(ErrorKind::RANDOM_POOL.contains(&err.kind()));
        }
    }

    #[test]
    fn random_pool_is_fully_reachable() {
        let mut rng = StdRng::seed_from_u64(3);
        let cfg = FailureConfig::uniform(Probability::ONE);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..600 {
            if let InjectionPlan::Reject(err) = plan_request(&cfg, &mut rng) {
                seen.insert(err.kind());
            }
        }
        assert_eq!(seen.len(), ErrorKind::RANDOM_POOL.len());
    }

    #[test]
    fn timeout_precedes_downstream_failure() {
        let mut rng = StdRng::seed_from_u64(5);
        let cfg = config(0.0, 1.0, 1.0, 1.0);
        let plan = plan_request(&cfg, &mut rng);
        let InjectionPlan::Proceed { band, outcome, .. } = plan else {
            panic!("expected the call to proceed");
        };
        assert_eq!(band, LatencyBand::Slow);
        assert_eq!(outcome.unwrap_err().kind(), ErrorKind::ExternalTimeout);

        let cfg = config(0.0, 0.0, 0.0, 1.0);
        let plan = plan_request(&cfg, &mut rng);
        assert_eq!(
            plan.error().map(|err| err.kind()),
            Some(ErrorKind::ExternalServiceError)
        );
    }

    #[test]
    fn slow_band_stays_within_bounds() {
        let mut rng = StdRng::seed_from_u64(99);
        let cfg = config(0.0, 1.0, 0.0, 0.0);
        for _ in 0..500 {
            let InjectionPlan::Proceed { latency, band, .. } = plan_request(&cfg, &mut rng) else {
                panic!("expected the call to proceed");
            };
            assert_eq!(band, LatencyBand::Slow);
            let secs = latency.as_secs_f64();
            assert!((1.0..=5.0).contains(&secs), "latency {secs} out of band");
        }
    }

    #[test]
    fn seeded_injectors_replay_identically() {
        let cfg = config(0.3, 0.2, 0.1, 0.1);
        let a = FailureInjector::new(Some(42));
        let b = FailureInjector::new(Some(42));
        for _ in 0..50 {
            assert_eq!(a.plan(&cfg), b.plan(&cfg));
        }
    }
}
