//! ---
//! fsim_section: "02-failure-injection"
//! fsim_subsection: "module"
//! fsim_type: "source"
//! fsim_scope: "code"
//! fsim_description: "Failure taxonomy and injection planning."
//! fsim_version: "v0.0.0-prealpha"
//! fsim_owner: "tbd"
//! ---
//! Failure-injection core shared by the simulated API and its tooling.
//!
//! The crate owns the probability schema, the fixed error taxonomy, and the
//! ordered draw sequence that decides what a single `/api/data` call does.
//! Nothing here sleeps or touches the network; the transport layer executes
//! the [`InjectionPlan`] it is handed.
#![warn(missing_docs)]

pub mod plan;
pub mod probability;
pub mod settings;
pub mod taxonomy;

pub use plan::{plan_request, FailureInjector, InjectionPlan, LatencyBand};
pub use probability::{Probability, ProbabilityError};
pub use settings::{FailureConfig, FailureConfigPatch, FailureKnob, FailureSettings};
pub use taxonomy::{ClassifiedError, ErrorBody, ErrorKind, Severity};
