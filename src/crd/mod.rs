//! Custom Resource Definitions for the cert-manager operator
//!
//! The CertManager CRD is the single, cluster-scoped configuration object
//! read by the override pipeline. Supporting types live in [`types`].

mod certmanager;
mod types;

pub use certmanager::{CertManager, CertManagerSpec, CertManagerStatus};
pub use types::{
    Condition, ConditionStatus, DeploymentConfig, LogLevel, ResourcesConfig, SchedulingConfig,
    UnsupportedConfigOverrides, WorkloadUnsupportedOverrides,
};
