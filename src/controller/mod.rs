//! Controller for the CertManager configuration singleton
//!
//! Follows the Kubernetes controller pattern: observe the configuration,
//! run the override pipeline per workload, apply the results, report
//! status.

mod certmanager;

pub use certmanager::{
    ensure_default_configuration, error_policy, reconcile, Context, ContextBuilder, InstallGuard,
    KubeClient, KubeClientImpl, LabelInstallGuard,
};
