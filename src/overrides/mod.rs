//! Override accessors and validation for the managed workloads
//!
//! Every workload has a [`WorkloadProfile`]: one table entry carrying its
//! override allow-lists and the projection from the CertManager spec to its
//! sub-record. All accessors and validators dispatch through the table, so
//! adding a fourth workload means adding one profile, not another set of
//! switch arms.
//!
//! An absent sub-record (or field) is the valid "no override" state and
//! projects to a zero value. Only the singleton configuration object itself
//! being unavailable is an error, and that is raised by the caller that
//! fetched the snapshot, not here.

mod validation;

pub use validation::{validate_args, validate_env, validate_labels, validate_resource_names};

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::EnvVar;

use crate::crd::{CertManagerSpec, DeploymentConfig, ResourcesConfig, SchedulingConfig};
use crate::workload::WorkloadIdentity;

/// Per-workload override profile: allow-lists plus spec projection
pub struct WorkloadProfile {
    /// The workload this profile belongs to
    pub identity: WorkloadIdentity,
    /// Argument keys this workload accepts as overrides
    pub allowed_args: &'static [&'static str],
    /// Environment variable names this workload accepts as overrides
    pub allowed_env: &'static [&'static str],
    /// Pod label keys this workload accepts as overrides
    pub allowed_labels: &'static [&'static str],
    /// Resource names this workload accepts quota overrides for
    pub allowed_resources: &'static [&'static str],
    project: fn(&CertManagerSpec) -> Option<&DeploymentConfig>,
}

fn controller_config(spec: &CertManagerSpec) -> Option<&DeploymentConfig> {
    spec.controller_config.as_ref()
}

fn webhook_config(spec: &CertManagerSpec) -> Option<&DeploymentConfig> {
    spec.webhook_config.as_ref()
}

fn ca_injector_config(spec: &CertManagerSpec) -> Option<&DeploymentConfig> {
    spec.ca_injector_config.as_ref()
}

/// Proxy variables accepted as environment overrides
const PROXY_ENV_VARS: &[&str] = &["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"];

/// Pod labels accepted as overrides (workload identity federation opt-in)
const ALLOWED_POD_LABELS: &[&str] = &["azure.workload.identity/use"];

/// Resource names accepted for quota overrides
const ALLOWED_RESOURCE_NAMES: &[&str] = &["cpu", "memory"];

// The controller accepts DNS-resolution and ambient-credential tuning flags
// that the webhook and CA injector have no use for, which is why its
// argument list is the largest of the three.
static CONTROLLER_PROFILE: WorkloadProfile = WorkloadProfile {
    identity: WorkloadIdentity::Controller,
    allowed_args: &[
        "--acme-http01-solver-nameservers",
        "--dns01-recursive-nameservers",
        "--dns01-recursive-nameservers-only",
        "--enable-certificate-owner-ref",
        "--issuer-ambient-credentials",
        "--metrics-listen-address",
        "--v",
    ],
    allowed_env: PROXY_ENV_VARS,
    allowed_labels: ALLOWED_POD_LABELS,
    allowed_resources: ALLOWED_RESOURCE_NAMES,
    project: controller_config,
};

static WEBHOOK_PROFILE: WorkloadProfile = WorkloadProfile {
    identity: WorkloadIdentity::Webhook,
    allowed_args: &["--v"],
    allowed_env: PROXY_ENV_VARS,
    allowed_labels: ALLOWED_POD_LABELS,
    allowed_resources: ALLOWED_RESOURCE_NAMES,
    project: webhook_config,
};

static CA_INJECTOR_PROFILE: WorkloadProfile = WorkloadProfile {
    identity: WorkloadIdentity::CaInjector,
    allowed_args: &["--v"],
    allowed_env: PROXY_ENV_VARS,
    allowed_labels: ALLOWED_POD_LABELS,
    allowed_resources: ALLOWED_RESOURCE_NAMES,
    project: ca_injector_config,
};

/// Look up the profile for a workload
pub fn profile(identity: WorkloadIdentity) -> &'static WorkloadProfile {
    match identity {
        WorkloadIdentity::Controller => &CONTROLLER_PROFILE,
        WorkloadIdentity::Webhook => &WEBHOOK_PROFILE,
        WorkloadIdentity::CaInjector => &CA_INJECTOR_PROFILE,
    }
}

fn config_for(spec: &CertManagerSpec, identity: WorkloadIdentity) -> Option<&DeploymentConfig> {
    (profile(identity).project)(spec)
}

/// Argument overrides configured for a workload (empty when unset)
pub fn override_args_for(spec: &CertManagerSpec, identity: WorkloadIdentity) -> &[String] {
    config_for(spec, identity)
        .map(|c| c.override_args.as_slice())
        .unwrap_or(&[])
}

/// Environment overrides configured for a workload (empty when unset)
pub fn override_env_for(spec: &CertManagerSpec, identity: WorkloadIdentity) -> &[EnvVar] {
    config_for(spec, identity)
        .map(|c| c.override_env.as_slice())
        .unwrap_or(&[])
}

/// Resource quota overrides configured for a workload
pub fn override_resources_for(
    spec: &CertManagerSpec,
    identity: WorkloadIdentity,
) -> Option<&ResourcesConfig> {
    config_for(spec, identity).and_then(|c| c.override_resources.as_ref())
}

/// Scheduling overrides configured for a workload
pub fn override_scheduling_for(
    spec: &CertManagerSpec,
    identity: WorkloadIdentity,
) -> Option<&SchedulingConfig> {
    config_for(spec, identity).and_then(|c| c.override_scheduling.as_ref())
}

/// Replica count override configured for a workload
pub fn override_replicas_for(spec: &CertManagerSpec, identity: WorkloadIdentity) -> Option<i32> {
    config_for(spec, identity).and_then(|c| c.override_replicas)
}

/// Pod label overrides configured for a workload
pub fn override_labels_for(
    spec: &CertManagerSpec,
    identity: WorkloadIdentity,
) -> Option<&BTreeMap<String, String>> {
    config_for(spec, identity)
        .map(|c| &c.override_labels)
        .filter(|labels| !labels.is_empty())
}
