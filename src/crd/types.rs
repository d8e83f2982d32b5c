//! Supporting types for the CertManager CRD

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{EnvVar, Toleration};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Coarse verbosity level for the managed workloads
///
/// Mapped to a single `--v=N` argument on every managed container. The
/// mapping follows the usual klog conventions; levels above `Debug` are
/// meant for short-lived troubleshooting, not steady state.
#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum LogLevel {
    /// Standard operational logging (`--v=2`)
    #[default]
    Normal,
    /// Debug logging (`--v=4`)
    Debug,
    /// Trace logging (`--v=6`)
    Trace,
    /// Maximum verbosity (`--v=8`)
    TraceAll,
}

impl LogLevel {
    /// The `--v=N` argument for this level, if one is mapped
    ///
    /// A level with no mapped argument is a pipeline no-op.
    pub fn verbosity_arg(&self) -> Option<&'static str> {
        match self {
            Self::Normal => Some("--v=2"),
            Self::Debug => Some("--v=4"),
            Self::Trace => Some("--v=6"),
            Self::TraceAll => Some("--v=8"),
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "Normal"),
            Self::Debug => write!(f, "Debug"),
            Self::Trace => write!(f, "Trace"),
            Self::TraceAll => write!(f, "TraceAll"),
        }
    }
}

/// Resource quota overrides for a workload container
///
/// Limits and requests are independent maps from resource name to quantity;
/// each merges per key against the base manifest.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResourcesConfig {
    /// Resource limits (e.g. `cpu`, `memory`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, Quantity>,

    /// Resource requests (e.g. `cpu`, `memory`)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, Quantity>,
}

impl ResourcesConfig {
    /// True if neither limits nor requests carry an override
    pub fn is_empty(&self) -> bool {
        self.limits.is_empty() && self.requests.is_empty()
    }
}

/// Pod placement overrides for a workload
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingConfig {
    /// Node selector entries, merged per key onto the base manifest
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub node_selector: BTreeMap<String, String>,

    /// Tolerations, keyed by `(key, operator)` against the base manifest
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tolerations: Vec<Toleration>,
}

impl SchedulingConfig {
    /// True if no placement override is configured
    pub fn is_empty(&self) -> bool {
        self.node_selector.is_empty() && self.tolerations.is_empty()
    }
}

/// Per-workload override record
///
/// Each of the three managed workloads has an optional instance of this
/// record on the CertManager spec. Every field is validated against the
/// workload's allow-list before it is allowed to touch a manifest.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentConfig {
    /// Command-line argument overrides (`key[=value]` tokens)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub override_args: Vec<String>,

    /// Environment variable overrides
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub override_env: Vec<EnvVar>,

    /// Resource quota overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_resources: Option<ResourcesConfig>,

    /// Pod placement overrides
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_scheduling: Option<SchedulingConfig>,

    /// Replica count override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub override_replicas: Option<i32>,

    /// Pod template label overrides
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub override_labels: BTreeMap<String, String>,
}

/// Decoded form of the unsupported-overrides escape hatch
///
/// Carried on the CertManager spec as an opaque JSON payload and decoded
/// only by the pipeline hook that applies it. These overrides bypass
/// validation entirely; that is their documented purpose, and the risk sits
/// with whoever sets them.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnsupportedConfigOverrides {
    /// Raw overrides for the controller workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<WorkloadUnsupportedOverrides>,

    /// Raw overrides for the webhook workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WorkloadUnsupportedOverrides>,

    /// Raw overrides for the CA injector workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_injector: Option<WorkloadUnsupportedOverrides>,
}

/// Raw, unvalidated argument and environment overrides for one workload
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkloadUnsupportedOverrides {
    /// Raw argument overrides, merged without validation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Raw environment overrides, merged without validation
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<EnvVar>,
}

/// Condition status following Kubernetes conventions
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition is true
    True,
    /// Condition is false
    False,
    /// Condition status is unknown
    #[default]
    Unknown,
}

impl std::fmt::Display for ConditionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::True => write!(f, "True"),
            Self::False => write!(f, "False"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Kubernetes-style condition for status reporting
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
pub struct Condition {
    /// Type of condition (e.g. Available, Degraded)
    #[serde(rename = "type")]
    pub type_: String,

    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,

    /// Machine-readable reason for the condition
    pub reason: String,

    /// Human-readable message
    pub message: String,

    /// Last time the condition transitioned
    #[serde(rename = "lastTransitionTime")]
    pub last_transition_time: DateTime<Utc>,
}

impl Condition {
    /// Create a new condition with the current timestamp
    pub fn new(
        type_: impl Into<String>,
        status: ConditionStatus,
        reason: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.into(),
            status,
            reason: reason.into(),
            message: message.into(),
            last_transition_time: Utc::now(),
        }
    }
}
