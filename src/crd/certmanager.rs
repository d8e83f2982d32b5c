//! CertManager Custom Resource Definition
//!
//! The CertManager CRD is the singleton, cluster-scoped configuration object
//! for the operator. Users express workload overrides here; the reconcile
//! loop reads a snapshot per pass and never writes anything back except
//! status.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::types::{Condition, ConditionStatus, DeploymentConfig, LogLevel};

/// Specification for the CertManager singleton
///
/// All override sub-records are optional: an absent record is the valid
/// "no override" state, not an error. The `unsupported_config_overrides`
/// payload is deliberately opaque at the schema level; it bypasses the
/// validation engine and is decoded only by the hook that applies it.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[kube(
    group = "operator.cert-manager.io",
    version = "v1alpha1",
    kind = "CertManager",
    plural = "certmanagers",
    status = "CertManagerStatus",
    namespaced = false,
    printcolumn = r#"{"name":"LogLevel","type":"string","jsonPath":".spec.logLevel"}"#,
    printcolumn = r#"{"name":"Age","type":"date","jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CertManagerSpec {
    /// Verbosity for all managed workloads
    #[serde(default)]
    pub log_level: LogLevel,

    /// Overrides for the controller workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller_config: Option<DeploymentConfig>,

    /// Overrides for the webhook workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook_config: Option<DeploymentConfig>,

    /// Overrides for the CA injector workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ca_injector_config: Option<DeploymentConfig>,

    /// Name of the cloud credentials secret in the operand namespace
    ///
    /// Consulted only for the controller workload. When unset, no cloud
    /// credentials are mounted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_credentials_secret: Option<String>,

    /// Unvalidated override escape hatch
    ///
    /// Decoded into per-workload raw argument/environment overrides and
    /// applied after every validated override. Keys set here are not
    /// checked against any allow-list; a typo silently lands on the
    /// workload. Prefer the validated override fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unsupported_config_overrides: Option<serde_json::Value>,
}

/// Status for the CertManager singleton
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertManagerStatus {
    /// Conditions representing the operator's view of the operand state
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,

    /// Generation most recently acted upon
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl CertManagerStatus {
    /// Set a condition, replacing any existing condition of the same type
    pub fn set_condition(&mut self, condition: Condition) {
        self.conditions.retain(|c| c.type_ != condition.type_);
        self.conditions.push(condition);
    }

    /// Add a condition and return self for chaining
    pub fn condition(mut self, condition: Condition) -> Self {
        self.set_condition(condition);
        self
    }

    /// Look up a condition by type
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.type_ == type_)
    }

    /// True if the given condition type is present with status True
    pub fn is_condition_true(&self, type_: &str) -> bool {
        self.get_condition(type_)
            .map(|c| c.status == ConditionStatus::True)
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spec_with_no_overrides_is_valid() {
        let spec = CertManagerSpec::default();
        assert!(spec.controller_config.is_none());
        assert!(spec.webhook_config.is_none());
        assert!(spec.ca_injector_config.is_none());
        assert_eq!(spec.log_level, LogLevel::Normal);
    }

    #[test]
    fn spec_round_trips_through_yaml() {
        let yaml = r#"
logLevel: Debug
controllerConfig:
  overrideArgs:
    - --v=5
cloudCredentialsSecret: aws-creds
"#;
        let spec: CertManagerSpec = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(spec.log_level, LogLevel::Debug);
        assert_eq!(
            spec.controller_config.as_ref().unwrap().override_args,
            vec!["--v=5".to_string()]
        );
        assert_eq!(spec.cloud_credentials_secret.as_deref(), Some("aws-creds"));

        let back = serde_yaml::to_string(&spec).unwrap();
        let again: CertManagerSpec = serde_yaml::from_str(&back).unwrap();
        assert_eq!(spec, again);
    }

    #[test]
    fn set_condition_replaces_same_type() {
        let mut status = CertManagerStatus::default();
        status.set_condition(Condition::new(
            "Degraded",
            ConditionStatus::True,
            "UnsupportedOverride",
            "bad key",
        ));
        status.set_condition(Condition::new(
            "Degraded",
            ConditionStatus::False,
            "AsExpected",
            "",
        ));

        assert_eq!(status.conditions.len(), 1);
        assert!(!status.is_condition_true("Degraded"));
    }

    #[test]
    fn crd_generation_succeeds() {
        use kube::CustomResourceExt;

        let crd = CertManager::crd();
        assert_eq!(crd.spec.names.kind, "CertManager");
        assert_eq!(crd.spec.group, "operator.cert-manager.io");
        assert_eq!(crd.spec.scope, "Cluster");
    }
}
