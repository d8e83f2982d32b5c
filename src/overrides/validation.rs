//! Allow-list validation for workload overrides
//!
//! Every validated override kind runs through here before the corresponding
//! merge hook is allowed to touch a manifest. A single unsupported key
//! aborts the whole pipeline pass; nothing is partially applied.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::EnvVar;

use crate::crd::ResourcesConfig;
use crate::error::Error;
use crate::workload::WorkloadIdentity;

use super::profile;

fn check_keys<'a>(
    identity: WorkloadIdentity,
    kind: &'static str,
    keys: impl IntoIterator<Item = &'a str>,
    allowed: &[&str],
) -> Result<(), Error> {
    for key in keys {
        if !allowed.contains(&key) {
            return Err(Error::unsupported_override(identity.as_str(), kind, key));
        }
    }
    Ok(())
}

/// Validate parsed argument overrides against the workload's allow-list
///
/// Takes the parsed key-to-value map (see [`crate::merge::parse_args`]);
/// only keys are checked, values are the user's business.
pub fn validate_args(
    identity: WorkloadIdentity,
    parsed: &BTreeMap<String, String>,
) -> Result<(), Error> {
    check_keys(
        identity,
        "argument",
        parsed.keys().map(String::as_str),
        profile(identity).allowed_args,
    )
}

/// Validate environment overrides against the workload's allow-list
pub fn validate_env(identity: WorkloadIdentity, env: &[EnvVar]) -> Result<(), Error> {
    check_keys(
        identity,
        "environment",
        env.iter().map(|v| v.name.as_str()),
        profile(identity).allowed_env,
    )
}

/// Validate pod label overrides against the workload's allow-list
pub fn validate_labels(
    identity: WorkloadIdentity,
    labels: &BTreeMap<String, String>,
) -> Result<(), Error> {
    check_keys(
        identity,
        "label",
        labels.keys().map(String::as_str),
        profile(identity).allowed_labels,
    )
}

/// Validate resource quota override names against the workload's allow-list
///
/// Names only: quantities are never validated here. Limits and requests
/// share one allow-list.
pub fn validate_resource_names(
    identity: WorkloadIdentity,
    resources: &ResourcesConfig,
) -> Result<(), Error> {
    let names = resources
        .limits
        .keys()
        .chain(resources.requests.keys())
        .map(String::as_str);
    check_keys(
        identity,
        "resource",
        names,
        profile(identity).allowed_resources,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

    fn parsed(keys: &[&str]) -> BTreeMap<String, String> {
        keys.iter()
            .map(|k| (k.to_string(), String::new()))
            .collect()
    }

    fn env(names: &[&str]) -> Vec<EnvVar> {
        names
            .iter()
            .map(|name| EnvVar {
                name: name.to_string(),
                value: Some("x".to_string()),
                ..Default::default()
            })
            .collect()
    }

    // =========================================================================
    // Completeness: every allow-listed key passes, everything else fails
    // =========================================================================

    #[test]
    fn every_allow_listed_argument_passes() {
        for identity in WorkloadIdentity::all() {
            for key in profile(identity).allowed_args {
                validate_args(identity, &parsed(&[key]))
                    .unwrap_or_else(|e| panic!("{key} should be allowed for {identity}: {e}"));
            }
        }
    }

    #[test]
    fn unknown_argument_fails_naming_the_key() {
        let err = validate_args(WorkloadIdentity::Webhook, &parsed(&["--unknown-flag"]))
            .unwrap_err();
        match err {
            Error::UnsupportedOverrideKey { workload, key, .. } => {
                assert_eq!(workload, "webhook");
                assert_eq!(key, "--unknown-flag");
            }
            other => panic!("expected UnsupportedOverrideKey, got {other}"),
        }
    }

    #[test]
    fn controller_only_flags_are_rejected_for_other_workloads() {
        let dns_flag = parsed(&["--dns01-recursive-nameservers"]);
        assert!(validate_args(WorkloadIdentity::Controller, &dns_flag).is_ok());
        assert!(validate_args(WorkloadIdentity::Webhook, &dns_flag).is_err());
        assert!(validate_args(WorkloadIdentity::CaInjector, &dns_flag).is_err());
    }

    #[test]
    fn proxy_environment_overrides_are_allowed() {
        for identity in WorkloadIdentity::all() {
            assert!(validate_env(identity, &env(&["HTTP_PROXY", "NO_PROXY"])).is_ok());
        }
    }

    #[test]
    fn arbitrary_environment_overrides_are_rejected() {
        let err = validate_env(WorkloadIdentity::Controller, &env(&["LD_PRELOAD"])).unwrap_err();
        assert!(err.to_string().contains("LD_PRELOAD"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn label_allow_list_is_enforced() {
        let allowed = BTreeMap::from([(
            "azure.workload.identity/use".to_string(),
            "true".to_string(),
        )]);
        assert!(validate_labels(WorkloadIdentity::Controller, &allowed).is_ok());

        let rejected = BTreeMap::from([("app".to_string(), "hijacked".to_string())]);
        let err = validate_labels(WorkloadIdentity::Controller, &rejected).unwrap_err();
        assert!(err.to_string().contains("app"));
    }

    #[test]
    fn resource_names_validate_names_not_values() {
        let valid = ResourcesConfig {
            limits: BTreeMap::from([("cpu".to_string(), Quantity("not-a-quantity".to_string()))]),
            requests: BTreeMap::new(),
        };
        // Bogus quantity value still passes: only names are checked
        assert!(validate_resource_names(WorkloadIdentity::Controller, &valid).is_ok());

        let invalid = ResourcesConfig {
            limits: BTreeMap::new(),
            requests: BTreeMap::from([(
                "ephemeral-storage".to_string(),
                Quantity("1Gi".to_string()),
            )]),
        };
        let err = validate_resource_names(WorkloadIdentity::Controller, &invalid).unwrap_err();
        assert!(err.to_string().contains("ephemeral-storage"));
    }
}
