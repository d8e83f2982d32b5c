//! Resource quota and scheduling constraint merges

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{ResourceRequirements, Toleration};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use crate::crd::{ResourcesConfig, SchedulingConfig};

fn merge_quantity_map(
    source: Option<&BTreeMap<String, Quantity>>,
    overrides: &BTreeMap<String, Quantity>,
) -> Option<BTreeMap<String, Quantity>> {
    // An absent source map is an empty one: overrides still populate it.
    let mut merged = source.cloned().unwrap_or_default();
    for (name, quantity) in overrides {
        merged.insert(name.clone(), quantity.clone());
    }
    if merged.is_empty() {
        None
    } else {
        Some(merged)
    }
}

/// Merge resource quota overrides into a container's requirements
///
/// Limits and requests are merged independently, per resource name,
/// last-write-wins: an override limit for `memory` replaces only the
/// source's `memory` limit and leaves the `cpu` limit and every request
/// untouched.
pub fn merge_resources(
    source: &ResourceRequirements,
    overrides: &ResourcesConfig,
) -> ResourceRequirements {
    ResourceRequirements {
        limits: merge_quantity_map(source.limits.as_ref(), &overrides.limits),
        requests: merge_quantity_map(source.requests.as_ref(), &overrides.requests),
        claims: source.claims.clone(),
    }
}

fn toleration_key(toleration: &Toleration) -> (Option<&str>, Option<&str>) {
    (toleration.key.as_deref(), toleration.operator.as_deref())
}

/// Merge scheduling constraint overrides into a pod's placement
///
/// The node selector merges per key, override winning. Tolerations are keyed
/// by `(key, operator)`: an override toleration matching a source entry
/// replaces it in place (position preserved); a toleration with a novel pair
/// is appended after the source entries.
pub fn merge_scheduling(
    source: &SchedulingConfig,
    overrides: &SchedulingConfig,
) -> SchedulingConfig {
    let mut node_selector = source.node_selector.clone();
    for (key, value) in &overrides.node_selector {
        node_selector.insert(key.clone(), value.clone());
    }

    let mut tolerations = source.tolerations.clone();
    for toleration in &overrides.tolerations {
        match tolerations
            .iter()
            .position(|t| toleration_key(t) == toleration_key(toleration))
        {
            Some(index) => tolerations[index] = toleration.clone(),
            None => tolerations.push(toleration.clone()),
        }
    }

    SchedulingConfig {
        node_selector,
        tolerations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quantities(pairs: &[(&str, &str)]) -> BTreeMap<String, Quantity> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), Quantity(value.to_string())))
            .collect()
    }

    fn toleration(key: &str, operator: &str, value: Option<&str>) -> Toleration {
        Toleration {
            key: Some(key.to_string()),
            operator: Some(operator.to_string()),
            value: value.map(String::from),
            effect: Some("NoSchedule".to_string()),
            ..Default::default()
        }
    }

    // =========================================================================
    // Resource quotas
    // =========================================================================

    #[test]
    fn override_limit_replaces_only_the_matching_resource() {
        let source = ResourceRequirements {
            limits: Some(quantities(&[("cpu", "100m"), ("memory", "64Mi")])),
            requests: Some(quantities(&[("cpu", "10m")])),
            ..Default::default()
        };
        let overrides = ResourcesConfig {
            limits: quantities(&[("memory", "256Mi")]),
            requests: BTreeMap::new(),
        };

        let merged = merge_resources(&source, &overrides);
        let limits = merged.limits.unwrap();
        assert_eq!(limits.get("memory"), Some(&Quantity("256Mi".to_string())));
        assert_eq!(limits.get("cpu"), Some(&Quantity("100m".to_string())));
        // Requests side untouched by a limits override
        assert_eq!(
            merged.requests.unwrap().get("cpu"),
            Some(&Quantity("10m".to_string()))
        );
    }

    #[test]
    fn absent_source_map_is_treated_as_empty() {
        let source = ResourceRequirements::default();
        let overrides = ResourcesConfig {
            limits: BTreeMap::new(),
            requests: quantities(&[("memory", "32Mi")]),
        };

        let merged = merge_resources(&source, &overrides);
        assert!(merged.limits.is_none());
        assert_eq!(
            merged.requests.unwrap().get("memory"),
            Some(&Quantity("32Mi".to_string()))
        );
    }

    #[test]
    fn limits_and_requests_merge_independently() {
        let source = ResourceRequirements {
            limits: Some(quantities(&[("cpu", "200m")])),
            requests: Some(quantities(&[("cpu", "20m")])),
            ..Default::default()
        };
        let overrides = ResourcesConfig {
            limits: quantities(&[("cpu", "400m")]),
            requests: quantities(&[("cpu", "40m")]),
        };

        let merged = merge_resources(&source, &overrides);
        assert_eq!(
            merged.limits.unwrap().get("cpu"),
            Some(&Quantity("400m".to_string()))
        );
        assert_eq!(
            merged.requests.unwrap().get("cpu"),
            Some(&Quantity("40m".to_string()))
        );
    }

    // =========================================================================
    // Scheduling
    // =========================================================================

    #[test]
    fn node_selector_merges_per_key() {
        let source = SchedulingConfig {
            node_selector: BTreeMap::from([
                ("kubernetes.io/os".to_string(), "linux".to_string()),
                ("zone".to_string(), "us-east-1a".to_string()),
            ]),
            tolerations: vec![],
        };
        let overrides = SchedulingConfig {
            node_selector: BTreeMap::from([("zone".to_string(), "us-east-1b".to_string())]),
            tolerations: vec![],
        };

        let merged = merge_scheduling(&source, &overrides);
        assert_eq!(
            merged.node_selector.get("zone").map(String::as_str),
            Some("us-east-1b")
        );
        assert_eq!(
            merged.node_selector.get("kubernetes.io/os").map(String::as_str),
            Some("linux")
        );
    }

    #[test]
    fn matching_toleration_is_replaced_in_place() {
        let source = SchedulingConfig {
            node_selector: BTreeMap::new(),
            tolerations: vec![
                toleration("node-role.kubernetes.io/control-plane", "Exists", None),
                toleration("dedicated", "Equal", Some("infra")),
            ],
        };
        let overrides = SchedulingConfig {
            node_selector: BTreeMap::new(),
            tolerations: vec![toleration(
                "node-role.kubernetes.io/control-plane",
                "Exists",
                Some("replaced"),
            )],
        };

        let merged = merge_scheduling(&source, &overrides);
        assert_eq!(merged.tolerations.len(), 2);
        // Position preserved: the replaced toleration is still first
        assert_eq!(merged.tolerations[0].value.as_deref(), Some("replaced"));
        assert_eq!(merged.tolerations[1].value.as_deref(), Some("infra"));
    }

    #[test]
    fn novel_toleration_is_appended_after_source_entries() {
        let source = SchedulingConfig {
            node_selector: BTreeMap::new(),
            tolerations: vec![toleration("dedicated", "Equal", Some("infra"))],
        };
        let overrides = SchedulingConfig {
            node_selector: BTreeMap::new(),
            // Same key, different operator: a novel (key, operator) pair
            tolerations: vec![toleration("dedicated", "Exists", None)],
        };

        let merged = merge_scheduling(&source, &overrides);
        assert_eq!(merged.tolerations.len(), 2);
        assert_eq!(merged.tolerations[0].operator.as_deref(), Some("Equal"));
        assert_eq!(merged.tolerations[1].operator.as_deref(), Some("Exists"));
    }
}
