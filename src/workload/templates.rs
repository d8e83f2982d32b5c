//! Embedded base manifest templates
//!
//! The base Deployment for each workload ships inside the binary so a
//! reconcile pass never depends on cluster state for its starting point.
//! Templates are parsed on every load; callers receive an owned value they
//! are free to mutate.

use k8s_openapi::api::apps::v1::Deployment;

use super::WorkloadIdentity;

const CONTROLLER_MANIFEST: &str = include_str!("manifests/cert-manager.yaml");
const WEBHOOK_MANIFEST: &str = include_str!("manifests/cert-manager-webhook.yaml");
const CAINJECTOR_MANIFEST: &str = include_str!("manifests/cert-manager-cainjector.yaml");

/// Load the base Deployment manifest for a workload
///
/// Infallible for every [`WorkloadIdentity`]: the templates are embedded at
/// build time and validated by tests. A parse failure means the shipped
/// binary is corrupt, which is unrecoverable, so this panics rather than
/// returning an error.
pub fn load_base_manifest(identity: WorkloadIdentity) -> Deployment {
    let yaml = match identity {
        WorkloadIdentity::Controller => CONTROLLER_MANIFEST,
        WorkloadIdentity::Webhook => WEBHOOK_MANIFEST,
        WorkloadIdentity::CaInjector => CAINJECTOR_MANIFEST,
    };

    serde_yaml::from_str(yaml)
        .unwrap_or_else(|e| panic!("embedded manifest for {identity} failed to parse: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    // Parsing is exercised for every identity so a template typo fails CI
    // instead of panicking a running operator.

    #[test]
    fn every_template_parses() {
        for identity in WorkloadIdentity::all() {
            let deployment = load_base_manifest(identity);
            assert_eq!(
                deployment.metadata.name.as_deref(),
                Some(identity.deployment_name()),
                "template name must match workload {identity}"
            );
        }
    }

    #[test]
    fn templates_have_a_single_matching_container() {
        for identity in WorkloadIdentity::all() {
            let deployment = load_base_manifest(identity);
            let containers = deployment
                .spec
                .and_then(|s| s.template.spec)
                .map(|s| s.containers)
                .unwrap_or_default();
            assert_eq!(containers.len(), 1, "{identity} must have one container");
            assert_eq!(containers[0].name, identity.deployment_name());
        }
    }

    #[test]
    fn loads_are_independent_copies() {
        let mut first = load_base_manifest(WorkloadIdentity::Controller);
        first.metadata.name = Some("mutated".to_string());

        let second = load_base_manifest(WorkloadIdentity::Controller);
        assert_eq!(second.metadata.name.as_deref(), Some("cert-manager"));
    }
}
