//! The manifest transformation hooks
//!
//! Hook order lives in [`super::Pipeline::new`]. Each hook is a small unit
//! struct so the chain is a plain ordered list of values; no hook knows
//! about any other.

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, EnvVar, PodSpec, ProjectedVolumeSource,
    ServiceAccountTokenProjection, Volume, VolumeMount, VolumeProjection,
};
use tracing::debug;

use crate::crd::{SchedulingConfig, UnsupportedConfigOverrides};
use crate::credentials;
use crate::error::Error;
use crate::merge::{
    merge_args, merge_env, merge_labels, merge_resources, merge_scheduling, parse_args,
};
use crate::overrides;
use crate::workload::WorkloadIdentity;

use super::{ManifestHook, PipelineContext};

/// Environment variable naming the trusted CA config map to mount
pub const TRUSTED_CA_CONFIGMAP_ENV: &str = "TRUSTED_CA_CONFIGMAP_NAME";

const TRUSTED_CA_VOLUME: &str = "trusted-ca-bundle";
const TRUSTED_CA_BUNDLE_KEY: &str = "ca-bundle.crt";
const TRUSTED_CA_MOUNT_PATH: &str = "/etc/pki/tls/certs/cert-manager-tls-ca-bundle.crt";

const BOUND_SA_TOKEN_VOLUME: &str = "bound-sa-token";
const BOUND_SA_TOKEN_DIR: &str = "/var/run/secrets/bound-sa-token";
const BOUND_SA_TOKEN_EXPIRATION_SECONDS: i64 = 3600;

/// Image substitution table: image-name substring to the env var that
/// overrides it. First substring match wins; unmatched images pass through.
const IMAGE_ENV_OVERRIDES: &[(&str, &str)] = &[
    ("cert-manager-controller", "RELATED_IMAGE_CERT_MANAGER_CONTROLLER"),
    ("cert-manager-webhook", "RELATED_IMAGE_CERT_MANAGER_WEBHOOK"),
    ("cert-manager-cainjector", "RELATED_IMAGE_CERT_MANAGER_CAINJECTOR"),
];

const PROXY_ENV_VARS: &[&str] = &["HTTP_PROXY", "HTTPS_PROXY", "NO_PROXY"];

fn pod_spec_mut(manifest: &mut Deployment) -> &mut PodSpec {
    manifest
        .spec
        .get_or_insert_with(Default::default)
        .template
        .spec
        .get_or_insert_with(Default::default)
}

fn workload_container_mut<'a>(
    manifest: &'a mut Deployment,
    identity: WorkloadIdentity,
) -> Option<&'a mut Container> {
    pod_spec_mut(manifest)
        .containers
        .iter_mut()
        .find(|c| c.name == identity.deployment_name())
}

fn push_volume(pod: &mut PodSpec, volume: Volume) {
    pod.volumes.get_or_insert_with(Vec::new).push(volume);
}

fn push_mount(container: &mut Container, mount: VolumeMount) {
    container.volume_mounts.get_or_insert_with(Vec::new).push(mount);
}

fn merge_container_env(container: &mut Container, overrides: &[EnvVar]) {
    let source = container.env.take().unwrap_or_default();
    container.env = Some(merge_env(&source, overrides));
}

fn merge_container_args(container: &mut Container, overrides: &[String]) {
    let source = container.args.take().unwrap_or_default();
    container.args = Some(merge_args(&source, overrides));
}

/// Rewrite container images through the env-var indirection table
pub struct ImageOverrideHook;

#[async_trait]
impl ManifestHook for ImageOverrideHook {
    fn name(&self) -> &'static str {
        "override-image"
    }

    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        for container in &mut pod_spec_mut(manifest).containers {
            let Some(image) = container.image.clone() else {
                continue;
            };
            for (substring, var) in IMAGE_ENV_OVERRIDES {
                if !image.contains(substring) {
                    continue;
                }
                if let Some(replacement) = ctx.env.read_env(var).filter(|v| !v.is_empty()) {
                    debug!(container = %container.name, image = %replacement, "overriding image");
                    container.image = Some(replacement);
                }
                // First substring match consumes the container even when
                // the env var is unset.
                break;
            }
        }
        Ok(())
    }
}

/// Inject the configured verbosity as a `--v=N` argument
pub struct LogLevelHook;

#[async_trait]
impl ManifestHook for LogLevelHook {
    fn name(&self) -> &'static str {
        "inject-log-level"
    }

    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        let Some(arg) = ctx.config.log_level.verbosity_arg() else {
            return Ok(());
        };
        if let Some(container) = workload_container_mut(manifest, ctx.identity) {
            merge_container_args(container, &[arg.to_string()]);
        }
        Ok(())
    }
}

/// Validate and merge pod template label overrides
pub struct OverrideLabelsHook;

#[async_trait]
impl ManifestHook for OverrideLabelsHook {
    fn name(&self) -> &'static str {
        "override-pod-labels"
    }

    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        let Some(labels) = overrides::override_labels_for(ctx.config, ctx.identity) else {
            return Ok(());
        };
        overrides::validate_labels(ctx.identity, labels)?;

        let metadata = manifest
            .spec
            .get_or_insert_with(Default::default)
            .template
            .metadata
            .get_or_insert_with(Default::default);
        let source = metadata.labels.take().unwrap_or_default();
        metadata.labels = Some(merge_labels(&source, labels));
        Ok(())
    }
}

/// Validate and merge argument overrides
pub struct OverrideArgsHook;

#[async_trait]
impl ManifestHook for OverrideArgsHook {
    fn name(&self) -> &'static str {
        "override-args"
    }

    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        let args = overrides::override_args_for(ctx.config, ctx.identity);
        if args.is_empty() {
            return Ok(());
        }
        overrides::validate_args(ctx.identity, &parse_args(args))?;

        if let Some(container) = workload_container_mut(manifest, ctx.identity) {
            merge_container_args(container, args);
        }
        Ok(())
    }
}

/// Validate and merge environment variable overrides
pub struct OverrideEnvHook;

#[async_trait]
impl ManifestHook for OverrideEnvHook {
    fn name(&self) -> &'static str {
        "override-env"
    }

    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        let env = overrides::override_env_for(ctx.config, ctx.identity);
        if env.is_empty() {
            return Ok(());
        }
        overrides::validate_env(ctx.identity, env)?;

        if let Some(container) = workload_container_mut(manifest, ctx.identity) {
            merge_container_env(container, env);
        }
        Ok(())
    }
}

/// Validate resource names and merge quota overrides
pub struct OverrideResourcesHook;

#[async_trait]
impl ManifestHook for OverrideResourcesHook {
    fn name(&self) -> &'static str {
        "override-resources"
    }

    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        let Some(resources) = overrides::override_resources_for(ctx.config, ctx.identity) else {
            return Ok(());
        };
        if resources.is_empty() {
            return Ok(());
        }
        overrides::validate_resource_names(ctx.identity, resources)?;

        if let Some(container) = workload_container_mut(manifest, ctx.identity) {
            let source = container.resources.take().unwrap_or_default();
            container.resources = Some(merge_resources(&source, resources));
        }
        Ok(())
    }
}

/// Merge node selector and toleration overrides
pub struct OverrideSchedulingHook;

#[async_trait]
impl ManifestHook for OverrideSchedulingHook {
    fn name(&self) -> &'static str {
        "override-scheduling"
    }

    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        let Some(scheduling) = overrides::override_scheduling_for(ctx.config, ctx.identity) else {
            return Ok(());
        };
        if scheduling.is_empty() {
            return Ok(());
        }

        let pod = pod_spec_mut(manifest);
        let source = SchedulingConfig {
            node_selector: pod.node_selector.take().unwrap_or_default(),
            tolerations: pod.tolerations.take().unwrap_or_default(),
        };
        let merged = merge_scheduling(&source, scheduling);

        pod.node_selector = (!merged.node_selector.is_empty()).then_some(merged.node_selector);
        pod.tolerations = (!merged.tolerations.is_empty()).then_some(merged.tolerations);
        Ok(())
    }
}

/// Apply a replica count override
pub struct OverrideReplicasHook;

#[async_trait]
impl ManifestHook for OverrideReplicasHook {
    fn name(&self) -> &'static str {
        "override-replicas"
    }

    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        if let Some(replicas) = overrides::override_replicas_for(ctx.config, ctx.identity) {
            manifest.spec.get_or_insert_with(Default::default).replicas = Some(replicas);
        }
        Ok(())
    }
}

/// Apply the unvalidated override escape hatch
///
/// Runs after every validated hook, so an unsupported override can
/// re-override an argument a validated hook already set.
pub struct UnsupportedOverridesHook;

#[async_trait]
impl ManifestHook for UnsupportedOverridesHook {
    fn name(&self) -> &'static str {
        "inject-unsupported-overrides"
    }

    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        let Some(payload) = &ctx.config.unsupported_config_overrides else {
            return Ok(());
        };
        let decoded: UnsupportedConfigOverrides = serde_json::from_value(payload.clone())
            .map_err(|e| {
                Error::serialization(format!("invalid unsupportedConfigOverrides payload: {e}"))
            })?;

        let for_workload = match ctx.identity {
            WorkloadIdentity::Controller => decoded.controller,
            WorkloadIdentity::Webhook => decoded.webhook,
            WorkloadIdentity::CaInjector => decoded.ca_injector,
        };
        let Some(raw) = for_workload else {
            return Ok(());
        };

        // Only the container matching the workload's manifest name is
        // touched; sidecars injected by other controllers are left alone.
        if let Some(container) = workload_container_mut(manifest, ctx.identity) {
            if !raw.args.is_empty() {
                merge_container_args(container, &raw.args);
            }
            if !raw.env.is_empty() {
                merge_container_env(container, &raw.env);
            }
        }
        Ok(())
    }
}

/// Copy the operator's proxy environment into every container
pub struct ProxyEnvHook;

#[async_trait]
impl ManifestHook for ProxyEnvHook {
    fn name(&self) -> &'static str {
        "inject-proxy-env"
    }

    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        let proxy_env: Vec<EnvVar> = PROXY_ENV_VARS
            .iter()
            .filter_map(|name| {
                ctx.env
                    .read_env(name)
                    .filter(|value| !value.is_empty())
                    .map(|value| EnvVar {
                        name: name.to_string(),
                        value: Some(value),
                        ..Default::default()
                    })
            })
            .collect();
        if proxy_env.is_empty() {
            return Ok(());
        }

        for container in &mut pod_spec_mut(manifest).containers {
            merge_container_env(container, &proxy_env);
        }
        Ok(())
    }
}

/// Mount the trusted CA bundle config map when it exists
pub struct TrustedCaHook;

#[async_trait]
impl ManifestHook for TrustedCaHook {
    fn name(&self) -> &'static str {
        "mount-trusted-ca"
    }

    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        let Some(name) = ctx
            .env
            .read_env(TRUSTED_CA_CONFIGMAP_ENV)
            .filter(|v| !v.is_empty())
        else {
            return Ok(());
        };

        // Existence is checked, not assumed: an absent config map is a
        // no-op, any other read failure aborts the pass.
        match ctx.reader.get_config_map(ctx.namespace, &name).await {
            Ok(_) => {}
            Err(Error::ConfigMapNotFound { .. }) => {
                debug!(config_map = %name, "trusted CA config map absent, skipping mount");
                return Ok(());
            }
            Err(e) => return Err(e),
        }

        let pod = pod_spec_mut(manifest);
        push_volume(
            pod,
            Volume {
                name: TRUSTED_CA_VOLUME.to_string(),
                config_map: Some(ConfigMapVolumeSource {
                    name,
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        for container in &mut pod.containers {
            push_mount(
                container,
                VolumeMount {
                    name: TRUSTED_CA_VOLUME.to_string(),
                    mount_path: TRUSTED_CA_MOUNT_PATH.to_string(),
                    sub_path: Some(TRUSTED_CA_BUNDLE_KEY.to_string()),
                    read_only: Some(true),
                    ..Default::default()
                },
            );
        }
        Ok(())
    }
}

/// Always mount a projected, time-bounded service account token
pub struct BoundTokenHook;

#[async_trait]
impl ManifestHook for BoundTokenHook {
    fn name(&self) -> &'static str {
        "mount-bound-sa-token"
    }

    async fn apply(
        &self,
        _ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        let pod = pod_spec_mut(manifest);
        push_volume(
            pod,
            Volume {
                name: BOUND_SA_TOKEN_VOLUME.to_string(),
                projected: Some(ProjectedVolumeSource {
                    sources: Some(vec![VolumeProjection {
                        service_account_token: Some(ServiceAccountTokenProjection {
                            path: "token".to_string(),
                            expiration_seconds: Some(BOUND_SA_TOKEN_EXPIRATION_SECONDS),
                            ..Default::default()
                        }),
                        ..Default::default()
                    }]),
                    ..Default::default()
                }),
                ..Default::default()
            },
        );
        for container in &mut pod.containers {
            push_mount(
                container,
                VolumeMount {
                    name: BOUND_SA_TOKEN_VOLUME.to_string(),
                    mount_path: BOUND_SA_TOKEN_DIR.to_string(),
                    read_only: Some(true),
                    ..Default::default()
                },
            );
        }
        Ok(())
    }
}

/// Mount cloud credentials into the controller workload
pub struct CloudCredentialsHook;

#[async_trait]
impl ManifestHook for CloudCredentialsHook {
    fn name(&self) -> &'static str {
        "mount-cloud-credentials"
    }

    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error> {
        // The webhook and CA injector never receive cloud credentials.
        if ctx.identity != WorkloadIdentity::Controller {
            return Ok(());
        }
        let Some(secret_name) = ctx
            .config
            .cloud_credentials_secret
            .as_deref()
            .filter(|n| !n.is_empty())
        else {
            return Ok(());
        };

        let secret = ctx.reader.get_secret(ctx.namespace, secret_name).await?;
        let resolved = credentials::resolve(ctx.platform, &secret)?;

        let pod = pod_spec_mut(manifest);
        if let Some(volume) = resolved.volume {
            push_volume(pod, volume);
        }
        if let Some(container) = workload_container_mut(manifest, ctx.identity) {
            if let Some(mount) = resolved.mount {
                push_mount(container, mount);
            }
            if !resolved.env.is_empty() {
                merge_container_env(container, &resolved.env);
            }
        }
        Ok(())
    }
}
