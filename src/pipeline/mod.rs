//! Manifest hook pipeline
//!
//! The pipeline is an ordered chain of transformation hooks applied to one
//! mutable Deployment manifest per reconcile pass. Order is fixed at
//! construction and significant: each hook depends on the manifest state
//! left by the previous one (validation must see pre-merge override state,
//! merges must see post-validation confirmed-safe keys). The first hook
//! error aborts the chain; the manifest clone is discarded, so a failed
//! pass can never leak a partially transformed manifest to the apply step.
//!
//! Process-environment reads (image override table, proxy injection) and
//! secret/config-map reads go through the injected [`EnvLookup`] and
//! [`ResourceReader`] capabilities rather than ambient globals, so tests
//! substitute deterministic values.

mod hooks;

pub use hooks::{
    BoundTokenHook, CloudCredentialsHook, ImageOverrideHook, LogLevelHook, OverrideArgsHook,
    OverrideEnvHook, OverrideLabelsHook, OverrideReplicasHook, OverrideResourcesHook,
    OverrideSchedulingHook, ProxyEnvHook, TrustedCaHook, UnsupportedOverridesHook,
    TRUSTED_CA_CONFIGMAP_ENV,
};

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Secret};
use kube::{Api, Client};
use tracing::{debug, instrument};

#[cfg(test)]
use mockall::automock;

use crate::crd::CertManagerSpec;
use crate::credentials::PlatformType;
use crate::error::Error;
use crate::workload::WorkloadIdentity;

/// Injected process-environment lookup
///
/// The image override table and proxy injection read operator-process
/// environment variables. Reading them through this capability instead of
/// `std::env` keeps the pipeline deterministic under test.
#[cfg_attr(test, automock)]
pub trait EnvLookup: Send + Sync {
    /// Read an environment variable; `None` when unset
    fn read_env(&self, name: &str) -> Option<String>;
}

/// [`EnvLookup`] backed by the real process environment
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn read_env(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

/// Cached secret and config-map reads consumed by the pipeline
///
/// Served from the informer cache in production, so calls are low-latency
/// and non-blocking, but can still fail not-found. Not-found maps to the
/// retryable [`Error::SecretNotFound`] / [`Error::ConfigMapNotFound`] so
/// the reconcile loop can distinguish it from terminal configuration
/// errors.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ResourceReader: Send + Sync {
    /// Fetch a secret by namespace and name
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, Error>;

    /// Fetch a config map by namespace and name
    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, Error>;
}

/// [`ResourceReader`] backed by the Kubernetes API
pub struct KubeResourceReader {
    client: Client,
}

impl KubeResourceReader {
    /// Create a reader using the given client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ResourceReader for KubeResourceReader {
    async fn get_secret(&self, namespace: &str, name: &str) -> Result<Secret, Error> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(secret) => Ok(secret),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::SecretNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> Result<ConfigMap, Error> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(config_map) => Ok(config_map),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Err(Error::ConfigMapNotFound {
                namespace: namespace.to_string(),
                name: name.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Read-only inputs shared by every hook in one pipeline pass
pub struct PipelineContext<'a> {
    /// Workload the manifest belongs to
    pub identity: WorkloadIdentity,
    /// Snapshot of the singleton configuration spec
    pub config: &'a CertManagerSpec,
    /// Cloud platform hosting the cluster
    pub platform: &'a PlatformType,
    /// Namespace for secret and config-map lookups
    pub namespace: &'a str,
    /// Injected process-environment lookup
    pub env: &'a dyn EnvLookup,
    /// Injected secret/config-map reader
    pub reader: &'a dyn ResourceReader,
}

/// One manifest-transforming step in the pipeline
#[async_trait]
pub trait ManifestHook: Send + Sync {
    /// Hook name for tracing
    fn name(&self) -> &'static str;

    /// Apply this hook's transformation to the manifest
    async fn apply(
        &self,
        ctx: &PipelineContext<'_>,
        manifest: &mut Deployment,
    ) -> Result<(), Error>;
}

/// The ordered manifest transformation chain
///
/// Hooks are bound once at construction in their required order; there is
/// no dynamic reordering and no conditional skipping beyond each hook's own
/// documented no-op rules.
pub struct Pipeline {
    hooks: Vec<Box<dyn ManifestHook>>,
}

impl Pipeline {
    /// Build the standard hook chain
    pub fn new() -> Self {
        Self {
            hooks: vec![
                Box::new(ImageOverrideHook),
                Box::new(LogLevelHook),
                Box::new(OverrideLabelsHook),
                Box::new(OverrideArgsHook),
                Box::new(OverrideEnvHook),
                Box::new(OverrideResourcesHook),
                Box::new(OverrideSchedulingHook),
                Box::new(OverrideReplicasHook),
                Box::new(UnsupportedOverridesHook),
                Box::new(ProxyEnvHook),
                Box::new(TrustedCaHook),
                Box::new(BoundTokenHook),
                Box::new(CloudCredentialsHook),
            ],
        }
    }

    /// Run every hook in order against a fresh copy of the base manifest
    ///
    /// The base is never mutated. On the first hook error the copy is
    /// dropped and the error propagates unchanged; the pipeline adds no
    /// error kinds of its own.
    #[instrument(skip(self, ctx, base), fields(workload = %ctx.identity))]
    pub async fn run(
        &self,
        ctx: &PipelineContext<'_>,
        base: &Deployment,
    ) -> Result<Deployment, Error> {
        let mut manifest = base.clone();
        for hook in &self.hooks {
            debug!(hook = hook.name(), "applying manifest hook");
            hook.apply(ctx, &mut manifest).await?;
        }
        Ok(manifest)
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}
