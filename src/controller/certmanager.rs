//! CertManager controller implementation
//!
//! Reconciles the singleton CertManager configuration object: for each
//! managed workload, loads the base manifest template, runs the override
//! pipeline against the configuration snapshot, and server-side-applies the
//! result. Terminal pipeline errors become a Degraded condition and wait
//! for a spec change; retryable errors are requeued.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::apps::v1::Deployment;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::controller::Action;
use kube::{Client, ResourceExt};
use tracing::{debug, error, info, instrument, warn};

#[cfg(test)]
use mockall::automock;

use crate::crd::{CertManager, CertManagerSpec, CertManagerStatus, Condition, ConditionStatus};
use crate::credentials::PlatformType;
use crate::pipeline::{
    EnvLookup, KubeResourceReader, Pipeline, PipelineContext, ProcessEnv, ResourceReader,
};
use crate::workload::{load_base_manifest, WorkloadIdentity};
use crate::Error;
use crate::{CONFIGURATION_NAME, MANAGED_BY_LABEL, OPERAND_NAMESPACE, OPERATOR_NAME};

/// Trait abstracting Kubernetes client operations for the controller
///
/// Allows mocking the Kubernetes client in tests while using the real
/// client in production.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait KubeClient: Send + Sync {
    /// Server-side-apply a workload deployment
    async fn apply_deployment(&self, deployment: &Deployment) -> Result<(), Error>;

    /// Fetch a deployment; `None` when it does not exist
    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error>;

    /// Patch the status of the CertManager singleton
    async fn patch_status(&self, name: &str, status: &CertManagerStatus) -> Result<(), Error>;
}

/// Real Kubernetes client implementation
pub struct KubeClientImpl {
    client: Client,
}

impl KubeClientImpl {
    /// Create a new KubeClientImpl wrapping the given kube Client
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl KubeClient for KubeClientImpl {
    async fn apply_deployment(&self, deployment: &Deployment) -> Result<(), Error> {
        let namespace = deployment
            .metadata
            .namespace
            .as_deref()
            .unwrap_or(OPERAND_NAMESPACE);
        let name = deployment.name_any();

        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        api.patch(
            &name,
            &PatchParams::apply(OPERATOR_NAME).force(),
            &Patch::Apply(deployment),
        )
        .await?;

        info!(deployment = %name, namespace = %namespace, "applied workload deployment");
        Ok(())
    }

    async fn get_deployment(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<Deployment>, Error> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), namespace);
        match api.get(name).await {
            Ok(deployment) => Ok(Some(deployment)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn patch_status(&self, name: &str, status: &CertManagerStatus) -> Result<(), Error> {
        let api: Api<CertManager> = Api::all(self.client.clone());

        let status_patch = serde_json::json!({ "status": status });
        api.patch_status(
            name,
            &PatchParams::apply(OPERATOR_NAME),
            &Patch::Merge(&status_patch),
        )
        .await?;

        Ok(())
    }
}

/// Detects cert-manager installations this operator does not own
///
/// Reconciling on top of a helm- or manifest-installed cert-manager would
/// corrupt it, so the guard runs before any manifest is applied.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait InstallGuard: Send + Sync {
    /// Description of an unmanaged installation, or `None` when clear
    async fn detect_unmanaged_install(&self) -> Result<Option<String>, Error>;
}

/// [`InstallGuard`] that inspects the managed-by label on existing
/// workload deployments
pub struct LabelInstallGuard {
    kube: Arc<dyn KubeClient>,
    namespace: String,
}

impl LabelInstallGuard {
    /// Create a guard reading through the given client
    pub fn new(kube: Arc<dyn KubeClient>, namespace: impl Into<String>) -> Self {
        Self {
            kube,
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl InstallGuard for LabelInstallGuard {
    async fn detect_unmanaged_install(&self) -> Result<Option<String>, Error> {
        for identity in WorkloadIdentity::all() {
            let name = identity.deployment_name();
            let Some(existing) = self.kube.get_deployment(&self.namespace, name).await? else {
                continue;
            };
            let managed_by_us = existing
                .metadata
                .labels
                .as_ref()
                .and_then(|l| l.get(MANAGED_BY_LABEL))
                .map(|v| v == OPERATOR_NAME)
                .unwrap_or(false);
            if !managed_by_us {
                return Ok(Some(format!(
                    "deployment {}/{name} exists but is not managed by this operator",
                    self.namespace
                )));
            }
        }
        Ok(None)
    }
}

/// Shared controller context
pub struct Context {
    /// Kubernetes client operations
    pub kube: Arc<dyn KubeClient>,
    /// Existence guard for foreign installations
    pub guard: Arc<dyn InstallGuard>,
    /// Secret/config-map reader handed to the pipeline
    pub reader: Arc<dyn ResourceReader>,
    /// Process-environment lookup handed to the pipeline
    pub env: Arc<dyn EnvLookup>,
    /// Cloud platform hosting the cluster
    pub platform: PlatformType,
    /// Namespace the operands run in
    pub namespace: String,
    /// The manifest transformation chain
    pub pipeline: Pipeline,
}

impl Context {
    /// Start building a context from a Kubernetes client
    pub fn builder(client: Client) -> ContextBuilder {
        ContextBuilder::new(client)
    }
}

/// Builder for [`Context`], with override points for testing
pub struct ContextBuilder {
    client: Client,
    kube: Option<Arc<dyn KubeClient>>,
    guard: Option<Arc<dyn InstallGuard>>,
    reader: Option<Arc<dyn ResourceReader>>,
    env: Option<Arc<dyn EnvLookup>>,
    platform: PlatformType,
    namespace: String,
}

impl ContextBuilder {
    /// Create a builder with production defaults
    pub fn new(client: Client) -> Self {
        Self {
            client,
            kube: None,
            guard: None,
            reader: None,
            env: None,
            platform: PlatformType::Unsupported(String::new()),
            namespace: OPERAND_NAMESPACE.to_string(),
        }
    }

    /// Set the cloud platform
    pub fn platform(mut self, platform: PlatformType) -> Self {
        self.platform = platform;
        self
    }

    /// Set the operand namespace
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    /// Override the Kubernetes client (primarily for testing)
    pub fn kube_client(mut self, kube: Arc<dyn KubeClient>) -> Self {
        self.kube = Some(kube);
        self
    }

    /// Override the install guard (primarily for testing)
    pub fn install_guard(mut self, guard: Arc<dyn InstallGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    /// Override the resource reader (primarily for testing)
    pub fn resource_reader(mut self, reader: Arc<dyn ResourceReader>) -> Self {
        self.reader = Some(reader);
        self
    }

    /// Override the environment lookup (primarily for testing)
    pub fn env_lookup(mut self, env: Arc<dyn EnvLookup>) -> Self {
        self.env = Some(env);
        self
    }

    /// Build the Context
    pub fn build(self) -> Context {
        let kube = self
            .kube
            .unwrap_or_else(|| Arc::new(KubeClientImpl::new(self.client.clone())));
        Context {
            guard: self.guard.unwrap_or_else(|| {
                Arc::new(LabelInstallGuard::new(kube.clone(), self.namespace.clone()))
            }),
            reader: self
                .reader
                .unwrap_or_else(|| Arc::new(KubeResourceReader::new(self.client.clone()))),
            env: self.env.unwrap_or_else(|| Arc::new(ProcessEnv)),
            platform: self.platform,
            namespace: self.namespace,
            pipeline: Pipeline::new(),
            kube,
        }
    }
}

fn ensure_operator_labels(deployment: &mut Deployment) {
    deployment
        .metadata
        .labels
        .get_or_insert_with(Default::default)
        .insert(MANAGED_BY_LABEL.to_string(), OPERATOR_NAME.to_string());
}

/// Reconcile the CertManager singleton
///
/// Runs the override pipeline for each managed workload against a read-only
/// snapshot of the spec and applies the results. Workloads are processed
/// strictly sequentially; the first failure stops the pass.
#[instrument(skip(cm, ctx), fields(name = %cm.name_any()))]
pub async fn reconcile(cm: Arc<CertManager>, ctx: Arc<Context>) -> Result<Action, Error> {
    info!("reconciling cert-manager configuration");

    // Never apply on top of an installation we do not own.
    if let Some(existing) = ctx.guard.detect_unmanaged_install().await? {
        let err = Error::ExistingInstallation(existing);
        warn!(error = %err, "unmanaged cert-manager installation present");
        update_status_degraded(&cm, &ctx, "ExistingInstallation", &err.to_string()).await?;
        return Ok(Action::await_change());
    }

    let snapshot: &CertManagerSpec = &cm.spec;
    for identity in WorkloadIdentity::all() {
        let base = load_base_manifest(identity);
        let pipeline_ctx = PipelineContext {
            identity,
            config: snapshot,
            platform: &ctx.platform,
            namespace: &ctx.namespace,
            env: ctx.env.as_ref(),
            reader: ctx.reader.as_ref(),
        };

        match ctx.pipeline.run(&pipeline_ctx, &base).await {
            Ok(mut manifest) => {
                ensure_operator_labels(&mut manifest);
                ctx.kube.apply_deployment(&manifest).await?;
            }
            Err(e) if e.is_retryable() => {
                debug!(workload = %identity, error = %e, "retryable pipeline failure");
                return Err(e);
            }
            Err(e) => {
                // Terminal for this configuration state: surface it and
                // wait for the user to change the spec.
                warn!(workload = %identity, error = %e, "configuration rejected");
                update_status_degraded(&cm, &ctx, "InvalidConfiguration", &e.to_string()).await?;
                return Ok(Action::await_change());
            }
        }
    }

    update_status_available(&cm, &ctx).await?;
    Ok(Action::requeue(Duration::from_secs(600)))
}

/// Error policy for the controller
///
/// Retryable errors requeue on a short delay; anything terminal that
/// escaped reconcile waits for a spec change.
pub fn error_policy(cm: Arc<CertManager>, error: &Error, _ctx: Arc<Context>) -> Action {
    error!(
        error = %error,
        name = %cm.name_any(),
        "reconciliation failed"
    );

    if error.is_retryable() {
        Action::requeue(Duration::from_secs(10))
    } else {
        Action::await_change()
    }
}

/// Create the default CertManager singleton when absent
///
/// The "not yet created" state of the configuration object is valid; the
/// operator materializes an empty-spec default so users have an object to
/// edit and status to read.
pub async fn ensure_default_configuration(client: &Client) -> Result<(), Error> {
    let api: Api<CertManager> = Api::all(client.clone());
    if api.get_opt(CONFIGURATION_NAME).await?.is_some() {
        return Ok(());
    }

    info!(name = CONFIGURATION_NAME, "creating default configuration");
    let default = CertManager::new(CONFIGURATION_NAME, CertManagerSpec::default());
    match api.create(&PostParams::default(), &default).await {
        Ok(_) => Ok(()),
        // Racing another replica is fine; the object exists either way.
        Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn update_status_available(cm: &CertManager, ctx: &Context) -> Result<(), Error> {
    let status = CertManagerStatus {
        observed_generation: cm.metadata.generation,
        ..Default::default()
    }
    .condition(Condition::new(
        "Available",
        ConditionStatus::True,
        "AsExpected",
        "all managed workloads applied",
    ))
    .condition(Condition::new(
        "Progressing",
        ConditionStatus::False,
        "AsExpected",
        "",
    ))
    .condition(Condition::new(
        "Degraded",
        ConditionStatus::False,
        "AsExpected",
        "",
    ));

    ctx.kube.patch_status(&cm.name_any(), &status).await
}

async fn update_status_degraded(
    cm: &CertManager,
    ctx: &Context,
    reason: &str,
    message: &str,
) -> Result<(), Error> {
    let status = CertManagerStatus {
        observed_generation: cm.metadata.generation,
        ..Default::default()
    }
    .condition(Condition::new(
        "Degraded",
        ConditionStatus::True,
        reason,
        message,
    ));

    ctx.kube.patch_status(&cm.name_any(), &status).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::DeploymentConfig;
    use crate::pipeline::{MockEnvLookup, MockResourceReader};

    fn cert_manager(spec: CertManagerSpec) -> Arc<CertManager> {
        let mut cm = CertManager::new(CONFIGURATION_NAME, spec);
        cm.metadata.generation = Some(1);
        Arc::new(cm)
    }

    fn quiet_env() -> Arc<MockEnvLookup> {
        let mut env = MockEnvLookup::new();
        env.expect_read_env().return_const(None::<String>);
        Arc::new(env)
    }

    fn clear_guard() -> Arc<MockInstallGuard> {
        let mut guard = MockInstallGuard::new();
        guard
            .expect_detect_unmanaged_install()
            .returning(|| Ok(None));
        Arc::new(guard)
    }

    fn test_context(
        kube: MockKubeClient,
        guard: Arc<MockInstallGuard>,
    ) -> Arc<Context> {
        Arc::new(Context {
            kube: Arc::new(kube),
            guard,
            reader: Arc::new(MockResourceReader::new()),
            env: quiet_env(),
            platform: PlatformType::Unsupported("none".to_string()),
            namespace: OPERAND_NAMESPACE.to_string(),
            pipeline: Pipeline::new(),
        })
    }

    // =========================================================================
    // Story: a clean pass applies all three workloads
    // =========================================================================

    #[tokio::test]
    async fn story_happy_path_applies_every_workload() {
        let mut kube = MockKubeClient::new();
        kube.expect_apply_deployment()
            .times(3)
            .withf(|d| {
                d.metadata
                    .labels
                    .as_ref()
                    .and_then(|l| l.get(MANAGED_BY_LABEL))
                    .map(|v| v == OPERATOR_NAME)
                    .unwrap_or(false)
            })
            .returning(|_| Ok(()));
        kube.expect_patch_status()
            .withf(|name, status| {
                name == CONFIGURATION_NAME && status.is_condition_true("Available")
            })
            .returning(|_, _| Ok(()));

        let ctx = test_context(kube, clear_guard());
        let action = reconcile(cert_manager(CertManagerSpec::default()), ctx)
            .await
            .unwrap();
        assert_eq!(action, Action::requeue(Duration::from_secs(600)));
    }

    // =========================================================================
    // Story: terminal configuration errors degrade and wait
    // =========================================================================

    #[tokio::test]
    async fn story_unsupported_override_degrades_without_applying_that_workload() {
        let mut kube = MockKubeClient::new();
        // Controller reconciles first and applies cleanly; the webhook's
        // invalid override stops the pass before the CA injector runs.
        kube.expect_apply_deployment().times(1).returning(|_| Ok(()));
        kube.expect_patch_status()
            .withf(|_, status| status.is_condition_true("Degraded"))
            .returning(|_, _| Ok(()));

        let spec = CertManagerSpec {
            webhook_config: Some(DeploymentConfig {
                override_args: vec!["--unknown-flag=1".to_string()],
                ..Default::default()
            }),
            ..Default::default()
        };

        let ctx = test_context(kube, clear_guard());
        let action = reconcile(cert_manager(spec), ctx).await.unwrap();
        assert_eq!(action, Action::await_change());
    }

    #[tokio::test]
    async fn story_unmanaged_install_blocks_reconciliation() {
        let mut kube = MockKubeClient::new();
        // No apply_deployment expectation: a call would fail the test
        kube.expect_patch_status()
            .withf(|_, status| {
                status
                    .get_condition("Degraded")
                    .map(|c| c.reason == "ExistingInstallation")
                    .unwrap_or(false)
            })
            .returning(|_, _| Ok(()));

        let mut guard = MockInstallGuard::new();
        guard
            .expect_detect_unmanaged_install()
            .returning(|| Ok(Some("deployment cert-manager/cert-manager exists".to_string())));

        let ctx = test_context(kube, Arc::new(guard));
        let action = reconcile(cert_manager(CertManagerSpec::default()), ctx)
            .await
            .unwrap();
        assert_eq!(action, Action::await_change());
    }

    // =========================================================================
    // Story: retryable errors requeue
    // =========================================================================

    #[tokio::test]
    async fn story_retryable_failure_propagates_for_requeue() {
        let mut kube = MockKubeClient::new();
        kube.expect_apply_deployment().returning(|_| Ok(()));

        let spec = CertManagerSpec {
            cloud_credentials_secret: Some("cloud-credentials".to_string()),
            ..Default::default()
        };

        let mut reader = MockResourceReader::new();
        reader.expect_get_secret().returning(|ns, name| {
            Err(Error::SecretNotFound {
                namespace: ns.to_string(),
                name: name.to_string(),
            })
        });

        let ctx = Arc::new(Context {
            kube: Arc::new(kube),
            guard: clear_guard(),
            reader: Arc::new(reader),
            env: quiet_env(),
            platform: PlatformType::Aws,
            namespace: OPERAND_NAMESPACE.to_string(),
            pipeline: Pipeline::new(),
        });

        let cm = cert_manager(spec);
        let err = reconcile(cm.clone(), ctx.clone()).await.unwrap_err();
        assert!(err.is_retryable());

        let action = error_policy(cm, &err, ctx);
        assert_eq!(action, Action::requeue(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn terminal_errors_in_error_policy_await_change() {
        let mut kube = MockKubeClient::new();
        kube.expect_apply_deployment().returning(|_| Ok(()));
        let ctx = test_context(kube, clear_guard());

        let err = Error::UnsupportedCloudProvider("openstack".to_string());
        let action = error_policy(cert_manager(CertManagerSpec::default()), &err, ctx);
        assert_eq!(action, Action::await_change());
    }

    // =========================================================================
    // Install guard
    // =========================================================================

    #[tokio::test]
    async fn guard_passes_when_no_deployments_exist() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_deployment().returning(|_, _| Ok(None));

        let guard = LabelInstallGuard::new(Arc::new(kube), OPERAND_NAMESPACE);
        assert!(guard.detect_unmanaged_install().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn guard_flags_deployments_missing_our_label() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_deployment().returning(|_, name| {
            if name == "cert-manager" {
                Ok(Some(Deployment::default()))
            } else {
                Ok(None)
            }
        });

        let guard = LabelInstallGuard::new(Arc::new(kube), OPERAND_NAMESPACE);
        let detected = guard.detect_unmanaged_install().await.unwrap();
        assert!(detected.unwrap().contains("cert-manager"));
    }

    #[tokio::test]
    async fn guard_accepts_our_own_deployments() {
        let mut kube = MockKubeClient::new();
        kube.expect_get_deployment().returning(|_, _| {
            let mut deployment = Deployment::default();
            ensure_operator_labels(&mut deployment);
            Ok(Some(deployment))
        });

        let guard = LabelInstallGuard::new(Arc::new(kube), OPERAND_NAMESPACE);
        assert!(guard.detect_unmanaged_install().await.unwrap().is_none());
    }
}
