//! Error types for the cert-manager operator

use thiserror::Error;

/// Main error type for operator operations
///
/// Errors fall into two families that the reconcile loop treats differently:
/// retryable errors (transient cluster state, requeued with backoff) and
/// terminal errors (wrong user configuration, surfaced as a Degraded
/// condition until the configuration object is edited). Use
/// [`Error::is_retryable`] to distinguish them.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// The singleton configuration object could not be retrieved
    #[error("configuration {0:?} not found")]
    ConfigurationNotFound(String),

    /// An override key is not in the workload's allow-list
    #[error("unsupported {kind} override for {workload}: {key:?}")]
    UnsupportedOverrideKey {
        /// Workload the override was addressed to
        workload: String,
        /// Override kind (argument, environment, label, resource)
        kind: &'static str,
        /// The offending key
        key: String,
    },

    /// Cloud credentials were requested for a platform with no strategy
    #[error("unsupported cloud provider: {0}")]
    UnsupportedCloudProvider(String),

    /// A required key is absent from the cloud credentials secret
    #[error("credentials secret {secret:?} is missing required key {key:?}")]
    MissingCredentialKey {
        /// Name of the credentials secret
        secret: String,
        /// The absent key
        key: String,
    },

    /// A referenced secret does not exist
    #[error("secret {namespace}/{name} not found")]
    SecretNotFound {
        /// Namespace the secret was looked up in
        namespace: String,
        /// Secret name
        name: String,
    },

    /// A referenced config map does not exist
    #[error("config map {namespace}/{name} not found")]
    ConfigMapNotFound {
        /// Namespace the config map was looked up in
        namespace: String,
        /// Config map name
        name: String,
    },

    /// A cert-manager installation not managed by this operator exists
    #[error("existing cert-manager installation detected: {0}")]
    ExistingInstallation(String),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Create an unsupported-override error for the given workload and kind
    pub fn unsupported_override(
        workload: impl Into<String>,
        kind: &'static str,
        key: impl Into<String>,
    ) -> Self {
        Self::UnsupportedOverrideKey {
            workload: workload.into(),
            kind,
            key: key.into(),
        }
    }

    /// Create a missing-credential-key error
    pub fn missing_credential_key(secret: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingCredentialKey {
            secret: secret.into(),
            key: key.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Whether the reconcile loop should requeue and retry this error
    ///
    /// Retryable errors reflect transient cluster state (an object not yet
    /// visible in the cache, an API hiccup). Terminal errors reflect the
    /// current configuration state and will not resolve until the user edits
    /// the configuration object or the referenced secret.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Kube(_)
            | Self::ConfigurationNotFound(_)
            | Self::SecretNotFound { .. }
            | Self::ConfigMapNotFound { .. } => true,
            Self::UnsupportedOverrideKey { .. }
            | Self::UnsupportedCloudProvider(_)
            | Self::MissingCredentialKey { .. }
            | Self::ExistingInstallation(_)
            | Self::Serialization(_) => false,
        }
    }
}
