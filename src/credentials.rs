//! Cloud credential injection strategy
//!
//! Resolves a platform type plus a named secret into the volume, volume
//! mount, and environment variables the controller workload needs to reach
//! its cloud DNS APIs. Each platform has a fixed strategy:
//!
//! - AWS: mount the whole secret and tell the SDK to read it
//! - GCP: project a single key to the well-known ADC path
//! - Azure: no volume at all; credentials travel as environment variables
//!
//! Only the controller workload ever receives credentials, and only when a
//! secret name is configured; both rules are enforced by the pipeline hook
//! that consults this module.

use k8s_openapi::api::core::v1::{
    EnvVar, KeyToPath, Secret, SecretVolumeSource, Volume, VolumeMount,
};

use crate::error::Error;

/// Volume name used for mounted cloud credentials
pub const CLOUD_CREDENTIALS_VOLUME: &str = "cloud-credentials";

/// Directory the AWS credentials secret is mounted at
pub const AWS_CREDENTIALS_DIR: &str = "/.aws";

/// Secret key holding the GCP service account JSON
pub const GCP_CREDENTIALS_KEY: &str = "service_account.json";

/// Directory the GCP credentials file is projected into
pub const GCP_CREDENTIALS_DIR: &str = "/.config/gcloud";

/// Filename the GCP key is re-pathed to (the SDK's ADC location)
pub const GCP_CREDENTIALS_FILENAME: &str = "application_default_credentials.json";

/// Required Azure secret keys, paired with the env var each feeds
const AZURE_REQUIRED_KEYS: &[(&str, &str)] = &[
    ("azure_client_id", "AZURE_CLIENT_ID"),
    ("azure_client_secret", "AZURE_CLIENT_SECRET"),
    ("azure_tenant_id", "AZURE_TENANT_ID"),
];

/// Optional Azure region key and its env var
const AZURE_REGION_KEY: (&str, &str) = ("azure_region", "AZURE_REGION");

/// Cloud platform hosting the cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlatformType {
    /// Amazon Web Services
    Aws,
    /// Google Cloud Platform
    Gcp,
    /// Microsoft Azure
    Azure,
    /// A platform with no credential strategy (carries the raw name)
    Unsupported(String),
}

impl PlatformType {
    /// Parse a platform name; unknown names become [`PlatformType::Unsupported`]
    ///
    /// Parsing never fails: whether a platform is supported is decided at
    /// resolution time, where it is a terminal error, not at config-read
    /// time.
    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "aws" => Self::Aws,
            "gcp" => Self::Gcp,
            "azure" => Self::Azure,
            _ => Self::Unsupported(s.to_string()),
        }
    }
}

impl std::fmt::Display for PlatformType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Aws => write!(f, "aws"),
            Self::Gcp => write!(f, "gcp"),
            Self::Azure => write!(f, "azure"),
            Self::Unsupported(name) => write!(f, "{name}"),
        }
    }
}

/// Resolved credential material for one workload container
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CredentialMount {
    /// Volume to add to the pod, if the platform mounts files
    pub volume: Option<Volume>,
    /// Matching container mount, if the platform mounts files
    pub mount: Option<VolumeMount>,
    /// Environment variables to merge into the container
    pub env: Vec<EnvVar>,
}

fn literal_env(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        ..Default::default()
    }
}

fn secret_volume(secret_name: &str, items: Option<Vec<KeyToPath>>) -> Volume {
    Volume {
        name: CLOUD_CREDENTIALS_VOLUME.to_string(),
        secret: Some(SecretVolumeSource {
            secret_name: Some(secret_name.to_string()),
            items,
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn read_only_mount(mount_path: &str) -> VolumeMount {
    VolumeMount {
        name: CLOUD_CREDENTIALS_VOLUME.to_string(),
        mount_path: mount_path.to_string(),
        read_only: Some(true),
        ..Default::default()
    }
}

/// Resolve credential material for a platform from the named secret
///
/// The secret has already been fetched (existence is the caller's
/// precondition; a missing secret surfaces as the retryable
/// `SecretNotFound` upstream). Azure additionally requires three named keys
/// in the secret's data and fails with a terminal missing-credential-key
/// error when any is absent; AWS and GCP have no key precondition.
pub fn resolve(platform: &PlatformType, secret: &Secret) -> Result<CredentialMount, Error> {
    let secret_name = secret.metadata.name.as_deref().unwrap_or_default();

    match platform {
        PlatformType::Aws => Ok(CredentialMount {
            volume: Some(secret_volume(secret_name, None)),
            mount: Some(read_only_mount(AWS_CREDENTIALS_DIR)),
            // Without this the SDK only honors environment credentials and
            // ignores the mounted credentials/config file.
            env: vec![literal_env("AWS_SDK_LOAD_CONFIG", "1")],
        }),
        PlatformType::Gcp => Ok(CredentialMount {
            volume: Some(secret_volume(
                secret_name,
                Some(vec![KeyToPath {
                    key: GCP_CREDENTIALS_KEY.to_string(),
                    path: GCP_CREDENTIALS_FILENAME.to_string(),
                    ..Default::default()
                }]),
            )),
            mount: Some(read_only_mount(GCP_CREDENTIALS_DIR)),
            env: vec![],
        }),
        PlatformType::Azure => {
            let data = secret.data.clone().unwrap_or_default();
            let mut env = Vec::with_capacity(AZURE_REQUIRED_KEYS.len() + 1);

            for (key, var) in AZURE_REQUIRED_KEYS {
                let bytes = data
                    .get(*key)
                    .ok_or_else(|| Error::missing_credential_key(secret_name, *key))?;
                env.push(literal_env(var, String::from_utf8_lossy(&bytes.0)));
            }

            let (region_key, region_var) = AZURE_REGION_KEY;
            if let Some(bytes) = data.get(region_key) {
                env.push(literal_env(region_var, String::from_utf8_lossy(&bytes.0)));
            }

            Ok(CredentialMount {
                volume: None,
                mount: None,
                env,
            })
        }
        PlatformType::Unsupported(name) => Err(Error::UnsupportedCloudProvider(name.clone())),
    }
}
