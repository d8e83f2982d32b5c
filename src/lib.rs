//! cert-manager-operator - Kubernetes operator for cert-manager workloads
//!
//! The operator reconciles the desired runtime configuration of the three
//! cert-manager workloads (controller, webhook, CA injector) against
//! embedded base manifest templates, layering user-supplied overrides,
//! platform-derived cloud credentials, and environment adjustments, then
//! validating the result before it is applied to the cluster.
//!
//! # Architecture
//!
//! Every reconcile pass clones a base manifest template and pushes it
//! through an ordered chain of transformation hooks (image substitution,
//! log-level injection, validated overrides, credential mounts). Hooks run
//! strictly sequentially; the first error discards the manifest so a failed
//! pass never partially mutates a running workload.
//!
//! # Modules
//!
//! - [`crd`] - CertManager configuration CRD (the singleton users edit)
//! - [`workload`] - Workload identities and base manifest templates
//! - [`merge`] - Argument/env/resource/scheduling merge engines
//! - [`overrides`] - Per-workload override accessors and allow-list validation
//! - [`credentials`] - Cloud credential injection strategy (AWS, GCP, Azure)
//! - [`pipeline`] - The ordered manifest hook chain
//! - [`controller`] - Reconciliation logic and status reporting
//! - [`error`] - Error types and retryability

#![deny(missing_docs)]

pub mod controller;
pub mod crd;
pub mod credentials;
pub mod error;
pub mod merge;
pub mod overrides;
pub mod pipeline;
pub mod workload;

pub use error::Error;

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Field manager and managed-by label value for everything we apply
pub const OPERATOR_NAME: &str = "cert-manager-operator";

/// Namespace the managed workloads run in
pub const OPERAND_NAMESPACE: &str = "cert-manager";

/// Name of the singleton configuration object
pub const CONFIGURATION_NAME: &str = "cluster";

/// Label marking objects owned by this operator
pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Environment variable naming the cloud platform (aws, gcp, azure)
pub const CLOUD_PLATFORM_ENV: &str = "CLOUD_PLATFORM";
