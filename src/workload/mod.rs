//! Managed workload identities and base manifest templates
//!
//! The operator manages exactly three workloads, each deployed from a
//! versioned base manifest template embedded in the binary:
//! - `controller` - the cert-manager controller
//! - `webhook` - the admission webhook
//! - `ca-injector` - the CA injector
//!
//! Every reconcile pass starts from a fresh copy of the base manifest; the
//! template itself is never mutated. See [`load_base_manifest`].

mod templates;

pub use templates::load_base_manifest;

use serde::{Deserialize, Serialize};

/// Identity of one of the three managed workloads
///
/// Used as the dispatch key for override accessors, validation allow-lists,
/// and the base manifest template store. Exactly one identity per manifest.
#[derive(Clone, Copy, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum WorkloadIdentity {
    /// The cert-manager controller
    Controller,
    /// The admission webhook
    Webhook,
    /// The CA injector
    CaInjector,
}

impl WorkloadIdentity {
    /// All managed workloads, in deployment order
    pub fn all() -> [WorkloadIdentity; 3] {
        [Self::Controller, Self::Webhook, Self::CaInjector]
    }

    /// Short identity string ("controller", "webhook", "ca-injector")
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Controller => "controller",
            Self::Webhook => "webhook",
            Self::CaInjector => "ca-injector",
        }
    }

    /// Name of the Deployment (and its single container) for this workload
    pub fn deployment_name(&self) -> &'static str {
        match self {
            Self::Controller => "cert-manager",
            Self::Webhook => "cert-manager-webhook",
            Self::CaInjector => "cert-manager-cainjector",
        }
    }
}

impl std::fmt::Display for WorkloadIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
