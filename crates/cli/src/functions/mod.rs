//! Built-in reconcile functions.
//!
//! `interface` owns the IP allocation and the network attachment of every
//! interface requirement; `nad` turns an allocated interface into its
//! network attachment definition. Both share the package ledger, which is how
//! one hands work to the other.

pub mod interface;
pub mod nad;

use anyhow::{Context, Result};
use reconcile_core::{Engine, EngineConfig};
use reconcile_document::Document;

pub const CLUSTER_CONTEXT_API_VERSION: &str = "infra.nephio.org/v1alpha1";
pub const CLUSTER_CONTEXT_KIND: &str = "ClusterContext";
pub const INTERFACE_API_VERSION: &str = "req.nephio.org/v1alpha1";
pub const INTERFACE_KIND: &str = "Interface";
pub const IP_ALLOCATION_API_VERSION: &str = "ipam.alloc.nephio.org/v1alpha1";
pub const IP_ALLOCATION_KIND: &str = "IPAllocation";
pub const NAD_API_VERSION: &str = "k8s.cni.cncf.io/v1";
pub const NAD_KIND: &str = "NetworkAttachmentDefinition";

/// Label selecting the site an allocation belongs to
pub const SITE_LABEL: &str = "nephio.org/site";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Interface,
    Nad,
}

impl FunctionKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            FunctionKind::Interface => "interface",
            FunctionKind::Nad => "nad",
        }
    }

    pub fn engine(self, config: EngineConfig) -> Result<Engine> {
        let engine = match self {
            FunctionKind::Interface => interface::engine(config),
            FunctionKind::Nad => nad::engine(config),
        };
        engine.with_context(|| format!("Invalid {} function configuration", self.as_str()))
    }
}

/// Site-level context captured from the cluster context document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SiteContext {
    pub site_code: String,
    pub cni_type: String,
    pub master_interface: String,
}

impl SiteContext {
    /// Read whatever is present; callers decide what is required
    pub fn from_cluster_context(document: &Document) -> Self {
        let field = |path: &[&str]| document.get_str(path).unwrap_or_default().to_string();
        Self {
            site_code: field(&["spec", "siteCode"]),
            cni_type: field(&["spec", "cniConfig", "cniType"]),
            master_interface: field(&["spec", "cniConfig", "masterInterface"]),
        }
    }
}
