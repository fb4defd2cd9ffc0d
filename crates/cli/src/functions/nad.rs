//! `nad`: renders network attachment definitions.
//!
//! A definition is generated once the cluster context and the interface's
//! IP allocation are ready; its CNI config carries the master interface and
//! the allocated prefix and gateway.

use super::{
    SiteContext, CLUSTER_CONTEXT_API_VERSION, CLUSTER_CONTEXT_KIND, IP_ALLOCATION_API_VERSION,
    IP_ALLOCATION_KIND, NAD_API_VERSION, NAD_KIND,
};
use anyhow::{bail, Result};
use reconcile_core::{Engine, EngineConfig, RoleConfig};
use reconcile_document::Document;
use serde::Serialize;
use serde_json::{json, Value};
use std::cell::RefCell;
use std::rc::Rc;

pub const CNI_VERSION: &str = "0.3.1";

pub fn engine(config: EngineConfig) -> reconcile_core::Result<Engine> {
    let site = Rc::new(RefCell::new(SiteContext::default()));
    let watched = Rc::clone(&site);
    let generating = Rc::clone(&site);

    let roles = RoleConfig::for_kind(NAD_API_VERSION, NAD_KIND)
        .watches_with(CLUSTER_CONTEXT_API_VERSION, CLUSTER_CONTEXT_KIND, move |document| {
            capture_site(&watched, document)
        })
        .watches(IP_ALLOCATION_API_VERSION, IP_ALLOCATION_KIND)
        .generate(move |existing, dependencies| {
            generate(&generating.borrow(), existing, dependencies)
        });
    Engine::new(roles, config)
}

fn capture_site(site: &RefCell<SiteContext>, cluster_context: &Document) -> Result<()> {
    let captured = SiteContext::from_cluster_context(cluster_context);
    let name = cluster_context.name();
    if captured.master_interface.is_empty() {
        bail!("ClusterContext {name}: spec.cniConfig.masterInterface cannot be empty");
    }
    if captured.cni_type.is_empty() {
        bail!("ClusterContext {name}: spec.cniConfig.cniType cannot be empty");
    }
    if captured.site_code.is_empty() {
        bail!("ClusterContext {name}: spec.siteCode cannot be empty");
    }
    *site.borrow_mut() = captured;
    Ok(())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CniConfig<'a> {
    cni_version: &'a str,
    plugins: Vec<CniPlugin<'a>>,
}

#[derive(Debug, Serialize)]
struct CniPlugin<'a> {
    #[serde(rename = "type")]
    plugin_type: &'a str,
    master: &'a str,
    mode: &'a str,
    ipam: CniIpam<'a>,
}

#[derive(Debug, Serialize)]
struct CniIpam<'a> {
    #[serde(rename = "type")]
    ipam_type: &'a str,
    addresses: Vec<CniAddress<'a>>,
}

#[derive(Debug, Serialize)]
struct CniAddress<'a> {
    address: &'a str,
    gateway: &'a str,
}

/// Build the definition from the watched IP allocations.
///
/// Named after the existing definition, or after the first dependency when
/// the definition does not exist yet.
pub fn generate(
    site: &SiteContext,
    existing: Option<&Document>,
    dependencies: &[Document],
) -> Result<Document> {
    let Some(first) = dependencies.first() else {
        bail!("expected at least one dependency to generate the network attachment");
    };
    // Unset when the package carries no ClusterContext
    if site.cni_type.is_empty() {
        bail!("no ClusterContext provided spec.cniConfig.cniType");
    }
    if site.master_interface.is_empty() {
        bail!("no ClusterContext provided spec.cniConfig.masterInterface");
    }
    let name = existing.map_or_else(|| first.name(), Document::name);

    let addresses = dependencies
        .iter()
        .filter(|document| {
            document.api_version() == IP_ALLOCATION_API_VERSION
                && document.kind() == IP_ALLOCATION_KIND
        })
        .map(|allocation| CniAddress {
            address: allocation.get_str(&["status", "prefix"]).unwrap_or_default(),
            gateway: allocation.get_str(&["status", "gateway"]).unwrap_or_default(),
        })
        .collect();

    let config = CniConfig {
        cni_version: CNI_VERSION,
        plugins: vec![CniPlugin {
            plugin_type: &site.cni_type,
            master: &site.master_interface,
            mode: "bridge",
            ipam: CniIpam {
                ipam_type: "static",
                addresses,
            },
        }],
    };

    let mut attachment = Document::new(NAD_API_VERSION, NAD_KIND, name);
    attachment.set(
        &["spec"],
        json!({"config": serde_json::to_string(&config)?}),
    )?;
    Ok(attachment)
}

/// Parsed `spec.config` of a definition, if any
pub fn cni_config(attachment: &Document) -> Option<Value> {
    let raw = attachment.get_str(&["spec", "config"])?;
    serde_json::from_str(raw).ok()
}
