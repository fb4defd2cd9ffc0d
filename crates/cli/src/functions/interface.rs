//! `interface`: allocates addressing for interface requirements.
//!
//! For every `Interface` it owns an `IPAllocation` (emitted here) and, for
//! interfaces with a CNI type, a `NetworkAttachmentDefinition` that only
//! gets a ledger condition; the `nad` function materializes it. Once both
//! are ready the allocation status is copied onto the interface.

use super::{
    SiteContext, CLUSTER_CONTEXT_API_VERSION, CLUSTER_CONTEXT_KIND, INTERFACE_API_VERSION,
    INTERFACE_KIND, IP_ALLOCATION_API_VERSION, IP_ALLOCATION_KIND, NAD_API_VERSION, NAD_KIND,
    SITE_LABEL,
};
use anyhow::{bail, Result};
use reconcile_core::{Engine, EngineConfig, Materialization, ReferenceKey, RoleConfig};
use reconcile_document::Document;
use serde_json::json;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

pub const PREFIX_KIND_NETWORK: &str = "network";
pub const PREFIX_KIND_LOOPBACK: &str = "loopback";

pub fn engine(config: EngineConfig) -> reconcile_core::Result<Engine> {
    let site = Rc::new(RefCell::new(SiteContext::default()));
    let watched = Rc::clone(&site);
    let populating = Rc::clone(&site);

    let roles = RoleConfig::for_kind(INTERFACE_API_VERSION, INTERFACE_KIND)
        .owns(
            NAD_API_VERSION,
            NAD_KIND,
            Materialization::ConditionOnly,
        )
        .owns(
            IP_ALLOCATION_API_VERSION,
            IP_ALLOCATION_KIND,
            Materialization::Full,
        )
        .watches_with(CLUSTER_CONTEXT_API_VERSION, CLUSTER_CONTEXT_KIND, move |document| {
            capture_site(&watched, document)
        })
        .populate(move |interface| populate(&populating.borrow(), interface))
        .generate(generate);
    Engine::new(roles, config)
}

fn capture_site(site: &RefCell<SiteContext>, cluster_context: &Document) -> Result<()> {
    let captured = SiteContext::from_cluster_context(cluster_context);
    if captured.site_code.is_empty() {
        bail!(
            "ClusterContext {} has no spec.siteCode",
            cluster_context.name()
        );
    }
    *site.borrow_mut() = captured;
    Ok(())
}

/// Network interfaces (with a CNI type) get a network allocation and an
/// attachment; the rest are loopbacks.
pub fn populate(site: &SiteContext, interface: &Document) -> Result<BTreeMap<ReferenceKey, Document>> {
    let name = interface.name();
    if name.is_empty() {
        bail!("Interface has no metadata.name");
    }
    if site.site_code.is_empty() {
        bail!("Interface {name}: no ClusterContext provided spec.siteCode");
    }
    let network_instance = interface
        .get_str(&["spec", "networkInstance", "name"])
        .unwrap_or_default();
    let cni_type = interface.get_str(&["spec", "cniType"]).unwrap_or_default();

    let prefix_kind = if cni_type.is_empty() {
        PREFIX_KIND_LOOPBACK
    } else {
        PREFIX_KIND_NETWORK
    };
    let mut allocation = Document::new(IP_ALLOCATION_API_VERSION, IP_ALLOCATION_KIND, name);
    allocation.set(
        &["spec"],
        json!({
            "kind": prefix_kind,
            "networkInstance": {"name": network_instance},
            "selector": {"matchLabels": {SITE_LABEL: site.site_code}},
        }),
    )?;

    let mut children = BTreeMap::new();
    children.insert(ReferenceKey::of(&allocation), allocation);

    if !cni_type.is_empty() {
        let mut attachment = Document::new(NAD_API_VERSION, NAD_KIND, name);
        attachment.set(&["spec"], json!({}))?;
        children.insert(ReferenceKey::of(&attachment), attachment);
    }
    Ok(children)
}

/// Copy the allocation status of the matching `IPAllocation` onto the
/// interface.
pub fn generate(interface: Option<&Document>, dependencies: &[Document]) -> Result<Document> {
    let Some(interface) = interface else {
        bail!("expected an Interface but got none");
    };
    let mut interface = interface.clone();

    let allocation = dependencies.iter().find(|document| {
        document.api_version() == IP_ALLOCATION_API_VERSION
            && document.kind() == IP_ALLOCATION_KIND
            && document.name() == interface.name()
    });
    if let Some(status) = allocation.and_then(|allocation| allocation.get(&["status"])) {
        interface.set(&["status", "ipAllocationStatus"], status.clone())?;
    }
    Ok(interface)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn interface(name: &str, cni_type: Option<&str>) -> Document {
        let mut document = Document::new(INTERFACE_API_VERSION, INTERFACE_KIND, name);
        document
            .set(&["spec", "networkInstance", "name"], json!("vpc-ran"))
            .unwrap();
        if let Some(cni_type) = cni_type {
            document.set(&["spec", "cniType"], json!(cni_type)).unwrap();
        }
        document
    }

    fn site() -> SiteContext {
        SiteContext {
            site_code: "edge1".to_string(),
            ..SiteContext::default()
        }
    }

    #[test]
    fn test_network_interface_gets_allocation_and_attachment() {
        let children = populate(&site(), &interface("n3", Some("sriov"))).unwrap();
        let kinds: Vec<_> = children.keys().map(|key| key.kind.as_str()).collect();
        assert_eq!(kinds, vec![IP_ALLOCATION_KIND, NAD_KIND]);

        let allocation = &children[&ReferenceKey::new(IP_ALLOCATION_API_VERSION, IP_ALLOCATION_KIND, "n3")];
        assert_eq!(
            allocation.get(&["spec"]),
            Some(&json!({
                "kind": "network",
                "networkInstance": {"name": "vpc-ran"},
                "selector": {"matchLabels": {"nephio.org/site": "edge1"}}
            }))
        );
    }

    #[test]
    fn test_interface_without_cni_is_loopback() {
        let children = populate(&site(), &interface("lo", None)).unwrap();
        assert_eq!(children.len(), 1);
        let allocation = children.values().next().unwrap();
        assert_eq!(allocation.get_str(&["spec", "kind"]), Some(PREFIX_KIND_LOOPBACK));
    }

    #[test]
    fn test_populate_requires_site_code() {
        let err = populate(&SiteContext::default(), &interface("n3", Some("sriov"))).unwrap_err();
        assert!(err.to_string().contains("siteCode"));
    }

    #[test]
    fn test_generate_copies_allocation_status() {
        let mut allocation = Document::new(IP_ALLOCATION_API_VERSION, IP_ALLOCATION_KIND, "n3");
        allocation
            .set(&["status"], json!({"prefix": "10.0.0.3/24", "gateway": "10.0.0.1"}))
            .unwrap();
        let other = Document::new(IP_ALLOCATION_API_VERSION, IP_ALLOCATION_KIND, "n6");

        let generated = generate(Some(&interface("n3", Some("sriov"))), &[other, allocation]).unwrap();
        assert_eq!(
            generated.get_str(&["status", "ipAllocationStatus", "prefix"]),
            Some("10.0.0.3/24")
        );
        assert!(generate(None, &[]).is_err());
    }

    #[test]
    fn test_cluster_context_requires_site_code() {
        let site = RefCell::new(SiteContext::default());
        let empty = Document::new(CLUSTER_CONTEXT_API_VERSION, CLUSTER_CONTEXT_KIND, "edge");
        assert!(capture_site(&site, &empty).is_err());

        let mut cluster = empty.clone();
        cluster.set(&["spec", "siteCode"], json!("edge1")).unwrap();
        capture_site(&site, &cluster).unwrap();
        assert_eq!(site.borrow().site_code, "edge1");
    }
}
