use assert_cmd::Command;
use predicates::prelude::*;
use pretty_assertions::assert_eq;
use reconcile_cli::functions::nad::cni_config;
use reconcile_document::{Document, Package, Severity};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

#[allow(deprecated)]
fn reconcile() -> Command {
    let mut command = Command::cargo_bin("reconcile").expect("binary");
    command.env_remove("RECONCILE_CONFIG").arg("--quiet");
    command
}

fn cluster_context() -> Value {
    json!({
        "apiVersion": "infra.nephio.org/v1alpha1",
        "kind": "ClusterContext",
        "metadata": {"name": "edge"},
        "spec": {
            "siteCode": "edge1",
            "cniConfig": {"cniType": "macvlan", "masterInterface": "bond0"}
        }
    })
}

fn resource_list(items: Vec<Value>) -> String {
    json!({
        "apiVersion": "config.kubernetes.io/v1",
        "kind": "ResourceList",
        "items": items
    })
    .to_string()
}

fn starting_package() -> String {
    resource_list(vec![
        json!({"apiVersion": "kpt.dev/v1", "kind": "Kptfile", "metadata": {"name": "pkg"}}),
        cluster_context(),
        json!({
            "apiVersion": "req.nephio.org/v1alpha1",
            "kind": "Interface",
            "metadata": {"name": "n3"},
            "spec": {"networkInstance": {"name": "vpc-ran"}, "cniType": "macvlan"}
        }),
    ])
}

fn run_function(function: &str, input: &Path) -> (bool, Package) {
    let output = reconcile()
        .args(["run", "--function", function, "--input"])
        .arg(input)
        .output()
        .expect("command run");
    let raw = String::from_utf8(output.stdout).expect("utf8");
    (output.status.success(), Package::from_json(&raw).expect("valid package"))
}

fn find<'a>(package: &'a Package, kind: &str, name: &str) -> Option<&'a Document> {
    package
        .items
        .iter()
        .find(|document| document.kind() == kind && document.name() == name)
}

fn condition_status(package: &Package, condition_type: &str) -> Option<String> {
    find(package, "Kptfile", "pkg")?
        .get(&["status", "conditions"])?
        .as_array()?
        .iter()
        .find(|condition| condition["type"] == condition_type)
        .map(|condition| condition["status"].as_str().unwrap_or_default().to_string())
}

#[test]
fn run_emits_allocation_from_stdin() {
    let output = reconcile()
        .args(["run", "--function", "interface"])
        .write_stdin(starting_package())
        .output()
        .expect("command run");
    assert!(output.status.success());

    let package = Package::from_json(&String::from_utf8(output.stdout).unwrap()).unwrap();
    let allocation = find(&package, "IPAllocation", "n3").expect("allocation");
    assert_eq!(
        allocation.get(&["spec", "selector", "matchLabels"]),
        Some(&json!({"nephio.org/site": "edge1"}))
    );
    assert_eq!(
        condition_status(&package, "ipam.alloc.nephio.org/v1alpha1.IPAllocation.n3").as_deref(),
        Some("False")
    );
    assert_eq!(
        condition_status(&package, "k8s.cni.cncf.io/v1.NetworkAttachmentDefinition.n3").as_deref(),
        Some("False")
    );
    assert!(find(&package, "NetworkAttachmentDefinition", "n3").is_none());
}

#[test]
fn inspect_reports_plan_without_writing() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("package.json");
    fs::write(&input, starting_package()).unwrap();

    let output = reconcile()
        .args(["inspect", "--function", "interface", "--input"])
        .arg(&input)
        .output()
        .expect("command run");
    assert!(output.status.success());

    let plan: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert_eq!(plan["readiness"]["globalReady"], json!(true));
    let changes = plan["changes"]["req.nephio.org/v1alpha1.Interface.n3"]["changes"]
        .as_array()
        .expect("changes for n3");
    assert_eq!(changes.len(), 4);
    assert_eq!(fs::read_to_string(&input).unwrap(), starting_package());
}

#[test]
fn broken_cluster_context_fails_the_run() {
    let temp = tempdir().unwrap();
    let input = temp.path().join("package.json");
    let mut cluster = cluster_context();
    cluster["spec"]["cniConfig"]
        .as_object_mut()
        .unwrap()
        .remove("masterInterface");
    fs::write(&input, resource_list(vec![cluster])).unwrap();

    let (success, package) = run_function("nad", &input);
    assert!(!success);
    let errors: Vec<_> = package
        .results
        .iter()
        .filter(|result| result.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("masterInterface"));
}

#[test]
fn empty_input_is_rejected() {
    reconcile()
        .args(["run", "--function", "interface"])
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Package is empty"));
}

#[test]
fn invalid_config_from_env_is_fatal() {
    let temp = tempdir().unwrap();
    let config = temp.path().join("reconcile.toml");
    fs::write(&config, "owner_annotation = \"\"\n").unwrap();

    reconcile()
        .env("RECONCILE_CONFIG", &config)
        .args(["run", "--function", "interface"])
        .write_stdin(starting_package())
        .assert()
        .failure()
        .stdout(predicate::str::is_empty())
        .stderr(predicate::str::contains("owner_annotation cannot be empty"));
}

#[test]
fn config_flag_names_an_inserted_ledger() {
    let temp = tempdir().unwrap();
    let config = temp.path().join("reconcile.toml");
    fs::write(&config, "[ledger]\nname = \"site\"\n").unwrap();
    let without_ledger = resource_list(vec![
        cluster_context(),
        json!({
            "apiVersion": "req.nephio.org/v1alpha1",
            "kind": "Interface",
            "metadata": {"name": "n3"},
            "spec": {"networkInstance": {"name": "vpc-ran"}}
        }),
    ]);

    let output = reconcile()
        .arg("--config")
        .arg(&config)
        .args(["run", "--function", "interface"])
        .write_stdin(without_ledger)
        .output()
        .expect("command run");
    assert!(output.status.success());

    let package = Package::from_json(&String::from_utf8(output.stdout).unwrap()).unwrap();
    assert_eq!(package.items[0].kind(), "Kptfile");
    assert_eq!(package.items[0].name(), "site");
    assert_eq!(
        package.items[0]
            .get(&["status", "conditions"])
            .and_then(Value::as_array)
            .map(Vec::len),
        Some(1),
        "loopback interfaces own only an allocation"
    );
}

/// Stand in for IPAM: serve the allocation and flip its condition
fn serve_allocation(path: &Path) {
    let mut package = Package::from_json(&fs::read_to_string(path).unwrap()).unwrap();
    for document in &mut package.items {
        if document.kind() == "IPAllocation" {
            document
                .set(&["status"], json!({"prefix": "10.0.0.3/24", "gateway": "10.0.0.1"}))
                .unwrap();
        }
        if document.kind() == "Kptfile" {
            let mut conditions = document.get(&["status", "conditions"]).cloned().unwrap();
            for condition in conditions.as_array_mut().unwrap() {
                if condition["type"] == "ipam.alloc.nephio.org/v1alpha1.IPAllocation.n3" {
                    condition["status"] = json!("True");
                }
            }
            document.set(&["status", "conditions"], conditions).unwrap();
        }
    }
    fs::write(path, package.to_json_pretty().unwrap()).unwrap();
}

fn run_in_place(function: &str, path: &Path) -> Package {
    let (success, package) = run_function(function, path);
    assert!(success, "{function} failed: {:?}", package.results);
    fs::write(path, package.to_json_pretty().unwrap()).unwrap();
    package
}

#[test]
fn interface_and_nad_functions_converge() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("package.json");
    fs::write(&path, starting_package()).unwrap();

    run_in_place("interface", &path);
    serve_allocation(&path);

    let package = run_in_place("nad", &path);
    let attachment = find(&package, "NetworkAttachmentDefinition", "n3").expect("attachment");
    assert_eq!(
        attachment.annotation("fnruntime.nephio.org/owner"),
        Some("req.nephio.org/v1alpha1.Interface.n3")
    );
    let config = cni_config(attachment).expect("cni config");
    assert_eq!(config["plugins"][0]["master"], json!("bond0"));
    assert_eq!(
        config["plugins"][0]["ipam"]["addresses"][0],
        json!({"address": "10.0.0.3/24", "gateway": "10.0.0.1"})
    );
    assert_eq!(
        condition_status(&package, "k8s.cni.cncf.io/v1.NetworkAttachmentDefinition.n3").as_deref(),
        Some("True")
    );

    let package = run_in_place("interface", &path);
    let interface = find(&package, "Interface", "n3").unwrap();
    assert_eq!(
        interface.get_str(&["status", "ipAllocationStatus", "prefix"]),
        Some("10.0.0.3/24")
    );

    // Converged: another round changes nothing
    let before = fs::read_to_string(&path).unwrap();
    run_in_place("interface", &path);
    run_in_place("nad", &path);
    assert_eq!(fs::read_to_string(&path).unwrap(), before);
}

#[test]
fn nad_without_cluster_context_reports_missing_site() {
    let temp = tempdir().unwrap();
    let path = temp.path().join("package.json");
    fs::write(&path, starting_package()).unwrap();
    run_in_place("interface", &path);
    serve_allocation(&path);

    let mut package = Package::from_json(&fs::read_to_string(&path).unwrap()).unwrap();
    package.items.retain(|document| document.kind() != "ClusterContext");
    fs::write(&path, package.to_json_pretty().unwrap()).unwrap();

    let (success, package) = run_function("nad", &path);
    assert!(!success);
    assert!(find(&package, "NetworkAttachmentDefinition", "n3").is_none());
    let errors: Vec<_> = package
        .results
        .iter()
        .filter(|result| result.severity == Severity::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("cniType"));
}

#[test]
fn schema_lists_wire_records() {
    let output = reconcile().arg("schema").output().expect("command run");
    assert!(output.status.success());

    let schemas: Value = serde_json::from_slice(&output.stdout).expect("valid json");
    assert!(schemas["condition"]["properties"].get("type").is_some());
    assert!(schemas["diagnostic"]["properties"].get("severity").is_some());
}
