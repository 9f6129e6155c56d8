//! Integration tests for synthesizing a composed project to disk

mod common;

use pretty_assertions::assert_eq;
use serde_json::Value;
use stacksmith::stacks::StackKind;
use stacksmith::template::synth::MANIFEST_FILE;
use stacksmith::template::Synthesizer;
use std::path::Path;
use tempfile::tempdir;

fn read_json(path: &Path) -> Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_writes_one_template_per_stack() {
    let dir = tempdir().unwrap();
    let graph = common::compose(&common::shop_config());

    let written = Synthesizer::new(dir.path().join("cdk.out"))
        .write(&graph)
        .unwrap();

    assert_eq!(written.len(), graph.stacks.len() + 1);
    for stack in &graph.stacks {
        let path = dir
            .path()
            .join("cdk.out")
            .join(format!("{}.template.json", stack.id));
        assert!(path.exists(), "missing {}", path.display());
        assert_eq!(read_json(&path), stack.to_template());
    }
    assert!(written.last().unwrap().ends_with(MANIFEST_FILE));
}

#[test]
fn test_manifest_lists_stacks_in_order() {
    let dir = tempdir().unwrap();
    let graph = common::compose(&common::shop_config());
    Synthesizer::new(dir.path()).write(&graph).unwrap();

    let manifest = read_json(&dir.path().join(MANIFEST_FILE));
    let ids: Vec<&str> = manifest["stacks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, graph.order());
    assert_eq!(ids[0], "shop-dev-vpc");
    assert_eq!(*ids.last().unwrap(), "shop-dev-rds");
}

#[test]
fn test_manifest_dependencies() {
    let dir = tempdir().unwrap();
    let graph = common::compose(&common::shop_config());
    Synthesizer::new(dir.path()).write(&graph).unwrap();

    let manifest = read_json(&dir.path().join(MANIFEST_FILE));
    let rds = manifest["stacks"]
        .as_array()
        .unwrap()
        .iter()
        .find(|s| s["kind"] == "database")
        .unwrap();
    let deps: Vec<&str> = rds["dependencies"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d.as_str().unwrap())
        .collect();
    for id in ["shop-dev-vpc", "shop-dev-ec2", "shop-dev-s3"] {
        assert!(deps.contains(&id), "rds does not depend on {}", id);
    }

    let vpc = &manifest["stacks"][0];
    assert_eq!(vpc["dependencies"], serde_json::json!([]));
    assert_eq!(vpc["category"], StackKind::Network.category());
    assert!(vpc["exports"]
        .as_array()
        .unwrap()
        .iter()
        .any(|e| e == "ShopDevVpc"));
}

#[test]
fn test_template_contents() {
    let dir = tempdir().unwrap();
    let graph = common::compose(&common::shop_config());
    Synthesizer::new(dir.path()).write(&graph).unwrap();

    let ec2 = read_json(&dir.path().join("shop-dev-ec2.template.json"));
    assert_eq!(ec2["AWSTemplateFormatVersion"], "2010-09-09");
    assert_eq!(ec2["Resources"]["AppEC2"]["Type"], "AWS::EC2::Instance");
    assert_eq!(
        ec2["Resources"]["AppEC2"]["Properties"]["InstanceType"],
        "t2.xlarge"
    );
    assert_eq!(
        ec2["Outputs"]["OutputAppInstanceId"]["Export"]["Name"],
        "AppInstanceId"
    );
}

#[test]
fn test_rewrite_replaces_templates() {
    let dir = tempdir().unwrap();
    let synth = Synthesizer::new(dir.path());

    let mut config = common::shop_config();
    synth.write(&common::compose(&config)).unwrap();

    config.compute.servers[0].instance_type = "m5.large".to_string();
    synth.write(&common::compose(&config)).unwrap();

    let ec2 = read_json(&dir.path().join("shop-dev-ec2.template.json"));
    assert_eq!(
        ec2["Resources"]["AppEC2"]["Properties"]["InstanceType"],
        "m5.large"
    );
}
