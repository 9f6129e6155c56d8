//! Integration tests for the Stacksmith configuration system
//!
//! These tests verify:
//! - Loading configuration from YAML, TOML, and JSON files
//! - Defaults filling in whatever a file leaves out
//! - Environment variable overrides
//! - Validation of malformed configuration

mod common;

use chrono::NaiveDate;
use common::{write_file, FULL_YAML};
use pretty_assertions::assert_eq;
use serial_test::serial;
use stacksmith::config::{Config, CONFIG_ENV};
use stacksmith::stacks::{Partition, StackKind, SubnetTier};
use stacksmith::template::DeletionPolicy;
use stacksmith::Error;
use tempfile::tempdir;

const ENV_VARS: &[&str] = &[
    CONFIG_ENV,
    "STACKSMITH_REGION",
    "AWS_REGION",
    "AWS_DEFAULT_REGION",
    "STACKSMITH_ACCOUNT",
    "CDK_DEFAULT_ACCOUNT",
    "STACKSMITH_ENVIRONMENT",
];

fn clear_env() {
    for var in ENV_VARS {
        std::env::remove_var(var);
    }
}

// ============================================================================
// File formats
// ============================================================================

#[test]
#[serial]
fn test_load_yaml() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "stacksmith.yml", FULL_YAML);

    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.project_name().unwrap(), "shop");
    assert_eq!(config.environment_name().unwrap(), "dev");
    assert_eq!(config.region.as_deref(), Some("ap-southeast-2"));
    assert_eq!(config.account.as_deref(), Some("123456789012"));
    assert_eq!(config.network.cidr, "10.20.0.0/16");
    assert_eq!(config.compute.servers.len(), 2);
    assert_eq!(config.compute.servers[1].instance_type, "m5.2xlarge");
    assert_eq!(config.database.max_storage, Some(400));
    assert_eq!(config.tags.get("cost-center"), Some(&None));
    config.validate().unwrap();
}

#[test]
fn test_defaults_fill_missing_sections() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "stacksmith.yml",
        "project: shop\nenvironment: dev\nnetwork:\n  max_azs: 3\n",
    );

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.network.max_azs, 3);
    assert_eq!(config.network.cidr, "10.0.0.0/16");
    assert_eq!(config.network.tiers, SubnetTier::ALL.to_vec());
    assert_eq!(config.database.port, 1433);
    assert_eq!(config.database.deletion_policy, DeletionPolicy::Snapshot);
    assert_eq!(config.encryption_key.pending_window_days, 30);
    assert_eq!(config.partition, Partition::Aws);
}

#[test]
fn test_load_toml() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "stacksmith.toml",
        r#"
project = "shop"
environment = "prod"
partition = "aws-cn"
stacks = ["network", "compute"]

[tags]
owner = "platform-team"

[database]
deletion_policy = "retain"
"#,
    );

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.environment_name().unwrap(), "prod");
    assert_eq!(config.partition, Partition::AwsCn);
    assert_eq!(config.stacks, Some(vec![StackKind::Network, StackKind::Compute]));
    assert_eq!(config.tags["owner"].as_deref(), Some("platform-team"));
    assert_eq!(config.database.deletion_policy, DeletionPolicy::Retain);
}

#[test]
fn test_load_json() {
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "stacksmith.json",
        r#"{ "project": "shop", "environment": "dev", "object_store": { "bucket_name": "shop-backups" } }"#,
    );

    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.object_store.bucket_name.as_deref(), Some("shop-backups"));
}

#[test]
fn test_empty_document_gives_defaults() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "stacksmith.yml", "{}\n");
    let config = Config::from_file(&path).unwrap();
    assert_eq!(config.compute.servers.len(), 2);
    assert!(matches!(config.project_name(), Err(Error::MissingField(_))));
}

#[test]
fn test_malformed_yaml() {
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "stacksmith.yml", "network: [unclosed");
    assert!(matches!(Config::from_file(&path), Err(Error::YamlParse(_))));
}

#[test]
#[serial]
fn test_missing_explicit_file() {
    clear_env();
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nope.yml");
    match Config::load(Some(&missing)) {
        Err(Error::FileNotFound(path)) => assert_eq!(path, missing),
        other => panic!("expected FileNotFound, got {:?}", other),
    }
}

// ============================================================================
// Environment overrides
// ============================================================================

#[test]
#[serial]
fn test_env_overrides() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "stacksmith.yml", FULL_YAML);

    std::env::set_var("AWS_REGION", "eu-west-1");
    std::env::set_var("CDK_DEFAULT_ACCOUNT", "210987654321");
    std::env::set_var("STACKSMITH_ENVIRONMENT", "staging");
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.region.as_deref(), Some("eu-west-1"));
    assert_eq!(config.account.as_deref(), Some("210987654321"));
    assert_eq!(config.environment_name().unwrap(), "staging");

    // STACKSMITH_REGION wins over the AWS variables
    std::env::set_var("STACKSMITH_REGION", "us-west-2");
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.region.as_deref(), Some("us-west-2"));

    clear_env();
}

#[test]
#[serial]
fn test_empty_env_values_are_ignored() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_file(dir.path(), "stacksmith.yml", FULL_YAML);

    std::env::set_var("STACKSMITH_REGION", "");
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.region.as_deref(), Some("ap-southeast-2"));

    clear_env();
}

#[test]
#[serial]
fn test_config_file_from_env() {
    clear_env();
    let dir = tempdir().unwrap();
    let path = write_file(
        dir.path(),
        "custom.yaml",
        "project: envshop\nenvironment: qa\n",
    );

    std::env::set_var(CONFIG_ENV, &path);
    let config = Config::load(None).unwrap();
    assert_eq!(config.project_name().unwrap(), "envshop");
    assert_eq!(config.environment_name().unwrap(), "qa");

    clear_env();
}

// ============================================================================
// Validation
// ============================================================================

fn valid() -> Config {
    common::shop_config()
}

#[test]
fn test_default_configuration_is_valid() {
    valid().validate().unwrap();
}

#[test]
fn test_unknown_instance_type() {
    let mut config = valid();
    config.compute.servers[0].instance_type = "c5.large".to_string();
    assert!(matches!(config.validate(), Err(Error::UnknownInstanceClass(_))));

    let mut config = valid();
    config.database.instance_type = "m5.huge".to_string();
    assert!(matches!(config.validate(), Err(Error::UnknownInstanceSize(_))));
}

#[test]
fn test_duplicate_server_names() {
    let mut config = valid();
    let copy = config.compute.servers[0].clone();
    config.compute.servers.push(copy);
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidConfig { ref key, .. }) if key == "compute.servers"
    ));
}

#[test]
fn test_server_names_must_form_logical_ids() {
    let mut config = valid();
    config.compute.servers[0].name = "web_1".to_string();
    config.compute.database_client = "web_1".to_string();
    match config.validate() {
        Err(Error::InvalidConfig { ref key, ref message }) => {
            assert_eq!(key, "compute.servers");
            assert!(message.contains("Web_1"), "{}", message);
        }
        other => panic!("expected InvalidConfig, got {:?}", other),
    }

    // Hyphens are dropped from the derived prefix
    let mut config = valid();
    config.compute.servers[0].name = "web-front".to_string();
    config.compute.database_client = "web-front".to_string();
    assert_eq!(config.compute.servers[0].prefix(), "WebFront");
    config.validate().unwrap();

    // An explicit prefix is held to the same rule
    let mut config = valid();
    config.compute.servers[0].logical_prefix = Some("Web-Front".to_string());
    assert!(config.validate().is_err());
}

#[test]
fn test_unknown_database_client() {
    let mut config = valid();
    config.compute.database_client = "web".to_string();
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidConfig { ref key, .. }) if key == "compute.database_client"
    ));
}

#[test]
fn test_max_storage_below_storage() {
    let mut config = valid();
    config.database.max_storage = Some(100);
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidConfig { ref key, .. }) if key == "database.max_storage"
    ));
}

#[test]
fn test_pending_window_bounds() {
    let mut config = valid();
    config.encryption_key.pending_window_days = 3;
    assert!(config.validate().is_err());
    config.encryption_key.pending_window_days = 7;
    assert!(config.validate().is_ok());
}

#[test]
fn test_empty_plan() {
    let mut config = valid();
    config.stacks = Some(vec![]);
    assert!(matches!(
        config.validate(),
        Err(Error::InvalidConfig { ref key, .. }) if key == "stacks"
    ));
}

#[test]
fn test_keypair_name() {
    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let mut config = valid();
    assert_eq!(config.keypair_name(date).unwrap(), "shop-dev-20240301-key");

    config.keypair.name = Some("legacy-key".to_string());
    assert_eq!(config.keypair_name(date).unwrap(), "legacy-key");
}

#[test]
fn test_demo_configuration() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("demos/stacksmith.yml");
    let config = Config::from_file(&path).unwrap();
    config.validate().unwrap();

    assert_eq!(config.database.master_user.name, "admin");
    assert_eq!(
        config.database.master_user.password.dynamic_reference(),
        "{{resolve:secretsmanager:shop-dev-rds-master:SecretString:password::}}"
    );
    assert_eq!(config.compute.servers[1].public_ip_peers.len(), 1);
}
