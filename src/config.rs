//! Configuration module for Stacksmith
//!
//! Handles loading and merging configuration from multiple sources:
//! - Default values
//! - User configuration (~/.config/stacksmith/config.yml)
//! - Project configuration (./stacksmith.yml, ./stacksmith.yaml, ./stacksmith.toml, ./stacksmith.json)
//! - The file named by `STACKSMITH_CONFIG`
//! - Environment variables
//!
//! An explicit path (`--config`) replaces the file search entirely.

use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::naming;
use crate::secrets::MasterUser;
use crate::stacks::access::{InboundRule, PortSpec};
use crate::stacks::network::SubnetTier;
use crate::stacks::{InstanceType, Partition, StackKind};
use crate::template::DeletionPolicy;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "STACKSMITH_CONFIG";

const MSSQL_PORT: u16 = 1433;
const RDP_PORT: u16 = 3389;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project name; falls back to the `project` tag
    pub project: Option<String>,

    /// Environment name; falls back to the `environment` tag
    pub environment: Option<String>,

    /// Deployment region
    pub region: Option<String>,

    /// Deployment account id
    pub account: Option<String>,

    /// AWS partition
    pub partition: Partition,

    /// Tags applied to every resource and to the keypair
    pub tags: IndexMap<String, Option<String>>,

    /// Network stack settings
    pub network: NetworkConfig,

    /// Compute stack settings
    pub compute: ComputeConfig,

    /// Encryption key stack settings
    pub encryption_key: EncryptionKeyConfig,

    /// Database stack settings
    pub database: DatabaseConfig,

    /// Object store stack settings
    pub object_store: ObjectStoreConfig,

    /// Keypair settings
    pub keypair: KeyPairConfig,

    /// Explicit composition plan; the default plan when absent
    pub stacks: Option<Vec<StackKind>>,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            project: None,
            environment: None,
            region: None,
            account: None,
            partition: Partition::default(),
            tags: IndexMap::new(),
            network: NetworkConfig::default(),
            compute: ComputeConfig::default(),
            encryption_key: EncryptionKeyConfig::default(),
            database: DatabaseConfig::default(),
            object_store: ObjectStoreConfig::default(),
            keypair: KeyPairConfig::default(),
            stacks: None,
            logging: LoggingConfig::default(),
        }
    }
}

/// Network settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// VPC CIDR block
    pub cidr: String,

    /// Number of availability zones
    pub max_azs: usize,

    /// Prefix length of every subnet
    pub cidr_mask: u8,

    /// Subnet tiers to declare
    pub tiers: Vec<SubnetTier>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: "10.0.0.0/16".to_string(),
            max_azs: 2,
            cidr_mask: 24,
            tiers: SubnetTier::ALL.to_vec(),
        }
    }
}

/// Compute settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    /// Servers to declare
    pub servers: Vec<ServerConfig>,

    /// Server whose security group is exported for the database
    pub database_client: String,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            servers: vec![ServerConfig::app(), ServerConfig::db()],
            database_client: "app".to_string(),
        }
    }
}

impl ComputeConfig {
    pub fn server(&self, name: &str) -> Option<&ServerConfig> {
        self.servers.iter().find(|s| s.name == name)
    }
}

/// One EC2 server
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Short name (`app`)
    pub name: String,

    /// Logical id prefix; the upper-cased name for names of up to two
    /// letters, else the title-cased name
    pub logical_prefix: Option<String>,

    /// Human description
    pub description: Option<String>,

    /// Instance type (`t2.xlarge`)
    pub instance_type: String,

    /// Image id used when `images` has no entry for the region
    pub image: Option<String>,

    /// Region -> image id
    pub images: IndexMap<String, String>,

    /// Subnet tier
    pub tier: SubnetTier,

    /// Attach an Elastic IP
    pub elastic_ip: bool,

    /// Block devices
    pub volumes: Vec<VolumeConfig>,

    /// CIDR inbound rules
    pub inbounds: Vec<InboundRule>,

    /// Ingress from other servers' security groups
    pub peers: Vec<PeerRule>,

    /// Ingress from other servers' public IPs
    pub public_ip_peers: Vec<PeerRule>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            logical_prefix: None,
            description: None,
            instance_type: "t2.xlarge".to_string(),
            image: None,
            images: IndexMap::new(),
            tier: SubnetTier::Private,
            elastic_ip: false,
            volumes: vec![VolumeConfig::default()],
            inbounds: vec![],
            peers: vec![],
            public_ip_peers: vec![],
        }
    }
}

impl ServerConfig {
    /// The application server: public, with an Elastic IP.
    pub fn app() -> Self {
        Self {
            name: "app".to_string(),
            description: Some("app servers".to_string()),
            image: Some("ami-0b50407ec100af505".to_string()),
            tier: SubnetTier::Public,
            elastic_ip: true,
            ..Self::default()
        }
    }

    /// The database server: private, reachable from the application server.
    pub fn db() -> Self {
        Self {
            name: "db".to_string(),
            description: Some("db servers".to_string()),
            image: Some("ami-0cfa71f4e607f9c31".to_string()),
            tier: SubnetTier::Private,
            peers: vec![
                PeerRule::new("app", PortSpec::port(MSSQL_PORT), "from app servers"),
                PeerRule::new("app", PortSpec::port(RDP_PORT), "from app servers"),
            ],
            public_ip_peers: vec![PeerRule::new(
                "app",
                PortSpec::port(MSSQL_PORT),
                "from app servers",
            )],
            ..Self::default()
        }
    }

    /// Logical id prefix (`App`, `DB`).
    pub fn prefix(&self) -> String {
        match self.logical_prefix {
            Some(ref prefix) => prefix.clone(),
            None if self.name.len() <= 2 => self.name.to_uppercase(),
            None => naming::export_name(&self.name),
        }
    }

    /// Image id for `region`.
    pub fn image_for(&self, region: Option<&str>) -> Option<&str> {
        region
            .and_then(|r| self.images.get(r))
            .or(self.image.as_ref())
            .map(String::as_str)
    }
}

/// Ingress from another server of the same stack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerRule {
    /// Source server name
    pub server: String,
    /// Port(s)
    pub port: PortSpec,
    #[serde(default)]
    pub description: String,
}

impl PeerRule {
    pub fn new(server: impl Into<String>, port: PortSpec, description: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            port,
            description: description.into(),
        }
    }
}

/// An EBS block device
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VolumeConfig {
    pub device_name: String,
    /// Size in GiB
    pub size: u32,
    pub volume_type: String,
    pub encrypted: bool,
    pub delete_on_termination: bool,
}

impl Default for VolumeConfig {
    fn default() -> Self {
        Self {
            device_name: "/dev/sda1".to_string(),
            size: 200,
            volume_type: "gp2".to_string(),
            encrypted: false,
            delete_on_termination: true,
        }
    }
}

/// Encryption key settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncryptionKeyConfig {
    /// Alias name (without `alias/`); `<stack>-key` when absent
    pub name: Option<String>,

    /// Key description
    pub description: String,

    /// Role granted key administration
    pub admin_role: String,

    /// Days before a scheduled deletion takes effect (7-30)
    pub pending_window_days: u32,
}

impl Default for EncryptionKeyConfig {
    fn default() -> Self {
        Self {
            name: None,
            description:
                "this key is used to encrypt and decrypt the database backup for rds sql server"
                    .to_string(),
            admin_role: "ADFS-Admin".to_string(),
            pending_window_days: 30,
        }
    }
}

/// Database settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Instance identifier; the stack id when absent
    pub identifier: Option<String>,
    pub engine: String,
    pub engine_version: String,
    pub license_model: String,
    /// Instance type without the `db.` prefix
    pub instance_type: String,
    pub port: u16,
    /// Allocated storage in GiB
    pub storage: u32,
    /// Storage autoscaling ceiling in GiB
    pub max_storage: Option<u32>,
    pub storage_type: String,
    pub backup_retention_days: u32,
    pub backup_window: String,
    /// Character set (collation)
    pub collation: String,
    pub timezone: String,
    pub cloudwatch_logs_exports: Vec<String>,
    pub master_user: MasterUser,
    pub inbounds: Vec<InboundRule>,
    pub deletion_policy: DeletionPolicy,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            identifier: None,
            engine: "sqlserver-se".to_string(),
            engine_version: "12.00.5571.0.v1".to_string(),
            license_model: "license-included".to_string(),
            instance_type: "m5.xlarge".to_string(),
            port: MSSQL_PORT,
            storage: 200,
            max_storage: None,
            storage_type: "gp2".to_string(),
            backup_retention_days: 7,
            backup_window: "16:00-17:00".to_string(),
            collation: "SQL_Latin1_General_CP1_CI_AS".to_string(),
            timezone: "UTC".to_string(),
            cloudwatch_logs_exports: vec!["error".to_string(), "agent".to_string()],
            master_user: MasterUser::default(),
            inbounds: vec![],
            deletion_policy: DeletionPolicy::Snapshot,
        }
    }
}

/// Object store settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    /// Bucket name; `<project>-<environment>-backup` when absent
    pub bucket_name: Option<String>,
}

/// Keypair settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyPairConfig {
    /// Keypair name; `<project>-<environment>-<YYYYMMDD>-key` when absent
    pub name: Option<String>,

    /// Directory new private keys are written to
    pub dir: PathBuf,
}

impl Default for KeyPairConfig {
    fn default() -> Self {
        Self {
            name: None,
            dir: PathBuf::from("/tmp"),
        }
    }
}

/// Logging settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when neither `-v` nor `RUST_LOG` is given
    pub level: Option<String>,

    /// Emit JSON log lines
    pub json: bool,
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = config_path {
            if !path.exists() {
                return Err(Error::FileNotFound(path.to_path_buf()));
            }
        }

        let mut merged = serde_json::to_value(Config::default())?;
        for path in Self::get_config_paths(config_path) {
            if path.exists() {
                tracing::debug!(path = %path.display(), "loading configuration");
                merge_values(&mut merged, Self::read_value(&path)?);
            }
        }

        let mut config: Config = serde_json::from_value(merged)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Configuration files, lowest precedence first.
    fn get_config_paths(explicit_path: Option<&Path>) -> Vec<PathBuf> {
        // Explicit path replaces the search
        if let Some(path) = explicit_path {
            return vec![path.to_path_buf()];
        }

        let mut paths = Vec::new();

        // User config
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("stacksmith").join("config.yml"));
        }

        // Project config (current directory)
        paths.push(PathBuf::from("stacksmith.yml"));
        paths.push(PathBuf::from("stacksmith.yaml"));
        paths.push(PathBuf::from("stacksmith.toml"));
        paths.push(PathBuf::from("stacksmith.json"));

        // Environment variable
        if let Ok(env_config) = std::env::var(CONFIG_ENV) {
            paths.push(PathBuf::from(env_config));
        }

        paths
    }

    /// Parse one file into a JSON value, by extension.
    fn read_value(path: &Path) -> Result<Value> {
        let content = std::fs::read_to_string(path)?;
        let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let value: Value = match extension {
            "json" => serde_json::from_str(&content)?,
            "toml" => toml::from_str(&content)?,
            "yml" | "yaml" => serde_yaml::from_str(&content)?,
            _ => {
                // Try YAML first, then TOML
                serde_yaml::from_str(&content).or_else(|_| toml::from_str(&content))?
            }
        };

        // An empty YAML file parses to null
        Ok(match value {
            Value::Null => Value::Object(Default::default()),
            other => other,
        })
    }

    /// Load from a single file, without the search or environment overrides.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(Error::FileNotFound(path.to_path_buf()));
        }
        let mut merged = serde_json::to_value(Config::default())?;
        merge_values(&mut merged, Self::read_value(path)?);
        Ok(serde_json::from_value(merged)?)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(&mut self) {
        // STACKSMITH_REGION, then the AWS variables
        if let Some(region) = ["STACKSMITH_REGION", "AWS_REGION", "AWS_DEFAULT_REGION"]
            .iter()
            .find_map(|var| non_empty_env(var))
        {
            self.region = Some(region);
        }

        // STACKSMITH_ACCOUNT, then CDK_DEFAULT_ACCOUNT
        if let Some(account) = ["STACKSMITH_ACCOUNT", "CDK_DEFAULT_ACCOUNT"]
            .iter()
            .find_map(|var| non_empty_env(var))
        {
            self.account = Some(account);
        }

        // STACKSMITH_ENVIRONMENT
        if let Some(environment) = non_empty_env("STACKSMITH_ENVIRONMENT") {
            self.environment = Some(environment);
        }
    }

    /// Project slug, from `project` or the `project` tag.
    pub fn project_name(&self) -> Result<String> {
        self.project
            .clone()
            .or_else(|| self.tags.get("project").cloned().flatten())
            .filter(|p| !p.trim().is_empty())
            .map(|p| naming::project_slug(&p))
            .ok_or_else(|| Error::MissingField("project".to_string()))
    }

    /// Environment name, from `environment` or the `environment` tag.
    pub fn environment_name(&self) -> Result<String> {
        self.environment
            .clone()
            .or_else(|| self.tags.get("environment").cloned().flatten())
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| Error::MissingField("environment".to_string()))
    }

    /// Keypair name for `date`, unless one is configured.
    pub fn keypair_name(&self, date: NaiveDate) -> Result<String> {
        match self.keypair.name {
            Some(ref name) => Ok(name.clone()),
            None => Ok(naming::keypair_name(
                &self.project_name()?,
                &self.environment_name()?,
                date,
            )),
        }
    }

    /// Check everything that can be checked without composing.
    pub fn validate(&self) -> Result<()> {
        let project = self.project_name()?;
        let environment = self.environment_name()?;
        for kind in StackKind::ALL {
            naming::validate_stack_id(&naming::stack_id(&project, &environment, kind.suffix()))?;
        }

        let mut names = std::collections::HashSet::new();
        for server in &self.compute.servers {
            if server.name.trim().is_empty() {
                return Err(Error::MissingField("compute.servers[].name".to_string()));
            }
            if !names.insert(server.name.as_str()) {
                return Err(Error::invalid_config(
                    "compute.servers",
                    format!("server '{}' is declared twice", server.name),
                ));
            }
            // The prefix leads every logical id the server contributes
            if naming::validate_logical_id(&server.prefix()).is_err() {
                return Err(Error::invalid_config(
                    "compute.servers",
                    format!(
                        "server '{}' gives the logical id prefix '{}', which must be alphanumeric and start with a letter",
                        server.name,
                        server.prefix()
                    ),
                ));
            }
            InstanceType::resolve(&server.instance_type)?;
        }
        if !self.compute.servers.is_empty() && self.compute.server(&self.compute.database_client).is_none() {
            return Err(Error::invalid_config(
                "compute.database_client",
                format!("no server named '{}'", self.compute.database_client),
            ));
        }

        InstanceType::resolve(&self.database.instance_type)?;
        if let Some(max_storage) = self.database.max_storage {
            if max_storage < self.database.storage {
                return Err(Error::invalid_config(
                    "database.max_storage",
                    format!(
                        "{} is below the allocated storage of {}",
                        max_storage, self.database.storage
                    ),
                ));
            }
        }
        self.database.master_user.validate()?;

        if !(7..=30).contains(&self.encryption_key.pending_window_days) {
            return Err(Error::invalid_config(
                "encryption_key.pending_window_days",
                "must be between 7 and 30",
            ));
        }

        if let Some(ref stacks) = self.stacks {
            if stacks.is_empty() {
                return Err(Error::invalid_config("stacks", "the plan is empty"));
            }
        }
        Ok(())
    }
}

fn non_empty_env(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

/// Merge `other` into `base`: objects merge key by key, anything else replaces.
fn merge_values(base: &mut Value, other: Value) {
    match (base, other) {
        (Value::Object(base), Value::Object(other)) => {
            for (key, value) in other {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, other) => *base = other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.network.cidr, "10.0.0.0/16");
        assert_eq!(config.compute.servers.len(), 2);
        assert_eq!(config.database.port, 1433);
        assert_eq!(config.database.deletion_policy, DeletionPolicy::Snapshot);
        assert_eq!(config.keypair.dir, PathBuf::from("/tmp"));
    }

    #[test]
    fn test_server_prefix() {
        assert_eq!(ServerConfig::app().prefix(), "App");
        assert_eq!(ServerConfig::db().prefix(), "DB");
        let web = ServerConfig {
            name: "web-front".to_string(),
            ..ServerConfig::default()
        };
        assert_eq!(web.prefix(), "WebFront");
    }

    #[test]
    fn test_merge_values() {
        let mut base = json!({ "network": { "cidr": "10.0.0.0/16", "max_azs": 2 }, "tags": {} });
        merge_values(
            &mut base,
            json!({ "network": { "cidr": "172.16.0.0/16" }, "tags": { "owner": null } }),
        );
        assert_eq!(base["network"]["cidr"], "172.16.0.0/16");
        assert_eq!(base["network"]["max_azs"], 2);
        assert!(base["tags"]["owner"].is_null());
    }

    #[test]
    fn test_project_falls_back_to_tag() {
        let mut config = Config::default();
        config
            .tags
            .insert("project".to_string(), Some("Data Platform".to_string()));
        config.environment = Some("prod".to_string());
        assert_eq!(config.project_name().unwrap(), "data-platform");
    }

    #[test]
    fn test_missing_project() {
        let config = Config::default();
        assert!(matches!(config.project_name(), Err(Error::MissingField(_))));
    }

    #[test]
    fn test_keypair_name() {
        let config = Config {
            project: Some("shop".to_string()),
            environment: Some("dev".to_string()),
            ..Config::default()
        };
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        assert_eq!(config.keypair_name(date).unwrap(), "shop-dev-20240301-key");
    }

    #[test]
    fn test_validate_max_storage() {
        let mut config = Config {
            project: Some("shop".to_string()),
            environment: Some("dev".to_string()),
            ..Config::default()
        };
        assert!(config.validate().is_ok());

        config.database.max_storage = Some(100);
        assert!(matches!(config.validate(), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_image_for_region() {
        let mut server = ServerConfig::app();
        server
            .images
            .insert("cn-north-1".to_string(), "ami-cn".to_string());
        assert_eq!(server.image_for(Some("cn-north-1")), Some("ami-cn"));
        assert_eq!(server.image_for(Some("us-east-1")), Some("ami-0b50407ec100af505"));
        assert_eq!(server.image_for(None), Some("ami-0b50407ec100af505"));
    }
}
