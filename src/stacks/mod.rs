//! Stack descriptors.
//!
//! Each descriptor declares the resources of one stack and returns a typed
//! outputs value that later stacks take as a parameter:
//!
//! | Stack | Descriptor | Consumes | Produces |
//! |-------|------------|----------|----------|
//! | `vpc` | [`NetworkTopologyDescriptor`] | - | [`NetworkOutputs`] |
//! | `ec2` | [`ComputeResourceDescriptor`] | network | [`ComputeOutputs`] |
//! | `kms` | [`EncryptionKeyDescriptor`] | - | [`KeyOutputs`] |
//! | `s3`  | [`ObjectStoreDescriptor`] | - | [`ObjectStoreOutputs`] |
//! | `rds` | [`ManagedDatabaseDescriptor`] | network, compute, key, object store | [`DatabaseOutputs`] |

pub mod access;
pub mod compute;
pub mod database;
pub mod encryption_key;
pub mod instance_type;
pub mod network;
pub mod object_store;

pub use access::{
    AccessPolicyBinder, InboundRule, IngressRule, IngressSource, PolicyDocument, PolicyStatement,
    PortRange, PortSpec, Principal, Protocol,
};
pub use compute::{ComputeOutputs, ComputeResourceDescriptor};
pub use database::{DatabaseOutputs, DatabaseInputs, ManagedDatabaseDescriptor};
pub use encryption_key::{EncryptionKeyDescriptor, KeyOutputs};
pub use instance_type::{InstanceClass, InstanceSize, InstanceType};
pub use network::{Ipv4Network, NetworkOutputs, NetworkTopologyDescriptor, SubnetTier};
pub use object_store::{ObjectStoreDescriptor, ObjectStoreOutputs};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};
use crate::naming;
use crate::template::{intrinsics, Stack};

/// A stack descriptor: declares the resources of one stack.
///
/// Inputs (configuration and the typed outputs of earlier stacks) are given to
/// the descriptor's constructor; `declare` produces the stack together with
/// the typed outputs that later stacks consume.
pub trait StackDescriptor {
    /// Typed handle on the values this stack exports.
    type Outputs;

    /// Kind of stack declared.
    fn kind(&self) -> StackKind;

    /// Declare the stack.
    fn declare(&self) -> Result<(Stack, Self::Outputs)>;
}

/// The kinds of stack a project is composed of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackKind {
    /// VPC and subnet tiers
    Network,
    /// EC2 servers, security groups, roles
    Compute,
    /// KMS key for database storage encryption
    EncryptionKey,
    /// RDS SQL Server instance
    Database,
    /// S3 bucket for database backups
    ObjectStore,
}

impl StackKind {
    /// All kinds in priority order.
    pub const ALL: [StackKind; 5] = [
        StackKind::Network,
        StackKind::Compute,
        StackKind::EncryptionKey,
        StackKind::Database,
        StackKind::ObjectStore,
    ];

    /// Suffix appended to `<project>-<environment>` to form the stack id.
    pub fn suffix(&self) -> &'static str {
        match self {
            StackKind::Network => "vpc",
            StackKind::Compute => "ec2",
            StackKind::EncryptionKey => "kms",
            StackKind::Database => "rds",
            StackKind::ObjectStore => "s3",
        }
    }

    /// Value of the per-stack category tag.
    pub fn category(&self) -> &'static str {
        match self {
            StackKind::Network => "VPC",
            StackKind::Compute => "EC2",
            StackKind::EncryptionKey => "KMS",
            StackKind::Database => "RDS",
            StackKind::ObjectStore => "S3",
        }
    }

    /// Stacks whose exports this stack imports.
    pub fn dependencies(&self) -> &'static [StackKind] {
        match self {
            StackKind::Network | StackKind::EncryptionKey | StackKind::ObjectStore => &[],
            StackKind::Compute => &[StackKind::Network],
            StackKind::Database => &[
                StackKind::Network,
                StackKind::Compute,
                StackKind::EncryptionKey,
                StackKind::ObjectStore,
            ],
        }
    }

    /// Position in the priority order, used to break ties between independent stacks.
    pub fn priority(&self) -> usize {
        Self::ALL.iter().position(|k| k == self).unwrap_or(usize::MAX)
    }

    /// Export suffix, relative to the sibling prefix, of the value that
    /// importing stacks read first from a stack of this kind.
    pub fn primary_export_suffix(&self) -> &'static str {
        match self {
            StackKind::Network => "Vpc",
            StackKind::Compute => "Ec2SecurityGroupId",
            StackKind::EncryptionKey => "KmsKeyId",
            StackKind::Database => "RdsEndpointAddress",
            StackKind::ObjectStore => "S3BucketName",
        }
    }
}

impl fmt::Display for StackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StackKind::Network => write!(f, "network"),
            StackKind::Compute => write!(f, "compute"),
            StackKind::EncryptionKey => write!(f, "encryption_key"),
            StackKind::Database => write!(f, "database"),
            StackKind::ObjectStore => write!(f, "object_store"),
        }
    }
}

impl std::str::FromStr for StackKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "network" | "vpc" => Ok(StackKind::Network),
            "compute" | "ec2" => Ok(StackKind::Compute),
            "encryption_key" | "key" | "kms" => Ok(StackKind::EncryptionKey),
            "database" | "rds" => Ok(StackKind::Database),
            "object_store" | "bucket" | "s3" => Ok(StackKind::ObjectStore),
            _ => Err(Error::invalid_config(
                "stacks",
                format!(
                    "unknown stack '{}'. Valid stacks: network, compute, encryption_key, database, object_store",
                    s
                ),
            )),
        }
    }
}

/// AWS partition the stacks are deployed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Partition {
    #[default]
    #[serde(rename = "aws")]
    Aws,
    #[serde(rename = "aws-cn")]
    AwsCn,
    #[serde(rename = "aws-us-gov")]
    AwsUsGov,
}

impl Partition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Partition::Aws => "aws",
            Partition::AwsCn => "aws-cn",
            Partition::AwsUsGov => "aws-us-gov",
        }
    }

    /// Service principal EC2 instances assume roles through.
    pub fn ec2_service_principal(&self) -> &'static str {
        match self {
            Partition::AwsCn => "ec2.amazonaws.com.cn",
            _ => "ec2.amazonaws.com",
        }
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything a descriptor needs to know about the stack it declares.
#[derive(Debug, Clone)]
pub struct StackContext {
    pub stack_id: String,
    pub kind: StackKind,
    pub project: String,
    pub environment: String,
    pub region: Option<String>,
    pub account: Option<String>,
    pub partition: Partition,
}

impl StackContext {
    pub fn new(project: &str, environment: &str, kind: StackKind) -> Self {
        Self {
            stack_id: naming::stack_id(project, environment, kind.suffix()),
            kind,
            project: project.to_string(),
            environment: environment.to_string(),
            region: None,
            account: None,
            partition: Partition::default(),
        }
    }

    pub fn with_region(mut self, region: Option<String>) -> Self {
        self.region = region;
        self
    }

    pub fn with_account(mut self, account: Option<String>) -> Self {
        self.account = account;
        self
    }

    pub fn with_partition(mut self, partition: Partition) -> Self {
        self.partition = partition;
        self
    }

    /// Physical name for a resource of this stack.
    pub fn resource_name(&self, label: &str) -> String {
        naming::resource_name(&self.stack_id, label)
    }

    /// Export name for a value of this stack.
    pub fn export_name(&self, suffix: &str) -> String {
        naming::stack_export(&self.stack_id, suffix)
    }

    /// ARN of an IAM entity (`root`, `role/<name>`) in the deploying account.
    pub fn iam_arn(&self, path: &str) -> Value {
        match self.account {
            Some(ref account) => Value::String(format!(
                "arn:{}:iam::{}:{}",
                self.partition, account, path
            )),
            None => intrinsics::join(
                "",
                vec![
                    Value::String(format!("arn:{}:iam::", self.partition)),
                    intrinsics::account_id(),
                    Value::String(format!(":{}", path)),
                ],
            ),
        }
    }

    /// ARN prefix for S3 resources in this partition.
    pub fn s3_arn_prefix(&self) -> String {
        format!("arn:{}:s3:::", self.partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_kind_from_str_aliases() {
        assert_eq!("vpc".parse::<StackKind>().unwrap(), StackKind::Network);
        assert_eq!("object-store".parse::<StackKind>().unwrap(), StackKind::ObjectStore);
        assert_eq!("KMS".parse::<StackKind>().unwrap(), StackKind::EncryptionKey);
        assert!("lambda".parse::<StackKind>().is_err());
    }

    #[test]
    fn test_stack_context_names() {
        let ctx = StackContext::new("shop", "dev", StackKind::Database);
        assert_eq!(ctx.stack_id, "shop-dev-rds");
        assert_eq!(ctx.resource_name("sg"), "shop-dev-rds-sg");
        assert_eq!(ctx.export_name("EndpointPort"), "ShopDevRdsEndpointPort");
    }

    #[test]
    fn test_primary_export_matches_stack_export() {
        let prefix = naming::parent_export_prefix("shop-dev-rds");
        for kind in StackKind::ALL {
            let ctx = StackContext::new("shop", "dev", kind);
            let first = match kind {
                StackKind::Network => ctx.export_name(""),
                StackKind::Compute => ctx.export_name("SecurityGroupId"),
                StackKind::EncryptionKey => ctx.export_name("KeyId"),
                StackKind::Database => ctx.export_name("EndpointAddress"),
                StackKind::ObjectStore => ctx.export_name("BucketName"),
            };
            assert_eq!(format!("{}{}", prefix, kind.primary_export_suffix()), first);
        }
    }

    #[test]
    fn test_iam_arn_with_and_without_account() {
        let ctx = StackContext::new("shop", "dev", StackKind::EncryptionKey)
            .with_partition(Partition::AwsCn)
            .with_account(Some("123456789012".into()));
        assert_eq!(
            ctx.iam_arn("role/ADFS-Admin"),
            Value::String("arn:aws-cn:iam::123456789012:role/ADFS-Admin".into())
        );

        let ctx = StackContext::new("shop", "dev", StackKind::EncryptionKey);
        assert!(ctx.iam_arn("root").get("Fn::Join").is_some());
    }

    #[test]
    fn test_ec2_service_principal() {
        assert_eq!(Partition::AwsCn.ec2_service_principal(), "ec2.amazonaws.com.cn");
        assert_eq!(Partition::Aws.ec2_service_principal(), "ec2.amazonaws.com");
    }
}
