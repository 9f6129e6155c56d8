//! Managed SQL Server instance.
//!
//! The database stack consumes every other stack: it sits in the isolated
//! subnets of the network, accepts connections from the application security
//! group, encrypts storage with the exported key, and backs up to and
//! restores from exactly one bucket through an option group role.

use serde_json::{json, Value};

use super::access::{AccessPolicyBinder, PolicyDocument, PolicyStatement, PortRange};
use super::compute::ComputeOutputs;
use super::encryption_key::KeyOutputs;
use super::network::{NetworkOutputs, SubnetTier};
use super::object_store::ObjectStoreOutputs;
use super::{InstanceType, StackContext, StackDescriptor, StackKind};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::naming;
use crate::template::intrinsics::{get_att, join, reference};
use crate::template::{ExportRef, Output, Resource, ResourceType, Stack};

const SECURITY_GROUP_ID: &str = "RDSSecurityGroup";
const POLICY_ID: &str = "BackupRestoreFromS3Policy";
const ROLE_ID: &str = "RDSRole";
const OPTION_GROUP_ID: &str = "OptionGroup";
const SUBNET_GROUP_ID: &str = "RDSSubnetGroup";
const INSTANCE_ID: &str = "RDS";

/// Service principal of the database role.
pub const RDS_SERVICE_PRINCIPAL: &str = "rds.amazonaws.com";

/// Typed outputs of the stacks the database imports from.
#[derive(Debug, Clone, Copy)]
pub struct DatabaseInputs<'a> {
    pub network: &'a NetworkOutputs,
    pub compute: &'a ComputeOutputs,
    pub key: &'a KeyOutputs,
    pub object_store: &'a ObjectStoreOutputs,
}

/// Exports of the database stack.
#[derive(Debug, Clone, PartialEq)]
pub struct DatabaseOutputs {
    pub endpoint_address: ExportRef,
    pub endpoint_port: ExportRef,
}

pub struct ManagedDatabaseDescriptor<'a> {
    ctx: &'a StackContext,
    config: &'a DatabaseConfig,
    inputs: DatabaseInputs<'a>,
}

impl<'a> ManagedDatabaseDescriptor<'a> {
    pub fn new(ctx: &'a StackContext, config: &'a DatabaseConfig, inputs: DatabaseInputs<'a>) -> Self {
        Self { ctx, config, inputs }
    }

    /// Instance identifier; the stack id when not configured.
    pub fn identifier(&self) -> String {
        self.config
            .identifier
            .clone()
            .unwrap_or_else(|| self.ctx.stack_id.clone())
    }

    /// `12.00` for `12.00.5571.0.v1`.
    fn major_engine_version(&self) -> String {
        self.config
            .engine_version
            .split('.')
            .take(2)
            .collect::<Vec<_>>()
            .join(".")
    }

    fn validate(&self) -> Result<InstanceType> {
        let instance_type = InstanceType::resolve(&self.config.instance_type)?;
        if let Some(max_storage) = self.config.max_storage {
            if max_storage < self.config.storage {
                return Err(Error::invalid_config(
                    "database.max_storage",
                    format!(
                        "{} is below the allocated storage of {}",
                        max_storage, self.config.storage
                    ),
                ));
            }
        }
        self.config.master_user.validate()?;
        Ok(instance_type)
    }

    /// Backup policy scoped to the one imported bucket.
    fn backup_policy(&self) -> PolicyDocument {
        let prefix = self.ctx.s3_arn_prefix();
        let bucket = self.inputs.object_store.bucket_name.import_value();
        let bucket_arn = join("", vec![json!(prefix), bucket.clone()]);
        let objects_arn = join("", vec![json!(prefix), bucket, json!("/*")]);

        PolicyDocument::new()
            .statement(
                PolicyStatement::allow()
                    .sid("AllowListOfSpecificBucket")
                    .actions(["s3:ListBucket", "s3:GetBucketLocation"])
                    .resource(bucket_arn),
            )
            .statement(
                PolicyStatement::allow()
                    .sid("AllowGetPutObjectOfSpecificBucket")
                    .actions([
                        "s3:GetObject",
                        "s3:PutObject",
                        "s3:ListMultipartUploadParts",
                        "s3:AbortMultipartUpload",
                    ])
                    .resource(objects_arn),
            )
    }

    fn isolated_subnets(&self) -> Result<Vec<Value>> {
        let subnets = self.inputs.network.subnets(SubnetTier::Isolated);
        if subnets.is_empty() {
            return Err(Error::unresolved(
                &self.ctx.stack_id,
                format!(
                    "{}{}{}",
                    naming::parent_export_prefix(&self.ctx.stack_id),
                    StackKind::Network.primary_export_suffix(),
                    SubnetTier::Isolated.subnet_id(1)
                ),
            ));
        }
        Ok(subnets.iter().map(ExportRef::import_value).collect())
    }
}

impl StackDescriptor for ManagedDatabaseDescriptor<'_> {
    type Outputs = DatabaseOutputs;

    fn kind(&self) -> StackKind {
        StackKind::Database
    }

    fn declare(&self) -> Result<(Stack, DatabaseOutputs)> {
        let ctx = self.ctx;
        let config = self.config;
        let instance_type = self.validate()?;

        let mut stack = Stack::new(&ctx.stack_id, StackKind::Database)
            .with_description(format!("Managed SQL Server for {}", ctx.stack_id));

        stack.add_resource(
            Resource::new(
                SECURITY_GROUP_ID,
                ResourceType::SecurityGroup,
                json!({
                    "GroupDescription": "Security group for rds.",
                    "GroupName": ctx.resource_name("sg"),
                    "VpcId": self.inputs.network.vpc_id.import_value(),
                    "SecurityGroupEgress": [{
                        "CidrIp": "0.0.0.0/0",
                        "IpProtocol": "-1",
                        "Description": "Allow all outbound traffic by default",
                    }],
                }),
            )
            .with_tag("Name", ctx.resource_name("sg")),
        )?;

        let mut binder = AccessPolicyBinder::new("RDS", get_att(SECURITY_GROUP_ID, "GroupId"));
        binder.bind_inbounds(&config.inbounds, Some(config.port))?;
        binder.bind_security_group(
            self.inputs.compute.security_group.import_value(),
            PortRange::single(config.port),
            "from app servers",
        );
        stack.add_resources(binder.into_resources())?;

        stack.add_resource(Resource::new(
            POLICY_ID,
            ResourceType::IamManagedPolicy,
            json!({
                "ManagedPolicyName": ctx.resource_name("backup restore from s3 policy"),
                "Description": "Policy to backup and restore from S3 bucket",
                "PolicyDocument": self.backup_policy().to_json(),
            }),
        ))?;
        stack.add_resource(Resource::new(
            ROLE_ID,
            ResourceType::IamRole,
            json!({
                "RoleName": ctx.resource_name("rds"),
                "Description": "IAM role for rds",
                "AssumeRolePolicyDocument": PolicyDocument::assume_role(RDS_SERVICE_PRINCIPAL).to_json(),
                "ManagedPolicyArns": [reference(POLICY_ID)],
            }),
        ))?;
        stack.add_resource(Resource::new(
            OPTION_GROUP_ID,
            ResourceType::DbOptionGroup,
            json!({
                "EngineName": config.engine,
                "MajorEngineVersion": self.major_engine_version(),
                "OptionGroupDescription": format!("Option group for {}", ctx.stack_id),
                "OptionConfigurations": [{
                    "OptionName": "SQLSERVER_BACKUP_RESTORE",
                    "OptionSettings": [{
                        "Name": "IAM_ROLE_ARN",
                        "Value": get_att(ROLE_ID, "Arn"),
                    }],
                }],
            }),
        ))?;
        stack.add_resource(Resource::new(
            SUBNET_GROUP_ID,
            ResourceType::DbSubnetGroup,
            json!({
                "DBSubnetGroupDescription": format!("Isolated subnets for {}", ctx.stack_id),
                "SubnetIds": self.isolated_subnets()?,
            }),
        ))?;

        let mut properties = json!({
            "DBInstanceIdentifier": self.identifier(),
            "Engine": config.engine,
            "EngineVersion": config.engine_version,
            "LicenseModel": config.license_model,
            "DBInstanceClass": instance_type.db_instance_class(),
            "AllocatedStorage": config.storage.to_string(),
            "StorageType": config.storage_type,
            "StorageEncrypted": true,
            "KmsKeyId": self.inputs.key.key_id.import_value(),
            "MasterUsername": config.master_user.name,
            "MasterUserPassword": config.master_user.password.dynamic_reference(),
            "Port": config.port.to_string(),
            "BackupRetentionPeriod": config.backup_retention_days,
            "PreferredBackupWindow": config.backup_window,
            "CharacterSetName": config.collation,
            "Timezone": config.timezone,
            "EnableCloudwatchLogsExports": config.cloudwatch_logs_exports,
            "PubliclyAccessible": false,
            "MultiAZ": false,
            "AutoMinorVersionUpgrade": false,
            "CopyTagsToSnapshot": true,
            "DeleteAutomatedBackups": true,
            "DeletionProtection": false,
            "OptionGroupName": reference(OPTION_GROUP_ID),
            "DBSubnetGroupName": reference(SUBNET_GROUP_ID),
            "VPCSecurityGroups": [get_att(SECURITY_GROUP_ID, "GroupId")],
        });
        if let Some(max_storage) = config.max_storage {
            properties["MaxAllocatedStorage"] = json!(max_storage);
        }
        stack.add_resource(
            Resource::new(INSTANCE_ID, ResourceType::DbInstance, properties)
                .depends_on(ROLE_ID)
                .with_deletion_policy(config.deletion_policy),
        )?;

        let endpoint_address = ExportRef::new(&ctx.stack_id, ctx.export_name("EndpointAddress"));
        let endpoint_port = ExportRef::new(&ctx.stack_id, ctx.export_name("EndpointPort"));
        stack.add_output(Output::exported(
            "OutputRDSEndpointAddress",
            &endpoint_address.export_name,
            get_att(INSTANCE_ID, "Endpoint.Address"),
        ))?;
        stack.add_output(Output::exported(
            "OutputRDSEndpointPort",
            &endpoint_port.export_name,
            get_att(INSTANCE_ID, "Endpoint.Port"),
        ))?;

        tracing::debug!(
            stack = %ctx.stack_id,
            instance_class = %instance_type.db_instance_class(),
            deletion_policy = ?config.deletion_policy,
            "declared database"
        );
        Ok((
            stack,
            DatabaseOutputs {
                endpoint_address,
                endpoint_port,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ComputeConfig, EncryptionKeyConfig, NetworkConfig, ObjectStoreConfig};
    use crate::stacks::access::InboundRule;
    use crate::stacks::{
        ComputeResourceDescriptor, EncryptionKeyDescriptor, NetworkTopologyDescriptor,
        ObjectStoreDescriptor,
    };
    use crate::template::DeletionPolicy;
    use pretty_assertions::assert_eq;

    struct Upstream {
        network: NetworkOutputs,
        compute: ComputeOutputs,
        key: KeyOutputs,
        object_store: ObjectStoreOutputs,
    }

    fn upstream() -> Upstream {
        let ctx = |kind| StackContext::new("shop", "dev", kind);
        let network_ctx = ctx(StackKind::Network);
        let network_config = NetworkConfig::default();
        let network = NetworkTopologyDescriptor::new(&network_ctx, &network_config)
            .declare()
            .unwrap()
            .1;
        let compute_ctx = ctx(StackKind::Compute);
        let compute_config = ComputeConfig::default();
        let compute = ComputeResourceDescriptor::new(&compute_ctx, &compute_config, &network)
            .declare()
            .unwrap()
            .1;
        let key_ctx = ctx(StackKind::EncryptionKey);
        let key_config = EncryptionKeyConfig::default();
        let key = EncryptionKeyDescriptor::new(&key_ctx, &key_config)
            .declare()
            .unwrap()
            .1;
        let store_ctx = ctx(StackKind::ObjectStore);
        let store_config = ObjectStoreConfig::default();
        let object_store = ObjectStoreDescriptor::new(&store_ctx, &store_config)
            .declare()
            .unwrap()
            .1;
        Upstream {
            network,
            compute,
            key,
            object_store,
        }
    }

    fn declare(config: &DatabaseConfig) -> Result<(Stack, DatabaseOutputs)> {
        let up = upstream();
        let ctx = StackContext::new("shop", "dev", StackKind::Database);
        let inputs = DatabaseInputs {
            network: &up.network,
            compute: &up.compute,
            key: &up.key,
            object_store: &up.object_store,
        };
        ManagedDatabaseDescriptor::new(&ctx, config, inputs).declare()
    }

    #[test]
    fn test_database_instance() {
        let (stack, outputs) = declare(&DatabaseConfig::default()).unwrap();
        let rds = stack.resource("RDS").unwrap();

        assert_eq!(rds.property("DBInstanceClass"), Some(&json!("db.m5.xlarge")));
        assert_eq!(rds.property("StorageEncrypted"), Some(&json!(true)));
        assert_eq!(
            rds.property("KmsKeyId"),
            Some(&json!({ "Fn::ImportValue": "ShopDevKmsKeyId" }))
        );
        assert_eq!(
            rds.property("MasterUserPassword"),
            Some(&json!("{{resolve:secretsmanager:rds-master-user:SecretString:password::}}"))
        );
        assert_eq!(rds.property("PubliclyAccessible"), Some(&json!(false)));
        assert_eq!(rds.deletion_policy, Some(DeletionPolicy::Snapshot));
        assert!(rds.property("MaxAllocatedStorage").is_none());

        assert_eq!(outputs.endpoint_address.export_name, "ShopDevRdsEndpointAddress");
        assert_eq!(outputs.endpoint_port.export_name, "ShopDevRdsEndpointPort");
    }

    #[test]
    fn test_backup_policy_scoped_to_bucket() {
        let (stack, _) = declare(&DatabaseConfig::default()).unwrap();
        let policy = stack.resource("BackupRestoreFromS3Policy").unwrap();
        let statements = &policy.property("PolicyDocument").unwrap()["Statement"];

        assert_eq!(statements[0]["Sid"], "AllowListOfSpecificBucket");
        assert_eq!(
            statements[0]["Resource"],
            json!({ "Fn::Join": ["", ["arn:aws:s3:::", { "Fn::ImportValue": "ShopDevS3BucketName" }]] })
        );
        assert_eq!(
            statements[1]["Resource"],
            json!({ "Fn::Join": ["", ["arn:aws:s3:::", { "Fn::ImportValue": "ShopDevS3BucketName" }, "/*"]] })
        );
        assert_eq!(statements[1]["Action"].as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_option_group_and_subnets() {
        let (stack, _) = declare(&DatabaseConfig::default()).unwrap();
        let options = stack.resource("OptionGroup").unwrap();
        assert_eq!(options.property("MajorEngineVersion"), Some(&json!("12.00")));
        assert_eq!(
            options.property("OptionConfigurations").unwrap()[0]["OptionSettings"][0]["Value"],
            json!({ "Fn::GetAtt": ["RDSRole", "Arn"] })
        );

        let subnets = stack.resource("RDSSubnetGroup").unwrap();
        assert_eq!(
            subnets.property("SubnetIds"),
            Some(&json!([
                { "Fn::ImportValue": "ShopDevVpcIsolatedSubnet1" },
                { "Fn::ImportValue": "ShopDevVpcIsolatedSubnet2" }
            ]))
        );
    }

    #[test]
    fn test_ingress_defaults_to_database_port() {
        let config = DatabaseConfig {
            inbounds: vec![InboundRule::new("10.8.0.0/16", None, "vpn")],
            ..DatabaseConfig::default()
        };
        let (stack, _) = declare(&config).unwrap();
        let ingress = stack.resources_of(ResourceType::SecurityGroupIngress);
        assert_eq!(ingress.len(), 2);
        assert_eq!(ingress[0].property("FromPort"), Some(&json!(1433)));
        assert_eq!(
            ingress[1].property("SourceSecurityGroupId"),
            Some(&json!({ "Fn::ImportValue": "ShopDevEc2SecurityGroupId" }))
        );
    }

    #[test]
    fn test_max_storage_below_storage() {
        let config = DatabaseConfig {
            storage: 200,
            max_storage: Some(100),
            ..DatabaseConfig::default()
        };
        assert!(matches!(declare(&config), Err(Error::InvalidConfig { .. })));
    }

    #[test]
    fn test_max_storage_emitted() {
        let config = DatabaseConfig {
            max_storage: Some(500),
            ..DatabaseConfig::default()
        };
        let (stack, _) = declare(&config).unwrap();
        assert_eq!(
            stack.resource("RDS").unwrap().property("MaxAllocatedStorage"),
            Some(&json!(500))
        );
    }
}
