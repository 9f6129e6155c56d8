//! Compute resources: EC2 servers with their security groups and roles.

use indexmap::IndexMap;
use serde_json::{json, Value};

use super::access::{AccessPolicyBinder, PolicyDocument};
use super::network::{NetworkOutputs, SubnetTier};
use super::{InstanceType, StackContext, StackDescriptor, StackKind};
use crate::config::{ComputeConfig, PeerRule, ServerConfig};
use crate::error::{Error, Result};
use crate::naming;
use crate::template::intrinsics::{get_att, reference};
use crate::template::{ExportRef, Output, Resource, ResourceType, Stack};

/// Exports of the compute stack.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputeOutputs {
    /// Security group of the server the database accepts connections from
    pub security_group: ExportRef,
    /// Server name -> instance id export
    pub instances: IndexMap<String, ExportRef>,
    /// Server name -> public IP export, for public servers
    pub public_ips: IndexMap<String, ExportRef>,
}

/// Declares one instance per configured server.
pub struct ComputeResourceDescriptor<'a> {
    ctx: &'a StackContext,
    config: &'a ComputeConfig,
    network: &'a NetworkOutputs,
    key_name: Option<&'a str>,
}

impl<'a> ComputeResourceDescriptor<'a> {
    pub fn new(ctx: &'a StackContext, config: &'a ComputeConfig, network: &'a NetworkOutputs) -> Self {
        Self {
            ctx,
            config,
            network,
            key_name: None,
        }
    }

    /// Keypair the instances are launched with.
    pub fn with_key_name(mut self, key_name: Option<&'a str>) -> Self {
        self.key_name = key_name;
        self
    }

    fn peer(&self, server: &ServerConfig, rule: &PeerRule) -> Result<&'a ServerConfig> {
        let config: &'a ComputeConfig = self.config;
        config.server(&rule.server).ok_or_else(|| {
            Error::invalid_config(
                format!("compute.servers[{}].peers", server.name),
                format!("no server named '{}'", rule.server),
            )
        })
    }

    fn subnet(&self, tier: SubnetTier) -> Result<Value> {
        self.network
            .subnets(tier)
            .first()
            .map(ExportRef::import_value)
            .ok_or_else(|| {
                Error::unresolved(
                    &self.ctx.stack_id,
                    format!(
                        "{}{}{}",
                        naming::parent_export_prefix(&self.ctx.stack_id),
                        StackKind::Network.primary_export_suffix(),
                        tier.subnet_id(1)
                    ),
                )
            })
    }

    fn declare_server(&self, stack: &mut Stack, server: &ServerConfig) -> Result<()> {
        let ctx = self.ctx;
        let prefix = server.prefix();
        let label = server
            .description
            .clone()
            .unwrap_or_else(|| format!("{} servers", server.name));

        let instance_type = InstanceType::resolve(&server.instance_type)?;
        let image = server
            .image_for(ctx.region.as_deref())
            .ok_or_else(|| Error::MissingField(format!("compute.servers[{}].image", server.name)))?;

        let sg_id = format!("{}SecurityGroup", prefix);
        let role_id = format!("{}Role", prefix);
        let profile_id = format!("{}InstanceProfile", prefix);
        let instance_id = format!("{}EC2", prefix);

        stack.add_resource(
            Resource::new(
                &sg_id,
                ResourceType::SecurityGroup,
                json!({
                    "GroupDescription": format!("Security group for {}.", label),
                    "GroupName": ctx.resource_name(&format!("{} sg", server.name)),
                    "VpcId": self.network.vpc_id.import_value(),
                    "SecurityGroupEgress": [{
                        "CidrIp": "0.0.0.0/0",
                        "IpProtocol": "-1",
                        "Description": "Allow all outbound traffic by default",
                    }],
                }),
            )
            .with_tag("Name", ctx.resource_name(&format!("{} sg", server.name))),
        )?;

        stack.add_resource(Resource::new(
            &role_id,
            ResourceType::IamRole,
            json!({
                "RoleName": ctx.resource_name(&format!("{} servers", server.name)),
                "Description": format!("IAM role for {}", label),
                "AssumeRolePolicyDocument":
                    PolicyDocument::assume_role(ctx.partition.ec2_service_principal()).to_json(),
            }),
        ))?;
        stack.add_resource(Resource::new(
            &profile_id,
            ResourceType::InstanceProfile,
            json!({ "Roles": [reference(&role_id)] }),
        ))?;

        let block_devices: Vec<Value> = server
            .volumes
            .iter()
            .map(|v| {
                json!({
                    "DeviceName": v.device_name,
                    "Ebs": {
                        "VolumeSize": v.size,
                        "VolumeType": v.volume_type,
                        "Encrypted": v.encrypted,
                        "DeleteOnTermination": v.delete_on_termination,
                    }
                })
            })
            .collect();

        let mut properties = json!({
            "ImageId": image,
            "InstanceType": instance_type.to_string(),
            "IamInstanceProfile": reference(&profile_id),
            "SecurityGroupIds": [get_att(&sg_id, "GroupId")],
            "SubnetId": self.subnet(server.tier)?,
            "BlockDeviceMappings": block_devices,
        });
        if let Some(key_name) = self.key_name {
            properties["KeyName"] = json!(key_name);
        }
        stack.add_resource(
            Resource::new(&instance_id, ResourceType::Instance, properties)
                .depends_on(&role_id)
                .with_tag("Name", ctx.resource_name(&server.name)),
        )?;

        if server.elastic_ip {
            stack.add_resource(
                Resource::new(
                    format!("{}InstanceIP", prefix),
                    ResourceType::Eip,
                    json!({ "Domain": "vpc", "InstanceId": reference(&instance_id) }),
                )
                .with_tag("Name", ctx.resource_name(&format!("{} server eip", server.name))),
            )?;
        }

        let mut binder = AccessPolicyBinder::new(&prefix, get_att(&sg_id, "GroupId"));
        binder.bind_inbounds(&server.inbounds, None)?;
        for rule in &server.peers {
            let peer = self.peer(server, rule)?;
            let peer_group = get_att(&format!("{}SecurityGroup", peer.prefix()), "GroupId");
            for ports in rule.port.ranges()? {
                binder.bind_security_group(peer_group.clone(), ports, rule.description.clone());
            }
        }
        for rule in &server.public_ip_peers {
            let peer = self.peer(server, rule)?;
            if peer.tier != SubnetTier::Public {
                return Err(Error::invalid_config(
                    format!("compute.servers[{}].public_ip_peers", server.name),
                    format!("server '{}' has no public IP", peer.name),
                ));
            }
            let peer_instance = format!("{}EC2", peer.prefix());
            for ports in rule.port.ranges()? {
                binder.bind_public_ip(&peer_instance, ports, rule.description.clone());
            }
        }
        stack.add_resources(binder.into_resources())?;

        tracing::debug!(
            stack = %ctx.stack_id,
            server = %server.name,
            instance_type = %instance_type,
            tier = %server.tier,
            "declared server"
        );
        Ok(())
    }
}

impl StackDescriptor for ComputeResourceDescriptor<'_> {
    type Outputs = ComputeOutputs;

    fn kind(&self) -> StackKind {
        StackKind::Compute
    }

    fn declare(&self) -> Result<(Stack, ComputeOutputs)> {
        let ctx = self.ctx;
        let client = self.config.server(&self.config.database_client).ok_or_else(|| {
            Error::invalid_config(
                "compute.database_client",
                format!("no server named '{}'", self.config.database_client),
            )
        })?;

        let mut stack = Stack::new(&ctx.stack_id, StackKind::Compute)
            .with_description(format!("Compute resources for {}", ctx.stack_id));
        let mut instances = IndexMap::new();
        let mut public_ips = IndexMap::new();

        for server in &self.config.servers {
            self.declare_server(&mut stack, server)?;

            let prefix = server.prefix();
            let instance_id = format!("{}EC2", prefix);

            let export = ExportRef::new(&ctx.stack_id, format!("{}InstanceId", prefix));
            stack.add_output(Output::exported(
                format!("Output{}InstanceId", prefix),
                &export.export_name,
                reference(&instance_id),
            ))?;
            instances.insert(server.name.clone(), export);

            if server.tier == SubnetTier::Public {
                let export = ExportRef::new(&ctx.stack_id, format!("{}PublicIP", prefix));
                stack.add_output(Output::exported(
                    format!("Output{}PublicIP", prefix),
                    &export.export_name,
                    get_att(&instance_id, "PublicIp"),
                ))?;
                public_ips.insert(server.name.clone(), export);
            }
        }

        let security_group = ExportRef::new(&ctx.stack_id, ctx.export_name("SecurityGroupId"));
        stack.add_output(
            Output::exported(
                "OutputSecurityGroupId",
                &security_group.export_name,
                get_att(&format!("{}SecurityGroup", client.prefix()), "GroupId"),
            )
            .with_description(format!("Security group of the {} servers", client.name)),
        )?;

        Ok((
            stack,
            ComputeOutputs {
                security_group,
                instances,
                public_ips,
            },
        ))
    }
}
