//! Network topology: a VPC with public, private and isolated subnet tiers.
//!
//! Subnet blocks are carved sequentially out of the VPC block: every public
//! subnet (one per availability zone) first, then private, then isolated.
//! Public subnets route to an internet gateway, each private subnet routes
//! through the NAT gateway in the public subnet of its zone, and isolated
//! subnets get no default route.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use super::{StackContext, StackDescriptor, StackKind};
use crate::config::NetworkConfig;
use crate::error::{Error, Result};
use crate::template::intrinsics::{availability_zone, get_att, reference};
use crate::template::{ExportRef, Output, Resource, ResourceType, Stack};

const VPC_ID: &str = "VPC";
const IGW_ID: &str = "InternetGateway";
const IGW_ATTACHMENT_ID: &str = "GatewayAttachment";

/// An IPv4 network in CIDR notation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ipv4Network {
    pub address: Ipv4Addr,
    pub prefix_len: u8,
}

impl Ipv4Network {
    pub fn new(address: Ipv4Addr, prefix_len: u8) -> Result<Self> {
        if prefix_len > 32 {
            return Err(Error::invalid_cidr(
                format!("{}/{}", address, prefix_len),
                "IPv4 prefix length must be <= 32",
            ));
        }
        Ok(Self {
            address,
            prefix_len,
        })
    }

    fn mask(&self) -> u32 {
        match self.prefix_len {
            0 => 0,
            n => u32::MAX << (32 - u32::from(n)),
        }
    }

    /// The network address (host bits cleared).
    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.address) & self.mask())
    }

    /// Whether the address has no host bits set.
    pub fn is_network_address(&self) -> bool {
        self.network() == self.address
    }

    /// How many `/mask` blocks fit in this network.
    pub fn subnet_capacity(&self, mask: u8) -> u64 {
        if mask < self.prefix_len || mask > 32 {
            return 0;
        }
        1u64 << (mask - self.prefix_len)
    }

    /// The `index`-th `/mask` block of this network.
    pub fn subnet(&self, mask: u8, index: usize) -> Result<Ipv4Network> {
        if mask < self.prefix_len || mask > 32 {
            return Err(Error::invalid_cidr(
                self.to_string(),
                format!("cannot split a /{} into /{} subnets", self.prefix_len, mask),
            ));
        }
        let capacity = self.subnet_capacity(mask);
        if index as u64 >= capacity {
            return Err(Error::invalid_cidr(
                self.to_string(),
                format!(
                    "too small for {} /{} subnets (room for {})",
                    index + 1,
                    mask,
                    capacity
                ),
            ));
        }
        let block_size = 1u64 << (32 - u32::from(mask));
        let start = u64::from(u32::from(self.network())) + index as u64 * block_size;
        // start fits: index < capacity keeps it inside this network
        Ipv4Network::new(Ipv4Addr::from(start as u32), mask)
    }
}

impl fmt::Display for Ipv4Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.address, self.prefix_len)
    }
}

impl FromStr for Ipv4Network {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (address, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| Error::invalid_cidr(s, "expected <address>/<prefix>"))?;

        let address = address
            .parse::<Ipv4Addr>()
            .map_err(|e| Error::invalid_cidr(s, format!("invalid IPv4 address: {}", e)))?;
        let prefix_len = prefix
            .parse::<u8>()
            .map_err(|e| Error::invalid_cidr(s, format!("invalid prefix length: {}", e)))?;

        Self::new(address, prefix_len)
    }
}

impl TryFrom<String> for Ipv4Network {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Ipv4Network> for String {
    fn from(value: Ipv4Network) -> Self {
        value.to_string()
    }
}

/// Subnet tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubnetTier {
    /// Routed to the internet gateway
    #[serde(alias = "PUBLIC", alias = "Public")]
    Public,
    /// Outbound only, through a NAT gateway
    #[serde(alias = "PRIVATE", alias = "Private")]
    Private,
    /// No route out of the VPC
    #[serde(alias = "ISOLATED", alias = "Isolated")]
    Isolated,
}

impl SubnetTier {
    pub const ALL: [SubnetTier; 3] = [SubnetTier::Public, SubnetTier::Private, SubnetTier::Isolated];

    pub fn name(&self) -> &'static str {
        match self {
            SubnetTier::Public => "Public",
            SubnetTier::Private => "Private",
            SubnetTier::Isolated => "Isolated",
        }
    }

    /// Logical id of the subnet in the `az`-th zone (1-based).
    pub fn subnet_id(&self, az: usize) -> String {
        format!("{}Subnet{}", self.name(), az)
    }
}

impl fmt::Display for SubnetTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name().to_lowercase())
    }
}

/// Exports of the network stack.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkOutputs {
    pub vpc_id: ExportRef,
    pub public_subnets: Vec<ExportRef>,
    pub private_subnets: Vec<ExportRef>,
    pub isolated_subnets: Vec<ExportRef>,
}

impl NetworkOutputs {
    /// Subnet exports of a tier, one per availability zone.
    pub fn subnets(&self, tier: SubnetTier) -> &[ExportRef] {
        match tier {
            SubnetTier::Public => &self.public_subnets,
            SubnetTier::Private => &self.private_subnets,
            SubnetTier::Isolated => &self.isolated_subnets,
        }
    }
}

/// Declares the VPC, its subnets, gateways and routes.
pub struct NetworkTopologyDescriptor<'a> {
    ctx: &'a StackContext,
    config: &'a NetworkConfig,
}

impl<'a> NetworkTopologyDescriptor<'a> {
    pub fn new(ctx: &'a StackContext, config: &'a NetworkConfig) -> Self {
        Self { ctx, config }
    }

    /// Configured tiers in allocation order, without duplicates.
    fn tiers(&self) -> Vec<SubnetTier> {
        let mut tiers = self.config.tiers.clone();
        tiers.sort();
        tiers.dedup();
        tiers
    }

    fn vpc_block(&self) -> Result<Ipv4Network> {
        let cidr: Ipv4Network = self.config.cidr.parse()?;
        if !cidr.is_network_address() {
            return Err(Error::invalid_cidr(
                &self.config.cidr,
                format!("host bits set, did you mean {}/{}?", cidr.network(), cidr.prefix_len),
            ));
        }
        if !(16..=28).contains(&cidr.prefix_len) {
            return Err(Error::invalid_cidr(
                &self.config.cidr,
                "VPC block size must be between /16 and /28",
            ));
        }
        Ok(cidr)
    }

    fn declare_gateway(&self, stack: &mut Stack) -> Result<()> {
        stack.add_resource(
            Resource::new(IGW_ID, ResourceType::InternetGateway, json!({}))
                .with_tag("Name", self.ctx.stack_id.clone()),
        )?;
        stack.add_resource(Resource::new(
            IGW_ATTACHMENT_ID,
            ResourceType::VpcGatewayAttachment,
            json!({
                "VpcId": reference(VPC_ID),
                "InternetGatewayId": reference(IGW_ID),
            }),
        ))
    }

    fn declare_subnet(
        &self,
        stack: &mut Stack,
        tier: SubnetTier,
        az: usize,
        block: Ipv4Network,
    ) -> Result<String> {
        let subnet_id = tier.subnet_id(az);
        let route_table_id = format!("{}RouteTable", subnet_id);

        stack.add_resource(
            Resource::new(
                &subnet_id,
                ResourceType::Subnet,
                json!({
                    "VpcId": reference(VPC_ID),
                    "CidrBlock": block.to_string(),
                    "AvailabilityZone": availability_zone(az - 1),
                    "MapPublicIpOnLaunch": tier == SubnetTier::Public,
                }),
            )
            .with_tag("Name", self.ctx.resource_name(&format!("{} subnet {}", tier, az))),
        )?;
        stack.add_resource(
            Resource::new(
                &route_table_id,
                ResourceType::RouteTable,
                json!({ "VpcId": reference(VPC_ID) }),
            )
            .with_tag("Name", self.ctx.resource_name(&format!("{} subnet {}", tier, az))),
        )?;
        stack.add_resource(Resource::new(
            format!("{}RouteTableAssociation", subnet_id),
            ResourceType::SubnetRouteTableAssociation,
            json!({
                "SubnetId": reference(&subnet_id),
                "RouteTableId": reference(&route_table_id),
            }),
        ))?;

        match tier {
            SubnetTier::Public => {
                stack.add_resource(
                    Resource::new(
                        format!("{}DefaultRoute", subnet_id),
                        ResourceType::Route,
                        json!({
                            "RouteTableId": reference(&route_table_id),
                            "DestinationCidrBlock": "0.0.0.0/0",
                            "GatewayId": reference(IGW_ID),
                        }),
                    )
                    .depends_on(IGW_ATTACHMENT_ID),
                )?;
                let eip_id = format!("{}EIP", subnet_id);
                stack.add_resource(
                    Resource::new(&eip_id, ResourceType::Eip, json!({ "Domain": "vpc" }))
                        .with_tag("Name", self.ctx.resource_name(&format!("nat eip {}", az))),
                )?;
                stack.add_resource(
                    Resource::new(
                        format!("{}NATGateway", subnet_id),
                        ResourceType::NatGateway,
                        json!({
                            "AllocationId": get_att(&eip_id, "AllocationId"),
                            "SubnetId": reference(&subnet_id),
                        }),
                    )
                    .depends_on(format!("{}DefaultRoute", subnet_id))
                    .with_tag("Name", self.ctx.resource_name(&format!("nat {}", az))),
                )?;
            }
            SubnetTier::Private => {
                let nat_id = format!("{}NATGateway", SubnetTier::Public.subnet_id(az));
                stack.add_resource(Resource::new(
                    format!("{}DefaultRoute", subnet_id),
                    ResourceType::Route,
                    json!({
                        "RouteTableId": reference(&route_table_id),
                        "DestinationCidrBlock": "0.0.0.0/0",
                        "NatGatewayId": reference(&nat_id),
                    }),
                ))?;
            }
            SubnetTier::Isolated => {}
        }

        Ok(subnet_id)
    }
}

impl StackDescriptor for NetworkTopologyDescriptor<'_> {
    type Outputs = NetworkOutputs;

    fn kind(&self) -> StackKind {
        StackKind::Network
    }

    fn declare(&self) -> Result<(Stack, NetworkOutputs)> {
        let ctx = self.ctx;
        let cidr = self.vpc_block()?;
        let tiers = self.tiers();
        if self.config.max_azs == 0 {
            return Err(Error::invalid_config("network.max_azs", "must be at least 1"));
        }
        if tiers.contains(&SubnetTier::Private) && !tiers.contains(&SubnetTier::Public) {
            return Err(Error::invalid_config(
                "network.tiers",
                "private subnets route through NAT gateways in the public tier",
            ));
        }

        let mut stack = Stack::new(&ctx.stack_id, StackKind::Network)
            .with_description(format!("Network topology for {}", ctx.stack_id));

        stack.add_resource(
            Resource::new(
                VPC_ID,
                ResourceType::Vpc,
                json!({
                    "CidrBlock": cidr.to_string(),
                    "EnableDnsHostnames": true,
                    "EnableDnsSupport": true,
                    "InstanceTenancy": "default",
                }),
            )
            .with_tag("Name", ctx.stack_id.clone()),
        )?;
        if tiers.contains(&SubnetTier::Public) {
            self.declare_gateway(&mut stack)?;
        }

        let vpc_id = ExportRef::new(&ctx.stack_id, ctx.export_name(""));
        stack.add_output(
            Output::exported("OutputVPC", &vpc_id.export_name, reference(VPC_ID))
                .with_description("VPC id"),
        )?;

        let mut outputs = NetworkOutputs {
            vpc_id,
            public_subnets: Vec::new(),
            private_subnets: Vec::new(),
            isolated_subnets: Vec::new(),
        };

        let mut index = 0;
        for tier in tiers {
            for az in 1..=self.config.max_azs {
                let block = cidr.subnet(self.config.cidr_mask, index)?;
                index += 1;

                let subnet_id = self.declare_subnet(&mut stack, tier, az, block)?;
                let export = ExportRef::new(&ctx.stack_id, ctx.export_name(&subnet_id));
                stack.add_output(Output::exported(
                    format!("Output{}", subnet_id),
                    &export.export_name,
                    reference(&subnet_id),
                ))?;
                match tier {
                    SubnetTier::Public => outputs.public_subnets.push(export),
                    SubnetTier::Private => outputs.private_subnets.push(export),
                    SubnetTier::Isolated => outputs.isolated_subnets.push(export),
                }
            }
        }

        tracing::debug!(
            stack = %ctx.stack_id,
            cidr = %cidr,
            subnets = index,
            "declared network topology"
        );
        Ok((stack, outputs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn declare(config: &NetworkConfig) -> Result<(Stack, NetworkOutputs)> {
        let ctx = StackContext::new("shop", "dev", StackKind::Network);
        NetworkTopologyDescriptor::new(&ctx, config).declare()
    }

    #[test]
    fn test_parse_cidr() {
        let net: Ipv4Network = "10.0.0.0/16".parse().unwrap();
        assert_eq!(net.address, Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(net.prefix_len, 16);
        assert_eq!(net.to_string(), "10.0.0.0/16");
    }

    #[test]
    fn test_parse_cidr_errors() {
        assert!(matches!("10.0.0.0".parse::<Ipv4Network>(), Err(Error::InvalidCidr { .. })));
        assert!(matches!("10.0.0/16".parse::<Ipv4Network>(), Err(Error::InvalidCidr { .. })));
        assert!(matches!("10.0.0.0/33".parse::<Ipv4Network>(), Err(Error::InvalidCidr { .. })));
    }

    #[test]
    fn test_sequential_subnets() {
        let net: Ipv4Network = "10.0.0.0/16".parse().unwrap();
        assert_eq!(net.subnet(24, 0).unwrap().to_string(), "10.0.0.0/24");
        assert_eq!(net.subnet(24, 5).unwrap().to_string(), "10.0.5.0/24");
        assert_eq!(net.subnet_capacity(24), 256);
        assert!(net.subnet(24, 256).is_err());
        assert!(net.subnet(8, 0).is_err());
    }

    #[test]
    fn test_default_topology() {
        let (stack, outputs) = declare(&NetworkConfig::default()).unwrap();

        assert_eq!(stack.resources_of(ResourceType::Subnet).len(), 6);
        assert_eq!(stack.resources_of(ResourceType::NatGateway).len(), 2);
        assert_eq!(outputs.vpc_id.export_name, "ShopDevVpc");
        assert_eq!(outputs.subnets(SubnetTier::Isolated).len(), 2);
        assert_eq!(
            outputs.subnets(SubnetTier::Public)[0].export_name,
            "ShopDevVpcPublicSubnet1"
        );

        let vpc = stack.resource("VPC").unwrap();
        assert_eq!(vpc.property("EnableDnsHostnames"), Some(&json!(true)));

        let blocks: Vec<_> = stack
            .resources_of(ResourceType::Subnet)
            .iter()
            .map(|s| s.property("CidrBlock").cloned().unwrap())
            .collect();
        assert_eq!(blocks[0], json!("10.0.0.0/24"));
        assert_eq!(blocks[2], json!("10.0.2.0/24"));
        assert_eq!(blocks[5], json!("10.0.5.0/24"));
    }

    #[test]
    fn test_private_routes_through_nat_of_same_zone() {
        let (stack, _) = declare(&NetworkConfig::default()).unwrap();
        let route = stack.resource("PrivateSubnet2DefaultRoute").unwrap();
        assert_eq!(
            route.property("NatGatewayId"),
            Some(&json!({ "Ref": "PublicSubnet2NATGateway" }))
        );
        assert!(stack.resource("IsolatedSubnet1DefaultRoute").is_none());
    }

    #[test]
    fn test_vpc_too_small() {
        let config = NetworkConfig {
            cidr: "10.0.0.0/24".to_string(),
            ..NetworkConfig::default()
        };
        let err = declare(&config).unwrap_err();
        assert!(matches!(err, Error::InvalidCidr { .. }));
    }

    #[test]
    fn test_vpc_with_host_bits() {
        let config = NetworkConfig {
            cidr: "10.0.0.1/16".to_string(),
            ..NetworkConfig::default()
        };
        assert!(matches!(declare(&config), Err(Error::InvalidCidr { .. })));
    }

    #[test]
    fn test_private_tier_requires_public_tier() {
        let config = NetworkConfig {
            tiers: vec![SubnetTier::Private, SubnetTier::Isolated],
            ..NetworkConfig::default()
        };
        assert!(matches!(declare(&config), Err(Error::InvalidConfig { .. })));
    }
}
