//! Access policy binding.
//!
//! The binder turns inbound rule declarations into security group ingress
//! resources on a target group. Sources are CIDR blocks, other security
//! groups (in the same stack or imported from another one), or the public IP
//! of an instance. This module also builds the IAM policy documents used by
//! roles, the key policy and the database backup policy.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use std::str::FromStr;

use super::network::Ipv4Network;
use crate::error::{Error, Result};
use crate::template::intrinsics::{get_att, join};
use crate::template::{Resource, ResourceType};

/// A closed port interval. A single port is `[N, N]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PortRange {
    pub from_port: u16,
    pub to_port: u16,
}

impl PortRange {
    pub fn single(port: u16) -> Self {
        Self {
            from_port: port,
            to_port: port,
        }
    }

    pub fn new(from_port: u16, to_port: u16) -> Result<Self> {
        if from_port > to_port {
            return Err(Error::invalid_port(
                format!("{}-{}", from_port, to_port),
                "lower bound is greater than upper bound",
            ));
        }
        Ok(Self { from_port, to_port })
    }

    /// Parse `"N"` or `"N-M"`.
    pub fn parse(spec: &str) -> Result<Self> {
        let bounds: Vec<&str> = spec.trim().split('-').collect();
        match bounds.as_slice() {
            [port] => Ok(Self::single(parse_bound(spec, port)?)),
            [from, to] => Self::new(parse_bound(spec, from)?, parse_bound(spec, to)?)
                .map_err(|e| match e {
                    Error::InvalidPortRange { message, .. } => Error::invalid_port(spec, message),
                    other => other,
                }),
            _ => Err(Error::invalid_port(spec, "expected N or N-M")),
        }
    }

    pub fn is_single(&self) -> bool {
        self.from_port == self.to_port
    }
}

fn parse_bound(spec: &str, bound: &str) -> Result<u16> {
    let value: i64 = bound
        .trim()
        .parse()
        .map_err(|_| Error::invalid_port(spec, format!("'{}' is not an integer", bound.trim())))?;
    u16::try_from(value)
        .map_err(|_| Error::invalid_port(spec, format!("{} is outside 0-65535", value)))
}

impl FromStr for PortRange {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_single() {
            write!(f, "{}", self.from_port)
        } else {
            write!(f, "{}-{}", self.from_port, self.to_port)
        }
    }
}

/// One port value as written in configuration: `443` or `"8000-8080"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortValue {
    Number(i64),
    Text(String),
}

impl PortValue {
    pub fn to_range(&self) -> Result<PortRange> {
        match self {
            PortValue::Number(n) => {
                let spec = n.to_string();
                Ok(PortRange::single(parse_bound(&spec, &spec)?))
            }
            PortValue::Text(s) => PortRange::parse(s),
        }
    }
}

/// The `port` field of an inbound rule: a single value or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PortSpec {
    One(PortValue),
    Many(Vec<PortValue>),
}

impl PortSpec {
    pub fn port(port: u16) -> Self {
        PortSpec::One(PortValue::Number(i64::from(port)))
    }

    pub fn ports(ports: &[u16]) -> Self {
        PortSpec::Many(ports.iter().map(|p| PortValue::Number(i64::from(*p))).collect())
    }

    /// One range per listed value.
    pub fn ranges(&self) -> Result<Vec<PortRange>> {
        match self {
            PortSpec::One(value) => Ok(vec![value.to_range()?]),
            PortSpec::Many(values) if values.is_empty() => {
                Err(Error::invalid_port("[]", "empty port list"))
            }
            PortSpec::Many(values) => values.iter().map(PortValue::to_range).collect(),
        }
    }
}

impl From<u16> for PortSpec {
    fn from(port: u16) -> Self {
        PortSpec::port(port)
    }
}

/// IP protocol of an ingress rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Tcp,
    Udp,
    Icmp,
    #[serde(alias = "-1")]
    All,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
            Protocol::All => "-1",
        }
    }
}

/// Where ingress traffic is allowed from.
#[derive(Debug, Clone, PartialEq)]
pub enum IngressSource {
    /// A CIDR block, literal or computed
    CidrIp(Value),
    /// A security group id token (`Ref`, `Fn::GetAtt` or `Fn::ImportValue`)
    SecurityGroup(Value),
}

impl IngressSource {
    /// A literal CIDR block. Host bits must be clear.
    pub fn cidr(cidr: &str) -> Result<Self> {
        let network: Ipv4Network = cidr.parse()?;
        if !network.is_network_address() {
            return Err(Error::invalid_cidr(
                cidr,
                format!(
                    "host bits set, did you mean {}/{}?",
                    network.network(),
                    network.prefix_len
                ),
            ));
        }
        Ok(IngressSource::CidrIp(Value::String(network.to_string())))
    }

    /// The public IP (`/32`) of an instance declared in the same stack.
    pub fn instance_public_ip(instance_logical_id: &str) -> Self {
        IngressSource::CidrIp(join(
            "",
            vec![get_att(instance_logical_id, "PublicIp"), json!("/32")],
        ))
    }

    pub fn security_group(group_id: Value) -> Self {
        IngressSource::SecurityGroup(group_id)
    }
}

/// A single ingress permission.
#[derive(Debug, Clone, PartialEq)]
pub struct IngressRule {
    pub source: IngressSource,
    pub protocol: Protocol,
    pub ports: PortRange,
    pub description: String,
}

impl IngressRule {
    pub fn new(source: IngressSource, ports: PortRange, description: impl Into<String>) -> Self {
        Self {
            source,
            protocol: Protocol::Tcp,
            ports,
            description: description.into(),
        }
    }

    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }

    /// Properties of the ingress resource granting this rule on `group_id`.
    pub fn to_properties(&self, group_id: &Value) -> Value {
        let mut props = Map::new();
        props.insert("GroupId".to_string(), group_id.clone());
        props.insert("IpProtocol".to_string(), json!(self.protocol.as_str()));
        props.insert("FromPort".to_string(), json!(self.ports.from_port));
        props.insert("ToPort".to_string(), json!(self.ports.to_port));
        if !self.description.is_empty() {
            props.insert("Description".to_string(), json!(self.description));
        }
        match &self.source {
            IngressSource::CidrIp(cidr) => {
                props.insert("CidrIp".to_string(), cidr.clone());
            }
            IngressSource::SecurityGroup(group) => {
                props.insert("SourceSecurityGroupId".to_string(), group.clone());
            }
        }
        Value::Object(props)
    }
}

/// An inbound rule as written in configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundRule {
    /// Source CIDR block
    pub ip: String,
    /// Port(s); the binder's default port when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<PortSpec>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub protocol: Protocol,
}

impl InboundRule {
    pub fn new(ip: impl Into<String>, port: Option<PortSpec>, description: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            port,
            description: description.into(),
            protocol: Protocol::Tcp,
        }
    }
}

/// Collects ingress rules for one target security group.
#[derive(Debug, Clone)]
pub struct AccessPolicyBinder {
    target: String,
    group_id: Value,
    rules: Vec<IngressRule>,
}

impl AccessPolicyBinder {
    /// `target` prefixes the logical ids of the emitted resources;
    /// `group_id` is the token of the target group.
    pub fn new(target: impl Into<String>, group_id: Value) -> Self {
        Self {
            target: target.into(),
            group_id,
            rules: Vec::new(),
        }
    }

    /// Bind configured inbound rules. Rules without a port use `default_port`.
    pub fn bind_inbounds(&mut self, inbounds: &[InboundRule], default_port: Option<u16>) -> Result<&mut Self> {
        for inbound in inbounds {
            let source = IngressSource::cidr(&inbound.ip)?;
            let ranges = match (&inbound.port, default_port) {
                (Some(spec), _) => spec.ranges()?,
                (None, Some(port)) => vec![PortRange::single(port)],
                (None, None) => {
                    return Err(Error::MissingField(format!("port (inbound rule {})", inbound.ip)))
                }
            };
            for ports in ranges {
                self.add_rule(
                    IngressRule::new(source.clone(), ports, inbound.description.clone())
                        .with_protocol(inbound.protocol),
                );
            }
        }
        Ok(self)
    }

    /// Allow a security group, local or imported.
    pub fn bind_security_group(
        &mut self,
        group_id: Value,
        ports: PortRange,
        description: impl Into<String>,
    ) -> &mut Self {
        self.add_rule(IngressRule::new(
            IngressSource::security_group(group_id),
            ports,
            description,
        ))
    }

    /// Allow the public IP of an instance in the same stack.
    pub fn bind_public_ip(
        &mut self,
        instance_logical_id: &str,
        ports: PortRange,
        description: impl Into<String>,
    ) -> &mut Self {
        self.add_rule(IngressRule::new(
            IngressSource::instance_public_ip(instance_logical_id),
            ports,
            description,
        ))
    }

    pub fn add_rule(&mut self, rule: IngressRule) -> &mut Self {
        tracing::trace!(
            target_group = %self.target,
            ports = %rule.ports,
            protocol = rule.protocol.as_str(),
            "bound ingress rule"
        );
        self.rules.push(rule);
        self
    }

    pub fn rules(&self) -> &[IngressRule] {
        &self.rules
    }

    /// One ingress resource per rule, `<target>Ingress<N>`.
    pub fn into_resources(self) -> Vec<Resource> {
        let AccessPolicyBinder {
            target,
            group_id,
            rules,
        } = self;
        rules
            .iter()
            .enumerate()
            .map(|(i, rule)| {
                Resource::new(
                    format!("{}Ingress{}", target, i + 1),
                    ResourceType::SecurityGroupIngress,
                    rule.to_properties(&group_id),
                )
            })
            .collect()
    }
}

/// A policy principal.
#[derive(Debug, Clone, PartialEq)]
pub enum Principal {
    /// Service principal (`rds.amazonaws.com`)
    Service(String),
    /// Account or role ARN
    Aws(Value),
}

/// One IAM policy statement. Every statement declared here grants access.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolicyStatement {
    pub sid: Option<String>,
    pub principals: Vec<Principal>,
    pub actions: Vec<String>,
    pub resources: Vec<Value>,
}

impl PolicyStatement {
    pub fn allow() -> Self {
        Self::default()
    }

    pub fn sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    pub fn principal(mut self, principal: Principal) -> Self {
        self.principals.push(principal);
        self
    }

    pub fn action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    pub fn actions<I, S>(mut self, actions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.actions.extend(actions.into_iter().map(Into::into));
        self
    }

    pub fn resource(mut self, resource: impl Into<Value>) -> Self {
        self.resources.push(resource.into());
        self
    }

    pub fn to_json(&self) -> Value {
        let mut statement = Map::new();
        if let Some(ref sid) = self.sid {
            statement.insert("Sid".to_string(), json!(sid));
        }
        statement.insert("Effect".to_string(), json!("Allow"));

        if !self.principals.is_empty() {
            let mut services = Vec::new();
            let mut accounts = Vec::new();
            for principal in &self.principals {
                match principal {
                    Principal::Service(s) => services.push(json!(s)),
                    Principal::Aws(arn) => accounts.push(arn.clone()),
                }
            }
            let mut principal = Map::new();
            if !accounts.is_empty() {
                principal.insert("AWS".to_string(), collapse(accounts));
            }
            if !services.is_empty() {
                principal.insert("Service".to_string(), collapse(services));
            }
            statement.insert("Principal".to_string(), Value::Object(principal));
        }

        statement.insert("Action".to_string(), collapse(self.actions.iter().map(|a| json!(a)).collect()));
        if !self.resources.is_empty() {
            statement.insert("Resource".to_string(), collapse(self.resources.clone()));
        }
        Value::Object(statement)
    }
}

/// A single element is written as a scalar, several as a list.
fn collapse(mut values: Vec<Value>) -> Value {
    if values.len() == 1 {
        values.remove(0)
    } else {
        Value::Array(values)
    }
}

/// An IAM policy document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PolicyDocument {
    pub statements: Vec<PolicyStatement>,
}

impl PolicyDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn statement(mut self, statement: PolicyStatement) -> Self {
        self.statements.push(statement);
        self
    }

    /// Trust policy letting a service assume a role.
    pub fn assume_role(service: &str) -> Self {
        Self::new().statement(
            PolicyStatement::allow()
                .principal(Principal::Service(service.to_string()))
                .action("sts:AssumeRole"),
        )
    }

    pub fn to_json(&self) -> Value {
        json!({
            "Version": "2012-10-17",
            "Statement": self.statements.iter().map(PolicyStatement::to_json).collect::<Vec<_>>(),
        })
    }
}
