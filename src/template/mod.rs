//! Declarative resource graph.
//!
//! A [`Stack`] is a set of [`Resource`] declarations plus the [`Output`]s it
//! exports to other stacks. Stacks render to CloudFormation-style templates; the
//! [`ResourceGraph`] is the ordered collection of composed stacks handed to the
//! external provisioning engine.

pub mod exports;
pub mod synth;

pub use exports::{ExportRef, ExportRegistry};
pub use synth::Synthesizer;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;

use crate::error::{Error, Result};
use crate::stacks::StackKind;

/// Resource types that Stacksmith declares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResourceType {
    Vpc,
    Subnet,
    InternetGateway,
    VpcGatewayAttachment,
    RouteTable,
    Route,
    SubnetRouteTableAssociation,
    NatGateway,
    Eip,
    SecurityGroup,
    SecurityGroupIngress,
    Instance,
    IamRole,
    IamManagedPolicy,
    InstanceProfile,
    KmsKey,
    KmsAlias,
    DbSubnetGroup,
    DbOptionGroup,
    DbInstance,
    Bucket,
}

impl ResourceType {
    /// The provisioning engine's type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Vpc => "AWS::EC2::VPC",
            ResourceType::Subnet => "AWS::EC2::Subnet",
            ResourceType::InternetGateway => "AWS::EC2::InternetGateway",
            ResourceType::VpcGatewayAttachment => "AWS::EC2::VPCGatewayAttachment",
            ResourceType::RouteTable => "AWS::EC2::RouteTable",
            ResourceType::Route => "AWS::EC2::Route",
            ResourceType::SubnetRouteTableAssociation => "AWS::EC2::SubnetRouteTableAssociation",
            ResourceType::NatGateway => "AWS::EC2::NatGateway",
            ResourceType::Eip => "AWS::EC2::EIP",
            ResourceType::SecurityGroup => "AWS::EC2::SecurityGroup",
            ResourceType::SecurityGroupIngress => "AWS::EC2::SecurityGroupIngress",
            ResourceType::Instance => "AWS::EC2::Instance",
            ResourceType::IamRole => "AWS::IAM::Role",
            ResourceType::IamManagedPolicy => "AWS::IAM::ManagedPolicy",
            ResourceType::InstanceProfile => "AWS::IAM::InstanceProfile",
            ResourceType::KmsKey => "AWS::KMS::Key",
            ResourceType::KmsAlias => "AWS::KMS::Alias",
            ResourceType::DbSubnetGroup => "AWS::RDS::DBSubnetGroup",
            ResourceType::DbOptionGroup => "AWS::RDS::OptionGroup",
            ResourceType::DbInstance => "AWS::RDS::DBInstance",
            ResourceType::Bucket => "AWS::S3::Bucket",
        }
    }

    /// Whether the engine accepts a `Tags` property for this type.
    pub fn is_taggable(&self) -> bool {
        !matches!(
            self,
            ResourceType::VpcGatewayAttachment
                | ResourceType::Route
                | ResourceType::SubnetRouteTableAssociation
                | ResourceType::SecurityGroupIngress
                | ResourceType::IamManagedPolicy
                | ResourceType::InstanceProfile
                | ResourceType::KmsAlias
        )
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What the engine does with a resource when its stack is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeletionPolicy {
    /// Delete the resource and its data
    #[default]
    Destroy,
    /// Keep the resource
    Retain,
    /// Take a final snapshot, then delete
    Snapshot,
}

impl DeletionPolicy {
    /// The template value for `DeletionPolicy`.
    pub fn as_template_str(&self) -> &'static str {
        match self {
            DeletionPolicy::Destroy => "Delete",
            DeletionPolicy::Retain => "Retain",
            DeletionPolicy::Snapshot => "Snapshot",
        }
    }
}

impl std::str::FromStr for DeletionPolicy {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "destroy" | "delete" => Ok(DeletionPolicy::Destroy),
            "retain" => Ok(DeletionPolicy::Retain),
            "snapshot" => Ok(DeletionPolicy::Snapshot),
            _ => Err(Error::invalid_config(
                "deletion_policy",
                format!("'{}' is not one of destroy, retain, snapshot", s),
            )),
        }
    }
}

/// A single declared resource.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    /// Logical id, unique within its stack
    pub logical_id: String,
    /// Resource type
    pub resource_type: ResourceType,
    /// Engine properties (without `Tags`)
    pub properties: Map<String, Value>,
    /// Logical ids this resource must be created after
    pub depends_on: Vec<String>,
    /// Deletion policy, when not the engine default
    pub deletion_policy: Option<DeletionPolicy>,
    /// Tags, filled in by tag propagation
    pub tags: IndexMap<String, String>,
}

impl Resource {
    /// Create a resource. Non-object property values are ignored.
    pub fn new(logical_id: impl Into<String>, resource_type: ResourceType, properties: Value) -> Self {
        let properties = match properties {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            logical_id: logical_id.into(),
            resource_type,
            properties,
            depends_on: Vec::new(),
            deletion_policy: None,
            tags: IndexMap::new(),
        }
    }

    /// Add an explicit creation dependency.
    pub fn depends_on(mut self, logical_id: impl Into<String>) -> Self {
        self.depends_on.push(logical_id.into());
        self
    }

    /// Set the deletion policy.
    pub fn with_deletion_policy(mut self, policy: DeletionPolicy) -> Self {
        self.deletion_policy = Some(policy);
        self
    }

    /// Set a resource-specific tag (e.g. `Name`).
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    /// Look up a property.
    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Render the template entry for this resource.
    pub fn to_template(&self) -> Value {
        let mut properties = self.properties.clone();
        if self.resource_type.is_taggable() && !self.tags.is_empty() {
            let tags: Vec<Value> = self
                .tags
                .iter()
                .map(|(k, v)| json!({ "Key": k, "Value": v }))
                .collect();
            properties.insert("Tags".to_string(), Value::Array(tags));
        }

        let mut entry = Map::new();
        entry.insert("Type".to_string(), json!(self.resource_type.as_str()));
        entry.insert("Properties".to_string(), Value::Object(properties));
        if !self.depends_on.is_empty() {
            entry.insert("DependsOn".to_string(), json!(self.depends_on));
        }
        if let Some(policy) = self.deletion_policy {
            entry.insert("DeletionPolicy".to_string(), json!(policy.as_template_str()));
            entry.insert(
                "UpdateReplacePolicy".to_string(),
                json!(policy.as_template_str()),
            );
        }
        Value::Object(entry)
    }
}

/// A stack output, optionally exported for other stacks.
#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub logical_id: String,
    pub value: Value,
    pub export_name: Option<String>,
    pub description: Option<String>,
}

impl Output {
    /// An output exported under `export_name`.
    pub fn exported(logical_id: impl Into<String>, export_name: impl Into<String>, value: Value) -> Self {
        Self {
            logical_id: logical_id.into(),
            value,
            export_name: Some(export_name.into()),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn to_template(&self) -> Value {
        let mut entry = Map::new();
        if let Some(ref description) = self.description {
            entry.insert("Description".to_string(), json!(description));
        }
        entry.insert("Value".to_string(), self.value.clone());
        if let Some(ref name) = self.export_name {
            entry.insert("Export".to_string(), json!({ "Name": name }));
        }
        Value::Object(entry)
    }
}

/// A composed stack.
#[derive(Debug, Clone)]
pub struct Stack {
    pub id: String,
    pub kind: StackKind,
    pub description: String,
    resources: IndexMap<String, Resource>,
    outputs: IndexMap<String, Output>,
}

impl Stack {
    pub fn new(id: impl Into<String>, kind: StackKind) -> Self {
        let description = format!("{} stack", kind.category());
        Self {
            id: id.into(),
            kind,
            description,
            resources: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a resource. Logical ids must be unique within the stack.
    pub fn add_resource(&mut self, resource: Resource) -> Result<()> {
        if self.resources.contains_key(&resource.logical_id) {
            return Err(Error::Config(format!(
                "Stack '{}' declares logical id '{}' twice",
                self.id, resource.logical_id
            )));
        }
        tracing::debug!(
            stack = %self.id,
            logical_id = %resource.logical_id,
            resource_type = %resource.resource_type,
            "declared resource"
        );
        self.resources.insert(resource.logical_id.clone(), resource);
        Ok(())
    }

    pub fn add_resources(&mut self, resources: impl IntoIterator<Item = Resource>) -> Result<()> {
        for resource in resources {
            self.add_resource(resource)?;
        }
        Ok(())
    }

    /// Add an output. Output logical ids must be unique within the stack.
    pub fn add_output(&mut self, output: Output) -> Result<()> {
        if self.outputs.contains_key(&output.logical_id) {
            return Err(Error::Config(format!(
                "Stack '{}' declares output '{}' twice",
                self.id, output.logical_id
            )));
        }
        self.outputs.insert(output.logical_id.clone(), output);
        Ok(())
    }

    pub fn resource(&self, logical_id: &str) -> Option<&Resource> {
        self.resources.get(logical_id)
    }

    pub fn resources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.values()
    }

    pub fn resources_mut(&mut self) -> impl Iterator<Item = &mut Resource> {
        self.resources.values_mut()
    }

    /// All resources of one type, in declaration order.
    pub fn resources_of(&self, resource_type: ResourceType) -> Vec<&Resource> {
        self.resources
            .values()
            .filter(|r| r.resource_type == resource_type)
            .collect()
    }

    pub fn outputs(&self) -> impl Iterator<Item = &Output> {
        self.outputs.values()
    }

    /// Names exported by this stack.
    pub fn export_names(&self) -> Vec<&str> {
        self.outputs
            .values()
            .filter_map(|o| o.export_name.as_deref())
            .collect()
    }

    /// Names this stack imports from other stacks.
    pub fn imports(&self) -> Vec<String> {
        let mut names = Vec::new();
        for resource in self.resources.values() {
            for value in resource.properties.values() {
                exports::collect_imports(value, &mut names);
            }
        }
        for output in self.outputs.values() {
            exports::collect_imports(&output.value, &mut names);
        }
        names.sort();
        names.dedup();
        names
    }

    /// Render the stack as a template document.
    pub fn to_template(&self) -> Value {
        let resources: Map<String, Value> = self
            .resources
            .iter()
            .map(|(id, r)| (id.clone(), r.to_template()))
            .collect();
        let mut template = Map::new();
        template.insert(
            "AWSTemplateFormatVersion".to_string(),
            json!("2010-09-09"),
        );
        template.insert("Description".to_string(), json!(self.description));
        template.insert("Resources".to_string(), Value::Object(resources));
        if !self.outputs.is_empty() {
            let outputs: Map<String, Value> = self
                .outputs
                .iter()
                .map(|(id, o)| (id.clone(), o.to_template()))
                .collect();
            template.insert("Outputs".to_string(), Value::Object(outputs));
        }
        Value::Object(template)
    }
}

/// The result of a composition pass.
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    /// Stacks in composition order
    pub stacks: Vec<Stack>,
    /// Stack id -> ids of the stacks it imports from
    pub dependencies: IndexMap<String, Vec<String>>,
    /// Every export registered during composition
    pub exports: ExportRegistry,
}

impl ResourceGraph {
    /// Stack ids in composition order.
    pub fn order(&self) -> Vec<&str> {
        self.stacks.iter().map(|s| s.id.as_str()).collect()
    }

    pub fn stack(&self, kind: StackKind) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.kind == kind)
    }

    pub fn stack_by_id(&self, id: &str) -> Option<&Stack> {
        self.stacks.iter().find(|s| s.id == id)
    }

    /// Total number of declared resources.
    pub fn resource_count(&self) -> usize {
        self.stacks.iter().map(|s| s.resources().count()).sum()
    }

    /// Manifest describing every stack, its category, dependencies and exports.
    pub fn to_manifest(&self) -> Value {
        let stacks: Vec<Value> = self
            .stacks
            .iter()
            .map(|stack| {
                json!({
                    "id": stack.id,
                    "kind": stack.kind,
                    "category": stack.kind.category(),
                    "template": format!("{}.template.json", stack.id),
                    "dependencies": self.dependencies.get(&stack.id).cloned().unwrap_or_default(),
                    "exports": stack.export_names(),
                })
            })
            .collect();
        json!({ "version": 1, "stacks": stacks })
    }
}

/// Intrinsic function values understood by the provisioning engine.
pub mod intrinsics {
    use serde_json::{json, Value};

    pub fn reference(logical_id: &str) -> Value {
        json!({ "Ref": logical_id })
    }

    pub fn get_att(logical_id: &str, attribute: &str) -> Value {
        json!({ "Fn::GetAtt": [logical_id, attribute] })
    }

    pub fn import_value(export_name: &str) -> Value {
        json!({ "Fn::ImportValue": export_name })
    }

    pub fn join(separator: &str, parts: Vec<Value>) -> Value {
        json!({ "Fn::Join": [separator, parts] })
    }

    /// The `index`-th availability zone of the stack's region.
    pub fn availability_zone(index: usize) -> Value {
        json!({ "Fn::Select": [index, { "Fn::GetAZs": "" }] })
    }

    /// Pseudo parameter for the deploying account.
    pub fn account_id() -> Value {
        reference("AWS::AccountId")
    }
}
