//! Stack composition.
//!
//! The composer declares the stacks of a [`CompositionPlan`] one after the
//! other. Each descriptor receives the typed outputs of the stacks it imports
//! from; a missing upstream stack is an [`Error::UnresolvedReference`]. After
//! each stack is declared its imports are checked against the export registry
//! and its own exports are registered. Tag propagation runs last.

pub mod dependencies;

pub use dependencies::StackDependencyGraph;

use indexmap::IndexMap;

use crate::config::Config;
use crate::error::{Error, Result};
use crate::naming;
use crate::stacks::{
    ComputeOutputs, ComputeResourceDescriptor, DatabaseInputs, EncryptionKeyDescriptor, KeyOutputs,
    ManagedDatabaseDescriptor, NetworkOutputs, NetworkTopologyDescriptor, ObjectStoreDescriptor,
    ObjectStoreOutputs, StackContext, StackDescriptor, StackKind,
};
use crate::tags::TagSet;
use crate::template::{ExportRegistry, ResourceGraph, Stack};

/// The stacks to compose, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositionPlan {
    stacks: Vec<StackKind>,
    explicit: bool,
}

impl CompositionPlan {
    /// Every stack, dependencies first, ties broken by priority.
    pub fn default_plan() -> Result<Self> {
        let stacks = StackDependencyGraph::from_kinds(&StackKind::ALL)?.composition_order()?;
        Ok(Self {
            stacks,
            explicit: false,
        })
    }

    /// A plan followed literally. Stacks may not repeat.
    pub fn explicit(stacks: Vec<StackKind>) -> Result<Self> {
        let mut seen = Vec::with_capacity(stacks.len());
        for kind in &stacks {
            if seen.contains(kind) {
                return Err(Error::DuplicateStack(kind.to_string()));
            }
            seen.push(*kind);
        }
        Ok(Self {
            stacks,
            explicit: true,
        })
    }

    /// The configured plan, or the default plan.
    pub fn from_config(config: &Config) -> Result<Self> {
        match config.stacks {
            Some(ref stacks) => Self::explicit(stacks.clone()),
            None => Self::default_plan(),
        }
    }

    /// `selected` plus every stack they import from, dependencies first.
    pub fn with_dependencies_of(selected: &[StackKind]) -> Result<Self> {
        let full = StackDependencyGraph::from_kinds(&StackKind::ALL)?;
        let mut kinds: Vec<StackKind> = Vec::new();
        for kind in selected {
            for dependency in full.get_dependencies(*kind).into_iter().chain([*kind]) {
                if !kinds.contains(&dependency) {
                    kinds.push(dependency);
                }
            }
        }
        let stacks = StackDependencyGraph::from_kinds(&kinds)?.composition_order()?;
        Ok(Self {
            stacks,
            explicit: false,
        })
    }

    /// Dependency graph among the stacks of this plan.
    pub fn dependency_graph(&self) -> Result<StackDependencyGraph> {
        StackDependencyGraph::from_kinds(&self.stacks)
    }

    pub fn stacks(&self) -> &[StackKind] {
        &self.stacks
    }

    pub fn contains(&self, kind: StackKind) -> bool {
        self.stacks.contains(&kind)
    }

    pub fn is_explicit(&self) -> bool {
        self.explicit
    }

    pub fn len(&self) -> usize {
        self.stacks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}

/// Typed outputs of the stacks composed so far.
#[derive(Default)]
struct Slots {
    network: Option<NetworkOutputs>,
    compute: Option<ComputeOutputs>,
    key: Option<KeyOutputs>,
    object_store: Option<ObjectStoreOutputs>,
}

/// The outputs of `upstream`, or the error an import from it would raise.
fn require<'s, T>(slot: &'s Option<T>, ctx: &StackContext, upstream: StackKind) -> Result<&'s T> {
    slot.as_ref().ok_or_else(|| {
        Error::unresolved(
            &ctx.stack_id,
            format!(
                "{}{}",
                naming::parent_export_prefix(&ctx.stack_id),
                upstream.primary_export_suffix()
            ),
        )
    })
}

/// Composes stacks from configuration.
pub struct StackComposer<'a> {
    config: &'a Config,
    project: String,
    environment: String,
    keypair_name: Option<String>,
}

impl<'a> StackComposer<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        Ok(Self {
            config,
            project: config.project_name()?,
            environment: config.environment_name()?,
            keypair_name: config.keypair.name.clone(),
        })
    }

    /// Keypair the compute instances are launched with.
    pub fn with_keypair_name(mut self, name: impl Into<String>) -> Self {
        self.keypair_name = Some(name.into());
        self
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    /// Context for the stack of `kind`.
    pub fn context(&self, kind: StackKind) -> Result<StackContext> {
        let ctx = StackContext::new(&self.project, &self.environment, kind)
            .with_region(self.config.region.clone())
            .with_account(self.config.account.clone())
            .with_partition(self.config.partition);
        naming::validate_stack_id(&ctx.stack_id)?;
        Ok(ctx)
    }

    fn declare(&self, ctx: &StackContext, slots: &mut Slots) -> Result<Stack> {
        let config = self.config;
        let stack = match ctx.kind {
            StackKind::Network => {
                let (stack, outputs) = NetworkTopologyDescriptor::new(ctx, &config.network).declare()?;
                slots.network = Some(outputs);
                stack
            }
            StackKind::Compute => {
                let network = require(&slots.network, ctx, StackKind::Network)?;
                let (stack, outputs) = ComputeResourceDescriptor::new(ctx, &config.compute, network)
                    .with_key_name(self.keypair_name.as_deref())
                    .declare()?;
                slots.compute = Some(outputs);
                stack
            }
            StackKind::EncryptionKey => {
                let (stack, outputs) =
                    EncryptionKeyDescriptor::new(ctx, &config.encryption_key).declare()?;
                slots.key = Some(outputs);
                stack
            }
            StackKind::ObjectStore => {
                let (stack, outputs) =
                    ObjectStoreDescriptor::new(ctx, &config.object_store).declare()?;
                slots.object_store = Some(outputs);
                stack
            }
            StackKind::Database => {
                let inputs = DatabaseInputs {
                    network: require(&slots.network, ctx, StackKind::Network)?,
                    compute: require(&slots.compute, ctx, StackKind::Compute)?,
                    key: require(&slots.key, ctx, StackKind::EncryptionKey)?,
                    object_store: require(&slots.object_store, ctx, StackKind::ObjectStore)?,
                };
                ManagedDatabaseDescriptor::new(ctx, &config.database, inputs)
                    .declare()?
                    .0
            }
        };
        Ok(stack)
    }

    /// Compose every stack of `plan` into a resource graph.
    pub fn compose(&self, plan: &CompositionPlan) -> Result<ResourceGraph> {
        let mut slots = Slots::default();
        let mut registry = ExportRegistry::new();
        let mut stacks: Vec<Stack> = Vec::with_capacity(plan.len());
        let mut dependencies: IndexMap<String, Vec<String>> = IndexMap::new();

        for kind in plan.stacks() {
            let ctx = self.context(*kind)?;
            if stacks.iter().any(|s| s.id == ctx.stack_id) {
                return Err(Error::DuplicateStack(ctx.stack_id));
            }

            let stack = self.declare(&ctx, &mut slots)?;

            let mut upstream: Vec<String> = Vec::new();
            for import in stack.imports() {
                let exporter = registry.resolve(&stack.id, &import)?;
                if !upstream.iter().any(|s| s == exporter) {
                    upstream.push(exporter.to_string());
                }
            }
            upstream.sort_by_key(|id| stacks.iter().position(|s| &s.id == id));
            for export in stack.export_names() {
                registry.register(&stack.id, export)?;
            }

            tracing::info!(
                stack = %stack.id,
                resources = stack.resources().count(),
                imports_from = ?upstream,
                "composed stack"
            );
            dependencies.insert(stack.id.clone(), upstream);
            stacks.push(stack);
        }

        let tags = TagSet::from_config(&self.config.tags);
        for stack in &mut stacks {
            tags.apply(stack);
        }

        Ok(ResourceGraph {
            stacks,
            dependencies,
            exports: registry,
        })
    }
}
