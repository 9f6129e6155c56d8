//! # Stacksmith - Declarative AWS Infrastructure Stacks
//!
//! Stacksmith declares the cloud infrastructure of a project as a set of
//! stacks and composes them into a resource graph that an external
//! provisioning engine deploys. Nothing is deployed from here.
//!
//! ## Core Concepts
//!
//! - **Stacks**: a named group of resource declarations (network, compute,
//!   encryption key, object store, database)
//! - **Descriptors**: builders that turn configuration into one stack and its
//!   typed outputs
//! - **Exports**: named values one stack publishes and others import
//! - **Composer**: declares stacks in dependency order and checks every import
//! - **Tags**: the configured tag set plus a per-stack category tag, applied to
//!   every resource
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           CLI Interface                              │
//! │                    (clap-based command parsing)                      │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                          Stack Composer                              │
//! │        (composition plan, typed output slots, export registry)       │
//! └─────────────────────────────────────────────────────────────────────┘
//!                                    │
//!          ┌─────────────────────────┼─────────────────────────┐
//!          ▼                         ▼                         ▼
//! ┌─────────────────┐   ┌─────────────────────┐   ┌─────────────────────┐
//! │    Network /    │   │  Encryption key /   │   │      Database       │
//! │    Compute      │   │    Object store     │   │   (SQL Server RDS)  │
//! └─────────────────┘   └─────────────────────┘   └─────────────────────┘
//!          │                         │                         │
//!          └─────────────────────────┼─────────────────────────┘
//!                                    ▼
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                           Synthesizer                                │
//! │              (<stack>.template.json + manifest.json)                 │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Example
//!
//! ```rust,ignore
//! use stacksmith::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let config = Config::load(None)?;
//!     let plan = CompositionPlan::from_config(&config)?;
//!     let graph = StackComposer::new(&config)?.compose(&plan)?;
//!     Synthesizer::new("cdk.out").write(&graph)?;
//!     Ok(())
//! }
//! ```

#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod prelude {
    //! Convenient re-exports of commonly used types.

    pub use crate::composer::{CompositionPlan, StackComposer};
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::keypair::{ensure_key_pair, KeyPairError, KeyPairOutcome, KeyPairProvider};
    pub use crate::stacks::{
        AccessPolicyBinder, ComputeResourceDescriptor, EncryptionKeyDescriptor, InstanceType,
        ManagedDatabaseDescriptor, NetworkTopologyDescriptor, ObjectStoreDescriptor, PortRange,
        StackContext, StackDescriptor, StackKind,
    };
    pub use crate::tags::TagSet;
    pub use crate::template::synth::Synthesizer;
    pub use crate::template::{ResourceGraph, Stack};
}

// ============================================================================
// Core
// ============================================================================

pub mod error;

pub mod config;

pub mod naming;

// ============================================================================
// Declarations
// ============================================================================

pub mod secrets;

pub mod stacks;

pub mod tags;

pub mod template;

// ============================================================================
// Composition and provisioning
// ============================================================================

pub mod composer;

pub mod keypair;

pub use error::{Error, Result};

/// Crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
