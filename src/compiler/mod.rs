//! The compiler turns a declared [`RenderGraph`](crate::RenderGraph) into an executable plan.
//!
//! Compilation runs in phases, each of which consumes the output of the phases before it:
//! ```text
//! Collection -> Dependency -> Metadata -> Schedule -> Allocation -> Descriptor -> Command
//! ```
//! Every phase is a plain struct, created from scratch whenever one of its inputs changed. The graph keeps a dirty mask
//! of phases (see [`CompilePhase`](crate::CompilePhase)) and only recreates the phases that are dirty.
//!
//! Phases refer to passes, inputs and resources through small dense ids handed out by [`Collection`], so derived state
//! never has to be stored on the declared objects themselves.

pub mod allocation;
pub mod collection;
pub mod command;
pub mod dependency;
pub mod descriptor;
pub mod metadata;
pub(crate) mod record;
pub mod schedule;

/// Index of a leaf pass in the [`Collection`](collection::Collection).
pub type PassId = usize;
/// Index of an input in the [`Collection`](collection::Collection).
pub type InputId = usize;
/// Index of a resource in the [`Collection`](collection::Collection).
pub type ResourceId = usize;
/// Index of a value in the [`Dependency`](dependency::Dependency) phase.
pub type ValueId = usize;
/// Dense index of a physical (root) resource.
pub type PhysId = usize;
