//! Exposes the vkrg error type

use ash;
use gpu_allocator::AllocationError;
use thiserror::Error;

use crate::graph::key::{GlobalKey, Key};

/// Error type that vkrg can return.
///
/// Every structural error carries the key of the offending object. A structural error aborts the
/// [`compile()`](crate::RenderGraph::compile) call that raised it, the previously compiled plan stays valid.
#[derive(Error, Debug)]
pub enum Error {
    /// Generic Vulkan error type.
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// Vulkan allocation error.
    #[error("Vulkan allocation error: `{0}`")]
    AllocationError(AllocationError),
    /// A resource slot was reserved in its pool but never filled.
    #[error("Resource slot `{0}` was reserved but never filled.")]
    NullResource(GlobalKey),
    /// An input slot was reserved in its pool but never filled.
    #[error("Input slot `{1}` of pass `{0}` was reserved but never filled.")]
    NullInput(GlobalKey, Key),
    /// A pass slot was reserved in its pool but never filled.
    #[error("Pass slot `{0}` was reserved but never filled.")]
    NullPass(GlobalKey),
    /// An alias references a resource that does not exist.
    #[error("Resource `{0}` not found.")]
    ResourceNotFound(GlobalKey),
    /// An alias references an input that does not exist on its pass.
    #[error("Input `{1}` not found on pass `{0}`.")]
    InputNotFound(GlobalKey, Key),
    /// An alias or graph operation references a pass that does not exist.
    #[error("Pass `{0}` not found.")]
    PassNotFound(GlobalKey),
    /// An alias does not match the object it resolves to, either by resource type or because
    /// it names the output of a read-only input.
    #[error("Alias `{0}` does not match the object it refers to.")]
    AliasNoMatch(GlobalKey),
    /// A value was written by more than one input without an intervening read.
    #[error("Value of resource `{0}` is written more than once.")]
    MultipleWrite(GlobalKey),
    /// A write usage was declared on a last frame resource.
    #[error("Last frame resource `{0}` cannot be written to.")]
    WriteToLastFrame(GlobalKey),
    /// The pass graph contains a cycle.
    #[error("Pass graph contains a cycle through pass `{0}`.")]
    PassNotDAG(GlobalKey),
    /// The resource graph is not a forest.
    #[error("Resource `{0}` has more than one parent.")]
    ResourceNotTree(GlobalKey),
    /// A last frame resource was used as a combined image child or as a last frame target.
    #[error("Last frame resource `{0}` cannot have a parent.")]
    ResourceLFParent(GlobalKey),
    /// An external resource was used as a combined image child or as a last frame target.
    #[error("External resource `{0}` cannot have a parent.")]
    ResourceExtParent(GlobalKey),
    /// The sub-images of a combined image cannot be merged into a single image.
    #[error("Sub-images of `{0}` cannot be merged.")]
    ImageNotMerge(GlobalKey),
    /// A graph operation was applied to a resource or pass of the wrong kind, for example resizing an external image.
    #[error("`{0}` is not of the kind this operation requires.")]
    WrongKind(GlobalKey),
    /// Attachments can only be declared on graphics passes. Make sure the pass was created using
    /// [`PassBuilder::graphics()`](crate::PassBuilder::graphics)
    #[error("Tried to declare an attachment on a pass that is not a graphics pass.")]
    NoRenderpass,
    /// The usage given to an attachment function is not an attachment usage of that kind.
    #[error("Usage `{0:?}` is not valid here.")]
    InvalidUsage(crate::graph::usage::Usage),
    /// Two descriptor inputs of one pass use the same binding.
    #[error("Pass `{0}` uses descriptor binding `{1}` more than once.")]
    DuplicateBinding(GlobalKey, u32),
    /// A color attachment location or input attachment index is out of range.
    #[error("Attachment index `{0}` is out of range.")]
    InvalidAttachment(u32),
    /// Tried to record or query a graph that was never compiled successfully.
    #[error("Render graph has not been compiled.")]
    NotCompiled,
    /// No memory type satisfies the requirements of a group of resources.
    #[error("No memory type satisfies the requirements of `{0}`.")]
    NoMemoryType(GlobalKey),
    /// Tried to map a resource that does not live in host visible memory.
    #[error("Requested mapped pointer of `{0}`, but it does not have a memory map.")]
    UnmappableResource(GlobalKey),
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        Error::VkError(value)
    }
}

impl From<AllocationError> for Error {
    fn from(value: AllocationError) -> Self {
        Error::AllocationError(value)
    }
}
