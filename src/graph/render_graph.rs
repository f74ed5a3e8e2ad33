//! The [`RenderGraph`] owns the declared graph and the output of every compiler phase.
//!
//! Passes and resources are declared into pools, keyed by [`GlobalKey`]. Every mutation of the declared graph marks
//! the compiler phases it invalidates as dirty, and [`RenderGraph::compile()`] reruns exactly those phases.
//!
//! # Example
//! ```ignore
//! use vkrg::prelude::*;
//!
//! let mut graph = RenderGraph::new(device, GraphConfigBuilder::new().canvas(1280, 720).build());
//! graph.create_resource("color", ManagedImage::new(vk::Format::R8G8B8A8_UNORM, ImageSize::canvas()))?;
//! graph.create_pass(
//!     "draw",
//!     PassBuilder::graphics()
//!         .clear_color_attachment_input(Key::new("out"), 0, Alias::image("color"), ClearColor::Float([0.0; 4]))?
//!         .execute_fn(|ctx| {
//!             // Record draw commands into ctx.cmd()
//!             Ok(())
//!         })
//!         .build(),
//! )?;
//! graph.add_result(Key::new("final"), Alias::image_output("draw", Key::new("out")));
//! graph.compile()?;
//!
//! // Every frame
//! graph.cmd_execute(&mut cmd, frame)?;
//! ```

use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::command_buffer::CommandRecorder;
use crate::compiler::allocation::Allocation;
use crate::compiler::collection::Collection;
use crate::compiler::command::Command;
use crate::compiler::dependency::Dependency;
use crate::compiler::descriptor::Descriptor;
use crate::compiler::metadata::Metadata;
use crate::compiler::record::{self, Bindings, Plan};
use crate::compiler::schedule::Schedule;
use crate::compiler::{PassId, ResourceId};
use crate::core::config::GraphConfig;
use crate::core::traits::Device;
use crate::graph::alias::Alias;
use crate::graph::event::{CompilePhase, GraphEvent};
use crate::graph::input::Input;
use crate::graph::key::{GlobalKey, Key};
use crate::graph::pass::{share_executor, Pass, PassExecutor, PassKind, RenderArea};
use crate::graph::pool::Pool;
use crate::graph::resource::{
    share_init, BufferSize, ExternalBuffer, ExternalImage, ExternalState, ImageSize, LastFrameInitFn, MapType, Resource,
    ResourceType,
};
use crate::Error;

/// The declared graph: root pools, results and the canvas size.
#[derive(Debug)]
pub struct GraphDesc {
    passes: Pool<Pass>,
    resources: Pool<Resource>,
    results: Pool<Alias>,
    canvas: vk::Extent2D,
}

impl GraphDesc {
    pub(crate) fn new(canvas: vk::Extent2D) -> Self {
        Self {
            passes: Pool::new(),
            resources: Pool::new(),
            results: Pool::new(),
            canvas,
        }
    }

    pub fn passes(&self) -> &Pool<Pass> {
        &self.passes
    }

    pub fn resources(&self) -> &Pool<Resource> {
        &self.resources
    }

    /// Aliases to the values the graph must produce. Passes that do not contribute to a result are culled.
    pub fn results(&self) -> &Pool<Alias> {
        &self.results
    }

    pub fn canvas(&self) -> vk::Extent2D {
        self.canvas
    }

    /// The pass pool owned by `owner`, which is either the root or a pass group.
    fn pass_pool(&self, owner: &GlobalKey) -> Option<&Pool<Pass>> {
        if owner.is_root() {
            return Some(&self.passes);
        }
        self.pass(owner)?.group().map(|group| &group.passes)
    }

    fn pass_pool_mut(&mut self, owner: &GlobalKey) -> Option<&mut Pool<Pass>> {
        if owner.is_root() {
            return Some(&mut self.passes);
        }
        self.pass_mut(owner)?.group_mut().map(|group| &mut group.passes)
    }

    fn resource_pool(&self, owner: &GlobalKey) -> Option<&Pool<Resource>> {
        if owner.is_root() {
            return Some(&self.resources);
        }
        self.pass(owner)?.group().map(|group| &group.resources)
    }

    fn resource_pool_mut(&mut self, owner: &GlobalKey) -> Option<&mut Pool<Resource>> {
        if owner.is_root() {
            return Some(&mut self.resources);
        }
        self.pass_mut(owner)?.group_mut().map(|group| &mut group.resources)
    }

    pub fn pass(&self, key: &GlobalKey) -> Option<&Pass> {
        let last = key.last()?;
        self.pass_pool(&key.parent())?.get(&last)
    }

    pub fn pass_mut(&mut self, key: &GlobalKey) -> Option<&mut Pass> {
        let last = key.last()?;
        self.pass_pool_mut(&key.parent())?.get_mut(&last)
    }

    pub fn input(&self, pass: &GlobalKey, input: Key) -> Option<&Input> {
        self.pass(pass)?.inputs.get(&input)
    }

    pub fn resource(&self, key: &GlobalKey) -> Option<&Resource> {
        let last = key.last()?;
        self.resource_pool(&key.parent())?.get(&last)
    }

    pub fn resource_mut(&mut self, key: &GlobalKey) -> Option<&mut Resource> {
        let last = key.last()?;
        self.resource_pool_mut(&key.parent())?.get_mut(&last)
    }
}

/// A render graph together with its compiled plan.
///
/// All GPU objects of the plan are created through the [`Device`] the graph was created with, and destroyed when the
/// phase owning them is recompiled or the graph is dropped.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RenderGraph<D: Device> {
    #[derivative(Debug = "ignore")]
    device: D,
    config: GraphConfig,
    desc: GraphDesc,
    dirty: CompilePhase,
    last_compiled: CompilePhase,
    collection: Option<Collection>,
    dependency: Option<Dependency>,
    metadata: Option<Metadata>,
    schedule: Option<Schedule>,
    allocation: Option<Allocation<D>>,
    descriptor: Option<Descriptor<D>>,
    command: Option<Command<D>>,
    #[derivative(Debug = "ignore")]
    bindings: Option<Bindings>,
    /// Set when memory was (re)allocated and no frame has been recorded since.
    fresh: bool,
}

fn phase<'a, T>(rebuilt: &'a Option<T>, cached: &'a Option<T>) -> Result<&'a T> {
    rebuilt
        .as_ref()
        .or(cached.as_ref())
        .ok_or_else(|| Error::NotCompiled.into())
}

impl<D: Device> RenderGraph<D> {
    /// Create an empty render graph. Nothing is compiled until [`RenderGraph::compile()`] is called.
    pub fn new(device: D, config: GraphConfig) -> Self {
        RenderGraph {
            device,
            config,
            desc: GraphDesc::new(config.canvas),
            dirty: CompilePhase::all(),
            last_compiled: CompilePhase::empty(),
            collection: None,
            dependency: None,
            metadata: None,
            schedule: None,
            allocation: None,
            descriptor: None,
            command: None,
            bindings: None,
            fresh: false,
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn desc(&self) -> &GraphDesc {
        &self.desc
    }

    /// Phases that will rerun on the next compile.
    pub fn dirty(&self) -> CompilePhase {
        self.dirty
    }

    /// Phases that were rerun by the last successful compile.
    pub fn last_compiled(&self) -> CompilePhase {
        self.last_compiled
    }

    fn mark(&mut self, event: GraphEvent) {
        trace!("Graph event {event:?}");
        self.dirty |= event.dirty().with_consumers();
    }

    fn owner_exists(&self, owner: &GlobalKey) -> Result<()> {
        if owner.is_root() || self.desc.pass(owner).map_or(false, Pass::is_group) {
            Ok(())
        } else {
            Err(Error::PassNotFound(owner.clone()).into())
        }
    }

    /* Resources */

    /// Declare a resource. The parent of `key` must be the root or a pass group. Replaces any resource
    /// already declared with this key.
    pub fn create_resource(&mut self, key: impl Into<GlobalKey>, resource: impl Into<Resource>) -> Result<()> {
        let key = key.into();
        let last = key.last().ok_or_else(|| Error::ResourceNotFound(key.clone()))?;
        let owner = key.parent();
        self.owner_exists(&owner)?;
        let pool = self
            .desc
            .resource_pool_mut(&owner)
            .ok_or_else(|| Error::PassNotFound(owner.clone()))?;
        pool.insert(last, resource.into());
        self.mark(GraphEvent::ResourceChanged);
        Ok(())
    }

    /// Reserve a resource slot to be filled later. Compiling while the slot is empty fails with
    /// [`Error::NullResource`].
    pub fn reserve_resource(&mut self, key: impl Into<GlobalKey>) -> Result<()> {
        let key = key.into();
        let last = key.last().ok_or_else(|| Error::ResourceNotFound(key.clone()))?;
        let owner = key.parent();
        self.owner_exists(&owner)?;
        let pool = self
            .desc
            .resource_pool_mut(&owner)
            .ok_or_else(|| Error::PassNotFound(owner.clone()))?;
        if pool.reserve(last) {
            self.mark(GraphEvent::ResourceChanged);
        }
        Ok(())
    }

    /// Fill a reserved resource slot.
    pub fn fill_resource(&mut self, key: impl Into<GlobalKey>, resource: impl Into<Resource>) -> Result<()> {
        let key = key.into();
        let last = key.last().ok_or_else(|| Error::ResourceNotFound(key.clone()))?;
        let pool = self
            .desc
            .resource_pool_mut(&key.parent())
            .ok_or_else(|| Error::ResourceNotFound(key.clone()))?;
        if pool.fill(last, resource.into()).is_err() {
            return Err(Error::ResourceNotFound(key).into());
        }
        self.mark(GraphEvent::ResourceChanged);
        Ok(())
    }

    pub fn remove_resource(&mut self, key: impl Into<GlobalKey>) -> Result<Option<Resource>> {
        let key = key.into();
        let last = key.last().ok_or_else(|| Error::ResourceNotFound(key.clone()))?;
        let pool = self
            .desc
            .resource_pool_mut(&key.parent())
            .ok_or_else(|| Error::ResourceNotFound(key.clone()))?;
        if !pool.contains(&last) {
            return Err(Error::ResourceNotFound(key).into());
        }
        let resource = pool.remove(&last);
        self.mark(GraphEvent::ResourceChanged);
        Ok(resource)
    }

    fn resource_mut(&mut self, key: &GlobalKey) -> Result<&mut Resource> {
        self.desc
            .resource_mut(key)
            .ok_or_else(|| Error::ResourceNotFound(key.clone()).into())
    }

    /* Passes */

    /// Declare a pass. The parent of `key` must be the root or a pass group. Replaces any pass already declared
    /// with this key.
    pub fn create_pass(&mut self, key: impl Into<GlobalKey>, pass: Pass) -> Result<()> {
        let key = key.into();
        let last = key.last().ok_or_else(|| Error::PassNotFound(key.clone()))?;
        let owner = key.parent();
        self.owner_exists(&owner)?;
        let pool = self
            .desc
            .pass_pool_mut(&owner)
            .ok_or_else(|| Error::PassNotFound(owner.clone()))?;
        pool.insert(last, pass);
        self.mark(GraphEvent::PassChanged);
        Ok(())
    }

    /// Reserve a pass slot to be filled later. Compiling while the slot is empty fails with [`Error::NullPass`].
    pub fn reserve_pass(&mut self, key: impl Into<GlobalKey>) -> Result<()> {
        let key = key.into();
        let last = key.last().ok_or_else(|| Error::PassNotFound(key.clone()))?;
        let owner = key.parent();
        self.owner_exists(&owner)?;
        let pool = self
            .desc
            .pass_pool_mut(&owner)
            .ok_or_else(|| Error::PassNotFound(owner.clone()))?;
        if pool.reserve(last) {
            self.mark(GraphEvent::PassChanged);
        }
        Ok(())
    }

    pub fn fill_pass(&mut self, key: impl Into<GlobalKey>, pass: Pass) -> Result<()> {
        let key = key.into();
        let last = key.last().ok_or_else(|| Error::PassNotFound(key.clone()))?;
        let pool = self
            .desc
            .pass_pool_mut(&key.parent())
            .ok_or_else(|| Error::PassNotFound(key.clone()))?;
        if pool.fill(last, pass).is_err() {
            return Err(Error::PassNotFound(key).into());
        }
        self.mark(GraphEvent::PassChanged);
        Ok(())
    }

    /// Remove a pass. Removing a pass group removes everything declared inside it.
    pub fn remove_pass(&mut self, key: impl Into<GlobalKey>) -> Result<Option<Pass>> {
        let key = key.into();
        let last = key.last().ok_or_else(|| Error::PassNotFound(key.clone()))?;
        let pool = self
            .desc
            .pass_pool_mut(&key.parent())
            .ok_or_else(|| Error::PassNotFound(key.clone()))?;
        if !pool.contains(&last) {
            return Err(Error::PassNotFound(key).into());
        }
        let pass = pool.remove(&last);
        self.mark(GraphEvent::PassChanged);
        Ok(pass)
    }

    fn pass_mut(&mut self, key: &GlobalKey) -> Result<&mut Pass> {
        self.desc
            .pass_mut(key)
            .ok_or_else(|| Error::PassNotFound(key.clone()).into())
    }

    /// Add or replace an input of a declared pass.
    /// # Errors
    /// * Fails if the input uses an attachment usage and the pass is not a graphics pass.
    pub fn set_input(&mut self, pass: impl Into<GlobalKey>, key: Key, input: Input) -> Result<()> {
        let pass_key = pass.into();
        let pass = self.pass_mut(&pass_key)?;
        input.validate(pass.is_graphics())?;
        pass.inputs.insert(key, input);
        self.mark(GraphEvent::InputChanged);
        Ok(())
    }

    /// Fill an input slot reserved with [`PassBuilder::reserve_input()`](crate::PassBuilder::reserve_input).
    pub fn fill_input(&mut self, pass: impl Into<GlobalKey>, key: Key, input: Input) -> Result<()> {
        let pass_key = pass.into();
        let pass = self.pass_mut(&pass_key)?;
        input.validate(pass.is_graphics())?;
        if pass.inputs.fill(key, input).is_err() {
            return Err(Error::InputNotFound(pass_key, key).into());
        }
        self.mark(GraphEvent::InputChanged);
        Ok(())
    }

    pub fn remove_input(&mut self, pass: impl Into<GlobalKey>, key: Key) -> Result<Option<Input>> {
        let pass_key = pass.into();
        let pass = self.pass_mut(&pass_key)?;
        if !pass.inputs.contains(&key) {
            return Err(Error::InputNotFound(pass_key, key).into());
        }
        let input = pass.inputs.remove(&key);
        self.mark(GraphEvent::InputChanged);
        Ok(input)
    }

    /// Replace the executor of a pass. Does not require a recompile.
    pub fn set_executor(&mut self, pass: impl Into<GlobalKey>, exec: impl PassExecutor + 'static) -> Result<()> {
        let pass_key = pass.into();
        let exec = share_executor(exec);
        self.pass_mut(&pass_key)?.execute = exec.clone();
        if let (Some(collection), Some(bindings)) = (&self.collection, &mut self.bindings) {
            if let Some(id) = collection.pass_id(&pass_key) {
                bindings.set_executor(id, exec);
            }
        }
        Ok(())
    }

    /* Results */

    /// Declare a value the graph must produce. Replaces any result with the same key.
    pub fn add_result(&mut self, key: Key, alias: Alias) {
        self.desc.results.insert(key, alias);
        self.mark(GraphEvent::ResultChanged);
    }

    pub fn remove_result(&mut self, key: Key) -> Result<Alias> {
        let alias = self
            .desc
            .results
            .remove(&key)
            .ok_or_else(|| Error::ResourceNotFound(GlobalKey::from(key)))?;
        self.mark(GraphEvent::ResultChanged);
        Ok(alias)
    }

    /// Remove the result `key` if it is declared, otherwise declare it as `alias`. Returns whether the result
    /// is declared afterwards.
    pub fn toggle_result(&mut self, key: Key, alias: Alias) -> bool {
        let enabled = match self.desc.results.remove(&key) {
            Some(_) => false,
            None => {
                self.desc.results.insert(key, alias);
                true
            }
        };
        self.mark(GraphEvent::ResultChanged);
        enabled
    }

    /* Sizes */

    pub fn canvas_size(&self) -> vk::Extent2D {
        self.desc.canvas
    }

    /// Resize the canvas. Canvas sized resources are reallocated on the next compile.
    pub fn set_canvas_size(&mut self, width: u32, height: u32) {
        let canvas = vk::Extent2D {
            width,
            height,
        };
        if canvas != self.desc.canvas {
            self.desc.canvas = canvas;
            self.mark(GraphEvent::CanvasResized);
        }
    }

    /// Override the render area of a graphics pass, or derive it from its attachments again with `None`.
    pub fn set_render_area(&mut self, pass: impl Into<GlobalKey>, area: Option<RenderArea>) -> Result<()> {
        let key = pass.into();
        let pass = self.pass_mut(&key)?;
        match &mut pass.kind {
            PassKind::Graphics(render_area) => *render_area = area,
            _ => return Err(Error::WrongKind(key).into()),
        }
        self.mark(GraphEvent::RenderAreaChanged);
        Ok(())
    }

    pub fn set_image_size(&mut self, resource: impl Into<GlobalKey>, size: impl Into<ImageSize>) -> Result<()> {
        let key = resource.into();
        match self.resource_mut(&key)? {
            Resource::ManagedImage(image) => image.size = size.into(),
            _ => return Err(Error::WrongKind(key).into()),
        }
        self.mark(GraphEvent::ImageResized);
        Ok(())
    }

    pub fn set_buffer_size(&mut self, resource: impl Into<GlobalKey>, size: BufferSize) -> Result<()> {
        let key = resource.into();
        match self.resource_mut(&key)? {
            Resource::ManagedBuffer(buffer) => buffer.size = size,
            _ => return Err(Error::WrongKind(key).into()),
        }
        self.mark(GraphEvent::BufferResized);
        Ok(())
    }

    /* Memory */

    /// Make a managed resource keep its contents between frames.
    pub fn set_persistence(&mut self, resource: impl Into<GlobalKey>, persistent: bool) -> Result<()> {
        let key = resource.into();
        let previous = match self.resource_mut(&key)? {
            Resource::ManagedImage(image) => std::mem::replace(&mut image.persistent, persistent),
            Resource::ManagedBuffer(buffer) => std::mem::replace(&mut buffer.persistent, persistent),
            _ => return Err(Error::WrongKind(key).into()),
        };
        if previous != persistent {
            self.mark(GraphEvent::PersistenceChanged);
        }
        Ok(())
    }

    pub fn set_map_type(&mut self, resource: impl Into<GlobalKey>, map_type: MapType) -> Result<()> {
        let key = resource.into();
        let previous = match self.resource_mut(&key)? {
            Resource::ManagedBuffer(buffer) => std::mem::replace(&mut buffer.map_type, map_type),
            _ => return Err(Error::WrongKind(key).into()),
        };
        if previous != map_type {
            self.mark(GraphEvent::MapTypeChanged);
        }
        Ok(())
    }

    /* External resources */

    /// Change the states an external resource is in at the start and must be left in at the end of a frame.
    pub fn set_external_state(&mut self, resource: impl Into<GlobalKey>, src: ExternalState, dst: ExternalState) -> Result<()> {
        let key = resource.into();
        let changed = match self.resource_mut(&key)? {
            Resource::ExternalImage(image) => {
                let changed = image.src != src || image.dst != dst;
                image.src = src;
                image.dst = dst;
                changed
            }
            Resource::ExternalBuffer(buffer) => {
                let changed = buffer.src != src || buffer.dst != dst;
                buffer.src = src;
                buffer.dst = dst;
                changed
            }
            _ => return Err(Error::WrongKind(key).into()),
        };
        if changed {
            self.mark(GraphEvent::ExternalStateChanged);
        }
        Ok(())
    }

    /// Point an external image at a new handle, for example the swapchain image acquired this frame.
    ///
    /// Changing only the handles is cheap: barriers and framebuffers resolve external handles every frame, and only
    /// the descriptor sets are rewritten.
    pub fn set_external_image(&mut self, resource: impl Into<GlobalKey>, image: ExternalImage) -> Result<()> {
        let key = resource.into();
        let Resource::ExternalImage(current) = self.resource_mut(&key)? else {
            return Err(Error::WrongKind(key).into());
        };
        let resized = current.format != image.format
            || current.extent != image.extent
            || current.layers != image.layers
            || current.usage != image.usage;
        let state = current.src != image.src || current.dst != image.dst;
        let handles = current.image != image.image || current.view != image.view;
        *current = image;

        if resized {
            self.mark(GraphEvent::ImageResized);
        }
        if state {
            self.mark(GraphEvent::ExternalStateChanged);
        }
        if handles {
            self.mark(GraphEvent::ExternalHandleChanged);
        }
        Ok(())
    }

    pub fn set_external_buffer(&mut self, resource: impl Into<GlobalKey>, buffer: ExternalBuffer) -> Result<()> {
        let key = resource.into();
        let Resource::ExternalBuffer(current) = self.resource_mut(&key)? else {
            return Err(Error::WrongKind(key).into());
        };
        let resized = current.size != buffer.size;
        let state = current.src != buffer.src || current.dst != buffer.dst;
        let handles = current.buffer != buffer.buffer;
        *current = buffer;

        if resized {
            self.mark(GraphEvent::BufferResized);
        }
        if state {
            self.mark(GraphEvent::ExternalStateChanged);
        }
        if handles {
            self.mark(GraphEvent::ExternalHandleChanged);
        }
        Ok(())
    }

    /// Set or clear the initialization callback of a last frame resource.
    pub fn set_last_frame_init(&mut self, resource: impl Into<GlobalKey>, init: Option<LastFrameInitFn>) -> Result<()> {
        let key = resource.into();
        let init = init.map(share_init);
        let shared = init.clone();
        let had_init = match self.resource_mut(&key)? {
            Resource::LastFrameImage(image) => std::mem::replace(&mut image.init, init).is_some(),
            Resource::LastFrameBuffer(buffer) => std::mem::replace(&mut buffer.init, init).is_some(),
            _ => return Err(Error::WrongKind(key).into()),
        };
        let has_init = shared.is_some();
        // Swapping one callback for another needs no recompile.
        if had_init != has_init {
            self.mark(GraphEvent::LastFrameInitChanged);
        } else if let (Some(collection), Some(bindings)) = (&self.collection, &mut self.bindings) {
            if let Some(id) = collection.resource_id(&key) {
                let ty = self.desc.resource(&key).map_or(ResourceType::Image, Resource::ty);
                bindings.set_init(id, shared, ty);
            }
        }
        Ok(())
    }

    /* Compilation */

    /// Rerun every dirty phase, in dependency order, and return the phases that ran.
    ///
    /// The new plan is only committed once every dirty phase succeeded. If any phase fails, the previous plan
    /// stays in place and the same phases are retried on the next call.
    ///
    /// Objects of replaced phases are destroyed immediately, so the caller must make sure the GPU no longer uses them.
    pub fn compile(&mut self) -> Result<CompilePhase> {
        let dirty = self.dirty;
        if dirty.is_empty() {
            self.last_compiled = CompilePhase::empty();
            return Ok(self.last_compiled);
        }
        debug!("Compiling render graph, dirty phases: {dirty:?}");

        let desc = &self.desc;
        let collection = match dirty.contains(CompilePhase::COLLECTION) {
            true => Some(Collection::create(desc)?),
            false => None,
        };
        let collection_ref = phase(&collection, &self.collection)?;

        let dependency = match dirty.contains(CompilePhase::DEPENDENCY) {
            true => Some(Dependency::create(desc, collection_ref)?),
            false => None,
        };
        let dependency_ref = phase(&dependency, &self.dependency)?;

        let metadata = match dirty.contains(CompilePhase::METADATA) {
            true => Some(Metadata::create(desc, collection_ref, dependency_ref)?),
            false => None,
        };
        let metadata_ref = phase(&metadata, &self.metadata)?;

        let schedule = match dirty.contains(CompilePhase::SCHEDULE) {
            true => Some(Schedule::create(desc, collection_ref, dependency_ref, metadata_ref, &self.config)?),
            false => None,
        };
        let schedule_ref = phase(&schedule, &self.schedule)?;

        let allocation = match dirty.contains(CompilePhase::ALLOCATION) {
            true => Some(Allocation::create(
                &self.device,
                desc,
                collection_ref,
                dependency_ref,
                metadata_ref,
                schedule_ref,
                &self.config,
            )?),
            false => None,
        };
        let allocation_ref = phase(&allocation, &self.allocation)?;

        let descriptor = match dirty.contains(CompilePhase::DESCRIPTOR) {
            true => Some(Descriptor::create(
                &self.device,
                desc,
                collection_ref,
                dependency_ref,
                schedule_ref,
                allocation_ref,
            )?),
            false => None,
        };

        let command = match dirty.contains(CompilePhase::COMMAND) {
            true => Some(Command::create(
                &self.device,
                desc,
                collection_ref,
                dependency_ref,
                metadata_ref,
                schedule_ref,
                allocation_ref,
            )?),
            false => None,
        };

        // Consumers are replaced before the phases they were built from.
        if command.is_some() {
            self.command = command;
        }
        if descriptor.is_some() {
            self.descriptor = descriptor;
        }
        if allocation.is_some() {
            self.allocation = allocation;
            self.fresh = true;
        }
        if schedule.is_some() {
            self.schedule = schedule;
        }
        if metadata.is_some() {
            self.metadata = metadata;
        }
        if dependency.is_some() {
            self.dependency = dependency;
        }
        if collection.is_some() {
            self.collection = collection;
        }
        if let Some(collection) = &self.collection {
            self.bindings = Some(Bindings::capture(&self.desc, collection));
        }

        self.dirty = CompilePhase::empty();
        self.last_compiled = dirty;
        if let (Some(collection), Some(schedule), Some(allocation)) = (&self.collection, &self.schedule, &self.allocation) {
            info!(
                "Compiled render graph ({dirty:?}): {} passes in {} groups, {} memory blocks",
                collection.pass_count(),
                schedule.groups().len(),
                allocation.memory_count()
            );
        }
        Ok(dirty)
    }

    pub fn collection(&self) -> Option<&Collection> {
        self.collection.as_ref()
    }

    pub fn dependency(&self) -> Option<&Dependency> {
        self.dependency.as_ref()
    }

    pub fn metadata(&self) -> Option<&Metadata> {
        self.metadata.as_ref()
    }

    pub fn schedule(&self) -> Option<&Schedule> {
        self.schedule.as_ref()
    }

    pub fn allocation(&self) -> Option<&Allocation<D>> {
        self.allocation.as_ref()
    }

    pub fn descriptor(&self) -> Option<&Descriptor<D>> {
        self.descriptor.as_ref()
    }

    pub fn command(&self) -> Option<&Command<D>> {
        self.command.as_ref()
    }

    /* Per frame accessors */

    fn compiled<'a, T>(phase: &'a Option<T>) -> Result<&'a T> {
        phase.as_ref().ok_or_else(|| Error::NotCompiled.into())
    }

    fn resource_id(&self, key: &GlobalKey) -> Result<ResourceId> {
        Self::compiled(&self.collection)?
            .resource_id(key)
            .ok_or_else(|| Error::ResourceNotFound(key.clone()).into())
    }

    fn pass_id(&self, key: &GlobalKey) -> Result<PassId> {
        Self::compiled(&self.collection)?
            .pass_id(key)
            .ok_or_else(|| Error::PassNotFound(key.clone()).into())
    }

    /// Image view over the whole sub-range of an image resource, for the given frame.
    pub fn image_view(&self, resource: impl Into<GlobalKey>, frame: u64) -> Result<vk::ImageView> {
        let key = resource.into();
        if let Some(Resource::ExternalImage(image)) = self.desc.resource(&key) {
            return Ok(image.view);
        }
        let id = self.resource_id(&key)?;
        Self::compiled(&self.allocation)?
            .image_view(id, frame)
            .ok_or_else(|| Error::ResourceNotFound(key).into())
    }

    pub fn image(&self, resource: impl Into<GlobalKey>, frame: u64) -> Result<vk::Image> {
        let key = resource.into();
        if let Some(Resource::ExternalImage(image)) = self.desc.resource(&key) {
            return Ok(image.image);
        }
        let id = self.resource_id(&key)?;
        Self::compiled(&self.allocation)?
            .image(id, frame)
            .ok_or_else(|| Error::ResourceNotFound(key).into())
    }

    pub fn buffer(&self, resource: impl Into<GlobalKey>, frame: u64) -> Result<vk::Buffer> {
        let key = resource.into();
        if let Some(Resource::ExternalBuffer(buffer)) = self.desc.resource(&key) {
            return Ok(buffer.buffer);
        }
        let id = self.resource_id(&key)?;
        Self::compiled(&self.allocation)?
            .buffer(id, frame)
            .ok_or_else(|| Error::ResourceNotFound(key).into())
    }

    /// Pointer to the contents of a host mapped buffer, for the given frame.
    pub fn mapped_ptr(&self, resource: impl Into<GlobalKey>, frame: u64) -> Result<NonNull<c_void>> {
        let key = resource.into();
        let id = self.resource_id(&key)?;
        Self::compiled(&self.allocation)?
            .mapped_ptr(id, frame)
            .ok_or_else(|| Error::UnmappableResource(key).into())
    }

    /// Render pass and subpass index a graphics pass executes in. `None` for passes recorded outside render passes.
    pub fn render_pass(&self, pass: impl Into<GlobalKey>) -> Result<Option<(vk::RenderPass, u32)>> {
        let id = self.pass_id(&pass.into())?;
        let schedule = Self::compiled(&self.schedule)?;
        let command = Self::compiled(&self.command)?;
        let Some(group) = schedule.group_of(id) else {
            return Ok(None);
        };
        Ok(command
            .render_pass(group)
            .map(|render_pass| (render_pass.handle, schedule.subpass_of(id))))
    }

    pub fn descriptor_set(&self, pass: impl Into<GlobalKey>, frame: u64) -> Result<Option<vk::DescriptorSet>> {
        let id = self.pass_id(&pass.into())?;
        Ok(Self::compiled(&self.descriptor)?.set(id, frame))
    }

    pub fn descriptor_set_layout(&self, pass: impl Into<GlobalKey>) -> Result<Option<vk::DescriptorSetLayout>> {
        let id = self.pass_id(&pass.into())?;
        Ok(Self::compiled(&self.descriptor)?.layout(id))
    }

    /// Record one frame of the compiled plan into `cmd`.
    ///
    /// The plan of the last successful compile is used, even if the graph was changed since. `frame` selects the copy of
    /// double buffered resources, and must increase by one every frame.
    /// # Errors
    /// * Fails with [`Error::NotCompiled`] if the graph was never compiled successfully.
    /// * Fails if a pass executor or initialization callback fails.
    pub fn cmd_execute(&mut self, cmd: &mut dyn CommandRecorder, frame: u64) -> Result<()> {
        let plan = Plan {
            collection: Self::compiled(&self.collection)?,
            dependency: Self::compiled(&self.dependency)?,
            metadata: Self::compiled(&self.metadata)?,
            schedule: Self::compiled(&self.schedule)?,
            allocation: Self::compiled(&self.allocation)?,
            descriptor: Self::compiled(&self.descriptor)?,
            command: Self::compiled(&self.command)?,
            bindings: Self::compiled(&self.bindings)?,
        };
        record::execute(&plan, cmd, frame, self.fresh)?;
        self.fresh = false;
        Ok(())
    }
}
