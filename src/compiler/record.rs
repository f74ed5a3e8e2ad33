//! Records a compiled plan into a command buffer.

use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::command_buffer::CommandRecorder;
use crate::compiler::allocation::Allocation;
use crate::compiler::collection::Collection;
use crate::compiler::command::{BarrierBatch, Command, RenderPassInfo, SyncScope};
use crate::compiler::dependency::Dependency;
use crate::compiler::descriptor::Descriptor;
use crate::compiler::metadata::Metadata;
use crate::compiler::schedule::Schedule;
use crate::compiler::{PassId, ResourceId};
use crate::core::traits::Device;
use crate::graph::context::{InitContext, PassContext, PlanLookup};
use crate::graph::key::Key;
use crate::graph::pass::SharedPassFn;
use crate::graph::render_graph::GraphDesc;
use crate::graph::resource::{LastFrameInitFn, Resource, ResourceType, SharedInitFn};
use crate::util::to_vk::IntoVulkanType;
use crate::Error;

/// Borrowed view of every compiled phase.
pub(crate) struct Plan<'a, D: Device> {
    pub collection: &'a Collection,
    pub dependency: &'a Dependency,
    pub metadata: &'a Metadata,
    pub schedule: &'a Schedule,
    pub allocation: &'a Allocation<D>,
    pub descriptor: &'a Descriptor<D>,
    pub command: &'a Command<D>,
    pub bindings: &'a Bindings,
}

/// Handles of an external resource.
#[derive(Debug, Copy, Clone)]
enum ExternalHandle {
    None,
    Image(vk::Image, vk::ImageView),
    Buffer(vk::Buffer),
}

/// What recording needs from the declarations, captured when a compile succeeds. Later edits to the graph do not
/// reach the plan until the next successful compile, except for executors and initialization callbacks swapped in
/// place.
pub(crate) struct Bindings {
    executors: Vec<Option<(SharedPassFn, Option<[f32; 4]>)>>,
    inits: Vec<Option<(SharedInitFn, ResourceType)>>,
    external: Vec<ExternalHandle>,
}

impl Bindings {
    pub fn capture(desc: &GraphDesc, collection: &Collection) -> Self {
        let executors = (0..collection.pass_count())
            .map(|pass| {
                desc.pass(collection.pass_key(pass))
                    .map(|decl| (decl.execute.clone(), decl.color))
            })
            .collect();
        let mut inits = Vec::with_capacity(collection.resource_count());
        let mut external = Vec::with_capacity(collection.resource_count());
        for resource in 0..collection.resource_count() {
            let decl = desc.resource(collection.resource_key(resource));
            inits.push(decl.and_then(|decl| Some((decl.init_fn()?.clone(), decl.ty()))));
            external.push(match decl {
                Some(Resource::ExternalImage(image)) => ExternalHandle::Image(image.image, image.view),
                Some(Resource::ExternalBuffer(buffer)) => ExternalHandle::Buffer(buffer.buffer),
                _ => ExternalHandle::None,
            });
        }
        Self {
            executors,
            inits,
            external,
        }
    }

    pub fn set_executor(&mut self, pass: PassId, exec: SharedPassFn) {
        if let Some(Some((slot, _))) = self.executors.get_mut(pass) {
            *slot = exec;
        }
    }

    pub fn set_init(&mut self, resource: ResourceId, init: Option<SharedInitFn>, ty: ResourceType) {
        if let Some(slot) = self.inits.get_mut(resource) {
            *slot = init.map(|init| (init, ty));
        }
    }
}

/// The plan resolved for one frame.
struct FrameLookup<'a, D: Device> {
    plan: &'a Plan<'a, D>,
    frame: u64,
}

impl<'a, D: Device> FrameLookup<'a, D> {
    fn new(plan: &'a Plan<'a, D>, frame: u64) -> Self {
        Self {
            plan,
            frame,
        }
    }

    fn external(&self, resource: ResourceId) -> ExternalHandle {
        self.plan
            .bindings
            .external
            .get(resource)
            .copied()
            .unwrap_or(ExternalHandle::None)
    }

    fn missing(&self, resource: ResourceId) -> anyhow::Error {
        Error::ResourceNotFound(self.plan.collection.resource_key(resource).clone()).into()
    }

    fn input_resource(&self, input: usize) -> Result<ResourceId> {
        self.plan.dependency.input_resource(input).ok_or_else(|| {
            let (pass, key) = self.plan.collection.input(input);
            Error::InputNotFound(self.plan.collection.pass_key(pass).clone(), key).into()
        })
    }

    fn resource_image(&self, resource: ResourceId) -> Result<vk::Image> {
        let root = self.plan.dependency.root(resource).unwrap_or(resource);
        if let ExternalHandle::Image(image, _) = self.external(root) {
            return Ok(image);
        }
        self.plan
            .allocation
            .image(resource, self.frame)
            .ok_or_else(|| self.missing(resource))
    }

    fn resource_view(&self, resource: ResourceId) -> Result<vk::ImageView> {
        if let ExternalHandle::Image(_, view) = self.external(resource) {
            return Ok(view);
        }
        self.plan
            .allocation
            .image_view(resource, self.frame)
            .ok_or_else(|| self.missing(resource))
    }

    fn resource_buffer(&self, resource: ResourceId) -> Result<vk::Buffer> {
        if let ExternalHandle::Buffer(buffer) = self.external(resource) {
            return Ok(buffer);
        }
        self.plan
            .allocation
            .buffer(resource, self.frame)
            .ok_or_else(|| self.missing(resource))
    }

    fn record_batch(&self, cmd: &mut dyn CommandRecorder, batch: &BarrierBatch, fresh: bool) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut memory = batch.memory;
        for barrier in &batch.buffers {
            let (src, _) = barrier.resolve(fresh);
            let (old_src, old_dst) = memory.unwrap_or_default();
            memory = Some((old_src.union(src), old_dst.union(barrier.dst)));
        }
        let memory_barrier = memory.map(|(src, dst): (SyncScope, SyncScope)| vk::MemoryBarrier2 {
            s_type: vk::StructureType::MEMORY_BARRIER_2,
            p_next: std::ptr::null(),
            src_stage_mask: src.stage,
            src_access_mask: src.access,
            dst_stage_mask: dst.stage,
            dst_access_mask: dst.access,
        });

        let mut image_barriers = Vec::with_capacity(batch.images.len());
        for barrier in &batch.images {
            let (src, old_layout) = barrier.resolve(fresh);
            image_barriers.push(vk::ImageMemoryBarrier2 {
                s_type: vk::StructureType::IMAGE_MEMORY_BARRIER_2,
                p_next: std::ptr::null(),
                src_stage_mask: src.stage,
                src_access_mask: src.access,
                dst_stage_mask: barrier.dst.stage,
                dst_access_mask: barrier.dst.access,
                old_layout,
                new_layout: barrier.new_layout,
                src_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                dst_queue_family_index: vk::QUEUE_FAMILY_IGNORED,
                image: self.resource_image(barrier.resource)?,
                subresource_range: barrier.range,
            });
        }

        let dependency = vk::DependencyInfo {
            s_type: vk::StructureType::DEPENDENCY_INFO,
            p_next: std::ptr::null(),
            dependency_flags: vk::DependencyFlags::BY_REGION,
            memory_barrier_count: memory_barrier.is_some() as u32,
            p_memory_barriers: memory_barrier
                .as_ref()
                .map_or(std::ptr::null(), |barrier| barrier as *const vk::MemoryBarrier2),
            buffer_memory_barrier_count: 0,
            p_buffer_memory_barriers: std::ptr::null(),
            image_memory_barrier_count: image_barriers.len() as u32,
            p_image_memory_barriers: image_barriers.as_ptr(),
        };
        cmd.pipeline_barrier_2(&dependency);
        Ok(())
    }

    fn begin_render_pass(&self, cmd: &mut dyn CommandRecorder, render_pass: &RenderPassInfo) -> Result<()> {
        let views = render_pass
            .attachments
            .iter()
            .map(|resource| self.resource_view(*resource))
            .collect::<Result<Vec<_>>>()?;
        let attachments = vk::RenderPassAttachmentBeginInfo {
            attachment_count: views.len() as u32,
            p_attachments: views.as_ptr(),
            ..Default::default()
        };
        let info = vk::RenderPassBeginInfo {
            p_next: &attachments as *const vk::RenderPassAttachmentBeginInfo as *const c_void,
            render_pass: render_pass.handle,
            framebuffer: render_pass.framebuffer,
            render_area: render_pass.area.into_vulkan(),
            clear_value_count: render_pass.clear_values.len() as u32,
            p_clear_values: render_pass.clear_values.as_ptr(),
            ..Default::default()
        };
        cmd.begin_render_pass(&info, vk::SubpassContents::INLINE);
        Ok(())
    }

    fn record_pass(&self, cmd: &mut dyn CommandRecorder, pass: PassId) -> Result<()> {
        let key = self.plan.collection.pass_key(pass);
        let (execute, _color) = self
            .plan
            .bindings
            .executors
            .get(pass)
            .and_then(Option::as_ref)
            .ok_or_else(|| Error::PassNotFound(key.clone()))?;

        #[cfg(feature = "debug-markers")]
        cmd.begin_label(&key.to_string(), _color.unwrap_or([1.0, 1.0, 1.0, 1.0]));

        let mut ctx = PassContext {
            cmd: &mut *cmd,
            key,
            pass,
            frame: self.frame,
            plan: self,
        };
        execute.borrow_mut().execute(&mut ctx)?;

        #[cfg(feature = "debug-markers")]
        cmd.end_label();
        Ok(())
    }

    fn run_init(&self, cmd: &mut dyn CommandRecorder, resource: ResourceId) -> Result<()> {
        let Some(Some((init, ty))) = self.plan.bindings.inits.get(resource) else {
            return Ok(());
        };
        let key = self.plan.collection.resource_key(resource);
        let (image, buffer) = match ty {
            ResourceType::Image => {
                let range = self.plan.metadata.subresource_range(resource);
                (Some((self.resource_image(resource)?, range)), None)
            }
            ResourceType::Buffer => {
                let size = self.plan.metadata.buffer_size(resource);
                (None, Some((self.resource_buffer(resource)?, size)))
            }
        };
        trace!("Initializing last frame resource {key}");
        let mut ctx = InitContext {
            cmd: &mut *cmd,
            image,
            buffer,
        };
        let mut init = init.borrow_mut();
        let init: &mut LastFrameInitFn = &mut init;
        init(&mut ctx)?;
        Ok(())
    }
}

impl<'a, D: Device> PlanLookup for FrameLookup<'a, D> {
    fn input_id(&self, pass: usize, input: Key) -> Option<usize> {
        self.plan.collection.input_id(pass, input)
    }

    fn image(&self, input: usize) -> Result<vk::Image> {
        self.resource_image(self.input_resource(input)?)
    }

    fn image_view(&self, input: usize) -> Result<vk::ImageView> {
        self.resource_view(self.input_resource(input)?)
    }

    fn image_layout(&self, input: usize) -> vk::ImageLayout {
        self.plan.schedule.layout(input)
    }

    fn buffer(&self, input: usize) -> Result<vk::Buffer> {
        self.resource_buffer(self.input_resource(input)?)
    }

    fn mapped_ptr(&self, input: usize) -> Result<NonNull<c_void>> {
        let resource = self.input_resource(input)?;
        self.plan
            .allocation
            .mapped_ptr(resource, self.frame)
            .ok_or_else(|| Error::UnmappableResource(self.plan.collection.resource_key(resource).clone()).into())
    }

    fn descriptor_set(&self, pass: usize) -> Option<vk::DescriptorSet> {
        self.plan.descriptor.set(pass, self.frame)
    }

    fn descriptor_set_layout(&self, pass: usize) -> Option<vk::DescriptorSetLayout> {
        self.plan.descriptor.layout(pass)
    }

    fn render_pass(&self, pass: usize) -> Option<(vk::RenderPass, u32)> {
        let group = self.plan.schedule.group_of(pass)?;
        let render_pass = self.plan.command.render_pass(group)?;
        Some((render_pass.handle, self.plan.schedule.subpass_of(pass)))
    }

    fn render_area(&self, pass: usize) -> Option<vk::Rect2D> {
        let group = self.plan.schedule.group_of(pass)?;
        self.plan.command.render_pass(group).map(|render_pass| render_pass.area.into_vulkan())
    }
}

/// Record one frame of a compiled plan.
///
/// `fresh` is set on the first frame after memory was allocated. Last frame resources are initialized in that
/// frame, and contents left by a previous frame are treated as undefined.
pub(crate) fn execute<D: Device>(
    plan: &Plan<D>,
    cmd: &mut dyn CommandRecorder,
    frame: u64,
    fresh: bool,
) -> Result<()> {
    let lookup = FrameLookup::new(plan, frame);
    let command = plan.command;

    if fresh && !command.init_resources().is_empty() {
        lookup.record_batch(cmd, command.init_batch(), false)?;
        for &resource in command.init_resources() {
            lookup.run_init(cmd, resource)?;
        }
    }

    for group in command.groups() {
        lookup.record_batch(cmd, &group.barriers, fresh)?;
        match &group.render_pass {
            Some(render_pass) => {
                lookup.begin_render_pass(cmd, render_pass)?;
                for (subpass, &pass) in group.passes.iter().enumerate() {
                    if subpass > 0 {
                        cmd.next_subpass(vk::SubpassContents::INLINE);
                    }
                    lookup.record_pass(cmd, pass)?;
                }
                cmd.end_render_pass();
            }
            None => {
                for &pass in &group.passes {
                    lookup.record_pass(cmd, pass)?;
                }
            }
        }
    }

    lookup.record_batch(cmd, command.final_batch(), fresh)?;
    Ok(())
}
