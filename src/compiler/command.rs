//! Turns the schedule into recordable commands.
//!
//! Barriers of the schedule are attached to the group before which they must execute. A barrier whose source and
//! destination meet inside one render pass becomes a subpass dependency instead. Barriers never store image or
//! buffer handles, those are looked up when a frame is recorded since double buffered resources swap copies every
//! frame.

use std::collections::HashMap;
use std::ffi::c_void;

use anyhow::Result;
use ash::vk;
use multimap::MultiMap;

use crate::compiler::allocation::{Allocation, AllocationClass};
use crate::compiler::collection::Collection;
use crate::compiler::dependency::Dependency;
use crate::compiler::metadata::Metadata;
use crate::compiler::schedule::{BarrierKind, PassBarrier, Schedule};
use crate::compiler::{InputId, PassId, ResourceId};
use crate::core::traits::Device;
use crate::graph::pass::RenderArea;
use crate::graph::render_graph::GraphDesc;
use crate::graph::resource::{ExternalState, Resource, ResourceClass, ResourceType};
use crate::util::format::FormatAspect;
use crate::util::to_vk::IntoVulkanType;

/// A set of pipeline stages and the memory accesses they make.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SyncScope {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl SyncScope {
    pub fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        Self {
            stage,
            access,
        }
    }

    pub fn none() -> Self {
        Self::new(vk::PipelineStageFlags2::NONE, vk::AccessFlags2::NONE)
    }

    pub fn union(self, other: SyncScope) -> Self {
        Self::new(self.stage | other.stage, self.access | other.access)
    }

    fn transfer_write() -> Self {
        Self::new(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE)
    }
}

impl From<ExternalState> for SyncScope {
    fn from(value: ExternalState) -> Self {
        Self::new(value.stage, value.access)
    }
}

/// How a barrier changes in the first frame after the memory of its resource was created.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FreshState {
    Unchanged,
    /// There is no previous frame, the old contents are undefined.
    Discard,
    /// The previous contents were written by an initialization callback.
    Initialized,
}

/// Synchronization of one image or buffer resource.
#[derive(Debug, Copy, Clone)]
pub struct ResourceBarrier {
    pub resource: ResourceId,
    pub src: SyncScope,
    /// Last accesses of resources sharing memory with this one.
    pub aliased: SyncScope,
    pub dst: SyncScope,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    /// Only meaningful for images.
    pub range: vk::ImageSubresourceRange,
    pub fresh: FreshState,
}

impl ResourceBarrier {
    /// The source scope and old layout in a frame. `fresh` is set in the first frame after allocation.
    pub fn resolve(&self, fresh: bool) -> (SyncScope, vk::ImageLayout) {
        match (fresh, self.fresh) {
            (false, _) | (true, FreshState::Unchanged) => (self.src.union(self.aliased), self.old_layout),
            (true, FreshState::Discard) => (self.aliased, vk::ImageLayout::UNDEFINED),
            (true, FreshState::Initialized) => (
                SyncScope::transfer_write().union(self.aliased),
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ),
        }
    }

    pub fn is_transition(&self) -> bool {
        self.old_layout != self.new_layout
    }
}

/// Barriers recorded with a single `vkCmdPipelineBarrier2`. Buffers are synchronized with one global memory barrier.
#[derive(Debug, Default, Clone)]
pub struct BarrierBatch {
    /// Global memory dependency, used to order resources that share memory.
    pub memory: Option<(SyncScope, SyncScope)>,
    pub images: Vec<ResourceBarrier>,
    pub buffers: Vec<ResourceBarrier>,
}

impl BarrierBatch {
    pub fn is_empty(&self) -> bool {
        self.memory.is_none() && self.images.is_empty() && self.buffers.is_empty()
    }

    fn add_memory(&mut self, src: SyncScope, dst: SyncScope) {
        let (old_src, old_dst) = self.memory.unwrap_or_default();
        self.memory = Some((old_src.union(src), old_dst.union(dst)));
    }

    fn push(&mut self, ty: ResourceType, barrier: ResourceBarrier) {
        match ty {
            ResourceType::Image => self.images.push(barrier),
            ResourceType::Buffer => self.buffers.push(barrier),
        }
    }
}

/// Dependency between two subpasses of a render pass.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubpassDependency {
    pub src_subpass: u32,
    pub dst_subpass: u32,
    pub src: SyncScope,
    pub dst: SyncScope,
}

#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct RenderPassInfo {
    pub handle: vk::RenderPass,
    pub framebuffer: vk::Framebuffer,
    pub area: RenderArea,
    /// Resources bound as attachments, in attachment order.
    pub attachments: Vec<ResourceId>,
    pub load_ops: Vec<vk::AttachmentLoadOp>,
    pub store_ops: Vec<vk::AttachmentStoreOp>,
    pub initial_layouts: Vec<vk::ImageLayout>,
    pub final_layouts: Vec<vk::ImageLayout>,
    pub dependencies: Vec<SubpassDependency>,
    #[derivative(Debug = "ignore")]
    pub clear_values: Vec<vk::ClearValue>,
}

/// One schedule group, with the barriers recorded before it.
#[derive(Debug, Clone)]
pub struct CommandGroup {
    pub passes: Vec<PassId>,
    pub barriers: BarrierBatch,
    pub render_pass: Option<RenderPassInfo>,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Command<D: Device> {
    #[derivative(Debug = "ignore")]
    device: D,
    groups: Vec<CommandGroup>,
    init_batch: BarrierBatch,
    init_resources: Vec<ResourceId>,
    final_batch: BarrierBatch,
    validations: Vec<PassBarrier>,
}

/// A schedule barrier with its sources resolved. Sources from before the frame are placed in group `-1`.
struct Prepared {
    resource: ResourceId,
    ty: ResourceType,
    srcs: Vec<(isize, Option<PassId>, SyncScope)>,
    old_layout: vk::ImageLayout,
    dst: Vec<InputId>,
    external_dst: Option<ExternalState>,
    fresh: FreshState,
}

struct Builder<'a, D: Device> {
    desc: &'a GraphDesc,
    collection: &'a Collection,
    dependency: &'a Dependency,
    metadata: &'a Metadata,
    schedule: &'a Schedule,
    allocation: &'a Allocation<D>,
    batches: Vec<BarrierBatch>,
    final_batch: BarrierBatch,
    dependencies: Vec<Vec<SubpassDependency>>,
}

impl<'a, D: Device> Builder<'a, D> {
    fn src_scope(&self, input: InputId) -> Result<SyncScope> {
        let decl = self.collection.input_ref(self.desc, input)?;
        Ok(SyncScope::new(decl.stages, decl.usage.write_access()))
    }

    fn dst_scope(&self, input: InputId) -> Result<SyncScope> {
        let decl = self.collection.input_ref(self.desc, input)?;
        Ok(SyncScope::new(decl.stages, decl.usage.access()))
    }

    fn group_of(&self, input: InputId) -> Option<usize> {
        self.schedule.group_of(self.collection.input_pass(input))
    }

    fn first_layout(&self, inputs: &[InputId]) -> vk::ImageLayout {
        inputs
            .first()
            .map_or(vk::ImageLayout::UNDEFINED, |input| self.schedule.layout(*input))
    }

    fn sources(&self, inputs: &[InputId], prev_frame: bool) -> Result<Vec<(isize, Option<PassId>, SyncScope)>> {
        let mut srcs = Vec::with_capacity(inputs.len());
        for &input in inputs {
            let scope = self.src_scope(input)?;
            if prev_frame {
                srcs.push((-1, None, scope));
            } else if let Some(group) = self.group_of(input) {
                srcs.push((group as isize, Some(self.collection.input_pass(input)), scope));
            }
        }
        Ok(srcs)
    }

    /// Whether the memory class keeps the contents of a resource between frames.
    fn keeps_contents(&self, resource: ResourceId) -> bool {
        let Some(phys) = self.dependency.phys_id_of(resource) else {
            return false;
        };
        matches!(
            self.allocation.class(phys),
            AllocationClass::Persistent | AllocationClass::MappedRandom | AllocationClass::MappedSequential
        )
    }

    fn prepare(&self, barrier: &PassBarrier) -> Result<Prepared> {
        let decl = self.collection.resource_ref(self.desc, barrier.resource)?;
        let mut prepared = Prepared {
            resource: barrier.resource,
            ty: decl.ty(),
            srcs: Vec::new(),
            old_layout: vk::ImageLayout::UNDEFINED,
            dst: barrier.dst.clone(),
            external_dst: None,
            fresh: FreshState::Unchanged,
        };
        match barrier.kind {
            BarrierKind::ExternalInput => {
                if let Some((src, _)) = decl.external_state() {
                    prepared.srcs.push((-1, None, src.into()));
                    prepared.old_layout = src.layout;
                }
            }
            BarrierKind::ExternalOutput => {
                prepared.srcs = self.sources(&barrier.src, false)?;
                prepared.old_layout = self.first_layout(&barrier.src);
                prepared.external_dst = decl.external_state().map(|(_, dst)| dst);
            }
            BarrierKind::LastFrameInput => {
                prepared.srcs = self.sources(&barrier.src, true)?;
                prepared.old_layout = self.first_layout(&barrier.src);
                prepared.fresh = if decl.has_init() {
                    FreshState::Initialized
                } else {
                    FreshState::Discard
                };
            }
            BarrierKind::LastFrameOutput => {
                prepared.srcs = self.sources(&barrier.src, true)?;
                prepared.old_layout = self.first_layout(&barrier.src);
                prepared.fresh = FreshState::Discard;
            }
            BarrierKind::Local if barrier.src_prev_frame => {
                if self.keeps_contents(barrier.resource) {
                    prepared.srcs = self.sources(&barrier.src, true)?;
                    prepared.old_layout = self.first_layout(&barrier.src);
                    prepared.fresh = FreshState::Discard;
                }
            }
            BarrierKind::Local | BarrierKind::Validate => {
                prepared.srcs = self.sources(&barrier.src, false)?;
                prepared.old_layout = self.first_layout(&barrier.src);
            }
        }
        Ok(prepared)
    }

    fn place(&mut self, barrier: &PassBarrier) -> Result<()> {
        let prepared = self.prepare(barrier)?;
        let is_image = prepared.ty == ResourceType::Image;
        let range = self.metadata.subresource_range(prepared.resource);

        if prepared.dst.is_empty() {
            let Some(dst) = prepared.external_dst else {
                return Ok(());
            };
            let src = prepared
                .srcs
                .iter()
                .fold(SyncScope::none(), |scope, (_, _, src)| scope.union(*src));
            self.final_batch.push(
                prepared.ty,
                ResourceBarrier {
                    resource: prepared.resource,
                    src,
                    aliased: SyncScope::none(),
                    dst: dst.into(),
                    old_layout: prepared.old_layout,
                    new_layout: if is_image {
                        dst.layout
                    } else {
                        vk::ImageLayout::UNDEFINED
                    },
                    range,
                    fresh: FreshState::Unchanged,
                },
            );
            return Ok(());
        }

        let mut targets: MultiMap<usize, InputId> = MultiMap::new();
        for &dst in &prepared.dst {
            if let Some(group) = self.group_of(dst) {
                targets.insert(group, dst);
            }
        }

        let mut covered = vec![false; prepared.srcs.len()];
        let mut layout = prepared.old_layout;
        let mut transitioned = false;
        let mut first = true;
        let mut groups: Vec<usize> = targets.keys().copied().collect();
        groups.sort_unstable();
        for (index, &target) in groups.iter().enumerate() {
            let dsts = targets.get_vec(&target).map(Vec::as_slice).unwrap_or(&[]);
            let new_layout = self.first_layout(dsts);
            let before: Vec<usize> = (0..prepared.srcs.len())
                .filter(|&i| !covered[i] && prepared.srcs[i].0 < target as isize)
                .collect();
            let inside: Vec<usize> = (0..prepared.srcs.len())
                .filter(|&i| prepared.srcs[i].0 == target as isize)
                .collect();

            let needs_transition = is_image
                && !transitioned
                && inside.is_empty()
                && (layout != new_layout || prepared.fresh != FreshState::Unchanged);
            if !before.is_empty() || needs_transition {
                let src = before
                    .iter()
                    .fold(SyncScope::none(), |scope, &i| scope.union(prepared.srcs[i].2));
                let mut dst = SyncScope::none();
                for later in &groups[index..] {
                    for &input in targets.get_vec(later).into_iter().flatten() {
                        dst = dst.union(self.dst_scope(input)?);
                    }
                }
                // Sources inside the group still use the old layout, the render pass transitions it.
                let target_layout = if is_image && inside.is_empty() {
                    new_layout
                } else {
                    layout
                };
                self.batches[target].push(
                    prepared.ty,
                    ResourceBarrier {
                        resource: prepared.resource,
                        src,
                        aliased: SyncScope::none(),
                        dst,
                        old_layout: layout,
                        new_layout: target_layout,
                        range,
                        fresh: if first {
                            prepared.fresh
                        } else {
                            FreshState::Unchanged
                        },
                    },
                );
                first = false;
                for i in before {
                    covered[i] = true;
                }
                layout = target_layout;
                if inside.is_empty() {
                    transitioned = true;
                }
            }

            if !inside.is_empty() {
                for &i in &inside {
                    let (_, src_pass, src) = prepared.srcs[i];
                    let Some(src_pass) = src_pass else {
                        continue;
                    };
                    for &input in dsts {
                        let dst_pass = self.collection.input_pass(input);
                        if dst_pass == src_pass {
                            continue;
                        }
                        let dependency = SubpassDependency {
                            src_subpass: self.schedule.subpass_of(src_pass),
                            dst_subpass: self.schedule.subpass_of(dst_pass),
                            src,
                            dst: self.dst_scope(input)?,
                        };
                        self.add_subpass_dependency(target, dependency);
                    }
                }
                layout = new_layout;
                transitioned = true;
            }
        }
        Ok(())
    }

    fn add_subpass_dependency(&mut self, group: usize, dependency: SubpassDependency) {
        let dependencies = &mut self.dependencies[group];
        match dependencies
            .iter_mut()
            .find(|d| d.src_subpass == dependency.src_subpass && d.dst_subpass == dependency.dst_subpass)
        {
            Some(existing) => {
                existing.src = existing.src.union(dependency.src);
                existing.dst = existing.dst.union(dependency.dst);
            }
            None => dependencies.push(dependency),
        }
    }

    /// Orders every pair of physical resources that share memory, from the last accesses of the first one to the
    /// first accesses of the second one.
    fn validate(&mut self) -> Result<Vec<PassBarrier>> {
        let mut validations = Vec::new();
        let count = self.dependency.phys_count();
        for x in 0..count {
            for y in 0..count {
                if x == y || !self.allocation.is_aliased(x, y) || !self.dependency.resource_precedes(x, y) {
                    continue;
                }
                let src = self.schedule.last_inputs(x);
                let dst = self.schedule.first_inputs(y);
                let Some(target) = dst.iter().filter_map(|input| self.group_of(*input)).min() else {
                    continue;
                };
                if src.is_empty() {
                    continue;
                }
                let mut src_scope = SyncScope::none();
                for &input in src {
                    src_scope = src_scope.union(self.src_scope(input)?);
                }
                let mut dst_scope = SyncScope::none();
                for &input in dst {
                    dst_scope = dst_scope.union(self.dst_scope(input)?);
                }

                let batch = &mut self.batches[target];
                batch.add_memory(src_scope, dst_scope);
                // Layout transitions of the new resource must wait for the old one as well.
                for barrier in batch.images.iter_mut() {
                    if self.dependency.phys_id_of(barrier.resource) == Some(y) {
                        barrier.aliased = barrier.aliased.union(src_scope);
                    }
                }

                validations.push(PassBarrier {
                    resource: self.dependency.phys_roots()[y],
                    kind: BarrierKind::Validate,
                    src: src.to_vec(),
                    dst: dst.to_vec(),
                    src_prev_frame: false,
                });
            }
        }
        Ok(validations)
    }

    fn init_barriers(&self) -> Result<(BarrierBatch, Vec<ResourceId>)> {
        let mut batch = BarrierBatch::default();
        let mut resources = Vec::new();
        for resource in 0..self.collection.resource_count() {
            if !self.dependency.is_touched(resource) || self.dependency.lf_pointed(resource).is_none() {
                continue;
            }
            let decl = self.collection.resource_ref(self.desc, resource)?;
            if !decl.has_init() {
                continue;
            }
            let is_image = decl.ty() == ResourceType::Image;
            batch.push(
                decl.ty(),
                ResourceBarrier {
                    resource,
                    src: SyncScope::none(),
                    aliased: SyncScope::none(),
                    dst: SyncScope::transfer_write(),
                    old_layout: vk::ImageLayout::UNDEFINED,
                    new_layout: if is_image {
                        vk::ImageLayout::TRANSFER_DST_OPTIMAL
                    } else {
                        vk::ImageLayout::UNDEFINED
                    },
                    range: self.metadata.subresource_range(resource),
                    fresh: FreshState::Unchanged,
                },
            );
            resources.push(resource);
        }
        Ok((batch, resources))
    }

    fn load_op(&self, input: InputId, resource: ResourceId) -> Result<vk::AttachmentLoadOp> {
        let decl = self.collection.input_ref(self.desc, input)?;
        if decl.clear.is_some() {
            return Ok(vk::AttachmentLoadOp::CLEAR);
        }
        if !decl.usage.reads_previous() {
            return Ok(vk::AttachmentLoadOp::DONT_CARE);
        }
        let fresh_value = self
            .dependency
            .input_value(input)
            .map(|value| self.dependency.value(value).key)
            .map_or(false, |key| key.producer.is_none() && key.resource == resource);
        let combined = self.collection.resource_ref(self.desc, resource)?.class() == ResourceClass::Combined;
        let discarded = self
            .dependency
            .phys_id_of(resource)
            .map_or(false, |phys| self.allocation.class(phys).is_aliasable());
        if fresh_value && !combined && discarded {
            return Ok(vk::AttachmentLoadOp::DONT_CARE);
        }
        Ok(vk::AttachmentLoadOp::LOAD)
    }

    fn store_op(&self, resource: ResourceId, group: usize) -> vk::AttachmentStoreOp {
        let Some(phys) = self.dependency.phys_id_of(resource) else {
            return vk::AttachmentStoreOp::STORE;
        };
        let local = self.schedule.group_window(phys) == Some((group, group));
        if self.allocation.class(phys).is_aliasable() && local && !self.dependency.holds_result(phys) {
            vk::AttachmentStoreOp::DONT_CARE
        } else {
            vk::AttachmentStoreOp::STORE
        }
    }

    fn attachment_usage(&self, resource: ResourceId) -> Result<vk::ImageUsageFlags> {
        let root = self.dependency.root(resource).unwrap_or(resource);
        if let Resource::ExternalImage(image) = self.collection.resource_ref(self.desc, root)? {
            return Ok(image.usage);
        }
        let Some(phys) = self.dependency.phys_id_of(resource) else {
            return Ok(vk::ImageUsageFlags::empty());
        };
        let mut usage = self.metadata.image_usage(phys);
        if self.allocation.class(phys) == AllocationClass::Transient {
            usage |= vk::ImageUsageFlags::TRANSIENT_ATTACHMENT;
        }
        Ok(usage)
    }
}

fn attachment_reference(attachment: u32, layout: vk::ImageLayout, aspect: vk::ImageAspectFlags) -> vk::AttachmentReference2 {
    vk::AttachmentReference2 {
        attachment,
        layout,
        aspect_mask: aspect,
        ..Default::default()
    }
}

fn unused_reference() -> vk::AttachmentReference2 {
    attachment_reference(vk::ATTACHMENT_UNUSED, vk::ImageLayout::UNDEFINED, vk::ImageAspectFlags::empty())
}

/// Places references at their declared location, filling holes with unused references.
fn by_location(mut refs: Vec<(u32, vk::AttachmentReference2)>) -> Vec<vk::AttachmentReference2> {
    refs.sort_by_key(|(location, _)| *location);
    let len = refs.last().map_or(0, |(location, _)| *location as usize + 1);
    let mut out = vec![unused_reference(); len];
    for (location, reference) in refs {
        out[location as usize] = reference;
    }
    out
}

impl<D: Device> Command<D> {
    pub(crate) fn create(
        device: &D,
        desc: &GraphDesc,
        collection: &Collection,
        dependency: &Dependency,
        metadata: &Metadata,
        schedule: &Schedule,
        allocation: &Allocation<D>,
    ) -> Result<Self> {
        let group_count = schedule.groups().len();
        let mut builder = Builder {
            desc,
            collection,
            dependency,
            metadata,
            schedule,
            allocation,
            batches: vec![BarrierBatch::default(); group_count],
            final_batch: BarrierBatch::default(),
            dependencies: vec![Vec::new(); group_count],
        };
        for barrier in schedule.barriers() {
            builder.place(barrier)?;
        }
        let validations = builder.validate()?;
        let (init_batch, init_resources) = builder.init_barriers()?;

        let mut command = Command {
            device: device.clone(),
            groups: Vec::with_capacity(group_count),
            init_batch,
            init_resources,
            final_batch: std::mem::take(&mut builder.final_batch),
            validations,
        };
        for (index, group) in schedule.groups().iter().enumerate() {
            let render_pass = match group.render_area {
                Some(area) => Some(command.create_render_pass(&builder, index, area)?),
                None => None,
            };
            command.groups.push(CommandGroup {
                passes: group.passes.clone(),
                barriers: std::mem::take(&mut builder.batches[index]),
                render_pass,
            });
        }

        debug!(
            "Command: {} groups, {} render passes, {} validation barriers",
            command.groups.len(),
            command.groups.iter().filter(|g| g.render_pass.is_some()).count(),
            command.validations.len()
        );
        Ok(command)
    }

    fn create_render_pass(&self, builder: &Builder<D>, group: usize, area: RenderArea) -> Result<RenderPassInfo> {
        let collection = builder.collection;
        let dependency = builder.dependency;
        let schedule = builder.schedule;
        let metadata = builder.metadata;
        let passes = &schedule.groups()[group].passes;

        let mut attachments: Vec<ResourceId> = Vec::new();
        let mut attachment_index: HashMap<ResourceId, u32> = HashMap::new();
        let mut first_inputs: Vec<InputId> = Vec::new();
        let mut initial_layouts = Vec::new();
        let mut final_layouts = Vec::new();

        let mut colors = Vec::with_capacity(passes.len());
        let mut depths = Vec::with_capacity(passes.len());
        let mut inputs = Vec::with_capacity(passes.len());
        for &pass in passes {
            let mut color_refs = Vec::new();
            let mut depth_ref = None;
            let mut input_refs = Vec::new();
            for &input in collection.pass_inputs(pass) {
                let decl = collection.input_ref(builder.desc, input)?;
                if !decl.usage.is_render_pass_attachment() {
                    continue;
                }
                let Some(resource) = dependency.input_resource(input) else {
                    continue;
                };
                let layout = schedule.layout(input);
                let index = *attachment_index.entry(resource).or_insert_with(|| {
                    attachments.push(resource);
                    first_inputs.push(input);
                    initial_layouts.push(layout);
                    final_layouts.push(layout);
                    attachments.len() as u32 - 1
                });
                final_layouts[index as usize] = layout;

                let reference = attachment_reference(index, layout, metadata.format(resource).aspect());
                if decl.usage.is_color_attachment() {
                    color_refs.push((decl.attachment.unwrap_or(color_refs.len() as u32), reference));
                } else if decl.usage.is_depth_attachment() {
                    depth_ref = Some(reference);
                } else {
                    input_refs.push((decl.attachment.unwrap_or(input_refs.len() as u32), reference));
                }
            }
            colors.push(by_location(color_refs));
            depths.push(depth_ref);
            inputs.push(by_location(input_refs));
        }

        let mut descriptions = Vec::with_capacity(attachments.len());
        let mut load_ops = Vec::with_capacity(attachments.len());
        let mut store_ops = Vec::with_capacity(attachments.len());
        let mut clear_values = Vec::with_capacity(attachments.len());
        let mut formats = Vec::with_capacity(attachments.len());
        for (index, &resource) in attachments.iter().enumerate() {
            let format = metadata.format(resource);
            let load_op = builder.load_op(first_inputs[index], resource)?;
            let store_op = builder.store_op(resource, group);
            let (stencil_load_op, stencil_store_op) = if format.has_stencil() {
                (load_op, store_op)
            } else {
                (vk::AttachmentLoadOp::DONT_CARE, vk::AttachmentStoreOp::DONT_CARE)
            };
            descriptions.push(vk::AttachmentDescription2 {
                format,
                samples: vk::SampleCountFlags::TYPE_1,
                load_op,
                store_op,
                stencil_load_op,
                stencil_store_op,
                initial_layout: initial_layouts[index],
                final_layout: final_layouts[index],
                ..Default::default()
            });
            load_ops.push(load_op);
            store_ops.push(store_op);
            clear_values.push(
                collection
                    .input_ref(builder.desc, first_inputs[index])?
                    .clear
                    .unwrap_or_default(),
            );
            formats.push(format);
        }

        let subpasses: Vec<vk::SubpassDescription2> = (0..passes.len())
            .map(|i| vk::SubpassDescription2 {
                pipeline_bind_point: vk::PipelineBindPoint::GRAPHICS,
                input_attachment_count: inputs[i].len() as u32,
                p_input_attachments: inputs[i].as_ptr(),
                color_attachment_count: colors[i].len() as u32,
                p_color_attachments: colors[i].as_ptr(),
                p_depth_stencil_attachment: depths[i]
                    .as_ref()
                    .map_or(std::ptr::null(), |depth| depth as *const vk::AttachmentReference2),
                ..Default::default()
            })
            .collect();
        let dependencies = builder.dependencies[group].clone();
        let vk_dependencies: Vec<vk::SubpassDependency2> = dependencies
            .iter()
            .map(|dependency| vk::SubpassDependency2 {
                src_subpass: dependency.src_subpass,
                dst_subpass: dependency.dst_subpass,
                src_stage_mask: dependency.src.stage.into_vulkan(),
                dst_stage_mask: dependency.dst.stage.into_vulkan(),
                src_access_mask: dependency.src.access.into_vulkan(),
                dst_access_mask: dependency.dst.access.into_vulkan(),
                dependency_flags: vk::DependencyFlags::BY_REGION,
                ..Default::default()
            })
            .collect();

        let info = vk::RenderPassCreateInfo2 {
            attachment_count: descriptions.len() as u32,
            p_attachments: descriptions.as_ptr(),
            subpass_count: subpasses.len() as u32,
            p_subpasses: subpasses.as_ptr(),
            dependency_count: vk_dependencies.len() as u32,
            p_dependencies: vk_dependencies.as_ptr(),
            ..Default::default()
        };
        let handle = self.device.create_render_pass(&info)?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkRenderPass {handle:p}");

        let mut image_infos = Vec::with_capacity(attachments.len());
        for (index, &resource) in attachments.iter().enumerate() {
            let usage = match builder.attachment_usage(resource) {
                Ok(usage) => usage,
                Err(e) => {
                    self.device.destroy_render_pass(handle);
                    return Err(e);
                }
            };
            let extent = metadata.image_size(resource).unwrap_or_default().base_extent();
            image_infos.push(vk::FramebufferAttachmentImageInfo {
                usage,
                width: extent.width,
                height: extent.height,
                layer_count: metadata.subresource_range(resource).layer_count,
                view_format_count: 1,
                p_view_formats: &formats[index],
                ..Default::default()
            });
        }
        let attachments_info = vk::FramebufferAttachmentsCreateInfo {
            attachment_image_info_count: image_infos.len() as u32,
            p_attachment_image_infos: image_infos.as_ptr(),
            ..Default::default()
        };
        let framebuffer_info = vk::FramebufferCreateInfo {
            p_next: &attachments_info as *const vk::FramebufferAttachmentsCreateInfo as *const c_void,
            flags: vk::FramebufferCreateFlags::IMAGELESS,
            render_pass: handle,
            attachment_count: attachments.len() as u32,
            width: area.extent.width,
            height: area.extent.height,
            layers: area.layers.max(1),
            ..Default::default()
        };
        let framebuffer = match self.device.create_framebuffer(&framebuffer_info) {
            Ok(framebuffer) => framebuffer,
            Err(e) => {
                self.device.destroy_render_pass(handle);
                return Err(e);
            }
        };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkFramebuffer {framebuffer:p}");

        Ok(RenderPassInfo {
            handle,
            framebuffer,
            area,
            attachments,
            load_ops,
            store_ops,
            initial_layouts,
            final_layouts,
            dependencies,
            clear_values,
        })
    }

    pub fn groups(&self) -> &[CommandGroup] {
        &self.groups
    }

    /// Barriers before the initialization callbacks of last frame resources.
    pub fn init_batch(&self) -> &BarrierBatch {
        &self.init_batch
    }

    /// Last frame resources with an initialization callback.
    pub fn init_resources(&self) -> &[ResourceId] {
        &self.init_resources
    }

    /// Barriers recorded after the last group, leaving external resources in their final state.
    pub fn final_batch(&self) -> &BarrierBatch {
        &self.final_batch
    }

    /// Barriers ordering physical resources that share memory.
    pub fn validations(&self) -> &[PassBarrier] {
        &self.validations
    }

    pub fn render_pass(&self, group: usize) -> Option<&RenderPassInfo> {
        self.groups.get(group)?.render_pass.as_ref()
    }
}

impl<D: Device> Drop for Command<D> {
    fn drop(&mut self) {
        for render_pass in self.groups.iter().filter_map(|group| group.render_pass.as_ref()) {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkFramebuffer {:p}", render_pass.framebuffer);
            self.device.destroy_framebuffer(render_pass.framebuffer);
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkRenderPass {:p}", render_pass.handle);
            self.device.destroy_render_pass(render_pass.handle);
        }
    }
}
