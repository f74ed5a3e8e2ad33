//! Mock device, allocator and command recorder, so graphs can be compiled and recorded without a GPU.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::Result;
use ash::vk;
use ash::vk::Handle;

use vkrg::prelude::*;

pub fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

/// Handles of every object created through a [`MockDevice`].
#[derive(Debug, Default)]
pub struct DeviceState {
    next_handle: u64,
    /// Handles that were created and not yet destroyed.
    pub live: HashSet<u64>,
    pub images_created: usize,
    pub buffers_created: usize,
    pub views_created: usize,
    pub render_passes_created: usize,
    pub framebuffers_created: usize,
    pub descriptor_pools_created: usize,
    pub descriptor_writes: usize,
    /// `(memory, offset)` each image or buffer was bound to.
    pub bindings: HashMap<u64, (u64, vk::DeviceSize)>,
    image_sizes: HashMap<u64, vk::DeviceSize>,
    buffer_sizes: HashMap<u64, vk::DeviceSize>,
}

impl DeviceState {
    fn handle<T: Handle>(&mut self) -> T {
        self.next_handle += 1;
        self.live.insert(self.next_handle);
        T::from_raw(self.next_handle)
    }

    fn destroy<T: Handle>(&mut self, handle: T) {
        let raw = handle.as_raw();
        assert!(self.live.remove(&raw), "destroyed handle {raw:#x} that is not alive");
    }
}

#[derive(Debug, Default)]
struct AllocatorState {
    next_memory: u64,
    live: HashSet<u64>,
    allocated: usize,
}

/// Allocation made by a [`MockAllocator`]. Host visible allocations are backed by real host memory.
#[derive(Debug)]
pub struct MockAllocation {
    memory: vk::DeviceMemory,
    storage: Option<Box<[u8]>>,
}

impl vkrg::Allocation for MockAllocation {
    unsafe fn memory(&self) -> vk::DeviceMemory {
        self.memory
    }

    fn offset(&self) -> vk::DeviceSize {
        0
    }

    fn mapped_ptr(&self) -> Option<NonNull<c_void>> {
        self.storage
            .as_ref()
            .and_then(|storage| NonNull::new(storage.as_ptr() as *mut c_void))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockAllocator {
    state: Arc<Mutex<AllocatorState>>,
}

impl MockAllocator {
    /// Allocations that were made and not yet freed.
    pub fn live(&self) -> usize {
        self.state.lock().map(|state| state.live.len()).unwrap_or(0)
    }

    /// Total number of allocations ever made.
    pub fn allocated(&self) -> usize {
        self.state.lock().map(|state| state.allocated).unwrap_or(0)
    }
}

impl vkrg::Allocator for MockAllocator {
    type Allocation = MockAllocation;

    fn allocate(&mut self, _name: &str, requirements: &vk::MemoryRequirements, ty: MemoryType) -> Result<Self::Allocation> {
        let mut state = self.state.lock().map_err(|_| Error::PoisonError)?;
        state.next_memory += 1;
        state.allocated += 1;
        let raw = 0x1000_0000 + state.next_memory;
        state.live.insert(raw);
        let storage = match ty {
            MemoryType::CpuToGpu | MemoryType::GpuToCpu => Some(vec![0u8; requirements.size as usize].into_boxed_slice()),
            MemoryType::GpuOnly | MemoryType::GpuLazy => None,
        };
        Ok(MockAllocation {
            memory: vk::DeviceMemory::from_raw(raw),
            storage,
        })
    }

    fn free(&mut self, allocation: Self::Allocation) -> Result<()> {
        let mut state = self.state.lock().map_err(|_| Error::PoisonError)?;
        assert!(state.live.remove(&allocation.memory.as_raw()), "double free");
        Ok(())
    }
}

/// A [`Device`] that hands out fake handles and keeps track of them.
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<DeviceState>>,
    allocator: MockAllocator,
    limits: DeviceLimits,
}

const ALIGNMENT: vk::DeviceSize = 256;

fn align_up(size: vk::DeviceSize, alignment: vk::DeviceSize) -> vk::DeviceSize {
    (size + alignment - 1) / alignment * alignment
}

impl MockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            limits,
            ..Self::default()
        }
    }

    pub fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap()
    }

    pub fn mock_allocator(&self) -> &MockAllocator {
        &self.allocator
    }

    /// Number of created objects that were not destroyed yet.
    pub fn live_objects(&self) -> usize {
        self.state().live.len()
    }
}

impl Device for MockDevice {
    type Allocator = MockAllocator;

    fn allocator(&self) -> Self::Allocator {
        self.allocator.clone()
    }

    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn create_image(&self, info: &vk::ImageCreateInfo) -> Result<vk::Image> {
        let mut state = self.state();
        let image: vk::Image = state.handle();
        let extent = info.extent;
        let texels = extent.width as u64 * extent.height as u64 * extent.depth.max(1) as u64 * info.array_layers as u64;
        let size = align_up(texels * 4 * info.mip_levels.max(1) as u64, ALIGNMENT);
        state.image_sizes.insert(image.as_raw(), size);
        state.images_created += 1;
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        self.state().destroy(image)
    }

    fn create_buffer(&self, info: &vk::BufferCreateInfo) -> Result<vk::Buffer> {
        let mut state = self.state();
        let buffer: vk::Buffer = state.handle();
        state.buffer_sizes.insert(buffer.as_raw(), align_up(info.size, 16));
        state.buffers_created += 1;
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.state().destroy(buffer)
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: self.state().image_sizes[&image.as_raw()],
            alignment: ALIGNMENT,
            memory_type_bits: 1,
        }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        vk::MemoryRequirements {
            size: self.state().buffer_sizes[&buffer.as_raw()],
            alignment: 16,
            memory_type_bits: 1,
        }
    }

    unsafe fn bind_image_memory(&self, image: vk::Image, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> Result<()> {
        self.state().bindings.insert(image.as_raw(), (memory.as_raw(), offset));
        Ok(())
    }

    unsafe fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: vk::DeviceMemory, offset: vk::DeviceSize) -> Result<()> {
        self.state().bindings.insert(buffer.as_raw(), (memory.as_raw(), offset));
        Ok(())
    }

    fn create_image_view(&self, _info: &vk::ImageViewCreateInfo) -> Result<vk::ImageView> {
        let mut state = self.state();
        state.views_created += 1;
        Ok(state.handle())
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state().destroy(view)
    }

    fn create_render_pass(&self, _info: &vk::RenderPassCreateInfo2) -> Result<vk::RenderPass> {
        let mut state = self.state();
        state.render_passes_created += 1;
        Ok(state.handle())
    }

    fn destroy_render_pass(&self, render_pass: vk::RenderPass) {
        self.state().destroy(render_pass)
    }

    fn create_framebuffer(&self, info: &vk::FramebufferCreateInfo) -> Result<vk::Framebuffer> {
        assert!(info.flags.contains(vk::FramebufferCreateFlags::IMAGELESS));
        let mut state = self.state();
        state.framebuffers_created += 1;
        Ok(state.handle())
    }

    fn destroy_framebuffer(&self, framebuffer: vk::Framebuffer) {
        self.state().destroy(framebuffer)
    }

    fn create_descriptor_set_layout(&self, _info: &vk::DescriptorSetLayoutCreateInfo) -> Result<vk::DescriptorSetLayout> {
        Ok(self.state().handle())
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state().destroy(layout)
    }

    fn create_descriptor_pool(&self, _info: &vk::DescriptorPoolCreateInfo) -> Result<vk::DescriptorPool> {
        let mut state = self.state();
        state.descriptor_pools_created += 1;
        Ok(state.handle())
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        self.state().destroy(pool)
    }

    fn allocate_descriptor_sets(&self, info: &vk::DescriptorSetAllocateInfo) -> Result<Vec<vk::DescriptorSet>> {
        let mut state = self.state();
        let sets = (0..info.descriptor_set_count)
            .map(|_| {
                let set: vk::DescriptorSet = state.handle();
                // Sets are freed together with their pool.
                state.live.remove(&set.as_raw());
                set
            })
            .collect();
        Ok(sets)
    }

    fn update_descriptor_sets(&self, writes: &[vk::WriteDescriptorSet]) {
        self.state().descriptor_writes += writes.len();
    }
}

/// One image barrier, copied out of the `VkDependencyInfo` it was recorded with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    Barrier {
        /// `(src stage, src access, dst stage, dst access)`
        memory: Option<(vk::PipelineStageFlags2, vk::AccessFlags2, vk::PipelineStageFlags2, vk::AccessFlags2)>,
        images: Vec<ImageBarrier>,
    },
    BeginRenderPass {
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        attachments: Vec<vk::ImageView>,
        clear_values: usize,
    },
    NextSubpass,
    EndRenderPass,
    BeginLabel(String),
    EndLabel,
}

/// Records every command into a list instead of a command buffer.
#[derive(Debug, Default)]
pub struct MockCommandRecorder {
    pub commands: Vec<Recorded>,
}

impl MockCommandRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn barriers(&self) -> impl Iterator<Item = &Recorded> {
        self.commands
            .iter()
            .filter(|command| matches!(command, Recorded::Barrier { .. }))
    }

    /// All image barriers on `image`, in recording order.
    pub fn image_barriers(&self, image: vk::Image) -> Vec<ImageBarrier> {
        self.commands
            .iter()
            .filter_map(|command| match command {
                Recorded::Barrier {
                    images, ..
                } => Some(images.iter().filter(|barrier| barrier.image == image).copied()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn count(&self, pred: impl Fn(&Recorded) -> bool) -> usize {
        self.commands.iter().filter(|command| pred(command)).count()
    }
}

impl CommandRecorder for MockCommandRecorder {
    fn handle(&self) -> vk::CommandBuffer {
        vk::CommandBuffer::from_raw(0xC0FFEE)
    }

    fn pipeline_barrier_2(&mut self, dependency: &vk::DependencyInfo) {
        let memory = if dependency.memory_barrier_count > 0 {
            // SAFETY: The pointer is valid for the duration of this call.
            let barrier = unsafe { &*dependency.p_memory_barriers };
            Some((barrier.src_stage_mask, barrier.src_access_mask, barrier.dst_stage_mask, barrier.dst_access_mask))
        } else {
            None
        };
        let images = if dependency.image_memory_barrier_count > 0 {
            // SAFETY: See above.
            unsafe {
                std::slice::from_raw_parts(dependency.p_image_memory_barriers, dependency.image_memory_barrier_count as usize)
            }
        } else {
            &[]
        };
        let images = images
            .iter()
            .map(|barrier| ImageBarrier {
                image: barrier.image,
                src_stage: barrier.src_stage_mask,
                src_access: barrier.src_access_mask,
                dst_stage: barrier.dst_stage_mask,
                dst_access: barrier.dst_access_mask,
                old_layout: barrier.old_layout,
                new_layout: barrier.new_layout,
            })
            .collect();
        self.commands.push(Recorded::Barrier {
            memory,
            images,
        });
    }

    fn begin_render_pass(&mut self, info: &vk::RenderPassBeginInfo, _contents: vk::SubpassContents) {
        let mut attachments = Vec::new();
        if !info.p_next.is_null() {
            // SAFETY: The graph always chains a `VkRenderPassAttachmentBeginInfo` here.
            let chained = unsafe { &*(info.p_next as *const vk::RenderPassAttachmentBeginInfo) };
            assert_eq!(chained.s_type, vk::StructureType::RENDER_PASS_ATTACHMENT_BEGIN_INFO);
            if chained.attachment_count > 0 {
                attachments = unsafe { std::slice::from_raw_parts(chained.p_attachments, chained.attachment_count as usize) }.to_vec();
            }
        }
        self.commands.push(Recorded::BeginRenderPass {
            render_pass: info.render_pass,
            framebuffer: info.framebuffer,
            attachments,
            clear_values: info.clear_value_count as usize,
        });
    }

    fn next_subpass(&mut self, _contents: vk::SubpassContents) {
        self.commands.push(Recorded::NextSubpass);
    }

    fn end_render_pass(&mut self) {
        self.commands.push(Recorded::EndRenderPass);
    }

    fn begin_label(&mut self, name: &str, _color: [f32; 4]) {
        self.commands.push(Recorded::BeginLabel(name.to_owned()));
    }

    fn end_label(&mut self) {
        self.commands.push(Recorded::EndLabel);
    }
}

pub fn make_graph(config: GraphConfig) -> (MockDevice, RenderGraph<MockDevice>) {
    init_logger();
    let device = MockDevice::new();
    let graph = RenderGraph::new(device.clone(), config);
    (device, graph)
}

pub fn default_graph() -> (MockDevice, RenderGraph<MockDevice>) {
    make_graph(GraphConfigBuilder::new().canvas(64, 64).build())
}

/// Error the compiler returned, downcast to the crate error type.
pub fn vkrg_error(err: &anyhow::Error) -> &Error {
    err.downcast_ref::<Error>()
        .unwrap_or_else(|| panic!("not a vkrg error: {err:?}"))
}

pub const COLOR_FORMAT: vk::Format = vk::Format::R8G8B8A8_UNORM;

pub fn color_image(width: u32, height: u32) -> ManagedImage {
    ManagedImage::new(COLOR_FORMAT, ImageSize::fixed(width, height))
}

/// Compute pass that samples every alias in `reads` through inputs `in:<n>` and writes `target` through input `out`.
pub fn compute_pass(reads: &[Alias], target: Alias) -> Result<Pass> {
    let mut builder = PassBuilder::compute();
    for (index, alias) in reads.iter().enumerate() {
        builder = builder.add_input(
            Key::with_id("in", index as u32),
            alias.clone(),
            Usage::SampledImage,
            vk::PipelineStageFlags2::COMPUTE_SHADER,
        )?;
    }
    Ok(builder
        .add_input(Key::new("out"), target, Usage::StorageImageW, vk::PipelineStageFlags2::COMPUTE_SHADER)?
        .build())
}

/// Executor that appends `name` to `log` every time the pass is recorded.
pub fn log_executor(log: &std::rc::Rc<std::cell::RefCell<Vec<&'static str>>>, name: &'static str) -> impl PassExecutor {
    let log = log.clone();
    move |_: &mut PassContext| -> Result<()> {
        log.borrow_mut().push(name);
        Ok(())
    }
}

pub const SWAPCHAIN_IMAGE: u64 = 0xA000_0001;
pub const SWAPCHAIN_VIEW: u64 = 0xA000_0002;

/// A swapchain image owned by the caller, acquired at the start of the frame and presented at the end.
pub fn swapchain(width: u32, height: u32) -> ExternalImage {
    ExternalImage {
        image: vk::Image::from_raw(SWAPCHAIN_IMAGE),
        view: vk::ImageView::from_raw(SWAPCHAIN_VIEW),
        format: vk::Format::B8G8R8A8_SRGB,
        extent: vk::Extent2D {
            width,
            height,
        },
        layers: 1,
        usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        src: ExternalState::acquired(),
        dst: ExternalState::present(),
    }
}

/// The recorded commands without debug labels.
pub fn without_labels(commands: &[Recorded]) -> Vec<Recorded> {
    commands
        .iter()
        .filter(|command| !matches!(command, Recorded::BeginLabel(_) | Recorded::EndLabel))
        .cloned()
        .collect()
}
