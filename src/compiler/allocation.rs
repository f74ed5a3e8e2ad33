//! Creates the images and buffers of physical resources and places them in memory.
//!
//! Every physical resource falls into one [`AllocationClass`]. Resources of the same class and memory type bits share
//! one backing allocation. Inside the aliasable classes, resources that are never alive at the same time may be placed
//! at overlapping offsets. The placement is a best-fit search over the gaps left by the resources a candidate
//! conflicts with, largest resources first.

use std::ffi::c_void;
use std::ptr::NonNull;

use anyhow::Result;
use ash::vk;

use crate::allocator::memory_type::MemoryType;
use crate::allocator::traits::{Allocation as _, Allocator};
use crate::compiler::collection::Collection;
use crate::compiler::dependency::Dependency;
use crate::compiler::metadata::Metadata;
use crate::compiler::schedule::Schedule;
use crate::compiler::{PhysId, ResourceId};
use crate::core::config::GraphConfig;
use crate::core::traits::Device;
use crate::graph::render_graph::GraphDesc;
use crate::graph::resource::{MapType, ResourceClass, ResourceType};
use crate::util::align::align;
use crate::Error;

/// Memory class of a physical resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AllocationClass {
    /// Owned by the caller, nothing is allocated.
    External,
    /// Read through a last frame resource. Gets two copies that swap every frame.
    LastFrame,
    /// Host visible and cached.
    MappedRandom,
    /// Host visible and write combined.
    MappedSequential,
    /// Keeps its contents between frames.
    Persistent,
    /// Attachment-only image in lazily allocated memory.
    Transient,
    /// Everything else. Contents do not survive the frame, memory is shared where possible.
    Reusable,
}

impl AllocationClass {
    pub fn is_aliasable(&self) -> bool {
        matches!(self, AllocationClass::Transient | AllocationClass::Reusable)
    }
}

/// Where one copy of a physical resource lives.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Placement {
    /// Index of the backing allocation.
    pub memory: usize,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Object {
    Image(vk::Image),
    Buffer(vk::Buffer),
}

#[derive(Debug, Copy, Clone)]
struct Member {
    phys: PhysId,
    copy: usize,
    requirements: vk::MemoryRequirements,
    is_image: bool,
    first_access: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
struct GroupKey {
    class: AllocationClass,
    memory_type: MemoryType,
    memory_type_bits: u32,
}

/// Output of the allocation phase. Owns every image, buffer, view and allocation it created, and destroys them when
/// dropped.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Allocation<D: Device> {
    #[derivative(Debug = "ignore")]
    device: D,
    #[derivative(Debug = "ignore")]
    allocator: D::Allocator,
    classes: Vec<AllocationClass>,
    objects: Vec<Vec<Object>>,
    placements: Vec<Vec<Placement>>,
    #[derivative(Debug = "ignore")]
    memories: Vec<<D::Allocator as Allocator>::Allocation>,
    memory_types: Vec<MemoryType>,
    views: Vec<Vec<vk::ImageView>>,
    resource_phys: Vec<Option<PhysId>>,
    pointed: Vec<Option<ResourceId>>,
}

impl<D: Device> Allocation<D> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create(
        device: &D,
        desc: &GraphDesc,
        collection: &Collection,
        dependency: &Dependency,
        metadata: &Metadata,
        schedule: &Schedule,
        config: &GraphConfig,
    ) -> Result<Self> {
        let resources = collection.resource_count();
        let mut allocation = Allocation {
            device: device.clone(),
            allocator: device.allocator(),
            classes: Vec::with_capacity(dependency.phys_count()),
            objects: vec![Vec::new(); dependency.phys_count()],
            placements: vec![Vec::new(); dependency.phys_count()],
            memories: Vec::new(),
            memory_types: Vec::new(),
            views: vec![Vec::new(); resources],
            resource_phys: (0..resources).map(|r| dependency.phys_id_of(r)).collect(),
            pointed: (0..resources)
                .map(|r| dependency.lf_pointed(r).map(|value| dependency.value(value).key.resource))
                .collect(),
        };

        let mut memory_types = Vec::with_capacity(dependency.phys_count());
        for phys in 0..dependency.phys_count() {
            let (class, memory_type) = Self::classify(device, desc, collection, dependency, metadata, config, phys)?;
            allocation.classes.push(class);
            memory_types.push(memory_type);
        }
        let fallback = (0..dependency.phys_count())
            .any(|phys| allocation.classes[phys] == AllocationClass::Reusable && metadata.is_transient_capable(phys));
        if fallback && config.lazy_allocation && !device.limits().lazily_allocated {
            warn!("Lazily allocated memory is not supported, transient attachments use device local memory");
        }

        allocation.create_objects(desc, collection, dependency, metadata)?;
        allocation.place_and_bind(collection, dependency, schedule, config, &memory_types)?;
        allocation.create_views(desc, collection, dependency, metadata)?;

        debug!(
            "Allocation: {} physical resources in {} allocations",
            dependency.phys_count(),
            allocation.memories.len()
        );
        Ok(allocation)
    }

    fn classify(
        device: &D,
        desc: &GraphDesc,
        collection: &Collection,
        dependency: &Dependency,
        metadata: &Metadata,
        config: &GraphConfig,
        phys: PhysId,
    ) -> Result<(AllocationClass, MemoryType)> {
        let root = dependency.phys_roots()[phys];
        let resource = collection.resource_ref(desc, root)?;
        let map_type = resource.map_type();
        let mapped_type = match map_type {
            MapType::None => MemoryType::GpuOnly,
            MapType::Random => MemoryType::GpuToCpu,
            MapType::SequentialWrite => MemoryType::CpuToGpu,
        };

        if resource.class() == ResourceClass::External {
            return Ok((AllocationClass::External, MemoryType::GpuOnly));
        }
        if dependency.is_double_buffered(phys) {
            return Ok((AllocationClass::LastFrame, mapped_type));
        }
        match map_type {
            MapType::Random => return Ok((AllocationClass::MappedRandom, mapped_type)),
            MapType::SequentialWrite => return Ok((AllocationClass::MappedSequential, mapped_type)),
            MapType::None => {}
        }

        let mut persistent = false;
        for resource in 0..collection.resource_count() {
            if dependency.is_touched(resource)
                && dependency.phys_id_of(resource) == Some(phys)
                && collection.resource_ref(desc, resource)?.is_persistent()
            {
                persistent = true;
            }
        }
        if persistent {
            return Ok((AllocationClass::Persistent, MemoryType::GpuOnly));
        }

        if resource.ty() == ResourceType::Image
            && metadata.is_transient_capable(phys)
            && !dependency.holds_result(phys)
            && config.lazy_allocation
            && device.limits().lazily_allocated
        {
            return Ok((AllocationClass::Transient, MemoryType::GpuLazy));
        }
        Ok((AllocationClass::Reusable, MemoryType::GpuOnly))
    }

    fn create_objects(
        &mut self,
        desc: &GraphDesc,
        collection: &Collection,
        dependency: &Dependency,
        metadata: &Metadata,
    ) -> Result<()> {
        for (phys, &root) in dependency.phys_roots().iter().enumerate() {
            let copies = match self.classes[phys] {
                AllocationClass::External => 0,
                AllocationClass::LastFrame => 2,
                _ => 1,
            };
            let ty = collection.resource_ref(desc, root)?.ty();
            for _ in 0..copies {
                let object = match ty {
                    ResourceType::Image => {
                        let size = metadata.image_size(root).unwrap_or_default();
                        let mut usage = metadata.image_usage(phys);
                        if self.classes[phys] == AllocationClass::Transient {
                            usage |= vk::ImageUsageFlags::TRANSIENT_ATTACHMENT;
                        }
                        let info = vk::ImageCreateInfo {
                            image_type: vk::ImageType::TYPE_2D,
                            format: metadata.format(root),
                            extent: vk::Extent3D {
                                width: size.extent.width.max(1),
                                height: size.extent.height.max(1),
                                depth: 1,
                            },
                            mip_levels: (size.base_mip + size.mips).max(1),
                            array_layers: size.layers.max(1),
                            samples: vk::SampleCountFlags::TYPE_1,
                            tiling: vk::ImageTiling::OPTIMAL,
                            usage,
                            sharing_mode: vk::SharingMode::EXCLUSIVE,
                            initial_layout: vk::ImageLayout::UNDEFINED,
                            ..Default::default()
                        };
                        let image = self.device.create_image(&info)?;
                        #[cfg(feature = "log-objects")]
                        trace!("Created new VkImage {image:p} for {}", collection.resource_key(root));
                        Object::Image(image)
                    }
                    ResourceType::Buffer => {
                        let info = vk::BufferCreateInfo {
                            size: metadata.buffer_size(root).max(1),
                            usage: metadata.buffer_usage(phys),
                            sharing_mode: vk::SharingMode::EXCLUSIVE,
                            ..Default::default()
                        };
                        let buffer = self.device.create_buffer(&info)?;
                        #[cfg(feature = "log-objects")]
                        trace!("Created new VkBuffer {buffer:p} for {}", collection.resource_key(root));
                        Object::Buffer(buffer)
                    }
                };
                self.objects[phys].push(object);
            }
        }
        Ok(())
    }

    fn place_and_bind(
        &mut self,
        collection: &Collection,
        dependency: &Dependency,
        schedule: &Schedule,
        config: &GraphConfig,
        memory_types: &[MemoryType],
    ) -> Result<()> {
        let mut groups: Vec<(GroupKey, Vec<Member>)> = Vec::new();
        for phys in 0..dependency.phys_count() {
            let first_access = dependency.access_passes().iter_row(phys).next().unwrap_or(usize::MAX);
            for (copy, object) in self.objects[phys].iter().enumerate() {
                let (requirements, is_image) = match object {
                    Object::Image(image) => (self.device.image_memory_requirements(*image), true),
                    Object::Buffer(buffer) => (self.device.buffer_memory_requirements(*buffer), false),
                };
                let key = GroupKey {
                    class: self.classes[phys],
                    memory_type: memory_types[phys],
                    memory_type_bits: requirements.memory_type_bits,
                };
                let member = Member {
                    phys,
                    copy,
                    requirements,
                    is_image,
                    first_access,
                };
                match groups.iter_mut().find(|(group, _)| *group == key) {
                    Some((_, members)) => members.push(member),
                    None => groups.push((key, vec![member])),
                }
            }
        }

        let granularity = self.device.limits().buffer_image_granularity;
        for (key, members) in groups {
            let aliasable = config.aliasing && key.class.is_aliasable();
            let conflicts = |x: PhysId, y: PhysId| !aliasable || !Self::can_share(dependency, schedule, x, y);
            let (offsets, size, alignment) = place(&members, aliasable, granularity, conflicts);

            let root = dependency.phys_roots()[members[0].phys];
            if key.memory_type_bits == 0 {
                return Err(Error::NoMemoryType(collection.resource_key(root).clone()).into());
            }
            let requirements = vk::MemoryRequirements {
                size: size.max(1),
                alignment,
                memory_type_bits: key.memory_type_bits,
            };
            let name = format!("vkrg {:?} memory {}", key.class, self.memories.len());
            let memory = self.allocator.allocate(&name, &requirements, key.memory_type)?;
            let index = self.memories.len();

            for (member, offset) in members.iter().zip(offsets) {
                let placement = Placement {
                    memory: index,
                    offset,
                    size: member.requirements.size,
                };
                // SAFETY: The placement satisfies the alignment of the object and lies inside the allocation.
                unsafe {
                    let handle = memory.memory();
                    match self.objects[member.phys][member.copy] {
                        Object::Image(image) => self.device.bind_image_memory(image, handle, memory.offset() + offset)?,
                        Object::Buffer(buffer) => self.device.bind_buffer_memory(buffer, handle, memory.offset() + offset)?,
                    }
                }
                self.placements[member.phys].push(placement);
            }
            self.memories.push(memory);
            self.memory_types.push(key.memory_type);
        }
        Ok(())
    }

    /// Two physical resources can share memory if one of them is accessed strictly before the other, and they are
    /// never used inside the same group. A resource holding a result stays alive until the end of the frame, so
    /// nothing may follow it.
    fn can_share(dependency: &Dependency, schedule: &Schedule, x: PhysId, y: PhysId) -> bool {
        let (Some(wx), Some(wy)) = (schedule.group_window(x), schedule.group_window(y)) else {
            return false;
        };
        let before = |x: PhysId, y: PhysId, wx: (usize, usize), wy: (usize, usize)| {
            dependency.resource_precedes(x, y) && wx.1 < wy.0 && !dependency.holds_result(x)
        };
        before(x, y, wx, wy) || before(y, x, wy, wx)
    }

    fn create_views(
        &mut self,
        desc: &GraphDesc,
        collection: &Collection,
        dependency: &Dependency,
        metadata: &Metadata,
    ) -> Result<()> {
        for resource in 0..collection.resource_count() {
            if !dependency.is_touched(resource) {
                continue;
            }
            let decl = collection.resource_ref(desc, resource)?;
            if decl.ty() != ResourceType::Image
                || matches!(decl.class(), ResourceClass::LastFrame | ResourceClass::External)
            {
                continue;
            }
            let Some(phys) = self.resource_phys[resource] else {
                continue;
            };
            let range = metadata.subresource_range(resource);
            let images: Vec<vk::Image> = self.objects[phys]
                .iter()
                .filter_map(|object| match object {
                    Object::Image(image) => Some(*image),
                    Object::Buffer(_) => None,
                })
                .collect();
            for image in images {
                let info = vk::ImageViewCreateInfo {
                    image,
                    view_type: if range.layer_count > 1 {
                        vk::ImageViewType::TYPE_2D_ARRAY
                    } else {
                        vk::ImageViewType::TYPE_2D
                    },
                    format: metadata.format(resource),
                    components: vk::ComponentMapping::default(),
                    subresource_range: range,
                    ..Default::default()
                };
                let view = self.device.create_image_view(&info)?;
                #[cfg(feature = "log-objects")]
                trace!("Created new VkImageView {view:p} for {}", collection.resource_key(resource));
                self.views[resource].push(view);
            }
        }
        Ok(())
    }

    pub fn class(&self, phys: PhysId) -> AllocationClass {
        self.classes[phys]
    }

    /// Number of backing objects of a physical resource. Two for double buffered resources.
    pub fn copies(&self, phys: PhysId) -> usize {
        self.objects[phys].len()
    }

    /// Memory placement of one copy of a physical resource.
    pub fn placement(&self, phys: PhysId, copy: usize) -> Option<Placement> {
        self.placements[phys].get(copy).copied()
    }

    pub fn memory_count(&self) -> usize {
        self.memories.len()
    }

    pub fn memory_type(&self, memory: usize) -> Option<MemoryType> {
        self.memory_types.get(memory).copied()
    }

    /// Whether the memory of two different physical resources overlaps.
    pub fn is_aliased(&self, x: PhysId, y: PhysId) -> bool {
        if x == y {
            return false;
        }
        self.placements[x].iter().any(|a| {
            self.placements[y]
                .iter()
                .any(|b| a.memory == b.memory && a.offset < b.offset + b.size && b.offset < a.offset + a.size)
        })
    }

    /// Index of the copy a resource uses in `frame`. Last frame resources read the copy that was current in the
    /// previous frame.
    pub fn copy_index(&self, resource: ResourceId, frame: u64) -> usize {
        let Some(phys) = self.resource_phys[resource] else {
            return 0;
        };
        if self.objects[phys].len() < 2 {
            return 0;
        }
        let parity = (frame % 2) as usize;
        if self.pointed[resource].is_some() {
            1 - parity
        } else {
            parity
        }
    }

    pub fn image(&self, resource: ResourceId, frame: u64) -> Option<vk::Image> {
        let phys = self.resource_phys[resource]?;
        match self.objects[phys].get(self.copy_index(resource, frame))? {
            Object::Image(image) => Some(*image),
            Object::Buffer(_) => None,
        }
    }

    pub fn image_view(&self, resource: ResourceId, frame: u64) -> Option<vk::ImageView> {
        let copy = self.copy_index(resource, frame);
        let source = self.pointed[resource].unwrap_or(resource);
        self.views[source].get(copy).copied()
    }

    pub fn buffer(&self, resource: ResourceId, frame: u64) -> Option<vk::Buffer> {
        let phys = self.resource_phys[resource]?;
        match self.objects[phys].get(self.copy_index(resource, frame))? {
            Object::Buffer(buffer) => Some(*buffer),
            Object::Image(_) => None,
        }
    }

    /// Host pointer to a buffer in mapped memory.
    pub fn mapped_ptr(&self, resource: ResourceId, frame: u64) -> Option<NonNull<c_void>> {
        let phys = self.resource_phys[resource]?;
        let placement = self.placement(phys, self.copy_index(resource, frame))?;
        let base = self.memories.get(placement.memory)?.mapped_ptr()?;
        // SAFETY: The placement lies inside the mapped allocation.
        NonNull::new(unsafe { base.as_ptr().cast::<u8>().add(placement.offset as usize) }.cast::<c_void>())
    }
}

/// Places every member of one memory group and returns the offsets in member order, the total size and the alignment
/// of the whole group.
fn place(
    members: &[Member],
    aliasable: bool,
    granularity: vk::DeviceSize,
    conflicts: impl Fn(PhysId, PhysId) -> bool,
) -> (Vec<vk::DeviceSize>, vk::DeviceSize, vk::DeviceSize) {
    // Linear and optimal resources closer than the granularity must not share a page.
    let mixed = members.iter().any(|m| m.is_image) && members.iter().any(|m| !m.is_image);
    let alignment_of = |member: &Member| {
        if mixed {
            member.requirements.alignment.max(granularity)
        } else {
            member.requirements.alignment
        }
    };

    let mut order: Vec<usize> = (0..members.len()).collect();
    if aliasable {
        order.sort_by(|&a, &b| {
            let (a, b) = (&members[a], &members[b]);
            b.requirements
                .size
                .cmp(&a.requirements.size)
                .then(a.first_access.cmp(&b.first_access))
                .then(a.phys.cmp(&b.phys))
        });
    }

    let mut offsets = vec![0; members.len()];
    let mut placed: Vec<usize> = Vec::with_capacity(members.len());
    let mut end = 0;
    let mut group_alignment = 1;
    for index in order {
        let member = &members[index];
        let size = member.requirements.size;
        let alignment = alignment_of(member);
        group_alignment = group_alignment.max(alignment);

        let offset = if aliasable {
            let mut occupied: Vec<(vk::DeviceSize, vk::DeviceSize)> = placed
                .iter()
                .filter(|&&other| conflicts(member.phys, members[other].phys))
                .map(|&other| (offsets[other], offsets[other] + members[other].requirements.size))
                .collect();
            occupied.sort();

            let mut best: Option<(vk::DeviceSize, vk::DeviceSize)> = None;
            let mut cursor = 0;
            for (start, stop) in occupied {
                let candidate = align(cursor, alignment);
                if start > cursor && candidate + size <= start {
                    let gap = start - cursor;
                    if best.map_or(true, |(_, best_gap)| gap < best_gap) {
                        best = Some((candidate, gap));
                    }
                }
                cursor = cursor.max(stop);
            }
            best.map(|(offset, _)| offset).unwrap_or_else(|| align(cursor, alignment))
        } else {
            align(end, alignment)
        };

        offsets[index] = offset;
        end = end.max(offset + size);
        placed.push(index);
    }
    (offsets, end, group_alignment)
}

impl<D: Device> Drop for Allocation<D> {
    fn drop(&mut self) {
        for views in &self.views {
            for view in views {
                #[cfg(feature = "log-objects")]
                trace!("Destroying VkImageView {view:p}");
                self.device.destroy_image_view(*view);
            }
        }
        for objects in &self.objects {
            for object in objects {
                match object {
                    Object::Image(image) => {
                        #[cfg(feature = "log-objects")]
                        trace!("Destroying VkImage {image:p}");
                        self.device.destroy_image(*image);
                    }
                    Object::Buffer(buffer) => {
                        #[cfg(feature = "log-objects")]
                        trace!("Destroying VkBuffer {buffer:p}");
                        self.device.destroy_buffer(*buffer);
                    }
                }
            }
        }
        for memory in self.memories.drain(..) {
            if let Err(e) = self.allocator.free(memory) {
                error!("Failed to free render graph memory: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(phys: PhysId, size: vk::DeviceSize, first_access: usize) -> Member {
        Member {
            phys,
            copy: 0,
            requirements: vk::MemoryRequirements {
                size,
                alignment: 256,
                memory_type_bits: 1,
            },
            is_image: true,
            first_access,
        }
    }

    #[test]
    fn disjoint_lifetimes_share_offsets() {
        let members = [member(0, 1024, 0), member(1, 1024, 1)];
        let (offsets, size, _) = place(&members, true, 1, |_, _| false);
        assert_eq!(offsets, vec![0, 0]);
        assert_eq!(size, 1024);
    }

    #[test]
    fn conflicting_resources_do_not_overlap() {
        let members = [member(0, 1000, 0), member(1, 1000, 1)];
        let (offsets, size, _) = place(&members, true, 1, |_, _| true);
        assert_eq!(offsets, vec![0, 1024]);
        assert_eq!(size, 2024);
    }

    #[test]
    fn best_fit_picks_smallest_gap() {
        // 0 and 2 conflict with 3, 1 does not. 3 fits into the gap left by 1.
        let members = [member(0, 4096, 0), member(1, 1024, 1), member(2, 512, 2), member(3, 1024, 3)];
        let conflicts = |x: PhysId, y: PhysId| {
            let pair = (x.min(y), x.max(y));
            matches!(pair, (0, 1) | (0, 2) | (1, 2) | (0, 3) | (2, 3))
        };
        let (offsets, _, _) = place(&members, true, 1, conflicts);
        assert_eq!(offsets[0], 0);
        assert_eq!(offsets[1], 4096);
        assert_eq!(offsets[2], 5120);
        assert_eq!(offsets[3], 4096);
    }

    #[test]
    fn sequential_placement_respects_granularity() {
        let mut buffer = member(1, 100, 1);
        buffer.is_image = false;
        buffer.requirements.alignment = 16;
        let members = [member(0, 300, 0), buffer];
        let (offsets, _, alignment) = place(&members, false, 1024, |_, _| true);
        assert_eq!(offsets, vec![0, 1024]);
        assert_eq!(alignment, 1024);
    }
}
