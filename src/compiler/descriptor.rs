//! Descriptor sets for passes that declared descriptor inputs.
//!
//! Every such pass gets one set layout, one pool and two sets, one per frame parity. Double buffered resources bind a
//! different copy in each set, so the set for a frame is selected with `frame % 2`.

use anyhow::Result;
use ash::vk;

use crate::compiler::allocation::Allocation;
use crate::compiler::collection::Collection;
use crate::compiler::dependency::Dependency;
use crate::compiler::schedule::Schedule;
use crate::compiler::{InputId, PassId};
use crate::core::traits::Device;
use crate::graph::render_graph::GraphDesc;
use crate::graph::resource::Resource;
use crate::Error;

const SET_COUNT: u32 = 2;

const STAGE_MAP: [(vk::PipelineStageFlags2, vk::ShaderStageFlags); 7] = [
    (vk::PipelineStageFlags2::VERTEX_SHADER, vk::ShaderStageFlags::VERTEX),
    (vk::PipelineStageFlags2::TESSELLATION_CONTROL_SHADER, vk::ShaderStageFlags::TESSELLATION_CONTROL),
    (vk::PipelineStageFlags2::TESSELLATION_EVALUATION_SHADER, vk::ShaderStageFlags::TESSELLATION_EVALUATION),
    (vk::PipelineStageFlags2::GEOMETRY_SHADER, vk::ShaderStageFlags::GEOMETRY),
    (vk::PipelineStageFlags2::FRAGMENT_SHADER, vk::ShaderStageFlags::FRAGMENT),
    (vk::PipelineStageFlags2::COMPUTE_SHADER, vk::ShaderStageFlags::COMPUTE),
    (vk::PipelineStageFlags2::PRE_RASTERIZATION_SHADERS, vk::ShaderStageFlags::ALL_GRAPHICS),
];

/// Shader stages that can access a descriptor used in the given pipeline stages. Falls back to all stages if none of
/// the pipeline stages runs shaders.
pub fn shader_stages(stages: vk::PipelineStageFlags2) -> vk::ShaderStageFlags {
    let flags = STAGE_MAP
        .iter()
        .filter(|(stage, _)| stages.intersects(*stage))
        .fold(vk::ShaderStageFlags::empty(), |flags, (_, shader)| flags | *shader);
    if flags.is_empty() {
        vk::ShaderStageFlags::ALL
    } else {
        flags
    }
}

#[derive(Debug)]
struct PassDescriptors {
    layout: vk::DescriptorSetLayout,
    pool: vk::DescriptorPool,
    sets: Vec<vk::DescriptorSet>,
}

#[derive(Debug, Copy, Clone)]
enum DescriptorInfo {
    Image(usize),
    Buffer(usize),
}

#[derive(Derivative)]
#[derivative(Debug)]
pub struct Descriptor<D: Device> {
    #[derivative(Debug = "ignore")]
    device: D,
    passes: Vec<Option<PassDescriptors>>,
}

impl<D: Device> Descriptor<D> {
    pub(crate) fn create(
        device: &D,
        desc: &GraphDesc,
        collection: &Collection,
        dependency: &Dependency,
        schedule: &Schedule,
        allocation: &Allocation<D>,
    ) -> Result<Self> {
        let mut descriptor = Descriptor {
            device: device.clone(),
            passes: (0..collection.pass_count()).map(|_| None).collect(),
        };

        let mut count = 0;
        for &pass in dependency.topo_order() {
            let mut inputs: Vec<(u32, InputId)> = Vec::new();
            for &input in collection.pass_inputs(pass) {
                if let Some(binding) = collection.input_ref(desc, input)?.descriptor {
                    inputs.push((binding.binding, input));
                }
            }
            if inputs.is_empty() {
                continue;
            }
            inputs.sort();
            if let Some(pair) = inputs.windows(2).find(|pair| pair[0].0 == pair[1].0) {
                return Err(Error::DuplicateBinding(collection.pass_key(pass).clone(), pair[0].0).into());
            }
            descriptor.create_pass(desc, collection, dependency, schedule, allocation, pass, &inputs)?;
            count += 1;
        }

        debug!("Descriptor: {count} passes with descriptor sets");
        Ok(descriptor)
    }

    #[allow(clippy::too_many_arguments)]
    fn create_pass(
        &mut self,
        desc: &GraphDesc,
        collection: &Collection,
        dependency: &Dependency,
        schedule: &Schedule,
        allocation: &Allocation<D>,
        pass: PassId,
        inputs: &[(u32, InputId)],
    ) -> Result<()> {
        // Immutable sampler pointers must stay valid until the layout is created.
        let mut samplers = Vec::with_capacity(inputs.len());
        let mut types = Vec::with_capacity(inputs.len());
        for &(_, input) in inputs {
            let decl = collection.input_ref(desc, input)?;
            let ty = decl
                .usage
                .descriptor_type()
                .ok_or(Error::InvalidUsage(decl.usage))?;
            let sampler = match ty {
                vk::DescriptorType::COMBINED_IMAGE_SAMPLER => decl.descriptor.and_then(|d| d.sampler),
                _ => None,
            };
            samplers.push(sampler);
            types.push(ty);
        }

        let mut bindings = Vec::with_capacity(inputs.len());
        for (i, &(binding, input)) in inputs.iter().enumerate() {
            let decl = collection.input_ref(desc, input)?;
            bindings.push(vk::DescriptorSetLayoutBinding {
                binding,
                descriptor_type: types[i],
                descriptor_count: 1,
                stage_flags: shader_stages(decl.stages),
                p_immutable_samplers: samplers[i]
                    .as_ref()
                    .map_or(std::ptr::null(), |sampler| sampler as *const vk::Sampler),
            });
        }
        let layout_info = vk::DescriptorSetLayoutCreateInfo {
            binding_count: bindings.len() as u32,
            p_bindings: bindings.as_ptr(),
            ..Default::default()
        };
        let layout = self.device.create_descriptor_set_layout(&layout_info)?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDescriptorSetLayout {layout:p} for {}", collection.pass_key(pass));

        let mut pool_sizes: Vec<vk::DescriptorPoolSize> = Vec::new();
        for &ty in &types {
            match pool_sizes.iter_mut().find(|size| size.ty == ty) {
                Some(size) => size.descriptor_count += SET_COUNT,
                None => pool_sizes.push(vk::DescriptorPoolSize {
                    ty,
                    descriptor_count: SET_COUNT,
                }),
            }
        }
        let pool_info = vk::DescriptorPoolCreateInfo {
            max_sets: SET_COUNT,
            pool_size_count: pool_sizes.len() as u32,
            p_pool_sizes: pool_sizes.as_ptr(),
            ..Default::default()
        };
        let pool = match self.device.create_descriptor_pool(&pool_info) {
            Ok(pool) => pool,
            Err(e) => {
                self.device.destroy_descriptor_set_layout(layout);
                return Err(e);
            }
        };
        self.passes[pass] = Some(PassDescriptors {
            layout,
            pool,
            sets: Vec::new(),
        });

        let layouts = [layout; SET_COUNT as usize];
        let alloc_info = vk::DescriptorSetAllocateInfo {
            descriptor_pool: pool,
            descriptor_set_count: SET_COUNT,
            p_set_layouts: layouts.as_ptr(),
            ..Default::default()
        };
        let sets = self.device.allocate_descriptor_sets(&alloc_info)?;

        // All infos are collected before the writes point into them.
        let mut image_infos = Vec::new();
        let mut buffer_infos = Vec::new();
        let mut pending = Vec::new();
        for (frame, &set) in sets.iter().enumerate() {
            for (i, &(binding, input)) in inputs.iter().enumerate() {
                let info = Self::resolve(desc, collection, dependency, schedule, allocation, input, frame as u64)?;
                let info = match info {
                    Resolved::Image(view, layout) => {
                        image_infos.push(vk::DescriptorImageInfo {
                            sampler: samplers[i].unwrap_or_default(),
                            image_view: view,
                            image_layout: layout,
                        });
                        DescriptorInfo::Image(image_infos.len() - 1)
                    }
                    Resolved::Buffer(buffer) => {
                        buffer_infos.push(vk::DescriptorBufferInfo {
                            buffer,
                            offset: 0,
                            range: vk::WHOLE_SIZE,
                        });
                        DescriptorInfo::Buffer(buffer_infos.len() - 1)
                    }
                };
                pending.push((set, binding, types[i], info));
            }
        }
        let writes: Vec<vk::WriteDescriptorSet> = pending
            .into_iter()
            .map(|(set, binding, ty, info)| {
                let mut write = vk::WriteDescriptorSet {
                    dst_set: set,
                    dst_binding: binding,
                    dst_array_element: 0,
                    descriptor_count: 1,
                    descriptor_type: ty,
                    ..Default::default()
                };
                match info {
                    DescriptorInfo::Image(index) => write.p_image_info = &image_infos[index],
                    DescriptorInfo::Buffer(index) => write.p_buffer_info = &buffer_infos[index],
                }
                write
            })
            .collect();
        self.device.update_descriptor_sets(&writes);

        if let Some(descriptors) = self.passes[pass].as_mut() {
            descriptors.sets = sets;
        }
        Ok(())
    }

    fn resolve(
        desc: &GraphDesc,
        collection: &Collection,
        dependency: &Dependency,
        schedule: &Schedule,
        allocation: &Allocation<D>,
        input: InputId,
        frame: u64,
    ) -> Result<Resolved> {
        let pass = collection.input_pass(input);
        let (_, key) = collection.input(input);
        let resource = dependency
            .input_resource(input)
            .ok_or_else(|| Error::InputNotFound(collection.pass_key(pass).clone(), key))?;
        let missing = || Error::ResourceNotFound(collection.resource_key(resource).clone());
        let usage = collection.input_ref(desc, input)?.usage;
        let resolved = match collection.resource_ref(desc, resource)? {
            Resource::ExternalImage(image) => Resolved::Image(image.view, schedule.layout(input)),
            Resource::ExternalBuffer(buffer) => Resolved::Buffer(buffer.buffer),
            _ if usage.is_image() => Resolved::Image(
                allocation.image_view(resource, frame).ok_or_else(missing)?,
                schedule.layout(input),
            ),
            _ => Resolved::Buffer(allocation.buffer(resource, frame).ok_or_else(missing)?),
        };
        Ok(resolved)
    }

    /// Descriptor set of a pass for the given frame.
    pub fn set(&self, pass: PassId, frame: u64) -> Option<vk::DescriptorSet> {
        let descriptors = self.passes.get(pass)?.as_ref()?;
        descriptors.sets.get((frame % SET_COUNT as u64) as usize).copied()
    }

    pub fn layout(&self, pass: PassId) -> Option<vk::DescriptorSetLayout> {
        Some(self.passes.get(pass)?.as_ref()?.layout)
    }
}

enum Resolved {
    Image(vk::ImageView, vk::ImageLayout),
    Buffer(vk::Buffer),
}

impl<D: Device> Drop for Descriptor<D> {
    fn drop(&mut self) {
        for descriptors in self.passes.iter().flatten() {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkDescriptorPool {:p}", descriptors.pool);
            self.device.destroy_descriptor_pool(descriptors.pool);
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkDescriptorSetLayout {:p}", descriptors.layout);
            self.device.destroy_descriptor_set_layout(descriptors.layout);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shader_stage_mapping() {
        assert_eq!(shader_stages(vk::PipelineStageFlags2::FRAGMENT_SHADER), vk::ShaderStageFlags::FRAGMENT);
        assert_eq!(
            shader_stages(vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::COMPUTE_SHADER),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::COMPUTE
        );
        assert_eq!(shader_stages(vk::PipelineStageFlags2::TRANSFER), vk::ShaderStageFlags::ALL);
    }
}
