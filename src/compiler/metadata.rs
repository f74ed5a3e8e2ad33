//! Sizes, formats and usage flags of physical resources, and render areas of graphics passes.

use anyhow::Result;
use ash::vk;

use crate::compiler::collection::Collection;
use crate::compiler::dependency::Dependency;
use crate::compiler::{PassId, PhysId, ResourceId};
use crate::graph::pass::{PassKind, RenderArea};
use crate::graph::render_graph::GraphDesc;
use crate::graph::resource::{Resource, SubImageSize};
use crate::util::format::FormatAspect;
use crate::Error;

const ATTACHMENT_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
    vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT.as_raw()
        | vk::ImageUsageFlags::INPUT_ATTACHMENT.as_raw(),
);

#[derive(Debug)]
pub struct Metadata {
    image_sizes: Vec<Option<SubImageSize>>,
    base_layers: Vec<u32>,
    formats: Vec<vk::Format>,
    buffer_sizes: Vec<vk::DeviceSize>,
    image_usage: Vec<vk::ImageUsageFlags>,
    buffer_usage: Vec<vk::BufferUsageFlags>,
    render_areas: Vec<Option<RenderArea>>,
}

struct SizeResolver<'a> {
    desc: &'a GraphDesc,
    collection: &'a Collection,
    dependency: &'a Dependency,
    sizes: Vec<Option<SubImageSize>>,
    formats: Vec<vk::Format>,
    buffer_sizes: Vec<vk::DeviceSize>,
    done: Vec<bool>,
}

impl<'a> SizeResolver<'a> {
    fn error_key(&self, resource: ResourceId) -> Error {
        Error::ImageNotMerge(self.collection.resource_key(resource).clone())
    }

    /// Computes sizes bottom-up. The dependency phase already rejected cycles.
    fn resolve(&mut self, resource: ResourceId) -> Result<()> {
        if self.done[resource] {
            return Ok(());
        }
        self.done[resource] = true;
        let canvas = self.desc.canvas();
        match self.collection.resource_ref(self.desc, resource)? {
            Resource::ManagedImage(image) => {
                self.sizes[resource] = Some(image.size.evaluate(canvas));
                self.formats[resource] = image.format;
            }
            Resource::ManagedBuffer(buffer) => {
                self.buffer_sizes[resource] = buffer.size.evaluate(canvas);
            }
            Resource::ExternalImage(image) => {
                self.sizes[resource] = Some(SubImageSize::new(image.extent.width, image.extent.height).layers(image.layers));
                self.formats[resource] = image.format;
            }
            Resource::ExternalBuffer(buffer) => {
                self.buffer_sizes[resource] = buffer.size;
            }
            Resource::CombinedImage(_) => {
                let dependency = self.dependency;
                let children = dependency.combined_children(resource);
                if children.is_empty() {
                    return Err(self.error_key(resource).into());
                }
                let mut size = SubImageSize::empty();
                let mut format = None;
                for child in children {
                    self.resolve(child.resource)?;
                    let child_size = self.sizes[child.resource].ok_or_else(|| self.error_key(resource))?;
                    size = size.merge(&child_size).ok_or_else(|| self.error_key(resource))?;
                    let child_format = self.formats[child.resource];
                    match format {
                        None => format = Some(child_format),
                        Some(expected) if expected != child_format => return Err(self.error_key(resource).into()),
                        Some(_) => {}
                    }
                }
                self.sizes[resource] = Some(size);
                self.formats[resource] = format.unwrap_or(vk::Format::UNDEFINED);
            }
            Resource::LastFrameImage(_) | Resource::LastFrameBuffer(_) => {
                let Some(pointed) = self.dependency.lf_pointed(resource) else {
                    return Ok(());
                };
                let pointed = self.dependency.value(pointed).key.resource;
                self.resolve(pointed)?;
                self.sizes[resource] = self.sizes[pointed];
                self.formats[resource] = self.formats[pointed];
                self.buffer_sizes[resource] = self.buffer_sizes[pointed];
            }
        }
        Ok(())
    }
}

impl Metadata {
    pub(crate) fn create(desc: &GraphDesc, collection: &Collection, dependency: &Dependency) -> Result<Self> {
        let resources = collection.resource_count();
        let mut resolver = SizeResolver {
            desc,
            collection,
            dependency,
            sizes: vec![None; resources],
            formats: vec![vk::Format::UNDEFINED; resources],
            buffer_sizes: vec![0; resources],
            done: vec![false; resources],
        };
        for resource in (0..resources).filter(|resource| dependency.is_touched(*resource)) {
            resolver.resolve(resource)?;
        }
        let SizeResolver {
            sizes,
            formats,
            buffer_sizes,
            ..
        } = resolver;

        let mut metadata = Metadata {
            base_layers: vec![0; resources],
            image_sizes: sizes,
            formats,
            buffer_sizes,
            image_usage: vec![vk::ImageUsageFlags::empty(); dependency.phys_count()],
            buffer_usage: vec![vk::BufferUsageFlags::empty(); dependency.phys_count()],
            render_areas: vec![None; collection.pass_count()],
        };

        for &root in dependency.phys_roots() {
            metadata.assign_base_layers(dependency, root, 0);
        }
        // Last frame resources view the same range of the other copy.
        for resource in 0..resources {
            if let Some(pointed) = dependency.lf_pointed(resource) {
                let pointed = dependency.value(pointed).key.resource;
                metadata.base_layers[resource] = metadata.base_layers[pointed];
            }
        }

        metadata.aggregate_usage(desc, collection, dependency)?;
        metadata.compute_render_areas(desc, collection, dependency)?;

        debug!("Metadata: {} physical resources sized", dependency.phys_count());
        Ok(metadata)
    }

    /// Children stacked as layers start where the previous child ended. Children merged into a mip chain share the
    /// base layer of their parent.
    fn assign_base_layers(&mut self, dependency: &Dependency, resource: ResourceId, base: u32) {
        self.base_layers[resource] = base;
        let mut merged = SubImageSize::empty();
        for child in dependency.combined_children(resource) {
            let Some(size) = self.image_sizes[child.resource] else {
                continue;
            };
            let stacked = !merged.is_empty()
                && merged.extent == size.extent
                && merged.mips == size.mips
                && merged.base_mip == size.base_mip;
            let offset = if stacked {
                merged.layers
            } else {
                0
            };
            self.assign_base_layers(dependency, child.resource, base + offset);
            merged = merged.merge(&size).unwrap_or(merged);
        }
    }

    fn aggregate_usage(&mut self, desc: &GraphDesc, collection: &Collection, dependency: &Dependency) -> Result<()> {
        for &pass in dependency.topo_order() {
            for &input in collection.pass_inputs(pass) {
                let Some(phys) = dependency.input_resource(input).and_then(|r| dependency.phys_id_of(r)) else {
                    continue;
                };
                let usage = collection.input_ref(desc, input)?.usage;
                self.image_usage[phys] |= usage.image_usage();
                self.buffer_usage[phys] |= usage.buffer_usage();
            }
        }
        for resource in 0..collection.resource_count() {
            if !dependency.is_touched(resource) || !collection.resource_ref(desc, resource)?.has_init() {
                continue;
            }
            if let Some(phys) = dependency.phys_id_of(resource) {
                self.image_usage[phys] |= vk::ImageUsageFlags::TRANSFER_DST;
                self.buffer_usage[phys] |= vk::BufferUsageFlags::TRANSFER_DST;
            }
        }
        Ok(())
    }

    fn compute_render_areas(&mut self, desc: &GraphDesc, collection: &Collection, dependency: &Dependency) -> Result<()> {
        for &pass in dependency.topo_order() {
            let PassKind::Graphics(area) = collection.pass_ref(desc, pass)?.kind() else {
                continue;
            };
            if let Some(area) = area {
                self.render_areas[pass] = Some(*area);
                continue;
            }
            let mut derived: Option<RenderArea> = None;
            for &input in collection.pass_inputs(pass) {
                if !collection.input_ref(desc, input)?.usage.is_render_pass_attachment() {
                    continue;
                }
                let Some(size) = dependency.input_resource(input).and_then(|r| self.image_sizes[r]) else {
                    continue;
                };
                let extent = size.base_extent();
                let area = derived.get_or_insert(RenderArea {
                    extent,
                    layers: size.layers,
                });
                area.extent.width = area.extent.width.max(extent.width);
                area.extent.height = area.extent.height.max(extent.height);
                area.layers = area.layers.max(size.layers);
            }
            let canvas = desc.canvas();
            self.render_areas[pass] = Some(derived.unwrap_or(RenderArea::new(canvas.width, canvas.height)));
        }
        Ok(())
    }

    /// Size of an image resource. For combined images this is the merged size of all children.
    pub fn image_size(&self, resource: ResourceId) -> Option<SubImageSize> {
        self.image_sizes[resource]
    }

    /// First array layer of an image resource in its physical image.
    pub fn base_layer(&self, resource: ResourceId) -> u32 {
        self.base_layers[resource]
    }

    pub fn format(&self, resource: ResourceId) -> vk::Format {
        self.formats[resource]
    }

    pub fn buffer_size(&self, resource: ResourceId) -> vk::DeviceSize {
        self.buffer_sizes[resource]
    }

    /// Union of the usage flags of every input accessing this physical image.
    pub fn image_usage(&self, phys: PhysId) -> vk::ImageUsageFlags {
        self.image_usage[phys]
    }

    pub fn buffer_usage(&self, phys: PhysId) -> vk::BufferUsageFlags {
        self.buffer_usage[phys]
    }

    /// Whether this physical image is only ever used as an attachment, which lets it live in lazily allocated memory.
    pub fn is_transient_capable(&self, phys: PhysId) -> bool {
        let usage = self.image_usage[phys];
        !usage.is_empty() && (usage & !ATTACHMENT_USAGE).is_empty()
    }

    pub fn render_area(&self, pass: PassId) -> Option<RenderArea> {
        self.render_areas[pass]
    }

    /// The range of its physical image an image resource covers.
    pub fn subresource_range(&self, resource: ResourceId) -> vk::ImageSubresourceRange {
        let size = self.image_sizes[resource].unwrap_or_default();
        vk::ImageSubresourceRange {
            aspect_mask: self.formats[resource].aspect(),
            base_mip_level: size.base_mip,
            level_count: size.mips.max(1),
            base_array_layer: self.base_layers[resource],
            layer_count: size.layers.max(1),
        }
    }
}
