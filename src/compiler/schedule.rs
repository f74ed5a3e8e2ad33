//! Groups passes into render passes and derives the barriers between the accesses of every resource.

use anyhow::Result;
use ash::vk;

use crate::compiler::collection::Collection;
use crate::compiler::dependency::{Dependency, PassEdgeKind, ValueKey};
use crate::compiler::metadata::Metadata;
use crate::compiler::{InputId, PassId, PhysId, ResourceId};
use crate::core::config::GraphConfig;
use crate::graph::pass::RenderArea;
use crate::graph::render_graph::GraphDesc;
use crate::graph::resource::ResourceClass;
use crate::util::bitset::words;

/// Why a barrier exists.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BarrierKind {
    /// Between two accesses in the same frame, or from the previous frame for persistent resources.
    Local,
    /// Orders two resources sharing memory. Created by the command phase, once memory placement is known.
    Validate,
    /// Previous contents of a double buffered resource, read through a last frame resource.
    LastFrameInput,
    /// The current copy of a double buffered resource was read through a last frame resource in the previous frame.
    LastFrameOutput,
    /// From the state an external resource is in at the start of the frame.
    ExternalInput,
    /// To the state an external resource must be left in at the end of the frame.
    ExternalOutput,
}

/// Synchronization from the `src` accesses of a resource to its `dst` accesses. Stage, access and layout masks
/// follow from the usages of the inputs.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PassBarrier {
    pub resource: ResourceId,
    pub kind: BarrierKind,
    pub src: Vec<InputId>,
    pub dst: Vec<InputId>,
    /// The `src` inputs were recorded in the previous frame.
    pub src_prev_frame: bool,
}

/// A run of passes recorded together. Graphics groups become one render pass with a subpass per pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleGroup {
    pub passes: Vec<PassId>,
    /// `Some` for render pass groups.
    pub render_area: Option<RenderArea>,
}

impl ScheduleGroup {
    pub fn is_render_pass(&self) -> bool {
        self.render_area.is_some()
    }
}

#[derive(Debug)]
pub struct Schedule {
    groups: Vec<ScheduleGroup>,
    pass_group: Vec<Option<usize>>,
    pass_subpass: Vec<u32>,
    layouts: Vec<vk::ImageLayout>,
    barriers: Vec<PassBarrier>,
    first_inputs: Vec<Vec<InputId>>,
    last_inputs: Vec<Vec<InputId>>,
    group_windows: Vec<Option<(usize, usize)>>,
}

impl Schedule {
    pub(crate) fn create(
        desc: &GraphDesc,
        collection: &Collection,
        dependency: &Dependency,
        metadata: &Metadata,
        config: &GraphConfig,
    ) -> Result<Self> {
        let mut schedule = Schedule {
            groups: Vec::new(),
            pass_group: vec![None; collection.pass_count()],
            pass_subpass: vec![0; collection.pass_count()],
            layouts: vec![vk::ImageLayout::UNDEFINED; collection.input_count()],
            barriers: Vec::new(),
            first_inputs: vec![Vec::new(); dependency.phys_count()],
            last_inputs: vec![Vec::new(); dependency.phys_count()],
            group_windows: vec![None; dependency.phys_count()],
        };
        schedule.group_passes(desc, collection, dependency, metadata, config)?;
        schedule.resolve_layouts(desc, collection, dependency)?;
        schedule.create_barriers(desc, collection, dependency)?;
        schedule.compute_input_sets(desc, collection, dependency)?;

        debug!(
            "Schedule: {} groups, {} barriers",
            schedule.groups.len(),
            schedule.barriers.len()
        );
        Ok(schedule)
    }

    /// Consecutive graphics passes with equal render areas share a render pass, as long as every dependency between
    /// them goes from an attachment to an attachment.
    fn group_passes(
        &mut self,
        desc: &GraphDesc,
        collection: &Collection,
        dependency: &Dependency,
        metadata: &Metadata,
        config: &GraphConfig,
    ) -> Result<()> {
        for &pass in dependency.topo_order() {
            let graphics = collection.pass_ref(desc, pass)?.is_graphics();
            let area = metadata.render_area(pass);
            let current = self.groups.len().checked_sub(1);

            let mut merge = false;
            if let (true, true, Some(current)) = (graphics, config.subpass_merging, current) {
                let group = &self.groups[current];
                merge = group.is_render_pass() && group.render_area == area;
                if merge {
                    for (src, edge) in dependency.incoming_edges(pass) {
                        if edge.kind == PassEdgeKind::LastFrame || self.pass_group[src] != Some(current) {
                            continue;
                        }
                        let src_usage = collection.input_ref(desc, edge.src)?.usage;
                        let dst_usage = collection.input_ref(desc, edge.dst)?.usage;
                        if !src_usage.is_render_pass_attachment() || !dst_usage.is_render_pass_attachment() {
                            merge = false;
                            break;
                        }
                    }
                }
            }

            match (merge, current) {
                (true, Some(current)) => {
                    self.pass_subpass[pass] = self.groups[current].passes.len() as u32;
                    self.pass_group[pass] = Some(current);
                    self.groups[current].passes.push(pass);
                }
                _ => {
                    self.pass_group[pass] = Some(self.groups.len());
                    self.pass_subpass[pass] = 0;
                    self.groups.push(ScheduleGroup {
                        passes: vec![pass],
                        render_area: if graphics {
                            area
                        } else {
                            None
                        },
                    });
                }
            }
        }
        Ok(())
    }

    /// All readers of a value share one layout. If their usages disagree they all use `GENERAL`. Since an input can read
    /// several values through a combined image, this repeats until nothing changes.
    fn resolve_layouts(&mut self, desc: &GraphDesc, collection: &Collection, dependency: &Dependency) -> Result<()> {
        for &pass in dependency.topo_order() {
            for &input in collection.pass_inputs(pass) {
                self.layouts[input] = collection.input_ref(desc, input)?.usage.layout();
            }
        }

        let mut changed = true;
        while changed {
            changed = false;
            for value in dependency.values() {
                let Some((&first, rest)) = value.readers.split_first() else {
                    continue;
                };
                let layout = self.layouts[first];
                if rest.iter().all(|reader| self.layouts[*reader] == layout) {
                    continue;
                }
                for &reader in &value.readers {
                    if self.layouts[reader] != vk::ImageLayout::GENERAL {
                        self.layouts[reader] = vk::ImageLayout::GENERAL;
                        changed = true;
                    }
                }
            }
        }
        Ok(())
    }

    fn create_barriers(&mut self, desc: &GraphDesc, collection: &Collection, dependency: &Dependency) -> Result<()> {
        for value in dependency.values() {
            let resource = value.key.resource;
            let class = collection.resource_ref(desc, resource)?.class();
            let first_access: Vec<InputId> = if value.readers.is_empty() {
                value.writer.into_iter().collect()
            } else {
                value.readers.clone()
            };

            match value.key.producer {
                Some(producer) => {
                    if !first_access.is_empty() {
                        self.barriers.push(PassBarrier {
                            resource,
                            kind: BarrierKind::Local,
                            src: vec![producer],
                            dst: first_access,
                            src_prev_frame: false,
                        });
                    }
                }
                // Start of frame contents of a combined image are synchronized through its children.
                None if class == ResourceClass::Combined => {}
                None if first_access.is_empty() => {}
                None => {
                    let barrier = match class {
                        ResourceClass::LastFrame => {
                            let Some(pointed) = dependency.lf_pointed(resource) else {
                                continue;
                            };
                            PassBarrier {
                                resource,
                                kind: BarrierKind::LastFrameInput,
                                src: dependency.final_accessors(dependency.value(pointed).key.resource),
                                dst: first_access,
                                src_prev_frame: true,
                            }
                        }
                        ResourceClass::External => PassBarrier {
                            resource,
                            kind: BarrierKind::ExternalInput,
                            src: Vec::new(),
                            dst: first_access,
                            src_prev_frame: false,
                        },
                        _ => {
                            let phys = dependency.phys_id_of(resource);
                            match phys {
                                Some(phys) if dependency.is_double_buffered(phys) => PassBarrier {
                                    resource,
                                    kind: BarrierKind::LastFrameOutput,
                                    src: Self::lf_readers(dependency, phys),
                                    dst: first_access,
                                    src_prev_frame: true,
                                },
                                // Whether the previous frame matters depends on the memory class, which the command
                                // phase decides.
                                _ => PassBarrier {
                                    resource,
                                    kind: BarrierKind::Local,
                                    src: dependency.final_accessors(resource),
                                    dst: first_access,
                                    src_prev_frame: true,
                                },
                            }
                        }
                    };
                    self.barriers.push(barrier);
                }
            }

            if let (Some(writer), false) = (value.writer, value.readers.is_empty()) {
                let writer_pass = collection.input_pass(writer);
                let src: Vec<InputId> = value
                    .readers
                    .iter()
                    .copied()
                    .filter(|reader| collection.input_pass(*reader) != writer_pass)
                    .collect();
                if !src.is_empty() {
                    self.barriers.push(PassBarrier {
                        resource,
                        kind: BarrierKind::Local,
                        src,
                        dst: vec![writer],
                        src_prev_frame: false,
                    });
                }
            }
        }

        for &root in dependency.phys_roots() {
            if collection.resource_ref(desc, root)?.class() != ResourceClass::External {
                continue;
            }
            self.barriers.push(PassBarrier {
                resource: root,
                kind: BarrierKind::ExternalOutput,
                src: dependency.final_accessors(root),
                dst: Vec::new(),
                src_prev_frame: false,
            });
        }
        Ok(())
    }

    fn lf_readers(dependency: &Dependency, phys: PhysId) -> Vec<InputId> {
        let mut readers = Vec::new();
        for resource in dependency.lf_resources(phys) {
            let raw = ValueKey {
                resource,
                producer: None,
            };
            if let Some(value) = dependency.value_id(&raw) {
                readers.extend_from_slice(&dependency.value(value).readers);
            }
        }
        readers
    }

    /// First inputs have no predecessor among the accesses of their physical resource, last inputs no successor.
    fn compute_input_sets(&mut self, desc: &GraphDesc, collection: &Collection, dependency: &Dependency) -> Result<()> {
        let access = dependency.access_passes();
        for &pass in dependency.topo_order() {
            let (Some(topo), Some(group)) = (dependency.topo_id(pass), self.pass_group[pass]) else {
                continue;
            };
            for &input in collection.pass_inputs(pass) {
                let Some(resource) = dependency.input_resource(input) else {
                    continue;
                };
                if collection.resource_ref(desc, resource)?.class() == ResourceClass::LastFrame {
                    continue;
                }
                let Some(phys) = dependency.phys_id_of(resource) else {
                    continue;
                };
                if !words::intersects(dependency.pass_before().row(topo), access.row(phys)) {
                    self.first_inputs[phys].push(input);
                }
                if !words::intersects(dependency.pass_after().row(topo), access.row(phys)) {
                    self.last_inputs[phys].push(input);
                }
                let window = self.group_windows[phys].get_or_insert((group, group));
                window.0 = window.0.min(group);
                window.1 = window.1.max(group);
            }
        }
        Ok(())
    }

    pub fn groups(&self) -> &[ScheduleGroup] {
        &self.groups
    }

    pub fn group_of(&self, pass: PassId) -> Option<usize> {
        self.pass_group[pass]
    }

    /// Subpass index of a pass inside its render pass group.
    pub fn subpass_of(&self, pass: PassId) -> u32 {
        self.pass_subpass[pass]
    }

    /// Layout an image is in while it is accessed through this input.
    pub fn layout(&self, input: InputId) -> vk::ImageLayout {
        self.layouts[input]
    }

    pub fn barriers(&self) -> &[PassBarrier] {
        &self.barriers
    }

    pub fn first_inputs(&self, phys: PhysId) -> &[InputId] {
        &self.first_inputs[phys]
    }

    pub fn last_inputs(&self, phys: PhysId) -> &[InputId] {
        &self.last_inputs[phys]
    }

    /// First and last group accessing a physical resource.
    pub fn group_window(&self, phys: PhysId) -> Option<(usize, usize)> {
        self.group_windows[phys]
    }
}
