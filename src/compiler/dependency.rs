//! Resolves aliases into a pass graph and a resource forest, orders passes and computes the relations
//! used to decide which resources may share memory.
//!
//! # Values
//! Every write to a resource produces a new *value* of it. A value is identified by its resource and the input that
//! produced it, or no input for the contents a resource has at the start of the frame. Each value has at most one
//! writer and any number of readers. Readers of a value always execute before its writer, which is enforced by
//! write-after-read edges in the pass graph.
//!
//! # Culling
//! Only passes that contribute to one of the results of the graph are visited. All other passes are ignored by every
//! later phase, and never recorded.

use std::collections::{BinaryHeap, HashMap};
use std::cmp::Reverse;
use std::fmt::{Display, Formatter};

use anyhow::Result;
use petgraph::dot::Dot;
use petgraph::graph::{EdgeReference, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::{Direction, Graph};

use crate::compiler::collection::Collection;
use crate::compiler::{InputId, PassId, PhysId, ResourceId, ValueId};
use crate::graph::alias::{Alias, AliasSource};
use crate::graph::key::GlobalKey;
use crate::graph::render_graph::GraphDesc;
use crate::graph::resource::{Resource, ResourceClass, ResourceType};
use crate::util::bitset::{words, BitMatrix};
use crate::Error;

/// Identifies one value of a resource.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ValueKey {
    pub resource: ResourceId,
    /// The input that wrote this value, or `None` for the contents at the start of the frame.
    pub producer: Option<InputId>,
}

#[derive(Debug, Clone)]
pub struct Value {
    pub key: ValueKey,
    pub readers: Vec<InputId>,
    pub writer: Option<InputId>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PassEdgeKind {
    /// The destination consumes a value produced by the source.
    Local,
    /// The source reads a value the destination overwrites.
    WriteAfterRead,
    /// The destination reads, through a last frame resource, what the source produced in the previous frame.
    /// These edges point backwards in time and are not part of the ordering.
    LastFrame,
}

/// Edge of the pass graph, from the pass owning `src` to the pass owning `dst`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PassEdge {
    pub resource: ResourceId,
    pub src: InputId,
    pub dst: InputId,
    pub kind: PassEdgeKind,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ResourceEdgeKind {
    /// Combined image to one of its children.
    Combined,
    /// Pointed resource to the last frame resource reading it.
    LastFrame,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum InputState {
    Unresolved,
    InProgress,
    Resolved(ResourceId),
}

/// Output of the dependency phase.
#[derive(Debug)]
pub struct Dependency {
    pass_graph: Graph<PassId, PassEdge>,
    resource_graph: Graph<ResourceId, ResourceEdgeKind>,
    pass_keys: Vec<GlobalKey>,
    resource_keys: Vec<GlobalKey>,
    visited: Vec<bool>,
    topo_order: Vec<PassId>,
    topo_id: Vec<Option<usize>>,
    values: Vec<Value>,
    value_index: HashMap<ValueKey, ValueId>,
    input_value: Vec<Option<ValueId>>,
    input_resource: Vec<Option<ResourceId>>,
    touched: Vec<bool>,
    root: Vec<Option<ResourceId>>,
    phys_id: Vec<Option<PhysId>>,
    phys_roots: Vec<ResourceId>,
    lf_pointed: Vec<Option<ValueId>>,
    combined_children: HashMap<ResourceId, Vec<ValueKey>>,
    results: Vec<ValueId>,
    /// `pass_after[a][b]`: topo id `a` strictly precedes topo id `b`.
    pass_after: BitMatrix,
    pass_before: BitMatrix,
    /// `access_passes[x][t]`: physical resource `x` is accessed by topo id `t`.
    access_passes: BitMatrix,
    /// `resource_before[x][y]`: every access of `y` strictly follows every access of `x`.
    resource_before: BitMatrix,
}

struct Builder<'a> {
    desc: &'a GraphDesc,
    collection: &'a Collection,
    visited: Vec<bool>,
    input_state: Vec<InputState>,
    input_value: Vec<Option<ValueId>>,
    values: Vec<Value>,
    value_index: HashMap<ValueKey, ValueId>,
    expanded: Vec<bool>,
    expanding: Vec<bool>,
    touched: Vec<bool>,
    lf_pointed: Vec<Option<ValueId>>,
    combined_children: HashMap<ResourceId, Vec<ValueKey>>,
    pass_edges: Vec<(PassId, PassId, PassEdge)>,
    resource_edges: Vec<(ResourceId, ResourceId, ResourceEdgeKind)>,
}

impl<'a> Builder<'a> {
    fn new(desc: &'a GraphDesc, collection: &'a Collection) -> Self {
        Self {
            desc,
            collection,
            visited: vec![false; collection.pass_count()],
            input_state: vec![InputState::Unresolved; collection.input_count()],
            input_value: vec![None; collection.input_count()],
            values: Vec::new(),
            value_index: HashMap::new(),
            expanded: vec![false; collection.resource_count()],
            expanding: vec![false; collection.resource_count()],
            touched: vec![false; collection.resource_count()],
            lf_pointed: vec![None; collection.resource_count()],
            combined_children: HashMap::new(),
            pass_edges: Vec::new(),
            resource_edges: Vec::new(),
        }
    }

    fn resource(&self, resource: ResourceId) -> Result<&'a Resource> {
        self.collection.resource_ref(self.desc, resource)
    }

    fn resource_key(&self, resource: ResourceId) -> GlobalKey {
        self.collection.resource_key(resource).clone()
    }

    fn resolve(&mut self, alias: &Alias) -> Result<ValueKey> {
        let value = match alias.source() {
            AliasSource::Raw(key) => {
                let resource = self
                    .collection
                    .resource_id(key)
                    .ok_or_else(|| Error::ResourceNotFound(key.clone()))?;
                ValueKey {
                    resource,
                    producer: None,
                }
            }
            AliasSource::Output {
                pass,
                input,
            } => {
                let pass_id = self
                    .collection
                    .pass_id(pass)
                    .ok_or_else(|| Error::PassNotFound(pass.clone()))?;
                let input_id = self
                    .collection
                    .input_id(pass_id, *input)
                    .ok_or_else(|| Error::InputNotFound(pass.clone(), *input))?;
                if !self.collection.input_ref(self.desc, input_id)?.usage.is_write() {
                    return Err(Error::AliasNoMatch(alias.error_key()).into());
                }
                ValueKey {
                    resource: self.input_resource(input_id)?,
                    producer: Some(input_id),
                }
            }
        };
        if self.resource(value.resource)?.ty() != alias.ty() {
            return Err(Error::AliasNoMatch(alias.error_key()).into());
        }
        Ok(value)
    }

    fn input_resource(&mut self, input: InputId) -> Result<ResourceId> {
        match self.input_state[input] {
            InputState::Resolved(resource) => return Ok(resource),
            // The alias of this input ends up naming the output of the input itself.
            InputState::InProgress => {
                let pass = self.collection.input_pass(input);
                return Err(Error::PassNotDAG(self.collection.pass_key(pass).clone()).into());
            }
            InputState::Unresolved => {}
        }
        self.input_state[input] = InputState::InProgress;
        let alias = &self.collection.input_ref(self.desc, input)?.alias;
        let value = self.resolve(alias)?;
        self.input_state[input] = InputState::Resolved(value.resource);
        Ok(value.resource)
    }

    fn value_id(&mut self, key: ValueKey) -> ValueId {
        if let Some(id) = self.value_index.get(&key) {
            return *id;
        }
        let id = self.values.len();
        self.values.push(Value {
            key,
            readers: Vec::new(),
            writer: None,
        });
        self.value_index.insert(key, id);
        id
    }

    fn visit_pass(&mut self, pass: PassId) -> Result<()> {
        if self.visited[pass] {
            return Ok(());
        }
        self.visited[pass] = true;
        let collection = self.collection;
        trace!("Visiting pass {}", collection.pass_key(pass));

        for &input in collection.pass_inputs(pass) {
            let decl = collection.input_ref(self.desc, input)?;
            let value = self.resolve(&decl.alias)?;
            self.input_state[input] = InputState::Resolved(value.resource);
            let ty = self.resource(value.resource)?.ty();
            if decl.usage.is_image() != (ty == ResourceType::Image) {
                return Err(Error::AliasNoMatch(decl.alias.error_key()).into());
            }
            let value = self.value_id(value);
            self.input_value[input] = Some(value);
            self.consume(value, input)?;
        }
        Ok(())
    }

    fn consume(&mut self, value: ValueId, input: InputId) -> Result<()> {
        let key = self.values[value].key;
        let resource = self.resource(key.resource)?;
        let usage = self.collection.input_ref(self.desc, input)?.usage;
        if usage.is_write() {
            if resource.class() == ResourceClass::LastFrame {
                return Err(Error::WriteToLastFrame(self.resource_key(key.resource)).into());
            }
            if self.values[value].writer.is_some() {
                return Err(Error::MultipleWrite(self.resource_key(key.resource)).into());
            }
            self.values[value].writer = Some(input);
        } else if !self.values[value].readers.contains(&input) {
            self.values[value].readers.push(input);
        }

        if let Some(producer) = key.producer {
            let src_pass = self.collection.input_pass(producer);
            let dst_pass = self.collection.input_pass(input);
            self.pass_edges.push((
                src_pass,
                dst_pass,
                PassEdge {
                    resource: key.resource,
                    src: producer,
                    dst: input,
                    kind: PassEdgeKind::Local,
                },
            ));
            self.visit_pass(src_pass)?;
        }
        self.expand_resource(key.resource)?;

        // The start of frame contents of a combined image are whatever its children hold.
        if key.producer.is_none() && resource.class() == ResourceClass::Combined {
            let children = self.combined_children.get(&key.resource).cloned().unwrap_or_default();
            for child in children {
                let child = self.value_id(child);
                self.consume(child, input)?;
            }
        }
        Ok(())
    }

    fn expand_resource(&mut self, resource: ResourceId) -> Result<()> {
        if self.expanded[resource] {
            return Ok(());
        }
        if self.expanding[resource] {
            return Err(Error::ResourceNotTree(self.resource_key(resource)).into());
        }
        self.expanding[resource] = true;
        self.touched[resource] = true;

        let mut to_visit = Vec::new();
        match self.resource(resource)? {
            Resource::CombinedImage(combined) => {
                let mut children = Vec::with_capacity(combined.children.len());
                for alias in &combined.children {
                    let child = self.resolve(alias)?;
                    if alias.ty() != ResourceType::Image {
                        return Err(Error::AliasNoMatch(alias.error_key()).into());
                    }
                    self.check_parent(child.resource)?;
                    self.resource_edges
                        .push((resource, child.resource, ResourceEdgeKind::Combined));
                    if let Some(producer) = child.producer {
                        to_visit.push(self.collection.input_pass(producer));
                    }
                    self.expand_resource(child.resource)?;
                    children.push(child);
                }
                self.combined_children.insert(resource, children);
            }
            Resource::LastFrameImage(_) | Resource::LastFrameBuffer(_) => {
                let Some(alias) = self.resource(resource)?.pointed() else {
                    return Err(Error::Uncategorized("Last frame resource without pointed alias").into());
                };
                let pointed = self.resolve(alias)?;
                self.check_parent(pointed.resource)?;
                self.resource_edges
                    .push((pointed.resource, resource, ResourceEdgeKind::LastFrame));
                if let Some(producer) = pointed.producer {
                    to_visit.push(self.collection.input_pass(producer));
                }
                self.expand_resource(pointed.resource)?;
                let pointed = self.value_id(pointed);
                self.lf_pointed[resource] = Some(pointed);
            }
            _ => {}
        }

        self.expanding[resource] = false;
        self.expanded[resource] = true;
        for pass in to_visit {
            self.visit_pass(pass)?;
        }
        Ok(())
    }

    /// Resources that are a combined image child or a last frame target cannot be external or last frame resources.
    fn check_parent(&self, child: ResourceId) -> Result<()> {
        match self.resource(child)?.class() {
            ResourceClass::LastFrame => Err(Error::ResourceLFParent(self.resource_key(child)).into()),
            ResourceClass::External => Err(Error::ResourceExtParent(self.resource_key(child)).into()),
            _ => Ok(()),
        }
    }
}

impl Dependency {
    pub(crate) fn create(desc: &GraphDesc, collection: &Collection) -> Result<Self> {
        let mut builder = Builder::new(desc, collection);

        let mut results = Vec::new();
        for (_, alias) in desc.results().iter() {
            let value = builder.resolve(alias)?;
            if let Some(producer) = value.producer {
                builder.visit_pass(collection.input_pass(producer))?;
            }
            builder.expand_resource(value.resource)?;
            results.push(builder.value_id(value));
        }

        let Builder {
            visited,
            input_state,
            input_value,
            values,
            value_index,
            touched,
            lf_pointed,
            combined_children,
            mut pass_edges,
            resource_edges,
            ..
        } = builder;

        // Readers of a last frame resource consume what the producer of the pointed value wrote last frame.
        for (resource, pointed) in lf_pointed.iter().enumerate() {
            let Some(pointed) = pointed else {
                continue;
            };
            let Some(producer) = values[*pointed].key.producer else {
                continue;
            };
            let raw = ValueKey {
                resource,
                producer: None,
            };
            let Some(value) = value_index.get(&raw) else {
                continue;
            };
            for &reader in &values[*value].readers {
                pass_edges.push((
                    collection.input_pass(producer),
                    collection.input_pass(reader),
                    PassEdge {
                        resource,
                        src: producer,
                        dst: reader,
                        kind: PassEdgeKind::LastFrame,
                    },
                ));
            }
        }

        for value in &values {
            let Some(writer) = value.writer else {
                continue;
            };
            let writer_pass = collection.input_pass(writer);
            for &reader in &value.readers {
                let reader_pass = collection.input_pass(reader);
                if reader_pass == writer_pass {
                    continue;
                }
                pass_edges.push((
                    reader_pass,
                    writer_pass,
                    PassEdge {
                        resource: value.key.resource,
                        src: reader,
                        dst: writer,
                        kind: PassEdgeKind::WriteAfterRead,
                    },
                ));
            }
        }

        let mut pass_graph = Graph::with_capacity(collection.pass_count(), pass_edges.len());
        for pass in 0..collection.pass_count() {
            pass_graph.add_node(pass);
        }
        for (src, dst, edge) in pass_edges {
            pass_graph.add_edge(NodeIndex::new(src), NodeIndex::new(dst), edge);
        }

        let mut resource_graph = Graph::with_capacity(collection.resource_count(), resource_edges.len());
        for resource in 0..collection.resource_count() {
            resource_graph.add_node(resource);
        }
        for (parent, child, kind) in resource_edges {
            resource_graph.add_edge(NodeIndex::new(parent), NodeIndex::new(child), kind);
        }

        let (topo_order, topo_id) = Self::topological_sort(&pass_graph, &visited, collection)?;
        let root = Self::resolve_forest(&resource_graph, &touched, collection)?;

        let mut phys_id = vec![None; collection.resource_count()];
        let mut phys_roots = Vec::new();
        for resource in 0..collection.resource_count() {
            if root[resource] == Some(resource) {
                phys_id[resource] = Some(phys_roots.len());
                phys_roots.push(resource);
            }
        }

        let input_resource: Vec<Option<ResourceId>> = input_state
            .iter()
            .map(|state| match state {
                InputState::Resolved(resource) => Some(*resource),
                _ => None,
            })
            .collect();

        let mut dependency = Dependency {
            pass_keys: (0..collection.pass_count())
                .map(|pass| collection.pass_key(pass).clone())
                .collect(),
            resource_keys: (0..collection.resource_count())
                .map(|resource| collection.resource_key(resource).clone())
                .collect(),
            pass_graph,
            resource_graph,
            visited,
            topo_order,
            topo_id,
            values,
            value_index,
            input_value,
            input_resource,
            touched,
            root,
            phys_id,
            phys_roots,
            lf_pointed,
            combined_children,
            results,
            pass_after: BitMatrix::default(),
            pass_before: BitMatrix::default(),
            access_passes: BitMatrix::default(),
            resource_before: BitMatrix::default(),
        };
        dependency.compute_relations(desc, collection)?;

        debug!(
            "Dependency: {} of {} passes visited, {} physical resources",
            dependency.topo_order.len(),
            collection.pass_count(),
            dependency.phys_roots.len()
        );
        Ok(dependency)
    }

    /// Kahn's algorithm over the local edges. Ties are broken by declaration order, so the result does not
    /// depend on the order in which the walk discovered passes.
    fn topological_sort(
        graph: &Graph<PassId, PassEdge>,
        visited: &[bool],
        collection: &Collection,
    ) -> Result<(Vec<PassId>, Vec<Option<usize>>)> {
        let mut in_degree = vec![0usize; visited.len()];
        for edge in graph.edge_references() {
            if edge.weight().kind != PassEdgeKind::LastFrame {
                in_degree[edge.target().index()] += 1;
            }
        }

        let mut ready: BinaryHeap<Reverse<PassId>> = (0..visited.len())
            .filter(|pass| visited[*pass] && in_degree[*pass] == 0)
            .map(Reverse)
            .collect();
        let mut order = Vec::new();
        let mut topo_id = vec![None; visited.len()];
        while let Some(Reverse(pass)) = ready.pop() {
            topo_id[pass] = Some(order.len());
            order.push(pass);
            for edge in graph.edges_directed(NodeIndex::new(pass), Direction::Outgoing) {
                if edge.weight().kind == PassEdgeKind::LastFrame {
                    continue;
                }
                let target = edge.target().index();
                in_degree[target] -= 1;
                if in_degree[target] == 0 {
                    ready.push(Reverse(target));
                }
            }
        }

        let visited_count = visited.iter().filter(|visited| **visited).count();
        if order.len() != visited_count {
            let Some(pass) = (0..visited.len()).find(|pass| visited[*pass] && topo_id[*pass].is_none()) else {
                return Err(Error::Uncategorized("Topological sort lost a pass").into());
            };
            return Err(Error::PassNotDAG(collection.pass_key(pass).clone()).into());
        }
        Ok((order, topo_id))
    }

    /// Every touched resource climbs its parent chain to its root. Any resource with two parents, or a chain that
    /// never ends, means the resource graph is not a forest.
    fn resolve_forest(
        graph: &Graph<ResourceId, ResourceEdgeKind>,
        touched: &[bool],
        collection: &Collection,
    ) -> Result<Vec<Option<ResourceId>>> {
        let mut root = vec![None; touched.len()];
        for resource in (0..touched.len()).filter(|resource| touched[*resource]) {
            let mut current = resource;
            let mut steps = 0;
            loop {
                let mut parents = graph.edges_directed(NodeIndex::new(current), Direction::Incoming);
                let Some(parent) = parents.next() else {
                    break;
                };
                if parents.next().is_some() || steps > touched.len() {
                    return Err(Error::ResourceNotTree(collection.resource_key(current).clone()).into());
                }
                current = parent.source().index();
                steps += 1;
            }
            root[resource] = Some(current);
        }
        Ok(root)
    }

    fn compute_relations(&mut self, desc: &GraphDesc, collection: &Collection) -> Result<()> {
        let passes = self.topo_order.len();
        let phys = self.phys_roots.len();

        self.access_passes = BitMatrix::new(phys, passes);
        for &pass in &self.topo_order {
            let Some(topo) = self.topo_id[pass] else {
                continue;
            };
            for &input in collection.pass_inputs(pass) {
                let Some(resource) = self.input_resource[input] else {
                    continue;
                };
                // Last frame reads touch the other copy of the memory.
                if collection.resource_ref(desc, resource)?.class() == ResourceClass::LastFrame {
                    continue;
                }
                if let Some(phys) = self.phys_id_of(resource) {
                    self.access_passes.set(phys, topo);
                }
            }
        }

        self.pass_after = BitMatrix::new(passes, passes);
        for topo in (0..passes).rev() {
            let pass = self.topo_order[topo];
            for edge in self.pass_graph.edges_directed(NodeIndex::new(pass), Direction::Outgoing) {
                if edge.weight().kind == PassEdgeKind::LastFrame {
                    continue;
                }
                let Some(target) = self.topo_id[edge.target().index()] else {
                    continue;
                };
                self.pass_after.set(topo, target);
                self.pass_after.apply(topo, target);
            }
        }
        self.pass_before = self.pass_after.transpose();

        self.resource_before = BitMatrix::new(phys, phys);
        for x in 0..phys {
            if self.access_passes.row_is_empty(x) {
                continue;
            }
            let mut after_all = vec![!0u64; self.access_passes.row(x).len()];
            for topo in self.access_passes.iter_row(x) {
                words::and_assign(&mut after_all, self.pass_after.row(topo));
            }
            for y in 0..phys {
                if x == y || self.access_passes.row_is_empty(y) {
                    continue;
                }
                if words::is_subset(self.access_passes.row(y), &after_all) {
                    self.resource_before.set(x, y);
                }
            }
        }
        Ok(())
    }

    /// Whether a pass contributes to a result.
    pub fn is_visited(&self, pass: PassId) -> bool {
        self.visited[pass]
    }

    /// Visited passes in execution order.
    pub fn topo_order(&self) -> &[PassId] {
        &self.topo_order
    }

    pub fn topo_id(&self, pass: PassId) -> Option<usize> {
        self.topo_id[pass]
    }

    /// All edges of the pass graph as `(source pass, destination pass, edge)`.
    pub fn pass_edges(&self) -> impl Iterator<Item = (PassId, PassId, &PassEdge)> {
        self.pass_graph
            .edge_references()
            .map(|edge| (edge.source().index(), edge.target().index(), edge.weight()))
    }

    /// Edges ending in `pass`.
    pub fn incoming_edges(&self, pass: PassId) -> impl Iterator<Item = (PassId, &PassEdge)> {
        self.pass_graph
            .edges_directed(NodeIndex::new(pass), Direction::Incoming)
            .map(|edge| (edge.source().index(), edge.weight()))
    }

    /// Parent of a resource in the resource forest.
    pub fn resource_parent(&self, resource: ResourceId) -> Option<(ResourceId, ResourceEdgeKind)> {
        self.resource_graph
            .edges_directed(NodeIndex::new(resource), Direction::Incoming)
            .next()
            .map(|edge| (edge.source().index(), *edge.weight()))
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn value(&self, value: ValueId) -> &Value {
        &self.values[value]
    }

    pub fn value_id(&self, key: &ValueKey) -> Option<ValueId> {
        self.value_index.get(key).copied()
    }

    /// The value an input consumes. `None` for inputs of culled passes.
    pub fn input_value(&self, input: InputId) -> Option<ValueId> {
        self.input_value[input]
    }

    /// The resource an input accesses.
    pub fn input_resource(&self, input: InputId) -> Option<ResourceId> {
        self.input_resource[input]
    }

    pub fn is_touched(&self, resource: ResourceId) -> bool {
        self.touched[resource]
    }

    pub fn root(&self, resource: ResourceId) -> Option<ResourceId> {
        self.root[resource]
    }

    /// Physical id of the root of a resource.
    pub fn phys_id_of(&self, resource: ResourceId) -> Option<PhysId> {
        self.root[resource].and_then(|root| self.phys_id[root])
    }

    pub fn phys_roots(&self) -> &[ResourceId] {
        &self.phys_roots
    }

    pub fn phys_count(&self) -> usize {
        self.phys_roots.len()
    }

    /// The value a last frame resource points to.
    pub fn lf_pointed(&self, resource: ResourceId) -> Option<ValueId> {
        self.lf_pointed[resource]
    }

    /// Whether any last frame resource reads the previous contents of this physical resource.
    pub fn is_double_buffered(&self, phys: PhysId) -> bool {
        self.lf_pointed
            .iter()
            .enumerate()
            .any(|(resource, pointed)| pointed.is_some() && self.phys_id_of(resource) == Some(phys))
    }

    /// The last frame resources reading this physical resource.
    pub fn lf_resources(&self, phys: PhysId) -> impl Iterator<Item = ResourceId> + '_ {
        self.lf_pointed
            .iter()
            .enumerate()
            .filter(move |(resource, pointed)| pointed.is_some() && self.phys_id_of(*resource) == Some(phys))
            .map(|(resource, _)| resource)
    }

    /// Children of a combined image, as the values they were declared with.
    pub fn combined_children(&self, resource: ResourceId) -> &[ValueKey] {
        self.combined_children
            .get(&resource)
            .map(|children| children.as_slice())
            .unwrap_or(&[])
    }

    pub fn results(&self) -> &[ValueId] {
        &self.results
    }

    pub fn is_result(&self, value: ValueId) -> bool {
        self.results.contains(&value)
    }

    /// Whether one of the results of the graph lives in a physical resource. Its contents must survive the frame.
    pub fn holds_result(&self, phys: PhysId) -> bool {
        self.results
            .iter()
            .any(|value| self.phys_id_of(self.values[*value].key.resource) == Some(phys))
    }

    /// The inputs that access a resource last in a frame. Follows the chain of values of the resource from the start
    /// of the frame until a value is no longer overwritten.
    pub fn final_accessors(&self, resource: ResourceId) -> Vec<InputId> {
        let raw = ValueKey {
            resource,
            producer: None,
        };
        let Some(mut current) = self.value_id(&raw) else {
            return Vec::new();
        };
        for _ in 0..=self.values.len() {
            let value = &self.values[current];
            if let Some(writer) = value.writer {
                if self.input_resource[writer] != Some(resource) {
                    return vec![writer];
                }
                let next = ValueKey {
                    resource,
                    producer: Some(writer),
                };
                match self.value_id(&next) {
                    Some(next) => {
                        current = next;
                        continue;
                    }
                    None => return vec![writer],
                }
            }
            if !value.readers.is_empty() {
                return value.readers.clone();
            }
            return value.key.producer.into_iter().collect();
        }
        Vec::new()
    }

    /// `a` strictly precedes `b` in every valid execution order.
    pub fn pass_precedes(&self, a: PassId, b: PassId) -> bool {
        match (self.topo_id[a], self.topo_id[b]) {
            (Some(a), Some(b)) => self.pass_after.get(a, b),
            _ => false,
        }
    }

    /// Strict successor relation over topo ids.
    pub fn pass_after(&self) -> &BitMatrix {
        &self.pass_after
    }

    /// Strict predecessor relation over topo ids.
    pub fn pass_before(&self) -> &BitMatrix {
        &self.pass_before
    }

    pub fn access_passes(&self) -> &BitMatrix {
        &self.access_passes
    }

    /// Every access of `y` strictly follows every access of `x`.
    pub fn resource_precedes(&self, x: PhysId, y: PhysId) -> bool {
        self.resource_before.get(x, y)
    }

    /// Whether two physical resources are never alive at the same time.
    pub fn may_alias(&self, x: PhysId, y: PhysId) -> bool {
        self.resource_precedes(x, y) || self.resource_precedes(y, x)
    }
}

/// Edge weight of the dot dump of a pass graph.
struct DotEdge {
    kind: PassEdgeKind,
    resource: String,
}

impl Display for DotEdge {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.resource)
    }
}

fn get_edge_attributes(_: &Graph<String, DotEdge>, edge: EdgeReference<DotEdge>) -> String {
    match edge.weight().kind {
        PassEdgeKind::Local => String::from(""),
        PassEdgeKind::WriteAfterRead => String::from("color = \"#f75e70\""),
        PassEdgeKind::LastFrame => String::from("style = \"dashed\""),
    }
}

fn get_node_attributes(_: &Graph<String, DotEdge>, _: (NodeIndex, &String)) -> String {
    String::from("fillcolor = \"#5e6df7\"")
}

/// Can be used to display a graph in the `dot` format, for debugging and visualization.
pub trait GraphViz {
    /// Get the string representation of this graph in `dot` format.
    fn dot(&self) -> Result<String>;
}

impl GraphViz for Dependency {
    /// The pass graph, restricted to the passes that were not culled.
    fn dot(&self) -> Result<String> {
        let graph = self.pass_graph.filter_map(
            |_, pass| self.visited[*pass].then(|| self.pass_keys[*pass].to_string()),
            |_, edge| {
                Some(DotEdge {
                    kind: edge.kind,
                    resource: self.resource_keys[edge.resource].to_string(),
                })
            },
        );
        Ok(format!(
            "{}",
            Dot::with_attr_getters(&graph, &[], &get_edge_attributes, &get_node_attributes)
        ))
    }
}
