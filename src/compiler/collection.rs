//! Flattens the nested pools of a graph into dense lookup tables.

use std::collections::HashMap;

use anyhow::Result;

use crate::compiler::{InputId, PassId, ResourceId};
use crate::graph::input::Input;
use crate::graph::key::{GlobalKey, Key};
use crate::graph::pass::Pass;
use crate::graph::pool::Pool;
use crate::graph::render_graph::GraphDesc;
use crate::graph::resource::Resource;
use crate::Error;

/// Every leaf pass, input and resource of a graph, numbered in declaration order.
///
/// Pass groups are walked depth first, so the passes of a group are numbered where the group is declared.
/// Groups themselves do not execute and are not numbered.
#[derive(Debug, Default)]
pub struct Collection {
    passes: Vec<GlobalKey>,
    pass_index: HashMap<GlobalKey, PassId>,
    pass_inputs: Vec<Vec<InputId>>,
    inputs: Vec<(PassId, Key)>,
    input_index: HashMap<(PassId, Key), InputId>,
    resources: Vec<GlobalKey>,
    resource_index: HashMap<GlobalKey, ResourceId>,
}

impl Collection {
    pub(crate) fn create(desc: &GraphDesc) -> Result<Self> {
        let mut collection = Collection::default();
        collection.collect(&GlobalKey::root(), desc.passes(), desc.resources())?;
        debug!(
            "Collected {} passes, {} inputs and {} resources",
            collection.passes.len(),
            collection.inputs.len(),
            collection.resources.len()
        );
        Ok(collection)
    }

    fn collect(&mut self, parent: &GlobalKey, passes: &Pool<Pass>, resources: &Pool<Resource>) -> Result<()> {
        for (key, resource) in resources.slots() {
            let global = parent.child(key);
            if resource.is_none() {
                return Err(Error::NullResource(global).into());
            }
            self.resource_index.insert(global.clone(), self.resources.len());
            self.resources.push(global);
        }

        for (key, pass) in passes.slots() {
            let global = parent.child(key);
            let Some(pass) = pass else {
                return Err(Error::NullPass(global).into());
            };
            if let Some(group) = pass.group() {
                self.collect(&global, group.passes(), group.resources())?;
                continue;
            }

            let id = self.passes.len();
            let mut inputs = Vec::with_capacity(pass.inputs().len());
            for (input_key, input) in pass.inputs().slots() {
                if input.is_none() {
                    return Err(Error::NullInput(global, input_key).into());
                }
                let input_id = self.inputs.len();
                self.input_index.insert((id, input_key), input_id);
                self.inputs.push((id, input_key));
                inputs.push(input_id);
            }
            self.pass_index.insert(global.clone(), id);
            self.passes.push(global);
            self.pass_inputs.push(inputs);
        }
        Ok(())
    }

    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn resource_count(&self) -> usize {
        self.resources.len()
    }

    pub fn pass_id(&self, key: &GlobalKey) -> Option<PassId> {
        self.pass_index.get(key).copied()
    }

    pub fn input_id(&self, pass: PassId, key: Key) -> Option<InputId> {
        self.input_index.get(&(pass, key)).copied()
    }

    pub fn resource_id(&self, key: &GlobalKey) -> Option<ResourceId> {
        self.resource_index.get(key).copied()
    }

    pub fn pass_key(&self, pass: PassId) -> &GlobalKey {
        &self.passes[pass]
    }

    pub fn resource_key(&self, resource: ResourceId) -> &GlobalKey {
        &self.resources[resource]
    }

    /// Pass that declares an input, and the key of the input in its pool.
    pub fn input(&self, input: InputId) -> (PassId, Key) {
        self.inputs[input]
    }

    pub fn input_pass(&self, input: InputId) -> PassId {
        self.inputs[input].0
    }

    /// Inputs of a pass, in declaration order.
    pub fn pass_inputs(&self, pass: PassId) -> &[InputId] {
        &self.pass_inputs[pass]
    }

    pub(crate) fn pass_ref<'a>(&self, desc: &'a GraphDesc, pass: PassId) -> Result<&'a Pass> {
        let key = self.pass_key(pass);
        desc.pass(key).ok_or_else(|| Error::PassNotFound(key.clone()).into())
    }

    pub(crate) fn input_ref<'a>(&self, desc: &'a GraphDesc, input: InputId) -> Result<&'a Input> {
        let (pass, key) = self.inputs[input];
        let pass_key = self.pass_key(pass);
        desc.input(pass_key, key)
            .ok_or_else(|| Error::InputNotFound(pass_key.clone(), key).into())
    }

    pub(crate) fn resource_ref<'a>(&self, desc: &'a GraphDesc, resource: ResourceId) -> Result<&'a Resource> {
        let key = self.resource_key(resource);
        desc.resource(key).ok_or_else(|| Error::ResourceNotFound(key.clone()).into())
    }
}
