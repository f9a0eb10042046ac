use std::rc::Rc;

use glam::Vec3;

use super::{
    lod::MetavoxelLOD,
    node::{next_minimum, MetavoxelNode, NodePointer, CHILD_COUNT},
};
use crate::{
    attribute::{AttributeData, AttributePointer},
    util::BoundingBox,
};

/// What the guide does after a node has been visited
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOrder {
    /// Don't descend into this node's children
    StopRecursion,
    /// Visit the eight children in index order
    DefaultOrder,
    /// Abandon the whole tour
    ShortCircuit,
}

/// The node currently being visited
pub struct MetavoxelInfo {
    pub minimum: Vec3,
    pub size: f32,
    /// Values of the visitor's inputs at this node, inherited from the
    /// nearest ancestor where the tree is coarser than this node
    pub input_values: Vec<AttributeData>,
    /// Values to assign to the visitor's outputs over this whole node
    pub output_values: Vec<Option<AttributeData>>,
    /// Whether the LOD stops subdivision here
    pub is_lod_leaf: bool,
    /// Whether there is nothing finer to visit beneath this node
    pub is_leaf: bool,
}

impl MetavoxelInfo {
    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_cube(self.minimum, self.size)
    }

    pub fn center(&self) -> Vec3 {
        self.minimum + Vec3::splat(self.size * 0.5)
    }
}

/// Walks the octree through `MetavoxelData::guide`, reading the input
/// attributes and optionally writing the outputs
pub trait MetavoxelVisitor {
    fn inputs(&self) -> &[AttributePointer];

    fn outputs(&self) -> &[AttributePointer] {
        &[]
    }

    fn lod(&self) -> MetavoxelLOD {
        MetavoxelLOD::default()
    }

    fn visit(&mut self, info: &mut MetavoxelInfo) -> VisitOrder;
}

pub(crate) struct Visitation<'a> {
    pub(crate) visitor: &'a mut dyn MetavoxelVisitor,
    pub(crate) inputs: Vec<AttributePointer>,
    pub(crate) outputs: Vec<AttributePointer>,
    pub(crate) lod: MetavoxelLOD,
    minimum_multiplier: f32,
}

impl<'a> Visitation<'a> {
    pub(crate) fn new(visitor: &'a mut dyn MetavoxelVisitor) -> Self {
        let inputs = visitor.inputs().to_vec();
        let outputs = visitor.outputs().to_vec();
        let lod = visitor.lod();
        let minimum_multiplier = inputs
            .iter()
            .chain(outputs.iter())
            .map(|attribute| attribute.lod_threshold_multiplier())
            .fold(f32::MAX, f32::min);
        Self {
            visitor,
            inputs,
            outputs,
            lod,
            minimum_multiplier,
        }
    }

    /// Visits the node at `minimum`, then its children as the visitor asks.
    /// Output nodes that change are replaced in `output_nodes`. Returns false
    /// if the tour was short circuited.
    pub(crate) fn guide(
        &mut self,
        minimum: Vec3,
        size: f32,
        input_nodes: &[Option<NodePointer>],
        input_values: Vec<AttributeData>,
        output_nodes: &mut [Option<NodePointer>],
    ) -> bool {
        let center = minimum + Vec3::splat(size * 0.5);
        let lod_base = self.lod.position.distance(center) * self.lod.threshold;
        let is_lod_leaf = size < lod_base * self.minimum_multiplier;
        let all_leaves = input_nodes
            .iter()
            .all(|node| node.as_ref().map_or(true, |node| node.is_leaf()));

        let mut info = MetavoxelInfo {
            minimum,
            size,
            input_values,
            output_values: vec![None; self.outputs.len()],
            is_lod_leaf,
            is_leaf: is_lod_leaf || all_leaves,
        };
        let order = self.visitor.visit(&mut info);
        if order == VisitOrder::ShortCircuit {
            return false;
        }

        for (index, value) in info.output_values.into_iter().enumerate() {
            let Some(value) = value else {
                continue;
            };
            let attribute = &self.outputs[index];
            let node = &mut output_nodes[index];
            let unchanged = node.as_ref().map_or(false, |node| {
                node.is_leaf() && attribute.equal(&value, node.value())
            });
            if !unchanged {
                *node = Some(Rc::new(MetavoxelNode::new_leaf(value)));
            }
        }
        if order == VisitOrder::StopRecursion {
            return true;
        }

        let next_size = size * 0.5;
        let mut changed = vec![false; self.outputs.len()];
        for index in 0..CHILD_COUNT {
            let mut child_input_nodes = Vec::with_capacity(self.inputs.len());
            let mut child_input_values = Vec::with_capacity(self.inputs.len());
            for (input, (attribute, node)) in self.inputs.iter().zip(input_nodes).enumerate() {
                let expand = size >= lod_base * attribute.lod_threshold_multiplier();
                let child = node
                    .as_ref()
                    .filter(|_| expand)
                    .and_then(|node| node.child(index))
                    .cloned();
                child_input_values.push(match &child {
                    Some(child) => child.value().clone(),
                    None => attribute.inherit(&info.input_values[input]),
                });
                child_input_nodes.push(child);
            }
            let previous: Vec<Option<NodePointer>> = output_nodes
                .iter()
                .map(|node| node.as_ref().and_then(|node| node.child(index)).cloned())
                .collect();
            let mut child_output_nodes = previous.clone();

            if !self.guide(
                next_minimum(minimum, next_size, index),
                next_size,
                &child_input_nodes,
                child_input_values,
                &mut child_output_nodes,
            ) {
                return false;
            }

            for (output, (child, previous)) in
                child_output_nodes.into_iter().zip(previous).enumerate()
            {
                let Some(child) = child else {
                    continue;
                };
                if previous.as_ref().map_or(false, |previous| Rc::ptr_eq(previous, &child)) {
                    continue;
                }
                let attribute = &self.outputs[output];
                let node = output_nodes[output].get_or_insert_with(|| {
                    Rc::new(MetavoxelNode::new_leaf(attribute.default_value()))
                });
                Rc::make_mut(node).set_child(attribute, index, child);
                changed[output] = true;
            }
        }
        for (output, changed) in changed.into_iter().enumerate() {
            if !changed {
                continue;
            }
            if let Some(node) = output_nodes[output].as_mut() {
                Rc::make_mut(node).merge_children(&self.outputs[output], false);
            }
        }
        true
    }
}
