use std::rc::Rc;

use glam::Vec3;

use metavoxel_serde::{BitReader, BitWrite, Serde, SerdeErr};

use super::lod::MetavoxelLOD;
use crate::{
    attribute::{AttributeData, AttributePointer, MERGE_COUNT},
    bitstream::{Bitstream, BitstreamError},
};

pub const CHILD_COUNT: usize = MERGE_COUNT;

pub const X_MAXIMUM_FLAG: usize = 1;
pub const Y_MAXIMUM_FLAG: usize = 2;
pub const Z_MAXIMUM_FLAG: usize = 4;
const MAXIMUM_FLAG_MASK: usize = X_MAXIMUM_FLAG | Y_MAXIMUM_FLAG | Z_MAXIMUM_FLAG;

pub type NodePointer = Rc<MetavoxelNode>;

/// The child diagonally opposite `index`
pub fn opposite_child_index(index: usize) -> usize {
    index ^ MAXIMUM_FLAG_MASK
}

/// Minimum corner of child `index` of a cube at `minimum`, given the child edge length
pub fn next_minimum(minimum: Vec3, next_size: f32, index: usize) -> Vec3 {
    minimum
        + Vec3::new(
            if index & X_MAXIMUM_FLAG != 0 { next_size } else { 0.0 },
            if index & Y_MAXIMUM_FLAG != 0 { next_size } else { 0.0 },
            if index & Z_MAXIMUM_FLAG != 0 { next_size } else { 0.0 },
        )
}

/// Index of the child of the cube at `minimum` (child edge `next_size`) containing `point`
pub fn child_index_containing(minimum: Vec3, next_size: f32, point: Vec3) -> usize {
    let mut index = 0;
    if point.x >= minimum.x + next_size {
        index |= X_MAXIMUM_FLAG;
    }
    if point.y >= minimum.y + next_size {
        index |= Y_MAXIMUM_FLAG;
    }
    if point.z >= minimum.z + next_size {
        index |= Z_MAXIMUM_FLAG;
    }
    index
}

/// A node of an attribute octree. Nodes are shared between snapshots and
/// never modified once shared: changing one means cloning it (cheap, the
/// children are reference counted) and replacing the pointer in its parent.
#[derive(Debug, Clone)]
pub struct MetavoxelNode {
    value: AttributeData,
    children: Option<Box<[NodePointer; CHILD_COUNT]>>,
}

impl MetavoxelNode {
    pub fn new_leaf(value: AttributeData) -> Self {
        Self {
            value,
            children: None,
        }
    }

    pub fn with_children(value: AttributeData, children: [NodePointer; CHILD_COUNT]) -> Self {
        Self {
            value,
            children: Some(Box::new(children)),
        }
    }

    pub fn value(&self) -> &AttributeData {
        &self.value
    }

    pub fn set_value(&mut self, value: AttributeData) {
        self.value = value;
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_none()
    }

    pub fn children(&self) -> Option<&[NodePointer; CHILD_COUNT]> {
        self.children.as_deref()
    }

    pub fn child(&self, index: usize) -> Option<&NodePointer> {
        self.children.as_ref().map(|children| &children[index])
    }

    /// Replaces child `index`. A leaf is first split into children that
    /// inherit its value.
    pub fn set_child(&mut self, attribute: &AttributePointer, index: usize, child: NodePointer) {
        self.subdivide(attribute);
        if let Some(children) = self.children.as_mut() {
            children[index] = child;
        }
    }

    /// Splits a leaf into eight leaves inheriting its value
    pub fn subdivide(&mut self, attribute: &AttributePointer) {
        if self.children.is_some() {
            return;
        }
        let inherited = attribute.inherit(&self.value);
        let children: [NodePointer; CHILD_COUNT] =
            std::array::from_fn(|_| Rc::new(MetavoxelNode::new_leaf(inherited.clone())));
        self.children = Some(Box::new(children));
    }

    pub fn clear_children(&mut self) -> bool {
        self.children.take().is_some()
    }

    /// Recomputes this node's value from its children. Equal leaf children
    /// are dropped unless the merge follows a read, where the structure must
    /// stay as the sender wrote it.
    pub fn merge_children(&mut self, attribute: &AttributePointer, post_read: bool) {
        let Some(children) = self.children.as_ref() else {
            return;
        };
        let values: [AttributeData; CHILD_COUNT] =
            std::array::from_fn(|index| children[index].value.clone());
        let all_leaves = children.iter().all(|child| child.is_leaf());
        if attribute.merge(&mut self.value, &values, post_read) && all_leaves && !post_read {
            self.children = None;
        }
    }

    /// Number of nodes in this subtree, this one included
    pub fn count_nodes(&self) -> usize {
        1 + self
            .children
            .as_ref()
            .map_or(0, |children| children.iter().map(|child| child.count_nodes()).sum())
    }

    /// Compares by content down to the depth `state` subdivides
    pub(crate) fn deep_equals(
        &self,
        attribute: &AttributePointer,
        other: &MetavoxelNode,
        state: &StreamState,
    ) -> bool {
        if !attribute.deep_equal(&self.value, &other.value) {
            return false;
        }
        if !state.should_subdivide() {
            return true;
        }
        match (&self.children, &other.children) {
            (None, None) => true,
            (Some(children), Some(other_children)) => children
                .iter()
                .zip(other_children.iter())
                .enumerate()
                .all(|(index, (child, other_child))| {
                    Rc::ptr_eq(child, other_child)
                        || child.deep_equals(attribute, other_child, &state.child(index))
                }),
            _ => false,
        }
    }

    // Serialization. Nodes the LOD doesn't subdivide are written as leaves
    // holding their own value, without a leaf bit.

    pub(crate) fn write(
        &self,
        attribute: &AttributePointer,
        state: &StreamState,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
    ) -> Result<(), BitstreamError> {
        if !state.should_subdivide() {
            return attribute.write(bitstream, writer, &self.value, true);
        }
        let leaf = self.is_leaf();
        leaf.ser(writer);
        attribute.write(bitstream, writer, &self.value, leaf)?;
        if let Some(children) = &self.children {
            for (index, child) in children.iter().enumerate() {
                child.write(attribute, &state.child(index), bitstream, writer)?;
            }
        }
        Ok(())
    }

    pub(crate) fn read(
        attribute: &AttributePointer,
        state: &StreamState,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
    ) -> Result<Self, BitstreamError> {
        if !state.should_subdivide() {
            return Ok(Self::new_leaf(attribute.read(bitstream, reader, true)?));
        }
        let leaf = bool::de(reader)?;
        let value = attribute.read(bitstream, reader, leaf)?;
        if leaf {
            return Ok(Self::new_leaf(value));
        }
        let children = read_children(|index| {
            Ok(Rc::new(Self::read(attribute, &state.child(index), bitstream, reader)?))
        })?;
        let mut node = Self {
            value,
            children: Some(children),
        };
        node.merge_children(attribute, true);
        Ok(node)
    }

    /// Writes this node as a delta against `reference`. Children shared with
    /// the reference cost a single bit, plus whatever the receiver is missing
    /// of them if the LOD now reaches deeper.
    pub(crate) fn write_delta(
        &self,
        attribute: &AttributePointer,
        reference: &MetavoxelNode,
        state: &StreamState,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
    ) -> Result<(), BitstreamError> {
        if !state.should_subdivide() {
            return attribute.write_delta(bitstream, writer, &self.value, &reference.value, true);
        }
        let leaf = self.is_leaf();
        leaf.ser(writer);
        attribute.write_delta(bitstream, writer, &self.value, &reference.value, leaf)?;
        let Some(children) = &self.children else {
            return Ok(());
        };
        let reference_children = reference
            .children
            .as_ref()
            .filter(|_| state.should_subdivide_reference());
        match reference_children {
            None => {
                for (index, child) in children.iter().enumerate() {
                    child.write(attribute, &state.child(index), bitstream, writer)?;
                }
            }
            Some(reference_children) => {
                for (index, (child, reference_child)) in
                    children.iter().zip(reference_children.iter()).enumerate()
                {
                    let child_state = state.child(index);
                    if Rc::ptr_eq(child, reference_child) {
                        false.ser(writer);
                        if child_state.became_subdivided() {
                            child.write_subdivision(attribute, &child_state, bitstream, writer)?;
                        }
                    } else {
                        true.ser(writer);
                        child.write_delta(attribute, reference_child, &child_state, bitstream, writer)?;
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn read_delta(
        attribute: &AttributePointer,
        reference: &NodePointer,
        state: &StreamState,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
    ) -> Result<Self, BitstreamError> {
        if !state.should_subdivide() {
            let value = attribute.read_delta(bitstream, reader, &reference.value, true)?;
            return Ok(Self::new_leaf(value));
        }
        let leaf = bool::de(reader)?;
        let value = attribute.read_delta(bitstream, reader, &reference.value, leaf)?;
        if leaf {
            return Ok(Self::new_leaf(value));
        }
        let reference_children = reference
            .children
            .as_ref()
            .filter(|_| state.should_subdivide_reference());
        let children = match reference_children {
            None => read_children(|index| {
                Ok(Rc::new(Self::read(attribute, &state.child(index), bitstream, reader)?))
            })?,
            Some(reference_children) => read_children(|index| {
                let reference_child = &reference_children[index];
                let child_state = state.child(index);
                if bool::de(reader)? {
                    Ok(Rc::new(Self::read_delta(
                        attribute,
                        reference_child,
                        &child_state,
                        bitstream,
                        reader,
                    )?))
                } else if child_state.became_subdivided_or_collapsed() {
                    Self::read_subdivision(attribute, reference_child, &child_state, bitstream, reader)
                } else {
                    Ok(reference_child.clone())
                }
            })?,
        };
        let mut node = Self {
            value,
            children: Some(children),
        };
        node.merge_children(attribute, true);
        Ok(node)
    }

    /// Writes the parts of this unchanged node that the reference LOD left
    /// out and the current LOD includes
    pub(crate) fn write_subdivision(
        &self,
        attribute: &AttributePointer,
        state: &StreamState,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
    ) -> Result<(), BitstreamError> {
        let Some(children) = &self.children else {
            if !state.should_subdivide_reference() {
                true.ser(writer);
            }
            return Ok(());
        };
        if !state.should_subdivide_reference() {
            // the receiver holds this node as a leaf
            false.ser(writer);
            for (index, child) in children.iter().enumerate() {
                child.write(attribute, &state.child(index), bitstream, writer)?;
            }
            return Ok(());
        }
        for (index, child) in children.iter().enumerate() {
            let child_state = state.child(index);
            if child_state.became_subdivided() {
                child.write_subdivision(attribute, &child_state, bitstream, writer)?;
            }
        }
        Ok(())
    }

    /// Brings an unchanged node from the reference LOD to the current one:
    /// reads the subtrees that became subdivided and collapses the ones that
    /// no longer are
    pub(crate) fn read_subdivision(
        attribute: &AttributePointer,
        node: &NodePointer,
        state: &StreamState,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
    ) -> Result<NodePointer, BitstreamError> {
        if !state.should_subdivide() {
            if node.is_leaf() {
                return Ok(node.clone());
            }
            return Ok(Rc::new(Self::new_leaf(node.value.clone())));
        }
        if !state.should_subdivide_reference() {
            if bool::de(reader)? {
                if node.is_leaf() {
                    return Ok(node.clone());
                }
                return Ok(Rc::new(Self::new_leaf(node.value.clone())));
            }
            let children = read_children(|index| {
                Ok(Rc::new(Self::read(attribute, &state.child(index), bitstream, reader)?))
            })?;
            return Ok(Rc::new(Self {
                value: node.value.clone(),
                children: Some(children),
            }));
        }
        let Some(children) = &node.children else {
            return Ok(node.clone());
        };
        let mut new_children: Option<[NodePointer; CHILD_COUNT]> = None;
        for (index, child) in children.iter().enumerate() {
            let child_state = state.child(index);
            if !child_state.became_subdivided_or_collapsed() {
                continue;
            }
            let new_child = Self::read_subdivision(attribute, child, &child_state, bitstream, reader)?;
            if !Rc::ptr_eq(&new_child, child) {
                new_children.get_or_insert_with(|| (**children).clone())[index] = new_child;
            }
        }
        Ok(match new_children {
            Some(children) => Rc::new(Self::with_children(node.value.clone(), children)),
            None => node.clone(),
        })
    }

    /// This subtree as a receiver holding it under `state`'s LOD has it
    pub(crate) fn pruned(node: &NodePointer, state: &StreamState) -> NodePointer {
        let Some(children) = &node.children else {
            return node.clone();
        };
        if !state.should_subdivide() {
            return Rc::new(Self::new_leaf(node.value.clone()));
        }
        let mut new_children: Option<[NodePointer; CHILD_COUNT]> = None;
        for (index, child) in children.iter().enumerate() {
            let new_child = Self::pruned(child, &state.child(index));
            if !Rc::ptr_eq(&new_child, child) {
                new_children.get_or_insert_with(|| (**children).clone())[index] = new_child;
            }
        }
        match new_children {
            Some(children) => Rc::new(Self::with_children(node.value.clone(), children)),
            None => node.clone(),
        }
    }
}

/// Where a node sits and the LODs its stream is encoded under
#[derive(Debug, Clone, Copy)]
pub(crate) struct StreamState {
    pub minimum: Vec3,
    pub size: f32,
    pub lod: MetavoxelLOD,
    pub reference_lod: MetavoxelLOD,
    pub multiplier: f32,
}

impl StreamState {
    pub fn new(
        minimum: Vec3,
        size: f32,
        attribute: &AttributePointer,
        lod: &MetavoxelLOD,
        reference_lod: &MetavoxelLOD,
    ) -> Self {
        Self {
            minimum,
            size,
            lod: *lod,
            reference_lod: *reference_lod,
            multiplier: attribute.lod_threshold_multiplier(),
        }
    }

    pub fn should_subdivide(&self) -> bool {
        self.lod
            .should_subdivide(self.minimum, self.size, self.multiplier)
    }

    pub fn should_subdivide_reference(&self) -> bool {
        self.reference_lod
            .should_subdivide(self.minimum, self.size, self.multiplier)
    }

    pub fn became_subdivided(&self) -> bool {
        self.lod
            .became_subdivided(self.minimum, self.size, &self.reference_lod, self.multiplier)
    }

    pub fn became_subdivided_or_collapsed(&self) -> bool {
        self.lod.became_subdivided_or_collapsed(
            self.minimum,
            self.size,
            &self.reference_lod,
            self.multiplier,
        )
    }

    pub fn child(&self, index: usize) -> Self {
        let size = self.size * 0.5;
        Self {
            minimum: next_minimum(self.minimum, size, index),
            size,
            ..*self
        }
    }
}

fn read_children(
    mut read_child: impl FnMut(usize) -> Result<NodePointer, BitstreamError>,
) -> Result<Box<[NodePointer; CHILD_COUNT]>, BitstreamError> {
    let mut children = Vec::with_capacity(CHILD_COUNT);
    for index in 0..CHILD_COUNT {
        children.push(read_child(index)?);
    }
    let children: [NodePointer; CHILD_COUNT] = children
        .try_into()
        .map_err(|_| BitstreamError::Serde(SerdeErr))?;
    Ok(Box::new(children))
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use glam::Vec3;

    use super::*;
    use crate::attribute::{FloatAttribute, SharedObjectSetAttribute};

    fn mask() -> AttributePointer {
        Rc::new(FloatAttribute::new("mask"))
    }

    fn leaves(values: [f32; CHILD_COUNT]) -> [NodePointer; CHILD_COUNT] {
        values.map(|value| Rc::new(MetavoxelNode::new_leaf(AttributeData::Float(value))))
    }

    #[test]
    fn child_geometry() {
        assert_eq!(opposite_child_index(0), 7);
        assert_eq!(opposite_child_index(X_MAXIMUM_FLAG), 6);
        assert_eq!(
            next_minimum(Vec3::ZERO, 0.5, X_MAXIMUM_FLAG | Z_MAXIMUM_FLAG),
            Vec3::new(0.5, 0.0, 0.5)
        );
        assert_eq!(
            child_index_containing(Vec3::ZERO, 0.5, Vec3::new(0.75, 0.25, 0.5)),
            X_MAXIMUM_FLAG | Z_MAXIMUM_FLAG
        );
    }

    #[test]
    fn merging_equal_leaves_collapses() {
        let attribute = mask();
        let mut node = MetavoxelNode::with_children(AttributeData::Float(0.0), leaves([0.5; 8]));
        node.merge_children(&attribute, false);
        assert!(node.is_leaf());
        assert_eq!(node.value(), &AttributeData::Float(0.5));

        // merging a leaf again changes nothing
        node.merge_children(&attribute, false);
        assert!(node.is_leaf());
        assert_eq!(node.value(), &AttributeData::Float(0.5));
    }

    #[test]
    fn merging_after_read_keeps_children() {
        let attribute = mask();
        let mut node = MetavoxelNode::with_children(AttributeData::Float(0.0), leaves([0.5; 8]));
        node.merge_children(&attribute, true);
        assert!(!node.is_leaf());
        assert_eq!(node.value(), &AttributeData::Float(0.5));
    }

    #[test]
    fn merging_different_leaves_averages() {
        let attribute = mask();
        let mut node = MetavoxelNode::with_children(
            AttributeData::Float(0.0),
            leaves([1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 1.0]),
        );
        node.merge_children(&attribute, false);
        assert!(!node.is_leaf());
        assert_eq!(node.value(), &AttributeData::Float(0.25));
        assert_eq!(node.count_nodes(), 9);
    }

    #[test]
    fn set_child_splits_leaf() {
        let attribute = mask();
        let mut node = MetavoxelNode::new_leaf(AttributeData::Float(0.5));
        node.set_child(
            &attribute,
            3,
            Rc::new(MetavoxelNode::new_leaf(AttributeData::Float(1.0))),
        );
        let children = node.children().unwrap();
        assert_eq!(children[3].value(), &AttributeData::Float(1.0));
        assert_eq!(children[0].value(), &AttributeData::Float(0.5));
    }

    #[test]
    fn set_children_do_not_inherit() {
        let attribute: AttributePointer = Rc::new(SharedObjectSetAttribute::new("spanners"));
        let mut node = MetavoxelNode::new_leaf(attribute.default_value());
        node.subdivide(&attribute);
        assert!(node
            .children()
            .unwrap()
            .iter()
            .all(|child| attribute.is_default(child.value())));
    }

    #[test]
    fn deep_equals_compares_structure() {
        let attribute = mask();
        let first = MetavoxelNode::with_children(
            AttributeData::Float(0.125),
            leaves([1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        );
        let full = MetavoxelLOD::default();
        let state = StreamState::new(Vec3::splat(-0.5), 1.0, &attribute, &full, &full);
        let second = first.clone();
        assert!(first.deep_equals(&attribute, &second, &state));

        let leaf = MetavoxelNode::new_leaf(AttributeData::Float(0.125));
        assert!(!first.deep_equals(&attribute, &leaf, &state));

        // a LOD that stops at this node only compares values
        let distant = MetavoxelLOD::new(Vec3::splat(100.0), 1.0);
        let state = StreamState::new(Vec3::splat(-0.5), 1.0, &attribute, &distant, &distant);
        assert!(first.deep_equals(&attribute, &leaf, &state));
    }

    #[test]
    fn pruning_keeps_values_and_sharing() {
        let attribute = mask();
        let inner = Rc::new(MetavoxelNode::with_children(
            AttributeData::Float(0.125),
            leaves([1.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0]),
        ));
        let mut children = leaves([0.0; 8]);
        children[7] = inner.clone();
        let root = Rc::new(MetavoxelNode::with_children(AttributeData::Float(0.015625), children));

        // the root contains the viewer; its children are smaller than twice their distance
        let lod = MetavoxelLOD::new(Vec3::ZERO, 2.0);
        let state = StreamState::new(Vec3::splat(-0.5), 1.0, &attribute, &lod, &lod);
        assert!(state.should_subdivide());
        assert!(!state.child(7).should_subdivide());
        let pruned = MetavoxelNode::pruned(&root, &state);
        let pruned_inner = pruned.child(7).unwrap();
        assert!(pruned_inner.is_leaf());
        assert_eq!(pruned_inner.value(), &AttributeData::Float(0.125));
        assert!(Rc::ptr_eq(pruned.child(0).unwrap(), root.child(0).unwrap()));

        // at full detail nothing changes
        let full = MetavoxelLOD::default();
        let state = StreamState::new(Vec3::splat(-0.5), 1.0, &attribute, &full, &full);
        assert!(Rc::ptr_eq(&MetavoxelNode::pruned(&root, &state), &root));
    }
}
