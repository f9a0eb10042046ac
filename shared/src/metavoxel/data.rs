use std::{
    collections::{BTreeMap, BTreeSet},
    rc::Rc,
};

use glam::Vec3;

use metavoxel_serde::{BitReader, BitWrite, Serde};

use super::{
    lod::MetavoxelLOD,
    node::{
        child_index_containing, next_minimum, opposite_child_index, MetavoxelNode, NodePointer,
        StreamState, CHILD_COUNT,
    },
    visitor::{MetavoxelVisitor, Visitation},
};
use crate::{
    attribute::{AttributeData, AttributePointer},
    bitstream::{Bitstream, BitstreamError, SharedObjectPointer, SharedObjectSet},
    util::BoundingBox,
};

#[derive(Debug, Clone)]
struct Root {
    attribute: AttributePointer,
    node: NodePointer,
}

/// A cube centered on the origin holding one octree per attribute.
/// Cloning is cheap: the trees are shared until modified.
#[derive(Debug, Clone)]
pub struct MetavoxelData {
    size: f32,
    roots: BTreeMap<String, Root>,
}

impl Default for MetavoxelData {
    fn default() -> Self {
        Self::new()
    }
}

impl MetavoxelData {
    pub fn new() -> Self {
        Self::with_size(1.0)
    }

    pub fn with_size(size: f32) -> Self {
        Self {
            size,
            roots: BTreeMap::new(),
        }
    }

    pub fn size(&self) -> f32 {
        self.size
    }

    pub fn minimum(&self) -> Vec3 {
        Vec3::splat(self.size * -0.5)
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_cube(self.minimum(), self.size)
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn get_root(&self, attribute: &AttributePointer) -> Option<&NodePointer> {
        self.roots.get(attribute.name()).map(|root| &root.node)
    }

    pub fn roots(&self) -> impl Iterator<Item = (&AttributePointer, &NodePointer)> {
        self.roots.values().map(|root| (&root.attribute, &root.node))
    }

    /// Replaces the tree for `attribute`. A root that is a leaf holding the
    /// default value is removed instead.
    pub fn set_root(&mut self, attribute: AttributePointer, node: NodePointer) {
        if node.is_leaf() && attribute.is_default(node.value()) {
            self.roots.remove(attribute.name());
            return;
        }
        self.insert_root(attribute, node);
    }

    /// Replaces the tree for `attribute` with a single default leaf
    pub fn create_root(&mut self, attribute: AttributePointer) -> NodePointer {
        let node = Rc::new(MetavoxelNode::new_leaf(attribute.default_value()));
        self.insert_root(attribute, node.clone());
        node
    }

    fn insert_root(&mut self, attribute: AttributePointer, node: NodePointer) {
        self.roots
            .insert(attribute.name().to_string(), Root { attribute, node });
    }

    pub fn clear(&mut self, attribute: &AttributePointer) {
        self.roots.remove(attribute.name());
    }

    pub fn count_nodes(&self) -> usize {
        self.roots.values().map(|root| root.node.count_nodes()).sum()
    }

    /// Compares the trees by content rather than by sharing
    pub fn deep_equals(&self, other: &MetavoxelData) -> bool {
        self.deep_equals_with_lod(other, &MetavoxelLOD::default())
    }

    /// Compares the trees by content, down to the depth `lod` subdivides
    pub fn deep_equals_with_lod(&self, other: &MetavoxelData, lod: &MetavoxelLOD) -> bool {
        if self.size != other.size || self.roots.len() != other.roots.len() {
            return false;
        }
        self.roots.iter().all(|(name, root)| {
            other.roots.get(name).map_or(false, |other_root| {
                let state = self.root_state(&root.attribute, lod, lod);
                Rc::ptr_eq(&root.node, &other_root.node)
                    || root.node.deep_equals(&root.attribute, &other_root.node, &state)
            })
        })
    }

    /// The value of `attribute` at the leaf containing `point`
    pub fn sample(&self, attribute: &AttributePointer, point: Vec3) -> AttributeData {
        let Some(root) = self.roots.get(attribute.name()) else {
            return attribute.default_value();
        };
        let mut node = &root.node;
        let mut minimum = self.minimum();
        let mut size = self.size;
        while let Some(children) = node.children() {
            size *= 0.5;
            let index = child_index_containing(minimum, size, point);
            minimum = next_minimum(minimum, size, index);
            node = &children[index];
        }
        node.value().clone()
    }

    /// Doubles the size, keeping the current contents at the center
    pub fn expand(&mut self) {
        for root in self.roots.values_mut() {
            root.node = Rc::new(expand_root(&root.attribute, &root.node));
        }
        self.size *= 2.0;
    }

    /// Expands until `bounds` fits inside. Returns false if it never can.
    pub fn expand_to_fit(&mut self, bounds: &BoundingBox) -> bool {
        if !(bounds.minimum.is_finite() && bounds.maximum.is_finite()) || self.size <= 0.0 {
            return false;
        }
        while !self.bounds().contains(bounds) {
            self.expand();
        }
        true
    }

    /// Copies (or with `blend`, blends) the trees of `data`, placed with its
    /// minimum corner at `minimum`, into this data
    pub fn set(&mut self, minimum: Vec3, data: &MetavoxelData, blend: bool) {
        if !self.expand_to_fit(&BoundingBox::from_cube(minimum, data.size)) {
            return;
        }
        for root in data.roots.values() {
            let node = set_node_within(
                &root.attribute,
                self.roots.get(root.attribute.name()).map(|root| &root.node),
                self.minimum(),
                self.size,
                &root.node,
                minimum,
                data.size,
                blend,
            );
            self.set_root(root.attribute.clone(), node);
        }
    }

    /// Walks the trees with `visitor`, replacing the trees of its outputs
    pub fn guide(&mut self, visitor: &mut dyn MetavoxelVisitor) {
        let mut visitation = Visitation::new(visitor);
        let input_nodes: Vec<Option<NodePointer>> = visitation
            .inputs
            .iter()
            .map(|attribute| self.get_root(attribute).cloned())
            .collect();
        let input_values = visitation
            .inputs
            .iter()
            .zip(&input_nodes)
            .map(|(attribute, node)| {
                node.as_ref()
                    .map_or_else(|| attribute.default_value(), |node| node.value().clone())
            })
            .collect();
        let previous: Vec<Option<NodePointer>> = visitation
            .outputs
            .iter()
            .map(|attribute| self.get_root(attribute).cloned())
            .collect();
        let mut output_nodes = previous.clone();

        visitation.guide(
            self.minimum(),
            self.size,
            &input_nodes,
            input_values,
            &mut output_nodes,
        );

        for ((attribute, node), previous) in visitation
            .outputs
            .iter()
            .zip(output_nodes)
            .zip(previous)
        {
            let Some(node) = node else {
                continue;
            };
            if previous.map_or(false, |previous| Rc::ptr_eq(&previous, &node)) {
                continue;
            }
            self.set_root(attribute.clone(), node);
        }
    }

    // Spanners

    /// Adds `object` to the set held by every node of `attribute` that
    /// overlaps `bounds`, descending until nodes are no larger than the
    /// bounds (or `granularity`, if coarser)
    pub fn insert(
        &mut self,
        attribute: &AttributePointer,
        bounds: &BoundingBox,
        granularity: f32,
        object: SharedObjectPointer,
    ) {
        if !self.expand_to_fit(bounds) {
            return;
        }
        self.update_spanners(attribute, bounds, granularity, |set| set.insert(object.clone()));
    }

    /// Removes `object` from the sets of the nodes overlapping `bounds`
    pub fn remove(
        &mut self,
        attribute: &AttributePointer,
        bounds: &BoundingBox,
        granularity: f32,
        object: &SharedObjectPointer,
    ) {
        self.update_spanners(attribute, bounds, granularity, |set| set.remove(object));
    }

    /// Removes `object` where present over `bounds`, inserts it elsewhere
    pub fn toggle(
        &mut self,
        attribute: &AttributePointer,
        bounds: &BoundingBox,
        granularity: f32,
        object: SharedObjectPointer,
    ) {
        if !self.expand_to_fit(bounds) {
            return;
        }
        self.update_spanners(attribute, bounds, granularity, |set| {
            if !set.remove(&object) {
                set.insert(object.clone());
            }
            true
        });
    }

    /// Swaps `old` for `new` in the sets over `bounds` that hold `old`
    pub fn replace(
        &mut self,
        attribute: &AttributePointer,
        bounds: &BoundingBox,
        granularity: f32,
        old: &SharedObjectPointer,
        new: SharedObjectPointer,
    ) {
        self.update_spanners(attribute, bounds, granularity, |set| {
            if !set.remove(old) {
                return false;
            }
            set.insert(new.clone());
            true
        });
    }

    /// Removes `object` from every set of `attribute`, wherever it is
    pub fn remove_everywhere(&mut self, attribute: &AttributePointer, object: &SharedObjectPointer) {
        let Some(root) = self.get_root(attribute).cloned() else {
            return;
        };
        if let Some(node) = remove_from_sets(attribute, &root, object) {
            self.set_root(attribute.clone(), node);
        }
    }

    fn update_spanners(
        &mut self,
        attribute: &AttributePointer,
        bounds: &BoundingBox,
        granularity: f32,
        mut update: impl FnMut(&mut SharedObjectSet) -> bool,
    ) {
        if attribute.default_value().as_shared_object_set().is_none() {
            return;
        }
        if !(bounds.minimum.is_finite() && bounds.maximum.is_finite()) || bounds.is_empty() {
            return;
        }
        // nodes are never split below the bounds' own scale
        let longest_side = bounds.longest_side().max(granularity);
        let root = match self.get_root(attribute) {
            Some(root) => root.clone(),
            None => Rc::new(MetavoxelNode::new_leaf(attribute.default_value())),
        };
        let update = &mut update;
        if let Some(node) = update_spanner_node(
            attribute,
            &root,
            self.minimum(),
            self.size,
            bounds,
            longest_side,
            update,
        ) {
            self.set_root(attribute.clone(), node);
        }
    }

    // Serialization. The plain forms encode at full detail; the `_with_lod`
    // forms leave out what the LOD doesn't subdivide.

    pub fn write(
        &self,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
    ) -> Result<(), BitstreamError> {
        self.write_with_lod(&MetavoxelLOD::default(), bitstream, writer)
    }

    pub fn read(bitstream: &mut Bitstream, reader: &mut BitReader) -> Result<Self, BitstreamError> {
        Self::read_with_lod(&MetavoxelLOD::default(), bitstream, reader)
    }

    pub fn write_delta(
        &self,
        reference: &MetavoxelData,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
    ) -> Result<(), BitstreamError> {
        let lod = MetavoxelLOD::default();
        self.write_delta_with_lod(reference, &lod, &lod, bitstream, writer)
    }

    pub fn read_delta(
        reference: &MetavoxelData,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
    ) -> Result<Self, BitstreamError> {
        let lod = MetavoxelLOD::default();
        Self::read_delta_with_lod(reference, &lod, &lod, bitstream, reader)
    }

    pub fn write_with_lod(
        &self,
        lod: &MetavoxelLOD,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
    ) -> Result<(), BitstreamError> {
        self.size.ser(writer);
        (self.roots.len() as u32).ser(writer);
        for root in self.roots.values() {
            bitstream.write_attribute(writer, &root.attribute);
            let state = self.root_state(&root.attribute, lod, lod);
            root.node.write(&root.attribute, &state, bitstream, writer)?;
        }
        Ok(())
    }

    pub fn read_with_lod(
        lod: &MetavoxelLOD,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
    ) -> Result<Self, BitstreamError> {
        let mut data = Self::with_size(f32::de(reader)?);
        let count = u32::de(reader)?;
        for _ in 0..count {
            let attribute = bitstream.read_attribute(reader)?;
            let state = data.root_state(&attribute, lod, lod);
            let node = MetavoxelNode::read(&attribute, &state, bitstream, reader)?;
            data.insert_root(attribute, Rc::new(node));
        }
        Ok(data)
    }

    /// Writes the changes from `reference`, which the receiver holds as
    /// encoded under `reference_lod`, to this data under `lod`. Trees shared
    /// with the reference are skipped; an unchanged data under an unchanged
    /// LOD costs one bit.
    pub fn write_delta_with_lod(
        &self,
        reference: &MetavoxelData,
        reference_lod: &MetavoxelLOD,
        lod: &MetavoxelLOD,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
    ) -> Result<(), BitstreamError> {
        let became_subdivided = |data: &MetavoxelData, root: &Root| {
            data.root_state(&root.attribute, lod, reference_lod)
                .became_subdivided()
        };
        if self.size == reference.size
            && self.shares_roots(reference)
            && !self.roots.values().any(|root| became_subdivided(self, root))
        {
            false.ser(writer);
            return Ok(());
        }
        true.ser(writer);

        let resized;
        let reference = if self.size == reference.size {
            false.ser(writer);
            reference
        } else {
            true.ser(writer);
            self.size.ser(writer);
            // expand the tree as the receiver has it, so both sides agree on its shape
            resized = reference.pruned(reference_lod).resized(self.size);
            &resized
        };

        let changed: Vec<&Root> = self
            .roots
            .iter()
            .filter(|(name, root)| match reference.roots.get(*name) {
                Some(reference_root) => {
                    !Rc::ptr_eq(&reference_root.node, &root.node) || became_subdivided(self, root)
                }
                None => true,
            })
            .map(|(_, root)| root)
            .collect();
        (changed.len() as u32).ser(writer);
        for root in changed {
            bitstream.write_attribute(writer, &root.attribute);
            let state = self.root_state(&root.attribute, lod, reference_lod);
            match reference.roots.get(root.attribute.name()) {
                Some(reference_root) if Rc::ptr_eq(&reference_root.node, &root.node) => {
                    false.ser(writer);
                    root.node
                        .write_subdivision(&root.attribute, &state, bitstream, writer)?;
                }
                Some(reference_root) => {
                    true.ser(writer);
                    root.node.write_delta(
                        &root.attribute,
                        &reference_root.node,
                        &state,
                        bitstream,
                        writer,
                    )?;
                }
                None => root.node.write(&root.attribute, &state, bitstream, writer)?,
            }
        }

        let removed: Vec<&Root> = reference
            .roots
            .iter()
            .filter(|(name, _)| !self.roots.contains_key(*name))
            .map(|(_, root)| root)
            .collect();
        (removed.len() as u32).ser(writer);
        for root in removed {
            bitstream.write_attribute(writer, &root.attribute);
        }
        Ok(())
    }

    pub fn read_delta_with_lod(
        reference: &MetavoxelData,
        reference_lod: &MetavoxelLOD,
        lod: &MetavoxelLOD,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
    ) -> Result<Self, BitstreamError> {
        let mut data = reference.clone();
        let mut remaining: BTreeSet<String> = data.roots.keys().cloned().collect();
        if bool::de(reader)? {
            if bool::de(reader)? {
                data = reference.resized(f32::de(reader)?);
            }

            let changed = u32::de(reader)?;
            for _ in 0..changed {
                let attribute = bitstream.read_attribute(reader)?;
                remaining.remove(attribute.name());
                let state = data.root_state(&attribute, lod, reference_lod);
                let node = match data.roots.get(attribute.name()) {
                    Some(reference_root) => {
                        if bool::de(reader)? {
                            Rc::new(MetavoxelNode::read_delta(
                                &attribute,
                                &reference_root.node,
                                &state,
                                bitstream,
                                reader,
                            )?)
                        } else {
                            MetavoxelNode::read_subdivision(
                                &attribute,
                                &reference_root.node,
                                &state,
                                bitstream,
                                reader,
                            )?
                        }
                    }
                    None => Rc::new(MetavoxelNode::read(&attribute, &state, bitstream, reader)?),
                };
                data.insert_root(attribute, node);
            }

            let removed = u32::de(reader)?;
            for _ in 0..removed {
                let attribute = bitstream.read_attribute(reader)?;
                remaining.remove(attribute.name());
                data.clear(&attribute);
            }
        }

        // unchanged trees may still collapse under the new LOD
        for name in remaining {
            let Some(root) = data.roots.get(&name) else {
                continue;
            };
            let state = data.root_state(&root.attribute, lod, reference_lod);
            if !state.became_subdivided_or_collapsed() {
                continue;
            }
            let node =
                MetavoxelNode::read_subdivision(&root.attribute, &root.node, &state, bitstream, reader)?;
            let attribute = root.attribute.clone();
            data.insert_root(attribute, node);
        }
        Ok(data)
    }

    /// This data as a receiver holding it under `lod` has it
    pub fn pruned(&self, lod: &MetavoxelLOD) -> MetavoxelData {
        let mut pruned = self.clone();
        for root in pruned.roots.values_mut() {
            let state = StreamState::new(self.minimum(), self.size, &root.attribute, lod, lod);
            root.node = MetavoxelNode::pruned(&root.node, &state);
        }
        pruned
    }

    fn root_state(
        &self,
        attribute: &AttributePointer,
        lod: &MetavoxelLOD,
        reference_lod: &MetavoxelLOD,
    ) -> StreamState {
        StreamState::new(self.minimum(), self.size, attribute, lod, reference_lod)
    }

    fn shares_roots(&self, other: &MetavoxelData) -> bool {
        self.roots.len() == other.roots.len()
            && self.roots.iter().all(|(name, root)| {
                other
                    .roots
                    .get(name)
                    .map_or(false, |other_root| Rc::ptr_eq(&root.node, &other_root.node))
            })
    }

    /// This data expanded to `size`, or empty data of that size if expansion
    /// can't reach it exactly
    fn resized(&self, size: f32) -> MetavoxelData {
        let mut resized = self.clone();
        while resized.size > 0.0 && resized.size < size && size.is_finite() {
            resized.expand();
        }
        if resized.size == size {
            resized
        } else {
            MetavoxelData::with_size(size)
        }
    }
}

/// The new root's child `i` holds the old child `i` at its opposite corner,
/// so the old contents end up around the center. The rest of the new space
/// takes the value the old root passes down to its children.
fn expand_root(attribute: &AttributePointer, root: &MetavoxelNode) -> MetavoxelNode {
    let filler = attribute.inherit(root.value());
    let children: [NodePointer; CHILD_COUNT] = std::array::from_fn(|index| {
        let moved = match root.child(index) {
            Some(child) => child.clone(),
            None => Rc::new(MetavoxelNode::new_leaf(root.value().clone())),
        };
        let opposite = opposite_child_index(index);
        let grandchildren: [NodePointer; CHILD_COUNT] = std::array::from_fn(|position| {
            if position == opposite {
                moved.clone()
            } else {
                Rc::new(MetavoxelNode::new_leaf(filler.clone()))
            }
        });
        let mut child = MetavoxelNode::with_children(filler.clone(), grandchildren);
        child.merge_children(attribute, false);
        Rc::new(child)
    });
    let mut node = MetavoxelNode::with_children(root.value().clone(), children);
    node.merge_children(attribute, false);
    node
}

/// Places `other` (at `other_minimum`, edge `other_size`) into `node`, the
/// cube at `minimum` with edge `size`
#[allow(clippy::too_many_arguments)]
fn set_node_within(
    attribute: &AttributePointer,
    node: Option<&NodePointer>,
    minimum: Vec3,
    size: f32,
    other: &NodePointer,
    other_minimum: Vec3,
    other_size: f32,
    blend: bool,
) -> NodePointer {
    if other_size >= size {
        let value = attribute.default_value();
        return set_node(attribute, &value, node, other, blend);
    }
    let mut new_node = match node {
        Some(node) => MetavoxelNode::clone(node),
        None => MetavoxelNode::new_leaf(attribute.default_value()),
    };
    let next_size = size * 0.5;
    let index = child_index_containing(
        minimum,
        next_size,
        other_minimum + Vec3::splat(other_size * 0.5),
    );
    new_node.subdivide(attribute);
    let child = set_node_within(
        attribute,
        new_node.child(index),
        next_minimum(minimum, next_size, index),
        next_size,
        other,
        other_minimum,
        other_size,
        blend,
    );
    new_node.set_child(attribute, index, child);
    new_node.merge_children(attribute, false);
    Rc::new(new_node)
}

/// Replaces `node` by `other`, or blends `other` on top of it. `value` is
/// used where `node` doesn't exist.
fn set_node(
    attribute: &AttributePointer,
    value: &AttributeData,
    node: Option<&NodePointer>,
    other: &NodePointer,
    blend: bool,
) -> NodePointer {
    if !blend {
        return other.clone();
    }
    let old_value = node.map_or_else(|| value.clone(), |node| node.value().clone());
    let mut new_node = match node {
        Some(node) => MetavoxelNode::clone(node),
        None => MetavoxelNode::new_leaf(value.clone()),
    };
    new_node.set_value(attribute.blend(other.value(), &old_value));
    if !(other.is_leaf() && new_node.is_leaf()) {
        let inherited = attribute.inherit(&old_value);
        let children: [NodePointer; CHILD_COUNT] = std::array::from_fn(|index| {
            set_node(
                attribute,
                &inherited,
                node.and_then(|node| node.child(index)),
                other.child(index).unwrap_or(other),
                true,
            )
        });
        new_node = MetavoxelNode::with_children(new_node.value().clone(), children);
        new_node.merge_children(attribute, false);
    }
    Rc::new(new_node)
}

/// Applies `update` to the sets of the nodes overlapping `bounds`, down to
/// nodes of edge `longest_side`. Returns the new node if anything changed.
#[allow(clippy::too_many_arguments)]
fn update_spanner_node(
    attribute: &AttributePointer,
    node: &NodePointer,
    minimum: Vec3,
    size: f32,
    bounds: &BoundingBox,
    longest_side: f32,
    update: &mut dyn FnMut(&mut SharedObjectSet) -> bool,
) -> Option<NodePointer> {
    if BoundingBox::from_cube(minimum, size).intersection(bounds).is_empty() {
        return None;
    }
    if size <= longest_side {
        let mut set = node
            .value()
            .as_shared_object_set()
            .cloned()
            .unwrap_or_default();
        if !update(&mut set) {
            return None;
        }
        let mut new_node = MetavoxelNode::clone(node);
        new_node.set_value(AttributeData::SharedObjectSet(set));
        return Some(Rc::new(new_node));
    }
    let next_size = size * 0.5;
    let mut new_node: Option<MetavoxelNode> = None;
    for index in 0..CHILD_COUNT {
        let child = match node.child(index) {
            Some(child) => child.clone(),
            None => Rc::new(MetavoxelNode::new_leaf(attribute.inherit(node.value()))),
        };
        let Some(child) = update_spanner_node(
            attribute,
            &child,
            next_minimum(minimum, next_size, index),
            next_size,
            bounds,
            longest_side,
            update,
        ) else {
            continue;
        };
        new_node
            .get_or_insert_with(|| MetavoxelNode::clone(node))
            .set_child(attribute, index, child);
    }
    let mut new_node = new_node?;
    new_node.merge_children(attribute, false);
    Some(Rc::new(new_node))
}

/// Removes `object` from every set in the subtree. Returns the new node if
/// anything changed.
fn remove_from_sets(
    attribute: &AttributePointer,
    node: &NodePointer,
    object: &SharedObjectPointer,
) -> Option<NodePointer> {
    let mut new_node: Option<MetavoxelNode> = None;
    if let Some(set) = node.value().as_shared_object_set() {
        if set.contains(object) {
            let mut set = set.clone();
            set.remove(object);
            new_node
                .get_or_insert_with(|| MetavoxelNode::clone(node))
                .set_value(AttributeData::SharedObjectSet(set));
        }
    }
    for index in 0..CHILD_COUNT {
        let Some(child) = node.child(index) else {
            break;
        };
        if let Some(child) = remove_from_sets(attribute, child, object) {
            new_node
                .get_or_insert_with(|| MetavoxelNode::clone(node))
                .set_child(attribute, index, child);
        }
    }
    let mut new_node = new_node?;
    new_node.merge_children(attribute, false);
    Some(Rc::new(new_node))
}
