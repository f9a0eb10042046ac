mod data;
mod lod;
mod node;
mod visitor;

pub use data::MetavoxelData;
pub use lod::MetavoxelLOD;
pub use node::{
    child_index_containing, next_minimum, opposite_child_index, MetavoxelNode, NodePointer,
    CHILD_COUNT, X_MAXIMUM_FLAG, Y_MAXIMUM_FLAG, Z_MAXIMUM_FLAG,
};
pub use visitor::{MetavoxelInfo, MetavoxelVisitor, VisitOrder};
