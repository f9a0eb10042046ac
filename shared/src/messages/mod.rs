mod edit;
mod metavoxel_message;

pub use edit::MetavoxelEdit;
pub use metavoxel_message::MetavoxelMessage;
