//! # Metavoxel Shared
//! Common functionality shared between metavoxel-server & metavoxel-client
//! crates: the octree, its attributes, the bitstream that encodes them, and
//! the datagram sequencer that carries them between peers.

#![deny(trivial_numeric_casts, unstable_features, unused_import_braces)]

pub use metavoxel_serde::{
    BitCounter, BitReader, BitWrite, BitWriter, ConstBitLength, Serde, SerdeErr, SerdeInteger,
    UnsignedInteger, UnsignedVariableInteger,
};

mod attribute;
mod bitstream;
mod endpoint;
mod messages;
mod metavoxel;
mod protocol;
mod sequencer;
mod util;

pub use attribute::{
    alpha, blue, green, pack_normal, red, rgba, unpack_normal, Attribute, AttributeData,
    AttributePointer, AttributeRegistry, AttributeValue, FloatAttribute, OwnedAttributeValue,
    PackedNormalAttribute, RgbAttribute, SharedObjectAttribute, SharedObjectSetAttribute,
    COLOR_ATTRIBUTE, GUIDE_ATTRIBUTE, MASK_ATTRIBUTE, MERGE_COUNT, NORMAL_ATTRIBUTE,
    SPANNERS_ATTRIBUTE,
};
pub use bitstream::{
    shared_objects_equal, Bitstream, BitstreamError, IdStreamer, Object, ObjectClass,
    PropertyDescriptor, PropertyKind, PropertyValue, ReadId, ReadMappings, RepeatedValueReader,
    RepeatedValueWriter, SharedObject, SharedObjectPointer, SharedObjectSet, TypeRegistry,
    TypeStreamer, WriteMappings,
};
pub use endpoint::{Endpoint, EndpointBehavior, EndpointError, PacketRecord};
pub use messages::{MetavoxelEdit, MetavoxelMessage};
pub use metavoxel::{
    child_index_containing, next_minimum, opposite_child_index, MetavoxelData, MetavoxelInfo,
    MetavoxelLOD, MetavoxelNode, MetavoxelVisitor, NodePointer, VisitOrder, CHILD_COUNT,
    X_MAXIMUM_FLAG, Y_MAXIMUM_FLAG, Z_MAXIMUM_FLAG,
};
pub use protocol::{Protocol, ProtocolError, ProtocolPlugin};
pub use sequencer::{
    ChannelSpan, DatagramSequencer, Message, ReliableChannel, ReliableChannelStats,
    SequencerConfig, SequencerError, SequencerHandler, Span, SpanError, SpanList,
    FRAGMENT_HEADER_SIZE, SEGMENT_HEADER_SIZE,
};
pub use util::{read_vec3, write_vec3, BoundingBox};

pub use glam::Vec3;
