mod bitstream;
mod error;
mod id_streamer;
mod object;
mod repeated_value;
mod shared_object;
mod type_registry;

pub use bitstream::{Bitstream, ReadMappings, WriteMappings};
pub use error::BitstreamError;
pub use id_streamer::IdStreamer;
pub use object::{Object, ObjectClass, PropertyDescriptor, PropertyKind, PropertyValue, TypeStreamer};
pub use repeated_value::{ReadId, RepeatedValueReader, RepeatedValueWriter};
pub use shared_object::{shared_objects_equal, SharedObject, SharedObjectPointer, SharedObjectSet};
pub use type_registry::TypeRegistry;
