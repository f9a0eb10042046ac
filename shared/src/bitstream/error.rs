use thiserror::Error;

use metavoxel_serde::SerdeErr;

/// Errors that can occur while encoding or decoding through a `Bitstream`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BitstreamError {
    /// The underlying bit stream ended early or held an invalid value
    #[error(transparent)]
    Serde(#[from] SerdeErr),

    /// An attribute name was received that is not present in the AttributeRegistry
    #[error("Attribute {name:?} is not registered. Both peers must register the same attributes with the Protocol")]
    UnknownAttribute { name: String },

    /// A property declared a type that has no registered streamer
    #[error("No type streamer registered for type {type_name:?}. Register it with Protocol::add_type_streamer()")]
    UnknownTypeStreamer { type_name: String },

    /// A property value did not match the type its streamer handles
    #[error("Property value does not match streamer type {type_name:?}")]
    PropertyTypeMismatch { type_name: String },

    /// An object has no property with the given name
    #[error("Class {class:?} has no property named {property:?}")]
    UnknownProperty { class: String, property: String },

    /// A shared object was sent as a delta against a reference this side never persisted
    #[error("Shared object {id} was sent as a delta, but no reference with origin {origin_id} is known")]
    MissingDeltaReference { id: u32, origin_id: u32 },

    /// An attribute was handed a value of a kind it does not store
    #[error("Attribute {attribute:?} cannot encode a value of this kind")]
    AttributeValueMismatch { attribute: String },

    /// An edit arrived that can't be applied
    #[error("Invalid edit: {reason}")]
    InvalidEdit { reason: &'static str },
}
