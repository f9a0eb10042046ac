mod attribute;
mod inline;
mod registry;
mod shared_object_attribute;
mod value;

pub use attribute::{Attribute, AttributeData, AttributePointer, MERGE_COUNT};
pub use inline::{
    alpha, blue, green, pack_normal, red, rgba, unpack_normal, FloatAttribute,
    PackedNormalAttribute, RgbAttribute,
};
pub use registry::{
    AttributeRegistry, COLOR_ATTRIBUTE, GUIDE_ATTRIBUTE, MASK_ATTRIBUTE, NORMAL_ATTRIBUTE,
    SPANNERS_ATTRIBUTE,
};
pub use shared_object_attribute::{SharedObjectAttribute, SharedObjectSetAttribute};
pub use value::{AttributeValue, OwnedAttributeValue};
