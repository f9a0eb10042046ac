use std::{collections::HashMap, rc::Rc};

use super::{
    AttributePointer, FloatAttribute, PackedNormalAttribute, RgbAttribute, SharedObjectAttribute,
    SharedObjectSetAttribute,
};

pub const COLOR_ATTRIBUTE: &str = "color";
pub const NORMAL_ATTRIBUTE: &str = "normal";
pub const MASK_ATTRIBUTE: &str = "mask";
pub const GUIDE_ATTRIBUTE: &str = "guide";
pub const SPANNERS_ATTRIBUTE: &str = "spanners";

/// Attributes known to a peer, by name
pub struct AttributeRegistry {
    attributes: HashMap<String, AttributePointer>,
}

impl Default for AttributeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AttributeRegistry {
    /// Creates a registry holding the standard attributes
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register(Rc::new(RgbAttribute::new(COLOR_ATTRIBUTE)));
        registry.register(Rc::new(PackedNormalAttribute::new(NORMAL_ATTRIBUTE)));
        registry.register(Rc::new(FloatAttribute::new(MASK_ATTRIBUTE)));
        registry.register(Rc::new(SharedObjectAttribute::new(GUIDE_ATTRIBUTE)));
        registry.register(Rc::new(SharedObjectSetAttribute::with_lod_threshold_multiplier(
            SPANNERS_ATTRIBUTE,
            8.0,
        )));
        registry
    }

    pub fn empty() -> Self {
        Self {
            attributes: HashMap::new(),
        }
    }

    /// Registers an attribute. If one of the same name is already registered,
    /// that one is kept and returned instead.
    pub fn register(&mut self, attribute: AttributePointer) -> AttributePointer {
        self.attributes
            .entry(attribute.name().to_string())
            .or_insert(attribute)
            .clone()
    }

    pub fn deregister(&mut self, name: &str) -> Option<AttributePointer> {
        self.attributes.remove(name)
    }

    pub fn get_attribute(&self, name: &str) -> Option<AttributePointer> {
        self.attributes.get(name).cloned()
    }

    pub fn attributes(&self) -> impl Iterator<Item = &AttributePointer> {
        self.attributes.values()
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use super::*;
    use crate::attribute::{Attribute, AttributeData};

    #[test]
    fn standard_attributes() {
        let registry = AttributeRegistry::new();
        for name in [
            COLOR_ATTRIBUTE,
            NORMAL_ATTRIBUTE,
            MASK_ATTRIBUTE,
            GUIDE_ATTRIBUTE,
            SPANNERS_ATTRIBUTE,
        ] {
            let attribute = registry.get_attribute(name).unwrap();
            assert_eq!(attribute.name(), name);
        }
        let spanners = registry.get_attribute(SPANNERS_ATTRIBUTE).unwrap();
        assert_eq!(spanners.lod_threshold_multiplier(), 8.0);
    }

    #[test]
    fn register_keeps_existing() {
        let mut registry = AttributeRegistry::empty();
        let first = registry.register(Rc::new(FloatAttribute::with_default("density", 1.0)));
        let second = registry.register(Rc::new(FloatAttribute::with_default("density", 2.0)));

        assert!(Rc::ptr_eq(&first, &second));
        assert_eq!(second.default_value(), AttributeData::Float(1.0));
    }

    #[test]
    fn deregister() {
        let mut registry = AttributeRegistry::new();
        assert!(registry.deregister(MASK_ATTRIBUTE).is_some());
        assert!(registry.get_attribute(MASK_ATTRIBUTE).is_none());
        assert!(registry.deregister(MASK_ATTRIBUTE).is_none());
    }
}
