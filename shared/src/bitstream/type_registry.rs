use std::{collections::HashMap, rc::Rc};

use super::{BitstreamError, ObjectClass, PropertyKind, TypeStreamer};

/// Maps class names to their layouts and type names to the streamers that
/// encode values of that type
pub struct TypeRegistry {
    classes: HashMap<String, Rc<ObjectClass>>,
    streamers: HashMap<String, Rc<dyn TypeStreamer>>,
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeRegistry {
    /// Creates a registry with a streamer for every `PropertyKind`
    pub fn new() -> Self {
        let mut registry = Self {
            classes: HashMap::new(),
            streamers: HashMap::new(),
        };
        for kind in PropertyKind::ALL {
            registry.add_streamer(Rc::new(kind));
        }
        registry
    }

    /// Registers a class, replacing any previous class of the same name
    pub fn add_class(&mut self, class: ObjectClass) -> Rc<ObjectClass> {
        let class = Rc::new(class);
        self.classes
            .insert(class.name().to_string(), class.clone());
        class
    }

    pub fn add_streamer(&mut self, streamer: Rc<dyn TypeStreamer>) {
        self.streamers
            .insert(streamer.type_name().to_string(), streamer);
    }

    pub fn class(&self, name: &str) -> Option<&Rc<ObjectClass>> {
        self.classes.get(name)
    }

    pub fn streamer(&self, type_name: &str) -> Result<Rc<dyn TypeStreamer>, BitstreamError> {
        self.streamers
            .get(type_name)
            .cloned()
            .ok_or_else(|| BitstreamError::UnknownTypeStreamer {
                type_name: type_name.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::TypeRegistry;
    use crate::bitstream::{BitstreamError, ObjectClass, PropertyKind};

    #[test]
    fn builtin_streamers_are_registered() {
        let registry = TypeRegistry::new();
        for kind in PropertyKind::ALL {
            assert!(registry.streamer(kind.name()).is_ok());
        }
    }

    #[test]
    fn unknown_streamer() {
        let registry = TypeRegistry::new();
        assert_eq!(
            registry.streamer("quaternion").err(),
            Some(BitstreamError::UnknownTypeStreamer {
                type_name: "quaternion".to_string()
            })
        );
    }

    #[test]
    fn classes_by_name() {
        let mut registry = TypeRegistry::new();
        let class = registry.add_class(ObjectClass::new("Guide").with_property("depth", PropertyKind::Int));
        assert_eq!(registry.class("Guide"), Some(&class));
        assert!(registry.class("Missing").is_none());
    }
}
