use std::rc::Rc;

use glam::Vec3;

use metavoxel_serde::{BitReader, BitWrite, Serde};

use super::{Bitstream, BitstreamError, SharedObjectPointer};
use crate::util::{read_vec3, write_vec3};

/// A dynamically typed property value
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    UInt(u32),
    Float(f32),
    Double(f64),
    Long(i64),
    Vec3(Vec3),
    String(String),
    Bytes(Vec<u8>),
    Object(Option<Rc<Object>>),
    SharedObject(Option<SharedObjectPointer>),
}

/// Serialization strategy for the values of one property type
pub trait TypeStreamer {
    fn type_name(&self) -> &str;

    fn default_value(&self) -> PropertyValue;

    fn write(
        &self,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        value: &PropertyValue,
    ) -> Result<(), BitstreamError>;

    fn read(
        &self,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
    ) -> Result<PropertyValue, BitstreamError>;

    /// Writes a changed bit, followed by the value if it differs from `reference`
    fn write_delta(
        &self,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        value: &PropertyValue,
        reference: &PropertyValue,
    ) -> Result<(), BitstreamError> {
        if value == reference {
            false.ser(writer);
            return Ok(());
        }
        true.ser(writer);
        self.write(bitstream, writer, value)
    }

    fn read_delta(
        &self,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
        reference: &PropertyValue,
    ) -> Result<PropertyValue, BitstreamError> {
        if bool::de(reader)? {
            self.read(bitstream, reader)
        } else {
            Ok(reference.clone())
        }
    }
}

/// The built-in property types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PropertyKind {
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Long,
    Vec3,
    String,
    Bytes,
    Object,
    SharedObject,
}

impl PropertyKind {
    pub const ALL: [PropertyKind; 11] = [
        PropertyKind::Bool,
        PropertyKind::Int,
        PropertyKind::UInt,
        PropertyKind::Float,
        PropertyKind::Double,
        PropertyKind::Long,
        PropertyKind::Vec3,
        PropertyKind::String,
        PropertyKind::Bytes,
        PropertyKind::Object,
        PropertyKind::SharedObject,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PropertyKind::Bool => "bool",
            PropertyKind::Int => "int",
            PropertyKind::UInt => "uint",
            PropertyKind::Float => "float",
            PropertyKind::Double => "double",
            PropertyKind::Long => "long",
            PropertyKind::Vec3 => "vec3",
            PropertyKind::String => "string",
            PropertyKind::Bytes => "bytes",
            PropertyKind::Object => "object",
            PropertyKind::SharedObject => "shared_object",
        }
    }

    fn mismatch(&self) -> BitstreamError {
        BitstreamError::PropertyTypeMismatch {
            type_name: self.name().to_string(),
        }
    }
}

impl TypeStreamer for PropertyKind {
    fn type_name(&self) -> &str {
        self.name()
    }

    fn default_value(&self) -> PropertyValue {
        match self {
            PropertyKind::Bool => PropertyValue::Bool(false),
            PropertyKind::Int => PropertyValue::Int(0),
            PropertyKind::UInt => PropertyValue::UInt(0),
            PropertyKind::Float => PropertyValue::Float(0.0),
            PropertyKind::Double => PropertyValue::Double(0.0),
            PropertyKind::Long => PropertyValue::Long(0),
            PropertyKind::Vec3 => PropertyValue::Vec3(Vec3::ZERO),
            PropertyKind::String => PropertyValue::String(String::new()),
            PropertyKind::Bytes => PropertyValue::Bytes(Vec::new()),
            PropertyKind::Object => PropertyValue::Object(None),
            PropertyKind::SharedObject => PropertyValue::SharedObject(None),
        }
    }

    fn write(
        &self,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
        value: &PropertyValue,
    ) -> Result<(), BitstreamError> {
        match (self, value) {
            (PropertyKind::Bool, PropertyValue::Bool(value)) => value.ser(writer),
            (PropertyKind::Int, PropertyValue::Int(value)) => value.ser(writer),
            (PropertyKind::UInt, PropertyValue::UInt(value)) => value.ser(writer),
            (PropertyKind::Float, PropertyValue::Float(value)) => value.ser(writer),
            (PropertyKind::Double, PropertyValue::Double(value)) => value.ser(writer),
            (PropertyKind::Long, PropertyValue::Long(value)) => value.ser(writer),
            (PropertyKind::Vec3, PropertyValue::Vec3(value)) => write_vec3(writer, value),
            (PropertyKind::String, PropertyValue::String(value)) => value.ser(writer),
            (PropertyKind::Bytes, PropertyValue::Bytes(value)) => value.ser(writer),
            (PropertyKind::Object, PropertyValue::Object(value)) => {
                bitstream.write_object(writer, value.as_deref())?
            }
            (PropertyKind::SharedObject, PropertyValue::SharedObject(value)) => {
                bitstream.write_shared_object(writer, value.as_ref())?
            }
            _ => return Err(self.mismatch()),
        }
        Ok(())
    }

    fn read(
        &self,
        bitstream: &mut Bitstream,
        reader: &mut BitReader,
    ) -> Result<PropertyValue, BitstreamError> {
        let value = match self {
            PropertyKind::Bool => PropertyValue::Bool(Serde::de(reader)?),
            PropertyKind::Int => PropertyValue::Int(Serde::de(reader)?),
            PropertyKind::UInt => PropertyValue::UInt(Serde::de(reader)?),
            PropertyKind::Float => PropertyValue::Float(Serde::de(reader)?),
            PropertyKind::Double => PropertyValue::Double(Serde::de(reader)?),
            PropertyKind::Long => PropertyValue::Long(Serde::de(reader)?),
            PropertyKind::Vec3 => PropertyValue::Vec3(read_vec3(reader)?),
            PropertyKind::String => PropertyValue::String(Serde::de(reader)?),
            PropertyKind::Bytes => PropertyValue::Bytes(Serde::de(reader)?),
            PropertyKind::Object => PropertyValue::Object(bitstream.read_object(reader)?.map(Rc::new)),
            PropertyKind::SharedObject => {
                PropertyValue::SharedObject(bitstream.read_shared_object(reader)?)
            }
        };
        Ok(value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub name: String,
    pub type_name: String,
    pub default: PropertyValue,
}

/// Describes the properties of a class of objects, in declaration order
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectClass {
    name: String,
    properties: Vec<PropertyDescriptor>,
}

impl ObjectClass {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            properties: Vec::new(),
        }
    }

    pub fn with_property(self, name: &str, kind: PropertyKind) -> Self {
        let default = kind.default_value();
        self.with_custom_property(name, kind.name(), default)
    }

    pub fn with_custom_property(mut self, name: &str, type_name: &str, default: PropertyValue) -> Self {
        self.properties.push(PropertyDescriptor {
            name: name.to_string(),
            type_name: type_name.to_string(),
            default,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn properties(&self) -> &[PropertyDescriptor] {
        &self.properties
    }

    pub fn property_index(&self, name: &str) -> Option<usize> {
        self.properties
            .iter()
            .position(|descriptor| descriptor.name == name)
    }
}

/// An instance of an `ObjectClass`
#[derive(Debug, Clone, PartialEq)]
pub struct Object {
    class: Rc<ObjectClass>,
    values: Vec<PropertyValue>,
}

impl Object {
    pub fn new(class: Rc<ObjectClass>) -> Self {
        let values = class
            .properties()
            .iter()
            .map(|descriptor| descriptor.default.clone())
            .collect();
        Self { class, values }
    }

    pub fn class(&self) -> &Rc<ObjectClass> {
        &self.class
    }

    pub fn values(&self) -> &[PropertyValue] {
        &self.values
    }

    pub fn get(&self, name: &str) -> Option<&PropertyValue> {
        self.class
            .property_index(name)
            .map(|index| &self.values[index])
    }

    pub fn set(&mut self, name: &str, value: PropertyValue) -> Result<(), BitstreamError> {
        let Some(index) = self.class.property_index(name) else {
            return Err(BitstreamError::UnknownProperty {
                class: self.class.name().to_string(),
                property: name.to_string(),
            });
        };
        self.values[index] = value;
        Ok(())
    }

    /// Builder form of `set`
    pub fn with(mut self, name: &str, value: PropertyValue) -> Result<Self, BitstreamError> {
        self.set(name, value)?;
        Ok(self)
    }

    pub(crate) fn set_index(&mut self, index: usize, value: PropertyValue) {
        self.values[index] = value;
    }
}

#[cfg(test)]
mod tests {
    use std::rc::Rc;

    use glam::Vec3;

    use super::{Object, ObjectClass, PropertyKind, PropertyValue};
    use crate::bitstream::BitstreamError;

    fn sphere_class() -> Rc<ObjectClass> {
        Rc::new(
            ObjectClass::new("Sphere")
                .with_property("center", PropertyKind::Vec3)
                .with_property("radius", PropertyKind::Float),
        )
    }

    #[test]
    fn new_object_has_defaults() {
        let sphere = Object::new(sphere_class());
        assert_eq!(sphere.get("center"), Some(&PropertyValue::Vec3(Vec3::ZERO)));
        assert_eq!(sphere.get("radius"), Some(&PropertyValue::Float(0.0)));
        assert_eq!(sphere.get("color"), None);
    }

    #[test]
    fn set_unknown_property_fails() {
        let mut sphere = Object::new(sphere_class());
        assert!(sphere.set("radius", PropertyValue::Float(2.0)).is_ok());
        assert_eq!(sphere.get("radius"), Some(&PropertyValue::Float(2.0)));

        let result = sphere.set("color", PropertyValue::UInt(0));
        assert!(matches!(
            result,
            Err(BitstreamError::UnknownProperty { ref property, .. }) if property == "color"
        ));
    }

    #[test]
    fn kind_names_are_unique() {
        let mut names: Vec<&str> = PropertyKind::ALL.iter().map(|kind| kind.name()).collect();
        names.sort();
        names.dedup();
        assert_eq!(names.len(), PropertyKind::ALL.len());
    }
}
