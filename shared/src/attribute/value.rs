use std::rc::Rc;

use metavoxel_serde::{BitReader, BitWrite};

use super::{AttributeData, AttributePointer};
use crate::bitstream::{Bitstream, BitstreamError};

/// A borrowed value paired with the attribute that interprets it
#[derive(Debug, Clone, Copy)]
pub struct AttributeValue<'a> {
    attribute: &'a AttributePointer,
    value: &'a AttributeData,
}

impl<'a> AttributeValue<'a> {
    pub fn new(attribute: &'a AttributePointer, value: &'a AttributeData) -> Self {
        Self { attribute, value }
    }

    pub fn attribute(&self) -> &'a AttributePointer {
        self.attribute
    }

    pub fn value(&self) -> &'a AttributeData {
        self.value
    }

    pub fn is_default(&self) -> bool {
        self.attribute.is_default(self.value)
    }

    pub fn to_owned_value(&self) -> OwnedAttributeValue {
        OwnedAttributeValue::new(self.attribute.clone(), self.value.clone())
    }
}

impl PartialEq for AttributeValue<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.attribute.name() == other.attribute.name()
            && self.attribute.equal(self.value, other.value)
    }
}

/// An owned value paired with the attribute that interprets it
#[derive(Debug, Clone)]
pub struct OwnedAttributeValue {
    attribute: AttributePointer,
    value: AttributeData,
}

impl OwnedAttributeValue {
    pub fn new(attribute: AttributePointer, value: AttributeData) -> Self {
        Self { attribute, value }
    }

    /// The attribute's default value
    pub fn default_for(attribute: AttributePointer) -> Self {
        let value = attribute.default_value();
        Self { attribute, value }
    }

    pub fn attribute(&self) -> &AttributePointer {
        &self.attribute
    }

    pub fn value(&self) -> &AttributeData {
        &self.value
    }

    pub fn as_value(&self) -> AttributeValue<'_> {
        AttributeValue::new(&self.attribute, &self.value)
    }

    pub fn is_default(&self) -> bool {
        self.attribute.is_default(&self.value)
    }

    /// Interpolates between two values of this value's attribute
    pub fn mix(&mut self, first: &AttributeData, second: &AttributeData, alpha: f32) {
        self.value = self.attribute.mix(first, second, alpha);
    }

    /// Blends `source` on top of the current value
    pub fn blend(&mut self, source: &AttributeData) {
        self.value = self.attribute.blend(source, &self.value);
    }

    pub fn write(
        &self,
        bitstream: &mut Bitstream,
        writer: &mut dyn BitWrite,
    ) -> Result<(), BitstreamError> {
        bitstream.write_attribute(writer, &self.attribute);
        self.attribute.write(bitstream, writer, &self.value, true)
    }

    pub fn read(bitstream: &mut Bitstream, reader: &mut BitReader) -> Result<Self, BitstreamError> {
        let attribute = bitstream.read_attribute(reader)?;
        let value = attribute.read(bitstream, reader, true)?;
        Ok(Self { attribute, value })
    }
}

impl PartialEq for OwnedAttributeValue {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.attribute, &other.attribute)
            && self.attribute.equal(&self.value, &other.value)
    }
}
