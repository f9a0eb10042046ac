use std::{
    collections::HashMap,
    rc::{Rc, Weak},
};

use log::warn;

use metavoxel_serde::{BitReader, BitWrite, Serde, SerdeErr};

use super::{
    repeated_value::{ReadId, RepeatedValueReader, RepeatedValueWriter},
    BitstreamError, Object, ObjectClass, PropertyValue, SharedObject,
    SharedObjectPointer, SharedObjectSet,
};
use crate::{attribute::AttributePointer, Protocol};

/// Transient write mappings created while writing one packet
#[derive(Clone, Default)]
pub struct WriteMappings {
    class_offsets: HashMap<String, u32>,
    attribute_offsets: HashMap<String, u32>,
    shared_object_offsets: HashMap<SharedObjectPointer, u32>,
}

impl WriteMappings {
    pub fn is_empty(&self) -> bool {
        self.class_offsets.is_empty()
            && self.attribute_offsets.is_empty()
            && self.shared_object_offsets.is_empty()
    }
}

/// Transient read mappings created while reading one packet
#[derive(Clone, Default)]
pub struct ReadMappings {
    class_values: HashMap<u32, Rc<ObjectClass>>,
    attribute_values: HashMap<u32, String>,
    shared_object_values: HashMap<u32, Option<SharedObjectPointer>>,
}

impl ReadMappings {
    pub fn is_empty(&self) -> bool {
        self.class_values.is_empty()
            && self.attribute_values.is_empty()
            && self.shared_object_values.is_empty()
    }
}

/// Encodes objects, attributes and shared objects, sending repeated classes,
/// attributes and shared objects by id. Ids become durable only once the
/// mappings of the packet that introduced them are persisted.
pub struct Bitstream {
    protocol: Rc<Protocol>,
    class_writer: RepeatedValueWriter<String>,
    class_reader: RepeatedValueReader<Rc<ObjectClass>>,
    attribute_writer: RepeatedValueWriter<String>,
    attribute_reader: RepeatedValueReader<String>,
    shared_object_writer: RepeatedValueWriter<SharedObjectPointer>,
    shared_object_reader: RepeatedValueReader<Option<SharedObjectPointer>>,
    // origin id -> last persisted object written with that origin
    write_references: HashMap<u32, Weak<SharedObject>>,
    // remote origin id -> (persistent id, last persisted object read with that origin)
    read_references: HashMap<u32, (u32, SharedObjectPointer)>,
    // remote id -> object received but not yet persisted
    received_objects: HashMap<u32, Weak<SharedObject>>,
}

impl Bitstream {
    pub fn new(protocol: Rc<Protocol>) -> Self {
        Self {
            protocol,
            class_writer: RepeatedValueWriter::new(),
            class_reader: RepeatedValueReader::new(),
            attribute_writer: RepeatedValueWriter::new(),
            attribute_reader: RepeatedValueReader::new(),
            shared_object_writer: RepeatedValueWriter::new(),
            shared_object_reader: RepeatedValueReader::new(),
            write_references: HashMap::new(),
            read_references: HashMap::new(),
            received_objects: HashMap::new(),
        }
    }

    pub fn protocol(&self) -> &Rc<Protocol> {
        &self.protocol
    }

    // Mappings

    pub fn get_and_reset_write_mappings(&mut self) -> WriteMappings {
        WriteMappings {
            class_offsets: self.class_writer.get_and_reset_transient_offsets(),
            attribute_offsets: self.attribute_writer.get_and_reset_transient_offsets(),
            shared_object_offsets: self.shared_object_writer.get_and_reset_transient_offsets(),
        }
    }

    pub fn persist_write_mappings(&mut self, mappings: &WriteMappings) {
        self.class_writer
            .persist_transient_offsets(&mappings.class_offsets);
        self.attribute_writer
            .persist_transient_offsets(&mappings.attribute_offsets);
        self.shared_object_writer
            .persist_transient_offsets(&mappings.shared_object_offsets);

        for object in mappings.shared_object_offsets.keys() {
            let previous = self
                .write_references
                .get(&object.origin_id())
                .and_then(Weak::upgrade);
            if let Some(previous) = previous {
                if !Rc::ptr_eq(&previous, &object.0) {
                    // replaced by a successor
                    self.shared_object_writer
                        .take_persistent_id(&SharedObjectPointer(previous));
                }
            }
            self.write_references
                .insert(object.origin_id(), object.downgrade());
        }
    }

    pub fn persist_and_reset_write_mappings(&mut self) {
        let mappings = self.get_and_reset_write_mappings();
        self.persist_write_mappings(&mappings);
    }

    pub fn get_and_reset_read_mappings(&mut self) -> ReadMappings {
        ReadMappings {
            class_values: self.class_reader.get_and_reset_transient_values(),
            attribute_values: self.attribute_reader.get_and_reset_transient_values(),
            shared_object_values: self.shared_object_reader.get_and_reset_transient_values(),
        }
    }

    pub fn persist_read_mappings(&mut self, mappings: &ReadMappings) {
        self.class_reader
            .persist_transient_values(&mappings.class_values);
        self.attribute_reader
            .persist_transient_values(&mappings.attribute_values);
        let persisted = self
            .shared_object_reader
            .persist_transient_values(&mappings.shared_object_values);

        for (id, object) in persisted {
            let Some(object) = object else {
                continue;
            };
            if let Some((previous_id, previous)) = self.read_references.get(&object.remote_origin_id()) {
                if *previous != object {
                    // replaced by a successor
                    let previous_id = *previous_id;
                    self.shared_object_reader.take_persistent_value(previous_id);
                }
            }
            self.received_objects.remove(&object.remote_id());
            self.read_references
                .insert(object.remote_origin_id(), (id, object));
        }
    }

    pub fn persist_and_reset_read_mappings(&mut self) {
        let mappings = self.get_and_reset_read_mappings();
        self.persist_read_mappings(&mappings);
    }

    /// Drops the persisted write mappings of shared objects that nothing
    /// outside this bitstream refers to anymore, returning their ids so the
    /// remote side can be told to drop its own mappings
    pub fn collect_unreferenced_shared_objects(&mut self) -> Vec<u32> {
        let unreferenced: Vec<SharedObjectPointer> = self
            .shared_object_writer
            .persistent_keys()
            .filter(|object| object.strong_count() == 1)
            .cloned()
            .collect();

        let mut cleared = Vec::new();
        for object in unreferenced {
            if let Some(reference) = self.write_references.get(&object.origin_id()) {
                if Weak::as_ptr(reference) == Rc::as_ptr(&object.0) {
                    self.write_references.remove(&object.origin_id());
                }
            }
            if let Some(id) = self.shared_object_writer.take_persistent_id(&object) {
                cleared.push(id);
            }
        }
        cleared.sort_unstable();
        cleared
    }

    /// Drops the persisted read mapping for `id`, as announced by the remote side
    pub fn clear_shared_object(&mut self, id: u32) {
        if let Some(Some(object)) = self.shared_object_reader.take_persistent_value(id) {
            self.received_objects.remove(&object.remote_id());
        }
        self.read_references
            .retain(|_, (reference_id, _)| *reference_id != id);
    }

    // Attributes

    pub fn write_attribute(&mut self, writer: &mut dyn BitWrite, attribute: &AttributePointer) {
        let name = attribute.name().to_string();
        if self.attribute_writer.write_id(writer, &name) {
            name.ser(writer);
        }
    }

    pub fn read_attribute(&mut self, reader: &mut BitReader) -> Result<AttributePointer, BitstreamError> {
        let name = match self.attribute_reader.read_id(reader)? {
            ReadId::Null => return Err(SerdeErr.into()),
            ReadId::Existing(name) => name,
            ReadId::New(offset) => {
                let name = String::de(reader)?;
                self.attribute_reader.insert_transient(offset, name.clone());
                name
            }
        };
        self.protocol
            .attributes
            .get_attribute(&name)
            .ok_or(BitstreamError::UnknownAttribute { name })
    }

    // Objects

    pub fn write_object(
        &mut self,
        writer: &mut dyn BitWrite,
        object: Option<&Object>,
    ) -> Result<(), BitstreamError> {
        let Some(object) = object else {
            self.class_writer.write_null(writer);
            return Ok(());
        };
        self.write_class(writer, object.class());
        let protocol = self.protocol.clone();
        for (descriptor, value) in object.class().properties().iter().zip(object.values()) {
            let streamer = protocol.types.streamer(&descriptor.type_name)?;
            streamer.write(self, writer, value)?;
        }
        Ok(())
    }

    /// Reads an object written by `write_object`. An object whose class is not
    /// registered locally is consumed and decoded as `None`.
    pub fn read_object(&mut self, reader: &mut BitReader) -> Result<Option<Object>, BitstreamError> {
        let Some(layout) = self.read_class(reader)? else {
            return Ok(None);
        };
        let protocol = self.protocol.clone();
        let mut values = Vec::with_capacity(layout.properties().len());
        for descriptor in layout.properties() {
            let streamer = protocol.types.streamer(&descriptor.type_name)?;
            values.push(streamer.read(self, reader)?);
        }
        Ok(self.resolve_object(&layout, values))
    }

    fn write_object_delta(
        &mut self,
        writer: &mut dyn BitWrite,
        object: &Object,
        reference: &Object,
    ) -> Result<(), BitstreamError> {
        self.write_class(writer, object.class());
        let protocol = self.protocol.clone();
        for (descriptor, value) in object.class().properties().iter().zip(object.values()) {
            let streamer = protocol.types.streamer(&descriptor.type_name)?;
            let reference_value = reference
                .get(&descriptor.name)
                .cloned()
                .unwrap_or_else(|| streamer.default_value());
            streamer.write_delta(self, writer, value, &reference_value)?;
        }
        Ok(())
    }

    fn read_object_delta(
        &mut self,
        reader: &mut BitReader,
        reference: &Object,
    ) -> Result<Option<Object>, BitstreamError> {
        let Some(layout) = self.read_class(reader)? else {
            return Ok(None);
        };
        let protocol = self.protocol.clone();
        let mut values = Vec::with_capacity(layout.properties().len());
        for descriptor in layout.properties() {
            let streamer = protocol.types.streamer(&descriptor.type_name)?;
            let reference_value = reference
                .get(&descriptor.name)
                .cloned()
                .unwrap_or_else(|| streamer.default_value());
            values.push(streamer.read_delta(self, reader, &reference_value)?);
        }
        Ok(self.resolve_object(&layout, values))
    }

    fn write_class(&mut self, writer: &mut dyn BitWrite, class: &ObjectClass) {
        let name = class.name().to_string();
        if !self.class_writer.write_id(writer, &name) {
            return;
        }
        name.ser(writer);
        (class.properties().len() as u32).ser(writer);
        for descriptor in class.properties() {
            descriptor.name.ser(writer);
            descriptor.type_name.ser(writer);
        }
    }

    /// Reads the layout the remote side wrote its object with
    fn read_class(&mut self, reader: &mut BitReader) -> Result<Option<Rc<ObjectClass>>, BitstreamError> {
        let offset = match self.class_reader.read_id(reader)? {
            ReadId::Null => return Ok(None),
            ReadId::Existing(layout) => return Ok(Some(layout)),
            ReadId::New(offset) => offset,
        };
        let name = String::de(reader)?;
        let count = u32::de(reader)? as usize;
        if count > reader.bits_remaining() {
            return Err(SerdeErr.into());
        }
        let mut layout = ObjectClass::new(&name);
        for _ in 0..count {
            let property_name = String::de(reader)?;
            let type_name = String::de(reader)?;
            let default = self.protocol.types.streamer(&type_name)?.default_value();
            layout = layout.with_custom_property(&property_name, &type_name, default);
        }
        let layout = Rc::new(layout);
        self.class_reader.insert_transient(offset, layout.clone());
        Ok(Some(layout))
    }

    fn resolve_object(&self, layout: &ObjectClass, values: Vec<PropertyValue>) -> Option<Object> {
        let Some(class) = self.protocol.types.class(layout.name()) else {
            warn!("Unknown class {:?}, decoding object as none", layout.name());
            return None;
        };
        let mut object = Object::new(class.clone());
        for (descriptor, value) in layout.properties().iter().zip(values) {
            if let Some(index) = class.property_index(&descriptor.name) {
                if class.properties()[index].type_name == descriptor.type_name {
                    object.set_index(index, value);
                }
            }
        }
        Some(object)
    }

    // Shared objects

    pub fn write_shared_object(
        &mut self,
        writer: &mut dyn BitWrite,
        object: Option<&SharedObjectPointer>,
    ) -> Result<(), BitstreamError> {
        let Some(object) = object else {
            self.shared_object_writer.write_null(writer);
            return Ok(());
        };
        if !self.shared_object_writer.write_id(writer, object) {
            return Ok(());
        }
        object.id().ser(writer);
        object.origin_id().ser(writer);
        let reference = self
            .write_references
            .get(&object.origin_id())
            .and_then(Weak::upgrade)
            .filter(|reference| reference.object().class() == object.object().class());
        match reference {
            Some(reference) => {
                true.ser(writer);
                self.write_object_delta(writer, object.object(), reference.object())
            }
            None => {
                false.ser(writer);
                self.write_object(writer, Some(object.object()))
            }
        }
    }

    pub fn read_shared_object(
        &mut self,
        reader: &mut BitReader,
    ) -> Result<Option<SharedObjectPointer>, BitstreamError> {
        let offset = match self.shared_object_reader.read_id(reader)? {
            ReadId::Null => return Ok(None),
            ReadId::Existing(object) => return Ok(object),
            ReadId::New(offset) => offset,
        };
        let remote_id = u32::de(reader)?;
        let remote_origin_id = u32::de(reader)?;
        let delta = bool::de(reader)?;
        let reference = self
            .read_references
            .get(&remote_origin_id)
            .map(|(_, reference)| reference.clone());

        let object = if delta {
            let Some(reference) = reference.as_ref() else {
                return Err(BitstreamError::MissingDeltaReference {
                    id: remote_id,
                    origin_id: remote_origin_id,
                });
            };
            self.read_object_delta(reader, reference.object())?
        } else {
            self.read_object(reader)?
        };

        let existing = self
            .received_objects
            .get(&remote_id)
            .and_then(Weak::upgrade);
        let pointer = match existing {
            Some(existing) => Some(SharedObjectPointer(existing)),
            None => match object {
                Some(object) => {
                    let origin_id = reference.as_ref().map(|reference| reference.origin_id());
                    let pointer =
                        SharedObject::received(object, origin_id, remote_id, remote_origin_id);
                    self.received_objects
                        .insert(remote_id, pointer.downgrade());
                    Some(pointer)
                }
                None => None,
            },
        };
        self.shared_object_reader
            .insert_transient(offset, pointer.clone());
        Ok(pointer)
    }

    pub fn write_shared_object_set(
        &mut self,
        writer: &mut dyn BitWrite,
        set: &SharedObjectSet,
    ) -> Result<(), BitstreamError> {
        (set.len() as u32).ser(writer);
        for object in set.iter() {
            self.write_shared_object(writer, Some(object))?;
        }
        Ok(())
    }

    pub fn read_shared_object_set(
        &mut self,
        reader: &mut BitReader,
    ) -> Result<SharedObjectSet, BitstreamError> {
        let count = u32::de(reader)? as usize;
        if count > reader.bits_remaining() {
            return Err(SerdeErr.into());
        }
        let mut set = SharedObjectSet::new();
        for _ in 0..count {
            if let Some(object) = self.read_shared_object(reader)? {
                set.insert(object);
            }
        }
        Ok(set)
    }

    // Properties

    pub fn write_property(
        &mut self,
        writer: &mut dyn BitWrite,
        type_name: &str,
        value: &PropertyValue,
    ) -> Result<(), BitstreamError> {
        let streamer = self.protocol.types.streamer(type_name)?;
        streamer.write(self, writer, value)
    }

    pub fn read_property(
        &mut self,
        reader: &mut BitReader,
        type_name: &str,
    ) -> Result<PropertyValue, BitstreamError> {
        let streamer = self.protocol.types.streamer(type_name)?;
        streamer.read(self, reader)
    }
}
