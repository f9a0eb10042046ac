use std::{collections::HashMap, hash::Hash};

use metavoxel_serde::{BitReader, BitWrite, SerdeErr};

use super::id_streamer::IdStreamer;

/// Write half of a repeated value streamer. A value is sent in full the first
/// time it appears in a packet, then only by id. Ids handed out within a packet
/// are transient until the packet is acknowledged and its offsets persisted.
pub struct RepeatedValueWriter<K: Eq + Hash + Clone> {
    id_streamer: IdStreamer,
    last_persistent_id: u32,
    last_transient_offset: u32,
    persistent_ids: HashMap<K, u32>,
    transient_offsets: HashMap<K, u32>,
}

impl<K: Eq + Hash + Clone> Default for RepeatedValueWriter<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Eq + Hash + Clone> RepeatedValueWriter<K> {
    pub fn new() -> Self {
        Self {
            id_streamer: IdStreamer::new(),
            last_persistent_id: 0,
            last_transient_offset: 0,
            persistent_ids: HashMap::new(),
            transient_offsets: HashMap::new(),
        }
    }

    pub fn write_null(&mut self, writer: &mut dyn BitWrite) {
        self.id_streamer.write(writer, 0);
    }

    /// Writes the id for `key`, returning true if the full value must follow
    pub fn write_id(&mut self, writer: &mut dyn BitWrite, key: &K) -> bool {
        if let Some(id) = self.persistent_ids.get(key) {
            let id = *id;
            self.id_streamer.write(writer, id);
            return false;
        }
        if let Some(offset) = self.transient_offsets.get(key) {
            let id = self.last_persistent_id + *offset;
            self.id_streamer.write(writer, id);
            return false;
        }
        self.last_transient_offset += 1;
        let offset = self.last_transient_offset;
        self.transient_offsets.insert(key.clone(), offset);
        self.id_streamer
            .write(writer, self.last_persistent_id + offset);
        true
    }

    pub fn get_and_reset_transient_offsets(&mut self) -> HashMap<K, u32> {
        self.last_transient_offset = 0;
        self.id_streamer.set_bits_from_value(self.last_persistent_id);
        std::mem::take(&mut self.transient_offsets)
    }

    /// Keys returned are those that were newly assigned a persistent id
    pub fn persist_transient_offsets(&mut self, offsets: &HashMap<K, u32>) -> Vec<K> {
        let old_last_persistent_id = self.last_persistent_id;
        let mut persisted = Vec::new();
        for (key, offset) in offsets {
            if self.persistent_ids.contains_key(key) {
                continue;
            }
            let id = old_last_persistent_id + offset;
            self.persistent_ids.insert(key.clone(), id);
            self.last_persistent_id = self.last_persistent_id.max(id);
            persisted.push(key.clone());
        }
        self.id_streamer.set_bits_from_value(self.last_persistent_id);
        persisted
    }

    pub fn persistent_id(&self, key: &K) -> Option<u32> {
        self.persistent_ids.get(key).copied()
    }

    pub fn take_persistent_id(&mut self, key: &K) -> Option<u32> {
        self.persistent_ids.remove(key)
    }

    pub fn persistent_keys(&self) -> impl Iterator<Item = &K> {
        self.persistent_ids.keys()
    }

    pub fn last_persistent_id(&self) -> u32 {
        self.last_persistent_id
    }
}

/// Result of reading an id from a `RepeatedValueReader`
pub enum ReadId<V> {
    Null,
    Existing(V),
    /// The full value follows and should be inserted under this offset
    New(u32),
}

/// Read half of a repeated value streamer
pub struct RepeatedValueReader<V: Clone> {
    id_streamer: IdStreamer,
    last_persistent_id: u32,
    persistent_values: HashMap<u32, V>,
    transient_values: HashMap<u32, V>,
}

impl<V: Clone> Default for RepeatedValueReader<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: Clone> RepeatedValueReader<V> {
    pub fn new() -> Self {
        Self {
            id_streamer: IdStreamer::new(),
            last_persistent_id: 0,
            persistent_values: HashMap::new(),
            transient_values: HashMap::new(),
        }
    }

    pub fn read_id(&mut self, reader: &mut BitReader) -> Result<ReadId<V>, SerdeErr> {
        let id = self.id_streamer.read(reader)?;
        if id == 0 {
            return Ok(ReadId::Null);
        }
        if id <= self.last_persistent_id {
            return match self.persistent_values.get(&id) {
                Some(value) => Ok(ReadId::Existing(value.clone())),
                None => Err(SerdeErr),
            };
        }
        let offset = id - self.last_persistent_id;
        match self.transient_values.get(&offset) {
            Some(value) => Ok(ReadId::Existing(value.clone())),
            None => Ok(ReadId::New(offset)),
        }
    }

    pub fn insert_transient(&mut self, offset: u32, value: V) {
        self.transient_values.insert(offset, value);
    }

    pub fn get_and_reset_transient_values(&mut self) -> HashMap<u32, V> {
        self.id_streamer.set_bits_from_value(self.last_persistent_id);
        std::mem::take(&mut self.transient_values)
    }

    /// Returns the persistent ids assigned, paired with their values
    pub fn persist_transient_values(&mut self, values: &HashMap<u32, V>) -> Vec<(u32, V)> {
        let old_last_persistent_id = self.last_persistent_id;
        let mut persisted = Vec::with_capacity(values.len());
        for (offset, value) in values {
            let id = old_last_persistent_id + offset;
            self.persistent_values.insert(id, value.clone());
            self.last_persistent_id = self.last_persistent_id.max(id);
            persisted.push((id, value.clone()));
        }
        self.id_streamer.set_bits_from_value(self.last_persistent_id);
        persisted
    }

    pub fn take_persistent_value(&mut self, id: u32) -> Option<V> {
        self.persistent_values.remove(&id)
    }

    pub fn last_persistent_id(&self) -> u32 {
        self.last_persistent_id
    }
}
