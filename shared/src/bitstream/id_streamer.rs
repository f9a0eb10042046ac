use metavoxel_serde::{BitReader, BitWrite, SerdeErr};

/// Streams ids that are either already known to the other side or exactly one
/// more than the highest id seen so far, using the minimum number of bits.
#[derive(Debug, Clone)]
pub struct IdStreamer {
    bits: u8,
}

impl Default for IdStreamer {
    fn default() -> Self {
        Self::new()
    }
}

impl IdStreamer {
    pub fn new() -> Self {
        Self { bits: 1 }
    }

    pub fn bits(&self) -> u8 {
        self.bits
    }

    /// Sets the width to the smallest that can carry `value + 1`
    pub fn set_bits_from_value(&mut self, value: u32) {
        self.bits = (u32::BITS - (value + 1).leading_zeros()) as u8;
    }

    pub fn write(&mut self, writer: &mut dyn BitWrite, value: u32) {
        writer.write_bits(u64::from(value), self.bits);
        self.grow_after(value);
    }

    pub fn read(&mut self, reader: &mut BitReader) -> Result<u32, SerdeErr> {
        let value = reader.read_bits(self.bits)? as u32;
        self.grow_after(value);
        Ok(value)
    }

    fn grow_after(&mut self, value: u32) {
        if u64::from(value) == (1u64 << self.bits) - 1 {
            self.bits += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use metavoxel_serde::{BitReader, BitWriter};

    use super::IdStreamer;

    #[test]
    fn width_grows_on_highest_value() {
        let mut streamer = IdStreamer::new();
        let mut writer = BitWriter::new();

        streamer.write(&mut writer, 0);
        assert_eq!(streamer.bits(), 1);
        streamer.write(&mut writer, 1);
        assert_eq!(streamer.bits(), 2);
        streamer.write(&mut writer, 2);
        assert_eq!(streamer.bits(), 2);
        streamer.write(&mut writer, 3);
        assert_eq!(streamer.bits(), 3);
        assert_eq!(writer.bits_written(), 1 + 1 + 2 + 2);
    }

    #[test]
    fn reader_tracks_writer() {
        let ids = [1u32, 2, 1, 3, 4, 2, 5, 6, 7, 8];

        let mut writer = BitWriter::new();
        let mut write_streamer = IdStreamer::new();
        for id in ids {
            write_streamer.write(&mut writer, id);
        }

        let bytes = writer.to_bytes();
        let mut reader = BitReader::new(&bytes);
        let mut read_streamer = IdStreamer::new();
        for id in ids {
            assert_eq!(read_streamer.read(&mut reader).unwrap(), id);
        }
        assert_eq!(read_streamer.bits(), write_streamer.bits());
    }

    #[test]
    fn bits_from_value() {
        let mut streamer = IdStreamer::new();
        for (value, bits) in [(0u32, 1u8), (1, 2), (2, 2), (3, 3), (6, 3), (7, 4), (300, 9)] {
            streamer.set_bits_from_value(value);
            assert_eq!(streamer.bits(), bits, "value {}", value);
        }
    }
}
