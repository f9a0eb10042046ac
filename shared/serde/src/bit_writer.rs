pub trait BitWrite {
    fn write_bit(&mut self, bit: bool);
    fn write_byte(&mut self, byte: u8);
    fn count_bits(&mut self, bits: u32);
    fn is_counter(&self) -> bool;

    /// Writes the lowest `bits` bits of `value`, least significant bit first.
    fn write_bits(&mut self, mut value: u64, bits: u8) {
        for _ in 0..bits {
            self.write_bit(value & 1 != 0);
            value >>= 1;
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.write_byte(*byte);
        }
    }
}

/// A BitWrite implementation backed by a growable buffer.
/// Bits fill each byte starting from its least significant bit; a partially
/// filled byte is held in scratch until it completes or the writer is flushed.
pub struct BitWriter {
    scratch: u8,
    scratch_index: u8,
    buffer: Vec<u8>,
    bits_written: u32,
}

impl Default for BitWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitWriter {
    pub fn new() -> Self {
        Self::with_capacity(512)
    }

    pub fn with_capacity(bytes: usize) -> Self {
        Self {
            scratch: 0,
            scratch_index: 0,
            buffer: Vec::with_capacity(bytes),
            bits_written: 0,
        }
    }

    /// Pads the partially written byte, if any, so that the next write starts
    /// on a byte boundary
    pub fn flush(&mut self) {
        if self.scratch_index > 0 {
            let byte = (self.scratch << (8 - self.scratch_index)).reverse_bits();
            self.buffer.push(byte);
            self.bits_written += u32::from(8 - self.scratch_index);
            self.scratch = 0;
            self.scratch_index = 0;
        }
    }

    pub fn to_bytes(mut self) -> Vec<u8> {
        self.flush();
        self.buffer
    }

    pub fn bits_written(&self) -> u32 {
        self.bits_written
    }

    /// Bytes occupied so far, counting a partially written byte as whole
    pub fn bytes_written(&self) -> usize {
        self.buffer.len() + usize::from(self.scratch_index > 0)
    }
}

impl BitWrite for BitWriter {
    fn write_bit(&mut self, bit: bool) {
        self.scratch <<= 1;

        if bit {
            self.scratch |= 1;
        }

        self.scratch_index += 1;
        self.bits_written += 1;

        if self.scratch_index >= 8 {
            self.buffer.push(self.scratch.reverse_bits());
            self.scratch_index = 0;
            self.scratch = 0;
        }
    }

    fn write_byte(&mut self, byte: u8) {
        if self.scratch_index == 0 {
            self.buffer.push(byte);
            self.bits_written += 8;
            return;
        }
        self.write_bits(u64::from(byte), 8);
    }

    fn count_bits(&mut self, _bits: u32) {}

    fn is_counter(&self) -> bool {
        false
    }
}

/// A BitWrite implementation that only measures how many bits would be written
pub struct BitCounter {
    count: u32,
}

impl Default for BitCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl BitCounter {
    pub fn new() -> Self {
        Self { count: 0 }
    }

    pub fn bits_needed(&self) -> u32 {
        self.count
    }
}

impl BitWrite for BitCounter {
    fn write_bit(&mut self, _bit: bool) {
        self.count += 1;
    }

    fn write_byte(&mut self, _byte: u8) {
        self.count += 8;
    }

    fn count_bits(&mut self, bits: u32) {
        self.count += bits;
    }

    fn is_counter(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_byte() {
        let mut writer = BitWriter::new();

        writer.write_byte(0b10101010);

        let bytes = writer.to_bytes();
        assert_eq!(bytes.len(), 1);
        assert_eq!(bytes[0], 0b10101010);
    }

    #[test]
    fn bits_fill_from_least_significant() {
        let mut writer = BitWriter::new();

        writer.write_bit(false);
        writer.write_bit(true);
        writer.write_bit(false);
        writer.write_bit(true);
        writer.write_bit(false);
        writer.write_bit(true);
        writer.write_bit(false);
        writer.write_bit(true);

        let bytes = writer.to_bytes();
        assert_eq!(bytes.len(), 1);
        assert_eq!(bytes[0], 0b10101010);
    }

    #[test]
    fn unaligned_byte_spans_two_bytes() {
        let mut writer = BitWriter::new();

        writer.write_bit(true);
        writer.write_byte(0xFF);

        assert_eq!(writer.bits_written(), 9);
        assert_eq!(writer.bytes_written(), 2);
        let bytes = writer.to_bytes();
        assert_eq!(bytes, vec![0xFF, 0x01]);
    }

    #[test]
    fn flush_pads_partial_byte() {
        let mut writer = BitWriter::new();

        writer.write_bits(0b101, 3);
        writer.flush();
        writer.write_byte(0x7E);

        assert_eq!(writer.bits_written(), 16);
        assert_eq!(writer.to_bytes(), vec![0b101, 0x7E]);
    }

    #[test]
    fn large_buffer_grows() {
        let mut writer = BitWriter::new();

        for _ in 0..10_000 {
            writer.write_byte(0xFF);
        }

        let bytes = writer.to_bytes();
        assert_eq!(bytes.len(), 10_000);
        assert!(bytes.iter().all(|&b| b == 0xFF));
    }

    #[test]
    fn counter_matches_writer() {
        let mut writer = BitWriter::new();
        let mut counter = BitCounter::new();

        let targets: [&mut dyn BitWrite; 2] = [&mut writer, &mut counter];
        for target in targets {
            target.write_bit(true);
            target.write_bits(77, 7);
            target.write_bytes(&[1, 2, 3]);
        }

        assert_eq!(writer.bits_written(), counter.bits_needed());
        assert!(counter.is_counter());
    }
}
