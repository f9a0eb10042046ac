use crate::SerdeErr;

/// Reads bits in the order a `BitWriter` produced them
pub struct BitReader<'b> {
    buffer: &'b [u8],
    bit_index: usize,
}

impl<'b> BitReader<'b> {
    pub fn new(buffer: &'b [u8]) -> Self {
        Self {
            buffer,
            bit_index: 0,
        }
    }

    pub fn read_bit(&mut self) -> Result<bool, SerdeErr> {
        let byte = self.buffer.get(self.bit_index / 8).ok_or(SerdeErr)?;
        let bit = (byte >> (self.bit_index % 8)) & 1 != 0;
        self.bit_index += 1;
        Ok(bit)
    }

    pub fn read_byte(&mut self) -> Result<u8, SerdeErr> {
        if self.bit_index % 8 == 0 {
            let byte = *self.buffer.get(self.bit_index / 8).ok_or(SerdeErr)?;
            self.bit_index += 8;
            return Ok(byte);
        }
        Ok(self.read_bits(8)? as u8)
    }

    /// Reads `bits` bits, least significant first
    pub fn read_bits(&mut self, bits: u8) -> Result<u64, SerdeErr> {
        if self.bits_remaining() < usize::from(bits) {
            return Err(SerdeErr);
        }
        let mut value: u64 = 0;
        for index in 0..bits {
            if self.read_bit()? {
                value |= 1u64 << index;
            }
        }
        Ok(value)
    }

    pub fn read_bytes(&mut self, length: usize) -> Result<Vec<u8>, SerdeErr> {
        if self.bits_remaining() < length * 8 {
            return Err(SerdeErr);
        }
        let mut output = Vec::with_capacity(length);
        for _ in 0..length {
            output.push(self.read_byte()?);
        }
        Ok(output)
    }

    /// Skips to the start of the next byte, mirroring `BitWriter::flush`
    pub fn align(&mut self) {
        self.bit_index = self.bit_index.div_ceil(8) * 8;
    }

    pub fn bits_read(&self) -> usize {
        self.bit_index
    }

    pub fn bits_remaining(&self) -> usize {
        (self.buffer.len() * 8).saturating_sub(self.bit_index)
    }
}
