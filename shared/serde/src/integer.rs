use crate::{BitReader, BitWrite, ConstBitLength, Serde, SerdeErr};

pub type UnsignedInteger<const BITS: u8> = SerdeInteger<false, BITS>;
pub type UnsignedVariableInteger<const BITS: u8> = SerdeInteger<true, BITS>;

/// An unsigned integer written with a fixed number of bits, or, when
/// VARIABLE, as a chain of BITS-wide groups each preceded by a continue bit
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub struct SerdeInteger<const VARIABLE: bool, const BITS: u8> {
    value: u64,
}

impl<const VARIABLE: bool, const BITS: u8> SerdeInteger<VARIABLE, BITS> {
    /// # Panics
    ///
    /// Panics if a fixed-width integer cannot hold `value`
    pub fn new<T: Into<u64>>(value: T) -> Self {
        let value = value.into();
        if BITS == 0 || BITS > 63 {
            panic!("can't create an integer with {} bits", BITS);
        }
        if !VARIABLE && value >= (1u64 << BITS) {
            panic!("with {} bits, can't encode number {}", BITS, value);
        }
        Self { value }
    }

    pub fn get(&self) -> u64 {
        self.value
    }
}

impl<const VARIABLE: bool, const BITS: u8> Serde for SerdeInteger<VARIABLE, BITS> {
    fn ser(&self, writer: &mut dyn BitWrite) {
        if !VARIABLE {
            writer.write_bits(self.value, BITS);
            return;
        }
        let mut value = self.value;
        loop {
            let proceed = value >= (1u64 << BITS);
            writer.write_bit(proceed);
            writer.write_bits(value, BITS);
            value >>= BITS;
            if !proceed {
                return;
            }
        }
    }

    fn de(reader: &mut BitReader) -> Result<Self, SerdeErr> {
        if !VARIABLE {
            let value = reader.read_bits(BITS)?;
            return Ok(Self { value });
        }
        let mut value: u64 = 0;
        let mut shift: u32 = 0;
        loop {
            let proceed = reader.read_bit()?;
            let group = reader.read_bits(BITS)?;
            if shift >= 64 {
                return Err(SerdeErr);
            }
            value |= group << shift;
            shift += u32::from(BITS);
            if !proceed {
                return Ok(Self { value });
            }
        }
    }

    fn bit_length(&self) -> u32 {
        if !VARIABLE {
            return u32::from(BITS);
        }
        let mut output = 0;
        let mut value = self.value;
        loop {
            output += 1 + u32::from(BITS);
            if value < (1u64 << BITS) {
                return output;
            }
            value >>= BITS;
        }
    }
}

impl<const BITS: u8> ConstBitLength for SerdeInteger<false, BITS> {
    fn const_bit_length() -> u32 {
        u32::from(BITS)
    }
}
