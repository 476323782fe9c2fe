use core::fmt;

use crate::Error;

const BYTE_BITS: u32 = 8;
const BYTE_MASK: u32 = 0xFF;

/// A 32 bit word addressed by bit, byte or bit range.
///
/// Entry tables pack their flags into such a word. It is only held while a
/// record is being decoded; entries keep the resulting booleans instead.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct BitField(u32);

impl BitField {
    pub const BITS: u32 = u32::BITS;

    pub fn new(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn bit(&self, index: u32) -> Result<bool, Error> {
        check(index, Self::BITS - 1)?;
        let mask = 1 << index;
        Ok(self.0 & mask == mask)
    }

    pub fn set_bit(&mut self, index: u32, value: bool) -> Result<(), Error> {
        check(index, Self::BITS - 1)?;
        let mask = 1 << index;
        if value {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
        Ok(())
    }

    pub fn byte(&self, index: u32) -> Result<u8, Error> {
        check(index, 3)?;
        Ok(((self.0 >> (index * BYTE_BITS)) & BYTE_MASK) as u8)
    }

    pub fn set_byte(&mut self, index: u32, value: u8) -> Result<(), Error> {
        check(index, 3)?;
        let shift = index * BYTE_BITS;
        self.0 &= !(BYTE_MASK << shift);
        self.0 |= (value as u32) << shift;
        Ok(())
    }

    /// Extract `length` bits starting at bit `start`
    pub fn range(&self, start: u32, length: u32) -> Result<u32, Error> {
        if length == 0 {
            return Ok(0);
        }
        let mask = range_mask(start, length)?;
        Ok((self.0 >> start) & mask)
    }

    /// Replace `length` bits starting at bit `start` with the low bits of `value`
    pub fn set_range(&mut self, start: u32, length: u32, value: u32) -> Result<(), Error> {
        if length == 0 {
            return Ok(());
        }
        let mask = range_mask(start, length)?;
        self.0 &= !(mask << start);
        self.0 |= (value & mask) << start;
        Ok(())
    }
}

impl From<u32> for BitField {
    fn from(bits: u32) -> Self {
        Self(bits)
    }
}

impl From<BitField> for u32 {
    fn from(field: BitField) -> u32 {
        field.0
    }
}

impl fmt::Display for BitField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:032b}", self.0)
    }
}

fn check(index: u32, max: u32) -> Result<(), Error> {
    if index > max {
        return Err(Error::OutOfRange { index, max });
    }
    Ok(())
}

fn range_mask(start: u32, length: u32) -> Result<u32, Error> {
    check(start, BitField::BITS - 1)?;
    check(length, BitField::BITS)?;
    let end = start + length;
    check(end, BitField::BITS)?;
    Ok(((1u64 << length) - 1) as u32)
}
