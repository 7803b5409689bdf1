//! A small, bounds-checked DER reader.
//!
//! Only the subset of DER needed by the extension decoders is supported:
//! definite lengths, primitive strings, BOOLEAN, INTEGER, BIT STRING,
//! OBJECT IDENTIFIER and SEQUENCE. Every read checks its bounds against the
//! remaining input, so malformed payloads surface as errors instead of panics.

use const_oid::ObjectIdentifier;

use super::extensions::ExtensionDecodeError;

type Result<T> = std::result::Result<T, ExtensionDecodeError>;

pub const TAG_BOOLEAN: u32 = 0x01;
pub const TAG_INTEGER: u32 = 0x02;
pub const TAG_BIT_STRING: u32 = 0x03;
pub const TAG_OCTET_STRING: u32 = 0x04;
pub const TAG_OBJECT_IDENTIFIER: u32 = 0x06;
pub const TAG_SEQUENCE: u32 = 0x10;

/// Longest length-of-length accepted, in bytes.
const MAX_LENGTH_OCTETS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Class {
    Universal,
    Application,
    ContextSpecific,
    Private,
}

impl Class {
    fn from_identifier(byte: u8) -> Self {
        match byte >> 6 {
            0 => Class::Universal,
            1 => Class::Application,
            2 => Class::ContextSpecific,
            _ => Class::Private,
        }
    }
}

/// One decoded tag-length-value element.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tlv<'a> {
    pub class: Class,
    pub constructed: bool,
    pub number: u32,
    pub value: &'a [u8],
}

impl Tlv<'_> {
    fn is(&self, class: Class, constructed: bool, number: u32) -> bool {
        self.class == class && self.constructed == constructed && self.number == number
    }
}

#[derive(Debug, Clone)]
pub struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    fn read_byte(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.pos)
            .ok_or(ExtensionDecodeError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(ExtensionDecodeError::Truncated);
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn read_identifier(&mut self) -> Result<(Class, bool, u32)> {
        let first = self.read_byte()?;
        let class = Class::from_identifier(first);
        let constructed = first & 0x20 != 0;
        let low = u32::from(first & 0x1f);
        if low != 0x1f {
            return Ok((class, constructed, low));
        }

        // High-tag-number form: base-128, most significant group first.
        let mut number: u32 = 0;
        let mut first_group = true;
        loop {
            let byte = self.read_byte()?;
            if first_group && byte == 0x80 {
                return Err(ExtensionDecodeError::NonMinimalTag);
            }
            first_group = false;
            if number > (u32::MAX >> 7) {
                return Err(ExtensionDecodeError::TagTooLarge);
            }
            number = (number << 7) | u32::from(byte & 0x7f);
            if byte & 0x80 == 0 {
                break;
            }
        }
        if number < 0x1f {
            return Err(ExtensionDecodeError::NonMinimalTag);
        }
        Ok((class, constructed, number))
    }

    fn read_length(&mut self) -> Result<usize> {
        let first = self.read_byte()?;
        if first < 0x80 {
            return Ok(usize::from(first));
        }
        if first == 0x80 {
            return Err(ExtensionDecodeError::IndefiniteLength);
        }

        let count = usize::from(first & 0x7f);
        if count > MAX_LENGTH_OCTETS {
            return Err(ExtensionDecodeError::InvalidLength);
        }
        let octets = self.read_bytes(count)?;
        if octets[0] == 0 {
            return Err(ExtensionDecodeError::InvalidLength);
        }
        let len = octets
            .iter()
            .fold(0usize, |acc, byte| (acc << 8) | usize::from(*byte));
        if len < 0x80 {
            return Err(ExtensionDecodeError::InvalidLength);
        }
        Ok(len)
    }

    pub fn read_tlv(&mut self) -> Result<Tlv<'a>> {
        let (class, constructed, number) = self.read_identifier()?;
        let len = self.read_length()?;
        let value = self.read_bytes(len)?;
        Ok(Tlv {
            class,
            constructed,
            number,
            value,
        })
    }

    /// Reads the next element without consuming it.
    pub fn peek_tlv(&self) -> Result<Tlv<'a>> {
        self.clone().read_tlv()
    }

    /// Reads the next element, requiring the given universal tag.
    pub fn read_universal(&mut self, constructed: bool, number: u32) -> Result<&'a [u8]> {
        let tlv = self.read_tlv()?;
        if !tlv.is(Class::Universal, constructed, number) {
            return Err(ExtensionDecodeError::UnexpectedTag {
                expected: number,
                found: tlv.number,
            });
        }
        Ok(tlv.value)
    }

    /// True when the next element carries the given universal tag.
    pub fn next_is(&self, constructed: bool, number: u32) -> bool {
        self.peek_tlv()
            .map(|tlv| tlv.is(Class::Universal, constructed, number))
            .unwrap_or(false)
    }

    pub fn read_sequence(&mut self) -> Result<DerReader<'a>> {
        self.read_universal(true, TAG_SEQUENCE).map(DerReader::new)
    }

    pub fn read_boolean(&mut self) -> Result<bool> {
        match self.read_universal(false, TAG_BOOLEAN)? {
            [0x00] => Ok(false),
            [0xff] => Ok(true),
            _ => Err(ExtensionDecodeError::InvalidBoolean),
        }
    }

    /// Reads a minimally encoded INTEGER that fits in an `i64`.
    pub fn read_integer(&mut self) -> Result<i64> {
        let bytes = self.read_universal(false, TAG_INTEGER)?;
        match bytes {
            [] => return Err(ExtensionDecodeError::InvalidInteger),
            [0x00, next, ..] if next & 0x80 == 0 => {
                return Err(ExtensionDecodeError::InvalidInteger);
            }
            [0xff, next, ..] if next & 0x80 != 0 => {
                return Err(ExtensionDecodeError::InvalidInteger);
            }
            _ => {}
        }
        if bytes.len() > 8 {
            return Err(ExtensionDecodeError::IntegerTooLarge);
        }
        let seed: i64 = if bytes[0] & 0x80 != 0 { -1 } else { 0 };
        Ok(bytes
            .iter()
            .fold(seed, |acc, byte| (acc << 8) | i64::from(*byte)))
    }

    /// Reads a BIT STRING, returning the number of unused trailing bits and
    /// the data bytes.
    pub fn read_bit_string(&mut self) -> Result<(u8, &'a [u8])> {
        let bytes = self.read_universal(false, TAG_BIT_STRING)?;
        let (&unused, data) = bytes
            .split_first()
            .ok_or(ExtensionDecodeError::InvalidBitString)?;
        if unused > 7 || (data.is_empty() && unused != 0) {
            return Err(ExtensionDecodeError::InvalidBitString);
        }
        if let Some(last) = data.last() {
            let padding_mask = (1u8 << unused) - 1;
            if last & padding_mask != 0 {
                return Err(ExtensionDecodeError::InvalidBitString);
            }
        }
        Ok((unused, data))
    }

    pub fn read_oid(&mut self) -> Result<ObjectIdentifier> {
        let bytes = self.read_universal(false, TAG_OBJECT_IDENTIFIER)?;
        ObjectIdentifier::from_bytes(bytes)
            .map_err(|_| ExtensionDecodeError::InvalidObjectIdentifier)
    }

    /// Fails unless every byte has been consumed.
    pub fn finish(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ExtensionDecodeError::TrailingData)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_short_and_long_lengths() {
        let mut long = vec![0x04, 0x81, 0x80];
        long.extend(std::iter::repeat_n(0xaa, 0x80));
        let mut reader = DerReader::new(&long);
        let tlv = reader.read_tlv().unwrap();
        assert_eq!(tlv.value.len(), 0x80);
        assert!(reader.finish().is_ok());

        let mut reader = DerReader::new(&[0x04, 0x02, 0x01, 0x02]);
        assert_eq!(reader.read_tlv().unwrap().value, &[0x01, 0x02]);
    }

    #[test]
    fn rejects_non_minimal_and_indefinite_lengths() {
        assert_eq!(
            DerReader::new(&[0x04, 0x81, 0x01, 0x00]).read_tlv(),
            Err(ExtensionDecodeError::InvalidLength)
        );
        assert_eq!(
            DerReader::new(&[0x04, 0x82, 0x00, 0x90]).read_tlv(),
            Err(ExtensionDecodeError::InvalidLength)
        );
        assert_eq!(
            DerReader::new(&[0x30, 0x80, 0x00, 0x00]).read_tlv(),
            Err(ExtensionDecodeError::IndefiniteLength)
        );
        assert_eq!(
            DerReader::new(&[0x04, 0x85, 1, 1, 1, 1, 1]).read_tlv(),
            Err(ExtensionDecodeError::InvalidLength)
        );
    }

    #[test]
    fn length_beyond_input_is_truncated() {
        assert_eq!(
            DerReader::new(&[0x04, 0x05, 0x01]).read_tlv(),
            Err(ExtensionDecodeError::Truncated)
        );
        assert_eq!(
            DerReader::new(&[0x04, 0x84, 0xff, 0xff, 0xff, 0xff]).read_tlv(),
            Err(ExtensionDecodeError::Truncated)
        );
        assert_eq!(
            DerReader::new(&[]).read_tlv(),
            Err(ExtensionDecodeError::Truncated)
        );
    }

    #[test]
    fn high_tag_numbers() {
        let tlv = DerReader::new(&[0x9f, 0x63, 0x00]).read_tlv().unwrap();
        assert_eq!(tlv.class, Class::ContextSpecific);
        assert_eq!(tlv.number, 99);

        let tlv = DerReader::new(&[0xbf, 0x81, 0x00, 0x00]).read_tlv().unwrap();
        assert!(tlv.constructed);
        assert_eq!(tlv.number, 128);

        assert_eq!(
            DerReader::new(&[0x9f, 0x05, 0x00]).read_tlv(),
            Err(ExtensionDecodeError::NonMinimalTag)
        );
        assert_eq!(
            DerReader::new(&[0x9f, 0x80, 0x01, 0x00]).read_tlv(),
            Err(ExtensionDecodeError::NonMinimalTag)
        );
        assert_eq!(
            DerReader::new(&[0x9f, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f, 0x00]).read_tlv(),
            Err(ExtensionDecodeError::TagTooLarge)
        );
    }

    #[test]
    fn integers() {
        let read = |bytes: &[u8]| DerReader::new(bytes).read_integer();
        assert_eq!(read(&[0x02, 0x01, 0x00]), Ok(0));
        assert_eq!(read(&[0x02, 0x01, 0x7f]), Ok(127));
        assert_eq!(read(&[0x02, 0x02, 0x00, 0x80]), Ok(128));
        assert_eq!(read(&[0x02, 0x01, 0xff]), Ok(-1));
        assert_eq!(read(&[0x02, 0x00]), Err(ExtensionDecodeError::InvalidInteger));
        assert_eq!(
            read(&[0x02, 0x02, 0x00, 0x01]),
            Err(ExtensionDecodeError::InvalidInteger)
        );
        assert_eq!(
            read(&[0x02, 0x09, 0x01, 0, 0, 0, 0, 0, 0, 0, 0]),
            Err(ExtensionDecodeError::IntegerTooLarge)
        );
    }

    #[test]
    fn booleans_must_be_canonical() {
        assert_eq!(DerReader::new(&[0x01, 0x01, 0xff]).read_boolean(), Ok(true));
        assert_eq!(DerReader::new(&[0x01, 0x01, 0x00]).read_boolean(), Ok(false));
        assert_eq!(
            DerReader::new(&[0x01, 0x01, 0x01]).read_boolean(),
            Err(ExtensionDecodeError::InvalidBoolean)
        );
        assert_eq!(
            DerReader::new(&[0x01, 0x02, 0xff, 0xff]).read_boolean(),
            Err(ExtensionDecodeError::InvalidBoolean)
        );
    }

    #[test]
    fn bit_string_padding() {
        assert_eq!(
            DerReader::new(&[0x03, 0x02, 0x02, 0x84]).read_bit_string(),
            Ok((2, &[0x84][..]))
        );
        assert_eq!(
            DerReader::new(&[0x03, 0x02, 0x02, 0x85]).read_bit_string(),
            Err(ExtensionDecodeError::InvalidBitString)
        );
        assert_eq!(
            DerReader::new(&[0x03, 0x01, 0x01]).read_bit_string(),
            Err(ExtensionDecodeError::InvalidBitString)
        );
        assert_eq!(
            DerReader::new(&[0x03, 0x02, 0x08, 0x00]).read_bit_string(),
            Err(ExtensionDecodeError::InvalidBitString)
        );
    }

    #[test]
    fn wrong_tag_is_reported() {
        assert_eq!(
            DerReader::new(&[0x04, 0x00]).read_sequence().map(|_| ()),
            Err(ExtensionDecodeError::UnexpectedTag {
                expected: TAG_SEQUENCE,
                found: 0x04
            })
        );
    }
}
