//! Application and Context Tag Header Codec
//!
//! Every BACnet-encoded element begins with a tag header:
//!
//! ```text
//! byte 0:   [ tag number/4 bits | class bit | length-or-value/3 bits ]
//! byte 1:   [ extended tag number ]            (present iff top nibble == 0xF)
//! byte 1/2: [ extended length: 1, 3, or 5 bytes ] (present iff low 3 bits == 5)
//! ```
//!
//! Application tag numbers never exceed 15 (they select one of the 16
//! primitive types in [`ApplicationTag`]), so the extended-tag-number
//! form only ever appears on context tags, where the tag number is a
//! property-specific index that can run arbitrarily high.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use super::{EncodingError, Result};

/// BACnet application tag numbers (ASHRAE 135 Table 20-1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ApplicationTag {
    Null = 0,
    Boolean = 1,
    UnsignedInt = 2,
    SignedInt = 3,
    Real = 4,
    Double = 5,
    OctetString = 6,
    CharacterString = 7,
    BitString = 8,
    Enumerated = 9,
    Date = 10,
    Time = 11,
    ObjectIdentifier = 12,
    Reserved13 = 13,
    Reserved14 = 14,
    Reserved15 = 15,
}

impl TryFrom<u8> for ApplicationTag {
    type Error = EncodingError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::Null,
            1 => Self::Boolean,
            2 => Self::UnsignedInt,
            3 => Self::SignedInt,
            4 => Self::Real,
            5 => Self::Double,
            6 => Self::OctetString,
            7 => Self::CharacterString,
            8 => Self::BitString,
            9 => Self::Enumerated,
            10 => Self::Date,
            11 => Self::Time,
            12 => Self::ObjectIdentifier,
            13 => Self::Reserved13,
            14 => Self::Reserved14,
            15 => Self::Reserved15,
            _ => return Err(EncodingError::InvalidTag),
        })
    }
}

/// Whether a decoded tag is an application tag (type is implicit in
/// the tag number) or a context tag (type is implied by the
/// surrounding constructed value; the tag number is just a slot
/// index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagClass {
    Application,
    Context,
}

/// A fully-decoded tag header: which slot/type it names, whether it's
/// an opening/closing bracket for a constructed value, and the
/// length-or-value carried in the header (meaningless for
/// opening/closing tags).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagHeader {
    pub number: u32,
    pub class: TagClass,
    pub length_value: usize,
    pub is_opening: bool,
    pub is_closing: bool,
}

/// Encode a generic tag header. Returns the byte count written (or
/// that would have been written, if `buf` is `None`).
pub fn encode_tag(buf: Option<&mut Vec<u8>>, number: u32, class: TagClass, length: usize) -> usize {
    let mut scratch = Vec::new();
    let out = buf.unwrap_or(&mut scratch);
    let start_len = out.len();

    let class_bit = match class {
        TagClass::Application => 0x00,
        TagClass::Context => 0x08,
    };

    let (tag_nibble, needs_extended_number) = if number <= 14 {
        ((number as u8) << 4, false)
    } else {
        (0xF0, true)
    };

    let length_bits = if length < 5 { length as u8 } else { 5 };
    out.push(tag_nibble | class_bit | length_bits);

    if needs_extended_number {
        // Extended tag numbers wider than a byte are not needed by any
        // BACnet property context this crate encodes; truncate rather
        // than silently lose class/opening-bit information.
        out.push(number as u8);
    }

    if length >= 5 {
        if length < 254 {
            out.push(length as u8);
        } else if length < 65536 {
            out.push(254);
            out.extend_from_slice(&(length as u16).to_be_bytes());
        } else {
            out.push(255);
            out.extend_from_slice(&(length as u32).to_be_bytes());
        }
    }

    out.len() - start_len
}

/// Encode an opening tag (brackets a constructed/context value).
pub fn encode_opening_tag(buf: Option<&mut Vec<u8>>, number: u32) -> usize {
    let mut scratch = Vec::new();
    let out = buf.unwrap_or(&mut scratch);
    let start_len = out.len();
    if number <= 14 {
        out.push(0x08 | ((number as u8) << 4) | 0x06);
    } else {
        out.push(0x08 | 0xF0 | 0x06);
        out.push(number as u8);
    }
    out.len() - start_len
}

/// Encode a closing tag matching an earlier [`encode_opening_tag`].
pub fn encode_closing_tag(buf: Option<&mut Vec<u8>>, number: u32) -> usize {
    let mut scratch = Vec::new();
    let out = buf.unwrap_or(&mut scratch);
    let start_len = out.len();
    if number <= 14 {
        out.push(0x08 | ((number as u8) << 4) | 0x07);
    } else {
        out.push(0x08 | 0xF0 | 0x07);
        out.push(number as u8);
    }
    out.len() - start_len
}

/// Decode a tag header from the front of `data`. Returns the header
/// and the number of bytes consumed. Never reads past `data.len()`.
pub fn decode_tag(data: &[u8]) -> Result<(TagHeader, usize)> {
    if data.is_empty() {
        return Err(EncodingError::UnexpectedEndOfData);
    }

    let first = data[0];
    let class = if first & 0x08 != 0 {
        TagClass::Context
    } else {
        TagClass::Application
    };

    let mut consumed = 1usize;
    let mut number = ((first >> 4) & 0x0F) as u32;

    if number == 0x0F {
        if data.len() < consumed + 1 {
            return Err(EncodingError::BufferUnderflow);
        }
        number = data[consumed] as u32;
        consumed += 1;
    }

    let length_field = first & 0x07;
    // Opening/closing tags are only meaningful for context-class tags;
    // application-class data never uses 6/7 as a length nibble because
    // every application type has length < 5 or uses the extended-length
    // escape (5).
    let is_opening = class == TagClass::Context && length_field == 6;
    let is_closing = class == TagClass::Context && length_field == 7;

    let length_value = if is_opening || is_closing {
        0
    } else if length_field < 5 {
        length_field as usize
    } else {
        if data.len() < consumed + 1 {
            return Err(EncodingError::BufferUnderflow);
        }
        let len_byte = data[consumed];
        consumed += 1;
        if len_byte < 254 {
            len_byte as usize
        } else if len_byte == 254 {
            if data.len() < consumed + 2 {
                return Err(EncodingError::BufferUnderflow);
            }
            let v = u16::from_be_bytes([data[consumed], data[consumed + 1]]) as usize;
            consumed += 2;
            v
        } else {
            if data.len() < consumed + 4 {
                return Err(EncodingError::BufferUnderflow);
            }
            let v = u32::from_be_bytes([
                data[consumed],
                data[consumed + 1],
                data[consumed + 2],
                data[consumed + 3],
            ]) as usize;
            consumed += 4;
            v
        }
    };

    Ok((
        TagHeader {
            number,
            class,
            length_value,
            is_opening,
            is_closing,
        },
        consumed,
    ))
}

/// `true` iff `byte` is the first byte of a context opening tag.
pub fn is_opening_tag_byte(byte: u8) -> bool {
    (byte & 0x08 != 0) && (byte & 0x07 == 6)
}

/// `true` iff `byte` is the first byte of a context closing tag.
pub fn is_closing_tag_byte(byte: u8) -> bool {
    (byte & 0x08 != 0) && (byte & 0x07 == 7)
}

/// Encode an application-class tag header for `tag` carrying a value
/// of `length` bytes.
pub fn encode_application_tag(buf: Option<&mut Vec<u8>>, tag: ApplicationTag, length: usize) -> usize {
    encode_tag(buf, tag as u8 as u32, TagClass::Application, length)
}

/// Decode an application-class tag header, rejecting context tags.
pub fn decode_application_tag(data: &[u8]) -> Result<(ApplicationTag, usize, usize)> {
    let (header, consumed) = decode_tag(data)?;
    if header.class != TagClass::Application {
        return Err(EncodingError::InvalidTag);
    }
    let tag = ApplicationTag::try_from(header.number as u8)?;
    Ok((tag, header.length_value, consumed))
}

/// Encode a context-class tag header for `tag_number` carrying a
/// value of `length` bytes.
pub fn encode_context_tag(buf: Option<&mut Vec<u8>>, tag_number: u8, length: usize) -> usize {
    encode_tag(buf, tag_number as u32, TagClass::Context, length)
}

/// Decode a context-class tag header, rejecting application tags and
/// opening/closing brackets, and verifying `tag_number` matches.
pub fn decode_context_tag(data: &[u8], expected_number: u8) -> Result<(usize, usize)> {
    let (header, consumed) = decode_tag(data)?;
    if header.class != TagClass::Context || header.is_opening || header.is_closing {
        return Err(EncodingError::InvalidTag);
    }
    if header.number != expected_number as u32 {
        return Err(EncodingError::InvalidTag);
    }
    Ok((header.length_value, consumed))
}
