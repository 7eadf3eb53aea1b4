//! Application-Tagged Primitive Codecs
//!
//! One `encode_*`/`decode_*` pair per BACnet primitive data type
//! (ASHRAE 135 Clause 20.2). Every encoder writes its own application
//! tag header followed by the value payload, and follows the
//! size-probe idiom documented in [`super`].

#[cfg(not(feature = "std"))]
use alloc::{format, string::String, vec::Vec};

#[cfg(feature = "std")]
use std::format;

use super::tag::{decode_application_tag, encode_application_tag, ApplicationTag};
use super::{EncodingError, Result};

/// Character string encodings BACnet recognizes (ASHRAE 135 Clause
/// 20.2.9). Only ANSI X3.4 (ASCII-compatible) and UTF-8 are produced
/// by this crate; the others are accepted on decode for
/// interoperability with field devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CharacterStringEncoding {
    AnsiX34 = 0,
    Utf8 = 1,
    Dbcs = 2,
    Jis = 3,
    Ucs4 = 4,
    Ucs2 = 5,
    Iso8859_1 = 6,
}

impl TryFrom<u8> for CharacterStringEncoding {
    type Error = EncodingError;

    fn try_from(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Self::AnsiX34,
            1 => Self::Utf8,
            2 => Self::Dbcs,
            3 => Self::Jis,
            4 => Self::Ucs4,
            5 => Self::Ucs2,
            6 => Self::Iso8859_1,
            _ => return Err(EncodingError::InvalidFormat(format!(
                "unknown character string encoding byte {value}"
            ))),
        })
    }
}

// -- boolean -----------------------------------------------------------

/// Booleans are stored *in* the tag header's length-or-value field (0
/// or 1), with no payload byte, per ASHRAE 135 20.2.3.
pub fn encode_boolean(buf: Option<&mut Vec<u8>>, value: bool) -> usize {
    encode_application_tag(buf, ApplicationTag::Boolean, value as usize)
}

pub fn decode_boolean(data: &[u8]) -> Result<(bool, usize)> {
    let (tag, length_value, consumed) = decode_application_tag(data)?;
    if tag != ApplicationTag::Boolean {
        return Err(EncodingError::InvalidTag);
    }
    Ok((length_value != 0, consumed))
}

// -- unsigned ------------------------------------------------------------

fn unsigned_width(value: u64) -> usize {
    if value <= 0xFF {
        1
    } else if value <= 0xFFFF {
        2
    } else if value <= 0xFF_FFFF {
        3
    } else if value <= 0xFFFF_FFFF {
        4
    } else if value <= 0xFF_FFFF_FFFF {
        5
    } else if value <= 0xFFFF_FFFF_FFFF {
        6
    } else if value <= 0xFF_FFFF_FFFF_FFFF {
        7
    } else {
        8
    }
}

pub fn encode_unsigned(buf: Option<&mut Vec<u8>>, value: u64) -> usize {
    let width = unsigned_width(value);
    match buf {
        None => encode_application_tag(None, ApplicationTag::UnsignedInt, width) + width,
        Some(out) => {
            let start = encode_application_tag(Some(out), ApplicationTag::UnsignedInt, width);
            let bytes = value.to_be_bytes();
            out.extend_from_slice(&bytes[8 - width..]);
            start + width
        }
    }
}

pub fn decode_unsigned(data: &[u8]) -> Result<(u64, usize)> {
    let (tag, length, header_len) = decode_application_tag(data)?;
    if tag != ApplicationTag::UnsignedInt {
        return Err(EncodingError::InvalidTag);
    }
    if length == 0 || length > 8 {
        return Err(EncodingError::InvalidLength);
    }
    if data.len() < header_len + length {
        return Err(EncodingError::BufferUnderflow);
    }
    let mut bytes = [0u8; 8];
    bytes[8 - length..].copy_from_slice(&data[header_len..header_len + length]);
    Ok((u64::from_be_bytes(bytes), header_len + length))
}

// -- signed ---------------------------------------------------------------

fn signed_width(value: i64) -> usize {
    // Smallest width whose sign-extension of the low `width` bytes
    // round-trips to `value`.
    for width in 1..=8 {
        let shift = (8 - width) * 8;
        let sign_extended = (value << shift) >> shift;
        if sign_extended == value {
            return width;
        }
    }
    8
}

pub fn encode_signed(buf: Option<&mut Vec<u8>>, value: i64) -> usize {
    let width = signed_width(value);
    match buf {
        None => encode_application_tag(None, ApplicationTag::SignedInt, width) + width,
        Some(out) => {
            let start = encode_application_tag(Some(out), ApplicationTag::SignedInt, width);
            let bytes = value.to_be_bytes();
            out.extend_from_slice(&bytes[8 - width..]);
            start + width
        }
    }
}

pub fn decode_signed(data: &[u8]) -> Result<(i64, usize)> {
    let (tag, length, header_len) = decode_application_tag(data)?;
    if tag != ApplicationTag::SignedInt {
        return Err(EncodingError::InvalidTag);
    }
    if length == 0 || length > 8 {
        return Err(EncodingError::InvalidLength);
    }
    if data.len() < header_len + length {
        return Err(EncodingError::BufferUnderflow);
    }
    let sign_byte = if data[header_len] & 0x80 != 0 { 0xFF } else { 0x00 };
    let mut bytes = [sign_byte; 8];
    bytes[8 - length..].copy_from_slice(&data[header_len..header_len + length]);
    Ok((i64::from_be_bytes(bytes), header_len + length))
}

// -- real / double --------------------------------------------------------

pub fn encode_real(buf: Option<&mut Vec<u8>>, value: f32) -> usize {
    match buf {
        None => encode_application_tag(None, ApplicationTag::Real, 4) + 4,
        Some(out) => {
            let start = encode_application_tag(Some(out), ApplicationTag::Real, 4);
            out.extend_from_slice(&value.to_be_bytes());
            start + 4
        }
    }
}

pub fn decode_real(data: &[u8]) -> Result<(f32, usize)> {
    let (tag, length, header_len) = decode_application_tag(data)?;
    if tag != ApplicationTag::Real || length != 4 {
        return Err(EncodingError::InvalidTag);
    }
    if data.len() < header_len + 4 {
        return Err(EncodingError::BufferUnderflow);
    }
    let bytes: [u8; 4] = data[header_len..header_len + 4].try_into().unwrap();
    Ok((f32::from_be_bytes(bytes), header_len + 4))
}

pub fn encode_double(buf: Option<&mut Vec<u8>>, value: f64) -> usize {
    match buf {
        None => encode_application_tag(None, ApplicationTag::Double, 8) + 8,
        Some(out) => {
            let start = encode_application_tag(Some(out), ApplicationTag::Double, 8);
            out.extend_from_slice(&value.to_be_bytes());
            start + 8
        }
    }
}

pub fn decode_double(data: &[u8]) -> Result<(f64, usize)> {
    let (tag, length, header_len) = decode_application_tag(data)?;
    if tag != ApplicationTag::Double || length != 8 {
        return Err(EncodingError::InvalidTag);
    }
    if data.len() < header_len + 8 {
        return Err(EncodingError::BufferUnderflow);
    }
    let bytes: [u8; 8] = data[header_len..header_len + 8].try_into().unwrap();
    Ok((f64::from_be_bytes(bytes), header_len + 8))
}

// -- octet string -----------------------------------------------------------

pub fn encode_octet_string(buf: Option<&mut Vec<u8>>, value: &[u8]) -> usize {
    match buf {
        None => encode_application_tag(None, ApplicationTag::OctetString, value.len()) + value.len(),
        Some(out) => {
            let start = encode_application_tag(Some(out), ApplicationTag::OctetString, value.len());
            out.extend_from_slice(value);
            start + value.len()
        }
    }
}

pub fn decode_octet_string(data: &[u8]) -> Result<(Vec<u8>, usize)> {
    let (tag, length, header_len) = decode_application_tag(data)?;
    if tag != ApplicationTag::OctetString {
        return Err(EncodingError::InvalidTag);
    }
    if data.len() < header_len + length {
        return Err(EncodingError::BufferUnderflow);
    }
    Ok((data[header_len..header_len + length].to_vec(), header_len + length))
}

// -- character string ---------------------------------------------------

/// Encodes as UTF-8 with the ANSI X3.4 encoding marker when `value` is
/// pure ASCII (the common case and the one every BACnet field device
/// interoperates on); otherwise marks it explicitly as UTF-8.
pub fn encode_character_string(buf: Option<&mut Vec<u8>>, value: &str) -> usize {
    let is_ascii = value.is_ascii();
    let payload_len = 1 + value.len();
    match buf {
        None => encode_application_tag(None, ApplicationTag::CharacterString, payload_len) + payload_len,
        Some(out) => {
            let start = encode_application_tag(Some(out), ApplicationTag::CharacterString, payload_len);
            out.push(if is_ascii {
                CharacterStringEncoding::AnsiX34 as u8
            } else {
                CharacterStringEncoding::Utf8 as u8
            });
            out.extend_from_slice(value.as_bytes());
            start + payload_len
        }
    }
}

pub fn decode_character_string(data: &[u8]) -> Result<(String, usize)> {
    let (tag, length, header_len) = decode_application_tag(data)?;
    if tag != ApplicationTag::CharacterString {
        return Err(EncodingError::InvalidTag);
    }
    if length == 0 {
        return Err(EncodingError::InvalidLength);
    }
    if data.len() < header_len + length {
        return Err(EncodingError::BufferUnderflow);
    }
    let encoding = CharacterStringEncoding::try_from(data[header_len])?;
    let payload = &data[header_len + 1..header_len + length];
    let decoded = match encoding {
        CharacterStringEncoding::AnsiX34 | CharacterStringEncoding::Utf8 => {
            core::str::from_utf8(payload)
                .map(|s| s.into())
                .map_err(|e| EncodingError::InvalidFormat(format!("{e}")))?
        }
        CharacterStringEncoding::Iso8859_1 => payload.iter().map(|&b| b as char).collect(),
        CharacterStringEncoding::Ucs2 => {
            if payload.len() % 2 != 0 {
                return Err(EncodingError::InvalidLength);
            }
            let units: Vec<u16> = payload
                .chunks_exact(2)
                .map(|c| u16::from_be_bytes([c[0], c[1]]))
                .collect();
            String::from_utf16(&units)
                .map_err(|e| EncodingError::InvalidFormat(format!("{e}")))?
        }
        other => {
            return Err(EncodingError::InvalidFormat(format!(
                "unsupported character string encoding {:?}",
                other
            )))
        }
    };
    Ok((decoded, header_len + length))
}

// -- enumerated -----------------------------------------------------------

pub fn encode_enumerated(buf: Option<&mut Vec<u8>>, value: u32) -> usize {
    let width = unsigned_width(value as u64);
    match buf {
        None => encode_application_tag(None, ApplicationTag::Enumerated, width) + width,
        Some(out) => {
            let start = encode_application_tag(Some(out), ApplicationTag::Enumerated, width);
            let bytes = (value as u64).to_be_bytes();
            out.extend_from_slice(&bytes[8 - width..]);
            start + width
        }
    }
}

pub fn decode_enumerated(data: &[u8]) -> Result<(u32, usize)> {
    let (tag, length, header_len) = decode_application_tag(data)?;
    if tag != ApplicationTag::Enumerated {
        return Err(EncodingError::InvalidTag);
    }
    if length == 0 || length > 4 {
        return Err(EncodingError::InvalidLength);
    }
    if data.len() < header_len + length {
        return Err(EncodingError::BufferUnderflow);
    }
    let mut bytes = [0u8; 4];
    bytes[4 - length..].copy_from_slice(&data[header_len..header_len + length]);
    Ok((u32::from_be_bytes(bytes), header_len + length))
}

// -- date / time ------------------------------------------------------------

/// BACnet Date, per ASHRAE 135 20.2.12. `255` in any field means
/// "unspecified/any"; `day_of_week` is 1=Monday..7=Sunday.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacnetDate {
    pub year: u8,
    pub month: u8,
    pub day: u8,
    pub day_of_week: u8,
}

pub fn encode_date(buf: Option<&mut Vec<u8>>, value: BacnetDate) -> usize {
    match buf {
        None => encode_application_tag(None, ApplicationTag::Date, 4) + 4,
        Some(out) => {
            let start = encode_application_tag(Some(out), ApplicationTag::Date, 4);
            out.push(value.year);
            out.push(value.month);
            out.push(value.day);
            out.push(value.day_of_week);
            start + 4
        }
    }
}

pub fn decode_date(data: &[u8]) -> Result<(BacnetDate, usize)> {
    let (tag, length, header_len) = decode_application_tag(data)?;
    if tag != ApplicationTag::Date || length != 4 {
        return Err(EncodingError::InvalidTag);
    }
    if data.len() < header_len + 4 {
        return Err(EncodingError::BufferUnderflow);
    }
    let d = &data[header_len..header_len + 4];
    Ok((
        BacnetDate {
            year: d[0],
            month: d[1],
            day: d[2],
            day_of_week: d[3],
        },
        header_len + 4,
    ))
}

/// BACnet Time, per ASHRAE 135 20.2.13. `255` in any field means
/// "unspecified/any".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacnetTime {
    pub hour: u8,
    pub minute: u8,
    pub second: u8,
    pub hundredths: u8,
}

pub fn encode_time(buf: Option<&mut Vec<u8>>, value: BacnetTime) -> usize {
    match buf {
        None => encode_application_tag(None, ApplicationTag::Time, 4) + 4,
        Some(out) => {
            let start = encode_application_tag(Some(out), ApplicationTag::Time, 4);
            out.push(value.hour);
            out.push(value.minute);
            out.push(value.second);
            out.push(value.hundredths);
            start + 4
        }
    }
}

pub fn decode_time(data: &[u8]) -> Result<(BacnetTime, usize)> {
    let (tag, length, header_len) = decode_application_tag(data)?;
    if tag != ApplicationTag::Time || length != 4 {
        return Err(EncodingError::InvalidTag);
    }
    if data.len() < header_len + 4 {
        return Err(EncodingError::BufferUnderflow);
    }
    let t = &data[header_len..header_len + 4];
    Ok((
        BacnetTime {
            hour: t[0],
            minute: t[1],
            second: t[2],
            hundredths: t[3],
        },
        header_len + 4,
    ))
}

// -- object identifier --------------------------------------------------

/// A BACnet object identifier: a 10-bit object type and a 22-bit
/// instance number packed into a single `u32` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectIdentifier {
    pub object_type: u16,
    pub instance: u32,
}

const INSTANCE_MASK: u32 = 0x003F_FFFF;

pub fn encode_object_identifier(buf: Option<&mut Vec<u8>>, value: ObjectIdentifier) -> usize {
    let packed = ((value.object_type as u32) << 22) | (value.instance & INSTANCE_MASK);
    match buf {
        None => encode_application_tag(None, ApplicationTag::ObjectIdentifier, 4) + 4,
        Some(out) => {
            let start = encode_application_tag(Some(out), ApplicationTag::ObjectIdentifier, 4);
            out.extend_from_slice(&packed.to_be_bytes());
            start + 4
        }
    }
}

pub fn decode_object_identifier(data: &[u8]) -> Result<(ObjectIdentifier, usize)> {
    let (tag, length, header_len) = decode_application_tag(data)?;
    if tag != ApplicationTag::ObjectIdentifier || length != 4 {
        return Err(EncodingError::InvalidTag);
    }
    if data.len() < header_len + 4 {
        return Err(EncodingError::BufferUnderflow);
    }
    let bytes: [u8; 4] = data[header_len..header_len + 4].try_into().unwrap();
    let packed = u32::from_be_bytes(bytes);
    Ok((
        ObjectIdentifier {
            object_type: (packed >> 22) as u16,
            instance: packed & INSTANCE_MASK,
        },
        header_len + 4,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_roundtrip() {
        let mut buf = Vec::new();
        encode_boolean(Some(&mut buf), true);
        let (v, _) = decode_boolean(&buf).unwrap();
        assert!(v);
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn unsigned_picks_minimal_width() {
        let mut buf = Vec::new();
        encode_unsigned(Some(&mut buf), 42);
        assert_eq!(buf.len(), 2); // 1 tag byte + 1 payload byte
        let mut buf2 = Vec::new();
        encode_unsigned(Some(&mut buf2), 70_000);
        assert_eq!(buf2.len(), 4); // 1 tag byte + 3 payload bytes
    }

    #[test]
    fn unsigned_roundtrip_large_value() {
        let mut buf = Vec::new();
        encode_unsigned(Some(&mut buf), u64::MAX);
        let (v, consumed) = decode_unsigned(&buf).unwrap();
        assert_eq!(v, u64::MAX);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn signed_roundtrip_negative() {
        let mut buf = Vec::new();
        encode_signed(Some(&mut buf), -42);
        let (v, _) = decode_signed(&buf).unwrap();
        assert_eq!(v, -42);
    }

    #[test]
    fn signed_minimal_width_for_small_negative() {
        let mut buf = Vec::new();
        encode_signed(Some(&mut buf), -1);
        assert_eq!(buf.len(), 2);
    }

    #[test]
    fn real_roundtrip() {
        let mut buf = Vec::new();
        encode_real(Some(&mut buf), 98.6_f32);
        let (v, _) = decode_real(&buf).unwrap();
        assert!((v - 98.6_f32).abs() < 0.001);
    }

    #[test]
    fn double_roundtrip() {
        let mut buf = Vec::new();
        encode_double(Some(&mut buf), core::f64::consts::PI);
        let (v, _) = decode_double(&buf).unwrap();
        assert_eq!(v, core::f64::consts::PI);
    }

    #[test]
    fn octet_string_roundtrip() {
        let mut buf = Vec::new();
        encode_octet_string(Some(&mut buf), &[0xDE, 0xAD, 0xBE, 0xEF]);
        let (v, _) = decode_octet_string(&buf).unwrap();
        assert_eq!(v, vec![0xDE, 0xAD, 0xBE, 0xEF]);
    }

    #[test]
    fn character_string_roundtrip_ascii() {
        let mut buf = Vec::new();
        encode_character_string(Some(&mut buf), "Zone 1 Temp");
        let (v, _) = decode_character_string(&buf).unwrap();
        assert_eq!(v, "Zone 1 Temp");
        assert_eq!(buf[2], CharacterStringEncoding::AnsiX34 as u8);
    }

    #[test]
    fn character_string_roundtrip_non_ascii() {
        let mut buf = Vec::new();
        encode_character_string(Some(&mut buf), "Büro");
        let (v, _) = decode_character_string(&buf).unwrap();
        assert_eq!(v, "Büro");
    }

    #[test]
    fn enumerated_roundtrip() {
        let mut buf = Vec::new();
        encode_enumerated(Some(&mut buf), 3);
        let (v, _) = decode_enumerated(&buf).unwrap();
        assert_eq!(v, 3);
    }

    #[test]
    fn date_roundtrip_with_unspecified_fields() {
        let date = BacnetDate {
            year: 126,
            month: 7,
            day: 27,
            day_of_week: 255,
        };
        let mut buf = Vec::new();
        encode_date(Some(&mut buf), date);
        let (v, _) = decode_date(&buf).unwrap();
        assert_eq!(v, date);
    }

    #[test]
    fn time_roundtrip() {
        let time = BacnetTime {
            hour: 13,
            minute: 30,
            second: 0,
            hundredths: 0,
        };
        let mut buf = Vec::new();
        encode_time(Some(&mut buf), time);
        let (v, _) = decode_time(&buf).unwrap();
        assert_eq!(v, time);
    }

    #[test]
    fn object_identifier_roundtrip() {
        let oid = ObjectIdentifier {
            object_type: 8, // device
            instance: 260001,
        };
        let mut buf = Vec::new();
        encode_object_identifier(Some(&mut buf), oid);
        let (v, _) = decode_object_identifier(&buf).unwrap();
        assert_eq!(v, oid);
    }

    #[test]
    fn object_identifier_instance_masked_to_22_bits() {
        let oid = ObjectIdentifier {
            object_type: 0,
            instance: 0xFFFF_FFFF,
        };
        let mut buf = Vec::new();
        encode_object_identifier(Some(&mut buf), oid);
        let (v, _) = decode_object_identifier(&buf).unwrap();
        assert_eq!(v.instance, INSTANCE_MASK);
    }

    #[test]
    fn probe_mode_matches_real_encode_length() {
        let probe = encode_character_string(None, "hello");
        let mut buf = Vec::new();
        let real = encode_character_string(Some(&mut buf), "hello");
        assert_eq!(probe, real);
        assert_eq!(buf.len(), real);
    }

    #[test]
    fn decode_rejects_wrong_tag() {
        let mut buf = Vec::new();
        encode_boolean(Some(&mut buf), true);
        assert!(decode_unsigned(&buf).is_err());
    }

    #[test]
    fn decode_never_overreads_truncated_unsigned() {
        let mut buf = Vec::new();
        encode_unsigned(Some(&mut buf), 1_000_000);
        assert!(decode_unsigned(&buf[..buf.len() - 1]).is_err());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn unsigned_roundtrips_for_any_value(value: u64) {
            let mut buf = Vec::new();
            encode_unsigned(Some(&mut buf), value);
            let (decoded, consumed) = decode_unsigned(&buf).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(consumed, buf.len());
        }

        #[test]
        fn signed_roundtrips_for_any_value(value: i64) {
            let mut buf = Vec::new();
            encode_signed(Some(&mut buf), value);
            let (decoded, consumed) = decode_signed(&buf).unwrap();
            prop_assert_eq!(decoded, value);
            prop_assert_eq!(consumed, buf.len());
        }

        #[test]
        fn real_roundtrips_for_any_finite_value(value in any::<f32>().prop_filter("finite", |v| v.is_finite())) {
            let mut buf = Vec::new();
            encode_real(Some(&mut buf), value);
            let (decoded, _) = decode_real(&buf).unwrap();
            prop_assert_eq!(decoded.to_bits(), value.to_bits());
        }

        #[test]
        fn octet_string_roundtrips_for_any_bytes(bytes in proptest::collection::vec(any::<u8>(), 0..64)) {
            let mut buf = Vec::new();
            encode_octet_string(Some(&mut buf), &bytes);
            let (decoded, consumed) = decode_octet_string(&buf).unwrap();
            prop_assert_eq!(decoded, bytes);
            prop_assert_eq!(consumed, buf.len());
        }

        #[test]
        fn character_string_roundtrips_for_any_ascii(s in "[ -~]{0,40}") {
            let mut buf = Vec::new();
            encode_character_string(Some(&mut buf), &s);
            let (decoded, consumed) = decode_character_string(&buf).unwrap();
            prop_assert_eq!(decoded, s);
            prop_assert_eq!(consumed, buf.len());
        }

        #[test]
        fn object_identifier_roundtrips_with_instance_masked(object_type in 0u16..1024, instance: u32) {
            let oid = ObjectIdentifier { object_type, instance };
            let mut buf = Vec::new();
            encode_object_identifier(Some(&mut buf), oid);
            let (decoded, _) = decode_object_identifier(&buf).unwrap();
            prop_assert_eq!(decoded.object_type, object_type);
            prop_assert_eq!(decoded.instance, instance & INSTANCE_MASK);
        }

        #[test]
        fn decode_never_overreads_any_truncation(value: u64) {
            let mut buf = Vec::new();
            encode_unsigned(Some(&mut buf), value);
            for cut in 0..buf.len() {
                prop_assert!(decode_unsigned(&buf[..cut]).is_err());
            }
        }
    }
}
