//! Constructed Types Built on Context-Tagged Primitives
//!
//! Unlike the application-tagged primitives in [`super::primitives`],
//! these types are assembled from context-tagged fields, usually
//! bracketed by an opening/closing tag pair when embedded inside a
//! larger constructed value. Each exposes `same()` (structural
//! equality, mirroring ASHRAE 135's notion of value comparison
//! distinct from `PartialEq` on the Rust type) and `copy()` (a cheap
//! owned clone), per the spec these types are grounded on.

#[cfg(not(feature = "std"))]
use alloc::{vec, vec::Vec};

use super::primitives::{BacnetDate, BacnetTime};
use super::tag::{decode_tag, encode_closing_tag, encode_opening_tag};
use super::{EncodingError, Result};
use crate::address::Address;

/// A combined date and time, context-tagged as two consecutive
/// application-tagged fields (ASHRAE 135 20.2.14).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BacnetDateTime {
    pub date: BacnetDate,
    pub time: BacnetTime,
}

impl BacnetDateTime {
    pub fn same(&self, other: &Self) -> bool {
        self == other
    }

    pub fn copy(&self) -> Self {
        *self
    }
}

pub fn encode_date_time(buf: Option<&mut Vec<u8>>, value: BacnetDateTime) -> usize {
    use super::primitives::{encode_date, encode_time};
    match buf {
        None => encode_date(None, value.date) + encode_time(None, value.time),
        Some(out) => {
            let a = encode_date(Some(out), value.date);
            let b = encode_time(Some(out), value.time);
            a + b
        }
    }
}

pub fn decode_date_time(data: &[u8]) -> Result<(BacnetDateTime, usize)> {
    use super::primitives::{decode_date, decode_time};
    let (date, consumed_date) = decode_date(data)?;
    let (time, consumed_time) = decode_time(&data[consumed_date..])?;
    Ok((BacnetDateTime { date, time }, consumed_date + consumed_time))
}

/// One day's worth of time-value pairs in a weekly schedule,
/// context-tagged per ASHRAE 135 Schedule object `Weekly_Schedule`
/// property. Values here are stored pre-encoded (already-tagged
/// bytes) since the property value's application type varies by
/// referenced property — this crate only needs to carry the bytes
/// intact, not interpret them.
#[derive(Debug, Clone, PartialEq)]
pub struct DailySchedule {
    pub entries: Vec<(BacnetTime, Vec<u8>)>,
}

impl DailySchedule {
    pub fn same(&self, other: &Self) -> bool {
        self == other
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }
}

const DAILY_SCHEDULE_TAG: u32 = 0;

pub fn encode_daily_schedule(buf: Option<&mut Vec<u8>>, value: &DailySchedule) -> usize {
    use super::primitives::encode_time;
    match buf {
        None => {
            let mut total = encode_opening_tag(None, DAILY_SCHEDULE_TAG);
            for (time, encoded_value) in &value.entries {
                total += encode_time(None, *time);
                total += encoded_value.len();
            }
            total += encode_closing_tag(None, DAILY_SCHEDULE_TAG);
            total
        }
        Some(out) => {
            let mut total = encode_opening_tag(Some(out), DAILY_SCHEDULE_TAG);
            for (time, encoded_value) in &value.entries {
                total += encode_time(Some(out), *time);
                out.extend_from_slice(encoded_value);
                total += encoded_value.len();
            }
            total += encode_closing_tag(Some(out), DAILY_SCHEDULE_TAG);
            total
        }
    }
}

/// A full weekly schedule: seven [`DailySchedule`]s, Monday first.
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklySchedule {
    pub days: [DailySchedule; 7],
}

impl WeeklySchedule {
    pub fn same(&self, other: &Self) -> bool {
        self == other
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }
}

/// A load-shed level, either a percentage or an abstract level
/// number, modeled as the ASHRAE 135 `BACnetShedLevel` choice
/// (context tags 0/1/2 select percent/level/amount).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ShedLevel {
    Percent(u32),
    Level(u32),
    Amount(f32),
}

impl ShedLevel {
    pub fn same(&self, other: &Self) -> bool {
        self == other
    }

    pub fn copy(&self) -> Self {
        *self
    }
}

pub fn encode_shed_level(buf: Option<&mut Vec<u8>>, value: ShedLevel) -> usize {
    use super::tag::encode_context_tag;
    let (tag_number, width): (u8, usize) = match value {
        ShedLevel::Percent(v) | ShedLevel::Level(v) => (
            if matches!(value, ShedLevel::Percent(_)) { 0 } else { 1 },
            unsigned_encoded_width(v),
        ),
        ShedLevel::Amount(_) => (2, 4),
    };

    match buf {
        None => encode_context_tag(None, tag_number, width) + width,
        Some(out) => {
            let start = encode_context_tag(Some(out), tag_number, width);
            match value {
                ShedLevel::Percent(v) | ShedLevel::Level(v) => {
                    let bytes = (v as u64).to_be_bytes();
                    out.extend_from_slice(&bytes[8 - width..]);
                }
                ShedLevel::Amount(v) => out.extend_from_slice(&v.to_be_bytes()),
            }
            start + width
        }
    }
}

fn unsigned_encoded_width(value: u32) -> usize {
    if value <= 0xFF {
        1
    } else if value <= 0xFFFF {
        2
    } else if value <= 0xFF_FFFF {
        3
    } else {
        4
    }
}

pub fn decode_shed_level(data: &[u8]) -> Result<(ShedLevel, usize)> {
    use super::tag::decode_tag;
    let (header, header_len) = decode_tag(data)?;
    if header.class != super::tag::TagClass::Context {
        return Err(EncodingError::InvalidTag);
    }
    if data.len() < header_len + header.length_value {
        return Err(EncodingError::BufferUnderflow);
    }
    let payload = &data[header_len..header_len + header.length_value];
    let value = match header.number {
        0 | 1 => {
            let mut bytes = [0u8; 4];
            if payload.len() > 4 {
                return Err(EncodingError::InvalidLength);
            }
            bytes[4 - payload.len()..].copy_from_slice(payload);
            let v = u32::from_be_bytes(bytes);
            if header.number == 0 {
                ShedLevel::Percent(v)
            } else {
                ShedLevel::Level(v)
            }
        }
        2 => {
            if payload.len() != 4 {
                return Err(EncodingError::InvalidLength);
            }
            let bytes: [u8; 4] = payload.try_into().unwrap();
            ShedLevel::Amount(f32::from_be_bytes(bytes))
        }
        _ => return Err(EncodingError::InvalidTag),
    };
    Ok((value, header_len + header.length_value))
}

/// An `Address` paired with the device instance it resolves to,
/// mirroring ASHRAE 135's `BACnetAddressBinding` used in Who-Is/I-Am
/// device discovery and in BBMD/router configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressBinding {
    pub device_instance: u32,
    pub address: Address,
}

impl AddressBinding {
    pub fn same(&self, other: &Self) -> bool {
        self == other
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }
}

pub fn encode_address_binding(buf: Option<&mut Vec<u8>>, value: &AddressBinding) -> usize {
    use super::primitives::encode_object_identifier;
    use super::primitives::ObjectIdentifier;
    use crate::address::encode_address;

    let oid = ObjectIdentifier {
        object_type: 8, // device
        instance: value.device_instance,
    };
    match buf {
        None => {
            let mut scratch = Vec::new();
            encode_address(&mut scratch, &value.address);
            encode_object_identifier(None, oid) + scratch.len()
        }
        Some(out) => {
            let a = encode_object_identifier(Some(out), oid);
            let before = out.len();
            encode_address(out, &value.address);
            a + (out.len() - before)
        }
    }
}

pub fn decode_address_binding(data: &[u8]) -> Result<(AddressBinding, usize)> {
    use super::primitives::decode_object_identifier;
    use crate::address::decode_address;

    let (oid, consumed_oid) = decode_object_identifier(data)?;
    let (address, consumed_addr) =
        decode_address(&data[consumed_oid..]).ok_or(EncodingError::BufferUnderflow)?;
    Ok((
        AddressBinding {
            device_instance: oid.instance,
            address,
        },
        consumed_oid + consumed_addr,
    ))
}

/// A virtual-MAC table entry for BACnet/IPv6 (ASHRAE 135 Annex U):
/// maps a device's 3-byte VMAC to the IPv6 socket address it is
/// currently reachable at.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VmacEntry {
    pub vmac: [u8; 3],
    pub address: std::net::SocketAddrV6,
}

#[cfg(feature = "std")]
impl VmacEntry {
    pub fn same(&self, other: &Self) -> bool {
        self == other
    }

    pub fn copy(&self) -> Self {
        *self
    }
}
