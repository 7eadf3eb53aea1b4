#![doc = include_str!("../README.md")]
#![cfg_attr(not(feature = "std"), no_std)]

pub mod address;
pub mod crc;
pub mod datalink;
pub mod encoding;
pub mod keyed_list;
pub mod ring;

// Re-export main types without glob imports to avoid conflicts
pub use address::{Address, AddressError};
pub use datalink::DataLinkError;
pub use encoding::{ApplicationTag, EncodingError};
pub use keyed_list::KeyedList;
pub use ring::{RingBuffer, RingError};

#[cfg(feature = "std")]
extern crate std;

#[cfg(not(feature = "std"))]
extern crate alloc;

/// Protocol revision this core implements (ASHRAE 135 clause 6 value).
pub const BACNET_PROTOCOL_VERSION: u8 = 1;
/// Largest APDU this stack will assemble without segmentation (out of
/// scope here — see spec.md §1 Non-goals).
pub const BACNET_MAX_APDU: usize = 1476;
/// Largest MS/TP frame body, matching the extended-frame ceiling of
/// spec.md §6.
pub const BACNET_MAX_MPDU: usize = 1497;

#[cfg(test)]
mod tests {
    use crate::address::Address;
    use crate::crc::{data_crc16, header_crc};
    use crate::encoding::ApplicationTag;
    use crate::ring::RingBuffer;

    #[test]
    fn application_tag_roundtrips_through_its_numeric_value() {
        let tag = ApplicationTag::Real;
        assert_eq!(tag as u8, 4);
        assert_eq!(ApplicationTag::try_from(4u8).unwrap(), ApplicationTag::Real);
    }

    #[test]
    fn mstp_station_address_is_a_single_byte_mac() {
        let addr = Address::mstp(10);
        assert!(addr.is_global_broadcast() == false);
    }

    #[test]
    fn header_crc_of_known_frame_matches_wire_constant() {
        // Token frame {type=0, dst=2, src=1, length=0} (spec.md §8 scenario 1).
        let header = [0x00, 0x02, 0x01, 0x00, 0x00];
        assert_eq!(header_crc(&header), 0x55);
    }

    #[test]
    fn data_crc16_is_nonzero_for_nonempty_data() {
        let crc = data_crc16(b"test");
        assert_ne!(crc, 0);
    }

    #[test]
    fn ring_buffer_put_then_pop_returns_the_value_put() {
        let mut ring: RingBuffer<u8> = RingBuffer::new(4);
        ring.put(42).unwrap();
        assert_eq!(ring.pop().unwrap(), 42);
        assert!(ring.is_empty());
    }
}
