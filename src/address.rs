//! BACnet Address Model
//!
//! A BACnet address is the triple `(net, mac, adr)`:
//!
//! - `net`: 16-bit network number. `0` means "local network"; `0xFFFF`
//!   is the global broadcast network.
//! - `mac`: 1..N byte link (MAC) address, width fixed per medium.
//! - `adr`: 0..N byte remote-device address on a routed network (empty
//!   when the destination is directly reachable on `net`).
//!
//! Two addresses are equal iff all three fields match length-for-length
//! (see [`Address::same`] / the `PartialEq` impl).

#[cfg(not(feature = "std"))]
use alloc::{format, string::String, vec, vec::Vec};

#[cfg(feature = "std")]
use std::net::{Ipv4Addr, Ipv6Addr};

/// Network number meaning "this network" / local.
pub const NETWORK_LOCAL: u16 = 0x0000;
/// Network number meaning "all networks" — global broadcast.
pub const NETWORK_GLOBAL_BROADCAST: u16 = 0xFFFF;

/// Fixed link-address (MAC) width for each medium the core supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MacWidth {
    /// MS/TP station address.
    MsTp,
    /// 802.2 LLC over Ethernet MAC address.
    Ieee8023,
    /// BACnet/IP (4-byte IPv4 address + 2-byte UDP port).
    Ipv4,
    /// BACnet/IPv6 (16-byte IPv6 address + 2-byte UDP port).
    Ipv6,
    /// BACnet/IPv6 virtual MAC (3-byte device-instance-derived id).
    VirtualMac,
}

impl MacWidth {
    /// Byte width of the link address for this medium.
    pub const fn len(self) -> usize {
        match self {
            MacWidth::MsTp => 1,
            MacWidth::Ieee8023 => 6,
            MacWidth::Ipv4 => 6,
            MacWidth::Ipv6 => 18,
            MacWidth::VirtualMac => 3,
        }
    }
}

/// Errors raised while constructing or parsing an [`Address`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// The provided MAC bytes did not match the medium's fixed width.
    InvalidMacLength { expected: usize, found: usize },
    /// The ASCII form could not be parsed for the given medium.
    ParseError(String),
}

#[cfg(not(feature = "std"))]
impl core::fmt::Display for AddressError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            AddressError::InvalidMacLength { expected, found } => {
                write!(f, "invalid MAC length: expected {expected}, found {found}")
            }
            AddressError::ParseError(msg) => write!(f, "address parse error: {msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::fmt::Display for AddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AddressError::InvalidMacLength { expected, found } => {
                write!(f, "invalid MAC length: expected {expected}, found {found}")
            }
            AddressError::ParseError(msg) => write!(f, "address parse error: {msg}"),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for AddressError {}

/// A BACnet network-layer address: `(net, mac, adr)`.
#[derive(Debug, Clone, Eq)]
pub struct Address {
    pub net: u16,
    pub mac: Vec<u8>,
    pub adr: Vec<u8>,
}

impl Address {
    /// The local-network, no-adr form of a raw MAC address.
    pub fn local(mac: Vec<u8>) -> Self {
        Self {
            net: NETWORK_LOCAL,
            mac,
            adr: Vec::new(),
        }
    }

    /// The global broadcast address (no MAC, no adr).
    pub fn global_broadcast() -> Self {
        Self {
            net: NETWORK_GLOBAL_BROADCAST,
            mac: Vec::new(),
            adr: Vec::new(),
        }
    }

    /// Local-network broadcast on a directly-attached medium: same
    /// `net` as a unicast peer would use, but an empty MAC.
    pub fn local_broadcast() -> Self {
        Self {
            net: NETWORK_LOCAL,
            mac: Vec::new(),
            adr: Vec::new(),
        }
    }

    /// An MS/TP station address (0..=254; 255 is the MS/TP broadcast
    /// MAC and is better expressed via [`Address::local_broadcast`]).
    pub fn mstp(station: u8) -> Self {
        Self::local(vec![station])
    }

    /// A remote address reachable via an intermediate router: `net`
    /// plus the remote device's own `adr` on that network.
    pub fn routed(net: u16, router_mac: Vec<u8>, adr: Vec<u8>) -> Self {
        Self {
            net,
            mac: router_mac,
            adr,
        }
    }

    /// `true` iff this is the global broadcast address.
    pub fn is_global_broadcast(&self) -> bool {
        self.net == NETWORK_GLOBAL_BROADCAST
    }

    /// `true` iff this is a local-network broadcast (empty MAC, not
    /// global).
    pub fn is_local_broadcast(&self) -> bool {
        self.net != NETWORK_GLOBAL_BROADCAST && self.mac.is_empty()
    }

    /// Address equality: all three fields must match length-for-length.
    /// Equivalent to the reference implementation's
    /// `bacnet_address_same`.
    pub fn same(&self, other: &Address) -> bool {
        self == other
    }

    #[cfg(feature = "std")]
    pub fn ipv4(addr: Ipv4Addr, port: u16) -> Self {
        let mut mac = Vec::with_capacity(6);
        mac.extend_from_slice(&addr.octets());
        mac.extend_from_slice(&port.to_be_bytes());
        Self::local(mac)
    }

    #[cfg(feature = "std")]
    pub fn ipv6(addr: Ipv6Addr, port: u16) -> Self {
        let mut mac = Vec::with_capacity(18);
        mac.extend_from_slice(&addr.octets());
        mac.extend_from_slice(&port.to_be_bytes());
        Self::local(mac)
    }

    pub fn ethernet(mac: [u8; 6]) -> Self {
        Self::local(mac.to_vec())
    }

    /// A BACnet/IPv6 virtual MAC derived from the low 24 bits of a
    /// device instance number.
    pub fn virtual_mac(device_instance: u32) -> Self {
        let bytes = device_instance.to_be_bytes();
        Self::local(vec![bytes[1], bytes[2], bytes[3]])
    }

    /// Parse an MS/TP station address given in hex, e.g. `"7F"`.
    pub fn parse_mstp(text: &str) -> Result<Self, AddressError> {
        let station = u8::from_str_radix(text.trim(), 16)
            .map_err(|e| AddressError::ParseError(format_alloc(e)))?;
        Ok(Self::mstp(station))
    }

    /// Parse a colon-separated hex MAC of arbitrary width, e.g.
    /// `"12:34:56"` or `"xx:xx:xx:xx:xx:xx"`.
    pub fn parse_hex_mac(text: &str) -> Result<Self, AddressError> {
        let mut mac = Vec::new();
        for part in text.trim().split(':') {
            let byte = u8::from_str_radix(part, 16)
                .map_err(|_| AddressError::ParseError(format!("bad hex octet: {part}")))?;
            mac.push(byte);
        }
        if mac.is_empty() {
            return Err(AddressError::ParseError("empty MAC".into()));
        }
        Ok(Self::local(mac))
    }

    #[cfg(feature = "std")]
    /// Parse `a.b.c.d:port` into a BACnet/IP address.
    pub fn parse_ipv4(text: &str) -> Result<Self, AddressError> {
        let (host, port) = text
            .rsplit_once(':')
            .ok_or_else(|| AddressError::ParseError(format!("missing port: {text}")))?;
        let addr: Ipv4Addr = host
            .parse()
            .map_err(|_| AddressError::ParseError(format!("bad IPv4 address: {host}")))?;
        let port: u16 = port
            .parse()
            .map_err(|_| AddressError::ParseError(format!("bad port: {port}")))?;
        Ok(Self::ipv4(addr, port))
    }
}

#[cfg(not(feature = "std"))]
fn format_alloc(e: core::num::ParseIntError) -> String {
    format!("{e}")
}
#[cfg(feature = "std")]
fn format_alloc(e: std::num::ParseIntError) -> String {
    format!("{e}")
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.net == other.net && self.mac == other.mac && self.adr == other.adr
    }
}

/// Encode an [`Address`] as `{net:u16be, mac_len:u8, mac, adr_len:u8,
/// adr}`, the wire shape used by constructed AddressBinding values.
pub fn encode_address(buf: &mut Vec<u8>, addr: &Address) {
    buf.extend_from_slice(&addr.net.to_be_bytes());
    buf.push(addr.mac.len() as u8);
    buf.extend_from_slice(&addr.mac);
    buf.push(addr.adr.len() as u8);
    buf.extend_from_slice(&addr.adr);
}

/// Decode an [`Address`] encoded by [`encode_address`]. Returns the
/// address and the number of bytes consumed.
pub fn decode_address(data: &[u8]) -> Option<(Address, usize)> {
    if data.len() < 3 {
        return None;
    }
    let net = u16::from_be_bytes([data[0], data[1]]);
    let mac_len = data[2] as usize;
    let mut pos = 3;
    if data.len() < pos + mac_len + 1 {
        return None;
    }
    let mac = data[pos..pos + mac_len].to_vec();
    pos += mac_len;
    let adr_len = data[pos] as usize;
    pos += 1;
    if data.len() < pos + adr_len {
        return None;
    }
    let adr = data[pos..pos + adr_len].to_vec();
    pos += adr_len;
    Some((Address { net, mac, adr }, pos))
}
