//! BACnet/IPv6 (BVLC over IPv6) — VMAC Resolution and Forwarding (C11)
//!
//! Parallels [`super::ipv4`]'s BBMD forwarding over IPv6 multicast
//! (`FF0X::BAC0`) rather than subnet directed broadcast, and adds the
//! virtual-MAC layer IPv4 doesn't need: every node identifies itself
//! by a 3-byte VMAC bijective with the bottom 24 bits of its 32-bit
//! device instance (spec.md §4.11).

use std::net::{Ipv6Addr, SocketAddrV6};

use crate::keyed_list::KeyedList;

use super::BvlcHeader;

/// BVLC type octet for the IPv6 variant (spec.md §4 "BVLC/IPv6
/// datagram... same shape with type=0x82").
pub const BVLL_TYPE_BACNET_IPV6: u8 = 0x82;

/// BVLC/IPv6 function codes (ASHRAE 135 Annex U).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvlcFunction {
    Result,
    OriginalUnicastNpdu,
    OriginalBroadcastNpdu,
    AddressResolution,
    ForwardedAddressResolution,
    AddressResolutionAck,
    VirtualAddressResolution,
    VirtualAddressResolutionAck,
    ForwardedNpdu,
    RegisterForeignDevice,
    DeleteForeignDeviceTableEntry,
    SecureBvll,
    DistributeBroadcastToNetwork,
}

impl BvlcFunction {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0x00 => BvlcFunction::Result,
            0x01 => BvlcFunction::OriginalUnicastNpdu,
            0x02 => BvlcFunction::OriginalBroadcastNpdu,
            0x03 => BvlcFunction::AddressResolution,
            0x04 => BvlcFunction::ForwardedAddressResolution,
            0x05 => BvlcFunction::AddressResolutionAck,
            0x06 => BvlcFunction::VirtualAddressResolution,
            0x07 => BvlcFunction::VirtualAddressResolutionAck,
            0x08 => BvlcFunction::ForwardedNpdu,
            0x09 => BvlcFunction::RegisterForeignDevice,
            0x0A => BvlcFunction::DeleteForeignDeviceTableEntry,
            0x0B => BvlcFunction::SecureBvll,
            0x0C => BvlcFunction::DistributeBroadcastToNetwork,
            _ => return None,
        })
    }

    pub fn to_byte(self) -> u8 {
        match self {
            BvlcFunction::Result => 0x00,
            BvlcFunction::OriginalUnicastNpdu => 0x01,
            BvlcFunction::OriginalBroadcastNpdu => 0x02,
            BvlcFunction::AddressResolution => 0x03,
            BvlcFunction::ForwardedAddressResolution => 0x04,
            BvlcFunction::AddressResolutionAck => 0x05,
            BvlcFunction::VirtualAddressResolution => 0x06,
            BvlcFunction::VirtualAddressResolutionAck => 0x07,
            BvlcFunction::ForwardedNpdu => 0x08,
            BvlcFunction::RegisterForeignDevice => 0x09,
            BvlcFunction::DeleteForeignDeviceTableEntry => 0x0A,
            BvlcFunction::SecureBvll => 0x0B,
            BvlcFunction::DistributeBroadcastToNetwork => 0x0C,
        }
    }
}

/// BVLC-Result codes (spec.md §4.11: distinct from the IPv4 set).
pub const RESULT_SUCCESS: u16 = 0x0000;
pub const RESULT_REGISTER_FD_NAK: u16 = 0x0030;
pub const RESULT_DELETE_FDT_NAK: u16 = 0x0060;
pub const RESULT_DISTRIBUTE_BROADCAST_NAK: u16 = 0x0090;
pub const RESULT_ADDRESS_RESOLUTION_NAK: u16 = 0x00A0;
pub const RESULT_VIRTUAL_ADDRESS_RESOLUTION_NAK: u16 = 0x00C0;

pub const FOREIGN_DEVICE_TTL_GRACE_SECONDS: u16 = 30;

/// A 3-byte virtual MAC, bijective with the bottom 24 bits of a
/// 32-bit device instance number.
pub type Vmac = [u8; 3];

/// Derive a device's VMAC from its instance number.
pub fn vmac_from_device_instance(device_instance: u32) -> Vmac {
    let bytes = device_instance.to_be_bytes();
    [bytes[1], bytes[2], bytes[3]]
}

/// One Foreign Device Table entry, keyed by VMAC rather than address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdtEntry {
    pub vmac: Vmac,
    pub address: SocketAddrV6,
    pub ttl_seconds: u16,
    pub ttl_remaining: u16,
}

fn vmac_key(vmac: &Vmac) -> u32 {
    u32::from_be_bytes([0, vmac[0], vmac[1], vmac[2]])
}

/// Outbound instruction the BBMD hands back to the UDP socket layer.
pub struct Outbound {
    pub to: SocketAddrV6,
    pub data: Vec<u8>,
}

/// Upward delivery hook for NPDUs reassembled out of incoming BVLC/IPv6
/// datagrams.
pub trait Ipv6NpduSink {
    fn deliver_npdu(&mut self, source_vmac: Vmac, source: SocketAddrV6, npdu: &[u8]);
}

/// Multicast group used for IPv6 broadcast-equivalent delivery
/// (`FF0X::BAC0`, spec.md §4.11); `X` is the scope, set at bind time.
pub fn multicast_group(scope: u8) -> Ipv6Addr {
    Ipv6Addr::new(0xFF00 | scope as u16, 0, 0, 0, 0, 0, 0, 0xBAC0)
}

/// One BACnet/IPv6 BBMD: a VMAC table mapping peers to IPv6 addresses,
/// plus a Foreign Device Table with the same 1Hz aging as IPv4.
pub struct Bbmd6 {
    pub local_vmac: Vmac,
    pub local_address: SocketAddrV6,
    pub vmac_table: KeyedList<SocketAddrV6>,
    pub fdt: KeyedList<FdtEntry>,
}

impl Bbmd6 {
    pub fn new(local_vmac: Vmac, local_address: SocketAddrV6) -> Self {
        Self {
            local_vmac,
            local_address,
            vmac_table: KeyedList::new(),
            fdt: KeyedList::new(),
        }
    }

    fn bvlc_result(&self, to: SocketAddrV6, code: u16) -> Outbound {
        let mut data = Vec::with_capacity(6);
        BvlcHeader {
            bvlc_type: BVLL_TYPE_BACNET_IPV6,
            function: BvlcFunction::Result.to_byte(),
            length: 6,
        }
        .encode(&mut data);
        data.extend_from_slice(&code.to_be_bytes());
        Outbound { to, data }
    }

    fn encode_forwarded_npdu(
        &self,
        original_vmac: Vmac,
        original_source: SocketAddrV6,
        npdu: &[u8],
    ) -> Vec<u8> {
        let mut data = Vec::with_capacity(4 + 3 + 18 + npdu.len());
        BvlcHeader {
            bvlc_type: BVLL_TYPE_BACNET_IPV6,
            function: BvlcFunction::ForwardedNpdu.to_byte(),
            length: (4 + 3 + 18 + npdu.len()) as u16,
        }
        .encode(&mut data);
        data.extend_from_slice(&original_vmac);
        data.extend_from_slice(&original_source.ip().octets());
        data.extend_from_slice(&original_source.port().to_be_bytes());
        data.extend_from_slice(npdu);
        data
    }

    fn relay_to_fdt(&self, original_vmac: Vmac, original_source: SocketAddrV6, npdu: &[u8]) -> Vec<Outbound> {
        let payload = self.encode_forwarded_npdu(original_vmac, original_source, npdu);
        self.fdt
            .iter()
            .map(|(_, entry)| Outbound {
                to: entry.address,
                data: payload.clone(),
            })
            .collect()
    }

    /// Handle one inbound BVLC/IPv6 datagram, tagged with the sender's
    /// VMAC (learned out-of-band from the link layer's NPDU source
    /// address, since IPv6 datagrams carry the VMAC in the payload
    /// rather than the UDP header).
    pub fn handle_datagram(
        &mut self,
        from_vmac: Vmac,
        from: SocketAddrV6,
        data: &[u8],
        sink: &mut dyn Ipv6NpduSink,
    ) -> Vec<Outbound> {
        let (header, header_len) = match BvlcHeader::parse(data) {
            Some(h) => h,
            None => return Vec::new(),
        };
        let Some(function) = BvlcFunction::from_byte(header.function) else {
            return Vec::new();
        };
        let payload = &data[header_len..];

        self.vmac_table.delete(vmac_key(&from_vmac));
        self.vmac_table.add(vmac_key(&from_vmac), from);

        match function {
            BvlcFunction::OriginalUnicastNpdu => {
                sink.deliver_npdu(from_vmac, from, payload);
                Vec::new()
            }

            BvlcFunction::OriginalBroadcastNpdu => {
                sink.deliver_npdu(from_vmac, from, payload);
                self.relay_to_fdt(from_vmac, from, payload)
            }

            BvlcFunction::ForwardedNpdu => {
                if payload.len() < 3 + 18 {
                    return Vec::new();
                }
                let mut vmac = [0u8; 3];
                vmac.copy_from_slice(&payload[..3]);
                let mut octets = [0u8; 16];
                octets.copy_from_slice(&payload[3..19]);
                let port = u16::from_be_bytes([payload[19], payload[20]]);
                let original_source = SocketAddrV6::new(Ipv6Addr::from(octets), port, 0, 0);
                sink.deliver_npdu(vmac, original_source, &payload[21..]);
                self.relay_to_fdt(vmac, original_source, &payload[21..])
            }

            BvlcFunction::DistributeBroadcastToNetwork => {
                if self.fdt.data(vmac_key(&from_vmac)).is_none() {
                    return vec![self.bvlc_result(from, RESULT_DISTRIBUTE_BROADCAST_NAK)];
                }
                sink.deliver_npdu(from_vmac, from, payload);
                self.relay_to_fdt(from_vmac, from, payload)
            }

            BvlcFunction::RegisterForeignDevice => {
                if payload.len() < 2 {
                    return vec![self.bvlc_result(from, RESULT_REGISTER_FD_NAK)];
                }
                let ttl_seconds = u16::from_be_bytes([payload[0], payload[1]]);
                let entry = FdtEntry {
                    vmac: from_vmac,
                    address: from,
                    ttl_seconds,
                    ttl_remaining: ttl_seconds.saturating_add(FOREIGN_DEVICE_TTL_GRACE_SECONDS),
                };
                let key = vmac_key(&from_vmac);
                if self.fdt.data(key).is_some() {
                    *self.fdt.data_mut(key).unwrap() = entry;
                } else if self.fdt.add(key, entry).is_none() {
                    log::warn!("bvlc6: foreign device table full, rejecting vmac {:?}", from_vmac);
                    return vec![self.bvlc_result(from, RESULT_REGISTER_FD_NAK)];
                }
                vec![self.bvlc_result(from, RESULT_SUCCESS)]
            }

            BvlcFunction::DeleteForeignDeviceTableEntry => {
                if payload.len() < 3 {
                    return vec![self.bvlc_result(from, RESULT_DELETE_FDT_NAK)];
                }
                let mut vmac = [0u8; 3];
                vmac.copy_from_slice(&payload[..3]);
                match self.fdt.delete(vmac_key(&vmac)) {
                    Some(_) => vec![self.bvlc_result(from, RESULT_SUCCESS)],
                    None => vec![self.bvlc_result(from, RESULT_DELETE_FDT_NAK)],
                }
            }

            BvlcFunction::AddressResolution => {
                if payload.len() < 3 {
                    return vec![self.bvlc_result(from, RESULT_ADDRESS_RESOLUTION_NAK)];
                }
                let mut target = [0u8; 3];
                target.copy_from_slice(&payload[..3]);
                match self.vmac_table.data(vmac_key(&target)) {
                    Some(resolved) => {
                        let mut data = Vec::new();
                        BvlcHeader {
                            bvlc_type: BVLL_TYPE_BACNET_IPV6,
                            function: BvlcFunction::AddressResolutionAck.to_byte(),
                            length: (4 + 3 + 18) as u16,
                        }
                        .encode(&mut data);
                        data.extend_from_slice(&target);
                        data.extend_from_slice(&resolved.ip().octets());
                        data.extend_from_slice(&resolved.port().to_be_bytes());
                        vec![Outbound { to: from, data }]
                    }
                    None => vec![self.bvlc_result(from, RESULT_ADDRESS_RESOLUTION_NAK)],
                }
            }

            BvlcFunction::VirtualAddressResolution => {
                let mut data = Vec::new();
                BvlcHeader {
                    bvlc_type: BVLL_TYPE_BACNET_IPV6,
                    function: BvlcFunction::VirtualAddressResolutionAck.to_byte(),
                    length: 7,
                }
                .encode(&mut data);
                data.extend_from_slice(&self.local_vmac);
                vec![Outbound { to: from, data }]
            }

            BvlcFunction::AddressResolutionAck
            | BvlcFunction::VirtualAddressResolutionAck
            | BvlcFunction::ForwardedAddressResolution
            | BvlcFunction::Result
            | BvlcFunction::SecureBvll => Vec::new(),
        }
    }

    /// 1Hz FDT aging tick, identical in shape to the IPv4 BBMD.
    pub fn age_foreign_devices(&mut self, elapsed_secs: u16) {
        let expired: Vec<u32> = self
            .fdt
            .iter()
            .filter_map(|(key, entry)| {
                if entry.ttl_remaining <= elapsed_secs {
                    Some(key)
                } else {
                    None
                }
            })
            .collect();
        for key in expired {
            self.fdt.delete(key);
        }
        for (_, entry) in self.fdt.iter_mut() {
            entry.ttl_remaining = entry.ttl_remaining.saturating_sub(elapsed_secs);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct RecordingSink(Vec<(Vmac, SocketAddrV6, Vec<u8>)>);
    impl Ipv6NpduSink for RecordingSink {
        fn deliver_npdu(&mut self, source_vmac: Vmac, source: SocketAddrV6, npdu: &[u8]) {
            self.0.push((source_vmac, source, npdu.to_vec()));
        }
    }

    fn addr(segments: [u16; 8], port: u16) -> SocketAddrV6 {
        SocketAddrV6::new(Ipv6Addr::new(
            segments[0], segments[1], segments[2], segments[3],
            segments[4], segments[5], segments[6], segments[7],
        ), port, 0, 0)
    }

    #[test]
    fn vmac_from_device_instance_uses_low_24_bits() {
        assert_eq!(vmac_from_device_instance(0x01020304), [0x02, 0x03, 0x04]);
    }

    #[test]
    fn multicast_group_embeds_scope_and_suffix() {
        let group = multicast_group(0x05);
        assert_eq!(group.segments()[0], 0xFF05);
        assert_eq!(group.segments()[7], 0xBAC0);
    }

    #[test]
    fn address_resolution_finds_known_peer() {
        let local_vmac = [0, 0, 1];
        let mut bbmd = Bbmd6::new(local_vmac, addr([0xfd00, 0, 0, 0, 0, 0, 0, 1], 47808));
        let mut sink = RecordingSink(Vec::new());
        let peer_vmac = [0, 0, 2];
        let peer_addr = addr([0xfd00, 0, 0, 0, 0, 0, 0, 2], 47808);

        // learn the peer via an unrelated inbound datagram first
        let mut unicast = Vec::new();
        BvlcHeader {
            bvlc_type: BVLL_TYPE_BACNET_IPV6,
            function: BvlcFunction::OriginalUnicastNpdu.to_byte(),
            length: 4,
        }
        .encode(&mut unicast);
        bbmd.handle_datagram(peer_vmac, peer_addr, &unicast, &mut sink);

        let mut resolve = Vec::new();
        BvlcHeader {
            bvlc_type: BVLL_TYPE_BACNET_IPV6,
            function: BvlcFunction::AddressResolution.to_byte(),
            length: 7,
        }
        .encode(&mut resolve);
        resolve.extend_from_slice(&peer_vmac);
        let out = bbmd.handle_datagram([0, 0, 3], addr([0xfd00, 0, 0, 0, 0, 0, 0, 3], 47808), &resolve, &mut sink);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].data[1], BvlcFunction::AddressResolutionAck.to_byte());
    }

    #[test]
    fn register_foreign_device_acks_and_ages_out() {
        let local_vmac = [0, 0, 1];
        let mut bbmd = Bbmd6::new(local_vmac, addr([0xfd00, 0, 0, 0, 0, 0, 0, 1], 47808));
        let mut sink = RecordingSink(Vec::new());
        let peer_vmac = [0, 0, 2];
        let peer_addr = addr([0xfd00, 0, 0, 0, 0, 0, 0, 2], 47808);
        let mut data = Vec::new();
        BvlcHeader {
            bvlc_type: BVLL_TYPE_BACNET_IPV6,
            function: BvlcFunction::RegisterForeignDevice.to_byte(),
            length: 6,
        }
        .encode(&mut data);
        data.extend_from_slice(&30u16.to_be_bytes());
        let out = bbmd.handle_datagram(peer_vmac, peer_addr, &data, &mut sink);
        assert_eq!(out[0].data[4..6], RESULT_SUCCESS.to_be_bytes());
        assert_eq!(bbmd.fdt.count(), 1);
        bbmd.age_foreign_devices(100);
        assert_eq!(bbmd.fdt.count(), 0);
    }
}
