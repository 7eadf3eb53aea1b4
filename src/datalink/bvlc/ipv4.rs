//! BACnet/IP (BVLC over IPv4) — BBMD Forwarding (C10)
//!
//! Implements the function codes of ASHRAE 135 Annex J: local
//! broadcast relay through a Broadcast Distribution Table (BDT), and
//! foreign-device registration through a Foreign Device Table (FDT)
//! with 1Hz TTL aging (spec.md §4.10).

use std::net::{Ipv4Addr, SocketAddrV4};
use std::time::Duration;

use crate::keyed_list::KeyedList;

use super::{BvlcHeader, BVLL_TYPE_BACNET_IP};

/// BVLC/IPv4 function codes (ASHRAE 135 Annex J.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BvlcFunction {
    Result,
    WriteBroadcastDistributionTable,
    ReadBroadcastDistributionTable,
    ReadBroadcastDistributionTableAck,
    ForwardedNpdu,
    RegisterForeignDevice,
    ReadForeignDeviceTable,
    ReadForeignDeviceTableAck,
    DeleteForeignDeviceTableEntry,
    DistributeBroadcastToNetwork,
    OriginalUnicastNpdu,
    OriginalBroadcastNpdu,
    SecureBvll,
}

impl BvlcFunction {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            0 => BvlcFunction::Result,
            1 => BvlcFunction::WriteBroadcastDistributionTable,
            2 => BvlcFunction::ReadBroadcastDistributionTable,
            3 => BvlcFunction::ReadBroadcastDistributionTableAck,
            4 => BvlcFunction::ForwardedNpdu,
            5 => BvlcFunction::RegisterForeignDevice,
            6 => BvlcFunction::ReadForeignDeviceTable,
            7 => BvlcFunction::ReadForeignDeviceTableAck,
            8 => BvlcFunction::DeleteForeignDeviceTableEntry,
            9 => BvlcFunction::DistributeBroadcastToNetwork,
            10 => BvlcFunction::OriginalUnicastNpdu,
            11 => BvlcFunction::OriginalBroadcastNpdu,
            12 => BvlcFunction::SecureBvll,
            _ => return None,
        })
    }

    pub fn to_byte(self) -> u8 {
        match self {
            BvlcFunction::Result => 0,
            BvlcFunction::WriteBroadcastDistributionTable => 1,
            BvlcFunction::ReadBroadcastDistributionTable => 2,
            BvlcFunction::ReadBroadcastDistributionTableAck => 3,
            BvlcFunction::ForwardedNpdu => 4,
            BvlcFunction::RegisterForeignDevice => 5,
            BvlcFunction::ReadForeignDeviceTable => 6,
            BvlcFunction::ReadForeignDeviceTableAck => 7,
            BvlcFunction::DeleteForeignDeviceTableEntry => 8,
            BvlcFunction::DistributeBroadcastToNetwork => 9,
            BvlcFunction::OriginalUnicastNpdu => 10,
            BvlcFunction::OriginalBroadcastNpdu => 11,
            BvlcFunction::SecureBvll => 12,
        }
    }
}

/// BVLC-Result codes (ASHRAE 135 Table J-2).
pub const RESULT_SUCCESS: u16 = 0x0000;
pub const RESULT_WRITE_BDT_NAK: u16 = 0x0010;
pub const RESULT_READ_BDT_NAK: u16 = 0x0020;
pub const RESULT_REGISTER_FD_NAK: u16 = 0x0030;
pub const RESULT_READ_FDT_NAK: u16 = 0x0040;
pub const RESULT_DELETE_FDT_NAK: u16 = 0x0050;
pub const RESULT_DISTRIBUTE_BROADCAST_NAK: u16 = 0x0060;

/// Grace margin added to a foreign device's requested TTL before it is
/// dropped (spec.md §4.10: `ttl_remaining = ttl_seconds + 30`).
pub const FOREIGN_DEVICE_TTL_GRACE_SECONDS: u16 = 30;

/// One Broadcast Distribution Table entry: a peer BBMD and the mask it
/// uses to reach its own directed-broadcast address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BdtEntry {
    pub address: SocketAddrV4,
    pub broadcast_mask: Ipv4Addr,
}

/// One Foreign Device Table entry: a registered remote device and its
/// remaining lease, in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FdtEntry {
    pub address: SocketAddrV4,
    pub ttl_seconds: u16,
    pub ttl_remaining: u16,
}

fn key_of(addr: &SocketAddrV4) -> u32 {
    u32::from(*addr.ip())
}

/// The directed-broadcast address a BDT entry's peer BBMD listens on:
/// its network address with every host bit set (spec.md §4.10 bullet
/// (b), §8 scenario 5 — "10.0.0.2's directed broadcast").
fn directed_broadcast(entry: &BdtEntry) -> SocketAddrV4 {
    let host_bits = !u32::from(entry.broadcast_mask);
    let broadcast_ip = Ipv4Addr::from(u32::from(*entry.address.ip()) | host_bits);
    SocketAddrV4::new(broadcast_ip, entry.address.port())
}

/// Outbound instruction the BBMD hands back to the UDP socket layer.
pub struct Outbound {
    pub to: SocketAddrV4,
    pub data: Vec<u8>,
}

/// Upward delivery hook for NPDUs the BBMD reassembles out of incoming
/// BVLC datagrams (mirrors [`crate::datalink::mstp::master::NpduSink`]
/// for the IP transport).
pub trait Ipv4NpduSink {
    fn deliver_npdu(&mut self, source: SocketAddrV4, npdu: &[u8]);
}

/// One BACnet/IP BBMD: owns the BDT and FDT and implements the
/// forwarding rules of ASHRAE 135 Annex J.
pub struct Bbmd {
    pub local_address: SocketAddrV4,
    pub bdt: KeyedList<BdtEntry>,
    pub fdt: KeyedList<FdtEntry>,
}

impl Bbmd {
    pub fn new(local_address: SocketAddrV4) -> Self {
        Self {
            local_address,
            bdt: KeyedList::new(),
            fdt: KeyedList::new(),
        }
    }

    fn bvlc_result(&self, to: SocketAddrV4, code: u16) -> Outbound {
        let mut data = Vec::with_capacity(6);
        BvlcHeader {
            bvlc_type: BVLL_TYPE_BACNET_IP,
            function: BvlcFunction::Result.to_byte(),
            length: 6,
        }
        .encode(&mut data);
        data.extend_from_slice(&code.to_be_bytes());
        Outbound { to, data }
    }

    fn encode_forwarded_npdu(&self, original_source: SocketAddrV4, npdu: &[u8]) -> Vec<u8> {
        let mut data = Vec::with_capacity(10 + npdu.len());
        BvlcHeader {
            bvlc_type: BVLL_TYPE_BACNET_IP,
            function: BvlcFunction::ForwardedNpdu.to_byte(),
            length: (10 + npdu.len()) as u16,
        }
        .encode(&mut data);
        data.extend_from_slice(&original_source.ip().octets());
        data.extend_from_slice(&original_source.port().to_be_bytes());
        data.extend_from_slice(npdu);
        data
    }

    /// Broadcast an NPDU to every BDT peer (except ourselves) and
    /// every live FDT entry, wrapped as Forwarded-NPDU. Used both for
    /// Original-Broadcast-NPDU relay and Distribute-Broadcast-To-Network.
    ///
    /// `skip_fdt_origin`, when set, excludes the FDT entry matching
    /// `original_source` from the FDT leg — Distribute-Broadcast-To-
    /// Network is received from a registered foreign device and must
    /// not be echoed straight back to it (spec.md §4.10, §8 invariant
    /// 5). Original-Broadcast-NPDU's originator is on-subnet, never an
    /// FDT entry, so it passes `false`.
    fn relay_to_bdt_and_fdt(
        &self,
        original_source: SocketAddrV4,
        npdu: &[u8],
        skip_fdt_origin: bool,
    ) -> Vec<Outbound> {
        let payload = self.encode_forwarded_npdu(original_source, npdu);
        let mut out = Vec::new();
        for (_, entry) in self.bdt.iter() {
            if entry.address == self.local_address {
                continue;
            }
            out.push(Outbound {
                to: directed_broadcast(entry),
                data: payload.clone(),
            });
        }
        for (_, entry) in self.fdt.iter() {
            if skip_fdt_origin && entry.address == original_source {
                continue;
            }
            out.push(Outbound {
                to: entry.address,
                data: payload.clone(),
            });
        }
        out
    }

    /// Handle one inbound BVLC/IPv4 datagram from `from`. Returns any
    /// datagrams that must be sent back out, and delivers reassembled
    /// NPDUs to `sink` as a side effect.
    pub fn handle_datagram(
        &mut self,
        from: SocketAddrV4,
        data: &[u8],
        sink: &mut dyn Ipv4NpduSink,
    ) -> Vec<Outbound> {
        let (header, header_len) = match BvlcHeader::parse(data) {
            Some(h) => h,
            None => return Vec::new(),
        };
        let Some(function) = BvlcFunction::from_byte(header.function) else {
            return Vec::new();
        };
        let payload = &data[header_len..];

        match function {
            BvlcFunction::OriginalUnicastNpdu => {
                sink.deliver_npdu(from, payload);
                Vec::new()
            }

            BvlcFunction::OriginalBroadcastNpdu => {
                sink.deliver_npdu(from, payload);
                self.relay_to_bdt_and_fdt(from, payload, false)
            }

            BvlcFunction::ForwardedNpdu => {
                if payload.len() < 6 {
                    return Vec::new();
                }
                let original_ip = Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]);
                let original_port = u16::from_be_bytes([payload[4], payload[5]]);
                let original_source = SocketAddrV4::new(original_ip, original_port);
                sink.deliver_npdu(original_source, &payload[6..]);

                // Split horizon: forward to our own FDT only, never
                // back out across the BDT a peer BBMD already used.
                let relay = self.encode_forwarded_npdu(original_source, &payload[6..]);
                self.fdt
                    .iter()
                    .map(|(_, entry)| Outbound {
                        to: entry.address,
                        data: relay.clone(),
                    })
                    .collect()
            }

            BvlcFunction::DistributeBroadcastToNetwork => {
                if self.fdt.data(key_of(&from)).is_none() {
                    return vec![self.bvlc_result(from, RESULT_DISTRIBUTE_BROADCAST_NAK)];
                }
                sink.deliver_npdu(from, payload);
                self.relay_to_bdt_and_fdt(from, payload, true)
            }

            BvlcFunction::RegisterForeignDevice => {
                if payload.len() < 2 {
                    return vec![self.bvlc_result(from, RESULT_REGISTER_FD_NAK)];
                }
                let ttl_seconds = u16::from_be_bytes([payload[0], payload[1]]);
                let entry = FdtEntry {
                    address: from,
                    ttl_seconds,
                    ttl_remaining: ttl_seconds.saturating_add(FOREIGN_DEVICE_TTL_GRACE_SECONDS),
                };
                let key = key_of(&from);
                if self.fdt.data(key).is_some() {
                    *self.fdt.data_mut(key).unwrap() = entry;
                    log::debug!("bvlc: refreshed foreign device {} ttl={}", from, ttl_seconds);
                } else if self.fdt.add(key, entry).is_none() {
                    log::warn!("bvlc: foreign device table full, rejecting {}", from);
                    return vec![self.bvlc_result(from, RESULT_REGISTER_FD_NAK)];
                } else {
                    log::debug!("bvlc: registered foreign device {} ttl={}", from, ttl_seconds);
                }
                vec![self.bvlc_result(from, RESULT_SUCCESS)]
            }

            BvlcFunction::DeleteForeignDeviceTableEntry => {
                if payload.len() < 6 {
                    return vec![self.bvlc_result(from, RESULT_DELETE_FDT_NAK)];
                }
                let ip = Ipv4Addr::new(payload[0], payload[1], payload[2], payload[3]);
                let port = u16::from_be_bytes([payload[4], payload[5]]);
                let key = key_of(&SocketAddrV4::new(ip, port));
                match self.fdt.delete(key) {
                    Some(_) => vec![self.bvlc_result(from, RESULT_SUCCESS)],
                    None => vec![self.bvlc_result(from, RESULT_DELETE_FDT_NAK)],
                }
            }

            BvlcFunction::ReadForeignDeviceTable => {
                let mut data = Vec::new();
                let entries: Vec<_> = self.fdt.iter().map(|(_, e)| *e).collect();
                let body_len = 10 * entries.len();
                BvlcHeader {
                    bvlc_type: BVLL_TYPE_BACNET_IP,
                    function: BvlcFunction::ReadForeignDeviceTableAck.to_byte(),
                    length: (4 + body_len) as u16,
                }
                .encode(&mut data);
                for entry in entries {
                    data.extend_from_slice(&entry.address.ip().octets());
                    data.extend_from_slice(&entry.address.port().to_be_bytes());
                    data.extend_from_slice(&entry.ttl_seconds.to_be_bytes());
                    data.extend_from_slice(&entry.ttl_remaining.to_be_bytes());
                }
                vec![Outbound { to: from, data }]
            }

            BvlcFunction::WriteBroadcastDistributionTable => {
                if payload.len() % 10 != 0 {
                    return vec![self.bvlc_result(from, RESULT_WRITE_BDT_NAK)];
                }
                self.bdt = KeyedList::new();
                for chunk in payload.chunks_exact(10) {
                    let ip = Ipv4Addr::new(chunk[0], chunk[1], chunk[2], chunk[3]);
                    let port = u16::from_be_bytes([chunk[4], chunk[5]]);
                    let mask = Ipv4Addr::new(chunk[6], chunk[7], chunk[8], chunk[9]);
                    let address = SocketAddrV4::new(ip, port);
                    self.bdt.add(
                        key_of(&address),
                        BdtEntry {
                            address,
                            broadcast_mask: mask,
                        },
                    );
                }
                vec![self.bvlc_result(from, RESULT_SUCCESS)]
            }

            BvlcFunction::ReadBroadcastDistributionTable => {
                let mut data = Vec::new();
                let entries: Vec<_> = self.bdt.iter().map(|(_, e)| *e).collect();
                let body_len = 10 * entries.len();
                BvlcHeader {
                    bvlc_type: BVLL_TYPE_BACNET_IP,
                    function: BvlcFunction::ReadBroadcastDistributionTableAck.to_byte(),
                    length: (4 + body_len) as u16,
                }
                .encode(&mut data);
                for entry in entries {
                    data.extend_from_slice(&entry.address.ip().octets());
                    data.extend_from_slice(&entry.address.port().to_be_bytes());
                    data.extend_from_slice(&entry.broadcast_mask.octets());
                }
                vec![Outbound { to: from, data }]
            }

            BvlcFunction::ReadBroadcastDistributionTableAck
            | BvlcFunction::Result
            | BvlcFunction::SecureBvll => Vec::new(),
        }
    }

    /// Advance FDT lease timers by one tick and drop entries that have
    /// expired. Call this once per second from the embedder's main
    /// loop (spec.md §4.10 "1Hz FDT aging tick").
    pub fn age_foreign_devices(&mut self, elapsed: Duration) {
        let elapsed_secs = elapsed.as_secs().min(u16::MAX as u64) as u16;
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
            if let Some(entry) = self.fdt.delete(key) {
                log::debug!("bvlc: foreign device {} lease expired", entry.address);
            }
        }
        for (_, entry) in self.fdt.iter_mut() {
            entry.ttl_remaining = entry.ttl_remaining.saturating_sub(elapsed_secs);
        }
    }
}
