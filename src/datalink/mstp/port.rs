//! MS/TP Port State and Driver Capability Trait
//!
//! [`MstpPort`] holds every field spec.md §3 names for an MS/TP port
//! record. A C implementation wires this up through a vtable struct
//! (`mstp_port_struct_t`); this crate re-architects that as the small
//! [`Driver`] capability trait (spec.md §9) the embedder implements
//! once per physical link, plus [`MstpPortConfig`] for the
//! embedder-supplied constants spec.md §6 calls out.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use super::frame::{MstpFrame, ReceiveFsm};
use super::master::MasterState;
use super::slave::SlaveState;
use super::zeroconfig::ZeroConfigState;
use super::autobaud::AutoBaudState;
use crate::ring::RingBuffer;

/// Downward driver interface (spec.md §6). Implemented by the
/// embedder once per physical RS-485 link.
pub trait Driver {
    /// Blocking send of `buf`; returns once the last octet has been
    /// shifted out.
    fn send_bytes(&mut self, buf: &[u8]);
    /// Number of octets currently available to read.
    fn bytes_available(&self) -> usize;
    /// Read up to `buf.len()` octets, returning the count actually
    /// read.
    fn read_bytes(&mut self, buf: &mut [u8]) -> usize;
    /// Milliseconds elapsed since the driver last observed a
    /// transmitted or received octet.
    fn silence_ms(&self) -> u32;
    /// Reset the silence timer to zero.
    fn silence_reset(&mut self);
    /// Current baud rate.
    fn baud_rate(&self) -> u32;
    /// Change the baud rate (used by auto-baud).
    fn baud_rate_set(&mut self, bps: u32);
    /// Assert or deassert the RS-485 driver-enable (RTS) line.
    fn rts_enable(&mut self, enabled: bool);
}

/// Baud rates tried by auto-baud, in probe order (spec.md §4.9).
pub const BAUD_LADDER: [u32; 6] = [9600, 19200, 38400, 57600, 76800, 115200];

/// Embedder-supplied constants for one MS/TP port (spec.md §6 "supplied
/// by the embedder as constants or init-struct fields"); teacher
/// precedent: `MstpConfig` with a `Default` impl.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MstpPortConfig {
    /// Preferred/initial station address (1..127 master range).
    pub this_station: u8,
    /// Highest addressable master on the ring.
    pub nmax_master: u8,
    /// Max frames transmitted per token hold.
    pub nmax_info_frames: u8,
    /// Token passes between `PollForMaster` sweeps.
    pub npoll: u8,
    /// Token-pass retries before falling back to `PollForMaster`.
    pub nretry_token: u8,
    /// Reply timeout in ms, nominal range 255-300.
    pub treply_timeout_ms: u32,
    /// Token usage-acceptance window in ms, nominal range 20-35.
    pub tusage_timeout_ms: u32,
    /// Reply-within window for `AnswerDataRequest`, nominally 250ms.
    pub treply_delay_ms: u32,
    /// Whether zero-configuration address assignment is enabled.
    pub zero_config_enabled: bool,
    /// Whether auto-baud detection should run at startup.
    pub check_auto_baud: bool,
    /// Whether this node also answers as a slave (never claims token).
    pub slave_node_enabled: bool,
}

impl Default for MstpPortConfig {
    fn default() -> Self {
        Self {
            this_station: 1,
            nmax_master: 127,
            nmax_info_frames: 1,
            npoll: 50,
            nretry_token: 1,
            treply_timeout_ms: 295,
            tusage_timeout_ms: 30,
            treply_delay_ms: 250,
            zero_config_enabled: false,
            check_auto_baud: false,
            slave_node_enabled: false,
        }
    }
}

/// Ambient diagnostic counters (spec.md §3 supplement, not part of
/// protocol semantics — see SPEC_FULL.md §3).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PortStats {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub frames_aborted: u64,
    pub crc_errors: u64,
    pub oversize_dropped: u64,
}

/// One MS/TP port: every field spec.md §3 names for the port record,
/// plus the sub-FSM states and their backing ring buffer.
pub struct MstpPort {
    pub config: MstpPortConfig,

    pub this_station: u8,
    pub next_station: u8,
    pub poll_station: u8,

    pub token_count: u32,
    pub frame_count: u8,
    pub retry_count: u8,

    pub rx_ring: RingBuffer<u8>,
    pub tx_buffer: Vec<u8>,

    pub receive_fsm: ReceiveFsm,
    pub master_state: MasterState,
    pub slave_state: SlaveState,
    pub zero_config_state: ZeroConfigState,
    pub auto_baud_state: AutoBaudState,

    pub uuid: [u8; 16],

    pub sole_master: bool,
    pub slave_node_enabled: bool,
    pub zero_config_enabled: bool,
    pub check_auto_baud: bool,
    pub receive_error: bool,
    pub data_available: bool,
    pub received_valid_frame: bool,
    pub received_invalid_frame: bool,

    /// Silence timer and frame-abort timer, kept independent per
    /// SPEC_FULL.md §3 (driven off the same millisecond tick but not
    /// sharing a counter, so frame-abort detection never disturbs
    /// auto-baud's valid-frame window).
    pub silence_timer_ms: u32,
    pub frame_abort_timer_ms: u32,

    pub stats: PortStats,

    pending_frame: Option<MstpFrame>,
}

impl MstpPort {
    pub fn new(config: MstpPortConfig, baud_rate: u32, ring_capacity: usize) -> Self {
        let this_station = config.this_station;
        Self {
            this_station,
            next_station: this_station,
            poll_station: this_station,
            token_count: 0,
            frame_count: 0,
            retry_count: 0,
            rx_ring: RingBuffer::new(ring_capacity),
            tx_buffer: Vec::new(),
            receive_fsm: ReceiveFsm::new(baud_rate),
            master_state: MasterState::Initialize,
            slave_state: SlaveState::Idle,
            zero_config_state: if config.zero_config_enabled {
                ZeroConfigState::Init
            } else {
                ZeroConfigState::Use
            },
            auto_baud_state: if config.check_auto_baud {
                AutoBaudState::Idle
            } else {
                AutoBaudState::Locked
            },
            uuid: [0; 16],
            sole_master: false,
            slave_node_enabled: config.slave_node_enabled,
            zero_config_enabled: config.zero_config_enabled,
            check_auto_baud: config.check_auto_baud,
            receive_error: false,
            data_available: false,
            received_valid_frame: false,
            received_invalid_frame: false,
            silence_timer_ms: 0,
            frame_abort_timer_ms: 0,
            stats: PortStats::default(),
            pending_frame: None,
            config,
        }
    }

    /// Invariant from spec.md §3: when operating as master,
    /// `this_station <= nmax_master`.
    pub fn station_invariant_holds(&self) -> bool {
        self.slave_node_enabled || self.this_station <= self.config.nmax_master
    }

    pub fn take_pending_frame(&mut self) -> Option<MstpFrame> {
        self.pending_frame.take()
    }

    pub fn set_pending_frame(&mut self, frame: MstpFrame) {
        self.pending_frame = Some(frame);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_spec_defaults() {
        let cfg = MstpPortConfig::default();
        assert_eq!(cfg.nmax_master, 127);
        assert_eq!(cfg.npoll, 50);
        assert_eq!(cfg.nretry_token, 1);
    }

    #[test]
    fn new_port_initializes_ring_topology_to_self() {
        let port = MstpPort::new(MstpPortConfig::default(), 38400, 64);
        assert_eq!(port.next_station, port.this_station);
        assert_eq!(port.poll_station, port.this_station);
    }

    #[test]
    fn station_invariant_holds_for_master_within_range() {
        let mut cfg = MstpPortConfig::default();
        cfg.this_station = 200;
        cfg.nmax_master = 127;
        let port = MstpPort::new(cfg, 38400, 64);
        assert!(!port.station_invariant_holds());
    }
}
