//! MS/TP (Master-Slave/Token-Passing) Data Link
//!
//! An RS-485 transport built from six cooperating pieces: wire framing
//! and octet reassembly ([`frame`]), the port's shared state
//! ([`port`]), the master token-passing FSM ([`master`]), the slave
//! FSM ([`slave`]), zero-configuration address assignment
//! ([`zeroconfig`]), and auto-baud detection ([`autobaud`]).
//!
//! Startup ordering: when both zero-config and auto-baud are enabled,
//! auto-baud must reach [`autobaud::AutoBaudState::Locked`] before
//! zero-config leaves [`zeroconfig::ZeroConfigState::Init`] — there is
//! no point lurking for traffic at the wrong baud rate. [`MstpStack`]
//! enforces that ordering in [`MstpStack::step`].

pub mod autobaud;
pub mod frame;
pub mod master;
pub mod port;
pub mod slave;
pub mod zeroconfig;

use self::autobaud::{AutoBaudFsm, AutoBaudState};
use self::frame::{ReceiveEvent, ReceiveFsm};
use self::master::{FrameSource, MasterFsm, NpduSink};
use self::port::{Driver, MstpPort};
use self::slave::SlaveFsm;
use self::zeroconfig::ZeroConfigFsm;

pub use master::OutgoingFrame;
pub use port::{MstpPortConfig, PortStats};

/// Owns one MS/TP port's state plus every sub-FSM driver that steps
/// it, wiring them together the way spec.md §6 describes the main
/// loop doing it by hand.
pub struct MstpStack {
    pub port: MstpPort,
    master: MasterFsm,
    slave: SlaveFsm,
    zero_config: ZeroConfigFsm,
    auto_baud: AutoBaudFsm,
}

impl MstpStack {
    pub fn new(config: MstpPortConfig, baud_rate: u32, ring_capacity: usize) -> Self {
        let preferred_station = config.this_station;
        Self {
            port: MstpPort::new(config, baud_rate, ring_capacity),
            master: MasterFsm::new(),
            slave: SlaveFsm::new(),
            zero_config: ZeroConfigFsm::new(preferred_station),
            auto_baud: AutoBaudFsm::new(),
        }
    }

    /// Drive one iteration of the stack. Reads as many octets as the
    /// driver currently has available, reassembles them into frames,
    /// and feeds any fully validated (or explicitly invalid) frame
    /// into whichever sub-FSM currently owns the port.
    pub fn step(
        &mut self,
        driver: &mut dyn Driver,
        sink: &mut dyn NpduSink,
        source: &mut dyn FrameSource,
        elapsed_ms: u32,
    ) {
        let mut incoming = None;
        let mut saw_invalid = false;

        let mut buf = [0u8; 64];
        loop {
            let read = driver.read_bytes(&mut buf);
            if read == 0 {
                break;
            }
            for &byte in &buf[..read] {
                match self.port.receive_fsm.process_octet(byte) {
                    ReceiveEvent::ValidFrame(frame) => {
                        self.port.stats.frames_received += 1;
                        incoming = Some(frame);
                    }
                    ReceiveEvent::InvalidFrame => {
                        self.port.stats.frames_aborted += 1;
                        saw_invalid = true;
                    }
                    ReceiveEvent::None => {}
                }
            }
        }
        if let ReceiveEvent::InvalidFrame = self.port.receive_fsm.tick(elapsed_ms) {
            self.port.stats.frames_aborted += 1;
            saw_invalid = true;
        }

        if self.port.check_auto_baud && self.port.auto_baud_state != AutoBaudState::Locked {
            let frame_seen = if incoming.is_some() {
                Some(true)
            } else if saw_invalid {
                Some(false)
            } else {
                None
            };
            self.auto_baud.step(
                &mut self.port.auto_baud_state,
                driver,
                elapsed_ms,
                frame_seen,
            );
            return;
        }

        if self.port.zero_config_enabled
            && !matches!(self.port.zero_config_state, zeroconfig::ZeroConfigState::Use)
        {
            if let Some(reply) = self
                .zero_config
                .step(&mut self.port, elapsed_ms, incoming.as_ref())
            {
                let encoded = reply.encode();
                driver.send_bytes(&encoded);
                self.port.stats.frames_sent += 1;
            }
            return;
        }

        if self.port.slave_node_enabled {
            self.slave
                .step(&mut self.port, driver, sink, source, elapsed_ms, incoming);
        } else {
            self.master
                .step(&mut self.port, driver, sink, source, elapsed_ms, incoming);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalink::mstp::frame::{FrameType, MstpFrame};

    struct LoopbackDriver {
        inbox: Vec<u8>,
        sent: Vec<Vec<u8>>,
    }
    impl Driver for LoopbackDriver {
        fn send_bytes(&mut self, buf: &[u8]) {
            self.sent.push(buf.to_vec());
        }
        fn bytes_available(&self) -> usize {
            self.inbox.len()
        }
        fn read_bytes(&mut self, buf: &mut [u8]) -> usize {
            let n = buf.len().min(self.inbox.len());
            buf[..n].copy_from_slice(&self.inbox[..n]);
            self.inbox.drain(..n);
            n
        }
        fn silence_ms(&self) -> u32 {
            0
        }
        fn silence_reset(&mut self) {}
        fn baud_rate(&self) -> u32 {
            38400
        }
        fn baud_rate_set(&mut self, _bps: u32) {}
        fn rts_enable(&mut self, _enabled: bool) {}
    }

    struct NullSink;
    impl NpduSink for NullSink {
        fn deliver_npdu(&mut self, _source_station: u8, _npdu: &[u8]) {}
    }

    struct EmptySource;
    impl FrameSource for EmptySource {
        fn get_send(&mut self, _timeout_ms: u32) -> Option<OutgoingFrame> {
            None
        }
        fn get_reply(&mut self, _timeout_ms: u32) -> Option<OutgoingFrame> {
            None
        }
    }

    #[test]
    fn stack_hands_received_token_to_master_fsm() {
        let mut stack = MstpStack::new(MstpPortConfig::default(), 38400, 64);
        stack.port.master_state = master::MasterState::Idle;
        let token = MstpFrame::token(1, 2).encode();
        let mut driver = LoopbackDriver {
            inbox: token,
            sent: Vec::new(),
        };
        stack.step(&mut driver, &mut NullSink, &mut EmptySource, 0);
        assert_eq!(stack.port.master_state, master::MasterState::UseToken);
    }

    #[test]
    fn slave_node_routes_through_slave_fsm() {
        let mut cfg = MstpPortConfig::default();
        cfg.slave_node_enabled = true;
        let mut stack = MstpStack::new(cfg, 38400, 64);
        let token = MstpFrame::token(1, 2).encode();
        let mut driver = LoopbackDriver {
            inbox: token,
            sent: Vec::new(),
        };
        stack.step(&mut driver, &mut NullSink, &mut EmptySource, 0);
        assert_eq!(stack.port.slave_state, slave::SlaveState::Idle);
        assert_eq!(stack.port.master_state, master::MasterState::Initialize);
    }

    #[test]
    fn auto_baud_runs_before_zero_config_when_both_enabled() {
        let mut cfg = MstpPortConfig::default();
        cfg.check_auto_baud = true;
        cfg.zero_config_enabled = true;
        let stack = MstpStack::new(cfg, 38400, 64);
        assert_eq!(stack.port.auto_baud_state, AutoBaudState::Idle);
        assert_eq!(
            stack.port.zero_config_state,
            zeroconfig::ZeroConfigState::Init
        );
    }
}
