//! MS/TP Slave FSM (C7)
//!
//! A slave node never claims the token: it ignores `Token` and
//! `Poll-For-Master` frames entirely and only ever answers a data
//! frame addressed to it (spec.md §4.7).

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use super::frame::{FrameType, MstpFrame};
use super::master::{FrameSource, NpduSink};
use super::port::{Driver, MstpPort};

/// States of the MS/TP slave FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlaveState {
    Idle,
    AnswerDataRequest,
}

/// Slave-side FSM: responds only, never touches the token.
pub struct SlaveFsm {
    reply_timer_ms: u32,
}

impl SlaveFsm {
    pub fn new() -> Self {
        Self { reply_timer_ms: 0 }
    }

    pub fn step(
        &mut self,
        port: &mut MstpPort,
        driver: &mut dyn Driver,
        sink: &mut dyn NpduSink,
        source: &mut dyn FrameSource,
        elapsed_ms: u32,
        incoming: Option<MstpFrame>,
    ) {
        match port.slave_state {
            SlaveState::Idle => {
                if let Some(frame) = incoming {
                    if frame.frame_type == FrameType::Token
                        || frame.frame_type == FrameType::PollForMaster
                    {
                        // Slaves never claim the token or answer PFM sweeps.
                        return;
                    }
                    if frame.destination == port.this_station {
                        match frame.frame_type {
                            FrameType::BacnetDataNotExpectingReply => {
                                sink.deliver_npdu(frame.source, &frame.data);
                            }
                            FrameType::BacnetDataExpectingReply | FrameType::TestRequest => {
                                sink.deliver_npdu(frame.source, &frame.data);
                                port.set_pending_frame(frame);
                                self.reply_timer_ms = 0;
                                port.slave_state = SlaveState::AnswerDataRequest;
                            }
                            _ => {}
                        }
                    }
                }
            }
            SlaveState::AnswerDataRequest => {
                self.reply_timer_ms += elapsed_ms;
                if self.reply_timer_ms > port.config.treply_delay_ms {
                    // Stay silent; the master will retry.
                    log::warn!(
                        "mstp[{}]: Treply_delay exceeded with no reply queued, staying silent",
                        port.this_station
                    );
                    port.take_pending_frame();
                    port.slave_state = SlaveState::Idle;
                    return;
                }
                if let Some(reply) = source.get_reply(port.config.treply_delay_ms - self.reply_timer_ms) {
                    if let Some(request) = port.take_pending_frame() {
                        let encoded = MstpFrame::new(
                            reply.frame_type,
                            request.source,
                            port.this_station,
                            reply.data,
                        )
                        .encode();
                        driver.send_bytes(&encoded);
                        port.stats.frames_sent += 1;
                    }
                    port.slave_state = SlaveState::Idle;
                }
            }
        }
    }
}

impl Default for SlaveFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalink::mstp::port::MstpPortConfig;
    use crate::datalink::mstp::master::OutgoingFrame;

    struct NullDriver(Vec<Vec<u8>>);
    impl Driver for NullDriver {
        fn send_bytes(&mut self, buf: &[u8]) {
            self.0.push(buf.to_vec());
        }
        fn bytes_available(&self) -> usize {
            0
        }
        fn read_bytes(&mut self, _buf: &mut [u8]) -> usize {
            0
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

    struct RecordingSink(Vec<(u8, Vec<u8>)>);
    impl NpduSink for RecordingSink {
        fn deliver_npdu(&mut self, source_station: u8, npdu: &[u8]) {
            self.0.push((source_station, npdu.to_vec()));
        }
    }

    struct NoReplySource;
    impl FrameSource for NoReplySource {
        fn get_send(&mut self, _timeout_ms: u32) -> Option<OutgoingFrame> {
            None
        }
        fn get_reply(&mut self, _timeout_ms: u32) -> Option<OutgoingFrame> {
            None
        }
    }

    fn test_port() -> MstpPort {
        MstpPort::new(MstpPortConfig::default(), 38400, 64)
    }

    #[test]
    fn slave_ignores_token() {
        let mut port = test_port();
        let mut fsm = SlaveFsm::new();
        let mut driver = NullDriver(Vec::new());
        let mut sink = RecordingSink(Vec::new());
        let token = MstpFrame::token(1, 2);
        fsm.step(&mut port, &mut driver, &mut sink, &mut NoReplySource, 0, Some(token));
        assert_eq!(port.slave_state, SlaveState::Idle);
        assert!(driver.0.is_empty());
    }

    #[test]
    fn slave_delivers_data_not_expecting_reply() {
        let mut port = test_port();
        let mut fsm = SlaveFsm::new();
        let mut driver = NullDriver(Vec::new());
        let mut sink = RecordingSink(Vec::new());
        let frame = MstpFrame::new(
            FrameType::BacnetDataNotExpectingReply,
            port.this_station,
            5,
            vec![0xAA],
        );
        fsm.step(&mut port, &mut driver, &mut sink, &mut NoReplySource, 0, Some(frame));
        assert_eq!(sink.0, vec![(5, vec![0xAA])]);
        assert_eq!(port.slave_state, SlaveState::Idle);
    }

    #[test]
    fn slave_stays_silent_past_reply_delay() {
        let mut port = test_port();
        let mut fsm = SlaveFsm::new();
        let mut driver = NullDriver(Vec::new());
        let mut sink = RecordingSink(Vec::new());
        let frame = MstpFrame::new(
            FrameType::BacnetDataExpectingReply,
            port.this_station,
            5,
            vec![0xAA],
        );
        fsm.step(&mut port, &mut driver, &mut sink, &mut NoReplySource, 0, Some(frame));
        assert_eq!(port.slave_state, SlaveState::AnswerDataRequest);
        fsm.step(
            &mut port,
            &mut driver,
            &mut sink,
            &mut NoReplySource,
            port.config.treply_delay_ms + 1,
            None,
        );
        assert_eq!(port.slave_state, SlaveState::Idle);
        assert!(driver.0.is_empty());
    }
}
