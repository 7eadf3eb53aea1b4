//! MS/TP Master FSM (C6)
//!
//! Implements the token life-cycle described in spec.md §4.6:
//! `Initialize, Idle, UseToken, WaitForReply, DoneWithToken, PassToken,
//! NoToken, PollForMaster, AnswerDataRequest`. The FSM is driven by
//! [`MasterFsm::step`], called once per main-loop iteration (or
//! interrupt-driven tick) with the elapsed time and any frame the
//! receive FSM ([`super::frame::ReceiveFsm`]) just validated.

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use super::frame::{FrameType, MstpFrame, MSTP_BROADCAST};
use super::port::{Driver, MstpPort};

/// States of the MS/TP master FSM (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MasterState {
    Initialize,
    Idle,
    UseToken,
    WaitForReply,
    DoneWithToken,
    PassToken,
    NoToken,
    PollForMaster,
    AnswerDataRequest,
}

/// A frame the upper layer handed down to send while holding the
/// token, paired with whether it expects a reply.
pub struct OutgoingFrame {
    pub frame_type: FrameType,
    pub destination: u8,
    pub data: Vec<u8>,
}

/// Upward delivery hook (spec.md §6 `deliver_npdu`).
pub trait NpduSink {
    fn deliver_npdu(&mut self, source_station: u8, npdu: &[u8]);
}

/// Upward pull hooks (spec.md §6 `get_send`/`get_reply`), queried by
/// the master FSM when it may transmit.
pub trait FrameSource {
    /// Called from `UseToken` while holding the token. Returns the
    /// next frame to send, if any is queued.
    fn get_send(&mut self, timeout_ms: u32) -> Option<OutgoingFrame>;
    /// Called from `AnswerDataRequest` when a reply is owed. Returns
    /// the reply frame if ready within `timeout_ms`.
    fn get_reply(&mut self, timeout_ms: u32) -> Option<OutgoingFrame>;
}

/// Driver-facing MS/TP master FSM state and timers.
pub struct MasterFsm {
    reply_timer_ms: u32,
    usage_timer_ms: u32,
    no_token_timer_ms: u32,
    poll_candidate: u8,
}

impl MasterFsm {
    pub fn new() -> Self {
        Self {
            reply_timer_ms: 0,
            usage_timer_ms: 0,
            no_token_timer_ms: 0,
            poll_candidate: 0,
        }
    }

    /// `Tno_token = 500 + 10 * this_station` ms (spec.md §4.6.6).
    fn no_token_timeout(port: &MstpPort) -> u32 {
        500 + 10 * port.this_station as u32
    }

    fn send_frame(port: &mut MstpPort, driver: &mut dyn Driver, frame: MstpFrame) {
        let encoded = frame.encode();
        driver.send_bytes(&encoded);
        port.stats.frames_sent += 1;
    }

    /// Advance the FSM by `elapsed_ms`, optionally handing in a frame
    /// the receive FSM just validated and addressed to this node (or a
    /// broadcast). `sink`/`source` are the upper-layer hooks.
    pub fn step(
        &mut self,
        port: &mut MstpPort,
        driver: &mut dyn Driver,
        sink: &mut dyn NpduSink,
        source: &mut dyn FrameSource,
        elapsed_ms: u32,
        incoming: Option<MstpFrame>,
    ) {
        match port.master_state {
            MasterState::Initialize => {
                self.no_token_timer_ms = 0;
                port.master_state = MasterState::NoToken;
            }

            MasterState::NoToken => {
                if let Some(frame) = &incoming {
                    // Activity observed: someone else owns the ring.
                    if frame.is_token() && frame.destination == port.this_station {
                        port.master_state = MasterState::Idle;
                    }
                    self.no_token_timer_ms = 0;
                    return;
                }
                self.no_token_timer_ms += elapsed_ms;
                if self.no_token_timer_ms > Self::no_token_timeout(port) {
                    log::debug!(
                        "mstp[{}]: Tno_token expired with no ring activity, becoming sole master",
                        port.this_station
                    );
                    port.sole_master = true;
                    port.next_station = port.this_station;
                    port.poll_station = port.this_station;
                    port.master_state = MasterState::Idle;
                }
            }

            MasterState::Idle => {
                if let Some(frame) = incoming {
                    if frame.is_token() && frame.destination == port.this_station {
                        port.frame_count = 0;
                        port.master_state = MasterState::UseToken;
                    } else if frame.destination == port.this_station
                        && frame.frame_type.expects_reply()
                    {
                        port.set_pending_frame(frame);
                        self.reply_timer_ms = 0;
                        port.master_state = MasterState::AnswerDataRequest;
                    } else if frame.frame_type == FrameType::PollForMaster
                        && frame.destination == MSTP_BROADCAST
                    {
                        Self::send_frame(
                            port,
                            driver,
                            MstpFrame::new(
                                FrameType::ReplyToPollForMaster,
                                frame.source,
                                port.this_station,
                                Vec::new(),
                            ),
                        );
                    }
                }
            }

            MasterState::UseToken => {
                if port.frame_count >= port.config.nmax_info_frames {
                    port.master_state = MasterState::DoneWithToken;
                    return;
                }
                match source.get_send(0) {
                    Some(outgoing) => {
                        let expects_reply = outgoing.frame_type.expects_reply();
                        let frame = MstpFrame::new(
                            outgoing.frame_type,
                            outgoing.destination,
                            port.this_station,
                            outgoing.data,
                        );
                        Self::send_frame(port, driver, frame);
                        port.frame_count += 1;
                        if expects_reply {
                            self.reply_timer_ms = 0;
                            port.master_state = MasterState::WaitForReply;
                        }
                    }
                    None => port.master_state = MasterState::DoneWithToken,
                }
            }

            MasterState::WaitForReply => {
                if let Some(frame) = incoming {
                    sink.deliver_npdu(frame.source, &frame.data);
                    port.master_state = MasterState::DoneWithToken;
                    return;
                }
                self.reply_timer_ms += elapsed_ms;
                if self.reply_timer_ms > port.config.treply_timeout_ms {
                    port.master_state = MasterState::DoneWithToken;
                }
            }

            MasterState::DoneWithToken => {
                if port.frame_count >= port.config.nmax_info_frames
                    || source.get_send(0).is_none()
                {
                    port.token_count += 1;
                }
                if port.token_count >= port.config.npoll as u32 {
                    log::debug!(
                        "mstp[{}]: Npoll threshold reached, polling for new masters",
                        port.this_station
                    );
                    self.poll_candidate = port.this_station.wrapping_add(1);
                    port.token_count = 0;
                    port.master_state = MasterState::PollForMaster;
                } else {
                    port.retry_count = 0;
                    self.usage_timer_ms = 0;
                    port.master_state = MasterState::PassToken;
                }
            }

            MasterState::PassToken => {
                log::trace!(
                    "mstp[{}]: passing token to {}",
                    port.this_station, port.next_station
                );
                Self::send_frame(
                    port,
                    driver,
                    MstpFrame::token(port.next_station, port.this_station),
                );
                if incoming.is_some() {
                    // Line became active within the usage window: the
                    // token was accepted.
                    port.master_state = MasterState::Idle;
                    return;
                }
                self.usage_timer_ms += elapsed_ms;
                if self.usage_timer_ms > port.config.tusage_timeout_ms {
                    if port.retry_count < port.config.nretry_token {
                        log::warn!(
                            "mstp[{}]: Tusage_timeout waiting for {} to accept token, retrying",
                            port.this_station, port.next_station
                        );
                        port.retry_count += 1;
                        self.usage_timer_ms = 0;
                    } else {
                        log::warn!(
                            "mstp[{}]: token retries exhausted for {}, searching for a new neighbor",
                            port.this_station, port.next_station
                        );
                        self.poll_candidate = port.this_station.wrapping_add(1);
                        port.master_state = MasterState::PollForMaster;
                    }
                }
            }

            MasterState::PollForMaster => {
                if self.poll_candidate > port.config.nmax_master {
                    port.sole_master = true;
                    port.next_station = port.this_station;
                    port.master_state = MasterState::Idle;
                    return;
                }
                if let Some(frame) = &incoming {
                    if frame.frame_type == FrameType::ReplyToPollForMaster {
                        port.next_station = frame.source;
                        port.token_count = 0;
                        port.master_state = MasterState::PassToken;
                        self.usage_timer_ms = 0;
                        port.retry_count = 0;
                        return;
                    }
                }
                Self::send_frame(
                    port,
                    driver,
                    MstpFrame::new(
                        FrameType::PollForMaster,
                        self.poll_candidate,
                        port.this_station,
                        Vec::new(),
                    ),
                );
                self.poll_candidate = self.poll_candidate.wrapping_add(1);
            }

            MasterState::AnswerDataRequest => {
                self.reply_timer_ms += elapsed_ms;
                match source.get_reply(port.config.treply_delay_ms.saturating_sub(self.reply_timer_ms)) {
                    Some(reply) if self.reply_timer_ms <= port.config.treply_delay_ms => {
                        if let Some(request) = port.take_pending_frame() {
                            Self::send_frame(
                                port,
                                driver,
                                MstpFrame::new(reply.frame_type, request.source, port.this_station, reply.data),
                            );
                        }
                        port.master_state = MasterState::Idle;
                    }
                    _ if self.reply_timer_ms > port.config.treply_delay_ms => {
                        if let Some(request) = port.take_pending_frame() {
                            Self::send_frame(
                                port,
                                driver,
                                MstpFrame::new(
                                    FrameType::ReplyPostponed,
                                    request.source,
                                    port.this_station,
                                    Vec::new(),
                                ),
                            );
                        }
                        port.master_state = MasterState::Idle;
                    }
                    _ => {}
                }
            }
        }
    }
}

impl Default for MasterFsm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalink::mstp::port::MstpPortConfig;

    struct NullDriver;
    impl Driver for NullDriver {
        fn send_bytes(&mut self, _buf: &[u8]) {}
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

    fn test_port(this_station: u8) -> MstpPort {
        let mut cfg = MstpPortConfig::default();
        cfg.this_station = this_station;
        MstpPort::new(cfg, 38400, 64)
    }

    #[test]
    fn initialize_transitions_to_no_token() {
        let mut port = test_port(1);
        let mut fsm = MasterFsm::new();
        fsm.step(&mut port, &mut NullDriver, &mut NullSink, &mut EmptySource, 0, None);
        assert_eq!(port.master_state, MasterState::NoToken);
    }

    #[test]
    fn no_token_becomes_sole_master_after_timeout() {
        let mut port = test_port(1);
        port.master_state = MasterState::NoToken;
        let mut fsm = MasterFsm::new();
        let timeout = MasterFsm::no_token_timeout(&port);
        fsm.step(&mut port, &mut NullDriver, &mut NullSink, &mut EmptySource, timeout + 1, None);
        assert!(port.sole_master);
        assert_eq!(port.next_station, port.this_station);
        assert_eq!(port.master_state, MasterState::Idle);
    }

    #[test]
    fn idle_with_token_enters_use_token() {
        let mut port = test_port(1);
        port.master_state = MasterState::Idle;
        let mut fsm = MasterFsm::new();
        let token = MstpFrame::token(1, 2);
        fsm.step(&mut port, &mut NullDriver, &mut NullSink, &mut EmptySource, 0, Some(token));
        assert_eq!(port.master_state, MasterState::UseToken);
        assert_eq!(port.frame_count, 0);
    }

    #[test]
    fn use_token_with_nothing_queued_moves_to_done() {
        let mut port = test_port(1);
        port.master_state = MasterState::UseToken;
        let mut fsm = MasterFsm::new();
        fsm.step(&mut port, &mut NullDriver, &mut NullSink, &mut EmptySource, 0, None);
        assert_eq!(port.master_state, MasterState::DoneWithToken);
    }

    #[test]
    fn done_with_token_passes_token_below_npoll() {
        let mut port = test_port(1);
        port.master_state = MasterState::DoneWithToken;
        port.token_count = 0;
        let mut fsm = MasterFsm::new();
        fsm.step(&mut port, &mut NullDriver, &mut NullSink, &mut EmptySource, 0, None);
        assert_eq!(port.master_state, MasterState::PassToken);
    }

    #[test]
    fn done_with_token_polls_at_npoll_threshold() {
        let mut port = test_port(1);
        port.master_state = MasterState::DoneWithToken;
        port.token_count = port.config.npoll as u32 - 1;
        let mut fsm = MasterFsm::new();
        fsm.step(&mut port, &mut NullDriver, &mut NullSink, &mut EmptySource, 0, None);
        assert_eq!(port.master_state, MasterState::PollForMaster);
        assert_eq!(port.token_count, 0);
    }

    #[test]
    fn pass_token_retries_then_polls_for_master() {
        let mut port = test_port(1);
        port.next_station = 2;
        port.master_state = MasterState::PassToken;
        port.retry_count = 0;
        port.config.nretry_token = 1;
        let mut fsm = MasterFsm::new();
        // first timeout -> retry
        fsm.step(
            &mut port,
            &mut NullDriver,
            &mut NullSink,
            &mut EmptySource,
            port.config.tusage_timeout_ms + 1,
            None,
        );
        assert_eq!(port.master_state, MasterState::PassToken);
        assert_eq!(port.retry_count, 1);
        // second timeout -> exhausted, poll for master
        fsm.step(
            &mut port,
            &mut NullDriver,
            &mut NullSink,
            &mut EmptySource,
            port.config.tusage_timeout_ms + 1,
            None,
        );
        assert_eq!(port.master_state, MasterState::PollForMaster);
    }

    #[test]
    fn poll_for_master_accepts_reply_and_passes_token() {
        let mut port = test_port(1);
        port.master_state = MasterState::PollForMaster;
        let mut fsm = MasterFsm::new();
        fsm.poll_candidate = 2;
        let reply = MstpFrame::new(FrameType::ReplyToPollForMaster, 1, 2, Vec::new());
        fsm.step(
            &mut port,
            &mut NullDriver,
            &mut NullSink,
            &mut EmptySource,
            0,
            Some(reply),
        );
        assert_eq!(port.next_station, 2);
        assert_eq!(port.master_state, MasterState::PassToken);
    }

    #[test]
    fn poll_for_master_becomes_sole_master_when_exhausted() {
        let mut port = test_port(1);
        port.config.nmax_master = 3;
        port.master_state = MasterState::PollForMaster;
        let mut fsm = MasterFsm::new();
        fsm.poll_candidate = 4;
        fsm.step(&mut port, &mut NullDriver, &mut NullSink, &mut EmptySource, 0, None);
        assert!(port.sole_master);
        assert_eq!(port.master_state, MasterState::Idle);
    }
}
