//! MS/TP Zero-Configuration Address Assignment (C8)
//!
//! Lets a fresh node pick a unique station address in
//! `[64, nmax_master]` without user intervention, by lurking for
//! existing traffic and then probing a candidate address with a
//! UUID-tagged Test-Request (spec.md §4.8).

#[cfg(not(feature = "std"))]
use alloc::vec::Vec;

use super::frame::{FrameType, MstpFrame};
use super::port::MstpPort;

/// Lowest station address zero-config is willing to claim.
pub const ZERO_CONFIG_MIN_STATION: u8 = 64;
/// Default lurk duration before attempting a claim, in ms.
pub const ZERO_CONFIG_SILENCE_MS: u32 = 8_000;
/// Probe attempts before considering an address unclaimed.
pub const POLL_COUNT: u8 = 8;

/// States of the zero-config sub-FSM (spec.md §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZeroConfigState {
    Init,
    Idle,
    Lurk,
    Claim,
    Use,
}

/// Zero-config sub-FSM state and working data.
pub struct ZeroConfigFsm {
    lurk_timer_ms: u32,
    claim_attempts: u8,
    claim_reply_timer_ms: u32,
    candidate_station: u8,
    preferred_station: u8,
    observed_occupied: [bool; 256],
}

impl ZeroConfigFsm {
    pub fn new(preferred_station: u8) -> Self {
        let preferred_station = preferred_station.max(ZERO_CONFIG_MIN_STATION);
        Self {
            lurk_timer_ms: 0,
            claim_attempts: 0,
            claim_reply_timer_ms: 0,
            candidate_station: preferred_station,
            preferred_station,
            observed_occupied: [false; 256],
        }
    }

    fn lowest_unoccupied_from(&self, start: u8, max_master: u8) -> u8 {
        let mut candidate = start.max(ZERO_CONFIG_MIN_STATION);
        while candidate <= max_master {
            if !self.observed_occupied[candidate as usize] {
                return candidate;
            }
            candidate = candidate.saturating_add(1);
        }
        candidate
    }

    pub fn step(
        &mut self,
        port: &mut MstpPort,
        elapsed_ms: u32,
        incoming: Option<&MstpFrame>,
    ) -> Option<MstpFrame> {
        if let Some(frame) = incoming {
            if frame.source < 64 || frame.source <= port.config.nmax_master {
                self.observed_occupied[frame.source as usize] = true;
            }
        }

        match port.zero_config_state {
            ZeroConfigState::Init => {
                port.this_station = 255;
                port.zero_config_state = ZeroConfigState::Idle;
                None
            }

            ZeroConfigState::Idle => {
                self.lurk_timer_ms = 0;
                port.zero_config_state = ZeroConfigState::Lurk;
                None
            }

            ZeroConfigState::Lurk => {
                self.lurk_timer_ms += elapsed_ms;
                if self.lurk_timer_ms >= ZERO_CONFIG_SILENCE_MS {
                    self.candidate_station =
                        self.lowest_unoccupied_from(self.preferred_station, port.config.nmax_master);
                    self.claim_attempts = 0;
                    self.claim_reply_timer_ms = 0;
                    port.zero_config_state = ZeroConfigState::Claim;
                    return Some(MstpFrame::new(
                        FrameType::TestRequest,
                        self.candidate_station,
                        port.this_station,
                        port.uuid.to_vec(),
                    ));
                }
                None
            }

            ZeroConfigState::Claim => {
                if let Some(frame) = incoming {
                    if frame.frame_type == FrameType::TestResponse
                        && frame.source == self.candidate_station
                    {
                        let is_foreign_uuid = frame.data != port.uuid;
                        if is_foreign_uuid {
                            self.observed_occupied[self.candidate_station as usize] = true;
                            let claimed = self.candidate_station;
                            self.candidate_station = self.lowest_unoccupied_from(
                                self.candidate_station.saturating_add(1),
                                port.config.nmax_master,
                            );
                            log::debug!(
                                "mstp: zero-config candidate {} already claimed, moving to {}",
                                claimed, self.candidate_station
                            );
                            self.claim_attempts = 0;
                            self.claim_reply_timer_ms = 0;
                            return Some(MstpFrame::new(
                                FrameType::TestRequest,
                                self.candidate_station,
                                port.this_station,
                                port.uuid.to_vec(),
                            ));
                        }
                    }
                }

                self.claim_reply_timer_ms += elapsed_ms;
                if self.claim_reply_timer_ms > port.config.treply_timeout_ms {
                    self.claim_attempts += 1;
                    self.claim_reply_timer_ms = 0;
                    if self.claim_attempts >= POLL_COUNT {
                        port.this_station = self.candidate_station;
                        port.zero_config_state = ZeroConfigState::Use;
                        log::debug!(
                            "mstp: zero-config settled on station address {}",
                            port.this_station
                        );
                        return None;
                    }
                    return Some(MstpFrame::new(
                        FrameType::TestRequest,
                        self.candidate_station,
                        port.this_station,
                        port.uuid.to_vec(),
                    ));
                }
                None
            }

            ZeroConfigState::Use => {
                if let Some(frame) = incoming {
                    if frame.frame_type == FrameType::TestRequest
                        && frame.destination == port.this_station
                    {
                        let foreign = frame.data != port.uuid;
                        if foreign {
                            self.observed_occupied[port.this_station as usize] = true;
                            port.zero_config_state = ZeroConfigState::Lurk;
                            self.lurk_timer_ms = 0;
                            return None;
                        }
                    }
                }
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datalink::mstp::port::MstpPortConfig;

    fn test_port() -> MstpPort {
        MstpPort::new(MstpPortConfig::default(), 38400, 64)
    }

    #[test]
    fn init_sets_receive_only_station() {
        let mut port = test_port();
        port.zero_config_state = ZeroConfigState::Init;
        let mut fsm = ZeroConfigFsm::new(70);
        fsm.step(&mut port, 0, None);
        assert_eq!(port.this_station, 255);
        assert_eq!(port.zero_config_state, ZeroConfigState::Idle);
    }

    #[test]
    fn lurk_claims_after_silence_window() {
        let mut port = test_port();
        port.zero_config_state = ZeroConfigState::Lurk;
        let mut fsm = ZeroConfigFsm::new(70);
        let output = fsm.step(&mut port, ZERO_CONFIG_SILENCE_MS, None);
        assert_eq!(port.zero_config_state, ZeroConfigState::Claim);
        assert!(output.is_some());
    }

    #[test]
    fn claim_settles_on_address_after_poll_count_silence() {
        let mut port = test_port();
        port.zero_config_state = ZeroConfigState::Claim;
        let mut fsm = ZeroConfigFsm::new(70);
        fsm.candidate_station = 70;
        for _ in 0..POLL_COUNT {
            fsm.step(&mut port, port.config.treply_timeout_ms + 1, None);
        }
        assert_eq!(port.zero_config_state, ZeroConfigState::Use);
        assert_eq!(port.this_station, 70);
    }

    #[test]
    fn claim_advances_past_occupied_address() {
        let mut port = test_port();
        port.zero_config_state = ZeroConfigState::Claim;
        let mut fsm = ZeroConfigFsm::new(70);
        fsm.candidate_station = 70;
        let mut other_uuid = [0u8; 16];
        other_uuid[0] = 0xFF;
        let response = MstpFrame::new(FrameType::TestResponse, port.this_station, 70, other_uuid.to_vec());
        fsm.step(&mut port, 0, Some(&response));
        assert_eq!(fsm.candidate_station, 71);
    }

    #[test]
    fn distinct_uuids_converge_to_distinct_addresses() {
        let mut port_a = test_port();
        let mut port_b = test_port();
        port_a.uuid = [1; 16];
        port_b.uuid = [2; 16];
        port_a.zero_config_state = ZeroConfigState::Claim;
        port_b.zero_config_state = ZeroConfigState::Claim;
        let mut fsm_a = ZeroConfigFsm::new(70);
        let mut fsm_b = ZeroConfigFsm::new(70);
        fsm_a.candidate_station = 70;
        fsm_b.candidate_station = 70;
        for _ in 0..POLL_COUNT {
            fsm_a.step(&mut port_a, port_a.config.treply_timeout_ms + 1, None);
        }
        // B observes A's claim before settling, so it must move on.
        fsm_b.observed_occupied[70] = true;
        fsm_b.candidate_station = fsm_b.lowest_unoccupied_from(71, port_b.config.nmax_master);
        for _ in 0..POLL_COUNT {
            fsm_b.step(&mut port_b, port_b.config.treply_timeout_ms + 1, None);
        }
        assert_ne!(port_a.this_station, port_b.this_station);
    }
}
