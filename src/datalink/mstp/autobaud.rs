//! MS/TP Auto-Baud Detection (C9)
//!
//! Walks [`BAUD_LADDER`][super::port::BAUD_LADDER] until it sees
//! `NMIN_VALID` valid frames inside a rolling window, then locks the
//! driver to that rate (spec.md §4.9).

use super::port::{Driver, BAUD_LADDER};

/// Valid frames required within the window before locking.
pub const NMIN_VALID: u8 = 4;
/// Width of the rolling validity window, in ms.
pub const VALID_FRAME_WINDOW_MS: u32 = 2_000;

/// States of the auto-baud sub-FSM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutoBaudState {
    Idle,
    Probe,
    Confirm,
    Locked,
}

/// Auto-baud sub-FSM: owns only its ladder index and window timer.
pub struct AutoBaudFsm {
    ladder_index: usize,
    window_timer_ms: u32,
    valid_count: u8,
}

impl AutoBaudFsm {
    pub fn new() -> Self {
        Self {
            ladder_index: 0,
            window_timer_ms: 0,
            valid_count: 0,
        }
    }

    fn current_baud(&self) -> u32 {
        BAUD_LADDER[self.ladder_index]
    }

    fn advance_ladder(&mut self) {
        self.ladder_index = (self.ladder_index + 1) % BAUD_LADDER.len();
        self.window_timer_ms = 0;
        self.valid_count = 0;
    }

    /// Drive the FSM forward by `elapsed_ms`, reporting whether the
    /// most recently examined octet belonged to a valid frame
    /// (`Some(true)`), an invalid one (`Some(false)`), or nothing was
    /// observed this tick (`None`).
    pub fn step(
        &mut self,
        state: &mut AutoBaudState,
        driver: &mut dyn Driver,
        elapsed_ms: u32,
        frame_seen: Option<bool>,
    ) {
        match *state {
            AutoBaudState::Idle => {
                self.ladder_index = 0;
                self.window_timer_ms = 0;
                self.valid_count = 0;
                driver.baud_rate_set(self.current_baud());
                *state = AutoBaudState::Probe;
            }

            AutoBaudState::Probe => {
                self.window_timer_ms += elapsed_ms;
                match frame_seen {
                    Some(true) => {
                        self.valid_count += 1;
                        if self.valid_count >= NMIN_VALID {
                            *state = AutoBaudState::Confirm;
                        }
                    }
                    Some(false) => {
                        log::trace!("mstp: auto-baud invalid frame at {} bps, advancing", self.current_baud());
                        self.advance_ladder();
                        driver.baud_rate_set(self.current_baud());
                    }
                    None => {}
                }
                if self.window_timer_ms >= VALID_FRAME_WINDOW_MS
                    && self.valid_count < NMIN_VALID
                {
                    log::debug!(
                        "mstp: auto-baud window expired at {} bps with {} valid frames, advancing",
                        self.current_baud(), self.valid_count
                    );
                    self.advance_ladder();
                    driver.baud_rate_set(self.current_baud());
                }
            }

            AutoBaudState::Confirm => {
                match frame_seen {
                    Some(true) => {
                        log::debug!("mstp: auto-baud locked at {} bps", self.current_baud());
                        *state = AutoBaudState::Locked;
                    }
                    Some(false) => {
                        self.advance_ladder();
                        driver.baud_rate_set(self.current_baud());
                        *state = AutoBaudState::Probe;
                    }
                    None => {}
                }
            }

            AutoBaudState::Locked => {}
        }
    }
}

impl Default for AutoBaudFsm {
    fn default() -> Self {
        Self::new()
    }
}
