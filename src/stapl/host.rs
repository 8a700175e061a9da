//! The bridge between STAPL's physical-access statements (`IRSCAN`,
//! `DRSCAN`, `STATE`, `WAIT`, `TRST`) and a real TAP.
//!
//! Grounded on `ebyst/stapl/interpreter.py`'s `Interpreter`, which holds a
//! `TAPController` and calls straight through to it for every physical
//! statement; here that relationship is a trait so the interpreter can be
//! tested against a fake host with no transport at all.

use bitvec::prelude::*;
use tracing::info;

use crate::tap::{State, TapController};
use crate::transport::Transport;

use super::StaplError;

/// Everything a STAPL program needs from the outside world.
pub trait Host {
    /// `IRSCAN length, tdi;` — shift `tdi` into the instruction register,
    /// returning the captured bits.
    fn ir_scan(&mut self, length: usize, tdi: &BitSlice<u8, Lsb0>) -> BitVec<u8, Lsb0>;
    /// `DRSCAN length, tdi;` — shift `tdi` into the data register,
    /// returning the captured bits.
    fn dr_scan(&mut self, length: usize, tdi: &BitSlice<u8, Lsb0>) -> BitVec<u8, Lsb0>;
    /// `STATE name[, cycles];` — move to a named TAP state, idling there
    /// for `cycles` extra clocks if it is a stable state.
    fn state(&mut self, name: &str, cycles: Option<usize>) -> Result<(), StaplError>;
    /// `WAIT state, cycles;` — move to a named stable state and idle
    /// there for exactly `cycles` clocks.
    fn wait(&mut self, state: &str, cycles: usize) -> Result<(), StaplError>;
    /// `TRST mode;` (`ON`, `OFF`, `Z`, `ABSENT`).
    fn trst(&mut self, mode: &str);
    /// `FREQUENCY hz;` (also reachable from `BsdlAttributes::tap_scan_clock`).
    fn set_frequency(&mut self, hz: f64);
    /// `EXPORT "key", expr;` — hand a stringified result out to the
    /// caller, the way `ebyst/tap_controller.py::TapController.export`
    /// reports one.
    fn export(&mut self, key: &str, value: &str);
}

fn parse_state_name(name: &str) -> Result<State, StaplError> {
    Ok(match name.to_ascii_uppercase().as_str() {
        "RESET" => State::TestLogicReset,
        "IDLE" => State::RunTestIdle,
        "DRSELECT" => State::SelectDrScan,
        "DRCAPTURE" => State::CaptureDr,
        "DRSHIFT" => State::ShiftDr,
        "DREXIT1" => State::Exit1Dr,
        "DRPAUSE" => State::PauseDr,
        "DREXIT2" => State::Exit2Dr,
        "DRUPDATE" => State::UpdateDr,
        "IRSELECT" => State::SelectIrScan,
        "IRCAPTURE" => State::CaptureIr,
        "IRSHIFT" => State::ShiftIr,
        "IREXIT1" => State::Exit1Ir,
        "IRPAUSE" => State::PauseIr,
        "IREXIT2" => State::Exit2Ir,
        "IRUPDATE" => State::UpdateIr,
        other => return Err(StaplError::value(format!("{other} is not a TAP state name"))),
    })
}

impl<T: Transport> Host for TapController<T> {
    fn ir_scan(&mut self, _length: usize, tdi: &BitSlice<u8, Lsb0>) -> BitVec<u8, Lsb0> {
        self.scan_ir(tdi)
    }

    fn dr_scan(&mut self, _length: usize, tdi: &BitSlice<u8, Lsb0>) -> BitVec<u8, Lsb0> {
        self.read_write_register(tdi)
    }

    fn state(&mut self, name: &str, cycles: Option<usize>) -> Result<(), StaplError> {
        let target = parse_state_name(name)?;
        if let Some(cycles) = cycles {
            if target.is_hold_state() {
                TapController::wait(self, target, cycles);
                return Ok(());
            }
        }
        self.enter_state(target);
        Ok(())
    }

    fn wait(&mut self, state: &str, cycles: usize) -> Result<(), StaplError> {
        let target = parse_state_name(state)?;
        TapController::wait(self, target, cycles);
        Ok(())
    }

    fn trst(&mut self, mode: &str) {
        // This crate's `Transport` contract has no dedicated TRST pin
        // primitive; asserting TRST is modelled as forcing the same
        // `TEST-LOGIC-RESET` a 5-cycle TMS reset reaches.
        if mode.eq_ignore_ascii_case("ON") {
            self.reset();
        }
    }

    fn set_frequency(&mut self, hz: f64) {
        TapController::set_frequency(self, hz);
    }

    fn export(&mut self, key: &str, value: &str) {
        info!(key, value, "STAPL EXPORT");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::SimTransport;

    #[test]
    fn state_moves_to_named_stable_state() {
        let mut tap = TapController::new(SimTransport::new());
        Host::state(&mut tap, "IDLE", None).unwrap();
        assert_eq!(tap.state(), State::RunTestIdle);
    }

    #[test]
    fn unknown_state_name_is_rejected() {
        let mut tap = TapController::new(SimTransport::new());
        assert!(Host::state(&mut tap, "NOT_A_STATE", None).is_err());
    }

    #[test]
    fn wait_idles_in_a_hold_state() {
        let mut tap = TapController::new(SimTransport::new());
        let before = tap.cycle_count();
        Host::wait(&mut tap, "IDLE", 10).unwrap();
        assert_eq!(tap.state(), State::RunTestIdle);
        assert!(tap.cycle_count() > before + 9);
    }
}
