//! An in-process TAP simulator, used by this crate's own tests and
//! available to downstream crates under the `test` feature.
//!
//! Grounded on the role `ebyst/drivers/sim.py` plays in the original
//! project (a `Driver` that answers JTAG traffic without real hardware)
//! and on probe-rs's `FakeProbe` pattern of gating a test-only transport
//! behind a Cargo feature.

use std::collections::VecDeque;

use bitvec::prelude::*;

use crate::transport::Transport;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum SimState {
    TestLogicReset,
    RunTestIdle,
    SelectDrScan,
    CaptureDr,
    ShiftDr,
    Exit1Dr,
    PauseDr,
    Exit2Dr,
    UpdateDr,
    SelectIrScan,
    CaptureIr,
    ShiftIr,
    Exit1Ir,
    PauseIr,
    Exit2Ir,
    UpdateIr,
}

impl SimState {
    fn step(self, tms: bool) -> Self {
        use SimState::*;
        match (self, tms) {
            (TestLogicReset, false) => RunTestIdle,
            (TestLogicReset, true) => TestLogicReset,
            (RunTestIdle, false) => RunTestIdle,
            (RunTestIdle, true) => SelectDrScan,
            (SelectDrScan, false) => CaptureDr,
            (SelectDrScan, true) => SelectIrScan,
            (CaptureDr, false) => ShiftDr,
            (CaptureDr, true) => Exit1Dr,
            (ShiftDr, false) => ShiftDr,
            (ShiftDr, true) => Exit1Dr,
            (Exit1Dr, false) => PauseDr,
            (Exit1Dr, true) => UpdateDr,
            (PauseDr, false) => PauseDr,
            (PauseDr, true) => Exit2Dr,
            (Exit2Dr, false) => ShiftDr,
            (Exit2Dr, true) => UpdateDr,
            (UpdateDr, false) => RunTestIdle,
            (UpdateDr, true) => SelectDrScan,
            (SelectIrScan, false) => CaptureIr,
            (SelectIrScan, true) => TestLogicReset,
            (CaptureIr, false) => ShiftIr,
            (CaptureIr, true) => Exit1Ir,
            (ShiftIr, false) => ShiftIr,
            (ShiftIr, true) => Exit1Ir,
            (Exit1Ir, false) => PauseIr,
            (Exit1Ir, true) => UpdateIr,
            (PauseIr, false) => PauseIr,
            (PauseIr, true) => Exit2Ir,
            (Exit2Ir, false) => ShiftIr,
            (Exit2Ir, true) => UpdateIr,
            (UpdateIr, false) => RunTestIdle,
            (UpdateIr, true) => SelectDrScan,
        }
    }
}

/// A software TAP that shifts through fixed-length IR/DR registers,
/// loading a caller-supplied capture pattern whenever the real TAP would
/// latch new data (`CAPTURE-DR`/`CAPTURE-IR`).
///
/// The default configuration has a single one-bit register on both the
/// IR and DR paths, as a lone `BYPASS`-only device would.
pub struct SimTransport {
    state: SimState,
    ir_len: usize,
    dr_len: usize,
    ir_bits: VecDeque<bool>,
    dr_bits: VecDeque<bool>,
    /// Pattern latched into the IR shift register at `CAPTURE-IR`.
    pub ir_capture: Vec<bool>,
    /// Pattern latched into the DR shift register at `CAPTURE-DR`.
    pub dr_capture: Vec<bool>,
}

impl SimTransport {
    /// A bare one-bit `BYPASS` wire.
    pub fn new() -> Self {
        SimTransport::with_lengths(1, 1)
    }

    /// A simulator with the given total IR/DR lengths, capturing all
    /// zeros by default.
    pub fn with_lengths(ir_len: usize, dr_len: usize) -> Self {
        SimTransport {
            state: SimState::TestLogicReset,
            ir_len,
            dr_len,
            ir_bits: VecDeque::from(vec![false; ir_len]),
            dr_bits: VecDeque::from(vec![false; dr_len]),
            ir_capture: vec![false; ir_len],
            dr_capture: vec![false; dr_len],
        }
    }

    /// Bits currently shifted into the DR path, e.g. to observe what a
    /// device was just sent.
    pub fn dr_contents(&self) -> BitVec<u8, Lsb0> {
        self.dr_bits.iter().copied().collect()
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        SimTransport::new()
    }
}

impl Transport for SimTransport {
    fn transfer(&mut self, tms: bool, tdi: bool) -> bool {
        use SimState::*;
        let next = self.state.step(tms);
        let tdo = match self.state {
            ShiftDr => {
                let out = self.dr_bits.pop_front().unwrap_or(false);
                self.dr_bits.push_back(tdi);
                out
            }
            ShiftIr => {
                let out = self.ir_bits.pop_front().unwrap_or(false);
                self.ir_bits.push_back(tdi);
                out
            }
            _ => false,
        };
        if next == CaptureDr {
            self.dr_bits = VecDeque::from(self.dr_capture.clone());
        }
        if next == CaptureIr {
            self.ir_bits = VecDeque::from(self.ir_capture.clone());
        }
        self.state = next;
        tdo
    }

    fn reset(&mut self) {
        for _ in 0..5 {
            self.transfer(true, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bypass_wire_delays_tdi_by_one_bit() {
        let mut sim = SimTransport::new();
        sim.reset();
        // enter SHIFT-DR: RTI -(1)-> SelectDR -(0)-> CaptureDR -(0)-> ShiftDR
        sim.transfer(false, false); // TLR -> RTI
        sim.transfer(true, false); // -> SelectDR
        sim.transfer(false, false); // -> CaptureDR
        sim.transfer(false, false); // -> ShiftDR (shifts bit 0)
        let out = sim.transfer(false, true);
        assert!(!out); // still draining the captured 0
        let out2 = sim.transfer(false, false);
        assert!(out2); // the `true` bit we sent arrives one cycle later
    }
}
