//! The 16-state IEEE 1149.1 TAP controller state machine.
//!
//! Grounded on `ebyst/tap_controller.py`'s `State` enum and `_goto` method;
//! the next-state table and its tie-breaking rule (DR branch states sort
//! below IR branch states) are transcribed directly from that method.

use bitvec::prelude::*;

/// One of the 16 states of the IEEE 1149.1 TAP state machine.
///
/// Declaration order matches the numeric ordering used by the routing
/// algorithm: DR-branch states come before IR-branch states, so
/// `state < State::SelectIrScan` identifies the DR branch.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum State {
    /// `TEST-LOGIC-RESET`.
    TestLogicReset,
    /// `RUN-TEST/IDLE`.
    RunTestIdle,
    /// `SELECT-DR-SCAN`.
    SelectDrScan,
    /// `CAPTURE-DR`.
    CaptureDr,
    /// `SHIFT-DR`.
    ShiftDr,
    /// `EXIT1-DR`.
    Exit1Dr,
    /// `PAUSE-DR`.
    PauseDr,
    /// `EXIT2-DR`.
    Exit2Dr,
    /// `UPDATE-DR`.
    UpdateDr,
    /// `SELECT-IR-SCAN`.
    SelectIrScan,
    /// `CAPTURE-IR`.
    CaptureIr,
    /// `SHIFT-IR`.
    ShiftIr,
    /// `EXIT1-IR`.
    Exit1Ir,
    /// `PAUSE-IR`.
    PauseIr,
    /// `EXIT2-IR`.
    Exit2Ir,
    /// `UPDATE-IR`.
    UpdateIr,
}

impl State {
    /// Is this one of the four "hold" states `wait()` may be issued from?
    pub fn is_hold_state(self) -> bool {
        matches!(
            self,
            State::TestLogicReset | State::RunTestIdle | State::PauseDr | State::PauseIr
        )
    }

    /// Single step toward `target`, choosing TMS to minimise the remaining
    /// number of transitions. Returns the TMS bit to clock and the state
    /// reached by clocking it. Returns `None` if already at `target`.
    fn step_toward(self, target: State) -> Option<(bool, State)> {
        use State::*;
        if self == target {
            return None;
        }
        Some(match self {
            TestLogicReset => (false, RunTestIdle),
            RunTestIdle => (true, SelectDrScan),
            SelectDrScan => {
                if target > SelectDrScan && target <= UpdateDr {
                    (false, CaptureDr)
                } else {
                    (true, SelectIrScan)
                }
            }
            CaptureDr => {
                if target == ShiftDr {
                    (false, ShiftDr)
                } else {
                    (true, Exit1Dr)
                }
            }
            ShiftDr => (true, Exit1Dr),
            Exit1Dr => {
                if matches!(target, PauseDr | Exit2Dr | ShiftDr) {
                    (false, PauseDr)
                } else {
                    (true, UpdateDr)
                }
            }
            PauseDr => (true, Exit2Dr),
            Exit2Dr => {
                if matches!(target, ShiftDr | Exit1Dr | PauseDr) {
                    (false, ShiftDr)
                } else {
                    (true, UpdateDr)
                }
            }
            UpdateDr => {
                if target == RunTestIdle {
                    (false, RunTestIdle)
                } else {
                    (true, SelectDrScan)
                }
            }
            SelectIrScan => {
                if target > SelectIrScan && target <= UpdateIr {
                    (false, CaptureIr)
                } else {
                    (true, TestLogicReset)
                }
            }
            CaptureIr => {
                if target == ShiftIr {
                    (false, ShiftIr)
                } else {
                    (true, Exit1Ir)
                }
            }
            ShiftIr => (true, Exit1Ir),
            Exit1Ir => {
                if matches!(target, PauseIr | Exit2Ir | ShiftIr) {
                    (false, PauseIr)
                } else {
                    (true, UpdateIr)
                }
            }
            PauseIr => (true, Exit2Ir),
            Exit2Ir => {
                if matches!(target, ShiftIr | Exit1Ir | PauseIr) {
                    (false, ShiftIr)
                } else {
                    (true, UpdateIr)
                }
            }
            UpdateIr => {
                if target == RunTestIdle {
                    (false, RunTestIdle)
                } else {
                    (true, SelectDrScan)
                }
            }
        })
    }

    /// Build the shortest TMS bit sequence from `self` to `target`,
    /// returning the sequence and the state it ends in (always `target`).
    ///
    /// Terminates for every `(from, to)` pair: every branch above strictly
    /// decreases the graph distance to `target` along the canonical
    /// IEEE 1149.1 transition graph.
    pub fn route(self, target: State) -> BitVec<u8, Lsb0> {
        let mut tms = BitVec::<u8, Lsb0>::new();
        let mut state = self;
        while let Some((bit, next)) = state.step_toward(target) {
            tms.push(bit);
            state = next;
        }
        tms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [State; 16] = [
        State::TestLogicReset,
        State::RunTestIdle,
        State::SelectDrScan,
        State::CaptureDr,
        State::ShiftDr,
        State::Exit1Dr,
        State::PauseDr,
        State::Exit2Dr,
        State::UpdateDr,
        State::SelectIrScan,
        State::CaptureIr,
        State::ShiftIr,
        State::Exit1Ir,
        State::PauseIr,
        State::Exit2Ir,
        State::UpdateIr,
    ];

    fn simulate(from: State, tms: &BitSlice<u8, Lsb0>) -> State {
        let mut state = from;
        for bit in tms {
            state = step(state, *bit);
        }
        state
    }

    fn step(state: State, tms: bool) -> State {
        use State::*;
        match (state, tms) {
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

    #[test]
    fn routing_totality_all_pairs() {
        for &from in &ALL {
            for &to in &ALL {
                let tms = from.route(to);
                let reached = simulate(from, &tms);
                assert_eq!(reached, to, "routing {from:?} -> {to:?} landed on {reached:?}");
            }
        }
    }

    #[test]
    fn self_route_is_empty() {
        for &s in &ALL {
            assert!(s.route(s).is_empty());
        }
    }

    #[test]
    fn shift_dr_single_bit_needs_tms_1() {
        // A length-1 shift must leave SHIFT on the same clock (spec.md 4.1).
        let tms = State::ShiftDr.route(State::Exit1Dr);
        assert_eq!(tms.len(), 1);
        assert!(tms[0]);
    }
}
