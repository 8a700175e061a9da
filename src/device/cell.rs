//! Boundary-scan cells and the `std_logic`-style bit patterns BSDL encodes
//! IDCODEs with.
//!
//! Grounded on `ebyst/device.py`'s `Cell` and `StdLogicPattern` classes.

use bitvec::prelude::*;

/// A bit in `{0, 1, X}`, as BSDL's `std_logic` subset allows for IDCODE and
/// safe-value fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum StdLogicBit {
    /// A fixed `0`.
    Zero,
    /// A fixed `1`.
    One,
    /// Don't-care.
    DontCare,
}

impl StdLogicBit {
    fn parse(c: char) -> Option<Self> {
        match c.to_ascii_uppercase() {
            '0' => Some(StdLogicBit::Zero),
            '1' => Some(StdLogicBit::One),
            'X' => Some(StdLogicBit::DontCare),
            _ => None,
        }
    }

    fn matches(self, bit: bool) -> bool {
        match self {
            StdLogicBit::Zero => !bit,
            StdLogicBit::One => bit,
            StdLogicBit::DontCare => true,
        }
    }
}

/// A `std_logic` bit pattern with `X` don't-care support, such as an
/// IDCODE mask or a cell's safe value.
///
/// Grounded on `ebyst/device.py::StdLogicPattern`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StdLogicPattern {
    bits: Vec<StdLogicBit>,
}

impl StdLogicPattern {
    /// Parse a textual `std_logic` pattern (MSB-first as written).
    pub fn parse(pattern: &str) -> Result<Self, String> {
        let bits = pattern
            .chars()
            .map(|c| StdLogicBit::parse(c).ok_or_else(|| format!("{c} not supported in bit pattern")))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(StdLogicPattern { bits })
    }

    /// Number of bits in the pattern.
    pub fn len(&self) -> usize {
        self.bits.len()
    }

    /// True if the pattern has no bits.
    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    /// Compare against a captured little-endian-addressed bitstring of the
    /// same MSB-first bit order as the pattern (index 0 of `value` compares
    /// against the pattern's first character).
    pub fn matches(&self, value: &BitSlice<u8, Lsb0>) -> bool {
        if self.bits.len() != value.len() {
            return false;
        }
        self.bits
            .iter()
            .zip(value.iter())
            .all(|(pat, bit)| pat.matches(*bit))
    }
}

/// The cell-type tag from BSDL's `BOUNDARY_REGISTER` attribute
/// (e.g. `BC_1`, `BC_2`, `BC_7`). Stored verbatim rather than as a closed
/// enum: BSDL allows vendor-specific cell types beyond the standard set,
/// and nothing in this crate branches on the tag itself.
pub type CellType = String;

/// The function a boundary-scan cell performs, from BSDL's
/// `BOUNDARY_REGISTER` attribute.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Function {
    /// Captures an input pin's value.
    Input,
    /// Drives an output pin; disabled state undefined ("2-state").
    Output2,
    /// Drives a tristate output pin.
    Output3,
    /// Bidirectional: both drives and captures, via a control cell.
    Bidir,
    /// Controls another cell's output enable.
    Control,
    /// Controls another cell's output enable, inverted sense.
    ControlR,
    /// Internal cell with no associated pin.
    Internal,
    /// Drives the device's test clock.
    Clock,
}

impl Function {
    /// Parse the BSDL function keyword (case-insensitive).
    pub fn parse(s: &str) -> Result<Self, String> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "input" => Function::Input,
            "output2" => Function::Output2,
            "output3" => Function::Output3,
            "bidir" => Function::Bidir,
            "control" => Function::Control,
            "controlr" => Function::ControlR,
            "internal" => Function::Internal,
            "clock" => Function::Clock,
            other => return Err(format!("unknown cell function {other}")),
        })
    }

    /// Does this function drive an output?
    pub fn drives_output(self) -> bool {
        matches!(self, Function::Output2 | Function::Output3 | Function::Bidir)
    }

    /// Does this function capture an input?
    pub fn captures_input(self) -> bool {
        matches!(self, Function::Input | Function::Bidir)
    }
}

/// A single cell of a device's boundary register.
///
/// A cell's identity is its index in the owning device's cell vector;
/// equality is by index. Grounded on `ebyst/device.py::Cell`.
#[derive(Debug, Clone)]
pub struct Cell {
    /// Index within the owning device's cell vector.
    pub index: usize,
    /// The cell-type tag, e.g. `BC_1`.
    pub cell_type: CellType,
    /// The port name this cell belongs to, or `None` for internal cells
    /// (BSDL's `*`).
    pub port: Option<String>,
    /// The cell's function.
    pub function: Function,
    /// The cell's safe value.
    pub safe: StdLogicBit,
    /// For output cells with an associated control cell: the control
    /// cell's index.
    pub control_cell: Option<usize>,
    /// The control cell value that disables this cell's output.
    pub disable_value: Option<bool>,

    /// Last captured bit; `None` until the first capture.
    pub in_value: Option<bool>,
    /// Bit to shift out on the next cycle.
    pub out_value: bool,
}

impl PartialEq for Cell {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}
impl Eq for Cell {}

impl Cell {
    /// Construct a new cell, initialising `out_value` from `safe`
    /// (`X` leaves `out_value` at its default, `false`).
    pub fn new(
        index: usize,
        cell_type: CellType,
        port: Option<String>,
        function: Function,
        safe: StdLogicBit,
        control_cell: Option<usize>,
        disable_value: Option<bool>,
    ) -> Self {
        let out_value = match safe {
            StdLogicBit::One => true,
            StdLogicBit::Zero | StdLogicBit::DontCare => false,
        };
        Cell {
            index,
            cell_type,
            port,
            function,
            safe,
            control_cell,
            disable_value,
            in_value: None,
            out_value,
        }
    }

    /// Reset `out_value` to the cell's safe value and clear `in_value`,
    /// as performed by `EXTEST_PULSE`.
    pub fn reset(&mut self) {
        self.in_value = None;
        self.out_value = matches!(self.safe, StdLogicBit::One);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn std_logic_pattern_matches_dont_care() {
        let p = StdLogicPattern::parse("10XX").unwrap();
        let mut v = BitVec::<u8, Lsb0>::new();
        v.extend([true, false, true, true]); // matches "10XX" bit-for-bit
        assert!(p.matches(&v));
        let mut bad = BitVec::<u8, Lsb0>::new();
        bad.extend([false, false, true, true]);
        assert!(!p.matches(&bad));
    }

    #[test]
    fn cell_safe_value_initialises_out_value() {
        let c1 = Cell::new(0, "BC_1".into(), None, Function::Internal, StdLogicBit::One, None, None);
        assert!(c1.out_value);
        let c0 = Cell::new(1, "BC_1".into(), None, Function::Internal, StdLogicBit::Zero, None, None);
        assert!(!c0.out_value);
        let cx = Cell::new(2, "BC_1".into(), None, Function::Internal, StdLogicBit::DontCare, None, None);
        assert!(!cx.out_value);
    }
}
