//! Boundary-scan device modelling: cells, pins, BSDL intake, and the
//! scan chain those devices are linked into.
//!
//! Grounded on `ebyst/device.py::Device`.

pub mod bsdl;
pub mod cell;
pub mod chain;
pub mod pin;

use std::collections::HashMap;

use bitvec::prelude::*;

pub use cell::{Cell, CellType, Function, StdLogicBit, StdLogicPattern};
pub use chain::Chain;
pub use pin::{DiffPin, Pin, PinGroup};

/// An operation a device or pin does not support in its current
/// configuration (missing cell, uncaptured input, unknown instruction).
#[derive(Debug, thiserror::Error)]
pub enum UnsupportedOperationError {
    /// The named pin has no output cell.
    #[error("pin {0} has no output cell")]
    NoOutputCell(String),
    /// The named pin has no control cell to gate its output.
    #[error("pin {0} has no control cell for output enable")]
    NoControlCell(String),
    /// The named pin has no input cell.
    #[error("pin {0} has no input cell")]
    NoInputCell(String),
    /// The named pin has not yet captured a value.
    #[error("pin {0} has not yet captured a value")]
    NotYetCaptured(String),
    /// A cell index referenced by a pin is out of range for the device.
    #[error("cell index {0} out of range")]
    CellIndexOutOfRange(usize),
    /// The named instruction opcode is not defined for this device.
    #[error("instruction {0} is not supported by this device")]
    InstructionNotSupported(String),
}

impl UnsupportedOperationError {
    /// Build a [`Self::NoOutputCell`].
    pub fn no_output_cell(name: &str) -> Self {
        Self::NoOutputCell(name.to_string())
    }
    /// Build a [`Self::NoControlCell`].
    pub fn no_control_cell(name: &str) -> Self {
        Self::NoControlCell(name.to_string())
    }
    /// Build a [`Self::NoInputCell`].
    pub fn no_input_cell(name: &str) -> Self {
        Self::NoInputCell(name.to_string())
    }
    /// Build a [`Self::NotYetCaptured`].
    pub fn not_yet_captured(name: &str) -> Self {
        Self::NotYetCaptured(name.to_string())
    }
}

/// A single boundary-scan-capable device on a chain, as described by its
/// BSDL file: its instruction register, IDCODE, boundary register cells,
/// and the derived pinmap.
///
/// Grounded on `ebyst/device.py::Device`.
#[derive(Debug, Clone)]
pub struct Device {
    /// Instruction register length in bits.
    pub irlen: usize,
    /// Expected IDCODE pattern, if this device declares one (don't-care
    /// bits permitted, e.g. in the version nibble).
    pub idcode: Option<StdLogicPattern>,
    /// Named instruction opcodes, MSB-first as declared in BSDL.
    pub opcodes: HashMap<String, BitVec<u8, Lsb0>>,
    /// The boundary register's cells, in BSDL declaration order (cell 0
    /// nearest TDI, per `ebyst/device.py`'s convention).
    pub cells: Vec<Cell>,
    /// Pins derived from the cells' port associations.
    pub pinmap: HashMap<String, Pin>,
    /// `TAP_SCAN_CLOCK` maximum frequency in Hz, if declared.
    pub tap_scan_clock: Option<f64>,
}

impl Device {
    /// Construct a device from its parsed parts, deriving the pinmap from
    /// the cells' port/function/control-cell associations.
    pub fn from_parts(
        irlen: usize,
        idcode: Option<StdLogicPattern>,
        opcodes: HashMap<String, BitVec<u8, Lsb0>>,
        cells: Vec<Cell>,
        tap_scan_clock: Option<f64>,
    ) -> Result<Self, UnsupportedOperationError> {
        for cell in &cells {
            if let Some(ctl) = cell.control_cell {
                if ctl >= cells.len() {
                    return Err(UnsupportedOperationError::CellIndexOutOfRange(ctl));
                }
            }
        }
        let pinmap = build_pinmap(&cells);
        Ok(Device {
            irlen,
            idcode,
            opcodes,
            cells,
            pinmap,
            tap_scan_clock,
        })
    }

    /// Number of bits in the boundary register.
    pub fn brlen(&self) -> usize {
        self.cells.len()
    }

    /// Look up a named instruction's opcode bits.
    pub fn opcode(&self, name: &str) -> Result<&BitSlice<u8, Lsb0>, UnsupportedOperationError> {
        self.opcodes
            .get(name)
            .map(|bv| bv.as_bitslice())
            .ok_or_else(|| UnsupportedOperationError::InstructionNotSupported(name.to_string()))
    }

    /// Assemble the current boundary register contents to shift out (TDI
    /// side), LSB (cell 0) first.
    pub fn generate_br(&self) -> BitVec<u8, Lsb0> {
        self.cells.iter().map(|c| c.out_value).collect()
    }

    /// Update every cell's captured input value from a freshly-scanned
    /// boundary register (TDO side), same bit order as [`Self::generate_br`].
    pub fn update_br(&mut self, bits: &BitSlice<u8, Lsb0>) {
        for (cell, bit) in self.cells.iter_mut().zip(bits.iter()) {
            cell.in_value = Some(*bit);
        }
    }

    /// Reset every cell to its safe value, as `EXTEST_PULSE` does.
    pub fn reset_cells(&mut self) {
        for cell in &mut self.cells {
            cell.reset();
        }
    }
}

fn build_pinmap(cells: &[Cell]) -> HashMap<String, Pin> {
    let mut by_port: HashMap<String, Vec<usize>> = HashMap::new();
    for cell in cells {
        if let Some(port) = &cell.port {
            by_port.entry(port.clone()).or_default().push(cell.index);
        }
    }
    let mut pinmap = HashMap::new();
    for (port, indices) in by_port {
        let mut input_cell = None;
        let mut output_cell = None;
        let mut control_cell = None;
        for idx in indices {
            let cell = &cells[idx];
            if cell.function.captures_input() && input_cell.is_none() {
                input_cell = Some(idx);
            }
            if cell.function.drives_output() && output_cell.is_none() {
                output_cell = Some(idx);
                control_cell = cell.control_cell;
            }
        }
        pinmap.insert(port.clone(), Pin::new(port, input_cell, output_cell, control_cell));
    }
    pinmap
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_parts_rejects_dangling_control_cell() {
        let cells = vec![Cell::new(
            0,
            "BC_7".into(),
            Some("PA".into()),
            Function::Bidir,
            StdLogicBit::Zero,
            Some(5),
            Some(true),
        )];
        let err = Device::from_parts(4, None, HashMap::new(), cells, None).unwrap_err();
        assert!(matches!(err, UnsupportedOperationError::CellIndexOutOfRange(5)));
    }

    #[test]
    fn update_br_populates_in_value_in_cell_order() {
        let cells = vec![
            Cell::new(0, "BC_1".into(), Some("PA".into()), Function::Input, StdLogicBit::DontCare, None, None),
            Cell::new(1, "BC_1".into(), Some("PB".into()), Function::Input, StdLogicBit::DontCare, None, None),
        ];
        let mut dev = Device::from_parts(2, None, HashMap::new(), cells, None).unwrap();
        let mut bits = BitVec::<u8, Lsb0>::new();
        bits.extend([true, false]);
        dev.update_br(&bits);
        assert_eq!(dev.cells[0].in_value, Some(true));
        assert_eq!(dev.cells[1].in_value, Some(false));
    }
}
