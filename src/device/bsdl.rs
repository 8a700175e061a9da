//! Turning the handful of BSDL attribute strings a chain needs into a
//! [`Device`].
//!
//! The VHDL entity grammar that surrounds these attributes (generics,
//! ports, the entity/package wrapper) is out of scope here: callers are
//! expected to have already extracted the attribute values as strings,
//! the way `ebyst/bsdl.py`'s pyparsing grammar does. What this module
//! grounds on `ebyst/device.py::Device.from_bsdl` is the attribute-value
//! parsing itself: `INSTRUCTION_OPCODE`'s `NAME (bits)` list,
//! `BOUNDARY_REGISTER`'s per-cell tuples, and `IDCODE_REGISTER`'s bit
//! reversal.

use std::collections::HashMap;

use bitvec::prelude::*;

use super::cell::{Cell, Function, StdLogicBit, StdLogicPattern};
use super::Device;

/// A BSDL parse or cross-check error.
#[derive(Debug, thiserror::Error)]
pub enum BsdlError {
    /// An attribute expected to hold an integer did not.
    #[error("{attribute} is not a valid integer: {value}")]
    InvalidInteger {
        /// The attribute name.
        attribute: &'static str,
        /// The offending text.
        value: String,
    },
    /// An `INSTRUCTION_OPCODE` entry was malformed.
    #[error("invalid INSTRUCTION_OPCODE entry: {0}")]
    InvalidOpcodeEntry(String),
    /// A `BOUNDARY_REGISTER` cell entry was malformed.
    #[error("invalid BOUNDARY_REGISTER cell entry: {0}")]
    InvalidCellEntry(String),
    /// `IDCODE_REGISTER`'s value was not a valid `std_logic` pattern.
    #[error("invalid IDCODE_REGISTER pattern: {0}")]
    InvalidIdcodePattern(String),
    /// `TAP_SCAN_CLOCK`'s value did not parse as a frequency.
    #[error("invalid TAP_SCAN_CLOCK value: {0}")]
    InvalidFrequency(String),
    /// `BOUNDARY_LENGTH` did not match the number of cells declared in
    /// `BOUNDARY_REGISTER`.
    #[error("BOUNDARY_LENGTH says {declared} cells but BOUNDARY_REGISTER declares {actual}")]
    BoundaryLengthMismatch {
        /// The `BOUNDARY_LENGTH` attribute's value.
        declared: usize,
        /// The number of cell entries actually parsed.
        actual: usize,
    },
    /// A cell's `cell_number` field was out of sequence or duplicated.
    #[error("cell numbers in BOUNDARY_REGISTER must be 0..N without gaps, found {0}")]
    CellNumberOutOfSequence(usize),
    /// A device-model invariant was violated by the parsed attributes.
    #[error(transparent)]
    Device(#[from] super::UnsupportedOperationError),
}

/// The raw attribute strings `Device::from_bsdl` needs, already extracted
/// from a BSDL entity by the caller.
#[derive(Debug, Clone, Default)]
pub struct BsdlAttributes {
    /// `INSTRUCTION_LENGTH` attribute value, e.g. `"4"`.
    pub instruction_length: String,
    /// `INSTRUCTION_OPCODE` attribute value, e.g.
    /// `"BYPASS (1111), EXTEST (0000), SAMPLE (1000)"`.
    pub instruction_opcode: String,
    /// `IDCODE_REGISTER` attribute value, MSB-first as BSDL writes it.
    pub idcode_register: Option<String>,
    /// `BOUNDARY_LENGTH` attribute value, e.g. `"3"`.
    pub boundary_length: String,
    /// `BOUNDARY_REGISTER` attribute value, the `num (type, port, fn,
    /// safe[, ccell, disval, disrslt])` list.
    pub boundary_register: String,
    /// `TAP_SCAN_CLOCK` attribute value, a frequency in Hz with an
    /// optional trailing BSDL unit note.
    pub tap_scan_clock: Option<String>,
}

impl Device {
    /// Build a device from its BSDL attribute strings.
    pub fn from_bsdl(attrs: &BsdlAttributes) -> Result<Self, BsdlError> {
        let irlen = parse_usize("INSTRUCTION_LENGTH", &attrs.instruction_length)?;
        let boundary_length = parse_usize("BOUNDARY_LENGTH", &attrs.boundary_length)?;
        let opcodes = parse_opcodes(&attrs.instruction_opcode)?;
        let cells = parse_cells(&attrs.boundary_register)?;
        if cells.len() != boundary_length {
            return Err(BsdlError::BoundaryLengthMismatch {
                declared: boundary_length,
                actual: cells.len(),
            });
        }
        let idcode = attrs
            .idcode_register
            .as_deref()
            .map(parse_idcode_pattern)
            .transpose()?;
        let tap_scan_clock = attrs
            .tap_scan_clock
            .as_deref()
            .map(parse_frequency)
            .transpose()?;
        Ok(Device::from_parts(irlen, idcode, opcodes, cells, tap_scan_clock)?)
    }
}

fn parse_usize(attribute: &'static str, value: &str) -> Result<usize, BsdlError> {
    value
        .trim()
        .parse()
        .map_err(|_| BsdlError::InvalidInteger {
            attribute,
            value: value.to_string(),
        })
}

/// Split `s` on top-level occurrences of `sep`, ignoring `sep` inside
/// parentheses.
fn split_top_level(s: &str, sep: char) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '(' => {
                depth += 1;
                current.push(c);
            }
            ')' => {
                depth -= 1;
                current.push(c);
            }
            c if c == sep && depth == 0 => {
                out.push(current.trim().to_string());
                current.clear();
            }
            c => current.push(c),
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

fn parse_opcodes(value: &str) -> Result<HashMap<String, BitVec<u8, Lsb0>>, BsdlError> {
    let mut opcodes = HashMap::new();
    for entry in split_top_level(value, ',') {
        let (name, bits) = entry
            .split_once('(')
            .ok_or_else(|| BsdlError::InvalidOpcodeEntry(entry.clone()))?;
        let bits = bits
            .strip_suffix(')')
            .ok_or_else(|| BsdlError::InvalidOpcodeEntry(entry.clone()))?;
        // An instruction with more than one listed bit pattern (optional
        // private opcodes aliasing the same mnemonic) is silently
        // ignored rather than rejected.
        if bits.contains(',') {
            continue;
        }
        let name = name.trim().to_string();
        let mut bv = BitVec::<u8, Lsb0>::with_capacity(bits.len());
        // BSDL writes opcodes MSB-first; our shift registers are
        // little-endian-addressed, so bit 0 is the opcode's LSB.
        for c in bits.trim().chars().rev() {
            bv.push(match c {
                '0' => false,
                '1' => true,
                _ => return Err(BsdlError::InvalidOpcodeEntry(entry.clone())),
            });
        }
        opcodes.insert(name, bv);
    }
    if opcodes.is_empty() {
        return Err(BsdlError::InvalidOpcodeEntry(value.to_string()));
    }
    Ok(opcodes)
}

fn parse_cells(value: &str) -> Result<Vec<Cell>, BsdlError> {
    let mut entries: Vec<(usize, Cell)> = Vec::new();
    for entry in split_top_level(value, ',') {
        let (num_str, rest) = entry
            .split_once('(')
            .ok_or_else(|| BsdlError::InvalidCellEntry(entry.clone()))?;
        let num = num_str
            .trim()
            .parse::<usize>()
            .map_err(|_| BsdlError::InvalidCellEntry(entry.clone()))?;
        let rest = rest
            .trim()
            .strip_suffix(')')
            .ok_or_else(|| BsdlError::InvalidCellEntry(entry.clone()))?;
        let fields: Vec<&str> = rest.split(',').map(str::trim).collect();
        if fields.len() < 4 {
            return Err(BsdlError::InvalidCellEntry(entry.clone()));
        }
        let cell_type = fields[0].to_string();
        let port = if fields[1] == "*" {
            None
        } else {
            Some(fields[1].to_string())
        };
        let function = Function::parse(fields[2]).map_err(|_| BsdlError::InvalidCellEntry(entry.clone()))?;
        let safe = fields[3]
            .chars()
            .next()
            .and_then(parse_std_logic_char)
            .ok_or_else(|| BsdlError::InvalidCellEntry(entry.clone()))?;
        let control_cell = fields
            .get(4)
            .filter(|s| !s.is_empty())
            .map(|s| s.parse::<usize>())
            .transpose()
            .map_err(|_| BsdlError::InvalidCellEntry(entry.clone()))?;
        let disable_value = fields
            .get(5)
            .filter(|s| !s.is_empty())
            .map(|s| match *s {
                "0" => Ok(false),
                "1" => Ok(true),
                _ => Err(BsdlError::InvalidCellEntry(entry.clone())),
            })
            .transpose()?;
        entries.push((
            num,
            Cell::new(num, cell_type, port, function, safe, control_cell, disable_value),
        ));
    }
    entries.sort_by_key(|(num, _)| *num);
    for (i, (num, _)) in entries.iter().enumerate() {
        if *num != i {
            return Err(BsdlError::CellNumberOutOfSequence(*num));
        }
    }
    Ok(entries.into_iter().map(|(_, c)| c).collect())
}

fn parse_std_logic_char(c: char) -> Option<StdLogicBit> {
    match c.to_ascii_uppercase() {
        '0' => Some(StdLogicBit::Zero),
        '1' => Some(StdLogicBit::One),
        'X' | 'Z' => Some(StdLogicBit::DontCare),
        _ => None,
    }
}

fn parse_idcode_pattern(value: &str) -> Result<StdLogicPattern, BsdlError> {
    // BSDL declares IDCODE_REGISTER MSB (bit 31) first; our captured
    // shift register is addressed bit 0 = LSB = first bit shifted in.
    let reversed: String = value.trim().chars().rev().collect();
    StdLogicPattern::parse(&reversed).map_err(|_| BsdlError::InvalidIdcodePattern(value.to_string()))
}

fn parse_frequency(value: &str) -> Result<f64, BsdlError> {
    let trimmed = value.trim();
    let numeric_len = trimmed
        .char_indices()
        .take_while(|&(_, c)| c.is_ascii_digit() || matches!(c, '.' | 'e' | 'E' | '+' | '-'))
        .count();
    trimmed[..numeric_len]
        .parse()
        .map_err(|_| BsdlError::InvalidFrequency(value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_attrs() -> BsdlAttributes {
        BsdlAttributes {
            instruction_length: "4".into(),
            instruction_opcode: "BYPASS (1111), EXTEST (0000), SAMPLE (1000), IDCODE (0110)".into(),
            idcode_register: Some("0001XXXXXXXXXXXXXXXXXXXXXXXXXXX1".into()),
            boundary_length: "2".into(),
            boundary_register: "0 (BC_1, TDO, output3, X, 1, 1), 1 (BC_1, *, control, 1)".into(),
            tap_scan_clock: Some("10.00e6 (BSCAN_CLOCK)".into()),
        }
    }

    #[test]
    fn from_bsdl_builds_device() {
        let dev = Device::from_bsdl(&sample_attrs()).unwrap();
        assert_eq!(dev.irlen, 4);
        assert_eq!(dev.brlen(), 2);
        assert_eq!(dev.opcode("BYPASS").unwrap().len(), 4);
        assert!(dev.opcode("BYPASS").unwrap().all());
        assert_eq!(dev.tap_scan_clock, Some(10.00e6));
        assert!(dev.idcode.is_some());
        assert_eq!(dev.cells[0].port.as_deref(), Some("TDO"));
        assert_eq!(dev.cells[0].control_cell, Some(1));
    }

    #[test]
    fn boundary_length_mismatch_is_rejected() {
        let mut attrs = sample_attrs();
        attrs.boundary_length = "5".into();
        let err = Device::from_bsdl(&attrs).unwrap_err();
        assert!(matches!(err, BsdlError::BoundaryLengthMismatch { declared: 5, actual: 2 }));
    }

    #[test]
    fn split_top_level_ignores_commas_inside_parens() {
        let parts = split_top_level("A (1, 2), B (3, 4)", ',');
        assert_eq!(parts, vec!["A (1, 2)".to_string(), "B (3, 4)".to_string()]);
    }

    #[test]
    fn opcode_entries_with_multiple_patterns_are_skipped_not_rejected() {
        let mut attrs = sample_attrs();
        attrs.instruction_opcode =
            "BYPASS (1111), EXTEST (0000), PRIVATE (1001, 1010), SAMPLE (1000), IDCODE (0110)".into();
        let dev = Device::from_bsdl(&attrs).unwrap();
        assert!(dev.opcode("PRIVATE").is_err());
        assert!(dev.opcode("SAMPLE").is_ok());
    }
}
