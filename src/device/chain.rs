//! An ordered scan chain of devices.
//!
//! Grounded on `ebyst/tap_controller.py::TapController.Chain`, a `list`
//! subclass that assembles/splits IR and BR shifts across every device on
//! the chain. Device 0 is nearest TDI: its bits shift in first and its
//! captured bits come out of TDO last.

use bitvec::prelude::*;

use super::{Device, UnsupportedOperationError};

/// An ordered list of devices sharing one physical TAP.
#[derive(Debug, Clone, Default)]
pub struct Chain {
    /// The devices, index 0 nearest TDI.
    pub devices: Vec<Device>,
    /// Set once [`detect_chain`](crate::tap::TapController::detect_chain)
    /// or an explicit validation pass has confirmed every device's IDCODE.
    pub validated: bool,
}

impl Chain {
    /// An empty chain.
    pub fn new() -> Self {
        Chain::default()
    }

    /// Append a device to the TDO end of the chain.
    pub fn add_device(&mut self, device: Device) {
        self.validated = false;
        self.devices.push(device);
    }

    /// Total instruction register length across every device.
    pub fn irlen(&self) -> usize {
        self.devices.iter().map(|d| d.irlen).sum()
    }

    /// Total boundary register length across every device.
    pub fn brlen(&self) -> usize {
        self.devices.iter().map(|d| d.brlen()).sum()
    }

    /// Assemble the full-chain instruction register to shift, given one
    /// instruction name per device (device 0 first).
    pub fn generate_ir(&self, instructions: &[&str]) -> Result<BitVec<u8, Lsb0>, UnsupportedOperationError> {
        assert_eq!(
            instructions.len(),
            self.devices.len(),
            "one instruction per device is required"
        );
        let mut ir = BitVec::<u8, Lsb0>::with_capacity(self.irlen());
        for (device, name) in self.devices.iter().zip(instructions) {
            ir.extend_from_bitslice(device.opcode(name)?);
        }
        Ok(ir)
    }

    /// Assemble the full-chain boundary register to shift, from every
    /// device's current cell outputs.
    pub fn generate_br(&self) -> BitVec<u8, Lsb0> {
        let mut br = BitVec::<u8, Lsb0>::with_capacity(self.brlen());
        for device in &self.devices {
            br.extend(device.generate_br());
        }
        br
    }

    /// Split a freshly-scanned boundary register back out to each
    /// device's cells.
    pub fn update_br(&mut self, bits: &BitSlice<u8, Lsb0>) {
        let mut offset = 0;
        for device in &mut self.devices {
            let len = device.brlen();
            device.update_br(&bits[offset..offset + len]);
            offset += len;
        }
    }

    /// Reset every device's cells to their safe values.
    pub fn reset_cells(&mut self) {
        for device in &mut self.devices {
            device.reset_cells();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::cell::{Cell, Function, StdLogicBit};
    use std::collections::HashMap;

    fn bypass_device(irlen: usize, brlen: usize) -> Device {
        let mut opcodes = HashMap::new();
        let mut bypass = BitVec::<u8, Lsb0>::new();
        bypass.extend(std::iter::repeat(true).take(irlen));
        opcodes.insert("BYPASS".to_string(), bypass);
        let cells = (0..brlen)
            .map(|i| Cell::new(i, "BC_1".into(), None, Function::Internal, StdLogicBit::DontCare, None, None))
            .collect();
        Device::from_parts(irlen, None, opcodes, cells, None).unwrap()
    }

    #[test]
    fn generate_ir_concatenates_in_chain_order() {
        let mut chain = Chain::new();
        chain.add_device(bypass_device(2, 1));
        chain.add_device(bypass_device(3, 1));
        let ir = chain.generate_ir(&["BYPASS", "BYPASS"]).unwrap();
        assert_eq!(ir.len(), 5);
        assert_eq!(chain.irlen(), 5);
    }

    #[test]
    fn update_br_splits_by_device_brlen() {
        let mut chain = Chain::new();
        chain.add_device(bypass_device(2, 1));
        chain.add_device(bypass_device(2, 2));
        let mut bits = BitVec::<u8, Lsb0>::new();
        bits.extend([true, false, true]);
        chain.update_br(&bits);
        assert_eq!(chain.devices[0].cells[0].in_value, Some(true));
        assert_eq!(chain.devices[1].cells[0].in_value, Some(false));
        assert_eq!(chain.devices[1].cells[1].in_value, Some(true));
    }
}
