//! The bit-serial transport contract the TAP controller is driven over.
//!
//! Concrete transports (a USB-to-MPSSE adapter, a scan-chain simulator) are
//! outside the scope of this crate; only the contract they must satisfy
//! lives here. Grounded on `ebyst/drivers/driver.py`'s `Driver` base class,
//! which provides default `transmit_tms_str`/`transmit_tdi_str`/
//! `transfer_tdi_tdo_str`/`receive_tdo_str` implementations built on a
//! single abstract `transfer` primitive — mirrored here as default trait
//! methods.

use bitvec::prelude::*;

/// One TCK cycle plus the many-cycle conveniences built on top of it.
///
/// All bitstrings that cross this boundary are little-endian-addressed:
/// bit 0 is the first bit shifted onto/off of the wire.
pub trait Transport {
    /// Clock one TCK cycle with the given TMS/TDI values, returning the
    /// sampled TDO value.
    fn transfer(&mut self, tms: bool, tdi: bool) -> bool;

    /// Force the TAP to `TEST_LOGIC_RESET` with at least 5 TMS=1 cycles.
    fn reset(&mut self) {
        for _ in 0..5 {
            self.transfer(true, false);
        }
    }

    /// Best-effort TCK frequency request; implementations may round down.
    fn set_freq(&mut self, _hz: f64) {}

    /// Clock `tms` with a constant TDI value.
    fn transmit_tms_str(&mut self, tms: &BitSlice<u8, Lsb0>, tdi: bool) {
        for bit in tms {
            self.transfer(*bit, tdi);
        }
    }

    /// Shift `tdi` out, ignoring TDO. `first_tms`/`last_tms` are used for
    /// every bit except the last, which uses `last_tms`.
    fn transmit_tdi_str(&mut self, tdi: &BitSlice<u8, Lsb0>, first_tms: bool, last_tms: bool) {
        self.transfer_tdi_tdo_str(tdi, first_tms, last_tms);
    }

    /// Full-duplex shift: clock `tdi` out while capturing TDO.
    fn transfer_tdi_tdo_str(
        &mut self,
        tdi: &BitSlice<u8, Lsb0>,
        first_tms: bool,
        last_tms: bool,
    ) -> BitVec<u8, Lsb0> {
        assert!(!tdi.is_empty(), "transfer_tdi_tdo_str requires >= 1 bit");
        let mut out = BitVec::<u8, Lsb0>::with_capacity(tdi.len());
        let last = tdi.len() - 1;
        for (i, bit) in tdi.iter().enumerate() {
            let tms = if i == last { last_tms } else { first_tms };
            out.push(self.transfer(tms, *bit));
        }
        out
    }

    /// Clock `n` cycles with a constant TDI value, capturing TDO.
    ///
    /// When `n == 1`, `first_tms` must equal `last_tms` and `first_tdi`
    /// must equal `last_tdi` (there is only one cycle to clock).
    fn receive_tdo_str(
        &mut self,
        n: usize,
        first_tms: bool,
        first_tdi: bool,
        last_tms: bool,
        last_tdi: bool,
    ) -> BitVec<u8, Lsb0> {
        assert!(n >= 1, "receive_tdo_str requires n >= 1");
        assert!(
            n != 1 || first_tms == last_tms,
            "last_tms must equal first_tms when n == 1"
        );
        assert!(
            n != 1 || first_tdi == last_tdi,
            "last_tdi must equal first_tdi when n == 1"
        );
        let mut out = BitVec::<u8, Lsb0>::with_capacity(n);
        for i in 0..n {
            let last = i == n - 1;
            let tms = if last { last_tms } else { first_tms };
            let tdi = if last { last_tdi } else { first_tdi };
            out.push(self.transfer(tms, tdi));
        }
        out
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn transfer(&mut self, tms: bool, tdi: bool) -> bool {
        (**self).transfer(tms, tdi)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn set_freq(&mut self, hz: f64) {
        (**self).set_freq(hz)
    }
}
