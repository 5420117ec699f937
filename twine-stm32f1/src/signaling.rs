//! Register-level bus control for the F1's first I2C block.
//!
//! Each [`BusSignaling`] primitive maps to a handful of CR1/CR2/DR accesses
//! plus the interrupt-enable adjustments the access needs. SB and BTF stay
//! set until the data register is touched, so the event interrupt is masked
//! when those flags are reported and re-enabled here once the next access is
//! queued. The ADDR clear is likewise deferred to these primitives: ADDR
//! stretches SCL, which makes it the one window where the first received
//! byte's ack policy cannot race the wire.

use core::sync::atomic::{AtomicUsize, Ordering};

use embassy_stm32::pac;
use embassy_stm32::pac::i2c::vals::Pos;
use twine_hal::{AckPolicy, BusSignaling};

/// Drives start/stop/byte primitives on I2C1.
///
/// Constructed by the runner after the peripheral has been clocked and the
/// pins muxed. Shares the receive countdown with the interrupt handlers so
/// the ack shape of a read is programmed from its length.
pub struct PeripheralBus {
    read_remaining: &'static AtomicUsize,
}

impl PeripheralBus {
    pub(crate) const fn new(read_remaining: &'static AtomicUsize) -> Self {
        Self { read_remaining }
    }
}

impl BusSignaling for PeripheralBus {
    fn assert_start(&mut self) {
        let regs = pac::I2C1;
        // Nothing accesses DR across a repeated start, so the last
        // transmitted byte's BTF (or an undrained received byte) still
        // holds its flag. Finish the SR1-then-DR clearing sequence now;
        // unmasking with it set would storm the handler and swallow the
        // SB edge.
        let sr1 = regs.sr1().read();
        if sr1.btf() || sr1.rxne() {
            let _ = regs.dr().read();
        }
        regs.cr1().modify(|w| {
            // A stale POS from a two-byte read must not shape this one.
            w.set_pos(Pos::CURRENT);
            w.set_start(true);
        });
        regs.cr2().modify(|w| {
            w.set_itbufen(false);
            w.set_itevten(true);
        });
    }

    fn assert_stop(&mut self) {
        let regs = pac::I2C1;
        // An abort can land while ADDR still stretches SCL; the stop
        // cannot form until the clear completes.
        if regs.sr1().read().addr() {
            let _ = regs.sr2().read();
        }
        regs.cr1().modify(|w| w.set_stop(true));
        // No flag announces a completed stop in master mode; the runner
        // polls CR1 instead of waiting on an interrupt.
        regs.cr2().modify(|w| w.set_itbufen(false));
    }

    fn send_byte(&mut self, byte: u8) {
        let regs = pac::I2C1;
        // In write direction the deferred ADDR clear happens here, with
        // the next byte already decided.
        if regs.sr1().read().addr() {
            let _ = regs.sr2().read();
        }
        regs.dr().write(|w| w.set_dr(byte));
        regs.cr2().modify(|w| {
            w.set_itbufen(false);
            w.set_itevten(true);
        });
    }

    fn receive_byte(&mut self, ack: AckPolicy) {
        let regs = pac::I2C1;
        if !regs.sr1().read().addr() {
            // Later bytes are paced by the event handler against the
            // peripheral's double buffering; nothing to program here.
            regs.cr2().modify(|w| w.set_itevten(true));
            return;
        }

        // First byte: ADDR still holds SCL, so the close-of-communication
        // shape for the whole transfer goes in before the wire moves.
        let remaining = self.read_remaining.load(Ordering::Relaxed);
        debug_assert_eq!(matches!(ack, AckPolicy::Nack), remaining == 1);
        match remaining {
            1 => {
                regs.cr1().modify(|w| w.set_ack(false));
                regs.cr2().modify(|w| w.set_itbufen(true));
                let _ = regs.sr2().read();
            }
            2 => {
                // POS points the ack bit one byte ahead: the nack
                // written after the clear lands on the second byte while
                // the first is still clocking in.
                regs.cr1().modify(|w| {
                    w.set_ack(true);
                    w.set_pos(Pos::NEXT);
                });
                regs.cr2().modify(|w| w.set_itbufen(false));
                let _ = regs.sr2().read();
                regs.cr1().modify(|w| w.set_ack(false));
            }
            3 => {
                // The whole transfer is tail; BTF pacing from the start.
                regs.cr1().modify(|w| w.set_ack(true));
                regs.cr2().modify(|w| w.set_itbufen(false));
                let _ = regs.sr2().read();
            }
            _ => {
                regs.cr1().modify(|w| w.set_ack(true));
                regs.cr2().modify(|w| w.set_itbufen(true));
                let _ = regs.sr2().read();
            }
        }
        regs.cr2().modify(|w| w.set_itevten(true));
    }
}
