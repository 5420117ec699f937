//! Interrupt-to-task event bridge.
//!
//! The interrupt handlers translate SR1 flags into [`BusEvent`]s and push
//! them onto a bounded channel in submission order. Everything slow (state
//! transitions, register sequencing, logging) happens later in the runner
//! task; the handlers read status, clear what must be cleared, and enqueue.
//!
//! Two flags need more than a read-and-clear:
//!
//! - SB and a transmit-side BTF re-raise the event interrupt until the data
//!   register is accessed, which cannot happen before the runner has decided
//!   the next byte. The handler masks ITEVTEN when reporting them; the
//!   signaling layer unmasks with the next primitive.
//! - ADDR stretches SCL until the SR1-then-SR2 clearing sequence completes.
//!   The handler reports it but leaves it set, so the signaling layer can
//!   program the first received byte's ack policy while the wire is still
//!   held, then finish the clear itself.
//!
//! Receive pacing rides the same stretch rules. The peripheral double
//! buffers (shift register behind DR), so an ack bit written when a byte is
//! consumed lands two bytes later on the wire. The head of a long read
//! drains DR on RXNE with ACK high; from three bytes out the handler stops
//! draining, lets BTF stretch SCL with two bytes held inside the
//! peripheral, and programs the final nack at that stretch point, the last
//! ack slot before it is sampled. The final byte then arrives on RXNE with
//! the nack already out.

use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use embassy_stm32::pac;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use twine_hal::{BusEvent, FaultKind};

/// Order-preserving bridge between the I2C1 interrupts and the runner.
pub struct EventDispatcher<const EVENTS: usize> {
    events: Channel<CriticalSectionRawMutex, BusEvent, EVENTS>,
    overflow: AtomicBool,
    /// Bytes the active read still expects; drives the receive tail.
    read_remaining: AtomicUsize,
}

impl<const EVENTS: usize> EventDispatcher<EVENTS> {
    pub const fn new() -> Self {
        Self {
            events: Channel::new(),
            overflow: AtomicBool::new(false),
            read_remaining: AtomicUsize::new(0),
        }
    }

    /// Sets the byte count of the upcoming receive phase (zero for writes).
    pub(crate) fn expect_read(&self, length: usize) {
        self.read_remaining.store(length, Ordering::Relaxed);
    }

    /// Shared countdown, also consulted by the signaling layer when it
    /// programs the ack shape under the ADDR stretch.
    pub(crate) fn read_counter(&self) -> &AtomicUsize {
        &self.read_remaining
    }

    /// Event interrupt body. Call from the `I2C1_EV` handler.
    pub fn handle_event(&self) {
        let regs = pac::I2C1;
        let sr1 = regs.sr1().read();

        if sr1.start() {
            // SB holds until DR is written with the address byte.
            regs.cr2().modify(|w| w.set_itevten(false));
            self.notify(BusEvent::StartAsserted);
            return;
        }

        if sr1.addr() {
            // ADDR holds SCL low until the SR1-then-SR2 sequence clears
            // it; the signaling layer finishes that once the ack policy
            // (reads) or the next byte (writes) is ready. The address
            // byte going out at all means it was acknowledged; a nack
            // would have raised AF instead.
            regs.cr2().modify(|w| w.set_itevten(false));
            self.notify(BusEvent::AddressByteSent);
            self.notify(BusEvent::AckObserved);
            return;
        }

        if !sr1.rxne() && !sr1.btf() {
            return;
        }

        // ADDR is clear here, so reading SR2 has no clearing side effect.
        if regs.sr2().read().tra() {
            if sr1.btf() {
                // Byte out, ninth clock sampled low. BTF holds until the
                // next DR access, same hazard as SB.
                regs.cr2().modify(|w| w.set_itevten(false));
                self.notify(BusEvent::DataByteSent);
                self.notify(BusEvent::AckObserved);
            }
            return;
        }

        let remaining = self.read_remaining.load(Ordering::Relaxed);
        if remaining == 0 {
            // Clocked past the requested length; drop the byte quietly.
            let _ = regs.dr().read().dr();
            return;
        }

        if sr1.btf() {
            // DR and the shift register are both full and SCL is held
            // low; the wire cannot outrun ack programming done here.
            if remaining == 3 {
                // Sampled two bytes from now: the final byte.
                regs.cr1().modify(|w| w.set_ack(false));
            }
            let byte = regs.dr().read().dr();
            self.notify(BusEvent::DataByteReceived(byte));
            self.read_remaining.store(remaining - 1, Ordering::Relaxed);
            if remaining == 2 {
                // Nothing refills the shift register after the nack; the
                // final byte comes in on RXNE.
                regs.cr2().modify(|w| w.set_itbufen(true));
            }
        } else {
            let byte = regs.dr().read().dr();
            self.notify(BusEvent::DataByteReceived(byte));
            self.read_remaining.store(remaining - 1, Ordering::Relaxed);
            if remaining == 4 {
                // Three bytes left: hold them in the peripheral so the
                // tail acks are programmed under a stretched clock.
                regs.cr2().modify(|w| w.set_itbufen(false));
            }
        }
    }

    /// Error interrupt body. Call from the `I2C1_ER` handler.
    pub fn handle_error(&self) {
        let regs = pac::I2C1;
        let sr1 = regs.sr1().read();

        if sr1.af() {
            regs.sr1().modify(|w| w.set_af(false));
            self.notify(BusEvent::NackObserved);
        }

        if sr1.berr() {
            regs.sr1().modify(|w| w.set_berr(false));
            self.notify(BusEvent::BusError(FaultKind::LineError));
        }

        if sr1.arlo() {
            regs.sr1().modify(|w| w.set_arlo(false));
            self.notify(BusEvent::BusError(FaultKind::ArbitrationLost));
        }

        if sr1.ovr() {
            regs.sr1().modify(|w| w.set_ovr(false));
            self.notify(BusEvent::BusError(FaultKind::Overrun));
        }
    }

    fn notify(&self, event: BusEvent) {
        if self.events.try_send(event).is_err() {
            self.overflow.store(true, Ordering::Relaxed);
        }
    }

    /// Takes the overflow latch. Once set, events have been dropped and the
    /// transaction in flight can no longer be trusted.
    pub fn take_overflow(&self) -> bool {
        self.overflow.swap(false, Ordering::Relaxed)
    }

    /// Next event in arrival order.
    pub async fn receive(&self) -> BusEvent {
        self.events.receive().await
    }

    /// Non-blocking variant of [`receive`](Self::receive), used to drain
    /// leftovers between transactions.
    pub fn try_receive(&self) -> Option<BusEvent> {
        self.events.try_receive().ok()
    }
}
