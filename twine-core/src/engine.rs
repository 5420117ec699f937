//! The bus-master transaction state machine
//!
//! [`Engine`] drives exactly one [`Transaction`] through the wire protocol:
//!
//! ```text
//! write:  Start → Addr(W) → SubAddr bytes → Data bytes → Stop
//! read:   Start → Addr(W) → SubAddr bytes → Repeated Start → Addr(R)
//!           → Data bytes (master acks all but the last) → Stop
//! ```
//!
//! The engine is pure and event-fed. Every call returns a [`Step`] telling
//! the driver what to do next; every phase that waits on the hardware has a
//! timer armed, so a sequence that never completes ends in
//! [`ErrorKind::BusTimeout`] instead of a hang. Failures abort through a
//! stop condition so the bus is released, with one exception: after
//! arbitration loss the bus already belongs to someone else and no stop is
//! issued.
//!
//! Driver loop contract: call [`Engine::begin`] once, execute every
//! returned action, feed every [`BusEvent`] (in arrival order) and the
//! expiry of the armed [`Engine::deadline`] into [`Engine::handle`], until
//! a step says [`Step::Done`].

use twine_hal::{AckPolicy, BusAction, BusEvent, FaultKind, TimerId};

use crate::error::{ErrorKind, TransferError, TransferResult};
use crate::timeout::TimeoutManager;
use crate::transaction::{Direction, Transaction};

/// Protocol position of the active transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    /// Nothing started yet.
    Idle,
    /// Start condition requested, waiting for it to take effect.
    Starting,
    /// Address byte (write direction) is clocking out.
    AddrWrite,
    /// Waiting for the acknowledge bit of the address byte.
    AwaitAddrAck,
    /// A sub-address byte is clocking out.
    SubAddr,
    /// Waiting for the acknowledge bit of a sub-address byte.
    AwaitSubAddrAck,
    /// A data byte is clocking out.
    WriteData,
    /// Waiting for the acknowledge bit of a data byte.
    AwaitDataAck,
    /// Repeated start requested before the read direction flip.
    RepeatedStart,
    /// Address byte (read direction) is clocking out.
    AddrRead,
    /// Waiting for the acknowledge bit of the read-direction address byte.
    AwaitAddrAck2,
    /// Receiving data bytes from the device.
    ReadData,
    /// Stop condition requested after a successful transfer.
    Stopping,
    /// Stop condition requested on a failure path.
    Aborting,
    /// Terminal; the result is recorded in the transaction.
    Complete,
}

/// What the engine wants done after consuming an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Step {
    /// Issue this primitive on the bus, then wait for its event.
    Act(BusAction),
    /// Nothing to issue; a bus event or the armed timer moves things along.
    Wait,
    /// The transaction reached a terminal state.
    Done(TransferResult),
}

/// Drives one transaction through the bus protocol.
#[derive(Debug)]
pub struct Engine {
    txn: Transaction,
    phase: Phase,
    timer: TimeoutManager,
    /// Sub-address bytes issued so far.
    sub_sent: usize,
    /// Data bytes fully acknowledged (writes) or received (reads).
    data_done: usize,
    /// Failure recorded when the abort path was entered.
    failure: Option<TransferError>,
    cancel_requested: bool,
}

impl Engine {
    pub fn new(txn: Transaction) -> Self {
        Self {
            txn,
            phase: Phase::Idle,
            timer: TimeoutManager::new(),
            sub_sent: 0,
            data_done: 0,
            failure: None,
            cancel_requested: false,
        }
    }

    /// Current protocol position.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// True once the transaction has a recorded result.
    pub fn is_complete(&self) -> bool {
        self.phase == Phase::Complete
    }

    /// The armed phase timer the driver must realize, if any.
    pub fn deadline(&self) -> Option<(TimerId, u32)> {
        self.timer.pending()
    }

    /// Requests an abort at the next byte boundary.
    ///
    /// Takes effect after the in-flight byte completes its acknowledge
    /// cycle, never mid-byte. The result becomes [`ErrorKind::Canceled`]
    /// with the progress made so far; a transaction whose final byte was
    /// already acknowledged completes normally instead.
    pub fn request_cancel(&mut self) {
        self.cancel_requested = true;
    }

    /// Kicks the transaction off.
    ///
    /// # Panics
    ///
    /// If called more than once.
    pub fn begin(&mut self) -> Step {
        assert!(self.phase == Phase::Idle, "transaction already started");
        self.enter(Phase::Starting);
        Step::Act(BusAction::AssertStart)
    }

    /// Tears the engine down, returning the transaction with its result.
    ///
    /// # Panics
    ///
    /// If the transaction is still active.
    pub fn into_transaction(self) -> Transaction {
        assert!(
            self.phase == Phase::Complete,
            "transaction still active"
        );
        self.txn
    }

    /// Consumes one event and returns the next step.
    pub fn handle(&mut self, event: BusEvent) -> Step {
        // Timer expiry and hardware faults cut across all phases.
        if let BusEvent::TimerExpired(id) = event {
            return self.handle_timer(id);
        }
        if let BusEvent::BusError(kind) = event {
            return self.handle_fault(kind);
        }

        match self.phase {
            Phase::Idle | Phase::Complete => Step::Wait,

            Phase::Starting => match event {
                BusEvent::StartAsserted => {
                    self.enter(Phase::AddrWrite);
                    Step::Act(BusAction::SendByte(self.txn.device.write_byte()))
                }
                _ => Step::Wait,
            },

            // Controllers that fold "byte sent" and "ack sampled" into one
            // status flag deliver the acknowledge while we still sit in the
            // byte-sent phase, so both phases accept it.
            Phase::AddrWrite => match event {
                BusEvent::AddressByteSent => {
                    self.enter(Phase::AwaitAddrAck);
                    Step::Wait
                }
                BusEvent::AckObserved => self.address_acked(),
                BusEvent::NackObserved => self.abort(ErrorKind::AddressNack),
                _ => Step::Wait,
            },
            Phase::AwaitAddrAck => match event {
                BusEvent::AckObserved => self.address_acked(),
                BusEvent::NackObserved => self.abort(ErrorKind::AddressNack),
                _ => Step::Wait,
            },

            Phase::SubAddr => match event {
                BusEvent::DataByteSent => {
                    self.enter(Phase::AwaitSubAddrAck);
                    Step::Wait
                }
                BusEvent::AckObserved => self.sub_addr_acked(),
                BusEvent::NackObserved => self.abort(ErrorKind::SubAddressNack),
                _ => Step::Wait,
            },
            Phase::AwaitSubAddrAck => match event {
                BusEvent::AckObserved => self.sub_addr_acked(),
                BusEvent::NackObserved => self.abort(ErrorKind::SubAddressNack),
                _ => Step::Wait,
            },

            Phase::WriteData => match event {
                BusEvent::DataByteSent => {
                    self.enter(Phase::AwaitDataAck);
                    Step::Wait
                }
                BusEvent::AckObserved => self.write_byte_acked(),
                BusEvent::NackObserved => self.abort(ErrorKind::DataNack),
                _ => Step::Wait,
            },
            Phase::AwaitDataAck => match event {
                BusEvent::AckObserved => self.write_byte_acked(),
                BusEvent::NackObserved => self.abort(ErrorKind::DataNack),
                _ => Step::Wait,
            },

            Phase::RepeatedStart => match event {
                BusEvent::StartAsserted => {
                    self.enter(Phase::AddrRead);
                    Step::Act(BusAction::SendByte(self.txn.device.read_byte()))
                }
                _ => Step::Wait,
            },
            Phase::AddrRead => match event {
                BusEvent::AddressByteSent => {
                    self.enter(Phase::AwaitAddrAck2);
                    Step::Wait
                }
                BusEvent::AckObserved => self.read_address_acked(),
                BusEvent::NackObserved => self.abort(ErrorKind::AddressNack),
                _ => Step::Wait,
            },
            Phase::AwaitAddrAck2 => match event {
                BusEvent::AckObserved => self.read_address_acked(),
                BusEvent::NackObserved => self.abort(ErrorKind::AddressNack),
                _ => Step::Wait,
            },

            Phase::ReadData => match event {
                BusEvent::DataByteReceived(byte) => self.read_byte_received(byte),
                _ => Step::Wait,
            },

            Phase::Stopping => match event {
                BusEvent::StopAsserted => self.finish(Ok(self.data_done)),
                _ => Step::Wait,
            },
            Phase::Aborting => match event {
                BusEvent::StopAsserted => self.finish_aborted(),
                _ => Step::Wait,
            },
        }
    }

    fn handle_timer(&mut self, id: TimerId) -> Step {
        if !self.timer.expire(id) {
            // Expiry raced a cancel or a re-arm; not ours anymore.
            return Step::Wait;
        }
        match self.phase {
            Phase::Idle | Phase::Complete => Step::Wait,
            // The stop never confirmed; report the failure that got us
            // here rather than the failed cleanup.
            Phase::Aborting => self.finish_aborted(),
            _ => self.abort(ErrorKind::BusTimeout),
        }
    }

    fn handle_fault(&mut self, kind: FaultKind) -> Step {
        match self.phase {
            Phase::Idle | Phase::Complete => Step::Wait,
            Phase::Aborting => self.finish_aborted(),
            _ if kind == FaultKind::ArbitrationLost => {
                // Arbitration loss has already released the bus; a stop
                // here would claim it back.
                self.failure = Some(TransferError {
                    kind: ErrorKind::BusFault(kind),
                    bytes_completed: self.data_done,
                });
                self.finish_aborted()
            }
            _ => self.abort(ErrorKind::BusFault(kind)),
        }
    }

    /// Address byte (write direction) acknowledged: first sub-address byte.
    fn address_acked(&mut self) -> Step {
        if self.cancel_requested {
            return self.abort(ErrorKind::Canceled);
        }
        self.sub_sent = 1;
        let byte = self.txn.register.byte(0);
        self.enter(Phase::SubAddr);
        Step::Act(BusAction::SendByte(byte))
    }

    /// Sub-address byte acknowledged: next sub-address byte, first data
    /// byte, or the repeated start of a read.
    fn sub_addr_acked(&mut self) -> Step {
        if self.cancel_requested {
            return self.abort(ErrorKind::Canceled);
        }
        if self.sub_sent < self.txn.register.width() {
            let byte = self.txn.register.byte(self.sub_sent);
            self.sub_sent += 1;
            self.enter(Phase::SubAddr);
            return Step::Act(BusAction::SendByte(byte));
        }
        match self.txn.direction {
            Direction::Write => {
                let byte = self.txn.buffer[0];
                self.enter(Phase::WriteData);
                Step::Act(BusAction::SendByte(byte))
            }
            Direction::Read => {
                self.enter(Phase::RepeatedStart);
                Step::Act(BusAction::AssertStart)
            }
        }
    }

    /// Data byte acknowledged during a write.
    fn write_byte_acked(&mut self) -> Step {
        self.data_done += 1;
        if self.data_done == self.txn.length {
            self.enter(Phase::Stopping);
            return Step::Act(BusAction::AssertStop);
        }
        if self.cancel_requested {
            return self.abort(ErrorKind::Canceled);
        }
        let byte = self.txn.buffer[self.data_done];
        self.enter(Phase::WriteData);
        Step::Act(BusAction::SendByte(byte))
    }

    /// Read-direction address byte acknowledged: start receiving.
    fn read_address_acked(&mut self) -> Step {
        if self.cancel_requested {
            return self.abort(ErrorKind::Canceled);
        }
        self.enter(Phase::ReadData);
        Step::Act(BusAction::ReceiveByte(self.ack_policy()))
    }

    /// One byte arrived during a read.
    fn read_byte_received(&mut self, byte: u8) -> Step {
        let pushed = self.txn.buffer.push(byte);
        debug_assert!(pushed.is_ok());
        self.data_done += 1;
        if self.data_done == self.txn.length {
            self.enter(Phase::Stopping);
            return Step::Act(BusAction::AssertStop);
        }
        if self.cancel_requested {
            return self.abort(ErrorKind::Canceled);
        }
        self.enter(Phase::ReadData);
        Step::Act(BusAction::ReceiveByte(self.ack_policy()))
    }

    /// Acknowledge policy for the next received byte: nack the final one.
    fn ack_policy(&self) -> AckPolicy {
        if self.txn.length - self.data_done > 1 {
            AckPolicy::Ack
        } else {
            AckPolicy::Nack
        }
    }

    /// Records the failure and tries to release the bus.
    fn abort(&mut self, kind: ErrorKind) -> Step {
        self.failure = Some(TransferError {
            kind,
            bytes_completed: self.data_done,
        });
        self.enter(Phase::Aborting);
        Step::Act(BusAction::AssertStop)
    }

    fn finish_aborted(&mut self) -> Step {
        let failure = self.failure.take().unwrap_or(TransferError {
            kind: ErrorKind::BusTimeout,
            bytes_completed: self.data_done,
        });
        self.finish(Err(failure))
    }

    fn finish(&mut self, result: TransferResult) -> Step {
        if let Some((id, _)) = self.timer.pending() {
            self.timer.cancel(id);
        }
        self.phase = Phase::Complete;
        self.txn.result = Some(result);
        Step::Done(result)
    }

    /// Moves to `phase`, re-arming the phase timer. Every phase between
    /// `Starting` and `Complete` waits on the hardware, so each gets a
    /// fresh budget.
    fn enter(&mut self, phase: Phase) {
        if let Some((id, _)) = self.timer.pending() {
            self.timer.cancel(id);
        }
        self.phase = phase;
        match phase {
            Phase::Idle | Phase::Complete => {}
            _ => {
                self.timer.arm(self.txn.timeout_ms);
            }
        }
    }
}
