//! Board-agnostic I2C bus-master transaction engine
//!
//! This crate contains everything about driving a register-oriented I2C
//! transfer that does not depend on a specific chip:
//!
//! - Transaction model (device address, sub-address, direction, payload)
//! - The protocol state machine that sequences start, address, data and
//!   stop phases and books acknowledge results
//! - Phase-timeout bookkeeping
//! - A bounded FIFO of pending transactions with cancellation
//! - The error taxonomy reported to callers
//!
//! Nothing here blocks or touches hardware. The engine consumes
//! [`twine_hal::BusEvent`]s and emits [`twine_hal::BusAction`]s; a chip
//! crate owns the peripheral and the clock. That split keeps this crate
//! fully testable on the host.

#![no_std]
#![deny(unsafe_code)]

pub mod engine;
pub mod error;
pub mod queue;
pub mod timeout;
pub mod transaction;

pub use engine::{Engine, Phase, Step};
pub use error::{ErrorKind, TransactionError, TransferError, TransferResult};
pub use queue::{RequestQueue, Ticket, TicketState};
pub use timeout::TimeoutManager;
pub use transaction::{
    DeviceAddress, Direction, RegisterAddress, Transaction, MAX_TRANSFER_LEN,
};
