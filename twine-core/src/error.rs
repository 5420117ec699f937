//! Error taxonomy
//!
//! Every failure is terminal: the engine never retries internally, and every
//! failure path still attempts to release the bus with a stop condition
//! (except arbitration loss, where the bus is already surrendered). Partial
//! progress is always reported so a caller can distinguish "the device never
//! answered" from "the device gave up mid-transfer".

use twine_hal::FaultKind;

/// Why a transfer ended without moving all of its bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ErrorKind {
    /// No acknowledge for the address byte; nobody home at that address.
    AddressNack,
    /// The device acknowledged its address but rejected the sub-address.
    SubAddressNack,
    /// The device stopped acknowledging mid-way through the data bytes.
    DataNack,
    /// A bus phase outlived its armed deadline.
    BusTimeout,
    /// The hardware reported a fault on the wire.
    BusFault(FaultKind),
    /// The request was rejected before touching the bus: zero length or
    /// over [`MAX_TRANSFER_LEN`](crate::transaction::MAX_TRANSFER_LEN).
    InvalidLength,
    /// The caller canceled the transaction at a byte boundary.
    Canceled,
}

/// Terminal failure report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TransferError {
    /// What went wrong.
    pub kind: ErrorKind,
    /// Data bytes fully acknowledged (writes) or received (reads) before
    /// the failure. Address and sub-address bytes do not count.
    pub bytes_completed: usize,
}

/// Outcome of a transaction: data bytes moved, or a failure report.
pub type TransferResult = Result<usize, TransferError>;

/// Rejection at construction time, before a transaction exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TransactionError {
    /// Zero data bytes, or more than the bounded payload can hold.
    LengthOutOfRange,
}

impl From<TransactionError> for TransferError {
    fn from(error: TransactionError) -> Self {
        match error {
            TransactionError::LengthOutOfRange => TransferError {
                kind: ErrorKind::InvalidLength,
                bytes_completed: 0,
            },
        }
    }
}
