//! Transaction model
//!
//! A [`Transaction`] describes one register-oriented transfer: which device,
//! which register, which direction, how many bytes, and how long any single
//! bus phase may take. It is built by the caller, queued, then owned and
//! mutated exclusively by the engine until it completes.

use heapless::Vec;

use crate::error::{TransactionError, TransferResult};

/// Upper bound on the data payload of a single transaction.
pub const MAX_TRANSFER_LEN: usize = 32;

/// Validated 7-bit device address.
///
/// Callers always pass the plain, unshifted address (`0x00..=0x7F`). The
/// direction bit is appended internally when the address byte is built, so
/// the classic pre-shifted-address mistake cannot be expressed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    /// Largest valid 7-bit address.
    pub const MAX: u8 = 0x7F;

    /// Creates an address, rejecting values that need more than 7 bits.
    pub const fn new(address: u8) -> Option<Self> {
        if address <= Self::MAX {
            Some(Self(address))
        } else {
            None
        }
    }

    /// The unshifted 7-bit value.
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Address byte for the write direction: shifted left, R/W bit clear.
    pub const fn write_byte(self) -> u8 {
        self.0 << 1
    }

    /// Address byte for the read direction: shifted left, R/W bit set.
    pub const fn read_byte(self) -> u8 {
        (self.0 << 1) | 1
    }
}

/// Register (sub-address) within a device.
///
/// Devices disagree on sub-address width, so the width travels with the
/// value. A `Word` goes out high byte first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RegisterAddress {
    /// Single-byte sub-address.
    Byte(u8),
    /// Two-byte sub-address, transmitted big-endian.
    Word(u16),
}

impl RegisterAddress {
    /// Number of bytes this sub-address occupies on the wire.
    pub const fn width(&self) -> usize {
        match self {
            RegisterAddress::Byte(_) => 1,
            RegisterAddress::Word(_) => 2,
        }
    }

    /// Wire byte at `index`, counting from the first transmitted.
    pub fn byte(&self, index: usize) -> u8 {
        match self {
            RegisterAddress::Byte(value) => {
                debug_assert!(index == 0);
                *value
            }
            RegisterAddress::Word(value) => {
                if index == 0 {
                    (*value >> 8) as u8
                } else {
                    debug_assert!(index == 1);
                    *value as u8
                }
            }
        }
    }
}

/// Transfer direction, from the master's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Master transmits data bytes after the sub-address.
    Write,
    /// Master issues a repeated start and reads data bytes back.
    Read,
}

/// One register read or write, from submission to completion.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub(crate) device: DeviceAddress,
    pub(crate) register: RegisterAddress,
    pub(crate) direction: Direction,
    pub(crate) buffer: Vec<u8, MAX_TRANSFER_LEN>,
    pub(crate) length: usize,
    pub(crate) timeout_ms: u32,
    pub(crate) result: Option<TransferResult>,
}

impl Transaction {
    /// Builds a register write carrying `data`.
    ///
    /// Rejects empty payloads and payloads over [`MAX_TRANSFER_LEN`].
    pub fn write(
        device: DeviceAddress,
        register: RegisterAddress,
        data: &[u8],
        timeout_ms: u32,
    ) -> Result<Self, TransactionError> {
        if data.is_empty() {
            return Err(TransactionError::LengthOutOfRange);
        }
        let buffer =
            Vec::from_slice(data).map_err(|_| TransactionError::LengthOutOfRange)?;
        Ok(Self {
            device,
            register,
            direction: Direction::Write,
            length: data.len(),
            buffer,
            timeout_ms,
            result: None,
        })
    }

    /// Builds a register read of `length` bytes.
    ///
    /// Rejects zero-length reads and lengths over [`MAX_TRANSFER_LEN`].
    pub fn read(
        device: DeviceAddress,
        register: RegisterAddress,
        length: usize,
        timeout_ms: u32,
    ) -> Result<Self, TransactionError> {
        if length == 0 || length > MAX_TRANSFER_LEN {
            return Err(TransactionError::LengthOutOfRange);
        }
        Ok(Self {
            device,
            register,
            direction: Direction::Read,
            length,
            buffer: Vec::new(),
            timeout_ms,
            result: None,
        })
    }

    /// Target device.
    pub fn device(&self) -> DeviceAddress {
        self.device
    }

    /// Target register.
    pub fn register(&self) -> RegisterAddress {
        self.register
    }

    /// Transfer direction.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Number of data bytes this transaction moves when it succeeds.
    pub fn length(&self) -> usize {
        self.length
    }

    /// Per-phase wait budget in milliseconds.
    pub fn timeout_ms(&self) -> u32 {
        self.timeout_ms
    }

    /// Data bytes: the payload of a write, or whatever a read has received
    /// so far (complete after a successful read).
    pub fn data(&self) -> &[u8] {
        &self.buffer
    }

    /// Outcome, populated once the transaction is terminal.
    pub fn result(&self) -> Option<TransferResult> {
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TransactionError;

    fn addr(value: u8) -> DeviceAddress {
        DeviceAddress::new(value).unwrap()
    }

    #[test]
    fn test_address_accepts_seven_bits() {
        assert!(DeviceAddress::new(0x00).is_some());
        assert!(DeviceAddress::new(0x7F).is_some());
        assert!(DeviceAddress::new(0x80).is_none());
        assert!(DeviceAddress::new(0xFF).is_none());
    }

    #[test]
    fn test_address_bytes_append_direction_bit() {
        let device = addr(0x5C);
        assert_eq!(device.write_byte(), 0xB8);
        assert_eq!(device.read_byte(), 0xB9);
        assert_eq!(device.raw(), 0x5C);
    }

    #[test]
    fn test_word_register_is_big_endian() {
        let register = RegisterAddress::Word(0x12AB);
        assert_eq!(register.width(), 2);
        assert_eq!(register.byte(0), 0x12);
        assert_eq!(register.byte(1), 0xAB);
    }

    #[test]
    fn test_byte_register_width() {
        let register = RegisterAddress::Byte(0x10);
        assert_eq!(register.width(), 1);
        assert_eq!(register.byte(0), 0x10);
    }

    #[test]
    fn test_write_keeps_payload() {
        let txn = Transaction::write(
            addr(0x5C),
            RegisterAddress::Byte(0x10),
            &[0x23, 0x42],
            25,
        )
        .unwrap();
        assert_eq!(txn.direction(), Direction::Write);
        assert_eq!(txn.length(), 2);
        assert_eq!(txn.data(), &[0x23, 0x42]);
        assert_eq!(txn.result(), None);
    }

    #[test]
    fn test_write_rejects_empty_payload() {
        let err = Transaction::write(addr(0x5C), RegisterAddress::Byte(0x10), &[], 25);
        assert_eq!(err.unwrap_err(), TransactionError::LengthOutOfRange);
    }

    #[test]
    fn test_write_rejects_oversized_payload() {
        let data = [0u8; MAX_TRANSFER_LEN + 1];
        let err = Transaction::write(addr(0x5C), RegisterAddress::Byte(0x10), &data, 25);
        assert_eq!(err.unwrap_err(), TransactionError::LengthOutOfRange);
    }

    #[test]
    fn test_read_rejects_zero_length() {
        let err = Transaction::read(addr(0x5C), RegisterAddress::Byte(0x10), 0, 25);
        assert_eq!(err.unwrap_err(), TransactionError::LengthOutOfRange);
    }

    #[test]
    fn test_read_starts_with_empty_buffer() {
        let txn =
            Transaction::read(addr(0x5C), RegisterAddress::Byte(0x10), 4, 25).unwrap();
        assert_eq!(txn.direction(), Direction::Read);
        assert_eq!(txn.length(), 4);
        assert!(txn.data().is_empty());
    }
}
