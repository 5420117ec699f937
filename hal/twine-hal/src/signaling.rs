//! Bus signaling primitives
//!
//! [`BusSignaling`] is the seam between the transaction engine and a bus
//! peripheral. All four primitives are fire-and-forget: they kick the
//! hardware off and return immediately. Completions, acknowledge results
//! and faults come back asynchronously as [`event::BusEvent`]s.
//!
//! [`event::BusEvent`]: crate::event::BusEvent

/// Acknowledge policy for a single byte reception.
///
/// The master drives the acknowledge bit while receiving: `Ack` asks the
/// slave to keep sending, `Nack` marks the byte as the last one of the
/// transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AckPolicy {
    /// Acknowledge the byte; more data is expected.
    Ack,
    /// Do not acknowledge; this is the final byte.
    Nack,
}

/// One primitive the engine asks of the bus.
///
/// Mirrors [`BusSignaling`] one method per variant, so a driver loop can
/// forward engine output with a single [`BusSignaling::execute`] call and
/// tests can record exact action sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusAction {
    /// Generate a start (or repeated start) condition.
    AssertStart,
    /// Generate a stop condition, releasing the bus.
    AssertStop,
    /// Clock one byte out (address, sub-address or data).
    SendByte(u8),
    /// Clock one byte in, answering with the given acknowledge policy.
    ReceiveByte(AckPolicy),
}

/// Low-level bus master signaling.
///
/// Implementations start the requested wire activity and return without
/// waiting for it to finish:
///
/// - `assert_start` completes with [`BusEvent::StartAsserted`]
/// - `assert_stop` completes with [`BusEvent::StopAsserted`]
/// - `send_byte` completes with [`BusEvent::AddressByteSent`] or
///   [`BusEvent::DataByteSent`] followed by the acknowledge observation
/// - `receive_byte` completes with [`BusEvent::DataByteReceived`]
///
/// Faults surface as [`BusEvent::BusError`] regardless of the primitive in
/// flight.
///
/// [`BusEvent::StartAsserted`]: crate::event::BusEvent::StartAsserted
/// [`BusEvent::StopAsserted`]: crate::event::BusEvent::StopAsserted
/// [`BusEvent::AddressByteSent`]: crate::event::BusEvent::AddressByteSent
/// [`BusEvent::DataByteSent`]: crate::event::BusEvent::DataByteSent
/// [`BusEvent::DataByteReceived`]: crate::event::BusEvent::DataByteReceived
/// [`BusEvent::BusError`]: crate::event::BusEvent::BusError
pub trait BusSignaling {
    /// Generate a start or repeated start condition.
    fn assert_start(&mut self);

    /// Generate a stop condition.
    fn assert_stop(&mut self);

    /// Transmit one byte.
    fn send_byte(&mut self, byte: u8);

    /// Receive one byte, answering with `ack`.
    fn receive_byte(&mut self, ack: AckPolicy);

    /// Forward a [`BusAction`] to the matching primitive.
    fn execute(&mut self, action: BusAction) {
        match action {
            BusAction::AssertStart => self.assert_start(),
            BusAction::AssertStop => self.assert_stop(),
            BusAction::SendByte(byte) => self.send_byte(byte),
            BusAction::ReceiveByte(ack) => self.receive_byte(ack),
        }
    }
}
