//! Hardware notifications
//!
//! Everything the engine learns about the bus arrives as a [`BusEvent`].
//! Events are immutable facts, consumed exactly once, in the order the
//! hardware raised them. A chip crate produces them from interrupt flags;
//! the driver loop injects [`BusEvent::TimerExpired`] when an armed phase
//! deadline elapses.

/// Opaque handle for one armed phase timer.
///
/// Compare it, don't interpret it. A fresh id is handed out on every arm,
/// so an expiry that raced a cancel can be recognized as stale and dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimerId(pub u32);

/// Hardware-reported bus anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FaultKind {
    /// Another master won the bus; this transfer is over and the bus is
    /// already released.
    ArbitrationLost,
    /// Misplaced start or stop condition detected on the wire.
    LineError,
    /// Receive data was lost or transmit data was clocked out twice.
    Overrun,
}

/// One notification from the bus hardware or the phase timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum BusEvent {
    /// A start (or repeated start) condition took effect.
    StartAsserted,
    /// The address byte finished clocking out.
    AddressByteSent,
    /// The addressed party acknowledged the last byte.
    AckObserved,
    /// The addressed party did not acknowledge the last byte.
    NackObserved,
    /// A sub-address or data byte finished clocking out.
    DataByteSent,
    /// One byte arrived from the slave.
    DataByteReceived(u8),
    /// The stop condition took effect; the bus is free.
    StopAsserted,
    /// The hardware flagged a bus fault.
    BusError(FaultKind),
    /// The armed phase timer elapsed.
    TimerExpired(TimerId),
}
