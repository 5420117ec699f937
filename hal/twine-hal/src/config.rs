//! Bus configuration

/// Configuration handed to a chip crate when the bus is brought up.
///
/// The engine itself never reads this; timing-register values are derived
/// from it by the platform layer that knows its own clock tree.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BusConfig {
    /// SCL frequency in Hz
    pub frequency: u32,
    /// Phase-timeout budget, in milliseconds, for callers that do not pass
    /// an explicit one
    pub default_timeout_ms: u32,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self::STANDARD
    }
}

impl BusConfig {
    /// Standard mode (100 kHz)
    pub const STANDARD: Self = Self {
        frequency: 100_000,
        default_timeout_ms: 25,
    };

    /// Fast mode (400 kHz)
    pub const FAST: Self = Self {
        frequency: 400_000,
        default_timeout_ms: 10,
    };
}
