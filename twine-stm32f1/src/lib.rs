//! STM32F1 transport for the twine I2C bus-master engine
//!
//! Runs `twine-core` transactions on the F1's first I2C block (the
//! `i2c_v1` peripheral). The peripheral reports progress through SR1
//! status flags; the interrupt handlers in this crate turn those flags
//! into `twine-hal` bus events and a pump task steps the engine and
//! sequences the control registers.
//!
//! # Features
//!
//! - `stm32f103c8` / `stm32f103cb` - Select the target chip
//!
//! # Usage
//!
//! The interrupt routing and the pump task live with the application:
//!
//! ```rust,ignore
//! use cortex_m::peripheral::NVIC;
//! use embassy_stm32::interrupt;
//! use twine_hal::BusConfig;
//! use twine_stm32f1::{
//!     handle_error_interrupt, handle_event_interrupt, BusRunner, BusState,
//! };
//!
//! static BUS: BusState<4, 8> = BusState::new();
//!
//! #[interrupt]
//! fn I2C1_EV() {
//!     handle_event_interrupt(&BUS);
//! }
//!
//! #[interrupt]
//! fn I2C1_ER() {
//!     handle_error_interrupt(&BUS);
//! }
//!
//! #[embassy_executor::task]
//! async fn bus_task(runner: BusRunner<'static, 4, 8>) -> ! {
//!     runner.run().await
//! }
//!
//! #[embassy_executor::main]
//! async fn main(spawner: embassy_executor::Spawner) {
//!     let p = embassy_stm32::init(Default::default());
//!
//!     let (bus, runner) =
//!         BusRunner::new(p.I2C1, p.PB6, p.PB7, &BUS, BusConfig::STANDARD);
//!     unsafe {
//!         NVIC::unmask(interrupt::I2C1_EV);
//!         NVIC::unmask(interrupt::I2C1_ER);
//!     }
//!     spawner.spawn(bus_task(runner)).unwrap();
//!
//!     // `bus` is Copy; hand it to any task that talks to devices.
//! }
//! ```

#![no_std]
#![deny(unsafe_code)]

pub mod dispatcher;
pub mod master;
pub mod signaling;

pub use dispatcher::EventDispatcher;
pub use master::{
    handle_error_interrupt, handle_event_interrupt, BusHandle, BusRunner, BusState,
};
pub use signaling::PeripheralBus;

// Re-export the engine-facing types applications need alongside the bus.
pub use twine_core::{DeviceAddress, ErrorKind, RegisterAddress, Ticket, TransferError};
pub use twine_hal::BusConfig;
