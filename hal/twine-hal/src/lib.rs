//! Twine Hardware Abstraction Layer
//!
//! This crate defines the vocabulary between the board-agnostic transaction
//! engine (`twine-core`) and a concrete bus peripheral (`twine-stm32f1` or
//! another chip crate): the signaling primitives a master can issue and the
//! events the hardware reports back.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │  Application tasks                      │
//! └─────────────────────────────────────────┘
//!                     │ read/write register
//!                     ▼
//! ┌─────────────────────────────────────────┐
//! │  twine-core (transaction engine)        │
//! └─────────────────────────────────────────┘
//!        │ BusAction              ▲ BusEvent
//!        ▼                        │
//! ┌─────────────────────────────────────────┐
//! │  chip crate (twine-stm32f1, ...)        │
//! └─────────────────────────────────────────┘
//! ```
//!
//! The engine never touches a register and never blocks: it emits
//! [`BusAction`]s and consumes [`BusEvent`]s. A chip crate implements
//! [`BusSignaling`], turns interrupt flags into events, and realizes the
//! engine's armed deadlines with a real timer.

#![no_std]
#![deny(unsafe_code)]

pub mod config;
pub mod event;
pub mod signaling;

// Re-export key types at crate root for convenience
pub use config::BusConfig;
pub use event::{BusEvent, FaultKind, TimerId};
pub use signaling::{AckPolicy, BusAction, BusSignaling};
