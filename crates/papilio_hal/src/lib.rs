//! Physical layer of the Papilio SPI link.
//!
//! The master sees the FPGA through three embedded-hal style pieces: a
//! byte-wide [`SpiPort`], a select line (`embedded_hal::digital::OutputPin`)
//! and a delay provider (`embedded_hal::delay::DelayNs`). [`sim`] provides
//! all three for a simulated FPGA so the link can be exercised off target.

pub mod config;
pub mod sim;
pub mod traits;

pub use config::{ConfigError, LinkSettings, SpiMode, WordWidth};
pub use traits::{HalBus, HalError, SpiPort};
