//! Papilio SPI: talk to an FPGA slave over a byte-wide SPI link.
//!
//! - [`papilio_hal`]: physical exchange, link settings, simulated FPGA
//! - [`papilio_link`]: link handle, word and burst framing, BRAM commands
//! - [`papilio_harness`]: config-driven loopback / BRAM / burst scenarios

pub mod cli;

pub use papilio_hal as hal;
pub use papilio_harness as harness;
pub use papilio_link as link;

pub use papilio_link::{
    BramSession, Command, FpgaLink, LinkError, LinkSettings, LoopbackProbe, SharedLink, SpiMode,
    WordWidth,
};
