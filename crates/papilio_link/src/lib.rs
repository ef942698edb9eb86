//! Master-side transport for a Papilio FPGA SPI slave.
//!
//! [`FpgaLink`] frames 8/16/32-bit words onto the byte-wide link, most
//! significant byte first, each inside its own select window. Bursts move
//! arbitrary byte runs through a single window. [`command`] defines the two
//! reserved bytes the BRAM bitstream interprets as control, and [`bram`]
//! drives that bitstream as addressable memory.
//!
//! The FPGA returns every word one exchange late. Nothing here hides that:
//! [`loopback`] has the helpers for priming and shifted comparison.

pub mod bram;
mod burst;
pub mod command;
mod error;
mod link;
pub mod loopback;
pub mod shared;
mod transaction;
pub mod word;

pub use bram::BramSession;
pub use command::{Command, DataByte, Frame};
pub use error::{LinkError, ProtocolError};
pub use link::FpgaLink;
pub use loopback::{LoopbackProbe, Mismatch};
pub use papilio_hal::{LinkSettings, SpiMode, WordWidth};
pub use shared::SharedLink;
pub use transaction::Transaction;
