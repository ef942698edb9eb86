//! Word transfer engine.
//!
//! A W-bit word travels as W/8 byte exchanges inside one window, most
//! significant byte first. Received bytes are reassembled in the same order.

use crate::error::LinkError;
use crate::link::FpgaLink;
use crate::transaction::Transaction;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use papilio_hal::{SpiPort, WordWidth};
use std::ops::Deref;

/// Wire bytes of one word, most significant first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireBytes {
    buf: [u8; 4],
    len: usize,
}

impl Deref for WireBytes {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.buf[4 - self.len..]
    }
}

/// Serialise the low `width` bits of `value`.
pub fn encode(width: WordWidth, value: u32) -> WireBytes {
    WireBytes {
        buf: value.to_be_bytes(),
        len: width.bytes(),
    }
}

/// Reassemble received bytes, first byte most significant.
pub fn decode(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b))
}

impl<P, S, D> FpgaLink<P, S, D>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    /// Exchange one word of the given width in its own window.
    pub fn transfer_word(&mut self, width: WordWidth, value: u32) -> Result<u32, LinkError> {
        let settings = self.settings;
        let wiring = self.wiring_mut()?;
        if value > width.max_value() {
            return Err(LinkError::WordOutOfRange {
                value,
                bits: width.bits(),
            });
        }

        let sent = encode(width, value);
        let mut received = [0u8; 4];
        let mut txn = Transaction::open(wiring, &settings)?;
        for (rx, &tx) in received.iter_mut().zip(sent.iter()) {
            *rx = txn.exchange(tx)?;
        }
        txn.close()?;
        Ok(decode(&received[..sent.len()]))
    }

    /// Exchange one word at the configured default width.
    pub fn transfer(&mut self, value: u32) -> Result<u32, LinkError> {
        self.transfer_word(self.settings.word_width, value)
    }

    pub fn transfer8(&mut self, value: u8) -> Result<u8, LinkError> {
        self.transfer_word(WordWidth::Bits8, u32::from(value))
            .map(|v| v as u8)
    }

    pub fn transfer16(&mut self, value: u16) -> Result<u16, LinkError> {
        self.transfer_word(WordWidth::Bits16, u32::from(value))
            .map(|v| v as u16)
    }

    pub fn transfer32(&mut self, value: u32) -> Result<u32, LinkError> {
        self.transfer_word(WordWidth::Bits32, value)
    }
}
