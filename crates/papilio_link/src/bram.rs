//! Block RAM access over the command protocol.
//!
//! Each byte goes out in its own window, like every other single-byte
//! transfer. The session only knows the peripheral address by counting the
//! exchanges made since the last reset; the FPGA wraps at its depth.

use crate::command::{Command, validate_payload};
use crate::error::LinkError;
use crate::link::FpgaLink;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use papilio_hal::SpiPort;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Write,
    Read,
}

pub struct BramSession<'a, P, S, D> {
    link: &'a mut FpgaLink<P, S, D>,
    address: Option<usize>,
    mode: AccessMode,
    pacing_us: u32,
}

impl<'a, P, S, D> BramSession<'a, P, S, D>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    pub fn new(link: &'a mut FpgaLink<P, S, D>) -> Self {
        Self {
            link,
            address: None,
            mode: AccessMode::Write,
            pacing_us: 0,
        }
    }

    /// Idle time after every byte so the FPGA FIFO can settle.
    pub fn with_pacing_us(mut self, pacing_us: u32) -> Self {
        self.pacing_us = pacing_us;
        self
    }

    /// Exchanges since the last address reset, `None` before the first one.
    pub fn address(&self) -> Option<usize> {
        self.address
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    fn send(&mut self, byte: u8) -> Result<u8, LinkError> {
        let received = self.link.transfer8(byte)?;
        self.link.delay_us(self.pacing_us)?;
        Ok(received)
    }

    pub fn command(&mut self, command: Command) -> Result<(), LinkError> {
        self.send(command.byte())?;
        match command {
            Command::ResetAddress => {
                self.address = Some(0);
                self.mode = AccessMode::Write;
            }
            Command::EnterReadMode => self.mode = AccessMode::Read,
        }
        log::debug!("BRAM command {command:?}");
        Ok(())
    }

    pub fn reset_address(&mut self) -> Result<(), LinkError> {
        self.command(Command::ResetAddress)
    }

    pub fn enter_read_mode(&mut self) -> Result<(), LinkError> {
        self.command(Command::EnterReadMode)
    }

    /// Store `data` at the current address. The whole payload is checked for
    /// command bytes before anything is sent.
    pub fn write_data(&mut self, data: &[u8]) -> Result<(), LinkError> {
        validate_payload(data)?;
        if self.mode == AccessMode::Read {
            log::warn!("writing while the peripheral is in read mode; bytes will be ignored");
        }
        for &byte in data {
            self.send(byte)?;
            self.address = self.address.map(|a| a + 1);
        }
        Ok(())
    }

    /// Read `buf.len()` bytes starting at the current address.
    pub fn read_data(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        if self.mode != AccessMode::Read {
            log::warn!("reading while the peripheral is in write mode; zeros will be stored");
        }
        for slot in buf.iter_mut() {
            *slot = self.send(0x00)?;
            self.address = self.address.map(|a| a + 1);
        }
        Ok(())
    }

    /// Reset the address, then write `data` from address zero.
    pub fn write_from_start(&mut self, data: &[u8]) -> Result<(), LinkError> {
        validate_payload(data)?;
        self.reset_address()?;
        self.write_data(data)
    }

    /// Reset the address, enter read mode, then read from address zero.
    pub fn read_from_start(&mut self, buf: &mut [u8]) -> Result<(), LinkError> {
        self.reset_address()?;
        self.enter_read_mode()?;
        self.read_data(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProtocolError;
    use papilio_hal::sim::{BramMode, SimDelay, SimPeripheral, SimPort, SimSelect};
    use papilio_hal::SpiMode;

    type SimLink = FpgaLink<SimPort, SimSelect, SimDelay>;

    fn ready(sim: &SimPeripheral) -> SimLink {
        let mut link = SimLink::new();
        link.begin(sim.port(), sim.select_line(), sim.delay(), 1_000_000, SpiMode::Mode1)
            .unwrap();
        link
    }

    #[test]
    fn round_trips_through_block_ram() {
        let sim = SimPeripheral::bram(256);
        let mut link = ready(&sim);
        let data = [0x10, 0x20, 0x30, 0xFD];

        let mut session = BramSession::new(&mut link);
        session.write_from_start(&data).unwrap();
        assert_eq!(session.address(), Some(4));

        let mut read = [0u8; 4];
        session.read_from_start(&mut read).unwrap();
        assert_eq!(read, data);
        assert_eq!(session.mode(), AccessMode::Read);
        assert_eq!(sim.bram_mode(), Some(BramMode::Read));
        assert_eq!(sim.address(), Some(4));
    }

    #[test]
    fn reserved_bytes_are_refused_before_sending() {
        let sim = SimPeripheral::bram(256);
        let mut link = ready(&sim);
        let mut session = BramSession::new(&mut link);

        let err = session.write_from_start(&[1, 2, 0xFF, 3]).unwrap_err();
        assert!(matches!(
            err,
            LinkError::Protocol(ProtocolError::ReservedByte { index: 2, byte: 0xFF, .. })
        ));
        assert_eq!(sim.exchanges(), 0);
    }

    #[test]
    fn one_window_per_byte_with_pacing() {
        let sim = SimPeripheral::bram(256);
        let mut link = ready(&sim);
        let mut session = BramSession::new(&mut link).with_pacing_us(50);

        session.write_from_start(&[1, 2, 3]).unwrap();

        assert_eq!(sim.windows(), 4);
        // setup + hold per window, plus 50 us after each byte
        assert_eq!(sim.total_delay_ns(), 4 * (2_000 + 50_000));
    }

    #[test]
    fn address_is_unknown_until_reset() {
        let sim = SimPeripheral::bram(256);
        let mut link = ready(&sim);
        let mut session = BramSession::new(&mut link);

        session.write_data(&[7]).unwrap();
        assert_eq!(session.address(), None);
        session.reset_address().unwrap();
        assert_eq!(session.address(), Some(0));
    }
}
