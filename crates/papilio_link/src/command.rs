//! In-band command bytes understood by the BRAM bitstream.
//!
//! The link has no addressing of its own. The FPGA keeps an address counter
//! that advances by one per exchanged byte, and two byte values are taken out
//! of the data range to steer it. Data that would collide with them must be
//! remapped before it is sent.

use crate::error::ProtocolError;

/// Highest byte value that is always data.
pub const MAX_DATA_BYTE: u8 = 0xFD;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Reset the address counter to zero and select write mode.
    ResetAddress = 0xFF,
    /// Switch from write-accumulate to sequential read.
    EnterReadMode = 0xFE,
}

impl Command {
    pub const fn byte(self) -> u8 {
        self as u8
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0xFF => Some(Command::ResetAddress),
            0xFE => Some(Command::EnterReadMode),
            _ => None,
        }
    }
}

/// A byte that can never be mistaken for a [`Command`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DataByte(u8);

impl DataByte {
    /// Map reserved values onto the nearest data value, `0xFD`.
    pub fn remap(byte: u8) -> Self {
        DataByte(byte.min(MAX_DATA_BYTE))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DataByte {
    type Error = Command;

    fn try_from(byte: u8) -> Result<Self, Command> {
        match Command::from_byte(byte) {
            Some(command) => Err(command),
            None => Ok(DataByte(byte)),
        }
    }
}

impl From<DataByte> for u8 {
    fn from(data: DataByte) -> u8 {
        data.0
    }
}

/// How the peripheral reads one payload byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frame {
    Command(Command),
    Data(DataByte),
}

impl Frame {
    pub fn classify(byte: u8) -> Self {
        match DataByte::try_from(byte) {
            Ok(data) => Frame::Data(data),
            Err(command) => Frame::Command(command),
        }
    }

    pub fn byte(self) -> u8 {
        match self {
            Frame::Command(command) => command.byte(),
            Frame::Data(data) => data.get(),
        }
    }
}

/// Reject a payload that contains a command byte, reporting the first one.
pub fn validate_payload(payload: &[u8]) -> Result<(), ProtocolError> {
    for (index, &byte) in payload.iter().enumerate() {
        if let Some(command) = Command::from_byte(byte) {
            return Err(ProtocolError::ReservedByte {
                index,
                byte,
                command,
            });
        }
    }
    Ok(())
}

/// Remap colliding bytes in place. Returns how many were changed.
pub fn remap_payload(payload: &mut [u8]) -> usize {
    let mut remapped = 0;
    for byte in payload.iter_mut() {
        let data = DataByte::remap(*byte).get();
        if data != *byte {
            *byte = data;
            remapped += 1;
        }
    }
    remapped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_values() {
        assert_eq!(Command::ResetAddress.byte(), 0xFF);
        assert_eq!(Command::EnterReadMode.byte(), 0xFE);
        assert_eq!(Command::from_byte(0xFE), Some(Command::EnterReadMode));
        assert_eq!(Command::from_byte(0xFD), None);
    }

    #[test]
    fn every_non_reserved_byte_is_data() {
        for byte in 0..=MAX_DATA_BYTE {
            assert_eq!(Frame::classify(byte), Frame::Data(DataByte(byte)));
            assert_eq!(Frame::classify(byte).byte(), byte);
        }
        assert_eq!(Frame::classify(0xFF), Frame::Command(Command::ResetAddress));
    }

    #[test]
    fn data_byte_refuses_commands() {
        assert_eq!(DataByte::try_from(0xFF), Err(Command::ResetAddress));
        assert_eq!(DataByte::try_from(0x10).map(u8::from), Ok(0x10));
        assert_eq!(DataByte::remap(0xFE).get(), 0xFD);
        assert_eq!(DataByte::remap(0x42).get(), 0x42);
    }

    #[test]
    fn validate_reports_first_collision() {
        assert!(validate_payload(&[0, 1, 0xFD]).is_ok());
        assert_eq!(
            validate_payload(&[0, 0xFE, 0xFF]),
            Err(ProtocolError::ReservedByte {
                index: 1,
                byte: 0xFE,
                command: Command::EnterReadMode,
            })
        );
    }

    #[test]
    fn remap_counts_changes() {
        let mut payload: Vec<u8> = (0..=255).collect();
        assert_eq!(remap_payload(&mut payload), 2);
        assert_eq!(&payload[252..], &[252, 253, 0xFD, 0xFD]);
        assert!(validate_payload(&payload).is_ok());
    }
}
