//! Link handle shared between threads.
//!
//! The lock is held for a whole logical transfer, not per byte, so two
//! callers can never interleave inside one window.

use crate::error::LinkError;
use crate::link::FpgaLink;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use papilio_hal::SpiPort;
use std::sync::{Arc, Mutex};

pub struct SharedLink<P, S, D> {
    inner: Arc<Mutex<FpgaLink<P, S, D>>>,
}

impl<P, S, D> Clone for SharedLink<P, S, D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<P, S, D> SharedLink<P, S, D>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    pub fn new(link: FpgaLink<P, S, D>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(link)),
        }
    }

    /// Run `f` with exclusive access, e.g. for a multi-command BRAM pass.
    pub fn with<R>(
        &self,
        f: impl FnOnce(&mut FpgaLink<P, S, D>) -> Result<R, LinkError>,
    ) -> Result<R, LinkError> {
        let mut link = self.inner.lock().map_err(|_| LinkError::Poisoned)?;
        f(&mut link)
    }

    pub fn transfer8(&self, value: u8) -> Result<u8, LinkError> {
        self.with(|link| link.transfer8(value))
    }

    pub fn transfer16(&self, value: u16) -> Result<u16, LinkError> {
        self.with(|link| link.transfer16(value))
    }

    pub fn transfer32(&self, value: u32) -> Result<u32, LinkError> {
        self.with(|link| link.transfer32(value))
    }

    pub fn transfer_burst(
        &self,
        tx: Option<&[u8]>,
        rx: Option<&mut [u8]>,
        len: usize,
    ) -> Result<(), LinkError> {
        self.with(|link| link.transfer_burst(tx, rx, len))
    }
}
