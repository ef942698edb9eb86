//! Transaction window: the select line is held low for exactly one logical
//! transfer and returned high on every exit path.

use crate::error::LinkError;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use papilio_hal::{HalError, LinkSettings, SpiPort};

/// Port, select line and delay owned by an initialised link.
pub(crate) struct Wiring<P, S, D> {
    pub(crate) port: P,
    pub(crate) select: S,
    pub(crate) delay: D,
}

pub(crate) fn select_error<E: embedded_hal::digital::Error>(e: E) -> LinkError {
    LinkError::Hal(HalError::Select(format!("{:?}", e.kind())))
}

/// An open transaction window.
///
/// Holding one mutably borrows the link, so a second window cannot be opened
/// until this one is closed or dropped. Dropping closes the window.
pub struct Transaction<'a, P, S, D>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    wiring: &'a mut Wiring<P, S, D>,
    hold_ns: u32,
    exchanged: usize,
    open: bool,
}

impl<'a, P, S, D> Transaction<'a, P, S, D>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    pub(crate) fn open(
        wiring: &'a mut Wiring<P, S, D>,
        settings: &LinkSettings,
    ) -> Result<Self, LinkError> {
        wiring.port.configure(settings)?;
        if let Err(e) = wiring.select.set_low() {
            let _ = wiring.select.set_high();
            return Err(select_error(e));
        }
        wiring.delay.delay_ns(settings.select_setup_ns);
        log::trace!(
            "window open at {} Hz, mode {}",
            settings.clock_hz,
            settings.mode.number()
        );
        Ok(Self {
            wiring,
            hold_ns: settings.select_setup_ns,
            exchanged: 0,
            open: true,
        })
    }

    /// One physical byte exchange.
    pub fn exchange(&mut self, byte: u8) -> Result<u8, LinkError> {
        let received = self.wiring.port.exchange(byte)?;
        self.exchanged += 1;
        Ok(received)
    }

    /// Bytes exchanged in this window so far.
    pub fn exchanged(&self) -> usize {
        self.exchanged
    }

    /// Close the window, reporting select-line or bus release failures.
    pub fn close(mut self) -> Result<(), LinkError> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), LinkError> {
        if !self.open {
            return Ok(());
        }
        self.open = false;
        self.wiring.delay.delay_ns(self.hold_ns);
        let deselect = self.wiring.select.set_high().map_err(select_error);
        let release = self.wiring.port.release().map_err(LinkError::from);
        log::trace!("window closed after {} exchanges", self.exchanged);
        deselect.and(release)
    }
}

impl<P, S, D> Drop for Transaction<'_, P, S, D>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            log::error!("failed to close transaction window: {e}");
        }
    }
}
