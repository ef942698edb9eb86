use crate::config::LinkSettings;
use embedded_hal::spi::{Error as _, SpiBus};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HalError {
    #[error("SPI bus error: {0}")]
    Bus(String),
    #[error("select line error: {0}")]
    Select(String),
    #[error("port does not support {0}")]
    Unsupported(&'static str),
}

/// Byte-wide, full-duplex SPI port driven by the link master.
///
/// Every byte clocked out clocks one byte in; there is no half-duplex
/// operation at this level. Chip select is not part of the port: the link
/// drives it through a separate `OutputPin`.
pub trait SpiPort {
    /// Apply clock rate and mode. Called before the select line is asserted.
    fn configure(&mut self, settings: &LinkSettings) -> Result<(), HalError>;

    /// Exchange one byte, blocking until the hardware completes it.
    fn exchange(&mut self, byte: u8) -> Result<u8, HalError>;

    /// Release the bus after the select line has been deasserted.
    fn release(&mut self) -> Result<(), HalError> {
        Ok(())
    }
}

impl<T: SpiPort + ?Sized> SpiPort for &mut T {
    fn configure(&mut self, settings: &LinkSettings) -> Result<(), HalError> {
        (**self).configure(settings)
    }
    fn exchange(&mut self, byte: u8) -> Result<u8, HalError> {
        (**self).exchange(byte)
    }
    fn release(&mut self) -> Result<(), HalError> {
        (**self).release()
    }
}

impl<T: SpiPort + ?Sized> SpiPort for Box<T> {
    fn configure(&mut self, settings: &LinkSettings) -> Result<(), HalError> {
        (**self).configure(settings)
    }
    fn exchange(&mut self, byte: u8) -> Result<u8, HalError> {
        (**self).exchange(byte)
    }
    fn release(&mut self) -> Result<(), HalError> {
        (**self).release()
    }
}

/// Board hook that reprograms clock rate and mode on a concrete bus.
pub type Reconfigure<B> = fn(&mut B, &LinkSettings) -> Result<(), HalError>;

/// [`SpiPort`] over any embedded-hal `SpiBus`.
///
/// embedded-hal has no runtime clock/mode API, so reconfiguration goes
/// through an optional board hook. Without one the bus keeps whatever it
/// was constructed with.
pub struct HalBus<B> {
    bus: B,
    reconfigure: Option<Reconfigure<B>>,
    applied: Option<LinkSettings>,
}

impl<B: SpiBus<u8>> HalBus<B> {
    pub fn new(bus: B) -> Self {
        Self {
            bus,
            reconfigure: None,
            applied: None,
        }
    }

    pub fn with_reconfigure(bus: B, reconfigure: Reconfigure<B>) -> Self {
        Self {
            bus,
            reconfigure: Some(reconfigure),
            applied: None,
        }
    }

    pub fn into_inner(self) -> B {
        self.bus
    }
}

impl<B: SpiBus<u8>> SpiPort for HalBus<B> {
    fn configure(&mut self, settings: &LinkSettings) -> Result<(), HalError> {
        if self.applied.as_ref() == Some(settings) {
            return Ok(());
        }
        match self.reconfigure {
            Some(hook) => hook(&mut self.bus, settings)?,
            None => log::debug!(
                "SPI bus has no reconfigure hook; keeping construction-time clock (requested {} Hz, mode {})",
                settings.clock_hz,
                settings.mode.number()
            ),
        }
        self.applied = Some(*settings);
        Ok(())
    }

    fn exchange(&mut self, byte: u8) -> Result<u8, HalError> {
        let mut buf = [byte];
        self.bus
            .transfer_in_place(&mut buf)
            .map_err(|e| HalError::Bus(format!("{:?}", e.kind())))?;
        Ok(buf[0])
    }

    fn release(&mut self) -> Result<(), HalError> {
        self.bus
            .flush()
            .map_err(|e| HalError::Bus(format!("{:?}", e.kind())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SpiMode;
    use embedded_hal::spi::{ErrorKind, ErrorType};

    /// Bus that inverts every byte and can be told to fail.
    #[derive(Default)]
    struct InvertingBus {
        fail: bool,
        flushes: usize,
        clock_hz: u32,
    }

    #[derive(Debug)]
    struct BusFault;

    impl embedded_hal::spi::Error for BusFault {
        fn kind(&self) -> ErrorKind {
            ErrorKind::Overrun
        }
    }

    impl ErrorType for InvertingBus {
        type Error = BusFault;
    }

    impl SpiBus<u8> for InvertingBus {
        fn read(&mut self, words: &mut [u8]) -> Result<(), BusFault> {
            words.fill(0xFF);
            Ok(())
        }
        fn write(&mut self, _words: &[u8]) -> Result<(), BusFault> {
            Ok(())
        }
        fn transfer(&mut self, read: &mut [u8], write: &[u8]) -> Result<(), BusFault> {
            for (r, w) in read.iter_mut().zip(write) {
                *r = !w;
            }
            Ok(())
        }
        fn transfer_in_place(&mut self, words: &mut [u8]) -> Result<(), BusFault> {
            if self.fail {
                return Err(BusFault);
            }
            for w in words.iter_mut() {
                *w = !*w;
            }
            Ok(())
        }
        fn flush(&mut self) -> Result<(), BusFault> {
            self.flushes += 1;
            Ok(())
        }
    }

    #[test]
    fn exchanges_through_embedded_hal_bus() {
        let mut port = HalBus::new(InvertingBus::default());
        assert_eq!(port.exchange(0x0F).unwrap(), 0xF0);
        port.release().unwrap();
        assert_eq!(port.into_inner().flushes, 1);
    }

    #[test]
    fn maps_bus_errors() {
        let mut port = HalBus::new(InvertingBus {
            fail: true,
            ..Default::default()
        });
        let err = port.exchange(0x00).unwrap_err();
        assert!(matches!(err, HalError::Bus(ref kind) if kind == "Overrun"));
    }

    #[test]
    fn reconfigure_hook_runs_once_per_change() {
        fn set_clock(bus: &mut InvertingBus, settings: &LinkSettings) -> Result<(), HalError> {
            bus.clock_hz = settings.clock_hz;
            bus.flushes += 100;
            Ok(())
        }

        let mut port = HalBus::with_reconfigure(InvertingBus::default(), set_clock);
        let settings = LinkSettings::new(2_000_000, SpiMode::Mode1);
        port.configure(&settings).unwrap();
        port.configure(&settings).unwrap();
        let bus = port.into_inner();
        assert_eq!(bus.clock_hz, 2_000_000);
        assert_eq!(bus.flushes, 100);
    }

    #[test]
    fn boxed_port_forwards() {
        let mut port: Box<dyn SpiPort> = Box::new(HalBus::new(InvertingBus::default()));
        port.configure(&LinkSettings::default()).unwrap();
        assert_eq!(port.exchange(0xAA).unwrap(), 0x55);
    }
}
