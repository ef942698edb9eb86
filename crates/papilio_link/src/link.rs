use crate::error::LinkError;
use crate::transaction::{Transaction, Wiring, select_error};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use papilio_hal::{ConfigError, LinkSettings, SpiMode, SpiPort, WordWidth};

pub(crate) enum LinkState<P, S, D> {
    Uninitialized,
    Ready(Wiring<P, S, D>),
}

/// Link handle to one FPGA SPI slave.
///
/// Starts uninitialised; every transfer on an uninitialised handle fails
/// with [`LinkError::NotInitialized`] without touching the wires.
/// Configuration may change at any time and applies from the next window.
pub struct FpgaLink<P, S, D> {
    pub(crate) settings: LinkSettings,
    pub(crate) state: LinkState<P, S, D>,
}

impl<P, S, D> FpgaLink<P, S, D> {
    pub fn new() -> Self {
        Self {
            settings: LinkSettings::default(),
            state: LinkState::Uninitialized,
        }
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.state, LinkState::Ready(_))
    }

    pub fn settings(&self) -> &LinkSettings {
        &self.settings
    }

    pub fn set_speed(&mut self, clock_hz: u32) -> Result<(), LinkError> {
        if clock_hz == 0 {
            return Err(ConfigError::ZeroClock.into());
        }
        log::debug!("clock {} Hz -> {} Hz", self.settings.clock_hz, clock_hz);
        self.settings.clock_hz = clock_hz;
        Ok(())
    }

    pub fn set_mode(&mut self, mode: SpiMode) {
        log::debug!("SPI mode {} -> {}", self.settings.mode.number(), mode.number());
        self.settings.mode = mode;
    }

    /// Numeric form of [`set_mode`](Self::set_mode); out-of-range modes are
    /// rejected and the current mode is kept.
    pub fn set_mode_number(&mut self, mode: u8) -> Result<(), LinkError> {
        self.set_mode(SpiMode::try_from(mode)?);
        Ok(())
    }

    pub fn set_word_width(&mut self, width: WordWidth) {
        log::debug!(
            "default word width {} -> {} bits",
            self.settings.word_width.bits(),
            width.bits()
        );
        self.settings.word_width = width;
    }

    /// Numeric form of [`set_word_width`](Self::set_word_width); only 8, 16
    /// and 32 are accepted.
    pub fn set_bit_width(&mut self, bits: u8) -> Result<(), LinkError> {
        self.set_word_width(WordWidth::try_from(bits)?);
        Ok(())
    }

    /// Release the handle and hand back its resources. Pins keep their last
    /// level.
    pub fn end(&mut self) -> Option<(P, S, D)> {
        match std::mem::replace(&mut self.state, LinkState::Uninitialized) {
            LinkState::Ready(wiring) => {
                log::info!("link released");
                Some((wiring.port, wiring.select, wiring.delay))
            }
            LinkState::Uninitialized => None,
        }
    }

    pub(crate) fn wiring_mut(&mut self) -> Result<&mut Wiring<P, S, D>, LinkError> {
        match &mut self.state {
            LinkState::Ready(wiring) => Ok(wiring),
            LinkState::Uninitialized => Err(LinkError::NotInitialized),
        }
    }
}

impl<P, S, D> Default for FpgaLink<P, S, D> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P, S, D> FpgaLink<P, S, D>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    /// Take ownership of the wiring, park the select line high and reset the
    /// default word width to 8 bits.
    pub fn begin(
        &mut self,
        port: P,
        mut select: S,
        delay: D,
        clock_hz: u32,
        mode: SpiMode,
    ) -> Result<(), LinkError> {
        if clock_hz == 0 {
            return Err(ConfigError::ZeroClock.into());
        }
        select.set_high().map_err(select_error)?;
        if self.is_initialized() {
            log::warn!("re-initializing an active link; previous wiring dropped");
        }
        self.settings = LinkSettings {
            clock_hz,
            mode,
            word_width: WordWidth::Bits8,
            select_setup_ns: self.settings.select_setup_ns,
        };
        self.state = LinkState::Ready(Wiring {
            port,
            select,
            delay,
        });
        log::info!("link ready at {} Hz, mode {}", clock_hz, mode.number());
        Ok(())
    }

    /// Ready link built from a full settings block, e.g. one read from TOML.
    pub fn with_settings(
        port: P,
        select: S,
        delay: D,
        settings: LinkSettings,
    ) -> Result<Self, LinkError> {
        settings.validate()?;
        let mut link = Self::new();
        link.settings.select_setup_ns = settings.select_setup_ns;
        link.begin(port, select, delay, settings.clock_hz, settings.mode)?;
        link.settings.word_width = settings.word_width;
        Ok(link)
    }

    /// Open a raw transaction window for custom framing.
    pub fn transaction(&mut self) -> Result<Transaction<'_, P, S, D>, LinkError> {
        let settings = self.settings;
        Transaction::open(self.wiring_mut()?, &settings)
    }

    /// Pause using the link's delay provider. Pacing between transfers is
    /// the caller's business; this only lends it the timer.
    pub fn delay_us(&mut self, us: u32) -> Result<(), LinkError> {
        if us > 0 {
            self.wiring_mut()?.delay.delay_us(us);
        }
        Ok(())
    }

    /// Receive FIFO depth. The wire protocol has no status channel.
    pub fn rx_available(&self) -> Result<usize, LinkError> {
        Err(LinkError::Unsupported("rx_available"))
    }

    /// Transmit readiness. The wire protocol has no status channel.
    pub fn tx_ready(&self) -> Result<bool, LinkError> {
        Err(LinkError::Unsupported("tx_ready"))
    }

    /// Peripheral liveness. The wire protocol has no status channel.
    pub fn is_ready(&self) -> Result<bool, LinkError> {
        Err(LinkError::Unsupported("is_ready"))
    }

    pub fn read_fifo(&mut self) -> Result<u8, LinkError> {
        self.transfer8(0x00)
    }

    pub fn write_fifo(&mut self, byte: u8) -> Result<(), LinkError> {
        self.transfer8(byte).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use papilio_hal::sim::{SimDelay, SimEvent, SimPeripheral, SimPort, SimSelect};

    type SimLink = FpgaLink<SimPort, SimSelect, SimDelay>;

    fn ready(sim: &SimPeripheral) -> SimLink {
        let mut link = SimLink::new();
        link.begin(sim.port(), sim.select_line(), sim.delay(), 1_000_000, SpiMode::Mode1)
            .unwrap();
        link
    }

    #[test]
    fn uninitialized_link_touches_nothing() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let mut link = SimLink::new();

        assert!(matches!(link.transfer8(0x42), Err(LinkError::NotInitialized)));
        assert!(matches!(link.transfer32(1), Err(LinkError::NotInitialized)));
        assert!(matches!(link.transaction(), Err(LinkError::NotInitialized)));
        assert_eq!(sim.exchanges(), 0);
        assert_eq!(sim.windows(), 0);
    }

    #[test]
    fn begin_parks_select_high_and_resets_width() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let mut link = SimLink::new();
        link.set_word_width(WordWidth::Bits32);
        link.begin(sim.port(), sim.select_line(), sim.delay(), 2_000_000, SpiMode::Mode1)
            .unwrap();

        assert!(link.is_initialized());
        assert!(!sim.is_selected());
        assert_eq!(link.settings().word_width, WordWidth::Bits8);
        assert_eq!(link.settings().clock_hz, 2_000_000);
    }

    #[test]
    fn begin_rejects_zero_clock() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let mut link = SimLink::new();
        let err = link
            .begin(sim.port(), sim.select_line(), sim.delay(), 0, SpiMode::Mode0)
            .unwrap_err();
        assert!(matches!(err, LinkError::Config(ConfigError::ZeroClock)));
        assert!(!link.is_initialized());
    }

    #[test]
    fn end_returns_wiring_and_disables_transfers() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let mut link = ready(&sim);
        assert!(link.end().is_some());
        assert!(link.end().is_none());
        assert!(matches!(link.transfer8(1), Err(LinkError::NotInitialized)));
        assert_eq!(sim.exchanges(), 0);
    }

    #[test]
    fn invalid_configuration_keeps_previous_values() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let mut link = ready(&sim);
        link.set_bit_width(16).unwrap();

        assert!(matches!(
            link.set_bit_width(12),
            Err(LinkError::Config(ConfigError::InvalidWordWidth(12)))
        ));
        assert!(matches!(
            link.set_mode_number(7),
            Err(LinkError::Config(ConfigError::InvalidMode(7)))
        ));
        assert!(link.set_speed(0).is_err());

        assert_eq!(link.settings().word_width, WordWidth::Bits16);
        assert_eq!(link.settings().mode, SpiMode::Mode1);
        assert_eq!(link.settings().clock_hz, 1_000_000);
    }

    #[test]
    fn settings_apply_at_next_window() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let mut link = ready(&sim);

        link.transfer8(0).unwrap();
        assert_eq!(sim.last_settings().unwrap().clock_hz, 1_000_000);

        link.set_speed(8_000_000).unwrap();
        link.set_mode_number(3).unwrap();
        assert_eq!(sim.last_settings().unwrap().clock_hz, 1_000_000);

        link.transfer8(0).unwrap();
        let applied = sim.last_settings().unwrap();
        assert_eq!(applied.clock_hz, 8_000_000);
        assert_eq!(applied.mode, SpiMode::Mode3);
    }

    #[test]
    fn window_is_configured_selected_and_padded() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let mut link = ready(&sim);
        sim.clear_events();

        link.transfer8(0xA5).unwrap();

        let settings = *link.settings();
        assert_eq!(
            sim.events(),
            vec![
                SimEvent::Configure(settings),
                SimEvent::Select,
                SimEvent::Delay { ns: 1_000 },
                SimEvent::Exchange { mosi: 0xA5, miso: 0x00 },
                SimEvent::Delay { ns: 1_000 },
                SimEvent::Deselect,
                SimEvent::Release,
            ]
        );
    }

    #[test]
    fn dropped_transaction_deselects() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let mut link = ready(&sim);

        let result: Result<(), LinkError> = (|| {
            let mut txn = link.transaction()?;
            txn.exchange(0x01)?;
            assert!(sim.is_selected());
            Err(LinkError::Unsupported("early exit"))
        })();

        assert!(result.is_err());
        assert!(!sim.is_selected());
        assert_eq!(sim.windows(), 1);
    }

    #[test]
    fn status_probes_are_unsupported() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let link = ready(&sim);
        assert!(matches!(link.rx_available(), Err(LinkError::Unsupported("rx_available"))));
        assert!(matches!(link.tx_ready(), Err(LinkError::Unsupported("tx_ready"))));
        assert!(matches!(link.is_ready(), Err(LinkError::Unsupported("is_ready"))));
        assert_eq!(sim.exchanges(), 0);
    }

    #[test]
    fn fifo_helpers_use_single_byte_windows() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let mut link = ready(&sim);
        link.write_fifo(0x3C).unwrap();
        assert_eq!(link.read_fifo().unwrap(), 0x3C);
        assert_eq!(sim.windows(), 2);
    }

    #[test]
    fn with_settings_keeps_width_and_margin() {
        let sim = SimPeripheral::loopback(WordWidth::Bits16);
        let settings = LinkSettings {
            clock_hz: 4_000_000,
            mode: SpiMode::Mode2,
            word_width: WordWidth::Bits16,
            select_setup_ns: 500,
        };
        let mut link =
            SimLink::with_settings(sim.port(), sim.select_line(), sim.delay(), settings).unwrap();
        assert_eq!(*link.settings(), settings);

        link.transfer16(0x1234).unwrap();
        assert_eq!(sim.total_delay_ns(), 1_000);
    }

    #[test]
    fn with_settings_refuses_zero_select_margin() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let settings = LinkSettings {
            select_setup_ns: 0,
            ..LinkSettings::default()
        };
        let result = SimLink::with_settings(sim.port(), sim.select_line(), sim.delay(), settings);
        assert!(matches!(
            result,
            Err(LinkError::Config(ConfigError::ZeroSelectMargin))
        ));
        assert_eq!(sim.windows(), 0);
        assert_eq!(sim.exchanges(), 0);
    }
}
