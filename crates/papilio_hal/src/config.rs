use serde::Deserialize;
use thiserror::Error;

pub const DEFAULT_CLOCK_HZ: u32 = 1_000_000;
/// Select-line setup/hold margin around the first and last byte of a window.
pub const DEFAULT_SELECT_SETUP_NS: u32 = 1_000;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("unsupported word width: {0} bits (expected 8, 16 or 32)")]
    InvalidWordWidth(u8),
    #[error("unsupported SPI mode: {0} (expected 0..=3)")]
    InvalidMode(u8),
    #[error("clock rate must be non-zero")]
    ZeroClock,
    #[error("select setup/hold margin must be non-zero")]
    ZeroSelectMargin,
    #[error("invalid link config: {0}")]
    Parse(String),
}

/// SPI clock polarity/phase combination.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(try_from = "u8")]
pub enum SpiMode {
    /// CPOL = 0, CPHA = 0.
    #[default]
    Mode0,
    /// CPOL = 0, CPHA = 1.
    Mode1,
    /// CPOL = 1, CPHA = 0.
    Mode2,
    /// CPOL = 1, CPHA = 1.
    Mode3,
}

impl SpiMode {
    pub fn number(self) -> u8 {
        match self {
            SpiMode::Mode0 => 0,
            SpiMode::Mode1 => 1,
            SpiMode::Mode2 => 2,
            SpiMode::Mode3 => 3,
        }
    }

    /// Clock idles high.
    pub fn cpol(self) -> bool {
        matches!(self, SpiMode::Mode2 | SpiMode::Mode3)
    }

    /// Data is sampled on the second clock edge.
    pub fn cpha(self) -> bool {
        matches!(self, SpiMode::Mode1 | SpiMode::Mode3)
    }
}

impl TryFrom<u8> for SpiMode {
    type Error = ConfigError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(SpiMode::Mode0),
            1 => Ok(SpiMode::Mode1),
            2 => Ok(SpiMode::Mode2),
            3 => Ok(SpiMode::Mode3),
            other => Err(ConfigError::InvalidMode(other)),
        }
    }
}

impl From<SpiMode> for embedded_hal::spi::Mode {
    fn from(mode: SpiMode) -> Self {
        use embedded_hal::spi::{Phase, Polarity};
        embedded_hal::spi::Mode {
            polarity: if mode.cpol() {
                Polarity::IdleHigh
            } else {
                Polarity::IdleLow
            },
            phase: if mode.cpha() {
                Phase::CaptureOnSecondTransition
            } else {
                Phase::CaptureOnFirstTransition
            },
        }
    }
}

/// Width of one logical word carried over the byte-wide link.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize)]
#[serde(try_from = "u8")]
pub enum WordWidth {
    #[default]
    Bits8,
    Bits16,
    Bits32,
}

impl WordWidth {
    pub fn bits(self) -> u8 {
        match self {
            WordWidth::Bits8 => 8,
            WordWidth::Bits16 => 16,
            WordWidth::Bits32 => 32,
        }
    }

    /// Physical byte exchanges needed for one word.
    pub fn bytes(self) -> usize {
        usize::from(self.bits() / 8)
    }

    pub fn max_value(self) -> u32 {
        match self {
            WordWidth::Bits8 => 0xFF,
            WordWidth::Bits16 => 0xFFFF,
            WordWidth::Bits32 => u32::MAX,
        }
    }
}

impl TryFrom<u8> for WordWidth {
    type Error = ConfigError;

    fn try_from(bits: u8) -> Result<Self, Self::Error> {
        match bits {
            8 => Ok(WordWidth::Bits8),
            16 => Ok(WordWidth::Bits16),
            32 => Ok(WordWidth::Bits32),
            other => Err(ConfigError::InvalidWordWidth(other)),
        }
    }
}

/// Negotiated link parameters. Changes take effect when the next
/// transaction window opens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct LinkSettings {
    #[serde(default = "default_clock_hz")]
    pub clock_hz: u32,
    #[serde(default)]
    pub mode: SpiMode,
    #[serde(default)]
    pub word_width: WordWidth,
    #[serde(default = "default_select_setup_ns")]
    pub select_setup_ns: u32,
}

fn default_clock_hz() -> u32 {
    DEFAULT_CLOCK_HZ
}

fn default_select_setup_ns() -> u32 {
    DEFAULT_SELECT_SETUP_NS
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            clock_hz: DEFAULT_CLOCK_HZ,
            mode: SpiMode::Mode0,
            word_width: WordWidth::Bits8,
            select_setup_ns: DEFAULT_SELECT_SETUP_NS,
        }
    }
}

impl LinkSettings {
    pub fn new(clock_hz: u32, mode: SpiMode) -> Self {
        Self {
            clock_hz,
            mode,
            ..Self::default()
        }
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let settings: Self =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.clock_hz == 0 {
            return Err(ConfigError::ZeroClock);
        }
        if self.select_setup_ns == 0 {
            return Err(ConfigError::ZeroSelectMargin);
        }
        Ok(())
    }
}
