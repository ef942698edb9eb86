//! Scenario harness: coordinates a backend, a link and the test programs.
//!
//! Reads a TOML config file, selects the backend, opens an [`FpgaLink`] on
//! it and runs the loopback, BRAM and burst scenarios against it.
//!
//! Supported backends:
//! - `sim`: [`SimPeripheral`] (CI/unit tests, no hardware)
//! - `hardware`: a board SPI bus behind `papilio_hal::HalBus` (reserved on host)

mod report;
mod scenario;

pub use report::{MAX_RECORDED_MISMATCHES, MismatchRecord, ScenarioReport, Summary};
pub use scenario::{
    LOOPBACK_PATTERNS, ScenarioKind, burst_word, run_bram, run_burst, run_loopback, run_selected,
};

use papilio_hal::sim::{PeripheralModel, SimDelay, SimPeripheral, SimPort, SimSelect};
use papilio_link::{FpgaLink, LinkError, LinkSettings};
use serde::Deserialize;

/// Link wired to the simulated peripheral.
pub type SimLink = FpgaLink<SimPort, SimSelect, SimDelay>;

/// Top-level harness config, deserialized from TOML.
#[derive(Debug, Deserialize)]
pub struct HarnessConfig {
    pub backend: BackendSection,
    #[serde(default)]
    pub link: LinkSettings,
    #[serde(default)]
    pub peripheral: PeripheralModel,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub burst: BurstConfig,
}

#[derive(Debug, Deserialize)]
pub struct BackendSection {
    #[serde(rename = "type")]
    pub backend_type: String,
    /// Bus device path, hardware only.
    #[serde(default)]
    pub device: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PacingConfig {
    #[serde(default = "default_settle_us")]
    pub settle_us: u32,
    #[serde(default = "default_flush_transfers")]
    pub flush_transfers: usize,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            settle_us: default_settle_us(),
            flush_transfers: default_flush_transfers(),
        }
    }
}

fn default_settle_us() -> u32 {
    50
}
fn default_flush_transfers() -> usize {
    3
}

#[derive(Debug, Clone, Deserialize)]
pub struct BurstConfig {
    #[serde(default = "default_burst_length")]
    pub length: usize,
    #[serde(default = "default_speeds")]
    pub speeds_hz: Vec<u32>,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            length: default_burst_length(),
            speeds_hz: default_speeds(),
        }
    }
}

fn default_burst_length() -> usize {
    256
}
fn default_speeds() -> Vec<u32> {
    vec![1_000_000, 2_000_000, 4_000_000, 8_000_000]
}

/// Parsed backend selection.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendMode {
    Sim,
    Hardware { device: String },
}

impl HarnessConfig {
    /// Parse from TOML string.
    pub fn from_toml(content: &str) -> Result<Self, HarnessError> {
        let config: Self =
            toml::from_str(content).map_err(|e| HarnessError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from TOML file path.
    pub fn from_file(path: &str) -> Result<Self, HarnessError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| HarnessError::Config(format!("{path}: {e}")))?;
        Self::from_toml(&content)
    }

    fn validate(&self) -> Result<(), HarnessError> {
        self.link
            .validate()
            .map_err(|e| HarnessError::Config(format!("[link] {e}")))?;
        if self.burst.speeds_hz.contains(&0) {
            return Err(HarnessError::Config("[burst] speeds_hz contains 0".into()));
        }
        if let PeripheralModel::Bram { depth: 0 } = self.peripheral {
            return Err(HarnessError::Config("[peripheral] bram depth must be non-zero".into()));
        }
        if let PeripheralModel::Loopback { transfer_width } = self.peripheral {
            if transfer_width != self.link.word_width {
                log::warn!(
                    "link word_width {} does not match loopback transfer_width {}",
                    self.link.word_width.bits(),
                    transfer_width.bits()
                );
            }
        }
        Ok(())
    }

    /// Resolve the backend from config.
    pub fn backend_mode(&self) -> Result<BackendMode, HarnessError> {
        match self.backend.backend_type.as_str() {
            "sim" => Ok(BackendMode::Sim),
            "hardware" => {
                let device = self.backend.device.clone().ok_or_else(|| {
                    HarnessError::Config("backend.device required for hardware".into())
                })?;
                Ok(BackendMode::Hardware { device })
            }
            other => Err(HarnessError::Config(format!(
                "unknown backend type: {other}"
            ))),
        }
    }

    /// Scenarios that make sense for the configured peripheral.
    pub fn default_scenarios(&self) -> Vec<ScenarioKind> {
        match self.peripheral {
            PeripheralModel::Loopback { .. } => vec![ScenarioKind::Loopback, ScenarioKind::Burst],
            PeripheralModel::Bram { .. } => vec![ScenarioKind::Bram],
        }
    }

    /// Byte count used by the BRAM scenario.
    pub fn bram_size(&self) -> usize {
        match self.peripheral {
            PeripheralModel::Bram { depth } => depth,
            PeripheralModel::Loopback { .. } => 256,
        }
    }
}

/// Create the peripheral backend described by the config.
pub fn create_backend(config: &HarnessConfig) -> Result<SimPeripheral, HarnessError> {
    match config.backend_mode()? {
        BackendMode::Sim => {
            log::info!("creating simulated peripheral: {:?}", config.peripheral);
            Ok(SimPeripheral::new(config.peripheral))
        }
        BackendMode::Hardware { device } => Err(HarnessError::Config(format!(
            "hardware backend ({device}) needs a board SpiBus; wire it through papilio_hal::HalBus"
        ))),
    }
}

/// Open a ready link on the simulated peripheral using the `[link]` settings.
pub fn open_sim_link(
    config: &HarnessConfig,
    sim: &SimPeripheral,
) -> Result<SimLink, HarnessError> {
    Ok(FpgaLink::with_settings(
        sim.port(),
        sim.select_line(),
        sim.delay(),
        config.link,
    )?)
}

#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("config error: {0}")]
    Config(String),
    #[error("link error: {0}")]
    Link(#[from] LinkError),
}
