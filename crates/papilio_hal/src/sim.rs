//! Simulated FPGA SPI slave.
//!
//! Two bitstreams are modelled:
//!
//! - **Loopback**: a shift register `transfer_width` bits wide. A received
//!   word is latched once all of its bytes have arrived and is shifted back
//!   out, most significant byte first, during the next word. The master
//!   therefore sees every word one exchange late.
//! - **BRAM**: an 8-bit shift register in front of a block RAM with an
//!   auto-incrementing address counter. `0xFF` resets the address and selects
//!   write mode, `0xFE` switches to sequential read mode (the byte at the
//!   current address is preloaded so reads come back without latency).
//!
//! Port, select line and delay handles share one state so tests can inspect
//! the exact sequence the master produced.

use crate::config::{LinkSettings, WordWidth};
use crate::traits::{HalError, SpiPort};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::{Arc, Mutex, MutexGuard};

const RESET_ADDRESS: u8 = 0xFF;
const READ_MODE: u8 = 0xFE;
const DEFAULT_BRAM_DEPTH: usize = 256;

/// Which bitstream the simulated FPGA runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PeripheralModel {
    Loopback {
        #[serde(default)]
        transfer_width: WordWidth,
    },
    Bram {
        #[serde(default = "default_depth")]
        depth: usize,
    },
}

fn default_depth() -> usize {
    DEFAULT_BRAM_DEPTH
}

impl Default for PeripheralModel {
    fn default() -> Self {
        PeripheralModel::Loopback {
            transfer_width: WordWidth::Bits8,
        }
    }
}

/// One observable action on the simulated wires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimEvent {
    Configure(LinkSettings),
    Select,
    Deselect,
    Exchange { mosi: u8, miso: u8 },
    Delay { ns: u32 },
    Release,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BramMode {
    Write,
    Read,
}

#[derive(Debug)]
struct LoopbackRegister {
    width_bytes: usize,
    outgoing: u32,
    incoming: u32,
    received: usize,
    sent: usize,
}

impl LoopbackRegister {
    fn new(width: WordWidth) -> Self {
        Self {
            width_bytes: width.bytes(),
            outgoing: 0,
            incoming: 0,
            received: 0,
            sent: 0,
        }
    }

    /// Word framing restarts on every select edge.
    fn reframe(&mut self) {
        self.incoming = 0;
        self.received = 0;
        self.sent = 0;
    }

    fn exchange(&mut self, mosi: u8) -> u8 {
        let shift = 8 * (self.width_bytes - 1 - self.sent);
        let miso = (self.outgoing >> shift) as u8;
        self.sent += 1;
        self.incoming = (self.incoming << 8) | u32::from(mosi);
        self.received += 1;
        if self.received == self.width_bytes {
            self.outgoing = self.incoming;
            self.reframe();
        }
        miso
    }
}

#[derive(Debug)]
struct BramModel {
    memory: Vec<u8>,
    address: usize,
    mode: BramMode,
    shift: u8,
}

impl BramModel {
    fn new(depth: usize) -> Self {
        Self {
            memory: vec![0; depth.max(1)],
            address: 0,
            mode: BramMode::Write,
            shift: 0,
        }
    }

    fn advance(&mut self) {
        self.address = (self.address + 1) % self.memory.len();
    }

    fn exchange(&mut self, mosi: u8) -> u8 {
        let miso = self.shift;
        match (mosi, self.mode) {
            (RESET_ADDRESS, _) => {
                self.address = 0;
                self.mode = BramMode::Write;
                self.shift = mosi;
            }
            (READ_MODE, _) => {
                self.mode = BramMode::Read;
                self.shift = self.memory[self.address];
            }
            (data, BramMode::Write) => {
                self.memory[self.address] = data;
                self.advance();
                self.shift = data;
            }
            (_, BramMode::Read) => {
                self.advance();
                self.shift = self.memory[self.address];
            }
        }
        miso
    }
}

#[derive(Debug)]
enum Fabric {
    Loopback(LoopbackRegister),
    Bram(BramModel),
}

#[derive(Debug)]
struct SimState {
    model: PeripheralModel,
    fabric: Fabric,
    selected: bool,
    configured: Option<LinkSettings>,
    events: Vec<SimEvent>,
    exchanges: usize,
    windows: usize,
    stray_exchanges: usize,
    delayed_ns: u64,
}

impl SimState {
    fn exchange(&mut self, mosi: u8) -> u8 {
        self.exchanges += 1;
        if !self.selected {
            // Slave ignores the clock while deselected; MISO floats low.
            self.stray_exchanges += 1;
            self.events.push(SimEvent::Exchange { mosi, miso: 0 });
            return 0;
        }
        let miso = match &mut self.fabric {
            Fabric::Loopback(reg) => reg.exchange(mosi),
            Fabric::Bram(bram) => bram.exchange(mosi),
        };
        self.events.push(SimEvent::Exchange { mosi, miso });
        miso
    }

    fn set_selected(&mut self, selected: bool) {
        if selected == self.selected {
            return;
        }
        self.selected = selected;
        if selected {
            self.windows += 1;
            if let Fabric::Loopback(reg) = &mut self.fabric {
                reg.reframe();
            }
            self.events.push(SimEvent::Select);
        } else {
            self.events.push(SimEvent::Deselect);
        }
    }
}

/// Simulated FPGA. Cheap to clone; all clones share the same device.
#[derive(Debug, Clone)]
pub struct SimPeripheral {
    state: Arc<Mutex<SimState>>,
}

impl SimPeripheral {
    pub fn new(model: PeripheralModel) -> Self {
        let fabric = match model {
            PeripheralModel::Loopback { transfer_width } => {
                Fabric::Loopback(LoopbackRegister::new(transfer_width))
            }
            PeripheralModel::Bram { depth } => Fabric::Bram(BramModel::new(depth)),
        };
        Self {
            state: Arc::new(Mutex::new(SimState {
                model,
                fabric,
                selected: false,
                configured: None,
                events: Vec::new(),
                exchanges: 0,
                windows: 0,
                stray_exchanges: 0,
                delayed_ns: 0,
            })),
        }
    }

    pub fn loopback(transfer_width: WordWidth) -> Self {
        Self::new(PeripheralModel::Loopback { transfer_width })
    }

    pub fn bram(depth: usize) -> Self {
        Self::new(PeripheralModel::Bram { depth })
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn port(&self) -> SimPort {
        SimPort { sim: self.clone() }
    }

    pub fn select_line(&self) -> SimSelect {
        SimSelect { sim: self.clone() }
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay { sim: self.clone() }
    }

    pub fn model(&self) -> PeripheralModel {
        self.lock().model
    }

    /// Physical byte exchanges clocked so far, including stray ones.
    pub fn exchanges(&self) -> usize {
        self.lock().exchanges
    }

    /// Exchanges clocked while the select line was deasserted.
    pub fn stray_exchanges(&self) -> usize {
        self.lock().stray_exchanges
    }

    /// Number of select assertions seen.
    pub fn windows(&self) -> usize {
        self.lock().windows
    }

    pub fn is_selected(&self) -> bool {
        self.lock().selected
    }

    pub fn last_settings(&self) -> Option<LinkSettings> {
        self.lock().configured
    }

    pub fn total_delay_ns(&self) -> u64 {
        self.lock().delayed_ns
    }

    pub fn events(&self) -> Vec<SimEvent> {
        self.lock().events.clone()
    }

    pub fn clear_events(&self) {
        self.lock().events.clear();
    }

    /// BRAM contents, `None` for the loopback bitstream.
    pub fn memory(&self) -> Option<Vec<u8>> {
        match &self.lock().fabric {
            Fabric::Bram(bram) => Some(bram.memory.clone()),
            Fabric::Loopback(_) => None,
        }
    }

    pub fn address(&self) -> Option<usize> {
        match &self.lock().fabric {
            Fabric::Bram(bram) => Some(bram.address),
            Fabric::Loopback(_) => None,
        }
    }

    pub fn bram_mode(&self) -> Option<BramMode> {
        match &self.lock().fabric {
            Fabric::Bram(bram) => Some(bram.mode),
            Fabric::Loopback(_) => None,
        }
    }
}

/// MOSI/MISO/SCLK side of the simulated FPGA.
#[derive(Debug, Clone)]
pub struct SimPort {
    sim: SimPeripheral,
}

impl SpiPort for SimPort {
    fn configure(&mut self, settings: &LinkSettings) -> Result<(), HalError> {
        let mut state = self.sim.lock();
        state.configured = Some(*settings);
        state.events.push(SimEvent::Configure(*settings));
        Ok(())
    }

    fn exchange(&mut self, byte: u8) -> Result<u8, HalError> {
        Ok(self.sim.lock().exchange(byte))
    }

    fn release(&mut self) -> Result<(), HalError> {
        self.sim.lock().events.push(SimEvent::Release);
        Ok(())
    }
}

/// Active-low chip select of the simulated FPGA.
#[derive(Debug, Clone)]
pub struct SimSelect {
    sim: SimPeripheral,
}

impl ErrorType for SimSelect {
    type Error = Infallible;
}

impl OutputPin for SimSelect {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.sim.lock().set_selected(true);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.sim.lock().set_selected(false);
        Ok(())
    }
}

/// Records requested delays instead of sleeping.
#[derive(Debug, Clone)]
pub struct SimDelay {
    sim: SimPeripheral,
}

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        let mut state = self.sim.lock();
        state.delayed_ns += u64::from(ns);
        state.events.push(SimEvent::Delay { ns });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(port: &mut SimPort, bytes: &[u8]) -> Vec<u8> {
        bytes.iter().map(|&b| port.exchange(b).unwrap()).collect()
    }

    #[test]
    fn byte_loopback_echoes_previous_byte() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let mut select = sim.select_line();
        let mut port = sim.port();

        select.set_low().unwrap();
        let rx = clock(&mut port, &[0x11, 0x22, 0x33]);
        select.set_high().unwrap();

        assert_eq!(rx, vec![0x00, 0x11, 0x22]);
        assert_eq!(sim.windows(), 1);
        assert_eq!(sim.exchanges(), 3);
    }

    #[test]
    fn word_loopback_latches_whole_words() {
        let sim = SimPeripheral::loopback(WordWidth::Bits16);
        let mut select = sim.select_line();
        let mut port = sim.port();

        select.set_low().unwrap();
        assert_eq!(clock(&mut port, &[0xA0, 0x01]), vec![0x00, 0x00]);
        select.set_high().unwrap();
        select.set_low().unwrap();
        assert_eq!(clock(&mut port, &[0xA0, 0x02]), vec![0xA0, 0x01]);
        select.set_high().unwrap();
    }

    #[test]
    fn partial_word_is_discarded_on_deselect() {
        let sim = SimPeripheral::loopback(WordWidth::Bits16);
        let mut select = sim.select_line();
        let mut port = sim.port();

        select.set_low().unwrap();
        clock(&mut port, &[0x12, 0x34]);
        select.set_high().unwrap();
        select.set_low().unwrap();
        clock(&mut port, &[0xFF]);
        select.set_high().unwrap();
        select.set_low().unwrap();
        assert_eq!(clock(&mut port, &[0x00, 0x00]), vec![0x12, 0x34]);
        select.set_high().unwrap();
    }

    #[test]
    fn deselected_exchanges_are_stray() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let mut port = sim.port();
        assert_eq!(port.exchange(0x55).unwrap(), 0x00);
        assert_eq!(sim.stray_exchanges(), 1);
        assert_eq!(sim.windows(), 0);
    }

    #[test]
    fn bram_write_then_sequential_read() {
        let sim = SimPeripheral::bram(8);
        let mut select = sim.select_line();
        let mut port = sim.port();

        select.set_low().unwrap();
        clock(&mut port, &[RESET_ADDRESS, 1, 2, 3]);
        assert_eq!(sim.address(), Some(3));
        clock(&mut port, &[RESET_ADDRESS, READ_MODE]);
        assert_eq!(sim.bram_mode(), Some(BramMode::Read));
        assert_eq!(clock(&mut port, &[0, 0, 0]), vec![1, 2, 3]);
        select.set_high().unwrap();

        assert_eq!(&sim.memory().unwrap()[..3], &[1, 2, 3]);
    }

    #[test]
    fn bram_address_wraps_at_depth() {
        let sim = SimPeripheral::bram(4);
        let mut select = sim.select_line();
        let mut port = sim.port();

        select.set_low().unwrap();
        clock(&mut port, &[RESET_ADDRESS, 1, 2, 3, 4, 5]);
        select.set_high().unwrap();

        assert_eq!(sim.memory().unwrap(), vec![5, 2, 3, 4]);
        assert_eq!(sim.address(), Some(1));
    }

    #[test]
    fn delays_and_configuration_are_recorded() {
        let sim = SimPeripheral::loopback(WordWidth::Bits8);
        let mut port = sim.port();
        let mut delay = sim.delay();

        port.configure(&LinkSettings::default()).unwrap();
        delay.delay_us(2);
        assert_eq!(sim.total_delay_ns(), 2_000);
        assert_eq!(sim.last_settings(), Some(LinkSettings::default()));
        assert_eq!(sim.events()[0], SimEvent::Configure(LinkSettings::default()));
    }

    #[test]
    fn parses_peripheral_model() {
        let bram: PeripheralModel = toml::from_str("type = \"bram\"").unwrap();
        assert_eq!(bram, PeripheralModel::Bram { depth: 256 });

        let loopback: PeripheralModel =
            toml::from_str("type = \"loopback\"\ntransfer_width = 32").unwrap();
        assert_eq!(
            loopback,
            PeripheralModel::Loopback {
                transfer_width: WordWidth::Bits32
            }
        );
    }
}
