//! The three test programs, expressed against any ready link.

use crate::report::{ScenarioReport, Summary};
use crate::{HarnessConfig, HarnessError};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use papilio_hal::SpiPort;
use papilio_link::command::remap_payload;
use papilio_link::loopback::{exact_mismatches, shifted_mismatches};
use papilio_link::{BramSession, FpgaLink, LinkSettings, LoopbackProbe, WordWidth};
use std::str::FromStr;

/// Single-word patterns of the loopback scenario.
pub const LOOPBACK_PATTERNS: [u32; 8] = [0x00, 0xFF, 0xAA, 0x55, 0x0F, 0xF0, 0x12, 0x34];

const SEQUENCE_LEN: usize = 11;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioKind {
    Loopback,
    Bram,
    Burst,
}

impl FromStr for ScenarioKind {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "loopback" => Ok(ScenarioKind::Loopback),
            "bram" => Ok(ScenarioKind::Bram),
            "burst" => Ok(ScenarioKind::Burst),
            other => Err(HarnessError::Config(format!("unknown scenario: {other}"))),
        }
    }
}

/// Run `kinds` in order and collect their reports.
pub fn run_selected<P, S, D>(
    link: &mut FpgaLink<P, S, D>,
    config: &HarnessConfig,
    kinds: &[ScenarioKind],
) -> Result<Summary, HarnessError>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    let mut summary = Summary::default();
    for kind in kinds {
        log::debug!("running scenario {kind:?}");
        match kind {
            ScenarioKind::Loopback => summary.push(run_loopback(link, config)?),
            ScenarioKind::Bram => summary.push(run_bram(link, config)?),
            ScenarioKind::Burst => {
                for report in run_burst(link, config)? {
                    summary.push(report);
                }
            }
        }
    }
    Ok(summary)
}

/// Flush, prime, then check every pattern's echo; repeat with an 11-word
/// sequence of separate transactions. On a byte-wide link the sequence is
/// also sent as one burst window.
pub fn run_loopback<P, S, D>(
    link: &mut FpgaLink<P, S, D>,
    config: &HarnessConfig,
) -> Result<ScenarioReport, HarnessError>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    let width = link.settings().word_width;
    let settle_us = config.pacing.settle_us;
    let mut report = ScenarioReport::new(format!("loopback {}-bit", width.bits()));
    let mut probe = LoopbackProbe::new(width);

    flush(&mut probe, link, config)?;
    let patterns: Vec<u32> = LOOPBACK_PATTERNS
        .iter()
        .map(|p| p & width.max_value())
        .collect();
    probe.prime(link, patterns[0])?;
    for (index, &pattern) in patterns.iter().enumerate().skip(1) {
        let echo = probe.send(link, pattern)?;
        link.delay_us(settle_us)?;
        report.check(index, patterns[index - 1], echo.received);
    }

    flush(&mut probe, link, config)?;
    let sequence: Vec<u32> = (0..SEQUENCE_LEN as u32).collect();
    probe.prime(link, sequence[0])?;
    link.delay_us(settle_us)?;
    for (index, &value) in sequence.iter().enumerate().skip(1) {
        let echo = probe.send(link, value)?;
        link.delay_us(settle_us)?;
        report.check(index, sequence[index - 1], echo.received);
    }

    if width == WordWidth::Bits8 {
        let tx: Vec<u8> = (0..SEQUENCE_LEN as u8).collect();
        let mut rx = vec![0u8; tx.len()];
        link.exchange_burst(&tx, &mut rx)?;
        report.absorb(tx.len() - 1, shifted_mismatches(&tx, &rx));
    }

    log::debug!("{report}");
    Ok(report)
}

fn flush<P, S, D>(
    probe: &mut LoopbackProbe,
    link: &mut FpgaLink<P, S, D>,
    config: &HarnessConfig,
) -> Result<(), HarnessError>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    for _ in 0..config.pacing.flush_transfers {
        probe.flush(link, 1)?;
        link.delay_us(config.pacing.settle_us)?;
    }
    Ok(())
}

/// Write the `i` pattern (command bytes remapped) from address zero, read it
/// back from address zero and compare exactly.
pub fn run_bram<P, S, D>(
    link: &mut FpgaLink<P, S, D>,
    config: &HarnessConfig,
) -> Result<ScenarioReport, HarnessError>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    let size = config.bram_size();
    let mut report = ScenarioReport::new(format!("bram {size} bytes"));

    let mut written: Vec<u8> = (0..size).map(|i| i as u8).collect();
    let remapped = remap_payload(&mut written);
    log::debug!("bram pattern: {remapped} command bytes remapped");

    let mut read = vec![0u8; size];
    let mut session = BramSession::new(link).with_pacing_us(config.pacing.settle_us);
    session.write_from_start(&written)?;
    session.read_from_start(&mut read)?;

    report.absorb(size, exact_mismatches(&written, &read));
    log::debug!("{report}");
    Ok(report)
}

/// Word `i` of the burst pattern for `width`.
pub fn burst_word(width: WordWidth, i: usize) -> u32 {
    let i = i as u32;
    match width {
        WordWidth::Bits8 => i & 0xFF,
        WordWidth::Bits16 => (0xA000 + i) & 0xFFFF,
        WordWidth::Bits32 => 0xDEAD_0000u32.wrapping_add(i),
    }
}

/// `length + 1` paced words at each configured speed; each echo must equal
/// the word before it. The clock is restored afterwards, also on failure.
pub fn run_burst<P, S, D>(
    link: &mut FpgaLink<P, S, D>,
    config: &HarnessConfig,
) -> Result<Vec<ScenarioReport>, HarnessError>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    let original_clock = link.settings().clock_hz;
    let result = burst_at_speeds(link, config);
    link.set_speed(original_clock)?;
    result
}

fn burst_at_speeds<P, S, D>(
    link: &mut FpgaLink<P, S, D>,
    config: &HarnessConfig,
) -> Result<Vec<ScenarioReport>, HarnessError>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    let width = link.settings().word_width;
    let length = config.burst.length;
    let settle_us = config.pacing.settle_us;
    let tx: Vec<u32> = (0..=length).map(|i| burst_word(width, i)).collect();

    let mut reports = Vec::with_capacity(config.burst.speeds_hz.len());
    for &speed in &config.burst.speeds_hz {
        link.set_speed(speed)?;
        let mut report = ScenarioReport::new(format!(
            "burst {}-bit @ {}",
            width.bits(),
            speed_label(speed)
        ));

        let mut rx = Vec::with_capacity(tx.len());
        for &word in &tx {
            rx.push(link.transfer_word(width, word)?);
            link.delay_us(settle_us)?;
        }

        report.absorb(length, shifted_mismatches(&tx, &rx));
        report.kbytes_per_sec = Some(modelled_kbytes_per_sec(
            link.settings(),
            tx.len(),
            settle_us,
        ));
        log::debug!("{report}");
        reports.push(report);
    }
    Ok(reports)
}

fn speed_label(hz: u32) -> String {
    if hz % 1_000_000 == 0 {
        format!("{} MHz", hz / 1_000_000)
    } else if hz % 1_000 == 0 {
        format!("{} kHz", hz / 1_000)
    } else {
        format!("{hz} Hz")
    }
}

/// Throughput of `words` single-word windows, from the wire clock, the
/// select setup and hold, and the pacing gap. Independent of the backend's
/// wall-clock speed.
fn modelled_kbytes_per_sec(settings: &LinkSettings, words: usize, settle_us: u32) -> f64 {
    let bytes = settings.word_width.bytes() as f64;
    let wire_ns = bytes * 8.0 * 1e9 / settings.clock_hz as f64;
    let window_ns = wire_ns + 2.0 * settings.select_setup_ns as f64 + settle_us as f64 * 1e3;
    let total_ns = window_ns * words as f64;
    bytes * words as f64 * 1e9 / total_ns / 1024.0
}
