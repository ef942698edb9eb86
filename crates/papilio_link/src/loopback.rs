//! Verification against a loopback bitstream.
//!
//! The FPGA shifts a received word back out during the *next* transfer, so
//! the echo of transfer `i` arrives on transfer `i + 1`. The first result
//! after power-up or a flush carries no information and is discarded.

use crate::error::LinkError;
use crate::link::FpgaLink;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use papilio_hal::{SpiPort, WordWidth};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mismatch {
    pub index: usize,
    pub expected: u32,
    pub received: u32,
}

/// Result of one checked transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Echo {
    pub sent: u32,
    pub received: u32,
    /// What the peripheral should have returned; `None` right after priming
    /// was skipped.
    pub expected: Option<u32>,
}

impl Echo {
    pub fn matched(&self) -> bool {
        self.expected == Some(self.received)
    }
}

/// Tracks the previously sent word so each echo can be checked against it.
#[derive(Debug, Clone)]
pub struct LoopbackProbe {
    width: WordWidth,
    previous: Option<u32>,
}

impl LoopbackProbe {
    pub fn new(width: WordWidth) -> Self {
        Self {
            width,
            previous: None,
        }
    }

    pub fn width(&self) -> WordWidth {
        self.width
    }

    /// Clock out `count` zero words to push stale data out of the
    /// peripheral. Afterwards the peripheral holds zero.
    pub fn flush<P, S, D>(
        &mut self,
        link: &mut FpgaLink<P, S, D>,
        count: usize,
    ) -> Result<(), LinkError>
    where
        P: SpiPort,
        S: OutputPin,
        D: DelayNs,
    {
        for _ in 0..count {
            link.transfer_word(self.width, 0)?;
        }
        if count > 0 {
            self.previous = Some(0);
        }
        Ok(())
    }

    /// Send `value` and discard whatever comes back.
    pub fn prime<P, S, D>(
        &mut self,
        link: &mut FpgaLink<P, S, D>,
        value: u32,
    ) -> Result<(), LinkError>
    where
        P: SpiPort,
        S: OutputPin,
        D: DelayNs,
    {
        link.transfer_word(self.width, value)?;
        self.previous = Some(value);
        Ok(())
    }

    /// Send `value` and compare the echo with the previously sent word.
    pub fn send<P, S, D>(
        &mut self,
        link: &mut FpgaLink<P, S, D>,
        value: u32,
    ) -> Result<Echo, LinkError>
    where
        P: SpiPort,
        S: OutputPin,
        D: DelayNs,
    {
        let received = link.transfer_word(self.width, value)?;
        let echo = Echo {
            sent: value,
            received,
            expected: self.previous.replace(value),
        };
        if echo.expected.is_some() && !echo.matched() {
            log::warn!(
                "loopback mismatch: sent {:#x}, got {:#x}, expected {:#x?}",
                value,
                received,
                echo.expected
            );
        }
        Ok(echo)
    }
}

/// Compare `rx[i]` with `tx[i - 1]` for `i >= 1`; `rx[0]` is unconstrained.
pub fn shifted_mismatches<T>(tx: &[T], rx: &[T]) -> Vec<Mismatch>
where
    T: Copy + Into<u32>,
{
    rx.iter()
        .enumerate()
        .skip(1)
        .zip(tx)
        .filter(|((_, r), t)| (**r).into() != (**t).into())
        .map(|((index, &r), &t)| Mismatch {
            index,
            expected: t.into(),
            received: r.into(),
        })
        .collect()
}

/// Compare two sequences element by element.
pub fn exact_mismatches<T>(expected: &[T], received: &[T]) -> Vec<Mismatch>
where
    T: Copy + Into<u32>,
{
    expected
        .iter()
        .zip(received)
        .enumerate()
        .filter(|(_, (e, r))| (**e).into() != (**r).into())
        .map(|(index, (&e, &r))| Mismatch {
            index,
            expected: e.into(),
            received: r.into(),
        })
        .collect()
}
