use crate::error::LinkError;
use crate::link::FpgaLink;
use crate::transaction::Transaction;
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use papilio_hal::SpiPort;

fn check_len(expected: usize, actual: usize) -> Result<(), LinkError> {
    if expected != actual {
        return Err(LinkError::BufferLength { expected, actual });
    }
    Ok(())
}

impl<P, S, D> FpgaLink<P, S, D>
where
    P: SpiPort,
    S: OutputPin,
    D: DelayNs,
{
    /// Exchange `len` bytes inside one window.
    ///
    /// Without `tx` the link clocks out zeros; without `rx` received bytes are
    /// dropped. Buffers that are present must be exactly `len` long. A zero
    /// length does not open a window.
    pub fn transfer_burst(
        &mut self,
        tx: Option<&[u8]>,
        mut rx: Option<&mut [u8]>,
        len: usize,
    ) -> Result<(), LinkError> {
        let settings = self.settings;
        let wiring = self.wiring_mut()?;
        if let Some(tx) = tx {
            check_len(len, tx.len())?;
        }
        if let Some(rx) = rx.as_deref() {
            check_len(len, rx.len())?;
        }
        if len == 0 {
            return Ok(());
        }

        let mut txn = Transaction::open(wiring, &settings)?;
        for i in 0..len {
            let byte = tx.map_or(0x00, |tx| tx[i]);
            let received = txn.exchange(byte)?;
            if let Some(rx) = rx.as_deref_mut() {
                rx[i] = received;
            }
        }
        log::trace!("burst of {len} bytes");
        txn.close()
    }

    pub fn write_burst(&mut self, tx: &[u8]) -> Result<(), LinkError> {
        self.transfer_burst(Some(tx), None, tx.len())
    }

    pub fn read_burst(&mut self, rx: &mut [u8]) -> Result<(), LinkError> {
        let len = rx.len();
        self.transfer_burst(None, Some(rx), len)
    }

    pub fn exchange_burst(&mut self, tx: &[u8], rx: &mut [u8]) -> Result<(), LinkError> {
        self.transfer_burst(Some(tx), Some(rx), tx.len())
    }
}
