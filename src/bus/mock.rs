//! Scripted I2C bus for driver tests

use super::I2cBus;
use crate::error::{FetcherError, Result};
use std::collections::VecDeque;

/// I2C transaction type for logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum I2cTransaction {
    Write { addr: u8, data: Vec<u8> },
    Read { addr: u8, len: usize },
    WriteRead { addr: u8, write_data: Vec<u8>, read_len: usize },
}

/// Mock I2C bus
///
/// Records every transaction and serves reads from one queued byte
/// stream, in order. A read that outruns the queue fails, so a short
/// script shows up as a bus error instead of silent zeros.
#[derive(Debug, Default)]
pub struct MockI2c {
    transactions: Vec<I2cTransaction>,
    read_data: VecDeque<u8>,
    delay_total_us: u64,
}

impl MockI2c {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to serve to subsequent reads
    pub fn push_read_data(&mut self, data: &[u8]) {
        self.read_data.extend(data.iter().copied());
    }

    pub fn transactions(&self) -> &[I2cTransaction] {
        &self.transactions
    }

    pub fn clear_transactions(&mut self) {
        self.transactions.clear();
    }

    /// Bytes written to `addr`, one entry per write or write-read
    pub fn writes_to(&self, addr: u8) -> Vec<Vec<u8>> {
        self.transactions
            .iter()
            .filter_map(|t| match t {
                I2cTransaction::Write { addr: a, data } if *a == addr => Some(data.clone()),
                I2cTransaction::WriteRead { addr: a, write_data, .. } if *a == addr => {
                    Some(write_data.clone())
                }
                _ => None,
            })
            .collect()
    }

    pub fn pending_read_bytes(&self) -> usize {
        self.read_data.len()
    }

    pub fn delay_total_us(&self) -> u64 {
        self.delay_total_us
    }

    fn fill(&mut self, buffer: &mut [u8]) -> Result<()> {
        if self.read_data.len() < buffer.len() {
            return Err(FetcherError::BusTransactionFailed(format!(
                "mock read of {} bytes with {} queued",
                buffer.len(),
                self.read_data.len()
            )));
        }
        for byte in buffer.iter_mut() {
            *byte = self.read_data.pop_front().unwrap_or_default();
        }
        Ok(())
    }
}

impl I2cBus for MockI2c {
    fn write(&mut self, address: u8, data: &[u8]) -> Result<()> {
        self.transactions.push(I2cTransaction::Write {
            addr: address,
            data: data.to_vec(),
        });
        Ok(())
    }

    fn read(&mut self, address: u8, buffer: &mut [u8]) -> Result<()> {
        self.transactions.push(I2cTransaction::Read {
            addr: address,
            len: buffer.len(),
        });
        self.fill(buffer)
    }

    fn write_read(&mut self, address: u8, data: &[u8], buffer: &mut [u8]) -> Result<()> {
        self.transactions.push(I2cTransaction::WriteRead {
            addr: address,
            write_data: data.to_vec(),
            read_len: buffer.len(),
        });
        self.fill(buffer)
    }

    fn delay_us(&mut self, us: u32) {
        self.delay_total_us += us as u64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_i2c_write() {
        let mut i2c = MockI2c::new();
        i2c.write(0x50, &[0x01, 0x02, 0x03]).unwrap();

        assert_eq!(
            i2c.transactions(),
            &[I2cTransaction::Write {
                addr: 0x50,
                data: vec![0x01, 0x02, 0x03]
            }]
        );
    }

    #[test]
    fn test_mock_i2c_reads_in_order() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0xAA, 0xBB, 0xCC]);

        let mut first = [0u8; 1];
        let mut rest = [0u8; 2];
        i2c.read(0x51, &mut first).unwrap();
        i2c.write_read(0x51, &[0x10], &mut rest).unwrap();

        assert_eq!(first, [0xAA]);
        assert_eq!(rest, [0xBB, 0xCC]);
        assert_eq!(i2c.writes_to(0x51), vec![vec![0x10]]);
    }

    #[test]
    fn test_mock_i2c_underrun_fails() {
        let mut i2c = MockI2c::new();
        i2c.push_read_data(&[0x01]);

        let mut buf = [0u8; 2];
        assert!(i2c.read(0x51, &mut buf).is_err());
    }
}
