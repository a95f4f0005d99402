//! Test doubles shared by the unit tests.

use std::time::Duration;

use embedded_hal_async::delay::DelayNs;

use crate::domain::{SdHost, SerialFlash};

/// `DelayNs` on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TokioDelay;

impl DelayNs for TokioDelay {
    async fn delay_ns(&mut self, ns: u32) {
        tokio::time::sleep(Duration::from_nanos(ns as u64)).await;
    }

    async fn delay_ms(&mut self, ms: u32) {
        tokio::time::sleep(Duration::from_millis(ms as u64)).await;
    }
}

/// Driver call as observed by a mock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Op {
    Read { address: u32, len: usize },
    ReadAsync { address: u32, len: usize },
    Write { address: u32, len: usize },
    Erase { address: u32, len: u32 },
    Abort,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct MockError;

/// Serial flash over a byte vector that records every call.
pub(crate) struct MockFlash {
    pub data: Vec<u8>,
    pub prog_size: u32,
    pub erase_size: u32,
    pub ops: Vec<Op>,
    pub fail: bool,
    pub stall_async: bool,
}

impl MockFlash {
    pub fn new(size: usize, prog_size: u32, erase_size: u32) -> Self {
        Self {
            data: vec![0xFF; size],
            prog_size,
            erase_size,
            ops: Vec::new(),
            fail: false,
            stall_async: false,
        }
    }

    fn range(&self, address: u32, len: usize) -> Result<core::ops::Range<usize>, MockError> {
        let start = address as usize;
        let end = start + len;
        if self.fail || end > self.data.len() {
            Err(MockError)
        } else {
            Ok(start..end)
        }
    }
}

impl SerialFlash for MockFlash {
    type Error = MockError;

    fn size(&self) -> u32 {
        self.data.len() as u32
    }

    fn prog_size(&self, _address: u32) -> u32 {
        self.prog_size
    }

    fn erase_size(&self, _address: u32) -> u32 {
        self.erase_size
    }

    fn read(&mut self, address: u32, buf: &mut [u8]) -> Result<(), MockError> {
        self.ops.push(Op::Read { address, len: buf.len() });
        let range = self.range(address, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn write(&mut self, address: u32, data: &[u8]) -> Result<(), MockError> {
        self.ops.push(Op::Write { address, len: data.len() });
        let range = self.range(address, data.len())?;
        self.data[range].copy_from_slice(data);
        Ok(())
    }

    fn erase(&mut self, address: u32, len: u32) -> Result<(), MockError> {
        self.ops.push(Op::Erase { address, len });
        let range = self.range(address, len as usize)?;
        self.data[range].fill(0xFF);
        Ok(())
    }

    async fn read_async(&mut self, address: u32, buf: &mut [u8]) -> Result<(), MockError> {
        self.ops.push(Op::ReadAsync { address, len: buf.len() });
        if self.stall_async {
            core::future::pending::<()>().await;
        }
        let range = self.range(address, buf.len())?;
        buf.copy_from_slice(&self.data[range]);
        Ok(())
    }

    fn abort_transfer(&mut self) -> Result<(), MockError> {
        self.ops.push(Op::Abort);
        Ok(())
    }
}

/// SD host over 512-byte sectors that records every call.
pub(crate) struct MockHost {
    pub sectors: Vec<[u8; 512]>,
    pub ops: Vec<Op>,
    pub absent: bool,
    pub fail: bool,
    pub stall: bool,
}

impl MockHost {
    pub fn new(sectors: usize) -> Self {
        Self {
            sectors: vec![[0u8; 512]; sectors],
            ops: Vec::new(),
            absent: false,
            fail: false,
            stall: false,
        }
    }

    fn check(&self, block: u32, count: usize) -> Result<(), MockError> {
        if self.fail || block as usize + count > self.sectors.len() {
            Err(MockError)
        } else {
            Ok(())
        }
    }
}

impl SdHost for MockHost {
    type Error = MockError;

    fn block_count(&self) -> Result<u32, MockError> {
        if self.absent {
            Err(MockError)
        } else {
            Ok(self.sectors.len() as u32)
        }
    }

    async fn read_blocks(&mut self, block: u32, buf: &mut [u8]) -> Result<(), MockError> {
        self.ops.push(Op::ReadAsync { address: block, len: buf.len() });
        if self.stall {
            core::future::pending::<()>().await;
        }
        self.check(block, buf.len() / 512)?;
        for (i, chunk) in buf.chunks_exact_mut(512).enumerate() {
            chunk.copy_from_slice(&self.sectors[block as usize + i]);
        }
        Ok(())
    }

    async fn write_blocks(&mut self, block: u32, data: &[u8]) -> Result<(), MockError> {
        self.ops.push(Op::Write { address: block, len: data.len() });
        self.check(block, data.len() / 512)?;
        for (i, chunk) in data.chunks_exact(512).enumerate() {
            self.sectors[block as usize + i].copy_from_slice(chunk);
        }
        Ok(())
    }

    async fn erase(&mut self, block: u32, count: u32) -> Result<(), MockError> {
        self.ops.push(Op::Erase { address: block, len: count });
        self.check(block, count as usize)?;
        for sector in &mut self.sectors[block as usize..(block + count) as usize] {
            sector.fill(0);
        }
        Ok(())
    }

    fn abort_transfer(&mut self) -> Result<(), MockError> {
        self.ops.push(Op::Abort);
        Ok(())
    }
}
