//! Write-address tracking across chunked block transfers.

use log::trace;

use crate::mem::{HidBootMemError, HidBootMemIO};

/// Payload bytes in one logical block.
pub const BLOCK_SIZE: u8 = 128;

/// Report transfer currently in flight, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ActiveReport {
    /// No transfer in progress.
    None,
    /// A control report is in flight.
    Control,
    /// A data block is being assembled.
    Data,
}

/// State of one reprogramming session: the running write address and the
/// progress of the logical 128-byte block being assembled from transport
/// chunks.
///
/// The first chunk of a block leads with the little-endian target address
/// ([`ADDRESS_BYTES`](HidBootMemIO::ADDRESS_BYTES) wide); every byte after
/// it, across this and all following chunks of the block, is program-memory
/// content. Chunk boundaries carry no meaning — the address header and the
/// two-byte programming words may both be split across them.
pub struct ProgrammingSession {
    current_address: u32,
    block_offset: u8,
    active: ActiveReport,
    header_remaining: u8,
    pending_low: Option<u8>,
}

impl ProgrammingSession {
    /// Creates an idle session.
    pub const fn new() -> Self {
        Self {
            current_address: 0,
            block_offset: 0,
            active: ActiveReport::None,
            header_remaining: 0,
            pending_low: None,
        }
    }

    /// Resets the session for a new data block.
    ///
    /// The next [`write_chunk`](ProgrammingSession::write_chunk) call will
    /// consume the address header before programming anything.
    pub fn begin_block<M: HidBootMemIO>(&mut self) {
        self.current_address = 0;
        self.block_offset = 0;
        self.header_remaining = M::ADDRESS_BYTES;
        self.pending_low = None;
        self.active = ActiveReport::Data;
    }

    pub(crate) fn begin_control(&mut self) {
        self.block_offset = 0;
        self.active = ActiveReport::Control;
    }

    pub(crate) fn reset(&mut self) {
        *self = Self::new();
    }

    /// Consume one transport chunk of the current data block.
    ///
    /// Walks the chunk a word at a time: a word landing on a page start
    /// erases that page first, and a word completing a page commits it,
    /// so each page touched by the block is erased exactly once before its
    /// first word and committed exactly once after its last.
    ///
    /// Returns `true` when the accumulated payload reaches the 128-byte
    /// block size, which is the caller's cue to acknowledge the transfer.
    /// An error leaves the addressed page in an indeterminate state and
    /// abandons the block.
    pub fn write_chunk<M: HidBootMemIO>(
        &mut self,
        mem: &mut M,
        chunk: &[u8],
    ) -> Result<bool, HidBootMemError> {
        let mut data = chunk;

        // Leading little-endian target address. May straddle chunks.
        while self.header_remaining > 0 && !data.is_empty() {
            let shift = 8 * (M::ADDRESS_BYTES - self.header_remaining);
            self.current_address |= (data[0] as u32) << shift;
            self.header_remaining -= 1;
            data = &data[1..];
            if self.header_remaining == 0 {
                trace!("block start, target {:#07x}", self.current_address);
            }
        }

        if data.is_empty() {
            return Ok(false);
        }

        self.block_offset = self.block_offset.wrapping_add(data.len() as u8);

        if let Err(e) = self.program(mem, data) {
            self.active = ActiveReport::None;
            self.pending_low = None;
            self.header_remaining = 0;
            return Err(e);
        }

        let complete = self.block_offset >= BLOCK_SIZE;
        if complete {
            trace!("block complete, next {:#07x}", self.current_address);
            self.active = ActiveReport::None;
        }
        Ok(complete)
    }

    fn program<M: HidBootMemIO>(
        &mut self,
        mem: &mut M,
        mut data: &[u8],
    ) -> Result<(), HidBootMemError> {
        // Re-pair a word split across the previous chunk boundary.
        if let Some(low) = self.pending_low.take() {
            self.program_word(mem, low, data[0])?;
            data = &data[1..];
        }

        let mut words = data.chunks_exact(2);
        for pair in words.by_ref() {
            self.program_word(mem, pair[0], pair[1])?;
        }
        self.pending_low = words.remainder().first().copied();
        Ok(())
    }

    fn program_word<M: HidBootMemIO>(
        &mut self,
        mem: &mut M,
        low: u8,
        high: u8,
    ) -> Result<(), HidBootMemError> {
        let page = M::PAGE_SIZE as u32;
        let address = self.current_address;

        if address >= M::FLASH_LIMIT {
            return Err(HidBootMemError::Address);
        }
        if address % page == 0 {
            mem.erase_page(address)?;
        }
        mem.fill_word(address, u16::from_le_bytes([low, high]))?;
        self.current_address = address + 2;
        if self.current_address % page == 0 {
            mem.write_page(self.current_address - page)?;
        }
        Ok(())
    }

    /// Address of the next unwritten byte.
    pub fn current_address(&self) -> u32 {
        self.current_address
    }

    /// Report transfer currently in flight.
    pub fn active_report(&self) -> ActiveReport {
        self.active
    }
}

impl Default for ProgrammingSession {
    fn default() -> Self {
        Self::new()
    }
}
