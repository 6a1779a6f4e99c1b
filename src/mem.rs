//! Hardware self-programming primitives.

use thiserror::Error;

/// Errors reported by the memory primitives. A failing primitive aborts
/// the block transfer in progress: the control pipe is stalled and the
/// host sees the request fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum HidBootMemError {
    /// Write address is at or past [`FLASH_LIMIT`](HidBootMemIO::FLASH_LIMIT).
    #[error("address outside the writable region")]
    Address,
    /// Page erase did not complete, or completion verification failed.
    #[error("page erase failed")]
    Erase,
    /// Page buffer fill or page write did not complete, or completion
    /// verification failed.
    #[error("page program failed")]
    Program,
}

/// Trait that describes the abstraction used to reprogram program memory
/// on a device. [`HidBootClass`](crate::HidBootClass) calls the three
/// self-programming primitives and uses the provided constants to describe
/// the device to the host.
///
/// Program memory is written a page at a time: the page is erased, filled
/// one machine word at a time into a hardware page buffer, and the buffer
/// is then committed to the page in one operation. The caller guarantees
/// the sequencing (a page is erased before its first word is filled and
/// committed after its last); implementations only perform the raw
/// operations.
///
/// # Interrupt masking
///
/// On self-programming hardware an interrupt must never fire during the
/// issuing instruction of any of the three primitives. Implementations
/// must mask interrupts around the issuing instruction *only* — the
/// completion busy-wait of [`erase_page`](HidBootMemIO::erase_page) and
/// [`write_page`](HidBootMemIO::write_page) runs with interrupts enabled
/// again so the transport's interrupt-driven signaling is not starved.
pub trait HidBootMemIO {
    /// Erase granularity of program memory in bytes.
    ///
    /// Must be a power of two, at least 2. Reported verbatim to the host
    /// in the info report.
    const PAGE_SIZE: u16;

    /// One past the last byte address the host is allowed to program.
    ///
    /// Usually the start of the bootloader's own section. Reported
    /// verbatim to the host in the info report.
    const FLASH_LIMIT: u32;

    /// Number of little-endian address bytes prefixed to the first chunk
    /// of each data block: 3, widened to 4 on devices whose writable
    /// region exceeds 24-bit addressing.
    ///
    /// The default tracks [`FLASH_LIMIT`](HidBootMemIO::FLASH_LIMIT);
    /// override only to match a host tool with a fixed header width.
    const ADDRESS_BYTES: u8 = if Self::FLASH_LIMIT > 0x0100_0000 { 4 } else { 3 };

    /// Erase the page containing `address`.
    ///
    /// `address` is always page-aligned. Issue with interrupts masked,
    /// then busy-wait until the hardware reports erase completion before
    /// returning.
    fn erase_page(&mut self, address: u32) -> Result<(), HidBootMemError>;

    /// Stage one little-endian word into the page buffer at `address`.
    ///
    /// Issue with interrupts masked. No completion wait; the buffer fill
    /// takes effect immediately.
    fn fill_word(&mut self, address: u32, word: u16) -> Result<(), HidBootMemError>;

    /// Commit the page buffer to the page starting at `address`.
    ///
    /// `address` is always the page start. Issue with interrupts masked,
    /// then busy-wait until the hardware reports write completion before
    /// returning.
    fn write_page(&mut self, address: u32) -> Result<(), HidBootMemError>;
}
