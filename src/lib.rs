#![cfg_attr(not(test), no_std)]
#![warn(missing_docs)]
//!
//! Implements a HID-transport bootloader reprogramming protocol for a
//! `usb-device` device.
//!
//! ## About
//!
//! A resident bootloader on a small microcontroller optionally takes
//! control of the device after reset, accepts a new application image
//! from the host, writes it into program memory page by page, and hands
//! control to the freshly written application. Running the protocol over
//! a HID interface keeps the host side driverless: the device exposes two
//! feature reports on the control pipe, one for device info and exit
//! signaling, one carrying the image data.
//!
//! This library is the protocol core only. The code that actually
//! erases, fills, and commits program-memory pages is not part of the
//! library and is expected to be provided by the library user, as is the
//! board glue deciding when the bootloader runs and how control returns
//! to the application. Any host tool that speaks the two-report HID
//! bootloader convention can drive it.
//!
//! ### Protocol
//!
//! * Read of report 1 - 7-byte device info record: report id, page size
//!   (2 bytes), end of writable memory + 1 (4 bytes), little-endian.
//! * Write of report 2 - one logical 128-byte block of program-memory
//!   content, prefixed with its little-endian target byte address.
//! * Write of report 1 (or any other selector) - request to leave the
//!   bootloader, honored when the configuration allows it.
//!
//! An inactivity supervisor can force the exit after a configured number
//! of seconds without host activity, so an unattended device never hangs
//! in the bootloader because a host disconnected mid-transfer.
//!
//! ### Limitations
//!
//! * A data transfer is `131` or `132` bytes, so `usb-device` must be
//!   built with the `control-buffer-256` feature (this crate enables it).
//!
//! * The protocol trusts the host: unrecognized requests are acknowledged
//!   and ignored, and nothing verifies that a programmed image is
//!   complete before the exit request arrives.
//!
//! ## Example
//!
//! The example focuses on the library seams; target controller bring-up
//! (clocks, USB peripheral, interrupts, GPIO) is out of scope and shown
//! only as comments.
//!
//! ```no_run
//! use usb_device::prelude::*;
//! use usb_device::bus::{UsbBus, UsbBusAllocator};
//! use usbd_hidboot::*;
//!
//! // HidBootClass drives MyFlash to erase and program pages.
//! struct MyFlash;
//!
//! impl HidBootMemIO for MyFlash {
//!     const PAGE_SIZE: u16 = 64;
//!     const FLASH_LIMIT: u32 = 0x1800;
//!
//!     fn erase_page(&mut self, address: u32) -> Result<(), HidBootMemError> {
//!         // issue the page erase with interrupts masked, then
//!         // busy-wait until the hardware reports completion
//!         Ok(())
//!     }
//!
//!     fn fill_word(&mut self, address: u32, word: u16) -> Result<(), HidBootMemError> {
//!         // stage one word into the page buffer, interrupts masked
//!         Ok(())
//!     }
//!
//!     fn write_page(&mut self, address: u32) -> Result<(), HidBootMemError> {
//!         // commit the page buffer with interrupts masked, then
//!         // busy-wait until the hardware reports completion
//!         Ok(())
//!     }
//! }
//!
//! // Board seam: entry jumper, vector tables, the jump to the app.
//! struct MyBoard;
//!
//! impl Board for MyBoard {
//!     fn entry_condition(&mut self) -> bool {
//!         // sample the bootloader jumper
//!         true
//!     }
//!
//!     fn enter(&mut self) {
//!         // vectors to the boot section, disconnect pulse so the host
//!         // re-enumerates, enable global interrupts
//!     }
//!
//!     fn leave(&mut self) -> ! {
//!         // re-enable read-while-write, vectors back to the
//!         // application, register-indirect jump to address 0
//!         loop {}
//!     }
//! }
//!
//! fn bootloader_main<B: UsbBus>(alloc: &UsbBusAllocator<B>) -> ! {
//!     let config = BootConfig::default();
//!     let class = HidBootClass::new(alloc, MyFlash, &config);
//!     let usb_dev = UsbDeviceBuilder::new(alloc, UsbVidPid(0x16c0, 0x05df))
//!         .manufacturer("example.com")
//!         .product("HIDBoot")
//!         .build();
//!
//!     ModeController::new(&config).run(MyBoard, usb_dev, class)
//! }
//! ```
//!

pub mod class;
pub mod mem;
pub mod runner;
pub mod session;
pub mod timeout;

#[doc(inline)]
pub use crate::class::{HidBootClass, REPORT_ID_DATA, REPORT_ID_INFO};
#[doc(inline)]
pub use crate::mem::{HidBootMemError, HidBootMemIO};
#[doc(inline)]
pub use crate::runner::{Board, BootConfig, ModeController, Progress};
#[doc(inline)]
pub use crate::session::{ActiveReport, ProgrammingSession, BLOCK_SIZE};
#[doc(inline)]
pub use crate::timeout::InactivitySupervisor;
