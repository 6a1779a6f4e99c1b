//! HID protocol module: request dispatch for the bootloader class.

use core::marker::PhantomData;

use log::{info, warn};
use usb_device::{class_prelude::*, control::Request};

use crate::mem::HidBootMemIO;
use crate::runner::BootConfig;
use crate::session::{ActiveReport, ProgrammingSession, BLOCK_SIZE};

const USB_CLASS_HID: u8 = 0x03;

const DESC_DESCTYPE_HID: u8 = 0x21;
const DESC_DESCTYPE_HID_REPORT: u8 = 0x22;

const HID_GET_REPORT: u8 = 0x01;
const HID_SET_REPORT: u8 = 0x09;

/// Selector of the control/info report.
pub const REPORT_ID_INFO: u8 = 1;
/// Selector of the data report.
pub const REPORT_ID_DATA: u8 = 2;

/// Bootloader protocol USB class implementation for the usb-device library.
///
/// Exposes one HID interface with two feature reports: report 1 answers a
/// read with the device info record and requests bootloader exit on a
/// write; report 2 carries one logical block of program-memory content per
/// write. All traffic runs over the control pipe — the interface has no
/// endpoints of its own.
///
/// The class only dispatches; erase and program operations go through the
/// [`HidBootMemIO`] implementation it owns, and the exit/activity flags it
/// accumulates are drained by the event loop each iteration.
pub struct HidBootClass<B: UsbBus, M: HidBootMemIO> {
    if_num: InterfaceNumber,
    session: ProgrammingSession,
    exit_requested: bool,
    activity: bool,
    allow_host_exit: bool,
    mem: M,
    _bus: PhantomData<B>,
}

impl<B: UsbBus, M: HidBootMemIO> HidBootClass<B, M> {
    /// Report descriptor: feature report 1 (6 bytes, control/info) and
    /// feature report 2 (address header plus one block of payload).
    const REPORT_DESCRIPTOR: [u8; 33] = [
        0x06, 0x00, 0xff, // Usage Page (Vendor Defined)
        0x09, 0x01, //       Usage (Vendor Usage 1)
        0xa1, 0x01, //       Collection (Application)
        0x15, 0x00, //         Logical Minimum (0)
        0x26, 0xff, 0x00, //   Logical Maximum (255)
        0x75, 0x08, //         Report Size (8)
        0x85, REPORT_ID_INFO, //   Report ID (1)
        0x95, 0x06, //             Report Count (6)
        0x09, 0x00, //             Usage (Undefined)
        0xb2, 0x02, 0x01, //       Feature (Data,Var,Abs,Buf)
        0x85, REPORT_ID_DATA, //   Report ID (2)
        0x95, M::ADDRESS_BYTES + BLOCK_SIZE, // Report Count (131 or 132)
        0x09, 0x00, //             Usage (Undefined)
        0xb2, 0x02, 0x01, //       Feature (Data,Var,Abs,Buf)
        0xc0, //             End Collection
    ];

    /// HID descriptor: bcdHID 1.01, no country code, one report descriptor.
    const HID_DESCRIPTOR: [u8; 9] = [
        0x09,
        DESC_DESCTYPE_HID,
        0x01,
        0x01,
        0x00,
        0x01,
        DESC_DESCTYPE_HID_REPORT,
        Self::REPORT_DESCRIPTOR.len() as u8,
        0x00,
    ];

    /// Reply to a report read: the device info record.
    const INFO_REPORT: [u8; 7] = [
        REPORT_ID_INFO,
        (M::PAGE_SIZE & 0xff) as u8,
        (M::PAGE_SIZE >> 8) as u8,
        (M::FLASH_LIMIT & 0xff) as u8,
        ((M::FLASH_LIMIT >> 8) & 0xff) as u8,
        ((M::FLASH_LIMIT >> 16) & 0xff) as u8,
        ((M::FLASH_LIMIT >> 24) & 0xff) as u8,
    ];

    /// Creates a new HidBootClass with the provided UsbBus and memory
    /// backend. `config` decides whether host-requested exit is honored.
    pub fn new(alloc: &UsbBusAllocator<B>, mem: M, config: &BootConfig) -> Self {
        Self {
            if_num: alloc.interface(),
            session: ProgrammingSession::new(),
            exit_requested: false,
            activity: false,
            allow_host_exit: config.allow_host_exit,
            mem,
            _bus: PhantomData,
        }
    }

    /// True once the host has requested bootloader exit.
    pub fn exit_requested(&self) -> bool {
        self.exit_requested
    }

    /// Drains the activity flag raised by each successfully dispatched
    /// request. The event loop feeds this into the inactivity supervisor.
    pub fn take_activity(&mut self) -> bool {
        core::mem::take(&mut self.activity)
    }

    /// Address of the next unwritten byte of the current session.
    pub fn current_address(&self) -> u32 {
        self.session.current_address()
    }

    /// Report transfer currently in flight.
    pub fn active_report(&self) -> ActiveReport {
        self.session.active_report()
    }

    /// Borrow the memory backend, e.g. to verify programmed contents.
    pub fn mem(&self) -> &M {
        &self.mem
    }

    fn set_report(&mut self, xfer: ControlOut<B>, req: Request) {
        let selector = (req.value & 0xff) as u8;

        if selector == REPORT_ID_DATA {
            self.session.begin_block::<M>();
            // Payload follows the report id byte.
            let payload = xfer.data().get(1..).unwrap_or(&[]);
            match self.session.write_chunk(&mut self.mem, payload) {
                Ok(_complete) => {
                    self.activity = true;
                    xfer.accept().ok();
                }
                Err(e) => {
                    warn!("block transfer rejected: {}", e);
                    xfer.reject().ok();
                }
            }
        } else {
            // Any non-data selector. Exit is a configuration decision;
            // without it the write is acknowledged and ignored.
            self.session.begin_control();
            if self.allow_host_exit {
                info!("host requested exit");
                self.exit_requested = true;
            }
            self.activity = true;
            xfer.accept().ok();
        }
    }

    fn get_report(&mut self, xfer: ControlIn<B>) {
        // Same reply whatever the selector or session state.
        self.activity = true;
        xfer.accept_with(&Self::INFO_REPORT).ok();
    }

    fn get_descriptor(&mut self, xfer: ControlIn<B>, req: Request) {
        match (req.value >> 8) as u8 {
            DESC_DESCTYPE_HID_REPORT => {
                xfer.accept_with(&Self::REPORT_DESCRIPTOR).ok();
            }
            DESC_DESCTYPE_HID => {
                xfer.accept_with(&Self::HID_DESCRIPTOR).ok();
            }
            _ => {
                xfer.reject().ok();
            }
        }
    }
}

impl<B: UsbBus, M: HidBootMemIO> UsbClass<B> for HidBootClass<B, M> {
    fn get_configuration_descriptors(
        &self,
        writer: &mut DescriptorWriter,
    ) -> usb_device::Result<()> {
        writer.interface_alt(self.if_num, 0, USB_CLASS_HID, 0, 0, None)?;
        writer.write(DESC_DESCTYPE_HID, &Self::HID_DESCRIPTOR[2..])?;
        Ok(())
    }

    fn control_in(&mut self, xfer: ControlIn<B>) {
        let req = *xfer.request();

        if req.recipient != control::Recipient::Interface {
            return;
        }

        if req.index != u8::from(self.if_num) as u16 {
            return;
        }

        match (req.request_type, req.request) {
            (control::RequestType::Standard, Request::GET_DESCRIPTOR) => {
                self.get_descriptor(xfer, req);
            }
            (control::RequestType::Class, HID_GET_REPORT) => {
                self.get_report(xfer);
            }
            (control::RequestType::Class, _) => {
                // Zero-length reply, no state change.
                xfer.accept_with(&[]).ok();
            }
            _ => {}
        }
    }

    fn control_out(&mut self, xfer: ControlOut<B>) {
        let req = *xfer.request();

        if req.request_type != control::RequestType::Class {
            return;
        }

        if req.recipient != control::Recipient::Interface {
            return;
        }

        if req.index != u8::from(self.if_num) as u16 {
            return;
        }

        match req.request {
            HID_SET_REPORT => {
                self.set_report(xfer, req);
            }
            _ => {
                // Zero-length acknowledgment, no state change.
                xfer.accept().ok();
            }
        }
    }

    fn reset(&mut self) {
        self.session.reset();
    }
}
