//! Mock control-pipe-only UsbBus, so protocol tests can drive the class
//! with raw EP0 transactions and interleave them with event-loop steps.
#![allow(dead_code)]

use std::{cell::RefCell, cmp::min, rc::Rc};

use usb_device::bus::PollResult;
use usb_device::bus::{UsbBus, UsbBusAllocator};
use usb_device::class::UsbClass;
use usb_device::endpoint::{EndpointAddress, EndpointType};
use usb_device::prelude::*;
use usb_device::{Result, UsbDirection};

pub const EP0_SIZE: u8 = 32;

#[derive(Debug, PartialEq, Eq)]
pub enum EPErr {
    Stalled,
}

struct EP {
    alloc: bool,
    stall: bool,
    read_len: usize,
    read: [u8; 1024],
    read_ready: bool,
    write_len: usize,
    write: [u8; 1024],
    write_done: bool,
    setup: bool,
    max_size: usize,
}

impl EP {
    fn new() -> Self {
        EP {
            alloc: false,
            stall: false,
            read_len: 0,
            read: [0; 1024],
            read_ready: false,
            write_len: 0,
            write: [0; 1024],
            write_done: false,
            setup: false,
            max_size: 0,
        }
    }
}

/// Host-side view of endpoint zero.
pub struct TestBusIO {
    ep_in: RefCell<EP>,
    ep_out: RefCell<EP>,
}

unsafe impl Sync for TestBusIO {}

impl TestBusIO {
    fn new() -> Self {
        Self {
            ep_in: RefCell::new(EP::new()),
            ep_out: RefCell::new(EP::new()),
        }
    }

    fn ep(&self, ep_addr: EndpointAddress) -> &RefCell<EP> {
        assert_eq!(ep_addr.index(), 0, "control-only bus");
        match ep_addr.direction() {
            UsbDirection::In => &self.ep_in,
            UsbDirection::Out => &self.ep_out,
        }
    }

    /// Queue data for the device to read on EP0 OUT.
    pub fn set_read(&self, data: &[u8], setup: bool) {
        if setup {
            // setup packet removes a stall condition
            self.ep_out.borrow_mut().stall = false;
            self.ep_in.borrow_mut().stall = false;
        }
        let mut ep = self.ep_out.borrow_mut();
        ep.read_len = data.len();
        ep.read[..data.len()].copy_from_slice(data);
        ep.setup = setup;
        ep.read_ready = true;
    }

    /// Take whatever the device has written to EP0 IN so far.
    pub fn take_write(&self, data: &mut [u8]) -> usize {
        let mut ep = self.ep_in.borrow_mut();
        let res = ep.write_len;
        ep.write_len = 0;
        data[..res].copy_from_slice(&ep.write[..res]);
        ep.write_done = true;
        res
    }

    /// True if either side of EP0 is stalled.
    pub fn stalled0(&self) -> bool {
        self.ep_in.borrow().stall || self.ep_out.borrow().stall
    }
}

pub struct TestBus {
    io: Rc<TestBusIO>,
}

unsafe impl Sync for TestBus {}

impl UsbBus for TestBus {
    fn alloc_ep(
        &mut self,
        _ep_dir: UsbDirection,
        ep_addr: Option<EndpointAddress>,
        _ep_type: EndpointType,
        max_packet_size: u16,
        _interval: u8,
    ) -> Result<EndpointAddress> {
        let ea = ep_addr.expect("endpoint allocation is not implemented");
        let mut ep = self.io.ep(ea).borrow_mut();
        assert!(!ep.alloc);
        ep.alloc = true;
        ep.stall = false;
        ep.max_size = max_packet_size as usize;
        Ok(ea)
    }

    fn enable(&mut self) {}

    fn force_reset(&self) -> Result<()> {
        Ok(())
    }

    fn poll(&self) -> PollResult {
        let ep_out = self.io.ep_out.borrow();
        let mut ep_in = self.io.ep_in.borrow_mut();

        let write_done = ep_in.write_done;
        let can_read = ep_out.read_ready;
        let setup = ep_out.setup;

        ep_in.write_done = false;

        if write_done || can_read || setup {
            PollResult::Data {
                ep_in_complete: if write_done { 1 } else { 0 },
                ep_out: if can_read { 1 } else { 0 },
                ep_setup: if setup { 1 } else { 0 },
            }
        } else {
            PollResult::None
        }
    }

    fn read(&self, ep_addr: EndpointAddress, buf: &mut [u8]) -> Result<usize> {
        let mut ep = self.io.ep(ep_addr).borrow_mut();
        let len = min(buf.len(), min(ep.read_len, ep.max_size));

        if len == 0 {
            return Err(UsbError::WouldBlock);
        }

        buf[..len].copy_from_slice(&ep.read[..len]);

        ep.read_len -= len;
        ep.read.copy_within(len.., 0);

        if ep.read_len == 0 {
            ep.setup = false;
        }
        ep.read_ready = ep.read_len > 0;

        Ok(len)
    }

    fn write(&self, ep_addr: EndpointAddress, buf: &[u8]) -> Result<usize> {
        let mut ep = self.io.ep(ep_addr).borrow_mut();

        if buf.len() > ep.max_size {
            return Err(UsbError::BufferOverflow);
        }

        let offset = ep.write_len;
        ep.write[offset..offset + buf.len()].copy_from_slice(buf);
        ep.write_len += buf.len();
        ep.write_done = false;
        Ok(buf.len())
    }

    fn reset(&self) {}
    fn resume(&self) {}
    fn suspend(&self) {}

    fn set_device_address(&self, addr: u8) {
        assert_eq!(addr, 5);
    }

    fn is_stalled(&self, ep_addr: EndpointAddress) -> bool {
        self.io.ep(ep_addr).borrow().stall
    }

    fn set_stalled(&self, ep_addr: EndpointAddress, stalled: bool) {
        self.io.ep(ep_addr).borrow_mut().stall = stalled;
    }
}

/// Creates the shared EP0 state and a bus allocator over it.
pub fn make_bus() -> (Rc<TestBusIO>, UsbBusAllocator<TestBus>) {
    let io = Rc::new(TestBusIO::new());
    let bus = TestBus { io: io.clone() };
    (io, UsbBusAllocator::new(bus))
}

/// Builds the usual test device on the allocator.
pub fn make_device(alloc: &UsbBusAllocator<TestBus>) -> UsbDevice<'_, TestBus> {
    UsbDeviceBuilder::new(alloc, UsbVidPid(0x16c0, 0x05df))
        .manufacturer("Test")
        .product("Test")
        .serial_number("Test")
        .max_packet_size_0(EP0_SIZE)
        .build()
}

/// Runs one control transfer: setup packet, optional OUT data stage, and
/// whatever the device replies on EP0 IN.
pub fn transact<T: UsbClass<TestBus>>(
    io: &TestBusIO,
    dev: &mut UsbDevice<'_, TestBus>,
    cls: &mut T,
    setup: &[u8; 8],
    data: Option<&[u8]>,
    out: &mut [u8],
) -> core::result::Result<usize, EPErr> {
    io.set_read(setup, true);
    dev.poll(&mut [cls]);
    if io.stalled0() {
        return Err(EPErr::Stalled);
    }

    if let Some(val) = data {
        io.set_read(val, false);
        for i in 1..100 {
            if !dev.poll(&mut [cls]) {
                break;
            }
            if i >= 99 {
                panic!("read too much");
            }
        }
        if io.stalled0() {
            return Err(EPErr::Stalled);
        }
    }

    let mut len = 0;
    loop {
        let one = io.take_write(&mut out[len..]);
        dev.poll(&mut [cls]);
        if io.stalled0() {
            return Err(EPErr::Stalled);
        }

        len += one;
        if one < EP0_SIZE as usize {
            // short packet - transfer done
            break;
        }
    }

    Ok(len)
}

/// Standard enumeration steps: set address, set configuration, set
/// interface.
pub fn enumerate<T: UsbClass<TestBus>>(
    io: &TestBusIO,
    dev: &mut UsbDevice<'_, TestBus>,
    cls: &mut T,
) {
    let mut buf = [0; 8];

    let len = transact(io, dev, cls, &[0, 0x5, 5, 0, 0, 0, 0, 0], None, &mut buf).expect("len");
    assert_eq!(len, 0);

    let len = transact(io, dev, cls, &[0, 0x9, 1, 0, 0, 0, 0, 0], None, &mut buf).expect("len");
    assert_eq!(len, 0);

    let len = transact(io, dev, cls, &[1, 0xb, 0, 0, 0, 0, 0, 0], None, &mut buf).expect("len");
    assert_eq!(len, 0);
}
