//! Mode control and the cooperative event loop.

use log::info;
use usb_device::bus::UsbBus;
use usb_device::device::UsbDevice;

use crate::class::HidBootClass;
use crate::mem::HidBootMemIO;
use crate::timeout::InactivitySupervisor;

/// Platform integration seam: entry sampling, the bootloader⇄application
/// transition, and the hooks the supervisor polls.
///
/// Only the first three items are mandatory; the timer and watchdog hooks
/// default to no-ops for boards that do not wire them.
pub trait Board {
    /// Sampled once at boot and again on every loop iteration; the
    /// bootloader keeps control only while this holds.
    ///
    /// Typically a jumper pin, often folded with the reset-cause flags so
    /// that only an external reset enters the bootloader. A fixed `true`
    /// policy is valid when the inactivity timeout is enabled — the
    /// supervisor is then the only exit path besides a host request.
    fn entry_condition(&mut self) -> bool;

    /// One-time bring-up when the bootloader takes control.
    ///
    /// Redirect the interrupt vector table to the bootloader's section
    /// and force the host to re-enumerate — assert the disconnect signal
    /// long enough for the host to notice, release it — before enabling
    /// global interrupts.
    fn enter(&mut self);

    /// Hand control to the application.
    ///
    /// Re-enable read-while-write access to program memory, reset the
    /// transport hardware to power-on defaults, restore the application's
    /// vector table, then transfer to address 0. The transfer must be a
    /// register-indirect jump, never a call: a constant-0 call can be
    /// encoded as a short relative call that the assembler resolves into
    /// the vector table, and any call would push a return address the
    /// application never pops.
    fn leave(&mut self) -> !;

    /// Kick the hardware watchdog. Called once per loop iteration.
    fn feed_watchdog(&mut self) {}

    /// Poll-and-clear the overflow flag of the free-running seconds
    /// timer. Only consulted when the inactivity timeout is configured.
    fn second_elapsed(&mut self) -> bool {
        false
    }

    /// Restart timer accumulation from zero after protocol activity.
    fn restart_timer(&mut self) {}

    /// Raise a visible fault indicator when the supervisor trips.
    fn signal_timeout(&mut self) {}
}

/// Startup configuration, resolved once before the loop begins.
#[derive(Debug, Clone, Copy)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct BootConfig {
    /// Honor host-requested exit (a write to any non-data selector).
    /// When disabled such writes are acknowledged and ignored, and only
    /// the entry condition or the supervisor can end the session.
    pub allow_host_exit: bool,
    /// Seconds of protocol silence before the supervisor forces an exit;
    /// `None` disables supervision and leaves entry/exit to the sampled
    /// entry condition alone.
    pub inactivity_timeout_s: Option<u16>,
    /// Transport polls performed after an exit request so the pending
    /// acknowledgment can reach the host before control is handed over.
    pub exit_flush_polls: u16,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            allow_host_exit: true,
            inactivity_timeout_s: Some(60),
            exit_flush_polls: 255,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    AwaitingCondition,
    Active,
    Flushing(u16),
    Exiting,
}

/// Outcome of one event-loop iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Progress {
    /// Keep looping.
    Continue,
    /// Hand control to the application via [`Board::leave`].
    Leave,
}

/// Drives the bootloader through its lifecycle: sample the entry
/// condition, serve the protocol while it holds, and leave — on host
/// request, supervisor timeout, or condition deassertion.
pub struct ModeController {
    mode: Mode,
    supervisor: Option<InactivitySupervisor>,
    exit_flush_polls: u16,
}

impl ModeController {
    /// Creates a controller in the initial state.
    pub fn new(config: &BootConfig) -> Self {
        Self {
            mode: Mode::AwaitingCondition,
            supervisor: config.inactivity_timeout_s.map(InactivitySupervisor::new),
            exit_flush_polls: config.exit_flush_polls,
        }
    }

    /// Executes one event-loop iteration and reports whether the loop
    /// should continue. [`run`](ModeController::run) wraps this; it is
    /// public so integrations with their own outer loop can interleave
    /// other work.
    pub fn step<B: UsbBus, M: HidBootMemIO, D: Board>(
        &mut self,
        board: &mut D,
        dev: &mut UsbDevice<'_, B>,
        class: &mut HidBootClass<B, M>,
    ) -> Progress {
        match self.mode {
            Mode::AwaitingCondition => {
                if board.entry_condition() {
                    info!("entering bootloader");
                    board.enter();
                    self.mode = Mode::Active;
                    Progress::Continue
                } else {
                    self.mode = Mode::Exiting;
                    Progress::Leave
                }
            }
            Mode::Active => {
                board.feed_watchdog();
                dev.poll(&mut [class]);

                if class.take_activity() {
                    if let Some(sup) = self.supervisor.as_mut() {
                        sup.note_activity(board);
                    }
                }
                if let Some(sup) = self.supervisor.as_mut() {
                    if sup.poll(board) {
                        self.mode = Mode::Exiting;
                        return Progress::Leave;
                    }
                }
                if class.exit_requested() {
                    // Keep servicing so the acknowledgment reaches the
                    // host before the device drops off the bus.
                    self.mode = Mode::Flushing(self.exit_flush_polls);
                    return Progress::Continue;
                }
                if !board.entry_condition() {
                    self.mode = Mode::Exiting;
                    return Progress::Leave;
                }
                Progress::Continue
            }
            Mode::Flushing(left) => {
                board.feed_watchdog();
                dev.poll(&mut [class]);
                if left == 0 {
                    self.mode = Mode::Exiting;
                    Progress::Leave
                } else {
                    self.mode = Mode::Flushing(left - 1);
                    Progress::Continue
                }
            }
            Mode::Exiting => Progress::Leave,
        }
    }

    /// True once the inactivity supervisor has forced an exit.
    pub fn timed_out(&self) -> bool {
        self.supervisor
            .as_ref()
            .map_or(false, InactivitySupervisor::timed_out)
    }

    /// Runs the event loop to completion and transfers control to the
    /// application. Never returns.
    pub fn run<B: UsbBus, M: HidBootMemIO, D: Board>(
        mut self,
        mut board: D,
        mut dev: UsbDevice<'_, B>,
        mut class: HidBootClass<B, M>,
    ) -> ! {
        loop {
            if let Progress::Leave = self.step(&mut board, &mut dev, &mut class) {
                info!("leaving bootloader");
                board.leave();
            }
        }
    }
}
