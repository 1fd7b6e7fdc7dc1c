//! Controller driver for the Renesas USBHS family (spec §4.1).
//!
//! Owns the pipe table, shared DFIFO pool, per-pipe PID state machines,
//! the OUT/IN DMA flows, setup-packet queue and ISR decoding, and exposes
//! them through [`driver::UsbhsDriver`]. [`regs::Regs`] is the seam
//! between this crate's logic and a real register window ([`regs::MmioRegs`]).

#![no_std]

pub mod dma;
pub mod driver;
pub mod fifo;
pub mod isr;
pub mod pid;
pub mod pipe;
pub mod regs;
pub mod setup;

pub use dma::{InDmaChannel, OutCompletion, OutDmaChannel};
pub use driver::{UsbhsDmaMode, UsbhsDriver};
pub use fifo::{DfifoChannel, DfifoPool};
pub use isr::{dispatch, IsrEvent, IsrSnapshot, VbusDebounce};
pub use pid::{Pid, PidState};
pub use pipe::{Pipe, PipeTable};
pub use regs::{Ctsq, DeviceState, MmioRegs, Regs};
pub use setup::SetupController;

#[cfg(test)]
extern crate std;
