//! Portable traits and value types shared between a USB 2.0 device
//! controller driver and its class drivers.
//!
//! This crate carries none of the hardware-specific or streaming logic
//! itself - it is the seam the generic device core, the Renesas USBHS
//! controller driver, and the audio processing core all compile against,
//! so that `usbd-renesas-usbhs` and `usbd-audio` never need to depend on
//! each other directly.

#![no_std]

pub mod codec;
pub mod config;
pub mod error;
pub mod stats;
pub mod types;

pub use codec::{AudioCodec, FeatureSelector, RequestKind, TerminalKind};
pub use config::{AudioStreamingCfg, UsbhsCfg};
pub use error::{AudioError, DrvError};
pub use stats::{AsIfStats, CorrectionStats};
pub use types::{AsIfHandle, Direction, EpAddr, StreamDirection, TransferType};
