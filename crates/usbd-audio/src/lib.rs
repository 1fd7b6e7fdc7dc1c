//! USB Audio Class 1.0 streaming core: ring-mediated record/playback
//! pipelines, rate correction and explicit feedback, and class-request
//! dispatch over the entity graph.
//!
//! The controller driver hands completions in here by calling
//! [`record`]/[`playback`] functions under the relevant AS IF's lock; the
//! class-request router calls [`class_request`] functions directly, since
//! those need no streaming state beyond the entity graph.

#![no_std]

pub mod as_if;
pub mod class_request;
pub mod correction;
pub mod entities;
pub mod playback;
pub mod record;
pub mod settings;

pub use as_if::{ActiveAltSetting, AsIf, AsIfState, AudioProcessingState};
pub use entities::{Entity, EntityTable, FeatureUnit, InputTerminal, MixerUnit, OutputTerminal, SelectorUnit};
pub use settings::{AsIfSettings, BufferDescriptor, CorrectionOutcome, PlaybackSynch, RecordRateAdjust};
